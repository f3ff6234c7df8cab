// Copyright 2025 Chainflip Labs GmbH
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

use cl_utilities::{assert_err, assert_ok};
use sp_core::U256;

use super::*;
use crate::{
	common::Side,
	config::PoolConfig,
	error::SettlementError,
	math::{sqrt_price_at_tick, SwapAmount},
	pool::Size,
};

fn shared_pool() -> SharedPool<u32> {
	let mut pool = assert_ok!(Pool::new(PoolConfig::with_fee(500)));
	assert_ok!(pool.initialize(assert_ok!(sqrt_price_at_tick(0)), 0));
	assert_ok!(pool.mint(&1, -100, 100, Size::Liquidity { liquidity: 1_000_000_000_000 }, 0));
	SharedPool::new(pool)
}

#[test]
fn callbacks_cannot_reenter_the_pool() {
	let pool = shared_pool();
	let before = assert_ok!(pool.query(|pool| pool.clone()));

	let nested = pool.clone();
	let error = assert_err!(pool.mutate(|inner| {
		inner.swap_with(Side::Zero, SwapAmount::ExactInput(1000.into()), None, 1, |_| {
			// Trying to pay with another swap
			nested
				.mutate(|pool| pool.swap(Side::One, SwapAmount::ExactInput(1000.into()), None, 1))
				.map(|_| ())
		})
	}));
	assert_eq!(error, SettlementError::Callback(PoolError::Locked));
	assert_eq!(assert_ok!(pool.query(|pool| pool.clone())), before);

	let nested = pool.clone();
	assert_err!(pool.mutate(|_| nested.query(|pool| pool.liquidity())), PoolError::Locked);
}

#[test]
fn pool_is_shared_between_threads() {
	let pool = shared_pool();

	let handles = (0..4u32)
		.map(|owner| {
			let pool = pool.clone();
			std::thread::spawn(move || {
				assert_ok!(pool.mutate(|pool| pool.mint(
					&(owner + 10),
					-10,
					10,
					Size::Liquidity { liquidity: 1_000 },
					1
				)));
				assert_ok!(pool.mutate(|pool| pool.swap(
					if owner % 2 == 0 { Side::Zero } else { Side::One },
					SwapAmount::ExactInput(U256::from(100)),
					None,
					1
				)));
			})
		})
		.collect::<Vec<_>>();
	for handle in handles {
		handle.join().unwrap();
	}

	assert_eq!(assert_ok!(pool.query(|pool| pool.positions().count())), 5);
}
