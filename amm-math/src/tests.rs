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

use super::*;

#[test]
fn test_mul_div_floor() {
	for (a, b, c, expected) in [
		(1u32, 1u32, 1u32, 1u32),
		(1, 1, 2, 0),
		(1, 2, 1, 2),
		(1, 2, 2, 1),
		(1, 2, 3, 0),
		(1, 3, 2, 1),
		(1, 3, 3, 1),
		(1, 3, 4, 0),
		(1, 4, 3, 1),
		(1, 5, 4, 1),
		(2, 1, 3, 0),
		(3, 1, 2, 1),
		(4, 1, 3, 1),
		(5, 1, 6, 0),
	] {
		assert_eq!(
			mul_div_floor_checked(a.into(), b.into(), U256::from(c)),
			Some(U256::from(expected))
		);
	}

	assert_eq!(mul_div_floor_checked(U256::MAX, U256::MAX, U256::MAX), Some(U256::MAX));
	assert_eq!(mul_div_floor_checked(U256::MAX, U256::MAX - 1, U256::MAX), Some(U256::MAX - 1));
}

#[test]
fn test_mul_div_ceil() {
	assert_eq!(mul_div_ceil_checked(U256::MAX, U256::MAX, U256::MAX), Some(U256::MAX));
	assert_eq!(mul_div_ceil_checked(U256::MAX, U256::MAX - 1, U256::MAX), Some(U256::MAX - 1));
	assert_eq!(mul_div_ceil_checked(2.into(), 2.into(), U256::from(3)), Some(2.into()));
	assert_eq!(mul_div_ceil_checked(2.into(), 2.into(), U256::from(4)), Some(1.into()));
	assert_eq!(mul_div_ceil_checked(2.into(), 2.into(), U256::from(5)), Some(1.into()));
	assert_eq!(mul_div_ceil_checked(0.into(), 2.into(), U256::from(5)), Some(0.into()));
}

#[test]
fn mul_div_rejects_overflow_and_zero_divisor() {
	assert_eq!(mul_div_floor_checked(U256::MAX, U256::MAX, U256::one()), None);
	assert_eq!(mul_div_ceil_checked(U256::MAX, 2.into(), U256::one()), None);
	assert_eq!(mul_div_floor_checked(1.into(), 1.into(), U256::zero()), None);

	assert_eq!(mul_div_floor(1.into(), 1.into(), U256::zero()), Err(MathError::DivisionByZero));
	assert_eq!(mul_div_ceil(U256::MAX, 2.into(), U256::one()), Err(MathError::AmountOverflow));
}

#[test]
fn test_div_rounding_up() {
	assert_eq!(div_rounding_up(7.into(), 2.into()), Ok(4.into()));
	assert_eq!(div_rounding_up(8.into(), 2.into()), Ok(4.into()));
	assert_eq!(div_rounding_up(0.into(), 2.into()), Ok(0.into()));
	assert_eq!(div_rounding_up(1.into(), 0.into()), Err(MathError::DivisionByZero));
}

#[test]
fn u160_bound() {
	assert!(fits_in_u160((U256::one() << 160) - 1));
	assert!(!fits_in_u160(U256::one() << 160));
	assert!(fits_in_u160(MAX_SQRT_PRICE));
}
