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

use codec::{Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};

use crate::math::{SqrtPriceQ64F96, Tick, MAX_SQRT_PRICE, MAX_TICK, MIN_SQRT_PRICE, MIN_TICK};

/// One of the two tokens of a pool. `Zero` is the token the price is denominated against, i.e.
/// price is the amount of token one per unit of token zero.
#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	PartialOrd,
	Ord,
	Encode,
	Decode,
	MaxEncodedLen,
	TypeInfo,
	Serialize,
	Deserialize,
)]
pub enum Side {
	Zero,
	One,
}

impl core::ops::Not for Side {
	type Output = Self;

	fn not(self) -> Self::Output {
		match self {
			Side::Zero => Side::One,
			Side::One => Side::Zero,
		}
	}
}

/// A value per token, indexed by [Side].
#[derive(
	Copy,
	Clone,
	Default,
	Debug,
	TypeInfo,
	PartialEq,
	Eq,
	Encode,
	Decode,
	MaxEncodedLen,
	Serialize,
	Deserialize,
)]
pub struct SideMap<T>([T; 2]);

impl Side {
	const ALL: [Side; 2] = [Side::Zero, Side::One];

	fn index(self) -> usize {
		self as usize
	}
}

impl<T> SideMap<T> {
	/// `[token0, token1]`
	pub fn from_array(array: [T; 2]) -> Self {
		Self(array)
	}

	pub fn into_array(self) -> [T; 2] {
		self.0
	}

	pub fn map<R>(self, mut f: impl FnMut(Side, T) -> R) -> SideMap<R> {
		let [zero, one] = self.0;
		SideMap([f(Side::Zero, zero), f(Side::One, one)])
	}

	/// Stops at the first error, token0 first.
	pub fn try_map<R, E>(
		self,
		mut f: impl FnMut(Side, T) -> Result<R, E>,
	) -> Result<SideMap<R>, E> {
		let [zero, one] = self.0;
		Ok(SideMap([f(Side::Zero, zero)?, f(Side::One, one)?]))
	}

	pub fn zip<R>(self, other: SideMap<R>) -> SideMap<(T, R)> {
		let ([zero, one], [other_zero, other_one]) = (self.0, other.0);
		SideMap([(zero, other_zero), (one, other_one)])
	}

	pub fn iter(&self) -> impl '_ + Iterator<Item = (Side, &T)> {
		Side::ALL.into_iter().zip(self.0.iter())
	}
}

impl<T> core::ops::Index<Side> for SideMap<T> {
	type Output = T;

	fn index(&self, side: Side) -> &T {
		&self.0[side.index()]
	}
}

impl<T> core::ops::IndexMut<Side> for SideMap<T> {
	fn index_mut(&mut self, side: Side) -> &mut T {
		&mut self.0[side.index()]
	}
}

#[cfg(test)]
impl<T: core::ops::Add<R>, R> core::ops::Add<SideMap<R>> for SideMap<T> {
	type Output = SideMap<<T as core::ops::Add<R>>::Output>;

	fn add(self, rhs: SideMap<R>) -> Self::Output {
		self.zip(rhs).map(|_, (a, b)| a + b)
	}
}

/// Token zero is sold, the price moves down.
pub struct ZeroToOne {}
/// Token one is sold, the price moves up.
pub struct OneToZero {}

pub trait SwapDirection {
	const INPUT_SIDE: Side;

	/// `true` if the price moves down in this direction.
	const ZERO_FOR_ONE: bool;

	/// The furthest price a swap without an explicit limit may move to. One step inside the valid
	/// sqrt price range.
	const UNRESTRICTED_SQRT_PRICE_LIMIT: SqrtPriceQ64F96;

	/// `true` if `sqrt_price` lies strictly past `reference` when moving in this direction.
	fn is_beyond(sqrt_price: SqrtPriceQ64F96, reference: SqrtPriceQ64F96) -> bool;

	/// Change in active liquidity when crossing a tick with the given net liquidity.
	fn liquidity_change_when_crossing(liquidity_net: i128) -> i128;

	/// The pool's tick once `tick` has been crossed. Moving down leaves the price below `tick`.
	fn tick_after_crossing(tick: Tick) -> Tick;

	/// Keeps word boundary ticks returned by the tick bitmap inside the valid tick range.
	fn clamp_tick(tick: Tick) -> Tick;
}
impl SwapDirection for ZeroToOne {
	const INPUT_SIDE: Side = Side::Zero;
	const ZERO_FOR_ONE: bool = true;
	const UNRESTRICTED_SQRT_PRICE_LIMIT: SqrtPriceQ64F96 =
		sp_core::U256([MIN_SQRT_PRICE.0[0] + 1, 0, 0, 0]);

	fn is_beyond(sqrt_price: SqrtPriceQ64F96, reference: SqrtPriceQ64F96) -> bool {
		sqrt_price < reference
	}

	fn liquidity_change_when_crossing(liquidity_net: i128) -> i128 {
		-liquidity_net
	}

	fn tick_after_crossing(tick: Tick) -> Tick {
		tick - 1
	}

	fn clamp_tick(tick: Tick) -> Tick {
		core::cmp::max(tick, MIN_TICK)
	}
}
impl SwapDirection for OneToZero {
	const INPUT_SIDE: Side = Side::One;
	const ZERO_FOR_ONE: bool = false;
	const UNRESTRICTED_SQRT_PRICE_LIMIT: SqrtPriceQ64F96 = sp_core::U256([
		MAX_SQRT_PRICE.0[0] - 1,
		MAX_SQRT_PRICE.0[1],
		MAX_SQRT_PRICE.0[2],
		MAX_SQRT_PRICE.0[3],
	]);

	fn is_beyond(sqrt_price: SqrtPriceQ64F96, reference: SqrtPriceQ64F96) -> bool {
		sqrt_price > reference
	}

	fn liquidity_change_when_crossing(liquidity_net: i128) -> i128 {
		liquidity_net
	}

	fn tick_after_crossing(tick: Tick) -> Tick {
		tick
	}

	fn clamp_tick(tick: Tick) -> Tick {
		core::cmp::min(tick, MAX_TICK)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use sp_core::U256;

	#[test]
	fn unrestricted_limits_are_one_step_inside_the_price_range() {
		assert_eq!(ZeroToOne::UNRESTRICTED_SQRT_PRICE_LIMIT, MIN_SQRT_PRICE + 1);
		assert_eq!(OneToZero::UNRESTRICTED_SQRT_PRICE_LIMIT, MAX_SQRT_PRICE - 1);
	}

	#[test]
	fn side_map_indexing() {
		let mut map = SideMap::from_array([U256::from(1), U256::from(2)]);
		map[Side::One] += U256::from(3);
		assert_eq!(map[Side::Zero], U256::from(1));
		assert_eq!(map[!Side::Zero], U256::from(5));
		assert_eq!(
			map.map(|side, value| (side, value.low_u32())),
			SideMap::from_array([(Side::Zero, 1), (Side::One, 5)])
		);
		assert_eq!(
			map + SideMap::from_array([U256::one(), U256::one()]),
			SideMap::from_array([2.into(), 6.into()])
		);
		assert_eq!(
			map.iter().map(|(side, value)| (side, value.low_u32())).collect::<Vec<_>>(),
			vec![(Side::Zero, 1), (Side::One, 5)]
		);
	}
}
