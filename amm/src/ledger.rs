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

//! Per tick and per position bookkeeping.
//!
//! Fees are tracked without touching positions during swaps. The pool keeps a global fee growth
//! per unit of liquidity, and each initialized tick remembers the fee growth on the side of it
//! away from the current price (its "outside"). Flipping that value whenever the price crosses the
//! tick keeps it correct, and the growth inside any range is then `global - below - above`. A
//! position only stores the inside growth it has already been credited for.
//!
//! All of these accumulators may wrap. Only differences are used, and those are exact modulo
//! 2^256 as long as no single position goes unpoked for a full wrap.

#[cfg(test)]
mod tests;

use codec::{Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};
use sp_core::U256;
use sp_std::collections::btree_map::BTreeMap;

use crate::{
	common::SideMap,
	math::{Amount, FeeGrowthQ128F128, Liquidity, Tick, MAX_TICK, MIN_TICK},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum LedgerError {
	/// The gross liquidity of a tick or the liquidity of a position would exceed its maximum.
	#[cfg_attr(feature = "std", error("liquidity exceeds the maximum allowed"))]
	LiquidityOverflow,
	#[cfg_attr(feature = "std", error("position does not have enough liquidity"))]
	PositionLacksLiquidity,
	#[cfg_attr(feature = "std", error("position does not exist"))]
	PositionNotFound,
	#[cfg_attr(feature = "std", error("owed amount overflowed"))]
	AmountOverflow,
}

/// The largest gross liquidity a tick may reference, such that the active liquidity cannot
/// overflow even if every usable tick is at this maximum.
///
/// `tick_spacing` must be positive.
pub fn max_liquidity_per_tick(tick_spacing: Tick) -> Liquidity {
	// Truncates towards zero, so the extreme usable ticks are inside the tick range
	let min_tick = (MIN_TICK / tick_spacing) * tick_spacing;
	let max_tick = (MAX_TICK / tick_spacing) * tick_spacing;
	let number_of_ticks = ((max_tick - min_tick) / tick_spacing) as u128 + 1;
	Liquidity::MAX / number_of_ticks
}

/// The global accumulators at the time of a ledger operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GlobalCheckpoint {
	pub tick: Tick,
	pub fee_growth_global: SideMap<FeeGrowthQ128F128>,
	pub tick_cumulative: i128,
	pub seconds_per_liquidity_cumulative_x128: U256,
	pub time: u64,
}

#[derive(
	Clone,
	Debug,
	Default,
	PartialEq,
	Eq,
	TypeInfo,
	Encode,
	Decode,
	MaxEncodedLen,
	Serialize,
	Deserialize,
)]
pub struct TickInfo {
	/// Total liquidity of all positions using this tick as a bound. The tick is initialized
	/// exactly while this is non-zero.
	pub liquidity_gross: Liquidity,
	/// Change in active liquidity when the price crosses this tick upwards.
	pub liquidity_net: i128,
	pub fee_growth_outside: SideMap<FeeGrowthQ128F128>,
	pub tick_cumulative_outside: i128,
	pub seconds_per_liquidity_outside_x128: U256,
	pub seconds_outside: u64,
	pub initialized: bool,
}

#[derive(
	Clone,
	Debug,
	Default,
	PartialEq,
	Eq,
	TypeInfo,
	Encode,
	Decode,
	MaxEncodedLen,
	Serialize,
	Deserialize,
)]
pub struct Position {
	pub liquidity: Liquidity,
	pub fee_growth_inside_last: SideMap<FeeGrowthQ128F128>,
	/// Fees and burnt liquidity credited to the owner, but not yet collected.
	pub tokens_owed: SideMap<Amount>,
}

/// The fee growth inside `lower..upper`, given the two tick records.
fn fee_growth_inside(
	lower: Tick,
	lower_info: &TickInfo,
	upper: Tick,
	upper_info: &TickInfo,
	current_tick: Tick,
	fee_growth_global: SideMap<FeeGrowthQ128F128>,
) -> SideMap<FeeGrowthQ128F128> {
	fee_growth_global.map(|side, global| {
		let below = if current_tick >= lower {
			lower_info.fee_growth_outside[side]
		} else {
			global.overflowing_sub(lower_info.fee_growth_outside[side]).0
		};
		let above = if current_tick < upper {
			upper_info.fee_growth_outside[side]
		} else {
			global.overflowing_sub(upper_info.fee_growth_outside[side]).0
		};

		global.overflowing_sub(below).0.overflowing_sub(above).0
	})
}

/// Fees earned by `liquidity` between two readings of the fee growth inside its range.
fn fees_earned(
	fee_growth_inside: FeeGrowthQ128F128,
	fee_growth_inside_last: FeeGrowthQ128F128,
	liquidity: Liquidity,
) -> Result<Amount, LedgerError> {
	// < 2^384 before the shift, so the result always fits
	(U256::full_mul(fee_growth_inside.overflowing_sub(fee_growth_inside_last).0, liquidity.into()) >>
		128)
		.try_into()
		.map_err(|_| LedgerError::AmountOverflow)
}

/// A change to the ledger that has been fully validated but not yet stored. Produced by
/// [PositionLedger::stage_update].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PositionUpdate<LiquidityProvider> {
	owner: LiquidityProvider,
	lower: Tick,
	upper: Tick,
	position: Position,
	/// `None` if the tick record doesn't change.
	lower_info: Option<TickInfo>,
	upper_info: Option<TickInfo>,
	flipped_lower: bool,
	flipped_upper: bool,
	fees_accrued: SideMap<Amount>,
}

impl<LiquidityProvider> PositionUpdate<LiquidityProvider> {
	/// The position as it will be stored.
	pub fn position(&self) -> &Position {
		&self.position
	}

	/// Fees credited to `tokens_owed` by this update.
	pub fn fees_accrued(&self) -> SideMap<Amount> {
		self.fees_accrued
	}

	/// Whether the lower and upper ticks change between initialized and uninitialized.
	pub fn flipped(&self) -> (bool, bool) {
		(self.flipped_lower, self.flipped_upper)
	}

	/// Adds `amounts` to what the position is owed, i.e. the value of burnt liquidity.
	pub fn credit(&mut self, amounts: SideMap<Amount>) -> Result<(), LedgerError> {
		self.position.tokens_owed = self
			.position
			.tokens_owed
			.zip(amounts)
			.try_map(|_, (owed, amount)| owed.checked_add(amount).ok_or(LedgerError::AmountOverflow))?;
		Ok(())
	}

	/// Takes up to `maximum` of each token from what the position is owed, and returns the amounts
	/// taken.
	pub fn collect(&mut self, maximum: SideMap<Amount>) -> SideMap<Amount> {
		let collected = self
			.position
			.tokens_owed
			.zip(maximum)
			.map(|_, (owed, maximum)| core::cmp::min(owed, maximum));
		self.position.tokens_owed = self
			.position
			.tokens_owed
			.zip(collected)
			.map(|_, (owed, collected)| owed - collected);
		collected
	}
}

/// The new state of a tick after the price crosses it. Produced by [PositionLedger::stage_cross].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickCrossing {
	tick: Tick,
	info: TickInfo,
}

impl TickCrossing {
	pub fn tick(&self) -> Tick {
		self.tick
	}

	pub fn liquidity_net(&self) -> i128 {
		self.info.liquidity_net
	}
}

#[derive(Clone, Debug, PartialEq, Eq, TypeInfo, Encode, Decode, Serialize, Deserialize)]
pub struct PositionLedger<LiquidityProvider: Ord> {
	max_liquidity_per_tick: Liquidity,
	/// Only initialized ticks are stored.
	ticks: BTreeMap<Tick, TickInfo>,
	/// Positions are never removed, even once empty.
	positions: BTreeMap<(LiquidityProvider, Tick, Tick), Position>,
}

impl<LiquidityProvider: Clone + Ord> PositionLedger<LiquidityProvider> {
	pub fn new(max_liquidity_per_tick: Liquidity) -> Self {
		Self { max_liquidity_per_tick, ticks: Default::default(), positions: Default::default() }
	}

	pub fn max_liquidity_per_tick(&self) -> Liquidity {
		self.max_liquidity_per_tick
	}

	pub fn tick(&self, tick: Tick) -> Option<&TickInfo> {
		self.ticks.get(&tick)
	}

	/// Initialized ticks in ascending order.
	pub fn ticks(&self) -> impl '_ + Iterator<Item = (Tick, &TickInfo)> {
		self.ticks.iter().map(|(tick, info)| (*tick, info))
	}

	pub fn position(
		&self,
		owner: &LiquidityProvider,
		lower: Tick,
		upper: Tick,
	) -> Option<&Position> {
		self.positions.get(&(owner.clone(), lower, upper))
	}

	pub fn positions(
		&self,
	) -> impl '_ + Iterator<Item = (&LiquidityProvider, Tick, Tick, &Position)> {
		self.positions
			.iter()
			.map(|((owner, lower, upper), position)| (owner, *lower, *upper, position))
	}

	/// The fee growth inside `lower..upper` at `current_tick`. Missing ticks are treated as never
	/// having been outside of any growth.
	pub fn fee_growth_inside(
		&self,
		lower: Tick,
		upper: Tick,
		current_tick: Tick,
		fee_growth_global: SideMap<FeeGrowthQ128F128>,
	) -> SideMap<FeeGrowthQ128F128> {
		fee_growth_inside(
			lower,
			&self.ticks.get(&lower).cloned().unwrap_or_default(),
			upper,
			&self.ticks.get(&upper).cloned().unwrap_or_default(),
			current_tick,
			fee_growth_global,
		)
	}

	/// Fees the position has earned since it was last updated.
	pub fn pending_fees(
		&self,
		owner: &LiquidityProvider,
		lower: Tick,
		upper: Tick,
		global: &GlobalCheckpoint,
	) -> Result<SideMap<Amount>, LedgerError> {
		let position =
			self.position(owner, lower, upper).ok_or(LedgerError::PositionNotFound)?;
		self.fee_growth_inside(lower, upper, global.tick, global.fee_growth_global)
			.zip(position.fee_growth_inside_last)
			.try_map(|_, (inside, inside_last)| fees_earned(inside, inside_last, position.liquidity))
	}

	fn stage_tick(
		&self,
		tick: Tick,
		liquidity_delta: i128,
		upper: bool,
		global: &GlobalCheckpoint,
	) -> Result<(TickInfo, bool), LedgerError> {
		let mut info = self.ticks.get(&tick).cloned().unwrap_or_default();

		let liquidity_gross_before = info.liquidity_gross;
		let liquidity_gross_after = if liquidity_delta < 0 {
			liquidity_gross_before
				.checked_sub(liquidity_delta.unsigned_abs())
				.ok_or(LedgerError::PositionLacksLiquidity)?
		} else {
			liquidity_gross_before
				.checked_add(liquidity_delta.unsigned_abs())
				.ok_or(LedgerError::LiquidityOverflow)?
		};
		if liquidity_gross_after > self.max_liquidity_per_tick {
			return Err(LedgerError::LiquidityOverflow)
		}

		if liquidity_gross_before == 0 {
			// By convention all growth before a tick was initialized happened below it
			if tick <= global.tick {
				info.fee_growth_outside = global.fee_growth_global;
				info.seconds_per_liquidity_outside_x128 =
					global.seconds_per_liquidity_cumulative_x128;
				info.tick_cumulative_outside = global.tick_cumulative;
				info.seconds_outside = global.time;
			}
			info.initialized = true;
		}

		info.liquidity_gross = liquidity_gross_after;
		// Leaving the range from the upper tick upwards removes the liquidity
		info.liquidity_net = if upper {
			info.liquidity_net.checked_sub(liquidity_delta)
		} else {
			info.liquidity_net.checked_add(liquidity_delta)
		}
		.ok_or(LedgerError::LiquidityOverflow)?;

		Ok((info, (liquidity_gross_after == 0) != (liquidity_gross_before == 0)))
	}

	/// Validates a change to a position's liquidity, and computes the fees the position earned
	/// since it was last updated. Nothing is stored until [Self::apply] is called.
	///
	/// A position is created on its first positive update. Updating a position that doesn't exist
	/// with zero or negative liquidity fails. A zero update of an empty position changes nothing.
	///
	/// This function never panics
	pub fn stage_update(
		&self,
		owner: &LiquidityProvider,
		lower: Tick,
		upper: Tick,
		liquidity_delta: i128,
		global: &GlobalCheckpoint,
	) -> Result<PositionUpdate<LiquidityProvider>, LedgerError> {
		let position = match self.position(owner, lower, upper) {
			Some(position) => position.clone(),
			None if liquidity_delta > 0 => Position::default(),
			None => return Err(LedgerError::PositionNotFound),
		};

		let no_change = |position: Position| PositionUpdate {
			owner: owner.clone(),
			lower,
			upper,
			position,
			lower_info: None,
			upper_info: None,
			flipped_lower: false,
			flipped_upper: false,
			fees_accrued: Default::default(),
		};

		if liquidity_delta == 0 && position.liquidity == 0 {
			return Ok(no_change(position))
		}

		let (lower_info, flipped_lower, upper_info, flipped_upper) = if liquidity_delta != 0 {
			let (lower_info, flipped_lower) = self.stage_tick(lower, liquidity_delta, false, global)?;
			let (upper_info, flipped_upper) = self.stage_tick(upper, liquidity_delta, true, global)?;
			(Some(lower_info), flipped_lower, Some(upper_info), flipped_upper)
		} else {
			(None, false, None, false)
		};

		let fee_growth_inside = fee_growth_inside(
			lower,
			&lower_info.clone().or_else(|| self.ticks.get(&lower).cloned()).unwrap_or_default(),
			upper,
			&upper_info.clone().or_else(|| self.ticks.get(&upper).cloned()).unwrap_or_default(),
			global.tick,
			global.fee_growth_global,
		);

		let fees_accrued = fee_growth_inside
			.zip(position.fee_growth_inside_last)
			.try_map(|_, (inside, inside_last)| fees_earned(inside, inside_last, position.liquidity))?;

		let liquidity = if liquidity_delta < 0 {
			position
				.liquidity
				.checked_sub(liquidity_delta.unsigned_abs())
				.ok_or(LedgerError::PositionLacksLiquidity)?
		} else {
			position
				.liquidity
				.checked_add(liquidity_delta.unsigned_abs())
				.ok_or(LedgerError::LiquidityOverflow)?
		};

		let tokens_owed = position
			.tokens_owed
			.zip(fees_accrued)
			.try_map(|_, (owed, fees)| owed.checked_add(fees).ok_or(LedgerError::AmountOverflow))?;

		Ok(PositionUpdate {
			lower_info,
			upper_info,
			flipped_lower,
			flipped_upper,
			fees_accrued,
			..no_change(Position { liquidity, fee_growth_inside_last: fee_growth_inside, tokens_owed })
		})
	}

	/// Stores a staged update. Ticks that no longer have any liquidity referencing them are
	/// removed.
	pub fn apply(&mut self, update: PositionUpdate<LiquidityProvider>) {
		for (tick, info) in [(update.lower, update.lower_info), (update.upper, update.upper_info)] {
			match info {
				Some(info) if info.liquidity_gross == 0 => {
					self.ticks.remove(&tick);
				},
				Some(info) => {
					self.ticks.insert(tick, info);
				},
				None => {},
			}
		}
		self.positions.insert((update.owner, update.lower, update.upper), update.position);
	}

	/// Changes a position's liquidity and credits it with the fees it has earned. Returns the
	/// fees credited, and whether each bound flipped between initialized and uninitialized.
	pub fn update_position(
		&mut self,
		owner: &LiquidityProvider,
		lower: Tick,
		upper: Tick,
		liquidity_delta: i128,
		global: &GlobalCheckpoint,
	) -> Result<(SideMap<Amount>, (bool, bool)), LedgerError> {
		let update = self.stage_update(owner, lower, upper, liquidity_delta, global)?;
		let result = (update.fees_accrued(), update.flipped());
		self.apply(update);
		Ok(result)
	}

	/// The state of an initialized tick once the price has crossed it, or `None` if the tick is not
	/// initialized.
	pub fn stage_cross(&self, tick: Tick, global: &GlobalCheckpoint) -> Option<TickCrossing> {
		self.ticks.get(&tick).map(|info| TickCrossing {
			tick,
			info: TickInfo {
				fee_growth_outside: global
					.fee_growth_global
					.zip(info.fee_growth_outside)
					.map(|_, (global, outside)| global.overflowing_sub(outside).0),
				seconds_per_liquidity_outside_x128: global
					.seconds_per_liquidity_cumulative_x128
					.overflowing_sub(info.seconds_per_liquidity_outside_x128)
					.0,
				tick_cumulative_outside: global
					.tick_cumulative
					.wrapping_sub(info.tick_cumulative_outside),
				seconds_outside: global.time.wrapping_sub(info.seconds_outside),
				..info.clone()
			},
		})
	}

	pub fn apply_cross(&mut self, crossing: TickCrossing) {
		if let Some(info) = self.ticks.get_mut(&crossing.tick) {
			*info = crossing.info;
		}
	}

	/// Flips the outside values of an initialized tick as the price crosses it. Returns the tick's
	/// net liquidity, or zero if it isn't initialized.
	pub fn cross(&mut self, tick: Tick, global: &GlobalCheckpoint) -> i128 {
		match self.stage_cross(tick, global) {
			Some(crossing) => {
				let liquidity_net = crossing.liquidity_net();
				self.apply_cross(crossing);
				liquidity_net
			},
			None => 0,
		}
	}
}
