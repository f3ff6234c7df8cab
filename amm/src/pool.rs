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

//! A concentrated liquidity pool, following Uniswap v3's `UniswapV3Pool`:
//! https://github.com/Uniswap/v3-core/blob/main/contracts/UniswapV3Pool.sol
//!
//! Every mutator runs in two phases. First everything the operation will change is computed from
//! the current state without touching it, then the token amounts are settled through the caller's
//! callback, and only if that succeeds are the changes stored. So an operation that returns an
//! error has not changed the pool.
//!
//! The differences to Uniswap are:
//!  - Collecting a position's owed tokens also credits it with fees earned since it was last
//!    touched.
//!  - A swap's price limit is optional, without one the price may move to one step inside the
//!    valid price range.
//!  - Owed amounts and protocol fees are 256 bit, and never wrap.


use core::convert::Infallible;

use codec::{Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};
use sp_core::U256;
use sp_std::vec::Vec;

use crate::{
	common::{OneToZero, Side, SideMap, SwapDirection, ZeroToOne},
	config::{CircuitBreaker, PoolConfig, PoolParameters, ProtocolFee},
	error::{PoolError, SettlementError},
	ledger::{GlobalCheckpoint, PositionLedger, PositionUpdate, TickCrossing, TickInfo},
	math::{
		amount0_delta, amount0_delta_signed, amount1_delta, amount1_delta_signed,
		compute_swap_step, liquidity_for_amounts, mul_div_floor_checked, sqrt_price_at_tick,
		tick_at_sqrt_price, Amount, AmountDelta, FeeGrowthQ128F128, Liquidity, MathError,
		SqrtPriceQ64F96, SwapAmount, Tick, MAX_SQRT_PRICE, MAX_TICK, MIN_SQRT_PRICE, MIN_TICK,
	},
	oracle::{Observatory, PendingWrite},
	tick_bitmap::TickBitmap,
};

#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	Encode,
	Decode,
	MaxEncodedLen,
	TypeInfo,
	Serialize,
	Deserialize,
)]
pub enum PoolStatus {
	/// Created, but no price has been set.
	Uninitialized,
	Active,
	/// An operation is in progress.
	Locked,
}

/// The frequently read price and oracle state.
#[derive(
	Debug,
	Clone,
	Copy,
	Default,
	PartialEq,
	Eq,
	Encode,
	Decode,
	MaxEncodedLen,
	TypeInfo,
	Serialize,
	Deserialize,
)]
pub struct Slot0 {
	pub sqrt_price: SqrtPriceQ64F96,
	/// Always `tick_at_sqrt_price(sqrt_price)`, except after a swap ends exactly on an initialized
	/// tick moving down, in which case it is one less.
	pub tick: Tick,
	pub observation_index: u16,
	pub observation_cardinality: u16,
	pub observation_cardinality_next: u16,
	pub fee_protocol: ProtocolFee,
}

/// A consistent view of the pool's top level state.
#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	Encode,
	Decode,
	MaxEncodedLen,
	TypeInfo,
	Serialize,
	Deserialize,
)]
pub struct PoolSnapshot {
	pub slot0: Slot0,
	pub status: PoolStatus,
	pub liquidity: Liquidity,
	pub circuit_breaker: Option<CircuitBreaker>,
}

impl PoolSnapshot {
	pub fn unlocked(&self) -> bool {
		self.status == PoolStatus::Active
	}
}

/// How much liquidity to mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, MaxEncodedLen, TypeInfo)]
pub enum Size {
	Liquidity { liquidity: Liquidity },
	/// The most liquidity `maximum` can pay for, provided that liquidity requires at least
	/// `minimum` of both tokens.
	Amount { maximum: SideMap<Amount>, minimum: SideMap<Amount> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode, MaxEncodedLen, TypeInfo)]
pub struct MintOutcome {
	pub liquidity: Liquidity,
	/// Paid to the pool.
	pub amounts: SideMap<Amount>,
	/// Fees credited to the position, because its fee accounting was brought up to date.
	pub fees_accrued: SideMap<Amount>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode, MaxEncodedLen, TypeInfo)]
pub struct BurnOutcome {
	pub liquidity: Liquidity,
	/// The value of the burnt liquidity, credited to the position's owed amounts.
	pub amounts: SideMap<Amount>,
	pub fees_accrued: SideMap<Amount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, MaxEncodedLen, TypeInfo)]
pub struct SwapOutcome {
	pub input_side: Side,
	/// Paid to the pool, including the fee.
	pub amount_in: Amount,
	/// Paid by the pool.
	pub amount_out: Amount,
	/// The part of the fee that went to liquidity providers.
	pub lp_fee: Amount,
	pub protocol_fee: Amount,
	pub sqrt_price: SqrtPriceQ64F96,
	pub tick: Tick,
	pub liquidity: Liquidity,
	pub ticks_crossed: u32,
}

impl SwapOutcome {
	/// The change in each token from the pool's point of view.
	pub fn deltas(&self) -> SideMap<AmountDelta> {
		let mut deltas = SideMap::<AmountDelta>::default();
		deltas[self.input_side] = AmountDelta::In(self.amount_in);
		deltas[!self.input_side] = AmountDelta::Out(self.amount_out);
		deltas
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, MaxEncodedLen, TypeInfo)]
pub struct PositionInfo {
	pub liquidity: Liquidity,
	pub fee_growth_inside_last: SideMap<FeeGrowthQ128F128>,
	/// Includes fees earned but not yet credited to the position.
	pub tokens_owed: SideMap<Amount>,
}

struct StagedLiquidityChange<LiquidityProvider> {
	update: PositionUpdate<LiquidityProvider>,
	tick_bitmap: Option<TickBitmap>,
	amounts: SideMap<Amount>,
	liquidity: Liquidity,
	oracle_write: Option<PendingWrite>,
}

struct StagedSwap {
	outcome: SwapOutcome,
	fee_growth_global: FeeGrowthQ128F128,
	protocol_fees: Amount,
	crossings: Vec<TickCrossing>,
	oracle_write: Option<PendingWrite>,
}

#[derive(Clone, Debug, PartialEq, Eq, TypeInfo, Encode, Decode, Serialize, Deserialize)]
pub struct Pool<LiquidityProvider: Ord> {
	parameters: PoolParameters,
	status: PoolStatus,
	slot0: Slot0,
	/// The liquidity of all positions whose range contains the current tick.
	liquidity: Liquidity,
	fee_growth_global: SideMap<FeeGrowthQ128F128>,
	protocol_fees: SideMap<Amount>,
	circuit_breaker: Option<CircuitBreaker>,
	tick_bitmap: TickBitmap,
	ledger: PositionLedger<LiquidityProvider>,
	observatory: Observatory,
}

impl<LiquidityProvider: Clone + Ord + core::fmt::Debug> Pool<LiquidityProvider> {
	/// Creates an uninitialized pool.
	///
	/// This function never panics
	pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
		let parameters = config.parameters()?;
		Ok(Self {
			parameters,
			status: PoolStatus::Uninitialized,
			slot0: Slot0 {
				observation_cardinality_next: config.observation_cardinality_next,
				fee_protocol: config.protocol_fee,
				..Default::default()
			},
			liquidity: 0,
			fee_growth_global: Default::default(),
			protocol_fees: Default::default(),
			circuit_breaker: config.circuit_breaker,
			tick_bitmap: TickBitmap::new(),
			ledger: PositionLedger::new(parameters.max_liquidity_per_tick),
			observatory: Observatory::new(),
		})
	}

	/// Sets the initial price, after which the pool accepts operations.
	///
	/// This function never panics
	pub fn initialize(&mut self, sqrt_price: SqrtPriceQ64F96, now: u64) -> Result<(), PoolError> {
		if self.status != PoolStatus::Uninitialized {
			return Err(PoolError::AlreadyInitialized)
		}
		let tick = tick_at_sqrt_price(sqrt_price)?;

		let mut observatory = self.observatory.clone();
		let (cardinality, cardinality_next) = observatory.initialize(now)?;
		let cardinality_next =
			observatory.grow(cardinality_next, self.slot0.observation_cardinality_next)?;

		self.observatory = observatory;
		self.slot0 = Slot0 {
			sqrt_price,
			tick,
			observation_index: 0,
			observation_cardinality: cardinality,
			observation_cardinality_next: cardinality_next,
			fee_protocol: self.slot0.fee_protocol,
		};
		self.status = PoolStatus::Active;

		log::info!("Initialized pool at tick {} with parameters {:?}", tick, self.parameters);

		Ok(())
	}

	/// Runs `f` with the pool locked. Fails if the pool isn't active.
	fn locked<R, E: From<PoolError>>(
		&mut self,
		f: impl FnOnce(&mut Self) -> Result<R, E>,
	) -> Result<R, E> {
		match self.status {
			PoolStatus::Uninitialized => return Err(PoolError::NotInitialized.into()),
			PoolStatus::Locked => return Err(PoolError::Locked.into()),
			PoolStatus::Active => {},
		}
		self.status = PoolStatus::Locked;
		let result = f(self);
		self.status = PoolStatus::Active;
		result
	}

	fn ensure_initialized(&self) -> Result<(), PoolError> {
		if self.status == PoolStatus::Uninitialized {
			Err(PoolError::NotInitialized)
		} else {
			Ok(())
		}
	}

	fn validate_range(&self, lower: Tick, upper: Tick) -> Result<(), PoolError> {
		if !(MIN_TICK <= lower && lower < upper && upper <= MAX_TICK) {
			return Err(PoolError::InvalidTickRange)
		}
		if lower % self.parameters.tick_spacing != 0 || upper % self.parameters.tick_spacing != 0 {
			return Err(PoolError::MisalignedTick)
		}
		Ok(())
	}

	/// The global state a position update sees. Fee accrual for an unchanged liquidity doesn't
	/// need the oracle values.
	fn fee_checkpoint(&self) -> GlobalCheckpoint {
		GlobalCheckpoint {
			tick: self.slot0.tick,
			fee_growth_global: self.fee_growth_global,
			..Default::default()
		}
	}

	fn checkpoint(&self, now: u64) -> Result<GlobalCheckpoint, PoolError> {
		let (tick_cumulative, seconds_per_liquidity_cumulative_x128) =
			self.observatory.observe_single(
				now,
				0,
				self.slot0.tick,
				self.slot0.observation_index,
				self.liquidity,
				self.slot0.observation_cardinality,
			)?;
		Ok(GlobalCheckpoint {
			tick: self.slot0.tick,
			fee_growth_global: self.fee_growth_global,
			tick_cumulative,
			seconds_per_liquidity_cumulative_x128,
			time: now,
		})
	}

	/// The amounts of each token a change in liquidity over `lower..upper` pays (positive) or
	/// returns (negative), at the current price.
	fn amounts_for_liquidity_delta(
		&self,
		lower: Tick,
		upper: Tick,
		liquidity_delta: i128,
	) -> Result<SideMap<Amount>, PoolError> {
		let sqrt_price_lower = sqrt_price_at_tick(lower)?;
		let sqrt_price_upper = sqrt_price_at_tick(upper)?;

		let (amount0, amount1) = if self.slot0.tick < lower {
			(
				amount0_delta_signed(sqrt_price_lower, sqrt_price_upper, liquidity_delta)?,
				AmountDelta::default(),
			)
		} else if self.slot0.tick < upper {
			(
				amount0_delta_signed(self.slot0.sqrt_price, sqrt_price_upper, liquidity_delta)?,
				amount1_delta_signed(sqrt_price_lower, self.slot0.sqrt_price, liquidity_delta)?,
			)
		} else {
			(
				AmountDelta::default(),
				amount1_delta_signed(sqrt_price_lower, sqrt_price_upper, liquidity_delta)?,
			)
		};

		Ok(SideMap::from_array([amount0.magnitude(), amount1.magnitude()]))
	}

	fn size_as_liquidity(&self, lower: Tick, upper: Tick, size: Size) -> Result<Liquidity, PoolError> {
		match size {
			Size::Liquidity { liquidity } => Ok(liquidity),
			Size::Amount { maximum, minimum } => {
				let liquidity = liquidity_for_amounts(
					self.slot0.sqrt_price,
					sqrt_price_at_tick(lower)?,
					sqrt_price_at_tick(upper)?,
					maximum[Side::Zero],
					maximum[Side::One],
				);

				let possible = self.liquidity_to_amounts(liquidity, lower, upper, false)?;

				if possible[Side::Zero] < minimum[Side::Zero] ||
					possible[Side::One] < minimum[Side::One]
				{
					Err(PoolError::AssetRatioUnachievable)
				} else {
					Ok(liquidity)
				}
			},
		}
	}

	/// Computes everything a change to a position's liquidity would store.
	fn stage_liquidity_change(
		&self,
		owner: &LiquidityProvider,
		lower: Tick,
		upper: Tick,
		liquidity_delta: i128,
		now: u64,
	) -> Result<StagedLiquidityChange<LiquidityProvider>, PoolError> {
		let global = self.checkpoint(now)?;
		let update = self.ledger.stage_update(owner, lower, upper, liquidity_delta, &global)?;

		let tick_bitmap = match update.flipped() {
			(false, false) => None,
			(flipped_lower, flipped_upper) => {
				let mut tick_bitmap = self.tick_bitmap.clone();
				for (tick, flipped) in [(lower, flipped_lower), (upper, flipped_upper)] {
					if flipped {
						tick_bitmap.flip_tick(tick, self.parameters.tick_spacing)?;
					}
				}
				Some(tick_bitmap)
			},
		};

		let amounts = self.amounts_for_liquidity_delta(lower, upper, liquidity_delta)?;

		let (liquidity, oracle_write) = if liquidity_delta != 0 &&
			lower <= self.slot0.tick &&
			self.slot0.tick < upper
		{
			(
				if liquidity_delta < 0 {
					self.liquidity
						.checked_sub(liquidity_delta.unsigned_abs())
						.ok_or(PoolError::PositionLacksLiquidity)?
				} else {
					self.liquidity
						.checked_add(liquidity_delta.unsigned_abs())
						.ok_or(PoolError::LiquidityOverflow)?
				},
				// Records the liquidity in effect until now
				self.observatory.prepare_write(
					self.slot0.observation_index,
					now,
					self.slot0.tick,
					self.liquidity,
					self.slot0.observation_cardinality,
					self.slot0.observation_cardinality_next,
				)?,
			)
		} else {
			(self.liquidity, None)
		};

		Ok(StagedLiquidityChange { update, tick_bitmap, amounts, liquidity, oracle_write })
	}

	fn apply_liquidity_change(&mut self, staged: StagedLiquidityChange<LiquidityProvider>) {
		self.ledger.apply(staged.update);
		if let Some(tick_bitmap) = staged.tick_bitmap {
			self.tick_bitmap = tick_bitmap;
		}
		self.liquidity = staged.liquidity;
		if let Some(oracle_write) = staged.oracle_write {
			self.apply_oracle_write(oracle_write);
		}
	}

	fn apply_oracle_write(&mut self, oracle_write: PendingWrite) {
		let (index, cardinality) = self.observatory.apply(oracle_write);
		self.slot0.observation_index = index;
		self.slot0.observation_cardinality = cardinality;
	}

	/// Adds liquidity to the position of `owner` over `lower..upper`, creating it if needed. The
	/// amounts owed to the pool are passed to `settle`, and the liquidity is only added if it
	/// succeeds.
	///
	/// This function never panics
	pub fn mint_with<T, E>(
		&mut self,
		owner: &LiquidityProvider,
		lower: Tick,
		upper: Tick,
		size: Size,
		now: u64,
		settle: impl FnOnce(SideMap<Amount>) -> Result<T, E>,
	) -> Result<(T, MintOutcome), SettlementError<E>> {
		self.locked(|pool| {
			pool.validate_range(lower, upper)?;
			let liquidity = pool.size_as_liquidity(lower, upper, size)?;
			if liquidity == 0 {
				return Err(PoolError::ZeroLiquidity.into())
			}
			let liquidity_delta =
				i128::try_from(liquidity).map_err(|_| PoolError::LiquidityOverflow)?;

			let staged = pool.stage_liquidity_change(owner, lower, upper, liquidity_delta, now)?;
			let outcome = MintOutcome {
				liquidity,
				amounts: staged.amounts,
				fees_accrued: staged.update.fees_accrued(),
			};

			let t = settle(staged.amounts).map_err(SettlementError::Callback)?;
			pool.apply_liquidity_change(staged);

			log::debug!(
				"Minted {} liquidity for {:?} over {}..{}, paid {:?}",
				liquidity,
				owner,
				lower,
				upper,
				outcome.amounts
			);

			Ok((t, outcome))
		})
	}

	pub fn mint(
		&mut self,
		owner: &LiquidityProvider,
		lower: Tick,
		upper: Tick,
		size: Size,
		now: u64,
	) -> Result<MintOutcome, PoolError> {
		self.mint_with(owner, lower, upper, size, now, |_| Result::<(), Infallible>::Ok(()))
			.map(|((), outcome)| outcome)
			.map_err(Into::into)
	}

	/// Removes liquidity from a position. The value of the liquidity is not paid out, but added to
	/// the position's owed amounts, to be taken with [Self::collect_with]. Burning zero liquidity
	/// only credits the position with the fees it has earned.
	///
	/// This function never panics
	pub fn burn(
		&mut self,
		owner: &LiquidityProvider,
		lower: Tick,
		upper: Tick,
		liquidity: Liquidity,
		now: u64,
	) -> Result<BurnOutcome, PoolError> {
		self.locked(|pool| {
			pool.validate_range(lower, upper)?;
			let liquidity_delta =
				i128::try_from(liquidity).map_err(|_| PoolError::PositionLacksLiquidity)?;

			let mut staged = pool.stage_liquidity_change(owner, lower, upper, -liquidity_delta, now)?;
			staged.update.credit(staged.amounts)?;
			let outcome = BurnOutcome {
				liquidity,
				amounts: staged.amounts,
				fees_accrued: staged.update.fees_accrued(),
			};
			pool.apply_liquidity_change(staged);

			log::debug!(
				"Burnt {} liquidity for {:?} over {}..{}, owed {:?}",
				liquidity,
				owner,
				lower,
				upper,
				outcome.amounts
			);

			Ok(outcome)
		})
	}

	/// Pays out up to `maximum` of what a position is owed, after crediting it with the fees it has
	/// earned. The amounts are passed to `settle`, and nothing changes unless it succeeds.
	///
	/// This function never panics
	pub fn collect_with<T, E>(
		&mut self,
		owner: &LiquidityProvider,
		lower: Tick,
		upper: Tick,
		maximum: SideMap<Amount>,
		settle: impl FnOnce(SideMap<Amount>) -> Result<T, E>,
	) -> Result<(T, SideMap<Amount>), SettlementError<E>> {
		self.locked(|pool| {
			pool.validate_range(lower, upper)?;

			let mut update = pool
				.ledger
				.stage_update(owner, lower, upper, 0, &pool.fee_checkpoint())
				.map_err(PoolError::from)?;
			let collected = update.collect(maximum);

			let t = settle(collected).map_err(SettlementError::Callback)?;
			pool.ledger.apply(update);

			log::debug!("Collected {:?} for {:?} over {}..{}", collected, owner, lower, upper);

			Ok((t, collected))
		})
	}

	pub fn collect(
		&mut self,
		owner: &LiquidityProvider,
		lower: Tick,
		upper: Tick,
		maximum: SideMap<Amount>,
	) -> Result<SideMap<Amount>, PoolError> {
		self.collect_with(owner, lower, upper, maximum, |_| Result::<(), Infallible>::Ok(()))
			.map(|((), collected)| collected)
			.map_err(Into::into)
	}

	/// Swaps `input_side` for the other token, moving the price at most to `sqrt_price_limit`. The
	/// outcome is passed to `settle`, and the swap only takes effect if it succeeds.
	///
	/// This function never panics
	pub fn swap_with<T, E>(
		&mut self,
		input_side: Side,
		amount: SwapAmount,
		sqrt_price_limit: Option<SqrtPriceQ64F96>,
		now: u64,
		settle: impl FnOnce(&SwapOutcome) -> Result<T, E>,
	) -> Result<(T, SwapOutcome), SettlementError<E>> {
		self.locked(|pool| {
			let tick_before = pool.slot0.tick;
			let staged = match input_side {
				Side::Zero => pool.stage_swap::<ZeroToOne>(amount, sqrt_price_limit, now),
				Side::One => pool.stage_swap::<OneToZero>(amount, sqrt_price_limit, now),
			}?;

			let t = settle(&staged.outcome).map_err(SettlementError::Callback)?;
			let outcome = pool.apply_swap(staged);

			log::debug!(
				"Swapped {} of token {:?} for {}, tick {} -> {}",
				outcome.amount_in,
				input_side,
				outcome.amount_out,
				tick_before,
				outcome.tick,
			);

			Ok((t, outcome))
		})
	}

	pub fn swap(
		&mut self,
		input_side: Side,
		amount: SwapAmount,
		sqrt_price_limit: Option<SqrtPriceQ64F96>,
		now: u64,
	) -> Result<SwapOutcome, PoolError> {
		self.swap_with(input_side, amount, sqrt_price_limit, now, |_| {
			Result::<(), Infallible>::Ok(())
		})
		.map(|((), outcome)| outcome)
		.map_err(Into::into)
	}

	/// Computes the whole swap without changing the pool. Ticks are crossed at most once, as the
	/// price only moves in one direction.
	fn stage_swap<SD: SwapDirection>(
		&self,
		amount_specified: SwapAmount,
		sqrt_price_limit: Option<SqrtPriceQ64F96>,
		now: u64,
	) -> Result<StagedSwap, PoolError> {
		if amount_specified.amount().is_zero() {
			return Err(PoolError::ZeroAmountSpecified)
		}

		let sqrt_price_limit = match sqrt_price_limit {
			Some(limit) if MIN_SQRT_PRICE < limit && limit < MAX_SQRT_PRICE => limit,
			Some(_) => return Err(PoolError::PriceLimitOutOfRange),
			None => SD::UNRESTRICTED_SQRT_PRICE_LIMIT,
		};
		if !SD::is_beyond(sqrt_price_limit, self.slot0.sqrt_price) {
			return Err(PoolError::PriceLimitOnWrongSide)
		}

		let fee_protocol = self.slot0.fee_protocol.denominator(SD::INPUT_SIDE);

		let mut amount_remaining = amount_specified.amount();
		let mut amount_in = Amount::zero();
		let mut amount_out = Amount::zero();
		let mut lp_fee = Amount::zero();
		let mut protocol_fee = Amount::zero();
		let mut sqrt_price = self.slot0.sqrt_price;
		let mut tick = self.slot0.tick;
		let mut liquidity = self.liquidity;
		let mut fee_growth_global = self.fee_growth_global;
		let mut crossings = Vec::new();
		// Only read from the oracle once a tick is crossed
		let mut cumulatives: Option<(i128, U256)> = None;

		while !amount_remaining.is_zero() && sqrt_price != sqrt_price_limit {
			let (tick_next, initialized) = self.tick_bitmap.next_initialized_tick_within_one_word(
				tick,
				self.parameters.tick_spacing,
				SD::ZERO_FOR_ONE,
			);
			let tick_next = SD::clamp_tick(tick_next);
			let sqrt_price_next_tick = sqrt_price_at_tick(tick_next)?;

			let sqrt_price_target =
				if SD::is_beyond(sqrt_price_next_tick, sqrt_price_limit) {
					sqrt_price_limit
				} else {
					sqrt_price_next_tick
				};

			let step = compute_swap_step(
				sqrt_price,
				sqrt_price_target,
				liquidity,
				amount_specified.with_amount(amount_remaining),
				self.parameters.fee_hundredth_pips,
			)?;

			let step_amount_in =
				step.amount_in.checked_add(step.fee_amount).ok_or(MathError::AmountOverflow)?;
			amount_remaining = match amount_specified {
				SwapAmount::ExactInput(_) => amount_remaining.checked_sub(step_amount_in),
				SwapAmount::ExactOutput(_) => amount_remaining.checked_sub(step.amount_out),
			}
			.ok_or(MathError::AmountOverflow)?;
			amount_in = amount_in.checked_add(step_amount_in).ok_or(MathError::AmountOverflow)?;
			amount_out = amount_out.checked_add(step.amount_out).ok_or(MathError::AmountOverflow)?;

			let mut step_lp_fee = step.fee_amount;
			if fee_protocol > 0 {
				let step_protocol_fee = step_lp_fee / fee_protocol;
				step_lp_fee -= step_protocol_fee;
				protocol_fee += step_protocol_fee;
			}
			lp_fee += step_lp_fee;

			if liquidity > 0 {
				fee_growth_global[SD::INPUT_SIDE] = fee_growth_global[SD::INPUT_SIDE]
					.overflowing_add(
						mul_div_floor_checked(step_lp_fee, U256::one() << 128, U256::from(liquidity))
							.ok_or(MathError::AmountOverflow)?,
					)
					.0;
			}

			log::trace!(
				"Swap step to {} (tick {}): in {}, out {}, fee {}",
				step.sqrt_price_next,
				tick_next,
				step.amount_in,
				step.amount_out,
				step.fee_amount
			);

			if step.sqrt_price_next == sqrt_price_next_tick {
				if initialized {
					let (tick_cumulative, seconds_per_liquidity_cumulative_x128) = match cumulatives
					{
						Some(cumulatives) => cumulatives,
						None => *cumulatives.insert(self.observatory.observe_single(
							now,
							0,
							self.slot0.tick,
							self.slot0.observation_index,
							self.liquidity,
							self.slot0.observation_cardinality,
						)?),
					};

					// The output token's fee growth is unchanged by this swap, so reading it from the
					// pool is the same as reading it from the running state
					if let Some(crossing) = self.ledger.stage_cross(
						tick_next,
						&GlobalCheckpoint {
							tick,
							fee_growth_global,
							tick_cumulative,
							seconds_per_liquidity_cumulative_x128,
							time: now,
						},
					) {
						liquidity = liquidity
							.checked_add_signed(SD::liquidity_change_when_crossing(
								crossing.liquidity_net(),
							))
							.ok_or(PoolError::LiquidityOverflow)?;
						log::trace!("Crossed tick {}, liquidity is now {}", tick_next, liquidity);
						crossings.push(crossing);
					}
				}
				tick = SD::tick_after_crossing(tick_next);
			} else if step.sqrt_price_next != sqrt_price {
				tick = tick_at_sqrt_price(step.sqrt_price_next)?;
			}
			sqrt_price = step.sqrt_price_next;
		}

		// The oracle records the tick and liquidity in effect before the swap
		let oracle_write = if tick != self.slot0.tick {
			self.observatory.prepare_write(
				self.slot0.observation_index,
				now,
				self.slot0.tick,
				self.liquidity,
				self.slot0.observation_cardinality,
				self.slot0.observation_cardinality_next,
			)?
		} else {
			None
		};

		Ok(StagedSwap {
			outcome: SwapOutcome {
				input_side: SD::INPUT_SIDE,
				amount_in,
				amount_out,
				lp_fee,
				protocol_fee,
				sqrt_price,
				tick,
				liquidity,
				ticks_crossed: crossings.len() as u32,
			},
			fee_growth_global: fee_growth_global[SD::INPUT_SIDE],
			protocol_fees: self.protocol_fees[SD::INPUT_SIDE]
				.checked_add(protocol_fee)
				.ok_or(MathError::AmountOverflow)?,
			crossings,
			oracle_write,
		})
	}

	fn apply_swap(&mut self, staged: StagedSwap) -> SwapOutcome {
		let StagedSwap { outcome, fee_growth_global, protocol_fees, crossings, oracle_write } =
			staged;

		if let Some(oracle_write) = oracle_write {
			self.apply_oracle_write(oracle_write);
		}
		self.slot0.sqrt_price = outcome.sqrt_price;
		self.slot0.tick = outcome.tick;
		self.liquidity = outcome.liquidity;
		self.fee_growth_global[outcome.input_side] = fee_growth_global;
		self.protocol_fees[outcome.input_side] = protocol_fees;
		for crossing in crossings {
			self.ledger.apply_cross(crossing);
		}

		outcome
	}

	/// Sets the share of swap fees taken by the protocol.
	pub fn set_fee_protocol(&mut self, fee_protocol: ProtocolFee) -> Result<(), PoolError> {
		fee_protocol.validate()?;
		self.locked(|pool| {
			log::info!(
				"Protocol fee changed from {:?} to {:?}",
				pool.slot0.fee_protocol,
				fee_protocol
			);
			pool.slot0.fee_protocol = fee_protocol;
			Ok(())
		})
	}

	pub fn set_circuit_breaker(
		&mut self,
		circuit_breaker: Option<CircuitBreaker>,
	) -> Result<(), PoolError> {
		if let Some(circuit_breaker) = &circuit_breaker {
			circuit_breaker.validate()?;
		}
		self.locked(|pool| {
			log::info!("Circuit breaker set to {:?}", circuit_breaker);
			pool.circuit_breaker = circuit_breaker;
			Ok(())
		})
	}

	/// Pays out up to `maximum` of the accrued protocol fees.
	///
	/// This function never panics
	pub fn collect_protocol_with<T, E>(
		&mut self,
		maximum: SideMap<Amount>,
		settle: impl FnOnce(SideMap<Amount>) -> Result<T, E>,
	) -> Result<(T, SideMap<Amount>), SettlementError<E>> {
		self.locked(|pool| {
			let collected =
				pool.protocol_fees.zip(maximum).map(|_, (fees, maximum)| core::cmp::min(fees, maximum));
			let t = settle(collected).map_err(SettlementError::Callback)?;
			pool.protocol_fees = pool
				.protocol_fees
				.zip(collected)
				.map(|_, (fees, collected)| fees - collected);

			log::info!("Collected protocol fees {:?}", collected);

			Ok((t, collected))
		})
	}

	pub fn collect_protocol(
		&mut self,
		maximum: SideMap<Amount>,
	) -> Result<SideMap<Amount>, PoolError> {
		self.collect_protocol_with(maximum, |_| Result::<(), Infallible>::Ok(()))
			.map(|((), collected)| collected)
			.map_err(Into::into)
	}

	/// Grows the oracle so it can hold at least `observation_cardinality_next` observations. The
	/// new slots are used once the oracle wraps around to them. Returns the new target.
	pub fn increase_observation_cardinality_next(
		&mut self,
		observation_cardinality_next: u16,
	) -> Result<u16, PoolError> {
		self.locked(|pool| {
			let cardinality_next = pool
				.observatory
				.grow(pool.slot0.observation_cardinality_next, observation_cardinality_next)?;
			if cardinality_next != pool.slot0.observation_cardinality_next {
				log::debug!(
					"Observation cardinality target increased from {} to {}",
					pool.slot0.observation_cardinality_next,
					cardinality_next
				);
			}
			pool.slot0.observation_cardinality_next = cardinality_next;
			Ok(cardinality_next)
		})
	}

	pub fn parameters(&self) -> PoolParameters {
		self.parameters
	}

	pub fn status(&self) -> PoolStatus {
		self.status
	}

	pub fn snapshot(&self) -> PoolSnapshot {
		PoolSnapshot {
			slot0: self.slot0,
			status: self.status,
			liquidity: self.liquidity,
			circuit_breaker: self.circuit_breaker,
		}
	}

	pub fn liquidity(&self) -> Liquidity {
		self.liquidity
	}

	pub fn fee_growth_global(&self) -> SideMap<FeeGrowthQ128F128> {
		self.fee_growth_global
	}

	pub fn protocol_fees(&self) -> SideMap<Amount> {
		self.protocol_fees
	}

	pub fn tick_info(&self, tick: Tick) -> Option<&TickInfo> {
		self.ledger.tick(tick)
	}

	pub fn is_tick_initialized(&self, tick: Tick) -> bool {
		self.tick_bitmap.is_initialized(tick, self.parameters.tick_spacing)
	}

	/// The tick and seconds per liquidity cumulatives as of each of `seconds_agos` before `now`.
	///
	/// This function never panics
	pub fn observe(
		&self,
		now: u64,
		seconds_agos: &[u64],
	) -> Result<(Vec<i128>, Vec<U256>), PoolError> {
		self.ensure_initialized()?;
		Ok(self.observatory.observe(
			now,
			seconds_agos,
			self.slot0.tick,
			self.slot0.observation_index,
			self.liquidity,
			self.slot0.observation_cardinality,
		)?)
	}

	/// The arithmetic mean tick over the `window` seconds before `now`, rounded towards negative
	/// infinity.
	pub fn time_weighted_average_tick(&self, now: u64, window: u64) -> Result<Tick, PoolError> {
		if window == 0 {
			return Err(PoolError::EmptyWindow)
		}
		let (tick_cumulatives, _) = self.observe(now, &[window, 0])?;
		let (start, end) = match tick_cumulatives[..] {
			[start, end] => (start, end),
			_ => return Err(PoolError::EmptyWindow),
		};
		// The mean of valid ticks is a valid tick
		Ok((end - start).div_euclid(window as i128) as Tick)
	}

	/// A position's liquidity and owed amounts, including fees it has earned but not yet been
	/// credited with.
	pub fn position(
		&self,
		owner: &LiquidityProvider,
		lower: Tick,
		upper: Tick,
	) -> Result<PositionInfo, PoolError> {
		self.validate_range(lower, upper)?;
		let position = self.ledger.position(owner, lower, upper).ok_or(PoolError::PositionNotFound)?;
		let pending = self.ledger.pending_fees(owner, lower, upper, &self.fee_checkpoint())?;
		Ok(PositionInfo {
			liquidity: position.liquidity,
			fee_growth_inside_last: position.fee_growth_inside_last,
			tokens_owed: position
				.tokens_owed
				.zip(pending)
				.try_map(|_, (owed, pending)| {
					owed.checked_add(pending).ok_or(MathError::AmountOverflow)
				})?,
		})
	}

	/// Every position in the pool, in order of owner and range.
	pub fn positions(&self) -> impl '_ + Iterator<Item = (&LiquidityProvider, Tick, Tick, Liquidity)> {
		self.ledger
			.positions()
			.map(|(owner, lower, upper, position)| (owner, lower, upper, position.liquidity))
	}

	/// The active liquidity from each initialized tick up to the next one, in ascending order. The
	/// last entry always has zero liquidity.
	///
	/// This function never panics
	pub fn liquidity_histogram(&self) -> Vec<(Tick, Liquidity)> {
		let mut liquidity = 0u128;
		self.ledger
			.ticks()
			.map(|(tick, info)| {
				liquidity = liquidity.saturating_add_signed(info.liquidity_net);
				(tick, liquidity)
			})
			.collect()
	}

	/// The value of `liquidity` over `lower..upper` at the current price. Rounding up gives the
	/// amounts needed to mint it, rounding down the amounts burning it would return.
	///
	/// This function never panics
	pub fn liquidity_to_amounts(
		&self,
		liquidity: Liquidity,
		lower: Tick,
		upper: Tick,
		round_up: bool,
	) -> Result<SideMap<Amount>, PoolError> {
		if !(MIN_TICK <= lower && lower < upper && upper <= MAX_TICK) {
			return Err(PoolError::InvalidTickRange)
		}
		let sqrt_price_lower = sqrt_price_at_tick(lower)?;
		let sqrt_price_upper = sqrt_price_at_tick(upper)?;
		let sqrt_price = self.slot0.sqrt_price;

		Ok(SideMap::from_array(if self.slot0.tick < lower {
			[amount0_delta(sqrt_price_lower, sqrt_price_upper, liquidity, round_up)?, Amount::zero()]
		} else if self.slot0.tick < upper {
			[
				amount0_delta(sqrt_price, sqrt_price_upper, liquidity, round_up)?,
				amount1_delta(sqrt_price_lower, sqrt_price, liquidity, round_up)?,
			]
		} else {
			[Amount::zero(), amount1_delta(sqrt_price_lower, sqrt_price_upper, liquidity, round_up)?]
		}))
	}
}
