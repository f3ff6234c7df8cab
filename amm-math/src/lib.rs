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

//! Fixed point maths for concentrated liquidity pools, following Uniswap v3's `TickMath`,
//! `SqrtPriceMath` and `SwapMath` libraries:
//! https://github.com/Uniswap/v3-core/tree/main/contracts/libraries
//!
//! Unlike the Solidity libraries nothing here reverts. Every function that can fail returns a
//! [MathError] so callers can reject an operation before mutating any state.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(test)]
mod tests;

pub mod delta_math;
pub mod swap_step;
pub mod tick_math;

use codec::{Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};
use sp_core::{U256, U512};

pub use delta_math::{
	amount0_delta, amount0_delta_signed, amount1_delta, amount1_delta_signed,
	liquidity_for_amounts, next_sqrt_price_from_input, next_sqrt_price_from_output, AmountDelta,
};
pub use swap_step::{compute_swap_step, SwapAmount, SwapStep};
pub use tick_math::{
	is_sqrt_price_valid, is_tick_valid, price_at_tick, price_to_sqrt_price, sqrt_price_at_tick,
	sqrt_price_to_price, tick_at_price, tick_at_sqrt_price, MAX_SQRT_PRICE, MAX_TICK,
	MIN_SQRT_PRICE, MIN_TICK,
};

pub const ONE_IN_HUNDREDTH_PIPS: u32 = 1_000_000;
/// The largest fee a pool may charge, 50%.
pub const MAX_FEE_HUNDREDTH_PIPS: u32 = ONE_IN_HUNDREDTH_PIPS / 2;

pub type Amount = U256;
pub type Tick = i32;
pub type SqrtPriceQ64F96 = U256;
pub const SQRT_PRICE_FRACTIONAL_BITS: u32 = 96;
pub type Price = U256;
pub const PRICE_FRACTIONAL_BITS: u32 = 128;

/// This is the invariant wrt xy = k. It represents / is proportional to the depth of the
/// pool/position.
pub type Liquidity = u128;
/// Fees earned per unit of liquidity, as a 128.128 fixed point number. Accumulators of this type
/// are only ever compared by (wrapping) difference.
pub type FeeGrowthQ128F128 = U256;

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
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum MathError {
	/// The tick is outside of `MIN_TICK..=MAX_TICK`.
	#[cfg_attr(feature = "std", error("tick is outside of the supported range"))]
	TickOutOfRange,
	/// The sqrt price is outside of `MIN_SQRT_PRICE..MAX_SQRT_PRICE`.
	#[cfg_attr(feature = "std", error("sqrt price is outside of the supported range"))]
	PriceOutOfRange,
	/// A price could not be computed from the given amount and liquidity, either because an
	/// intermediate value overflowed or because the amount would move the price past zero.
	#[cfg_attr(feature = "std", error("next sqrt price could not be computed"))]
	PriceComputationOverflow,
	#[cfg_attr(feature = "std", error("amount overflowed 256 bits"))]
	AmountOverflow,
	#[cfg_attr(feature = "std", error("division by zero"))]
	DivisionByZero,
	/// Fees must be strictly less than 100%.
	#[cfg_attr(feature = "std", error("fee is out of range"))]
	FeeOutOfRange,
}

/// Computes `floor(a * b / c)` with a 512 bit intermediate. Returns `None` if `c` is zero or the
/// result doesn't fit in 256 bits.
pub fn mul_div_floor_checked<C: Into<U512>>(a: U256, b: U256, c: C) -> Option<U256> {
	mul_div_checked(a, b, c).map(|(floor, _ceil)| floor).and_then(|d| d.try_into().ok())
}

/// Computes `ceil(a * b / c)` with a 512 bit intermediate. Returns `None` if `c` is zero or the
/// result doesn't fit in 256 bits.
pub fn mul_div_ceil_checked<C: Into<U512>>(a: U256, b: U256, c: C) -> Option<U256> {
	mul_div_checked(a, b, c).map(|(_floor, ceil)| ceil).and_then(|d| d.try_into().ok())
}

fn mul_div_checked<C: Into<U512>>(a: U256, b: U256, c: C) -> Option<(U512, U512)> {
	let c: U512 = c.into();
	if c.is_zero() {
		return None
	}

	let (d, m) = U512::div_mod(U256::full_mul(a, b), c);

	Some((
		d,
		if m > U512::zero() {
			// cannot overflow as for m > 0, c must be > 1, and as (a*b) < U512::MAX, therefore
			// a*b/c < U512::MAX
			d + 1
		} else {
			d
		},
	))
}

pub(crate) fn mul_div_floor(a: U256, b: U256, c: impl Into<U512>) -> Result<U256, MathError> {
	let c: U512 = c.into();
	if c.is_zero() {
		Err(MathError::DivisionByZero)
	} else {
		mul_div_floor_checked(a, b, c).ok_or(MathError::AmountOverflow)
	}
}

pub(crate) fn mul_div_ceil(a: U256, b: U256, c: impl Into<U512>) -> Result<U256, MathError> {
	let c: U512 = c.into();
	if c.is_zero() {
		Err(MathError::DivisionByZero)
	} else {
		mul_div_ceil_checked(a, b, c).ok_or(MathError::AmountOverflow)
	}
}

/// `ceil(x / y)`
pub(crate) fn div_rounding_up(x: U256, y: U256) -> Result<U256, MathError> {
	if y.is_zero() {
		return Err(MathError::DivisionByZero)
	}
	let (d, m) = x.div_mod(y);
	Ok(if m.is_zero() { d } else { d + 1 })
}

/// Sqrt prices are Q64.96 numbers that must fit in 160 bits.
pub(crate) fn fits_in_u160(value: U256) -> bool {
	value.bits() <= 160
}
