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

//! Token amounts implied by a liquidity and a sqrt price range, and the inverse: the sqrt price
//! reached by adding or removing an amount of one token. All of this is closed form maths on the
//! price restricted `x * y = L^2` curve.
//!
//! Amounts the pool receives are rounded up and amounts the pool pays are rounded down, so rounding
//! never favours the caller.


use codec::{Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};
use sp_core::{U256, U512};

use crate::{
	div_rounding_up, fits_in_u160, mul_div_ceil, mul_div_floor, Amount, Liquidity, MathError,
	SqrtPriceQ64F96, SQRT_PRICE_FRACTIONAL_BITS,
};

/// A signed token amount from the pool's point of view.
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
pub enum AmountDelta {
	/// The pool receives this amount.
	In(Amount),
	/// The pool pays out this amount.
	Out(Amount),
}

impl AmountDelta {
	pub fn magnitude(self) -> Amount {
		match self {
			AmountDelta::In(amount) | AmountDelta::Out(amount) => amount,
		}
	}
}

impl Default for AmountDelta {
	fn default() -> Self {
		AmountDelta::In(Amount::zero())
	}
}

fn sorted(
	sqrt_price_a: SqrtPriceQ64F96,
	sqrt_price_b: SqrtPriceQ64F96,
) -> (SqrtPriceQ64F96, SqrtPriceQ64F96) {
	if sqrt_price_a > sqrt_price_b {
		(sqrt_price_b, sqrt_price_a)
	} else {
		(sqrt_price_a, sqrt_price_b)
	}
}

/// Calculates `L * (sqrt(upper) - sqrt(lower)) / (sqrt(upper) * sqrt(lower))`, the amount of
/// token0 between two prices. The prices may be given in either order.
///
/// This function never panics
pub fn amount0_delta(
	sqrt_price_a: SqrtPriceQ64F96,
	sqrt_price_b: SqrtPriceQ64F96,
	liquidity: Liquidity,
	round_up: bool,
) -> Result<Amount, MathError> {
	let (lower, upper) = sorted(sqrt_price_a, sqrt_price_b);
	if lower.is_zero() {
		return Err(MathError::DivisionByZero)
	}

	// L is a u128 so the shift fits in 224 bits
	let numerator_1 = U256::from(liquidity) << SQRT_PRICE_FRACTIONAL_BITS;
	let numerator_2 = upper - lower;

	/*
		Proof that the first division does not overflow:
		If A ∈ ℕ, B ∈ ℕ, A > 0, B >= A
		Then B - A < B
		Then N * (B - A) / B < N
	*/
	if round_up {
		div_rounding_up(mul_div_ceil(numerator_1, numerator_2, upper)?, lower)
	} else {
		Ok(mul_div_floor(numerator_1, numerator_2, upper)? / lower)
	}
}

/// Calculates `L * (sqrt(upper) - sqrt(lower))`, the amount of token1 between two prices. The
/// prices may be given in either order.
///
/// This function never panics
pub fn amount1_delta(
	sqrt_price_a: SqrtPriceQ64F96,
	sqrt_price_b: SqrtPriceQ64F96,
	liquidity: Liquidity,
	round_up: bool,
) -> Result<Amount, MathError> {
	let (lower, upper) = sorted(sqrt_price_a, sqrt_price_b);

	/*
		Proof that this does not overflow:
		If A ∈ u160, B ∈ u160, A <= B, L ∈ u128
		Then B - A ∈ u160
		Then L * (B - A) / (1<<96) <= u192::MAX < u256::MAX
	*/
	let denominator = U512::one() << SQRT_PRICE_FRACTIONAL_BITS;
	if round_up {
		mul_div_ceil(liquidity.into(), upper - lower, denominator)
	} else {
		mul_div_floor(liquidity.into(), upper - lower, denominator)
	}
}

/// The token0 delta for a signed change in liquidity. Adding liquidity means the pool receives
/// tokens, rounded up. Removing it means the pool pays tokens, rounded down.
pub fn amount0_delta_signed(
	sqrt_price_a: SqrtPriceQ64F96,
	sqrt_price_b: SqrtPriceQ64F96,
	liquidity_delta: i128,
) -> Result<AmountDelta, MathError> {
	if liquidity_delta < 0 {
		amount0_delta(sqrt_price_a, sqrt_price_b, liquidity_delta.unsigned_abs(), false)
			.map(AmountDelta::Out)
	} else {
		amount0_delta(sqrt_price_a, sqrt_price_b, liquidity_delta.unsigned_abs(), true)
			.map(AmountDelta::In)
	}
}

/// The token1 delta for a signed change in liquidity, rounded as [amount0_delta_signed].
pub fn amount1_delta_signed(
	sqrt_price_a: SqrtPriceQ64F96,
	sqrt_price_b: SqrtPriceQ64F96,
	liquidity_delta: i128,
) -> Result<AmountDelta, MathError> {
	if liquidity_delta < 0 {
		amount1_delta(sqrt_price_a, sqrt_price_b, liquidity_delta.unsigned_abs(), false)
			.map(AmountDelta::Out)
	} else {
		amount1_delta(sqrt_price_a, sqrt_price_b, liquidity_delta.unsigned_abs(), true)
			.map(AmountDelta::In)
	}
}

/// Calculates the sqrt price after adding (`add == true`) or removing `amount` of token0. The
/// result is rounded up, so the price moves less when adding and more when removing.
///
/// The formula is `L * sqrt_p / (L ± amount * sqrt_p)`. If `amount * sqrt_p` overflows, the
/// equivalent `L / (L / sqrt_p ± amount)` is used instead, which loses some precision.
pub fn next_sqrt_price_from_amount0_rounding_up(
	sqrt_price: SqrtPriceQ64F96,
	liquidity: Liquidity,
	amount: Amount,
	add: bool,
) -> Result<SqrtPriceQ64F96, MathError> {
	if amount.is_zero() {
		return Ok(sqrt_price)
	}
	if sqrt_price.is_zero() || liquidity == 0 {
		return Err(MathError::DivisionByZero)
	}

	let numerator_1 = U256::from(liquidity) << SQRT_PRICE_FRACTIONAL_BITS;

	let next = if add {
		match amount
			.checked_mul(sqrt_price)
			.and_then(|product| numerator_1.checked_add(product))
		{
			Some(denominator) => mul_div_ceil(numerator_1, sqrt_price, denominator)?,
			None => div_rounding_up(
				numerator_1,
				(numerator_1 / sqrt_price)
					.checked_add(amount)
					.ok_or(MathError::PriceComputationOverflow)?,
			)?,
		}
	} else {
		// The amount removed must be strictly less than the virtual reserve of token0
		let denominator = amount
			.checked_mul(sqrt_price)
			.filter(|product| numerator_1 > *product)
			.map(|product| numerator_1 - product)
			.ok_or(MathError::PriceComputationOverflow)?;
		mul_div_ceil(numerator_1, sqrt_price, denominator)
			.map_err(|_| MathError::PriceComputationOverflow)?
	};

	if fits_in_u160(next) {
		Ok(next)
	} else {
		Err(MathError::PriceComputationOverflow)
	}
}

/// Calculates the sqrt price after adding (`add == true`) or removing `amount` of token1. The
/// result is rounded down, so the price moves less when adding and more when removing.
///
/// The formula is `sqrt_p ± amount / L`.
pub fn next_sqrt_price_from_amount1_rounding_down(
	sqrt_price: SqrtPriceQ64F96,
	liquidity: Liquidity,
	amount: Amount,
	add: bool,
) -> Result<SqrtPriceQ64F96, MathError> {
	if liquidity == 0 {
		return Err(MathError::DivisionByZero)
	}

	let next = if add {
		let quotient = if fits_in_u160(amount) {
			(amount << SQRT_PRICE_FRACTIONAL_BITS) / U256::from(liquidity)
		} else {
			mul_div_floor(amount, U256::one() << SQRT_PRICE_FRACTIONAL_BITS, liquidity)
				.map_err(|_| MathError::PriceComputationOverflow)?
		};
		sqrt_price.checked_add(quotient).ok_or(MathError::PriceComputationOverflow)?
	} else {
		let quotient = if fits_in_u160(amount) {
			div_rounding_up(amount << SQRT_PRICE_FRACTIONAL_BITS, U256::from(liquidity))?
		} else {
			mul_div_ceil(amount, U256::one() << SQRT_PRICE_FRACTIONAL_BITS, liquidity)
				.map_err(|_| MathError::PriceComputationOverflow)?
		};
		// The amount removed must be strictly less than the virtual reserve of token1
		if sqrt_price > quotient {
			sqrt_price - quotient
		} else {
			return Err(MathError::PriceComputationOverflow)
		}
	};

	if fits_in_u160(next) {
		Ok(next)
	} else {
		Err(MathError::PriceComputationOverflow)
	}
}

/// The sqrt price after a swap of `amount_in` given the direction of the swap. Rounds so the
/// target price is never passed.
pub fn next_sqrt_price_from_input(
	sqrt_price: SqrtPriceQ64F96,
	liquidity: Liquidity,
	amount_in: Amount,
	zero_for_one: bool,
) -> Result<SqrtPriceQ64F96, MathError> {
	if sqrt_price.is_zero() {
		return Err(MathError::PriceOutOfRange)
	}
	if liquidity == 0 {
		return Err(MathError::DivisionByZero)
	}

	if zero_for_one {
		next_sqrt_price_from_amount0_rounding_up(sqrt_price, liquidity, amount_in, true)
	} else {
		next_sqrt_price_from_amount1_rounding_down(sqrt_price, liquidity, amount_in, true)
	}
}

/// The sqrt price after a swap producing `amount_out` given the direction of the swap. Rounds so
/// the target price is always passed.
pub fn next_sqrt_price_from_output(
	sqrt_price: SqrtPriceQ64F96,
	liquidity: Liquidity,
	amount_out: Amount,
	zero_for_one: bool,
) -> Result<SqrtPriceQ64F96, MathError> {
	if sqrt_price.is_zero() {
		return Err(MathError::PriceOutOfRange)
	}
	if liquidity == 0 {
		return Err(MathError::DivisionByZero)
	}

	if zero_for_one {
		next_sqrt_price_from_amount1_rounding_down(sqrt_price, liquidity, amount_out, false)
	} else {
		next_sqrt_price_from_amount0_rounding_up(sqrt_price, liquidity, amount_out, false)
	}
}

/// The largest liquidity that `amount0` of token0 can back between two prices, saturating at
/// `Liquidity::MAX`.
pub fn liquidity_for_amount0(
	sqrt_price_a: SqrtPriceQ64F96,
	sqrt_price_b: SqrtPriceQ64F96,
	amount0: Amount,
) -> Liquidity {
	let (lower, upper) = sorted(sqrt_price_a, sqrt_price_b);
	if lower == upper {
		return 0
	}
	((U512::saturating_mul(amount0.into(), U256::full_mul(lower, upper)) /
		U512::from(upper - lower)) >>
		SQRT_PRICE_FRACTIONAL_BITS)
		.try_into()
		.unwrap_or(Liquidity::MAX)
}

/// The largest liquidity that `amount1` of token1 can back between two prices, saturating at
/// `Liquidity::MAX`.
pub fn liquidity_for_amount1(
	sqrt_price_a: SqrtPriceQ64F96,
	sqrt_price_b: SqrtPriceQ64F96,
	amount1: Amount,
) -> Liquidity {
	let (lower, upper) = sorted(sqrt_price_a, sqrt_price_b);
	if lower == upper {
		return 0
	}
	(U256::full_mul(amount1, U256::one() << SQRT_PRICE_FRACTIONAL_BITS) / U512::from(upper - lower))
		.try_into()
		.unwrap_or(Liquidity::MAX)
}

/// The largest liquidity the given amounts can back over `lower..upper` at the current price.
/// Below the range only token0 is needed, above it only token1, and inside it the scarcer of the
/// two bounds the result.
pub fn liquidity_for_amounts(
	sqrt_price: SqrtPriceQ64F96,
	lower: SqrtPriceQ64F96,
	upper: SqrtPriceQ64F96,
	amount0: Amount,
	amount1: Amount,
) -> Liquidity {
	let (lower, upper) = sorted(lower, upper);
	if sqrt_price <= lower {
		liquidity_for_amount0(lower, upper, amount0)
	} else if sqrt_price < upper {
		core::cmp::min(
			liquidity_for_amount0(sqrt_price, upper, amount0),
			liquidity_for_amount1(lower, sqrt_price, amount1),
		)
	} else {
		liquidity_for_amount1(lower, upper, amount1)
	}
}
