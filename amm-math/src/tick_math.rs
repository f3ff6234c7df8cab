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

//! Conversion between ticks and Q64.96 sqrt prices. A tick `t` represents the price `1.0001^t`.


use sp_core::{U256, U512};

use crate::{
	mul_div_floor, MathError, Price, SqrtPriceQ64F96, Tick, PRICE_FRACTIONAL_BITS,
	SQRT_PRICE_FRACTIONAL_BITS,
};

/// The minimum tick that may be passed to `sqrt_price_at_tick` computed from log base 1.0001 of
/// 2**-128
pub const MIN_TICK: Tick = -887272;
/// The maximum tick that may be passed to `sqrt_price_at_tick` computed from log base 1.0001 of
/// 2**128
pub const MAX_TICK: Tick = -MIN_TICK;
/// The minimum value that can be returned from `sqrt_price_at_tick`. Equivalent to
/// `sqrt_price_at_tick(MIN_TICK)`
pub const MIN_SQRT_PRICE: SqrtPriceQ64F96 = U256([0x1000276a3u64, 0x0, 0x0, 0x0]);
/// The maximum value that can be returned from `sqrt_price_at_tick`. Equivalent to
/// `sqrt_price_at_tick(MAX_TICK)`.
pub const MAX_SQRT_PRICE: SqrtPriceQ64F96 =
	U256([0x5d951d5263988d26u64, 0xefd1fc6a50648849u64, 0xfffd8963u64, 0x0u64]);

/// Note `MAX_SQRT_PRICE` itself is excluded, as there is no tick above `MAX_TICK` for the price to
/// sit below.
pub fn is_sqrt_price_valid(sqrt_price: SqrtPriceQ64F96) -> bool {
	(MIN_SQRT_PRICE..MAX_SQRT_PRICE).contains(&sqrt_price)
}

pub fn is_tick_valid(tick: Tick) -> bool {
	(MIN_TICK..=MAX_TICK).contains(&tick)
}

/// Entry `i` is `2^128 / sqrt(1.0001^(2^i))` as a Q128.128. `MAX_TICK` is below `2^20`, so these
/// cover every bit of a valid tick's magnitude.
const INVERSE_SQRT_FACTORS: [u128; 20] = [
	0xfffcb933bd6fad37aa2d162d1a594001,
	0xfff97272373d413259a46990580e213a,
	0xfff2e50f5f656932ef12357cf3c7fdcc,
	0xffe5caca7e10e4e61c3624eaa0941cd0,
	0xffcb9843d60f6159c9db58835c926644,
	0xff973b41fa98c081472e6896dfb254c0,
	0xff2ea16466c96a3843ec78b326b52861,
	0xfe5dee046a99a2a811c461f1969c3053,
	0xfcbe86c7900a88aedcffc83b479aa3a4,
	0xf987a7253ac413176f2b074cf7815e54,
	0xf3392b0822b70005940c7a398e4b70f3,
	0xe7159475a2c29b7443b29c7fa6e889d9,
	0xd097f3bdfd2022b8845ad8f792aa5825,
	0xa9f746462d870fdf8a65dc1f90e061e5,
	0x70d869a156d2a1b890bb3df62baf32f7,
	0x31be135f97d08fd981231505542fcfa6,
	0x9aa508b5b7a84e1c677de54f3e99bc9,
	0x5d6af8dedb81196699c329225ee604,
	0x2216e584f5fa1ea926041bedfe98,
	0x48a170391f7dc42444e8fa2,
];

/// Calculates `sqrt(1.0001^tick) * 2^96`, rounded up.
///
/// This function never panics
pub fn sqrt_price_at_tick(tick: Tick) -> Result<SqrtPriceQ64F96, MathError> {
	if !is_tick_valid(tick) {
		return Err(MathError::TickOutOfRange)
	}

	let magnitude = tick.unsigned_abs();

	// `1 / sqrt(1.0001^|tick|)` as a Q128.128. Every factor is below one, so the product never
	// exceeds 2^128 and each multiplication fits in 256 bits.
	let inverse = INVERSE_SQRT_FACTORS.iter().enumerate().fold(
		U256::one() << 128u32,
		|product, (bit, factor)| {
			if magnitude & (1u32 << bit) != 0 {
				product.overflowing_mul(U256::from(*factor)).0 >> 128u32
			} else {
				product
			}
		},
	);

	// Nonzero even with every factor applied, see `inverse_never_reaches_zero`.
	let sqrt_price_q32f128 = if tick > 0 { U256::MAX / inverse } else { inverse };

	// Rounding up keeps `tick_at_sqrt_price(sqrt_price_at_tick(tick)) == tick`.
	Ok((sqrt_price_q32f128 >> 32u32) +
		if sqrt_price_q32f128.low_u32() == 0 { U256::zero() } else { U256::one() })
}

/// Error bounds of `log_sqrt(1.0001)` as computed by [tick_at_sqrt_price] from a 14 bit `log2`, as
/// Q128.128 offsets.
const LOG_ERROR_BELOW: u128 = 3402992956809132418596140100660247210;
const LOG_ERROR_ABOVE: u128 = 291339464771989622907027621153398088495;

/// `1 / log2(sqrt(1.0001))` as a Q64.64.
const INVERSE_LOG2_SQRT_10001: u128 = 255738958999603826347141;

/// Calculates the greatest tick value such that `sqrt_price_at_tick(tick) <= sqrt_price`
///
/// This function never panics
pub fn tick_at_sqrt_price(sqrt_price: SqrtPriceQ64F96) -> Result<Tick, MathError> {
	if !is_sqrt_price_valid(sqrt_price) {
		return Err(MathError::PriceOutOfRange)
	}

	let sqrt_price_q64f128 = sqrt_price << 32u32;

	// A valid price is at least 2^32, so the top bit sits between 64 and 191.
	let top_bit = sqrt_price_q64f128.bits() as u32 - 1;

	// Normalised into [2^127, 2^128), i.e. a Q1.127 mantissa in [1, 2).
	let mut mantissa = if top_bit >= 127 {
		sqrt_price_q64f128 >> (top_bit - 127)
	} else {
		sqrt_price_q64f128 << (127 - top_bit)
	}
	.low_u128();

	let mut log2_q63f64 = (top_bit as i128 - 128) << 64u32;

	// Squaring the mantissa doubles its log, so each square that reaches 2 yields the next bit.
	for bit in (50u32..64).rev() {
		let squared = U256::from(mantissa).overflowing_mul(U256::from(mantissa)).0 >> 127u32;
		mantissa = if squared.bit(128) {
			log2_q63f64 |= 1i128 << bit;
			(squared >> 1u32).low_u128()
		} else {
			squared.low_u128()
		};
	}

	// Two's complement Q127.128, as there is no signed 256 bit type.
	let log2_q127f64 = if log2_q63f64 < 0 {
		U256::zero().overflowing_sub(U256::from(log2_q63f64.unsigned_abs())).0
	} else {
		U256::from(log2_q63f64.unsigned_abs())
	};
	let log_sqrt10001 = log2_q127f64.overflowing_mul(U256::from(INVERSE_LOG2_SQRT_10001)).0;

	let tick_below =
		(log_sqrt10001.overflowing_sub(U256::from(LOG_ERROR_BELOW)).0 >> 128u32).low_u128() as Tick;
	let tick_above =
		(log_sqrt10001.overflowing_add(U256::from(LOG_ERROR_ABOVE)).0 >> 128u32).low_u128() as Tick;

	Ok(
		if tick_below != tick_above &&
			sqrt_price_at_tick(tick_above).is_ok_and(|lower_bound| lower_bound <= sqrt_price)
		{
			tick_above
		} else {
			tick_below
		},
	)
}

/// Converts a Q64.96 sqrt price into a Q128.128 price, rounding down.
///
/// This function never panics
pub fn sqrt_price_to_price(sqrt_price: SqrtPriceQ64F96) -> Result<Price, MathError> {
	if !(MIN_SQRT_PRICE..=MAX_SQRT_PRICE).contains(&sqrt_price) {
		return Err(MathError::PriceOutOfRange)
	}

	// Note the value here cannot ever be zero as MIN_SQRT_PRICE has its 33th bit set, so sqrt_price
	// will always include a bit pass the 64th bit that is set, so when we shift down below that set
	// bit will not be removed.
	mul_div_floor(
		sqrt_price,
		sqrt_price,
		SqrtPriceQ64F96::one() << (2 * SQRT_PRICE_FRACTIONAL_BITS - PRICE_FRACTIONAL_BITS),
	)
}

/// Converts a Q128.128 price into a Q64.96 sqrt price, rounding down and saturating.
pub fn price_to_sqrt_price(price: Price) -> SqrtPriceQ64F96 {
	((U512::from(price) << PRICE_FRACTIONAL_BITS).integer_sqrt() >>
		(PRICE_FRACTIONAL_BITS - SQRT_PRICE_FRACTIONAL_BITS))
		.try_into()
		.unwrap_or(SqrtPriceQ64F96::MAX)
}

pub fn price_at_tick(tick: Tick) -> Result<Price, MathError> {
	sqrt_price_to_price(sqrt_price_at_tick(tick)?)
}

pub fn tick_at_price(price: Price) -> Result<Tick, MathError> {
	tick_at_sqrt_price(price_to_sqrt_price(price))
}
