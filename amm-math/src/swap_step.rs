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

#[cfg(test)]
mod tests;

use codec::{Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};
use sp_core::U256;

use crate::{
	amount0_delta, amount1_delta, mul_div_ceil, mul_div_floor, next_sqrt_price_from_input,
	next_sqrt_price_from_output, Amount, Liquidity, MathError, SqrtPriceQ64F96,
	ONE_IN_HUNDREDTH_PIPS,
};

/// The amount a swap is sized by. With `ExactInput` the fee is taken out of the amount, with
/// `ExactOutput` it is charged on top of the input needed to produce the amount.
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
pub enum SwapAmount {
	ExactInput(Amount),
	ExactOutput(Amount),
}

impl SwapAmount {
	pub fn amount(self) -> Amount {
		match self {
			SwapAmount::ExactInput(amount) | SwapAmount::ExactOutput(amount) => amount,
		}
	}

	pub fn is_exact_input(self) -> bool {
		matches!(self, SwapAmount::ExactInput(_))
	}

	/// The same kind of swap amount, with a different value.
	pub fn with_amount(self, amount: Amount) -> Self {
		match self {
			SwapAmount::ExactInput(_) => SwapAmount::ExactInput(amount),
			SwapAmount::ExactOutput(_) => SwapAmount::ExactOutput(amount),
		}
	}
}

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
pub struct SwapStep {
	pub sqrt_price_next: SqrtPriceQ64F96,
	/// Input consumed by the price movement, not including the fee.
	pub amount_in: Amount,
	pub amount_out: Amount,
	pub fee_amount: Amount,
}

/// Computes the result of swapping some amount within a single range of constant liquidity, i.e.
/// moving the price from `sqrt_price_current` towards `sqrt_price_target` without passing it.
/// The direction of the swap is implied by the order of the two prices.
///
/// The fee is always rounded up. If an exact input amount doesn't reach the target, everything
/// left over after the price movement is taken as fee.
///
/// This function never panics
pub fn compute_swap_step(
	sqrt_price_current: SqrtPriceQ64F96,
	sqrt_price_target: SqrtPriceQ64F96,
	liquidity: Liquidity,
	amount_remaining: SwapAmount,
	fee_hundredth_pips: u32,
) -> Result<SwapStep, MathError> {
	if fee_hundredth_pips >= ONE_IN_HUNDREDTH_PIPS {
		return Err(MathError::FeeOutOfRange)
	}

	let zero_for_one = sqrt_price_current >= sqrt_price_target;
	let one = U256::from(ONE_IN_HUNDREDTH_PIPS);
	let fee = U256::from(fee_hundredth_pips);

	let amount_in_for_range = |from: SqrtPriceQ64F96, to: SqrtPriceQ64F96| {
		if zero_for_one {
			amount0_delta(to, from, liquidity, true)
		} else {
			amount1_delta(from, to, liquidity, true)
		}
	};
	let amount_out_for_range = |from: SqrtPriceQ64F96, to: SqrtPriceQ64F96| {
		if zero_for_one {
			amount1_delta(to, from, liquidity, false)
		} else {
			amount0_delta(from, to, liquidity, false)
		}
	};

	let (sqrt_price_next, amount_in_to_target, amount_out_to_target) = match amount_remaining {
		SwapAmount::ExactInput(amount) => {
			let amount_less_fee = mul_div_floor(amount, one - fee, one)?;
			let amount_in = amount_in_for_range(sqrt_price_current, sqrt_price_target)?;
			(
				if amount_less_fee >= amount_in {
					sqrt_price_target
				} else {
					next_sqrt_price_from_input(
						sqrt_price_current,
						liquidity,
						amount_less_fee,
						zero_for_one,
					)?
				},
				Some(amount_in),
				None,
			)
		},
		SwapAmount::ExactOutput(amount) => {
			let amount_out = amount_out_for_range(sqrt_price_current, sqrt_price_target)?;
			(
				if amount >= amount_out {
					sqrt_price_target
				} else {
					next_sqrt_price_from_output(sqrt_price_current, liquidity, amount, zero_for_one)?
				},
				None,
				Some(amount_out),
			)
		},
	};

	let reached_target = sqrt_price_next == sqrt_price_target;

	let amount_in = match amount_in_to_target {
		Some(amount_in) if reached_target => amount_in,
		_ => amount_in_for_range(sqrt_price_current, sqrt_price_next)?,
	};
	let mut amount_out = match amount_out_to_target {
		Some(amount_out) if reached_target => amount_out,
		_ => amount_out_for_range(sqrt_price_current, sqrt_price_next)?,
	};

	// The rounding in `next_sqrt_price_from_output` may let the price move slightly too far
	if let SwapAmount::ExactOutput(amount) = amount_remaining {
		amount_out = core::cmp::min(amount_out, amount);
	}

	let fee_amount = match amount_remaining {
		SwapAmount::ExactInput(amount) if !reached_target => {
			// Will not underflow, as `sqrt_price_next` was rounded in favour of the pool
			amount.checked_sub(amount_in).ok_or(MathError::AmountOverflow)?
		},
		_ => mul_div_ceil(amount_in, fee, one - fee)?,
	};

	Ok(SwapStep { sqrt_price_next, amount_in, amount_out, fee_amount })
}
