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
use rand::{Rng, SeedableRng};

use super::*;
use crate::{sqrt_price_at_tick, MAX_TICK, MIN_TICK};

const ONE_E18: u128 = 1_000_000_000_000_000_000;

fn dec(s: &str) -> U256 {
	U256::from_dec_str(s).unwrap()
}

fn price_one() -> SqrtPriceQ64F96 {
	U256::one() << 96
}

/// sqrt(1.01) as a Q64.96
fn price_one_point_zero_one() -> SqrtPriceQ64F96 {
	dec("79623317895830914510639640423")
}

#[test]
fn exact_input_capped_at_price_target() {
	let step = assert_ok!(compute_swap_step(
		price_one(),
		price_one_point_zero_one(),
		2 * ONE_E18,
		SwapAmount::ExactInput(ONE_E18.into()),
		600,
	));

	assert_eq!(
		step,
		SwapStep {
			sqrt_price_next: price_one_point_zero_one(),
			amount_in: 9975124224178055u128.into(),
			amount_out: 9925619580021728u128.into(),
			fee_amount: 5988667735148u128.into(),
		}
	);
	assert!(step.amount_in + step.fee_amount < U256::from(ONE_E18));
}

#[test]
fn exact_output_capped_at_price_target() {
	let step = assert_ok!(compute_swap_step(
		price_one(),
		price_one_point_zero_one(),
		2 * ONE_E18,
		SwapAmount::ExactOutput(ONE_E18.into()),
		600,
	));

	assert_eq!(
		step,
		SwapStep {
			sqrt_price_next: price_one_point_zero_one(),
			amount_in: 9975124224178055u128.into(),
			amount_out: 9925619580021728u128.into(),
			fee_amount: 5988667735148u128.into(),
		}
	);
	assert!(step.amount_out < U256::from(ONE_E18));
}

#[test]
fn exact_input_fully_spent() {
	// sqrt(10)
	let target = dec("250541448375047931186413801569");
	let step = assert_ok!(compute_swap_step(
		price_one(),
		target,
		2 * ONE_E18,
		SwapAmount::ExactInput(ONE_E18.into()),
		600,
	));

	assert_eq!(step.amount_in, 999400000000000000u128.into());
	assert_eq!(step.fee_amount, 600000000000000u128.into());
	assert_eq!(step.amount_out, 666399946655997866u128.into());
	assert_eq!(step.amount_in + step.fee_amount, U256::from(ONE_E18));
	assert!(step.sqrt_price_next < target);
	assert_eq!(step.sqrt_price_next, dec("118818475322642227089037862318"));
}

#[test]
fn exact_output_is_capped_at_the_requested_amount() {
	let step = assert_ok!(compute_swap_step(
		dec("417332158212080721273783715441582"),
		dec("1452870262520218020823638996"),
		159344665391607089467575320103,
		SwapAmount::ExactOutput(1.into()),
		1,
	));

	assert_eq!(
		step,
		SwapStep {
			sqrt_price_next: dec("417332158212080721273783715441581"),
			amount_in: 1.into(),
			amount_out: 1.into(),
			fee_amount: 1.into(),
		}
	);
}

#[test]
fn target_price_of_one_uses_partial_input() {
	let step = assert_ok!(compute_swap_step(
		2.into(),
		1.into(),
		1,
		SwapAmount::ExactInput(dec("3915081100057732413702495386755767")),
		1,
	));

	assert_eq!(step.sqrt_price_next, 1.into());
	assert_eq!(step.amount_in, dec("39614081257132168796771975168"));
	assert_eq!(step.fee_amount, dec("39614120871253040049813"));
	assert_eq!(step.amount_out, 0.into());
	assert!(step.amount_in + step.fee_amount < dec("3915081100057732413702495386755767"));
}

#[test]
fn entire_input_taken_as_fee() {
	let step = assert_ok!(compute_swap_step(
		2413.into(),
		dec("79887613182836312"),
		1985041575832132834610021537970,
		SwapAmount::ExactInput(10.into()),
		1872,
	));

	assert_eq!(
		step,
		SwapStep {
			sqrt_price_next: 2413.into(),
			amount_in: 0.into(),
			amount_out: 0.into(),
			fee_amount: 10.into(),
		}
	);
}

#[test]
fn insufficient_liquidity_for_exact_output() {
	let price = U256::one() << 104;

	let step = assert_ok!(compute_swap_step(
		price,
		price * 11 / 10,
		1024,
		SwapAmount::ExactOutput(4.into()),
		3000,
	));
	assert_eq!(
		step,
		SwapStep {
			sqrt_price_next: price * 11 / 10,
			amount_in: 26215.into(),
			amount_out: 0.into(),
			fee_amount: 79.into(),
		}
	);

	let step = assert_ok!(compute_swap_step(
		price,
		price * 9 / 10,
		1024,
		SwapAmount::ExactOutput(263000.into()),
		3000,
	));
	assert_eq!(
		step,
		SwapStep {
			sqrt_price_next: price * 9 / 10,
			amount_in: 1.into(),
			amount_out: 26214.into(),
			fee_amount: 1.into(),
		}
	);
}

#[test]
fn zero_liquidity_moves_straight_to_target() {
	let target = price_one_point_zero_one();
	let step = assert_ok!(compute_swap_step(
		price_one(),
		target,
		0,
		SwapAmount::ExactInput(ONE_E18.into()),
		3000,
	));
	assert_eq!(step, SwapStep { sqrt_price_next: target, ..Default::default() });
}

#[test]
fn rejects_fee_of_one_hundred_percent() {
	assert_err!(
		compute_swap_step(
			price_one(),
			price_one_point_zero_one(),
			ONE_E18,
			SwapAmount::ExactInput(1.into()),
			ONE_IN_HUNDREDTH_PIPS,
		),
		MathError::FeeOutOfRange
	);
}

#[test]
fn random_steps_respect_bounds() {
	let mut rng = rand::rngs::StdRng::from_seed([7; 32]);

	for _ in 0..2000 {
		let current = sqrt_price_at_tick(rng.gen_range(MIN_TICK..MAX_TICK)).unwrap();
		let target = sqrt_price_at_tick(rng.gen_range(MIN_TICK..MAX_TICK)).unwrap();
		let liquidity = rng.gen_range(1..u128::MAX >> 20);
		let amount = Amount::from(rng.gen::<u128>());
		let fee = rng.gen_range(0..ONE_IN_HUNDREDTH_PIPS / 2);
		let swap_amount = if rng.gen() {
			SwapAmount::ExactInput(amount)
		} else {
			SwapAmount::ExactOutput(amount)
		};

		let step = compute_swap_step(current, target, liquidity, swap_amount, fee).unwrap();

		// The price moves towards the target and never past it
		if current >= target {
			assert!(target <= step.sqrt_price_next && step.sqrt_price_next <= current);
		} else {
			assert!(current <= step.sqrt_price_next && step.sqrt_price_next <= target);
		}

		match swap_amount {
			SwapAmount::ExactInput(amount) => {
				assert!(step.amount_in + step.fee_amount <= amount);
				if step.sqrt_price_next != target {
					assert_eq!(step.amount_in + step.fee_amount, amount);
				}
			},
			SwapAmount::ExactOutput(amount) => {
				assert!(step.amount_out <= amount);
				if step.sqrt_price_next != target {
					assert_eq!(step.amount_out, amount);
				}
			},
		}
	}
}
