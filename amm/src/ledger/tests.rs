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

use super::*;

type LiquidityProvider = u64;

const ALICE: LiquidityProvider = 1;
const BOB: LiquidityProvider = 2;

fn growth(zero: u64, one: u64) -> SideMap<FeeGrowthQ128F128> {
	SideMap::from_array([U256::from(zero) << 128, U256::from(one) << 128])
}

fn amounts(zero: u64, one: u64) -> SideMap<Amount> {
	SideMap::from_array([zero.into(), one.into()])
}

fn checkpoint(tick: Tick, fee_growth_global: SideMap<FeeGrowthQ128F128>) -> GlobalCheckpoint {
	GlobalCheckpoint { tick, fee_growth_global, ..Default::default() }
}

fn with_outside(fee_growth_outside: [U256; 2]) -> TickInfo {
	TickInfo {
		liquidity_gross: 1,
		fee_growth_outside: SideMap::from_array(fee_growth_outside),
		initialized: true,
		..Default::default()
	}
}

#[test]
fn max_liquidity_per_tick_by_spacing() {
	for (tick_spacing, expected) in [
		(1, 191757530477355301479181766273477u128),
		(10, 1917569901783203986719870431555990),
		(60, 11505743598341114571880798222544994),
		(200, 38350317471085141830651933667504588),
		(2302, 441351967472034323558203122479595605),
		(MAX_TICK, u128::MAX / 3),
	] {
		assert_eq!(max_liquidity_per_tick(tick_spacing), expected);
	}
}

#[test]
fn fee_growth_inside_of_uninitialized_ticks() {
	let ledger = PositionLedger::<LiquidityProvider>::new(u128::MAX);
	let global = SideMap::from_array([U256::from(15), U256::from(15)]);

	assert_eq!(ledger.fee_growth_inside(-2, 2, 0, global), global);
	assert_eq!(ledger.fee_growth_inside(-2, 2, 4, global), Default::default());
	assert_eq!(ledger.fee_growth_inside(-2, 2, -4, global), Default::default());
}

#[test]
fn fee_growth_inside_subtracts_outside_values() {
	let global = SideMap::from_array([U256::from(15), U256::from(15)]);

	let mut ledger = PositionLedger::<LiquidityProvider>::new(u128::MAX);
	ledger.ticks.insert(2, with_outside([2.into(), 3.into()]));
	assert_eq!(
		ledger.fee_growth_inside(-2, 2, 0, global),
		SideMap::from_array([13.into(), 12.into()])
	);

	let mut ledger = PositionLedger::<LiquidityProvider>::new(u128::MAX);
	ledger.ticks.insert(-2, with_outside([2.into(), 3.into()]));
	assert_eq!(
		ledger.fee_growth_inside(-2, 2, 0, global),
		SideMap::from_array([13.into(), 12.into()])
	);
}

#[test]
fn fee_growth_inside_wraps() {
	let mut ledger = PositionLedger::<LiquidityProvider>::new(u128::MAX);
	ledger.ticks.insert(-2, with_outside([U256::MAX - 3, U256::MAX - 2]));
	ledger.ticks.insert(2, with_outside([3.into(), 5.into()]));

	assert_eq!(
		ledger.fee_growth_inside(-2, 2, 0, SideMap::from_array([15.into(), 15.into()])),
		SideMap::from_array([16.into(), 13.into()])
	);
}

#[test]
fn first_update_initializes_ticks() {
	let mut ledger = PositionLedger::<LiquidityProvider>::new(u128::MAX);
	let global = GlobalCheckpoint {
		tick: 0,
		fee_growth_global: growth(1, 2),
		tick_cumulative: 30,
		seconds_per_liquidity_cumulative_x128: 40.into(),
		time: 50,
	};

	let (fees, flipped) = assert_ok!(ledger.update_position(&ALICE, -10, 10, 100, &global));
	assert_eq!(fees, amounts(0, 0));
	assert_eq!(flipped, (true, true));

	// At or below the current tick all growth so far is assumed to be below
	assert_eq!(
		ledger.tick(-10),
		Some(&TickInfo {
			liquidity_gross: 100,
			liquidity_net: 100,
			fee_growth_outside: growth(1, 2),
			tick_cumulative_outside: 30,
			seconds_per_liquidity_outside_x128: 40.into(),
			seconds_outside: 50,
			initialized: true,
		})
	);
	assert_eq!(
		ledger.tick(10),
		Some(&TickInfo {
			liquidity_gross: 100,
			liquidity_net: -100,
			initialized: true,
			..Default::default()
		})
	);

	// The inside growth at creation is zero, so no fees are owed
	assert_eq!(
		ledger.position(&ALICE, -10, 10),
		Some(&Position { liquidity: 100, ..Default::default() })
	);

	// A second position on the same ticks doesn't flip them or reseed their outside values
	let later = GlobalCheckpoint { fee_growth_global: growth(5, 5), ..global };
	let (_, flipped) = assert_ok!(ledger.update_position(&BOB, -10, 20, 50, &later));
	assert_eq!(flipped, (false, true));
	let lower = ledger.tick(-10).unwrap();
	assert_eq!((lower.liquidity_gross, lower.liquidity_net), (150, 150));
	assert_eq!(lower.fee_growth_outside, growth(1, 2));
}

#[test]
fn fees_accrue_while_in_range() {
	let mut ledger = PositionLedger::<LiquidityProvider>::new(u128::MAX);
	assert_ok!(ledger.update_position(&ALICE, -10, 10, 1000, &checkpoint(0, growth(0, 0))));

	let global = checkpoint(0, growth(5, 7));
	assert_eq!(assert_ok!(ledger.pending_fees(&ALICE, -10, 10, &global)), amounts(5000, 7000));
	let (fees, flipped) = assert_ok!(ledger.update_position(&ALICE, -10, 10, 0, &global));
	assert_eq!(fees, amounts(5000, 7000));
	assert_eq!(flipped, (false, false));
	assert_eq!(
		ledger.position(&ALICE, -10, 10),
		Some(&Position {
			liquidity: 1000,
			fee_growth_inside_last: growth(5, 7),
			tokens_owed: amounts(5000, 7000),
		})
	);

	// The price leaves the range upwards, growth above it isn't credited
	assert_eq!(ledger.cross(10, &global), -1000);
	let global = checkpoint(10, growth(6, 9));
	assert_eq!(assert_ok!(ledger.pending_fees(&ALICE, -10, 10, &global)), amounts(0, 0));
	let (fees, _) = assert_ok!(ledger.update_position(&ALICE, -10, 10, 0, &global));
	assert_eq!(fees, amounts(0, 0));

	// and back down again
	assert_eq!(ledger.cross(10, &global), -1000);
	let global = checkpoint(9, growth(8, 9));
	assert_eq!(assert_ok!(ledger.pending_fees(&ALICE, -10, 10, &global)), amounts(2000, 0));
}

#[test]
fn fees_are_shared_by_liquidity() {
	let mut ledger = PositionLedger::<LiquidityProvider>::new(u128::MAX);
	let start = checkpoint(0, growth(0, 0));
	assert_ok!(ledger.update_position(&ALICE, -10, 10, 300, &start));
	assert_ok!(ledger.update_position(&BOB, -20, 20, 100, &start));

	// 4000 units of token zero over 400 liquidity
	let global = checkpoint(0, growth(10, 0));
	assert_eq!(assert_ok!(ledger.pending_fees(&ALICE, -10, 10, &global)), amounts(3000, 0));
	assert_eq!(assert_ok!(ledger.pending_fees(&BOB, -20, 20, &global)), amounts(1000, 0));
}

#[test]
fn removing_all_liquidity_clears_ticks() {
	let mut ledger = PositionLedger::<LiquidityProvider>::new(u128::MAX);
	let start = checkpoint(0, growth(0, 0));
	assert_ok!(ledger.update_position(&ALICE, -10, 10, 100, &start));

	let global = checkpoint(0, growth(1, 0));
	let (fees, flipped) = assert_ok!(ledger.update_position(&ALICE, -10, 10, -100, &global));
	assert_eq!(fees, amounts(100, 0));
	assert_eq!(flipped, (true, true));
	assert_eq!(ledger.tick(-10), None);
	assert_eq!(ledger.tick(10), None);
	assert_eq!(ledger.ticks().count(), 0);

	// The empty position is kept, with its owed fees
	let position = ledger.position(&ALICE, -10, 10).cloned().unwrap();
	assert_eq!(position.liquidity, 0);
	assert_eq!(position.tokens_owed, amounts(100, 0));

	// Poking an empty position changes nothing
	let before = ledger.clone();
	let (fees, _) =
		assert_ok!(ledger.update_position(&ALICE, -10, 10, 0, &checkpoint(0, growth(9, 9))));
	assert_eq!(fees, amounts(0, 0));
	assert_eq!(ledger, before);
}

#[test]
fn invalid_updates_are_rejected() {
	let mut ledger = PositionLedger::<LiquidityProvider>::new(1000);
	let global = checkpoint(0, growth(0, 0));

	assert_err!(ledger.update_position(&ALICE, -10, 10, 0, &global), LedgerError::PositionNotFound);
	assert_err!(
		ledger.update_position(&ALICE, -10, 10, -1, &global),
		LedgerError::PositionNotFound
	);
	assert_err!(
		ledger.update_position(&ALICE, -10, 10, 1001, &global),
		LedgerError::LiquidityOverflow
	);

	assert_ok!(ledger.update_position(&ALICE, -10, 10, 600, &global));
	// The shared lower tick would exceed its cap
	assert_err!(
		ledger.update_position(&BOB, -10, 20, 401, &global),
		LedgerError::LiquidityOverflow
	);
	assert_err!(
		ledger.update_position(&ALICE, -10, 10, -601, &global),
		LedgerError::PositionLacksLiquidity
	);
	assert_err!(ledger.update_position(&BOB, -10, 10, -1, &global), LedgerError::PositionNotFound);

	// Bob's range shares a tick, but that doesn't let him burn Alice's liquidity
	assert_ok!(ledger.update_position(&BOB, -10, 20, 10, &global));
	assert_err!(
		ledger.update_position(&BOB, -10, 20, -11, &global),
		LedgerError::PositionLacksLiquidity
	);
}

#[test]
fn staged_updates_change_nothing_until_applied() {
	let mut ledger = PositionLedger::<LiquidityProvider>::new(u128::MAX);
	let global = checkpoint(0, growth(0, 0));
	let before = ledger.clone();

	let update = assert_ok!(ledger.stage_update(&ALICE, -10, 10, 100, &global));
	assert_eq!(ledger, before);
	assert_eq!(update.position().liquidity, 100);
	assert_eq!(update.flipped(), (true, true));

	ledger.apply(update);
	assert_eq!(ledger.position(&ALICE, -10, 10).map(|position| position.liquidity), Some(100));
}

#[test]
fn crossing_flips_outside_values() {
	let mut ledger = PositionLedger::<LiquidityProvider>::new(u128::MAX);
	assert_ok!(ledger.update_position(&ALICE, -10, 10, 100, &checkpoint(0, growth(0, 0))));
	ledger.ticks.insert(
		10,
		TickInfo {
			liquidity_gross: 100,
			liquidity_net: -100,
			fee_growth_outside: growth(1, 2),
			tick_cumulative_outside: 10,
			seconds_per_liquidity_outside_x128: 20.into(),
			seconds_outside: 30,
			initialized: true,
		},
	);

	let global = GlobalCheckpoint {
		tick: 10,
		fee_growth_global: growth(4, 4),
		tick_cumulative: 15,
		seconds_per_liquidity_cumulative_x128: 25.into(),
		time: 35,
	};
	let crossing = ledger.stage_cross(10, &global).unwrap();
	assert_eq!((crossing.tick(), crossing.liquidity_net()), (10, -100));
	ledger.apply_cross(crossing);
	assert_eq!(
		ledger.tick(10),
		Some(&TickInfo {
			liquidity_gross: 100,
			liquidity_net: -100,
			fee_growth_outside: growth(3, 2),
			tick_cumulative_outside: 5,
			seconds_per_liquidity_outside_x128: 5.into(),
			seconds_outside: 5,
			initialized: true,
		})
	);

	// Uninitialized ticks are never crossed
	assert_eq!(ledger.stage_cross(20, &global), None);
	assert_eq!(ledger.cross(20, &global), 0);
}

#[test]
fn staged_updates_credit_and_collect() {
	let mut ledger = PositionLedger::<LiquidityProvider>::new(u128::MAX);
	assert_ok!(ledger.update_position(&ALICE, -10, 10, 10, &checkpoint(0, growth(0, 0))));

	let mut update = assert_ok!(ledger.stage_update(&ALICE, -10, 10, 0, &checkpoint(0, growth(3, 4))));
	assert_eq!(update.fees_accrued(), amounts(30, 40));
	assert_ok!(update.credit(amounts(5, 0)));
	assert_eq!(update.position().tokens_owed, amounts(35, 40));

	assert_eq!(update.collect(amounts(50, 10)), amounts(35, 10));
	assert_eq!(update.position().tokens_owed, amounts(0, 30));

	let mut overflowing = update.clone();
	assert_err!(overflowing.credit(SideMap::from_array([U256::zero(), U256::MAX])), LedgerError::AmountOverflow);

	ledger.apply(update);
	assert_eq!(ledger.position(&ALICE, -10, 10).unwrap().tokens_owed, amounts(0, 30));
}
