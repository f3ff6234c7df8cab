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

//! Time weighted price history. The pool records at most one observation per timestamp into a
//! circular buffer. Each observation holds running sums of the tick and of `1 / liquidity` over
//! time, so the average over any window still covered by the buffer is the difference of two
//! (possibly interpolated) observations divided by the window length.
//!
//! The buffer is only ever grown, and grows lazily: [Observatory::grow] reserves slots, but they
//! only join the ring once the write index wraps around to them.


use codec::{Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};
use sp_core::U256;
use sp_std::vec::Vec;

use crate::math::{mul_div_floor_checked, Liquidity, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum OracleError {
	#[cfg_attr(feature = "std", error("the oracle is already initialized"))]
	AlreadyInitialized,
	#[cfg_attr(feature = "std", error("the oracle is not initialized"))]
	NotInitialized,
	/// The requested time is before the oldest observation still stored.
	#[cfg_attr(feature = "std", error("the requested observation is older than the oldest stored"))]
	ObservationTooOld,
	#[cfg_attr(feature = "std", error("tick cumulative overflowed"))]
	CumulativeOverflow,
	/// Observations can only be written in time order.
	#[cfg_attr(feature = "std", error("timestamp is before the latest observation"))]
	NonMonotonicTimestamp,
}

#[derive(
	Clone,
	Copy,
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
pub struct Observation {
	/// Seconds.
	pub block_timestamp: u64,
	/// Sum of `tick * seconds` since the oracle was initialized.
	pub tick_cumulative: i128,
	/// Sum of `seconds / max(liquidity, 1)` as a Q128.128, wrapping on overflow. Only differences
	/// between two values are meaningful.
	pub seconds_per_liquidity_cumulative_x128: U256,
	/// `false` for slots reserved by `grow` that haven't been written yet.
	pub initialized: bool,
}

impl Observation {
	/// The observation that would be written at `block_timestamp`, if `tick` and `liquidity` were
	/// in effect since `self` was written.
	fn transform(
		&self,
		block_timestamp: u64,
		tick: Tick,
		liquidity: Liquidity,
	) -> Result<Observation, OracleError> {
		let delta = block_timestamp
			.checked_sub(self.block_timestamp)
			.ok_or(OracleError::NonMonotonicTimestamp)?;

		Ok(Observation {
			block_timestamp,
			tick_cumulative: (tick as i128)
				.checked_mul(delta as i128)
				.and_then(|tick_seconds| self.tick_cumulative.checked_add(tick_seconds))
				.ok_or(OracleError::CumulativeOverflow)?,
			seconds_per_liquidity_cumulative_x128: self
				.seconds_per_liquidity_cumulative_x128
				.overflowing_add(
					(U256::from(delta) << 128) / U256::from(core::cmp::max(liquidity, 1)),
				)
				.0,
			initialized: true,
		})
	}
}

/// The result of [Observatory::prepare_write], which can be applied once the operation causing
/// the write is known to succeed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingWrite {
	index: u16,
	cardinality: u16,
	observation: Observation,
}

impl PendingWrite {
	pub fn index(&self) -> u16 {
		self.index
	}

	pub fn cardinality(&self) -> u16 {
		self.cardinality
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq, TypeInfo, Encode, Decode, Serialize, Deserialize)]
pub struct Observatory {
	/// May be longer than the pool's cardinality, the extra slots have been reserved by `grow`.
	observations: Vec<Observation>,
}

impl Observatory {
	pub fn new() -> Self {
		Self::default()
	}

	/// The observation at the given slot, if it exists.
	pub fn observation(&self, index: u16) -> Option<&Observation> {
		self.observations.get(index as usize)
	}

	fn at(&self, index: u32) -> Result<Observation, OracleError> {
		self.observations.get(index as usize).copied().ok_or(OracleError::NotInitialized)
	}

	/// Writes the first observation. Returns the initial cardinality and cardinality target.
	///
	/// This function never panics
	pub fn initialize(&mut self, time: u64) -> Result<(u16, u16), OracleError> {
		if !self.observations.is_empty() {
			return Err(OracleError::AlreadyInitialized)
		}
		self.observations.push(Observation {
			block_timestamp: time,
			tick_cumulative: 0,
			seconds_per_liquidity_cumulative_x128: U256::zero(),
			initialized: true,
		});
		Ok((1, 1))
	}

	/// Computes the observation `write` would store, without storing it. Returns `None` if an
	/// observation has already been written at `time`, in which case nothing needs to be written.
	///
	/// This function never panics
	pub fn prepare_write(
		&self,
		index: u16,
		time: u64,
		tick: Tick,
		liquidity: Liquidity,
		cardinality: u16,
		cardinality_next: u16,
	) -> Result<Option<PendingWrite>, OracleError> {
		if cardinality == 0 {
			return Err(OracleError::NotInitialized)
		}
		let last = self.at(index as u32)?;

		if last.block_timestamp == time {
			return Ok(None)
		}

		// The ring only grows once the last slot of the current ring has been written
		let cardinality = if cardinality_next > cardinality && index == cardinality - 1 {
			cardinality_next
		} else {
			cardinality
		};
		let index = ((index as u32 + 1) % cardinality as u32) as u16;
		if index as usize >= self.observations.len() {
			return Err(OracleError::NotInitialized)
		}

		Ok(Some(PendingWrite {
			index,
			cardinality,
			observation: last.transform(time, tick, liquidity)?,
		}))
	}

	/// Stores a write prepared by [Self::prepare_write] and returns the new index and cardinality.
	///
	/// This function never panics
	pub fn apply(&mut self, pending: PendingWrite) -> (u16, u16) {
		if let Some(slot) = self.observations.get_mut(pending.index as usize) {
			*slot = pending.observation;
		}
		(pending.index, pending.cardinality)
	}

	/// Records the state in effect since the last write. `tick` and `liquidity` must be the values
	/// as they were *before* whatever change triggered this write. Returns the new index and
	/// cardinality, which are unchanged if an observation was already written at `time`.
	///
	/// This function never panics
	pub fn write(
		&mut self,
		index: u16,
		time: u64,
		tick: Tick,
		liquidity: Liquidity,
		cardinality: u16,
		cardinality_next: u16,
	) -> Result<(u16, u16), OracleError> {
		Ok(
			match self.prepare_write(index, time, tick, liquidity, cardinality, cardinality_next)? {
				Some(pending) => self.apply(pending),
				None => (index, cardinality),
			},
		)
	}

	/// Reserves slots so that the ring can hold `next` observations, returning the new cardinality
	/// target. Never shrinks.
	///
	/// This function never panics
	pub fn grow(&mut self, current: u16, next: u16) -> Result<u16, OracleError> {
		if current == 0 || self.observations.is_empty() {
			return Err(OracleError::NotInitialized)
		}
		if next <= current {
			return Ok(current)
		}
		if self.observations.len() < next as usize {
			log::debug!("Growing observation buffer from {} to {} slots", current, next);
			self.observations.resize(next as usize, Observation::default());
		}
		Ok(next)
	}

	/// Finds the two stored observations `target` falls between, given that `target` is no later
	/// than the newest observation and no earlier than the oldest.
	fn binary_search(
		&self,
		target: u64,
		index: u16,
		cardinality: u16,
	) -> Result<(Observation, Observation), OracleError> {
		let cardinality = cardinality as u32;
		// oldest observation
		let mut l = (index as u32 + 1) % cardinality;
		// newest observation
		let mut r = l + cardinality - 1;

		while l <= r {
			let i = (l + r) / 2;
			let before_or_at = self.at(i % cardinality)?;

			// Reserved but unwritten slot, the oldest observation is further along
			if !before_or_at.initialized {
				l = i + 1;
				continue
			}

			let at_or_after = self.at((i + 1) % cardinality)?;
			let target_at_or_after = before_or_at.block_timestamp <= target;

			if target_at_or_after && target <= at_or_after.block_timestamp {
				return Ok((before_or_at, at_or_after))
			}

			if target_at_or_after {
				l = i + 1;
			} else {
				match i.checked_sub(1) {
					Some(i) => r = i,
					None => break,
				}
			}
		}

		Err(OracleError::ObservationTooOld)
	}

	fn surrounding_observations(
		&self,
		target: u64,
		tick: Tick,
		index: u16,
		liquidity: Liquidity,
		cardinality: u16,
	) -> Result<(Observation, Observation), OracleError> {
		let newest = self.at(index as u32)?;

		if newest.block_timestamp <= target {
			return Ok(if newest.block_timestamp == target {
				(newest, newest)
			} else {
				(newest, newest.transform(target, tick, liquidity)?)
			})
		}

		let oldest = match self.at((index as u32 + 1) % cardinality as u32)? {
			oldest if oldest.initialized => oldest,
			// The ring hasn't wrapped yet
			_ => self.at(0)?,
		};

		if target < oldest.block_timestamp {
			return Err(OracleError::ObservationTooOld)
		}

		self.binary_search(target, index, cardinality)
	}

	/// The cumulatives as of `seconds_ago` before `time`. A look back past the newest observation
	/// is extrapolated using the current `tick` and `liquidity`, and a look back between two
	/// observations is interpolated.
	///
	/// This function never panics
	pub fn observe_single(
		&self,
		time: u64,
		seconds_ago: u64,
		tick: Tick,
		index: u16,
		liquidity: Liquidity,
		cardinality: u16,
	) -> Result<(i128, U256), OracleError> {
		if cardinality == 0 {
			return Err(OracleError::NotInitialized)
		}

		if seconds_ago == 0 {
			let newest = self.at(index as u32)?;
			let newest = if newest.block_timestamp != time {
				newest.transform(time, tick, liquidity)?
			} else {
				newest
			};
			return Ok((newest.tick_cumulative, newest.seconds_per_liquidity_cumulative_x128))
		}

		let target = time.checked_sub(seconds_ago).ok_or(OracleError::ObservationTooOld)?;

		let (before_or_at, at_or_after) =
			self.surrounding_observations(target, tick, index, liquidity, cardinality)?;

		if target == before_or_at.block_timestamp {
			Ok((before_or_at.tick_cumulative, before_or_at.seconds_per_liquidity_cumulative_x128))
		} else if target == at_or_after.block_timestamp {
			Ok((at_or_after.tick_cumulative, at_or_after.seconds_per_liquidity_cumulative_x128))
		} else {
			let observation_time_delta = at_or_after.block_timestamp - before_or_at.block_timestamp;
			let target_delta = target - before_or_at.block_timestamp;

			Ok((
				// Divides first so the product cannot overflow, and so the result matches the
				// average tick over the interval
				before_or_at.tick_cumulative +
					(at_or_after.tick_cumulative - before_or_at.tick_cumulative) /
						observation_time_delta as i128 *
						target_delta as i128,
				before_or_at
					.seconds_per_liquidity_cumulative_x128
					.overflowing_add(
						mul_div_floor_checked(
							at_or_after
								.seconds_per_liquidity_cumulative_x128
								.overflowing_sub(before_or_at.seconds_per_liquidity_cumulative_x128)
								.0,
							U256::from(target_delta),
							U256::from(observation_time_delta),
						)
						.ok_or(OracleError::CumulativeOverflow)?,
					)
					.0,
			))
		}
	}

	/// [Self::observe_single] for each of `seconds_agos`.
	///
	/// This function never panics
	pub fn observe(
		&self,
		time: u64,
		seconds_agos: &[u64],
		tick: Tick,
		index: u16,
		liquidity: Liquidity,
		cardinality: u16,
	) -> Result<(Vec<i128>, Vec<U256>), OracleError> {
		if cardinality == 0 {
			return Err(OracleError::NotInitialized)
		}

		seconds_agos
			.iter()
			.map(|seconds_ago| {
				self.observe_single(time, *seconds_ago, tick, index, liquidity, cardinality)
			})
			.collect::<Result<Vec<_>, _>>()
			.map(|observations| observations.into_iter().unzip())
	}
}
