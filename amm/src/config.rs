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

use crate::{
	common::Side,
	error::PoolError,
	ledger::max_liquidity_per_tick,
	math::{Liquidity, Tick, MAX_FEE_HUNDREDTH_PIPS, MAX_TICK, MIN_TICK},
};

/// Tick spacing is bounded so the tick bitmap never has to search more than a few words to move
/// between usable ticks.
pub const MAX_TICK_SPACING: Tick = 16384;

/// The share of each swap fee that goes to the protocol instead of liquidity providers, per input
/// token. Zero disables the protocol fee, otherwise `1/n` of the fee is taken.
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
#[serde(deny_unknown_fields)]
pub struct ProtocolFee {
	pub token0: u8,
	pub token1: u8,
}

impl ProtocolFee {
	pub const OFF: Self = Self { token0: 0, token1: 0 };

	pub fn denominator(&self, side: Side) -> u8 {
		match side {
			Side::Zero => self.token0,
			Side::One => self.token1,
		}
	}

	pub fn validate(&self) -> Result<(), PoolError> {
		if [self.token0, self.token1]
			.into_iter()
			.all(|denominator| denominator == 0 || (4..=10).contains(&denominator))
		{
			Ok(())
		} else {
			Err(PoolError::InvalidProtocolFee)
		}
	}
}

/// Limits on price movement for an external policy to enforce. The pool only stores these.
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
#[serde(deny_unknown_fields)]
pub struct CircuitBreaker {
	/// The most ticks a single swap may move the price.
	pub max_tick_movement: u32,
	pub cooldown_seconds: u64,
}

impl CircuitBreaker {
	pub fn validate(&self) -> Result<(), PoolError> {
		if self.max_tick_movement == 0 || self.max_tick_movement > (MAX_TICK - MIN_TICK) as u32 {
			Err(PoolError::InvalidCircuitBreaker)
		} else {
			Ok(())
		}
	}
}

fn default_observation_cardinality_next() -> u16 {
	1
}

/// The parameters a pool is created with.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, TypeInfo, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
	/// The swap fee, `1_000_000` is 100%.
	pub fee_hundredth_pips: u32,
	/// Derived from the fee if it is one of the standard fee tiers.
	#[serde(default)]
	pub tick_spacing: Option<Tick>,
	/// Defaults to an equal share of `u128::MAX` for every usable tick.
	#[serde(default)]
	pub max_liquidity_per_tick: Option<Liquidity>,
	#[serde(default = "default_observation_cardinality_next")]
	pub observation_cardinality_next: u16,
	#[serde(default)]
	pub protocol_fee: ProtocolFee,
	#[serde(default)]
	pub circuit_breaker: Option<CircuitBreaker>,
}

/// A validated [PoolConfig] with all defaults filled in.
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
pub struct PoolParameters {
	pub fee_hundredth_pips: u32,
	pub tick_spacing: Tick,
	pub max_liquidity_per_tick: Liquidity,
}

/// The tick spacing of the standard fee tiers.
pub fn default_tick_spacing(fee_hundredth_pips: u32) -> Option<Tick> {
	match fee_hundredth_pips {
		100 => Some(1),
		500 => Some(10),
		3000 => Some(60),
		10000 => Some(200),
		_ => None,
	}
}

impl PoolConfig {
	/// A config for one of the standard fee tiers, with every other setting at its default.
	pub fn with_fee(fee_hundredth_pips: u32) -> Self {
		Self {
			fee_hundredth_pips,
			tick_spacing: None,
			max_liquidity_per_tick: None,
			observation_cardinality_next: default_observation_cardinality_next(),
			protocol_fee: ProtocolFee::OFF,
			circuit_breaker: None,
		}
	}

	/// Checks every setting and fills in the defaults.
	pub fn parameters(&self) -> Result<PoolParameters, PoolError> {
		if self.fee_hundredth_pips > MAX_FEE_HUNDREDTH_PIPS {
			return Err(PoolError::InvalidFee)
		}

		let tick_spacing = self
			.tick_spacing
			.or_else(|| default_tick_spacing(self.fee_hundredth_pips))
			.ok_or(PoolError::InvalidTickSpacing)?;
		if !(1..MAX_TICK_SPACING).contains(&tick_spacing) {
			return Err(PoolError::InvalidTickSpacing)
		}

		let max_liquidity_per_tick = match self.max_liquidity_per_tick {
			Some(0) => return Err(PoolError::ZeroLiquidity),
			Some(max) => max,
			None => max_liquidity_per_tick(tick_spacing),
		};

		self.protocol_fee.validate()?;
		if let Some(circuit_breaker) = &self.circuit_breaker {
			circuit_breaker.validate()?;
		}

		Ok(PoolParameters {
			fee_hundredth_pips: self.fee_hundredth_pips,
			tick_spacing,
			max_liquidity_per_tick,
		})
	}

	pub fn validate(&self) -> Result<(), PoolError> {
		self.parameters().map(|_| ())
	}
}

#[cfg(feature = "std")]
mod loading {
	use std::path::Path;

	use config::{Config, ConfigError, Environment, File};

	use super::PoolConfig;

	/// Prefix of environment variables that override file settings, e.g.
	/// `CLAMM__FEE_HUNDREDTH_PIPS=500`.
	pub const ENVIRONMENT_PREFIX: &str = "CLAMM";

	impl PoolConfig {
		/// Loads a config from a file, in any format the `config` crate recognises by extension,
		/// with overrides from the environment.
		pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
			let config: PoolConfig = Config::builder()
				.add_source(File::from(path.as_ref()))
				.add_source(Environment::with_prefix(ENVIRONMENT_PREFIX).separator("__"))
				.build()?
				.try_deserialize()?;

			// make sure the settings are clean
			config.validate().map_err(|e| ConfigError::Message(e.to_string()))?;

			log::debug!("Loaded pool config from {}: {:?}", path.as_ref().display(), config);

			Ok(config)
		}
	}
}

#[cfg(feature = "std")]
pub use loading::ENVIRONMENT_PREFIX;
