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

use core::convert::Infallible;

use crate::{ledger::LedgerError, math::MathError, oracle::OracleError, tick_bitmap::TickIndexError};

/// Every way a pool operation can fail. An operation that returns an error has not changed the
/// pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum PoolError {
	#[cfg_attr(feature = "std", error("{0}"))]
	Math(MathError),
	#[cfg_attr(feature = "std", error("{0}"))]
	TickIndex(TickIndexError),
	#[cfg_attr(feature = "std", error("{0}"))]
	Oracle(OracleError),
	#[cfg_attr(feature = "std", error("the pool has not been initialized"))]
	NotInitialized,
	#[cfg_attr(feature = "std", error("the pool is already initialized"))]
	AlreadyInitialized,
	/// Another operation on the pool is in progress, i.e. the call was made from inside a
	/// settlement callback.
	#[cfg_attr(feature = "std", error("the pool is locked"))]
	Locked,
	/// The lower tick must be less than the upper tick, and both must be valid ticks.
	#[cfg_attr(feature = "std", error("invalid tick range"))]
	InvalidTickRange,
	#[cfg_attr(feature = "std", error("tick is not a multiple of the tick spacing"))]
	MisalignedTick,
	#[cfg_attr(feature = "std", error("swap amount is zero"))]
	ZeroAmountSpecified,
	#[cfg_attr(feature = "std", error("liquidity is zero"))]
	ZeroLiquidity,
	/// The price limit is not in the direction the swap moves the price.
	#[cfg_attr(feature = "std", error("price limit is on the wrong side of the current price"))]
	PriceLimitOnWrongSide,
	#[cfg_attr(feature = "std", error("price limit is outside of the supported range"))]
	PriceLimitOutOfRange,
	#[cfg_attr(feature = "std", error("liquidity exceeds the maximum allowed"))]
	LiquidityOverflow,
	#[cfg_attr(feature = "std", error("position does not exist"))]
	PositionNotFound,
	#[cfg_attr(feature = "std", error("position does not have enough liquidity"))]
	PositionLacksLiquidity,
	/// The minimum amounts of a mint cannot be met with the maximum amounts at the current price.
	#[cfg_attr(feature = "std", error("the requested amounts cannot be achieved at the current price"))]
	AssetRatioUnachievable,
	#[cfg_attr(feature = "std", error("fee is out of range"))]
	InvalidFee,
	#[cfg_attr(feature = "std", error("invalid tick spacing"))]
	InvalidTickSpacing,
	#[cfg_attr(feature = "std", error("invalid protocol fee"))]
	InvalidProtocolFee,
	#[cfg_attr(feature = "std", error("invalid circuit breaker parameters"))]
	InvalidCircuitBreaker,
	/// A time weighted average was requested over zero seconds.
	#[cfg_attr(feature = "std", error("averaging window is empty"))]
	EmptyWindow,
}

impl From<MathError> for PoolError {
	fn from(error: MathError) -> Self {
		PoolError::Math(error)
	}
}

impl From<TickIndexError> for PoolError {
	fn from(error: TickIndexError) -> Self {
		PoolError::TickIndex(error)
	}
}

impl From<OracleError> for PoolError {
	fn from(error: OracleError) -> Self {
		PoolError::Oracle(error)
	}
}

impl From<LedgerError> for PoolError {
	fn from(error: LedgerError) -> Self {
		match error {
			LedgerError::LiquidityOverflow => PoolError::LiquidityOverflow,
			LedgerError::PositionLacksLiquidity => PoolError::PositionLacksLiquidity,
			LedgerError::PositionNotFound => PoolError::PositionNotFound,
			LedgerError::AmountOverflow => PoolError::Math(MathError::AmountOverflow),
		}
	}
}

/// The error of an operation that settles token amounts through a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum SettlementError<E> {
	/// The pool rejected the operation before the callback was called.
	#[cfg_attr(feature = "std", error("{0}"))]
	Pool(PoolError),
	/// The callback failed, the pool is unchanged.
	#[cfg_attr(feature = "std", error("settlement failed: {0:?}"))]
	Callback(E),
}

impl<E> From<PoolError> for SettlementError<E> {
	fn from(error: PoolError) -> Self {
		SettlementError::Pool(error)
	}
}

impl From<SettlementError<Infallible>> for PoolError {
	fn from(error: SettlementError<Infallible>) -> Self {
		match error {
			SettlementError::Pool(error) => error,
			SettlementError::Callback(infallible) => match infallible {},
		}
	}
}
