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

//! A concentrated liquidity market maker for one pair of tokens. Liquidity providers add
//! liquidity over tick ranges, swaps move the price through those ranges, and the fees they pay
//! are shared among the liquidity in range. The pool also keeps a ring buffer of price
//! observations for time weighted averages.
//!
//! The pool never holds tokens itself. Every operation that moves tokens reports the amounts to a
//! settlement callback, and only takes effect if the callback succeeds.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod common;
pub mod config;
pub mod error;
pub mod ledger;
pub mod oracle;
pub mod pool;
#[cfg(feature = "std")]
pub mod shared;
pub mod tick_bitmap;

pub use cl_amm_math as math;

pub use common::{Side, SideMap};
pub use config::{CircuitBreaker, PoolConfig, PoolParameters, ProtocolFee};
pub use error::{PoolError, SettlementError};
pub use pool::{
	BurnOutcome, MintOutcome, Pool, PoolSnapshot, PoolStatus, PositionInfo, Size, Slot0,
	SwapOutcome,
};
#[cfg(feature = "std")]
pub use shared::SharedPool;
