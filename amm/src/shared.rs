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

//! A pool that can be shared between threads and handed to settlement callbacks.

#[cfg(test)]
mod tests;

use std::{cell::RefCell, sync::Arc};

use parking_lot::ReentrantMutex;

use crate::{error::PoolError, pool::Pool};

/// Calls from other threads wait for the current operation to finish. A call made on the same
/// thread while an operation is in progress, i.e. from inside one of its settlement callbacks, fails
/// with [PoolError::Locked] instead of deadlocking.
pub struct SharedPool<LiquidityProvider: Ord>(Arc<ReentrantMutex<RefCell<Pool<LiquidityProvider>>>>);

impl<LiquidityProvider: Ord> Clone for SharedPool<LiquidityProvider> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}

impl<LiquidityProvider: Ord> SharedPool<LiquidityProvider> {
	pub fn new(pool: Pool<LiquidityProvider>) -> Self {
		Self(Arc::new(ReentrantMutex::new(RefCell::new(pool))))
	}

	/// Runs an operation that changes the pool.
	pub fn mutate<R, E: From<PoolError>>(
		&self,
		f: impl FnOnce(&mut Pool<LiquidityProvider>) -> Result<R, E>,
	) -> Result<R, E> {
		let guard = self.0.lock();
		let mut pool = guard.try_borrow_mut().map_err(|_| {
			log::debug!("Rejected a nested call into a locked pool");
			PoolError::Locked
		})?;
		f(&mut pool)
	}

	/// Reads from the pool. Fails if called from inside a [Self::mutate].
	pub fn query<R>(&self, f: impl FnOnce(&Pool<LiquidityProvider>) -> R) -> Result<R, PoolError> {
		let guard = self.0.lock();
		let pool = guard.try_borrow().map_err(|_| PoolError::Locked)?;
		Ok(f(&pool))
	}
}
