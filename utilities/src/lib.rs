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

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "test-utils")]
pub mod testing;

/// Unwraps an `Ok(_)`, panicking with the debug representation of the error otherwise.
#[macro_export]
macro_rules! assert_ok {
	($result:expr) => {
		match $result {
			Ok(ok) => ok,
			Err(err) => panic!("expected Ok(_) from '{}', got Err({:?})", stringify!($result), err),
		}
	};
}

/// Unwraps an `Err(_)`, panicking if the expression succeeded.
#[macro_export]
macro_rules! assert_err {
	($result:expr) => {
		match $result {
			Ok(_) => panic!("expected Err(_) from '{}', got Ok(_)", stringify!($result)),
			Err(err) => err,
		}
	};
	($result:expr, $expected:expr) => {
		assert_eq!($crate::assert_err!($result), $expected)
	};
}
