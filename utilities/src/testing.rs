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

use std::{io::Write, path::Path};

/// Writes `text` to a temporary file whose name ends with `suffix`, and runs `closure` with its
/// path. The file is deleted when the closure returns.
pub fn with_named_file<C: FnOnce(&Path)>(suffix: &str, text: &[u8], closure: C) {
	let mut tempfile = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
	tempfile.write_all(text).unwrap();
	tempfile.flush().unwrap();
	closure(tempfile.path());
}

/// Run at the start of a unit test to see the pool's `log` output. Safe to call from several tests,
/// only the first call installs the logger.
pub fn init_test_logger() {
	let _result = env_logger::builder()
		.is_test(true)
		.filter_level(log::LevelFilter::Trace)
		.try_init();
}
