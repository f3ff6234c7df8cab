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

//! A packed index of the ticks that have liquidity referencing them. Ticks are divided by the
//! pool's tick spacing ("compressed") and each compressed tick is one bit in a 256 bit word, so
//! finding the next initialized tick only ever inspects one word at a time.


use codec::{Decode, Encode};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};
use sp_core::U256;
use sp_std::collections::btree_map::BTreeMap;

use crate::math::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum TickIndexError {
	/// The tick is not a multiple of the tick spacing.
	#[cfg_attr(feature = "std", error("tick is not a multiple of the tick spacing"))]
	MisalignedTick,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, TypeInfo, Encode, Decode, Serialize, Deserialize)]
pub struct TickBitmap {
	/// Only non-zero words are stored.
	words: BTreeMap<i16, U256>,
}

/// Rounds towards negative infinity, so that negative ticks that aren't multiples of the spacing
/// land in the compressed tick below them.
fn compress(tick: Tick, tick_spacing: Tick) -> i32 {
	tick.div_euclid(tick_spacing)
}

/// The word and bit a compressed tick is stored at.
fn position(compressed: i32) -> (i16, u8) {
	// Valid ticks are within ±887272, so the word position always fits in an i16
	((compressed >> 8) as i16, (compressed & 0xff) as u8)
}

fn most_significant_bit(word: U256) -> u8 {
	(255 - word.leading_zeros()) as u8
}

fn least_significant_bit(word: U256) -> u8 {
	word.trailing_zeros() as u8
}

impl TickBitmap {
	pub fn new() -> Self {
		Self::default()
	}

	fn word(&self, word_position: i16) -> U256 {
		self.words.get(&word_position).copied().unwrap_or_default()
	}

	/// Toggles the bit for `tick`.
	///
	/// This function never panics
	pub fn flip_tick(&mut self, tick: Tick, tick_spacing: Tick) -> Result<(), TickIndexError> {
		if tick_spacing <= 0 || tick % tick_spacing != 0 {
			return Err(TickIndexError::MisalignedTick)
		}
		let (word_position, bit_position) = position(compress(tick, tick_spacing));
		let word = self.word(word_position) ^ (U256::one() << bit_position);
		if word.is_zero() {
			self.words.remove(&word_position);
		} else {
			self.words.insert(word_position, word);
		}
		Ok(())
	}

	pub fn is_initialized(&self, tick: Tick, tick_spacing: Tick) -> bool {
		if tick_spacing <= 0 || tick % tick_spacing != 0 {
			return false
		}
		let (word_position, bit_position) = position(compress(tick, tick_spacing));
		self.word(word_position).bit(bit_position as usize)
	}

	/// Returns the next initialized tick in the same word as `tick`, searching at or below `tick`
	/// if `lte`, otherwise strictly above it. If there is no initialized tick in the word, the
	/// furthest tick of the word is returned with `false`, so the caller can continue the search
	/// from there. Returned ticks may be outside of the valid tick range.
	///
	/// `tick_spacing` must be positive.
	pub fn next_initialized_tick_within_one_word(
		&self,
		tick: Tick,
		tick_spacing: Tick,
		lte: bool,
	) -> (Tick, bool) {
		debug_assert!(tick_spacing > 0);
		let compressed = compress(tick, tick_spacing);

		if lte {
			let (word_position, bit_position) = position(compressed);
			// all the 1s at or to the right of the current bit_position
			let mask = ((U256::one() << bit_position) - 1) + (U256::one() << bit_position);
			let masked = self.word(word_position) & mask;

			if masked.is_zero() {
				((compressed - bit_position as i32) * tick_spacing, false)
			} else {
				(
					(compressed - (bit_position - most_significant_bit(masked)) as i32) *
						tick_spacing,
					true,
				)
			}
		} else {
			// start from the word of the next tick, since the current tick state doesn't matter
			let (word_position, bit_position) = position(compressed + 1);
			// all the 1s at or to the left of the bit_position
			let mask = !((U256::one() << bit_position) - 1);
			let masked = self.word(word_position) & mask;

			if masked.is_zero() {
				((compressed + 1 + (u8::MAX - bit_position) as i32) * tick_spacing, false)
			} else {
				(
					(compressed + 1 + (least_significant_bit(masked) - bit_position) as i32) *
						tick_spacing,
					true,
				)
			}
		}
	}

	/// All initialized ticks in ascending order.
	pub fn initialized_ticks(&self, tick_spacing: Tick) -> impl '_ + Iterator<Item = Tick> {
		self.words.iter().flat_map(move |(word_position, word)| {
			(0u16..256)
				.filter(move |bit| word.bit(*bit as usize))
				.map(move |bit| ((*word_position as i32) * 256 + bit as i32) * tick_spacing)
		})
	}
}
