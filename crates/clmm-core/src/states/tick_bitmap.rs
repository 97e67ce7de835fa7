//! Packed tick initialized state library
//!
//! Stores a sparse mapping of tick index to its initialized state. Although
//! ticks are stored as i32, all usable tick values fit within 24 bits, so
//! the mapping uses i16 word keys with 256 bits per word.

use ahash::AHashMap;

use crate::libraries::big_num::U256;
use crate::libraries::bit_math;

/// Sparse bitmap over spaced ticks. A bit is set exactly when the
/// corresponding tick holds gross liquidity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickBitmap {
    words: AHashMap<i16, U256>,
}

/// Computes the position in the mapping where the initialized bit for a tick
/// lives.
///
/// # Arguments
///
/// * `compressed` - The tick for which to compute the position, divided by
///   the pool tick spacing
///
fn position(compressed: i32) -> (i16, u8) {
    let word_pos = (compressed >> 8) as i16;
    // begins with 255 for negative compressed ticks
    let bit_pos = (compressed % 256) as u8;
    (word_pos, bit_pos)
}

/// Floor division of a tick by the spacing, so that negative unaligned ticks
/// compress toward negative infinity.
fn compress(tick: i32, tick_spacing: i32) -> i32 {
    if tick < 0 && tick % tick_spacing != 0 {
        tick / tick_spacing - 1
    } else {
        tick / tick_spacing
    }
}

impl TickBitmap {
    /// The raw word at `word_pos`; zero when the word was never touched.
    pub fn word(&self, word_pos: i16) -> U256 {
        self.words.get(&word_pos).copied().unwrap_or_default()
    }

    /// Flips the initialized state for a given tick from false to true, or
    /// vice versa
    ///
    /// # Arguments
    ///
    /// * `tick` - The tick to flip, must be a multiple of `tick_spacing`
    /// * `tick_spacing` - The spacing between usable ticks
    ///
    pub fn flip_tick(&mut self, tick: i32, tick_spacing: i32) {
        assert_eq!(tick % tick_spacing, 0);
        let (word_pos, bit_pos) = position(tick / tick_spacing);
        let mask = U256::from(1) << bit_pos;
        let word = self.words.entry(word_pos).or_default();
        *word = *word ^ mask;
        if word.is_zero() {
            self.words.remove(&word_pos);
        }
    }

    /// Returns the next initialized tick contained in the same word (or
    /// adjacent word) as the tick that is either to the left (less than or
    /// equal to) or right (greater than) of the given tick
    ///
    /// When no initialized tick exists in the word, the tick at the word
    /// boundary is returned with `initialized = false`, so a caller loop
    /// does at most one word of work per step.
    ///
    /// # Arguments
    ///
    /// * `tick` - The starting tick
    /// * `tick_spacing` - The spacing between usable ticks
    /// * `lte` - Whether to search to the left (less than or equal to the
    ///   starting tick)
    ///
    pub fn next_initialized_tick_within_one_word(
        &self,
        tick: i32,
        tick_spacing: i32,
        lte: bool,
    ) -> (i32, bool) {
        let compressed = compress(tick, tick_spacing);

        if lte {
            let (word_pos, bit_pos) = position(compressed);
            // all the 1s at or to the right of the current bit_pos
            let mask = (U256::from(1) << bit_pos) - 1 + (U256::from(1) << bit_pos);
            let masked = self.word(word_pos) & mask;

            let initialized = !masked.is_zero();
            let next = if initialized {
                (compressed - (bit_pos - bit_math::most_significant_bit(masked)) as i32)
                    * tick_spacing
            } else {
                // no initialized tick at or to the right: return the
                // rightmost tick of the word
                (compressed - bit_pos as i32) * tick_spacing
            };
            (next, initialized)
        } else {
            // start from the word of the next tick, since the current tick
            // state does not matter when searching greater-than
            let (word_pos, bit_pos) = position(compressed + 1);
            // all the 1s at or to the left of the bit_pos
            let mask = !((U256::from(1) << bit_pos) - 1);
            let masked = self.word(word_pos) & mask;

            let initialized = !masked.is_zero();
            let next = if initialized {
                (compressed + 1 + (bit_math::least_significant_bit(masked) - bit_pos) as i32)
                    * tick_spacing
            } else {
                (compressed + 1 + (u8::MAX - bit_pos) as i32) * tick_spacing
            };
            (next, initialized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap_with(ticks: &[i32], tick_spacing: i32) -> TickBitmap {
        let mut bitmap = TickBitmap::default();
        for tick in ticks {
            bitmap.flip_tick(*tick, tick_spacing);
        }
        bitmap
    }

    #[test]
    fn position_for_negative_tick() {
        let (word_pos, bit_pos) = position(-1);
        assert_eq!(word_pos, -1);
        assert_eq!(bit_pos, 255);
    }

    #[test]
    fn flip_is_an_involution() {
        let mut bitmap = TickBitmap::default();
        bitmap.flip_tick(120, 60);
        assert!(!bitmap.word(0).is_zero());
        bitmap.flip_tick(120, 60);
        assert_eq!(bitmap, TickBitmap::default());
    }

    #[test]
    fn flip_does_not_disturb_neighbours() {
        let bitmap = bitmap_with(&[-240, 120, 180], 60);
        let (next, initialized) =
            bitmap.next_initialized_tick_within_one_word(150, 60, true);
        assert_eq!((next, initialized), (120, true));
    }

    #[test]
    #[should_panic]
    fn flip_rejects_unaligned_tick() {
        let mut bitmap = TickBitmap::default();
        bitmap.flip_tick(90, 60);
    }

    mod next_initialized_lte {
        use super::*;

        #[test]
        fn at_an_initialized_tick_returns_it() {
            let bitmap = bitmap_with(&[-60, 60], 60);
            let (next, initialized) =
                bitmap.next_initialized_tick_within_one_word(60, 60, true);
            assert_eq!((next, initialized), (60, true));
        }

        #[test]
        fn finds_tick_to_the_left() {
            let bitmap = bitmap_with(&[-60, 60], 60);
            let (next, initialized) =
                bitmap.next_initialized_tick_within_one_word(0, 60, true);
            assert_eq!((next, initialized), (-60, true));
        }

        #[test]
        fn unaligned_negative_tick_compresses_toward_minus_infinity() {
            let bitmap = bitmap_with(&[-60], 60);
            let (next, initialized) =
                bitmap.next_initialized_tick_within_one_word(-1, 60, true);
            assert_eq!((next, initialized), (-60, true));
        }

        #[test]
        fn empty_word_returns_word_boundary_uninitialized() {
            let bitmap = TickBitmap::default();
            let (next, initialized) =
                bitmap.next_initialized_tick_within_one_word(0, 60, true);
            assert_eq!(initialized, false);
            // bit_pos of compressed 0 is 0: boundary is the tick itself
            assert_eq!(next, 0);

            let (next, initialized) =
                bitmap.next_initialized_tick_within_one_word(-60, 60, true);
            assert_eq!(initialized, false);
            // compressed -1 sits at bit 255 of word -1: boundary is -256 * 60
            assert_eq!(next, -256 * 60);
        }

        #[test]
        fn does_not_see_past_the_word_boundary() {
            // -256 * 60 is the first tick of word -1; a tick in word 0 is
            // invisible from there
            let bitmap = bitmap_with(&[0], 60);
            let (next, initialized) =
                bitmap.next_initialized_tick_within_one_word(-60, 60, true);
            assert_eq!(initialized, false);
            assert_eq!(next, -256 * 60);
        }
    }

    mod next_initialized_gt {
        use super::*;

        #[test]
        fn skips_the_current_tick() {
            let bitmap = bitmap_with(&[60, 120], 60);
            let (next, initialized) =
                bitmap.next_initialized_tick_within_one_word(60, 60, false);
            assert_eq!((next, initialized), (120, true));
        }

        #[test]
        fn finds_tick_to_the_right() {
            let bitmap = bitmap_with(&[300], 60);
            let (next, initialized) =
                bitmap.next_initialized_tick_within_one_word(0, 60, false);
            assert_eq!((next, initialized), (300, true));
        }

        #[test]
        fn empty_word_returns_word_boundary_uninitialized() {
            let bitmap = TickBitmap::default();
            let (next, initialized) =
                bitmap.next_initialized_tick_within_one_word(0, 60, false);
            assert_eq!(initialized, false);
            // last bit of word 0 is compressed 255
            assert_eq!(next, 255 * 60);
        }

        #[test]
        fn crossing_into_the_next_word() {
            let bitmap = bitmap_with(&[256 * 60], 60);
            // from the last tick of word 0 the search enters word 1
            let (next, initialized) =
                bitmap.next_initialized_tick_within_one_word(255 * 60, 60, false);
            assert_eq!((next, initialized), (256 * 60, true));
        }
    }
}
