//! Oracle provides time-weighted price data useful for a wide variety of
//! system designs
//!
//! Stored oracle data, "observations", live in a ring whose capacity starts
//! at 1 and can be grown by anyone paying to pre-touch the slots. The ring
//! is overwritten oldest-first once the full cardinality is populated.
//! Timestamps are 32-bit and compare modulo 2^32, so the ring stays sorted
//! relative to the current time across timestamp overflow.

use crate::error::ErrorCode;

/// Maximum number of observations the ring may grow to
pub const MAX_CARDINALITY: u16 = u16::MAX;

/// A recorded pool state snapshot
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct Observation {
    /// The block timestamp of the observation
    pub block_timestamp: u32,
    /// The tick multiplied by seconds elapsed for the life of the pool as of
    /// the observation timestamp
    pub tick_cumulative: i64,
    /// Whether the observation has been written to and is safe to read
    pub initialized: bool,
}

impl Observation {
    /// Extends this observation to `block_timestamp`, assuming `tick` held
    /// for the whole interval
    fn transform(&self, block_timestamp: u32, tick: i32) -> Observation {
        let delta = block_timestamp.wrapping_sub(self.block_timestamp);
        Observation {
            block_timestamp,
            tick_cumulative: self
                .tick_cumulative
                .wrapping_add(tick as i64 * delta as i64),
            initialized: true,
        }
    }
}

/// The ring of observations. The active index and cardinality are owned by
/// the pool's `Slot0` and passed in, the way the rest of the pool state
/// references this table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObservationState {
    observations: Vec<Observation>,
}

impl ObservationState {
    /// Initializes the ring by writing the first slot. Called once, when the
    /// pool is first initialized.
    ///
    /// Returns the initial (cardinality, cardinality_next)
    pub fn initialize(&mut self, time: u32) -> (u16, u16) {
        self.observations = vec![Observation {
            block_timestamp: time,
            tick_cumulative: 0,
            initialized: true,
        }];
        (1, 1)
    }

    /// Writes an observation to the ring, at most once per second. Indices
    /// wrap modulo the cardinality, which grows into `cardinality_next` when
    /// the write lands on the final slot of the current window.
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the observation that was most recently
    ///   written
    /// * `time` - The timestamp of the new observation
    /// * `tick` - The active tick as of the new observation
    /// * `cardinality` - The number of populated ring slots
    /// * `cardinality_next` - The target cardinality
    ///
    /// Returns the updated (index, cardinality)
    pub fn write(
        &mut self,
        index: u16,
        time: u32,
        tick: i32,
        cardinality: u16,
        cardinality_next: u16,
    ) -> (u16, u16) {
        let last = self.observations[index as usize];

        // at most one observation per second
        if last.block_timestamp == time {
            return (index, cardinality);
        }

        // advance the cardinality when the target is ahead of the current
        // one and the write would land on the final slot of the window
        let cardinality_updated = if cardinality_next > cardinality && index == cardinality - 1 {
            cardinality_next
        } else {
            cardinality
        };

        let index_updated = (index + 1) % cardinality_updated;
        self.observations[index_updated as usize] = last.transform(time, tick);
        (index_updated, cardinality_updated)
    }

    /// Pre-touches ring slots `[current, next)` so the first wrap past the
    /// old window does not branch. Grown slots stay uninitialized until the
    /// write cursor reaches them.
    ///
    /// Returns the new target cardinality (`current` when `next` is not
    /// ahead of it)
    pub fn grow(&mut self, current: u16, next: u16) -> u16 {
        if next <= current {
            return current;
        }
        for _ in current..next {
            self.observations.push(Observation {
                block_timestamp: 1,
                ..Default::default()
            });
        }
        next
    }

    /// The observation at `index`, if the slot exists
    pub fn get(&self, index: u16) -> Option<&Observation> {
        self.observations.get(index as usize)
    }

    /// Returns the cumulative tick as of `seconds_ago` seconds before
    /// `time`, for each requested age.
    ///
    /// # Arguments
    ///
    /// * `time` - The current timestamp
    /// * `seconds_agos` - The ages of the requested samples, newest-relative
    /// * `tick` - The current tick, for extrapolation past the newest sample
    /// * `index` - The index of the most recently written observation
    /// * `cardinality` - The number of populated ring slots
    ///
    pub fn observe(
        &self,
        time: u32,
        seconds_agos: &[u32],
        tick: i32,
        index: u16,
        cardinality: u16,
    ) -> Result<Vec<i64>, ErrorCode> {
        seconds_agos
            .iter()
            .map(|seconds_ago| self.observe_single(time, *seconds_ago, tick, index, cardinality))
            .collect()
    }

    /// A single `observe` sample; see [`ObservationState::observe`]
    pub fn observe_single(
        &self,
        time: u32,
        seconds_ago: u32,
        tick: i32,
        index: u16,
        cardinality: u16,
    ) -> Result<i64, ErrorCode> {
        if cardinality == 0 {
            return Err(ErrorCode::NotInitialized);
        }

        if seconds_ago == 0 {
            let mut last = self.observations[index as usize];
            if last.block_timestamp != time {
                last = last.transform(time, tick);
            }
            return Ok(last.tick_cumulative);
        }

        let target = time.wrapping_sub(seconds_ago);

        let (before_or_at, at_or_after) =
            self.get_surrounding_observations(time, target, tick, index, cardinality)?;

        if target == before_or_at.block_timestamp {
            // we're at the left boundary
            Ok(before_or_at.tick_cumulative)
        } else if target == at_or_after.block_timestamp {
            // we're at the right boundary
            Ok(at_or_after.tick_cumulative)
        } else {
            // we're in the middle: linearly interpolate between the bracket
            let observation_delta = at_or_after
                .block_timestamp
                .wrapping_sub(before_or_at.block_timestamp);
            let target_delta = target.wrapping_sub(before_or_at.block_timestamp);
            Ok(before_or_at.tick_cumulative.wrapping_add(
                at_or_after
                    .tick_cumulative
                    .wrapping_sub(before_or_at.tick_cumulative)
                    / observation_delta as i64
                    * target_delta as i64,
            ))
        }
    }

    /// Finds the observations bracketing `target`. The newest observation is
    /// synthesized from the current tick when the target is at or after it;
    /// a target older than the oldest stored observation fails.
    fn get_surrounding_observations(
        &self,
        time: u32,
        target: u32,
        tick: i32,
        index: u16,
        cardinality: u16,
    ) -> Result<(Observation, Observation), ErrorCode> {
        // optimistically set before to the newest observation
        let mut before_or_at = self.observations[index as usize];

        if Self::lte(time, before_or_at.block_timestamp, target) {
            if before_or_at.block_timestamp == target {
                // the caller's observe_single never reads at_or_after here
                return Ok((before_or_at, Observation::default()));
            }
            // target is newer than the newest observation: extrapolate
            return Ok((before_or_at, before_or_at.transform(target, tick)));
        }

        // set before to the oldest observation that exists
        before_or_at = self.observations[((index + 1) % cardinality) as usize];
        if !before_or_at.initialized {
            before_or_at = self.observations[0];
        }

        if !Self::lte(time, before_or_at.block_timestamp, target) {
            return Err(ErrorCode::OldObservation);
        }

        Ok(self.binary_search(time, target, index, cardinality))
    }

    /// Binary search for the bracketing pair; only called when the target
    /// is known to lie within the stored window.
    fn binary_search(
        &self,
        time: u32,
        target: u32,
        index: u16,
        cardinality: u16,
    ) -> (Observation, Observation) {
        // oldest and newest slot, in ring order
        let mut l = ((index + 1) % cardinality) as usize;
        let mut r = l + cardinality as usize - 1;

        loop {
            let i = (l + r) / 2;

            let before_or_at = self.observations[i % cardinality as usize];
            // hit an uninitialized slot of a partially grown ring: advance
            // toward the newer half, where the written slots live
            if !before_or_at.initialized {
                l = i + 1;
                continue;
            }

            let at_or_after = self.observations[(i + 1) % cardinality as usize];
            let target_at_or_after = Self::lte(time, before_or_at.block_timestamp, target);

            if target_at_or_after && Self::lte(time, target, at_or_after.block_timestamp) {
                return (before_or_at, at_or_after);
            }

            if !target_at_or_after {
                r = i - 1;
            } else {
                l = i + 1;
            }
        }
    }

    /// 32-bit timestamp comparison, reinterpreted relative to `time` so the
    /// ordering survives timestamp overflow
    fn lte(time: u32, a: u32, b: u32) -> bool {
        // if there hasn't been overflow, no need to adjust
        if a <= time && b <= time {
            return a <= b;
        }

        let a_adjusted = if a > time { a as u64 } else { a as u64 + (1 << 32) };
        let b_adjusted = if b > time { b as u64 } else { b as u64 + (1 << 32) };

        a_adjusted <= b_adjusted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drives a ring the way the pool does, tracking index/cardinality
    struct OracleHarness {
        state: ObservationState,
        index: u16,
        cardinality: u16,
        cardinality_next: u16,
    }

    impl OracleHarness {
        fn new(time: u32) -> Self {
            let mut state = ObservationState::default();
            let (cardinality, cardinality_next) = state.initialize(time);
            OracleHarness {
                state,
                index: 0,
                cardinality,
                cardinality_next,
            }
        }

        fn grow(&mut self, next: u16) {
            self.cardinality_next = self.state.grow(self.cardinality_next, next);
        }

        fn write(&mut self, time: u32, tick: i32) {
            let (index, cardinality) = self.state.write(
                self.index,
                time,
                tick,
                self.cardinality,
                self.cardinality_next,
            );
            self.index = index;
            self.cardinality = cardinality;
        }

        fn observe(&self, time: u32, seconds_agos: &[u32], tick: i32) -> Result<Vec<i64>, ErrorCode> {
            self.state
                .observe(time, seconds_agos, tick, self.index, self.cardinality)
        }
    }

    #[test]
    fn initialize_writes_slot_zero() {
        let harness = OracleHarness::new(5);
        assert_eq!(
            harness.state.get(0),
            Some(&Observation {
                block_timestamp: 5,
                tick_cumulative: 0,
                initialized: true
            })
        );
        assert_eq!(harness.cardinality, 1);
        assert_eq!(harness.cardinality_next, 1);
    }

    #[test]
    fn write_same_second_is_a_no_op() {
        let mut harness = OracleHarness::new(5);
        harness.write(5, 100);
        assert_eq!(harness.index, 0);
        assert_eq!(harness.state.get(0).unwrap().tick_cumulative, 0);
    }

    #[test]
    fn write_at_cardinality_one_overwrites_in_place() {
        let mut harness = OracleHarness::new(0);
        harness.write(10, 3);
        assert_eq!(harness.index, 0);
        let observation = harness.state.get(0).unwrap();
        assert_eq!(observation.block_timestamp, 10);
        assert_eq!(observation.tick_cumulative, 30);
    }

    #[test]
    fn grow_is_a_no_op_when_not_ahead() {
        let mut state = ObservationState::default();
        state.initialize(0);
        assert_eq!(state.grow(1, 1), 1);
        assert_eq!(state.grow(5, 3), 5);
    }

    #[test]
    fn cardinality_expands_only_at_window_end() {
        let mut harness = OracleHarness::new(0);
        harness.grow(3);
        assert_eq!(harness.cardinality_next, 3);
        // the pending window activates on the next write past the end
        harness.write(1, 0);
        assert_eq!(harness.cardinality, 3);
        assert_eq!(harness.index, 1);
        harness.write(2, 0);
        assert_eq!(harness.index, 2);
        harness.write(3, 0);
        // wrapped around the grown window
        assert_eq!(harness.index, 0);
        assert_eq!(harness.cardinality, 3);
    }

    #[test]
    fn observe_zero_seconds_extrapolates_to_now() {
        let mut harness = OracleHarness::new(0);
        harness.write(10, 5);
        // 5 ticks for 10 more seconds at tick 7
        let sample = harness.observe(20, &[0], 7).unwrap();
        assert_eq!(sample, vec![50 + 70]);
    }

    #[test]
    fn observe_at_exact_observation_timestamp() {
        let mut harness = OracleHarness::new(0);
        harness.grow(4);
        harness.write(10, 5);
        harness.write(20, 1);
        // target lands exactly on the middle observation
        let sample = harness.observe(30, &[20], 9).unwrap();
        assert_eq!(sample, vec![50]);
    }

    #[test]
    fn observe_interpolates_between_observations() {
        let mut harness = OracleHarness::new(0);
        harness.grow(4);
        // tick 10 held for [0, 100), tick -4 for [100, 200)
        harness.write(100, 10);
        harness.write(200, -4);
        // halfway through the second interval: 1000 + (-4 * 50)
        let sample = harness.observe(200, &[50], -4).unwrap();
        assert_eq!(sample, vec![1000 - 200]);
    }

    #[test]
    fn observe_older_than_ring_fails() {
        let mut harness = OracleHarness::new(100);
        harness.write(110, 1);
        assert_eq!(
            harness.observe(110, &[20], 1),
            Err(ErrorCode::OldObservation)
        );
    }

    #[test]
    fn observe_many_returns_one_sample_per_age() {
        let mut harness = OracleHarness::new(0);
        harness.grow(8);
        let ticks = [3i32, -2, 8, 1, 6];
        for (i, tick) in ticks.iter().enumerate() {
            // each tick holds for ten seconds before the next write
            harness.write((i as u32 + 1) * 10, *tick);
        }
        let expected_now: i64 = ticks.iter().map(|tick| *tick as i64 * 10).sum();
        let samples = harness.observe(50, &[0, 10, 20, 30, 40], 6).unwrap();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0], expected_now);
        // each sample differs from the next by tick * 10 for the interval it
        // spans
        for (i, pair) in samples.windows(2).enumerate() {
            let interval_tick = ticks[ticks.len() - 1 - i];
            assert_eq!(pair[0] - pair[1], interval_tick as i64 * 10);
        }
    }

    #[test]
    fn ring_overwrite_drops_the_oldest() {
        let mut harness = OracleHarness::new(0);
        harness.grow(2);
        harness.write(10, 1);
        harness.write(20, 2);
        harness.write(30, 3);
        // the slot for t=10 has been overwritten
        assert_eq!(
            harness.observe(30, &[25], 3),
            Err(ErrorCode::OldObservation)
        );
        assert!(harness.observe(30, &[5], 3).is_ok());
    }

    #[test]
    fn timestamp_wraparound_keeps_ordering() {
        let start = u32::MAX - 5;
        let mut harness = OracleHarness::new(start);
        harness.grow(4);
        // writes straddle the 2^32 boundary
        harness.write(start.wrapping_add(10), 2);
        harness.write(start.wrapping_add(20), 4);
        let now = start.wrapping_add(20);
        let samples = harness.observe(now, &[0, 10, 20], 4).unwrap();
        assert_eq!(samples[0] - samples[1], 4 * 10);
        assert_eq!(samples[1] - samples[2], 2 * 10);
    }
}
