//! Contains functions for managing tick state and relevant calculations

use crate::error::ErrorCode;
use crate::libraries::big_num::U256;
use crate::libraries::{liquidity_math, tick_math};

/// State for a touched price tick
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct TickState {
    /// The price tick whose info is stored in the entry
    pub tick: i32,

    /// Amount of net liquidity added (subtracted) when tick is crossed from
    /// left to right (right to left)
    pub liquidity_net: i128,
    /// The total position liquidity that references this tick
    pub liquidity_gross: u128,

    /// Fee growth per unit of liquidity on the _other_ side of this tick
    /// (relative to the current tick); only has relative meaning, not
    /// absolute — the value depends on when the tick is initialized
    pub fee_growth_outside_0_x128: U256,
    pub fee_growth_outside_1_x128: U256,

    /// The cumulative tick value on the other side of this tick
    pub tick_cumulative_outside: i64,
}

impl TickState {
    pub fn new(tick: i32) -> Self {
        TickState {
            tick,
            ..Default::default()
        }
    }

    /// Updates a tick and returns true if the tick was flipped from
    /// initialized to uninitialized, or vice versa
    ///
    /// # Arguments
    ///
    /// * `tick_current` - The current tick
    /// * `liquidity_delta` - A new amount of liquidity to be added
    ///   (subtracted) when tick is crossed from left to right (right to left)
    /// * `fee_growth_global_0_x128` - The all-time global fee growth, per
    ///   unit of liquidity, in token_0
    /// * `fee_growth_global_1_x128` - The all-time global fee growth, per
    ///   unit of liquidity, in token_1
    /// * `tick_cumulative` - The all-time cumulative tick as of now
    /// * `upper` - true for updating a position's upper tick, false for the
    ///   lower tick
    /// * `max_liquidity` - The maximum liquidity allocation for a single tick
    ///
    pub fn update(
        &mut self,
        tick_current: i32,
        liquidity_delta: i128,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
        tick_cumulative: i64,
        upper: bool,
        max_liquidity: u128,
    ) -> Result<bool, ErrorCode> {
        let liquidity_gross_before = self.liquidity_gross;
        let liquidity_gross_after =
            liquidity_math::add_delta(liquidity_gross_before, liquidity_delta)?;

        if liquidity_gross_after > max_liquidity {
            return Err(ErrorCode::MaxLiquidityPerTickExceeded);
        }

        // Either liquidity_gross_after becomes 0 (uninitialized) XOR
        // liquidity_gross_before was zero (initialized)
        let flipped = (liquidity_gross_after == 0) != (liquidity_gross_before == 0);

        if liquidity_gross_before == 0 {
            // by convention, we assume that all growth before a tick was
            // initialized happened _below_ the tick
            if self.tick <= tick_current {
                self.fee_growth_outside_0_x128 = fee_growth_global_0_x128;
                self.fee_growth_outside_1_x128 = fee_growth_global_1_x128;
                self.tick_cumulative_outside = tick_cumulative;
            }
        }

        self.liquidity_gross = liquidity_gross_after;

        // when the lower (upper) tick is crossed left to right (right to
        // left), liquidity must be added (removed)
        self.liquidity_net = if upper {
            self.liquidity_net.checked_sub(liquidity_delta)
        } else {
            self.liquidity_net.checked_add(liquidity_delta)
        }
        .ok_or(ErrorCode::Overflow)?;

        Ok(flipped)
    }

    /// Transitions this tick as the current price moves across it, returning
    /// the amount of liquidity added (subtracted) when the tick is crossed
    /// from left to right (right to left)
    ///
    /// The "outside" accumulators flip to `global - outside`; the
    /// subtraction is modular at 2^256.
    ///
    /// # Arguments
    ///
    /// * `fee_growth_global_0_x128` - The all-time global fee growth, per
    ///   unit of liquidity, in token_0
    /// * `fee_growth_global_1_x128` - The all-time global fee growth, per
    ///   unit of liquidity, in token_1
    /// * `tick_cumulative` - The all-time cumulative tick as of the crossing
    ///
    pub fn cross(
        &mut self,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
        tick_cumulative: i64,
    ) -> i128 {
        self.fee_growth_outside_0_x128 = fee_growth_global_0_x128
            .overflowing_sub(self.fee_growth_outside_0_x128)
            .0;
        self.fee_growth_outside_1_x128 = fee_growth_global_1_x128
            .overflowing_sub(self.fee_growth_outside_1_x128)
            .0;
        self.tick_cumulative_outside =
            tick_cumulative.wrapping_sub(self.tick_cumulative_outside);

        self.liquidity_net
    }

    pub fn is_initialized(&self) -> bool {
        self.liquidity_gross != 0
    }
}

/// Retrieves the all time fee growth data in token_0 and token_1, per unit
/// of liquidity, inside a position's tick boundaries.
///
/// Calculates `fr = fg - f_below(lower) - f_above(upper)`; both
/// subtractions are modular at 2^256.
///
/// # Arguments
///
/// * `tick_lower` - The lower tick boundary of the position
/// * `tick_upper` - The upper tick boundary of the position
/// * `tick_current` - The current tick
/// * `fee_growth_global_0_x128` - The all-time global fee growth, per unit
///   of liquidity, in token_0
/// * `fee_growth_global_1_x128` - The all-time global fee growth, per unit
///   of liquidity, in token_1
///
pub fn get_fee_growth_inside(
    tick_lower: &TickState,
    tick_upper: &TickState,
    tick_current: i32,
    fee_growth_global_0_x128: U256,
    fee_growth_global_1_x128: U256,
) -> (U256, U256) {
    // calculate fee growth below
    let (fee_growth_below_0_x128, fee_growth_below_1_x128) = if tick_current >= tick_lower.tick {
        (
            tick_lower.fee_growth_outside_0_x128,
            tick_lower.fee_growth_outside_1_x128,
        )
    } else {
        (
            fee_growth_global_0_x128
                .overflowing_sub(tick_lower.fee_growth_outside_0_x128)
                .0,
            fee_growth_global_1_x128
                .overflowing_sub(tick_lower.fee_growth_outside_1_x128)
                .0,
        )
    };

    // calculate fee growth above
    let (fee_growth_above_0_x128, fee_growth_above_1_x128) = if tick_current < tick_upper.tick {
        (
            tick_upper.fee_growth_outside_0_x128,
            tick_upper.fee_growth_outside_1_x128,
        )
    } else {
        (
            fee_growth_global_0_x128
                .overflowing_sub(tick_upper.fee_growth_outside_0_x128)
                .0,
            fee_growth_global_1_x128
                .overflowing_sub(tick_upper.fee_growth_outside_1_x128)
                .0,
        )
    };

    let fee_growth_inside_0_x128 = fee_growth_global_0_x128
        .overflowing_sub(fee_growth_below_0_x128)
        .0
        .overflowing_sub(fee_growth_above_0_x128)
        .0;
    let fee_growth_inside_1_x128 = fee_growth_global_1_x128
        .overflowing_sub(fee_growth_below_1_x128)
        .0
        .overflowing_sub(fee_growth_above_1_x128)
        .0;

    (fee_growth_inside_0_x128, fee_growth_inside_1_x128)
}

/// The maximum liquidity a single tick may reference, derived from the tick
/// spacing so that the sum over every usable tick cannot overflow a u128.
pub fn tick_spacing_to_max_liquidity_per_tick(tick_spacing: i32) -> u128 {
    let min_tick = (tick_math::MIN_TICK / tick_spacing) * tick_spacing;
    let max_tick = (tick_math::MAX_TICK / tick_spacing) * tick_spacing;
    let num_ticks = ((max_tick - min_tick) / tick_spacing) as u128 + 1;
    u128::MAX / num_ticks
}
