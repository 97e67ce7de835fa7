//! Helper functions to find price changes for change in token supply and
//! vice versa

use super::big_num::U256;
use super::fixed_point_96;
use super::full_math::{Downcast256, MulDiv};
use super::tick_math;
use super::unsafe_math::UnsafeMathTrait;
use crate::error::ErrorCode;

/// Gets the next sqrt price √P' given a delta of token_0
///
/// Always round up because
/// 1. In the exact output case, token 0 supply decreases leading to price
/// increase. Move price up so that exact output is met.
/// 2. In the exact input case, token 0 supply increases leading to price
/// decrease. Do not round down to minimize price impact. We only need to
/// meet input change and not guarantee exact output.
///
/// # Formula
///
/// * `√P' = √P * L / (L + Δx * √P)`
/// * If Δx * √P overflows, use alternate form `√P' = L / (L/√P + Δx)`
///
/// # Arguments
///
/// * `sqrt_price_x96` - The starting price `√P`, i.e., before accounting for
///   the token_0 delta, where P is `token_1_supply / token_0_supply`
/// * `liquidity` - The amount of usable liquidity L
/// * `amount` - Delta of token 0 (Δx) to add or remove from virtual reserves
/// * `add` - Whether to add or remove the amount of token_0
///
pub fn get_next_sqrt_price_from_amount_0_rounding_up(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: u128,
    add: bool,
) -> Result<U256, ErrorCode> {
    // we short circuit amount == 0 because the result is otherwise not
    // guaranteed to equal the input price
    if amount == 0 {
        return Ok(sqrt_price_x96);
    };
    let numerator_1 = U256::from(liquidity) << fixed_point_96::RESOLUTION;

    if add {
        if let Some(product) = U256::from(amount).checked_mul(sqrt_price_x96) {
            if let Some(denominator) = numerator_1.checked_add(product) {
                return numerator_1
                    .mul_div_ceil(sqrt_price_x96, denominator)
                    .ok_or(ErrorCode::Overflow);
            }
        }
        // Alternate form if overflow - `√P' = L / (L/√P + Δx)`
        Ok(U256::div_rounding_up(
            numerator_1,
            (numerator_1 / sqrt_price_x96)
                .checked_add(U256::from(amount))
                .ok_or(ErrorCode::Overflow)?,
        ))
    } else {
        // if the product overflows or the denominator underflows, there is
        // not enough token 0 in the pool to remove
        let product = U256::from(amount)
            .checked_mul(sqrt_price_x96)
            .ok_or(ErrorCode::Overflow)?;
        if numerator_1 <= product {
            return Err(ErrorCode::Overflow);
        }
        let denominator = numerator_1 - product;
        numerator_1
            .mul_div_ceil(sqrt_price_x96, denominator)
            .ok_or(ErrorCode::Overflow)
    }
}

/// Gets the next sqrt price given a delta of token_1
///
/// Always round down because
/// 1. In the exact output case, token 1 supply decreases leading to price
/// decrease. Move price down by rounding down so that exact output of
/// token 0 is met.
/// 2. In the exact input case, token 1 supply increases leading to price
/// increase. Do not round up to minimize price impact. We only need to meet
/// input change and not guarantee exact output for token 0.
///
/// # Formula
///
/// * `√P' = √P + Δy / L`
///
pub fn get_next_sqrt_price_from_amount_1_rounding_down(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: u128,
    add: bool,
) -> Result<U256, ErrorCode> {
    // if we are adding (subtracting), rounding down requires rounding the
    // quotient down (up)
    let numerator = U256::from(amount) << fixed_point_96::RESOLUTION;
    let liquidity = U256::from(liquidity);

    if add {
        let quotient = numerator / liquidity;
        sqrt_price_x96.checked_add(quotient).ok_or(ErrorCode::Overflow)
    } else {
        let quotient = U256::div_rounding_up(numerator, liquidity);
        if sqrt_price_x96 <= quotient {
            return Err(ErrorCode::Overflow);
        }
        Ok(sqrt_price_x96 - quotient)
    }
}

/// Gets the next sqrt price given an input amount of token_0 or token_1
///
/// Fails if price or liquidity are 0
///
/// # Arguments
///
/// * `sqrt_price_x96` - The starting price `√P`, i.e., before accounting for
///   the input amount
/// * `liquidity` - The amount of usable liquidity
/// * `amount_in` - How much of token_0, or token_1, is being swapped in
/// * `zero_for_one` - Whether the amount in is token_0 or token_1
///
pub fn get_next_sqrt_price_from_input(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount_in: u128,
    zero_for_one: bool,
) -> Result<U256, ErrorCode> {
    if sqrt_price_x96.is_zero() || liquidity == 0 {
        return Err(ErrorCode::Overflow);
    }

    // round to make sure that we don't pass the target price
    if zero_for_one {
        get_next_sqrt_price_from_amount_0_rounding_up(sqrt_price_x96, liquidity, amount_in, true)
    } else {
        get_next_sqrt_price_from_amount_1_rounding_down(sqrt_price_x96, liquidity, amount_in, true)
    }
}

/// Gets the next sqrt price given an output amount of token_0 or token_1
///
/// Fails if price or liquidity are 0, or the next price is out of bounds
///
/// # Arguments
///
/// * `sqrt_price_x96` - The starting price `√P`, i.e., before accounting for
///   the output amount
/// * `liquidity` - The amount of usable liquidity
/// * `amount_out` - How much of token_0, or token_1, is being swapped out
/// * `zero_for_one` - Whether the amount out is token_0 or token_1
///
pub fn get_next_sqrt_price_from_output(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount_out: u128,
    zero_for_one: bool,
) -> Result<U256, ErrorCode> {
    if sqrt_price_x96.is_zero() || liquidity == 0 {
        return Err(ErrorCode::Overflow);
    }

    if zero_for_one {
        get_next_sqrt_price_from_amount_1_rounding_down(sqrt_price_x96, liquidity, amount_out, false)
    } else {
        get_next_sqrt_price_from_amount_0_rounding_up(sqrt_price_x96, liquidity, amount_out, false)
    }
}

/// Gets the amount_0 delta between two prices, for given amount of liquidity
///
/// # Formula
///
/// * `Δx = L * (1 / √P_lower - 1 / √P_upper)`
/// * i.e. `L * (√P_upper - √P_lower) / (√P_upper * √P_lower)`
///
/// # Arguments
///
/// * `sqrt_price_a_x96` - A sqrt price
/// * `sqrt_price_b_x96` - Another sqrt price
/// * `liquidity` - The amount of usable liquidity
/// * `round_up` - Whether to round the amount up or down
///
pub fn get_amount_0_delta_unsigned(
    mut sqrt_price_a_x96: U256,
    mut sqrt_price_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<u128, ErrorCode> {
    // sqrt_price_a_x96 should hold the smaller value
    if sqrt_price_a_x96 > sqrt_price_b_x96 {
        std::mem::swap(&mut sqrt_price_a_x96, &mut sqrt_price_b_x96);
    };
    if sqrt_price_a_x96.is_zero() {
        return Err(ErrorCode::Overflow);
    }

    let numerator_1 = U256::from(liquidity) << fixed_point_96::RESOLUTION;
    let numerator_2 = sqrt_price_b_x96 - sqrt_price_a_x96;

    let amount = if round_up {
        U256::div_rounding_up(
            numerator_1
                .mul_div_ceil(numerator_2, sqrt_price_b_x96)
                .ok_or(ErrorCode::Overflow)?,
            sqrt_price_a_x96,
        )
    } else {
        numerator_1
            .mul_div_floor(numerator_2, sqrt_price_b_x96)
            .ok_or(ErrorCode::Overflow)?
            / sqrt_price_a_x96
    };
    amount.to_u128().ok_or(ErrorCode::Overflow)
}

/// Gets the amount_1 delta between two prices, for given amount of liquidity
///
/// # Formula
///
/// * `Δy = L (√P_upper - √P_lower)`
///
pub fn get_amount_1_delta_unsigned(
    mut sqrt_price_a_x96: U256,
    mut sqrt_price_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<u128, ErrorCode> {
    // sqrt_price_a_x96 should hold the smaller value
    if sqrt_price_a_x96 > sqrt_price_b_x96 {
        std::mem::swap(&mut sqrt_price_a_x96, &mut sqrt_price_b_x96);
    };

    let liquidity = U256::from(liquidity);
    let numerator = sqrt_price_b_x96 - sqrt_price_a_x96;
    let amount = if round_up {
        liquidity.mul_div_ceil(numerator, fixed_point_96::Q96)
    } else {
        liquidity.mul_div_floor(numerator, fixed_point_96::Q96)
    }
    .ok_or(ErrorCode::Overflow)?;
    amount.to_u128().ok_or(ErrorCode::Overflow)
}

/// Helper function to get signed token_0 delta between two prices, for the
/// given change in liquidity. Amounts leaving the pool round down, amounts
/// entering round up.
pub fn get_amount_0_delta_signed(
    sqrt_price_a_x96: U256,
    sqrt_price_b_x96: U256,
    liquidity: i128,
) -> Result<i128, ErrorCode> {
    if liquidity < 0 {
        let amount = get_amount_0_delta_unsigned(
            sqrt_price_a_x96,
            sqrt_price_b_x96,
            liquidity.unsigned_abs(),
            false,
        )?;
        Ok(-i128::try_from(amount).map_err(|_| ErrorCode::Overflow)?)
    } else {
        let amount = get_amount_0_delta_unsigned(
            sqrt_price_a_x96,
            sqrt_price_b_x96,
            liquidity as u128,
            true,
        )?;
        i128::try_from(amount).map_err(|_| ErrorCode::Overflow)
    }
}

/// Helper function to get signed token_1 delta between two prices, for the
/// given change in liquidity
pub fn get_amount_1_delta_signed(
    sqrt_price_a_x96: U256,
    sqrt_price_b_x96: U256,
    liquidity: i128,
) -> Result<i128, ErrorCode> {
    if liquidity < 0 {
        let amount = get_amount_1_delta_unsigned(
            sqrt_price_a_x96,
            sqrt_price_b_x96,
            liquidity.unsigned_abs(),
            false,
        )?;
        Ok(-i128::try_from(amount).map_err(|_| ErrorCode::Overflow)?)
    } else {
        let amount = get_amount_1_delta_unsigned(
            sqrt_price_a_x96,
            sqrt_price_b_x96,
            liquidity as u128,
            true,
        )?;
        i128::try_from(amount).map_err(|_| ErrorCode::Overflow)
    }
}

/// Token amounts required to apply `liquidity_delta` over the range
/// `[tick_lower, tick_upper)`, by cases on where the current price sits
/// relative to the range.
///
/// # Arguments
///
/// * `tick_current` - The current tick
/// * `sqrt_price_x96` - The current sqrt price; only read when the range is
///   active
/// * `tick_lower` - The lower tick boundary of the range
/// * `tick_upper` - The upper tick boundary of the range
/// * `liquidity_delta` - The change in liquidity for which to compute amounts
///
pub fn get_amounts_delta_signed(
    tick_current: i32,
    sqrt_price_x96: U256,
    tick_lower: i32,
    tick_upper: i32,
    liquidity_delta: i128,
) -> Result<(i128, i128), ErrorCode> {
    let mut amount_0 = 0;
    let mut amount_1 = 0;
    if tick_current < tick_lower {
        // current price is below the range: only token_0 is needed, as the
        // range is entered price-rising from left to right
        amount_0 = get_amount_0_delta_signed(
            tick_math::get_sqrt_price_at_tick(tick_lower)?,
            tick_math::get_sqrt_price_at_tick(tick_upper)?,
            liquidity_delta,
        )?;
    } else if tick_current < tick_upper {
        amount_0 = get_amount_0_delta_signed(
            sqrt_price_x96,
            tick_math::get_sqrt_price_at_tick(tick_upper)?,
            liquidity_delta,
        )?;
        amount_1 = get_amount_1_delta_signed(
            tick_math::get_sqrt_price_at_tick(tick_lower)?,
            sqrt_price_x96,
            liquidity_delta,
        )?;
    } else {
        amount_1 = get_amount_1_delta_signed(
            tick_math::get_sqrt_price_at_tick(tick_lower)?,
            tick_math::get_sqrt_price_at_tick(tick_upper)?,
            liquidity_delta,
        )?;
    }
    Ok((amount_0, amount_1))
}

#[cfg(test)]
mod tests {
    use super::*;

    const Q96_U128: u128 = 1 << 96;

    fn q96() -> U256 {
        U256::from(Q96_U128)
    }

    mod get_next_sqrt_price_tests {
        use super::*;

        #[test]
        fn input_of_zero_returns_price() {
            assert_eq!(
                get_next_sqrt_price_from_input(q96(), 10u128.pow(18), 0, true).unwrap(),
                q96()
            );
            assert_eq!(
                get_next_sqrt_price_from_input(q96(), 10u128.pow(18), 0, false).unwrap(),
                q96()
            );
        }

        #[test]
        fn fails_with_zero_liquidity_or_price() {
            assert!(get_next_sqrt_price_from_input(U256::default(), 1, 1, true).is_err());
            assert!(get_next_sqrt_price_from_input(q96(), 0, 1, true).is_err());
            assert!(get_next_sqrt_price_from_output(q96(), 0, 1, true).is_err());
        }

        #[test]
        fn token_1_input_moves_price_up_by_quotient() {
            // √P' = √P + Δy * Q96 / L
            let liquidity = 10u128.pow(18);
            let amount_in = 10u128.pow(15);
            let next =
                get_next_sqrt_price_from_input(q96(), liquidity, amount_in, false).unwrap();
            let expected = q96() + (U256::from(amount_in) << 96) / U256::from(liquidity);
            assert_eq!(next, expected);
            assert!(next > q96());
        }

        #[test]
        fn token_0_input_moves_price_down() {
            let liquidity = 10u128.pow(18);
            let next =
                get_next_sqrt_price_from_input(q96(), liquidity, 10u128.pow(15), true).unwrap();
            assert!(next < q96());
            // never understates: recomputing the amount needed to reach the
            // next price consumes no more than the input
            let used = get_amount_0_delta_unsigned(next, q96(), liquidity, true).unwrap();
            assert!(used <= 10u128.pow(15));
        }

        #[test]
        fn token_0_input_overflow_fallback_form() {
            // amount * √P overflows a U256, exercising `L / (L/√P + Δx)`
            let sqrt_price = U256::from(u128::MAX) << 20;
            let next = get_next_sqrt_price_from_input(sqrt_price, u128::MAX, u128::MAX, true)
                .unwrap();
            assert!(next < sqrt_price);
        }

        #[test]
        fn output_of_token_1_moves_price_down() {
            let liquidity = 10u128.pow(18);
            let next =
                get_next_sqrt_price_from_output(q96(), liquidity, 10u128.pow(15), true).unwrap();
            let expected_quotient =
                U256::div_rounding_up(U256::from(10u128.pow(15)) << 96, U256::from(liquidity));
            assert_eq!(next, q96() - expected_quotient);
        }

        #[test]
        fn output_exceeding_reserves_fails() {
            // removing more token_1 than the price supports underflows
            assert!(get_next_sqrt_price_from_output(q96(), 1, u128::MAX, true).is_err());
        }
    }

    mod get_amount_delta_tests {
        use super::*;

        #[test]
        fn amount_0_between_price_and_double() {
            // Δx = L * (2√P - √P) / (√P * 2√P) = L / 2 at √P = Q96
            let liquidity = 10u128.pow(18);
            assert_eq!(
                get_amount_0_delta_unsigned(q96(), q96() * 2u64, liquidity, false).unwrap(),
                liquidity / 2
            );
        }

        #[test]
        fn amount_1_between_price_and_double() {
            // Δy = L * (2√P - √P) / Q96 = L at √P = Q96
            let liquidity = 10u128.pow(18);
            assert_eq!(
                get_amount_1_delta_unsigned(q96(), q96() * 2u64, liquidity, false).unwrap(),
                liquidity
            );
        }

        #[test]
        fn argument_order_does_not_matter() {
            let liquidity = 10u128.pow(18);
            assert_eq!(
                get_amount_0_delta_unsigned(q96(), q96() * 2u64, liquidity, true).unwrap(),
                get_amount_0_delta_unsigned(q96() * 2u64, q96(), liquidity, true).unwrap(),
            );
        }

        #[test]
        fn rounding_directions_differ_by_at_most_one() {
            let a = tick_math::get_sqrt_price_at_tick(-60).unwrap();
            let b = tick_math::get_sqrt_price_at_tick(60).unwrap();
            let liquidity = 10u128.pow(18);
            let up = get_amount_0_delta_unsigned(a, b, liquidity, true).unwrap();
            let down = get_amount_0_delta_unsigned(a, b, liquidity, false).unwrap();
            assert!(up == down || up == down + 1);
        }

        #[test]
        fn signed_deltas_mirror_unsigned() {
            let a = tick_math::get_sqrt_price_at_tick(-60).unwrap();
            let b = tick_math::get_sqrt_price_at_tick(60).unwrap();
            let add = get_amount_0_delta_signed(a, b, 10i128.pow(18)).unwrap();
            let remove = get_amount_0_delta_signed(a, b, -10i128.pow(18)).unwrap();
            // adding rounds up, removing rounds down, in the pool's favor
            assert!(add >= -remove);
            assert!(add + remove <= 1);
        }
    }

    mod get_amounts_delta_signed_tests {
        use super::*;

        #[test]
        fn below_range_requires_only_token_0() {
            let (amount_0, amount_1) =
                get_amounts_delta_signed(-200, tick_math::get_sqrt_price_at_tick(-200).unwrap(), -60, 60, 10i128.pow(18)).unwrap();
            assert!(amount_0 > 0);
            assert_eq!(amount_1, 0);
        }

        #[test]
        fn above_range_requires_only_token_1() {
            let (amount_0, amount_1) =
                get_amounts_delta_signed(200, tick_math::get_sqrt_price_at_tick(200).unwrap(), -60, 60, 10i128.pow(18)).unwrap();
            assert_eq!(amount_0, 0);
            assert!(amount_1 > 0);
        }

        #[test]
        fn in_range_requires_both() {
            let (amount_0, amount_1) =
                get_amounts_delta_signed(0, q96(), -60, 60, 10i128.pow(18)).unwrap();
            assert!(amount_0 > 0 && amount_1 > 0);
            // symmetric range at price one needs near equal amounts
            assert!((amount_0 - amount_1).abs() <= 1);
        }
    }
}
