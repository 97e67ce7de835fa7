//! Helper library to find the result of a swap within a single tick range,
//! i.e. a single swap step

use super::big_num::U256;
use super::full_math::MulDiv;
use super::sqrt_price_math;
use crate::error::ErrorCode;
use crate::states::config::FEE_RATE_DENOMINATOR_VALUE;

/// Result of a swap step
#[derive(Default, Debug, PartialEq, Eq)]
pub struct SwapStep {
    /// The price after swapping the amount in, not to exceed the price target
    pub sqrt_price_next_x96: U256,

    /// The amount to be swapped in, of either token_0 or token_1, based on
    /// the direction of the swap
    pub amount_in: u128,

    /// The amount to be received, of either token_0 or token_1, based on the
    /// direction of the swap
    pub amount_out: u128,

    /// The amount of input that will be taken as a fee
    pub fee_amount: u128,
}

/// Computes the result of swapping some amount in, given the parameters of
/// the swap
///
/// The fee, plus the amount in, never exceeds the amount remaining.
///
/// # Arguments
///
/// * `sqrt_price_current_x96` - The current sqrt price of the pool
/// * `sqrt_price_target_x96` - The price that cannot be exceeded, from which
///   the direction of the swap is inferred
/// * `liquidity` - The usable liquidity
/// * `amount_remaining` - How much input amount is remaining to be swapped in
/// * `fee_rate` - The fee taken from the input amount, expressed in
///   hundredths of a bip (10^-6)
///
pub fn compute_swap_step(
    sqrt_price_current_x96: U256,
    sqrt_price_target_x96: U256,
    liquidity: u128,
    amount_remaining: u128,
    fee_rate: u32,
) -> Result<SwapStep, ErrorCode> {
    let zero_for_one = sqrt_price_current_x96 >= sqrt_price_target_x96;
    let mut swap_step = SwapStep::default();

    // round up amount_in so the pool is never underpaid for the price move
    let amount_remaining_less_fee = amount_remaining
        .mul_div_floor(
            (FEE_RATE_DENOMINATOR_VALUE - fee_rate) as u128,
            FEE_RATE_DENOMINATOR_VALUE as u128,
        )
        .ok_or(ErrorCode::Overflow)?;
    swap_step.amount_in = if zero_for_one {
        sqrt_price_math::get_amount_0_delta_unsigned(
            sqrt_price_target_x96,
            sqrt_price_current_x96,
            liquidity,
            true,
        )?
    } else {
        sqrt_price_math::get_amount_1_delta_unsigned(
            sqrt_price_current_x96,
            sqrt_price_target_x96,
            liquidity,
            true,
        )?
    };
    swap_step.sqrt_price_next_x96 = if amount_remaining_less_fee >= swap_step.amount_in {
        sqrt_price_target_x96
    } else {
        sqrt_price_math::get_next_sqrt_price_from_input(
            sqrt_price_current_x96,
            liquidity,
            amount_remaining_less_fee,
            zero_for_one,
        )?
    };

    // whether we reached the target price for this step
    let max = sqrt_price_target_x96 == swap_step.sqrt_price_next_x96;

    // get the input / output amounts against the price actually reached;
    // round down amount_out so the pool never overpays
    if zero_for_one {
        if !max {
            swap_step.amount_in = sqrt_price_math::get_amount_0_delta_unsigned(
                swap_step.sqrt_price_next_x96,
                sqrt_price_current_x96,
                liquidity,
                true,
            )?;
        }
        swap_step.amount_out = sqrt_price_math::get_amount_1_delta_unsigned(
            swap_step.sqrt_price_next_x96,
            sqrt_price_current_x96,
            liquidity,
            false,
        )?;
    } else {
        if !max {
            swap_step.amount_in = sqrt_price_math::get_amount_1_delta_unsigned(
                sqrt_price_current_x96,
                swap_step.sqrt_price_next_x96,
                liquidity,
                true,
            )?;
        }
        swap_step.amount_out = sqrt_price_math::get_amount_0_delta_unsigned(
            sqrt_price_current_x96,
            swap_step.sqrt_price_next_x96,
            liquidity,
            false,
        )?;
    }

    swap_step.fee_amount = if !max {
        // we didn't reach the target, so take the remainder of the input as
        // fee; swap dust is granted as fee
        amount_remaining
            .checked_sub(swap_step.amount_in)
            .ok_or(ErrorCode::Overflow)?
    } else {
        // take pip percentage as fee, rounded up against the swapper
        swap_step
            .amount_in
            .mul_div_ceil(
                fee_rate as u128,
                (FEE_RATE_DENOMINATOR_VALUE - fee_rate) as u128,
            )
            .ok_or(ErrorCode::Overflow)?
    };

    Ok(swap_step)
}
