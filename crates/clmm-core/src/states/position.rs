//! Positions represent an owner's liquidity between a lower and upper tick
//! boundary

use crate::error::ErrorCode;
use crate::libraries::big_num::U256;
use crate::libraries::fixed_point_128;
use crate::libraries::full_math::{Downcast256, MulDiv};
use crate::libraries::liquidity_math;
use crate::states::config::Address;

/// Positions are keyed by the owner and the tick boundaries of the range
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub owner: Address,
    pub tick_lower: i32,
    pub tick_upper: i32,
}

/// Info stored for each position
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct PositionState {
    /// The amount of liquidity owned by this position
    pub liquidity: u128,

    /// The token_0 fee growth per unit of liquidity inside the range, as of
    /// the last update to liquidity or fees owed
    pub fee_growth_inside_0_last_x128: U256,

    /// The token_1 fee growth per unit of liquidity inside the range, as of
    /// the last update to liquidity or fees owed
    pub fee_growth_inside_1_last_x128: U256,

    /// The fees owed to the position owner in token_0
    pub tokens_owed_0: u128,

    /// The fees owed to the position owner in token_1
    pub tokens_owed_1: u128,
}

impl PositionState {
    /// Credits accumulated fees to the position, then applies the liquidity
    /// delta and replaces the growth snapshots. Fee accrual must happen
    /// before the liquidity mutation so fees are earned at the old size.
    ///
    /// # Arguments
    ///
    /// * `liquidity_delta` - The change in pool liquidity as a result of the
    ///   position update
    /// * `fee_growth_inside_0_x128` - The all-time fee growth in token_0,
    ///   per unit of liquidity, inside the position's tick boundaries
    /// * `fee_growth_inside_1_x128` - The all-time fee growth in token_1,
    ///   per unit of liquidity, inside the position's tick boundaries
    ///
    pub fn update(
        &mut self,
        liquidity_delta: i128,
        fee_growth_inside_0_x128: U256,
        fee_growth_inside_1_x128: U256,
    ) -> Result<(), ErrorCode> {
        let liquidity_next = if liquidity_delta == 0 {
            // disallow pokes for uncreated positions
            if self.liquidity == 0 {
                return Err(ErrorCode::ZeroLiquidity);
            }
            self.liquidity
        } else {
            liquidity_math::add_delta(self.liquidity, liquidity_delta)?
        };

        // calculate accumulated fees; only the growth-delta subtraction is
        // modular, the owed accumulators are checked like all other
        // arithmetic
        let tokens_owed_0 = fee_growth_inside_0_x128
            .overflowing_sub(self.fee_growth_inside_0_last_x128)
            .0
            .mul_div_floor(U256::from(self.liquidity), fixed_point_128::Q128)
            .ok_or(ErrorCode::Overflow)?
            .to_u128()
            .ok_or(ErrorCode::Overflow)?;
        let tokens_owed_1 = fee_growth_inside_1_x128
            .overflowing_sub(self.fee_growth_inside_1_last_x128)
            .0
            .mul_div_floor(U256::from(self.liquidity), fixed_point_128::Q128)
            .ok_or(ErrorCode::Overflow)?
            .to_u128()
            .ok_or(ErrorCode::Overflow)?;

        // credit the fees, then update the position
        if tokens_owed_0 > 0 || tokens_owed_1 > 0 {
            self.tokens_owed_0 = self
                .tokens_owed_0
                .checked_add(tokens_owed_0)
                .ok_or(ErrorCode::Overflow)?;
            self.tokens_owed_1 = self
                .tokens_owed_1
                .checked_add(tokens_owed_1)
                .ok_or(ErrorCode::Overflow)?;
        }
        if liquidity_delta != 0 {
            self.liquidity = liquidity_next;
        }
        self.fee_growth_inside_0_last_x128 = fee_growth_inside_0_x128;
        self.fee_growth_inside_1_last_x128 = fee_growth_inside_1_x128;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn growth(value: u128) -> U256 {
        // value tokens per unit of liquidity, Q128.128
        U256::from(value) * fixed_point_128::Q128
    }

    #[test]
    fn poke_of_empty_position_fails() {
        let mut position = PositionState::default();
        assert_eq!(
            position.update(0, U256::default(), U256::default()),
            Err(ErrorCode::ZeroLiquidity)
        );
    }

    #[test]
    fn mint_then_burn_to_zero() {
        let mut position = PositionState::default();
        position.update(100, U256::default(), U256::default()).unwrap();
        assert_eq!(position.liquidity, 100);
        position.update(-100, U256::default(), U256::default()).unwrap();
        assert_eq!(position.liquidity, 0);
    }

    #[test]
    fn burn_below_zero_fails() {
        let mut position = PositionState::default();
        position.update(10, U256::default(), U256::default()).unwrap();
        assert_eq!(
            position.update(-11, U256::default(), U256::default()),
            Err(ErrorCode::Overflow)
        );
    }

    #[test]
    fn fees_accrue_at_the_old_liquidity() {
        let mut position = PositionState::default();
        position.update(1000, U256::default(), U256::default()).unwrap();

        // 3 tokens per unit of liquidity accrued, then the position doubles:
        // owed fees are on the original 1000 units
        position.update(1000, growth(3), U256::default()).unwrap();
        assert_eq!(position.tokens_owed_0, 3000);
        assert_eq!(position.liquidity, 2000);

        // the next unit of growth is on 2000 units
        position.update(0, growth(4), U256::default()).unwrap();
        assert_eq!(position.tokens_owed_0, 3000 + 2000);
    }

    #[test]
    fn snapshot_replaced_on_every_update() {
        let mut position = PositionState::default();
        position.update(1, growth(9), growth(2)).unwrap();
        assert_eq!(position.fee_growth_inside_0_last_x128, growth(9));
        assert_eq!(position.fee_growth_inside_1_last_x128, growth(2));
        // no double counting on an unchanged snapshot
        position.update(0, growth(9), growth(2)).unwrap();
        assert_eq!(position.tokens_owed_0, 0);
    }

    #[test]
    fn owed_accumulator_overflow_is_rejected() {
        let mut position = PositionState::default();
        position.liquidity = 1;
        position.tokens_owed_0 = u128::MAX;
        assert_eq!(
            position.update(0, growth(1), U256::default()),
            Err(ErrorCode::Overflow)
        );
    }

    #[test]
    fn wrapped_growth_delta_accrues_the_true_difference() {
        let mut position = PositionState::default();
        position.liquidity = 1;
        position.fee_growth_inside_0_last_x128 = U256::MAX - growth(1) + 1;
        // inside growth wrapped past zero: delta is 3 whole tokens
        position.update(0, growth(2), U256::default()).unwrap();
        assert_eq!(position.tokens_owed_0, 3);
    }
}
