use super::big_num::U256;

pub trait UnsafeMathTrait {
    /// Returns ceil (x / y)
    /// Division by 0 panics, and must be checked externally
    fn div_rounding_up(x: Self, y: Self) -> Self;
}

impl UnsafeMathTrait for u128 {
    fn div_rounding_up(x: Self, y: Self) -> Self {
        x / y + ((x % y > 0) as u128)
    }
}

impl UnsafeMathTrait for U256 {
    fn div_rounding_up(x: Self, y: Self) -> Self {
        x / y + U256::from((x % y > U256::default()) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divide_by_factor() {
        assert_eq!(u128::div_rounding_up(4, 2), 2);
    }

    #[test]
    fn divide_and_round_up() {
        assert_eq!(u128::div_rounding_up(4, 3), 2);
        assert_eq!(
            U256::div_rounding_up(U256::from(7), U256::from(4)),
            U256::from(2)
        );
    }

    #[test]
    #[should_panic]
    fn divide_by_zero() {
        u128::div_rounding_up(2, 0);
    }
}
