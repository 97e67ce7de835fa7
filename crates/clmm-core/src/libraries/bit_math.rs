//! Index of the most / least significant set bit of a 256 bit word.

use super::big_num::U256;

/// Returns the index of the most significant non-zero bit of the number
///
/// The function satisfies the property:
///     x >= 2**most_significant_bit(x) and x < 2**(most_significant_bit(x)+1)
///
/// # Arguments
///
/// * `x` - the value for which to compute the most significant bit, must be
///   greater than 0
///
pub fn most_significant_bit(x: U256) -> u8 {
    assert!(x > U256::default());
    (255 - x.leading_zeros()) as u8
}

/// Returns the index of the least significant non-zero bit of the number
///
/// The function satisfies the property:
///     (x & 2**least_significant_bit(x)) != 0 and (x & (2**least_significant_bit(x) - 1)) == 0
///
/// # Arguments
///
/// * `x` - the value for which to compute the least significant bit, must be
///   greater than 0
///
pub fn least_significant_bit(x: U256) -> u8 {
    assert!(x > U256::default());
    x.trailing_zeros() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msb_at_powers_of_two() {
        for i in 0..256 {
            assert_eq!(most_significant_bit(U256::from(1) << i), i as u8);
        }
    }

    #[test]
    fn lsb_at_powers_of_two() {
        for i in 0..256 {
            assert_eq!(least_significant_bit(U256::from(1) << i), i as u8);
        }
    }

    #[test]
    fn msb_and_lsb_of_composite_words() {
        let x = (U256::from(1) << 200) | (U256::from(1) << 8);
        assert_eq!(most_significant_bit(x), 200);
        assert_eq!(least_significant_bit(x), 8);
    }

    #[test]
    #[should_panic]
    fn msb_of_zero() {
        most_significant_bit(U256::default());
    }
}
