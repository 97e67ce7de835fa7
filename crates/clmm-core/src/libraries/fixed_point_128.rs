//! A library for handling Q128.128 fixed point numbers, the encoding of all
//! fee growth accumulators.

use super::big_num::U256;

pub const RESOLUTION: u32 = 128;

/// 2^128
pub const Q128: U256 = U256([0, 0, 1, 0]);
