//! A library for handling Q64.96 fixed point numbers, the encoding of every
//! sqrt price in the pool.

use super::big_num::U256;

pub const RESOLUTION: u32 = 96;

/// 2^96
pub const Q96: U256 = U256([0, 1 << 32, 0, 0]);
