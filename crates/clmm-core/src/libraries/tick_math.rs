//! Bijection between integer ticks and Q64.96 sqrt prices,
//! `sqrt_price = 1.0001^(tick/2) * 2^96`.

use crate::error::ErrorCode;
use crate::libraries::big_num::U256;

/// The minimum tick
pub const MIN_TICK: i32 = -887272;
/// The maximum tick
pub const MAX_TICK: i32 = -MIN_TICK;

/// The minimum value that can be returned from [`get_sqrt_price_at_tick`].
/// Equivalent to `get_sqrt_price_at_tick(MIN_TICK)`
pub const MIN_SQRT_PRICE_X96: U256 = U256([4295128739, 0, 0, 0]);
/// The maximum value that can be returned from [`get_sqrt_price_at_tick`].
/// Equivalent to `get_sqrt_price_at_tick(MAX_TICK)`
pub const MAX_SQRT_PRICE_X96: U256 =
    U256([6743328256752651558, 17280870778742802505, 4294805859, 0]);

const BIT_PRECISION: u32 = 16;

/// Calculates 1.0001^(tick/2) as a Q64.96 number representing the square
/// root of the ratio of the two assets (token_1/token_0)
///
/// Each magic factor is `2^128 / (1.0001^(2^(i - 1)))` for i in `[0, 20)`;
/// the product is kept at Q128 precision and narrowed to Q96 at the end,
/// rounding up, so the result always matches the canonical bit-for-bit.
///
/// Fails if |tick| > MAX_TICK
///
/// # Arguments
/// * `tick` - Price tick
///
pub fn get_sqrt_price_at_tick(tick: i32) -> Result<U256, ErrorCode> {
    let abs_tick = tick.unsigned_abs();
    if abs_tick > MAX_TICK as u32 {
        return Err(ErrorCode::InvalidTickRange);
    }

    // i = 0
    let mut ratio = if abs_tick & 0x1 != 0 {
        U256([0xaa2d162d1a594001, 0xfffcb933bd6fad37, 0, 0])
    } else {
        // 2^128
        U256([0, 0, 1, 0])
    };
    // i = 1
    if abs_tick & 0x2 != 0 {
        ratio = (ratio * U256([0x59a46990580e213a, 0xfff97272373d4132, 0, 0])) >> 128
    };
    // i = 2
    if abs_tick & 0x4 != 0 {
        ratio = (ratio * U256([0xef12357cf3c7fdcc, 0xfff2e50f5f656932, 0, 0])) >> 128
    };
    // i = 3
    if abs_tick & 0x8 != 0 {
        ratio = (ratio * U256([0x1c3624eaa0941cd0, 0xffe5caca7e10e4e6, 0, 0])) >> 128
    };
    // i = 4
    if abs_tick & 0x10 != 0 {
        ratio = (ratio * U256([0xc9db58835c926644, 0xffcb9843d60f6159, 0, 0])) >> 128
    };
    // i = 5
    if abs_tick & 0x20 != 0 {
        ratio = (ratio * U256([0x472e6896dfb254c0, 0xff973b41fa98c081, 0, 0])) >> 128
    };
    // i = 6
    if abs_tick & 0x40 != 0 {
        ratio = (ratio * U256([0x43ec78b326b52861, 0xff2ea16466c96a38, 0, 0])) >> 128
    };
    // i = 7
    if abs_tick & 0x80 != 0 {
        ratio = (ratio * U256([0x11c461f1969c3053, 0xfe5dee046a99a2a8, 0, 0])) >> 128
    };
    // i = 8
    if abs_tick & 0x100 != 0 {
        ratio = (ratio * U256([0xdcffc83b479aa3a4, 0xfcbe86c7900a88ae, 0, 0])) >> 128
    };
    // i = 9
    if abs_tick & 0x200 != 0 {
        ratio = (ratio * U256([0x6f2b074cf7815e54, 0xf987a7253ac41317, 0, 0])) >> 128
    };
    // i = 10
    if abs_tick & 0x400 != 0 {
        ratio = (ratio * U256([0x940c7a398e4b70f3, 0xf3392b0822b70005, 0, 0])) >> 128
    };
    // i = 11
    if abs_tick & 0x800 != 0 {
        ratio = (ratio * U256([0x43b29c7fa6e889d9, 0xe7159475a2c29b74, 0, 0])) >> 128
    };
    // i = 12
    if abs_tick & 0x1000 != 0 {
        ratio = (ratio * U256([0x845ad8f792aa5825, 0xd097f3bdfd2022b8, 0, 0])) >> 128
    };
    // i = 13
    if abs_tick & 0x2000 != 0 {
        ratio = (ratio * U256([0x8a65dc1f90e061e5, 0xa9f746462d870fdf, 0, 0])) >> 128
    };
    // i = 14
    if abs_tick & 0x4000 != 0 {
        ratio = (ratio * U256([0x90bb3df62baf32f7, 0x70d869a156d2a1b8, 0, 0])) >> 128
    };
    // i = 15
    if abs_tick & 0x8000 != 0 {
        ratio = (ratio * U256([0x81231505542fcfa6, 0x31be135f97d08fd9, 0, 0])) >> 128
    };
    // i = 16
    if abs_tick & 0x10000 != 0 {
        ratio = (ratio * U256([0xc677de54f3e99bc9, 0x09aa508b5b7a84e1, 0, 0])) >> 128
    };
    // i = 17
    if abs_tick & 0x20000 != 0 {
        ratio = (ratio * U256([0x6699c329225ee604, 0x005d6af8dedb8119, 0, 0])) >> 128
    };
    // i = 18
    if abs_tick & 0x40000 != 0 {
        ratio = (ratio * U256([0x1ea926041bedfe98, 0x00002216e584f5fa, 0, 0])) >> 128
    };
    // i = 19
    if abs_tick & 0x80000 != 0 {
        ratio = (ratio * U256([0x91f7dc42444e8fa2, 0x00000000048a1703, 0, 0])) >> 128
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128 to Q64.96, rounding up so getTickAtSqrtPrice of the result is the
    // input tick
    let rounded = if (ratio & U256::from(0xffffffffu64)).is_zero() {
        U256::default()
    } else {
        U256::from(1)
    };
    Ok((ratio >> 32) + rounded)
}

/// Calculates the greatest tick value such that
/// `get_sqrt_price_at_tick(tick) <= sqrt_price_x96`
///
/// Fails if `sqrt_price_x96 < MIN_SQRT_PRICE_X96` or
/// `sqrt_price_x96 >= MAX_SQRT_PRICE_X96`
///
/// Formula: `i = log base(√1.0001) (√P)`
pub fn get_tick_at_sqrt_price(sqrt_price_x96: U256) -> Result<i32, ErrorCode> {
    // second inequality must be < because the price can never reach the price
    // at the max tick
    if sqrt_price_x96 < MIN_SQRT_PRICE_X96 || sqrt_price_x96 >= MAX_SQRT_PRICE_X96 {
        return Err(ErrorCode::InvalidTickRange);
    }

    // Determine log_b(sqrt_price). First by calculating integer portion (msb)
    let msb = 255 - sqrt_price_x96.leading_zeros();
    let log2p_integer_x32 = (msb as i128 - 96) << 32;

    // get fractional value (r/2^msb). We begin the iteration from bit 63
    // (0.5 in Q64.64)
    let mut bit: i128 = 0x8000_0000_0000_0000i128;
    let mut precision = 0;
    let mut log2p_fraction_x64: i128 = 0;

    // Log2 iterative approximation for the fractional part, normalized so the
    // most significant bit of r sits at position 63
    let mut r: u128 = if msb >= 64 {
        (sqrt_price_x96 >> (msb - 63)).low_u128()
    } else {
        sqrt_price_x96.low_u128() << (63 - msb)
    };

    while bit > 0 && precision < BIT_PRECISION {
        r *= r;
        let is_r_more_than_two = (r >> 127) as u32;
        r >>= 63 + is_r_more_than_two;
        log2p_fraction_x64 += bit * is_r_more_than_two as i128;
        bit >>= 1;
        precision += 1;
    }
    let log2p_fraction_x32 = log2p_fraction_x64 >> 32;
    let log2p_x32 = log2p_integer_x32 + log2p_fraction_x32;

    // 14 bit refinement gives an error margin of 2^-14 / log2 (√1.0001) =
    // 0.8461 < 1, and the tick is an integer so an error under 1 is resolved
    // by the bracket check below

    // Change of base rule: multiply with 2^32 / log2 (√1.0001)
    let log_sqrt_10001_x64 = log2p_x32 * 59543866431248i128;

    // tick - 0.01
    let tick_low = ((log_sqrt_10001_x64 - 184467440737095516i128) >> 64) as i32;

    // tick + (2^-14 / log2(√1.0001)) + 0.01
    let tick_high = ((log_sqrt_10001_x64 + 15793534762490258745i128) >> 64) as i32;

    Ok(if tick_low == tick_high {
        tick_low
    } else if get_sqrt_price_at_tick(tick_high)? <= sqrt_price_x96 {
        tick_high
    } else {
        tick_low
    })
}
