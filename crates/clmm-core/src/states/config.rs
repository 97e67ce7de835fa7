use std::fmt;

use crate::error::ErrorCode;
use crate::libraries::tick_math;

/// Fee rates are expressed in hundredths of a bip, i.e. units of 10^-6
pub const FEE_RATE_DENOMINATOR_VALUE: u32 = 1_000_000;

/// Opaque 32-byte account identity assigned by the host runtime. The pool
/// only compares and forwards these; it never interprets them.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 32]);

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Immutable parameters of a pool, fixed at construction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// The first token of the pair, sorted below token_1
    pub token_0: Address,
    /// The second token of the pair
    pub token_1: Address,
    /// The trade fee rate, denominated in hundredths of a bip (10^-6)
    pub fee: u32,
    /// The spacing between usable ticks
    pub tick_spacing: i32,
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), ErrorCode> {
        if self.fee >= FEE_RATE_DENOMINATOR_VALUE {
            return Err(ErrorCode::Overflow);
        }
        if self.tick_spacing <= 0 || self.tick_spacing > tick_math::MAX_TICK {
            return Err(ErrorCode::InvalidTickRange);
        }
        Ok(())
    }
}
