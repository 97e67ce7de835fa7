use thiserror::Error;

/// Errors surfaced by pool operations and the math libraries.
///
/// Every error is fatal to the calling operation: the pool restores its
/// pre-operation state before propagating, so no partial progress is ever
/// visible to the host.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    #[error("LOK")]
    ReentrancyLock,
    #[error("pool is not initialized")]
    NotInitialized,
    #[error("pool is already initialized")]
    AlreadyInitialized,
    #[error("tick range out of bounds, unordered or unaligned to tick spacing")]
    InvalidTickRange,
    #[error("liquidity amount must be greater than 0")]
    ZeroLiquidity,
    #[error("swap amount specified cannot be zero")]
    ZeroAmountSpecified,
    #[error("sqrt price limit on the wrong side of the current price or out of bounds")]
    InvalidPriceLimit,
    #[error("not enough liquidity to continue the swap")]
    NotEnoughLiquidity,
    #[error("liquidity gross would exceed the per tick maximum")]
    MaxLiquidityPerTickExceeded,
    #[error("callback did not pay the owed input amount")]
    InsufficientInputAmount,
    #[error("flash loan principal plus fee was not returned")]
    FlashLoanNotPaid,
    #[error("token transfer failed")]
    TransferFailed,
    #[error("requested observation predates the oldest stored one")]
    OldObservation,
    #[error("arithmetic overflow or underflow")]
    Overflow,
}
