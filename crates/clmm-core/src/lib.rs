//! Core math and state machine for a concentrated liquidity AMM pool.
//!
//! The crate is split the same way the on-pool concerns are: `libraries`
//! holds the pure fixed-point, tick and swap-step math, `states` holds the
//! tick table, position table, bitmap, oracle ring and the pool machine that
//! coordinates them. Asset settlement is not performed here; the pool drives
//! a [`states::pool::SettlementHost`] and verifies its own balance deltas.

pub mod error;
pub mod libraries;
pub mod states;

pub use error::ErrorCode;
pub use states::config::{Address, PoolConfig};
pub use states::pool::{PoolState, SettlementHost, Slot0};
