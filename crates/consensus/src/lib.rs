//! Consensus constants and shared hash types.

pub mod constants;

/// 256-bit hash in wire byte order.
pub type Hash256 = [u8; 32];

/// 160-bit hash (RIPEMD160 of SHA256) in wire byte order.
pub type Hash160 = [u8; 20];

pub use constants::{money_range, ANON_TXN_VERSION, COIN, MAX_MONEY};
