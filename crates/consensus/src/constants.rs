//! Consensus-wide constants shared across validation.

/// Transaction version that carries ring-signature inputs (network rule).
pub const ANON_TXN_VERSION: i32 = 1000;
/// Number of base units in one coin.
pub const COIN: i64 = 100_000_000;
/// The maximum amount of money in circulation (network rule).
pub const MAX_MONEY: i64 = 42_000_000 * COIN;

/// No single output may carry an amount outside this range.
pub fn money_range(value: i64) -> bool {
    (0..=MAX_MONEY).contains(&value)
}
