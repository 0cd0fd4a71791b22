//! Core transaction types and consensus serialization.

pub mod encoding;
pub mod hash;
pub mod outpoint;
pub mod transaction;

pub use hash::{hash160, sha256, sha256d};
pub use outpoint::{InPoint, OutPoint};
pub use transaction::{KeyImage, Transaction, TxIn, TxOut};
