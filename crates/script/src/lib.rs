//! Standard output-script classification.

pub mod standard;

pub use standard::{classify_script_pubkey, extract_address, AddressType, ScriptType};
