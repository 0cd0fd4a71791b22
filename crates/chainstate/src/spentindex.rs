//! Spent output index types.
//!
//! Maps a consumed outpoint to the transaction input that spent it. The
//! mempool keeps these entries in memory with `block_height == -1` until
//! the spend confirms.

use umbra_consensus::{Hash160, Hash256};
use umbra_script::AddressType;

pub const SPENT_INDEX_KEY_LEN: usize = 36;
pub const SPENT_INDEX_VALUE_LEN: usize = 69;

/// The consumed outpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SpentIndexKey {
    pub txid: Hash256,
    pub index: u32,
}

impl SpentIndexKey {
    pub fn new(txid: Hash256, index: u32) -> Self {
        Self { txid, index }
    }

    pub fn encode(&self) -> [u8; SPENT_INDEX_KEY_LEN] {
        let mut out = [0u8; SPENT_INDEX_KEY_LEN];
        out[0..32].copy_from_slice(&self.txid);
        out[32..36].copy_from_slice(&self.index.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != SPENT_INDEX_KEY_LEN {
            return None;
        }
        let txid: Hash256 = bytes[0..32].try_into().ok()?;
        let index = u32::from_le_bytes(bytes[32..36].try_into().ok()?);
        Some(Self { txid, index })
    }
}

/// The spend: which input of which transaction consumed the outpoint, what
/// it was worth, and whose address it debited.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SpentIndexValue {
    pub txid: Hash256,
    pub input_index: u32,
    pub block_height: i32,
    pub satoshis: i64,
    pub address_type: AddressType,
    pub address_hash: Hash160,
}

impl SpentIndexValue {
    pub fn is_mempool_only(&self) -> bool {
        self.block_height == -1
    }

    pub fn encode(&self) -> [u8; SPENT_INDEX_VALUE_LEN] {
        let mut out = [0u8; SPENT_INDEX_VALUE_LEN];
        out[0..32].copy_from_slice(&self.txid);
        out[32..36].copy_from_slice(&self.input_index.to_le_bytes());
        out[36..40].copy_from_slice(&self.block_height.to_le_bytes());
        out[40..48].copy_from_slice(&self.satoshis.to_le_bytes());
        out[48] = self.address_type.as_u8();
        out[49..69].copy_from_slice(&self.address_hash);
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != SPENT_INDEX_VALUE_LEN {
            return None;
        }
        let txid: Hash256 = bytes[0..32].try_into().ok()?;
        let input_index = u32::from_le_bytes(bytes[32..36].try_into().ok()?);
        let block_height = i32::from_le_bytes(bytes[36..40].try_into().ok()?);
        let satoshis = i64::from_le_bytes(bytes[40..48].try_into().ok()?);
        let address_type = AddressType::from_u8(bytes[48])?;
        let address_hash: Hash160 = bytes[49..69].try_into().ok()?;
        Some(Self {
            txid,
            input_index,
            block_height,
            satoshis,
            address_type,
            address_hash,
        })
    }
}
