//! Transaction outpoint and inpoint types.

use umbra_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};

/// Reference to one output of one transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct OutPoint {
    pub hash: Hash256,
    pub index: u32,
}

impl OutPoint {
    pub fn new(hash: Hash256, index: u32) -> Self {
        Self { hash, index }
    }

    pub fn null() -> Self {
        Self {
            hash: [0u8; 32],
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.hash == [0u8; 32] && self.index == u32::MAX
    }
}

impl Encodable for OutPoint {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_hash256(&self.hash);
        encoder.write_u32_le(self.index);
    }
}

impl Decodable for OutPoint {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let hash = decoder.read_hash256()?;
        let index = decoder.read_u32_le()?;
        Ok(Self { hash, index })
    }
}

/// Reference to one input of one transaction, by the spender's id.
///
/// In-memory only; never serialized.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InPoint {
    pub txid: Hash256,
    pub input_index: u32,
}

impl InPoint {
    pub fn new(txid: Hash256, input_index: u32) -> Self {
        Self { txid, input_index }
    }
}
