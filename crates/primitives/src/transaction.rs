//! Transaction types and serialization.

use umbra_consensus::{Hash256, ANON_TXN_VERSION};

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::sha256d;
use crate::outpoint::OutPoint;

const OP_RETURN: u8 = 0x6a;
/// Marker opcode tagging a ring-signature input's scriptSig.
const OP_ANON_MARKER: u8 = 0xb4;

/// Serialized length of a compressed key image.
pub const KEY_IMAGE_SIZE: usize = 33;
const MIN_ANON_IN_SIZE: usize = 2 + KEY_IMAGE_SIZE;

/// Key image identifying an anonymous spend.
pub type KeyImage = Vec<u8>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl TxIn {
    /// Whether this input spends an anonymous output.
    ///
    /// Anon inputs carry `OP_RETURN OP_ANON_MARKER <33-byte key image>` at
    /// the front of the scriptSig instead of a signature over a prevout.
    pub fn is_anon_input(&self) -> bool {
        self.script_sig.len() >= MIN_ANON_IN_SIZE
            && self.script_sig[0] == OP_RETURN
            && self.script_sig[1] == OP_ANON_MARKER
    }

    pub fn extract_key_image(&self) -> Option<KeyImage> {
        if !self.is_anon_input() {
            return None;
        }
        Some(self.script_sig[2..2 + KEY_IMAGE_SIZE].to_vec())
    }
}

impl Encodable for TxIn {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.prevout.consensus_encode(encoder);
        encoder.write_var_bytes(&self.script_sig);
        encoder.write_u32_le(self.sequence);
    }
}

impl Decodable for TxIn {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let prevout = OutPoint::consensus_decode(decoder)?;
        let script_sig = decoder.read_var_bytes()?;
        let sequence = decoder.read_u32_le()?;
        Ok(Self {
            prevout,
            script_sig,
            sequence,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Vec<u8>,
}

impl Encodable for TxOut {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i64_le(self.value);
        encoder.write_var_bytes(&self.script_pubkey);
    }
}

impl Decodable for TxOut {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let value = decoder.read_i64_le()?;
        let script_pubkey = decoder.read_var_bytes()?;
        Ok(Self {
            value,
            script_pubkey,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transaction {
    pub version: i32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn txid(&self) -> Hash256 {
        let mut encoder = Encoder::new();
        self.consensus_encode(&mut encoder);
        sha256d(&encoder.into_inner())
    }

    pub fn is_anon_version(&self) -> bool {
        self.version == ANON_TXN_VERSION
    }

    /// Key images of all anon inputs, in input order.
    pub fn key_images(&self) -> Vec<KeyImage> {
        self.vin
            .iter()
            .filter_map(TxIn::extract_key_image)
            .collect()
    }
}

impl Encodable for Transaction {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i32_le(self.version);
        encoder.write_varint(self.vin.len() as u64);
        for txin in &self.vin {
            txin.consensus_encode(encoder);
        }
        encoder.write_varint(self.vout.len() as u64);
        for txout in &self.vout {
            txout.consensus_encode(encoder);
        }
        encoder.write_u32_le(self.lock_time);
    }
}

impl Decodable for Transaction {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let version = decoder.read_i32_le()?;
        let vin_len = decoder.read_varint()?;
        let mut vin = Vec::with_capacity(vin_len.min(1024) as usize);
        for _ in 0..vin_len {
            vin.push(TxIn::consensus_decode(decoder)?);
        }
        let vout_len = decoder.read_varint()?;
        let mut vout = Vec::with_capacity(vout_len.min(1024) as usize);
        for _ in 0..vout_len {
            vout.push(TxOut::consensus_decode(decoder)?);
        }
        let lock_time = decoder.read_u32_le()?;
        Ok(Self {
            version,
            vin,
            vout,
            lock_time,
        })
    }
}

/// Builds the scriptSig prefix of an anon input for the given key image.
///
/// The remainder of a real anon scriptSig (ring signature data) follows the
/// prefix and does not affect key-image extraction.
pub fn anon_script_sig(key_image: &[u8; KEY_IMAGE_SIZE]) -> Vec<u8> {
    let mut script = Vec::with_capacity(MIN_ANON_IN_SIZE);
    script.push(OP_RETURN);
    script.push(OP_ANON_MARKER);
    script.extend_from_slice(key_image);
    script
}
