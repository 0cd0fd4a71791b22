//! Standard script classification utilities.

use umbra_consensus::Hash160;
use umbra_primitives::hash::hash160;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScriptType {
    P2Pk,
    P2Pkh,
    P2Sh,
    Unknown,
}

/// Address kind recorded in index keys. The discriminants are wire-stable:
/// they are written as the first byte of every persistent address key.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum AddressType {
    None = 0,
    PubKeyHash = 1,
    ScriptHash = 2,
}

impl AddressType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::PubKeyHash),
            2 => Some(Self::ScriptHash),
            _ => None,
        }
    }
}

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;

pub fn classify_script_pubkey(script: &[u8]) -> ScriptType {
    if is_p2pkh(script) {
        ScriptType::P2Pkh
    } else if is_p2sh(script) {
        ScriptType::P2Sh
    } else if is_p2pk(script) {
        ScriptType::P2Pk
    } else {
        ScriptType::Unknown
    }
}

/// Maps an output script to the address hash the indices key on.
///
/// P2SH and P2PKH embed the hash in the script; P2PK hashes the pushed key
/// so that pay-to-pubkey activity lands under the same address as P2PKH.
/// Unrecognized scripts yield `(AddressType::None, zeroes)` and are not
/// indexed.
pub fn extract_address(script: &[u8]) -> (AddressType, Hash160) {
    match classify_script_pubkey(script) {
        ScriptType::P2Sh => {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&script[2..22]);
            (AddressType::ScriptHash, hash)
        }
        ScriptType::P2Pkh => {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&script[3..23]);
            (AddressType::PubKeyHash, hash)
        }
        ScriptType::P2Pk => {
            let pubkey = &script[1..script.len() - 1];
            (AddressType::PubKeyHash, hash160(pubkey))
        }
        ScriptType::Unknown => (AddressType::None, [0u8; 20]),
    }
}

fn is_p2pkh(script: &[u8]) -> bool {
    script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 0x14
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
}

fn is_p2sh(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL
}

fn is_p2pk(script: &[u8]) -> bool {
    let key_len = match script.first().copied() {
        Some(len @ 33) => len,
        Some(len @ 65) => len,
        _ => return false,
    };

    let expected_len = key_len as usize + 2;
    script.len() == expected_len && script[script.len() - 1] == OP_CHECKSIG
}
