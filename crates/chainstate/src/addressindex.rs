//! Address index key schemas backed by the storage trait.
//!
//! The serialized byte layouts are format commitments: explorers and RPC
//! tooling parse these keys, and byte-lexicographic order in the store must
//! equal the intended semantic order. Heights and per-block transaction
//! indices are therefore stored big-endian.

use umbra_consensus::{Hash160, Hash256};
use umbra_primitives::encoding::{DecodeError, Decoder, Encoder};
use umbra_script::AddressType;
use umbra_storage::{Column, KeyValueStore, StoreError, WriteBatch};

const TYPE_LEN: usize = 1;
const ADDRESS_LEN: usize = 20;
const HEIGHT_LEN: usize = 4;
const TX_INDEX_LEN: usize = 4;
const TXID_LEN: usize = 32;
const INDEX_LEN: usize = 4;
const SPENDING_LEN: usize = 1;

pub const ADDRESS_PREFIX_LEN: usize = TYPE_LEN + ADDRESS_LEN;
pub const ADDRESS_HEIGHT_PREFIX_LEN: usize = ADDRESS_PREFIX_LEN + HEIGHT_LEN;
pub const ADDRESS_UNSPENT_KEY_LEN: usize = ADDRESS_PREFIX_LEN + TXID_LEN + INDEX_LEN;
pub const ADDRESS_INDEX_KEY_LEN: usize =
    ADDRESS_PREFIX_LEN + HEIGHT_LEN + TX_INDEX_LEN + TXID_LEN + INDEX_LEN + SPENDING_LEN;

/// Key of one currently-unspent output of an address. 57 bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AddressUnspentKey {
    pub address_type: AddressType,
    pub address: Hash160,
    pub txid: Hash256,
    pub index: u32,
}

impl AddressUnspentKey {
    pub fn encode(&self) -> [u8; ADDRESS_UNSPENT_KEY_LEN] {
        let mut out = [0u8; ADDRESS_UNSPENT_KEY_LEN];
        out[0] = self.address_type.as_u8();
        let mut offset = TYPE_LEN;
        out[offset..offset + ADDRESS_LEN].copy_from_slice(&self.address);
        offset += ADDRESS_LEN;
        out[offset..offset + TXID_LEN].copy_from_slice(&self.txid);
        offset += TXID_LEN;
        out[offset..offset + INDEX_LEN].copy_from_slice(&self.index.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ADDRESS_UNSPENT_KEY_LEN {
            return None;
        }
        let address_type = AddressType::from_u8(bytes[0])?;
        let address: Hash160 = bytes[1..21].try_into().ok()?;
        let txid: Hash256 = bytes[21..53].try_into().ok()?;
        let index = u32::from_le_bytes(bytes[53..57].try_into().ok()?);
        Some(Self {
            address_type,
            address,
            txid,
            index,
        })
    }
}

/// Value stored under an [`AddressUnspentKey`]. `satoshis == -1` marks the
/// null value used as a tombstone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressUnspentValue {
    pub satoshis: i64,
    pub script_pubkey: Vec<u8>,
    pub block_height: i32,
}

impl AddressUnspentValue {
    pub fn null() -> Self {
        Self {
            satoshis: -1,
            script_pubkey: Vec::new(),
            block_height: 0,
        }
    }

    pub fn is_null(&self) -> bool {
        self.satoshis == -1
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_i64_le(self.satoshis);
        encoder.write_var_bytes(&self.script_pubkey);
        encoder.write_i32_le(self.block_height);
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let satoshis = decoder.read_i64_le()?;
        let script_pubkey = decoder.read_var_bytes()?;
        let block_height = decoder.read_i32_le()?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(Self {
            satoshis,
            script_pubkey,
            block_height,
        })
    }
}

/// One confirmed credit or debit of an address. 66 bytes.
///
/// Height and per-block transaction index are big-endian so a prefix scan
/// walks an address's history in chain order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AddressIndexKey {
    pub address_type: AddressType,
    pub address: Hash160,
    pub block_height: i32,
    pub tx_index: u32,
    pub txid: Hash256,
    pub index: u32,
    pub spending: bool,
}

impl AddressIndexKey {
    pub fn encode(&self) -> [u8; ADDRESS_INDEX_KEY_LEN] {
        let mut out = [0u8; ADDRESS_INDEX_KEY_LEN];
        out[0] = self.address_type.as_u8();
        let mut offset = TYPE_LEN;
        out[offset..offset + ADDRESS_LEN].copy_from_slice(&self.address);
        offset += ADDRESS_LEN;
        out[offset..offset + HEIGHT_LEN].copy_from_slice(&self.block_height.to_be_bytes());
        offset += HEIGHT_LEN;
        out[offset..offset + TX_INDEX_LEN].copy_from_slice(&self.tx_index.to_be_bytes());
        offset += TX_INDEX_LEN;
        out[offset..offset + TXID_LEN].copy_from_slice(&self.txid);
        offset += TXID_LEN;
        out[offset..offset + INDEX_LEN].copy_from_slice(&self.index.to_le_bytes());
        offset += INDEX_LEN;
        out[offset] = if self.spending { 1 } else { 0 };
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ADDRESS_INDEX_KEY_LEN {
            return None;
        }
        let address_type = AddressType::from_u8(bytes[0])?;
        let address: Hash160 = bytes[1..21].try_into().ok()?;
        let block_height = i32::from_be_bytes(bytes[21..25].try_into().ok()?);
        let tx_index = u32::from_be_bytes(bytes[25..29].try_into().ok()?);
        let txid: Hash256 = bytes[29..61].try_into().ok()?;
        let index = u32::from_le_bytes(bytes[61..65].try_into().ok()?);
        let spending = bytes[65] != 0;
        Some(Self {
            address_type,
            address,
            block_height,
            tx_index,
            txid,
            index,
            spending,
        })
    }
}

/// Prefix selecting the full history of one address. 21 bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AddressIndexIteratorKey {
    pub address_type: AddressType,
    pub address: Hash160,
}

impl AddressIndexIteratorKey {
    pub fn new(address_type: AddressType, address: Hash160) -> Self {
        Self {
            address_type,
            address,
        }
    }

    pub fn encode(&self) -> [u8; ADDRESS_PREFIX_LEN] {
        let mut out = [0u8; ADDRESS_PREFIX_LEN];
        out[0] = self.address_type.as_u8();
        out[TYPE_LEN..].copy_from_slice(&self.address);
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ADDRESS_PREFIX_LEN {
            return None;
        }
        let address_type = AddressType::from_u8(bytes[0])?;
        let address: Hash160 = bytes[1..21].try_into().ok()?;
        Some(Self {
            address_type,
            address,
        })
    }
}

/// Seek key starting an address-history scan at a height. 25 bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AddressIndexIteratorHeightKey {
    pub address_type: AddressType,
    pub address: Hash160,
    pub block_height: i32,
}

impl AddressIndexIteratorHeightKey {
    pub fn new(address_type: AddressType, address: Hash160, block_height: i32) -> Self {
        Self {
            address_type,
            address,
            block_height,
        }
    }

    pub fn encode(&self) -> [u8; ADDRESS_HEIGHT_PREFIX_LEN] {
        let mut out = [0u8; ADDRESS_HEIGHT_PREFIX_LEN];
        out[0] = self.address_type.as_u8();
        out[TYPE_LEN..ADDRESS_PREFIX_LEN].copy_from_slice(&self.address);
        out[ADDRESS_PREFIX_LEN..].copy_from_slice(&self.block_height.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ADDRESS_HEIGHT_PREFIX_LEN {
            return None;
        }
        let address_type = AddressType::from_u8(bytes[0])?;
        let address: Hash160 = bytes[1..21].try_into().ok()?;
        let block_height = i32::from_be_bytes(bytes[21..25].try_into().ok()?);
        Some(Self {
            address_type,
            address,
            block_height,
        })
    }
}

/// Key of one mempool-side address delta.
///
/// Field order matters: the derived ordering is the comparator the mempool's
/// delta map iterates with.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct MempoolAddressDeltaKey {
    pub address_type: AddressType,
    pub address: Hash160,
    pub txid: Hash256,
    pub index: u32,
    pub spending: bool,
}

impl MempoolAddressDeltaKey {
    pub fn new(
        address_type: AddressType,
        address: Hash160,
        txid: Hash256,
        index: u32,
        spending: bool,
    ) -> Self {
        Self {
            address_type,
            address,
            txid,
            index,
            spending,
        }
    }

    /// Smallest key for `(address_type, address)`; range-scan start.
    pub fn address_prefix(address_type: AddressType, address: Hash160) -> Self {
        Self {
            address_type,
            address,
            txid: [0u8; 32],
            index: 0,
            spending: false,
        }
    }
}

/// One unconfirmed credit or debit of an address.
///
/// `amount` is positive for outputs received and negative for outputs
/// spent; for spends, `prev_txid`/`prev_index` name the consumed outpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MempoolAddressDelta {
    pub time: i64,
    pub amount: i64,
    pub prev_txid: Hash256,
    pub prev_index: u32,
}

impl MempoolAddressDelta {
    pub fn spend(time: i64, amount: i64, prev_txid: Hash256, prev_index: u32) -> Self {
        Self {
            time,
            amount,
            prev_txid,
            prev_index,
        }
    }

    pub fn receive(time: i64, amount: i64) -> Self {
        Self {
            time,
            amount,
            prev_txid: [0u8; 32],
            prev_index: 0,
        }
    }
}

/// Persistent address index, keyed by the schemas above.
pub struct AddressIndexDb<S> {
    store: S,
}

impl<S> AddressIndexDb<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: KeyValueStore> AddressIndexDb<S> {
    pub fn put_unspent(
        &self,
        batch: &mut WriteBatch,
        key: &AddressUnspentKey,
        value: &AddressUnspentValue,
    ) {
        batch.put(Column::AddressUnspent, key.encode(), value.encode());
    }

    pub fn delete_unspent(&self, batch: &mut WriteBatch, key: &AddressUnspentKey) {
        batch.delete(Column::AddressUnspent, key.encode());
    }

    /// All live unspent outputs of one address. Tombstone rows
    /// (null values) are skipped.
    pub fn unspent_for_address(
        &self,
        address_type: AddressType,
        address: &Hash160,
    ) -> Result<Vec<(AddressUnspentKey, AddressUnspentValue)>, StoreError> {
        let prefix = AddressIndexIteratorKey::new(address_type, *address).encode();
        let rows = self.store.scan_prefix(Column::AddressUnspent, &prefix)?;
        let mut out = Vec::with_capacity(rows.len());
        for (key_bytes, value_bytes) in rows {
            let key = AddressUnspentKey::decode(&key_bytes)
                .ok_or_else(|| StoreError::Backend("invalid address unspent key".to_string()))?;
            let value = AddressUnspentValue::decode(&value_bytes)
                .map_err(|err| StoreError::Backend(err.to_string()))?;
            if value.is_null() {
                continue;
            }
            out.push((key, value));
        }
        Ok(out)
    }

    pub fn put_history(&self, batch: &mut WriteBatch, key: &AddressIndexKey, satoshis: i64) {
        batch.put(Column::AddressIndex, key.encode(), satoshis.to_le_bytes());
    }

    pub fn delete_history(&self, batch: &mut WriteBatch, key: &AddressIndexKey) {
        batch.delete(Column::AddressIndex, key.encode());
    }

    /// Full history of one address, height-ascending.
    pub fn history_for_address(
        &self,
        address_type: AddressType,
        address: &Hash160,
    ) -> Result<Vec<(AddressIndexKey, i64)>, StoreError> {
        let prefix = AddressIndexIteratorKey::new(address_type, *address).encode();
        let rows = self.store.scan_prefix(Column::AddressIndex, &prefix)?;
        let mut out = Vec::with_capacity(rows.len());
        for (key_bytes, value_bytes) in rows {
            out.push(decode_history_row(&key_bytes, &value_bytes)?);
        }
        Ok(out)
    }

    /// History of one address starting at `from_height`, height-ascending.
    pub fn history_from_height(
        &self,
        address_type: AddressType,
        address: &Hash160,
        from_height: i32,
    ) -> Result<Vec<(AddressIndexKey, i64)>, StoreError> {
        let start = AddressIndexIteratorHeightKey::new(address_type, *address, from_height).encode();
        let prefix = AddressIndexIteratorKey::new(address_type, *address).encode();
        let mut out = Vec::new();
        self.store
            .for_each_from(Column::AddressIndex, &start, &mut |key_bytes, value_bytes| {
                if !key_bytes.starts_with(&prefix) {
                    return Ok(false);
                }
                out.push(decode_history_row(key_bytes, value_bytes)?);
                Ok(true)
            })?;
        Ok(out)
    }
}

fn decode_history_row(
    key_bytes: &[u8],
    value_bytes: &[u8],
) -> Result<(AddressIndexKey, i64), StoreError> {
    let key = AddressIndexKey::decode(key_bytes)
        .ok_or_else(|| StoreError::Backend("invalid address index key".to_string()))?;
    let satoshis = value_bytes
        .try_into()
        .map(i64::from_le_bytes)
        .map_err(|_| StoreError::Backend("invalid address index value".to_string()))?;
    Ok((key, satoshis))
}
