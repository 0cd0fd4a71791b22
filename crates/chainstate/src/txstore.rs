//! Disk transaction store backed by the storage trait.

use umbra_consensus::Hash256;
use umbra_primitives::encoding::{decode, encode};
use umbra_primitives::outpoint::OutPoint;
use umbra_primitives::transaction::Transaction;
use umbra_storage::{Column, KeyValueStore, StoreError, WriteBatch};

/// Serialized transactions keyed by txid.
///
/// The mempool's sidecar indices read previous transactions through this
/// store; it never takes any mempool lock.
pub struct TxStore<S> {
    store: S,
}

impl<S> TxStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: KeyValueStore> TxStore<S> {
    pub fn put_tx(&self, batch: &mut WriteBatch, tx: &Transaction) {
        batch.put(Column::Tx, tx.txid(), encode(tx));
    }

    pub fn delete_tx(&self, batch: &mut WriteBatch, txid: &Hash256) {
        batch.delete(Column::Tx, txid);
    }

    pub fn read_tx(&self, txid: &Hash256) -> Result<Option<Transaction>, StoreError> {
        let bytes = match self.store.get(Column::Tx, txid)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        decode::<Transaction>(&bytes)
            .map(Some)
            .map_err(|err| StoreError::Backend(err.to_string()))
    }

    /// The transaction whose output `outpoint` names, if it is on disk.
    pub fn read_disk_tx(&self, outpoint: &OutPoint) -> Result<Option<Transaction>, StoreError> {
        self.read_tx(&outpoint.hash)
    }
}
