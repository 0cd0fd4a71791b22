//! In-memory pool of unconfirmed transactions.
//!
//! The pool holds transactions that are valid under the current best chain
//! but not yet mined. Alongside the transaction map it maintains an
//! outpoint-to-spender map, a key-image map for ring-signature spends, and
//! two sidecar indices (address deltas and spent outpoints) that back
//! wallet and RPC queries over unconfirmed activity.
//!
//! All shared state sits behind one mutex; every public operation,
//! including the read-only ones, takes it. The pool is volatile: it starts
//! empty and nothing is persisted.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fmt::Write as _;
use std::sync::Mutex;

use umbra_chainstate::{
    MempoolAddressDelta, MempoolAddressDeltaKey, SpentIndexKey, SpentIndexValue, TxStore,
};
use umbra_consensus::{Hash160, Hash256};
use umbra_log::{log_debug, log_warn};
use umbra_primitives::outpoint::{InPoint, OutPoint};
use umbra_primitives::transaction::{KeyImage, Transaction};
use umbra_script::{extract_address, AddressType};
use umbra_storage::{KeyValueStore, StoreError};

/// Height recorded in a spent-index entry while the spend is unconfirmed.
const MEMPOOL_SPEND_HEIGHT: i32 = -1;

/// Where a key image was spent.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeyImageSpent {
    pub txid: Hash256,
    pub input_index: u32,
    pub value: i64,
}

#[derive(Debug)]
pub enum IndexError {
    /// A previous transaction was read from disk but does not have the
    /// output the input names. Indicates corruption; nothing was committed.
    PrevoutOutOfRange { txid: Hash256, outpoint: OutPoint },
    Store(StoreError),
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::PrevoutOutOfRange { txid, outpoint } => write!(
                f,
                "tx {} spends out-of-range output {}:{}",
                hash_hex(txid),
                hash_hex(&outpoint.hash),
                outpoint.index
            ),
            IndexError::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for IndexError {}

impl From<StoreError> for IndexError {
    fn from(err: StoreError) -> Self {
        IndexError::Store(err)
    }
}

#[derive(Default)]
struct PoolInner {
    map_tx: HashMap<Hash256, Transaction>,
    map_next_tx: HashMap<OutPoint, InPoint>,
    map_key_image: HashMap<KeyImage, KeyImageSpent>,
    map_address: BTreeMap<MempoolAddressDeltaKey, MempoolAddressDelta>,
    map_address_inserted: HashMap<Hash256, Vec<MempoolAddressDeltaKey>>,
    map_spent: BTreeMap<SpentIndexKey, SpentIndexValue>,
    map_spent_inserted: HashMap<Hash256, Vec<SpentIndexKey>>,
    transactions_updated: u32,
}

impl PoolInner {
    /// Removes `start` and, when `recursive`, everything reachable from it
    /// through the outpoint-to-spender map. The spender graph is acyclic
    /// (a spender is only inserted after its parent outpoint exists), so
    /// the worklist terminates.
    fn remove_worklist(&mut self, start: Hash256, recursive: bool) {
        let mut stack = vec![start];
        while let Some(txid) = stack.pop() {
            let Some(tx) = self.map_tx.remove(&txid) else {
                continue;
            };
            if recursive {
                for index in 0..tx.vout.len() as u32 {
                    let outpoint = OutPoint::new(txid, index);
                    if let Some(spender) = self.map_next_tx.get(&outpoint) {
                        stack.push(spender.txid);
                    }
                }
            }
            for txin in &tx.vin {
                if self
                    .map_next_tx
                    .get(&txin.prevout)
                    .is_some_and(|inpoint| inpoint.txid == txid)
                {
                    self.map_next_tx.remove(&txin.prevout);
                }
            }
            if tx.is_anon_version() {
                for txin in &tx.vin {
                    if let Some(image) = txin.extract_key_image() {
                        self.map_key_image.remove(&image);
                    }
                }
            }
            self.transactions_updated = self.transactions_updated.saturating_add(1);
            log_debug!("removed tx {}", hash_hex(&txid));
        }
    }
}

/// The transaction memory pool.
pub struct TxMemPool {
    inner: Mutex<PoolInner>,
}

impl Default for TxMemPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TxMemPool {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
        }
    }

    /// Adds a transaction without checking anything.
    ///
    /// Callers must have established that `tx` is valid and conflict-free;
    /// an input already spent in the pool is silently overwritten here.
    pub fn add_unchecked(&self, hash: Hash256, tx: Transaction) {
        let mut inner = self.inner.lock().expect("mempool lock");
        for (input_index, txin) in tx.vin.iter().enumerate() {
            inner
                .map_next_tx
                .insert(txin.prevout, InPoint::new(hash, input_index as u32));
        }
        inner.map_tx.insert(hash, tx);
        inner.transactions_updated = inner.transactions_updated.saturating_add(1);
        log_debug!("added tx {}", hash_hex(&hash));
    }

    /// Removes `tx` from the pool; a no-op when it is not present. With
    /// `recursive`, every pool transaction spending one of its outputs is
    /// removed first.
    pub fn remove(&self, tx: &Transaction, recursive: bool) {
        let mut inner = self.inner.lock().expect("mempool lock");
        inner.remove_worklist(tx.txid(), recursive);
    }

    /// Removes every pool transaction that spends an input of the
    /// newly-confirming `tx`, and its descendants. `tx` itself is left
    /// alone.
    pub fn remove_conflicts(&self, tx: &Transaction) {
        let txid = tx.txid();
        let mut inner = self.inner.lock().expect("mempool lock");
        for txin in &tx.vin {
            let Some(spender) = inner.map_next_tx.get(&txin.prevout) else {
                continue;
            };
            if spender.txid != txid {
                let conflict = spender.txid;
                inner.remove_worklist(conflict, true);
            }
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("mempool lock");
        inner.map_tx.clear();
        inner.map_next_tx.clear();
        inner.map_key_image.clear();
        inner.map_address.clear();
        inner.map_address_inserted.clear();
        inner.map_spent.clear();
        inner.map_spent_inserted.clear();
        inner.transactions_updated = inner.transactions_updated.saturating_add(1);
        log_debug!("mempool cleared");
    }

    /// Ids of all pool transactions, sorted.
    pub fn query_hashes(&self) -> Vec<Hash256> {
        let inner = self.inner.lock().expect("mempool lock");
        let mut txids: Vec<Hash256> = inner.map_tx.keys().copied().collect();
        txids.sort();
        txids
    }

    pub fn lookup(&self, txid: &Hash256) -> Option<Transaction> {
        let inner = self.inner.lock().expect("mempool lock");
        inner.map_tx.get(txid).cloned()
    }

    pub fn exists(&self, txid: &Hash256) -> bool {
        let inner = self.inner.lock().expect("mempool lock");
        inner.map_tx.contains_key(txid)
    }

    pub fn size(&self) -> usize {
        let inner = self.inner.lock().expect("mempool lock");
        inner.map_tx.len()
    }

    /// Monotonic revision counter; pollers compare it to detect change.
    pub fn transactions_updated(&self) -> u32 {
        let inner = self.inner.lock().expect("mempool lock");
        inner.transactions_updated
    }

    pub fn add_transactions_updated(&self, n: u32) {
        let mut inner = self.inner.lock().expect("mempool lock");
        inner.transactions_updated = inner.transactions_updated.saturating_add(n);
    }

    pub fn insert_key_image(&self, image: KeyImage, spent: KeyImageSpent) {
        let mut inner = self.inner.lock().expect("mempool lock");
        inner.map_key_image.insert(image, spent);
    }

    pub fn lookup_key_image(&self, image: &[u8]) -> Option<KeyImageSpent> {
        let inner = self.inner.lock().expect("mempool lock");
        inner.map_key_image.get(image).copied()
    }

    /// Records the address deltas of `tx` in the mempool address index.
    ///
    /// Inputs whose previous transaction is unknown to the disk store are
    /// skipped; outputs and resolvable inputs with an unrecognized script
    /// shape are skipped. Nothing is committed on error.
    pub fn add_address_index<S: KeyValueStore>(
        &self,
        tx_store: &TxStore<S>,
        tx: &Transaction,
        time: i64,
    ) -> Result<(), IndexError> {
        let txid = tx.txid();
        let mut staged: Vec<(MempoolAddressDeltaKey, MempoolAddressDelta)> = Vec::new();

        let mut inner = self.inner.lock().expect("mempool lock");
        for (input_index, txin) in tx.vin.iter().enumerate() {
            let prevout = &txin.prevout;
            let Some(prev_tx) = tx_store.read_disk_tx(prevout)? else {
                continue;
            };
            let Some(prev_out) = prev_tx.vout.get(prevout.index as usize) else {
                log_warn!(
                    "address index: tx {} names out-of-range output {}:{}",
                    hash_hex(&txid),
                    hash_hex(&prevout.hash),
                    prevout.index
                );
                return Err(IndexError::PrevoutOutOfRange {
                    txid,
                    outpoint: *prevout,
                });
            };
            let (address_type, address) = extract_address(&prev_out.script_pubkey);
            if address_type == AddressType::None {
                continue;
            }
            let key =
                MempoolAddressDeltaKey::new(address_type, address, txid, input_index as u32, true);
            let delta =
                MempoolAddressDelta::spend(time, -prev_out.value, prevout.hash, prevout.index);
            staged.push((key, delta));
        }
        for (output_index, txout) in tx.vout.iter().enumerate() {
            let (address_type, address) = extract_address(&txout.script_pubkey);
            if address_type == AddressType::None {
                continue;
            }
            let key = MempoolAddressDeltaKey::new(
                address_type,
                address,
                txid,
                output_index as u32,
                false,
            );
            staged.push((key, MempoolAddressDelta::receive(time, txout.value)));
        }

        let inserted: Vec<MempoolAddressDeltaKey> = staged.iter().map(|(key, _)| *key).collect();
        for (key, delta) in staged {
            inner.map_address.insert(key, delta);
        }
        inner.map_address_inserted.insert(txid, inserted);
        Ok(())
    }

    /// All deltas for the given `(address, type)` pairs, in delta-key order
    /// per address.
    pub fn get_address_index(
        &self,
        addresses: &[(Hash160, AddressType)],
    ) -> Vec<(MempoolAddressDeltaKey, MempoolAddressDelta)> {
        let inner = self.inner.lock().expect("mempool lock");
        let mut results = Vec::new();
        for (address, address_type) in addresses {
            let start = MempoolAddressDeltaKey::address_prefix(*address_type, *address);
            for (key, delta) in inner.map_address.range(start..) {
                if key.address_type != *address_type || key.address != *address {
                    break;
                }
                results.push((*key, *delta));
            }
        }
        results
    }

    /// Rolls back every address-index entry inserted on behalf of `txid`.
    pub fn remove_address_index(&self, txid: &Hash256) {
        let mut inner = self.inner.lock().expect("mempool lock");
        let Some(keys) = inner.map_address_inserted.remove(txid) else {
            return;
        };
        for key in keys {
            inner.map_address.remove(&key);
        }
    }

    /// Records which outpoints `tx` spends in the mempool spent index.
    ///
    /// Same skip and failure rules as [`TxMemPool::add_address_index`];
    /// entries carry height -1 until the spend confirms.
    pub fn add_spent_index<S: KeyValueStore>(
        &self,
        tx_store: &TxStore<S>,
        tx: &Transaction,
    ) -> Result<(), IndexError> {
        let txid = tx.txid();
        let mut staged: Vec<(SpentIndexKey, SpentIndexValue)> = Vec::new();

        let mut inner = self.inner.lock().expect("mempool lock");
        for (input_index, txin) in tx.vin.iter().enumerate() {
            let prevout = &txin.prevout;
            let Some(prev_tx) = tx_store.read_disk_tx(prevout)? else {
                continue;
            };
            let Some(prev_out) = prev_tx.vout.get(prevout.index as usize) else {
                log_warn!(
                    "spent index: tx {} names out-of-range output {}:{}",
                    hash_hex(&txid),
                    hash_hex(&prevout.hash),
                    prevout.index
                );
                return Err(IndexError::PrevoutOutOfRange {
                    txid,
                    outpoint: *prevout,
                });
            };
            let (address_type, address_hash) = extract_address(&prev_out.script_pubkey);
            let key = SpentIndexKey::new(prevout.hash, prevout.index);
            let value = SpentIndexValue {
                txid,
                input_index: input_index as u32,
                block_height: MEMPOOL_SPEND_HEIGHT,
                satoshis: prev_out.value,
                address_type,
                address_hash,
            };
            staged.push((key, value));
        }

        let inserted: Vec<SpentIndexKey> = staged.iter().map(|(key, _)| *key).collect();
        for (key, value) in staged {
            inner.map_spent.insert(key, value);
        }
        inner.map_spent_inserted.insert(txid, inserted);
        Ok(())
    }

    pub fn get_spent_index(&self, key: &SpentIndexKey) -> Option<SpentIndexValue> {
        let inner = self.inner.lock().expect("mempool lock");
        inner.map_spent.get(key).copied()
    }

    /// Rolls back every spent-index entry inserted on behalf of `txid`.
    pub fn remove_spent_index(&self, txid: &Hash256) {
        let mut inner = self.inner.lock().expect("mempool lock");
        let Some(keys) = inner.map_spent_inserted.remove(txid) else {
            return;
        };
        for key in keys {
            inner.map_spent.remove(&key);
        }
    }
}

fn hash_hex(hash: &Hash256) -> String {
    let mut out = String::with_capacity(64);
    for byte in hash {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_consensus::ANON_TXN_VERSION;
    use umbra_primitives::transaction::{anon_script_sig, TxIn, TxOut, KEY_IMAGE_SIZE};

    fn dummy_tx(vin: Vec<TxIn>, vout: Vec<TxOut>) -> Transaction {
        Transaction {
            version: 1,
            vin,
            vout,
            lock_time: 0,
        }
    }

    fn spending_input(hash: Hash256, index: u32) -> TxIn {
        TxIn {
            prevout: OutPoint::new(hash, index),
            script_sig: Vec::new(),
            sequence: 0xffff_ffff,
        }
    }

    fn plain_output(value: i64) -> TxOut {
        TxOut {
            value,
            script_pubkey: vec![0x51],
        }
    }

    #[test]
    fn add_then_remove() {
        let pool = TxMemPool::new();
        let tx = dummy_tx(
            vec![spending_input([0x0a; 32], 0)],
            vec![plain_output(50), plain_output(25)],
        );
        let txid = tx.txid();

        pool.add_unchecked(txid, tx.clone());
        assert_eq!(pool.size(), 1);
        assert!(pool.exists(&txid));
        assert_eq!(pool.lookup(&txid), Some(tx.clone()));
        {
            let inner = pool.inner.lock().expect("mempool lock");
            assert_eq!(
                inner.map_next_tx.get(&OutPoint::new([0x0a; 32], 0)),
                Some(&InPoint::new(txid, 0))
            );
        }

        pool.remove(&tx, false);
        assert_eq!(pool.size(), 0);
        assert!(!pool.exists(&txid));
        {
            let inner = pool.inner.lock().expect("mempool lock");
            assert!(inner.map_next_tx.is_empty());
        }
        assert_eq!(pool.transactions_updated(), 2);
    }

    #[test]
    fn remove_absent_tx_is_a_noop() {
        let pool = TxMemPool::new();
        let tx = dummy_tx(vec![spending_input([0x0b; 32], 0)], vec![plain_output(10)]);
        pool.remove(&tx, true);
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.transactions_updated(), 0);
    }

    #[test]
    fn recursive_remove_takes_descendants() {
        let pool = TxMemPool::new();
        let parent = dummy_tx(vec![spending_input([0x0c; 32], 0)], vec![plain_output(40)]);
        let parent_txid = parent.txid();
        let child = dummy_tx(vec![spending_input(parent_txid, 0)], vec![plain_output(39)]);
        let child_txid = child.txid();
        let grandchild = dummy_tx(vec![spending_input(child_txid, 0)], vec![plain_output(38)]);
        let grandchild_txid = grandchild.txid();

        pool.add_unchecked(parent_txid, parent.clone());
        pool.add_unchecked(child_txid, child);
        pool.add_unchecked(grandchild_txid, grandchild);
        assert_eq!(pool.size(), 3);

        pool.remove(&parent, true);
        assert_eq!(pool.size(), 0);
        let inner = pool.inner.lock().expect("mempool lock");
        assert!(inner.map_next_tx.is_empty());
    }

    #[test]
    fn plain_remove_leaves_descendants_behind() {
        let pool = TxMemPool::new();
        let parent = dummy_tx(vec![spending_input([0x0d; 32], 0)], vec![plain_output(40)]);
        let parent_txid = parent.txid();
        let child = dummy_tx(vec![spending_input(parent_txid, 0)], vec![plain_output(39)]);
        let child_txid = child.txid();

        pool.add_unchecked(parent_txid, parent.clone());
        pool.add_unchecked(child_txid, child);

        pool.remove(&parent, false);
        assert!(!pool.exists(&parent_txid));
        assert!(pool.exists(&child_txid));
        // The child's spend of the removed parent stays in the map; no
        // invariant requires cleanup of the dangling edge.
        let inner = pool.inner.lock().expect("mempool lock");
        assert!(inner.map_next_tx.contains_key(&OutPoint::new(parent_txid, 0)));
    }

    #[test]
    fn remove_conflicts_evicts_the_double_spender() {
        let pool = TxMemPool::new();
        let contested = OutPoint::new([0x0e; 32], 0);
        let pooled = dummy_tx(
            vec![spending_input(contested.hash, contested.index)],
            vec![plain_output(10)],
        );
        let pooled_txid = pooled.txid();
        let child = dummy_tx(vec![spending_input(pooled_txid, 0)], vec![plain_output(9)]);
        let child_txid = child.txid();

        pool.add_unchecked(pooled_txid, pooled);
        pool.add_unchecked(child_txid, child);

        // A confirming transaction spending the same outpoint.
        let confirming = dummy_tx(
            vec![spending_input(contested.hash, contested.index)],
            vec![plain_output(10), plain_output(1)],
        );
        pool.remove_conflicts(&confirming);

        assert!(!pool.exists(&pooled_txid));
        assert!(!pool.exists(&child_txid));
        assert_eq!(pool.size(), 0);
        // remove_conflicts never adds the confirming transaction.
        assert!(!pool.exists(&confirming.txid()));
    }

    #[test]
    fn remove_conflicts_spares_the_tx_itself() {
        let pool = TxMemPool::new();
        let tx = dummy_tx(vec![spending_input([0x0f; 32], 3)], vec![plain_output(7)]);
        let txid = tx.txid();
        pool.add_unchecked(txid, tx.clone());

        pool.remove_conflicts(&tx);
        assert!(pool.exists(&txid));
    }

    #[test]
    fn spender_uniqueness_under_overwrite() {
        let pool = TxMemPool::new();
        let contested = OutPoint::new([0x1a; 32], 1);
        let first = dummy_tx(
            vec![spending_input(contested.hash, contested.index)],
            vec![plain_output(5)],
        );
        let second = dummy_tx(
            vec![spending_input(contested.hash, contested.index)],
            vec![plain_output(6)],
        );
        pool.add_unchecked(first.txid(), first);
        pool.add_unchecked(second.txid(), second.clone());

        let inner = pool.inner.lock().expect("mempool lock");
        assert_eq!(
            inner.map_next_tx.get(&contested),
            Some(&InPoint::new(second.txid(), 0))
        );
    }

    #[test]
    fn anon_remove_erases_key_images() {
        let pool = TxMemPool::new();
        let image = [0x42u8; KEY_IMAGE_SIZE];
        let mut tx = dummy_tx(
            vec![TxIn {
                prevout: OutPoint::new([0x21; 32], u32::MAX),
                script_sig: anon_script_sig(&image),
                sequence: 0,
            }],
            vec![plain_output(100)],
        );
        tx.version = ANON_TXN_VERSION;
        let txid = tx.txid();

        pool.add_unchecked(txid, tx.clone());
        pool.insert_key_image(
            image.to_vec(),
            KeyImageSpent {
                txid,
                input_index: 0,
                value: 100,
            },
        );
        let spent = pool.lookup_key_image(&image).expect("key image present");
        assert_eq!(spent.txid, txid);

        pool.remove(&tx, false);
        assert!(pool.lookup_key_image(&image).is_none());
    }

    #[test]
    fn non_anon_version_keeps_foreign_key_images() {
        let pool = TxMemPool::new();
        let image = [0x43u8; KEY_IMAGE_SIZE];
        // Same scriptSig shape, but a plain version: images must survive.
        let tx = dummy_tx(
            vec![TxIn {
                prevout: OutPoint::new([0x22; 32], u32::MAX),
                script_sig: anon_script_sig(&image),
                sequence: 0,
            }],
            vec![plain_output(1)],
        );
        let txid = tx.txid();
        pool.add_unchecked(txid, tx.clone());
        pool.insert_key_image(
            image.to_vec(),
            KeyImageSpent {
                txid,
                input_index: 0,
                value: 1,
            },
        );

        pool.remove(&tx, false);
        assert!(pool.lookup_key_image(&image).is_some());
    }

    #[test]
    fn query_hashes_returns_all_ids() {
        let pool = TxMemPool::new();
        let a = dummy_tx(vec![spending_input([0x31; 32], 0)], vec![plain_output(1)]);
        let b = dummy_tx(vec![spending_input([0x32; 32], 0)], vec![plain_output(2)]);
        pool.add_unchecked(a.txid(), a.clone());
        pool.add_unchecked(b.txid(), b.clone());

        let mut expected = vec![a.txid(), b.txid()];
        expected.sort();
        assert_eq!(pool.query_hashes(), expected);
    }

    #[test]
    fn counter_is_monotonic() {
        let pool = TxMemPool::new();
        let mut last = pool.transactions_updated();
        let tx = dummy_tx(vec![spending_input([0x33; 32], 0)], vec![plain_output(1)]);
        pool.add_unchecked(tx.txid(), tx.clone());
        assert!(pool.transactions_updated() > last);
        last = pool.transactions_updated();

        pool.add_transactions_updated(3);
        assert_eq!(pool.transactions_updated(), last + 3);
        last = pool.transactions_updated();

        pool.remove(&tx, true);
        assert!(pool.transactions_updated() > last);
        last = pool.transactions_updated();

        pool.clear();
        assert!(pool.transactions_updated() > last);
    }

    #[test]
    fn clear_drops_everything() {
        let pool = TxMemPool::new();
        let tx = dummy_tx(vec![spending_input([0x34; 32], 0)], vec![plain_output(1)]);
        pool.add_unchecked(tx.txid(), tx);
        pool.insert_key_image(vec![0x01; KEY_IMAGE_SIZE], KeyImageSpent {
            txid: [0u8; 32],
            input_index: 0,
            value: 0,
        });
        pool.clear();

        assert_eq!(pool.size(), 0);
        let inner = pool.inner.lock().expect("mempool lock");
        assert!(inner.map_next_tx.is_empty());
        assert!(inner.map_key_image.is_empty());
        assert!(inner.map_address.is_empty());
        assert!(inner.map_spent.is_empty());
    }
}
