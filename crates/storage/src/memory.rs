use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use crate::{
    Column, KeyValueStore, PrefixVisitor, RangeVisitor, ScanResult, StoreError, WriteBatch, WriteOp,
};

type ColumnMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory reference implementation of the store contract.
///
/// One ordered map per column, so prefix and range scans never cross
/// column boundaries.
pub struct MemoryStore {
    columns: RwLock<[ColumnMap; Column::COUNT]>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            columns: RwLock::new(std::array::from_fn(|_| ColumnMap::new())),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.columns.read().expect("memory store lock");
        Ok(guard[column.index()].get(key).cloned())
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut guard = self.columns.write().expect("memory store lock");
        guard[column.index()].insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        let mut guard = self.columns.write().expect("memory store lock");
        guard[column.index()].remove(key);
        Ok(())
    }

    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<ScanResult, StoreError> {
        let guard = self.columns.read().expect("memory store lock");
        let mut results = Vec::new();
        for (key, value) in range_from(&guard[column.index()], prefix) {
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.clone(), value.clone()));
        }
        Ok(results)
    }

    fn for_each_prefix<'a>(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'a>,
    ) -> Result<(), StoreError> {
        let guard = self.columns.read().expect("memory store lock");
        for (key, value) in range_from(&guard[column.index()], prefix) {
            if !key.starts_with(prefix) {
                break;
            }
            visitor(key.as_slice(), value.as_slice())?;
        }
        Ok(())
    }

    fn for_each_from<'a>(
        &self,
        column: Column,
        start: &[u8],
        visitor: &mut RangeVisitor<'a>,
    ) -> Result<(), StoreError> {
        let guard = self.columns.read().expect("memory store lock");
        for (key, value) in range_from(&guard[column.index()], start) {
            if !visitor(key.as_slice(), value.as_slice())? {
                break;
            }
        }
        Ok(())
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut guard = self.columns.write().expect("memory store lock");
        for op in batch.iter() {
            match op {
                WriteOp::Put { column, key, value } => {
                    guard[column.index()]
                        .insert(key.as_slice().to_vec(), value.as_slice().to_vec());
                }
                WriteOp::Delete { column, key } => {
                    guard[column.index()].remove(key.as_slice());
                }
            }
        }
        Ok(())
    }
}

fn range_from<'a>(
    map: &'a ColumnMap,
    start: &[u8],
) -> impl Iterator<Item = (&'a Vec<u8>, &'a Vec<u8>)> {
    map.range::<[u8], _>((Bound::Included(start), Bound::Unbounded))
}
