//! Persistent index key schemas and the disk transaction store.

pub mod addressindex;
pub mod spentindex;
pub mod txstore;

pub use addressindex::{
    AddressIndexDb, AddressIndexIteratorHeightKey, AddressIndexIteratorKey, AddressIndexKey,
    AddressUnspentKey, AddressUnspentValue, MempoolAddressDelta, MempoolAddressDeltaKey,
};
pub use spentindex::{SpentIndexKey, SpentIndexValue};
pub use txstore::TxStore;
