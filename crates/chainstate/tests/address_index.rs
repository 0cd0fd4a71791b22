use std::sync::Arc;

use umbra_chainstate::addressindex::{
    ADDRESS_HEIGHT_PREFIX_LEN, ADDRESS_INDEX_KEY_LEN, ADDRESS_PREFIX_LEN, ADDRESS_UNSPENT_KEY_LEN,
};
use umbra_chainstate::{
    AddressIndexDb, AddressIndexIteratorHeightKey, AddressIndexIteratorKey, AddressIndexKey,
    AddressUnspentKey, AddressUnspentValue,
};
use umbra_script::AddressType;
use umbra_storage::memory::MemoryStore;
use umbra_storage::{KeyValueStore, WriteBatch};

fn history_key(height: i32, tx_index: u32, txid_byte: u8) -> AddressIndexKey {
    AddressIndexKey {
        address_type: AddressType::PubKeyHash,
        address: [0x11; 20],
        block_height: height,
        tx_index,
        txid: [txid_byte; 32],
        index: 0,
        spending: false,
    }
}

#[test]
fn serialized_key_sizes_are_contractual() {
    assert_eq!(ADDRESS_PREFIX_LEN, 21);
    assert_eq!(ADDRESS_HEIGHT_PREFIX_LEN, 25);
    assert_eq!(ADDRESS_UNSPENT_KEY_LEN, 57);
    assert_eq!(ADDRESS_INDEX_KEY_LEN, 66);

    let iterator = AddressIndexIteratorKey::new(AddressType::ScriptHash, [0x22; 20]);
    assert_eq!(iterator.encode().len(), 21);
    let height_iterator =
        AddressIndexIteratorHeightKey::new(AddressType::ScriptHash, [0x22; 20], 7);
    assert_eq!(height_iterator.encode().len(), 25);
    let unspent = AddressUnspentKey {
        address_type: AddressType::PubKeyHash,
        address: [0x33; 20],
        txid: [0x44; 32],
        index: 5,
    };
    assert_eq!(unspent.encode().len(), 57);
    assert_eq!(history_key(10, 2, 0x55).encode().len(), 66);
}

#[test]
fn keys_roundtrip_and_refuse_short_input() {
    let unspent = AddressUnspentKey {
        address_type: AddressType::ScriptHash,
        address: [0x66; 20],
        txid: [0x77; 32],
        index: 0x0102_0304,
    };
    let encoded = unspent.encode();
    assert_eq!(AddressUnspentKey::decode(&encoded), Some(unspent));
    assert_eq!(AddressUnspentKey::decode(&encoded[..56]), None);

    let history = history_key(1000, 3, 0x88);
    let encoded = history.encode();
    assert_eq!(AddressIndexKey::decode(&encoded), Some(history));
    assert_eq!(AddressIndexKey::decode(&encoded[..65]), None);

    let iterator = AddressIndexIteratorKey::new(AddressType::PubKeyHash, [0x99; 20]);
    let encoded = iterator.encode();
    assert_eq!(AddressIndexIteratorKey::decode(&encoded), Some(iterator));
    assert_eq!(AddressIndexIteratorKey::decode(&encoded[..20]), None);

    let height_iterator =
        AddressIndexIteratorHeightKey::new(AddressType::PubKeyHash, [0x99; 20], 255);
    let encoded = height_iterator.encode();
    assert_eq!(
        AddressIndexIteratorHeightKey::decode(&encoded),
        Some(height_iterator)
    );
    assert_eq!(AddressIndexIteratorHeightKey::decode(&encoded[..24]), None);
}

#[test]
fn unspent_value_null_roundtrip() {
    let value = AddressUnspentValue {
        satoshis: 90_000,
        script_pubkey: vec![0xa9, 0x14],
        block_height: 120,
    };
    assert!(!value.is_null());
    let decoded = AddressUnspentValue::decode(&value.encode()).expect("decode");
    assert_eq!(decoded, value);

    let null = AddressUnspentValue::null();
    assert!(null.is_null());
    let decoded = AddressUnspentValue::decode(&null.encode()).expect("decode null");
    assert!(decoded.is_null());
}

#[test]
fn history_key_byte_order_matches_tuple_order() {
    // Heights 255 and 256 with the same prefix: 00 00 00 FF < 00 00 01 00.
    let low = history_key(255, 0, 0x01);
    let high = history_key(256, 0, 0x01);
    let low_bytes = low.encode();
    let high_bytes = high.encode();
    assert_eq!(&low_bytes[21..25], &[0x00, 0x00, 0x00, 0xff]);
    assert_eq!(&high_bytes[21..25], &[0x00, 0x00, 0x01, 0x00]);
    assert!(low_bytes < high_bytes);

    // Same height: the per-block transaction index breaks the tie.
    let early = history_key(256, 1, 0xff);
    let late = history_key(256, 2, 0x00);
    assert!(early.encode() < late.encode());

    // Different type sorts before address, address before height.
    let p2pkh = history_key(0, 0, 0x00);
    let mut p2sh = p2pkh;
    p2sh.address_type = AddressType::ScriptHash;
    assert!(p2pkh.encode() < p2sh.encode());
}

#[test]
fn unspent_scan_skips_tombstones() {
    let store = Arc::new(MemoryStore::new());
    let db = AddressIndexDb::new(Arc::clone(&store));
    let address = [0x11u8; 20];

    let live = AddressUnspentKey {
        address_type: AddressType::PubKeyHash,
        address,
        txid: [0x01; 32],
        index: 0,
    };
    let spent = AddressUnspentKey {
        address_type: AddressType::PubKeyHash,
        address,
        txid: [0x02; 32],
        index: 1,
    };
    let other_address = AddressUnspentKey {
        address_type: AddressType::PubKeyHash,
        address: [0x12; 20],
        txid: [0x03; 32],
        index: 0,
    };

    let mut batch = WriteBatch::new();
    db.put_unspent(
        &mut batch,
        &live,
        &AddressUnspentValue {
            satoshis: 5_000,
            script_pubkey: vec![0x76],
            block_height: 10,
        },
    );
    db.put_unspent(&mut batch, &spent, &AddressUnspentValue::null());
    db.put_unspent(
        &mut batch,
        &other_address,
        &AddressUnspentValue {
            satoshis: 7_000,
            script_pubkey: vec![0x76],
            block_height: 11,
        },
    );
    store.write_batch(&batch).expect("commit");

    let rows = db
        .unspent_for_address(AddressType::PubKeyHash, &address)
        .expect("scan");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, live);
    assert_eq!(rows[0].1.satoshis, 5_000);
}

#[test]
fn history_scan_is_height_ascending() {
    let store = Arc::new(MemoryStore::new());
    let db = AddressIndexDb::new(Arc::clone(&store));

    let mut batch = WriteBatch::new();
    // Inserted out of order on purpose.
    db.put_history(&mut batch, &history_key(300, 0, 0x03), 30);
    db.put_history(&mut batch, &history_key(100, 1, 0x01), 10);
    db.put_history(&mut batch, &history_key(100, 0, 0x02), 20);
    db.put_history(&mut batch, &history_key(200, 0, 0x04), -15);
    store.write_batch(&batch).expect("commit");

    let rows = db
        .history_for_address(AddressType::PubKeyHash, &[0x11; 20])
        .expect("scan");
    let heights: Vec<(i32, u32)> = rows
        .iter()
        .map(|(key, _)| (key.block_height, key.tx_index))
        .collect();
    assert_eq!(heights, vec![(100, 0), (100, 1), (200, 0), (300, 0)]);
    assert_eq!(rows[0].1, 20);
}

#[test]
fn history_scan_from_height_seeks_past_earlier_entries() {
    let store = Arc::new(MemoryStore::new());
    let db = AddressIndexDb::new(Arc::clone(&store));

    let mut batch = WriteBatch::new();
    for height in [100, 200, 300] {
        db.put_history(&mut batch, &history_key(height, 0, height as u8), 1);
    }
    // A row for another address above the seek height must not appear.
    let mut foreign = history_key(250, 0, 0xaa);
    foreign.address = [0x12; 20];
    db.put_history(&mut batch, &foreign, 1);
    store.write_batch(&batch).expect("commit");

    let rows = db
        .history_from_height(AddressType::PubKeyHash, &[0x11; 20], 200)
        .expect("scan");
    let heights: Vec<i32> = rows.iter().map(|(key, _)| key.block_height).collect();
    assert_eq!(heights, vec![200, 300]);
}
