use std::collections::BTreeSet;

use folio::common::{PageId, RecordId, SlotId};
use folio::index::{BTreeIndex, BTreeIterator};
use folio::tuple::{AttrType, Value};
use folio::FolioError;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tempfile::{tempdir, TempDir};

fn create_index(key_type: AttrType) -> (BTreeIndex, TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index");
    BTreeIndex::create(&path, key_type).unwrap();
    (BTreeIndex::open(&path).unwrap(), dir)
}

fn rid(page: u32, slot: u16) -> RecordId {
    RecordId::new(PageId::new(page), SlotId::new(slot))
}

fn int_key(key: i32) -> [u8; 4] {
    key.to_le_bytes()
}

fn varchar_key(s: &str) -> Vec<u8> {
    Value::VarChar(s.to_string()).serialize(AttrType::VarChar).unwrap()
}

fn collect_int(iter: BTreeIterator) -> Vec<(i32, RecordId)> {
    iter.map(|item| {
        let (key, rid) = item.unwrap();
        (i32::from_le_bytes([key[0], key[1], key[2], key[3]]), rid)
    })
    .collect()
}

fn reference_range(
    reference: &BTreeSet<(i32, RecordId)>,
    low: Option<i32>,
    high: Option<i32>,
    low_inclusive: bool,
    high_inclusive: bool,
) -> Vec<(i32, RecordId)> {
    reference
        .iter()
        .filter(|(k, _)| match low {
            None => true,
            Some(low) => *k > low || (low_inclusive && *k == low),
        })
        .filter(|(k, _)| match high {
            None => true,
            Some(high) => *k < high || (high_inclusive && *k == high),
        })
        .copied()
        .collect()
}

fn int_scan(
    index: &BTreeIndex,
    low: Option<i32>,
    high: Option<i32>,
    low_inclusive: bool,
    high_inclusive: bool,
) -> Vec<(i32, RecordId)> {
    let low = low.map(int_key);
    let high = high.map(int_key);
    collect_int(
        index
            .scan(
                low.as_ref().map(|k| &k[..]),
                high.as_ref().map(|k| &k[..]),
                low_inclusive,
                high_inclusive,
            )
            .unwrap(),
    )
}

#[test]
fn test_btree_duplicate_keys_in_rid_order() {
    let (mut index, _dir) = create_index(AttrType::Int);

    index.insert(&int_key(5), rid(2, 0)).unwrap();
    index.insert(&int_key(3), rid(1, 0)).unwrap();
    index.insert(&int_key(5), rid(1, 7)).unwrap();
    index.insert(&int_key(1), rid(0, 0)).unwrap();

    assert_eq!(
        int_scan(&index, Some(3), Some(5), true, true),
        vec![(3, rid(1, 0)), (5, rid(1, 7)), (5, rid(2, 0))]
    );
}

#[test]
fn test_btree_matches_reference_under_random_inserts() {
    let (mut index, _dir) = create_index(AttrType::Int);
    let mut rng = StdRng::seed_from_u64(42);
    let mut reference = BTreeSet::new();

    for i in 0..5000u32 {
        let key = rng.gen_range(-300..300);
        let entry_rid = rid(rng.gen_range(0..50), (i % 1000) as u16);
        if reference.insert((key, entry_rid)) {
            index.insert(&int_key(key), entry_rid).unwrap();
        }
    }

    let all = int_scan(&index, None, None, true, true);
    assert_eq!(all, reference.iter().copied().collect::<Vec<_>>());

    for _ in 0..200 {
        let low = rng.gen_bool(0.8).then(|| rng.gen_range(-350..350));
        let high = rng.gen_bool(0.8).then(|| rng.gen_range(-350..350));
        let (low_inclusive, high_inclusive) = (rng.gen_bool(0.5), rng.gen_bool(0.5));

        assert_eq!(
            int_scan(&index, low, high, low_inclusive, high_inclusive),
            reference_range(&reference, low, high, low_inclusive, high_inclusive),
            "range {:?}..{:?} ({}, {})",
            low,
            high,
            low_inclusive,
            high_inclusive
        );
    }
}

#[test]
fn test_btree_delete_matches_reference() {
    let (mut index, _dir) = create_index(AttrType::Int);
    let mut rng = StdRng::seed_from_u64(9);

    let mut entries: Vec<(i32, RecordId)> = (0..3000)
        .map(|i| (rng.gen_range(0..100), rid(i, 0)))
        .collect();
    for (key, entry_rid) in &entries {
        index.insert(&int_key(*key), *entry_rid).unwrap();
    }

    entries.shuffle(&mut rng);
    let (deleted, kept) = entries.split_at(2000);
    for (key, entry_rid) in deleted {
        index.delete(&int_key(*key), *entry_rid).unwrap();
    }
    for (key, entry_rid) in &deleted[..10] {
        assert!(matches!(
            index.delete(&int_key(*key), *entry_rid),
            Err(FolioError::IndexEntryNotFound(_))
        ));
    }

    let reference: BTreeSet<(i32, RecordId)> = kept.iter().copied().collect();
    assert_eq!(
        int_scan(&index, None, None, true, true),
        reference.iter().copied().collect::<Vec<_>>()
    );
    assert_eq!(
        int_scan(&index, Some(20), Some(60), false, true),
        reference_range(&reference, Some(20), Some(60), false, true)
    );
}

#[test]
fn test_btree_scan_skips_emptied_leaves() {
    let (mut index, _dir) = create_index(AttrType::Int);

    for i in 0..2000 {
        index.insert(&int_key(i), rid(i as u32, 0)).unwrap();
    }
    // Empty out a band that spans several leaves.
    for i in 100..1900 {
        index.delete(&int_key(i), rid(i as u32, 0)).unwrap();
    }

    let remaining: Vec<i32> = int_scan(&index, None, None, true, true)
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    let expected: Vec<i32> = (0..100).chain(1900..2000).collect();
    assert_eq!(remaining, expected);

    assert_eq!(
        int_scan(&index, Some(500), Some(1902), true, false),
        vec![(1900, rid(1900, 0)), (1901, rid(1901, 0))]
    );

    // Emptied leaves still accept inserts.
    index.insert(&int_key(1000), rid(1, 1)).unwrap();
    assert_eq!(
        int_scan(&index, Some(1000), Some(1000), true, true),
        vec![(1000, rid(1, 1))]
    );
}

#[test]
fn test_btree_varchar_keys_multi_level() {
    let (mut index, _dir) = create_index(AttrType::VarChar);
    let mut rng = StdRng::seed_from_u64(3);
    let mut reference = BTreeSet::new();

    for i in 0..3000u32 {
        let len = rng.gen_range(1..120);
        let key: String = (0..len)
            .map(|_| rng.gen_range(b'a'..=b'z') as char)
            .collect();
        let entry_rid = rid(i / 100, (i % 100) as u16);
        index.insert(&varchar_key(&key), entry_rid).unwrap();
        reference.insert((key, entry_rid));
    }

    let scanned: Vec<(String, RecordId)> = index
        .scan(None, None, true, true)
        .unwrap()
        .map(|item| {
            let (key, rid) = item.unwrap();
            let (value, _) = Value::deserialize(&key, AttrType::VarChar).unwrap();
            (value.to_string(), rid)
        })
        .collect();
    assert_eq!(scanned, reference.iter().cloned().collect::<Vec<_>>());

    let low = varchar_key("m");
    let count = index
        .scan(Some(&low[..]), None, true, true)
        .unwrap()
        .count();
    assert_eq!(count, reference.iter().filter(|(k, _)| k.as_str() >= "m").count());
}

#[test]
fn test_btree_large_keys_split_safely() {
    let (mut index, _dir) = create_index(AttrType::VarChar);

    // Near-maximum keys leave only a handful of entries per node.
    let keys: Vec<String> = (0..300).map(|i| format!("{:04}{}", i, "k".repeat(500))).collect();
    for (i, key) in keys.iter().enumerate().rev() {
        index.insert(&varchar_key(key), rid(i as u32, 0)).unwrap();
    }

    let scanned: Vec<RecordId> = index
        .scan(None, None, true, true)
        .unwrap()
        .map(|item| item.unwrap().1)
        .collect();
    assert_eq!(scanned, (0..300).map(|i| rid(i, 0)).collect::<Vec<_>>());
}

#[test]
fn test_btree_float_keys_total_order() {
    let (mut index, _dir) = create_index(AttrType::Float);
    let values = [3.5f32, -0.0, 0.0, -12.25, f32::INFINITY, 1e-3, -1e9];

    for (i, v) in values.iter().enumerate() {
        let key = index.encode_key(&Value::Float(*v)).unwrap();
        index.insert(&key, rid(i as u32, 0)).unwrap();
    }

    let mut expected = values.to_vec();
    expected.sort_by(|a, b| a.total_cmp(b));

    let scanned: Vec<f32> = index
        .scan(None, None, true, true)
        .unwrap()
        .map(|item| {
            let (key, _) = item.unwrap();
            f32::from_le_bytes([key[0], key[1], key[2], key[3]])
        })
        .collect();
    assert_eq!(
        scanned.iter().map(|f| f.to_bits()).collect::<Vec<_>>(),
        expected.iter().map(|f| f.to_bits()).collect::<Vec<_>>()
    );

    let zero = 0.0f32.to_le_bytes();
    let non_negative = index.scan(Some(&zero[..]), None, true, true).unwrap().count();
    assert_eq!(non_negative, 4);
}

#[test]
fn test_btree_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index");
    BTreeIndex::create(&path, AttrType::Int).unwrap();

    {
        let mut index = BTreeIndex::open(&path).unwrap();
        for i in (0..1500).rev() {
            index.insert(&int_key(i), rid(0, (i % 7) as u16)).unwrap();
        }
        index.close().unwrap();
    }

    let index = BTreeIndex::open(&path).unwrap();
    assert!(index.root_page_id().is_some());
    let keys: Vec<i32> = int_scan(&index, None, None, true, true)
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(keys, (0..1500).collect::<Vec<_>>());

    drop(index);
    BTreeIndex::destroy(&path).unwrap();
    assert!(matches!(
        BTreeIndex::create(&path, AttrType::Int).and_then(|_| BTreeIndex::create(&path, AttrType::Int)),
        Err(FolioError::FileAlreadyExists(_))
    ));
}

#[test]
fn test_btree_print_tree() {
    let (mut index, _dir) = create_index(AttrType::Int);
    for i in 0..1000 {
        index.insert(&int_key(i), rid(0, (i % 2) as u16)).unwrap();
    }
    index.insert(&int_key(7), rid(9, 9)).unwrap();

    let mut out = Vec::new();
    index.print_tree(&mut out).unwrap();
    let dump = String::from_utf8(out).unwrap();

    assert!(dump.starts_with("{\"keys\": ["));
    assert!(dump.contains("\"children\": ["));
    // Every distinct key appears once in some leaf, with all of its RIDs.
    assert_eq!(dump.matches(":[").count(), 1000);
    assert!(dump.contains("\"7:[(0,1),(9,9)]\""));
}

#[test]
fn test_btree_rejects_bad_bounds() {
    let (index, _dir) = create_index(AttrType::Int);
    assert!(matches!(
        index.scan(Some(&[1u8, 2, 3][..]), None, true, true),
        Err(FolioError::InvalidKey(_))
    ));
}
