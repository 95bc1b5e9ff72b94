// Path: crates/tree/src/adapter/tests.rs

use std::sync::Arc;

use super::StateTreeAdapter;
use crate::node::codec::encode_node;
use crate::reader::{MemoryReader, TreeReader};
use arbor_crypto::blake3_512;
use arbor_types::{Hash, TreeError, HASH_LEN, ZERO_HASH};

fn vh(byte: u8) -> Hash {
    [byte; HASH_LEN]
}

fn adapter_over(store: &Arc<MemoryReader>) -> StateTreeAdapter {
    StateTreeAdapter::with_cache_capacity(Arc::clone(store) as Arc<dyn TreeReader>, 256)
}

#[test]
fn put_accumulates_until_flush() {
    let store = Arc::new(MemoryReader::new());
    let adapter = adapter_over(&store);

    adapter.put(b"account/alice", vh(0xA1), 1);
    adapter.put(b"account/bob", vh(0xB2), 1);
    assert_eq!(adapter.pending_len(), 2);

    let batch = adapter.calculate_root(&[], ZERO_HASH, 1, None).unwrap();
    store.apply_batch(&batch);
    assert_eq!(adapter.pending_len(), 0);

    assert_eq!(adapter.get(b"account/alice", 1).unwrap(), Some(vh(0xA1)));
    assert_eq!(adapter.get(b"account/bob", 1).unwrap(), Some(vh(0xB2)));
    assert_eq!(adapter.get(b"account/carol", 1).unwrap(), None);
    assert_eq!(adapter.get_root_hash(1).unwrap(), batch.new_root_hash);
}

#[test]
fn repeated_put_overwrites_the_pending_entry() {
    let store = Arc::new(MemoryReader::new());
    let adapter = adapter_over(&store);

    adapter.put(b"account/alice", vh(0x01), 1);
    adapter.put(b"account/alice", vh(0x02), 1);
    assert_eq!(adapter.pending_len(), 1);

    let batch = adapter.calculate_root(&[], ZERO_HASH, 1, None).unwrap();
    store.apply_batch(&batch);
    assert_eq!(adapter.get(b"account/alice", 1).unwrap(), Some(vh(0x02)));
}

#[test]
fn pending_wins_over_explicit_updates_on_collision() {
    let store = Arc::new(MemoryReader::new());
    let adapter = adapter_over(&store);

    adapter.put(b"account/alice", vh(0x22), 1);
    let explicit = vec![(b"account/alice".to_vec(), vh(0x11))];
    let batch = adapter.calculate_root(&explicit, ZERO_HASH, 1, None).unwrap();
    store.apply_batch(&batch);

    assert_eq!(adapter.get(b"account/alice", 1).unwrap(), Some(vh(0x22)));
}

#[test]
fn empty_flush_registers_the_base_root() {
    let store = Arc::new(MemoryReader::new());
    let adapter = adapter_over(&store);

    adapter.put(b"k", vh(0x01), 1);
    let v1 = adapter.calculate_root(&[], ZERO_HASH, 1, None).unwrap();
    store.apply_batch(&v1);

    let v2 = adapter
        .calculate_root(&[], v1.new_root_hash, 2, Some(1))
        .unwrap();
    assert_eq!(v2.new_root_hash, v1.new_root_hash);
    assert!(v2.new_nodes.is_empty());
    assert_eq!(adapter.get_root_hash(2).unwrap(), v1.new_root_hash);
}

#[test]
fn update_batch_bypasses_the_pending_buffer() {
    let store = Arc::new(MemoryReader::new());
    let adapter = adapter_over(&store);

    adapter.put(b"buffered", vh(0x77), 1);
    let updates = vec![(b"direct".to_vec(), vh(0x42))];
    let batch = adapter.update_batch(&updates, 1, None, None).unwrap();
    store.apply_batch(&batch);

    // The buffered entry is untouched and the direct one is committed.
    assert_eq!(adapter.pending_len(), 1);
    assert_eq!(adapter.get(b"direct", 1).unwrap(), Some(vh(0x42)));
    assert_eq!(adapter.get(b"buffered", 1).unwrap(), None);
}

#[test]
fn get_routes_through_the_key_hash() {
    let store = Arc::new(MemoryReader::new());
    let adapter = adapter_over(&store);

    let updates = vec![(b"some raw key".to_vec(), vh(0x55))];
    let batch = adapter.update_batch(&updates, 1, None, None).unwrap();
    store.apply_batch(&batch);

    // The engine sees only the hashed key.
    let expected_leaf_key = blake3_512(b"some raw key");
    let (_, node) = &batch.new_nodes[0];
    match node {
        crate::node::Node::Leaf(leaf) => assert_eq!(leaf.account_key, expected_leaf_key),
        other => panic!("expected a leaf, got {other:?}"),
    }
    assert_eq!(adapter.get(b"some raw key", 1).unwrap(), Some(vh(0x55)));
}

#[test]
fn speculative_root_matches_a_real_commit() {
    let store = Arc::new(MemoryReader::new());
    let adapter = adapter_over(&store);

    let v1 = adapter
        .update_batch(&[(b"alice".to_vec(), vh(0x01))], 1, None, None)
        .unwrap();
    store.apply_batch(&v1);

    let updates = vec![(b"bob".to_vec(), vh(0x02))];
    let speculative = adapter
        .calculate_root_speculative(&updates, v1.new_root_hash, 2, Some(1), None)
        .unwrap();
    let committed = adapter
        .calculate_root(&updates, v1.new_root_hash, 2, Some(1))
        .unwrap();

    assert_eq!(speculative.new_root_hash, committed.new_root_hash);
}

#[test]
fn speculation_leaves_the_shared_state_alone() {
    let store = Arc::new(MemoryReader::new());
    let adapter = adapter_over(&store);

    let v1 = adapter
        .update_batch(&[(b"alice".to_vec(), vh(0x01))], 1, None, None)
        .unwrap();
    store.apply_batch(&v1);
    // Warm the shared cache with committed state.
    assert_eq!(adapter.get(b"alice", 1).unwrap(), Some(vh(0x01)));
    let cache_before = adapter.cache_len();

    adapter.put(b"buffered", vh(0x99), 2);
    let pending_before = adapter.pending_len();

    let _ = adapter
        .calculate_root_speculative(
            &[(b"bob".to_vec(), vh(0x02))],
            v1.new_root_hash,
            2,
            Some(1),
            None,
        )
        .unwrap();

    // No speculative node escaped into the shared cache or the buffer, and
    // the engine's version index knows nothing of version 2.
    assert_eq!(adapter.cache_len(), cache_before);
    assert_eq!(adapter.pending_len(), pending_before);
    assert!(matches!(
        adapter.get_root_hash(2),
        Err(TreeError::UnknownVersion(2))
    ));
}

#[test]
fn speculation_chains_through_injected_parent_nodes() {
    let store = Arc::new(MemoryReader::new());
    let adapter = adapter_over(&store);

    let v1 = adapter
        .update_batch(&[(b"alice".to_vec(), vh(0x01))], 1, None, None)
        .unwrap();
    store.apply_batch(&v1);

    // Speculate v2 without persisting it...
    let spec_v2 = adapter
        .calculate_root_speculative(
            &[(b"bob".to_vec(), vh(0x02))],
            v1.new_root_hash,
            2,
            Some(1),
            None,
        )
        .unwrap();

    // ...then speculate v3 on top of the unpersisted v2 by injecting its
    // nodes as parent speculative state.
    let parents: Vec<(Vec<u8>, Vec<u8>)> = spec_v2
        .new_nodes
        .iter()
        .map(|(key, node)| (key.serialize(), encode_node(node)))
        .collect();
    let spec_v3 = adapter
        .calculate_root_speculative(
            &[(b"carol".to_vec(), vh(0x03))],
            spec_v2.new_root_hash,
            3,
            Some(2),
            Some(&parents),
        )
        .unwrap();

    // The chained speculation must match actually committing both batches.
    let committed_v2 = adapter
        .calculate_root(&[(b"bob".to_vec(), vh(0x02))], v1.new_root_hash, 2, Some(1))
        .unwrap();
    store.apply_batch(&committed_v2);
    let committed_v3 = adapter
        .calculate_root(
            &[(b"carol".to_vec(), vh(0x03))],
            committed_v2.new_root_hash,
            3,
            Some(2),
        )
        .unwrap();

    assert_eq!(spec_v2.new_root_hash, committed_v2.new_root_hash);
    assert_eq!(spec_v3.new_root_hash, committed_v3.new_root_hash);
}

#[test]
fn undecodable_injected_nodes_are_skipped() {
    let store = Arc::new(MemoryReader::new());
    let adapter = adapter_over(&store);

    let v1 = adapter
        .update_batch(&[(b"alice".to_vec(), vh(0x01))], 1, None, None)
        .unwrap();
    store.apply_batch(&v1);

    let garbage = vec![(vec![0x01, 0x02], vec![0xFF, 0xFF])];
    let batch = adapter
        .calculate_root_speculative(
            &[(b"bob".to_vec(), vh(0x02))],
            v1.new_root_hash,
            2,
            Some(1),
            Some(&garbage),
        )
        .unwrap();
    assert_ne!(batch.new_root_hash, ZERO_HASH);
}

#[test]
fn default_adapter_runs_in_memory() {
    let adapter = StateTreeAdapter::default();
    let batch = adapter
        .update_batch(&[(b"k".to_vec(), vh(0x01))], 1, None, None)
        .unwrap();
    assert_eq!(batch.new_nodes.len(), 1);
    assert_ne!(batch.new_root_hash, ZERO_HASH);
}
