// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

mod common;

use tangle_consensus::{
    bundle::LedgerChanges,
    storage::StorageError,
    types::{Hash, Transaction},
    ConsensusError, CorruptionError,
};

use self::common::{build_bundle, transfer, unique_hash, zero_value, TestNode};

#[test]
fn assembly_is_idempotent() {
    let node = TestNode::new();
    let receiver = unique_hash();
    let txs = transfer(node.genesis, receiver, 100, Hash::null(), Hash::null());
    let head = txs[1].hash;

    let tail = node.attach_solid(txs);

    let bundle = node.bundle(&tail);
    assert!(bundle.is_complete());
    assert!(bundle.is_solid());
    assert!(bundle.is_valid());
    assert!(bundle.is_valid_strict_semantics());
    assert!(!bundle.is_value_spam());
    assert_eq!(bundle.head(), &head);
    assert_eq!(
        bundle.ledger_changes(),
        [(node.genesis, -100), (receiver, 100)]
            .into_iter()
            .collect::<LedgerChanges>()
    );

    let assembler = node.engine.assembler();
    assert!(assembler.try_construct_bundle(&tail, true).unwrap().is_empty());
    assert!(assembler.try_construct_bundle(&head, false).unwrap().is_empty());
}

#[test]
fn non_tail_start_resolves_its_tail() {
    let node = TestNode::new();
    let txs = build_bundle(&[(unique_hash(), 0), (unique_hash(), 0), (unique_hash(), 0)], Hash::null(), Hash::null());
    let tail = txs[0].hash;
    let head = txs[2].hash;
    for tx in txs {
        node.engine.context().storage().store_transaction(tx).unwrap();
    }

    let bundles = node.engine.assembler().try_construct_bundle(&head, false).unwrap();

    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].tail(), &tail);
    assert_eq!(bundles[0].transactions().len(), 3);
}

#[test]
fn gaps_abort_assembly() {
    let node = TestNode::new();
    let txs = build_bundle(&[(unique_hash(), 0), (unique_hash(), 0), (unique_hash(), 0)], Hash::null(), Hash::null());
    let tail = txs[0].hash;
    let storage = node.engine.context().storage();
    storage.store_transaction(txs[0].clone()).unwrap();
    storage.store_transaction(txs[2].clone()).unwrap();

    let assembler = node.engine.assembler();
    assert!(assembler.try_construct_bundle(&tail, false).unwrap().is_empty());
    assert!(!storage.contains_bundle(&tail).unwrap());
    assert!(matches!(
        assembler.try_construct_bundle(&tail, true),
        Err(ConsensusError::Corruption(CorruptionError::UnassemblableSolidTail(hash))) if hash == tail
    ));
    assert!(matches!(
        assembler.try_construct_bundle(&unique_hash(), true),
        Err(ConsensusError::Corruption(CorruptionError::MissingTransaction(_)))
    ));
}

#[test]
fn zero_value_bundle_is_value_spam() {
    let node = TestNode::new();
    let tail = node.attach_solid(zero_value(Hash::null(), Hash::null()));

    let bundle = node.bundle(&tail);
    assert!(bundle.is_valid());
    assert!(bundle.is_value_spam());
    assert!(bundle.ledger_changes().is_empty());
}

#[test]
fn self_cancelling_values_are_value_spam() {
    let node = TestNode::new();
    let address = unique_hash();
    let tail = node.attach_solid(build_bundle(&[(address, -5), (address, 5)], Hash::null(), Hash::null()));

    let bundle = node.bundle(&tail);
    assert!(bundle.is_valid());
    assert!(bundle.is_value_spam());
    assert!(!node.engine.was_address_spent(&address).unwrap());
}

#[test]
fn tampered_essence_is_invalid() {
    let node = TestNode::new();
    let mut txs = transfer(node.genesis, unique_hash(), 10, Hash::null(), Hash::null());
    txs[1].timestamp += 1;

    let tail = node.attach_solid(txs);

    let bundle = node.bundle(&tail);
    assert!(bundle.is_complete());
    assert!(bundle.is_solid());
    assert!(!bundle.is_valid());
    assert!(!node.engine.was_address_spent(&node.genesis).unwrap());
    assert_eq!(node.engine.tip_selector().tracked_messages(), 0);
}

#[test]
fn foreign_member_leaves_bundle_incomplete() {
    let node = TestNode::new();
    let mut txs = zero_value(Hash::null(), Hash::null());
    let other = build_bundle(&[(unique_hash(), 0), (unique_hash(), 0)], Hash::null(), Hash::null());
    // The tail claims two members but its trunk belongs to another bundle.
    txs[0].last_index = 1;
    txs[0].trunk = other[1].hash;
    node.attach(other);

    let tail = node.attach_solid(txs);

    let bundle = node.bundle(&tail);
    assert!(!bundle.is_complete());
    assert!(!bundle.is_valid());
    assert_eq!(bundle.head(), &Hash::null());
}

#[test]
fn strict_semantics_require_tail_approvees() {
    let node = TestNode::new();
    let middle = build_bundle(&[(unique_hash(), 0), (unique_hash(), 0)], Hash::null(), Hash::null());
    let non_tail = middle[1].hash;
    node.attach_solid(middle);

    let approves_non_tail = node.attach_solid(zero_value(non_tail, Hash::null()));
    let approves_missing = node.attach_solid(zero_value(unique_hash(), Hash::null()));

    for tail in [approves_non_tail, approves_missing] {
        let bundle = node.bundle(&tail);
        assert!(bundle.is_valid());
        assert!(!bundle.is_valid_strict_semantics());
    }
    // Only the strict bundle is offered to tip selection.
    assert_eq!(node.engine.tip_selector().tracked_messages(), 1);
}

#[test]
fn spent_addresses_are_recorded() {
    let node = TestNode::new();
    let mut spent = node.engine.events().subscribe_address_spent();
    let receiver = unique_hash();

    node.attach_solid(transfer(node.genesis, receiver, 100, Hash::null(), Hash::null()));

    assert!(node.engine.was_address_spent(&node.genesis).unwrap());
    assert!(!node.engine.was_address_spent(&receiver).unwrap());
    assert_eq!(spent.try_recv().unwrap(), node.genesis);
    assert!(spent.try_recv().is_err());
}

#[test]
fn spent_address_recording_can_be_disabled() {
    let node = TestNode::with_config(|config| config.ledger.spent_addresses_enabled = false);
    let mut spent = node.engine.events().subscribe_address_spent();

    node.attach_solid(transfer(node.genesis, unique_hash(), 100, Hash::null(), Hash::null()));

    assert!(!node.engine.was_address_spent(&node.genesis).unwrap());
    assert_eq!(spent.try_recv().unwrap(), node.genesis);
}

#[test]
fn self_referencing_trunk_ends_assembly() {
    let node = TestNode::new();
    let mut tx = build_bundle(&[(unique_hash(), 0), (unique_hash(), 0)], Hash::null(), Hash::null()).remove(0);
    tx.trunk = tx.hash;

    let tail = node.attach_solid(vec![tx]);

    let bundle = node.bundle(&tail);
    assert_eq!(bundle.transactions(), &[tail]);
    assert!(!bundle.is_complete());
    assert!(!bundle.is_valid());
    assert_eq!(bundle.head(), &Hash::null());
}

#[test]
fn out_of_range_indexes_are_rejected_on_ingest() {
    let node = TestNode::new();
    // A milestone candidate is assembled on store, so an unchecked index would reach the trunk walk.
    for (current_index, last_index) in [(0, u64::MAX), (2, 1)] {
        let tx = Transaction {
            hash: unique_hash(),
            trunk: unique_hash(),
            current_index,
            last_index,
            ..Default::default()
        };
        let hash = tx.hash;

        let error = node.engine.process_transaction(tx).unwrap_err();

        assert!(!error.is_fatal());
        assert!(matches!(
            error,
            ConsensusError::Storage(StorageError::InvalidTransaction { hash: rejected, .. }) if rejected == hash
        ));
        assert!(!node.engine.context().storage().contains_transaction(&hash).unwrap());
    }
}

#[test]
fn invalid_fragment_trits_are_rejected_on_ingest() {
    let node = TestNode::new();
    let mut txs = zero_value(Hash::null(), Hash::null());
    txs[0].signature_message_fragment[0] = 5;

    assert!(matches!(
        node.engine.process_transaction(txs.remove(0)),
        Err(ConsensusError::Storage(StorageError::InvalidTransaction { .. }))
    ));
}
