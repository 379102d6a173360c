// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

mod common;

use tangle_consensus::{
    types::{Hash, MilestoneIndex},
    ConsensusError, CorruptionError,
};

use self::common::{transfer, unique_hash, zero_value, TestNode, TOTAL_SUPPLY};

#[test]
fn double_spend_on_the_branch_side_conflicts() {
    let node = TestNode::new();
    let (alice, bob) = (unique_hash(), unique_hash());
    let spend = TOTAL_SUPPLY as i64;
    let first = node.attach_solid(transfer(node.genesis, alice, spend, Hash::null(), Hash::null()));
    let second = node.attach_solid(transfer(node.genesis, bob, spend, Hash::null(), Hash::null()));
    let milestone = node.issue_milestone(1, first, second);

    let summary = node.engine.confirm_milestone(MilestoneIndex(1)).unwrap();

    assert_eq!(summary.index, MilestoneIndex(1));
    assert_eq!(summary.included, vec![first]);
    assert_eq!(summary.excluded_conflicting, vec![second]);
    assert_eq!(summary.excluded_zero_value, vec![milestone]);
    assert_eq!(summary.mutated_addresses, 2);

    assert!(node.bundle(&second).is_conflicting());
    assert!(!node.bundle(&first).is_conflicting());
    for tail in [first, second, milestone] {
        assert!(node.bundle(&tail).is_confirmed());
    }
    assert_eq!(node.balance(&alice), TOTAL_SUPPLY);
    assert_eq!(node.balance(&bob), 0);
    assert_eq!(node.balance(&node.genesis), 0);
}

#[test]
fn spends_follow_past_cone_order() {
    let node = TestNode::new();
    let (alice, bob) = (unique_hash(), unique_hash());
    let funding = node.attach_solid(transfer(node.genesis, alice, 500, Hash::null(), Hash::null()));
    // Spends funds that only exist once the approved bundle is applied.
    let spending = node.attach_solid(transfer(alice, bob, 200, funding, Hash::null()));
    node.issue_milestone(1, spending, Hash::null());

    let summary = node.engine.confirm_milestone(MilestoneIndex(1)).unwrap();

    assert_eq!(summary.included, vec![funding, spending]);
    assert!(summary.excluded_conflicting.is_empty());
    assert_eq!(node.balance(&alice), 300);
    assert_eq!(node.balance(&bob), 200);
}

#[test]
fn zero_value_bundles_are_confirmed_without_mutation() {
    let node = TestNode::new();
    let spam = node.attach_solid(zero_value(Hash::null(), Hash::null()));
    let milestone = node.issue_milestone(1, spam, Hash::null());

    let summary = node.engine.confirm_milestone(MilestoneIndex(1)).unwrap();

    assert!(summary.included.is_empty());
    assert_eq!(summary.excluded_zero_value, vec![spam, milestone]);
    assert_eq!(summary.mutated_addresses, 0);
    assert!(node.engine.get_ledger_diff(MilestoneIndex(1)).unwrap().is_empty());
    assert!(node.bundle(&spam).is_confirmed());
    assert_eq!(node.balance(&node.genesis), TOTAL_SUPPLY);
}

#[test]
fn confirmed_bundles_are_not_applied_twice() {
    let node = TestNode::new();
    let mut confirmed = node.engine.events().subscribe_milestone_confirmed();
    let mut solid = node.engine.events().subscribe_solid_milestone_changed();
    let receiver = unique_hash();
    let tail = node.attach_solid(transfer(node.genesis, receiver, 100, Hash::null(), Hash::null()));
    let first = node.issue_milestone(1, tail, Hash::null());
    node.engine.confirm_milestone(MilestoneIndex(1)).unwrap();

    let second = node.issue_milestone(2, tail, first);
    let summary = node.engine.confirm_milestone(MilestoneIndex(2)).unwrap();

    assert!(summary.included.is_empty());
    assert_eq!(summary.excluded_zero_value, vec![second]);
    assert_eq!(node.balance(&receiver), 100);
    assert!(node.engine.is_node_synced());

    assert_eq!(confirmed.try_recv().unwrap().included, vec![tail]);
    assert_eq!(confirmed.try_recv().unwrap(), summary);
    assert_eq!(solid.try_recv().unwrap(), MilestoneIndex(1));
    assert_eq!(solid.try_recv().unwrap(), MilestoneIndex(2));
}

#[test]
fn solid_entry_points_bound_the_walk() {
    let node = TestNode::new();
    let boundary = unique_hash();
    node.engine
        .context()
        .solid_entry_points()
        .add(boundary, MilestoneIndex(0));
    let tail = node.attach_solid(transfer(node.genesis, unique_hash(), 10, boundary, Hash::null()));
    node.issue_milestone(1, tail, boundary);

    let summary = node.engine.confirm_milestone(MilestoneIndex(1)).unwrap();

    assert_eq!(summary.included, vec![tail]);
}

#[test]
fn milestone_approving_invalid_bundle_is_fatal() {
    let node = TestNode::new();
    let mut txs = transfer(node.genesis, unique_hash(), 10, Hash::null(), Hash::null());
    txs[0].timestamp += 1;
    let invalid = node.attach_solid(txs);
    node.issue_milestone(1, invalid, Hash::null());

    let error = node.engine.confirm_milestone(MilestoneIndex(1)).unwrap_err();

    assert!(error.is_fatal());
    assert!(matches!(
        error,
        ConsensusError::Corruption(CorruptionError::ApprovedInvalidBundle { tail, .. }) if tail == invalid
    ));
    assert_eq!(node.engine.context().solid_milestone_index(), MilestoneIndex(0));
    assert_eq!(node.balance(&node.genesis), TOTAL_SUPPLY);
}

#[test]
fn milestone_approving_non_tail_is_fatal() {
    let node = TestNode::new();
    let txs = transfer(node.genesis, unique_hash(), 10, Hash::null(), Hash::null());
    let head = txs[1].hash;
    node.attach_solid(txs);
    node.issue_milestone(1, head, Hash::null());

    assert!(matches!(
        node.engine.confirm_milestone(MilestoneIndex(1)),
        Err(ConsensusError::Corruption(CorruptionError::ApprovedNonTail { hash, .. })) if hash == head
    ));
}
