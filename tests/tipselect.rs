// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

mod common;

use tangle_consensus::{
    tipselect::TipSelectionError,
    types::{Hash, MilestoneIndex},
    ConsensusError,
};

use self::common::{zero_value, TestNode};

#[test]
fn solid_bundles_feed_tip_selection() {
    let node = TestNode::new();
    let mut tip = Hash::null();
    for _ in 0..3 {
        tip = node.attach_solid(zero_value(tip, Hash::null()));
    }
    node.confirm_next_milestone();

    let selector = node.engine.tip_selector();
    assert_eq!(selector.tracked_messages(), 3);
    assert_eq!(selector.tips(), 1);

    assert_eq!(node.engine.select_tips(1).unwrap(), vec![tip]);
    assert_eq!(selector.tracked_messages(), 0);
    assert!(matches!(
        node.engine.select_tips(1),
        Err(ConsensusError::TipSelection(TipSelectionError::NoTipsAvailable))
    ));
}

#[test]
fn independent_branches_are_all_selected() {
    let node = TestNode::new();
    let left = node.attach_solid(zero_value(Hash::null(), Hash::null()));
    let right = node.attach_solid(zero_value(Hash::null(), Hash::null()));
    node.confirm_next_milestone();

    let mut tips = node.engine.select_tips(2).unwrap();
    tips.sort();
    let mut expected = vec![left, right];
    expected.sort();
    assert_eq!(tips, expected);
}

#[test]
fn milestones_are_not_tips() {
    let node = TestNode::new();
    let tail = node.attach_solid(zero_value(Hash::null(), Hash::null()));
    node.issue_milestone(1, tail, Hash::null());
    assert!(node.engine.get_milestone(MilestoneIndex(1)).unwrap().is_some());
    node.engine.confirm_milestone(MilestoneIndex(1)).unwrap();

    let selector = node.engine.tip_selector();
    assert_eq!(selector.tracked_messages(), 1);
    assert_eq!(node.engine.select_tips(1).unwrap(), vec![tail]);
}

#[test]
fn selection_requires_a_synced_node() {
    let node = TestNode::new();
    node.attach_solid(zero_value(Hash::null(), Hash::null()));
    assert!(matches!(
        node.engine.select_tips(1),
        Err(ConsensusError::TipSelection(TipSelectionError::NodeNotSynced))
    ));

    // A known but unconfirmed milestone leaves the node unsynced.
    node.confirm_next_milestone();
    node.issue_milestone(2, Hash::null(), Hash::null());
    assert!(matches!(
        node.engine.select_tips(1),
        Err(ConsensusError::TipSelection(TipSelectionError::NodeNotSynced))
    ));
    node.engine.confirm_milestone(MilestoneIndex(2)).unwrap();
    assert_eq!(node.engine.select_tips(1).unwrap().len(), 1);
}

#[test]
fn tips_below_max_depth_are_not_tracked() {
    let node = TestNode::with_config(|config| config.tipsel.below_max_depth = 2);
    node.confirm_next_milestone();
    let latest = node.confirm_next_milestone();

    // Only rooted in the initial snapshot, two milestones back.
    let stale = node.attach_solid(zero_value(Hash::null(), Hash::null()));
    let on_stale = node.attach_solid(zero_value(stale, latest));
    let recent = node.attach_solid(zero_value(latest, latest));

    let selector = node.engine.tip_selector();
    assert!(!selector.is_tracked(&stale));
    assert!(!selector.is_tracked(&on_stale));
    assert!(selector.is_tracked(&recent));
    assert_eq!(node.engine.select_tips(1).unwrap(), vec![recent]);
}
