// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use tokio::sync::broadcast;

use crate::types::{Hash, MilestoneIndex};

const CHANNEL_CAPACITY: usize = 1024;

/// A milestone bundle that passed every coordinator check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MilestoneEvent {
    /// The milestone index.
    pub index: MilestoneIndex,
    /// The tail of the milestone bundle.
    pub tail: Hash,
}

/// A milestone candidate that failed verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidMilestoneEvent {
    /// The tail of the rejected bundle.
    pub tail: Hash,
    /// Why it was rejected.
    pub reason: String,
}

/// The outcome of confirming a milestone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfirmationSummary {
    /// The confirmed milestone.
    pub index: MilestoneIndex,
    /// Tails of bundles whose mutations were applied.
    pub included: Vec<Hash>,
    /// Tails of bundles that conflicted with the ledger.
    pub excluded_conflicting: Vec<Hash>,
    /// Tails of bundles without ledger mutations.
    pub excluded_zero_value: Vec<Hash>,
    /// Number of addresses in the applied diff.
    pub mutated_addresses: usize,
}

/// Typed publish channels, one per event kind.
#[derive(Debug)]
pub struct Events {
    received_valid_milestone: broadcast::Sender<MilestoneEvent>,
    received_invalid_milestone: broadcast::Sender<InvalidMilestoneEvent>,
    address_spent: broadcast::Sender<Hash>,
    milestone_confirmed: broadcast::Sender<ConfirmationSummary>,
    solid_milestone_changed: broadcast::Sender<MilestoneIndex>,
}

impl Default for Events {
    fn default() -> Self {
        Self {
            received_valid_milestone: broadcast::channel(CHANNEL_CAPACITY).0,
            received_invalid_milestone: broadcast::channel(CHANNEL_CAPACITY).0,
            address_spent: broadcast::channel(CHANNEL_CAPACITY).0,
            milestone_confirmed: broadcast::channel(CHANNEL_CAPACITY).0,
            solid_milestone_changed: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }
}

// A send only fails without subscribers, which is not an error for fire-and-forget events.
impl Events {
    #[allow(missing_docs)]
    pub fn subscribe_received_valid_milestone(&self) -> broadcast::Receiver<MilestoneEvent> {
        self.received_valid_milestone.subscribe()
    }

    #[allow(missing_docs)]
    pub fn subscribe_received_invalid_milestone(&self) -> broadcast::Receiver<InvalidMilestoneEvent> {
        self.received_invalid_milestone.subscribe()
    }

    #[allow(missing_docs)]
    pub fn subscribe_address_spent(&self) -> broadcast::Receiver<Hash> {
        self.address_spent.subscribe()
    }

    #[allow(missing_docs)]
    pub fn subscribe_milestone_confirmed(&self) -> broadcast::Receiver<ConfirmationSummary> {
        self.milestone_confirmed.subscribe()
    }

    #[allow(missing_docs)]
    pub fn subscribe_solid_milestone_changed(&self) -> broadcast::Receiver<MilestoneIndex> {
        self.solid_milestone_changed.subscribe()
    }

    pub(crate) fn received_valid_milestone(&self, event: MilestoneEvent) {
        let _ = self.received_valid_milestone.send(event);
    }

    pub(crate) fn received_invalid_milestone(&self, event: InvalidMilestoneEvent) {
        let _ = self.received_invalid_milestone.send(event);
    }

    pub(crate) fn address_spent(&self, address: Hash) {
        let _ = self.address_spent.send(address);
    }

    pub(crate) fn milestone_confirmed(&self, summary: ConfirmationSummary) {
        let _ = self.milestone_confirmed.send(summary);
    }

    pub(crate) fn solid_milestone_changed(&self, index: MilestoneIndex) {
        let _ = self.solid_milestone_changed.send(index);
    }
}
