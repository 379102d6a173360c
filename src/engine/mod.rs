// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Module containing the consensus engine: shared context, ingest pipeline, confirmation and queries.

mod config;
mod depth;
mod events;
mod solid_entry_points;

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

pub use self::{
    config::{
        CoordinatorConfig, EngineConfig, EngineConfigError, LedgerConfig, DEFAULT_MERKLE_TREE_DEPTH,
        DEFAULT_SECURITY_LEVEL, DEFAULT_SPENT_ADDRESSES_ENABLED, DEFAULT_TOTAL_SUPPLY,
    },
    events::{ConfirmationSummary, Events, InvalidMilestoneEvent, MilestoneEvent},
    solid_entry_points::SolidEntryPoints,
};
use crate::{
    bundle::{Bundle, BundleAssembler, BundleFlag, BundleValidator},
    error::{ConsensusError, CorruptionError},
    ledger::{white_flag, Balances, LedgerDiff, LedgerStateManager},
    milestone::MilestoneValidator,
    storage::{CachedBundle, KeyValueStore, TangleStorage},
    tipselect::{HeaviestSelector, MessageMetadata, TipSelectionError},
    types::{Hash, MilestoneIndex, Transaction},
};

/// State shared by every consensus component.
pub struct ConsensusContext {
    config: EngineConfig,
    storage: TangleStorage,
    solid_entry_points: SolidEntryPoints,
    solid_milestone_index: RwLock<MilestoneIndex>,
    latest_milestone_index: RwLock<MilestoneIndex>,
    events: Events,
}

impl ConsensusContext {
    /// Creates a context whose solid and latest milestone are `solid_milestone_index`.
    pub fn new(config: EngineConfig, storage: TangleStorage, solid_milestone_index: MilestoneIndex) -> Self {
        Self {
            config,
            storage,
            solid_entry_points: Default::default(),
            solid_milestone_index: RwLock::new(solid_milestone_index),
            latest_milestone_index: RwLock::new(solid_milestone_index),
            events: Default::default(),
        }
    }

    #[allow(missing_docs)]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[allow(missing_docs)]
    pub fn storage(&self) -> &TangleStorage {
        &self.storage
    }

    #[allow(missing_docs)]
    pub fn solid_entry_points(&self) -> &SolidEntryPoints {
        &self.solid_entry_points
    }

    #[allow(missing_docs)]
    pub fn events(&self) -> &Events {
        &self.events
    }

    /// The index of the last confirmed milestone.
    pub fn solid_milestone_index(&self) -> MilestoneIndex {
        *self.solid_milestone_index.read()
    }

    /// The highest index of a valid milestone seen so far.
    pub fn latest_milestone_index(&self) -> MilestoneIndex {
        *self.latest_milestone_index.read()
    }

    /// Whether every known milestone is confirmed.
    pub fn is_node_synced(&self) -> bool {
        let latest = self.latest_milestone_index();
        latest.0 > 0 && self.solid_milestone_index() == latest
    }

    pub(crate) fn set_solid_milestone_index(&self, index: MilestoneIndex) {
        *self.solid_milestone_index.write() = index;
        self.raise_latest_milestone_index(index);
    }

    pub(crate) fn raise_latest_milestone_index(&self, index: MilestoneIndex) {
        let mut latest = self.latest_milestone_index.write();
        if index > *latest {
            *latest = index;
        }
    }
}

/// The state a node starts from: balances and solid entry points at a milestone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// The milestone the snapshot was taken at.
    pub index: MilestoneIndex,
    /// The retained history boundary.
    pub solid_entry_points: Vec<(Hash, MilestoneIndex)>,
    /// Balances summing to the total supply.
    pub balances: Balances,
}

/// The consensus core of a node.
pub struct ConsensusEngine {
    ctx: Arc<ConsensusContext>,
    assembler: BundleAssembler,
    bundle_validator: BundleValidator,
    milestone_validator: MilestoneValidator,
    ledger: LedgerStateManager,
    selector: HeaviestSelector,
}

impl ConsensusEngine {
    /// Creates an engine over `backend`, resuming from the ledger state stored there.
    pub fn new(config: EngineConfig, backend: Arc<dyn KeyValueStore>) -> Result<Self, ConsensusError> {
        config.validate()?;
        let ledger = LedgerStateManager::new(backend.clone(), config.ledger.total_supply)?;
        let selector = HeaviestSelector::new(config.tipsel.clone());
        let ctx = Arc::new(ConsensusContext::new(
            config,
            TangleStorage::new(backend),
            ledger.indexes().ledger,
        ));
        Ok(Self {
            assembler: BundleAssembler::new(ctx.clone()),
            bundle_validator: BundleValidator::new(ctx.clone()),
            milestone_validator: MilestoneValidator::new(ctx.clone()),
            ledger,
            selector,
            ctx,
        })
    }

    #[allow(missing_docs)]
    pub fn context(&self) -> &Arc<ConsensusContext> {
        &self.ctx
    }

    #[allow(missing_docs)]
    pub fn events(&self) -> &Events {
        self.ctx.events()
    }

    #[allow(missing_docs)]
    pub fn assembler(&self) -> &BundleAssembler {
        &self.assembler
    }

    #[allow(missing_docs)]
    pub fn bundle_validator(&self) -> &BundleValidator {
        &self.bundle_validator
    }

    #[allow(missing_docs)]
    pub fn milestone_validator(&self) -> &MilestoneValidator {
        &self.milestone_validator
    }

    #[allow(missing_docs)]
    pub fn ledger(&self) -> &LedgerStateManager {
        &self.ledger
    }

    #[allow(missing_docs)]
    pub fn tip_selector(&self) -> &HeaviestSelector {
        &self.selector
    }

    /// Installs a snapshot as the current ledger state, the snapshot checkpoint and the solid entry points.
    pub fn load_snapshot(&self, snapshot: Snapshot) -> Result<(), ConsensusError> {
        let mut ledger = self.ledger.write();
        ledger.store_balances(&snapshot.balances, snapshot.index)?;
        ledger.store_snapshot_balances(&snapshot.balances, snapshot.index)?;
        self.ctx.solid_entry_points().replace(snapshot.solid_entry_points);
        self.ctx.set_solid_milestone_index(snapshot.index);
        info!(
            index = %snapshot.index,
            addresses = snapshot.balances.len(),
            solid_entry_points = self.ctx.solid_entry_points().len(),
            "loaded snapshot"
        );
        Ok(())
    }

    /// Stores a transaction received from the network and runs the ingest pipeline on it.
    ///
    /// Returns the bundles that were newly assembled.
    pub fn process_transaction(&self, transaction: Transaction) -> Result<Vec<CachedBundle>, ConsensusError> {
        match self.ctx.storage().store_transaction(transaction)? {
            Some(stored) => self.on_transaction_stored(&stored),
            None => Ok(Vec::new()),
        }
    }

    /// Runs the ingest pipeline for a stored transaction.
    ///
    /// Only milestone candidates are assembled here. All other bundles wait until their tail becomes solid.
    pub fn on_transaction_stored(&self, transaction: &Transaction) -> Result<Vec<CachedBundle>, ConsensusError> {
        if !self.milestone_validator.is_maybe_milestone_member(transaction) {
            return Ok(Vec::new());
        }
        let bundles = self.assembler.try_construct_bundle(&transaction.hash, false)?;
        for bundle in &bundles {
            self.process_new_bundle(bundle)?;
        }
        Ok(bundles)
    }

    /// Handles a tail whose past cone became solid: assembles its bundle, flags it solid and feeds the tip selector
    /// unless it would approve a cone below max depth.
    pub fn on_tail_solid(&self, tail: &Hash) -> Result<(), ConsensusError> {
        let mut bundles = self.assembler.try_construct_bundle(tail, true)?;
        for bundle in &bundles {
            self.process_new_bundle(bundle)?;
        }
        let storage = self.ctx.storage();
        let bundle = match bundles.pop() {
            Some(bundle) => bundle,
            None => storage.bundle(tail)?.ok_or(CorruptionError::MissingBundle(*tail))?,
        };
        bundle.set_flag(BundleFlag::Solid, true);

        if bundle.is_valid() && bundle.is_valid_strict_semantics() && !bundle.is_milestone() {
            let head = storage
                .transaction(bundle.head())?
                .ok_or(CorruptionError::MissingTransaction(*bundle.head()))?;
            let parents = vec![head.trunk, head.branch];
            if depth::is_below_max_depth(&self.ctx, &parents, |parent| self.selector.is_tracked(parent))? {
                debug!(%tail, "not tracking tip below max depth");
            } else {
                self.selector.on_new_solid_message(&MessageMetadata {
                    message_id: *tail,
                    parents,
                });
            }
        }
        Ok(())
    }

    fn process_new_bundle(&self, bundle: &Bundle) -> Result<(), ConsensusError> {
        if !self.bundle_validator.validate(bundle)? {
            return Ok(());
        }
        self.bundle_validator.calc_ledger_changes(bundle)?;
        if !bundle.is_value_spam() {
            self.bundle_validator.mark_spent_addresses(bundle)?;
        } else {
            self.check_if_milestone(bundle)?;
        }
        self.bundle_validator.check_strict_semantics(bundle)?;
        Ok(())
    }

    /// Runs milestone verification on a coordinator candidate. Invalid milestones are reported, not returned.
    fn check_if_milestone(&self, bundle: &Bundle) -> Result<(), ConsensusError> {
        let tail = self
            .ctx
            .storage()
            .transaction(bundle.tail())?
            .ok_or(CorruptionError::MissingTransaction(*bundle.tail()))?;
        if !self.milestone_validator.is_maybe_milestone(&tail) {
            return Ok(());
        }
        match self.milestone_validator.check_if_milestone(bundle) {
            Ok(_) => Ok(()),
            Err(ConsensusError::InvalidMilestone(e)) => {
                warn!(tail = %bundle.tail(), "invalid milestone: {}", e);
                self.ctx.events().received_invalid_milestone(InvalidMilestoneEvent {
                    tail: *bundle.tail(),
                    reason: e.to_string(),
                });
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Confirms the milestone following the current solid milestone and applies its ledger mutation.
    pub fn confirm_milestone(&self, index: MilestoneIndex) -> Result<ConfirmationSummary, ConsensusError> {
        let mut ledger = self.ledger.write();
        let expected = MilestoneIndex(self.ctx.solid_milestone_index().0 + 1);
        if index != expected {
            return Err(ConsensusError::NotNextMilestone { index, expected });
        }
        let milestone = self
            .ctx
            .storage()
            .milestone(index)?
            .ok_or(ConsensusError::UnknownMilestone(index))?;

        let outcome = white_flag(&self.ctx, &ledger, index, &milestone.tail)?;
        ledger.apply_ledger_diff(&outcome.diff, index)?;
        for bundle in &outcome.conflicting {
            bundle.set_flag(BundleFlag::Conflicting, true);
        }
        for bundle in &outcome.bundles {
            bundle.confirm(index);
        }
        self.ctx.set_solid_milestone_index(index);
        drop(ledger);

        let summary = outcome.summary;
        info!(
            %index,
            included = summary.included.len(),
            conflicting = summary.excluded_conflicting.len(),
            zero_value = summary.excluded_zero_value.len(),
            "confirmed milestone"
        );
        self.ctx.events().milestone_confirmed(summary.clone());
        self.ctx.events().solid_milestone_changed(index);
        Ok(summary)
    }

    /// The confirmed balance of `address` and the ledger index it refers to.
    pub fn get_balance(&self, address: &Hash) -> Result<(u64, MilestoneIndex), ConsensusError> {
        Ok(self.ledger.balance(address)?)
    }

    /// The ledger mutation applied at `index`.
    pub fn get_ledger_diff(&self, index: MilestoneIndex) -> Result<LedgerDiff, ConsensusError> {
        Ok(self.ledger.ledger_diff(index)?)
    }

    /// The balances at `target`, or at the solid milestone if `target` is zero.
    pub fn get_ledger_state(&self, target: MilestoneIndex) -> Result<(Balances, MilestoneIndex), ConsensusError> {
        let ledger = self.ledger.read();
        Ok(ledger.ledger_state_for_milestone(target, self.ctx.solid_milestone_index())?)
    }

    /// The snapshot checkpoint balances.
    pub fn get_snapshot_balances(&self) -> Result<(Balances, MilestoneIndex), ConsensusError> {
        Ok(self.ledger.snapshot_balances()?)
    }

    /// The milestone bundle at `index`.
    pub fn get_milestone(&self, index: MilestoneIndex) -> Result<Option<CachedBundle>, ConsensusError> {
        let storage = self.ctx.storage();
        match storage.milestone(index)? {
            Some(milestone) => Ok(Some(
                storage
                    .bundle(&milestone.tail)?
                    .ok_or(CorruptionError::MissingBundle(milestone.tail))?,
            )),
            None => Ok(None),
        }
    }

    /// Selects tips to approve once the node is synced. See [`HeaviestSelector::select_tips`].
    pub fn select_tips(&self, min_required: usize) -> Result<Vec<Hash>, ConsensusError> {
        if !self.ctx.is_node_synced() {
            return Err(TipSelectionError::NodeNotSynced.into());
        }
        let tips = self.selector.select_tips(min_required)?;
        debug!(tips = tips.len(), "tip selection finished");
        Ok(tips)
    }

    /// Whether every known milestone is confirmed.
    pub fn is_node_synced(&self) -> bool {
        self.ctx.is_node_synced()
    }

    /// Whether `address` was ever spent from.
    pub fn was_address_spent(&self, address: &Hash) -> Result<bool, ConsensusError> {
        Ok(self.ctx.storage().was_address_spent(address)?)
    }
}
