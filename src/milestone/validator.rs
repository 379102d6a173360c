// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use super::Milestone;
use crate::{
    bundle::{Bundle, BundleFlag},
    crypto::{merkle_root, wots},
    engine::{ConsensusContext, MilestoneEvent},
    error::{ConsensusError, CorruptionError},
    storage::CachedTransaction,
    types::{Hash, Transaction},
};

/// A milestone candidate that is structurally broken or wrongly signed.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidMilestoneError {
    #[error("milestone {tail} is missing transaction {missing}")]
    MissingTransaction { tail: Hash, missing: Hash },
    #[error("signature transaction {0} was not issued by the coordinator")]
    ForeignSignatureTransaction(Hash),
    #[error("siblings transaction {0} must have zero value and the null address")]
    InvalidSiblingsTransaction(Hash),
    #[error("branch of signature transaction {0} does not match the siblings trunk")]
    BranchMismatch(Hash),
    #[error("signature of milestone {tail} leads to merkle root {root}")]
    InvalidSignature { tail: Hash, root: Hash },
}

/// Recognizes coordinator bundles and verifies their signatures.
pub struct MilestoneValidator {
    ctx: Arc<ConsensusContext>,
}

impl MilestoneValidator {
    #[allow(missing_docs)]
    pub fn new(ctx: Arc<ConsensusContext>) -> Self {
        Self { ctx }
    }

    /// Whether `tx` could belong to a milestone: sent from the coordinator address without value.
    pub fn is_maybe_milestone(&self, tx: &Transaction) -> bool {
        tx.address == self.ctx.config().coordinator.address && tx.value == 0
    }

    /// Whether `tx` could be any member of a milestone bundle, including its siblings transaction.
    pub fn is_maybe_milestone_member(&self, tx: &Transaction) -> bool {
        tx.value == 0 && (tx.address == self.ctx.config().coordinator.address || tx.address.is_null())
    }

    /// Checks whether a complete bundle is a valid milestone and, if so, records it.
    ///
    /// Bundles that are not milestones, already processed or out of range yield `Ok(false)`. Structural or signature
    /// faults of a coordinator bundle are [`InvalidMilestoneError`]s.
    pub fn check_if_milestone(&self, bundle: &Bundle) -> Result<bool, ConsensusError> {
        let coordinator = &self.ctx.config().coordinator;
        let security = coordinator.security_level as usize;
        if !bundle.is_complete() || bundle.transactions().len() != security + 1 {
            return Ok(false);
        }

        let storage = self.ctx.storage();
        let tail = storage
            .transaction(bundle.tail())?
            .ok_or(CorruptionError::MissingTransaction(*bundle.tail()))?;
        if !self.is_maybe_milestone(&tail) {
            return Ok(false);
        }
        let Some(index) = tail.milestone_index() else {
            return Ok(false);
        };
        if index <= self.ctx.solid_milestone_index() || !coordinator.is_index_in_range(index) {
            debug!(%index, tail = %tail.hash, "ignoring milestone outside the accepted range");
            return Ok(false);
        }
        if storage.contains_milestone(index)? {
            return Ok(false);
        }

        let mut signature_txs = vec![tail];
        while signature_txs.len() < security {
            let trunk = signature_txs[signature_txs.len() - 1].trunk;
            let tx = self.load(bundle.tail(), &trunk)?;
            if !self.is_maybe_milestone(&tx) {
                return Err(InvalidMilestoneError::ForeignSignatureTransaction(tx.hash).into());
            }
            signature_txs.push(tx);
        }

        let siblings_hash = signature_txs[security - 1].trunk;
        let siblings = self.load(bundle.tail(), &siblings_hash)?;
        if siblings.value != 0 || !siblings.address.is_null() {
            return Err(InvalidMilestoneError::InvalidSiblingsTransaction(siblings.hash).into());
        }
        if let Some(tx) = signature_txs.iter().find(|tx| tx.branch != siblings.trunk) {
            return Err(InvalidMilestoneError::BranchMismatch(tx.hash).into());
        }

        let root = self.merkle_root(&signature_txs, &siblings, index.0 as u64)?;
        if root != coordinator.address {
            return Err(InvalidMilestoneError::InvalidSignature {
                tail: *bundle.tail(),
                root,
            }
            .into());
        }

        // Another instance of the same milestone may have won the race.
        let stored = storage.store_milestone(Milestone {
            index,
            tail: *bundle.tail(),
        })?;
        if stored.is_none() {
            return Ok(false);
        }
        bundle.set_flag(BundleFlag::IsMilestone, true);
        info!(%index, tail = %bundle.tail(), "received valid milestone");
        self.ctx.raise_latest_milestone_index(index);
        self.ctx.events().received_valid_milestone(MilestoneEvent {
            index,
            tail: *bundle.tail(),
        });
        Ok(true)
    }

    fn load(&self, tail: &Hash, hash: &Hash) -> Result<CachedTransaction, ConsensusError> {
        self.ctx.storage().transaction(hash)?.ok_or_else(|| {
            InvalidMilestoneError::MissingTransaction {
                tail: *tail,
                missing: *hash,
            }
            .into()
        })
    }

    /// Recovers the signing address from the signature fragments and hashes it up the coordinator's tree.
    ///
    /// Milestones sign the hash of their siblings transaction, whose signature fragment carries the Merkle path.
    fn merkle_root(
        &self,
        signature_txs: &[CachedTransaction],
        siblings: &Transaction,
        leaf_index: u64,
    ) -> Result<Hash, ConsensusError> {
        let normalized = wots::normalize(&siblings.hash);
        let mut digests = Vec::with_capacity(signature_txs.len() * Hash::TRIT_LENGTH);
        for (i, tx) in signature_txs.iter().enumerate() {
            let fragment = i % wots::MAX_SECURITY_LEVEL;
            let normalized_fragment = &normalized
                [fragment * wots::NORMALIZED_FRAGMENT_LENGTH..(fragment + 1) * wots::NORMALIZED_FRAGMENT_LENGTH];
            digests.extend_from_slice(&wots::digest(normalized_fragment, &tx.signature_message_fragment)?);
        }
        let leaf = wots::address(&digests)?;
        let depth = self.ctx.config().coordinator.merkle_tree_depth as usize;
        Ok(merkle_root(
            &leaf,
            &siblings.signature_message_fragment,
            depth,
            leaf_index,
        )?)
    }
}
