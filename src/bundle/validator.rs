// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::{Bundle, BundleFlag, LedgerChanges};
use crate::{
    crypto::{Kerl, KerlError},
    engine::ConsensusContext,
    error::{ConsensusError, CorruptionError},
    storage::CachedTransaction,
    types::{Hash, Transaction},
};

/// Why a complete set of transactions does not form a valid bundle.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidBundleError {
    #[error("bundle has no transactions")]
    Empty,
    #[error("transaction {hash} at position {position} declares index {current_index}")]
    IndexMismatch {
        hash: Hash,
        position: usize,
        current_index: u64,
    },
    #[error("transaction {hash} declares last index {last_index}, expected {expected}")]
    LastIndexMismatch { hash: Hash, last_index: u64, expected: u64 },
    #[error("transaction {0} belongs to a different bundle")]
    BundleHashMismatch(Hash),
    #[error("trunk of transaction {0} does not reference the next member")]
    BrokenTrunkChain(Hash),
    #[error("value {value} of transaction {hash} exceeds the total supply")]
    ValueOutOfRange { hash: Hash, value: i64 },
    #[error("values sum to {0}")]
    NonZeroSum(i128),
    #[error("declared bundle hash {declared} does not match essence hash {computed}")]
    EssenceHashMismatch { declared: Hash, computed: Hash },
    #[error("essence cannot be hashed: {0}")]
    Essence(#[from] KerlError),
}

/// Checks the signature-independent integrity rules of a bundle given its members ordered tail to head.
pub fn check_bundle_integrity(transactions: &[&Transaction], total_supply: u64) -> Result<(), InvalidBundleError> {
    let Some(tail) = transactions.first() else {
        return Err(InvalidBundleError::Empty);
    };
    let last_index = transactions.len() as u64 - 1;
    let mut sum = 0i128;
    let mut kerl = Kerl::new();

    for (position, tx) in transactions.iter().enumerate() {
        if tx.current_index != position as u64 {
            return Err(InvalidBundleError::IndexMismatch {
                hash: tx.hash,
                position,
                current_index: tx.current_index,
            });
        }
        if tx.last_index != last_index {
            return Err(InvalidBundleError::LastIndexMismatch {
                hash: tx.hash,
                last_index: tx.last_index,
                expected: last_index,
            });
        }
        if tx.bundle != tail.bundle {
            return Err(InvalidBundleError::BundleHashMismatch(tx.hash));
        }
        if let Some(next) = transactions.get(position + 1) {
            if tx.trunk != next.hash {
                return Err(InvalidBundleError::BrokenTrunkChain(tx.hash));
            }
        }
        if tx.value.unsigned_abs() > total_supply {
            return Err(InvalidBundleError::ValueOutOfRange {
                hash: tx.hash,
                value: tx.value,
            });
        }
        sum += tx.value as i128;
        kerl.absorb(&tx.essence_trits().map_err(KerlError::from)?)?;
    }

    if sum != 0 {
        return Err(InvalidBundleError::NonZeroSum(sum));
    }
    let computed = Hash::from_trits(&kerl.squeeze()).map_err(KerlError::from)?;
    if computed != tail.bundle {
        return Err(InvalidBundleError::EssenceHashMismatch {
            declared: tail.bundle,
            computed,
        });
    }
    Ok(())
}

/// Validates complete bundles and derives their ledger mutation.
pub struct BundleValidator {
    ctx: Arc<ConsensusContext>,
}

impl BundleValidator {
    #[allow(missing_docs)]
    pub fn new(ctx: Arc<ConsensusContext>) -> Self {
        Self { ctx }
    }

    /// Loads the member transactions of a bundle. Every member of a stored bundle must be present.
    fn load_transactions(&self, bundle: &Bundle) -> Result<Vec<CachedTransaction>, ConsensusError> {
        let storage = self.ctx.storage();
        let mut transactions = Vec::with_capacity(bundle.transactions().len());
        for hash in bundle.transactions() {
            transactions.push(
                storage
                    .transaction(hash)?
                    .ok_or(CorruptionError::MissingTransaction(*hash))?,
            );
        }
        Ok(transactions)
    }

    /// Validates a bundle, setting its `Valid` flag.
    ///
    /// Incomplete bundles and integrity violations yield `Ok(false)`. Strict semantics are evaluated separately by
    /// [`Self::check_strict_semantics`] once it is known whether the bundle is a milestone.
    pub fn validate(&self, bundle: &Bundle) -> Result<bool, ConsensusError> {
        if !bundle.is_complete() {
            return Ok(false);
        }
        if bundle.is_valid() {
            return Ok(true);
        }

        let transactions = self.load_transactions(bundle)?;
        let members = transactions.iter().map(|tx| &**tx).collect::<Vec<_>>();
        if let Err(e) = check_bundle_integrity(&members, self.ctx.config().ledger.total_supply) {
            debug!(tail = %bundle.tail(), "invalid bundle: {}", e);
            return Ok(false);
        }
        bundle.set_flag(BundleFlag::Valid, true);
        Ok(true)
    }

    /// Sets the `ValidStrictSemantics` flag of a valid bundle. Milestones pass without inspection.
    pub fn check_strict_semantics(&self, bundle: &Bundle) -> Result<bool, ConsensusError> {
        let strict = if bundle.is_milestone() {
            true
        } else {
            let transactions = self.load_transactions(bundle)?;
            let members = transactions.iter().map(|tx| &**tx).collect::<Vec<_>>();
            self.has_strict_semantics(&members)?
        };
        bundle.set_flag(BundleFlag::ValidStrictSemantics, strict);
        Ok(strict)
    }

    /// Every non-head member must branch to the head's trunk and the head may only approve tails or solid entry
    /// points.
    fn has_strict_semantics(&self, members: &[&Transaction]) -> Result<bool, ConsensusError> {
        let Some(head) = members.last() else {
            return Ok(false);
        };
        if let Some(tx) = members[..members.len() - 1]
            .iter()
            .find(|tx| tx.branch != head.trunk)
        {
            debug!(hash = %tx.hash, "branch does not reference the head's trunk");
            return Ok(false);
        }

        let storage = self.ctx.storage();
        for approvee in [head.trunk, head.branch] {
            if self.ctx.solid_entry_points().contains(&approvee) {
                continue;
            }
            match storage.transaction(&approvee)? {
                Some(tx) if tx.is_tail() => {}
                Some(tx) => {
                    debug!(head = %head.hash, approvee = %tx.hash, "head approves a non-tail transaction");
                    return Ok(false);
                }
                None => {
                    warn!(head = %head.hash, %approvee, "approvee of a bundle head is missing");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Accumulates the per-address value deltas of a bundle and classifies it as value spam if none remain.
    pub fn calc_ledger_changes(&self, bundle: &Bundle) -> Result<(), ConsensusError> {
        let mut changes = LedgerChanges::new();
        for tx in self.load_transactions(bundle)? {
            if tx.value != 0 {
                let delta = changes.entry(tx.address).or_default();
                *delta = delta.saturating_add(tx.value);
            }
        }
        changes.retain(|_, delta| *delta != 0);

        let value_spam = changes.is_empty();
        bundle.set_ledger_changes(changes);
        bundle.set_flag(BundleFlag::IsValueSpam, value_spam);
        Ok(())
    }

    /// Records the addresses a bundle spends from and publishes one event per address.
    pub fn mark_spent_addresses(&self, bundle: &Bundle) -> Result<(), ConsensusError> {
        if bundle.is_value_spam() {
            return Ok(());
        }
        let enabled = self.ctx.config().ledger.spent_addresses_enabled;
        for (address, delta) in bundle.ledger_changes() {
            if delta >= 0 {
                continue;
            }
            if enabled {
                self.ctx.storage().mark_address_spent(&address)?;
            }
            self.ctx.events().address_spent(address);
        }
        Ok(())
    }
}
