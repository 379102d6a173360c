// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::{
    crypto::KerlError,
    engine::EngineConfigError,
    ledger::LedgerError,
    milestone::InvalidMilestoneError,
    storage::StorageError,
    tipselect::TipSelectionError,
    types::{Hash, MilestoneIndex},
};

/// A violated ledger or tangle invariant. Continuing after one of these risks an inconsistent ledger, so hosts are
/// expected to stop and restart from a snapshot.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CorruptionError {
    #[error("transaction {0} is missing although its bundle requires it")]
    MissingTransaction(Hash),
    #[error("bundle of tail {0} is missing")]
    MissingBundle(Hash),
    #[error("solid tail {0} does not lead to a bundle")]
    UnassemblableSolidTail(Hash),
    #[error("balance of {address} would become negative at milestone {index}")]
    NegativeBalance { address: Hash, index: MilestoneIndex },
    #[error("ledger diff of milestone {index} sums to {sum}")]
    UnbalancedDiff { index: MilestoneIndex, sum: i128 },
    #[error("total supply mismatch at milestone {index}: expected {expected}, found {actual}")]
    SupplyMismatch {
        index: MilestoneIndex,
        expected: u64,
        actual: u128,
    },
    #[error("milestone {index} references invalid bundle {tail}")]
    ApprovedInvalidBundle { index: MilestoneIndex, tail: Hash },
    #[error("milestone {index} references {hash}, which is not a tail")]
    ApprovedNonTail { index: MilestoneIndex, hash: Hash },
    #[error("ledger index {ledger} does not match solid index {solid}")]
    LedgerIndexMismatch { ledger: MilestoneIndex, solid: MilestoneIndex },
}

/// The error type of the consensus engine.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("corruption: {0}")]
    Corruption(#[from] CorruptionError),
    #[error("invalid milestone: {0}")]
    InvalidMilestone(#[from] InvalidMilestoneError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    TipSelection(#[from] TipSelectionError),
    #[error("hashing failed: {0}")]
    Kerl(#[from] KerlError),
    #[error("invalid configuration: {0}")]
    Config(#[from] EngineConfigError),
    #[error("milestone {0} is unknown")]
    UnknownMilestone(MilestoneIndex),
    #[error("milestone {index} cannot be confirmed, next is {expected}")]
    NotNextMilestone {
        index: MilestoneIndex,
        expected: MilestoneIndex,
    },
}

impl ConsensusError {
    /// Whether the error signals corrupted state rather than bad input.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Corruption(_) => true,
            Self::Storage(e) => e.is_fatal(),
            Self::Ledger(e) => e.is_fatal(),
            _ => false,
        }
    }
}
