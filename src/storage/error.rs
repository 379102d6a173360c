// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::types::{Hash, TernaryError};

/// The storage error type.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("malformed {kind} record: {reason}")]
    MalformedRecord { kind: &'static str, reason: String },
    #[error("malformed ternary data: {0}")]
    Ternary(#[from] TernaryError),
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("rejected transaction {hash}: {reason}")]
    InvalidTransaction { hash: Hash, reason: String },
}

impl StorageError {
    pub(crate) fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            kind,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_transaction(hash: Hash, reason: impl Into<String>) -> Self {
        Self::InvalidTransaction {
            hash,
            reason: reason.into(),
        }
    }

    /// Whether the error points at stored state rather than at a rejected input.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidTransaction { .. })
    }
}
