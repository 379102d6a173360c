// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

#![warn(missing_docs)]

//! Consensus core of a ternary tangle node: bundle assembly and validation, coordinator milestone verification,
//! the balance ledger with white-flag confirmation and heaviest branch tip selection.

pub mod bundle;
pub mod crypto;
pub mod engine;
/// Module containing the crate-wide error types.
pub mod error;
pub mod ledger;
pub mod milestone;
pub mod storage;
pub mod tipselect;
pub mod types;

pub use self::{
    engine::{ConsensusContext, ConsensusEngine, EngineConfig, Snapshot},
    error::{ConsensusError, CorruptionError},
};
