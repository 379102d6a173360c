// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Module containing the heaviest branch tip selection.

mod bitset;
mod config;
mod heaviest;

use thiserror::Error;

pub use self::{
    bitset::BitSet,
    config::{
        HeaviestSelectorConfig, DEFAULT_BELOW_MAX_DEPTH, DEFAULT_MAX_TIPS_PER_CHECKPOINT, DEFAULT_RANDOM_TIPS_PER_CHECKPOINT,
        DEFAULT_SELECTION_TIMEOUT, DEFAULT_UNREFERENCED_MESSAGES_THRESHOLD,
    },
    heaviest::{HeaviestSelector, MessageMetadata},
};

#[allow(missing_docs)]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TipSelectionError {
    #[error("no tips available")]
    NoTipsAvailable,
    #[error("node is not synced")]
    NodeNotSynced,
}
