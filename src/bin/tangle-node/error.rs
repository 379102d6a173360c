// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use tangle_consensus::ConsensusError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
}
