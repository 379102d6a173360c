// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Module containing the ternary hash function and the coordinator signature scheme.

mod kerl;
mod merkle;
pub mod wots;

pub use self::{
    kerl::{Kerl, KerlError},
    merkle::merkle_root,
};
