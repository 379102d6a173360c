// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Module that contains the tangle data types.

mod hash;
mod milestone_index;
pub mod ternary;
mod transaction;

pub use self::{
    hash::Hash,
    milestone_index::MilestoneIndex,
    ternary::{TernaryError, Trit},
    transaction::{
        Tag, Transaction, ESSENCE_TRIT_LENGTH, INDEX_TRIT_LENGTH, MAX_INDEX_VALUE, SIGNATURE_FRAGMENT_TRIT_LENGTH,
        TAG_TRIT_LENGTH, VALUE_TRIT_LENGTH,
    },
};
