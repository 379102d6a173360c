// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Module containing the milestone record and the coordinator signature checks.

mod validator;

pub use self::validator::{InvalidMilestoneError, MilestoneValidator};
use crate::{
    storage::{StorableObject, StorageError},
    types::{Hash, MilestoneIndex},
};

/// An accepted milestone, pointing at the tail of its bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Milestone {
    /// The milestone index.
    pub index: MilestoneIndex,
    /// The tail transaction of the milestone bundle.
    pub tail: Hash,
}

impl StorableObject for Milestone {
    const KIND: &'static str = "milestone";

    fn key(&self) -> Vec<u8> {
        self.index.to_le_bytes().to_vec()
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.tail.as_bytes().to_vec()
    }

    fn from_bytes(key: &[u8], value: &[u8]) -> Result<Self, StorageError> {
        let index: [u8; MilestoneIndex::LENGTH] = key
            .try_into()
            .map_err(|_| StorageError::malformed(Self::KIND, "key is not a 4 byte index"))?;
        Ok(Self {
            index: MilestoneIndex::from_le_bytes(index),
            tail: Hash::from_bytes(value)?,
        })
    }
}
