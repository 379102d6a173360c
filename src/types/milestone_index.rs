// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::{fmt, num::ParseIntError, ops, str::FromStr};

use derive_more::{Add, Deref, DerefMut, Sub};
use serde::{Deserialize, Serialize};

/// The index of a coordinator milestone.
#[derive(
    Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize, Add, Sub, Deref, DerefMut,
)]
#[serde(transparent)]
pub struct MilestoneIndex(pub u32);

impl MilestoneIndex {
    /// The encoded length of an index used as a storage key.
    pub const LENGTH: usize = 4;

    /// Encodes the index as a little-endian storage key.
    pub fn to_le_bytes(self) -> [u8; Self::LENGTH] {
        self.0.to_le_bytes()
    }

    /// Decodes an index from a little-endian storage key.
    pub fn from_le_bytes(bytes: [u8; Self::LENGTH]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }
}

impl fmt::Display for MilestoneIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u32> for MilestoneIndex {
    fn from(value: u32) -> Self {
        MilestoneIndex(value)
    }
}

impl From<MilestoneIndex> for u32 {
    fn from(value: MilestoneIndex) -> Self {
        value.0
    }
}

impl ops::Add<u32> for MilestoneIndex {
    type Output = Self;

    fn add(self, x: u32) -> Self {
        MilestoneIndex(self.0 + x)
    }
}

impl ops::AddAssign<u32> for MilestoneIndex {
    fn add_assign(&mut self, x: u32) {
        self.0 += x
    }
}

impl ops::Sub<u32> for MilestoneIndex {
    type Output = Self;

    fn sub(self, x: u32) -> Self {
        MilestoneIndex(self.0 - x)
    }
}

impl PartialEq<u32> for MilestoneIndex {
    fn eq(&self, x: &u32) -> bool {
        self.0 == *x
    }
}

impl PartialEq<MilestoneIndex> for u32 {
    fn eq(&self, x: &MilestoneIndex) -> bool {
        *self == x.0
    }
}

impl FromStr for MilestoneIndex {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(u32::from_str(s)?.into())
    }
}
