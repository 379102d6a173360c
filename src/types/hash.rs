// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ternary::{self, TernaryError, Trit};

/// A 243-trit hash (transaction hash, address or bundle hash), packed into 49 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; Self::LENGTH]);

impl Hash {
    /// The packed length in bytes.
    pub const LENGTH: usize = 49;
    /// The length in trits.
    pub const TRIT_LENGTH: usize = 243;
    /// The length in trytes.
    pub const TRYTE_LENGTH: usize = 81;

    /// The all-zero hash, encoded as 81 `9` trytes.
    pub const fn null() -> Self {
        Self([0; Self::LENGTH])
    }

    /// Returns true if this is the null hash.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Builds a hash from exactly 243 trits.
    pub fn from_trits(trits: &[Trit]) -> Result<Self, TernaryError> {
        if trits.len() != Self::TRIT_LENGTH {
            return Err(TernaryError::InvalidLength {
                expected: Self::TRIT_LENGTH,
                actual: trits.len(),
            });
        }
        ternary::validate_trits(trits)?;
        let mut bytes = [0; Self::LENGTH];
        bytes.copy_from_slice(&ternary::encode_t5b1(trits));
        Ok(Self(bytes))
    }

    /// Builds a hash from its packed representation, checking that every byte is well formed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TernaryError> {
        ternary::decode_t5b1(bytes, Self::TRIT_LENGTH)?;
        let mut packed = [0; Self::LENGTH];
        packed.copy_from_slice(bytes);
        Ok(Self(packed))
    }

    /// Builds a hash from 81 trytes.
    pub fn from_trytes(trytes: &str) -> Result<Self, TernaryError> {
        if trytes.len() != Self::TRYTE_LENGTH {
            return Err(TernaryError::InvalidLength {
                expected: Self::TRYTE_LENGTH,
                actual: trytes.len(),
            });
        }
        Self::from_trits(&ternary::trytes_to_trits(trytes)?)
    }

    /// The packed bytes.
    pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }

    /// Unpacks the hash into its 243 trits.
    pub fn trits(&self) -> [Trit; Self::TRIT_LENGTH] {
        let mut trits = [0; Self::TRIT_LENGTH];
        for (i, byte) in self.0.iter().enumerate() {
            let mut value = *byte as i8 as i16;
            for j in 0..ternary::TRITS_PER_BYTE {
                let index = i * ternary::TRITS_PER_BYTE + j;
                if index >= Self::TRIT_LENGTH {
                    break;
                }
                let mut rem = value % 3;
                value /= 3;
                if rem == 2 {
                    rem = -1;
                    value += 1;
                } else if rem == -2 {
                    rem = 1;
                    value -= 1;
                }
                trits[index] = rem as Trit;
            }
        }
        trits
    }

    /// Encodes the hash as 81 trytes.
    pub fn to_trytes(&self) -> String {
        ternary::trits_to_trytes(&self.trits())
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_trytes())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_trytes())
    }
}

impl FromStr for Hash {
    type Err = TernaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_trytes(s)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let trytes = String::deserialize(deserializer)?;
        trytes.parse().map_err(serde::de::Error::custom)
    }
}
