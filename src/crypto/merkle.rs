// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use super::kerl::{Kerl, KerlError};
use crate::types::{Hash, Trit};

/// Computes the Merkle root reached from `leaf` at `leaf_index` through `siblings`.
///
/// `siblings` holds at least `depth` concatenated 243-trit hashes, lowest level first.
pub fn merkle_root(leaf: &Hash, siblings: &[Trit], depth: usize, leaf_index: u64) -> Result<Hash, KerlError> {
    let needed = depth * Hash::TRIT_LENGTH;
    if siblings.len() < needed {
        return Err(KerlError::InvalidLength(siblings.len()));
    }
    let mut node = leaf.trits();
    let mut index = leaf_index;
    let mut kerl = Kerl::new();
    for sibling in siblings[..needed].chunks(Hash::TRIT_LENGTH) {
        if index & 1 == 0 {
            kerl.absorb(&node)?;
            kerl.absorb(sibling)?;
        } else {
            kerl.absorb(sibling)?;
            kerl.absorb(&node)?;
        }
        node = kerl.squeeze();
        kerl.reset();
        index >>= 1;
    }
    Ok(Hash::from_trits(&node)?)
}
