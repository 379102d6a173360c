// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Winternitz one-time signature primitives over Kerl.

use super::kerl::{Kerl, KerlError};
use crate::types::{ternary::MAX_TRYTE_VALUE, Hash, Trit, SIGNATURE_FRAGMENT_TRIT_LENGTH};

/// Number of 243-trit key segments per signature fragment.
pub const SEGMENTS_PER_FRAGMENT: usize = 27;
/// Number of normalized trytes covered by one signature fragment.
pub const NORMALIZED_FRAGMENT_LENGTH: usize = SEGMENTS_PER_FRAGMENT;
/// Maximum supported security level.
pub const MAX_SECURITY_LEVEL: usize = 3;

const SEGMENT_LENGTH: usize = Hash::TRIT_LENGTH;

/// Normalizes a bundle hash into 81 tryte values, so that each 27-tryte fragment sums to zero.
pub fn normalize(hash: &Hash) -> [i8; Hash::TRYTE_LENGTH] {
    let trits = hash.trits();
    let mut normalized = [0i8; Hash::TRYTE_LENGTH];
    for (value, tryte) in normalized.iter_mut().zip(trits.chunks(3)) {
        *value = tryte[0] + 3 * tryte[1] + 9 * tryte[2];
    }
    for fragment in normalized.chunks_mut(NORMALIZED_FRAGMENT_LENGTH) {
        let mut sum: i32 = fragment.iter().map(|v| *v as i32).sum();
        while sum > 0 {
            if let Some(value) = fragment.iter_mut().find(|v| **v > -MAX_TRYTE_VALUE) {
                *value -= 1;
            }
            sum -= 1;
        }
        while sum < 0 {
            if let Some(value) = fragment.iter_mut().find(|v| **v < MAX_TRYTE_VALUE) {
                *value += 1;
            }
            sum += 1;
        }
    }
    normalized
}

/// Hashes `segment` in place `rounds` times.
fn hash_chain(segment: &mut [Trit], rounds: usize) -> Result<(), KerlError> {
    let mut kerl = Kerl::new();
    for _ in 0..rounds {
        kerl.absorb(segment)?;
        kerl.squeeze_into(segment)?;
        kerl.reset();
    }
    Ok(())
}

/// Recomputes the key digest from a signature fragment and the normalized fragment it signs.
pub fn digest(normalized_fragment: &[i8], signature_fragment: &[Trit]) -> Result<[Trit; Hash::TRIT_LENGTH], KerlError> {
    if signature_fragment.len() != SIGNATURE_FRAGMENT_TRIT_LENGTH {
        return Err(KerlError::InvalidLength(signature_fragment.len()));
    }
    let mut digest = Kerl::new();
    let mut buffer = [0; SEGMENT_LENGTH];
    for (segment, value) in signature_fragment.chunks(SEGMENT_LENGTH).zip(normalized_fragment) {
        buffer.copy_from_slice(segment);
        hash_chain(&mut buffer, (MAX_TRYTE_VALUE + *value) as usize)?;
        digest.absorb(&buffer)?;
    }
    Ok(digest.squeeze())
}

/// Signs a normalized fragment with a key fragment.
pub fn sign_fragment(normalized_fragment: &[i8], key_fragment: &[Trit]) -> Result<Vec<Trit>, KerlError> {
    if key_fragment.len() != SIGNATURE_FRAGMENT_TRIT_LENGTH {
        return Err(KerlError::InvalidLength(key_fragment.len()));
    }
    let mut signature = key_fragment.to_vec();
    for (segment, value) in signature.chunks_mut(SEGMENT_LENGTH).zip(normalized_fragment) {
        hash_chain(segment, (MAX_TRYTE_VALUE - *value) as usize)?;
    }
    Ok(signature)
}

/// Computes the public digest of a key fragment.
///
/// A key fragment is its own signature for the all-maximum normalized fragment.
pub fn key_digest(key_fragment: &[Trit]) -> Result<[Trit; Hash::TRIT_LENGTH], KerlError> {
    digest(&[MAX_TRYTE_VALUE; NORMALIZED_FRAGMENT_LENGTH], key_fragment)
}

/// Derives an address from the concatenated fragment digests.
pub fn address(digests: &[Trit]) -> Result<Hash, KerlError> {
    Ok(Hash::from_trits(&Kerl::digest(digests)?)?)
}
