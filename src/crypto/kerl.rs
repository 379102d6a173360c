// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use sha3::{Digest, Keccak384};
use thiserror::Error;

use crate::types::{Hash, TernaryError, Trit};

const HASH_LENGTH: usize = Hash::TRIT_LENGTH;
const BYTE_LENGTH: usize = 48;
const WORDS: usize = BYTE_LENGTH / 4;

#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KerlError {
    #[error("trit length {0} is not a multiple of 243")]
    InvalidLength(usize),
    #[error(transparent)]
    Ternary(#[from] TernaryError),
}

/// The Kerl sponge: Keccak-384 operating on 243-trit chunks.
#[derive(Clone, Default)]
pub struct Kerl {
    keccak: Keccak384,
}

impl Kerl {
    /// Creates a fresh sponge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorbs trits. The length must be a multiple of 243.
    pub fn absorb(&mut self, trits: &[Trit]) -> Result<(), KerlError> {
        if trits.len() % HASH_LENGTH != 0 {
            return Err(KerlError::InvalidLength(trits.len()));
        }
        for chunk in trits.chunks(HASH_LENGTH) {
            self.keccak.update(trits_to_bytes(chunk));
        }
        Ok(())
    }

    /// Squeezes trits into `out`. The length must be a multiple of 243.
    pub fn squeeze_into(&mut self, out: &mut [Trit]) -> Result<(), KerlError> {
        if out.len() % HASH_LENGTH != 0 {
            return Err(KerlError::InvalidLength(out.len()));
        }
        for chunk in out.chunks_mut(HASH_LENGTH) {
            let mut bytes = [0u8; BYTE_LENGTH];
            bytes.copy_from_slice(&self.keccak.finalize_reset());
            chunk.copy_from_slice(&bytes_to_trits(&bytes));
            for byte in bytes.iter_mut() {
                *byte = !*byte;
            }
            self.keccak.update(bytes);
        }
        Ok(())
    }

    /// Squeezes a single 243-trit hash.
    pub fn squeeze(&mut self) -> [Trit; HASH_LENGTH] {
        let mut out = [0; HASH_LENGTH];
        // Infallible for one hash length.
        let _ = self.squeeze_into(&mut out);
        out
    }

    /// Resets the sponge state.
    pub fn reset(&mut self) {
        Digest::reset(&mut self.keccak);
    }

    /// Hashes `trits` into a 243-trit digest.
    pub fn digest(trits: &[Trit]) -> Result<[Trit; HASH_LENGTH], KerlError> {
        let mut kerl = Self::new();
        kerl.absorb(trits)?;
        Ok(kerl.squeeze())
    }
}

/// Converts 243 trits into a 384-bit two's complement big-endian integer, ignoring the last trit.
fn trits_to_bytes(trits: &[Trit]) -> [u8; BYTE_LENGTH] {
    let mut words = [0u32; WORDS];
    for &trit in trits[..HASH_LENGTH - 1].iter().rev() {
        let mut carry = 0u64;
        for word in words.iter_mut() {
            let value = *word as u64 * 3 + carry;
            *word = value as u32;
            carry = value >> 32;
        }
        match trit {
            1 => add_one(&mut words),
            -1 => sub_one(&mut words),
            _ => {}
        }
    }
    let mut bytes = [0u8; BYTE_LENGTH];
    for (chunk, word) in bytes.chunks_mut(4).zip(words.iter().rev()) {
        chunk.copy_from_slice(&word.to_be_bytes());
    }
    bytes
}

/// Converts a 384-bit two's complement big-endian integer into 243 trits with the last trit zeroed.
fn bytes_to_trits(bytes: &[u8; BYTE_LENGTH]) -> [Trit; HASH_LENGTH] {
    let mut words = [0u32; WORDS];
    for (chunk, word) in bytes.chunks(4).zip(words.iter_mut().rev()) {
        *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    let negative = words[WORDS - 1] & 0x8000_0000 != 0;
    if negative {
        for word in words.iter_mut() {
            *word = !*word;
        }
        add_one(&mut words);
    }
    let mut trits = [0; HASH_LENGTH];
    for trit in trits.iter_mut().take(HASH_LENGTH - 1) {
        let mut rem = 0u64;
        for word in words.iter_mut().rev() {
            let value = (rem << 32) | *word as u64;
            *word = (value / 3) as u32;
            rem = value % 3;
        }
        let mut value = rem as Trit;
        if value == 2 {
            value = -1;
            add_one(&mut words);
        }
        *trit = if negative { -value } else { value };
    }
    trits
}

fn add_one(words: &mut [u32; WORDS]) {
    for word in words.iter_mut() {
        let (value, overflow) = word.overflowing_add(1);
        *word = value;
        if !overflow {
            break;
        }
    }
}

fn sub_one(words: &mut [u32; WORDS]) {
    for word in words.iter_mut() {
        let (value, underflow) = word.overflowing_sub(1);
        *word = value;
        if !underflow {
            break;
        }
    }
}
