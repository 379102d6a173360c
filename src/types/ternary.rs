// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Balanced ternary helpers: trits, trytes, T5B1 byte packing and integer conversion.

use thiserror::Error;

/// A balanced trit, one of `-1`, `0` or `1`.
pub type Trit = i8;

/// The tryte alphabet, indexed by the unsigned tryte value.
pub const TRYTE_ALPHABET: &[u8; 27] = b"9ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// The number of trits in a tryte.
pub const TRITS_PER_TRYTE: usize = 3;

/// The number of trits packed into a single byte.
pub const TRITS_PER_BYTE: usize = 5;

/// Maximum absolute value of a single tryte.
pub const MAX_TRYTE_VALUE: i8 = 13;

#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TernaryError {
    #[error("invalid tryte character `{0}`")]
    InvalidTryte(char),
    #[error("invalid trit value {0}")]
    InvalidTrit(i8),
    #[error("invalid packed trit byte {0:#04x}")]
    InvalidByte(u8),
    #[error("integer does not fit into {0} trits")]
    Overflow(usize),
    #[error("invalid length: expected {expected}, found {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Returns the number of bytes needed to pack `num_trits` trits.
pub const fn packed_len(num_trits: usize) -> usize {
    (num_trits + TRITS_PER_BYTE - 1) / TRITS_PER_BYTE
}

/// Converts a tryte character into its three trits.
pub fn tryte_to_trits(tryte: char) -> Result<[Trit; 3], TernaryError> {
    let position = TRYTE_ALPHABET
        .iter()
        .position(|&c| c as char == tryte)
        .ok_or(TernaryError::InvalidTryte(tryte))? as i8;
    let value = if position > MAX_TRYTE_VALUE { position - 27 } else { position };
    let mut trits = [0; 3];
    write_balanced(value as i64, &mut trits);
    Ok(trits)
}

/// Converts a tryte string into trits.
pub fn trytes_to_trits(trytes: &str) -> Result<Vec<Trit>, TernaryError> {
    let mut trits = Vec::with_capacity(trytes.len() * TRITS_PER_TRYTE);
    for c in trytes.chars() {
        trits.extend_from_slice(&tryte_to_trits(c)?);
    }
    Ok(trits)
}

/// Converts trits into a tryte string. A trailing partial tryte is padded with zero trits.
pub fn trits_to_trytes(trits: &[Trit]) -> String {
    trits
        .chunks(TRITS_PER_TRYTE)
        .map(|chunk| {
            let value = chunk.iter().rev().fold(0i8, |acc, &t| acc * 3 + t);
            let position = if value < 0 { value + 27 } else { value };
            TRYTE_ALPHABET[position as usize] as char
        })
        .collect()
}

/// Checks that every element is a valid balanced trit.
pub fn validate_trits(trits: &[Trit]) -> Result<(), TernaryError> {
    match trits.iter().find(|t| !(-1..=1).contains(*t)) {
        Some(&t) => Err(TernaryError::InvalidTrit(t)),
        None => Ok(()),
    }
}

/// Interprets trits (least significant first) as a balanced integer.
///
/// Returns `None` if the value does not fit into an `i64`.
pub fn trits_to_int(trits: &[Trit]) -> Option<i64> {
    trits
        .iter()
        .rev()
        .try_fold(0i64, |acc, &t| acc.checked_mul(3)?.checked_add(t as i64))
}

/// Encodes `value` into `len` balanced trits (least significant first).
///
/// Returns `None` if the value cannot be represented in `len` trits.
pub fn int_to_trits(value: i64, len: usize) -> Option<Vec<Trit>> {
    let mut trits = vec![0; len];
    write_balanced(value, &mut trits).then_some(trits)
}

/// Writes the balanced representation of `value` into `out`, returning `false` if it did not fit.
fn write_balanced(value: i64, out: &mut [Trit]) -> bool {
    let negative = value < 0;
    let mut magnitude = value.unsigned_abs();
    for trit in out.iter_mut() {
        if magnitude == 0 {
            *trit = 0;
            continue;
        }
        let mut rem = (magnitude % 3) as i8;
        magnitude /= 3;
        if rem == 2 {
            rem = -1;
            magnitude += 1;
        }
        *trit = if negative { -rem } else { rem };
    }
    magnitude == 0
}

/// Packs trits into bytes, five trits per byte.
pub fn encode_t5b1(trits: &[Trit]) -> Vec<u8> {
    trits
        .chunks(TRITS_PER_BYTE)
        .map(|chunk| chunk.iter().rev().fold(0i8, |acc, &t| acc * 3 + t) as u8)
        .collect()
}

/// Unpacks `num_trits` trits from T5B1 bytes.
pub fn decode_t5b1(bytes: &[u8], num_trits: usize) -> Result<Vec<Trit>, TernaryError> {
    let expected = packed_len(num_trits);
    if bytes.len() != expected {
        return Err(TernaryError::InvalidLength {
            expected,
            actual: bytes.len(),
        });
    }
    let mut trits = vec![0; expected * TRITS_PER_BYTE];
    for (byte, out) in bytes.iter().zip(trits.chunks_mut(TRITS_PER_BYTE)) {
        let value = *byte as i8;
        if !(-121..=121).contains(&value) {
            return Err(TernaryError::InvalidByte(*byte));
        }
        write_balanced(value as i64, out);
    }
    // Padding trits of the last byte must be zero.
    if trits[num_trits..].iter().any(|t| *t != 0) {
        return Err(TernaryError::InvalidByte(bytes[expected - 1]));
    }
    trits.truncate(num_trits);
    Ok(trits)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tryte_values() {
        assert_eq!(tryte_to_trits('9').unwrap(), [0, 0, 0]);
        assert_eq!(tryte_to_trits('A').unwrap(), [1, 0, 0]);
        assert_eq!(tryte_to_trits('M').unwrap(), [1, 1, 1]);
        assert_eq!(tryte_to_trits('N').unwrap(), [-1, -1, -1]);
        assert_eq!(tryte_to_trits('Z').unwrap(), [-1, 0, 0]);
        assert_eq!(tryte_to_trits('a'), Err(TernaryError::InvalidTryte('a')));
    }

    #[test]
    fn trytes_round_trip() {
        let trytes = "HELLOWORLD9NZ";
        assert_eq!(trits_to_trytes(&trytes_to_trits(trytes).unwrap()), trytes);
    }

    #[test]
    fn balanced_integers() {
        assert_eq!(int_to_trits(0, 4).unwrap(), vec![0, 0, 0, 0]);
        assert_eq!(int_to_trits(2, 3).unwrap(), vec![-1, 1, 0]);
        assert_eq!(int_to_trits(-5, 3).unwrap(), vec![1, 1, -1]);
        assert_eq!(int_to_trits(14, 3), None);
        for value in [-1_000_000i64, -42, -1, 0, 1, 13, 2_779_530_283_277_761] {
            assert_eq!(trits_to_int(&int_to_trits(value, 81).unwrap()), Some(value));
        }
        assert_eq!(trits_to_int(&[1; 81]), None);
    }

    #[test]
    fn t5b1_packing() {
        let trits = vec![1, -1, 0, 1, 1, -1, -1, 1];
        let bytes = encode_t5b1(&trits);
        assert_eq!(bytes.len(), 2);
        assert_eq!(decode_t5b1(&bytes, trits.len()).unwrap(), trits);
        assert_eq!(decode_t5b1(&[122], 5), Err(TernaryError::InvalidByte(122)));
        // 9 = 0 + 0*3 + 1*9 sets the third trit, which is padding for a 2-trit slice.
        assert_eq!(decode_t5b1(&[9], 2), Err(TernaryError::InvalidByte(9)));
    }
}
