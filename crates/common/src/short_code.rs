//! Reversible short codes for 64-bit identifiers.
//!
//! A short code is a 64-bit identifier passed through a three-round Feistel
//! permutation and rendered in base62. The permutation hides sequential ids
//! from casual inspection; it is NOT authenticated and anyone who knows the
//! round keys can invert it. Never use a short code where forgery resistance
//! matters; the meeting token cipher exists for that.
//!
//! # Example
//!
//! ```rust
//! use common::short_code::{from_short_code, short_code};
//!
//! let code = short_code(12_345);
//! assert_eq!(from_short_code(&code), Ok(12_345));
//! ```

use thiserror::Error;

/// Base62 alphabet: digits, lowercase, uppercase.
pub const BASE62_ALPHABET: &[u8; 62] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

const BASE: u64 = 62;

/// Round keys, applied in order by [`permute`] and in reverse by [`unpermute`].
const ROUND_KEYS: [u32; 3] = [0x5a4f_7831, 0xd8e9_c4b7, 0x9a8b_7c6d];

/// Errors from decoding a base62 short code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShortCodeError {
    /// The code contains a character outside [`BASE62_ALPHABET`].
    #[error("Invalid character in base62 code: {0:?}")]
    InvalidCharacter(char),

    /// The decoded value does not fit in 64 unsigned bits.
    #[error("Base62 code overflows a 64-bit value")]
    Overflow,
}

fn round_function(r: u32, key: u32) -> u32 {
    r.rotate_left(13).wrapping_add(r ^ key)
}

#[allow(clippy::cast_possible_truncation)] // splitting into 32-bit halves
fn split(value: u64) -> (u32, u32) {
    ((value >> 32) as u32, value as u32)
}

fn join(left: u32, right: u32) -> u64 {
    (u64::from(left) << 32) | u64::from(right)
}

/// Apply the three-round Feistel permutation to `id`.
#[must_use]
pub fn permute(id: u64) -> u64 {
    let (mut left, mut right) = split(id);

    for key in ROUND_KEYS {
        let next = left ^ round_function(right, key);
        left = right;
        right = next;
    }

    join(left, right)
}

/// Invert [`permute`].
#[must_use]
pub fn unpermute(value: u64) -> u64 {
    let (mut left, mut right) = split(value);

    for key in ROUND_KEYS.iter().rev() {
        let previous = right ^ round_function(left, *key);
        right = left;
        left = previous;
    }

    join(left, right)
}

/// Render `value` in base62, most significant digit first.
///
/// Zero renders as a single `"0"`.
#[must_use]
pub fn encode(value: u64) -> String {
    if value == 0 {
        return char::from(BASE62_ALPHABET[0]).to_string();
    }

    let mut digits = Vec::with_capacity(11);
    let mut rest = value;
    while rest > 0 {
        // rest % 62 is always a valid alphabet index
        #[allow(clippy::cast_possible_truncation, clippy::indexing_slicing)]
        digits.push(BASE62_ALPHABET[(rest % BASE) as usize]);
        rest /= BASE;
    }

    digits.iter().rev().map(|&b| char::from(b)).collect()
}

fn digit_value(ch: char) -> Option<u64> {
    let offset = match ch {
        '0'..='9' => u64::from(ch) - u64::from('0'),
        'a'..='z' => 10 + u64::from(ch) - u64::from('a'),
        'A'..='Z' => 36 + u64::from(ch) - u64::from('A'),
        _ => return None,
    };
    Some(offset)
}

/// Decode a base62 string produced by [`encode`].
///
/// # Errors
///
/// - [`ShortCodeError::InvalidCharacter`] for characters outside the alphabet
/// - [`ShortCodeError::Overflow`] if the value exceeds `u64::MAX`
pub fn decode(code: &str) -> Result<u64, ShortCodeError> {
    let mut value: u64 = 0;

    for ch in code.chars() {
        let digit = digit_value(ch).ok_or(ShortCodeError::InvalidCharacter(ch))?;

        // Checked before the multiply-add so it can never wrap.
        if value > (u64::MAX - digit) / BASE {
            return Err(ShortCodeError::Overflow);
        }
        value = value * BASE + digit;
    }

    Ok(value)
}

/// Permute a signed identifier and render it as a short code.
#[must_use]
#[allow(clippy::cast_sign_loss)] // bit reinterpretation
pub fn short_code(id: i64) -> String {
    encode(permute(id as u64))
}

/// Recover the identifier behind a short code.
///
/// # Errors
///
/// Propagates [`decode`] failures.
#[allow(clippy::cast_possible_wrap)] // bit reinterpretation
pub fn from_short_code(code: &str) -> Result<i64, ShortCodeError> {
    decode(code).map(|value| unpermute(value) as i64)
}
