//! Fractional indexing for sibling block ordering
//!
//! Every block carries a string `position`. Siblings under the same parent are
//! ordered by plain byte comparison of that string, so a new block can always be
//! placed between two neighbors by minting a key strictly between theirs. No
//! sibling ever has its key rewritten.
//!
//! Keys use a base-62 alphabet whose byte order matches its rank order:
//! `0-9`, then `A-Z`, then `a-z`.
//!
//! # Examples
//!
//! ```rust
//! use pagespace_core::db::FractionalIndex;
//!
//! let first = FractionalIndex::generate(None, None).unwrap();
//! assert_eq!(first, "a0");
//!
//! let next = FractionalIndex::generate(Some(&first), None).unwrap();
//! assert_eq!(next, "a1");
//!
//! let between = FractionalIndex::generate(Some(&first), Some(&next)).unwrap();
//! assert!(first < between && between < next);
//! ```

use std::cmp::Ordering;
use thiserror::Error;

const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const MIN_RANK: usize = 0;
const MAX_RANK: usize = ALPHABET.len() - 1;
const MID_RANK: usize = ALPHABET.len() / 2;

/// Smallest character that still leaves room below it once appended.
const GROWTH_RANK: usize = 1;

/// Key assigned to the first block of an empty sibling list
pub const FIRST_KEY: &str = "a0";

/// Key returned when inserting before [`FIRST_KEY`]
const BEFORE_FIRST_KEY: &str = "Z";

/// Errors produced while generating order keys
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    /// `before` does not sort strictly below `after`
    #[error("Invalid position range: '{before}' must sort before '{after}'")]
    InvalidRange { before: String, after: String },

    /// Key is empty or contains characters outside the base-62 alphabet
    #[error("Invalid position key: '{key}'")]
    InvalidKey { key: String },

    /// Keys are ordered but no key exists between them
    #[error("No position key exists between '{before}' and '{after}'")]
    NoRoom { before: String, after: String },
}

impl PositionError {
    fn invalid_range(before: &str, after: &str) -> Self {
        Self::InvalidRange {
            before: before.to_string(),
            after: after.to_string(),
        }
    }

    fn no_room(before: &str, after: &str) -> Self {
        Self::NoRoom {
            before: before.to_string(),
            after: after.to_string(),
        }
    }
}

/// Generates order keys between two existing sibling keys
pub struct FractionalIndex;

impl FractionalIndex {
    /// Generate a key strictly between `before` and `after`
    ///
    /// - `(None, None)` returns [`FIRST_KEY`]
    /// - `(None, Some(after))` returns a key below `after`
    /// - `(Some(before), None)` returns a key above `before`
    /// - `(Some(before), Some(after))` requires `before < after`
    pub fn generate(before: Option<&str>, after: Option<&str>) -> Result<String, PositionError> {
        if let Some(key) = before {
            Self::validate(key)?;
        }
        if let Some(key) = after {
            Self::validate(key)?;
        }

        match (before, after) {
            (None, None) => Ok(FIRST_KEY.to_string()),
            (None, Some(after)) => key_before(after),
            (Some(before), None) => Ok(key_after(before)),
            (Some(before), Some(after)) => key_between(before, after),
        }
    }

    /// Generate `count` ascending keys between `before` and `after`
    ///
    /// Each key becomes the lower bound of the next one.
    pub fn generate_many(
        before: Option<&str>,
        after: Option<&str>,
        count: usize,
    ) -> Result<Vec<String>, PositionError> {
        let mut keys = Vec::with_capacity(count);
        let mut lower = before.map(str::to_string);

        for _ in 0..count {
            let key = Self::generate(lower.as_deref(), after)?;
            lower = Some(key.clone());
            keys.push(key);
        }

        Ok(keys)
    }

    /// Sibling ordering relation: byte-wise lexicographic comparison
    pub fn compare(a: &str, b: &str) -> Ordering {
        a.as_bytes().cmp(b.as_bytes())
    }

    /// Check that a key is non-empty and drawn from the base-62 alphabet
    pub fn validate(key: &str) -> Result<(), PositionError> {
        if key.is_empty() || key.bytes().any(|b| rank(b).is_none()) {
            return Err(PositionError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

fn rank(byte: u8) -> Option<usize> {
    match byte {
        b'0'..=b'9' => Some((byte - b'0') as usize),
        b'A'..=b'Z' => Some((byte - b'A') as usize + 10),
        b'a'..=b'z' => Some((byte - b'a') as usize + 36),
        _ => None,
    }
}

fn char_at(rank: usize) -> char {
    ALPHABET[rank] as char
}

fn rank_of(key: &str, index: usize) -> usize {
    // keys are validated on entry
    rank(key.as_bytes()[index]).unwrap_or(MIN_RANK)
}

/// Key strictly greater than `before`
fn key_after(before: &str) -> String {
    let last = before.len() - 1;
    let last_rank = rank_of(before, last);

    if last_rank < MAX_RANK {
        let mut key = before[..last].to_string();
        key.push(char_at(last_rank + 1));
        key
    } else {
        let mut key = before.to_string();
        key.push(char_at(GROWTH_RANK));
        key
    }
}

/// Key strictly less than `after`
fn key_before(after: &str) -> Result<String, PositionError> {
    if after == FIRST_KEY {
        return Ok(BEFORE_FIRST_KEY.to_string());
    }

    let last = after.len() - 1;
    let last_rank = rank_of(after, last);

    if last_rank > MIN_RANK {
        let mut key = after[..last].to_string();
        key.push(char_at(last_rank - 1));
        // an all-minimum key has nothing below it
        if key.bytes().all(|b| b == ALPHABET[MIN_RANK]) {
            key.push(char_at(MAX_RANK));
        }
        return Ok(key);
    }

    let stripped = &after[..last];
    if stripped.is_empty() {
        return Err(PositionError::no_room("", after));
    }

    let mut key = key_before(stripped)?;
    key.push(char_at(MAX_RANK));
    Ok(key)
}

/// Key strictly between `before` and `after`
fn key_between(before: &str, after: &str) -> Result<String, PositionError> {
    if FractionalIndex::compare(before, after) != Ordering::Less {
        return Err(PositionError::invalid_range(before, after));
    }

    let (b, a) = (before.as_bytes(), after.as_bytes());
    let shared = b.iter().zip(a).take_while(|(x, y)| x == y).count();

    if shared == before.len() {
        // `before` is a prefix of `after`
        let tail = suffix_below(&after[shared..]).ok_or_else(|| PositionError::no_room(before, after))?;
        return Ok(format!("{}{}", before, tail));
    }

    let low = rank_of(before, shared);
    let high = rank_of(after, shared);

    if high - low > 1 {
        let mut key = before[..shared].to_string();
        key.push(char_at((low + high) / 2));
        return Ok(key);
    }

    // Adjacent characters: keep before's character and grow past its remainder
    let head = &before[..=shared];
    let rest = &before[shared + 1..];
    let tail = if rest.is_empty() {
        char_at(MID_RANK).to_string()
    } else {
        key_after(rest)
    };
    Ok(format!("{}{}", head, tail))
}

/// Non-empty suffix that sorts strictly below `upper`
fn suffix_below(upper: &str) -> Option<String> {
    let first = rank_of(upper, 0);

    match first {
        MIN_RANK => {
            let rest = &upper[1..];
            if rest.is_empty() {
                return None;
            }
            suffix_below(rest).map(|tail| format!("{}{}", char_at(MIN_RANK), tail))
        }
        1 => Some(format!("{}{}", char_at(MIN_RANK), char_at(MID_RANK))),
        _ => Some(char_at(first / 2).to_string()),
    }
}
