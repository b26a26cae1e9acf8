//! core::codec
//!
//! Collision-free string encoding for namespace paths.
//!
//! # Format
//!
//! Every segment is written as `<byte length>:<segment bytes>` and the
//! segments are concatenated with no separator:
//!
//! ```text
//! ["App", "Users"]   ->  "3:App5:Users"
//! ["a:b", ""]        ->  "3:a:b0:"
//! []                 ->  ""
//! ```
//!
//! # Invariants
//!
//! - Encoding is a bijection between segment lists and canonical strings.
//!   Lengths are decimal without leading zeros, so no two strings decode to
//!   the same path.
//! - Any segment content is legal, including `:`, `\` and the empty string.
//! - The encoding of a path prefix is a string prefix of the encoding of
//!   every path below it. A sorted map of encoded keys therefore stores all
//!   descendants of a prefix contiguously, right after the prefix itself.

use thiserror::Error;

/// Errors from decoding an encoded key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// A segment header has no `:` terminator.
    #[error("missing length separator at byte {offset}")]
    MissingSeparator { offset: usize },

    /// A segment length is empty, non-numeric, or has leading zeros.
    #[error("invalid segment length at byte {offset}")]
    InvalidLength { offset: usize },

    /// The key ends before the declared segment length.
    #[error("segment at byte {offset} declares {expected} bytes but the key is shorter")]
    Truncated { offset: usize, expected: usize },

    /// The declared length splits a UTF-8 character.
    #[error("segment at byte {offset} does not end on a character boundary")]
    NotCharBoundary { offset: usize },
}

/// Encode a list of segments into a single key string.
///
/// # Example
///
/// ```
/// use statepool::core::codec::encode;
///
/// assert_eq!(encode(&["App", "Users"]), "3:App5:Users");
/// assert_eq!(encode::<&str>(&[]), "");
/// ```
pub fn encode<S: AsRef<str>>(segments: &[S]) -> String {
    let capacity = segments
        .iter()
        .map(|s| s.as_ref().len() + 4)
        .sum::<usize>();
    let mut out = String::with_capacity(capacity);
    for segment in segments {
        let segment = segment.as_ref();
        out.push_str(&segment.len().to_string());
        out.push(':');
        out.push_str(segment);
    }
    out
}

/// Decode a key string back into its segments.
///
/// # Errors
///
/// Returns a [`KeyError`] describing the first malformed segment.
///
/// # Example
///
/// ```
/// use statepool::core::codec::decode;
///
/// assert_eq!(decode("3:App5:Users").unwrap(), vec!["App", "Users"]);
/// assert!(decode("03:App").is_err());
/// ```
pub fn decode(encoded: &str) -> Result<Vec<String>, KeyError> {
    let mut segments = Vec::new();
    let mut rest = encoded;

    while !rest.is_empty() {
        let offset = encoded.len() - rest.len();
        let (segment, tail) = split_segment(rest, offset)?;
        segments.push(segment.to_string());
        rest = tail;
    }

    Ok(segments)
}

/// Check whether `encoded` lies at or below `prefix` (both encoded).
///
/// Because the format is prefix-free per segment, a plain string prefix test
/// is exact: `3:App` is a prefix of `3:App5:Users` but not of `4:Apps`.
pub fn is_under(prefix: &str, encoded: &str) -> bool {
    encoded.starts_with(prefix)
}

fn split_segment(input: &str, offset: usize) -> Result<(&str, &str), KeyError> {
    let colon = input
        .find(':')
        .ok_or(KeyError::MissingSeparator { offset })?;
    let digits = &input[..colon];

    if digits.is_empty()
        || !digits.bytes().all(|b| b.is_ascii_digit())
        || (digits.len() > 1 && digits.starts_with('0'))
    {
        return Err(KeyError::InvalidLength { offset });
    }

    let len: usize = digits
        .parse()
        .map_err(|_| KeyError::InvalidLength { offset })?;
    let body = &input[colon + 1..];

    if body.len() < len {
        return Err(KeyError::Truncated {
            offset,
            expected: len,
        });
    }
    if !body.is_char_boundary(len) {
        return Err(KeyError::NotCharBoundary { offset });
    }

    Ok(body.split_at(len))
}
