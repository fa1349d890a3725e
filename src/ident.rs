//! Content identifiers
//!
//! A content identifier is `<time>-<digest>`: the run instant in Unix
//! milliseconds (big-endian, leading zero bytes stripped) followed by a
//! truncated SHAKE256 digest of the compressed payload. Both halves use
//! lowercase base32hex without padding, so identifiers are safe as file
//! names and URL path segments.
//!
//! The default digest is only 4 bytes long. That keeps identifiers short
//! enough to read aloud; the timestamp half does most of the work of
//! keeping successive releases apart. Widen `digest_len` before relying on
//! identifiers for anything stronger than release naming.

use chrono::{DateTime, Utc};
use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::Shake256;
use std::fmt;
use std::str::FromStr;

/// Shared encoding for both identifier components
pub const ALPHABET: base32::Alphabet = base32::Alphabet::Rfc4648HexLower { padding: false };

/// Characters `ALPHABET` can emit, in value order
pub const ALPHABET_CHARS: &str = "0123456789abcdefghijklmnopqrstuv";

/// Default digest length in bytes
pub const DEFAULT_DIGEST_LEN: usize = 4;

/// Largest supported digest length in bytes
pub const MAX_DIGEST_LEN: usize = 32;

/// Errors for identifier parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("content identifier must be <time>-<digest>: {0:?}")]
    Malformed(String),

    #[error("content identifier contains characters outside 0-9a-v: {0:?}")]
    InvalidCharacter(String),
}

/// A derived content identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentId {
    value: String,
    /// Index of the separating hyphen
    split: usize,
}

impl ContentId {
    /// Derive the identifier for `payload` produced at `now`
    pub fn derive(now: DateTime<Utc>, payload: &[u8], digest_len: usize) -> Self {
        let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let time = encode_timestamp(millis);
        let digest = base32::encode(ALPHABET, &payload_digest(payload, digest_len));

        let split = time.len();
        Self {
            value: format!("{}-{}", time, digest),
            split,
        }
    }

    /// Parse and validate an identifier string
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let s = s.trim_end_matches(['\n', '\r']);
        let (time, digest) = s
            .split_once('-')
            .ok_or_else(|| IdError::Malformed(s.to_string()))?;

        if time.is_empty() || digest.is_empty() || digest.contains('-') {
            return Err(IdError::Malformed(s.to_string()));
        }
        if !time.chars().chain(digest.chars()).all(|c| ALPHABET_CHARS.contains(c)) {
            return Err(IdError::InvalidCharacter(s.to_string()));
        }

        Ok(Self {
            value: s.to_string(),
            split: time.len(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Encoded timestamp half
    pub fn time_component(&self) -> &str {
        &self.value[..self.split]
    }

    /// Encoded digest half
    pub fn digest_component(&self) -> &str {
        &self.value[self.split + 1..]
    }

    /// Decode the timestamp half back to Unix milliseconds
    pub fn timestamp_millis(&self) -> Option<u64> {
        let bytes = base32::decode(ALPHABET, self.time_component())?;
        if bytes.is_empty() || bytes.len() > 8 {
            return None;
        }
        Some(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    /// Decode the digest half back to raw bytes
    pub fn digest_bytes(&self) -> Option<Vec<u8>> {
        base32::decode(ALPHABET, self.digest_component())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl FromStr for ContentId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

/// Encode a millisecond timestamp with leading zero bytes stripped
///
/// At least one byte is always kept, so zero encodes as `"00"`.
pub fn encode_timestamp(millis: u64) -> String {
    let bytes = millis.to_be_bytes();
    let start = bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(bytes.len() - 1);
    base32::encode(ALPHABET, &bytes[start..])
}

/// SHAKE256 of `payload`, truncated to `len` bytes
pub fn payload_digest(payload: &[u8], len: usize) -> Vec<u8> {
    let mut hasher = Shake256::default();
    hasher.update(payload);
    let mut reader = hasher.finalize_xof();
    let mut out = vec![0u8; len];
    reader.read(&mut out);
    out
}

/// Length of the encoded digest component for a digest of `len` bytes
pub fn encoded_digest_len(len: usize) -> usize {
    (len * 8).div_ceil(5)
}
