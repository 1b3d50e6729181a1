//! Subresource-integrity metadata parsing and digest checking.
//!
//! Metadata is the SRI attribute grammar: whitespace-separated
//! `<alg>-<base64digest>` tokens, each with an optional `?options` suffix.
//! Unknown algorithms and malformed tokens are skipped; among the tokens
//! that parse, only the strongest algorithm's digests are matched.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Supported digest algorithms, ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IntegrityAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl IntegrityAlgorithm {
    /// The string representation of this algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrityAlgorithm::Sha256 => "sha256",
            IntegrityAlgorithm::Sha384 => "sha384",
            IntegrityAlgorithm::Sha512 => "sha512",
        }
    }

    /// Digest length in bytes.
    pub fn digest_length(&self) -> usize {
        match self {
            IntegrityAlgorithm::Sha256 => 32,
            IntegrityAlgorithm::Sha384 => 48,
            IntegrityAlgorithm::Sha512 => 64,
        }
    }

    /// Compute this algorithm's digest of `data`.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            IntegrityAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            IntegrityAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            IntegrityAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sha256" => Some(IntegrityAlgorithm::Sha256),
            "sha384" => Some(IntegrityAlgorithm::Sha384),
            "sha512" => Some(IntegrityAlgorithm::Sha512),
            _ => None,
        }
    }
}

/// One parsed metadata token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityDigest {
    pub algorithm: IntegrityAlgorithm,
    /// Decoded digest bytes.
    pub value: Vec<u8>,
}

fn decode_digest(encoded: &str) -> Option<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .or_else(|_| URL_SAFE.decode(encoded))
        .ok()
}

/// Parse an SRI metadata string into its recognized digests.
///
/// Tokens with unknown algorithms, undecodable values, or a digest length
/// that does not match the algorithm are skipped.
pub fn parse_metadata(metadata: &str) -> Vec<IntegrityDigest> {
    let mut digests = Vec::new();
    for token in metadata.split_ascii_whitespace() {
        // Strip the ?options suffix; options are not interpreted.
        let token = token.split('?').next().unwrap_or(token);
        let Some((name, encoded)) = token.split_once('-') else {
            continue;
        };
        let Some(algorithm) = IntegrityAlgorithm::parse(name) else {
            continue;
        };
        let Some(value) = decode_digest(encoded) else {
            continue;
        };
        if value.len() != algorithm.digest_length() {
            continue;
        }
        digests.push(IntegrityDigest { algorithm, value });
    }
    digests
}

/// Check `data` against `metadata`.
///
/// Returns `false` when no token parses (empty or malformed metadata is a
/// verification failure for a gated body). Otherwise the strongest
/// algorithm present is selected and the check passes if any of its
/// digests matches.
pub fn check_integrity(metadata: &str, data: &[u8]) -> bool {
    let digests = parse_metadata(metadata);
    let Some(strongest) = digests.iter().map(|d| d.algorithm).max() else {
        return false;
    };
    let actual = strongest.digest(data);
    digests
        .iter()
        .filter(|d| d.algorithm == strongest)
        .any(|d| d.value == actual)
}
