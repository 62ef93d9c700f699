//! Content fingerprinting for cache validity
//!
//! A fingerprint is a SHA-256 digest over the raw bytes of a source
//! document. It is a pure byte-identity key: any change to the file,
//! including whitespace or metadata, yields a new fingerprint. No
//! semantic diffing of the document happens here.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Output encoding of a fingerprint digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Lowercase hexadecimal (default)
    #[default]
    Hex,
    /// Standard base64 with padding
    Base64,
}

/// Hash a byte buffer into a fingerprint string.
pub fn hash_bytes(bytes: &[u8], encoding: Encoding) -> String {
    let digest = Sha256::digest(bytes);
    match encoding {
        Encoding::Hex => hex::encode(digest),
        Encoding::Base64 => BASE64.encode(digest),
    }
}

/// Hash the raw contents of a file into a fingerprint string.
pub fn hash_file(path: &Path, encoding: Encoding) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hash_bytes(&bytes, encoding))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable() {
        let a = hash_bytes(b"page one", Encoding::Hex);
        let b = hash_bytes(b"page one", Encoding::Hex);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_tracks_every_byte() {
        let a = hash_bytes(b"page one", Encoding::Hex);
        let b = hash_bytes(b"page one ", Encoding::Hex);
        assert_ne!(a, b);
    }

    #[test]
    fn encodings_differ_but_agree_on_content() {
        let hex = hash_bytes(b"doc", Encoding::Hex);
        let b64 = hash_bytes(b"doc", Encoding::Base64);
        assert_ne!(hex, b64);
        assert_eq!(hex.len(), 64);
        let raw = hex::decode(&hex).unwrap();
        assert_eq!(BASE64.encode(raw), b64);
    }

    #[test]
    fn file_hash_matches_byte_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.bin");
        std::fs::write(&path, b"contents").unwrap();
        assert_eq!(
            hash_file(&path, Encoding::Hex).unwrap(),
            hash_bytes(b"contents", Encoding::Hex)
        );
    }
}
