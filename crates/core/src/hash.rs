//! Photo content digests.
//!
//! Two uploads are the same photo exactly when their digests match, whatever
//! their names or sessions. The digest keys the hash index, picks the suffix
//! for a name already holding other bytes, and seeds derived unique ids.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 of a photo's raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Digest of bytes already in memory, e.g. a stored file read back.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Self::hasher();
        hasher.update(data);
        hasher.finalize()
    }

    /// Hasher fed chunk by chunk while a multipart part streams in.
    pub fn hasher() -> ContentHasher {
        ContentHasher(Sha256::new())
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Leading hex characters, for names and ids that embed the digest.
    pub fn short_hex(&self, len: usize) -> String {
        let mut hex = self.to_hex();
        hex.truncate(len);
        hex
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short_hex(16))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Streaming digest of one uploaded part.
pub struct ContentHasher(Sha256);

impl ContentHasher {
    pub fn update(&mut self, chunk: &[u8]) {
        self.0.update(chunk);
    }

    pub fn finalize(self) -> ContentHash {
        ContentHash(self.0.finalize().into())
    }
}
