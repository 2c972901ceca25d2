//! Content-addressed key/value annotations.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 identifier of an annotation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnotationId(pub String);

impl AnnotationId {
    /// `sha256(sha256(key) ‖ sha256(value))`.
    ///
    /// Key and value are digested separately before concatenation, so
    /// `("ab", "c")` and `("a", "bc")` hash differently.
    pub fn of(key: &str, value: &str) -> Self {
        let key_hash = Sha256::digest(key.as_bytes());
        let val_hash = Sha256::digest(value.as_bytes());
        let mut hasher = Sha256::new();
        hasher.update(key_hash);
        hasher.update(val_hash);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable metadata pair. Identity is a pure function of its content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub key: String,
    pub value: String,
}

impl Annotation {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        Self {
            id: AnnotationId::of(&key, &value),
            key,
            value,
        }
    }
}
