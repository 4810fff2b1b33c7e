//! Cache key derivation
//!
//! Key layout before hashing:
//! ```text
//! /cached_method_result/<type>[/<discriminator digest>]/<member>/<canonical args>
//! ```
//! The composite string is hashed with the configured digest, so the stored
//! key has a fixed length and stays the same across process restarts.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::args::EncodedArgs;
use crate::error::Error;

/// Namespace prefix for cacheable members
pub const CACHED_NAMESPACE: &str = "/cached_method_result";

/// Namespace prefix for memoized members
pub const MEMOIZED_NAMESPACE: &str = "/memoized_method_result";

/// Separator between key segments
pub const SEPARATOR: &str = "/";

/// Digest used to turn a composite key into a storable one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// SHA-1, 40 hex characters
    #[default]
    Sha1,
    /// SHA-256, 64 hex characters
    Sha256,
}

impl DigestAlgorithm {
    /// Hex digest of `input`
    pub fn hex_digest(&self, input: &[u8]) -> String {
        match self {
            DigestAlgorithm::Sha1 => hex::encode(Sha1::digest(input)),
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(input)),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(DigestAlgorithm::Sha1),
            "sha256" | "sha-256" => Ok(DigestAlgorithm::Sha256),
            other => Err(Error::Configuration(format!(
                "unknown digest algorithm '{}'",
                other
            ))),
        }
    }
}

/// Storable key: hex digest of the composite key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// The hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digest of the ordered attribute values that scope a shared entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Discriminator(String);

impl Discriminator {
    /// Hash the full ordered value list
    pub fn new(values: &EncodedArgs, algorithm: DigestAlgorithm) -> Self {
        Self(algorithm.hex_digest(values.to_key_segment().as_bytes()))
    }

    /// The digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A derived key together with the human-readable composite it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKey {
    /// Composite string, logged on hit/miss
    pub readable: String,
    /// Hashed key used against the store
    pub key: CacheKey,
}

/// Builds keys within one namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDeriver {
    namespace: &'static str,
    algorithm: DigestAlgorithm,
}

impl KeyDeriver {
    /// Deriver for cacheable members
    pub fn cached(algorithm: DigestAlgorithm) -> Self {
        Self {
            namespace: CACHED_NAMESPACE,
            algorithm,
        }
    }

    /// Deriver for memoized members
    pub fn memoized(algorithm: DigestAlgorithm) -> Self {
        Self {
            namespace: MEMOIZED_NAMESPACE,
            algorithm,
        }
    }

    /// Digest algorithm in use
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Derive the key for one call
    pub fn derive(
        &self,
        type_name: &str,
        member: &str,
        discriminator: Option<&Discriminator>,
        args: &EncodedArgs,
    ) -> DerivedKey {
        let args_segment = args.to_key_segment();
        let type_name = escape_segment(type_name);
        let member = escape_segment(member);
        let mut parts: Vec<&str> = Vec::with_capacity(5);
        parts.push(self.namespace);
        parts.push(&type_name);
        if let Some(d) = discriminator {
            parts.push(d.as_str());
        }
        parts.push(&member);
        parts.push(&args_segment);

        let readable = parts.join(SEPARATOR);
        let key = CacheKey(self.algorithm.hex_digest(readable.as_bytes()));
        DerivedKey { readable, key }
    }
}

/// Percent-escape the separator so names cannot shift segment boundaries
fn escape_segment(name: &str) -> Cow<'_, str> {
    if name.contains(['%', '/']) {
        Cow::Owned(name.replace('%', "%25").replace('/', "%2F"))
    } else {
        Cow::Borrowed(name)
    }
}

/// Derive a cacheable key with the default digest
pub fn derive(
    type_name: &str,
    member: &str,
    discriminator: Option<&Discriminator>,
    args: &EncodedArgs,
) -> CacheKey {
    KeyDeriver::cached(DigestAlgorithm::default())
        .derive(type_name, member, discriminator, args)
        .key
}
