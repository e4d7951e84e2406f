// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Name-keyed message digests, used for `Received-content-MIC` values
//! and available to embedders as an extension point.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::raise_error;
use dashmap::DashMap;
use std::sync::LazyLock;

pub trait MessageDigest: Send {
    fn name(&self) -> &'static str;
    fn update(&mut self, data: &[u8]);
    /// Finish and return the digest bytes.
    fn finish(self: Box<Self>) -> Vec<u8>;
}

impl std::fmt::Debug for dyn MessageDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDigest").field("name", &self.name()).finish()
    }
}

struct RingDigest {
    name: &'static str,
    context: ring::digest::Context,
}

impl MessageDigest for RingDigest {
    fn name(&self) -> &'static str {
        self.name
    }

    fn update(&mut self, data: &[u8]) {
        self.context.update(data);
    }

    fn finish(self: Box<Self>) -> Vec<u8> {
        self.context.finish().as_ref().to_vec()
    }
}

type DigestConstructor = fn() -> Box<dyn MessageDigest>;

fn construct_sha1() -> Box<dyn MessageDigest> {
    Box::new(RingDigest {
        name: "sha1",
        context: ring::digest::Context::new(&ring::digest::SHA1_FOR_LEGACY_USE_ONLY),
    })
}

fn construct_sha256() -> Box<dyn MessageDigest> {
    Box::new(RingDigest {
        name: "sha256",
        context: ring::digest::Context::new(&ring::digest::SHA256),
    })
}

static DIGEST_REGISTRY: LazyLock<DashMap<String, DigestConstructor>> = LazyLock::new(|| {
    let registry: DashMap<String, DigestConstructor> = DashMap::new();
    registry.insert("sha1".into(), construct_sha1 as _);
    registry.insert("sha256".into(), construct_sha256 as _);
    registry
});

/// Instantiate a digest by name.
pub fn create(name: &str) -> MailForgeResult<Box<dyn MessageDigest>> {
    let constructor = DIGEST_REGISTRY
        .get(&name.to_ascii_lowercase())
        .ok_or_else(|| {
            raise_error!(
                format!("no digest algorithm '{}'", name),
                ErrorCode::NoFactoryAvailable
            )
        })?;
    Ok(constructor())
}

/// Register (or override) a digest algorithm; init-time only.
pub fn register(name: &str, constructor: DigestConstructor) {
    DIGEST_REGISTRY.insert(name.to_ascii_lowercase(), constructor);
}

/// One-call digest, hex encoded.
pub fn hex_digest(name: &str, data: &[u8]) -> MailForgeResult<String> {
    let mut digest = create(name)?;
    digest.update(data);
    Ok(hex::encode(digest.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_known_vector() {
        // SHA-1("abc")
        assert_eq!(
            hex_digest("sha1", b"abc").unwrap(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            hex_digest("SHA256", b"abc").unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn unknown_algorithm_is_reported() {
        assert_eq!(
            create("md4").unwrap_err().code(),
            ErrorCode::NoFactoryAvailable
        );
    }
}
