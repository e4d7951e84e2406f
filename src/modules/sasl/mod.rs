// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! SASL (RFC 4422): pluggable authentication mechanisms with optional
//! post-authentication integrity/privacy layering over the socket.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::session::Authenticator;
use crate::raise_error;
use dashmap::DashMap;
use std::sync::{Arc, LazyLock};

pub mod builtin;
pub mod socket;

/// Identity and credentials visible to a mechanism during the
/// exchange.
pub struct SaslSessionInfo {
    pub service_name: String,
    pub authenticator: Arc<dyn Authenticator>,
}

/// One authentication mechanism. `step` consumes a server challenge
/// and produces the next client response; `encode`/`decode` implement
/// the negotiated per-message protection (identity for mechanisms
/// without a security layer).
pub trait SaslMechanism: Send {
    fn name(&self) -> &'static str;

    /// Whether the mechanism produces a response before any challenge.
    fn has_initial_response(&self) -> bool;

    fn step(
        &mut self,
        session: &SaslSessionInfo,
        challenge: &[u8],
    ) -> MailForgeResult<(Vec<u8>, bool)>;

    fn is_complete(&self) -> bool;

    fn encode(&self, _session: &SaslSessionInfo, data: &[u8]) -> MailForgeResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decode(&self, _session: &SaslSessionInfo, data: &[u8]) -> MailForgeResult<Vec<u8>> {
        Ok(data.to_vec())
    }
}

type MechanismConstructor = fn() -> Box<dyn SaslMechanism>;

static MECHANISM_REGISTRY: LazyLock<DashMap<String, MechanismConstructor>> =
    LazyLock::new(|| {
        let registry: DashMap<String, MechanismConstructor> = DashMap::new();
        registry.insert("PLAIN".into(), builtin::PlainMechanism::construct as _);
        registry.insert("LOGIN".into(), builtin::LoginMechanism::construct as _);
        registry.insert(
            "ANONYMOUS".into(),
            builtin::AnonymousMechanism::construct as _,
        );
        registry.insert("XOAUTH2".into(), builtin::XOAuth2Mechanism::construct as _);
        registry
    });

/// Mechanism preference, most secure first.
const MECHANISM_RANKING: &[&str] = &["XOAUTH2", "PLAIN", "LOGIN", "ANONYMOUS"];

/// Factory for SASL sessions; also the registration point for
/// user-supplied mechanisms.
#[derive(Default)]
pub struct SaslContext;

impl SaslContext {
    pub fn new() -> Self {
        Self
    }

    /// Built-in plus user-registered mechanism names.
    pub fn supported_mechanisms(&self) -> Vec<String> {
        let mut names: Vec<String> = MECHANISM_REGISTRY
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Register a mechanism under an upper-cased name.
    pub fn register_mechanism(&self, name: &str, constructor: MechanismConstructor) {
        MECHANISM_REGISTRY.insert(name.to_ascii_uppercase(), constructor);
    }

    /// The most secure mechanism supported by both sides.
    pub fn suggest_mechanism(&self, available: &[String]) -> Option<String> {
        for preferred in MECHANISM_RANKING {
            if available.iter().any(|name| name.eq_ignore_ascii_case(preferred))
                && MECHANISM_REGISTRY.contains_key(*preferred)
            {
                return Some((*preferred).to_string());
            }
        }
        // fall back to any mutually known mechanism
        available
            .iter()
            .find(|name| MECHANISM_REGISTRY.contains_key(&name.to_ascii_uppercase()))
            .map(|name| name.to_ascii_uppercase())
    }

    pub fn create_session(
        &self,
        service_name: &str,
        authenticator: Arc<dyn Authenticator>,
        mechanism: &str,
    ) -> MailForgeResult<SaslSession> {
        let constructor = MECHANISM_REGISTRY
            .get(&mechanism.to_ascii_uppercase())
            .ok_or_else(|| {
                raise_error!(
                    format!("no such SASL mechanism: '{}'", mechanism),
                    ErrorCode::NoSuchMechanism
                )
            })?;
        Ok(SaslSession {
            info: SaslSessionInfo {
                service_name: service_name.to_string(),
                authenticator,
            },
            mechanism: constructor(),
        })
    }
}

/// An authentication exchange in progress (and, afterwards, the
/// security layer context).
pub struct SaslSession {
    info: SaslSessionInfo,
    mechanism: Box<dyn SaslMechanism>,
}

impl std::fmt::Debug for SaslSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaslSession")
            .field("service_name", &self.info.service_name)
            .field("mechanism", &self.mechanism.name())
            .finish()
    }
}

impl SaslSession {
    pub fn mechanism_name(&self) -> &str {
        self.mechanism.name()
    }

    pub fn has_initial_response(&self) -> bool {
        self.mechanism.has_initial_response()
    }

    pub fn is_complete(&self) -> bool {
        self.mechanism.is_complete()
    }

    /// Run one challenge/response round. Returns the response bytes
    /// and whether the exchange is complete on the client side.
    pub fn step(&mut self, challenge: &[u8]) -> MailForgeResult<(Vec<u8>, bool)> {
        self.mechanism.step(&self.info, challenge)
    }

    /// Apply the mechanism's outgoing protection.
    pub fn encode(&self, data: &[u8]) -> MailForgeResult<Vec<u8>> {
        self.mechanism.encode(&self.info, data)
    }

    /// Remove the mechanism's incoming protection.
    pub fn decode(&self, data: &[u8]) -> MailForgeResult<Vec<u8>> {
        self.mechanism.decode(&self.info, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::session::{DefaultAuthenticator, Session};

    fn authenticator(pairs: &[(&str, &str)]) -> Arc<dyn Authenticator> {
        let mut session = Session::new();
        for (key, value) in pairs {
            session.set_property(&format!("test.{}", key), value);
        }
        Arc::new(DefaultAuthenticator::new(&session, "test"))
    }

    #[test]
    fn supported_mechanisms_include_builtins() {
        let context = SaslContext::new();
        let names = context.supported_mechanisms();
        for expected in ["PLAIN", "LOGIN", "ANONYMOUS", "XOAUTH2"] {
            assert!(names.iter().any(|name| name == expected), "{}", expected);
        }
    }

    #[test]
    fn suggest_prefers_most_secure() {
        let context = SaslContext::new();
        let available = vec!["LOGIN".to_string(), "PLAIN".to_string()];
        assert_eq!(context.suggest_mechanism(&available).as_deref(), Some("PLAIN"));

        let with_oauth = vec!["PLAIN".to_string(), "XOAUTH2".to_string()];
        assert_eq!(
            context.suggest_mechanism(&with_oauth).as_deref(),
            Some("XOAUTH2")
        );

        assert_eq!(context.suggest_mechanism(&["SCRAM-SHA-1".to_string()]), None);
    }

    #[test]
    fn unknown_mechanism_is_reported() {
        let context = SaslContext::new();
        let error = context
            .create_session("smtp", authenticator(&[]), "KERBEROS_V4")
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::NoSuchMechanism);
    }

    #[test]
    fn wrap_unwrap_is_identity_for_builtins() {
        let context = SaslContext::new();
        let auth = authenticator(&[("auth.username", "u"), ("auth.password", "p")]);
        for name in ["PLAIN", "LOGIN", "XOAUTH2"] {
            let session = context.create_session("imap", auth.clone(), name).unwrap();
            let payload = b"arbitrary \x00 bytes \xff";
            assert_eq!(
                session.decode(&session.encode(payload).unwrap()).unwrap(),
                payload
            );
        }
    }
}
