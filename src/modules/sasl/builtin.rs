// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Built-in SASL mechanisms: PLAIN, LOGIN, ANONYMOUS and XOAUTH2.
//! None of them negotiates a security layer, so encode/decode are the
//! identity transform.

use crate::modules::error::MailForgeResult;
use crate::modules::sasl::{SaslMechanism, SaslSessionInfo};

/// RFC 4616: `\0authcid\0password` in one initial response.
#[derive(Default)]
pub struct PlainMechanism {
    complete: bool,
}

impl PlainMechanism {
    pub fn construct() -> Box<dyn SaslMechanism> {
        Box::new(Self::default())
    }
}

impl SaslMechanism for PlainMechanism {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn has_initial_response(&self) -> bool {
        true
    }

    fn step(
        &mut self,
        session: &SaslSessionInfo,
        _challenge: &[u8],
    ) -> MailForgeResult<(Vec<u8>, bool)> {
        let username = session.authenticator.username()?;
        let password = session.authenticator.password()?;
        let mut response = Vec::with_capacity(username.len() + password.len() + 2);
        response.push(0);
        response.extend_from_slice(username.as_bytes());
        response.push(0);
        response.extend_from_slice(password.as_bytes());
        self.complete = true;
        Ok((response, true))
    }

    fn is_complete(&self) -> bool {
        self.complete
    }
}

/// The obsolete-but-ubiquitous LOGIN exchange: username and password
/// sent in answer to two server prompts.
#[derive(Default)]
pub struct LoginMechanism {
    steps_taken: u8,
}

impl LoginMechanism {
    pub fn construct() -> Box<dyn SaslMechanism> {
        Box::new(Self::default())
    }
}

impl SaslMechanism for LoginMechanism {
    fn name(&self) -> &'static str {
        "LOGIN"
    }

    fn has_initial_response(&self) -> bool {
        false
    }

    fn step(
        &mut self,
        session: &SaslSessionInfo,
        _challenge: &[u8],
    ) -> MailForgeResult<(Vec<u8>, bool)> {
        self.steps_taken += 1;
        match self.steps_taken {
            1 => Ok((session.authenticator.username()?.into_bytes(), false)),
            _ => Ok((session.authenticator.password()?.into_bytes(), true)),
        }
    }

    fn is_complete(&self) -> bool {
        self.steps_taken >= 2
    }
}

/// RFC 4505: a single trace token (mail address) and no secret.
#[derive(Default)]
pub struct AnonymousMechanism {
    complete: bool,
}

impl AnonymousMechanism {
    pub fn construct() -> Box<dyn SaslMechanism> {
        Box::new(Self::default())
    }
}

impl SaslMechanism for AnonymousMechanism {
    fn name(&self) -> &'static str {
        "ANONYMOUS"
    }

    fn has_initial_response(&self) -> bool {
        true
    }

    fn step(
        &mut self,
        session: &SaslSessionInfo,
        _challenge: &[u8],
    ) -> MailForgeResult<(Vec<u8>, bool)> {
        self.complete = true;
        Ok((session.authenticator.anonymous_token()?.into_bytes(), true))
    }

    fn is_complete(&self) -> bool {
        self.complete
    }
}

/// XOAUTH2: one initial response of the form
/// `user=<user>\x01auth=Bearer <token>\x01\x01`.
#[derive(Default)]
pub struct XOAuth2Mechanism {
    complete: bool,
}

impl XOAuth2Mechanism {
    pub fn construct() -> Box<dyn SaslMechanism> {
        Box::new(Self::default())
    }
}

impl SaslMechanism for XOAuth2Mechanism {
    fn name(&self) -> &'static str {
        "XOAUTH2"
    }

    fn has_initial_response(&self) -> bool {
        true
    }

    fn step(
        &mut self,
        session: &SaslSessionInfo,
        _challenge: &[u8],
    ) -> MailForgeResult<(Vec<u8>, bool)> {
        let username = session.authenticator.username()?;
        let token = session.authenticator.access_token()?;
        let mut response = Vec::new();
        response.extend_from_slice(b"user=");
        response.extend_from_slice(username.as_bytes());
        response.push(0x01);
        response.extend_from_slice(b"auth=Bearer ");
        response.extend_from_slice(token.as_bytes());
        response.extend_from_slice(&[0x01, 0x01]);
        self.complete = true;
        Ok((response, true))
    }

    fn is_complete(&self) -> bool {
        self.complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::sasl::SaslContext;
    use crate::modules::session::{Authenticator, DefaultAuthenticator, Session};
    use std::sync::Arc;

    fn info(pairs: &[(&str, &str)]) -> SaslSessionInfo {
        let mut session = Session::new();
        for (key, value) in pairs {
            session.set_property(&format!("svc.{}", key), value);
        }
        SaslSessionInfo {
            service_name: "svc".to_string(),
            authenticator: Arc::new(DefaultAuthenticator::new(&session, "svc")),
        }
    }

    #[test]
    fn plain_initial_response_layout() {
        let session = info(&[("auth.username", "jane"), ("auth.password", "secret")]);
        let mut mechanism = PlainMechanism::default();
        let (response, complete) = mechanism.step(&session, b"").unwrap();
        assert!(complete);
        assert_eq!(response, b"\0jane\0secret");
    }

    #[test]
    fn login_answers_two_prompts() {
        let session = info(&[("auth.username", "jane"), ("auth.password", "secret")]);
        let mut mechanism = LoginMechanism::default();
        assert!(!mechanism.has_initial_response());
        let (user, complete) = mechanism.step(&session, b"Username:").unwrap();
        assert_eq!(user, b"jane");
        assert!(!complete);
        let (password, complete) = mechanism.step(&session, b"Password:").unwrap();
        assert_eq!(password, b"secret");
        assert!(complete);
        assert!(mechanism.is_complete());
    }

    #[test]
    fn xoauth2_initial_response_format() {
        let session = info(&[
            ("auth.username", "u@example.com"),
            ("auth.accesstoken", "TOK"),
        ]);
        let mut mechanism = XOAuth2Mechanism::default();
        let (response, complete) = mechanism.step(&session, b"").unwrap();
        assert!(complete);
        assert_eq!(
            response,
            b"user=u@example.com\x01auth=Bearer TOK\x01\x01"
        );
    }

    #[test]
    fn xoauth2_via_context_session() {
        let mut properties = Session::new();
        properties.set_property("imap.auth.username", "u@example.com");
        properties.set_property("imap.auth.accesstoken", "TOK");
        let authenticator: Arc<dyn Authenticator> =
            Arc::new(DefaultAuthenticator::new(&properties, "imap"));
        let mut session = SaslContext::new()
            .create_session("imap", authenticator, "XOAUTH2")
            .unwrap();
        assert!(session.has_initial_response());
        let (response, complete) = session.step(b"").unwrap();
        assert!(complete);
        assert!(session.is_complete());
        assert!(response.starts_with(b"user=u@example.com\x01"));
    }

    #[test]
    fn anonymous_token_is_mail_shaped() {
        let session = info(&[]);
        let mut mechanism = AnonymousMechanism::default();
        let (response, complete) = mechanism.step(&session, b"").unwrap();
        assert!(complete);
        assert!(response.starts_with(b"anonymous@"));
    }
}
