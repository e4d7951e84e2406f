// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Sessions and authenticators: the configuration context a service is
//! created from, and the credential plug-in point.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::platform;
use crate::raise_error;
use std::collections::HashMap;

pub mod url;

/// Recognised service-level property keys, relative to the service
/// prefix (e.g. `smtp.connection.tls`).
pub mod properties {
    pub const CONNECTION_TLS: &str = "connection.tls";
    pub const CONNECTION_TLS_REQUIRED: &str = "connection.tls.required";
    pub const NEED_AUTHENTICATION: &str = "options.need-authentication";
    pub const AUTH_USERNAME: &str = "auth.username";
    pub const AUTH_PASSWORD: &str = "auth.password";
    pub const AUTH_ACCESS_TOKEN: &str = "auth.accesstoken";
    pub const SERVER_ADDRESS: &str = "server.address";
    pub const SERVER_PORT: &str = "server.port";
    pub const TIMEOUT_MS: &str = "timeout";
}

/// A property map shared by the services created from it.
#[derive(Clone, Debug, Default)]
pub struct Session {
    properties: HashMap<String, String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_property(&mut self, name: &str, value: impl ToString) {
        self.properties.insert(name.to_string(), value.to_string());
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(|value| value.as_str())
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn expect_property(&self, name: &str) -> MailForgeResult<&str> {
        self.property(name).ok_or_else(|| {
            raise_error!(
                format!("session property '{}' is not set", name),
                ErrorCode::NoSuchProperty
            )
        })
    }

    pub fn property_bool(&self, name: &str, default: bool) -> bool {
        self.property(name)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }

    pub fn property_u16(&self, name: &str, default: u16) -> MailForgeResult<u16> {
        match self.property(name) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| {
                raise_error!(
                    format!("session property '{}' is not a port number: '{}'", name, raw),
                    ErrorCode::InvalidPropertyType
                )
            }),
        }
    }

    pub fn property_u64(&self, name: &str, default: u64) -> MailForgeResult<u64> {
        match self.property(name) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| {
                raise_error!(
                    format!("session property '{}' is not a number: '{}'", name, raw),
                    ErrorCode::InvalidPropertyType
                )
            }),
        }
    }

    /// Install the standard properties for a service URL under the
    /// scheme's prefix (`imap.server.address`, ...).
    pub fn configure_from_url(&mut self, service_url: &url::ServiceUrl) {
        let prefix = service_url.scheme.clone();
        self.set_property(
            &format!("{}.{}", prefix, properties::SERVER_ADDRESS),
            &service_url.host,
        );
        if let Some(port) = service_url.port {
            self.set_property(&format!("{}.{}", prefix, properties::SERVER_PORT), port);
        }
        if let Some(user) = &service_url.user {
            self.set_property(&format!("{}.{}", prefix, properties::AUTH_USERNAME), user);
        }
        if let Some(password) = &service_url.password {
            self.set_property(
                &format!("{}.{}", prefix, properties::AUTH_PASSWORD),
                password,
            );
        }
    }
}

/// Supplies credentials and identity strings to services and SASL
/// mechanisms.
pub trait Authenticator: Send + Sync {
    fn username(&self) -> MailForgeResult<String>;
    fn password(&self) -> MailForgeResult<String>;

    fn hostname(&self) -> MailForgeResult<String> {
        Ok(platform::handler().hostname())
    }

    fn anonymous_token(&self) -> MailForgeResult<String> {
        Ok(format!("anonymous@{}", platform::handler().hostname()))
    }

    fn service_name(&self) -> MailForgeResult<String>;

    fn access_token(&self) -> MailForgeResult<String>;
}

/// Chooses the order SASL mechanisms are tried in. The default puts the
/// suggested mechanism first and keeps the rest in received order.
pub trait SaslAuthenticator: Authenticator {
    fn mechanism_order(&self, available: &[String], suggested: Option<&str>) -> Vec<String> {
        let mut ordered: Vec<String> = Vec::with_capacity(available.len());
        if let Some(suggested) = suggested {
            if available
                .iter()
                .any(|name| name.eq_ignore_ascii_case(suggested))
            {
                ordered.push(suggested.to_string());
            }
        }
        for name in available {
            if !ordered.iter().any(|chosen| chosen.eq_ignore_ascii_case(name)) {
                ordered.push(name.clone());
            }
        }
        ordered
    }
}

/// The default authenticator: resolves everything from session
/// properties under the service prefix (`smtp.auth.username`, ...).
pub struct DefaultAuthenticator {
    session: Session,
    prefix: String,
}

impl DefaultAuthenticator {
    pub fn new(session: &Session, prefix: &str) -> Self {
        Self {
            session: session.clone(),
            prefix: prefix.to_string(),
        }
    }

    fn lookup(&self, key: &str) -> MailForgeResult<String> {
        let qualified = format!("{}.{}", self.prefix, key);
        self.session
            .property(&qualified)
            .map(|value| value.to_string())
            .ok_or_else(|| {
                raise_error!(
                    format!("no authentication data for '{}'", qualified),
                    ErrorCode::NoAuthInformation
                )
            })
    }
}

impl Authenticator for DefaultAuthenticator {
    fn username(&self) -> MailForgeResult<String> {
        self.lookup(properties::AUTH_USERNAME)
    }

    fn password(&self) -> MailForgeResult<String> {
        self.lookup(properties::AUTH_PASSWORD)
    }

    fn service_name(&self) -> MailForgeResult<String> {
        Ok(self.prefix.clone())
    }

    fn access_token(&self) -> MailForgeResult<String> {
        self.lookup(properties::AUTH_ACCESS_TOKEN)
    }
}

impl SaslAuthenticator for DefaultAuthenticator {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_round_trip_and_types() {
        let mut session = Session::new();
        session.set_property("imap.server.port", 993);
        session.set_property("imap.connection.tls", "true");
        assert_eq!(session.property_u16("imap.server.port", 143).unwrap(), 993);
        assert!(session.property_bool("imap.connection.tls", false));
        assert_eq!(session.property_u16("imap.missing", 143).unwrap(), 143);
        assert_eq!(
            session.expect_property("nope").unwrap_err().code(),
            ErrorCode::NoSuchProperty
        );
    }

    #[test]
    fn invalid_port_type_is_reported() {
        let mut session = Session::new();
        session.set_property("smtp.server.port", "not-a-port");
        assert_eq!(
            session.property_u16("smtp.server.port", 25).unwrap_err().code(),
            ErrorCode::InvalidPropertyType
        );
    }

    #[test]
    fn default_authenticator_reads_prefixed_properties() {
        let mut session = Session::new();
        session.set_property("smtp.auth.username", "user");
        session.set_property("smtp.auth.password", "secret");
        let authenticator = DefaultAuthenticator::new(&session, "smtp");
        assert_eq!(authenticator.username().unwrap(), "user");
        assert_eq!(authenticator.password().unwrap(), "secret");
        assert_eq!(
            authenticator.access_token().unwrap_err().code(),
            ErrorCode::NoAuthInformation
        );
    }

    #[test]
    fn mechanism_order_puts_suggested_first() {
        let session = Session::new();
        let authenticator = DefaultAuthenticator::new(&session, "imap");
        let available = vec![
            "PLAIN".to_string(),
            "LOGIN".to_string(),
            "XOAUTH2".to_string(),
        ];
        let ordered = authenticator.mechanism_order(&available, Some("XOAUTH2"));
        assert_eq!(ordered, ["XOAUTH2", "PLAIN", "LOGIN"]);

        let unchanged = authenticator.mechanism_order(&available, None);
        assert_eq!(unchanged, ["PLAIN", "LOGIN", "XOAUTH2"]);
    }
}
