// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Service factory: resolve a service URL to a concrete store or
//! transport, with the session configured from the URL.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::imap::ImapStore;
use crate::modules::maildir::MaildirStore;
use crate::modules::pop3::Pop3Store;
use crate::modules::sendmail::SendmailTransport;
use crate::modules::session::url::ServiceUrl;
use crate::modules::session::Session;
use crate::modules::smtp::SmtpTransport;
use crate::modules::store::{Store, Transport};
use crate::raise_error;

/// Create a store for a `pop3://`, `pop3s://`, `imap://`, `imaps://`,
/// `maildir://` or `file://` URL. URL credentials and endpoint land in
/// the session under the scheme prefix.
pub fn create_store(mut session: Session, url: &str) -> MailForgeResult<Box<dyn Store>> {
    let service_url = ServiceUrl::parse(url)?;
    session.configure_from_url(&service_url);

    Ok(match service_url.scheme.as_str() {
        "pop3" => Box::new(Pop3Store::new(session)?),
        "pop3s" => Box::new(Pop3Store::new_secure(session)?),
        "imap" => Box::new(ImapStore::new(session)?),
        "imaps" => Box::new(ImapStore::new_secure(session)?),
        "maildir" | "file" => {
            let root = service_url.path.clone().ok_or_else(|| {
                raise_error!(
                    format!("'{}' URL has no mailbox path", service_url.scheme),
                    ErrorCode::MalformedUrl
                )
            })?;
            Box::new(MaildirStore::with_root(session, root.into())?)
        }
        other => {
            return Err(raise_error!(
                format!("scheme '{}' does not name a store", other),
                ErrorCode::NoFactoryAvailable
            ))
        }
    })
}

/// Create a transport for an `smtp://`, `smtps://`, `submission://` or
/// `sendmail://` URL.
pub fn create_transport(mut session: Session, url: &str) -> MailForgeResult<Box<dyn Transport>> {
    let service_url = ServiceUrl::parse(url)?;
    session.configure_from_url(&service_url);

    Ok(match service_url.scheme.as_str() {
        "smtp" | "submission" => {
            // the submission profile shares the smtp prefix
            if service_url.scheme == "submission" {
                session.set_property("smtp.server.address", &service_url.host);
                session.set_property("smtp.server.port", service_url.effective_port());
                if let Some(user) = &service_url.user {
                    session.set_property("smtp.auth.username", user);
                }
                if let Some(password) = &service_url.password {
                    session.set_property("smtp.auth.password", password);
                }
            }
            Box::new(SmtpTransport::new(session)?)
        }
        "smtps" => Box::new(SmtpTransport::new_secure(session)?),
        "sendmail" => Box::new(SendmailTransport::new(session)?),
        other => {
            return Err(raise_error!(
                format!("scheme '{}' does not name a transport", other),
                ErrorCode::NoFactoryAvailable
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::store::Service;

    #[test]
    fn store_schemes_resolve() {
        let store = create_store(Session::new(), "imap://user:pw@mail.example.org").unwrap();
        assert_eq!(
            store.session().property("imap.server.address"),
            Some("mail.example.org")
        );
        assert_eq!(store.session().property("imap.auth.username"), Some("user"));

        assert!(create_store(Session::new(), "pop3s://mail.example.org").is_ok());
        assert!(create_store(Session::new(), "maildir:///var/mail/u").is_ok());
    }

    #[test]
    fn transport_schemes_resolve() {
        assert!(create_transport(Session::new(), "smtp://mx.example.org").is_ok());
        assert!(create_transport(Session::new(), "smtps://mx.example.org").is_ok());
        assert!(create_transport(Session::new(), "sendmail://localhost").is_ok());
    }

    #[test]
    fn mismatched_scheme_kind_is_rejected() {
        assert_eq!(
            create_store(Session::new(), "smtp://mx.example.org")
                .unwrap_err()
                .code(),
            ErrorCode::NoFactoryAvailable
        );
        assert_eq!(
            create_transport(Session::new(), "imap://mail.example.org")
                .unwrap_err()
                .code(),
            ErrorCode::NoFactoryAvailable
        );
    }

    #[test]
    fn maildir_url_without_path_fails() {
        assert_eq!(
            create_store(Session::new(), "maildir://")
                .unwrap_err()
                .code(),
            ErrorCode::MalformedUrl
        );
    }
}
