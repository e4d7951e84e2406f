// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! The protocol-agnostic mailbox surface: services, stores, transports,
//! folders and messages.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::{MailForgeError, MailForgeResult};
use crate::modules::mime::address::Mailbox;
use crate::modules::net::socket::TcpSocket;
use crate::modules::net::tls::TlsSession;
use crate::modules::net::{
    DefaultTimeoutHandlerFactory, LogTracerFactory, Socket, TimeoutHandlerFactory, Tracer,
    TracerFactory,
};
use crate::modules::session::{
    properties, Authenticator, DefaultAuthenticator, Session,
};
use crate::modules::stream::{InputStream, ProgressListener};
use crate::raise_error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub mod folder;
pub mod message;
pub mod types;

pub use folder::Folder;
pub use message::StoredMessage;
pub use types::*;

/// Connection lifecycle of a service.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ServiceState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// A stateful connection owner (a store or a transport).
pub trait Service: Send {
    fn session(&self) -> &Session;

    fn state(&self) -> ServiceState;

    fn connect(&mut self) -> MailForgeResult<()>;

    fn disconnect(&mut self) -> MailForgeResult<()>;

    fn is_connected(&self) -> bool {
        self.state() == ServiceState::Connected
    }

    fn is_secured_connection(&self) -> bool;

    fn connection_infos(&self) -> ConnectionInfos;
}

/// A message-submission service.
pub trait Transport: Service {
    /// Send pre-generated message bytes to the given recipients.
    fn send(
        &mut self,
        from: &Mailbox,
        recipients: &[Mailbox],
        message: &mut dyn InputStream,
        size: u64,
        progress: Option<&mut dyn ProgressListener>,
    ) -> MailForgeResult<()>;

    /// Generate and send a message object; envelope addresses come
    /// from its From/To/Cc/Bcc fields.
    fn send_message(
        &mut self,
        message: &crate::modules::mime::part::Message,
        progress: Option<&mut dyn ProgressListener>,
    ) -> MailForgeResult<()>;
}

/// A mailbox-access service.
pub trait Store: Service {
    fn default_folder(&mut self) -> MailForgeResult<Box<dyn Folder>>;

    fn root_folder(&mut self) -> MailForgeResult<Box<dyn Folder>>;

    fn folder(&mut self, path: &FolderPath) -> MailForgeResult<Box<dyn Folder>>;
}

impl std::fmt::Debug for dyn Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("state", &self.state()).finish()
    }
}

impl std::fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").field("state", &self.state()).finish()
    }
}

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Everything a concrete service shares: the session slice it reads its
/// configuration from, the authenticator, the injected factories and
/// the lifecycle state.
pub struct ServiceCore {
    session: Session,
    prefix: String,
    state: ServiceState,
    authenticator: Arc<dyn Authenticator>,
    timeout_factory: Arc<dyn TimeoutHandlerFactory>,
    tracer_factory: Arc<dyn TracerFactory>,
    tls_session: Option<Arc<TlsSession>>,
    secured: bool,
    infos: ConnectionInfos,
}

impl ServiceCore {
    pub fn new(
        session: Session,
        prefix: &str,
        authenticator: Option<Arc<dyn Authenticator>>,
    ) -> MailForgeResult<Self> {
        let default_timeout =
            Duration::from_millis(session.property_u64(
                &format!("{}.{}", prefix, properties::TIMEOUT_MS),
                60_000,
            )?);
        let authenticator = authenticator
            .unwrap_or_else(|| Arc::new(DefaultAuthenticator::new(&session, prefix)));
        Ok(Self {
            session,
            prefix: prefix.to_string(),
            state: ServiceState::Disconnected,
            authenticator,
            timeout_factory: Arc::new(DefaultTimeoutHandlerFactory::new(default_timeout)),
            tracer_factory: Arc::new(LogTracerFactory),
            tls_session: None,
            secured: false,
            infos: ConnectionInfos::default(),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn set_state(&mut self, state: ServiceState) {
        self.state = state;
    }

    pub fn authenticator(&self) -> Arc<dyn Authenticator> {
        self.authenticator.clone()
    }

    /// Replace the injected timeout-handler factory.
    pub fn set_timeout_factory(&mut self, factory: Arc<dyn TimeoutHandlerFactory>) {
        self.timeout_factory = factory;
    }

    /// Replace the injected tracer factory.
    pub fn set_tracer_factory(&mut self, factory: Arc<dyn TracerFactory>) {
        self.tracer_factory = factory;
    }

    pub fn set_tls_session(&mut self, tls: Arc<TlsSession>) {
        self.tls_session = Some(tls);
    }

    pub fn is_secured(&self) -> bool {
        self.secured
    }

    pub fn connection_infos(&self) -> ConnectionInfos {
        self.infos.clone()
    }

    fn property(&self, key: &str) -> Option<&str> {
        self.session.property(&format!("{}.{}", self.prefix, key))
    }

    pub fn server_address(&self) -> MailForgeResult<String> {
        self.property(properties::SERVER_ADDRESS)
            .map(|address| address.to_string())
            .ok_or_else(|| {
                raise_error!(
                    format!("{}.{} is not configured", self.prefix, properties::SERVER_ADDRESS),
                    ErrorCode::NoSuchProperty
                )
            })
    }

    pub fn server_port(&self, default: u16) -> MailForgeResult<u16> {
        self.session
            .property_u16(&format!("{}.{}", self.prefix, properties::SERVER_PORT), default)
    }

    pub fn wants_tls(&self) -> bool {
        self.session
            .property_bool(&format!("{}.{}", self.prefix, properties::CONNECTION_TLS), false)
    }

    pub fn requires_tls(&self) -> bool {
        self.session.property_bool(
            &format!("{}.{}", self.prefix, properties::CONNECTION_TLS_REQUIRED),
            false,
        )
    }

    pub fn needs_authentication(&self) -> bool {
        self.session.property_bool(
            &format!("{}.{}", self.prefix, properties::NEED_AUTHENTICATION),
            false,
        ) || self
            .property(properties::AUTH_USERNAME)
            .is_some()
    }

    pub fn tracer(&self) -> Arc<dyn Tracer> {
        self.tracer_factory
            .create(&self.prefix, CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    fn tls_session_or_default(&mut self) -> MailForgeResult<Arc<TlsSession>> {
        if let Some(tls) = &self.tls_session {
            return Ok(tls.clone());
        }
        let tls = Arc::new(TlsSession::new()?);
        self.tls_session = Some(tls.clone());
        Ok(tls)
    }

    /// Open the transport socket for this service: TCP, timeout
    /// handler, tracer, and an immediate TLS tunnel when requested.
    pub fn open_socket(
        &mut self,
        default_port: u16,
        implicit_tls: bool,
    ) -> MailForgeResult<Box<dyn Socket>> {
        let address = self.server_address()?;
        let port = self.server_port(default_port)?;

        self.state = ServiceState::Connecting;
        let mut socket: Box<dyn Socket> = Box::new(TcpSocket::new());
        socket.set_timeout_handler(Some(self.timeout_factory.create()));
        socket.set_tracer(Some(self.tracer()));

        if let Err(error) = socket.connect(&address, port) {
            self.state = ServiceState::Disconnected;
            return Err(error);
        }

        self.infos = ConnectionInfos {
            host: address.clone(),
            port,
            secured: false,
        };
        self.secured = false;

        if implicit_tls {
            return self.wrap_tls(socket, &address);
        }
        Ok(socket)
    }

    /// Upgrade `socket` to TLS (used both for implicit tunnels and
    /// after a STARTTLS exchange).
    pub fn wrap_tls(
        &mut self,
        socket: Box<dyn Socket>,
        hostname: &str,
    ) -> MailForgeResult<Box<dyn Socket>> {
        let tls = self.tls_session_or_default()?;
        match tls.wrap(socket, hostname) {
            Ok(wrapped) => {
                debug!("{}: connection to {} secured", self.prefix, hostname);
                self.secured = true;
                self.infos.secured = true;
                Ok(Box::new(wrapped))
            }
            Err(error) => {
                self.state = ServiceState::Disconnected;
                Err(error)
            }
        }
    }

    /// Create a timeout handler for one operation.
    pub fn timeout_handler(&self) -> Box<dyn crate::modules::net::TimeoutHandler> {
        self.timeout_factory.create()
    }

    /// Transition to disconnected before surfacing a fatal error.
    pub fn fail_disconnected(&mut self, error: MailForgeError) -> MailForgeError {
        if error.code().is_connection_fatal() {
            self.state = ServiceState::Disconnected;
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_reads_prefixed_configuration() {
        let mut session = Session::new();
        session.set_property("imap.server.address", "mail.example.org");
        session.set_property("imap.server.port", 1143);
        session.set_property("imap.connection.tls", "true");
        session.set_property("imap.auth.username", "jane");

        let core = ServiceCore::new(session, "imap", None).unwrap();
        assert_eq!(core.server_address().unwrap(), "mail.example.org");
        assert_eq!(core.server_port(143).unwrap(), 1143);
        assert!(core.wants_tls());
        assert!(!core.requires_tls());
        assert!(core.needs_authentication());
        assert_eq!(core.state(), ServiceState::Disconnected);
    }

    #[test]
    fn missing_address_is_reported() {
        let core = ServiceCore::new(Session::new(), "smtp", None).unwrap();
        assert_eq!(
            core.server_address().unwrap_err().code(),
            ErrorCode::NoSuchProperty
        );
    }
}
