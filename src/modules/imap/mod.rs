// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! IMAP4rev1 store (RFC 3501), at the store/transport contract level:
//! tagged commands, untagged status lines and literals are handled; the
//! full response grammar is out of scope.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::net::text_protocol::TextProtocolConnection;
use crate::modules::net::Socket;
use crate::modules::sasl::SaslContext;
use crate::modules::session::Session;
use crate::modules::store::{
    ConnectionInfos, Folder, FolderPath, Service, ServiceCore, ServiceState, Store,
};
use crate::{base64_encode, raise_error};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub mod folder;


pub(crate) type SharedImapConnection = Arc<Mutex<ImapConnection>>;

/// One line of an IMAP response. Literal payloads referenced from the
/// line are collected in receive order.
#[derive(Clone, Debug, Default)]
pub struct ImapLine {
    pub text: String,
    pub literals: Vec<Vec<u8>>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ImapStatus {
    Ok,
    No,
    Bad,
}

#[derive(Clone, Debug)]
pub struct ImapResponse {
    pub status: ImapStatus,
    /// Text of the tagged completion line.
    pub text: String,
    pub untagged: Vec<ImapLine>,
}

impl ImapResponse {
    /// First untagged line containing `marker`.
    pub fn find_untagged(&self, marker: &str) -> Option<&ImapLine> {
        self.untagged.iter().find(|line| line.text.contains(marker))
    }
}

/// The tagged-command engine over a text connection.
pub struct ImapConnection {
    connection: TextProtocolConnection,
    tag_counter: u64,
}

impl ImapConnection {
    pub fn new(connection: TextProtocolConnection) -> Self {
        Self {
            connection,
            tag_counter: 0,
        }
    }

    pub fn connection_mut(&mut self) -> &mut TextProtocolConnection {
        &mut self.connection
    }

    fn next_tag(&mut self) -> String {
        self.tag_counter += 1;
        format!("a{:04}", self.tag_counter)
    }

    /// Read one response line, pulling in any `{N}` literals it
    /// references.
    fn read_response_line(&mut self) -> MailForgeResult<ImapLine> {
        let mut line = ImapLine::default();
        loop {
            let segment = self.connection.read_line()?;
            line.text.push_str(&segment);
            let Some(size) = literal_size(&segment) else {
                return Ok(line);
            };
            line.literals.push(self.connection.read_exact(size)?);
            line.text.push_str("<literal>");
        }
    }

    /// Run one command to its tagged completion.
    pub fn command(&mut self, command: &str) -> MailForgeResult<ImapResponse> {
        let tag = self.next_tag();
        self.connection.write_line(&format!("{} {}", tag, command))?;
        self.collect_response(&tag)
    }

    /// Run a command that sends a literal after the server's `+`
    /// continuation (APPEND).
    pub fn command_with_literal(
        &mut self,
        command: &str,
        literal: &[u8],
    ) -> MailForgeResult<ImapResponse> {
        let tag = self.next_tag();
        self.connection
            .write_line(&format!("{} {} {{{}}}", tag, command, literal.len()))?;
        loop {
            let line = self.connection.read_line()?;
            if line.starts_with('+') {
                break;
            }
            if line.starts_with(&format!("{} ", tag)) {
                return Err(raise_error!(
                    format!("APPEND rejected: {}", line),
                    ErrorCode::CommandFailed
                ));
            }
            // untagged noise before the continuation is legal; skip it
        }
        self.connection.write_raw(literal)?;
        self.connection.write_raw(b"\r\n")?;
        self.collect_response(&tag)
    }

    fn collect_response(&mut self, tag: &str) -> MailForgeResult<ImapResponse> {
        let mut untagged = Vec::new();
        loop {
            let line = self.read_response_line()?;
            if let Some(rest) = line.text.strip_prefix(&format!("{} ", tag)) {
                let (status, text) = split_status(rest)?;
                return Ok(ImapResponse {
                    status,
                    text: text.to_string(),
                    untagged,
                });
            }
            if line.text.starts_with('*') || line.text.starts_with('+') {
                untagged.push(line);
                continue;
            }
            return Err(raise_error!(
                format!("unexpected IMAP line: '{}'", line.text),
                ErrorCode::InvalidResponse
            ));
        }
    }

    /// Run a command, failing unless it completes OK.
    pub fn expect_ok(&mut self, command: &str) -> MailForgeResult<ImapResponse> {
        let verb = command.split_ascii_whitespace().next().unwrap_or(command).to_string();
        let response = self.command(command)?;
        if response.status != ImapStatus::Ok {
            return Err(raise_error!(
                format!("{} failed: {}", verb, response.text),
                ErrorCode::CommandFailed
            ));
        }
        Ok(response)
    }
}

fn split_status(rest: &str) -> MailForgeResult<(ImapStatus, &str)> {
    let (word, text) = rest.split_once(' ').unwrap_or((rest, ""));
    let status = match word.to_ascii_uppercase().as_str() {
        "OK" => ImapStatus::Ok,
        "NO" => ImapStatus::No,
        "BAD" => ImapStatus::Bad,
        other => {
            return Err(raise_error!(
                format!("unknown IMAP completion: '{}'", other),
                ErrorCode::InvalidResponse
            ))
        }
    };
    Ok((status, text))
}

/// Size of the `{N}` literal a line announces, when it ends with one.
fn literal_size(line: &str) -> Option<usize> {
    let trimmed = line.trim_end();
    if !trimmed.ends_with('}') {
        return None;
    }
    let open = trimmed.rfind('{')?;
    trimmed[open + 1..trimmed.len() - 1].parse().ok()
}

/// Quote a mailbox name for the wire.
pub(crate) fn quote_mailbox(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

pub struct ImapStore {
    core: ServiceCore,
    implicit_tls: bool,
    connection: Option<SharedImapConnection>,
    capabilities: HashSet<String>,
}

impl ImapStore {
    pub fn new(session: Session) -> MailForgeResult<Self> {
        let core = ServiceCore::new(session, "imap", None)?;
        Ok(Self {
            core,
            implicit_tls: false,
            connection: None,
            capabilities: HashSet::new(),
        })
    }

    /// IMAPS (implicit TLS tunnel).
    pub fn new_secure(session: Session) -> MailForgeResult<Self> {
        let core = ServiceCore::new(session, "imaps", None)?;
        Ok(Self {
            core,
            implicit_tls: true,
            connection: None,
            capabilities: HashSet::new(),
        })
    }

    pub fn core_mut(&mut self) -> &mut ServiceCore {
        &mut self.core
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.contains(&name.to_ascii_uppercase())
    }

    fn load_capabilities(&mut self, connection: &SharedImapConnection) -> MailForgeResult<()> {
        let mut guard = connection.lock().expect("imap connection poisoned");
        let response = guard.expect_ok("CAPABILITY")?;
        drop(guard);
        self.capabilities.clear();
        if let Some(line) = response.find_untagged("CAPABILITY") {
            for word in line.text.split_ascii_whitespace().skip(2) {
                self.capabilities.insert(word.to_ascii_uppercase());
            }
        }
        Ok(())
    }

    fn authenticate(&mut self, connection: &SharedImapConnection) -> MailForgeResult<()> {
        let authenticator = self.core.authenticator();
        let sasl = SaslContext::new();

        let offered: Vec<String> = self
            .capabilities
            .iter()
            .filter_map(|capability| capability.strip_prefix("AUTH="))
            .map(|name| name.to_string())
            .collect();

        if let Some(mechanism) = sasl.suggest_mechanism(&offered) {
            let mut session =
                sasl.create_session(self.core.prefix(), authenticator.clone(), &mechanism)?;
            debug!("authenticating via {}", mechanism);
            let mut guard = connection.lock().expect("imap connection poisoned");
            let tag = guard.next_tag();
            guard
                .connection
                .write_line(&format!("{} AUTHENTICATE {}", tag, mechanism))?;
            loop {
                let line = guard.connection.read_line()?;
                if let Some(challenge_text) = line.strip_prefix('+') {
                    let challenge = crate::base64_decode!(challenge_text.trim())
                        .unwrap_or_default();
                    let (response, _) = session.step(&challenge)?;
                    guard.connection.write_line(&base64_encode!(&response))?;
                    continue;
                }
                if line.starts_with(&format!("{} ", tag)) {
                    let rest = &line[tag.len() + 1..];
                    let (status, text) = split_status(rest)?;
                    if status == ImapStatus::Ok {
                        return Ok(());
                    }
                    return Err(raise_error!(
                        format!("authentication failed: {}", text),
                        ErrorCode::AuthenticationFailed
                    ));
                }
                // untagged lines during auth are ignored
            }
        }

        // no SASL overlap: plain LOGIN
        let username = authenticator.username()?;
        let password = authenticator.password()?;
        let mut guard = connection.lock().expect("imap connection poisoned");
        let response = guard.command(&format!(
            "LOGIN {} {}",
            quote_mailbox(&username),
            quote_mailbox(&password)
        ))?;
        if response.status != ImapStatus::Ok {
            return Err(raise_error!(
                format!("authentication failed: {}", response.text),
                ErrorCode::AuthenticationFailed
            ));
        }
        Ok(())
    }

    fn establish(&mut self, socket: Box<dyn Socket>) -> MailForgeResult<()> {
        let tracer = self.core.tracer();
        let connection: SharedImapConnection = Arc::new(Mutex::new(ImapConnection::new(
            TextProtocolConnection::new(socket, Some(tracer)),
        )));

        let greeting = {
            let mut guard = connection.lock().expect("imap connection poisoned");
            guard.connection.read_line()?
        };
        let already_authenticated = greeting.starts_with("* PREAUTH");
        if !greeting.starts_with("* OK") && !already_authenticated {
            self.core.set_state(ServiceState::Disconnected);
            return Err(raise_error!(
                format!("unexpected IMAP greeting: '{}'", greeting),
                ErrorCode::ConnectionGreetingError
            ));
        }

        self.load_capabilities(&connection)?;

        if !self.implicit_tls && self.core.wants_tls() {
            if self.has_capability("STARTTLS") {
                {
                    let mut guard = connection.lock().expect("imap connection poisoned");
                    guard.expect_ok("STARTTLS")?;
                    let hostname = self.core.server_address()?;
                    let core = &mut self.core;
                    guard
                        .connection
                        .replace_socket(|socket| core.wrap_tls(socket, &hostname))?;
                }
                self.load_capabilities(&connection)?;
            } else if self.core.requires_tls() {
                self.core.set_state(ServiceState::Disconnected);
                return Err(raise_error!(
                    "server does not offer STARTTLS but TLS is required".into(),
                    ErrorCode::UnsupportedOption
                ));
            }
        }

        if !already_authenticated {
            self.authenticate(&connection).map_err(|error| {
                self.core.set_state(ServiceState::Disconnected);
                error
            })?;
        }

        self.connection = Some(connection);
        self.core.set_state(ServiceState::Connected);
        Ok(())
    }
}

impl Service for ImapStore {
    fn session(&self) -> &Session {
        self.core.session()
    }

    fn state(&self) -> ServiceState {
        self.core.state()
    }

    fn connect(&mut self) -> MailForgeResult<()> {
        if self.core.state() != ServiceState::Disconnected {
            return Err(raise_error!(
                "store is already connected".into(),
                ErrorCode::AlreadyConnected
            ));
        }
        let default_port = if self.implicit_tls { 993 } else { 143 };
        let socket = self.core.open_socket(default_port, self.implicit_tls)?;
        self.establish(socket).map_err(|error| {
            self.connection = None;
            self.core.set_state(ServiceState::Disconnected);
            error
        })
    }

    fn disconnect(&mut self) -> MailForgeResult<()> {
        if self.core.state() != ServiceState::Connected {
            return Err(raise_error!(
                "store is not connected".into(),
                ErrorCode::NotConnected
            ));
        }
        self.core.set_state(ServiceState::Disconnecting);
        if let Some(connection) = self.connection.take() {
            let mut guard = connection.lock().expect("imap connection poisoned");
            let _ = guard.command("LOGOUT");
            guard.connection.disconnect();
        }
        self.core.set_state(ServiceState::Disconnected);
        Ok(())
    }

    fn is_secured_connection(&self) -> bool {
        self.core.is_secured()
    }

    fn connection_infos(&self) -> ConnectionInfos {
        self.core.connection_infos()
    }
}

impl Store for ImapStore {
    fn default_folder(&mut self) -> MailForgeResult<Box<dyn Folder>> {
        self.folder(&FolderPath::from_components(vec!["INBOX".to_string()]))
    }

    fn root_folder(&mut self) -> MailForgeResult<Box<dyn Folder>> {
        self.folder(&FolderPath::root())
    }

    fn folder(&mut self, path: &FolderPath) -> MailForgeResult<Box<dyn Folder>> {
        if self.core.state() != ServiceState::Connected {
            return Err(raise_error!(
                "store is not connected".into(),
                ErrorCode::NotConnected
            ));
        }
        Ok(Box::new(folder::ImapFolder::new(
            self.connection
                .clone()
                .expect("connected store has a connection"),
            path.clone(),
        )))
    }
}
