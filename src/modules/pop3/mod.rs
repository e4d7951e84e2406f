// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! POP3 store (RFC 1939): a single-folder mailbox with download,
//! delete-on-quit semantics, STLS and USER/PASS or SASL login.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::mime::datetime::DateTime;
use crate::modules::mime::header::Header;
use crate::modules::mime::ParsingContext;
use crate::modules::mime::Component;
use crate::modules::net::text_protocol::TextProtocolConnection;
use crate::modules::net::Socket;
use crate::modules::sasl::SaslContext;
use crate::modules::session::Session;
use crate::modules::store::message::{report_extracted, write_region, StoredMessage};
use crate::modules::store::{
    ConnectionInfos, FetchAttributes, Flags, FlagsOp, Folder, FolderPath, FolderStatus,
    FolderType, MessageSet, MessageStructure, OpenMode, Service, ServiceCore, ServiceState, Store,
};
use crate::modules::stream::{OutputStream, ProgressListener};
use crate::{base64_encode, raise_error, unfetched};
use std::sync::{Arc, Mutex};
use tracing::debug;


type SharedConnection = Arc<Mutex<TextProtocolConnection>>;

/// Strip the `+OK` marker, or fail with the raw server line.
fn expect_ok(line: &str, what: &str) -> MailForgeResult<String> {
    if let Some(rest) = line.strip_prefix("+OK") {
        return Ok(rest.trim_start().to_string());
    }
    if line.starts_with("-ERR") {
        return Err(raise_error!(
            format!("{} failed: {}", what, line),
            ErrorCode::CommandFailed
        ));
    }
    Err(raise_error!(
        format!("malformed POP3 reply to {}: '{}'", what, line),
        ErrorCode::InvalidResponse
    ))
}

/// Read a dot-terminated multi-line payload, undoing byte-stuffing.
fn read_multiline(connection: &mut TextProtocolConnection) -> MailForgeResult<Vec<u8>> {
    let mut data = Vec::new();
    loop {
        let line = connection.read_line()?;
        if line == "." {
            return Ok(data);
        }
        let content = line.strip_prefix('.').unwrap_or(&line);
        data.extend_from_slice(content.as_bytes());
        data.extend_from_slice(b"\r\n");
    }
}

fn run_command(
    connection: &SharedConnection,
    command: &str,
    what: &str,
) -> MailForgeResult<String> {
    let mut guard = connection.lock().expect("pop3 connection poisoned");
    guard.write_line(command)?;
    let line = guard.read_line()?;
    expect_ok(&line, what)
}

pub struct Pop3Store {
    core: ServiceCore,
    implicit_tls: bool,
    connection: Option<SharedConnection>,
}

impl Pop3Store {
    pub fn new(session: Session) -> MailForgeResult<Self> {
        let core = ServiceCore::new(session, "pop3", None)?;
        Ok(Self {
            core,
            implicit_tls: false,
            connection: None,
        })
    }

    /// POP3S (implicit TLS tunnel).
    pub fn new_secure(session: Session) -> MailForgeResult<Self> {
        let core = ServiceCore::new(session, "pop3s", None)?;
        Ok(Self {
            core,
            implicit_tls: true,
            connection: None,
        })
    }

    pub fn core_mut(&mut self) -> &mut ServiceCore {
        &mut self.core
    }

    fn authenticate(&mut self, connection: &SharedConnection) -> MailForgeResult<()> {
        let authenticator = self.core.authenticator();

        // prefer XOAUTH2 when an access token is configured
        if let Ok(token) = authenticator.access_token() {
            if !token.is_empty() {
                let mut sasl = SaslContext::new().create_session(
                    self.core.prefix(),
                    authenticator.clone(),
                    "XOAUTH2",
                )?;
                let (initial, _) = sasl.step(b"")?;
                let reply = run_command(
                    connection,
                    &format!("AUTH XOAUTH2 {}", base64_encode!(&initial)),
                    "AUTH XOAUTH2",
                )
                .map_err(|error| {
                    raise_error!(
                        format!("authentication failed: {}", error.message()),
                        ErrorCode::AuthenticationFailed
                    )
                })?;
                debug!("POP3 XOAUTH2 authentication accepted: {}", reply);
                return Ok(());
            }
        }

        let username = authenticator.username().map_err(|_| {
            raise_error!(
                "no POP3 credentials configured".into(),
                ErrorCode::NoAuthInformation
            )
        })?;
        let password = authenticator.password()?;
        run_command(connection, &format!("USER {}", username), "USER").map_err(|error| {
            raise_error!(
                format!("authentication failed: {}", error.message()),
                ErrorCode::AuthenticationFailed
            )
        })?;
        run_command(connection, &format!("PASS {}", password), "PASS").map_err(|error| {
            raise_error!(
                format!("authentication failed: {}", error.message()),
                ErrorCode::AuthenticationFailed
            )
        })?;
        Ok(())
    }

    fn establish(&mut self, socket: Box<dyn Socket>) -> MailForgeResult<()> {
        let tracer = self.core.tracer();
        let connection: SharedConnection = Arc::new(Mutex::new(TextProtocolConnection::new(
            socket,
            Some(tracer),
        )));

        {
            let mut guard = connection.lock().expect("pop3 connection poisoned");
            let greeting = guard.read_line()?;
            if !greeting.starts_with("+OK") {
                self.core.set_state(ServiceState::Disconnected);
                return Err(raise_error!(
                    format!("unexpected POP3 greeting: '{}'", greeting),
                    ErrorCode::ConnectionGreetingError
                ));
            }
        }

        if !self.implicit_tls && self.core.wants_tls() {
            let upgraded = run_command(&connection, "STLS", "STLS");
            match upgraded {
                Ok(_) => {
                    let hostname = self.core.server_address()?;
                    let core = &mut self.core;
                    connection
                        .lock()
                        .expect("pop3 connection poisoned")
                        .replace_socket(|socket| core.wrap_tls(socket, &hostname))?;
                }
                Err(error) if self.core.requires_tls() => {
                    self.core.set_state(ServiceState::Disconnected);
                    return Err(raise_error!(
                        format!("server refused STLS: {}", error.message()),
                        ErrorCode::UnsupportedOption
                    ));
                }
                Err(_) => {}
            }
        }

        if self.core.needs_authentication() {
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

impl Service for Pop3Store {
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
        let default_port = if self.implicit_tls { 995 } else { 110 };
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
            // QUIT commits pending deletions
            let _ = run_command(&connection, "QUIT", "QUIT");
            connection
                .lock()
                .expect("pop3 connection poisoned")
                .disconnect();
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

impl Store for Pop3Store {
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
        let name = path.join('/');
        if !path.is_root() && !name.eq_ignore_ascii_case("INBOX") {
            return Err(raise_error!(
                format!("POP3 has no folder '{}'", name),
                ErrorCode::FolderNotFound
            ));
        }
        Ok(Box::new(Pop3Folder {
            connection: self
                .connection
                .clone()
                .expect("connected store has a connection"),
            path: path.clone(),
            mode: None,
            count: 0,
        }))
    }
}

/// The single POP3 folder. Deletions are staged with `DELE` and become
/// permanent when the store disconnects with `QUIT`.
pub struct Pop3Folder {
    connection: SharedConnection,
    path: FolderPath,
    mode: Option<OpenMode>,
    count: usize,
}

impl Pop3Folder {
    fn require_open(&self) -> MailForgeResult<()> {
        if self.mode.is_none() {
            return Err(raise_error!(
                "folder is not open".into(),
                ErrorCode::IllegalState
            ));
        }
        Ok(())
    }

    fn unsupported<T>(&self, what: &str) -> MailForgeResult<T> {
        Err(raise_error!(
            format!("POP3 does not support {}", what),
            ErrorCode::OperationNotSupported
        ))
    }

    fn stat(&self) -> MailForgeResult<usize> {
        let reply = run_command(&self.connection, "STAT", "STAT")?;
        let count = reply
            .split_ascii_whitespace()
            .next()
            .and_then(|word| word.parse().ok())
            .ok_or_else(|| {
                raise_error!(
                    format!("malformed STAT reply: '{}'", reply),
                    ErrorCode::InvalidResponse
                )
            })?;
        Ok(count)
    }
}

impl Folder for Pop3Folder {
    fn path(&self) -> FolderPath {
        self.path.clone()
    }

    fn open(&mut self, mode: OpenMode) -> MailForgeResult<()> {
        if self.mode.is_some() {
            return Err(raise_error!(
                "folder is already open".into(),
                ErrorCode::FolderAlreadyOpen
            ));
        }
        self.count = self.stat()?;
        self.mode = Some(match mode {
            OpenMode::Default => OpenMode::ReadWrite,
            other => other,
        });
        Ok(())
    }

    fn close(&mut self, expunge: bool) -> MailForgeResult<()> {
        self.require_open()?;
        if !expunge {
            // undo staged deletions
            let _ = run_command(&self.connection, "RSET", "RSET");
        }
        self.mode = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.mode.is_some()
    }

    fn mode(&self) -> Option<OpenMode> {
        self.mode
    }

    fn exists(&self) -> bool {
        true
    }

    fn create(&mut self, _folder_type: FolderType) -> MailForgeResult<()> {
        self.unsupported("creating folders")
    }

    fn destroy(&mut self) -> MailForgeResult<()> {
        self.unsupported("destroying folders")
    }

    fn rename(&mut self, _new_path: &FolderPath) -> MailForgeResult<()> {
        self.unsupported("renaming folders")
    }

    fn message_count(&mut self) -> MailForgeResult<usize> {
        if self.is_open() {
            Ok(self.count)
        } else {
            self.stat()
        }
    }

    fn status(&mut self) -> MailForgeResult<FolderStatus> {
        Ok(FolderStatus {
            message_count: self.message_count()?,
            // the protocol carries no read/unread state
            unseen_count: 0,
        })
    }

    fn get_messages(&mut self, set: &MessageSet) -> MailForgeResult<Vec<Box<dyn StoredMessage>>> {
        self.require_open()?;
        let mut messages: Vec<Box<dyn StoredMessage>> = Vec::new();
        for number in set.numbers() {
            if number == 0 || number as usize > self.count {
                return Err(raise_error!(
                    format!("no message {} (folder has {})", number, self.count),
                    ErrorCode::MessageNotFound
                ));
            }
            messages.push(Box::new(Pop3Message {
                connection: self.connection.clone(),
                number,
                fetched: FetchAttributes::empty(),
                size: None,
                header: None,
                deleted: false,
            }));
        }
        Ok(messages)
    }

    fn add_message(
        &mut self,
        _message: &[u8],
        _flags: Flags,
        _date: Option<&DateTime>,
    ) -> MailForgeResult<MessageSet> {
        self.unsupported("appending messages")
    }

    fn copy_messages(
        &mut self,
        _destination: &FolderPath,
        _set: &MessageSet,
    ) -> MailForgeResult<MessageSet> {
        self.unsupported("copying messages")
    }

    fn delete_messages(&mut self, set: &MessageSet) -> MailForgeResult<()> {
        self.require_open()?;
        if self.mode == Some(OpenMode::ReadOnly) {
            return Err(raise_error!(
                "folder is open read-only".into(),
                ErrorCode::IllegalOperation
            ));
        }
        for number in set.numbers() {
            run_command(&self.connection, &format!("DELE {}", number), "DELE")?;
        }
        Ok(())
    }

    fn set_message_flags(
        &mut self,
        set: &MessageSet,
        flags: Flags,
        op: FlagsOp,
    ) -> MailForgeResult<()> {
        // deletion is the only flag POP3 can express
        if flags.contains(Flags::DELETED) && op != FlagsOp::Remove {
            return self.delete_messages(set);
        }
        self.unsupported("message flags")
    }

    fn expunge(&mut self) -> MailForgeResult<()> {
        // staged deletions are committed by QUIT at disconnect
        self.require_open()?;
        Ok(())
    }

    fn sub_folders(&mut self) -> MailForgeResult<Vec<FolderPath>> {
        Ok(Vec::new())
    }
}

/// One POP3 message, lazily fetched with LIST/TOP/RETR.
pub struct Pop3Message {
    connection: SharedConnection,
    number: u32,
    fetched: FetchAttributes,
    size: Option<u64>,
    header: Option<Header>,
    deleted: bool,
}

impl Pop3Message {
    fn retrieve(&self) -> MailForgeResult<Vec<u8>> {
        let mut guard = self.connection.lock().expect("pop3 connection poisoned");
        guard.write_line(&format!("RETR {}", self.number))?;
        let status = guard.read_line()?;
        expect_ok(&status, "RETR")?;
        read_multiline(&mut guard)
    }

    /// The server-assigned unique id line of UIDL.
    pub fn unique_id(&self) -> MailForgeResult<String> {
        let reply = run_command(
            &self.connection,
            &format!("UIDL {}", self.number),
            "UIDL",
        )?;
        reply
            .split_ascii_whitespace()
            .nth(1)
            .map(|uid| uid.to_string())
            .ok_or_else(|| {
                raise_error!(
                    format!("malformed UIDL reply: '{}'", reply),
                    ErrorCode::InvalidResponse
                )
            })
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl StoredMessage for Pop3Message {
    fn number(&self) -> u32 {
        self.number
    }

    fn uid(&self) -> Option<u64> {
        // POP3 UIDL ids are opaque strings, not numeric uids
        None
    }

    fn fetched_attributes(&self) -> FetchAttributes {
        self.fetched
    }

    fn fetch(&mut self, attributes: FetchAttributes) -> MailForgeResult<()> {
        let missing = self.fetched.missing_from(attributes);
        if missing.is_empty() {
            return Ok(());
        }

        if missing.contains(FetchAttributes::SIZE) && self.size.is_none() {
            let reply = run_command(
                &self.connection,
                &format!("LIST {}", self.number),
                "LIST",
            )?;
            self.size = reply
                .split_ascii_whitespace()
                .nth(1)
                .and_then(|word| word.parse().ok());
            if self.size.is_none() {
                return Err(raise_error!(
                    format!("malformed LIST reply: '{}'", reply),
                    ErrorCode::InvalidResponse
                ));
            }
        }

        let wants_header = missing.contains(FetchAttributes::FULL_HEADER)
            || missing.contains(FetchAttributes::ENVELOPE)
            || missing.contains(FetchAttributes::CUSTOM_HEADERS)
            || missing.contains(FetchAttributes::IMPORTANCE);
        if wants_header && self.header.is_none() {
            let mut guard = self.connection.lock().expect("pop3 connection poisoned");
            guard.write_line(&format!("TOP {} 0", self.number))?;
            let status = guard.read_line()?;
            expect_ok(&status, "TOP")?;
            let bytes = read_multiline(&mut guard)?;
            drop(guard);
            let mut header = Header::new();
            let length = bytes.len();
            header.parse(&ParsingContext::default(), &bytes, 0, length)?;
            self.header = Some(header);
        }

        self.fetched.insert(attributes);
        Ok(())
    }

    fn size(&self) -> MailForgeResult<u64> {
        self.size.ok_or_else(|| unfetched!("size"))
    }

    fn flags(&self) -> MailForgeResult<Flags> {
        // POP3 messages carry no flags; deletion staging is local
        if self.deleted {
            Ok(Flags::DELETED)
        } else {
            Ok(Flags::empty())
        }
    }

    fn header(&self) -> MailForgeResult<&Header> {
        self.header.as_ref().ok_or_else(|| unfetched!("header"))
    }

    fn structure(&self) -> MailForgeResult<&MessageStructure> {
        Err(raise_error!(
            "POP3 cannot describe message structure without download".into(),
            ErrorCode::PartialFetchNotSupported
        ))
    }

    fn extract(
        &mut self,
        out: &mut dyn OutputStream,
        progress: Option<&mut dyn ProgressListener>,
    ) -> MailForgeResult<()> {
        let data = self.retrieve()?;
        out.write(&data)?;
        report_extracted(progress, data.len());
        Ok(())
    }

    fn extract_part(
        &mut self,
        part_path: &[usize],
        out: &mut dyn OutputStream,
        progress: Option<&mut dyn ProgressListener>,
        start: Option<u64>,
        length: Option<u64>,
    ) -> MailForgeResult<()> {
        // POP3 cannot address parts; download and slice locally
        let data = self.retrieve()?;
        let message = crate::modules::mime::part::Message::parse_message(
            &ParsingContext::default(),
            data,
        )?;
        let mut part: &crate::modules::mime::part::BodyPart = &message;
        for &index in part_path {
            part = part.body().part_at(index).ok_or_else(|| {
                raise_error!(
                    format!("message has no part at index {}", index),
                    ErrorCode::NoSuchPart
                )
            })?;
        }
        let bytes = crate::modules::content::extract_to_vec(part.body().contents().as_ref())?;
        write_region(&bytes, out, start, length)?;
        report_extracted(progress, bytes.len());
        Ok(())
    }
}
