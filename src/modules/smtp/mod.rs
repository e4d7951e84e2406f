// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! SMTP transport (RFC 5321): greeting, EHLO, STARTTLS, SASL
//! authentication and message submission with dot-stuffing.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::mime::address::Mailbox;
use crate::modules::mime::registry::fields;
use crate::modules::mime::GenerationContext;
use crate::modules::net::text_protocol::TextProtocolConnection;
use crate::modules::net::Socket;
use crate::modules::platform;
use crate::modules::sasl::SaslContext;
use crate::modules::session::Session;
use crate::modules::store::{
    ConnectionInfos, Service, ServiceCore, ServiceState, Transport,
};
use crate::modules::stream::{read_to_end, InputStream, MemoryInputStream, ProgressListener};
use crate::raise_error;
use std::collections::HashSet;
use tracing::{debug, warn};

#[cfg(test)]
mod tests;

/// One parsed SMTP reply: the 3-digit code and every text line.
#[derive(Clone, Debug)]
pub struct SmtpResponse {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpResponse {
    fn read(connection: &mut TextProtocolConnection) -> MailForgeResult<Self> {
        let mut lines = Vec::new();
        loop {
            let line = connection.read_line()?;
            if line.len() < 3 || !line.as_bytes()[..3].iter().all(|b| b.is_ascii_digit()) {
                return Err(raise_error!(
                    format!("malformed SMTP reply: '{}'", line),
                    ErrorCode::InvalidResponse
                ));
            }
            let code: u16 = line[..3].parse().expect("checked digits");
            let more = line.as_bytes().get(3) == Some(&b'-');
            lines.push(line.get(4..).unwrap_or("").to_string());
            if !more {
                return Ok(Self { code, lines });
            }
        }
    }

    pub fn is_positive(&self) -> bool {
        (200..400).contains(&self.code)
    }

    pub fn text(&self) -> String {
        self.lines.join(" ")
    }

    /// The raw first line, for error messages.
    pub fn raw(&self) -> String {
        format!("{} {}", self.code, self.text())
    }
}

pub struct SmtpTransport {
    core: ServiceCore,
    implicit_tls: bool,
    connection: Option<TextProtocolConnection>,
    extensions: HashSet<String>,
    auth_mechanisms: Vec<String>,
}

impl SmtpTransport {
    /// Plain SMTP / submission transport.
    pub fn new(session: Session) -> MailForgeResult<Self> {
        let core = ServiceCore::new(session, "smtp", None)?;
        Ok(Self {
            core,
            implicit_tls: false,
            connection: None,
            extensions: HashSet::new(),
            auth_mechanisms: Vec::new(),
        })
    }

    /// SMTPS transport (implicit TLS tunnel).
    pub fn new_secure(session: Session) -> MailForgeResult<Self> {
        let core = ServiceCore::new(session, "smtps", None)?;
        Ok(Self {
            core,
            implicit_tls: true,
            connection: None,
            extensions: HashSet::new(),
            auth_mechanisms: Vec::new(),
        })
    }

    pub fn core_mut(&mut self) -> &mut ServiceCore {
        &mut self.core
    }

    fn default_port(&self) -> u16 {
        if self.implicit_tls {
            465
        } else {
            25
        }
    }

    fn connection(&mut self) -> MailForgeResult<&mut TextProtocolConnection> {
        self.connection.as_mut().ok_or_else(|| {
            raise_error!(
                "transport is not connected".into(),
                ErrorCode::NotConnected
            )
        })
    }

    fn command(&mut self, command: &str, accept: &[u16]) -> MailForgeResult<SmtpResponse> {
        let connection = self.connection()?;
        connection.write_line(command)?;
        let response = SmtpResponse::read(connection)?;
        if !accept.contains(&response.code) {
            let verb = command.split_whitespace().next().unwrap_or(command);
            return Err(self.core.fail_disconnected(raise_error!(
                format!("{} failed: {}", verb, response.raw()),
                ErrorCode::CommandFailed
            )));
        }
        Ok(response)
    }

    fn ehlo(&mut self) -> MailForgeResult<()> {
        let hostname = platform::handler().hostname();
        let connection = self.connection()?;
        connection.write_line(&format!("EHLO {}", hostname))?;
        let response = SmtpResponse::read(connection)?;

        if response.code != 250 {
            // pre-ESMTP server: fall back to HELO
            warn!("EHLO rejected ({}), trying HELO", response.code);
            self.command(&format!("HELO {}", hostname), &[250])?;
            self.extensions.clear();
            self.auth_mechanisms.clear();
            return Ok(());
        }

        self.extensions.clear();
        self.auth_mechanisms.clear();
        for line in response.lines.iter().skip(1) {
            let mut words = line.split_ascii_whitespace();
            let Some(keyword) = words.next() else {
                continue;
            };
            let keyword = keyword.to_ascii_uppercase();
            if keyword == "AUTH" {
                self.auth_mechanisms =
                    words.map(|word| word.to_ascii_uppercase()).collect();
            }
            self.extensions.insert(keyword);
        }
        Ok(())
    }

    fn negotiate_tls(&mut self) -> MailForgeResult<()> {
        if !self.extensions.contains("STARTTLS") {
            if self.core.requires_tls() {
                return Err(self.core.fail_disconnected(raise_error!(
                    "server does not offer STARTTLS but TLS is required".into(),
                    ErrorCode::UnsupportedOption
                )));
            }
            return Ok(());
        }

        self.command("STARTTLS", &[220])?;
        let hostname = self.core.server_address()?;
        let core = &mut self.core;
        let connection = self.connection.as_mut().expect("checked connected");
        connection.replace_socket(|socket| core.wrap_tls(socket, &hostname))?;
        self.ehlo()
    }

    fn authenticate(&mut self) -> MailForgeResult<()> {
        let sasl = SaslContext::new();
        let available: Vec<String> = self.auth_mechanisms.clone();
        let mechanism = sasl.suggest_mechanism(&available).ok_or_else(|| {
            raise_error!(
                format!(
                    "no mutually supported SASL mechanism (server offers: {})",
                    available.join(", ")
                ),
                ErrorCode::NoSuchMechanism
            )
        })?;

        let mut session =
            sasl.create_session(self.core.prefix(), self.core.authenticator(), &mechanism)?;
        debug!("authenticating via {}", mechanism);

        let mut command = format!("AUTH {}", mechanism);
        if session.has_initial_response() {
            let (response, _) = session.step(b"")?;
            command.push(' ');
            command.push_str(&crate::base64_encode!(&response));
        }

        let connection = self.connection()?;
        connection.write_line(&command)?;
        loop {
            let reply = SmtpResponse::read(self.connection()?)?;
            match reply.code {
                235 => return Ok(()),
                334 => {
                    let challenge = crate::base64_decode!(reply.text().trim())
                        .map_err(|_| {
                            raise_error!(
                                format!("malformed SASL challenge: '{}'", reply.text()),
                                ErrorCode::SaslFailure
                            )
                        })?;
                    let (response, _) = session.step(&challenge)?;
                    self.connection()?
                        .write_line(&crate::base64_encode!(&response))?;
                }
                _ => {
                    return Err(self.core.fail_disconnected(raise_error!(
                        format!("authentication failed: {}", reply.raw()),
                        ErrorCode::AuthenticationFailed
                    )))
                }
            }
        }
    }

    /// Run the SMTP session establishment over an already-connected
    /// socket. Split out from `connect` so the dialogue is testable
    /// without a network.
    fn establish(&mut self, socket: Box<dyn Socket>) -> MailForgeResult<()> {
        let tracer = self.core.tracer();
        self.connection = Some(TextProtocolConnection::new(socket, Some(tracer)));

        let greeting = SmtpResponse::read(self.connection()?)?;
        if greeting.code != 220 {
            self.connection = None;
            self.core.set_state(ServiceState::Disconnected);
            return Err(raise_error!(
                format!("unexpected SMTP greeting: {}", greeting.raw()),
                ErrorCode::ConnectionGreetingError
            ));
        }

        self.ehlo()?;
        if !self.implicit_tls && self.core.wants_tls() {
            self.negotiate_tls()?;
        }
        if self.core.needs_authentication() {
            self.authenticate()?;
        }

        self.core.set_state(ServiceState::Connected);
        Ok(())
    }
}

impl Service for SmtpTransport {
    fn session(&self) -> &Session {
        self.core.session()
    }

    fn state(&self) -> ServiceState {
        self.core.state()
    }

    fn connect(&mut self) -> MailForgeResult<()> {
        if self.core.state() != ServiceState::Disconnected {
            return Err(raise_error!(
                "transport is already connected".into(),
                ErrorCode::AlreadyConnected
            ));
        }
        let socket = self.core.open_socket(self.default_port(), self.implicit_tls)?;
        self.establish(socket).map_err(|error| {
            self.connection = None;
            self.core.set_state(ServiceState::Disconnected);
            error
        })
    }

    fn disconnect(&mut self) -> MailForgeResult<()> {
        if self.core.state() != ServiceState::Connected {
            return Err(raise_error!(
                "transport is not connected".into(),
                ErrorCode::NotConnected
            ));
        }
        self.core.set_state(ServiceState::Disconnecting);
        if let Some(connection) = self.connection.as_mut() {
            let _ = connection.write_line("QUIT");
            let _ = SmtpResponse::read(connection);
            connection.disconnect();
        }
        self.connection = None;
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

/// Escape lines starting with '.' and guarantee CRLF line endings plus
/// a terminating CRLF (RFC 5321 §4.5.2).
fn dot_stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 16);
    let mut at_line_start = true;
    let mut index = 0;
    while index < data.len() {
        let byte = data[index];
        match byte {
            b'.' if at_line_start => {
                out.extend_from_slice(b"..");
                at_line_start = false;
            }
            b'\n' => {
                if out.last() != Some(&b'\r') {
                    out.push(b'\r');
                }
                out.push(b'\n');
                at_line_start = true;
            }
            other => {
                out.push(other);
                at_line_start = false;
            }
        }
        index += 1;
    }
    if !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out
}

impl Transport for SmtpTransport {
    fn send(
        &mut self,
        from: &Mailbox,
        recipients: &[Mailbox],
        message: &mut dyn InputStream,
        _size: u64,
        mut progress: Option<&mut dyn ProgressListener>,
    ) -> MailForgeResult<()> {
        if self.core.state() != ServiceState::Connected {
            return Err(raise_error!(
                "transport is not connected".into(),
                ErrorCode::NotConnected
            ));
        }
        if from.email().is_empty() {
            return Err(raise_error!(
                "no expeditor address".into(),
                ErrorCode::NoExpeditor
            ));
        }
        if recipients.is_empty() {
            return Err(raise_error!(
                "no recipient addresses".into(),
                ErrorCode::NoRecipient
            ));
        }

        self.command(&format!("MAIL FROM:<{}>", from.email()), &[250])?;
        for recipient in recipients {
            self.command(&format!("RCPT TO:<{}>", recipient.email()), &[250, 251])?;
        }
        self.command("DATA", &[354])?;

        let data = read_to_end(message)?;
        let stuffed = dot_stuff(&data);
        if let Some(listener) = progress.as_deref_mut() {
            listener.start(stuffed.len());
        }
        let connection = self.connection()?;
        connection.write_raw(&stuffed)?;
        connection.write_line(".")?;
        if let Some(listener) = progress.as_deref_mut() {
            listener.progress(stuffed.len(), stuffed.len());
            listener.stop(stuffed.len());
        }

        let accepted = SmtpResponse::read(self.connection()?)?;
        if accepted.code != 250 {
            return Err(self.core.fail_disconnected(raise_error!(
                format!("message rejected: {}", accepted.raw()),
                ErrorCode::CommandFailed
            )));
        }
        debug!("message accepted: {}", accepted.raw());
        Ok(())
    }

    fn send_message(
        &mut self,
        message: &crate::modules::mime::part::Message,
        progress: Option<&mut dyn ProgressListener>,
    ) -> MailForgeResult<()> {
        let header = message.header();
        let from = header
            .field(fields::FROM)
            .and_then(|field| field.value().ok())
            .and_then(|value| value.as_mailbox().ok().cloned())
            .ok_or_else(|| {
                raise_error!("message has no From field".into(), ErrorCode::NoExpeditor)
            })?;

        let mut recipients: Vec<Mailbox> = Vec::new();
        for name in [fields::TO, fields::CC, fields::BCC] {
            if let Some(field) = header.field(name) {
                if let Ok(value) = field.value() {
                    if let Ok(list) = value.as_address_list() {
                        recipients.extend(list.mailboxes().into_iter().cloned());
                    }
                }
            }
        }
        if recipients.is_empty() {
            return Err(raise_error!(
                "message has no recipients".into(),
                ErrorCode::NoRecipient
            ));
        }

        // Bcc recipients get the envelope, never the wire form
        let mut wire_form = message.clone();
        wire_form.header_mut().remove_all_fields(fields::BCC);
        let bytes = wire_form.to_bytes(&GenerationContext::default())?;
        let size = bytes.len() as u64;
        self.send(
            &from,
            &recipients,
            &mut MemoryInputStream::new(bytes),
            size,
            progress,
        )
    }
}
