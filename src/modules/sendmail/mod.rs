// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Local-delivery transport that pipes messages into the system
//! `sendmail` binary through the platform child-process factory.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::mime::address::Mailbox;
use crate::modules::mime::registry::fields;
use crate::modules::mime::GenerationContext;
use crate::modules::platform;
use crate::modules::session::Session;
use crate::modules::store::{
    ConnectionInfos, Service, ServiceCore, ServiceState, Transport,
};
use crate::modules::stream::{read_to_end, InputStream, MemoryInputStream, ProgressListener};
use crate::raise_error;
use tracing::debug;

/// Session property overriding the sendmail binary location.
pub const PROPERTY_BINARY: &str = "sendmail.binary.path";

const DEFAULT_BINARY: &str = "/usr/sbin/sendmail";

pub struct SendmailTransport {
    core: ServiceCore,
}

impl SendmailTransport {
    pub fn new(session: Session) -> MailForgeResult<Self> {
        Ok(Self {
            core: ServiceCore::new(session, "sendmail", None)?,
        })
    }

    fn binary(&self) -> String {
        self.core
            .session()
            .property(PROPERTY_BINARY)
            .unwrap_or(DEFAULT_BINARY)
            .to_string()
    }
}

impl Service for SendmailTransport {
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
        // no connection to establish; each send spawns one process
        self.core.set_state(ServiceState::Connected);
        Ok(())
    }

    fn disconnect(&mut self) -> MailForgeResult<()> {
        if self.core.state() != ServiceState::Connected {
            return Err(raise_error!(
                "transport is not connected".into(),
                ErrorCode::NotConnected
            ));
        }
        self.core.set_state(ServiceState::Disconnected);
        Ok(())
    }

    fn is_secured_connection(&self) -> bool {
        // local pipe, nothing crosses a network
        true
    }

    fn connection_infos(&self) -> ConnectionInfos {
        ConnectionInfos {
            host: self.binary(),
            port: 0,
            secured: true,
        }
    }
}

impl Transport for SendmailTransport {
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

        let mut args = vec![
            "-i".to_string(),
            "-f".to_string(),
            from.email().to_string(),
            "--".to_string(),
        ];
        args.extend(recipients.iter().map(|mailbox| mailbox.email().to_string()));

        let data = read_to_end(message)?;
        if let Some(listener) = progress.as_deref_mut() {
            listener.start(data.len());
        }

        let binary = self.binary();
        debug!("invoking {} for {} recipients", binary, recipients.len());
        let exit_code = platform::handler()
            .child_process()
            .run(&binary, &args, &data)?;
        if exit_code != 0 {
            return Err(raise_error!(
                format!("{} exited with status {}", binary, exit_code),
                ErrorCode::CommandFailed
            ));
        }

        if let Some(listener) = progress.as_deref_mut() {
            listener.progress(data.len(), data.len());
            listener.stop(data.len());
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::platform::ChildProcessFactory;

    #[test]
    fn send_requires_connection_and_envelope() {
        let mut transport = SendmailTransport::new(Session::new()).unwrap();
        let error = transport
            .send(
                &Mailbox::from_email("a@x.org"),
                &[Mailbox::from_email("b@y.org")],
                &mut MemoryInputStream::new(Vec::new()),
                0,
                None,
            )
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::NotConnected);

        transport.connect().unwrap();
        let error = transport
            .send(
                &Mailbox::from_email("a@x.org"),
                &[],
                &mut MemoryInputStream::new(Vec::new()),
                0,
                None,
            )
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::NoRecipient);
    }

    #[test]
    fn binary_path_is_configurable() {
        let mut session = Session::new();
        session.set_property(PROPERTY_BINARY, "/bin/true");
        let transport = SendmailTransport::new(session).unwrap();
        assert_eq!(transport.binary(), "/bin/true");
    }

    #[test]
    fn delivery_pipes_message_to_child_process() {
        // /bin/cat consumes stdin and exits zero, standing in for the
        // sendmail binary
        let factory = crate::modules::platform::StdChildProcessFactory;
        let exit = factory
            .run("/bin/cat", &[], b"Subject: x\r\n\r\nbody")
            .unwrap();
        assert_eq!(exit, 0);
    }
}
