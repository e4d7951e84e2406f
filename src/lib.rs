// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! MailForge: an email engineering library.
//!
//! Two sub-systems share the same primitives:
//!
//! - a MIME parser/generator for RFC 5322 / 2045–2049 / 2047 messages
//!   and every structured header field, built on a uniform
//!   parse/generate component contract with tolerant recovery;
//! - a mail networking stack (SMTP, POP3, IMAP, maildir, sendmail)
//!   with connection lifecycle, TLS, SASL authentication, timeouts,
//!   tracing and protocol-agnostic store/folder/message operations.
//!
//! ```no_run
//! use mailforge::modules::mime::part::Message;
//! use mailforge::modules::mime::ParsingContext;
//!
//! let raw = b"Subject: hello\r\nContent-Type: text/plain\r\n\r\nhi".to_vec();
//! let message = Message::parse_message(&ParsingContext::default(), raw)?;
//! assert_eq!(message.body().part_count(), 0);
//! # Ok::<(), mailforge::modules::error::MailForgeError>(())
//! ```

pub mod modules;

pub use modules::error::{code::ErrorCode, MailForgeError, MailForgeResult};
pub use modules::mime::part::{BodyPart, Message};
pub use modules::mime::{GenerationContext, ParsingContext};
pub use modules::session::Session;
pub use modules::store::{Folder, Service, Store, StoredMessage, Transport};
