// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

pub mod attachment;
pub mod charset;
pub mod content;
pub mod digest;
pub mod encoding;
pub mod error;
pub mod imap;
pub mod maildir;
pub mod mdn;
pub mod mime;
pub mod net;
pub mod platform;
pub mod pop3;
pub mod sasl;
pub mod sendmail;
pub mod services;
pub mod session;
pub mod smtp;
pub mod store;
pub mod stream;
pub mod textpart;
pub mod utils;
