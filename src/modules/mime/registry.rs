// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Process-wide header-field registry: maps field names to the field
//! kind and value type used when parsing. Registration is an init-time
//! operation; lookups afterwards are read-only.

use dashmap::DashMap;
use std::sync::LazyLock;

/// Canonical header field names.
pub mod fields {
    pub const FROM: &str = "From";
    pub const SENDER: &str = "Sender";
    pub const REPLY_TO: &str = "Reply-To";
    pub const DELIVERED_TO: &str = "Delivered-To";
    pub const TO: &str = "To";
    pub const CC: &str = "Cc";
    pub const BCC: &str = "Bcc";
    pub const DATE: &str = "Date";
    pub const RECEIVED: &str = "Received";
    pub const SUBJECT: &str = "Subject";
    pub const ORGANIZATION: &str = "Organization";
    pub const USER_AGENT: &str = "User-Agent";
    pub const CONTENT_DESCRIPTION: &str = "Content-Description";
    pub const MIME_VERSION: &str = "Mime-Version";
    pub const CONTENT_LOCATION: &str = "Content-Location";
    pub const RETURN_PATH: &str = "Return-Path";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";
    pub const CONTENT_DISPOSITION: &str = "Content-Disposition";
    pub const MESSAGE_ID: &str = "Message-Id";
    pub const CONTENT_ID: &str = "Content-Id";
    pub const ORIGINAL_MESSAGE_ID: &str = "Original-Message-Id";
    pub const IN_REPLY_TO: &str = "In-Reply-To";
    pub const REFERENCES: &str = "References";
    pub const DISPOSITION: &str = "Disposition";
    pub const DISPOSITION_NOTIFICATION_TO: &str = "Disposition-Notification-To";
    pub const IMPORTANCE: &str = "Importance";
    pub const X_PRIORITY: &str = "X-Priority";
    pub const REPORTING_UA: &str = "Reporting-UA";
    pub const FINAL_RECIPIENT: &str = "Final-Recipient";
    pub const RECEIVED_CONTENT_MIC: &str = "Received-content-MIC";
}

/// How a field body is structured.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FieldKind {
    /// The whole body is one value.
    Plain,
    /// The whole body is one mailbox.
    MailboxField,
    /// `value; name=value; ...`
    Parameterized,
    /// Parameterized, with Content-Type accessors.
    ContentType,
    /// Parameterized, with Content-Disposition accessors.
    ContentDisposition,
}

/// Which component type the main value parses into.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ValueKind {
    Text,
    Mailbox,
    AddressList,
    MailboxList,
    DateTime,
    MediaType,
    Encoding,
    MessageId,
    MessageIdSequence,
    Path,
    ContentDisposition,
    Disposition,
    Received,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FieldDescriptor {
    pub kind: FieldKind,
    pub value_kind: ValueKind,
}

static FIELD_REGISTRY: LazyLock<DashMap<String, FieldDescriptor>> = LazyLock::new(|| {
    let registry = DashMap::new();
    let add = |names: &[&str], kind: FieldKind, value_kind: ValueKind| {
        for name in names {
            registry.insert(
                name.to_ascii_lowercase(),
                FieldDescriptor { kind, value_kind },
            );
        }
    };

    add(
        &[
            fields::FROM,
            fields::SENDER,
            fields::REPLY_TO,
            fields::DELIVERED_TO,
        ],
        FieldKind::MailboxField,
        ValueKind::Mailbox,
    );
    add(
        &[fields::TO, fields::CC, fields::BCC],
        FieldKind::Parameterized,
        ValueKind::AddressList,
    );
    add(
        &[fields::DATE],
        FieldKind::Parameterized,
        ValueKind::DateTime,
    );
    add(
        &[fields::RECEIVED],
        FieldKind::Parameterized,
        ValueKind::Received,
    );
    add(
        &[
            fields::SUBJECT,
            fields::ORGANIZATION,
            fields::USER_AGENT,
            fields::CONTENT_DESCRIPTION,
            fields::MIME_VERSION,
            fields::CONTENT_LOCATION,
        ],
        FieldKind::Parameterized,
        ValueKind::Text,
    );
    add(
        &[fields::RETURN_PATH],
        FieldKind::Parameterized,
        ValueKind::Path,
    );
    add(
        &[fields::CONTENT_TYPE],
        FieldKind::ContentType,
        ValueKind::MediaType,
    );
    add(
        &[fields::CONTENT_TRANSFER_ENCODING],
        FieldKind::Parameterized,
        ValueKind::Encoding,
    );
    add(
        &[fields::CONTENT_DISPOSITION],
        FieldKind::ContentDisposition,
        ValueKind::ContentDisposition,
    );
    add(
        &[
            fields::MESSAGE_ID,
            fields::CONTENT_ID,
            fields::ORIGINAL_MESSAGE_ID,
        ],
        FieldKind::Parameterized,
        ValueKind::MessageId,
    );
    add(
        &[fields::IN_REPLY_TO, fields::REFERENCES],
        FieldKind::Parameterized,
        ValueKind::MessageIdSequence,
    );
    add(
        &[fields::DISPOSITION],
        FieldKind::Parameterized,
        ValueKind::Disposition,
    );
    add(
        &[fields::DISPOSITION_NOTIFICATION_TO],
        FieldKind::Parameterized,
        ValueKind::MailboxList,
    );

    registry
});

/// The descriptor for a field name; unknown names parse as generic
/// parameterized text fields.
pub fn lookup(name: &str) -> FieldDescriptor {
    FIELD_REGISTRY
        .get(&name.to_ascii_lowercase())
        .map(|entry| *entry.value())
        .unwrap_or(FieldDescriptor {
            kind: FieldKind::Parameterized,
            value_kind: ValueKind::Text,
        })
}

/// Register (or override) a field name. Intended for init-time use by
/// embedders that add custom structured fields.
pub fn register(name: &str, descriptor: FieldDescriptor) {
    FIELD_REGISTRY.insert(name.to_ascii_lowercase(), descriptor);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(lookup("CONTENT-TYPE").value_kind, ValueKind::MediaType);
        assert_eq!(lookup("content-type").kind, FieldKind::ContentType);
    }

    #[test]
    fn unknown_names_default_to_parameterized_text() {
        let descriptor = lookup("X-Custom-Header");
        assert_eq!(descriptor.kind, FieldKind::Parameterized);
        assert_eq!(descriptor.value_kind, ValueKind::Text);
    }

    #[test]
    fn registration_overrides() {
        register(
            "X-Registered-Date",
            FieldDescriptor {
                kind: FieldKind::Parameterized,
                value_kind: ValueKind::DateTime,
            },
        );
        assert_eq!(lookup("x-registered-date").value_kind, ValueKind::DateTime);
    }
}
