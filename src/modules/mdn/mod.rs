// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Message Disposition Notifications (RFC 3798): request, recognize,
//! build and read back MDN reports.

use crate::modules::charset::Charset;
use crate::modules::content::{extract_to_vec, StringContentHandler};
use crate::modules::encoding::Encoding;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::mime::address::{Mailbox, MailboxList};
use crate::modules::mime::datetime::DateTime;
use crate::modules::mime::disposition::Disposition;
use crate::modules::mime::field::{FieldValue, HeaderField};
use crate::modules::mime::header::Header;
use crate::modules::mime::mediatype::MediaType;
use crate::modules::mime::messageid::MessageId;
use crate::modules::mime::part::{BodyPart, Message};
use crate::modules::mime::registry::fields;
use crate::modules::mime::text::Text;
use crate::modules::mime::word::Word;
use crate::modules::mime::{Component, GenerationContext, ParsingContext};
use crate::raise_error;
use std::sync::Arc;

pub const REPORT_TYPE_MDN: &str = "disposition-notification";

/// One MDN the user agent may send: the message it reports on and the
/// recipient that requested the notification.
pub struct SendableMdnInfos {
    pub original_message_id: MessageId,
    pub recipient: Mailbox,
}

/// The interesting fields of a received MDN.
pub struct ReceivedMdnInfos {
    original_message_id: MessageId,
    disposition: Disposition,
    content_mic: String,
}

impl ReceivedMdnInfos {
    pub fn original_message_id(&self) -> &MessageId {
        &self.original_message_id
    }

    pub fn disposition(&self) -> &Disposition {
        &self.disposition
    }

    /// The `Received-content-MIC` value, when present.
    pub fn content_mic(&self) -> &str {
        &self.content_mic
    }
}

/// Request an MDN by setting `Disposition-Notification-To`.
pub fn attach_mdn_request(message: &mut Message, mailboxes: MailboxList) {
    message.header_mut().set_field_value(
        fields::DISPOSITION_NOTIFICATION_TO,
        FieldValue::MailboxList(mailboxes),
    );
}

/// The MDNs that could be sent for this message: one per mailbox in
/// `Disposition-Notification-To`.
pub fn get_possible_mdns(message: &Message) -> Vec<SendableMdnInfos> {
    let original_message_id = message
        .header()
        .field(fields::MESSAGE_ID)
        .and_then(|field| field.value().ok())
        .and_then(|value| value.as_message_id().ok().cloned())
        .unwrap_or_default();

    message
        .header()
        .field(fields::DISPOSITION_NOTIFICATION_TO)
        .and_then(|field| field.value().ok())
        .and_then(|value| value.as_mailbox_list().ok().cloned())
        .map(|list| {
            list.mailboxes()
                .iter()
                .map(|recipient| SendableMdnInfos {
                    original_message_id: original_message_id.clone(),
                    recipient: recipient.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Whether sending an MDN for this message needs user confirmation
/// (RFC 3798 §2.1): no Return-Path, several notification addresses, or
/// a notification address that differs from the Return-Path.
pub fn needs_confirmation(message: &Message) -> bool {
    let header = message.header();

    let Some(return_path) = header
        .field(fields::RETURN_PATH)
        .and_then(|field| field.value().ok())
        .and_then(|value| value.as_path().ok().cloned())
    else {
        return true;
    };

    if let Some(list) = header
        .field(fields::DISPOSITION_NOTIFICATION_TO)
        .and_then(|field| field.value().ok())
        .and_then(|value| value.as_mailbox_list().ok().cloned())
    {
        if list.len() > 1 {
            return true;
        }
        if list.len() == 0 {
            return false;
        }
        if list.mailboxes()[0].email() != return_path.address() {
            return true;
        }
    }

    false
}

/// A message is an MDN iff its content type is `multipart/report` with
/// `report-type=disposition-notification`.
pub fn is_mdn(message: &Message) -> bool {
    let Some(field) = message.header().field(fields::CONTENT_TYPE) else {
        return false;
    };
    let is_report = field
        .value()
        .ok()
        .and_then(|value| value.as_media_type().ok().cloned())
        .map(|media_type| media_type == MediaType::new("multipart", "report"))
        .unwrap_or(false);
    if !is_report {
        return false;
    }
    field
        .report_type()
        .ok()
        .flatten()
        .map(|report_type| report_type.eq_ignore_ascii_case(REPORT_TYPE_MDN))
        .unwrap_or(false)
}

/// Compose an RFC 3798 report message: human-readable text, the
/// machine-readable `message/disposition-notification` block, and the
/// original message's headers.
#[allow(clippy::too_many_arguments)]
pub fn build_mdn(
    mdn_infos: &SendableMdnInfos,
    text: &str,
    charset: &Charset,
    expeditor: &Mailbox,
    disposition: &Disposition,
    reporting_ua: &str,
    original_headers: &Header,
    failure: Option<&str>,
) -> MailForgeResult<Message> {
    let mut message = Message::new();
    let header = message.header_mut();

    let mut content_type_field = HeaderField::with_value(
        fields::CONTENT_TYPE,
        FieldValue::MediaType(MediaType::new("multipart", "report")),
    );
    content_type_field.set_parameter("report-type", Word::ascii(REPORT_TYPE_MDN))?;
    content_type_field.set_parameter(
        "boundary",
        Word::ascii(&crate::modules::utils::random_boundary()),
    )?;
    header.append(content_type_field);

    header.set_field_value(
        fields::DISPOSITION,
        FieldValue::Disposition(disposition.clone()),
    );
    let mut to = crate::modules::mime::address::AddressList::new();
    to.push_mailbox(mdn_infos.recipient.clone());
    header.set_field_value(fields::TO, FieldValue::AddressList(to));
    header.set_field_value(fields::FROM, FieldValue::Mailbox(expeditor.clone()));
    header.set_field_value(
        fields::SUBJECT,
        FieldValue::Text(Text::ascii("Disposition notification")),
    );
    header.set_field_value(fields::DATE, FieldValue::DateTime(DateTime::now()));
    header.set_field_value(fields::MIME_VERSION, FieldValue::Text(Text::ascii("1.0")));

    message.body_mut().set_content_type(MediaType::new("multipart", "report"));
    message
        .body_mut()
        .append_part(build_text_part(text, charset));
    message.body_mut().append_part(build_notification_part(
        mdn_infos,
        disposition,
        reporting_ua,
        failure,
    )?);
    message
        .body_mut()
        .append_part(build_headers_part(original_headers)?);

    Ok(message)
}

fn build_text_part(text: &str, charset: &Charset) -> BodyPart {
    BodyPart::build(
        MediaType::text_plain(),
        Some(charset),
        charset.recommended_encoding(),
        Arc::new(StringContentHandler::new(text.as_bytes().to_vec())),
    )
}

fn build_notification_part(
    mdn_infos: &SendableMdnInfos,
    disposition: &Disposition,
    reporting_ua: &str,
    failure: Option<&str>,
) -> MailForgeResult<BodyPart> {
    let mut fields_block = Header::new();
    fields_block.set_field_value(
        fields::REPORTING_UA,
        FieldValue::Text(Text::ascii(reporting_ua)),
    );
    fields_block.set_field_value(
        fields::FINAL_RECIPIENT,
        FieldValue::Text(Text::ascii(&format!(
            "rfc822; {}",
            mdn_infos.recipient.email()
        ))),
    );
    fields_block.set_field_value(
        fields::ORIGINAL_MESSAGE_ID,
        FieldValue::MessageId(mdn_infos.original_message_id.clone()),
    );
    fields_block.set_field_value(
        fields::DISPOSITION,
        FieldValue::Disposition(disposition.clone()),
    );
    if let Some(failure) = failure {
        fields_block.set_field_value("Failure", FieldValue::Text(Text::ascii(failure)));
    }

    let mut out = crate::modules::stream::VecOutputStream::new();
    fields_block.generate(&GenerationContext::default(), &mut out, 0)?;

    Ok(BodyPart::build(
        MediaType::new("message", "disposition-notification"),
        None,
        Encoding::seven_bit(),
        Arc::new(StringContentHandler::new(out.into_bytes())),
    ))
}

fn build_headers_part(original_headers: &Header) -> MailForgeResult<BodyPart> {
    let mut out = crate::modules::stream::VecOutputStream::new();
    original_headers.generate(&GenerationContext::default(), &mut out, 0)?;
    Ok(BodyPart::build(
        MediaType::new("text", "rfc822-headers"),
        None,
        Encoding::seven_bit(),
        Arc::new(StringContentHandler::new(out.into_bytes())),
    ))
}

/// Read the disposition information out of a received MDN.
pub fn get_received_mdn(message: &Message) -> MailForgeResult<ReceivedMdnInfos> {
    if !is_mdn(message) {
        return Err(raise_error!(
            "message is not a disposition notification".into(),
            ErrorCode::InvalidParameter
        ));
    }

    let notification = message.body().part_at(1).ok_or_else(|| {
        raise_error!(
            "disposition notification part is missing".into(),
            ErrorCode::NoSuchPart
        )
    })?;

    let mut block = extract_to_vec(notification.body().contents().as_ref())?;
    // the block is a bare header; make sure it terminates
    if !block.ends_with(b"\n") {
        block.extend_from_slice(b"\r\n");
    }
    let mut parsed = Header::new();
    let length = block.len();
    parsed.parse(&ParsingContext::default(), &block, 0, length)?;

    let original_message_id = parsed
        .field(fields::ORIGINAL_MESSAGE_ID)
        .and_then(|field| field.value().ok())
        .and_then(|value| value.as_message_id().ok().cloned())
        .unwrap_or_default();

    let disposition = parsed
        .field(fields::DISPOSITION)
        .and_then(|field| field.value().ok())
        .and_then(|value| value.as_disposition().ok().cloned())
        .unwrap_or_default();

    let content_mic = parsed
        .field(fields::RECEIVED_CONTENT_MIC)
        .and_then(|field| field.value().ok())
        .and_then(|value| value.as_text().ok().map(|text| text.to_utf8_lossy()))
        .unwrap_or_default();

    Ok(ReceivedMdnInfos {
        original_message_id,
        disposition,
        content_mic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &[u8]) -> Message {
        Message::parse_message(&ParsingContext::default(), raw.to_vec()).unwrap()
    }

    #[test]
    fn mdn_request_sets_notification_header() {
        let mut message = parse(b"Subject: x\r\n\r\n");
        attach_mdn_request(
            &mut message,
            MailboxList::from(Mailbox::from_email("reader@example.org")),
        );
        assert!(message
            .header()
            .has_field(fields::DISPOSITION_NOTIFICATION_TO));
        assert_eq!(get_possible_mdns(&message).len(), 1);
    }

    #[test]
    fn recognizes_mdn_content_type() {
        let message = parse(
            b"Content-Type: multipart/report; report-type=disposition-notification; boundary=b\r\n\r\n",
        );
        assert!(is_mdn(&message));

        let not_mdn = parse(b"Content-Type: multipart/report; report-type=delivery-status\r\n\r\n");
        assert!(!is_mdn(&not_mdn));
    }

    #[test]
    fn built_mdn_round_trips_through_wire_form() {
        let infos = SendableMdnInfos {
            original_message_id: MessageId::new("orig", "example.org"),
            recipient: Mailbox::from_email("reader@example.org"),
        };
        let original = parse(b"Subject: original\r\nMessage-Id: <orig@example.org>\r\n\r\n");
        let mdn = build_mdn(
            &infos,
            "The message was displayed.",
            &Charset::utf_8(),
            &Mailbox::from_email("sender@example.org"),
            &Disposition::automatic_displayed(),
            "mailforge/0.3",
            original.header(),
            None,
        )
        .unwrap();

        assert!(is_mdn(&mdn));
        assert_eq!(mdn.body().part_count(), 3);

        let bytes = mdn.to_bytes(&GenerationContext::default()).unwrap();
        let reparsed = parse(&bytes);
        assert!(is_mdn(&reparsed));
        assert_eq!(reparsed.body().part_count(), 3);

        let received = get_received_mdn(&reparsed).unwrap();
        assert_eq!(received.original_message_id().id(), "orig@example.org");
        assert_eq!(received.disposition().disposition_type(), "displayed");
        assert_eq!(received.disposition().action_mode(), "automatic-action");
    }

    #[test]
    fn received_mdn_reads_displayed_disposition() {
        let raw = b"Content-Type: multipart/report; report-type=disposition-notification; boundary=b\r\n\r\n--b\r\nContent-Type: text/plain\r\n\r\nshown\r\n--b\r\nContent-Type: message/disposition-notification\r\n\r\nOriginal-Message-Id: <m1@x>\r\nDisposition: automatic-action/MDN-sent-automatically; displayed\r\nReceived-content-MIC: abc123, sha1\r\n\r\n--b--\r\n";
        let message = parse(raw);
        let received = get_received_mdn(&message).unwrap();
        assert_eq!(received.disposition().disposition_type(), "displayed");
        assert_eq!(received.original_message_id().id(), "m1@x");
        assert_eq!(received.content_mic(), "abc123, sha1");
    }

    #[test]
    fn confirmation_needed_without_return_path() {
        let mut message = parse(b"Subject: x\r\n\r\n");
        attach_mdn_request(
            &mut message,
            MailboxList::from(Mailbox::from_email("reader@example.org")),
        );
        assert!(needs_confirmation(&message));
    }

    #[test]
    fn confirmation_not_needed_when_return_path_matches() {
        let mut message = parse(b"Return-Path: <reader@example.org>\r\n\r\n");
        attach_mdn_request(
            &mut message,
            MailboxList::from(Mailbox::from_email("reader@example.org")),
        );
        assert!(!needs_confirmation(&message));
    }

    #[test]
    fn confirmation_needed_for_mismatched_return_path() {
        let mut message = parse(b"Return-Path: <other@example.org>\r\n\r\n");
        attach_mdn_request(
            &mut message,
            MailboxList::from(Mailbox::from_email("reader@example.org")),
        );
        assert!(needs_confirmation(&message));
    }
}
