// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Attachment classification and manipulation: decide which body parts
//! are attachments, enumerate them, and add new ones to a message.

use crate::modules::content::{ContentHandler, StringContentHandler};
use crate::modules::encoding::Encoding;
use crate::modules::error::MailForgeResult;
use crate::modules::mime::disposition::ContentDisposition;
use crate::modules::mime::field::{FieldValue, HeaderField};
use crate::modules::mime::header::Header;
use crate::modules::mime::mediatype::{self, MediaType};
use crate::modules::mime::part::{BodyPart, Message};
use crate::modules::mime::registry::fields;
use crate::modules::mime::text::Text;
use crate::modules::mime::word::Word;
use crate::modules::mime::GenerationContext;
use std::sync::Arc;

/// An attachment to add to a message, or the view of one found in it.
pub struct Attachment {
    pub media_type: MediaType,
    pub name: Word,
    pub description: Text,
    pub encoding: Encoding,
    pub data: Arc<dyn ContentHandler>,
    /// The originating part, for attachments discovered in a message.
    pub part: Option<BodyPart>,
    /// The originating header, for attachments discovered in a message.
    pub header: Option<Header>,
}

impl Attachment {
    /// A file-style attachment over raw bytes. The media type falls
    /// back to a guess from the file name when not given.
    pub fn from_bytes(data: Vec<u8>, media_type: Option<MediaType>, name: &str) -> Self {
        let media_type = media_type.unwrap_or_else(|| {
            mime_guess::from_path(name)
                .first()
                .map(|guess| MediaType::from_string(guess.essence_str()))
                .unwrap_or_else(MediaType::application_octet_stream)
        });
        Self {
            media_type,
            name: Word::ascii(name),
            description: Text::new(),
            encoding: Encoding::base64(),
            data: Arc::new(StringContentHandler::new(data)),
            part: None,
            header: None,
        }
    }
}

/// Whether a body part is an attachment:
/// - a non-`inline` Content-Disposition always is;
/// - an `inline` disposition without Content-Id and Content-Location is
///   one too, except on the root part;
/// - without a disposition, any type outside `text/*` and `multipart/*`
///   is an attachment when it carries a Content-Type `name` parameter
///   (RFC 1341 compatibility) or no Content-Id.
pub fn is_attachment(part: &BodyPart, is_root: bool) -> bool {
    let header = part.header();

    if let Some(field) = header.field(fields::CONTENT_DISPOSITION) {
        let disposition = field
            .value()
            .ok()
            .and_then(|value| value.as_content_disposition().ok().cloned())
            .unwrap_or_else(ContentDisposition::attachment);
        if !disposition.is_inline() {
            return true;
        }
        // inline with neither Content-Id nor Content-Location may still
        // be an attachment, unless it is the root part
        if !header.has_field(fields::CONTENT_ID) && !header.has_field(fields::CONTENT_LOCATION) {
            return !is_root;
        }
        return false;
    }

    let (media_type, has_name_parameter) = match header.field(fields::CONTENT_TYPE) {
        Some(field) => (
            header.content_type(),
            field.has_parameter("name"),
        ),
        None if is_root => return false,
        None => (MediaType::application_octet_stream(), false),
    };

    if media_type.media_type() != mediatype::TEXT && !media_type.is_multipart() {
        if has_name_parameter {
            return true;
        }
        // a Content-Id suggests an embedded object (MHTML)
        return !header.has_field(fields::CONTENT_ID);
    }

    false
}

/// Every attachment in the message, in document order. A part
/// classified as an attachment is not descended into.
pub fn find_attachments(message: &Message) -> MailForgeResult<Vec<Attachment>> {
    fn collect(
        part: &BodyPart,
        is_root: bool,
        found: &mut Vec<Attachment>,
    ) -> MailForgeResult<()> {
        if is_attachment(part, is_root) {
            found.push(view_of(part)?);
            return Ok(());
        }
        for child in part.body().parts() {
            collect(child, false, found)?;
        }
        Ok(())
    }

    let mut found = Vec::new();
    collect(message, true, &mut found)?;
    Ok(found)
}

fn view_of(part: &BodyPart) -> MailForgeResult<Attachment> {
    let header = part.header();
    let name = header
        .field(fields::CONTENT_DISPOSITION)
        .and_then(|field| field.filename().ok().flatten())
        .or_else(|| {
            header
                .field(fields::CONTENT_TYPE)
                .and_then(|field| field.parameter_utf8("name").ok().flatten())
        })
        .map(|name| Word::utf8(&name))
        .unwrap_or_default();

    let description = header
        .field(fields::CONTENT_DESCRIPTION)
        .and_then(|field| field.value().ok())
        .and_then(|value| value.as_text().ok().cloned())
        .unwrap_or_default();

    Ok(Attachment {
        media_type: header.content_type(),
        name,
        description,
        encoding: part.body().encoding().clone(),
        data: part.body().contents().clone(),
        part: Some(part.clone()),
        header: Some(header.clone()),
    })
}

/// First part (depth-first, the part itself included) whose content
/// type matches.
fn find_body_part<'a>(part: &'a mut BodyPart, media_type: &MediaType) -> Option<&'a mut BodyPart> {
    if part.body().content_type() == media_type {
        return Some(part);
    }
    for child in part.body_mut().parts_mut() {
        if let Some(found) = find_body_part(child, media_type) {
            return Some(found);
        }
    }
    None
}

/// Add an attachment: locate a `multipart/mixed` container, creating
/// one by promoting the root when none exists, and append the
/// attachment as a new child part.
pub fn add_attachment(message: &mut Message, attachment: Attachment) -> MailForgeResult<()> {
    let mixed = MediaType::multipart_mixed();

    if find_body_part(message, &mixed).is_none() {
        // move the existing root content (or part list) down one level
        let mut container = BodyPart::new();
        if let Some(field) = message.header().field(fields::CONTENT_TYPE) {
            container.header_mut().append(field.clone());
        }
        if let Some(field) = message.header().field(fields::CONTENT_TRANSFER_ENCODING) {
            container.header_mut().append(field.clone());
        }
        *container.body_mut() = message.body().clone();

        let mut root_body = crate::modules::mime::body::Body::new();
        root_body.set_content_type(mixed.clone());
        root_body.append_part(container);
        *message.body_mut() = root_body;

        message.header_mut().remove_all_fields(fields::CONTENT_DISPOSITION);
        message
            .header_mut()
            .remove_all_fields(fields::CONTENT_TRANSFER_ENCODING);
        message.header_mut().remove_all_fields(fields::CONTENT_TYPE);
        let mut content_type_field = HeaderField::with_value(
            fields::CONTENT_TYPE,
            FieldValue::MediaType(mixed.clone()),
        );
        content_type_field.set_parameter(
            "boundary",
            Word::ascii(&crate::modules::utils::random_boundary()),
        )?;
        message.header_mut().append(content_type_field);
    }

    let container = find_body_part(message, &mixed).expect("ensured above");
    container.body_mut().append_part(build_attachment_part(&attachment)?);
    Ok(())
}

/// Attach a whole message, wrapped as `message/rfc822`.
pub fn add_message_attachment(message: &mut Message, attached: &Message) -> MailForgeResult<()> {
    let bytes = attached.to_bytes(&GenerationContext::default())?;
    let attachment = Attachment {
        media_type: MediaType::message_rfc822(),
        name: Word::default(),
        description: Text::new(),
        encoding: Encoding::eight_bit(),
        data: Arc::new(StringContentHandler::new(bytes)),
        part: None,
        header: None,
    };
    add_attachment(message, attachment)
}

fn build_attachment_part(attachment: &Attachment) -> MailForgeResult<BodyPart> {
    let mut part = BodyPart::build(
        attachment.media_type.clone(),
        None,
        attachment.encoding.clone(),
        attachment.data.clone(),
    );

    let mut disposition_field = HeaderField::with_value(
        fields::CONTENT_DISPOSITION,
        FieldValue::ContentDisposition(ContentDisposition::attachment()),
    );
    if !attachment.name.is_empty() {
        disposition_field.set_parameter("filename", attachment.name.clone())?;
        part.header_mut()
            .field_mut(fields::CONTENT_TYPE)
            .expect("built with content type")
            .set_parameter("name", attachment.name.clone())?;
    }
    part.header_mut().append(disposition_field);

    if !attachment.description.is_empty() {
        part.header_mut().set_field_value(
            fields::CONTENT_DESCRIPTION,
            FieldValue::Text(attachment.description.clone()),
        );
    }
    Ok(part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::content::extract_to_vec;
    use crate::modules::mime::ParsingContext;

    fn parse(raw: &[u8]) -> Message {
        Message::parse_message(&ParsingContext::default(), raw.to_vec()).unwrap()
    }

    #[test]
    fn explicit_attachment_disposition_classifies() {
        let message = parse(
            b"Content-Type: application/pdf\r\nContent-Disposition: attachment; filename=\"a.pdf\"\r\n\r\n%PDF",
        );
        assert!(is_attachment(&message, false));
    }

    #[test]
    fn inline_with_content_id_is_not_attachment() {
        let message = parse(
            b"Content-Type: image/png\r\nContent-Disposition: inline\r\nContent-Id: <img1@x>\r\n\r\nPNG",
        );
        assert!(!is_attachment(&message, false));
    }

    #[test]
    fn inline_without_references_is_attachment_unless_root() {
        let raw = b"Content-Type: image/png\r\nContent-Disposition: inline\r\n\r\nPNG";
        let message = parse(raw);
        assert!(is_attachment(&message, false));
        assert!(!is_attachment(&message, true));
    }

    #[test]
    fn rfc1341_name_parameter_classifies() {
        let message = parse(b"Content-Type: application/zip; name=\"a.zip\"\r\n\r\nZIP");
        assert!(is_attachment(&message, false));
    }

    #[test]
    fn text_parts_are_not_attachments() {
        let message = parse(b"Content-Type: text/plain\r\n\r\nhello");
        assert!(!is_attachment(&message, false));
    }

    #[test]
    fn add_attachment_promotes_root_to_multipart_mixed() {
        let mut message = parse(b"Content-Type: text/plain\r\n\r\nhi");
        add_attachment(
            &mut message,
            Attachment::from_bytes(
                b"PAYLOAD".to_vec(),
                Some(MediaType::application_octet_stream()),
                "a.bin",
            ),
        )
        .unwrap();

        assert_eq!(message.header().content_type(), MediaType::multipart_mixed());
        assert_eq!(message.body().part_count(), 2);

        let original = message.body().part_at(0).unwrap();
        assert_eq!(original.body().content_type(), &MediaType::text_plain());
        assert_eq!(
            extract_to_vec(original.body().contents().as_ref()).unwrap(),
            b"hi"
        );

        let attached = message.body().part_at(1).unwrap();
        assert_eq!(
            attached.body().content_type(),
            &MediaType::application_octet_stream()
        );
        assert_eq!(
            attached
                .header()
                .field(fields::CONTENT_DISPOSITION)
                .unwrap()
                .filename()
                .unwrap()
                .as_deref(),
            Some("a.bin")
        );
    }

    #[test]
    fn attachment_generation_base64_decodes_to_payload() {
        let mut message = parse(b"Content-Type: text/plain\r\n\r\nhi");
        add_attachment(
            &mut message,
            Attachment::from_bytes(b"PAYLOAD".to_vec(), None, "a.bin"),
        )
        .unwrap();

        let bytes = message.to_bytes(&GenerationContext::default()).unwrap();
        let reparsed = parse(&bytes);
        let attachments = find_attachments(&reparsed).unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].encoding, Encoding::base64());
        assert_eq!(
            extract_to_vec(attachments[0].data.as_ref()).unwrap(),
            b"PAYLOAD"
        );
    }

    #[test]
    fn classification_is_stable_across_round_trip() {
        let mut message = parse(b"Content-Type: text/plain\r\n\r\nhi");
        add_attachment(
            &mut message,
            Attachment::from_bytes(b"DATA".to_vec(), None, "f.bin"),
        )
        .unwrap();
        let before = find_attachments(&message).unwrap().len();
        let bytes = message.to_bytes(&GenerationContext::default()).unwrap();
        let reparsed = parse(&bytes);
        assert_eq!(find_attachments(&reparsed).unwrap().len(), before);
    }

    #[test]
    fn message_attachment_wraps_rfc822() {
        let mut message = parse(b"Content-Type: text/plain\r\n\r\nouter");
        let inner = parse(b"Subject: inner\r\n\r\ninner body");
        add_message_attachment(&mut message, &inner).unwrap();
        let attached = message.body().part_at(1).unwrap();
        assert_eq!(
            attached.body().content_type(),
            &MediaType::message_rfc822()
        );
    }
}
