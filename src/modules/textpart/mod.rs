// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! High-level text surfaces of a message: the plain-text part and the
//! HTML part with its embedded objects, composed into
//! `multipart/alternative` / `multipart/related` structures.

use crate::modules::charset::Charset;
use crate::modules::content::{extract_to_vec, ContentHandler, StringContentHandler};
use crate::modules::encoding::Encoding;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::mime::field::{FieldValue, HeaderField};
use crate::modules::mime::mediatype::MediaType;
use crate::modules::mime::messageid::MessageId;
use crate::modules::mime::part::{BodyPart, Message};
use crate::modules::mime::registry::fields;
use crate::raise_error;
use std::sync::Arc;

/// A single `text/plain` part.
pub struct PlainTextPart {
    text: Arc<dyn ContentHandler>,
    charset: Charset,
}

impl PlainTextPart {
    pub fn new(charset: Charset, text: impl Into<Vec<u8>>) -> Self {
        Self {
            text: Arc::new(StringContentHandler::new(text)),
            charset,
        }
    }

    pub fn text(&self) -> &Arc<dyn ContentHandler> {
        &self.text
    }

    pub fn charset(&self) -> &Charset {
        &self.charset
    }

    /// Number of parts this surface appends to its parent.
    pub fn part_count(&self) -> usize {
        1
    }

    /// Append this surface to `parent` as one `text/plain` child.
    pub fn generate_in(&self, parent: &mut BodyPart) -> MailForgeResult<()> {
        let data = extract_to_vec(self.text.as_ref())?;
        let encoding =
            crate::modules::encoding::decide(&data, &self.charset, crate::modules::encoding::EncodingUsage::Text);
        let part = BodyPart::build(
            MediaType::text_plain(),
            Some(&self.charset),
            encoding,
            self.text.clone(),
        );
        parent.body_mut().append_part(part);
        Ok(())
    }

    /// Read the surface back from a parsed `text/plain` part.
    pub fn parse_from(part: &BodyPart) -> MailForgeResult<Self> {
        let data = extract_to_vec(part.body().contents().as_ref())?;
        Ok(Self {
            text: Arc::new(StringContentHandler::new(data)),
            charset: part.body().charset().clone(),
        })
    }
}

/// How an embedded object is referenced from the HTML text.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReferenceKind {
    ById,
    ByLocation,
}

/// One object (image, stylesheet, ...) embedded in an HTML part.
pub struct EmbeddedObject {
    data: Arc<dyn ContentHandler>,
    encoding: Encoding,
    id: String,
    media_type: MediaType,
    reference_kind: ReferenceKind,
}

impl EmbeddedObject {
    pub fn new(
        data: Arc<dyn ContentHandler>,
        encoding: Encoding,
        id: &str,
        media_type: MediaType,
        reference_kind: ReferenceKind,
    ) -> Self {
        Self {
            data,
            encoding,
            id: id.to_string(),
            media_type,
            reference_kind,
        }
    }

    pub fn data(&self) -> &Arc<dyn ContentHandler> {
        &self.data
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    pub fn reference_kind(&self) -> ReferenceKind {
        self.reference_kind
    }

    /// The string to use in HTML to reference this object.
    pub fn reference(&self) -> String {
        match self.reference_kind {
            ReferenceKind::ById => format!("cid:{}", self.id),
            ReferenceKind::ByLocation => self.id.clone(),
        }
    }

    /// Whether `reference` (a Content-Id or Content-Location value)
    /// matches this object's id, tolerating the `cid:` prefix.
    fn matches(id: &str, reference: &str) -> bool {
        reference.eq_ignore_ascii_case(id)
            || reference
                .strip_prefix("cid:")
                .map(|stripped| stripped.eq_ignore_ascii_case(id))
                .unwrap_or(false)
            || id
                .strip_prefix("cid:")
                .map(|stripped| stripped.eq_ignore_ascii_case(reference))
                .unwrap_or(false)
    }
}

/// The HTML surface: an HTML content handler, its charset, an optional
/// plain-text alternative and an ordered list of embedded objects.
pub struct HtmlTextPart {
    html: Arc<dyn ContentHandler>,
    plain: Option<Arc<dyn ContentHandler>>,
    charset: Charset,
    objects: Vec<EmbeddedObject>,
}

impl HtmlTextPart {
    pub fn new(charset: Charset, html: impl Into<Vec<u8>>) -> Self {
        Self {
            html: Arc::new(StringContentHandler::new(html)),
            plain: None,
            charset,
            objects: Vec::new(),
        }
    }

    pub fn html(&self) -> &Arc<dyn ContentHandler> {
        &self.html
    }

    pub fn plain(&self) -> Option<&Arc<dyn ContentHandler>> {
        self.plain.as_ref()
    }

    pub fn charset(&self) -> &Charset {
        &self.charset
    }

    pub fn objects(&self) -> &[EmbeddedObject] {
        &self.objects
    }

    pub fn set_plain_text(&mut self, text: impl Into<Vec<u8>>) {
        self.plain = Some(Arc::new(StringContentHandler::new(text)));
    }

    /// Embed an object referenced by Content-Id, returning the
    /// `cid:`-style reference to put in the HTML.
    pub fn add_object(
        &mut self,
        data: Arc<dyn ContentHandler>,
        encoding: Encoding,
        media_type: MediaType,
    ) -> String {
        let id = MessageId::generate_unique().id();
        let object = EmbeddedObject::new(data, encoding, &id, media_type, ReferenceKind::ById);
        let reference = object.reference();
        self.objects.push(object);
        reference
    }

    /// Number of parts this surface appends to its parent: alternative
    /// counts as one tree.
    pub fn part_count(&self) -> usize {
        1
    }

    /// Compose into `parent`: `multipart/alternative` when a plain
    /// alternative exists (plain first), `multipart/related` around the
    /// HTML when objects exist, bare HTML part otherwise.
    pub fn generate_in(&self, parent: &mut BodyPart) -> MailForgeResult<()> {
        let html_data = extract_to_vec(self.html.as_ref())?;
        let html_encoding = crate::modules::encoding::decide(
            &html_data,
            &self.charset,
            crate::modules::encoding::EncodingUsage::Text,
        );
        let html_part = BodyPart::build(
            MediaType::text_html(),
            Some(&self.charset),
            html_encoding,
            self.html.clone(),
        );

        let html_tree = if self.objects.is_empty() {
            html_part
        } else {
            let mut related = container_part(MediaType::new("multipart", "related"));
            related.body_mut().append_part(html_part);
            for object in &self.objects {
                let mut object_part = BodyPart::build(
                    object.media_type.clone(),
                    None,
                    object.encoding.clone(),
                    object.data.clone(),
                );
                match object.reference_kind {
                    ReferenceKind::ById => {
                        object_part.header_mut().set_field_value(
                            fields::CONTENT_ID,
                            FieldValue::MessageId(MessageId::from_string(&object.id)),
                        );
                    }
                    ReferenceKind::ByLocation => {
                        object_part.header_mut().set_field_value(
                            fields::CONTENT_LOCATION,
                            FieldValue::Text(crate::modules::mime::text::Text::ascii(&object.id)),
                        );
                    }
                }
                related.body_mut().append_part(object_part);
            }
            related
        };

        let tree = match &self.plain {
            Some(plain) => {
                let plain_data = extract_to_vec(plain.as_ref())?;
                let plain_encoding = crate::modules::encoding::decide(
                    &plain_data,
                    &self.charset,
                    crate::modules::encoding::EncodingUsage::Text,
                );
                let plain_part = BodyPart::build(
                    MediaType::text_plain(),
                    Some(&self.charset),
                    plain_encoding,
                    plain.clone(),
                );
                let mut alternative =
                    container_part(MediaType::new("multipart", "alternative"));
                alternative.body_mut().append_part(plain_part);
                alternative.body_mut().append_part(html_tree);
                alternative
            }
            None => html_tree,
        };

        parent.body_mut().append_part(tree);
        Ok(())
    }

    /// Decompose a parsed message: locate the HTML part, its plain
    /// alternative, and every embedded object actually referenced from
    /// the HTML text.
    pub fn parse_from(message: &Message) -> MailForgeResult<Self> {
        let mut html_part: Option<&BodyPart> = None;
        let mut plain_part: Option<&BodyPart> = None;
        let mut candidates: Vec<(&BodyPart, String, ReferenceKind)> = Vec::new();

        message.walk(&mut |part, _is_root| {
            let content_type = part.body().content_type().clone();
            if content_type == MediaType::text_html() && html_part.is_none() {
                html_part = Some(part);
            } else if content_type == MediaType::text_plain() && plain_part.is_none() {
                plain_part = Some(part);
            }

            if let Some(field) = part.header().field(fields::CONTENT_ID) {
                if let Ok(value) = field.value() {
                    if let Ok(id) = value.as_message_id() {
                        candidates.push((part, id.id(), ReferenceKind::ById));
                        return;
                    }
                }
            }
            if let Some(field) = part.header().field(fields::CONTENT_LOCATION) {
                if let Ok(value) = field.value() {
                    if let Ok(text) = value.as_text() {
                        candidates.push((part, text.to_utf8_lossy(), ReferenceKind::ByLocation));
                    }
                }
            }
        });

        let html_part = html_part.ok_or_else(|| {
            raise_error!(
                "message has no text/html part".into(),
                ErrorCode::NoSuchPart
            )
        })?;
        let html_bytes = extract_to_vec(html_part.body().contents().as_ref())?;
        let html_text = String::from_utf8_lossy(&html_bytes).to_ascii_lowercase();

        let mut surface = Self {
            html: Arc::new(StringContentHandler::new(html_bytes.clone())),
            plain: None,
            charset: html_part.body().charset().clone(),
            objects: Vec::new(),
        };

        if let Some(plain) = plain_part {
            surface.plain = Some(Arc::new(StringContentHandler::new(extract_to_vec(
                plain.body().contents().as_ref(),
            )?)));
        }

        // associate an object only when the HTML actually references it
        for (part, id, kind) in candidates {
            let referenced = match kind {
                ReferenceKind::ById => {
                    // ids are only ever referenced through "cid:"
                    html_text.contains(&format!("cid:{}", id.to_ascii_lowercase()))
                }
                ReferenceKind::ByLocation => html_text.contains(&id.to_ascii_lowercase()),
            };
            if !referenced {
                continue;
            }
            surface.objects.push(EmbeddedObject::new(
                Arc::new(StringContentHandler::new(extract_to_vec(
                    part.body().contents().as_ref(),
                )?)),
                part.body().encoding().clone(),
                &id,
                part.body().content_type().clone(),
                kind,
            ));
        }

        Ok(surface)
    }

    /// Find the object a reference string points at.
    pub fn find_object(&self, reference: &str) -> Option<&EmbeddedObject> {
        self.objects
            .iter()
            .find(|object| EmbeddedObject::matches(&object.id, reference))
    }

    pub fn has_object(&self, reference: &str) -> bool {
        self.find_object(reference).is_some()
    }
}

fn container_part(media_type: MediaType) -> BodyPart {
    let mut part = BodyPart::new();
    let mut field = HeaderField::with_value(
        fields::CONTENT_TYPE,
        FieldValue::MediaType(media_type.clone()),
    );
    let _ = field.set_parameter(
        "boundary",
        crate::modules::mime::word::Word::ascii(&crate::modules::utils::random_boundary()),
    );
    part.header_mut().append(field);
    part.body_mut().set_content_type(media_type);
    part
}
