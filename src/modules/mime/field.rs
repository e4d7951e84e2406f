// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::charset::Charset;
use crate::modules::encoding::Encoding;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::mime::address::{AddressList, Mailbox, MailboxList};
use crate::modules::mime::datetime::DateTime;
use crate::modules::mime::disposition::{ContentDisposition, Disposition};
use crate::modules::mime::mediatype::MediaType;
use crate::modules::mime::messageid::{MessageId, MessageIdSequence};
use crate::modules::mime::parameter::{self, Parameter};
use crate::modules::mime::path::Path;
use crate::modules::mime::received::Received;
use crate::modules::mime::registry::{self, FieldKind, ValueKind};
use crate::modules::mime::text::Text;
use crate::modules::mime::word::Word;
use crate::modules::mime::{
    Component, FoldingWriter, GenerationContext, ParsedBounds, ParsingContext,
};
use crate::modules::stream::OutputStream;
use crate::raise_error;
use std::sync::RwLock;

/// The polymorphic value of a header field.
#[derive(Clone, Debug)]
pub enum FieldValue {
    Text(Text),
    Mailbox(Mailbox),
    AddressList(AddressList),
    MailboxList(MailboxList),
    DateTime(DateTime),
    MediaType(MediaType),
    Encoding(Encoding),
    MessageId(MessageId),
    MessageIdSequence(MessageIdSequence),
    Path(Path),
    ContentDisposition(ContentDisposition),
    Disposition(Disposition),
    Received(Received),
}

macro_rules! value_accessor {
    ($method:ident, $variant:ident, $type:ty, $label:literal) => {
        pub fn $method(&self) -> MailForgeResult<&$type> {
            match self {
                FieldValue::$variant(value) => Ok(value),
                other => Err(raise_error!(
                    format!(
                        "field value is {} where {} was expected",
                        other.kind_name(),
                        $label
                    ),
                    ErrorCode::BadFieldValueType
                )),
            }
        }
    };
}

impl FieldValue {
    fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Mailbox(_) => "mailbox",
            FieldValue::AddressList(_) => "address-list",
            FieldValue::MailboxList(_) => "mailbox-list",
            FieldValue::DateTime(_) => "date-time",
            FieldValue::MediaType(_) => "media-type",
            FieldValue::Encoding(_) => "encoding",
            FieldValue::MessageId(_) => "message-id",
            FieldValue::MessageIdSequence(_) => "message-id-sequence",
            FieldValue::Path(_) => "path",
            FieldValue::ContentDisposition(_) => "content-disposition",
            FieldValue::Disposition(_) => "disposition",
            FieldValue::Received(_) => "received",
        }
    }

    value_accessor!(as_text, Text, Text, "text");
    value_accessor!(as_mailbox, Mailbox, Mailbox, "mailbox");
    value_accessor!(as_address_list, AddressList, AddressList, "address-list");
    value_accessor!(as_mailbox_list, MailboxList, MailboxList, "mailbox-list");
    value_accessor!(as_datetime, DateTime, DateTime, "date-time");
    value_accessor!(as_media_type, MediaType, MediaType, "media-type");
    value_accessor!(as_encoding, Encoding, Encoding, "encoding");
    value_accessor!(as_message_id, MessageId, MessageId, "message-id");
    value_accessor!(
        as_message_id_sequence,
        MessageIdSequence,
        MessageIdSequence,
        "message-id-sequence"
    );
    value_accessor!(as_path, Path, Path, "path");
    value_accessor!(
        as_content_disposition,
        ContentDisposition,
        ContentDisposition,
        "content-disposition"
    );
    value_accessor!(as_disposition, Disposition, Disposition, "disposition");
    value_accessor!(as_received, Received, Received, "received");

    fn parse_for(kind: ValueKind, ctx: &ParsingContext, raw: &[u8]) -> MailForgeResult<Self> {
        macro_rules! parse_component {
            ($type:ty, $variant:ident) => {{
                let mut value = <$type>::default();
                value.parse(ctx, raw, 0, raw.len())?;
                FieldValue::$variant(value)
            }};
        }
        Ok(match kind {
            ValueKind::Text => FieldValue::Text(Text::parse_multiple(ctx, raw)),
            ValueKind::Mailbox => parse_component!(Mailbox, Mailbox),
            ValueKind::AddressList => parse_component!(AddressList, AddressList),
            ValueKind::MailboxList => parse_component!(MailboxList, MailboxList),
            ValueKind::DateTime => parse_component!(DateTime, DateTime),
            ValueKind::MediaType => parse_component!(MediaType, MediaType),
            ValueKind::Encoding => FieldValue::Encoding(Encoding::new(
                String::from_utf8_lossy(raw).trim(),
            )),
            ValueKind::MessageId => FieldValue::MessageId(MessageId::from_string(
                &String::from_utf8_lossy(raw),
            )),
            ValueKind::MessageIdSequence => {
                parse_component!(MessageIdSequence, MessageIdSequence)
            }
            ValueKind::Path => parse_component!(Path, Path),
            ValueKind::ContentDisposition => {
                parse_component!(ContentDisposition, ContentDisposition)
            }
            ValueKind::Disposition => parse_component!(Disposition, Disposition),
            ValueKind::Received => parse_component!(Received, Received),
        })
    }

    fn generate_value(
        &self,
        ctx: &GenerationContext,
        out: &mut dyn OutputStream,
        cur_col: usize,
    ) -> MailForgeResult<usize> {
        match self {
            FieldValue::Text(value) => value.generate(ctx, out, cur_col),
            FieldValue::Mailbox(value) => value.generate(ctx, out, cur_col),
            FieldValue::AddressList(value) => value.generate(ctx, out, cur_col),
            FieldValue::MailboxList(value) => value.generate(ctx, out, cur_col),
            FieldValue::DateTime(value) => value.generate(ctx, out, cur_col),
            FieldValue::MediaType(value) => value.generate(ctx, out, cur_col),
            FieldValue::Encoding(value) => {
                let mut writer = FoldingWriter::new(out, cur_col, ctx.wrap_column());
                writer.write_atom(value.name().as_bytes())?;
                Ok(writer.column())
            }
            FieldValue::MessageId(value) => value.generate(ctx, out, cur_col),
            FieldValue::MessageIdSequence(value) => value.generate(ctx, out, cur_col),
            FieldValue::Path(value) => value.generate(ctx, out, cur_col),
            FieldValue::ContentDisposition(value) => value.generate(ctx, out, cur_col),
            FieldValue::Disposition(value) => value.generate(ctx, out, cur_col),
            FieldValue::Received(value) => value.generate(ctx, out, cur_col),
        }
    }
}

#[derive(Clone, Debug)]
struct ParsedBody {
    value: FieldValue,
    parameters: Vec<Parameter>,
}

/// One header field: a name plus a lazily parsed, possibly
/// parameterized body. The raw body bytes are kept so an unmodified
/// field regenerates byte-identically.
#[derive(Debug)]
pub struct HeaderField {
    name: String,
    kind: FieldKind,
    value_kind: ValueKind,
    raw_body: Vec<u8>,
    parsed: RwLock<Option<ParsedBody>>,
    dirty: bool,
    ctx: ParsingContext,
    bounds: ParsedBounds,
}

impl Clone for HeaderField {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            value_kind: self.value_kind,
            raw_body: self.raw_body.clone(),
            parsed: RwLock::new(self.parsed.read().expect("field lock poisoned").clone()),
            dirty: self.dirty,
            ctx: self.ctx.clone(),
            bounds: self.bounds,
        }
    }
}

impl HeaderField {
    /// Instantiate a field from its name and raw body. The body parses
    /// lazily on first value access.
    pub fn create(name: &str, raw_body: &[u8], ctx: &ParsingContext) -> Self {
        let descriptor = registry::lookup(name);
        Self {
            name: name.to_string(),
            kind: descriptor.kind,
            value_kind: descriptor.value_kind,
            raw_body: raw_body.to_vec(),
            parsed: RwLock::new(None),
            dirty: false,
            ctx: ctx.clone(),
            bounds: ParsedBounds::default(),
        }
    }

    /// Build a field directly from a value. The field is dirty from the
    /// start and always regenerates from the value.
    pub fn with_value(name: &str, value: FieldValue) -> Self {
        let descriptor = registry::lookup(name);
        Self {
            name: name.to_string(),
            kind: descriptor.kind,
            value_kind: descriptor.value_kind,
            raw_body: Vec::new(),
            parsed: RwLock::new(Some(ParsedBody {
                value,
                parameters: Vec::new(),
            })),
            dirty: true,
            ctx: ParsingContext::default(),
            bounds: ParsedBounds::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    fn ensure_parsed(&self) -> MailForgeResult<()> {
        {
            let guard = self.parsed.read().expect("field lock poisoned");
            if guard.is_some() {
                return Ok(());
            }
        }

        let (value, parameters) = match self.kind {
            FieldKind::Plain | FieldKind::MailboxField => (
                FieldValue::parse_for(self.value_kind, &self.ctx, &self.raw_body)?,
                Vec::new(),
            ),
            FieldKind::Parameterized | FieldKind::ContentType | FieldKind::ContentDisposition => {
                let unfolded = crate::modules::mime::unfold(&self.raw_body);
                let raw = String::from_utf8_lossy(&unfolded).into_owned();
                let (main, parameters) = parameter::parse_field_body(&self.ctx, &raw);
                (
                    FieldValue::parse_for(self.value_kind, &self.ctx, main.as_bytes())?,
                    parameters,
                )
            }
        };

        let mut guard = self.parsed.write().expect("field lock poisoned");
        if guard.is_none() {
            *guard = Some(ParsedBody { value, parameters });
        }
        Ok(())
    }

    /// The parsed field value.
    pub fn value(&self) -> MailForgeResult<FieldValue> {
        self.ensure_parsed()?;
        Ok(self
            .parsed
            .read()
            .expect("field lock poisoned")
            .as_ref()
            .expect("ensured above")
            .value
            .clone())
    }

    pub fn set_value(&mut self, value: FieldValue) {
        // parse first so existing parameters survive the replacement
        let _ = self.ensure_parsed();
        let parameters = self
            .parsed
            .get_mut()
            .expect("field lock poisoned")
            .take()
            .map(|body| body.parameters)
            .unwrap_or_default();
        *self.parsed.get_mut().expect("field lock poisoned") =
            Some(ParsedBody { value, parameters });
        self.dirty = true;
    }

    /// Ordered parameter list (empty for non-parameterized kinds).
    pub fn parameters(&self) -> MailForgeResult<Vec<Parameter>> {
        self.ensure_parsed()?;
        Ok(self
            .parsed
            .read()
            .expect("field lock poisoned")
            .as_ref()
            .expect("ensured above")
            .parameters
            .clone())
    }

    /// Case-insensitive parameter lookup.
    pub fn parameter(&self, name: &str) -> MailForgeResult<Option<Word>> {
        Ok(self
            .parameters()?
            .into_iter()
            .find(|parameter| parameter.name().eq_ignore_ascii_case(name))
            .map(|parameter| parameter.value().clone()))
    }

    pub fn parameter_utf8(&self, name: &str) -> MailForgeResult<Option<String>> {
        Ok(self.parameter(name)?.map(|word| {
            String::from_utf8_lossy(&word.converted_buffer(&Charset::utf_8())).into_owned()
        }))
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        matches!(self.parameter(name), Ok(Some(_)))
    }

    /// Set or replace a parameter, preserving list order for an
    /// existing name.
    pub fn set_parameter(&mut self, name: &str, value: Word) -> MailForgeResult<()> {
        self.ensure_parsed()?;
        let guard = self.parsed.get_mut().expect("field lock poisoned");
        let body = guard.as_mut().expect("ensured above");
        match body
            .parameters
            .iter_mut()
            .find(|parameter| parameter.name().eq_ignore_ascii_case(name))
        {
            Some(parameter) => parameter.set_value(value),
            None => body.parameters.push(Parameter::new(name, value)),
        }
        self.dirty = true;
        Ok(())
    }

    pub fn remove_parameter(&mut self, name: &str) -> MailForgeResult<()> {
        self.ensure_parsed()?;
        let guard = self.parsed.get_mut().expect("field lock poisoned");
        let body = guard.as_mut().expect("ensured above");
        body.parameters
            .retain(|parameter| !parameter.name().eq_ignore_ascii_case(name));
        self.dirty = true;
        Ok(())
    }

    /// `boundary` parameter of a Content-Type field.
    pub fn boundary(&self) -> MailForgeResult<Option<String>> {
        self.parameter_utf8("boundary")
    }

    /// `charset` parameter of a Content-Type field.
    pub fn charset_parameter(&self) -> MailForgeResult<Option<Charset>> {
        Ok(self
            .parameter_utf8("charset")?
            .map(|name| Charset::new(&name)))
    }

    /// `report-type` parameter of a Content-Type field (RFC 3798).
    pub fn report_type(&self) -> MailForgeResult<Option<String>> {
        self.parameter_utf8("report-type")
    }

    /// `filename` parameter of a Content-Disposition field.
    pub fn filename(&self) -> MailForgeResult<Option<String>> {
        self.parameter_utf8("filename")
    }
}

impl Component for HeaderField {
    fn parse(
        &mut self,
        ctx: &ParsingContext,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize> {
        self.raw_body = buffer[start..end].to_vec();
        self.ctx = ctx.clone();
        *self.parsed.get_mut().expect("field lock poisoned") = None;
        self.dirty = false;
        self.bounds = ParsedBounds { start, end };
        Ok(end)
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        out: &mut dyn OutputStream,
        cur_col: usize,
    ) -> MailForgeResult<usize> {
        let column = {
            let mut writer = FoldingWriter::new(out, cur_col, ctx.wrap_column());
            writer.write_raw(self.name.as_bytes())?;
            writer.write_raw(b": ")?;

            if !self.dirty && !self.raw_body.is_empty() {
                // unmodified fields round-trip byte-exactly
                writer.write_raw(&self.raw_body)?;
                return Ok(writer.column());
            }
            writer.column()
        };

        let guard = self.parsed.read().expect("field lock poisoned");
        let Some(body) = guard.as_ref() else {
            return Ok(column);
        };
        let column = body.value.generate_value(ctx, out, column)?;
        let mut writer = FoldingWriter::new(out, column, ctx.wrap_column());
        parameter::generate_parameters(&body.parameters, &mut writer)?;
        Ok(writer.column())
    }

    fn parsed_bounds(&self) -> ParsedBounds {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::mime::generate_to_string;

    fn field(name: &str, body: &str) -> HeaderField {
        HeaderField::create(name, body.as_bytes(), &ParsingContext::default())
    }

    #[test]
    fn content_type_parses_value_and_parameters() {
        let f = field("Content-Type", "multipart/mixed; boundary=\"=_abc\"");
        let value = f.value().unwrap();
        assert_eq!(value.as_media_type().unwrap(), &MediaType::multipart_mixed());
        assert_eq!(f.boundary().unwrap().as_deref(), Some("=_abc"));
    }

    #[test]
    fn wrong_value_type_is_reported() {
        let f = field("Content-Type", "text/plain");
        let error = f.value().unwrap().as_datetime().unwrap_err();
        assert_eq!(error.code(), ErrorCode::BadFieldValueType);
    }

    #[test]
    fn unmodified_field_round_trips_byte_exactly() {
        let f = field("Date", "Tue, 15 Nov 94 08:12:31 +0200");
        assert_eq!(
            generate_to_string(&f).unwrap(),
            "Date: Tue, 15 Nov 94 08:12:31 +0200"
        );
    }

    #[test]
    fn modified_field_regenerates_from_value() {
        let mut f = field("Content-Type", "text/plain");
        f.set_parameter("charset", Word::ascii("utf-8")).unwrap();
        assert_eq!(
            generate_to_string(&f).unwrap(),
            "Content-Type: text/plain; charset=utf-8"
        );
    }

    #[test]
    fn parameter_lookup_is_case_insensitive() {
        let f = field("Content-Disposition", "attachment; FileName=\"a.bin\"");
        assert_eq!(f.filename().unwrap().as_deref(), Some("a.bin"));
        assert!(f.has_parameter("FILENAME"));
    }

    #[test]
    fn mailbox_field_parses_whole_body() {
        let f = field("From", "John Doe <john@example.org>");
        let value = f.value().unwrap();
        assert_eq!(value.as_mailbox().unwrap().email(), "john@example.org");
    }
}
