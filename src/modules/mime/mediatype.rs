// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailForgeResult;
use crate::modules::mime::{
    trim_range, Component, FoldingWriter, GenerationContext, ParsedBounds, ParsingContext,
};
use crate::modules::stream::OutputStream;
use serde::{Deserialize, Serialize};

pub const TEXT: &str = "text";
pub const MULTIPART: &str = "multipart";
pub const MESSAGE: &str = "message";
pub const APPLICATION: &str = "application";
pub const IMAGE: &str = "image";

/// A `type/subtype` media type. Parameters live on the containing
/// parameterized header field, not here.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct MediaType {
    media_type: String,
    sub_type: String,
    #[serde(skip)]
    bounds: ParsedBounds,
}

impl MediaType {
    pub fn new(media_type: &str, sub_type: &str) -> Self {
        Self {
            media_type: media_type.trim().to_ascii_lowercase(),
            sub_type: sub_type.trim().to_ascii_lowercase(),
            bounds: ParsedBounds::default(),
        }
    }

    pub fn from_string(full: &str) -> Self {
        match full.split_once('/') {
            Some((media_type, sub_type)) => Self::new(media_type, sub_type),
            None => Self::new(full, ""),
        }
    }

    pub fn text_plain() -> Self {
        Self::new(TEXT, "plain")
    }

    pub fn text_html() -> Self {
        Self::new(TEXT, "html")
    }

    pub fn multipart_mixed() -> Self {
        Self::new(MULTIPART, "mixed")
    }

    pub fn application_octet_stream() -> Self {
        Self::new(APPLICATION, "octet-stream")
    }

    pub fn message_rfc822() -> Self {
        Self::new(MESSAGE, "rfc822")
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn sub_type(&self) -> &str {
        &self.sub_type
    }

    pub fn is_multipart(&self) -> bool {
        self.media_type == MULTIPART
    }

    pub fn is_text(&self) -> bool {
        self.media_type == TEXT
    }

    pub fn full(&self) -> String {
        format!("{}/{}", self.media_type, self.sub_type)
    }
}

impl Default for MediaType {
    fn default() -> Self {
        Self::text_plain()
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.media_type, self.sub_type)
    }
}

impl Component for MediaType {
    fn parse(
        &mut self,
        _ctx: &ParsingContext,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize> {
        let (from, to) = trim_range(buffer, start, end);
        let raw = String::from_utf8_lossy(&buffer[from..to]);
        *self = Self::from_string(&raw);
        self.bounds = ParsedBounds { start, end };
        Ok(end)
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        out: &mut dyn OutputStream,
        cur_col: usize,
    ) -> MailForgeResult<usize> {
        let mut writer = FoldingWriter::new(out, cur_col, ctx.wrap_column());
        writer.write_atom(self.full().as_bytes())?;
        Ok(writer.column())
    }

    fn parsed_bounds(&self) -> ParsedBounds {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalises_case_and_space() {
        let mut value = MediaType::default();
        value
            .parse(&ParsingContext::default(), b"  Text/HTML ", 0, 12)
            .unwrap();
        assert_eq!(value, MediaType::text_html());
    }

    #[test]
    fn missing_subtype_is_tolerated() {
        let value = MediaType::from_string("weird");
        assert_eq!(value.media_type(), "weird");
        assert_eq!(value.sub_type(), "");
    }
}
