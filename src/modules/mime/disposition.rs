// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailForgeResult;
use crate::modules::mime::{
    trim_range, Component, FoldingWriter, GenerationContext, ParsedBounds, ParsingContext,
};
use crate::modules::stream::OutputStream;
use serde::{Deserialize, Serialize};

pub const INLINE: &str = "inline";
pub const ATTACHMENT: &str = "attachment";

/// The `Content-Disposition` token. Parameters such as `filename` live
/// on the containing field.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct ContentDisposition {
    name: String,
    #[serde(skip)]
    bounds: ParsedBounds,
}

impl ContentDisposition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim().to_ascii_lowercase(),
            bounds: ParsedBounds::default(),
        }
    }

    pub fn inline() -> Self {
        Self::new(INLINE)
    }

    pub fn attachment() -> Self {
        Self::new(ATTACHMENT)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_inline(&self) -> bool {
        self.name == INLINE
    }
}

impl Default for ContentDisposition {
    fn default() -> Self {
        Self::attachment()
    }
}

impl Component for ContentDisposition {
    fn parse(
        &mut self,
        _ctx: &ParsingContext,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize> {
        let (from, to) = trim_range(buffer, start, end);
        self.name = String::from_utf8_lossy(&buffer[from..to])
            .trim()
            .to_ascii_lowercase();
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
        writer.write_atom(self.name.as_bytes())?;
        Ok(writer.column())
    }

    fn parsed_bounds(&self) -> ParsedBounds {
        self.bounds
    }
}

/// An RFC 3798 disposition field value:
/// `action-mode/sending-mode; disposition-type[/modifier,modifier]`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct Disposition {
    action_mode: String,
    sending_mode: String,
    disposition_type: String,
    modifiers: Vec<String>,
    #[serde(skip)]
    bounds: ParsedBounds,
}

impl Disposition {
    pub fn new(
        action_mode: &str,
        sending_mode: &str,
        disposition_type: &str,
    ) -> Self {
        Self {
            action_mode: action_mode.to_ascii_lowercase(),
            sending_mode: sending_mode.to_ascii_lowercase(),
            disposition_type: disposition_type.to_ascii_lowercase(),
            modifiers: Vec::new(),
            bounds: ParsedBounds::default(),
        }
    }

    /// `automatic-action/MDN-sent-automatically; displayed`
    pub fn automatic_displayed() -> Self {
        Self::new("automatic-action", "mdn-sent-automatically", "displayed")
    }

    pub fn action_mode(&self) -> &str {
        &self.action_mode
    }

    pub fn sending_mode(&self) -> &str {
        &self.sending_mode
    }

    pub fn disposition_type(&self) -> &str {
        &self.disposition_type
    }

    pub fn modifiers(&self) -> &[String] {
        &self.modifiers
    }

    pub fn add_modifier(&mut self, modifier: &str) {
        self.modifiers.push(modifier.to_ascii_lowercase());
    }
}

impl Component for Disposition {
    fn parse(
        &mut self,
        _ctx: &ParsingContext,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize> {
        let raw = String::from_utf8_lossy(&buffer[start..end]);
        let raw = raw.trim();
        *self = Self::default();

        let (modes, type_part) = match raw.split_once(';') {
            Some((modes, rest)) => (modes.trim(), rest.trim()),
            None => ("", raw),
        };

        if !modes.is_empty() {
            let mut modes = modes.splitn(2, '/');
            self.action_mode = modes.next().unwrap_or("").trim().to_ascii_lowercase();
            self.sending_mode = modes.next().unwrap_or("").trim().to_ascii_lowercase();
        }

        let mut type_split = type_part.splitn(2, '/');
        self.disposition_type = type_split.next().unwrap_or("").trim().to_ascii_lowercase();
        if let Some(modifiers) = type_split.next() {
            self.modifiers = modifiers
                .split(',')
                .map(|m| m.trim().to_ascii_lowercase())
                .filter(|m| !m.is_empty())
                .collect();
        }

        self.bounds = ParsedBounds { start, end };
        Ok(end)
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        out: &mut dyn OutputStream,
        cur_col: usize,
    ) -> MailForgeResult<usize> {
        let mut rendered = String::new();
        if !self.action_mode.is_empty() {
            rendered.push_str(&self.action_mode);
            rendered.push('/');
            rendered.push_str(&self.sending_mode);
            rendered.push_str("; ");
        }
        rendered.push_str(&self.disposition_type);
        if !self.modifiers.is_empty() {
            rendered.push('/');
            rendered.push_str(&self.modifiers.join(","));
        }
        let mut writer = FoldingWriter::new(out, cur_col, ctx.wrap_column());
        writer.write_atom(rendered.as_bytes())?;
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
    fn mdn_disposition_parses_modes_and_type() {
        let raw = "automatic-action/MDN-sent-automatically; displayed";
        let mut value = Disposition::default();
        value
            .parse(&ParsingContext::default(), raw.as_bytes(), 0, raw.len())
            .unwrap();
        assert_eq!(value.action_mode(), "automatic-action");
        assert_eq!(value.sending_mode(), "mdn-sent-automatically");
        assert_eq!(value.disposition_type(), "displayed");
        assert!(value.modifiers().is_empty());
    }

    #[test]
    fn modifiers_split_on_commas() {
        let raw = "manual-action/MDN-sent-manually; deleted/expired,mailbox-terminated";
        let mut value = Disposition::default();
        value
            .parse(&ParsingContext::default(), raw.as_bytes(), 0, raw.len())
            .unwrap();
        assert_eq!(value.disposition_type(), "deleted");
        assert_eq!(value.modifiers(), ["expired", "mailbox-terminated"]);
    }

    #[test]
    fn content_disposition_token_normalises() {
        let mut value = ContentDisposition::default();
        value
            .parse(&ParsingContext::default(), b" Inline ", 0, 8)
            .unwrap();
        assert!(value.is_inline());
    }
}
