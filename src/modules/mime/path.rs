// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailForgeResult;
use crate::modules::mime::{
    Component, FoldingWriter, GenerationContext, ParsedBounds, ParsingContext,
};
use crate::modules::stream::OutputStream;
use serde::{Deserialize, Serialize};

/// An RFC 5321 return path: `<local@domain>`, possibly the null path
/// `<>`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct Path {
    local_part: String,
    domain: String,
    #[serde(skip)]
    bounds: ParsedBounds,
}

impl Path {
    pub fn new(local_part: &str, domain: &str) -> Self {
        Self {
            local_part: local_part.to_string(),
            domain: domain.to_string(),
            bounds: ParsedBounds::default(),
        }
    }

    pub fn null() -> Self {
        Self::default()
    }

    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn is_null(&self) -> bool {
        self.local_part.is_empty() && self.domain.is_empty()
    }

    /// The `local@domain` address, empty for the null path.
    pub fn address(&self) -> String {
        if self.is_null() {
            String::new()
        } else if self.domain.is_empty() {
            self.local_part.clone()
        } else {
            format!("{}@{}", self.local_part, self.domain)
        }
    }
}

impl Component for Path {
    fn parse(
        &mut self,
        _ctx: &ParsingContext,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize> {
        let raw = String::from_utf8_lossy(&buffer[start..end]);
        let inner = raw.trim().trim_start_matches('<').trim_end_matches('>');
        match inner.rsplit_once('@') {
            Some((local_part, domain)) => {
                self.local_part = local_part.to_string();
                self.domain = domain.to_string();
            }
            None => {
                self.local_part = inner.to_string();
                self.domain = String::new();
            }
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
        let mut writer = FoldingWriter::new(out, cur_col, ctx.wrap_column());
        writer.write_atom(format!("<{}>", self.address()).as_bytes())?;
        Ok(writer.column())
    }

    fn parsed_bounds(&self) -> ParsedBounds {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Path {
        let mut path = Path::null();
        path.parse(&ParsingContext::default(), raw.as_bytes(), 0, raw.len())
            .unwrap();
        path
    }

    #[test]
    fn parses_bracketed_address() {
        let path = parse("<bounce@example.org>");
        assert_eq!(path.local_part(), "bounce");
        assert_eq!(path.domain(), "example.org");
    }

    #[test]
    fn null_path_round_trips() {
        let path = parse("<>");
        assert!(path.is_null());
        assert_eq!(
            crate::modules::mime::generate_to_string(&path).unwrap(),
            "<>"
        );
    }
}
