// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailForgeResult;
use crate::modules::mime::datetime::DateTime;
use crate::modules::mime::{
    unfold, Component, FoldingWriter, GenerationContext, ParsedBounds, ParsingContext,
};
use crate::modules::stream::OutputStream;

/// A `Received:` relay trace: `from`/`by`/`via`/`with`/`id`/`for`
/// clauses followed by `; date`. Parsing is tolerant; absent clauses
/// stay empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Received {
    from: String,
    by: String,
    via: String,
    with: Vec<String>,
    id: String,
    for_: String,
    date: DateTime,
    bounds: ParsedBounds,
}

impl Received {
    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn by(&self) -> &str {
        &self.by
    }

    pub fn via(&self) -> &str {
        &self.via
    }

    pub fn with(&self) -> &[String] {
        &self.with
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn for_mailbox(&self) -> &str {
        &self.for_
    }

    pub fn date(&self) -> &DateTime {
        &self.date
    }

    pub fn set_from(&mut self, from: &str) {
        self.from = from.to_string();
    }

    pub fn set_by(&mut self, by: &str) {
        self.by = by.to_string();
    }

    pub fn set_date(&mut self, date: DateTime) {
        self.date = date;
    }
}

impl Component for Received {
    fn parse(
        &mut self,
        ctx: &ParsingContext,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize> {
        *self = Self::default();
        let unfolded = unfold(&buffer[start..end]);
        let raw = String::from_utf8_lossy(&unfolded).into_owned();

        let (clauses, date_part) = match raw.rsplit_once(';') {
            Some((clauses, date)) => (clauses.to_string(), Some(date.trim().to_string())),
            None => (raw, None),
        };

        // strip comments before tokenizing
        let mut cleaned = String::new();
        let mut depth = 0usize;
        for ch in clauses.chars() {
            match ch {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ if depth == 0 => cleaned.push(ch),
                _ => {}
            }
        }

        let mut tokens = cleaned.split_ascii_whitespace().peekable();
        while let Some(keyword) = tokens.next() {
            let value = match tokens.peek() {
                Some(_) => tokens.next().unwrap_or("").to_string(),
                None => String::new(),
            };
            match keyword.to_ascii_lowercase().as_str() {
                "from" => self.from = value,
                "by" => self.by = value,
                "via" => self.via = value,
                "with" => self.with.push(value),
                "id" => self.id = value.trim_matches(['<', '>']).to_string(),
                "for" => self.for_ = value.trim_matches(['<', '>']).to_string(),
                _ => {}
            }
        }

        if let Some(date_raw) = date_part {
            let bytes = date_raw.as_bytes();
            self.date.parse(ctx, bytes, 0, bytes.len())?;
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
        let mut first = true;
        let mut clause = |writer: &mut FoldingWriter<'_>,
                          keyword: &str,
                          value: &str,
                          first: &mut bool|
         -> MailForgeResult<()> {
            if value.is_empty() {
                return Ok(());
            }
            if !*first {
                writer.write_raw(b" ")?;
            }
            writer.write_atom(format!("{} {}", keyword, value).as_bytes())?;
            *first = false;
            Ok(())
        };

        clause(&mut writer, "from", &self.from, &mut first)?;
        clause(&mut writer, "by", &self.by, &mut first)?;
        clause(&mut writer, "via", &self.via, &mut first)?;
        for with in &self.with {
            clause(&mut writer, "with", with, &mut first)?;
        }
        clause(&mut writer, "id", &self.id, &mut first)?;
        if !self.for_.is_empty() {
            clause(&mut writer, "for", &format!("<{}>", self.for_), &mut first)?;
        }

        writer.write_raw(b"; ")?;
        let column = writer.column();
        let column = self.date.generate(ctx, out, column)?;
        Ok(column)
    }

    fn parsed_bounds(&self) -> ParsedBounds {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typical_trace_parses() {
        let raw = "from mail.example.org (mail.example.org [192.0.2.1])\r\n by mx.local.net with ESMTP id ABC123\r\n for <user@local.net>; Tue, 15 Nov 1994 08:12:31 +0000";
        let mut received = Received::default();
        received
            .parse(&ParsingContext::default(), raw.as_bytes(), 0, raw.len())
            .unwrap();
        assert_eq!(received.from(), "mail.example.org");
        assert_eq!(received.by(), "mx.local.net");
        assert_eq!(received.with(), ["ESMTP"]);
        assert_eq!(received.id(), "ABC123");
        assert_eq!(received.for_mailbox(), "user@local.net");
        assert_eq!(received.date().year, 1994);
    }

    #[test]
    fn missing_date_recovers_to_epoch() {
        let raw = "from a by b";
        let mut received = Received::default();
        received
            .parse(&ParsingContext::default(), raw.as_bytes(), 0, raw.len())
            .unwrap();
        assert_eq!(received.date(), &DateTime::epoch());
    }
}
