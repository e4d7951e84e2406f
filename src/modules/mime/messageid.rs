// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailForgeResult;
use crate::modules::mime::{
    Component, FoldingWriter, GenerationContext, ParsedBounds, ParsingContext,
};
use crate::modules::platform;
use crate::modules::stream::OutputStream;
use serde::{Deserialize, Serialize};

/// An RFC 5322 `<left@right>` message identifier.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct MessageId {
    left: String,
    right: String,
    #[serde(skip)]
    bounds: ParsedBounds,
}

impl MessageId {
    pub fn new(left: &str, right: &str) -> Self {
        Self {
            left: left.to_string(),
            right: right.to_string(),
            bounds: ParsedBounds::default(),
        }
    }

    /// A fresh identifier: `<time.pid.random@hostname>`.
    pub fn generate_unique() -> Self {
        let handler = platform::handler();
        Self::new(
            &format!(
                "{}.{}.{}",
                handler.unix_time(),
                handler.process_id(),
                crate::modules::utils::random_string(12)
            ),
            &handler.hostname(),
        )
    }

    pub fn from_string(raw: &str) -> Self {
        let trimmed = raw
            .trim()
            .trim_start_matches('<')
            .trim_end_matches('>');
        match trimmed.split_once('@') {
            Some((left, right)) => Self::new(left, right),
            None => Self::new(trimmed, ""),
        }
    }

    pub fn left(&self) -> &str {
        &self.left
    }

    pub fn right(&self) -> &str {
        &self.right
    }

    /// The `left@right` form without angle brackets.
    pub fn id(&self) -> String {
        if self.right.is_empty() {
            self.left.clone()
        } else {
            format!("{}@{}", self.left, self.right)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}>", self.id())
    }
}

impl Component for MessageId {
    fn parse(
        &mut self,
        _ctx: &ParsingContext,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize> {
        let raw = String::from_utf8_lossy(&buffer[start..end]);
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
        writer.write_atom(self.to_string().as_bytes())?;
        Ok(writer.column())
    }

    fn parsed_bounds(&self) -> ParsedBounds {
        self.bounds
    }
}

/// An ordered sequence of message identifiers, as carried by
/// `References:` and `In-Reply-To:`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct MessageIdSequence {
    ids: Vec<MessageId>,
    #[serde(skip)]
    bounds: ParsedBounds,
}

impl MessageIdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[MessageId] {
        &self.ids
    }

    pub fn push(&mut self, id: MessageId) {
        self.ids.push(id);
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn last(&self) -> Option<&MessageId> {
        self.ids.last()
    }
}

impl Component for MessageIdSequence {
    fn parse(
        &mut self,
        _ctx: &ParsingContext,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize> {
        self.ids.clear();
        let raw = &buffer[start..end];
        let mut position = 0;
        while let Some(open) = raw[position..].iter().position(|&b| b == b'<') {
            let id_start = position + open;
            let Some(close) = raw[id_start..].iter().position(|&b| b == b'>') else {
                break;
            };
            let id_end = id_start + close + 1;
            let text = String::from_utf8_lossy(&raw[id_start..id_end]);
            self.ids.push(MessageId::from_string(&text));
            position = id_end;
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
        for (index, id) in self.ids.iter().enumerate() {
            if index > 0 {
                writer.write_raw(b" ")?;
            }
            writer.write_atom(id.to_string().as_bytes())?;
        }
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
    fn parse_strips_angle_brackets() {
        let id = MessageId::from_string("<left.part@example.org>");
        assert_eq!(id.left(), "left.part");
        assert_eq!(id.right(), "example.org");
        assert_eq!(id.to_string(), "<left.part@example.org>");
    }

    #[test]
    fn generated_ids_are_unique() {
        let first = MessageId::generate_unique();
        let second = MessageId::generate_unique();
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn sequence_parses_multiple_ids() {
        let raw = b"<a@x> <b@y>\r\n <c@z>";
        let mut sequence = MessageIdSequence::new();
        sequence
            .parse(&ParsingContext::default(), raw, 0, raw.len())
            .unwrap();
        assert_eq!(sequence.ids().len(), 3);
        assert_eq!(sequence.ids()[1].id(), "b@y");
        assert_eq!(
            crate::modules::mime::generate_to_string(&sequence).unwrap(),
            "<a@x> <b@y> <c@z>"
        );
    }
}
