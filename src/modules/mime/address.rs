// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailForgeResult;
use crate::modules::mime::text::Text;
use crate::modules::mime::{
    unfold, Component, FoldingWriter, GenerationContext, ParsedBounds, ParsingContext,
};
use crate::modules::stream::OutputStream;

/// A display name plus an `addr-spec`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mailbox {
    name: Text,
    email: String,
    bounds: ParsedBounds,
}

impl Mailbox {
    pub fn new(name: Text, email: &str) -> Self {
        Self {
            name,
            email: email.to_string(),
            bounds: ParsedBounds::default(),
        }
    }

    pub fn from_email(email: &str) -> Self {
        Self::new(Text::new(), email)
    }

    pub fn name(&self) -> &Text {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn set_email(&mut self, email: &str) {
        self.email = email.to_string();
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_empty() && self.name.is_empty()
    }

    fn parse_str(ctx: &ParsingContext, raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(open) = raw.rfind('<') {
            let close = raw[open..].find('>').map(|p| open + p).unwrap_or(raw.len());
            let email = raw[open + 1..close].trim().to_string();
            let display = raw[..open].trim().trim_matches('"').trim();
            let name = if display.is_empty() {
                Text::new()
            } else {
                Text::parse_multiple(ctx, display.as_bytes())
            };
            return Self::new(name, &email);
        }

        // bare addr-spec, possibly with a "(comment)" display name
        let mut email = String::new();
        let mut comment = String::new();
        let mut depth = 0usize;
        for ch in raw.chars() {
            match ch {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ if depth > 0 => comment.push(ch),
                _ if ch.is_whitespace() => {}
                _ => email.push(ch),
            }
        }
        let name = if comment.is_empty() {
            Text::new()
        } else {
            Text::parse_multiple(ctx, comment.trim().as_bytes())
        };
        Self::new(name, &email)
    }
}

impl Component for Mailbox {
    fn parse(
        &mut self,
        ctx: &ParsingContext,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize> {
        let unfolded = unfold(&buffer[start..end]);
        let raw = String::from_utf8_lossy(&unfolded).into_owned();
        *self = Self::parse_str(ctx, &raw);
        self.bounds = ParsedBounds { start, end };
        Ok(end)
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        out: &mut dyn OutputStream,
        cur_col: usize,
    ) -> MailForgeResult<usize> {
        let column = if self.name.is_empty() {
            let mut writer = FoldingWriter::new(out, cur_col, ctx.wrap_column());
            writer.write_atom(self.email.as_bytes())?;
            writer.column()
        } else {
            let column = self.name.generate(ctx, out, cur_col)?;
            let mut writer = FoldingWriter::new(out, column, ctx.wrap_column());
            writer.write_atom(format!(" <{}>", self.email).as_bytes())?;
            writer.column()
        };
        Ok(column)
    }

    fn parsed_bounds(&self) -> ParsedBounds {
        self.bounds
    }
}

/// Either a single mailbox or a named group of mailboxes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address {
    Mailbox(Mailbox),
    Group { name: Text, mailboxes: Vec<Mailbox> },
}

impl Address {
    pub fn mailboxes(&self) -> Vec<&Mailbox> {
        match self {
            Address::Mailbox(mailbox) => vec![mailbox],
            Address::Group { mailboxes, .. } => mailboxes.iter().collect(),
        }
    }
}

/// Split a header value on top-level commas, ignoring commas inside
/// quoted strings, angle brackets and comments.
fn split_addresses(raw: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut angle_depth = 0usize;
    let mut paren_depth = 0usize;

    for ch in raw.chars() {
        match ch {
            '"' if paren_depth == 0 => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '<' if !in_quotes && paren_depth == 0 => {
                angle_depth += 1;
                current.push(ch);
            }
            '>' if !in_quotes && paren_depth == 0 => {
                angle_depth = angle_depth.saturating_sub(1);
                current.push(ch);
            }
            '(' if !in_quotes => {
                paren_depth += 1;
                current.push(ch);
            }
            ')' if !in_quotes => {
                paren_depth = paren_depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if !in_quotes && angle_depth == 0 && paren_depth == 0 => {
                segments.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    segments.push(current);
    segments
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// An ordered list of addresses (mailboxes and groups).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressList {
    addresses: Vec<Address>,
    bounds: ParsedBounds,
}

impl AddressList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn push(&mut self, address: Address) {
        self.addresses.push(address);
    }

    pub fn push_mailbox(&mut self, mailbox: Mailbox) {
        self.addresses.push(Address::Mailbox(mailbox));
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Every mailbox in the list, with groups flattened.
    pub fn mailboxes(&self) -> Vec<&Mailbox> {
        self.addresses
            .iter()
            .flat_map(|address| address.mailboxes())
            .collect()
    }

    fn parse_str(ctx: &ParsingContext, raw: &str) -> Self {
        let mut list = Self::new();
        let mut rest = raw.trim();

        // group syntax: display-name ':' mailbox-list ';'
        while let Some(colon) = find_group_colon(rest) {
            let (before, after) = rest.split_at(colon);
            let members_end = after.find(';').unwrap_or(after.len());
            for segment in split_addresses(before) {
                list.push_mailbox(Mailbox::parse_str(ctx, &segment));
            }
            let group_name = before
                .rsplit(',')
                .next()
                .unwrap_or(before)
                .trim()
                .to_string();
            // the group name was parsed above as a mailbox; drop it
            if !group_name.is_empty() {
                list.addresses.pop();
            }
            let members = &after[1..members_end];
            let mailboxes = split_addresses(members)
                .iter()
                .map(|segment| Mailbox::parse_str(ctx, segment))
                .collect();
            list.push(Address::Group {
                name: Text::parse_multiple(ctx, group_name.as_bytes()),
                mailboxes,
            });
            rest = after[members_end..].trim_start_matches(';').trim();
            if let Some(stripped) = rest.strip_prefix(',') {
                rest = stripped.trim();
            }
        }

        for segment in split_addresses(rest) {
            list.push_mailbox(Mailbox::parse_str(ctx, &segment));
        }
        list
    }
}

/// Position of a group-introducing colon: a top-level ':' occurring
/// before any '<' or '@'.
fn find_group_colon(raw: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (index, ch) in raw.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => return Some(index),
            '<' | '@' if !in_quotes => return None,
            _ => {}
        }
    }
    None
}

impl Component for AddressList {
    fn parse(
        &mut self,
        ctx: &ParsingContext,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize> {
        let unfolded = unfold(&buffer[start..end]);
        let raw = String::from_utf8_lossy(&unfolded).into_owned();
        *self = Self::parse_str(ctx, &raw);
        self.bounds = ParsedBounds { start, end };
        Ok(end)
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        out: &mut dyn OutputStream,
        cur_col: usize,
    ) -> MailForgeResult<usize> {
        let mut column = cur_col;
        for (index, address) in self.addresses.iter().enumerate() {
            if index > 0 {
                let mut writer = FoldingWriter::new(out, column, ctx.wrap_column());
                writer.write_raw(b", ")?;
                column = writer.column();
            }
            match address {
                Address::Mailbox(mailbox) => {
                    column = mailbox.generate(ctx, out, column)?;
                }
                Address::Group { name, mailboxes } => {
                    column = name.generate(ctx, out, column)?;
                    let mut writer = FoldingWriter::new(out, column, ctx.wrap_column());
                    writer.write_raw(b": ")?;
                    column = writer.column();
                    for (member_index, mailbox) in mailboxes.iter().enumerate() {
                        if member_index > 0 {
                            let mut writer = FoldingWriter::new(out, column, ctx.wrap_column());
                            writer.write_raw(b", ")?;
                            column = writer.column();
                        }
                        column = mailbox.generate(ctx, out, column)?;
                    }
                    let mut writer = FoldingWriter::new(out, column, ctx.wrap_column());
                    writer.write_raw(b";")?;
                    column = writer.column();
                }
            }
        }
        Ok(column)
    }

    fn parsed_bounds(&self) -> ParsedBounds {
        self.bounds
    }
}

/// A list restricted to mailboxes, as used by
/// `Disposition-Notification-To:`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MailboxList {
    mailboxes: Vec<Mailbox>,
    bounds: ParsedBounds,
}

impl MailboxList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mailboxes(&self) -> &[Mailbox] {
        &self.mailboxes
    }

    pub fn push(&mut self, mailbox: Mailbox) {
        self.mailboxes.push(mailbox);
    }

    pub fn is_empty(&self) -> bool {
        self.mailboxes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mailboxes.len()
    }
}

impl From<Mailbox> for MailboxList {
    fn from(mailbox: Mailbox) -> Self {
        Self {
            mailboxes: vec![mailbox],
            bounds: ParsedBounds::default(),
        }
    }
}

impl Component for MailboxList {
    fn parse(
        &mut self,
        ctx: &ParsingContext,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize> {
        let mut list = AddressList::new();
        list.parse(ctx, buffer, start, end)?;
        self.mailboxes = list.mailboxes().into_iter().cloned().collect();
        self.bounds = ParsedBounds { start, end };
        Ok(end)
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        out: &mut dyn OutputStream,
        cur_col: usize,
    ) -> MailForgeResult<usize> {
        let mut column = cur_col;
        for (index, mailbox) in self.mailboxes.iter().enumerate() {
            if index > 0 {
                let mut writer = FoldingWriter::new(out, column, ctx.wrap_column());
                writer.write_raw(b", ")?;
                column = writer.column();
            }
            column = mailbox.generate(ctx, out, column)?;
        }
        Ok(column)
    }

    fn parsed_bounds(&self) -> ParsedBounds {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::mime::generate_to_string;

    fn parse_mailbox(raw: &str) -> Mailbox {
        Mailbox::parse_str(&ParsingContext::default(), raw)
    }

    fn parse_list(raw: &str) -> AddressList {
        let mut list = AddressList::new();
        list.parse(&ParsingContext::default(), raw.as_bytes(), 0, raw.len())
            .unwrap();
        list
    }

    #[test]
    fn bare_address_parses() {
        let mailbox = parse_mailbox("user@example.org");
        assert_eq!(mailbox.email(), "user@example.org");
        assert!(mailbox.name().is_empty());
    }

    #[test]
    fn display_name_and_angle_address() {
        let mailbox = parse_mailbox("John Doe <john@example.org>");
        assert_eq!(mailbox.email(), "john@example.org");
        assert_eq!(mailbox.name().to_utf8_lossy(), "John Doe");
    }

    #[test]
    fn quoted_display_name_unquotes() {
        let mailbox = parse_mailbox("\"Doe, John\" <john@example.org>");
        assert_eq!(mailbox.name().to_utf8_lossy(), "Doe, John");
    }

    #[test]
    fn encoded_word_display_name_decodes() {
        let mailbox = parse_mailbox("=?utf-8?Q?Andr=C3=A9?= <andre@example.org>");
        assert_eq!(mailbox.name().to_utf8_lossy(), "André");
    }

    #[test]
    fn comment_becomes_display_name() {
        let mailbox = parse_mailbox("john@example.org (John Doe)");
        assert_eq!(mailbox.email(), "john@example.org");
        assert_eq!(mailbox.name().to_utf8_lossy(), "John Doe");
    }

    #[test]
    fn list_splits_on_top_level_commas_only() {
        let list = parse_list("\"Doe, John\" <j@x.org>, mary@y.org");
        assert_eq!(list.addresses().len(), 2);
        assert_eq!(list.mailboxes()[0].email(), "j@x.org");
        assert_eq!(list.mailboxes()[1].email(), "mary@y.org");
    }

    #[test]
    fn group_syntax_parses() {
        let list = parse_list("Team: a@x.org, b@x.org;, solo@y.org");
        assert_eq!(list.addresses().len(), 2);
        match &list.addresses()[0] {
            Address::Group { name, mailboxes } => {
                assert_eq!(name.to_utf8_lossy(), "Team");
                assert_eq!(mailboxes.len(), 2);
            }
            other => panic!("expected group, got {:?}", other),
        }
        assert_eq!(list.mailboxes().len(), 3);
    }

    #[test]
    fn generation_round_trips() {
        let list = parse_list("John Doe <j@x.org>, mary@y.org");
        assert_eq!(
            generate_to_string(&list).unwrap(),
            "John Doe <j@x.org>, mary@y.org"
        );
    }
}
