// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::charset::Charset;
use crate::modules::error::MailForgeResult;
use crate::modules::mime::word::Word;
use crate::modules::mime::{
    unfold, Component, FoldingWriter, GenerationContext, ParsedBounds, ParsingContext,
};
use crate::modules::stream::OutputStream;

/// An ordered sequence of words, together forming one header text.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Text {
    words: Vec<Word>,
    bounds: ParsedBounds,
}

impl Text {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_word(word: Word) -> Self {
        Self {
            words: vec![word],
            bounds: ParsedBounds::default(),
        }
    }

    pub fn from_utf8(text: &str) -> Self {
        Self::from_word(Word::utf8(text))
    }

    pub fn ascii(text: &str) -> Self {
        Self::from_word(Word::ascii(text))
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn push_word(&mut self, word: Word) {
        self.words.push(word);
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(Word::is_empty)
    }

    /// Split a raw header value into words: encoded words decode
    /// tolerantly, runs between them stay in the context default
    /// charset. Folding whitespace is collapsed first.
    pub fn parse_multiple(ctx: &ParsingContext, raw: &[u8]) -> Self {
        let data = unfold(raw);
        let mut words: Vec<(Word, bool)> = Vec::new();
        let mut raw_run: Vec<u8> = Vec::new();
        let mut position = 0;

        while position < data.len() {
            if data[position] == b'=' && data.get(position + 1) == Some(&b'?') {
                if let Some((word, consumed)) =
                    Word::parse_encoded_word(&data, position, data.len())
                {
                    // whitespace between adjacent encoded words is not
                    // significant (RFC 2047 §6.2)
                    let run_is_ws =
                        !raw_run.is_empty() && raw_run.iter().all(|b| b.is_ascii_whitespace());
                    let after_encoded = matches!(words.last(), Some((_, true)));
                    if run_is_ws && after_encoded {
                        raw_run.clear();
                    }
                    if !raw_run.is_empty() {
                        words.push((
                            Word::new(ctx.default_charset.clone(), std::mem::take(&mut raw_run)),
                            false,
                        ));
                    }

                    // adjacent encoded words of one charset concatenate
                    match words.last_mut() {
                        Some((previous, true)) if previous.charset() == word.charset() => {
                            let mut merged = previous.buffer().to_vec();
                            merged.extend_from_slice(word.buffer());
                            previous.set_buffer(merged);
                        }
                        _ => words.push((word, true)),
                    }
                    position = consumed;
                    continue;
                }
            }
            raw_run.push(data[position]);
            position += 1;
        }

        if !raw_run.is_empty() {
            words.push((Word::new(ctx.default_charset.clone(), raw_run), false));
        }

        Self {
            words: words.into_iter().map(|(word, _)| word).collect(),
            bounds: ParsedBounds::default(),
        }
    }

    /// The full text converted to `dest`. Adjacent words sharing a
    /// charset are joined with a single space; words of differing
    /// charsets abut directly (their own whitespace is preserved).
    pub fn whole_buffer(&self, dest: &Charset) -> Vec<u8> {
        let mut out = Vec::new();
        let mut previous_charset: Option<&Charset> = None;
        for word in &self.words {
            if previous_charset == Some(word.charset()) {
                out.push(b' ');
            }
            out.extend_from_slice(&word.converted_buffer(dest));
            previous_charset = Some(word.charset());
        }
        out
    }

    /// The text as UTF-8.
    pub fn to_utf8_lossy(&self) -> String {
        String::from_utf8_lossy(&self.whole_buffer(&Charset::utf_8())).into_owned()
    }
}

impl From<&str> for Text {
    fn from(text: &str) -> Self {
        if text.is_ascii() {
            Self::ascii(text)
        } else {
            Self::from_utf8(text)
        }
    }
}

impl Component for Text {
    fn parse(
        &mut self,
        ctx: &ParsingContext,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize> {
        *self = Self::parse_multiple(ctx, &buffer[start..end]);
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
        let mut previous: Option<&Word> = None;
        for word in &self.words {
            if let Some(previous_word) = previous {
                let previous_ends_ws = previous_word
                    .buffer()
                    .last()
                    .is_some_and(|b| b.is_ascii_whitespace());
                let current_starts_ws = word
                    .buffer()
                    .first()
                    .is_some_and(|b| b.is_ascii_whitespace());
                if !previous_ends_ws && !current_starts_ws {
                    writer.write_raw(b" ")?;
                }
            }
            word.generate_word(&mut writer, false)?;
            previous = Some(word);
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
    use crate::modules::mime::generate_to_string;

    fn parse(raw: &[u8]) -> Text {
        Text::parse_multiple(&ParsingContext::default(), raw)
    }

    #[test]
    fn plain_text_is_one_word() {
        let text = parse(b"Just some text");
        assert_eq!(text.word_count(), 1);
        assert_eq!(text.to_utf8_lossy(), "Just some text");
    }

    #[test]
    fn unfolding_applies_before_split() {
        let text = parse(b"Just some\r\n text");
        assert_eq!(text.to_utf8_lossy(), "Just some text");
    }

    #[test]
    fn encoded_word_round_trip_preserves_line() {
        let source = b"=?iso-8859-1?Q?Hello_=E9?= World";
        let text = parse(source);
        assert_eq!(text.word_count(), 2);
        assert_eq!(text.words()[0].buffer(), b"Hello \xe9");
        assert_eq!(text.words()[0].charset(), &Charset::iso_8859_1());
        assert_eq!(text.words()[1].buffer(), b" World");
        assert_eq!(text.words()[1].charset(), &Charset::us_ascii());
        assert_eq!(text.to_utf8_lossy(), "Hello é World");

        assert_eq!(
            generate_to_string(&text).unwrap(),
            String::from_utf8_lossy(source)
        );
    }

    #[test]
    fn adjacent_encoded_words_merge_without_space() {
        let text = parse(b"=?utf-8?Q?ab?= =?utf-8?Q?cd?=");
        assert_eq!(text.word_count(), 1);
        assert_eq!(text.to_utf8_lossy(), "abcd");
    }

    #[test]
    fn adjacent_encoded_words_of_distinct_charsets_stay_split() {
        let text = parse(b"=?utf-8?Q?ab?= =?iso-8859-1?Q?=E9?=");
        assert_eq!(text.word_count(), 2);
        assert_eq!(text.to_utf8_lossy(), "abé");
    }

    #[test]
    fn constructed_words_join_with_space() {
        let mut text = Text::new();
        text.push_word(Word::ascii("Hello"));
        text.push_word(Word::ascii("World"));
        assert_eq!(text.to_utf8_lossy(), "Hello World");
        assert_eq!(generate_to_string(&text).unwrap(), "Hello World");
    }

    #[test]
    fn whole_buffer_matches_unfold_without_encoded_words() {
        let raw = b"one two\r\n three";
        let text = parse(raw);
        assert_eq!(
            text.whole_buffer(&Charset::us_ascii()),
            unfold(raw)
        );
    }

    #[test]
    fn long_nonascii_subject_folds_into_multiple_encoded_words() {
        let text = Text::from_utf8(&"déjà vu ".repeat(12));
        let generated = generate_to_string(&text).unwrap();
        let reparsed = parse(generated.as_bytes());
        assert_eq!(reparsed.to_utf8_lossy(), "déjà vu ".repeat(12));
    }
}
