// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailForgeResult;
use crate::modules::mime::header::Header;
use crate::modules::store::types::{FetchAttributes, Flags, MessageStructure};
use crate::modules::stream::{OutputStream, ProgressListener};

/// Raise the error a lazy accessor produces before its attribute has
/// been fetched.
#[macro_export]
macro_rules! unfetched {
    ($attribute:literal) => {
        $crate::raise_error!(
            concat!("attribute '", $attribute, "' has not been fetched").into(),
            $crate::modules::error::code::ErrorCode::UnfetchedObject
        )
    };
}

/// A message inside an open folder. Attribute accessors are lazy:
/// reading an attribute that has not been fetched yet fails with
/// `UnfetchedObject`; `fetch` populates attributes and never overwrites
/// ones already present.
pub trait StoredMessage: Send {
    /// 1-based sequence number within the folder.
    fn number(&self) -> u32;

    /// Persistent identifier, when the protocol assigns one.
    fn uid(&self) -> Option<u64>;

    /// Attributes populated so far.
    fn fetched_attributes(&self) -> FetchAttributes;

    /// Populate the requested attributes. Already-fetched attributes
    /// are left untouched.
    fn fetch(&mut self, attributes: FetchAttributes) -> MailForgeResult<()>;

    fn size(&self) -> MailForgeResult<u64>;

    fn flags(&self) -> MailForgeResult<Flags>;

    fn header(&self) -> MailForgeResult<&Header>;

    fn structure(&self) -> MailForgeResult<&MessageStructure>;

    /// Stream the whole raw message.
    fn extract(
        &mut self,
        out: &mut dyn OutputStream,
        progress: Option<&mut dyn ProgressListener>,
    ) -> MailForgeResult<()>;

    /// Stream one part of the message, optionally a sub-region of it.
    /// `part_path` indexes into the structure tree; empty means the
    /// whole body.
    fn extract_part(
        &mut self,
        part_path: &[usize],
        out: &mut dyn OutputStream,
        progress: Option<&mut dyn ProgressListener>,
        start: Option<u64>,
        length: Option<u64>,
    ) -> MailForgeResult<()>;
}

/// Build the content-less part tree of a parsed message.
pub fn structure_of(part: &crate::modules::mime::part::BodyPart) -> MessageStructure {
    let children: Vec<MessageStructure> =
        part.body().parts().iter().map(structure_of).collect();
    let size = if children.is_empty() {
        part.body().contents().length()
    } else {
        children.iter().map(|child| child.size).sum()
    };
    MessageStructure {
        media_type: part.body().content_type().clone(),
        size,
        parts: children,
    }
}

/// Bounded copy helper shared by store implementations: applies the
/// optional `start`/`length` window to already-extracted bytes.
pub fn write_region(
    data: &[u8],
    out: &mut dyn OutputStream,
    start: Option<u64>,
    length: Option<u64>,
) -> MailForgeResult<()> {
    let begin = (start.unwrap_or(0) as usize).min(data.len());
    let end = match length {
        Some(length) => (begin + length as usize).min(data.len()),
        None => data.len(),
    };
    out.write(&data[begin..end])
}

/// Report progress over a fully-buffered extraction.
pub fn report_extracted(progress: Option<&mut dyn ProgressListener>, total: usize) {
    if let Some(listener) = progress {
        listener.start(total);
        listener.progress(total, total);
        listener.stop(total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::stream::VecOutputStream;

    #[test]
    fn region_window_clamps() {
        let mut out = VecOutputStream::new();
        write_region(b"0123456789", &mut out, Some(2), Some(3)).unwrap();
        assert_eq!(out.as_bytes(), b"234");

        let mut tail = VecOutputStream::new();
        write_region(b"0123456789", &mut tail, Some(8), Some(100)).unwrap();
        assert_eq!(tail.as_bytes(), b"89");

        let mut all = VecOutputStream::new();
        write_region(b"0123456789", &mut all, None, None).unwrap();
        assert_eq!(all.as_bytes(), b"0123456789");
    }
}
