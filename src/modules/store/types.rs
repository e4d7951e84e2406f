// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Value types shared by every store and transport implementation.

use crate::modules::mime::mediatype::MediaType;
use serde::{Deserialize, Serialize};

/// Message flag bitset.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct Flags(u32);

impl Flags {
    pub const SEEN: Flags = Flags(1 << 0);
    pub const RECENT: Flags = Flags(1 << 1);
    pub const REPLIED: Flags = Flags(1 << 2);
    pub const DELETED: Flags = Flags(1 << 3);
    pub const MARKED: Flags = Flags(1 << 4);
    pub const PASSED: Flags = Flags(1 << 5);
    pub const DRAFT: Flags = Flags(1 << 6);

    pub fn empty() -> Self {
        Flags(0)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }

    pub fn union(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, other: Flags) -> Flags {
        self.union(other)
    }
}

/// How `set_message_flags` combines the given flags with the current
/// ones.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum FlagsOp {
    Set,
    Add,
    Remove,
}

/// Which message fields a fetch populates.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct FetchAttributes(u32);

impl FetchAttributes {
    pub const FLAGS: FetchAttributes = FetchAttributes(1 << 0);
    pub const ENVELOPE: FetchAttributes = FetchAttributes(1 << 1);
    pub const CONTENT_INFO: FetchAttributes = FetchAttributes(1 << 2);
    pub const STRUCTURE: FetchAttributes = FetchAttributes(1 << 3);
    pub const FULL_HEADER: FetchAttributes = FetchAttributes(1 << 4);
    pub const SIZE: FetchAttributes = FetchAttributes(1 << 5);
    pub const UID: FetchAttributes = FetchAttributes(1 << 6);
    pub const IMPORTANCE: FetchAttributes = FetchAttributes(1 << 7);
    pub const CUSTOM_HEADERS: FetchAttributes = FetchAttributes(1 << 8);

    pub fn empty() -> Self {
        FetchAttributes(0)
    }

    pub fn all() -> Self {
        FetchAttributes(0x1ff)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: FetchAttributes) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: FetchAttributes) {
        self.0 |= other.0;
    }

    /// The attributes in `requested` not yet present here.
    pub fn missing_from(self, requested: FetchAttributes) -> FetchAttributes {
        FetchAttributes(requested.0 & !self.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for FetchAttributes {
    type Output = FetchAttributes;

    fn bitor(self, other: FetchAttributes) -> FetchAttributes {
        FetchAttributes(self.0 | other.0)
    }
}

/// One contiguous run of message numbers or UIDs. A range never mixes
/// the two kinds.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum MessageRange {
    /// 1-based sequence numbers, inclusive.
    Number { first: u32, last: u32 },
    /// Persistent UIDs, inclusive.
    Uid { first: u64, last: u64 },
}

/// An ordered set of ranges. A single query carries one kind.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct MessageSet {
    ranges: Vec<MessageRange>,
}

impl MessageSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn by_number(first: u32, last: u32) -> Self {
        Self {
            ranges: vec![MessageRange::Number { first, last }],
        }
    }

    pub fn single_number(number: u32) -> Self {
        Self::by_number(number, number)
    }

    pub fn by_uid(first: u64, last: u64) -> Self {
        Self {
            ranges: vec![MessageRange::Uid { first, last }],
        }
    }

    pub fn single_uid(uid: u64) -> Self {
        Self::by_uid(uid, uid)
    }

    pub fn push(&mut self, range: MessageRange) {
        self.ranges.push(range);
    }

    pub fn ranges(&self) -> &[MessageRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// All sequence numbers in the set, for number-kind sets.
    pub fn numbers(&self) -> Vec<u32> {
        let mut numbers = Vec::new();
        for range in &self.ranges {
            if let MessageRange::Number { first, last } = range {
                numbers.extend(*first..=*last);
            }
        }
        numbers
    }

    /// All UIDs in the set, for UID-kind sets.
    pub fn uids(&self) -> Vec<u64> {
        let mut uids = Vec::new();
        for range in &self.ranges {
            if let MessageRange::Uid { first, last } = range {
                uids.extend(*first..=*last);
            }
        }
        uids
    }

    pub fn contains_number(&self, number: u32) -> bool {
        self.ranges.iter().any(|range| match range {
            MessageRange::Number { first, last } => (*first..=*last).contains(&number),
            MessageRange::Uid { .. } => false,
        })
    }

    pub fn contains_uid(&self, uid: u64) -> bool {
        self.ranges.iter().any(|range| match range {
            MessageRange::Uid { first, last } => (*first..=*last).contains(&uid),
            MessageRange::Number { .. } => false,
        })
    }
}

/// A folder path: an ordered list of name components from the store
/// root.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct FolderPath {
    components: Vec<String>,
}

impl FolderPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_components(components: Vec<String>) -> Self {
        Self { components }
    }

    pub fn from_str_path(path: &str, separator: char) -> Self {
        Self {
            components: path
                .split(separator)
                .filter(|component| !component.is_empty())
                .map(|component| component.to_string())
                .collect(),
        }
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn name(&self) -> &str {
        self.components
            .last()
            .map(|component| component.as_str())
            .unwrap_or("")
    }

    pub fn child(&self, name: &str) -> Self {
        let mut components = self.components.clone();
        components.push(name.to_string());
        Self { components }
    }

    pub fn parent(&self) -> Self {
        let mut components = self.components.clone();
        components.pop();
        Self { components }
    }

    pub fn join(&self, separator: char) -> String {
        self.components.join(&separator.to_string())
    }
}

/// Open mode of a folder.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
    Default,
}

/// What a created folder can hold.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum FolderType {
    HoldsMessages,
    HoldsFolders,
    HoldsBoth,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct FolderStatus {
    pub message_count: usize,
    pub unseen_count: usize,
}

/// The part tree of a message without its content.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MessageStructure {
    pub media_type: MediaType,
    pub size: u64,
    pub parts: Vec<MessageStructure>,
}

impl MessageStructure {
    pub fn leaf(media_type: MediaType, size: u64) -> Self {
        Self {
            media_type,
            size,
            parts: Vec::new(),
        }
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }
}

/// Facts about an established connection.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct ConnectionInfos {
    pub host: String,
    pub port: u16,
    pub secured: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine_and_test() {
        let mut flags = Flags::SEEN | Flags::REPLIED;
        assert!(flags.contains(Flags::SEEN));
        assert!(!flags.contains(Flags::DELETED));
        flags.insert(Flags::DELETED);
        flags.remove(Flags::SEEN);
        assert!(flags.contains(Flags::DELETED));
        assert!(!flags.contains(Flags::SEEN));
    }

    #[test]
    fn fetch_attributes_track_missing() {
        let fetched = FetchAttributes::FLAGS | FetchAttributes::SIZE;
        let requested = FetchAttributes::FLAGS | FetchAttributes::FULL_HEADER;
        let missing = fetched.missing_from(requested);
        assert!(missing.contains(FetchAttributes::FULL_HEADER));
        assert!(!missing.contains(FetchAttributes::FLAGS));
    }

    #[test]
    fn message_set_enumerates_kinds_separately() {
        let mut set = MessageSet::by_number(1, 3);
        set.push(MessageRange::Uid { first: 100, last: 101 });
        assert_eq!(set.numbers(), [1, 2, 3]);
        assert_eq!(set.uids(), [100, 101]);
        assert!(set.contains_number(2));
        assert!(!set.contains_number(100));
        assert!(set.contains_uid(101));
    }

    #[test]
    fn value_types_serialize_for_embedders() {
        let mut set = MessageSet::by_number(1, 3);
        set.push(MessageRange::Uid { first: 9, last: 9 });
        let json = serde_json::to_string(&set).unwrap();
        let back: MessageSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);

        let flags = Flags::SEEN | Flags::DRAFT;
        let json = serde_json::to_string(&flags).unwrap();
        let back: Flags = serde_json::from_str(&json).unwrap();
        assert_eq!(back, flags);
    }

    #[test]
    fn folder_path_navigation() {
        let path = FolderPath::from_str_path("archive/2024/tax", '/');
        assert_eq!(path.components().len(), 3);
        assert_eq!(path.name(), "tax");
        assert_eq!(path.parent().name(), "2024");
        assert_eq!(path.child("q1").join('/'), "archive/2024/tax/q1");
        assert!(FolderPath::root().is_root());
    }
}
