// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Maildir naming rules: unique message ids, the `:2,<flags>` suffix,
//! and the on-disk layout of folders (`.<name>.directory` containers
//! with `tmp/`, `new/`, `cur/` leaf directories).

use crate::modules::platform;
use crate::modules::store::types::{Flags, FolderPath};
use std::path::{Path, PathBuf};

pub const TMP_DIR: &str = "tmp";
pub const NEW_DIR: &str = "new";
pub const CUR_DIR: &str = "cur";

/// Which on-disk location of a folder is wanted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FolderDir {
    /// The folder's own directory (holding tmp/new/cur).
    Root,
    Tmp,
    New,
    Cur,
    /// The `.<name>.directory` container holding its sub-folders.
    Container,
}

/// Resolve a folder path to its filesystem location under the store
/// root. Parent components become `.<name>.directory` containers; the
/// leaf stays plain except in `Container` mode.
pub fn folder_fs_path(store_root: &Path, folder: &FolderPath, mode: FolderDir) -> PathBuf {
    let mut path = store_root.to_path_buf();
    let components = folder.components();

    let parent_count = match mode {
        FolderDir::Container => components.len(),
        _ => components.len().saturating_sub(1),
    };
    for component in &components[..parent_count] {
        path.push(format!(".{}.directory", component));
    }

    if mode != FolderDir::Container {
        if let Some(leaf) = components.last() {
            path.push(leaf);
        }
        match mode {
            FolderDir::Tmp => path.push(TMP_DIR),
            FolderDir::New => path.push(NEW_DIR),
            FolderDir::Cur => path.push(CUR_DIR),
            FolderDir::Root | FolderDir::Container => {}
        }
    }

    path
}

/// A directory whose name does not start with '.' is listed as a
/// sub-folder.
pub fn is_subfolder_directory(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !matches!(name, TMP_DIR | NEW_DIR | CUR_DIR)
}

/// The unique-id part of a maildir filename (everything before ':').
pub fn extract_id(filename: &str) -> &str {
    match filename.rfind(':') {
        Some(position) => &filename[..position],
        None => filename,
    }
}

/// Flags encoded in a maildir filename suffix.
pub fn extract_flags(filename: &str) -> Flags {
    let mut flags = Flags::empty();
    let Some(position) = filename.rfind(':') else {
        return flags;
    };
    for letter in filename[position + 1..].chars() {
        match letter.to_ascii_uppercase() {
            'F' => flags.insert(Flags::MARKED),
            'P' => flags.insert(Flags::PASSED),
            'R' => flags.insert(Flags::REPLIED),
            'S' => flags.insert(Flags::SEEN),
            'T' => flags.insert(Flags::DELETED),
            'D' => flags.insert(Flags::DRAFT),
            _ => {}
        }
    }
    flags
}

/// The ordered `2,<letters>` suffix for a flag set.
pub fn build_flags_suffix(flags: Flags) -> String {
    let mut suffix = String::with_capacity(8);
    suffix.push_str("2,");
    if flags.contains(Flags::DRAFT) {
        suffix.push('D');
    }
    if flags.contains(Flags::MARKED) {
        suffix.push('F');
    }
    if flags.contains(Flags::PASSED) {
        suffix.push('P');
    }
    if flags.contains(Flags::REPLIED) {
        suffix.push('R');
    }
    if flags.contains(Flags::SEEN) {
        suffix.push('S');
    }
    if flags.contains(Flags::DELETED) {
        suffix.push('T');
    }
    suffix
}

/// `<id>:<flags-suffix>`.
pub fn build_filename(id: &str, flags: Flags) -> String {
    format!("{}:{}", id, build_flags_suffix(flags))
}

/// A fresh unique id: `<unix-time>.<pid>.<6-random-chars>`.
pub fn generate_id() -> String {
    let handler = platform::handler();
    format!(
        "{}.{}.{}",
        handler.unix_time(),
        handler.process_id(),
        crate::modules::utils::random_string(6)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_paths_follow_container_convention() {
        let root = Path::new("/mail");
        let folder = FolderPath::from_str_path("archive/2024", '/');
        assert_eq!(
            folder_fs_path(root, &folder, FolderDir::Root),
            Path::new("/mail/.archive.directory/2024")
        );
        assert_eq!(
            folder_fs_path(root, &folder, FolderDir::Cur),
            Path::new("/mail/.archive.directory/2024/cur")
        );
        assert_eq!(
            folder_fs_path(root, &folder, FolderDir::Container),
            Path::new("/mail/.archive.directory/.2024.directory")
        );
        assert_eq!(
            folder_fs_path(root, &FolderPath::root(), FolderDir::New),
            Path::new("/mail/new")
        );
    }

    #[test]
    fn flags_round_trip_through_filenames() {
        let flags = Flags::SEEN | Flags::REPLIED | Flags::MARKED;
        let filename = build_filename("123.456.abcdef", flags);
        assert_eq!(filename, "123.456.abcdef:2,FRS");
        assert_eq!(extract_flags(&filename), flags);
        assert_eq!(extract_id(&filename), "123.456.abcdef");
    }

    #[test]
    fn missing_suffix_means_no_flags() {
        assert_eq!(extract_flags("12.34.abc"), Flags::empty());
        assert_eq!(extract_id("12.34.abc"), "12.34.abc");
    }

    #[test]
    fn generated_ids_are_distinct_and_shaped() {
        let first = generate_id();
        let second = generate_id();
        assert_ne!(first, second);
        let pieces: Vec<&str> = first.split('.').collect();
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[2].len(), 6);
    }

    #[test]
    fn subfolder_detection_skips_special_dirs() {
        assert!(is_subfolder_directory("projects"));
        assert!(!is_subfolder_directory(".archive.directory"));
        assert!(!is_subfolder_directory("cur"));
        assert!(!is_subfolder_directory("tmp"));
    }
}
