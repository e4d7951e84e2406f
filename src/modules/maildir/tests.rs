// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::maildir::MaildirStore;
use crate::modules::session::Session;
use crate::modules::store::{
    FetchAttributes, Flags, FlagsOp, Folder, FolderPath, FolderType, MessageSet, OpenMode,
    Service, Store, StoredMessage,
};
use crate::modules::stream::VecOutputStream;

const SAMPLE: &[u8] =
    b"Subject: test message\r\nFrom: a@example.org\r\nContent-Type: text/plain\r\n\r\nbody text";

fn open_store() -> (tempfile::TempDir, MaildirStore) {
    let dir = tempfile::tempdir().unwrap();
    let mut store = MaildirStore::with_root(Session::new(), dir.path().to_path_buf()).unwrap();
    store.connect().unwrap();
    (dir, store)
}

#[test]
fn deliver_and_list_messages() {
    let (_dir, mut store) = open_store();
    let mut inbox = store.default_folder().unwrap();
    inbox.open(OpenMode::ReadWrite).unwrap();

    let assigned = inbox.add_message(SAMPLE, Flags::empty(), None).unwrap();
    assert_eq!(assigned.numbers(), [1]);
    inbox.add_message(SAMPLE, Flags::SEEN, None).unwrap();

    assert_eq!(inbox.message_count().unwrap(), 2);
    let status = inbox.status().unwrap();
    assert_eq!(status.message_count, 2);
    assert_eq!(status.unseen_count, 1);
}

#[test]
fn fetch_populates_lazy_attributes() {
    let (_dir, mut store) = open_store();
    let mut inbox = store.default_folder().unwrap();
    inbox.open(OpenMode::ReadWrite).unwrap();
    inbox.add_message(SAMPLE, Flags::SEEN, None).unwrap();

    let mut messages = inbox.get_messages(&MessageSet::single_number(1)).unwrap();
    let message = &mut messages[0];

    // lazy contract: unfetched attributes are errors, not defaults
    assert_eq!(message.size().unwrap_err().code(), ErrorCode::UnfetchedObject);
    assert_eq!(
        message.header().unwrap_err().code(),
        ErrorCode::UnfetchedObject
    );

    message
        .fetch(FetchAttributes::SIZE | FetchAttributes::FLAGS | FetchAttributes::FULL_HEADER)
        .unwrap();
    assert_eq!(message.size().unwrap(), SAMPLE.len() as u64);
    assert!(message.flags().unwrap().contains(Flags::SEEN));
    assert_eq!(
        message
            .header()
            .unwrap()
            .field("Subject")
            .unwrap()
            .value()
            .unwrap()
            .as_text()
            .unwrap()
            .to_utf8_lossy(),
        "test message"
    );

    // refetching is a no-op, not an error
    message.fetch(FetchAttributes::SIZE).unwrap();
    assert_eq!(message.size().unwrap(), SAMPLE.len() as u64);
}

#[test]
fn extract_returns_raw_bytes() {
    let (_dir, mut store) = open_store();
    let mut inbox = store.default_folder().unwrap();
    inbox.open(OpenMode::ReadWrite).unwrap();
    inbox.add_message(SAMPLE, Flags::empty(), None).unwrap();

    let mut messages = inbox.get_messages(&MessageSet::single_number(1)).unwrap();
    let mut out = VecOutputStream::new();
    messages[0].extract(&mut out, None).unwrap();
    assert_eq!(out.as_bytes(), SAMPLE);
}

#[test]
fn flags_and_expunge_cycle() {
    let (_dir, mut store) = open_store();
    let mut inbox = store.default_folder().unwrap();
    inbox.open(OpenMode::ReadWrite).unwrap();
    inbox.add_message(SAMPLE, Flags::empty(), None).unwrap();
    inbox.add_message(SAMPLE, Flags::empty(), None).unwrap();

    inbox
        .set_message_flags(&MessageSet::single_number(1), Flags::SEEN, FlagsOp::Add)
        .unwrap();
    inbox
        .delete_messages(&MessageSet::single_number(2))
        .unwrap();
    inbox.expunge().unwrap();
    assert_eq!(inbox.message_count().unwrap(), 1);

    let mut messages = inbox.get_messages(&MessageSet::single_number(1)).unwrap();
    messages[0].fetch(FetchAttributes::FLAGS).unwrap();
    assert!(messages[0].flags().unwrap().contains(Flags::SEEN));
}

#[test]
fn close_with_expunge_removes_deleted() {
    let (_dir, mut store) = open_store();
    let mut inbox = store.default_folder().unwrap();
    inbox.open(OpenMode::ReadWrite).unwrap();
    inbox.add_message(SAMPLE, Flags::empty(), None).unwrap();
    inbox
        .delete_messages(&MessageSet::single_number(1))
        .unwrap();
    inbox.close(true).unwrap();

    inbox.open(OpenMode::ReadOnly).unwrap();
    assert_eq!(inbox.message_count().unwrap(), 0);
}

#[test]
fn second_open_of_same_path_fails() {
    let (_dir, mut store) = open_store();
    let mut first = store.default_folder().unwrap();
    first.open(OpenMode::ReadWrite).unwrap();

    let mut second = store.default_folder().unwrap();
    assert_eq!(
        second.open(OpenMode::ReadWrite).unwrap_err().code(),
        ErrorCode::FolderAlreadyOpen
    );

    first.close(false).unwrap();
    second.open(OpenMode::ReadWrite).unwrap();
}

#[test]
fn subfolder_lifecycle() {
    let (dir, mut store) = open_store();
    let path = FolderPath::from_str_path("projects", '/');
    let mut folder = store.folder(&path).unwrap();
    assert!(!folder.exists());
    folder.create(FolderType::HoldsBoth).unwrap();
    assert!(folder.exists());
    assert!(dir.path().join("projects/cur").is_dir());
    assert!(dir.path().join(".projects.directory").is_dir());

    let mut root = store.root_folder().unwrap();
    let children = root.sub_folders().unwrap();
    assert_eq!(children, vec![path.clone()]);

    let renamed = FolderPath::from_str_path("archive", '/');
    folder.rename(&renamed).unwrap();
    assert!(dir.path().join("archive/cur").is_dir());
    assert!(!dir.path().join("projects").exists());

    folder.destroy().unwrap();
    assert!(!folder.exists());
}

#[test]
fn copy_messages_into_sibling_folder() {
    let (_dir, mut store) = open_store();
    let mut inbox = store.default_folder().unwrap();
    inbox.open(OpenMode::ReadWrite).unwrap();
    inbox.add_message(SAMPLE, Flags::SEEN, None).unwrap();

    let archive_path = FolderPath::from_str_path("archive", '/');
    let mut archive = store.folder(&archive_path).unwrap();
    archive.create(FolderType::HoldsMessages).unwrap();

    let assigned = inbox
        .copy_messages(&archive_path, &MessageSet::single_number(1))
        .unwrap();
    assert_eq!(assigned.numbers(), [1]);

    archive.open(OpenMode::ReadOnly).unwrap();
    assert_eq!(archive.message_count().unwrap(), 1);
    let mut copies = archive.get_messages(&MessageSet::single_number(1)).unwrap();
    copies[0].fetch(FetchAttributes::FLAGS).unwrap();
    assert!(copies[0].flags().unwrap().contains(Flags::SEEN));
}

#[test]
fn structure_fetch_exposes_part_tree() {
    let multipart = b"Content-Type: multipart/mixed; boundary=zz\r\n\r\n--zz\r\nContent-Type: text/plain\r\n\r\nhello\r\n--zz\r\nContent-Type: application/pdf\r\n\r\n%PDF\r\n--zz--\r\n";
    let (_dir, mut store) = open_store();
    let mut inbox = store.default_folder().unwrap();
    inbox.open(OpenMode::ReadWrite).unwrap();
    inbox.add_message(multipart, Flags::empty(), None).unwrap();

    let mut messages = inbox.get_messages(&MessageSet::single_number(1)).unwrap();
    messages[0].fetch(FetchAttributes::STRUCTURE).unwrap();
    let structure = messages[0].structure().unwrap();
    assert_eq!(structure.part_count(), 2);
    assert_eq!(structure.parts[1].media_type.full(), "application/pdf");

    let mut out = VecOutputStream::new();
    messages[0]
        .extract_part(&[0], &mut out, None, None, None)
        .unwrap();
    assert_eq!(out.as_bytes(), b"hello");
}

#[test]
fn readonly_folder_rejects_mutation() {
    let (_dir, mut store) = open_store();
    {
        let mut inbox = store.default_folder().unwrap();
        inbox.open(OpenMode::ReadWrite).unwrap();
        inbox.add_message(SAMPLE, Flags::empty(), None).unwrap();
        inbox.close(false).unwrap();
    }
    let mut inbox = store.default_folder().unwrap();
    inbox.open(OpenMode::ReadOnly).unwrap();
    assert_eq!(
        inbox
            .add_message(SAMPLE, Flags::empty(), None)
            .unwrap_err()
            .code(),
        ErrorCode::IllegalOperation
    );
    assert_eq!(
        inbox
            .set_message_flags(&MessageSet::single_number(1), Flags::SEEN, FlagsOp::Add)
            .unwrap_err()
            .code(),
        ErrorCode::IllegalOperation
    );
}
