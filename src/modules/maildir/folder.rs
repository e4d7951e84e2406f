// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::maildir::utils::{self, FolderDir};
use crate::modules::maildir::MaildirContext;
use crate::modules::mime::datetime::DateTime;
use crate::modules::mime::header::Header;
use crate::modules::mime::part::{BodyPart, Message};
use crate::modules::mime::{Component, ParsingContext};
use crate::modules::store::message::{
    report_extracted, structure_of, write_region, StoredMessage,
};
use crate::modules::store::types::{
    FetchAttributes, Flags, FlagsOp, FolderPath, FolderStatus, FolderType, MessageSet,
    MessageStructure, OpenMode,
};
use crate::modules::store::Folder;
use crate::modules::stream::{OutputStream, ProgressListener};
use crate::{raise_error, unfetched};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug)]
pub(crate) struct Entry {
    pub filename: String,
    pub in_new: bool,
}

pub struct MaildirFolder {
    context: Arc<MaildirContext>,
    path: FolderPath,
    mode: Option<OpenMode>,
    entries: Vec<Entry>,
}

impl MaildirFolder {
    pub(crate) fn new(context: Arc<MaildirContext>, path: FolderPath) -> Self {
        Self {
            context,
            path,
            mode: None,
            entries: Vec::new(),
        }
    }

    fn dir(&self, which: FolderDir) -> PathBuf {
        utils::folder_fs_path(&self.context.root, &self.path, which)
    }

    fn scan_entries(&self) -> MailForgeResult<Vec<Entry>> {
        let mut entries = Vec::new();
        for (dir, in_new) in [(FolderDir::New, true), (FolderDir::Cur, false)] {
            let dir_path = self.dir(dir);
            if !self.context.fs.exists(&dir_path) {
                continue;
            }
            for file in self.context.fs.read_dir(&dir_path)? {
                if self.context.fs.is_dir(&file) {
                    continue;
                }
                if let Some(name) = file.file_name().and_then(|name| name.to_str()) {
                    entries.push(Entry {
                        filename: name.to_string(),
                        in_new,
                    });
                }
            }
        }
        entries.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(entries)
    }

    fn require_open(&self) -> MailForgeResult<()> {
        if self.mode.is_none() {
            return Err(raise_error!(
                format!("folder '{}' is not open", self.path.join('/')),
                ErrorCode::IllegalState
            ));
        }
        Ok(())
    }

    fn require_writable(&self) -> MailForgeResult<()> {
        self.require_open()?;
        if self.mode == Some(OpenMode::ReadOnly) {
            return Err(raise_error!(
                format!("folder '{}' is open read-only", self.path.join('/')),
                ErrorCode::IllegalOperation
            ));
        }
        Ok(())
    }

    fn entry_at(&self, number: u32) -> MailForgeResult<&Entry> {
        if number == 0 || number as usize > self.entries.len() {
            return Err(raise_error!(
                format!(
                    "no message {} in folder '{}' ({} messages)",
                    number,
                    self.path.join('/'),
                    self.entries.len()
                ),
                ErrorCode::MessageNotFound
            ));
        }
        Ok(&self.entries[number as usize - 1])
    }

    fn entry_file(&self, entry: &Entry) -> PathBuf {
        let dir = if entry.in_new {
            self.dir(FolderDir::New)
        } else {
            self.dir(FolderDir::Cur)
        };
        dir.join(&entry.filename)
    }

    /// Deliver raw message bytes through `tmp/` into `new/` or `cur/`.
    fn deliver(&self, message: &[u8], flags: Flags) -> MailForgeResult<Entry> {
        let id = utils::generate_id();
        let tmp_path = self.dir(FolderDir::Tmp).join(&id);
        self.context.fs.write(&tmp_path, message)?;

        let (final_dir, filename, in_new) = if flags.is_empty() {
            (self.dir(FolderDir::New), id.clone(), true)
        } else {
            (
                self.dir(FolderDir::Cur),
                utils::build_filename(&id, flags),
                false,
            )
        };
        let final_path = final_dir.join(&filename);
        self.context.fs.rename(&tmp_path, &final_path)?;
        Ok(Entry { filename, in_new })
    }
}

impl Folder for MaildirFolder {
    fn path(&self) -> FolderPath {
        self.path.clone()
    }

    fn open(&mut self, mode: OpenMode) -> MailForgeResult<()> {
        if self.mode.is_some() {
            return Err(raise_error!(
                format!("folder '{}' is already open", self.path.join('/')),
                ErrorCode::FolderAlreadyOpen
            ));
        }
        if !self.exists() {
            return Err(raise_error!(
                format!("folder '{}' does not exist", self.path.join('/')),
                ErrorCode::FolderNotFound
            ));
        }
        self.context.register_open(&self.path)?;
        self.entries = match self.scan_entries() {
            Ok(entries) => entries,
            Err(error) => {
                self.context.unregister_open(&self.path);
                return Err(error);
            }
        };
        self.mode = Some(match mode {
            OpenMode::Default => OpenMode::ReadWrite,
            other => other,
        });
        debug!(
            "opened maildir folder '{}' with {} messages",
            self.path.join('/'),
            self.entries.len()
        );
        Ok(())
    }

    fn close(&mut self, expunge: bool) -> MailForgeResult<()> {
        self.require_open()?;
        if expunge && self.mode != Some(OpenMode::ReadOnly) {
            self.expunge()?;
        }
        self.context.unregister_open(&self.path);
        self.mode = None;
        self.entries.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.mode.is_some()
    }

    fn mode(&self) -> Option<OpenMode> {
        self.mode
    }

    fn exists(&self) -> bool {
        self.context.fs.is_dir(&self.dir(FolderDir::Cur))
    }

    fn create(&mut self, folder_type: FolderType) -> MailForgeResult<()> {
        if self.exists() {
            return Err(raise_error!(
                format!("folder '{}' already exists", self.path.join('/')),
                ErrorCode::IllegalOperation
            ));
        }
        if folder_type != FolderType::HoldsFolders {
            for dir in [FolderDir::Tmp, FolderDir::New, FolderDir::Cur] {
                self.context.fs.create_dir_all(&self.dir(dir))?;
            }
        }
        if folder_type != FolderType::HoldsMessages {
            self.context
                .fs
                .create_dir_all(&self.dir(FolderDir::Container))?;
        }
        Ok(())
    }

    fn destroy(&mut self) -> MailForgeResult<()> {
        if self.is_open() {
            return Err(raise_error!(
                "cannot destroy an open folder".into(),
                ErrorCode::IllegalState
            ));
        }
        if self.path.is_root() {
            return Err(raise_error!(
                "cannot destroy the root folder".into(),
                ErrorCode::IllegalOperation
            ));
        }
        let root = self.dir(FolderDir::Root);
        if self.context.fs.exists(&root) {
            self.context.fs.remove_dir_all(&root)?;
        }
        let container = self.dir(FolderDir::Container);
        if self.context.fs.exists(&container) {
            self.context.fs.remove_dir_all(&container)?;
        }
        Ok(())
    }

    fn rename(&mut self, new_path: &FolderPath) -> MailForgeResult<()> {
        if self.is_open() {
            return Err(raise_error!(
                "cannot rename an open folder".into(),
                ErrorCode::IllegalState
            ));
        }
        if self.path.is_root() || new_path.is_root() {
            return Err(raise_error!(
                "cannot rename the root folder".into(),
                ErrorCode::IllegalOperation
            ));
        }
        let new_root = utils::folder_fs_path(&self.context.root, new_path, FolderDir::Root);
        self.context.fs.rename(&self.dir(FolderDir::Root), &new_root)?;

        let old_container = self.dir(FolderDir::Container);
        if self.context.fs.exists(&old_container) {
            let new_container =
                utils::folder_fs_path(&self.context.root, new_path, FolderDir::Container);
            self.context.fs.rename(&old_container, &new_container)?;
        }
        self.path = new_path.clone();
        Ok(())
    }

    fn message_count(&mut self) -> MailForgeResult<usize> {
        if self.is_open() {
            Ok(self.entries.len())
        } else {
            Ok(self.scan_entries()?.len())
        }
    }

    fn status(&mut self) -> MailForgeResult<FolderStatus> {
        let entries = if self.is_open() {
            self.entries.clone()
        } else {
            self.scan_entries()?
        };
        let unseen = entries
            .iter()
            .filter(|entry| entry.in_new || !utils::extract_flags(&entry.filename).contains(Flags::SEEN))
            .count();
        Ok(FolderStatus {
            message_count: entries.len(),
            unseen_count: unseen,
        })
    }

    fn get_messages(&mut self, set: &MessageSet) -> MailForgeResult<Vec<Box<dyn StoredMessage>>> {
        self.require_open()?;
        let mut messages: Vec<Box<dyn StoredMessage>> = Vec::new();
        for number in set.numbers() {
            let entry = self.entry_at(number)?.clone();
            messages.push(Box::new(MaildirMessage::new(
                self.context.clone(),
                self.path.clone(),
                entry,
                number,
            )));
        }
        Ok(messages)
    }

    fn add_message(
        &mut self,
        message: &[u8],
        flags: Flags,
        _date: Option<&DateTime>,
    ) -> MailForgeResult<MessageSet> {
        self.require_writable()?;
        let entry = self.deliver(message, flags)?;
        self.entries.push(entry);
        Ok(MessageSet::single_number(self.entries.len() as u32))
    }

    fn copy_messages(
        &mut self,
        destination: &FolderPath,
        set: &MessageSet,
    ) -> MailForgeResult<MessageSet> {
        self.require_open()?;
        let destination_folder = MaildirFolder::new(self.context.clone(), destination.clone());
        if !destination_folder.exists() {
            return Err(raise_error!(
                format!("destination folder '{}' does not exist", destination.join('/')),
                ErrorCode::FolderNotFound
            ));
        }

        let base = destination_folder.scan_entries()?.len() as u32;
        let mut copied = 0u32;
        for number in set.numbers() {
            let entry = self.entry_at(number)?.clone();
            let data = self.context.fs.read(&self.entry_file(&entry))?;
            destination_folder.deliver(&data, utils::extract_flags(&entry.filename))?;
            copied += 1;
        }
        if copied == 0 {
            return Ok(MessageSet::empty());
        }
        Ok(MessageSet::by_number(base + 1, base + copied))
    }

    fn delete_messages(&mut self, set: &MessageSet) -> MailForgeResult<()> {
        self.set_message_flags(set, Flags::DELETED, FlagsOp::Add)
    }

    fn set_message_flags(
        &mut self,
        set: &MessageSet,
        flags: Flags,
        op: FlagsOp,
    ) -> MailForgeResult<()> {
        self.require_writable()?;
        for number in set.numbers() {
            let entry = self.entry_at(number)?.clone();
            let current = utils::extract_flags(&entry.filename);
            let mut updated = match op {
                FlagsOp::Set => flags,
                FlagsOp::Add => current.union(flags),
                FlagsOp::Remove => {
                    let mut next = current;
                    next.remove(flags);
                    next
                }
            };
            // the Recent pseudo-flag is not persisted in filenames
            updated.remove(Flags::RECENT);

            let id = utils::extract_id(&entry.filename).to_string();
            let new_filename = utils::build_filename(&id, updated);
            let new_entry = Entry {
                filename: new_filename.clone(),
                in_new: false,
            };
            let from = self.entry_file(&entry);
            let to = self.dir(FolderDir::Cur).join(&new_filename);
            if from != to {
                self.context.fs.rename(&from, &to)?;
            }
            self.entries[number as usize - 1] = new_entry;
        }
        Ok(())
    }

    fn expunge(&mut self) -> MailForgeResult<()> {
        self.require_writable()?;
        let mut kept = Vec::with_capacity(self.entries.len());
        for entry in std::mem::take(&mut self.entries) {
            if utils::extract_flags(&entry.filename).contains(Flags::DELETED) {
                self.context.fs.remove_file(&self.entry_file(&entry))?;
            } else {
                kept.push(entry);
            }
        }
        self.entries = kept;
        Ok(())
    }

    fn sub_folders(&mut self) -> MailForgeResult<Vec<FolderPath>> {
        let container = if self.path.is_root() {
            self.context.root.clone()
        } else {
            self.dir(FolderDir::Container)
        };
        if !self.context.fs.exists(&container) {
            return Ok(Vec::new());
        }
        let mut folders = Vec::new();
        for path in self.context.fs.read_dir(&container)? {
            if !self.context.fs.is_dir(&path) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                if utils::is_subfolder_directory(name) {
                    folders.push(self.path.child(name));
                }
            }
        }
        Ok(folders)
    }
}

/// A message backed by one maildir file.
pub struct MaildirMessage {
    context: Arc<MaildirContext>,
    folder_path: FolderPath,
    entry: Entry,
    number: u32,
    fetched: FetchAttributes,
    size: Option<u64>,
    flags: Option<Flags>,
    header: Option<Header>,
    structure: Option<MessageStructure>,
}

impl MaildirMessage {
    pub(crate) fn new(
        context: Arc<MaildirContext>,
        folder_path: FolderPath,
        entry: Entry,
        number: u32,
    ) -> Self {
        Self {
            context,
            folder_path,
            entry,
            number,
            fetched: FetchAttributes::empty(),
            size: None,
            flags: None,
            header: None,
            structure: None,
        }
    }

    fn file_path(&self) -> PathBuf {
        let which = if self.entry.in_new {
            FolderDir::New
        } else {
            FolderDir::Cur
        };
        utils::folder_fs_path(&self.context.root, &self.folder_path, which)
            .join(&self.entry.filename)
    }

    fn read_bytes(&self) -> MailForgeResult<Vec<u8>> {
        self.context.fs.read(&self.file_path())
    }

    fn parse_full(&self) -> MailForgeResult<Message> {
        Message::parse_message(&ParsingContext::default(), self.read_bytes()?)
    }
}

impl StoredMessage for MaildirMessage {
    fn number(&self) -> u32 {
        self.number
    }

    fn uid(&self) -> Option<u64> {
        // maildir assigns no numeric uids
        None
    }

    fn fetched_attributes(&self) -> FetchAttributes {
        self.fetched
    }

    fn fetch(&mut self, attributes: FetchAttributes) -> MailForgeResult<()> {
        let missing = self.fetched.missing_from(attributes);
        if missing.is_empty() {
            return Ok(());
        }

        if missing.contains(FetchAttributes::SIZE) && self.size.is_none() {
            self.size = Some(self.context.fs.file_size(&self.file_path())?);
        }
        if missing.contains(FetchAttributes::FLAGS) && self.flags.is_none() {
            let mut flags = utils::extract_flags(&self.entry.filename);
            if self.entry.in_new {
                flags.insert(Flags::RECENT);
            }
            self.flags = Some(flags);
        }

        let wants_header = missing.contains(FetchAttributes::FULL_HEADER)
            || missing.contains(FetchAttributes::ENVELOPE)
            || missing.contains(FetchAttributes::CUSTOM_HEADERS)
            || missing.contains(FetchAttributes::IMPORTANCE);
        if wants_header && self.header.is_none() {
            let bytes = self.read_bytes()?;
            let mut header = Header::new();
            let length = bytes.len();
            header.parse(&ParsingContext::default(), &bytes, 0, length)?;
            self.header = Some(header);
        }

        let wants_structure = missing.contains(FetchAttributes::STRUCTURE)
            || missing.contains(FetchAttributes::CONTENT_INFO);
        if wants_structure && self.structure.is_none() {
            let message = self.parse_full()?;
            self.structure = Some(structure_of(&message));
        }

        self.fetched.insert(attributes);
        Ok(())
    }

    fn size(&self) -> MailForgeResult<u64> {
        self.size.ok_or_else(|| unfetched!("size"))
    }

    fn flags(&self) -> MailForgeResult<Flags> {
        self.flags.ok_or_else(|| unfetched!("flags"))
    }

    fn header(&self) -> MailForgeResult<&Header> {
        self.header.as_ref().ok_or_else(|| unfetched!("header"))
    }

    fn structure(&self) -> MailForgeResult<&MessageStructure> {
        self.structure
            .as_ref()
            .ok_or_else(|| unfetched!("structure"))
    }

    fn extract(
        &mut self,
        out: &mut dyn OutputStream,
        progress: Option<&mut dyn ProgressListener>,
    ) -> MailForgeResult<()> {
        let data = self.read_bytes()?;
        out.write(&data)?;
        report_extracted(progress, data.len());
        Ok(())
    }

    fn extract_part(
        &mut self,
        part_path: &[usize],
        out: &mut dyn OutputStream,
        progress: Option<&mut dyn ProgressListener>,
        start: Option<u64>,
        length: Option<u64>,
    ) -> MailForgeResult<()> {
        let message = self.parse_full()?;
        let mut part: &BodyPart = &message;
        for &index in part_path {
            part = part.body().part_at(index).ok_or_else(|| {
                raise_error!(
                    format!("message has no part at index {}", index),
                    ErrorCode::NoSuchPart
                )
            })?;
        }
        let data = crate::modules::content::extract_to_vec(part.body().contents().as_ref())?;
        write_region(&data, out, start, length)?;
        report_extracted(progress, data.len());
        Ok(())
    }
}
