// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailForgeResult;
use crate::modules::mime::datetime::DateTime;
use crate::modules::store::message::StoredMessage;
use crate::modules::store::types::{
    FetchAttributes, Flags, FlagsOp, FolderPath, FolderStatus, FolderType, MessageSet, OpenMode,
};
use crate::modules::stream::ProgressListener;

/// A folder of messages. Each instance runs the state machine
/// `closed → open(mode) → closed`; operations that touch messages
/// require the folder to be open.
pub trait Folder: Send {
    fn path(&self) -> FolderPath;

    fn name(&self) -> String {
        self.path().name().to_string()
    }

    fn open(&mut self, mode: OpenMode) -> MailForgeResult<()>;

    /// Close the folder, expunging deleted messages when asked.
    fn close(&mut self, expunge: bool) -> MailForgeResult<()>;

    fn is_open(&self) -> bool;

    fn mode(&self) -> Option<OpenMode>;

    fn exists(&self) -> bool;

    fn create(&mut self, folder_type: FolderType) -> MailForgeResult<()>;

    fn destroy(&mut self) -> MailForgeResult<()>;

    fn rename(&mut self, new_path: &FolderPath) -> MailForgeResult<()>;

    fn message_count(&mut self) -> MailForgeResult<usize>;

    /// Message and unseen counts in one query.
    fn status(&mut self) -> MailForgeResult<FolderStatus>;

    fn get_messages(&mut self, set: &MessageSet) -> MailForgeResult<Vec<Box<dyn StoredMessage>>>;

    /// Enrich already-obtained messages with the requested attributes.
    fn fetch_messages(
        &mut self,
        messages: &mut [Box<dyn StoredMessage>],
        attributes: FetchAttributes,
        progress: Option<&mut dyn ProgressListener>,
    ) -> MailForgeResult<()> {
        let total = messages.len();
        let mut progress = progress;
        if let Some(listener) = progress.as_deref_mut() {
            listener.start(total);
        }
        for (index, message) in messages.iter_mut().enumerate() {
            message.fetch(attributes)?;
            if let Some(listener) = progress.as_deref_mut() {
                listener.progress(index + 1, total);
            }
        }
        if let Some(listener) = progress.as_deref_mut() {
            listener.stop(total);
        }
        Ok(())
    }

    /// Deliver a new message, returning the set of assigned ids.
    fn add_message(
        &mut self,
        message: &[u8],
        flags: Flags,
        date: Option<&DateTime>,
    ) -> MailForgeResult<MessageSet>;

    /// Copy messages to another folder of the same store, returning
    /// the ids assigned in the destination.
    fn copy_messages(
        &mut self,
        destination: &FolderPath,
        set: &MessageSet,
    ) -> MailForgeResult<MessageSet>;

    /// Mark messages deleted.
    fn delete_messages(&mut self, set: &MessageSet) -> MailForgeResult<()>;

    fn set_message_flags(
        &mut self,
        set: &MessageSet,
        flags: Flags,
        op: FlagsOp,
    ) -> MailForgeResult<()>;

    /// Permanently remove messages flagged deleted.
    fn expunge(&mut self) -> MailForgeResult<()>;

    /// Direct sub-folder paths.
    fn sub_folders(&mut self) -> MailForgeResult<Vec<FolderPath>>;
}

impl std::fmt::Debug for dyn Folder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Folder").field("path", &self.path()).finish()
    }
}
