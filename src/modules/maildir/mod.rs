// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! The maildir store: a filesystem mailbox with `tmp/`, `new/`, `cur/`
//! delivery directories and `.<name>.directory` sub-folder containers.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::platform::{self, FileSystemFactory};
use crate::modules::session::Session;
use crate::modules::store::{
    ConnectionInfos, Folder, FolderPath, Service, ServiceCore, ServiceState, Store,
};
use crate::raise_error;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub mod folder;
pub mod utils;

#[cfg(test)]
mod tests;

/// Session property naming the mailbox root directory.
pub const PROPERTY_PATH: &str = "maildir.server.path";

/// State shared between a maildir store and the folders it hands out.
pub(crate) struct MaildirContext {
    pub root: PathBuf,
    pub fs: Arc<dyn FileSystemFactory>,
    /// Folder paths currently open in this store; a second open of the
    /// same path fails with `FolderAlreadyOpen`.
    pub open_folders: Mutex<HashSet<String>>,
}

impl MaildirContext {
    pub fn register_open(&self, path: &FolderPath) -> MailForgeResult<()> {
        let key = path.join('/');
        let mut open = self.open_folders.lock().expect("open-folder registry poisoned");
        if !open.insert(key.clone()) {
            return Err(raise_error!(
                format!("folder '{}' is already open", key),
                ErrorCode::FolderAlreadyOpen
            ));
        }
        Ok(())
    }

    pub fn unregister_open(&self, path: &FolderPath) {
        let key = path.join('/');
        self.open_folders
            .lock()
            .expect("open-folder registry poisoned")
            .remove(&key);
    }
}

pub struct MaildirStore {
    core: ServiceCore,
    context: Arc<MaildirContext>,
}

impl MaildirStore {
    /// Create a store over the root named by the session's
    /// `maildir.server.path` property.
    pub fn new(session: Session) -> MailForgeResult<Self> {
        let root = PathBuf::from(session.expect_property(PROPERTY_PATH)?);
        Self::with_root(session, root)
    }

    pub fn with_root(session: Session, root: PathBuf) -> MailForgeResult<Self> {
        let core = ServiceCore::new(session, "maildir", None)?;
        let fs = platform::handler().filesystem();
        Ok(Self {
            core,
            context: Arc::new(MaildirContext {
                root,
                fs,
                open_folders: Mutex::new(HashSet::new()),
            }),
        })
    }

    pub fn root_path(&self) -> &PathBuf {
        &self.context.root
    }
}

impl Service for MaildirStore {
    fn session(&self) -> &Session {
        self.core.session()
    }

    fn state(&self) -> ServiceState {
        self.core.state()
    }

    fn connect(&mut self) -> MailForgeResult<()> {
        if self.core.state() == ServiceState::Connected {
            return Err(raise_error!(
                "store is already connected".into(),
                ErrorCode::AlreadyConnected
            ));
        }
        let fs = &self.context.fs;
        if self.context.fs.exists(&self.context.root) && !fs.is_dir(&self.context.root) {
            return Err(raise_error!(
                format!("'{}' is not a directory", self.context.root.display()),
                ErrorCode::NotADirectory
            ));
        }
        for leaf in [utils::TMP_DIR, utils::NEW_DIR, utils::CUR_DIR] {
            fs.create_dir_all(&self.context.root.join(leaf))?;
        }
        debug!("maildir store opened at {}", self.context.root.display());
        self.core.set_state(ServiceState::Connected);
        Ok(())
    }

    fn disconnect(&mut self) -> MailForgeResult<()> {
        if self.core.state() != ServiceState::Connected {
            return Err(raise_error!(
                "store is not connected".into(),
                ErrorCode::NotConnected
            ));
        }
        self.core.set_state(ServiceState::Disconnected);
        Ok(())
    }

    fn is_secured_connection(&self) -> bool {
        // local filesystem access, no transport to secure
        false
    }

    fn connection_infos(&self) -> ConnectionInfos {
        ConnectionInfos {
            host: self.context.root.display().to_string(),
            port: 0,
            secured: false,
        }
    }
}

impl Store for MaildirStore {
    fn default_folder(&mut self) -> MailForgeResult<Box<dyn Folder>> {
        self.folder(&FolderPath::root())
    }

    fn root_folder(&mut self) -> MailForgeResult<Box<dyn Folder>> {
        self.folder(&FolderPath::root())
    }

    fn folder(&mut self, path: &FolderPath) -> MailForgeResult<Box<dyn Folder>> {
        if self.core.state() != ServiceState::Connected {
            return Err(raise_error!(
                "store is not connected".into(),
                ErrorCode::NotConnected
            ));
        }
        if path
            .components()
            .iter()
            .any(|component| component.starts_with('.') || component.contains('/'))
        {
            return Err(raise_error!(
                format!("invalid folder name: '{}'", path.join('/')),
                ErrorCode::InvalidFolderName
            ));
        }
        Ok(Box::new(folder::MaildirFolder::new(
            self.context.clone(),
            path.clone(),
        )))
    }
}

#[cfg(test)]
mod tests_inline {
    use super::*;

    fn store() -> (tempfile::TempDir, MaildirStore) {
        let dir = tempfile::tempdir().unwrap();
        let mut store =
            MaildirStore::with_root(Session::new(), dir.path().to_path_buf()).unwrap();
        store.connect().unwrap();
        (dir, store)
    }

    #[test]
    fn connect_creates_layout() {
        let (dir, store) = store();
        for leaf in ["tmp", "new", "cur"] {
            assert!(dir.path().join(leaf).is_dir());
        }
        assert!(store.is_connected());
    }

    #[test]
    fn double_connect_fails() {
        let (_dir, mut store) = store();
        assert_eq!(
            store.connect().unwrap_err().code(),
            ErrorCode::AlreadyConnected
        );
    }

    #[test]
    fn folder_requires_connection() {
        let dir = tempfile::tempdir().unwrap();
        let mut store =
            MaildirStore::with_root(Session::new(), dir.path().to_path_buf()).unwrap();
        assert_eq!(
            store
                .folder(&FolderPath::root())
                .unwrap_err()
                .code(),
            ErrorCode::NotConnected
        );
    }

    #[test]
    fn dotted_folder_names_are_rejected() {
        let (_dir, mut store) = store();
        let bad = FolderPath::from_components(vec![".hidden".to_string()]);
        assert_eq!(
            store.folder(&bad).unwrap_err().code(),
            ErrorCode::InvalidFolderName
        );
    }
}
