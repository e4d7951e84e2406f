// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! The platform boundary. Everything the core needs from the host
//! (clock, hostname, pid, randomness, filesystem, child processes) flows
//! through a `PlatformHandler`, so embedders can substitute their own.

use crate::modules::charset::Charset;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::raise_error;
use chrono::{DateTime, FixedOffset, Local, Utc};
use rand::RngCore;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};

pub trait PlatformHandler: Send + Sync {
    /// Current time as unix seconds.
    fn unix_time(&self) -> i64;

    /// Current local time with its UTC offset.
    fn local_now(&self) -> DateTime<FixedOffset>;

    fn hostname(&self) -> String;

    fn process_id(&self) -> u32;

    fn random_bytes(&self, count: usize) -> Vec<u8>;

    /// The charset of the host locale, assumed for raw user input.
    fn locale_charset(&self) -> Charset;

    fn filesystem(&self) -> Arc<dyn FileSystemFactory>;

    fn child_process(&self) -> Arc<dyn ChildProcessFactory>;
}

/// Filesystem operations used by file-backed stores. Errors carry the
/// offending path in their message.
pub trait FileSystemFactory: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> MailForgeResult<()>;
    fn remove_dir_all(&self, path: &Path) -> MailForgeResult<()>;
    fn remove_file(&self, path: &Path) -> MailForgeResult<()>;
    fn rename(&self, from: &Path, to: &Path) -> MailForgeResult<()>;
    fn read_dir(&self, path: &Path) -> MailForgeResult<Vec<PathBuf>>;
    fn read(&self, path: &Path) -> MailForgeResult<Vec<u8>>;
    fn write(&self, path: &Path, data: &[u8]) -> MailForgeResult<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn file_size(&self, path: &Path) -> MailForgeResult<u64>;
}

/// Spawns a child process, feeds it stdin and waits for completion.
pub trait ChildProcessFactory: Send + Sync {
    fn run(&self, program: &str, args: &[String], stdin: &[u8]) -> MailForgeResult<i32>;
}

#[derive(Default)]
pub struct DefaultPlatformHandler {
    filesystem: OnceLock<Arc<dyn FileSystemFactory>>,
    child_process: OnceLock<Arc<dyn ChildProcessFactory>>,
}

impl DefaultPlatformHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlatformHandler for DefaultPlatformHandler {
    fn unix_time(&self) -> i64 {
        Utc::now().timestamp()
    }

    fn local_now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }

    fn hostname(&self) -> String {
        gethostname::gethostname().to_string_lossy().into_owned()
    }

    fn process_id(&self) -> u32 {
        std::process::id()
    }

    fn random_bytes(&self, count: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; count];
        rand::rng().fill_bytes(&mut bytes);
        bytes
    }

    fn locale_charset(&self) -> Charset {
        Charset::utf_8()
    }

    fn filesystem(&self) -> Arc<dyn FileSystemFactory> {
        self.filesystem
            .get_or_init(|| Arc::new(StdFileSystemFactory))
            .clone()
    }

    fn child_process(&self) -> Arc<dyn ChildProcessFactory> {
        self.child_process
            .get_or_init(|| Arc::new(StdChildProcessFactory))
            .clone()
    }
}

pub struct StdFileSystemFactory;

fn map_io_error(error: std::io::Error, path: &Path) -> crate::modules::error::MailForgeError {
    let code = match error.kind() {
        std::io::ErrorKind::NotFound => ErrorCode::FileNotFound,
        std::io::ErrorKind::NotADirectory => ErrorCode::NotADirectory,
        _ => ErrorCode::FilesystemError,
    };
    raise_error!(format!("{}: {}", path.display(), error), code)
}

impl FileSystemFactory for StdFileSystemFactory {
    fn create_dir_all(&self, path: &Path) -> MailForgeResult<()> {
        std::fs::create_dir_all(path).map_err(|e| map_io_error(e, path))
    }

    fn remove_dir_all(&self, path: &Path) -> MailForgeResult<()> {
        std::fs::remove_dir_all(path).map_err(|e| map_io_error(e, path))
    }

    fn remove_file(&self, path: &Path) -> MailForgeResult<()> {
        std::fs::remove_file(path).map_err(|e| map_io_error(e, path))
    }

    fn rename(&self, from: &Path, to: &Path) -> MailForgeResult<()> {
        std::fs::rename(from, to).map_err(|e| map_io_error(e, from))
    }

    fn read_dir(&self, path: &Path) -> MailForgeResult<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path).map_err(|e| map_io_error(e, path))?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry.map_err(|e| map_io_error(e, path))?.path());
        }
        paths.sort();
        Ok(paths)
    }

    fn read(&self, path: &Path) -> MailForgeResult<Vec<u8>> {
        std::fs::read(path).map_err(|e| map_io_error(e, path))
    }

    fn write(&self, path: &Path, data: &[u8]) -> MailForgeResult<()> {
        std::fs::write(path, data).map_err(|e| map_io_error(e, path))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn file_size(&self, path: &Path) -> MailForgeResult<u64> {
        Ok(std::fs::metadata(path)
            .map_err(|e| map_io_error(e, path))?
            .len())
    }
}

pub struct StdChildProcessFactory;

impl ChildProcessFactory for StdChildProcessFactory {
    fn run(&self, program: &str, args: &[String], stdin: &[u8]) -> MailForgeResult<i32> {
        use std::io::Write;

        let mut child = std::process::Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                raise_error!(
                    format!("failed to spawn '{}': {}", program, e),
                    ErrorCode::SystemError
                )
            })?;

        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(stdin).map_err(|e| {
                raise_error!(
                    format!("failed to write to '{}' stdin: {}", program, e),
                    ErrorCode::SystemError
                )
            })?;
        }

        let status = child.wait().map_err(|e| {
            raise_error!(
                format!("failed waiting for '{}': {}", program, e),
                ErrorCode::SystemError
            )
        })?;
        Ok(status.code().unwrap_or(-1))
    }
}

static PLATFORM_HANDLER: OnceLock<Arc<dyn PlatformHandler>> = OnceLock::new();

/// Install the process-wide platform handler. Fails if one is already
/// installed (including the implicit default created on first use).
pub fn install(handler: Arc<dyn PlatformHandler>) -> MailForgeResult<()> {
    PLATFORM_HANDLER.set(handler).map_err(|_| {
        raise_error!(
            "a platform handler is already installed".into(),
            ErrorCode::NoPlatformHandler
        )
    })
}

/// The process-wide platform handler; the default host-backed handler is
/// created on first use when none was installed.
pub fn handler() -> Arc<dyn PlatformHandler> {
    PLATFORM_HANDLER
        .get_or_init(|| Arc::new(DefaultPlatformHandler::new()))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_handler_provides_host_facts() {
        let handler = DefaultPlatformHandler::new();
        assert!(handler.unix_time() > 1_500_000_000);
        assert!(handler.process_id() > 0);
        assert_eq!(handler.random_bytes(16).len(), 16);
    }

    #[test]
    fn filesystem_round_trip() {
        let handler = DefaultPlatformHandler::new();
        let fs = handler.filesystem();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("probe.txt");
        fs.write(&file, b"contents").unwrap();
        assert_eq!(fs.read(&file).unwrap(), b"contents");
        assert_eq!(fs.file_size(&file).unwrap(), 8);
        assert!(fs.exists(&file));
        fs.remove_file(&file).unwrap();
        assert!(!fs.exists(&file));
        let missing = fs.read(&file).unwrap_err();
        assert_eq!(missing.code(), ErrorCode::FileNotFound);
    }
}
