//! File store interfaces.
//!
//! - **`memory`**: RAM-backed store with fault injection and slow lookups
//! - **`disk`**: store rooted at a host directory
//!
//! Names are relative, `/`-separated paths. A leading `/` is ignored and
//! `..` components are rejected.

use serde::Serialize;
use std::task::Poll;
use std::time::SystemTime;

pub mod disk;
pub mod memory;

pub use disk::DiskFileSystem;
pub use memory::MemoryFileSystem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    #[serde(skip)]
    pub last_modified: Option<SystemTime>,
}

/// An open file. Dropping it without [`close`](FileStore::close) loses
/// unflushed writes.
pub trait FileStore {
    fn read(&mut self, buf: &mut [u8]) -> anyhow::Result<usize>;
    fn write(&mut self, data: &[u8]) -> anyhow::Result<()>;
    fn length(&self) -> u64;
    fn close(self: Box<Self>) -> anyhow::Result<()>;
}

pub trait FileSystem {
    fn open_read(&mut self, name: &str) -> anyhow::Result<Box<dyn FileStore>>;

    /// Creates or truncates `name`.
    fn open_write(&mut self, name: &str) -> anyhow::Result<Box<dyn FileStore>>;

    /// Looks up metadata for `name`. The lookup may need several calls to
    /// complete; callers keep polling while it returns `Pending`.
    fn poll_file_info(&mut self, name: &str) -> Poll<anyhow::Result<Option<FileInfo>>>;

    /// Drops an unfinished lookup of `name`. The next poll starts over.
    fn cancel_file_info(&mut self, _name: &str) {}

    /// Returns whether a file was removed.
    fn remove(&mut self, name: &str) -> anyhow::Result<bool>;

    fn set_last_modified(&mut self, name: &str, when: SystemTime) -> anyhow::Result<()>;

    fn list(&mut self) -> anyhow::Result<Vec<FileInfo>>;
}

/// Canonical form of a file name.
pub fn normalize_name(name: &str) -> anyhow::Result<String> {
    let parts: Vec<&str> = name
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();

    if parts.is_empty() {
        anyhow::bail!("Empty file name");
    }
    if parts.iter().any(|p| *p == "..") {
        anyhow::bail!("Invalid file name: {}", name);
    }
    Ok(parts.join("/"))
}
