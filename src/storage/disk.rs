use anyhow::Context;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::task::Poll;
use std::time::SystemTime;

use crate::storage::{FileInfo, FileStore, FileSystem, normalize_name};

/// File system rooted at a host directory.
#[derive(Debug, Clone)]
pub struct DiskFileSystem {
    root: PathBuf,
}

impl DiskFileSystem {
    /// Uses `root` as the top of the store, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create storage root {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> anyhow::Result<PathBuf> {
        Ok(self.root.join(normalize_name(name)?))
    }
}

impl FileSystem for DiskFileSystem {
    fn open_read(&mut self, name: &str) -> anyhow::Result<Box<dyn FileStore>> {
        let path = self.resolve(name)?;
        let file = File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
        let length = file.metadata()?.len();
        Ok(Box::new(DiskFile { file, length }))
    }

    fn open_write(&mut self, name: &str) -> anyhow::Result<Box<dyn FileStore>> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file =
            File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Box::new(DiskFile { file, length: 0 }))
    }

    fn poll_file_info(&mut self, name: &str) -> Poll<anyhow::Result<Option<FileInfo>>> {
        let path = match self.resolve(name) {
            Ok(p) => p,
            Err(e) => return Poll::Ready(Err(e)),
        };
        let info = match fs::metadata(&path) {
            Ok(meta) => Ok(Some(FileInfo {
                name: name.trim_start_matches('/').to_string(),
                size: meta.len(),
                is_dir: meta.is_dir(),
                last_modified: meta.modified().ok(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        };
        Poll::Ready(info)
    }

    fn remove(&mut self, name: &str) -> anyhow::Result<bool> {
        let path = self.resolve(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }

    fn set_last_modified(&mut self, name: &str, when: SystemTime) -> anyhow::Result<()> {
        let path = self.resolve(name)?;
        let file = File::options().write(true).open(&path)?;
        file.set_modified(when)?;
        Ok(())
    }

    fn list(&mut self) -> anyhow::Result<Vec<FileInfo>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            entries.push(FileInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
                is_dir: meta.is_dir(),
                last_modified: meta.modified().ok(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

struct DiskFile {
    file: File,
    length: u64,
}

impl FileStore for DiskFile {
    fn read(&mut self, buf: &mut [u8]) -> anyhow::Result<usize> {
        Ok(self.file.read(buf)?)
    }

    fn write(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.file.write_all(data)?;
        self.length += data.len() as u64;
        Ok(())
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
