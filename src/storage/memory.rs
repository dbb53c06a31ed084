use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::task::Poll;
use std::time::SystemTime;

use crate::storage::{FileInfo, FileStore, FileSystem, normalize_name};

#[derive(Debug, Clone)]
struct Entry {
    data: Rc<Vec<u8>>,
    last_modified: Option<SystemTime>,
}

#[derive(Debug, Default)]
struct Shared {
    files: BTreeMap<String, Entry>,
    /// Bytes that may still be written before writes start failing.
    write_budget: Option<usize>,
    fail_close: bool,
    /// Extra polls a metadata lookup takes before it completes.
    info_latency: u32,
    pending_info: HashMap<String, u32>,
}

/// RAM-backed file system. Clones share the same contents.
///
/// Written data becomes visible when the file is closed, like a file
/// system that only updates its directory entry on close.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    shared: Rc<RefCell<Shared>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, data: impl Into<Vec<u8>>) {
        if let Ok(name) = normalize_name(name) {
            self.shared.borrow_mut().files.insert(
                name,
                Entry {
                    data: Rc::new(data.into()),
                    last_modified: None,
                },
            );
        }
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        let name = normalize_name(name).ok()?;
        self.shared
            .borrow()
            .files
            .get(&name)
            .map(|e| e.data.as_ref().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contents(name).is_some()
    }

    pub fn modified(&self, name: &str) -> Option<SystemTime> {
        let name = normalize_name(name).ok()?;
        self.shared.borrow().files.get(&name)?.last_modified
    }

    /// After `bytes` more bytes, every write fails.
    pub fn fail_writes_after(&self, bytes: usize) {
        self.shared.borrow_mut().write_budget = Some(bytes);
    }

    pub fn fail_close(&self, fail: bool) {
        self.shared.borrow_mut().fail_close = fail;
    }

    /// Makes each metadata lookup return `Pending` `polls` times first.
    pub fn set_info_latency(&self, polls: u32) {
        self.shared.borrow_mut().info_latency = polls;
    }
}

impl FileSystem for MemoryFileSystem {
    fn open_read(&mut self, name: &str) -> anyhow::Result<Box<dyn FileStore>> {
        let name = normalize_name(name)?;
        let shared = self.shared.borrow();
        let entry = shared
            .files
            .get(&name)
            .ok_or_else(|| anyhow::anyhow!("File not found: {}", name))?;
        Ok(Box::new(MemoryReader {
            shared: Rc::clone(&self.shared),
            data: Rc::clone(&entry.data),
            pos: 0,
        }))
    }

    fn open_write(&mut self, name: &str) -> anyhow::Result<Box<dyn FileStore>> {
        let name = normalize_name(name)?;
        Ok(Box::new(MemoryWriter {
            shared: Rc::clone(&self.shared),
            name,
            data: Vec::new(),
        }))
    }

    fn poll_file_info(&mut self, name: &str) -> Poll<anyhow::Result<Option<FileInfo>>> {
        let name = match normalize_name(name) {
            Ok(n) => n,
            Err(e) => return Poll::Ready(Err(e)),
        };
        let mut shared = self.shared.borrow_mut();

        let latency = shared.info_latency;
        let waited = shared.pending_info.entry(name.clone()).or_insert(0);
        if *waited < latency {
            *waited += 1;
            return Poll::Pending;
        }
        shared.pending_info.remove(&name);

        let info = shared.files.get(&name).map(|e| FileInfo {
            name: name.clone(),
            size: e.data.len() as u64,
            is_dir: false,
            last_modified: e.last_modified,
        });
        Poll::Ready(Ok(info))
    }

    fn cancel_file_info(&mut self, name: &str) {
        if let Ok(name) = normalize_name(name) {
            self.shared.borrow_mut().pending_info.remove(&name);
        }
    }

    fn remove(&mut self, name: &str) -> anyhow::Result<bool> {
        let name = normalize_name(name)?;
        Ok(self.shared.borrow_mut().files.remove(&name).is_some())
    }

    fn set_last_modified(&mut self, name: &str, when: SystemTime) -> anyhow::Result<()> {
        let name = normalize_name(name)?;
        let mut shared = self.shared.borrow_mut();
        let entry = shared
            .files
            .get_mut(&name)
            .ok_or_else(|| anyhow::anyhow!("File not found: {}", name))?;
        entry.last_modified = Some(when);
        Ok(())
    }

    fn list(&mut self) -> anyhow::Result<Vec<FileInfo>> {
        Ok(self
            .shared
            .borrow()
            .files
            .iter()
            .map(|(name, e)| FileInfo {
                name: name.clone(),
                size: e.data.len() as u64,
                is_dir: false,
                last_modified: e.last_modified,
            })
            .collect())
    }
}

struct MemoryReader {
    shared: Rc<RefCell<Shared>>,
    data: Rc<Vec<u8>>,
    pos: usize,
}

impl FileStore for MemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> anyhow::Result<usize> {
        let rest = &self.data[self.pos..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, _data: &[u8]) -> anyhow::Result<()> {
        anyhow::bail!("File opened for reading")
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    fn close(self: Box<Self>) -> anyhow::Result<()> {
        if self.shared.borrow().fail_close {
            anyhow::bail!("Close failed");
        }
        Ok(())
    }
}

struct MemoryWriter {
    shared: Rc<RefCell<Shared>>,
    name: String,
    data: Vec<u8>,
}

impl FileStore for MemoryWriter {
    fn read(&mut self, _buf: &mut [u8]) -> anyhow::Result<usize> {
        anyhow::bail!("File opened for writing")
    }

    fn write(&mut self, data: &[u8]) -> anyhow::Result<()> {
        let mut shared = self.shared.borrow_mut();
        if let Some(budget) = shared.write_budget.as_mut() {
            if *budget < data.len() {
                *budget = 0;
                anyhow::bail!("Disk full");
            }
            *budget -= data.len();
        }
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    fn close(self: Box<Self>) -> anyhow::Result<()> {
        let MemoryWriter { shared, name, data } = *self;
        let mut shared = shared.borrow_mut();
        if shared.fail_close {
            anyhow::bail!("Close failed for {}", name);
        }
        shared.files.insert(
            name,
            Entry {
                data: Rc::new(data),
                last_modified: None,
            },
        );
        Ok(())
    }
}
