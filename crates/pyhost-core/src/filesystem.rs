//! Pluggable filesystem contract for module resolution and `open()`
//! (`spec.md` §6 "Module resolver", §4.6 "open(path, mode)").

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub trait Filesystem: Send + Sync {
    /// Reads the full contents of `path`, relative to whatever root the
    /// embedder configured. Returns `None` if the path does not exist.
    fn read(&self, path: &str) -> Option<String>;

    /// Writes `contents` to `path`, creating or truncating it.
    fn write(&self, path: &str, contents: &str) -> std::io::Result<()>;

    fn exists(&self, path: &str) -> bool {
        self.read(path).is_some()
    }

    /// Lists entries directly under `dir`. The default implementation
    /// reports no entries; backends that can enumerate a directory (e.g.
    /// `NativeFilesystem`) override it.
    fn list(&self, dir: &str) -> Vec<String> {
        let _ = dir;
        Vec::new()
    }

    /// Removes `path`. The default implementation reports the path as never
    /// having existed.
    fn delete(&self, path: &str) -> std::io::Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()))
    }
}

/// Backs a value returned by the `open()` builtin. Read-mode handles pull
/// their entire content at open time into `unread`, consumed by `read()`/
/// `readline()`/iteration; write-mode handles accumulate into `write_buf`
/// and flush through the owning `Filesystem` on `close()`.
pub struct FileHandle {
    pub path: String,
    pub writable: bool,
    pub readable: bool,
    pub unread: String,
    pub write_buf: String,
    pub closed: bool,
}

pub type FileRef = Arc<Mutex<FileHandle>>;

/// In-memory filesystem for embedding contexts and tests: no real I/O, fully
/// deterministic, content seeded at construction time.
#[derive(Default)]
pub struct MemoryFilesystem {
    files: Mutex<HashMap<String, String>>,
}

impl MemoryFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(files: impl IntoIterator<Item = (String, String)>) -> Self {
        MemoryFilesystem { files: Mutex::new(files.into_iter().collect()) }
    }

    pub fn seed(&self, path: impl Into<String>, contents: impl Into<String>) {
        self.files.lock().unwrap().insert(path.into(), contents.into());
    }
}

impl Filesystem for MemoryFilesystem {
    fn read(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    fn write(&self, path: &str, contents: &str) -> std::io::Result<()> {
        self.files.lock().unwrap().insert(path.to_string(), contents.to_string());
        Ok(())
    }

    fn list(&self, dir: &str) -> Vec<String> {
        let prefix = if dir.is_empty() { String::new() } else { format!("{dir}/") };
        self.files.lock().unwrap().keys().filter_map(|p| p.strip_prefix(&prefix).map(str::to_string)).collect()
    }

    fn delete(&self, path: &str) -> std::io::Result<()> {
        if self.files.lock().unwrap().remove(path).is_some() {
            Ok(())
        } else {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()))
        }
    }
}

/// Delegates to the real local filesystem, rooted at `root`. Intended for the
/// CLI binary, not for sandboxed embedding (no path-escape confinement beyond
/// plain `std::fs` joining).
pub struct NativeFilesystem {
    pub root: std::path::PathBuf,
}

impl NativeFilesystem {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        NativeFilesystem { root: root.into() }
    }

    fn resolve(&self, path: &str) -> std::path::PathBuf {
        self.root.join(path)
    }
}

impl Filesystem for NativeFilesystem {
    fn read(&self, path: &str) -> Option<String> {
        std::fs::read_to_string(self.resolve(path)).ok()
    }

    fn write(&self, path: &str, contents: &str) -> std::io::Result<()> {
        std::fs::write(self.resolve(path), contents)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn list(&self, dir: &str) -> Vec<String> {
        std::fs::read_dir(self.resolve(dir))
            .map(|entries| entries.filter_map(|e| e.ok()).filter_map(|e| e.file_name().into_string().ok()).collect())
            .unwrap_or_default()
    }

    fn delete(&self, path: &str) -> std::io::Result<()> {
        std::fs::remove_file(self.resolve(path))
    }
}
