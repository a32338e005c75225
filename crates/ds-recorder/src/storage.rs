// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Persistence adapter
//!
//! Defines the file and clock primitives the engine drives.
//!
//! # Implementations
//!
//! - `FsStorage` -- local filesystem, wall clock
//! - `MemoryStorage` -- in-memory files, manual clock, injectable failures

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// File and clock primitives.
///
/// Every call is blocking and completes (or fails) before the engine
/// continues.
pub trait Storage {
    /// Open file handle.
    type Handle;

    /// Create a new file. Fails if `path` already exists.
    fn create(&mut self, path: &Path) -> io::Result<Self::Handle>;

    /// Append `bytes`. Returns the number of bytes written.
    fn write(&mut self, handle: &mut Self::Handle, bytes: &[u8]) -> io::Result<usize>;

    /// Overwrite `bytes` at `offset` without moving the append position.
    fn write_at(&mut self, handle: &mut Self::Handle, offset: u64, bytes: &[u8])
        -> io::Result<()>;

    /// Flush and close.
    fn close(&mut self, handle: Self::Handle) -> io::Result<()>;

    /// Move a closed file into `dest_dir`. Returns the new path.
    fn move_file(&mut self, path: &Path, dest_dir: &Path) -> io::Result<PathBuf>;

    /// Check if `path` exists.
    fn exists(&self, path: &Path) -> bool;

    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Destination path for moving `path` into `dest_dir`.
fn moved_path(path: &Path, dest_dir: &Path) -> io::Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", path.display()),
        )
    })?;
    Ok(dest_dir.join(name))
}

/// Local filesystem storage.
#[derive(Debug, Default)]
pub struct FsStorage;

/// Open file on the local filesystem.
#[derive(Debug)]
pub struct FsHandle {
    writer: BufWriter<File>,
}

impl FsStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Storage for FsStorage {
    type Handle = FsHandle;

    fn create(&mut self, path: &Path) -> io::Result<FsHandle> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(FsHandle {
            writer: BufWriter::new(file),
        })
    }

    fn write(&mut self, handle: &mut FsHandle, bytes: &[u8]) -> io::Result<usize> {
        handle.writer.write_all(bytes)?;
        Ok(bytes.len())
    }

    fn write_at(&mut self, handle: &mut FsHandle, offset: u64, bytes: &[u8]) -> io::Result<()> {
        handle.writer.seek(SeekFrom::Start(offset))?;
        handle.writer.write_all(bytes)?;
        handle.writer.seek(SeekFrom::End(0))?;
        Ok(())
    }

    fn close(&mut self, mut handle: FsHandle) -> io::Result<()> {
        handle.writer.flush()?;
        handle.writer.get_ref().sync_data()
    }

    fn move_file(&mut self, path: &Path, dest_dir: &Path) -> io::Result<PathBuf> {
        let target = moved_path(path, dest_dir)?;
        if target.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", target.display()),
            ));
        }
        std::fs::rename(path, &target)?;
        Ok(target)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// In-memory storage with a manual clock.
///
/// Used by tests and dry runs. Directories are implicit: any path can be
/// created unless it is listed as missing with [`MemoryStorage::remove_dir`].
#[derive(Debug)]
pub struct MemoryStorage {
    files: BTreeMap<PathBuf, Vec<u8>>,
    open: BTreeSet<PathBuf>,
    missing_dirs: BTreeSet<PathBuf>,
    now: DateTime<Utc>,
    fail_create: bool,
    fail_write: bool,
}

/// Open in-memory file.
#[derive(Debug)]
pub struct MemoryHandle {
    path: PathBuf,
}

impl MemoryStorage {
    /// Empty storage with the clock at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            files: BTreeMap::new(),
            open: BTreeSet::new(),
            missing_dirs: BTreeSet::new(),
            now,
            fail_create: false,
            fail_write: false,
        }
    }

    /// Move the clock forward.
    pub fn advance(&mut self, seconds: i64) {
        self.now += Duration::seconds(seconds);
    }

    /// Set the clock.
    pub fn set_now(&mut self, now: DateTime<Utc>) {
        self.now = now;
    }

    /// Make every `create` fail.
    pub fn fail_create(&mut self, fail: bool) {
        self.fail_create = fail;
    }

    /// Make every `write` fail.
    pub fn fail_write(&mut self, fail: bool) {
        self.fail_write = fail;
    }

    /// Treat `dir` as nonexistent for moves.
    pub fn remove_dir(&mut self, dir: impl Into<PathBuf>) {
        self.missing_dirs.insert(dir.into());
    }

    /// Pre-populate a file.
    pub fn insert_file(&mut self, path: impl Into<PathBuf>, contents: Vec<u8>) {
        self.files.insert(path.into(), contents);
    }

    /// Contents of a file.
    pub fn file(&self, path: impl AsRef<Path>) -> Option<&[u8]> {
        self.files.get(path.as_ref()).map(Vec::as_slice)
    }

    /// All file paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.keys().cloned().collect()
    }

    /// Check if a file is currently open.
    pub fn is_open(&self, path: impl AsRef<Path>) -> bool {
        self.open.contains(path.as_ref())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Storage for MemoryStorage {
    type Handle = MemoryHandle;

    fn create(&mut self, path: &Path) -> io::Result<MemoryHandle> {
        if self.fail_create {
            return Err(io::Error::new(io::ErrorKind::Other, "injected create failure"));
        }
        if self.files.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            ));
        }
        self.files.insert(path.to_path_buf(), Vec::new());
        self.open.insert(path.to_path_buf());
        Ok(MemoryHandle {
            path: path.to_path_buf(),
        })
    }

    fn write(&mut self, handle: &mut MemoryHandle, bytes: &[u8]) -> io::Result<usize> {
        if self.fail_write {
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
        }
        let file = self
            .files
            .get_mut(&handle.path)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        file.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn write_at(
        &mut self,
        handle: &mut MemoryHandle,
        offset: u64,
        bytes: &[u8],
    ) -> io::Result<()> {
        let file = self
            .files
            .get_mut(&handle.path)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        let start = offset as usize;
        let end = start + bytes.len();
        if end > file.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "write past end of file",
            ));
        }
        file[start..end].copy_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self, handle: MemoryHandle) -> io::Result<()> {
        self.open.remove(&handle.path);
        Ok(())
    }

    fn move_file(&mut self, path: &Path, dest_dir: &Path) -> io::Result<PathBuf> {
        if self.missing_dirs.contains(dest_dir) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", dest_dir.display()),
            ));
        }
        let target = moved_path(path, dest_dir)?;
        if self.files.contains_key(&target) {
            return Err(io::Error::from(io::ErrorKind::AlreadyExists));
        }
        let contents = self
            .files
            .remove(path)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        self.files.insert(target.clone(), contents);
        Ok(target)
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fs_create_write_close() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("a.dat");
        let mut storage = FsStorage::new();

        let mut handle = storage.create(&path).expect("create");
        assert_eq!(storage.write(&mut handle, b"hello world").expect("write"), 11);
        storage.write_at(&mut handle, 0, b"HELLO").expect("write_at");
        storage.write(&mut handle, b"!").expect("append");
        storage.close(handle).expect("close");

        assert_eq!(std::fs::read(&path).expect("read"), b"HELLO world!");
    }

    #[test]
    fn test_fs_create_refuses_overwrite() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("a.dat");
        std::fs::write(&path, b"keep").expect("seed");

        let mut storage = FsStorage::new();
        let err = storage.create(&path).expect_err("exists");
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&path).expect("read"), b"keep");
    }

    #[test]
    fn test_fs_move() {
        let dir = tempdir().expect("tempdir");
        let out = dir.path().join("out");
        std::fs::create_dir(&out).expect("mkdir");
        let path = dir.path().join("a.dat");
        std::fs::write(&path, b"x").expect("seed");

        let mut storage = FsStorage::new();
        let moved = storage.move_file(&path, &out).expect("move");

        assert_eq!(moved, out.join("a.dat"));
        assert!(!path.exists());
        assert!(moved.exists());
    }

    #[test]
    fn test_fs_move_missing_dir_fails() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("a.dat");
        std::fs::write(&path, b"x").expect("seed");

        let mut storage = FsStorage::new();
        assert!(storage
            .move_file(&path, &dir.path().join("missing"))
            .is_err());
        assert!(path.exists());
    }

    #[test]
    fn test_memory_storage_roundtrip() {
        let mut storage = MemoryStorage::default();
        let path = Path::new("/ram/a");

        let mut handle = storage.create(path).expect("create");
        assert!(storage.is_open(path));
        storage.write(&mut handle, b"abc").expect("write");
        storage.close(handle).expect("close");

        assert!(!storage.is_open(path));
        assert_eq!(storage.file(path), Some(&b"abc"[..]));
        assert!(storage.create(path).is_err());
    }

    #[test]
    fn test_memory_storage_clock() {
        let start = Utc::now();
        let mut storage = MemoryStorage::new(start);
        storage.advance(90);
        assert_eq!((storage.now() - start).num_seconds(), 90);
    }
}
