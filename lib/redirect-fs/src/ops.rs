//! Common [`FileSystem`] operations.

use std::io::{Read, Write};

use crate::path::{self, split_parent};
use crate::{FileSystem, FsError};

/// Does this item exists?
pub fn exists<F>(fs: &F, path: &str) -> bool
where
    F: FileSystem + ?Sized,
{
    fs.metadata(path).is_ok()
}

/// Does this path refer to a directory?
pub fn is_dir<F>(fs: &F, path: &str) -> bool
where
    F: FileSystem + ?Sized,
{
    match fs.metadata(path) {
        Ok(meta) => meta.is_dir(),
        Err(_) => false,
    }
}

/// Does this path refer to a file?
pub fn is_file<F>(fs: &F, path: &str) -> bool
where
    F: FileSystem + ?Sized,
{
    match fs.metadata(path) {
        Ok(meta) => meta.is_file(),
        Err(_) => false,
    }
}

/// Make sure a directory (and all its parents) exist.
///
/// This is analogous to [`std::fs::create_dir_all()`].
pub fn create_dir_all<F>(fs: &F, path: &str) -> Result<(), FsError>
where
    F: FileSystem + ?Sized,
{
    if let Some((parent, _)) = split_parent(path) {
        create_dir_all(fs, parent)?;
    }

    if let Ok(metadata) = fs.metadata(path) {
        if metadata.is_dir() {
            return Ok(());
        }
        if metadata.is_file() {
            return Err(FsError::BaseNotDirectory);
        }
    }

    match fs.create_dir(path) {
        Err(FsError::AlreadyExists) => Ok(()),
        other => other,
    }
}

/// Write a buffer to a file, creating it and its parent directories.
pub fn write<F>(fs: &F, path: &str, data: impl AsRef<[u8]>) -> Result<(), FsError>
where
    F: FileSystem + ?Sized,
{
    if let Some((parent, _)) = split_parent(path) {
        create_dir_all(fs, parent)?;
    }

    let mut f = fs
        .new_open_options()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;

    f.write_all(data.as_ref())?;
    f.flush()?;

    Ok(())
}

/// Read the entire contents of a file into a string.
pub fn read_to_string<F>(fs: &F, path: &str) -> Result<String, FsError>
where
    F: FileSystem + ?Sized,
{
    let mut f = fs.new_open_options().read(true).open(path)?;
    let mut buffer = String::new();
    f.read_to_string(&mut buffer)?;
    Ok(buffer)
}

/// Update a file's modification and access times, creating the file if it
/// doesn't already exist.
pub fn touch<F>(fs: &F, path: &str) -> Result<(), FsError>
where
    F: FileSystem + ?Sized,
{
    let _ = fs
        .new_open_options()
        .create(true)
        .write(true)
        .open(path)?;

    Ok(())
}

/// Recursively copy a file or directory tree to `to`.
pub fn copy_tree<F>(fs: &F, from: &str, to: &str) -> Result<(), FsError>
where
    F: FileSystem + ?Sized,
{
    let metadata = fs.metadata(from)?;
    if !metadata.is_dir() {
        if let Some((parent, _)) = split_parent(to) {
            create_dir_all(fs, parent)?;
        }
        return fs.copy_file(from, to);
    }

    create_dir_all(fs, to)?;
    for entry in fs.read_dir(from)? {
        copy_tree(fs, &entry.path, &path::join(to, &entry.name))?;
    }
    Ok(())
}
