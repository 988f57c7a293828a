//! The host filesystem.
//!
//! Without a root, Windows paths are used as they are (only on Windows).
//! With a root, `X:\a\b` lives at `<root>/X/a/b` and `\\server\share\a` at
//! `<root>/UNC/server/share/a`, which lets the engine run against a scratch
//! directory on any host.

use std::fs;
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::path::{self, is_separator, split_parent};
use crate::{
    DirEntry, FileType, FsError, Metadata, OpenOptions, OpenOptionsConfig, ReadDir, Result,
    VirtualFile,
};

#[derive(Debug, Clone, Default)]
pub struct FileSystem {
    root: Option<PathBuf>,
}

pub fn canonicalize(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(FsError::InvalidInput);
    }
    dunce::canonicalize(path).map_err(Into::into)
}

impl FileSystem {
    /// Uses Windows paths directly.
    pub fn native() -> Self {
        FileSystem { root: None }
    }

    /// Maps every drive and UNC share below `root`, which must exist.
    pub fn with_root(root: impl Into<PathBuf>) -> Result<Self> {
        let root = canonicalize(&root.into())?;
        Ok(FileSystem { root: Some(root) })
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Where a Windows path lives on this host.
    pub fn host_path(&self, path: &str) -> Result<PathBuf> {
        let path = path::normalize_absolute(path).ok_or(FsError::InvalidInput)?;
        match &self.root {
            Some(root) => Ok(mapped_path(root, &path)),
            None => native_path(&path),
        }
    }

    /// Creates the directory standing in for the drive or share of `path`.
    fn ensure_drive(&self, path: &str) {
        let Some(root) = &self.root else {
            return;
        };
        let Some(normalized) = path::normalize_absolute(path) else {
            return;
        };
        let drive_root = &normalized[..path::root_len(&normalized)];
        let dir = mapped_path(root, drive_root);
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::debug!(dir=%dir.display(), error=%e, "Unable to create drive directory");
        }
    }

    fn is_drive_root(&self, path: &str) -> bool {
        self.root.is_some() && split_parent(path).is_none()
    }
}

fn mapped_path(root: &Path, path: &str) -> PathBuf {
    let mut host = root.to_path_buf();
    let rest = if let Some(unc) = path.strip_prefix(r"\\") {
        host.push("UNC");
        unc
    } else {
        let drive = path[..1].to_ascii_uppercase();
        host.push(drive);
        &path[2..]
    };
    for segment in rest.split(is_separator).filter(|s| !s.is_empty()) {
        host.push(segment);
    }
    host
}

#[cfg(windows)]
fn native_path(path: &str) -> Result<PathBuf> {
    Ok(PathBuf::from(path))
}

#[cfg(not(windows))]
fn native_path(_path: &str) -> Result<PathBuf> {
    Err(FsError::Unsupported)
}

fn nanos(time: io::Result<std::time::SystemTime>) -> u64 {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_nanos() as u64)
}

impl From<fs::Metadata> for Metadata {
    fn from(meta: fs::Metadata) -> Self {
        let filetype = meta.file_type();
        Metadata {
            ft: FileType {
                dir: filetype.is_dir(),
                file: filetype.is_file(),
                symlink: filetype.is_symlink(),
            },
            accessed: nanos(meta.accessed()),
            created: nanos(meta.created()),
            modified: nanos(meta.modified()),
            len: meta.len(),
            readonly: meta.permissions().readonly(),
        }
    }
}

fn dir_metadata() -> Metadata {
    Metadata {
        ft: FileType {
            dir: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

impl crate::FileSystem for FileSystem {
    fn metadata(&self, path: &str) -> Result<Metadata> {
        let host = self.host_path(path)?;
        match fs::metadata(&host) {
            Ok(meta) => Ok(meta.into()),
            Err(e) if e.kind() == io::ErrorKind::NotFound && self.is_drive_root(path) => {
                Ok(dir_metadata())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn read_dir(&self, path: &str) -> Result<ReadDir> {
        let host = self.host_path(path)?;
        let base = path::normalize_absolute(path).ok_or(FsError::InvalidInput)?;

        let read_dir = match fs::read_dir(&host) {
            Ok(r) => r,
            Err(e) if e.kind() == io::ErrorKind::NotFound && self.is_drive_root(path) => {
                return Ok(ReadDir::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut data = read_dir
            .map(|entry| {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                let metadata = fs::metadata(entry.path()).or_else(|_| entry.metadata())?;
                Ok(DirEntry {
                    path: path::join(&base, &name),
                    name,
                    metadata: metadata.into(),
                })
            })
            .collect::<std::result::Result<Vec<DirEntry>, io::Error>>()
            .map_err::<FsError, _>(Into::into)?;
        data.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ReadDir::new(data))
    }

    fn create_dir(&self, path: &str) -> Result<()> {
        if split_parent(path).is_none() {
            return Err(FsError::AlreadyExists);
        }
        self.ensure_drive(path);
        let host = self.host_path(path)?;
        fs::create_dir(host).map_err(Into::into)
    }

    fn remove_dir(&self, path: &str) -> Result<()> {
        if split_parent(path).is_none() {
            return Err(FsError::PermissionDenied);
        }
        let host = self.host_path(path)?;

        // https://github.com/rust-lang/rust/issues/86442
        // DirectoryNotEmpty is not implemented consistently
        if host.is_dir()
            && fs::read_dir(&host)
                .map(|mut r| r.next().is_some())
                .unwrap_or(false)
        {
            return Err(FsError::DirectoryNotEmpty);
        }
        fs::remove_dir(host).map_err(Into::into)
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        let host = self.host_path(path)?;
        if host.is_dir() {
            return Err(FsError::NotAFile);
        }
        fs::remove_file(host).map_err(Into::into)
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = self.host_path(from)?;
        self.ensure_drive(to);
        let to = self.host_path(to)?;
        if !from.exists() {
            return Err(FsError::EntryNotFound);
        }
        fs::rename(from, to).map_err(Into::into)
    }

    fn copy_file(&self, from: &str, to: &str) -> Result<()> {
        use filetime::{set_file_mtime, FileTime};

        let from = self.host_path(from)?;
        self.ensure_drive(to);
        let to = self.host_path(to)?;
        let meta = fs::metadata(&from)?;
        if meta.is_dir() {
            return Err(FsError::NotAFile);
        }
        fs::copy(&from, &to)?;
        let mtime = FileTime::from_last_modification_time(&meta);
        if let Err(e) = set_file_mtime(&to, mtime) {
            tracing::debug!(path=%to.display(), error=%e, "Unable to preserve the modification time");
        }
        Ok(())
    }

    fn hard_link(&self, original: &str, link: &str) -> Result<()> {
        let original = self.host_path(original)?;
        self.ensure_drive(link);
        let link = self.host_path(link)?;
        fs::hard_link(original, link).map_err(Into::into)
    }

    fn symlink(&self, original: &str, link: &str, is_dir: bool) -> Result<()> {
        let target = if path::is_absolute(original) {
            self.host_path(original)?
        } else {
            original.split(is_separator).collect()
        };
        self.ensure_drive(link);
        let link = self.host_path(link)?;
        create_symlink(&target, &link, is_dir).map_err(Into::into)
    }

    fn new_open_options(&self) -> OpenOptions<'_> {
        OpenOptions::new(self)
    }
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path, _is_dir: bool) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path, is_dir: bool) -> io::Result<()> {
    if is_dir {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(_target: &Path, _link: &Path, _is_dir: bool) -> io::Result<()> {
    Err(io::ErrorKind::Unsupported.into())
}

impl crate::FileOpener for FileSystem {
    fn open(
        &self,
        path: &str,
        conf: &OpenOptionsConfig,
    ) -> Result<Box<dyn VirtualFile + Send + Sync + 'static>> {
        if conf.create() || conf.create_new() {
            self.ensure_drive(path);
        }
        let host = self.host_path(path)?;

        // according to Rust's stdlib, specifying both truncate and append is nonsensical,
        // and it will return an error if we try to open a file with both flags set.
        // in order to prevent this, and stay compatible with native binaries, we just ignore
        // the append flag if truncate is set. the rationale behind this decision is that
        // truncate is going to be applied first and append is going to be ignored anyway.
        let append = if conf.truncate { false } else { conf.append() };

        let file = fs::OpenOptions::new()
            .read(conf.read())
            .write(conf.write() || (conf.truncate() && !append))
            .create_new(conf.create_new())
            .create(conf.create())
            .append(append)
            .truncate(conf.truncate())
            .open(&host)?;

        Ok(Box::new(File {
            inner: file,
            host_path: host,
        }))
    }
}

/// A thin wrapper around `std::fs::File`
#[derive(Debug)]
pub struct File {
    inner: fs::File,
    pub host_path: PathBuf,
}

impl Read for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for File {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for File {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl VirtualFile for File {
    fn size(&self) -> u64 {
        self.inner.metadata().map(|m| m.len()).unwrap_or(0)
    }

    fn set_len(&mut self, new_size: u64) -> Result<()> {
        fs::File::set_len(&self.inner, new_size).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ops, FileSystem as _};
    use tempfile::TempDir;

    fn fs() -> (TempDir, FileSystem) {
        let temp = TempDir::new().unwrap();
        let fs = FileSystem::with_root(temp.path()).unwrap();
        (temp, fs)
    }

    #[test]
    fn test_drive_and_unc_mapping() {
        let (temp, fs) = fs();
        let root = dunce::canonicalize(temp.path()).unwrap();
        assert_eq!(
            fs.host_path(r"c:\Program Files\x.txt").unwrap(),
            root.join("C").join("Program Files").join("x.txt")
        );
        assert_eq!(
            fs.host_path(r"\\srv\share\dir").unwrap(),
            root.join("UNC").join("srv").join("share").join("dir")
        );
        assert_eq!(fs.host_path("relative"), Err(FsError::InvalidInput));
    }

    #[test]
    fn test_drive_roots_always_exist() {
        let (_temp, fs) = fs();
        assert!(ops::is_dir(&fs, r"Q:\"));
        assert_eq!(fs.read_dir(r"Q:\").unwrap().count(), 0);
        assert_eq!(fs.metadata(r"Q:\missing"), Err(FsError::EntryNotFound));
    }

    #[test]
    fn test_write_read_and_list() {
        let (_temp, fs) = fs();
        ops::write(&fs, r"C:\dir\b.txt", b"bee").unwrap();
        ops::write(&fs, r"C:\dir\a.txt", b"a").unwrap();
        assert_eq!(ops::read_to_string(&fs, r"C:\dir\b.txt").unwrap(), "bee");

        let entries: Vec<_> = fs.read_dir(r"C:\dir").unwrap().collect();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert_eq!(entries[1].path, r"C:\dir\b.txt");
        assert_eq!(entries[1].metadata.len, 3);
    }

    #[test]
    fn test_remove_dir_not_empty() {
        let (_temp, fs) = fs();
        ops::write(&fs, r"C:\dir\a.txt", b"a").unwrap();
        assert_eq!(fs.remove_dir(r"C:\dir"), Err(FsError::DirectoryNotEmpty));
        fs.remove_file(r"C:\dir\a.txt").unwrap();
        fs.remove_dir(r"C:\dir").unwrap();
        assert!(!ops::exists(&fs, r"C:\dir"));
    }

    #[test]
    fn test_copy_preserves_mtime() {
        use filetime::{set_file_mtime, FileTime};

        let (_temp, fs) = fs();
        ops::write(&fs, r"C:\src.txt", b"data").unwrap();
        let mtime = FileTime::from_unix_time(1_000_000, 0);
        set_file_mtime(fs.host_path(r"C:\src.txt").unwrap(), mtime).unwrap();

        fs.copy_file(r"C:\src.txt", r"D:\copy.txt").unwrap();
        let meta = fs.metadata(r"D:\copy.txt").unwrap();
        assert_eq!(meta.modified, 1_000_000 * 1_000_000_000);
        assert_eq!(ops::read_to_string(&fs, r"D:\copy.txt").unwrap(), "data");
    }

    #[test]
    fn test_rename_file() {
        let (_temp, fs) = fs();
        ops::write(&fs, r"C:\a.txt", b"a").unwrap();
        fs.rename(r"C:\a.txt", r"C:\b.txt").unwrap();
        assert!(!ops::exists(&fs, r"C:\a.txt"));
        assert!(ops::is_file(&fs, r"C:\b.txt"));
        assert_eq!(
            fs.rename(r"C:\a.txt", r"C:\c.txt"),
            Err(FsError::EntryNotFound)
        );
    }
}
