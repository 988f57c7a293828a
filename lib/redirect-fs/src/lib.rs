//! Managed file redirection.
//!
//! Given a path an application references, this crate decides which physical
//! location should service the request: the per-user redirected area, the
//! package's VFS mirror, the literal path, or a computed equivalent. Single
//! target operations pick one candidate ([`select`]); directory listings merge
//! every candidate ([`enumerate`]).
//!
//! All paths are Windows-style strings. The backends behind [`FileSystem`]
//! are the only place that touches real storage.

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read, Seek, Write};
use thiserror::Error;

pub mod enumerate;
pub mod error;
pub mod host_fs;
pub mod mapping;
pub mod mem_fs;
pub mod ops;
pub mod path;
pub mod redirector;
pub mod resolve;
pub mod select;
pub mod whiteout;

pub use enumerate::{EnumerationEntry, FindHandle};
pub use error::RedirectError;
pub use mapping::{KnownFolder, KnownFolders, VfsFolderMapping, VfsMappingTable};
pub use path::{
    classify, ClassifiedPath, CurrentDirectory, FixedCurrentDir, HostCurrentDir, PathCategory,
};
pub use redirector::{OpenedFile, Redirector};
pub use resolve::{Candidate, PathRole, RedirectionRoots, ResolvedPathSet, Resolver};
pub use select::{Choice, OpKind, Preparation};
pub use whiteout::{DeletionMarkers, WhiteoutMarkers};

pub type Result<T, E = FsError> = std::result::Result<T, E>;

/// The non-redirected storage primitives the engine probes and mutates.
///
/// Paths are absolute Windows-style strings (`C:\dir\file` or
/// `\\server\share\file`).
pub trait FileSystem: fmt::Debug + Send + Sync + FileOpener {
    fn metadata(&self, path: &str) -> Result<Metadata>;
    fn read_dir(&self, path: &str) -> Result<ReadDir>;
    fn create_dir(&self, path: &str) -> Result<()>;
    fn remove_dir(&self, path: &str) -> Result<()>;
    fn remove_file(&self, path: &str) -> Result<()>;
    /// Moves a file or directory, replacing an existing file at `to`.
    fn rename(&self, from: &str, to: &str) -> Result<()>;
    /// Copies the contents of a file, replacing an existing file at `to`.
    fn copy_file(&self, from: &str, to: &str) -> Result<()>;
    fn hard_link(&self, original: &str, link: &str) -> Result<()>;
    fn symlink(&self, original: &str, link: &str, is_dir: bool) -> Result<()>;

    fn new_open_options(&self) -> OpenOptions<'_>;
}

impl<T: FileSystem + ?Sized> FileOpener for std::sync::Arc<T> {
    fn open(
        &self,
        path: &str,
        conf: &OpenOptionsConfig,
    ) -> Result<Box<dyn VirtualFile + Send + Sync + 'static>> {
        (**self).open(path, conf)
    }
}

pub trait FileOpener {
    fn open(
        &self,
        path: &str,
        conf: &OpenOptionsConfig,
    ) -> Result<Box<dyn VirtualFile + Send + Sync + 'static>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOptionsConfig {
    pub read: bool,
    pub write: bool,
    pub create_new: bool,
    pub create: bool,
    pub append: bool,
    pub truncate: bool,
}

impl OpenOptionsConfig {
    pub const fn read(&self) -> bool {
        self.read
    }

    pub const fn write(&self) -> bool {
        self.write
    }

    pub const fn create_new(&self) -> bool {
        self.create_new
    }

    pub const fn create(&self) -> bool {
        self.create
    }

    pub const fn append(&self) -> bool {
        self.append
    }

    pub const fn truncate(&self) -> bool {
        self.truncate
    }

    /// Would a file opened with these options be able to change the file?
    pub const fn would_mutate(&self) -> bool {
        self.write || self.append || self.truncate || self.create_new
    }
}

pub struct OpenOptions<'a> {
    opener: &'a dyn FileOpener,
    conf: OpenOptionsConfig,
}

impl<'a> OpenOptions<'a> {
    pub fn new(opener: &'a dyn FileOpener) -> Self {
        Self {
            opener,
            conf: OpenOptionsConfig::default(),
        }
    }

    pub fn get_config(&self) -> OpenOptionsConfig {
        self.conf.clone()
    }

    /// Use an existing [`OpenOptionsConfig`] to configure this [`OpenOptions`].
    pub fn options(&mut self, options: OpenOptionsConfig) -> &mut Self {
        self.conf = options;
        self
    }

    pub fn read(&mut self, read: bool) -> &mut Self {
        self.conf.read = read;
        self
    }

    pub fn write(&mut self, write: bool) -> &mut Self {
        self.conf.write = write;
        self
    }

    pub fn append(&mut self, append: bool) -> &mut Self {
        self.conf.append = append;
        self
    }

    pub fn truncate(&mut self, truncate: bool) -> &mut Self {
        self.conf.truncate = truncate;
        self
    }

    pub fn create(&mut self, create: bool) -> &mut Self {
        self.conf.create = create;
        self
    }

    pub fn create_new(&mut self, create_new: bool) -> &mut Self {
        self.conf.create_new = create_new;
        self
    }

    pub fn open(&mut self, path: &str) -> Result<Box<dyn VirtualFile + Send + Sync + 'static>> {
        self.opener.open(path, &self.conf)
    }
}

/// This trait relies on your file closing when it goes out of scope via `Drop`
pub trait VirtualFile: fmt::Debug + Read + Write + Seek {
    /// the size of the file in bytes
    fn size(&self) -> u64;

    /// Change the size of the file, if the `new_size` is greater than the current size
    /// the extra bytes will be allocated and zeroed
    fn set_len(&mut self, new_size: u64) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct FileType {
    pub dir: bool,
    pub file: bool,
    pub symlink: bool,
}

impl FileType {
    pub fn is_dir(&self) -> bool {
        self.dir
    }
    pub fn is_file(&self) -> bool {
        self.file
    }
    pub fn is_symlink(&self) -> bool {
        self.symlink
    }
}

bitflags::bitflags! {
    /// Win32 file attribute bits reported for queried and enumerated entries.
    #[derive(Default)]
    pub struct FileAttributes: u32 {
        const READONLY = 0x0000_0001;
        const HIDDEN = 0x0000_0002;
        const SYSTEM = 0x0000_0004;
        const DIRECTORY = 0x0000_0010;
        const ARCHIVE = 0x0000_0020;
        const NORMAL = 0x0000_0080;
        const REPARSE_POINT = 0x0000_0400;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Metadata {
    pub ft: FileType,
    pub accessed: u64,
    pub created: u64,
    pub modified: u64,
    pub len: u64,
    pub readonly: bool,
}

impl Metadata {
    pub fn is_file(&self) -> bool {
        self.ft.is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.ft.is_dir()
    }

    pub fn accessed(&self) -> u64 {
        self.accessed
    }

    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn modified(&self) -> u64 {
        self.modified
    }

    pub fn file_type(&self) -> FileType {
        self.ft
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn attributes(&self) -> FileAttributes {
        let mut attributes = FileAttributes::empty();
        if self.ft.dir {
            attributes |= FileAttributes::DIRECTORY;
        } else {
            attributes |= FileAttributes::ARCHIVE;
        }
        if self.ft.symlink {
            attributes |= FileAttributes::REPARSE_POINT;
        }
        if self.readonly {
            attributes |= FileAttributes::READONLY;
        }
        attributes
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File name with its original case.
    pub name: String,
    /// Full path of the entry inside the filesystem that listed it.
    pub path: String,
    pub metadata: Metadata,
}

impl DirEntry {
    pub fn file_name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn file_type(&self) -> FileType {
        self.metadata.ft
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadDir {
    data: Vec<DirEntry>,
    index: usize,
}

impl ReadDir {
    pub fn new(data: Vec<DirEntry>) -> Self {
        Self { data, index: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.data.len() <= self.index
    }
}

impl Iterator for ReadDir {
    type Item = DirEntry;

    fn next(&mut self) -> Option<DirEntry> {
        let entry = self.data.get(self.index).cloned();
        if entry.is_some() {
            self.index += 1;
        }
        entry
    }
}

/// Error type for external users
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum FsError {
    /// The fd given as a base was not a directory so the operation was not possible
    #[error("fd not a directory")]
    BaseNotDirectory,
    /// Expected a file but found not a file
    #[error("fd not a file")]
    NotAFile,
    /// File exists
    #[error("file exists")]
    AlreadyExists,
    /// Something failed when doing IO. These errors can generally not be handled.
    /// It may work if tried again.
    #[error("io error")]
    IOError,
    /// Invalid internal data, if the argument data is invalid, use `InvalidInput`
    #[error("invalid internal data")]
    InvalidData,
    /// The provided data is invalid
    #[error("invalid input")]
    InvalidInput,
    /// The requested file or directory could not be found
    #[error("entry not found")]
    EntryNotFound,
    /// Caller was not allowed to perform this operation
    #[error("permission denied")]
    PermissionDenied,
    /// Directory not Empty
    #[error("directory not empty")]
    DirectoryNotEmpty,
    /// Operation is not supported by this filesystem
    #[error("unsupported")]
    Unsupported,
    /// The internal lock was poisoned
    #[error("lock error")]
    Lock,
    /// Some other unhandled error. If you see this, it's probably a bug.
    #[error("unknown error found")]
    UnknownError,
}

impl From<io::Error> for FsError {
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists,
            io::ErrorKind::InvalidData => FsError::InvalidData,
            io::ErrorKind::InvalidInput => FsError::InvalidInput,
            io::ErrorKind::NotFound => FsError::EntryNotFound,
            io::ErrorKind::PermissionDenied => FsError::PermissionDenied,
            io::ErrorKind::Unsupported => FsError::Unsupported,
            io::ErrorKind::DirectoryNotEmpty => FsError::DirectoryNotEmpty,
            io::ErrorKind::NotADirectory => FsError::BaseNotDirectory,
            io::ErrorKind::IsADirectory => FsError::NotAFile,
            io::ErrorKind::Other => FsError::IOError,
            // if the following triggers, a new error type was added to this non-exhaustive enum
            _ => FsError::UnknownError,
        }
    }
}

impl From<FsError> for io::Error {
    fn from(val: FsError) -> Self {
        let kind = match val {
            FsError::AlreadyExists => io::ErrorKind::AlreadyExists,
            FsError::InvalidData => io::ErrorKind::InvalidData,
            FsError::InvalidInput => io::ErrorKind::InvalidInput,
            FsError::EntryNotFound => io::ErrorKind::NotFound,
            FsError::PermissionDenied => io::ErrorKind::PermissionDenied,
            FsError::Unsupported => io::ErrorKind::Unsupported,
            FsError::DirectoryNotEmpty => io::ErrorKind::DirectoryNotEmpty,
            FsError::BaseNotDirectory => io::ErrorKind::NotADirectory,
            FsError::NotAFile => io::ErrorKind::IsADirectory,
            FsError::IOError | FsError::Lock | FsError::UnknownError => io::ErrorKind::Other,
        };
        kind.into()
    }
}
