use std::cell::Cell;

use redirect_fs::{FsError, RedirectError};

/// A Win32 system error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[error("win32 error {0}")]
pub struct Win32Error(pub u32);

impl Win32Error {
    pub const SUCCESS: Win32Error = Win32Error(0);
    pub const FILE_NOT_FOUND: Win32Error = Win32Error(2);
    pub const PATH_NOT_FOUND: Win32Error = Win32Error(3);
    pub const ACCESS_DENIED: Win32Error = Win32Error(5);
    pub const INVALID_HANDLE: Win32Error = Win32Error(6);
    pub const NO_MORE_FILES: Win32Error = Win32Error(18);
    pub const GEN_FAILURE: Win32Error = Win32Error(31);
    pub const NOT_SUPPORTED: Win32Error = Win32Error(50);
    pub const FILE_EXISTS: Win32Error = Win32Error(80);
    pub const INVALID_PARAMETER: Win32Error = Win32Error(87);
    pub const INVALID_NAME: Win32Error = Win32Error(123);
    pub const DIR_NOT_EMPTY: Win32Error = Win32Error(145);
    pub const ALREADY_EXISTS: Win32Error = Win32Error(183);
    pub const DIRECTORY: Win32Error = Win32Error(267);

    pub fn code(&self) -> u32 {
        self.0
    }

    /// Maps an engine error to the code the intercepted API reports.
    ///
    /// APIs disagree on how an existing target is reported, so the caller
    /// supplies that code.
    pub fn from_redirect(error: RedirectError, already_exists: Win32Error) -> Win32Error {
        match error {
            RedirectError::PathNotFound => Win32Error::PATH_NOT_FOUND,
            RedirectError::FileNotFound => Win32Error::FILE_NOT_FOUND,
            RedirectError::AlreadyExists => already_exists,
            RedirectError::AccessDenied => Win32Error::ACCESS_DENIED,
            RedirectError::InvalidPath => Win32Error::INVALID_NAME,
            RedirectError::Unsupported => Win32Error::NOT_SUPPORTED,
            RedirectError::DirectoryNotEmpty => Win32Error::DIR_NOT_EMPTY,
            RedirectError::NotADirectory => Win32Error::DIRECTORY,
            RedirectError::Fs(fs) => match fs {
                FsError::EntryNotFound => Win32Error::FILE_NOT_FOUND,
                FsError::AlreadyExists => already_exists,
                FsError::PermissionDenied | FsError::NotAFile | FsError::Lock => {
                    Win32Error::ACCESS_DENIED
                }
                FsError::InvalidInput | FsError::InvalidData => Win32Error::INVALID_PARAMETER,
                FsError::BaseNotDirectory => Win32Error::DIRECTORY,
                FsError::DirectoryNotEmpty => Win32Error::DIR_NOT_EMPTY,
                FsError::Unsupported => Win32Error::NOT_SUPPORTED,
                FsError::IOError | FsError::UnknownError => Win32Error::GEN_FAILURE,
            },
        }
    }
}

thread_local! {
    static LAST_ERROR: Cell<u32> = const { Cell::new(0) };
}

/// Records `error` as the calling thread's last error.
pub fn set_last_error(error: Win32Error) {
    LAST_ERROR.with(|last| last.set(error.0));
}

/// The calling thread's last error.
pub fn last_error() -> Win32Error {
    Win32Error(LAST_ERROR.with(Cell::get))
}
