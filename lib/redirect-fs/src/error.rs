use crate::FsError;
use thiserror::Error;

/// Outcome taxonomy of the redirection engine.
///
/// Backend errors that have a direct counterpart are folded into the
/// matching variant, everything else is carried through as [`RedirectError::Fs`].
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum RedirectError {
    /// Not even the parent directory of the path exists anywhere
    #[error("path not found")]
    PathNotFound,
    /// The parent exists but the entry itself does not
    #[error("file not found")]
    FileNotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("access denied")]
    AccessDenied,
    /// The path could not be classified or normalized
    #[error("invalid path")]
    InvalidPath,
    /// The operation is not handled for this kind of path and should go to the
    /// unmodified OS primitive
    #[error("unsupported")]
    Unsupported,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("not a directory")]
    NotADirectory,
    #[error("filesystem error: {0}")]
    Fs(FsError),
}

impl From<FsError> for RedirectError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::EntryNotFound => RedirectError::FileNotFound,
            FsError::PermissionDenied => RedirectError::AccessDenied,
            FsError::AlreadyExists => RedirectError::AlreadyExists,
            FsError::DirectoryNotEmpty => RedirectError::DirectoryNotEmpty,
            FsError::BaseNotDirectory => RedirectError::NotADirectory,
            other => RedirectError::Fs(other),
        }
    }
}

impl RedirectError {
    /// Is this a "the thing is not there" style of failure?
    pub fn is_not_found(&self) -> bool {
        matches!(self, RedirectError::PathNotFound | RedirectError::FileNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_fold_into_engine_taxonomy() {
        assert_eq!(
            RedirectError::from(FsError::EntryNotFound),
            RedirectError::FileNotFound
        );
        assert_eq!(
            RedirectError::from(FsError::PermissionDenied),
            RedirectError::AccessDenied
        );
        assert_eq!(
            RedirectError::from(FsError::BaseNotDirectory),
            RedirectError::NotADirectory
        );
        assert_eq!(
            RedirectError::from(FsError::Lock),
            RedirectError::Fs(FsError::Lock)
        );
        assert!(RedirectError::PathNotFound.is_not_found());
        assert!(!RedirectError::AccessDenied.is_not_found());
    }
}
