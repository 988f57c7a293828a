//! Deletion markers.
//!
//! Deleting something that ships with the package (or that lives in a
//! location the process may not modify) can not remove it physically.
//! Instead a marker records that the logical path is gone so that lookups
//! and listings stop reporting it.

use std::fmt;
use std::sync::Arc;

use crate::path::{self, fold, split_parent};
use crate::{ops, FileSystem, FsError};

/// Prefix of the marker file recorded next to the name it hides.
pub const WHITEOUT_PREFIX: &str = ".wh.";

pub trait DeletionMarkers: fmt::Debug + Send + Sync {
    /// Is `path` (or one of its parent directories) recorded as deleted?
    fn is_marked_deleted(&self, path: &str) -> bool;
    fn mark_deleted(&self, path: &str) -> Result<(), FsError>;
    fn unmark_deleted(&self, path: &str) -> Result<(), FsError>;
    /// Names directly inside `dir` that are recorded as deleted.
    fn deleted_names(&self, dir: &str) -> Vec<String>;
}

/// Returns the hidden name if `name` is a whiteout marker.
pub fn is_white_out(name: &str) -> Option<&str> {
    name.strip_prefix(WHITEOUT_PREFIX).filter(|n| !n.is_empty())
}

/// Markers stored as `.wh.<name>` files below a marker root, in a tree
/// shaped like the paths they hide: `C:\a\b` is recorded as
/// `<root>\C\a\.wh.b` and `\\srv\share\a` as `<root>\UNC\srv\share\.wh.a`.
#[derive(Debug, Clone)]
pub struct WhiteoutMarkers {
    fs: Arc<dyn FileSystem>,
    root: String,
}

impl WhiteoutMarkers {
    pub fn new(fs: Arc<dyn FileSystem>, root: impl Into<String>) -> Self {
        WhiteoutMarkers {
            fs,
            root: root.into(),
        }
    }

    /// The conventional marker root: a `DeletionMarkers` directory next to
    /// the writable root.
    pub fn default_root(writable_root: &str) -> String {
        match split_parent(writable_root) {
            Some((parent, _)) => path::join(parent, "DeletionMarkers"),
            None => path::join(writable_root, "DeletionMarkers"),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Directory below the marker root that shadows `dir`.
    fn shadow_dir(&self, dir: &str) -> Option<String> {
        let dir = path::normalize_absolute(dir)?;
        let shadow = match dir.strip_prefix(r"\\") {
            Some(unc) => path::join(&path::join(&self.root, "UNC"), unc),
            None => {
                let drive = dir[..1].to_ascii_uppercase();
                path::join(&path::join(&self.root, &drive), &dir[2..])
            }
        };
        Some(shadow)
    }

    fn marker_path(&self, path: &str) -> Option<String> {
        let path = path::normalize_absolute(path)?;
        let (parent, name) = split_parent(&path)?;
        let shadow = self.shadow_dir(parent)?;
        Some(path::join(&shadow, &format!("{WHITEOUT_PREFIX}{name}")))
    }

    fn has_marker(&self, path: &str) -> bool {
        self.marker_path(path)
            .is_some_and(|marker| ops::is_file(self.fs.as_ref(), &marker))
    }
}

impl DeletionMarkers for WhiteoutMarkers {
    fn is_marked_deleted(&self, path: &str) -> bool {
        let Some(mut current) = path::normalize_absolute(path) else {
            return false;
        };
        loop {
            if self.has_marker(&current) {
                tracing::trace!(path, marked=%current, "Path is marked deleted");
                return true;
            }
            match split_parent(&current) {
                Some((parent, _)) => current = parent.to_string(),
                None => return false,
            }
        }
    }

    fn mark_deleted(&self, path: &str) -> Result<(), FsError> {
        let marker = self.marker_path(path).ok_or(FsError::InvalidInput)?;
        if let Some((dir, _)) = split_parent(&marker) {
            ops::create_dir_all(self.fs.as_ref(), dir)?;
        }
        ops::touch(self.fs.as_ref(), &marker)?;
        tracing::debug!(path, marker=%marker, "Marked path as deleted");
        Ok(())
    }

    fn unmark_deleted(&self, path: &str) -> Result<(), FsError> {
        let Some(marker) = self.marker_path(path) else {
            return Ok(());
        };
        match self.fs.remove_file(&marker) {
            Ok(()) => {
                tracing::debug!(path, "Cleared deletion marker");
                Ok(())
            }
            Err(FsError::EntryNotFound) | Err(FsError::BaseNotDirectory) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn deleted_names(&self, dir: &str) -> Vec<String> {
        let Some(shadow) = self.shadow_dir(dir) else {
            return Vec::new();
        };
        match self.fs.read_dir(&shadow) {
            Ok(entries) => entries
                .filter(|e| e.metadata.is_file())
                .filter_map(|e| is_white_out(&e.name).map(str::to_string))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Folded names, for membership checks against [`DeletionMarkers::deleted_names`].
pub(crate) fn folded_names(names: Vec<String>) -> std::collections::HashSet<String> {
    names.iter().map(|n| fold(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem_fs::FileSystem as MemFS;

    fn markers() -> (MemFS, WhiteoutMarkers) {
        let fs = MemFS::default();
        let markers = WhiteoutMarkers::new(Arc::new(fs.clone()), r"D:\Markers");
        (fs, markers)
    }

    #[test]
    fn marker_files_shadow_the_hidden_path() {
        let (fs, markers) = markers();
        markers.mark_deleted(r"C:\Program Files\App\a.txt").unwrap();
        assert!(ops::is_file(&fs, r"D:\Markers\C\Program Files\App\.wh.a.txt"));

        markers.mark_deleted(r"\\srv\share\dir\b.txt").unwrap();
        assert!(ops::is_file(&fs, r"D:\Markers\UNC\srv\share\dir\.wh.b.txt"));
    }

    #[test]
    fn marks_are_case_insensitive_and_cover_children() {
        let (_fs, markers) = markers();
        markers.mark_deleted(r"C:\Program Files\App").unwrap();
        assert!(markers.is_marked_deleted(r"c:\program files\APP"));
        assert!(markers.is_marked_deleted(r"C:\Program Files\App\sub\file.txt"));
        assert!(!markers.is_marked_deleted(r"C:\Program Files\Apple"));

        markers.unmark_deleted(r"C:\PROGRAM FILES\app").unwrap();
        assert!(!markers.is_marked_deleted(r"C:\Program Files\App"));
        markers.unmark_deleted(r"C:\Program Files\App").unwrap();
    }

    #[test]
    fn deleted_names_lists_hidden_entries() {
        let (_fs, markers) = markers();
        markers.mark_deleted(r"C:\dir\one.txt").unwrap();
        markers.mark_deleted(r"C:\dir\Two.txt").unwrap();
        markers.mark_deleted(r"C:\dir\sub\three.txt").unwrap();

        let mut names = markers.deleted_names(r"C:\dir");
        names.sort();
        assert_eq!(names, vec!["Two.txt".to_string(), "one.txt".to_string()]);
        assert!(markers.deleted_names(r"C:\elsewhere").is_empty());
    }

    #[test]
    fn default_root_is_a_sibling_of_the_writable_root() {
        assert_eq!(
            WhiteoutMarkers::default_root(r"C:\Users\u\LocalCache\Local\WritablePackageRoot"),
            r"C:\Users\u\LocalCache\Local\DeletionMarkers"
        );
    }
}
