//! Find-first / find-next over every candidate directory of a path.
//!
//! Directories are visited in [`PathRole`] order. A name produced by a
//! higher priority directory hides the same name further down, and names
//! recorded as deleted in the logical directory are hidden unless they come
//! from the writable location.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

use crate::error::RedirectError;
use crate::path::{fold, fold_char, PathCategory};
use crate::resolve::{Candidate, PathRole, ResolvedPathSet};
use crate::whiteout::{folded_names, DeletionMarkers};
use crate::{DirEntry, FileAttributes, FileSystem, FsError, Metadata};

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct EnumerationEntry {
    pub name: String,
    pub source_role: PathRole,
    pub metadata: Metadata,
}

impl EnumerationEntry {
    pub fn attributes(&self) -> FileAttributes {
        self.metadata.attributes()
    }

    pub fn is_dir(&self) -> bool {
        self.metadata.is_dir()
    }
}

/// Does `name` match a `*` / `?` wildcard pattern, ignoring case?
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    if pattern == "*" || pattern == "*.*" {
        return true;
    }

    let pattern: Vec<char> = pattern.chars().map(fold_char).collect();
    let name: Vec<char> = name.chars().map(fold_char).collect();

    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some('?') => {
                p += 1;
                n += 1;
            }
            Some(c) if *c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

/// A running enumeration. Iterating it is find-next; `None` means there are
/// no more files.
pub struct FindHandle {
    fs: Arc<dyn FileSystem>,
    pattern: String,
    dirs: VecDeque<Candidate>,
    current: Option<(PathRole, std::vec::IntoIter<DirEntry>)>,
    seen: HashSet<String>,
    deleted: HashSet<String>,
    writable_role: Option<PathRole>,
    first: Option<EnumerationEntry>,
    listed_any: bool,
    denied: bool,
}

impl std::fmt::Debug for FindHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FindHandle")
            .field("pattern", &self.pattern)
            .field("remaining_dirs", &self.dirs.len())
            .field("seen", &self.seen.len())
            .finish()
    }
}

/// Starts an enumeration of `pattern` inside the directory `dir` resolves to.
///
/// The first matching entry is located right away so that failures are
/// reported here rather than on the first call to `next`.
pub fn find_first(
    dir: &ResolvedPathSet,
    pattern: &str,
    fs: Arc<dyn FileSystem>,
    markers: &dyn DeletionMarkers,
) -> Result<FindHandle, RedirectError> {
    match dir.classified.category {
        PathCategory::Unknown => return Err(RedirectError::InvalidPath),
        category if !category.is_redirectable() => return Err(RedirectError::Unsupported),
        _ => {}
    }
    if pattern.is_empty() {
        return Err(RedirectError::FileNotFound);
    }

    let logical = dir.logical_path();
    let dir_deleted = dir.is_virtualized() && markers.is_marked_deleted(logical);
    let dirs: VecDeque<Candidate> = dir
        .iter()
        .filter(|c| !dir_deleted || dir.is_writable_role(c.role))
        .cloned()
        .collect();
    let deleted = if dir.is_virtualized() {
        folded_names(markers.deleted_names(logical))
    } else {
        HashSet::new()
    };

    let mut handle = FindHandle {
        fs,
        pattern: pattern.to_string(),
        dirs,
        current: None,
        seen: HashSet::new(),
        deleted,
        writable_role: dir.writable().map(|c| c.role),
        first: None,
        listed_any: false,
        denied: false,
    };

    match handle.advance() {
        Some(entry) => {
            handle.first = Some(entry);
            Ok(handle)
        }
        None if handle.listed_any => Err(RedirectError::FileNotFound),
        None if handle.denied => Err(RedirectError::AccessDenied),
        None => Err(RedirectError::PathNotFound),
    }
}

impl FindHandle {
    /// Opens the next candidate directory, returning `false` once they are
    /// all used up.
    fn open_next_dir(&mut self) -> bool {
        while let Some(candidate) = self.dirs.pop_front() {
            match self.fs.read_dir(&candidate.path) {
                Ok(read_dir) => {
                    let mut entries: Vec<DirEntry> = read_dir.collect();
                    entries.sort_by_cached_key(|e| fold(&e.name));
                    tracing::trace!(
                        dir=%candidate.path,
                        role=?candidate.role,
                        entries=entries.len(),
                        "Listing candidate directory",
                    );
                    self.listed_any = true;
                    self.current = Some((candidate.role, entries.into_iter()));
                    return true;
                }
                Err(FsError::EntryNotFound) | Err(FsError::BaseNotDirectory) => {
                    tracing::trace!(dir=%candidate.path, role=?candidate.role, "Candidate directory absent");
                }
                Err(FsError::PermissionDenied) => {
                    tracing::debug!(dir=%candidate.path, role=?candidate.role, "Candidate directory denied");
                    self.denied = true;
                }
                Err(error) => {
                    tracing::debug!(
                        dir=%candidate.path,
                        role=?candidate.role,
                        %error,
                        "Unable to list candidate directory, skipping",
                    );
                }
            }
        }
        false
    }

    fn advance(&mut self) -> Option<EnumerationEntry> {
        loop {
            let Some((role, entries)) = self.current.as_mut() else {
                if self.open_next_dir() {
                    continue;
                }
                return None;
            };
            let role = *role;

            let Some(entry) = entries.next() else {
                self.current = None;
                continue;
            };

            if !wildcard_match(&self.pattern, &entry.name) {
                continue;
            }
            let key = fold(&entry.name);
            if Some(role) != self.writable_role && self.deleted.contains(&key) {
                tracing::trace!(name=%entry.name, ?role, "Skipping entry marked deleted");
                continue;
            }
            if !self.seen.insert(key) {
                tracing::trace!(name=%entry.name, ?role, "Skipping entry hidden by a higher priority directory");
                continue;
            }

            return Some(EnumerationEntry {
                name: entry.name,
                source_role: role,
                metadata: entry.metadata,
            });
        }
    }
}

impl Iterator for FindHandle {
    type Item = EnumerationEntry;

    fn next(&mut self) -> Option<EnumerationEntry> {
        if let Some(first) = self.first.take() {
            return Some(first);
        }
        self.advance()
    }
}
