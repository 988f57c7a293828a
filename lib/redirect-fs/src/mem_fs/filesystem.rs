//! This module contains the [`FileSystem`] type itself.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use super::file::FileHandle;
use super::{time, FileData, Node, NodeKind};
use crate::path::{self, fold, split_parent};
use crate::{
    DirEntry, FileType, FsError, Metadata, OpenOptions, OpenOptionsConfig, ReadDir, Result,
    VirtualFile,
};

/// The in-memory file system!
///
/// This `FileSystem` type can be cloned, it's a light copy of the
/// `FileSystemInner` (which is behind a `Arc` + `RwLock`).
#[derive(Clone, Default)]
pub struct FileSystem {
    inner: Arc<RwLock<FileSystemInner>>,
}

#[derive(Debug, Default)]
struct FileSystemInner {
    /// Keyed by the folded full path.
    nodes: BTreeMap<String, Node>,
}

/// A normalized path with its lookup key.
struct Located {
    path: String,
    key: String,
}

fn locate(path: &str) -> Result<Located> {
    let path = path::normalize_absolute(path).ok_or(FsError::InvalidInput)?;
    let key = fold(&path);
    Ok(Located { path, key })
}

fn is_root(path: &str) -> bool {
    split_parent(path).is_none()
}

fn root_metadata() -> Metadata {
    Metadata {
        ft: FileType {
            dir: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn child_prefix(key: &str) -> String {
    if key.ends_with('\\') {
        key.to_string()
    } else {
        format!("{key}\\")
    }
}

impl FileSystemInner {
    fn is_dir(&self, loc: &Located) -> bool {
        is_root(&loc.path) || self.nodes.get(&loc.key).is_some_and(Node::is_dir)
    }

    /// Checks that the parent of `loc` exists and is a directory.
    fn check_parent(&self, loc: &Located) -> Result<()> {
        let Some((parent, _)) = split_parent(&loc.path) else {
            return Err(FsError::AlreadyExists);
        };
        if is_root(parent) {
            return Ok(());
        }
        match self.nodes.get(&fold(parent)) {
            Some(node) if node.is_dir() => Ok(()),
            Some(_) => Err(FsError::BaseNotDirectory),
            None => Err(FsError::EntryNotFound),
        }
    }

    fn has_children(&self, key: &str) -> bool {
        let prefix = child_prefix(key);
        self.nodes
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix))
    }

    /// Keys of the node and everything below it.
    fn subtree(&self, key: &str) -> Vec<String> {
        let prefix = child_prefix(key);
        let mut keys = vec![key.to_string()];
        keys.extend(
            self.nodes
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .map(|(k, _)| k.clone()),
        );
        keys
    }

    fn resolve_symlink(&self, loc: Located) -> Result<Located> {
        match self.nodes.get(&loc.key) {
            Some(Node {
                kind: NodeKind::Symlink { target, .. },
                ..
            }) => locate(target),
            _ => Ok(loc),
        }
    }
}

impl FileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an entry read-only. Read-only entries can not be written,
    /// truncated, renamed or removed.
    pub fn set_readonly(&self, path: &str, readonly: bool) -> Result<()> {
        let loc = locate(path)?;
        let mut lock = self.inner.write().map_err(|_| FsError::Lock)?;
        let node = lock.nodes.get_mut(&loc.key).ok_or(FsError::EntryNotFound)?;
        node.readonly = readonly;
        Ok(())
    }

    /// Overrides the modification time of an entry, in nanoseconds since the
    /// Unix epoch.
    pub fn set_modified(&self, path: &str, modified: u64) -> Result<()> {
        let loc = locate(path)?;
        let mut lock = self.inner.write().map_err(|_| FsError::Lock)?;
        let node = lock.nodes.get_mut(&loc.key).ok_or(FsError::EntryNotFound)?;
        node.modified = modified;
        if let NodeKind::File(data) = &node.kind {
            data.lock().map_err(|_| FsError::Lock)?.modified = modified;
        }
        Ok(())
    }
}

impl crate::FileSystem for FileSystem {
    fn metadata(&self, path: &str) -> Result<Metadata> {
        let loc = locate(path)?;
        if is_root(&loc.path) {
            return Ok(root_metadata());
        }
        let lock = self.inner.read().map_err(|_| FsError::Lock)?;
        lock.nodes
            .get(&loc.key)
            .map(Node::metadata)
            .ok_or(FsError::EntryNotFound)
    }

    fn read_dir(&self, path: &str) -> Result<ReadDir> {
        let loc = locate(path)?;
        let lock = self.inner.read().map_err(|_| FsError::Lock)?;

        if !is_root(&loc.path) {
            match lock.nodes.get(&loc.key) {
                Some(node) if node.is_dir() => {}
                Some(_) => return Err(FsError::BaseNotDirectory),
                None => return Err(FsError::EntryNotFound),
            }
        }

        let prefix = child_prefix(&loc.key);
        let entries = lock
            .nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| !k[prefix.len()..].contains('\\'))
            .map(|(_, node)| DirEntry {
                name: split_parent(&node.path)
                    .map(|(_, name)| name.to_string())
                    .unwrap_or_else(|| node.path.clone()),
                path: node.path.clone(),
                metadata: node.metadata(),
            })
            .collect();

        Ok(ReadDir::new(entries))
    }

    fn create_dir(&self, path: &str) -> Result<()> {
        let loc = locate(path)?;
        let mut lock = self.inner.write().map_err(|_| FsError::Lock)?;
        lock.check_parent(&loc)?;
        if lock.nodes.contains_key(&loc.key) {
            return Err(FsError::AlreadyExists);
        }
        lock.nodes
            .insert(loc.key, Node::new(loc.path, NodeKind::Dir));
        Ok(())
    }

    fn remove_dir(&self, path: &str) -> Result<()> {
        let loc = locate(path)?;
        if is_root(&loc.path) {
            return Err(FsError::PermissionDenied);
        }
        let mut lock = self.inner.write().map_err(|_| FsError::Lock)?;
        match lock.nodes.get(&loc.key) {
            Some(node) if !node.is_dir() => return Err(FsError::BaseNotDirectory),
            Some(node) if node.readonly => return Err(FsError::PermissionDenied),
            Some(_) => {}
            None => return Err(FsError::EntryNotFound),
        }
        if lock.has_children(&loc.key) {
            return Err(FsError::DirectoryNotEmpty);
        }
        lock.nodes.remove(&loc.key);
        Ok(())
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        let loc = locate(path)?;
        let mut lock = self.inner.write().map_err(|_| FsError::Lock)?;
        match lock.nodes.get(&loc.key) {
            Some(node) if node.is_dir() => return Err(FsError::NotAFile),
            Some(node) if node.readonly => return Err(FsError::PermissionDenied),
            Some(_) => {}
            None if lock.check_parent(&loc).is_err() => return Err(FsError::BaseNotDirectory),
            None => return Err(FsError::EntryNotFound),
        }
        lock.nodes.remove(&loc.key);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = locate(from)?;
        let to = locate(to)?;
        let mut lock = self.inner.write().map_err(|_| FsError::Lock)?;

        let source_is_dir = match lock.nodes.get(&from.key) {
            Some(node) if node.readonly => return Err(FsError::PermissionDenied),
            Some(node) => node.is_dir(),
            None => return Err(FsError::EntryNotFound),
        };
        if from.key == to.key {
            // only the case changes
            if let Some(node) = lock.nodes.get_mut(&from.key) {
                node.path = to.path;
            }
            return Ok(());
        }
        lock.check_parent(&to)?;
        if to.key.starts_with(&child_prefix(&from.key)) {
            return Err(FsError::InvalidInput);
        }
        match lock.nodes.get(&to.key) {
            Some(node) if node.is_dir() || source_is_dir => return Err(FsError::AlreadyExists),
            Some(node) if node.readonly => return Err(FsError::PermissionDenied),
            _ => {}
        }

        let skip = from.path.chars().count();
        for key in lock.subtree(&from.key) {
            if let Some(mut node) = lock.nodes.remove(&key) {
                let tail_start = node
                    .path
                    .char_indices()
                    .nth(skip)
                    .map_or(node.path.len(), |(i, _)| i);
                node.path = format!("{}{}", to.path, &node.path[tail_start..]);
                lock.nodes.insert(fold(&node.path), node);
            }
        }
        Ok(())
    }

    fn copy_file(&self, from: &str, to: &str) -> Result<()> {
        let from = locate(from)?;
        let to = locate(to)?;
        let mut lock = self.inner.write().map_err(|_| FsError::Lock)?;
        let from = lock.resolve_symlink(from)?;

        let (bytes, modified) = match lock.nodes.get(&from.key) {
            Some(Node {
                kind: NodeKind::File(data),
                ..
            }) => {
                let data = data.lock().map_err(|_| FsError::Lock)?;
                (data.bytes.clone(), data.modified)
            }
            Some(_) => return Err(FsError::NotAFile),
            None => return Err(FsError::EntryNotFound),
        };
        lock.check_parent(&to)?;
        match lock.nodes.get(&to.key) {
            Some(node) if node.is_dir() => return Err(FsError::NotAFile),
            Some(node) if node.readonly => return Err(FsError::PermissionDenied),
            _ => {}
        }

        let mut node = Node::new(
            to.path,
            NodeKind::File(Arc::new(Mutex::new(FileData { bytes, modified }))),
        );
        node.modified = modified;
        lock.nodes.insert(to.key, node);
        Ok(())
    }

    fn hard_link(&self, original: &str, link: &str) -> Result<()> {
        let original = locate(original)?;
        let link = locate(link)?;
        let mut lock = self.inner.write().map_err(|_| FsError::Lock)?;

        let data = match lock.nodes.get(&original.key) {
            Some(Node {
                kind: NodeKind::File(data),
                ..
            }) => data.clone(),
            Some(_) => return Err(FsError::NotAFile),
            None => return Err(FsError::EntryNotFound),
        };
        lock.check_parent(&link)?;
        if lock.nodes.contains_key(&link.key) {
            return Err(FsError::AlreadyExists);
        }
        lock.nodes
            .insert(link.key, Node::new(link.path, NodeKind::File(data)));
        Ok(())
    }

    fn symlink(&self, original: &str, link: &str, is_dir: bool) -> Result<()> {
        let link = locate(link)?;
        let mut lock = self.inner.write().map_err(|_| FsError::Lock)?;
        lock.check_parent(&link)?;
        if lock.nodes.contains_key(&link.key) {
            return Err(FsError::AlreadyExists);
        }
        let kind = NodeKind::Symlink {
            target: original.to_string(),
            is_dir,
        };
        lock.nodes.insert(link.key, Node::new(link.path, kind));
        Ok(())
    }

    fn new_open_options(&self) -> OpenOptions<'_> {
        OpenOptions::new(self)
    }
}

impl crate::FileOpener for FileSystem {
    fn open(
        &self,
        path: &str,
        conf: &OpenOptionsConfig,
    ) -> Result<Box<dyn VirtualFile + Send + Sync + 'static>> {
        let loc = locate(path)?;
        let mut lock = self.inner.write().map_err(|_| FsError::Lock)?;
        let loc = lock.resolve_symlink(loc)?;
        let writable = conf.write() || conf.append();

        let data = match lock.nodes.get(&loc.key) {
            Some(node) => {
                let data = match &node.kind {
                    NodeKind::File(data) => data.clone(),
                    _ => return Err(FsError::NotAFile),
                };
                if conf.create_new() {
                    return Err(FsError::AlreadyExists);
                }
                if node.readonly && conf.would_mutate() {
                    return Err(FsError::PermissionDenied);
                }
                if conf.truncate() {
                    let mut inner = data.lock().map_err(|_| FsError::Lock)?;
                    inner.bytes.clear();
                    inner.modified = time();
                }
                data
            }
            None if is_root(&loc.path) => return Err(FsError::NotAFile),
            None if conf.create() || conf.create_new() => {
                lock.check_parent(&loc)?;
                let data = Arc::new(Mutex::new(FileData {
                    bytes: Vec::new(),
                    modified: time(),
                }));
                lock.nodes.insert(
                    loc.key.clone(),
                    Node::new(loc.path.clone(), NodeKind::File(data.clone())),
                );
                data
            }
            None => return Err(FsError::EntryNotFound),
        };

        Ok(Box::new(FileHandle::new(
            data,
            loc.path,
            conf.read(),
            writable,
            conf.append(),
        )))
    }
}

impl fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(lock) = self.inner.read() else {
            return f.write_str("mem_fs::FileSystem { <poisoned> }");
        };
        f.debug_struct("mem_fs::FileSystem")
            .field("nodes", &lock.nodes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ops, FileSystem as _};
    use std::io::{Read, Write};

    #[test]
    fn test_new_filesystem() {
        let fs = FileSystem::default();
        assert!(ops::is_dir(&fs, r"C:\"));
        assert!(ops::is_dir(&fs, r"\\server\share"));
        assert_eq!(fs.read_dir(r"C:\").unwrap().count(), 0);
    }

    #[test]
    fn test_create_dir() {
        let fs = FileSystem::default();
        assert_eq!(fs.create_dir(r"C:\a\b"), Err(FsError::EntryNotFound));
        assert_eq!(fs.create_dir(r"C:\A"), Ok(()));
        assert_eq!(fs.create_dir(r"c:\a"), Err(FsError::AlreadyExists));
        assert_eq!(fs.create_dir(r"C:\a\b"), Ok(()));
        assert_eq!(fs.create_dir("relative"), Err(FsError::InvalidInput));

        let names: Vec<_> = fs.read_dir(r"C:\").unwrap().map(|e| e.name).collect();
        assert_eq!(names, vec!["A".to_string()]);
    }

    #[test]
    fn test_remove_dir() {
        let fs = FileSystem::default();
        ops::create_dir_all(&fs, r"C:\a\b").unwrap();
        assert_eq!(fs.remove_dir(r"C:\a"), Err(FsError::DirectoryNotEmpty));
        assert_eq!(fs.remove_dir(r"C:\a\b"), Ok(()));
        assert_eq!(fs.remove_dir(r"C:\a"), Ok(()));
        assert_eq!(fs.remove_dir(r"C:\a"), Err(FsError::EntryNotFound));
        assert_eq!(fs.remove_dir(r"C:\"), Err(FsError::PermissionDenied));
    }

    #[test]
    fn test_open_and_write() {
        let fs = FileSystem::default();
        assert_eq!(
            fs.new_open_options().read(true).open(r"C:\nope.txt").unwrap_err(),
            FsError::EntryNotFound
        );

        let mut f = fs
            .new_open_options()
            .create_new(true)
            .write(true)
            .open(r"C:\File.txt")
            .unwrap();
        f.write_all(b"Hello").unwrap();
        assert_eq!(f.size(), 5);

        assert_eq!(
            fs.new_open_options()
                .create_new(true)
                .write(true)
                .open(r"C:\FILE.TXT")
                .unwrap_err(),
            FsError::AlreadyExists
        );

        let mut f = fs
            .new_open_options()
            .append(true)
            .open(r"c:\file.txt")
            .unwrap();
        f.write_all(b", World").unwrap();

        let mut f = fs.new_open_options().read(true).open(r"C:\file.txt").unwrap();
        let mut s = String::new();
        f.read_to_string(&mut s).unwrap();
        assert_eq!(s, "Hello, World");

        let entry = fs.read_dir(r"C:\").unwrap().next().unwrap();
        assert_eq!(entry.name, "File.txt");
        assert_eq!(entry.metadata.len, 12);
    }

    #[test]
    fn test_readonly_entries() {
        let fs = FileSystem::default();
        ops::write(&fs, r"C:\ro.txt", b"x").unwrap();
        fs.set_readonly(r"C:\ro.txt", true).unwrap();

        assert_eq!(fs.remove_file(r"C:\ro.txt"), Err(FsError::PermissionDenied));
        assert_eq!(
            fs.new_open_options()
                .write(true)
                .open(r"C:\ro.txt")
                .unwrap_err(),
            FsError::PermissionDenied
        );
        assert!(fs.new_open_options().read(true).open(r"C:\ro.txt").is_ok());
        assert!(fs.metadata(r"C:\ro.txt").unwrap().readonly);
    }

    #[test]
    fn test_rename_moves_subtree() {
        let fs = FileSystem::default();
        ops::write(&fs, r"C:\a\b\c.txt", b"c").unwrap();
        fs.rename(r"C:\a", r"C:\z").unwrap();
        assert!(!ops::exists(&fs, r"C:\a"));
        assert_eq!(ops::read_to_string(&fs, r"C:\z\b\c.txt").unwrap(), "c");

        ops::write(&fs, r"C:\other.txt", b"o").unwrap();
        fs.rename(r"C:\other.txt", r"C:\z\b\c.txt").unwrap();
        assert_eq!(ops::read_to_string(&fs, r"C:\z\b\c.txt").unwrap(), "o");
        assert_eq!(fs.rename(r"C:\z", r"C:\z\b\inner"), Err(FsError::InvalidInput));
    }

    #[test]
    fn test_copy_preserves_modified_time() {
        let fs = FileSystem::default();
        ops::write(&fs, r"C:\src.txt", b"data").unwrap();
        fs.set_modified(r"C:\src.txt", 42).unwrap();
        fs.copy_file(r"C:\src.txt", r"C:\dst.txt").unwrap();

        let meta = fs.metadata(r"C:\dst.txt").unwrap();
        assert_eq!(meta.modified, 42);
        assert_eq!(meta.len, 4);

        ops::write(&fs, r"C:\dst.txt", b"changed").unwrap();
        assert_eq!(ops::read_to_string(&fs, r"C:\src.txt").unwrap(), "data");
    }

    #[test]
    fn test_hard_links_share_content() {
        let fs = FileSystem::default();
        ops::write(&fs, r"C:\orig.txt", b"one").unwrap();
        fs.hard_link(r"C:\orig.txt", r"C:\link.txt").unwrap();
        ops::write(&fs, r"C:\link.txt", b"two").unwrap();
        assert_eq!(ops::read_to_string(&fs, r"C:\orig.txt").unwrap(), "two");
        assert_eq!(
            fs.hard_link(r"C:\orig.txt", r"C:\link.txt"),
            Err(FsError::AlreadyExists)
        );
    }

    #[test]
    fn test_symlink_is_followed_on_open() {
        let fs = FileSystem::default();
        ops::write(&fs, r"C:\target.txt", b"t").unwrap();
        fs.symlink(r"C:\target.txt", r"C:\link.txt", false).unwrap();
        assert!(fs.metadata(r"C:\link.txt").unwrap().ft.is_symlink());
        assert_eq!(ops::read_to_string(&fs, r"C:\link.txt").unwrap(), "t");
    }
}
