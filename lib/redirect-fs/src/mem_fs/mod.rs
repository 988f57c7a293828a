//! An in-memory filesystem with Windows naming rules: case-insensitive,
//! case-preserving, with every drive letter and UNC share always present.

mod file;
mod filesystem;

pub use file::FileHandle;
pub use filesystem::FileSystem;

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{FileType, Metadata};

#[derive(Debug)]
pub(crate) struct FileData {
    pub(crate) bytes: Vec<u8>,
    pub(crate) modified: u64,
}

pub(crate) type SharedData = Arc<Mutex<FileData>>;

#[derive(Debug, Clone)]
enum NodeKind {
    Dir,
    /// Hard links share the same data.
    File(SharedData),
    Symlink { target: String, is_dir: bool },
}

#[derive(Debug, Clone)]
struct Node {
    /// Full path with its original case.
    path: String,
    kind: NodeKind,
    readonly: bool,
    created: u64,
    modified: u64,
}

impl Node {
    fn new(path: String, kind: NodeKind) -> Self {
        let now = time();
        Node {
            path,
            kind,
            readonly: false,
            created: now,
            modified: now,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir)
    }

    fn metadata(&self) -> Metadata {
        let (ft, len, modified) = match &self.kind {
            NodeKind::Dir => (
                FileType {
                    dir: true,
                    ..Default::default()
                },
                0,
                self.modified,
            ),
            NodeKind::File(data) => {
                let (len, modified) = data
                    .lock()
                    .map(|d| (d.bytes.len() as u64, d.modified))
                    .unwrap_or((0, self.modified));
                (
                    FileType {
                        file: true,
                        ..Default::default()
                    },
                    len,
                    modified,
                )
            }
            NodeKind::Symlink { target, is_dir } => (
                FileType {
                    dir: *is_dir,
                    file: !*is_dir,
                    symlink: true,
                },
                target.len() as u64,
                self.modified,
            ),
        };

        Metadata {
            ft,
            accessed: modified,
            created: self.created,
            modified,
            len,
            readonly: self.readonly,
        }
    }
}

pub(crate) fn time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
