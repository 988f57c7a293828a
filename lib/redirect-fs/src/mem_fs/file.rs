use std::io::{self, Read, Seek, SeekFrom, Write};

use super::{time, SharedData};
use crate::{FsError, Result, VirtualFile};

/// An open handle onto an in-memory file.
#[derive(Debug)]
pub struct FileHandle {
    data: SharedData,
    path: String,
    cursor: u64,
    readable: bool,
    writable: bool,
    append_mode: bool,
}

impl FileHandle {
    pub(super) fn new(
        data: SharedData,
        path: String,
        readable: bool,
        writable: bool,
        append_mode: bool,
    ) -> Self {
        FileHandle {
            data,
            path,
            cursor: 0,
            readable,
            writable,
            append_mode,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

fn lock_error() -> io::Error {
    io::Error::other(FsError::Lock)
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.readable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("the file (at {}) is not open for reading", self.path),
            ));
        }

        let data = self.data.lock().map_err(|_| lock_error())?;
        let start = (self.cursor as usize).min(data.bytes.len());
        let amt = buf.len().min(data.bytes.len() - start);
        buf[..amt].copy_from_slice(&data.bytes[start..start + amt]);
        self.cursor += amt as u64;
        Ok(amt)
    }
}

impl Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("the file (at {}) is not open for writing", self.path),
            ));
        }

        let mut data = self.data.lock().map_err(|_| lock_error())?;
        if self.append_mode {
            self.cursor = data.bytes.len() as u64;
        }
        let start = self.cursor as usize;
        let end = start + buf.len();
        if data.bytes.len() < end {
            data.bytes.resize(end, 0);
        }
        data.bytes[start..end].copy_from_slice(buf);
        data.modified = time();
        self.cursor = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for FileHandle {
    fn seek(&mut self, position: SeekFrom) -> io::Result<u64> {
        let len = self.size() as i64;
        let next = match position {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => len + offset,
            SeekFrom::Current(offset) => self.cursor as i64 + offset,
        };
        if next < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seeking before the byte 0",
            ));
        }
        self.cursor = next as u64;
        Ok(self.cursor)
    }
}

impl VirtualFile for FileHandle {
    fn size(&self) -> u64 {
        self.data
            .lock()
            .map(|d| d.bytes.len() as u64)
            .unwrap_or_default()
    }

    fn set_len(&mut self, new_size: u64) -> Result<()> {
        if !self.writable {
            return Err(FsError::PermissionDenied);
        }
        let mut data = self.data.lock().map_err(|_| FsError::Lock)?;
        data.bytes.resize(new_size as usize, 0);
        data.modified = time();
        Ok(())
    }
}
