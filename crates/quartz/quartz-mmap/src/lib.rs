//! File-backed shared memory regions.
//!
//! A mapping created here is `MAP_SHARED`, so every process that maps the same
//! file sees the same bytes. Quartz uses it to place small coordination
//! structures (such as a cross-process event) where several processes can
//! reach them.

use memmap2::MmapMut;
use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

/// A read-write mapping of a whole file.
pub struct MmapFileMut {
    _file: File,
    mmap: MmapMut,
}

impl MmapFileMut {
    /// Create (or truncate) the file at `path`, size it to `size_bytes` and
    /// map it read-write. The new region is zero-filled.
    pub fn create_rw<P: AsRef<Path>>(path: P, size_bytes: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size_bytes as u64)?;

        // SAFETY: the file was just created by us; other processes may map it
        // too, which is the point, and all shared access goes through atomics.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { _file: file, mmap })
    }

    /// Open an existing file and map it read-write.
    ///
    /// Fails with `InvalidData` when the file is shorter than `min_bytes`.
    pub fn open_rw<P: AsRef<Path>>(path: P, min_bytes: usize) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        if (file.metadata()?.len() as usize) < min_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "mapped file is smaller than the expected layout",
            ));
        }

        // SAFETY: see `create_rw`.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self { _file: file, mmap })
    }

    /// Base address of the mapping, where callers place their shared header.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_open_shares_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region");

        let mut a = MmapFileMut::create_rw(&path, 64).unwrap();
        assert_eq!(a.len(), 64);
        unsafe { a.as_mut_ptr().add(3).write(0xAB) };

        let b = MmapFileMut::open_rw(&path, 64).unwrap();
        assert_eq!(unsafe { b.as_ptr().add(3).read() }, 0xAB);
    }

    #[test]
    fn open_rejects_short_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short");
        let _a = MmapFileMut::create_rw(&path, 8).unwrap();

        let err = MmapFileMut::open_rw(&path, 64).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
