//! Adapter between host filesystem callbacks and the storage API.
//!
//! The host binding (callback table, argument parsing, daemonization) lives
//! outside this crate; what it needs from us is one method per callback,
//! taking paths and returning either the result or the negative errno the
//! host library hands back to the kernel. There is no per-file handle state:
//! every call resolves its path anew, and the single-threaded contract of
//! the storage layer carries over to the adapter.

use imgfs_api::fs::{DirectorySupport, InodeSupport, PathSupport};
use log::debug;
use std::path::Path;

use super::error_fs::PathLayerError;
use super::path_support::PathFS;

/// Result of a host callback; the error is a negative errno value.
pub type CallResult<T = ()> = Result<T, i32>;

/// File metadata as reported to the host on `getattr`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// File type and permission bits
    pub mode: u32,
    /// File size in bytes
    pub size: u64,
    /// Link count; for directories 2 plus the number of child directories
    pub nlink: u32,
    /// Inode number
    pub ino: u64,
    /// Owner; always the uid of the process hosting the filesystem
    pub uid: u32,
}

/// Negative errno for a storage failure
fn neg(e: PathLayerError) -> i32 {
    -e.errno()
}

/// The mounted filesystem as the host callbacks see it
#[derive(Debug)]
pub struct HostFs {
    fs: PathFS,
}

impl HostFs {
    /// Wrap an already-mounted storage layer
    pub fn new(fs: PathFS) -> HostFs {
        HostFs { fs }
    }

    /// Open or create the image at `image_path` and wrap it
    pub fn init<P: AsRef<Path>>(image_path: P) -> CallResult<HostFs> {
        PathFS::init(image_path).map(HostFs::new).map_err(neg)
    }

    /// Borrow the underlying storage layer
    pub fn storage(&mut self) -> &mut PathFS {
        &mut self.fs
    }

    /// Existence check; the access mask is not enforced
    pub fn access(&self, path: &str, _mask: i32) -> CallResult {
        self.fs.resolve_path(path).map(|_| ()).map_err(neg)
    }

    /// File metadata. Directory link counts follow the usual convention:
    /// two for the directory itself plus one per child directory's "..".
    pub fn getattr(&self, path: &str) -> CallResult<FileStat> {
        let inum = self.fs.resolve_path(path).map_err(neg)?;
        let node = self.fs.i_get(inum).map_err(neg)?;

        let mut nlink = 1;
        if node.is_dir() {
            nlink = 2;
            for name in self.fs.dir_list(&node).map_err(neg)? {
                let child = self.fs.dir_lookup(&node, &name).map_err(neg)?;
                if self.fs.i_get(child).map_err(neg)?.is_dir() {
                    nlink += 1;
                }
            }
        }

        Ok(FileStat {
            mode: node.mode,
            size: node.size as u64,
            nlink,
            ino: inum,
            uid: unsafe { libc::getuid() },
        })
    }

    /// Directory listing: "." and ".." explicitly, then the live entries
    pub fn readdir(&self, path: &str) -> CallResult<Vec<String>> {
        debug!("readdir({})", path);
        let inum = self.fs.resolve_path(path).map_err(neg)?;
        let node = self.fs.i_get(inum).map_err(neg)?;
        if !node.is_dir() {
            return Err(-libc::ENOTDIR);
        }
        let mut names = vec![".".to_string(), "..".to_string()];
        names.extend(self.fs.dir_list(&node).map_err(neg)?);
        Ok(names)
    }

    /// Create a regular file
    pub fn mknod(&mut self, path: &str, mode: u32) -> CallResult {
        self.fs.mknod(path, mode).map(|_| ()).map_err(neg)
    }

    /// Create a directory
    pub fn mkdir(&mut self, path: &str, mode: u32) -> CallResult {
        self.fs.mkdir(path, mode).map(|_| ()).map_err(neg)
    }

    /// Remove a file
    pub fn unlink(&mut self, path: &str) -> CallResult {
        self.fs.unlink(path).map_err(neg)
    }

    /// Remove an empty directory
    pub fn rmdir(&mut self, path: &str) -> CallResult {
        self.fs.rmdir(path).map_err(neg)
    }

    /// Move a file or directory
    pub fn rename(&mut self, from: &str, to: &str) -> CallResult {
        self.fs.rename(from, to).map_err(neg)
    }

    /// Set the file size
    pub fn truncate(&mut self, path: &str, size: u64) -> CallResult {
        self.fs.truncate(path, size).map_err(neg)
    }

    /// Open check: read-only opens always pass, writing opens require a
    /// write bit in the mode
    pub fn open(&self, path: &str, flags: i32) -> CallResult {
        let inum = self.fs.resolve_path(path).map_err(neg)?;
        let node = self.fs.i_get(inum).map_err(neg)?;
        if (flags & libc::O_ACCMODE) != libc::O_RDONLY && node.mode & 0o222 == 0 {
            return Err(-libc::EACCES);
        }
        Ok(())
    }

    /// Read file contents into `buf`; returns the number of bytes read
    pub fn read(&mut self, path: &str, buf: &mut [u8], offset: u64) -> CallResult<usize> {
        self.fs.read(path, buf, offset).map_err(neg)
    }

    /// Write `buf` into the file; returns the number of bytes written
    pub fn write(&mut self, path: &str, buf: &[u8], offset: u64) -> CallResult<usize> {
        self.fs.write(path, buf, offset).map_err(neg)
    }

    /// Stamp atime and mtime with the current second. The timestamps the
    /// host hands over are ignored.
    pub fn utimens(&mut self, path: &str) -> CallResult {
        self.fs.set_times(path).map_err(neg)
    }

    /// Hard links are not supported
    pub fn link(&mut self, from: &str, to: &str) -> CallResult {
        debug!("link({} => {}) -> EPERM", from, to);
        Err(-libc::EPERM)
    }

    /// Permission changes are not supported
    pub fn chmod(&mut self, path: &str, mode: u32) -> CallResult {
        debug!("chmod({}, {:04o}) -> EPERM", path, mode);
        Err(-libc::EPERM)
    }

    /// No ioctls are supported
    pub fn ioctl(&mut self, path: &str, cmd: i32) -> CallResult {
        debug!("ioctl({}, {}) -> EPERM", path, cmd);
        Err(-libc::EPERM)
    }
}
