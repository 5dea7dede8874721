//! Traits implemented by the filesystem layers.
//!
//! Each trait extends the one before it, mirroring how the layers stack:
//! every layer struct wraps the previous one and re-exposes the lower traits
//! by delegation, so the top of the stack offers the whole surface. The
//! contract throughout is single-threaded: no two operations are ever in
//! flight at once, and a multi-threaded host must serialize calls behind one
//! mutex.

use super::{
    pager::ImagePager,
    types::{Block, Geometry, Inode},
};
use std::{error, path::Path};

/// Mounting, unmounting and geometry validation; the base trait every layer
/// implements. The associated error type is shared by all the traits below.
pub trait FileSysSupport: Sized {
    /// Error type of this implementation
    type Error: error::Error;

    /// Check that `geo` describes a well-formed image: the standard block
    /// size, the inode table directly after the header, a data area that
    /// exists, and a block count the block bitmap region can describe.
    fn geometry_valid(geo: &Geometry) -> bool;

    /// Create a fresh image at `path` with the given geometry and mount it.
    /// Layers add their own setup on top: the block layer reserves the
    /// header and inode-table bits in the block bitmap, and the path layer
    /// initializes the root directory.
    fn mkfs<P: AsRef<Path>>(path: P, geo: &Geometry) -> Result<Self, Self::Error>;

    /// Mount an already-opened image, deriving the geometry from its block
    /// count.
    fn mountfs(pager: ImagePager) -> Result<Self, Self::Error>;

    /// Unmount the filesystem, yielding back the underlying pager.
    fn unmountfs(self) -> ImagePager;

    /// Synchronize the image mapping with the backing file.
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Block access and the allocator state kept in the header block.
pub trait BlockSupport: FileSysSupport {
    /// Read block `i` of the image
    fn b_get(&self, i: u64) -> Result<Block, Self::Error>;

    /// Write the given block back at its own index
    fn b_put(&mut self, b: &Block) -> Result<(), Self::Error>;

    /// Zero the contents of data block `i` without touching the bitmap.
    /// Errors on header or inode-table blocks.
    fn b_zero(&mut self, i: u64) -> Result<(), Self::Error>;

    /// Allocate the first free block (lowest index), set its bitmap bit and
    /// zero its contents. Returns the raw block index. Errors when the image
    /// is full.
    fn b_alloc(&mut self) -> Result<u64, Self::Error>;

    /// Free data block `i` by clearing its bitmap bit. Errors when `i` is
    /// out of range, pre-reserved (header or inode table) or already free.
    fn b_free(&mut self, i: u64) -> Result<(), Self::Error>;

    /// Read the persisted root inode number from the header block
    fn root_get(&self) -> Result<u64, Self::Error>;

    /// Persist `inum` as the root inode number in the header block
    fn root_put(&mut self, inum: u64) -> Result<(), Self::Error>;
}

/// The inode table and its allocator.
pub trait InodeSupport: BlockSupport {
    /// Read inode `i` from the table. The returned record's `inum` field is
    /// set from the table position. Errors when `i` is out of range.
    fn i_get(&self, i: u64) -> Result<Inode, Self::Error>;

    /// Write `ino` back to the table at its own number
    fn i_put(&mut self, ino: &Inode) -> Result<(), Self::Error>;

    /// Allocate the first free inode: set its bitmap bit, zero the record,
    /// fill in the number, a reference count of 1 and the current wall-clock
    /// second for all three timestamps. The caller sets `mode` and attaches
    /// a data block. Errors when no inode is free.
    fn i_alloc(&mut self) -> Result<u64, Self::Error>;

    /// Free inode `i`: clear its bitmap bit and release its data block if
    /// one is attached. Does not inspect or clear `refs`; callers remove the
    /// referencing directory entries first. Errors when `i` is out of range
    /// or already free.
    fn i_free(&mut self, i: u64) -> Result<(), Self::Error>;
}

/// Directories: a single data block holding a packed array of fixed-width
/// entries. The live prefix is the first `size / DIRENTRY_SIZE` slots; a
/// slot inside it whose first name byte is NUL is a tombstone.
pub trait DirectorySupport: InodeSupport {
    /// Find `name` in the live prefix of `dir` and return its inode number.
    /// Errors when `dir` is not a directory or the name is absent.
    fn dir_lookup(&self, dir: &Inode, name: &str) -> Result<u64, Self::Error>;

    /// Insert the entry `name -> inum` into `dir`: a tombstone slot inside
    /// the live prefix is reused if one exists, otherwise the entry is
    /// appended and `size` grows by one slot. The name is truncated to fit
    /// the entry; duplicates are *not* rejected here, callers look the name
    /// up first. Updates the directory's mtime and persists the inode.
    /// Errors when `dir` is not a directory or the block is full.
    fn dir_put(&mut self, dir: &mut Inode, name: &str, inum: u64) -> Result<(), Self::Error>;

    /// Remove the entry `name` from `dir`: the name is cleared, the
    /// following entries shift one slot left, the vacated final slot is
    /// zeroed and `size` shrinks by one slot. Updates mtime and persists the
    /// inode. Errors when the name is absent.
    fn dir_delete(&mut self, dir: &mut Inode, name: &str) -> Result<(), Self::Error>;

    /// Names of the live entries of `dir`, excluding "." and ".."
    fn dir_list(&self, dir: &Inode) -> Result<Vec<String>, Self::Error>;
}

/// The path-addressed storage operations the host adapter drives.
///
/// Paths are absolute, "/"-separated, and are not normalized: "." and ".."
/// in user-supplied paths are looked up like any other name (directories do
/// carry real "." and ".." entries, so they resolve as expected).
pub trait PathSupport: DirectorySupport {
    /// Resolve `path` to an inode number. "/" resolves to the persisted
    /// root. Errors with the not-a-directory error when an intermediate
    /// component is no directory and the not-found error when a component
    /// is absent.
    fn resolve_path(&self, path: &str) -> Result<u64, Self::Error>;

    /// Create a regular file at `path` with the given mode; returns the new
    /// inode number.
    fn mknod(&mut self, path: &str, mode: u32) -> Result<u64, Self::Error>;

    /// Create the file `name` with the given mode inside the directory
    /// `parent`. Allocates an inode and a data block; either allocation
    /// failing rolls the other back and reports no-space.
    fn mknod_at(&mut self, parent: u64, name: &str, mode: u32) -> Result<u64, Self::Error>;

    /// Create a directory at `path`; returns the new inode number.
    fn mkdir(&mut self, path: &str, mode: u32) -> Result<u64, Self::Error>;

    /// Create the directory `name` inside the directory `parent`, with the
    /// type bits forced to directory and the block initialized with "." and
    /// ".." entries.
    fn mkdir_at(&mut self, parent: u64, name: &str, mode: u32) -> Result<u64, Self::Error>;

    /// Remove the file at `path`: the directory entry goes first, then the
    /// inode and its data block are released. Directories are refused with
    /// the is-a-directory error.
    fn unlink(&mut self, path: &str) -> Result<(), Self::Error>;

    /// Remove the directory at `path` if it holds nothing but "." and "..",
    /// then flush the image.
    fn rmdir(&mut self, path: &str) -> Result<(), Self::Error>;

    /// Move the file or directory at `from` to `to`. The new entry is
    /// inserted before the old one is deleted; a failing delete removes the
    /// inserted entry again. An existing destination name is refused.
    fn rename(&mut self, from: &str, to: &str) -> Result<(), Self::Error>;

    /// Read from the file at `path` into `buf`, starting at byte `offset`;
    /// returns the number of bytes read (0 at or past end of file) and
    /// updates the access time.
    fn read(&mut self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize, Self::Error>;

    /// Write `buf` into the file at `path` at byte `offset`, growing `size`
    /// when the write ends past it. Files own a single block, so writes
    /// ending past `BLOCK_SIZE` are refused with the no-space error.
    fn write(&mut self, path: &str, buf: &[u8], offset: u64) -> Result<usize, Self::Error>;

    /// Set the size of the file at `path` without moving any blocks. Sizes
    /// beyond one block are refused.
    fn truncate(&mut self, path: &str, size: u64) -> Result<(), Self::Error>;

    /// Stamp the current second into atime and mtime of the file at `path`
    fn set_times(&mut self, path: &str) -> Result<(), Self::Error>;
}
