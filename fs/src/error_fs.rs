//! Error types of the filesystem layers, one enum per layer.
//!
//! Each layer wraps the one below it with `#[from]`, so `?` carries failures
//! up the stack unchanged. At the host boundary the whole chain maps onto
//! POSIX errno values through [`PathLayerError::errno`].

use imgfs_api::error::ImageError;
use thiserror::Error;

/// Errors of the block layer
#[derive(Error, Debug)]
pub enum BlockLayerError {
    /// Failure in the image pager or a block accessor
    #[error("image layer failure")]
    Image(#[from] ImageError),

    /// The image geometry does not describe a mountable filesystem
    #[error("invalid image geometry: {0}")]
    BadGeometry(&'static str),

    /// A block index outside the image
    #[error("block index {0} out of range")]
    BlockOutOfRange(u64),

    /// A header or inode-table block where a data block is required
    #[error("block {0} is not a data block")]
    ReservedBlock(u64),

    /// Freeing a block that is not allocated
    #[error("block {0} is already free")]
    BlockNotAllocated(u64),

    /// The block bitmap has no clear bit left
    #[error("no free data blocks left")]
    NoFreeBlocks,
}

/// Errors of the inode layer
#[derive(Error, Debug)]
pub enum InodeLayerError {
    /// Failure in the block layer
    #[error("block layer failure")]
    Block(#[from] BlockLayerError),

    /// Failure in a record accessor
    #[error("image layer failure")]
    Image(#[from] ImageError),

    /// An inode number outside the table
    #[error("inode {0} out of range")]
    InodeOutOfRange(u64),

    /// Freeing an inode that is not allocated
    #[error("inode {0} is already free")]
    InodeNotAllocated(u64),

    /// The inode bitmap has no clear bit left
    #[error("no free inodes left")]
    NoFreeInodes,
}

/// Errors of the directory layer
#[derive(Error, Debug)]
pub enum DirLayerError {
    /// Failure in the inode layer
    #[error("inode layer failure")]
    Inode(#[from] InodeLayerError),

    /// Failure in an entry accessor
    #[error("image layer failure")]
    Image(#[from] ImageError),

    /// A directory operation on a non-directory inode
    #[error("inode {0} is not a directory")]
    NotADirectory(u64),

    /// No live entry carries the given name
    #[error("no entry named {0:?}")]
    EntryNotFound(String),

    /// The live prefix already fills the directory block
    #[error("directory block is full")]
    DirectoryFull,
}

/// Errors of the path layer; the error type the host adapter sees
#[derive(Error, Debug)]
pub enum PathLayerError {
    /// Failure in the directory layer
    #[error("directory layer failure")]
    Dir(#[from] DirLayerError),

    /// Failure in the image pager
    #[error("image layer failure")]
    Image(#[from] ImageError),

    /// A malformed argument: relative path, empty basename, oversized size
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The path does not name an existing file or directory
    #[error("no such file or directory")]
    NotFound,

    /// A path component or target that must be a directory is not
    #[error("not a directory")]
    NotADirectory,

    /// A file operation applied to a directory
    #[error("is a directory")]
    IsADirectory,

    /// Creating a name that already exists
    #[error("name already exists")]
    AlreadyExists,

    /// No free inode, no free data block, or a full directory block
    #[error("no space left on image")]
    NoSpace,

    /// Removing a directory that still has entries
    #[error("directory not empty")]
    NotEmpty,
}

impl BlockLayerError {
    /// POSIX errno equivalent of this error
    pub fn errno(&self) -> i32 {
        match self {
            BlockLayerError::NoFreeBlocks => libc::ENOSPC,
            _ => libc::EIO,
        }
    }
}

impl InodeLayerError {
    /// POSIX errno equivalent of this error
    pub fn errno(&self) -> i32 {
        match self {
            InodeLayerError::Block(e) => e.errno(),
            InodeLayerError::NoFreeInodes => libc::ENOSPC,
            InodeLayerError::InodeOutOfRange(_) => libc::ENOENT,
            _ => libc::EIO,
        }
    }
}

impl DirLayerError {
    /// POSIX errno equivalent of this error
    pub fn errno(&self) -> i32 {
        match self {
            DirLayerError::Inode(e) => e.errno(),
            DirLayerError::NotADirectory(_) => libc::ENOTDIR,
            DirLayerError::EntryNotFound(_) => libc::ENOENT,
            DirLayerError::DirectoryFull => libc::ENOSPC,
            DirLayerError::Image(_) => libc::EIO,
        }
    }
}

impl PathLayerError {
    /// POSIX errno equivalent of this error, as reported to the host
    pub fn errno(&self) -> i32 {
        match self {
            PathLayerError::Dir(e) => e.errno(),
            PathLayerError::Image(_) => libc::EIO,
            PathLayerError::InvalidArgument(_) => libc::EINVAL,
            PathLayerError::NotFound => libc::ENOENT,
            PathLayerError::NotADirectory => libc::ENOTDIR,
            PathLayerError::IsADirectory => libc::EISDIR,
            PathLayerError::AlreadyExists => libc::EEXIST,
            PathLayerError::NoSpace => libc::ENOSPC,
            PathLayerError::NotEmpty => libc::ENOTEMPTY,
        }
    }
}
