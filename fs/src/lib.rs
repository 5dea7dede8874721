//! A small POSIX-style filesystem stored in a single block-addressed image
//! file, built as a stack of layers over the memory-mapped image pager of
//! [`imgfs_api`]:
//!
//! 1. [`block_support`]: block bitmap, first-fit block allocator and the
//!    header block with the persisted root inode number.
//! 2. [`inode_support`]: the fixed-width inode table and its allocator.
//! 3. [`dir_support`]: single-block packed directories.
//! 4. [`path_support`]: hierarchical path resolution and the mutating
//!    storage operations (create, remove, write, truncate, rename).
//! 5. [`host`]: the adapter translating host filesystem callbacks into
//!    storage calls and errno results.
//!
//! The whole stack is single-threaded by contract; a multi-threaded host
//! must serialize calls behind a single mutex.

#![deny(missing_docs)]

pub mod bitmap;
pub mod block_support;
pub mod dir_support;
pub mod error_fs;
pub mod host;
pub mod inode_support;
pub mod path_support;
