//! Shared foundation of the image filesystem: the pager that memory-maps
//! the backing image file, the on-disk record types and layout constants,
//! the common error type, and the traits the layered implementation in the
//! `imgfs` crate builds on.

#![deny(missing_docs)]

//The image pager
pub mod pager;
pub mod error;

//Basic modules for types
pub mod types;

//Traits the filesystem layers implement
pub mod fs;
