//! Error type shared by the pager and the basic types.
//!
//! Layer-specific errors in the implementation crate embed this type with
//! `thiserror`'s `#[from]`, so `?` converts transparently up the chain.

use std::io;
use thiserror::Error;

/// Failures raised below the filesystem layers: the image pager and the
/// block accessors.
#[derive(Error, Debug)]
pub enum ImageError {
    /// I/O failure while opening, sizing or flushing the backing file
    #[error("io failure on the image file")]
    Io(#[from] io::Error),
    /// A record did not (de)serialize cleanly
    #[error("record serialization failure")]
    Serialize(#[from] bincode::Error),
    /// A file that is not an image, or a block index the image lacks
    #[error("invalid image access: {0}")]
    Pager(&'static str),
    /// A byte range outside the bounds of a block
    #[error("invalid block access: {0}")]
    Bounds(&'static str),
    /// Catch-all for wrapped external errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Shorthand `Result` with the error type of this crate.
pub type Result<T> = std::result::Result<T, ImageError>;
