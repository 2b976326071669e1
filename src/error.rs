//! Error taxonomy for the engine boundaries.
//!
//! Parse-misses never surface here: parsing is total over arbitrary text and
//! yields `None`/empty instead. This enum covers the recoverable boundary
//! failures (I/O, bad keys) and the contract violations that abort a single
//! operation without taking down the engine.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Reading or writing a document failed. The corresponding cache entry
    /// is deleted so a later read retries from scratch.
    #[error("i/o failure for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The path does not name a Markdown document; such paths never
    /// populate a cache.
    #[error("not a markdown file: {}", .0.display())]
    NotMarkdown(PathBuf),

    /// A rename was aborted because a would-be tag is already cited
    /// elsewhere and the caller asked for abort-on-conflict.
    #[error("rename aborted: tag `{0}` is already cited elsewhere in the vault")]
    DuplicateTag(String),

    /// A programming-contract failure inside a single document's
    /// processing. Fatal for that operation only.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, Error>;
