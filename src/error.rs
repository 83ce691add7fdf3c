//! Error types for the cek-rs library.
//!
//! This module defines the error types used throughout the library. All operations
//! that can fail return a [`Result<T>`] which is an alias for `Result<T, InspectError>`.
//!
//! # Error Categories
//!
//! Errors are organized into several categories:
//!
//! - **Layer access**: [`LayerAccess`] (opening or streaming a layer failed)
//! - **Decoding**: [`Decode`] (malformed archive data in a layer)
//! - **Not found**: [`LayerOutOfRange`], [`FileNotFound`], [`ImageNotFound`]
//! - **Preconditions**: [`RepositoryMismatch`], [`InvalidReference`], [`InvalidPattern`]
//! - **Image layout**: [`InvalidLayout`], [`DigestMismatch`], [`Oci`]
//! - **System errors**: [`Io`], [`Config`]
//!
//! Not-found errors are the expected outcome of a valid query against a path
//! or layer that does not exist. Use [`InspectError::is_not_found`] to tell
//! them apart from real failures.
//!
//! [`LayerAccess`]: InspectError::LayerAccess
//! [`Decode`]: InspectError::Decode
//! [`LayerOutOfRange`]: InspectError::LayerOutOfRange
//! [`FileNotFound`]: InspectError::FileNotFound
//! [`ImageNotFound`]: InspectError::ImageNotFound
//! [`RepositoryMismatch`]: InspectError::RepositoryMismatch
//! [`InvalidReference`]: InspectError::InvalidReference
//! [`InvalidPattern`]: InspectError::InvalidPattern
//! [`InvalidLayout`]: InspectError::InvalidLayout
//! [`DigestMismatch`]: InspectError::DigestMismatch
//! [`Oci`]: InspectError::Oci
//! [`Io`]: InspectError::Io
//! [`Config`]: InspectError::Config
//!
//! # Error Handling Example
//!
//! ```no_run
//! use cek_rs::{extract, Image, InspectError, OciLayout};
//!
//! fn show(layout: &str, path: &str) -> Result<(), InspectError> {
//!     let image = OciLayout::open(layout)?.image(None)?;
//!     match extract::read_file(image.layers(), path) {
//!         Ok(bytes) => println!("{} bytes", bytes.len()),
//!         Err(e) if e.is_not_found() => println!("no such file: {}", path),
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```

/// Result type alias for operations that may return an InspectError.
pub type Result<T> = std::result::Result<T, InspectError>;

/// Error types for image inspection operations.
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    /// Opening or streaming a layer failed.
    #[error("failed to access layer {} ({digest}): {source}", .index + 1)]
    LayerAccess {
        /// Zero-based index of the layer.
        index: usize,
        /// Digest of the layer.
        digest: String,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// A layer's archive stream could not be decoded.
    #[error("failed to decode layer {} ({digest}): {source}", .index + 1)]
    Decode {
        /// Zero-based index of the layer.
        index: usize,
        /// Digest of the layer.
        digest: String,
        /// Underlying decode failure.
        source: std::io::Error,
    },

    /// The requested layer index exceeds the number of layers.
    #[error("layer {} does not exist (image has {count} layers)", .index + 1)]
    LayerOutOfRange {
        /// Zero-based index that was requested.
        index: usize,
        /// Number of layers in the image.
        count: usize,
    },

    /// The requested file is absent after resolution.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The requested path exists but is not a regular file.
    #[error("{path} is not a regular file (type: {kind})")]
    NotRegularFile {
        /// Normalized path of the entry.
        path: String,
        /// Human-readable kind of the entry.
        kind: &'static str,
    },

    /// The requested image was not found in the layout.
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// Two images from different repositories were compared.
    #[error("images must be from the same repository: {left} != {right}")]
    RepositoryMismatch {
        /// Repository of the first image.
        left: String,
        /// Repository of the second image.
        right: String,
    },

    /// An image reference could not be parsed.
    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    /// A glob pattern could not be compiled.
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The pattern as given.
        pattern: String,
        /// Compilation failure.
        source: glob::PatternError,
    },

    /// The OCI image layout is malformed or unsupported.
    #[error("invalid image layout: {0}")]
    InvalidLayout(String),

    /// A blob's content does not hash to its digest.
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Digest recorded in the referencing descriptor.
        expected: String,
        /// Digest computed from the blob content.
        actual: String,
    },

    /// OCI document parsing failed.
    #[error("OCI parse error: {0}")]
    Oci(#[from] oci_spec::OciSpecError),

    /// Configuration parsing failed.
    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InspectError {
    /// Returns true for the not-found category: a missing layer index, file or image.
    ///
    /// These are expected outcomes of valid queries and should not be
    /// reported as failures of the underlying storage.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            InspectError::LayerOutOfRange { .. }
                | InspectError::FileNotFound(_)
                | InspectError::ImageNotFound(_)
        )
    }
}
