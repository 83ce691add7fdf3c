//! Image access contract.
//!
//! The view engine never talks to registries, daemons or storage directly. It
//! consumes images through two small traits:
//!
//! - [`Layer`]: a content digest, a byte count, and a way to open the
//!   uncompressed tar stream
//! - [`Image`]: a reference, a whole-image digest, and the ordered layers
//!   (index 0 is the base, the last layer is the topmost overlay)
//!
//! [`OciLayout`](crate::oci::OciLayout) implements these for OCI image layout
//! directories; [`MemoryImage`] holds layers in memory.

use std::fmt;
use std::io::{Cursor, Read};

use sha2::{Digest, Sha256};

use crate::error::{InspectError, Result};

/// One ordered filesystem delta of an image.
pub trait Layer {
    /// Content digest of the layer (e.g. `sha256:...`), used as its identity.
    fn digest(&self) -> &str;

    /// Size of the layer blob in bytes.
    fn size(&self) -> u64;

    /// Open the uncompressed tar stream of this layer.
    ///
    /// Every call returns a fresh stream positioned at the start of the archive.
    fn open(&self) -> std::io::Result<Box<dyn Read + '_>>;
}

/// A container image as seen by the view engine.
pub trait Image {
    /// The layer type of this image.
    type Layer: Layer;

    /// Reference this image was resolved from.
    fn reference(&self) -> &ImageRef;

    /// Digest identifying the whole image (the manifest digest).
    fn digest(&self) -> &str;

    /// Layers ordered from base to top.
    fn layers(&self) -> &[Self::Layer];

    /// Total byte count of all layers.
    fn total_size(&self) -> u64 {
        self.layers().iter().map(Layer::size).sum()
    }
}

/// A parsed image reference: `repository[:tag][@digest]`.
///
/// The repository part is the identity used when deciding whether two images
/// can be compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    /// Repository name or image layout location.
    pub repository: String,
    /// Tag, if one was given.
    pub tag: Option<String>,
    /// Digest, if one was given.
    pub digest: Option<String>,
}

impl ImageRef {
    /// Parse a reference string.
    ///
    /// A `:` only introduces a tag when it appears after the last `/`, so
    /// `localhost:5000/app` is a repository without a tag.
    ///
    /// ```
    /// use cek_rs::ImageRef;
    ///
    /// let r = ImageRef::parse("registry.local:5000/app:v2").unwrap();
    /// assert_eq!(r.repository, "registry.local:5000/app");
    /// assert_eq!(r.tag.as_deref(), Some("v2"));
    /// ```
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = || InspectError::InvalidReference(reference.to_string());

        let (name, digest) = match reference.split_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(invalid());
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (repository, tag) = match name[last_slash..].rfind(':') {
            Some(colon) => {
                let colon = last_slash + colon;
                let tag = &name[colon + 1..];
                if tag.is_empty() {
                    return Err(invalid());
                }
                (&name[..colon], Some(tag.to_string()))
            }
            None => (name, None),
        };

        if repository.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// Returns true if both references name the same repository.
    pub fn same_repository(&self, other: &ImageRef) -> bool {
        self.repository == other.repository
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

/// A layer whose uncompressed tar bytes are held in memory.
#[derive(Debug, Clone)]
pub struct MemoryLayer {
    digest: String,
    data: Vec<u8>,
}

impl MemoryLayer {
    /// Create a layer from uncompressed tar bytes; the digest is their sha256.
    pub fn new(data: Vec<u8>) -> Self {
        let digest = format!("sha256:{:x}", Sha256::digest(&data));
        Self { digest, data }
    }
}

impl Layer for MemoryLayer {
    fn digest(&self) -> &str {
        &self.digest
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn open(&self) -> std::io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(Cursor::new(self.data.as_slice())))
    }
}

/// An image assembled from in-memory layers.
#[derive(Debug, Clone)]
pub struct MemoryImage {
    reference: ImageRef,
    digest: String,
    layers: Vec<MemoryLayer>,
}

impl MemoryImage {
    /// Create an image; its digest is derived from the ordered layer digests.
    pub fn new(reference: ImageRef, layers: Vec<MemoryLayer>) -> Self {
        let mut hasher = Sha256::new();
        for layer in &layers {
            hasher.update(layer.digest().as_bytes());
            hasher.update(b"\n");
        }
        let digest = format!("sha256:{:x}", hasher.finalize());
        Self {
            reference,
            digest,
            layers,
        }
    }
}

impl Image for MemoryImage {
    type Layer = MemoryLayer;

    fn reference(&self) -> &ImageRef {
        &self.reference
    }

    fn digest(&self) -> &str {
        &self.digest
    }

    fn layers(&self) -> &[MemoryLayer] {
        &self.layers
    }
}
