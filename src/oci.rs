//! OCI image layout directories.
//!
//! An [OCI image layout] is a directory containing:
//!
//! ```text
//! oci-layout                 {"imageLayoutVersion": "1.0.0"}
//! index.json                 image index listing manifests
//! blobs/<alg>/<hex>          content-addressed blobs
//! ```
//!
//! [`OciLayout`] resolves a manifest from `index.json` and exposes it as an
//! [`Image`] whose layers decompress their blobs on open. All file access goes
//! through a [`cap_std::fs::Dir`] handle rooted at the layout directory, so
//! blob paths can never escape it.
//!
//! [OCI image layout]: https://github.com/opencontainers/image-spec/blob/main/image-layout.md

use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cap_std::ambient_authority;
use cap_std::fs::Dir;
use flate2::read::GzDecoder;
use oci_spec::image::{Descriptor, ImageIndex, ImageManifest, MediaType};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{InspectError, Result};
use crate::image::{Image, ImageRef, Layer};

/// Annotation carrying a manifest's tag in `index.json`.
pub const REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";

#[derive(Debug, Deserialize)]
struct LayoutMarker {
    #[serde(rename = "imageLayoutVersion")]
    image_layout_version: String,
}

/// An opened OCI image layout directory.
#[derive(Debug)]
pub struct OciLayout {
    dir: Arc<Dir>,
    path: PathBuf,
    index: ImageIndex,
}

impl OciLayout {
    /// Open a layout directory and parse its `index.json`.
    ///
    /// # Errors
    ///
    /// Returns [`InspectError::ImageNotFound`] if the directory does not exist
    /// and [`InspectError::InvalidLayout`] if it is not an image layout.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let dir = Dir::open_ambient_dir(path, ambient_authority()).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                InspectError::ImageNotFound(path.display().to_string())
            } else {
                InspectError::Io(e)
            }
        })?;

        let marker = dir.read("oci-layout").map_err(|_| {
            InspectError::InvalidLayout(format!("{}: missing oci-layout file", path.display()))
        })?;
        let marker: LayoutMarker = serde_json::from_slice(&marker).map_err(|e| {
            InspectError::InvalidLayout(format!("{}: invalid oci-layout: {}", path.display(), e))
        })?;
        tracing::debug!(
            "opened layout {} (version {})",
            path.display(),
            marker.image_layout_version
        );

        let index = ImageIndex::from_reader(dir.open("index.json")?)?;
        let path = std::fs::canonicalize(path)?;

        Ok(Self {
            dir: Arc::new(dir),
            path,
            index,
        })
    }

    /// Resolve a reference of the form `<layout-dir>[:<tag>|@<digest>]`.
    pub fn open_reference(reference: &str) -> Result<OciImage> {
        let parsed = ImageRef::parse(reference)?;
        let layout = Self::open(&parsed.repository)?;
        let selector = parsed.digest.as_deref().or(parsed.tag.as_deref());
        layout.image(selector)
    }

    /// Tags recorded in `index.json`, in index order.
    pub fn tags(&self) -> Vec<&str> {
        self.index
            .manifests()
            .iter()
            .filter_map(ref_name)
            .collect()
    }

    /// Resolve an image by tag or digest.
    ///
    /// With no selector the index must contain exactly one manifest.
    pub fn image(&self, selector: Option<&str>) -> Result<OciImage> {
        let desc = self.select(selector)?;
        if *desc.media_type() == MediaType::ImageIndex {
            return Err(InspectError::InvalidLayout(format!(
                "{} is a nested image index; multi-platform layouts are not supported",
                desc.digest()
            )));
        }

        let digest = desc.digest().to_string();
        let data = self.dir.read(blob_path(&digest)?).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                InspectError::InvalidLayout(format!("missing manifest blob {}", digest))
            } else {
                InspectError::Io(e)
            }
        })?;
        verify_digest(&digest, &data)?;
        let manifest = ImageManifest::from_reader(data.as_slice())?;

        let layers = manifest
            .layers()
            .iter()
            .map(|d| BlobLayer::new(Arc::clone(&self.dir), d))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!("resolved {} with {} layers", digest, layers.len());

        let tag = ref_name(desc).map(str::to_string);
        let reference = ImageRef {
            repository: self.path.display().to_string(),
            tag,
            digest: Some(digest.clone()),
        };

        Ok(OciImage {
            reference,
            digest,
            layers,
        })
    }

    fn select(&self, selector: Option<&str>) -> Result<&Descriptor> {
        let manifests = self.index.manifests();
        let found = match selector {
            None => match manifests.as_slice() {
                [only] => Some(only),
                _ => {
                    return Err(InspectError::ImageNotFound(format!(
                        "{}: index has {} manifests; select one by tag or digest",
                        self.path.display(),
                        manifests.len()
                    )))
                }
            },
            Some(sel) if is_digest(sel) => manifests.iter().find(|d| d.digest().to_string() == sel),
            Some(sel) => manifests.iter().find(|d| ref_name(d) == Some(sel)),
        };
        found.ok_or_else(|| {
            InspectError::ImageNotFound(format!(
                "{}:{}",
                self.path.display(),
                selector.unwrap_or_default()
            ))
        })
    }
}

/// An image resolved from an OCI layout.
#[derive(Debug)]
pub struct OciImage {
    reference: ImageRef,
    digest: String,
    layers: Vec<BlobLayer>,
}

impl Image for OciImage {
    type Layer = BlobLayer;

    fn reference(&self) -> &ImageRef {
        &self.reference
    }

    fn digest(&self) -> &str {
        &self.digest
    }

    fn layers(&self) -> &[BlobLayer] {
        &self.layers
    }
}

/// Stream compression of a layer blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Plain tar.
    None,
    /// `+gzip` media types.
    Gzip,
    /// `+zstd` media types.
    Zstd,
}

impl Compression {
    /// Infer compression from a layer media type suffix.
    pub fn from_media_type(media_type: &str) -> Self {
        if media_type.ends_with("gzip") {
            Compression::Gzip
        } else if media_type.ends_with("zstd") {
            Compression::Zstd
        } else {
            Compression::None
        }
    }
}

/// A layer stored as a blob in an OCI layout.
#[derive(Debug, Clone)]
pub struct BlobLayer {
    dir: Arc<Dir>,
    path: PathBuf,
    digest: String,
    size: u64,
    compression: Compression,
}

impl BlobLayer {
    fn new(dir: Arc<Dir>, desc: &Descriptor) -> Result<Self> {
        let digest = desc.digest().to_string();
        Ok(Self {
            dir,
            path: blob_path(&digest)?,
            compression: Compression::from_media_type(&desc.media_type().to_string()),
            size: desc.size() as u64,
            digest,
        })
    }
}

impl Layer for BlobLayer {
    fn digest(&self) -> &str {
        &self.digest
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn open(&self) -> std::io::Result<Box<dyn Read + '_>> {
        let file = BufReader::new(self.dir.open(&self.path)?);
        Ok(match self.compression {
            Compression::Gzip => Box::new(GzDecoder::new(file)),
            Compression::Zstd => Box::new(zstd::stream::read::Decoder::with_buffer(file)?),
            Compression::None => Box::new(file),
        })
    }
}

fn ref_name(desc: &Descriptor) -> Option<&str> {
    desc.annotations()
        .as_ref()?
        .get(REF_NAME_ANNOTATION)
        .map(String::as_str)
}

fn is_digest(s: &str) -> bool {
    matches!(s.split_once(':'), Some((alg, hex)) if !alg.is_empty() && hex.len() >= 32 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Relative blob path for a digest: `blobs/<alg>/<hex>`.
fn blob_path(digest: &str) -> Result<PathBuf> {
    match digest.split_once(':') {
        Some((alg, hex))
            if !alg.is_empty()
                && !hex.is_empty()
                && alg.bytes().all(|b| b.is_ascii_alphanumeric())
                && hex.bytes().all(|b| b.is_ascii_alphanumeric()) =>
        {
            Ok(Path::new("blobs").join(alg).join(hex))
        }
        _ => Err(InspectError::InvalidLayout(format!("invalid digest: {}", digest))),
    }
}

fn verify_digest(expected: &str, data: &[u8]) -> Result<()> {
    let Some(hex) = expected.strip_prefix("sha256:") else {
        tracing::debug!("not verifying non-sha256 digest {}", expected);
        return Ok(());
    };
    let actual = format!("{:x}", Sha256::digest(data));
    if actual != hex {
        return Err(InspectError::DigestMismatch {
            expected: expected.to_string(),
            actual: format!("sha256:{}", actual),
        });
    }
    Ok(())
}
