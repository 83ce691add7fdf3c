//! Test fixtures: in-memory tar layers and on-disk OCI image layouts.

#![allow(dead_code)]

use std::cell::Cell;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::rc::Rc;

use anyhow::Result;
use cek_rs::{Image, ImageRef, Layer, MemoryImage, MemoryLayer};
use flate2::write::GzEncoder;
use serde_json::json;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

/// Build an uncompressed tar layer.
///
/// Names ending in `/` become directories, `name -> target` becomes a
/// symlink, everything else is a regular file with the given content.
pub fn tar_layer(items: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in items {
        let mut header = tar::Header::new_gnu();
        if name.ends_with('/') {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
            builder.append_data(&mut header, name, &[][..]).unwrap();
        } else if let Some((link, target)) = name.split_once(" -> ") {
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_mode(0o777);
            header.set_size(0);
            builder.append_link(&mut header, link, target).unwrap();
        } else {
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(0o644);
            header.set_size(content.len() as u64);
            builder
                .append_data(&mut header, name, content.as_bytes())
                .unwrap();
        }
    }
    builder.into_inner().unwrap()
}

pub fn memory_image(reference: &str, layers: &[Vec<u8>]) -> MemoryImage {
    MemoryImage::new(
        ImageRef::parse(reference).unwrap(),
        layers.iter().cloned().map(MemoryLayer::new).collect(),
    )
}

pub fn sha256(data: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(data))
}

/// A layer that counts how often it is opened.
#[derive(Clone)]
pub struct CountingLayer {
    inner: MemoryLayer,
    opens: Rc<Cell<usize>>,
}

impl Layer for CountingLayer {
    fn digest(&self) -> &str {
        self.inner.digest()
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn open(&self) -> std::io::Result<Box<dyn Read + '_>> {
        self.opens.set(self.opens.get() + 1);
        self.inner.open()
    }
}

/// An image whose layers share one open counter.
pub struct CountingImage {
    reference: ImageRef,
    digest: String,
    layers: Vec<CountingLayer>,
}

impl CountingImage {
    pub fn new(reference: &str, layers: &[MemoryLayer], opens: &Rc<Cell<usize>>) -> Self {
        let image = MemoryImage::new(ImageRef::parse(reference).unwrap(), layers.to_vec());
        Self {
            reference: image.reference().clone(),
            digest: image.digest().to_string(),
            layers: layers
                .iter()
                .map(|l| CountingLayer {
                    inner: l.clone(),
                    opens: Rc::clone(opens),
                })
                .collect(),
        }
    }
}

impl Image for CountingImage {
    type Layer = CountingLayer;

    fn reference(&self) -> &ImageRef {
        &self.reference
    }

    fn digest(&self) -> &str {
        &self.digest
    }

    fn layers(&self) -> &[CountingLayer] {
        &self.layers
    }
}

/// How a layer blob is stored in a layout.
#[derive(Debug, Clone, Copy)]
pub enum Blob {
    Tar,
    Gzip,
    Zstd,
}

impl Blob {
    pub fn encode(self, tar: &[u8]) -> Result<(Vec<u8>, &'static str)> {
        Ok(match self {
            Blob::Tar => (tar.to_vec(), "application/vnd.oci.image.layer.v1.tar"),
            Blob::Gzip => {
                let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
                enc.write_all(tar)?;
                (enc.finish()?, "application/vnd.oci.image.layer.v1.tar+gzip")
            }
            Blob::Zstd => (
                zstd::encode_all(tar, 0)?,
                "application/vnd.oci.image.layer.v1.tar+zstd",
            ),
        })
    }
}

/// An OCI image layout under construction in a temporary directory.
pub struct TestLayout {
    dir: TempDir,
    manifests: Vec<serde_json::Value>,
}

impl TestLayout {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        fs::create_dir_all(dir.path().join("blobs/sha256"))?;
        fs::write(
            dir.path().join("oci-layout"),
            r#"{"imageLayoutVersion": "1.0.0"}"#,
        )?;
        let layout = Self {
            dir,
            manifests: Vec::new(),
        };
        layout.write_index()?;
        Ok(layout)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Image argument for the CLI: `<dir>:<tag>`.
    pub fn reference(&self, tag: &str) -> String {
        format!("{}:{}", self.path().display(), tag)
    }

    pub fn write_blob(&self, data: &[u8]) -> Result<(String, u64)> {
        let digest = sha256(data);
        let hex = digest.trim_start_matches("sha256:");
        fs::write(self.path().join("blobs/sha256").join(hex), data)?;
        Ok((digest, data.len() as u64))
    }

    /// Add an image built from uncompressed tar layers; returns the manifest digest.
    pub fn add_image(&mut self, tag: Option<&str>, layers: &[Vec<u8>], blob: Blob) -> Result<String> {
        let (config_digest, config_size) = self.write_blob(br#"{"architecture":"amd64","os":"linux","rootfs":{"type":"layers","diff_ids":[]}}"#)?;

        let mut descriptors = Vec::new();
        for tar in layers {
            let (data, media_type) = blob.encode(tar)?;
            let (digest, size) = self.write_blob(&data)?;
            descriptors.push(json!({
                "mediaType": media_type,
                "digest": digest,
                "size": size,
            }));
        }

        let manifest = json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": config_digest,
                "size": config_size,
            },
            "layers": descriptors,
        });
        let manifest = serde_json::to_vec(&manifest)?;
        let (digest, size) = self.write_blob(&manifest)?;

        let mut desc = json!({
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "digest": digest,
            "size": size,
        });
        if let Some(tag) = tag {
            desc["annotations"] = json!({ "org.opencontainers.image.ref.name": tag });
        }
        self.manifests.push(desc);
        self.write_index()?;
        Ok(digest)
    }

    fn write_index(&self) -> Result<()> {
        let index = json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "manifests": self.manifests,
        });
        fs::write(self.path().join("index.json"), serde_json::to_vec(&index)?)?;
        Ok(())
    }
}
