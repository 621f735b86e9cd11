//! Remote template bundle format
//!
//! A bundle is a gzip-compressed tar holding `personality.yaml` and,
//! optionally, `SOUL.md`. When both carry a soul, `SOUL.md` wins.
//! Decoding enforces per-file, total and compression-ratio limits so a
//! hostile archive cannot exhaust memory.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Read};
use std::path::{Component, Path};
use tar::{Archive, Builder, EntryType, Header};
use thiserror::Error;
use tracing::debug;
use warden_types::PersonalitySpec;

pub const MANIFEST_FILE: &str = "personality.yaml";
pub const SOUL_FILE: &str = "SOUL.md";

/// Decompression limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleLimits {
    pub max_file_bytes: u64,
    pub max_total_bytes: u64,
    /// Maximum decompressed:compressed size ratio
    pub max_ratio: u64,
}

impl Default for BundleLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            max_total_bytes: 32 * 1024 * 1024,
            max_ratio: 100,
        }
    }
}

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("I/O error reading bundle: {0}")]
    Io(#[from] io::Error),

    #[error("{path} exceeds the {limit} byte file limit")]
    FileTooLarge { path: String, limit: u64 },

    #[error("bundle exceeds the {limit} byte decompressed limit")]
    TotalTooLarge { limit: u64 },

    #[error("bundle compression ratio exceeds {limit}:1")]
    RatioExceeded { limit: u64 },

    #[error("bundle has no personality.yaml")]
    MissingManifest,

    #[error("invalid personality.yaml: {0}")]
    Manifest(#[from] serde_yaml::Error),

    #[error("SOUL.md is not valid UTF-8")]
    SoulEncoding,
}

/// Strip `./` and leading `/`; reject anything escaping the archive root
fn normalize_path(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Decode a bundle into the template shape
pub fn decode(compressed: &[u8], limits: &BundleLimits) -> Result<PersonalitySpec, BundleError> {
    let compressed_len = compressed.len().max(1) as u64;
    let ratio_budget = compressed_len.saturating_mul(limits.max_ratio);
    let mut archive = Archive::new(GzDecoder::new(compressed));

    let mut manifest: Option<Vec<u8>> = None;
    let mut soul: Option<Vec<u8>> = None;
    let mut total: u64 = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type() != EntryType::Regular {
            continue;
        }
        let Some(path) = normalize_path(&entry.path()?) else {
            debug!("Skipping bundle entry outside archive root");
            continue;
        };

        let mut contents = Vec::new();
        (&mut entry)
            .take(limits.max_file_bytes + 1)
            .read_to_end(&mut contents)?;
        let size = contents.len() as u64;
        if size > limits.max_file_bytes {
            return Err(BundleError::FileTooLarge {
                path,
                limit: limits.max_file_bytes,
            });
        }

        total += size;
        if total > limits.max_total_bytes {
            return Err(BundleError::TotalTooLarge {
                limit: limits.max_total_bytes,
            });
        }
        if total > ratio_budget {
            return Err(BundleError::RatioExceeded {
                limit: limits.max_ratio,
            });
        }

        match path.as_str() {
            MANIFEST_FILE => manifest = Some(contents),
            SOUL_FILE => soul = Some(contents),
            _ => {}
        }
    }

    let manifest = manifest.ok_or(BundleError::MissingManifest)?;
    let mut spec: PersonalitySpec = if manifest.iter().all(u8::is_ascii_whitespace) {
        PersonalitySpec::default()
    } else {
        serde_yaml::from_slice(&manifest)?
    };

    if let Some(soul) = soul {
        spec.bundle.soul = String::from_utf8(soul).map_err(|_| BundleError::SoulEncoding)?;
    }
    Ok(spec)
}

fn append_file<W: io::Write>(builder: &mut Builder<W>, path: &str, data: &[u8]) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_entry_type(EntryType::Regular);
    header.set_cksum();
    builder.append_data(&mut header, path, data)
}

/// Build a bundle from a manifest and an optional soul document
pub fn pack(manifest_yaml: &str, soul: Option<&str>) -> io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    append_file(&mut builder, MANIFEST_FILE, manifest_yaml.as_bytes())?;
    if let Some(soul) = soul {
        append_file(&mut builder, SOUL_FILE, soul.as_bytes())?;
    }
    builder.into_inner()?.finish()
}
