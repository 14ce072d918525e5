use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};
use zip::ZipArchive;

use crate::models::{DistFileType, PublishFile};

/// A built distribution sitting in an artifact's `dist/` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistFile {
    pub path: PathBuf,
    pub file_type: DistFileType,
    pub filename: String,
    pub sha256: String,
    pub size: u64,
}

impl DistFile {
    pub fn from_path(path: &Path) -> Result<Option<Self>> {
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(None);
        };
        let Some(file_type) = classify(filename) else {
            return Ok(None);
        };
        let size = fs::metadata(path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();
        Ok(Some(Self {
            path: path.to_path_buf(),
            file_type,
            filename: filename.to_string(),
            sha256: sha256_file(path)?,
            size,
        }))
    }

    pub fn to_publish_file(&self) -> PublishFile {
        PublishFile {
            filename: self.filename.clone(),
            file_type: self.file_type,
            sha256: self.sha256.clone(),
            size: self.size,
        }
    }
}

pub fn classify(filename: &str) -> Option<DistFileType> {
    if filename.ends_with(".whl") {
        Some(DistFileType::Wheel)
    } else if filename.ends_with(".tar.gz") || filename.ends_with(".zip") {
        Some(DistFileType::Source)
    } else {
        None
    }
}

/// Distributions in `dir`, sorted by file name. A missing directory yields
/// an empty list.
pub fn discover(dir: &Path) -> Result<Vec<DistFile>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("failed to read {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(file) = DistFile::from_path(&path)? {
            files.push(file);
        }
    }
    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(files)
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).with_context(|| format!("failed to hash {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Core metadata fields read from a wheel's `*.dist-info/METADATA`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WheelMetadata {
    pub name: String,
    pub version: String,
    pub metadata_version: Option<String>,
    pub requires_dist: Vec<String>,
}

pub fn read_wheel_metadata(path: &Path) -> Result<WheelMetadata> {
    let file =
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("{} is not a wheel", path.display()))?;

    let entry_name = archive
        .file_names()
        .find(|name| {
            let mut parts = name.split('/');
            matches!(
                (parts.next(), parts.next(), parts.next()),
                (Some(dir), Some("METADATA"), None) if dir.ends_with(".dist-info")
            )
        })
        .map(str::to_string);
    let Some(entry_name) = entry_name else {
        bail!("{} has no .dist-info/METADATA", path.display());
    };

    let mut raw = String::new();
    archive
        .by_name(&entry_name)
        .with_context(|| format!("failed to open {entry_name}"))?
        .read_to_string(&mut raw)
        .with_context(|| format!("failed to read {entry_name}"))?;
    Ok(parse_core_metadata(&raw))
}

/// Parses the RFC 822 style header block of a core metadata file.
pub fn parse_core_metadata(raw: &str) -> WheelMetadata {
    let mut meta = WheelMetadata::default();
    for line in raw.lines() {
        if line.is_empty() {
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "Name" => meta.name = value,
            "Version" => meta.version = value,
            "Metadata-Version" => meta.metadata_version = Some(value),
            "Requires-Dist" => meta.requires_dist.push(value),
            _ => {}
        }
    }
    meta
}
