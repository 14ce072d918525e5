use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::{MurError, codes};

pub const BUILD_MANIFEST_FILE: &str = "murmur-build.yaml";
pub const PROJECT_MANIFEST_FILE: &str = "murmur.yaml";

const GENERATED_HEADER: &str =
    "# This file is automatically generated based on murmur-build.yaml in the parent directory\n";

static PROJECT_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^([a-z0-9]|[a-z0-9][a-z0-9._-]*[a-z0-9])$").expect("valid name regex")
});

static PUBLIC_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)^v?(?:[0-9]+!)?[0-9]+(?:\.[0-9]+)*",
        r"(?:[-_.]?(?:a|b|c|rc|alpha|beta|pre|preview)[-_.]?[0-9]*)?",
        r"(?:-[0-9]+|[-_.]?(?:post|rev|r)[-_.]?[0-9]*)?",
        r"(?:[-_.]?dev[-_.]?[0-9]*)?$",
    ))
    .expect("valid version regex")
});

static SEPARATOR_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-_.]+").expect("valid separator regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Agent,
    Tool,
}

impl ArtifactKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "agent" => Some(Self::Agent),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Tool => "tool",
        }
    }

    /// Namespace sub-package: `agents` or `tools`.
    pub fn plural(self) -> &'static str {
        match self {
            Self::Agent => "agents",
            Self::Tool => "tools",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_python: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub urls: BTreeMap<String, Vec<String>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

/// `murmur-build.yaml`: the artifact being built and published.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildManifest {
    pub name: String,
    pub version: String,
    pub kind: ArtifactKind,
    pub description: Option<String>,
    pub instructions: Option<JsonValue>,
    pub dependencies: Vec<String>,
    pub metadata: ArtifactMetadata,
    raw: JsonMap<String, JsonValue>,
}

#[derive(Deserialize)]
struct RawBuildManifest {
    #[serde(default, deserialize_with = "opt_scalar_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "opt_scalar_string")]
    version: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    instructions: Option<JsonValue>,
    #[serde(default)]
    dependencies: Option<Vec<String>>,
    #[serde(default)]
    metadata: Option<ArtifactMetadata>,
}

impl BuildManifest {
    /// Loads `murmur-build.yaml` from `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(BUILD_MANIFEST_FILE);
        if !path.exists() {
            return Err(MurError::new(codes::FILE_NOT_FOUND, "murmur-build.yaml not found")
                .with_detail(
                    "The murmur-build.yaml manifest file was not found in the current directory",
                )
                .into());
        }
        let raw = fs::read_to_string(&path).map_err(|err| {
            MurError::new(codes::MANIFEST_IO, "Failed to load murmur-build.yaml").with_source(err)
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let load_failed = |err: anyhow::Error| {
            MurError::new(codes::MANIFEST_IO, "Failed to load murmur-build.yaml").with_source(err)
        };

        let document: JsonValue = serde_yaml_bw::from_str(raw)
            .map_err(|err| load_failed(anyhow::Error::new(err)))?;
        let JsonValue::Object(map) = document else {
            return Err(load_failed(anyhow::anyhow!("expected a mapping at the top level")).into());
        };
        let parsed: RawBuildManifest = serde_json::from_value(JsonValue::Object(map.clone()))
            .map_err(|err| load_failed(anyhow::Error::new(err)))?;

        let kind_raw = parsed.kind.unwrap_or_default();
        let kind = ArtifactKind::parse(&kind_raw).ok_or_else(|| {
            MurError::new(
                codes::INVALID_ARTIFACT_TYPE,
                format!("Invalid artifact type '{kind_raw}'"),
            )
            .with_detail("The artifact type in murmur-build.yaml must be either 'agent' or 'tool'.")
            .with_debug(format!("Found artifact_type: {kind_raw}"))
        })?;

        let name = parsed.name.unwrap_or_default();
        let version = parsed.version.unwrap_or_default();
        validate_name_version(&name, &version)?;

        Ok(Self {
            name,
            version,
            kind,
            description: parsed.description,
            instructions: parsed.instructions,
            dependencies: parsed.dependencies.unwrap_or_default(),
            metadata: parsed.metadata.unwrap_or_default(),
            raw: map,
        })
    }

    /// Directory name the artifact project is scaffolded into.
    pub fn package_dir_name(&self) -> String {
        normalize_package_name(&self.name)
    }

    /// Manifest shipped inside the package: known keys only, with
    /// `instructions` kept for agents.
    pub fn filtered_yaml(&self) -> Result<String> {
        let mut allowed = vec![
            "name",
            "version",
            "type",
            "description",
            "dependencies",
            "metadata",
        ];
        if self.kind == ArtifactKind::Agent {
            allowed.push("instructions");
        }
        let filtered: JsonMap<String, JsonValue> = self
            .raw
            .iter()
            .filter(|(key, _)| allowed.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let body = serde_yaml_bw::to_string(&filtered).context("failed to render manifest")?;
        Ok(format!("{GENERATED_HEADER}{body}"))
    }
}

/// Lowercases and collapses runs of `-`, `_` and `.` into `_`.
pub fn normalize_package_name(name: &str) -> String {
    SEPARATOR_RUNS
        .replace_all(&name.to_lowercase(), "_")
        .into_owned()
}

/// Module name used in import lines: lowercase with `-` turned into `_`.
pub fn pep8_name(name: &str) -> String {
    name.to_lowercase().replace('-', "_")
}

pub fn is_valid_name(name: &str) -> bool {
    PROJECT_NAME.is_match(name)
}

pub fn is_valid_version(version: &str) -> bool {
    PUBLIC_VERSION.is_match(version)
}

pub fn validate_name_version(name: &str, version: &str) -> Result<()> {
    if !is_valid_name(name) {
        return Err(MurError::new(
            codes::INVALID_NAME_VERSION,
            format!("Invalid artifact name '{name}'"),
        )
        .with_detail(
            "Names must start and end with a letter or digit and may only contain letters, \
             digits, '.', '-' and '_'.",
        )
        .into());
    }
    if !is_valid_version(version) {
        return Err(MurError::new(
            codes::INVALID_NAME_VERSION,
            format!("Invalid artifact version '{version}'"),
        )
        .with_detail("Versions must follow PEP 440, for example 1.0.0 or 2.1.0rc1.")
        .into());
    }
    Ok(())
}

/// An entry in `murmur.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArtifactRef {
    #[serde(deserialize_with = "scalar_string")]
    pub name: String,
    #[serde(default, deserialize_with = "opt_scalar_string")]
    pub version: Option<String>,
    #[serde(default)]
    pub tools: Vec<ArtifactRef>,
}

impl ArtifactRef {
    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or("")
    }
}

/// `murmur.yaml`: artifacts a project depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProjectManifest {
    #[serde(default)]
    pub agents: Vec<ArtifactRef>,
    #[serde(default)]
    pub tools: Vec<ArtifactRef>,
}

impl ProjectManifest {
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(PROJECT_MANIFEST_FILE);
        if !path.exists() {
            return Err(MurError::new(codes::FILE_NOT_FOUND, "murmur.yaml not found")
                .with_detail("The murmur.yaml manifest file was not found in the current directory")
                .into());
        }
        let raw = fs::read_to_string(&path).map_err(|err| {
            MurError::new(codes::MANIFEST_IO, "Failed to load murmur.yaml").with_source(err)
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_bw::from_str(raw).map_err(|err| {
            MurError::new(codes::MANIFEST_IO, "Failed to load murmur.yaml")
                .with_source(err)
                .into()
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(text) => text,
            Scalar::Int(value) => value.to_string(),
            Scalar::Float(value) => format!("{value:?}"),
        }
    }
}

fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Scalar::deserialize(deserializer)?.into_string())
}

fn opt_scalar_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(Scalar::into_string))
}
