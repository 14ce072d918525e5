use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::config::{RcPaths, RegistrySettings};
use crate::delegate::python::{PythonDelegate, PythonEnv};
use crate::error::{MurError, codes, ensure_coded};
use crate::manifest::{ArtifactRef, ProjectManifest, normalize_package_name};
use crate::namespace::{self, NAMESPACE};
use crate::registry::registry_adapter;
use crate::util::progress::Spinner;

const METADATA_TIMEOUT: Duration = Duration::from_secs(30);
const NEXUS_HOST_MARKER: &str = ".murmur.nexus";

/// `GET {index}/{name}/metadata/` payload.
#[derive(Debug, Default, Deserialize)]
struct PackageMetadata {
    #[serde(default)]
    requires_dist: Option<Vec<String>>,
}

pub fn run(name: Option<&str>, verbose: bool) -> Result<()> {
    let python = PythonDelegate::discover()?;
    ensure_murmur_installed(&python)?;
    let settings = RegistrySettings::load_or_init(&RcPaths::discover()?)?;
    let indexes = registry_adapter(&settings, None)?.package_indexes()?;
    let installer = Installer::new(&python, &indexes, verbose)?;
    match name {
        Some(name) => {
            installer.install_single(name)?;
            println!("✓ Successfully installed artifact '{name}'");
        }
        None => {
            let cwd = std::env::current_dir().context("unable to determine current directory")?;
            installer.install_manifest(&cwd)?;
            println!("✓ Successfully installed all artifacts");
        }
    }
    Ok(())
}

pub fn ensure_murmur_installed(python: &dyn PythonEnv) -> Result<()> {
    if python.has_module(NAMESPACE)? {
        return Ok(());
    }
    Err(MurError::new(codes::MURMUR_NOT_INSTALLED, "Murmur package is not installed")
        .with_detail("Please install the murmur package before installing your agent or tool")
        .with_debug("importlib.util.find_spec('murmur') returned None")
        .into())
}

/// `name` for latest/unpinned versions, `name==version` otherwise.
pub fn spec_string(name: &str, version: &str) -> String {
    if is_latest(version) {
        name.to_string()
    } else {
        format!("{name}=={version}")
    }
}

fn is_latest(version: &str) -> bool {
    version.is_empty() || version.eq_ignore_ascii_case("latest")
}

pub fn is_nexus_index(index_url: &str) -> bool {
    index_url.contains(NEXUS_HOST_MARKER)
}

/// Installs the artifact itself from a Murmur Nexus index, without deps.
pub fn nexus_install_args(spec: &str, index_url: &str, quiet: bool) -> Vec<String> {
    let mut args = strings(&[
        "install",
        "--no-deps",
        "--disable-pip-version-check",
        spec,
        "--index-url",
        index_url,
    ]);
    if quiet {
        args.push("--quiet".into());
    }
    args
}

/// Installs one dependency of a Nexus artifact. The first extra index is
/// primary so public dependencies resolve from it.
pub fn dependency_install_args(
    requirement: &str,
    index_url: &str,
    extra_index_urls: &[String],
    quiet: bool,
) -> Vec<String> {
    let primary = extra_index_urls.first().map_or(index_url, String::as_str);
    let mut args = strings(&[
        "install",
        "--disable-pip-version-check",
        requirement,
        "--index-url",
        primary,
        "--extra-index-url",
        index_url,
    ]);
    if quiet {
        args.push("--quiet".into());
    }
    for url in extra_index_urls.iter().skip(1) {
        args.push("--extra-index-url".into());
        args.push(url.clone());
    }
    args
}

/// Installs from a private index, dependencies included.
pub fn private_install_args(
    spec: &str,
    index_url: &str,
    extra_index_urls: &[String],
    quiet: bool,
) -> Vec<String> {
    let mut args = strings(&["install", "--disable-pip-version-check", spec, "--index-url", index_url]);
    if quiet {
        args.push("--quiet".into());
    }
    for url in extra_index_urls {
        args.push("--extra-index-url".into());
        args.push(url.clone());
    }
    args
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

pub struct Installer<'a> {
    python: &'a dyn PythonEnv,
    index_url: String,
    extra_index_urls: Vec<String>,
    nexus: bool,
    verbose: bool,
    http: Client,
}

impl<'a> Installer<'a> {
    /// `indexes` lists the primary index first, then the extra indexes.
    pub fn new(python: &'a dyn PythonEnv, indexes: &[String], verbose: bool) -> Result<Self> {
        let Some((index_url, extra_index_urls)) = indexes.split_first() else {
            return Err(MurError::new(codes::REGISTRY_CONFIG, "Missing registry configuration")
                .with_detail("No package index configured in .murmurrc.")
                .into());
        };
        let http = Client::builder()
            .timeout(METADATA_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            python,
            index_url: index_url.trim_end_matches('/').to_string(),
            extra_index_urls: extra_index_urls.to_vec(),
            nexus: is_nexus_index(index_url),
            verbose,
            http,
        })
    }

    /// Treats the index as a Murmur Nexus index regardless of its host.
    #[cfg(test)]
    pub(crate) fn with_nexus(mut self, nexus: bool) -> Self {
        self.nexus = nexus;
        self
    }

    pub fn install_single(&self, name: &str) -> Result<()> {
        self.install_artifact(name, "latest")?;
        self.register_import(name)
    }

    /// Installs every agent, then every tool, from `murmur.yaml` in `dir`.
    pub fn install_manifest(&self, dir: &Path) -> Result<()> {
        let manifest = ProjectManifest::load_from_dir(dir)?;
        self.install_group(&manifest.agents)?;
        self.install_group(&manifest.tools)
    }

    fn install_group(&self, artifacts: &[ArtifactRef]) -> Result<()> {
        for artifact in artifacts {
            self.install_artifact(&artifact.name, artifact.version())?;
            self.register_import(&artifact.name)?;
            if !artifact.tools.is_empty() {
                self.install_group(&artifact.tools)?;
            }
        }
        Ok(())
    }

    fn register_import(&self, name: &str) -> Result<()> {
        let init_path = namespace::artifacts_init_path(self.python)?;
        if namespace::add_import(&init_path, name)? {
            tracing::debug!(path = %init_path.display(), name, "registered import");
        }
        Ok(())
    }

    /// Returns `false` when the artifact was already installed.
    pub fn install_artifact(&self, name: &str, version: &str) -> Result<bool> {
        let spec = spec_string(name, version);
        let attempt = || -> Result<bool> {
            if self.is_installed(name, version)? {
                tracing::info!("Skipping {spec} - already installed");
                return Ok(false);
            }
            let spinner = Spinner::start(format!("Installing {spec}"), self.verbose);
            let result = if self.nexus {
                self.install_from_nexus(&spec, name)
            } else {
                let args =
                    private_install_args(&spec, &self.index_url, &self.extra_index_urls, !self.verbose);
                self.pip_install(&args, name)
            };
            spinner.finish();
            result.map(|()| true)
        };
        attempt().map_err(|err| {
            ensure_coded(err, codes::INSTALL_FAILED, format!("Failed to install {name}"))
        })
    }

    fn is_installed(&self, name: &str, version: &str) -> Result<bool> {
        let wanted = normalize_package_name(name);
        let installed = self.python.installed_packages()?;
        Ok(installed
            .iter()
            .find(|pkg| normalize_package_name(&pkg.name) == wanted)
            .is_some_and(|pkg| is_latest(version) || pkg.version == version))
    }

    fn install_from_nexus(&self, spec: &str, name: &str) -> Result<()> {
        self.pip_install(&nexus_install_args(spec, &self.index_url, !self.verbose), name)?;
        for requirement in self.fetch_requirements(name)? {
            tracing::debug!(%requirement, "installing dependency");
            let args = dependency_install_args(
                &requirement,
                &self.index_url,
                &self.extra_index_urls,
                !self.verbose,
            );
            self.pip_install(&args, name)?;
        }
        Ok(())
    }

    fn pip_install(&self, args: &[String], name: &str) -> Result<()> {
        let run = self.python.pip(args)?;
        if run.success {
            return Ok(());
        }
        let error = if run.output.contains("Connection refused")
            || run.output.contains("Could not find a version")
        {
            MurError::new(
                codes::REGISTRY_UNREACHABLE,
                format!("Failed to connect to artifact registry for {name}"),
            )
            .with_detail(
                "Could not establish connection to the artifact registry. Please check your \
                 network connection and registry URL.",
            )
        } else {
            MurError::new(codes::INSTALL_PROCESS_FAILED, format!("Failed to install {name}"))
                .with_detail("The artifact installation process failed.")
        };
        Err(error.with_debug(run.output).into())
    }

    fn fetch_requirements(&self, name: &str) -> Result<Vec<String>> {
        let url = format!("{}/{}/metadata/", self.index_url, name.replace('_', "-"));
        tracing::debug!(%url, "fetching artifact metadata");
        let metadata = self
            .http
            .get(&url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.json::<PackageMetadata>())
            .map_err(|err| metadata_error(name, err))?;
        Ok(metadata.requires_dist.unwrap_or_default())
    }
}

fn metadata_error(name: &str, err: reqwest::Error) -> MurError {
    if err.is_timeout() {
        MurError::new(
            codes::CONNECTION_FAILED,
            format!("Connection timed out while fetching metadata for {name}"),
        )
        .with_detail(
            "The request to the artifact registry timed out. Please try again or check your \
             network connection.",
        )
        .with_source(err)
    } else if err.is_connect() {
        MurError::new(
            codes::REGISTRY_UNREACHABLE,
            format!("Failed to connect to artifact registry for {name}"),
        )
        .with_detail(
            "Could not establish connection to the artifact registry. Please check your network \
             connection and registry URL.",
        )
        .with_source(err)
    } else {
        MurError::new(
            codes::CONNECTION_ERROR,
            format!("Failed to fetch metadata for {name}"),
        )
        .with_detail("Encountered an error while communicating with the artifact registry.")
        .with_source(err)
    }
}
