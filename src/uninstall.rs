use std::path::Path;

use anyhow::{Context, Result};

use crate::auth::AuthManager;
use crate::credentials::FileCredentialStore;
use crate::delegate::python::{PythonDelegate, PythonEnv};
use crate::error::{MurError, codes, ensure_coded, find_mur_error};
use crate::manifest::{ProjectManifest, normalize_package_name};
use crate::namespace;

const SCOPE_SEPARATORS: [char; 3] = ['_', '-', '.'];

pub fn run(name: Option<&str>, verbose: bool) -> Result<()> {
    let python = PythonDelegate::discover()?;
    let auth = AuthManager::new(FileCredentialStore::discover()?);
    let uninstaller = Uninstaller::new(&python, auth.username()?, verbose);
    match name {
        Some(name) => {
            uninstaller.uninstall_single(name)?;
            println!("✓ Successfully uninstalled {name}");
        }
        None => {
            let cwd = std::env::current_dir().context("unable to determine current directory")?;
            uninstaller.uninstall_manifest(&cwd)?;
            println!("✓ Successfully uninstalled all artifacts from manifest");
        }
    }
    Ok(())
}

pub struct Uninstaller<'a> {
    python: &'a dyn PythonEnv,
    username: Option<String>,
    verbose: bool,
}

impl<'a> Uninstaller<'a> {
    pub fn new(python: &'a dyn PythonEnv, username: Option<String>, verbose: bool) -> Self {
        Self {
            python,
            username,
            verbose,
        }
    }

    /// Removes `name`, then `<user>-name` when `name` is not already scoped,
    /// and drops the artifact's import lines.
    pub fn uninstall_single(&self, name: &str) -> Result<()> {
        let attempt = || -> Result<()> {
            self.uninstall_package(name)?;
            if let Some(user) = &self.username
                && !is_scoped(name, user)
            {
                self.uninstall_package(&format!("{user}-{name}"))?;
            }
            let unscoped = self.unscoped(name);
            if let Err(err) = namespace::cleanup_imports(self.python, unscoped) {
                self.warn_cleanup(&err);
            }
            Ok(())
        };
        attempt().map_err(|err| {
            ensure_coded(err, codes::UNINSTALL_FAILED, format!("Failed to uninstall {name}"))
        })
    }

    /// Uninstalls every agent and tool listed in `murmur.yaml`. Individual
    /// failures are logged and skipped.
    pub fn uninstall_manifest(&self, dir: &Path) -> Result<()> {
        let manifest = ProjectManifest::load_from_dir(dir).map_err(|err| {
            ensure_coded(
                err,
                codes::UNINSTALL_FAILED,
                "Failed to uninstall artifacts from manifest",
            )
        })?;
        let groups = [("agent", &manifest.agents), ("tool", &manifest.tools)];
        for (kind, artifacts) in groups {
            for artifact in artifacts.iter() {
                tracing::debug!(kind, name = %artifact.name, "uninstalling");
                if let Err(err) = self.uninstall_single(&artifact.name) {
                    tracing::warn!("Failed to uninstall {kind} {}: {err:#}", artifact.name);
                }
            }
        }
        Ok(())
    }

    /// Returns whether a matching package was installed.
    fn uninstall_package(&self, name: &str) -> Result<bool> {
        let installed = self.python.installed_packages().map_err(|err| {
            MurError::new(codes::UNINSTALL_FAILED, "Failed to check artifact status")
                .with_source(err)
        })?;
        let wanted = normalize_package_name(name);
        let Some(package) = installed
            .iter()
            .find(|pkg| normalize_package_name(&pkg.name) == wanted)
        else {
            tracing::info!("artifact {name} is not installed");
            return Ok(false);
        };

        tracing::info!("Uninstalling {}...", package.name);
        let args = vec!["uninstall".to_string(), "-y".to_string(), package.name.clone()];
        let run = self.python.pip(&args)?;
        if !run.success {
            return Err(MurError::new(
                codes::UNINSTALL_FAILED,
                format!("Failed to uninstall {}", package.name),
            )
            .with_debug(run.output)
            .into());
        }
        tracing::info!("Successfully uninstalled {}", package.name);
        Ok(true)
    }

    fn unscoped<'n>(&self, name: &'n str) -> &'n str {
        let Some(user) = &self.username else {
            return name;
        };
        name.strip_prefix(user.as_str())
            .and_then(|rest| rest.strip_prefix(SCOPE_SEPARATORS))
            .unwrap_or(name)
    }

    fn warn_cleanup(&self, err: &anyhow::Error) {
        match find_mur_error(err) {
            Some(mur) => tracing::warn!("{}", mur.render(self.verbose)),
            None => tracing::warn!("Failed to clean up init files: {err:#}"),
        }
    }
}

fn is_scoped(name: &str, user: &str) -> bool {
    name.strip_prefix(user)
        .is_some_and(|rest| rest.starts_with(SCOPE_SEPARATORS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::python::fake::FakePython;
    use std::fs;
    use tempfile::TempDir;

    fn uninstall_calls(python: &FakePython) -> Vec<String> {
        python
            .calls()
            .into_iter()
            .filter(|args| args[0] == "uninstall")
            .map(|args| args[2].clone())
            .collect()
    }

    #[test]
    fn scope_detection() {
        assert!(is_scoped("ada-calc", "ada"));
        assert!(is_scoped("ada.calc", "ada"));
        assert!(is_scoped("ada_calc", "ada"));
        assert!(!is_scoped("adacalc", "ada"));
        assert!(!is_scoped("calc", "ada"));
    }

    #[test]
    fn matches_normalized_name_and_tries_scope() {
        let site = TempDir::new().unwrap();
        let python = FakePython::with_murmur(site.path());
        python.install("Web.Search", "1.0.0");
        python.install("ada-web-search", "1.0.0");

        Uninstaller::new(&python, Some("ada".into()), false)
            .uninstall_single("web-search")
            .unwrap();
        assert_eq!(uninstall_calls(&python), vec!["Web.Search", "ada-web-search"]);
        assert!(python.installed_packages().unwrap().is_empty());
    }

    #[test]
    fn scoped_name_is_not_rescoped_and_cleanup_uses_unscoped() {
        let site = TempDir::new().unwrap();
        let python = FakePython::with_murmur(site.path());
        python.install("ada.calc", "1.0.0");
        let tools = site.path().join("murmur/tools");
        fs::create_dir_all(&tools).unwrap();
        fs::write(
            tools.join("__init__.py"),
            "from .calc.main import calc\nfrom .other.main import other\n",
        )
        .unwrap();

        Uninstaller::new(&python, Some("ada".into()), false)
            .uninstall_single("ada.calc")
            .unwrap();
        assert_eq!(uninstall_calls(&python), vec!["ada.calc"]);
        assert_eq!(
            fs::read_to_string(tools.join("__init__.py")).unwrap(),
            "from .other.main import other\n"
        );
    }

    #[test]
    fn missing_package_is_not_an_error() {
        let site = TempDir::new().unwrap();
        let python = FakePython::with_murmur(site.path());
        Uninstaller::new(&python, None, false)
            .uninstall_single("ghost")
            .unwrap();
        assert!(uninstall_calls(&python).is_empty());
    }

    #[test]
    fn missing_namespace_only_warns() {
        let python = FakePython::default();
        python.install("calc", "1.0.0");
        Uninstaller::new(&python, None, false)
            .uninstall_single("calc")
            .unwrap();
        assert_eq!(uninstall_calls(&python), vec!["calc"]);
    }

    #[test]
    fn pip_failure_is_coded() {
        let site = TempDir::new().unwrap();
        let mut python = FakePython::with_murmur(site.path());
        python.failure = Some(("uninstall".into(), "permission denied".into()));
        python.install("calc", "1.0.0");
        let err = Uninstaller::new(&python, None, false)
            .uninstall_single("calc")
            .unwrap_err();
        let mur = find_mur_error(&err).unwrap();
        assert_eq!(mur.code, codes::UNINSTALL_FAILED);
        assert!(mur.debug_messages.iter().any(|m| m.contains("permission denied")));
    }

    #[test]
    fn manifest_failures_are_skipped() {
        let site = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        fs::write(
            work.path().join("murmur.yaml"),
            "agents:\n  - name: planner\ntools:\n  - name: calc\n",
        )
        .unwrap();
        let mut python = FakePython::with_murmur(site.path());
        python.failure = Some(("planner".into(), "boom".into()));
        python.install("planner", "1.0.0");
        python.install("calc", "1.0.0");

        Uninstaller::new(&python, None, false)
            .uninstall_manifest(work.path())
            .unwrap();
        assert_eq!(uninstall_calls(&python), vec!["planner", "calc"]);
    }
}
