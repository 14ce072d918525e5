use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use which::which;

use crate::util::json::parse_tool_json;
use crate::util::process::{self, CommandSpec};

const INTERPRETERS: [&str; 2] = ["python3", "python"];

/// One row of `pip list --format=json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
}

/// Result of a pip invocation that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipRun {
    pub success: bool,
    pub output: String,
}

/// The Python environment artifacts are installed into.
pub trait PythonEnv {
    /// Runs `pip <args>`; a non-zero exit is reported through [`PipRun`].
    fn pip(&self, args: &[String]) -> Result<PipRun>;

    fn installed_packages(&self) -> Result<Vec<InstalledPackage>>;

    fn has_module(&self, module: &str) -> Result<bool>;

    /// `sysconfig` purelib directory.
    fn purelib(&self) -> Result<PathBuf>;

    /// Search locations of a (namespace) package; empty when it is not importable.
    fn module_locations(&self, module: &str) -> Result<Vec<PathBuf>>;
}

pub struct PythonDelegate {
    program: OsString,
}

impl PythonDelegate {
    /// `MUR_PYTHON`, else `python3`, else `python` from `PATH`.
    pub fn discover() -> Result<Self> {
        if let Some(env_override) = std::env::var_os("MUR_PYTHON") {
            let path = PathBuf::from(&env_override);
            if is_path_like(&path) {
                if !path.exists() {
                    bail!(
                        "MUR_PYTHON points to `{}` but it does not exist",
                        path.display()
                    );
                }
                return Ok(Self::new(env_override));
            }
            let resolved = which(&env_override).with_context(|| {
                format!(
                    "MUR_PYTHON is `{}` but it was not found on PATH",
                    path.display()
                )
            })?;
            return Ok(Self::new(resolved.into_os_string()));
        }

        INTERPRETERS
            .iter()
            .find_map(|name| which(name).ok())
            .map(|path| Self::new(path.into_os_string()))
            .ok_or_else(|| {
                anyhow!(
                    "a Python interpreter is required but neither `python3` nor `python` was \
                     found on PATH. Install Python or set MUR_PYTHON."
                )
            })
    }

    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &OsString {
        &self.program
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(self.program.clone())
    }

    fn eval(&self, code: &str) -> Result<process::CommandOutput> {
        process::run(&self.command().arg("-c").arg(code))
    }

    fn eval_stdout(&self, code: &str, label: &str) -> Result<String> {
        let output = self.eval(code)?;
        if !output.success() {
            bail!(
                "`{}` failed while resolving {label}: {}",
                self.program.to_string_lossy(),
                output.combined_text()
            );
        }
        Ok(output.stdout_text())
    }
}

impl PythonEnv for PythonDelegate {
    fn pip(&self, args: &[String]) -> Result<PipRun> {
        let spec = self.command().args(["-m", "pip"]).args(args);
        let output = process::run(&spec)?;
        let text = output.combined_text();
        if !text.is_empty() {
            tracing::debug!(target: "mur::pip", "{text}");
        }
        Ok(PipRun {
            success: output.success(),
            output: text,
        })
    }

    fn installed_packages(&self) -> Result<Vec<InstalledPackage>> {
        let spec = self
            .command()
            .args(["-m", "pip", "list", "--format=json", "--disable-pip-version-check"]);
        let output = process::run(&spec)?;
        if !output.success() {
            bail!("pip list failed: {}", output.stderr_text().trim());
        }
        parse_tool_json(&output.stdout, "pip list")
    }

    fn has_module(&self, module: &str) -> Result<bool> {
        let code = format!(
            "import importlib.util, sys; sys.exit(0 if importlib.util.find_spec({module:?}) else 1)"
        );
        Ok(self.eval(&code)?.success())
    }

    fn purelib(&self) -> Result<PathBuf> {
        let stdout = self.eval_stdout(
            "import sysconfig; print(sysconfig.get_path('purelib'))",
            "purelib",
        )?;
        let trimmed = stdout.trim();
        anyhow::ensure!(!trimmed.is_empty(), "python reported an empty purelib path");
        Ok(PathBuf::from(trimmed))
    }

    fn module_locations(&self, module: &str) -> Result<Vec<PathBuf>> {
        let code = format!(
            "import importlib.util\n\
             spec = importlib.util.find_spec({module:?})\n\
             for location in (spec.submodule_search_locations or []) if spec else []:\n    print(location)"
        );
        let stdout = self.eval_stdout(&code, &format!("`{module}` locations"))?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect())
    }
}

pub fn is_path_like(program: &Path) -> bool {
    program.components().count() > 1
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::RefCell;

    /// Records pip invocations and answers from canned state.
    #[derive(Default)]
    pub(crate) struct FakePython {
        pub(crate) calls: RefCell<Vec<Vec<String>>>,
        pub(crate) installed: RefCell<Vec<InstalledPackage>>,
        pub(crate) modules: Vec<String>,
        pub(crate) purelib: PathBuf,
        pub(crate) locations: Vec<PathBuf>,
        /// Pip calls whose joined argv contains this text fail with the output.
        pub(crate) failure: Option<(String, String)>,
    }

    impl FakePython {
        pub(crate) fn with_murmur(purelib: &Path) -> Self {
            Self {
                modules: vec!["murmur".to_string()],
                purelib: purelib.to_path_buf(),
                locations: vec![purelib.join("murmur")],
                ..Self::default()
            }
        }

        pub(crate) fn install(&self, name: &str, version: &str) {
            self.installed.borrow_mut().push(InstalledPackage {
                name: name.to_string(),
                version: version.to_string(),
            });
        }

        pub(crate) fn calls(&self) -> Vec<Vec<String>> {
            self.calls.borrow().clone()
        }
    }

    impl PythonEnv for FakePython {
        fn pip(&self, args: &[String]) -> Result<PipRun> {
            self.calls.borrow_mut().push(args.to_vec());
            let joined = args.join(" ");
            if let Some((needle, output)) = &self.failure
                && joined.contains(needle.as_str())
            {
                return Ok(PipRun {
                    success: false,
                    output: output.clone(),
                });
            }
            if args.first().map(String::as_str) == Some("uninstall")
                && let Some(name) = args.last()
            {
                self.installed.borrow_mut().retain(|pkg| &pkg.name != name);
            }
            Ok(PipRun {
                success: true,
                output: String::new(),
            })
        }

        fn installed_packages(&self) -> Result<Vec<InstalledPackage>> {
            Ok(self.installed.borrow().clone())
        }

        fn has_module(&self, module: &str) -> Result<bool> {
            Ok(self.modules.iter().any(|m| m == module))
        }

        fn purelib(&self) -> Result<PathBuf> {
            Ok(self.purelib.clone())
        }

        fn module_locations(&self, module: &str) -> Result<Vec<PathBuf>> {
            if self.modules.iter().any(|m| m == module) {
                Ok(self.locations.clone())
            } else {
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_like_detection() {
        assert!(is_path_like(Path::new("/usr/bin/python3")));
        assert!(is_path_like(Path::new("./venv/bin/python")));
        assert!(!is_path_like(Path::new("python3")));
    }

    #[test]
    fn installed_package_parses_pip_list_row() {
        let rows: Vec<InstalledPackage> =
            serde_json::from_str(r#"[{"name":"ada-search","version":"1.0.0","editable_project_location":"/x"}]"#)
                .unwrap();
        assert_eq!(rows[0].name, "ada-search");
    }
}
