use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use which::which;

use crate::delegate::python::{PythonDelegate, is_path_like};
use crate::util::process::{self, CommandOutput, CommandSpec};

/// External program that turns an artifact project into wheel and sdist.
#[derive(Debug, Clone)]
pub struct BuildToolDelegate {
    program: OsString,
    prefix_args: Vec<OsString>,
}

impl BuildToolDelegate {
    /// `MUR_BUILD_TOOL` (a program optionally followed by arguments, e.g.
    /// `uv build`), else `<python> -m build`.
    pub fn discover() -> Result<Self> {
        if let Ok(raw) = std::env::var("MUR_BUILD_TOOL")
            && !raw.trim().is_empty()
        {
            return Self::from_command_line(&raw);
        }
        let python = PythonDelegate::discover()?;
        Ok(Self {
            program: python.program().clone(),
            prefix_args: vec!["-m".into(), "build".into()],
        })
    }

    pub fn from_command_line(raw: &str) -> Result<Self> {
        let mut parts = raw.split_whitespace();
        let Some(first) = parts.next() else {
            bail!("MUR_BUILD_TOOL is empty");
        };
        let path = PathBuf::from(first);
        let program = if is_path_like(&path) {
            if !path.exists() {
                bail!(
                    "MUR_BUILD_TOOL points to `{}` but it does not exist",
                    path.display()
                );
            }
            path.into_os_string()
        } else {
            which(first)
                .with_context(|| format!("build tool `{first}` was not found on PATH"))?
                .into_os_string()
        };
        Ok(Self {
            program,
            prefix_args: parts.map(OsString::from).collect(),
        })
    }

    pub fn program(&self) -> &OsString {
        &self.program
    }

    pub fn command(&self, project_dir: &Path, out_dir: &Path) -> CommandSpec {
        CommandSpec::new(self.program.clone())
            .args(&self.prefix_args)
            .arg("--outdir")
            .arg(out_dir)
            .arg(project_dir)
    }

    /// Runs the build. Output is streamed when `verbose`, otherwise captured
    /// and returned for error reporting.
    pub fn build(&self, project_dir: &Path, out_dir: &Path, verbose: bool) -> Result<CommandOutput> {
        let mut spec = self.command(project_dir, out_dir);
        if verbose {
            spec = spec.inherit();
        }
        process::run(&spec)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn command_line_keeps_extra_arguments() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("builder");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tool =
            BuildToolDelegate::from_command_line(&format!("{} build --wheel", script.display()))
                .unwrap();
        let spec = tool.command(Path::new("/work/search"), Path::new("/work/search/dist"));
        assert_eq!(
            spec.display(),
            format!(
                "{} build --wheel --outdir /work/search/dist /work/search",
                script.display()
            )
        );
    }

    #[test]
    fn missing_path_is_rejected() {
        let err = BuildToolDelegate::from_command_line("/nonexistent/mur-builder").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
