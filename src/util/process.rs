use std::ffi::{OsStr, OsString};
use std::process::{Command, ExitStatus, Stdio};

use anyhow::{Context, Result};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamMode {
    Inherit,
    Capture,
}

impl StreamMode {
    fn stdio(self) -> Stdio {
        match self {
            StreamMode::Inherit => Stdio::inherit(),
            StreamMode::Capture => Stdio::piped(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub stdout: StreamMode,
    pub stderr: StreamMode,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdout: StreamMode::Capture,
            stderr: StreamMode::Capture,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    pub fn inherit(mut self) -> Self {
        self.stdout = StreamMode::Inherit;
        self.stderr = StreamMode::Inherit;
        self
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| part.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Captured stderr followed by stdout, trimmed.
    pub fn combined_text(&self) -> String {
        let mut text = self.stderr_text();
        let stdout = self.stdout_text();
        if !stdout.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stdout);
        }
        text.trim().to_string()
    }
}

pub fn run(spec: &CommandSpec) -> Result<CommandOutput> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(spec.stdout.stdio())
        .stderr(spec.stderr.stdio());
    tracing::debug!(command = %spec.display(), "running");

    let output = command
        .output()
        .with_context(|| format!("failed to spawn `{}`", spec.program.to_string_lossy()))?;
    tracing::debug!(status = ?output.status.code(), "finished `{}`", spec.program.to_string_lossy());
    Ok(CommandOutput {
        status: output.status,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}
