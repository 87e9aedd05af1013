//! External command execution.
//!
//! Builder-based API over `tokio::process`. Every external tool the pipeline
//! talks to (build, registry, renderer, exporter) runs through [`Cmd`], which
//! captures stdout, stderr, exit status and wall time.
//!
//! # Examples
//!
//! ```ignore
//! use crate::utils::exec::Cmd;
//!
//! let output = Cmd::from_slice(&config.build.command)
//!     .cwd(&config.root)
//!     .run()
//!     .await?;
//!
//! if !output.success() {
//!     log!("build"; "{}", output.error_message());
//! }
//! ```
//!
//! A spawn failure (program missing, bad cwd) is an `Err`. A non-zero exit
//! is an `Ok` output whose [`CommandOutput::success`] is false: callers
//! decide whether that aborts anything.

use crate::debug;
use anyhow::{Context, Result};
use regex::Regex;
use std::{
    ffi::{OsStr, OsString},
    fmt::Write as _,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    sync::OnceLock,
    time::{Duration, Instant},
};
use tokio::process::Command;

// ============================================================================
// Builder API
// ============================================================================

/// Command builder for external process execution.
#[derive(Debug, Default, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            ..Default::default()
        }
    }

    /// Create from a command array (e.g., `["openscad"]` or `["python", "-m", "src"]`).
    pub fn from_slice<S: AsRef<OsStr>>(cmd: &[S]) -> Self {
        let mut iter = cmd.iter();
        let program = iter
            .next()
            .map(|s| s.as_ref().to_owned())
            .unwrap_or_default();
        let args: Vec<_> = iter.map(|s| s.as_ref().to_owned()).collect();
        Self {
            args,
            ..Self::new(program)
        }
    }

    /// Add a single argument.
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        let arg = arg.as_ref();
        if !arg.is_empty() {
            self.args.push(arg.to_owned());
        }
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    /// Set working directory.
    pub fn cwd<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    /// Get the program name for error messages.
    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().to_string()
    }

    /// Full command line, space separated.
    pub fn display(&self) -> String {
        let mut line = self.program_name();
        for arg in &self.args {
            let _ = write!(line, " {}", arg.to_string_lossy());
        }
        line
    }

    /// Spawn the command, wait for it and capture its output.
    pub async fn run(self) -> Result<CommandOutput> {
        let name = self.program_name();
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        debug!("exec"; "{}", self.display());
        let start = Instant::now();
        let output = cmd
            .output()
            .await
            .with_context(|| format!("Failed to execute `{name}`"))?;

        Ok(CommandOutput {
            name,
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: start.elapsed(),
        })
    }
}

// ============================================================================
// Output
// ============================================================================

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    name: String,
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }

    /// Failure description: stderr, falling back to stdout, ANSI stripped.
    pub fn error_message(&self) -> String {
        let stderr = strip_ansi(self.stderr.trim());
        let detail = if stderr.is_empty() {
            strip_ansi(self.stdout.trim())
        } else {
            stderr
        };

        let mut msg = format!("`{}` failed with {}", self.name, self.status);
        if !detail.is_empty() {
            msg.push('\n');
            msg.push_str(&detail);
        }
        msg
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Strip ANSI escape codes from string.
pub fn strip_ansi(s: &str) -> std::borrow::Cow<'_, str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
    re.replace_all(s, "")
}

/// Warn about configured programs that are not on `PATH`.
///
/// Returns the names that could not be resolved.
pub fn missing_programs<'a>(commands: impl IntoIterator<Item = &'a [String]>) -> Vec<String> {
    let mut missing = Vec::new();
    for cmd in commands {
        let Some(program) = cmd.first() else { continue };
        if which::which(program).is_err() && !missing.contains(program) {
            missing.push(program.clone());
        }
    }
    missing
}

// ============================================================================
// Tests
// ============================================================================
