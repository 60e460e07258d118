//! Process execution utilities
//!
//! External tools (configure/make, the NDK compilers, Gradle, javac) are
//! black boxes the pipelines call into. Calls are described by an
//! [`Invocation`] and executed by a [`Runner`], so the pipelines can be
//! exercised without the tools installed.

use crate::env_overlay::EnvOverlay;
use crate::error::{Error, ErrorCode, Result};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::{debug, warn};

/// Result of a command execution
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Whether the command succeeded (exit code 0)
    pub success: bool,
    /// Exit code of the command
    pub exit_code: i32,
    /// Standard output (empty when streamed)
    pub stdout: String,
    /// Standard error (empty when streamed)
    pub stderr: String,
}

impl CommandResult {
    /// Create from std::process::Output
    pub fn from_output(output: Output) -> Self {
        Self {
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }

    /// Result of a command whose output went straight to the terminal
    pub fn from_exit_code(exit_code: i32) -> Self {
        Self {
            success: exit_code == 0,
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Get combined output (stdout + stderr)
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// A single external command: program, arguments, directory and env overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: EnvOverlay,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: EnvOverlay::new(),
        }
    }

    /// Split a whitespace-separated command line into an invocation
    pub fn parse(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::process("Empty command line"))?;
        Ok(Self::new(program).args(parts))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Attach environment overrides
    pub fn envs(mut self, overlay: &EnvOverlay) -> Self {
        self.env.merge(overlay);
        self
    }

    /// Printable command line
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in self.env.iter() {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Executes invocations
pub trait Runner {
    /// Run to completion; a non-zero exit is reported in the result, not as an error
    fn run(&self, invocation: &Invocation) -> Result<CommandResult>;

    /// Whether `program` can be found
    fn has_program(&self, program: &str) -> bool {
        command_exists(program)
    }

    /// Fail with the first of `programs` that cannot be found
    fn require_programs(&self, programs: &[&str]) -> Result<()> {
        match programs.iter().find(|p| !self.has_program(p)) {
            Some(missing) => Err(Error::command_not_found(missing)),
            None => Ok(()),
        }
    }

    /// Run and log a warning on non-zero exit
    ///
    /// Used where the produced artifact, not the exit code, decides success.
    fn run_logged(&self, invocation: &Invocation) -> Result<CommandResult> {
        let result = self.run(invocation)?;
        if !result.success {
            warn!(
                command = %invocation.command_line(),
                exit_code = result.exit_code,
                "command exited with failure"
            );
        }
        Ok(result)
    }

    /// Run and turn a non-zero exit into an error
    fn run_checked(&self, invocation: &Invocation) -> Result<CommandResult> {
        let result = self.run(invocation)?;
        if result.success {
            Ok(result)
        } else {
            Err(Error::new(
                ErrorCode::CommandFailed,
                format!(
                    "`{}` exited with code {}",
                    invocation.command_line(),
                    result.exit_code
                ),
            )
            .with_context(result.combined_output()))
        }
    }
}

/// Runs invocations as real child processes
#[derive(Debug, Clone, Copy)]
pub struct SystemRunner {
    streaming: bool,
}

impl SystemRunner {
    /// Child output goes straight to the terminal
    pub fn streaming() -> Self {
        Self { streaming: true }
    }

    /// Child output is captured into the result
    pub fn captured() -> Self {
        Self { streaming: false }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::streaming()
    }
}

impl Runner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandResult> {
        debug!(
            command = %invocation.command_line(),
            cwd = ?invocation.cwd,
            overrides = invocation.env.len(),
            "running"
        );

        let mut cmd = invocation.to_command();
        let spawn_err = |e: std::io::Error| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::command_not_found(&invocation.program).with_source(e)
            } else {
                Error::process(format!("Failed to execute {}: {}", invocation.program, e))
                    .with_source(e)
            }
        };

        if self.streaming {
            let status = cmd
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .map_err(spawn_err)?;
            Ok(CommandResult::from_exit_code(status.code().unwrap_or(-1)))
        } else {
            let output = cmd
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .map_err(spawn_err)?;
            Ok(CommandResult::from_output(output))
        }
    }
}

/// Runner that records invocations instead of executing them
///
/// Rules registered with [`RecordingRunner::creates`] fabricate the file a
/// real tool would have produced, so stage artifact checks can pass.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: RefCell<Vec<Invocation>>,
    rules: Vec<(String, PathBuf)>,
    missing: Vec<String>,
    exit_code: i32,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// When a command line contains `needle`, create `path`
    pub fn creates(mut self, needle: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.rules.push((needle.into(), path.into()));
        self
    }

    /// Report `program` as not installed
    pub fn without_program(mut self, program: impl Into<String>) -> Self {
        self.missing.push(program.into());
        self
    }

    /// Exit code reported for every call
    pub fn exiting_with(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Recorded invocations, in call order
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    /// Recorded command lines, in call order
    pub fn command_lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(Invocation::command_line).collect()
    }
}

impl Runner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandResult> {
        let line = invocation.command_line();
        for (needle, path) in &self.rules {
            if line.contains(needle.as_str()) {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, needle.as_bytes())?;
            }
        }
        self.calls.borrow_mut().push(invocation.clone());
        Ok(CommandResult::from_exit_code(self.exit_code))
    }

    fn has_program(&self, program: &str) -> bool {
        !self.missing.iter().any(|m| m == program)
    }
}

/// Check if a command exists in PATH
pub fn command_exists(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Resolve `program` relative to `dir` when it is a path, as `./gradlew` is
pub fn local_program(dir: &Path, program: &str) -> String {
    if program.starts_with("./") {
        dir.join(program.trim_start_matches("./"))
            .to_string_lossy()
            .into_owned()
    } else {
        program.to_string()
    }
}
