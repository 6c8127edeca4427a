//! Command execution primitives with consistent error handling.
//!
//! Every invocation is echoed to stderr as `$ program args...` before it runs.
//! Environment values and stdin are never echoed, so secrets must travel
//! through those channels (or as file paths), never as arguments.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Serialize;

use crate::error::{CommandFailedDetails, Error, Result};
use crate::utils::shell;

/// A fully described external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
    /// Stream output to our stderr instead of capturing it.
    pub passthrough: bool,
}

impl Invocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_envs(mut self, vars: &[(String, String)]) -> Self {
        self.env.extend(vars.iter().cloned());
        self
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn passthrough(mut self) -> Self {
        self.passthrough = true;
        self
    }

    /// Shell-quoted command line for display. Never includes env or stdin.
    pub fn display(&self) -> String {
        shell::command_line(&self.program, &self.args)
    }
}

/// Captured output from command execution.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
            exit_code: 0,
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
            exit_code,
        }
    }

    /// Prefers stderr, falls back to stdout if stderr is empty.
    pub fn error_text(&self) -> &str {
        if !self.stderr.trim().is_empty() {
            self.stderr.trim()
        } else {
            self.stdout.trim()
        }
    }

    pub fn failure_details(&self, invocation: &Invocation) -> CommandFailedDetails {
        CommandFailedDetails {
            command: invocation.display(),
            exit_code: self.exit_code,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        }
    }
}

/// Executes external processes.
pub trait CommandRunner {
    /// Run the command and return its output whatever the exit status.
    /// Only a failure to start the process is an error.
    fn execute(&self, invocation: &Invocation) -> Result<CommandOutput>;

    /// Run the command, failing with `command.failed` on a nonzero exit.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let output = self.execute(invocation)?;
        if !output.success {
            return Err(Error::command_failed(output.failure_details(invocation)));
        }
        Ok(output)
    }

    /// Run the command without raising. Start failures become exit code -1.
    fn run_unchecked(&self, invocation: &Invocation) -> CommandOutput {
        match self.execute(invocation) {
            Ok(output) => output,
            Err(err) => CommandOutput::failed(-1, err.message),
        }
    }
}

/// Runs commands on the local machine via `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn execute(&self, invocation: &Invocation) -> Result<CommandOutput> {
        eprintln!("$ {}", invocation.display());

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);

        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        cmd.envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        if invocation.passthrough {
            // stdout carries the JSON envelope, so child output goes to stderr.
            cmd.stdout(Stdio::from(std::io::stderr()))
                .stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        cmd.stdin(if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let spawn_error = |e: std::io::Error| {
            Error::command_failed(CommandFailedDetails {
                command: invocation.display(),
                exit_code: -1,
                stdout: String::new(),
                stderr: format!("Failed to run {}: {}", invocation.program, e),
            })
        };

        let mut child = cmd.spawn().map_err(spawn_error)?;

        if let Some(input) = &invocation.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).map_err(spawn_error)?;
            }
        }

        let out = child.wait_with_output().map_err(spawn_error)?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        })
    }
}

/// Scripted runner for unit tests: records every invocation and answers
/// from a responder closure.
#[cfg(test)]
pub(crate) mod fake {
    use std::cell::RefCell;

    use super::{CommandOutput, CommandRunner, Invocation};
    use crate::error::Result;

    pub(crate) struct ScriptedRunner {
        calls: RefCell<Vec<Invocation>>,
        responder: Box<dyn Fn(&Invocation) -> CommandOutput>,
    }

    impl ScriptedRunner {
        pub(crate) fn new(responder: impl Fn(&Invocation) -> CommandOutput + 'static) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                responder: Box::new(responder),
            }
        }

        /// Every command succeeds with empty output.
        pub(crate) fn succeeding() -> Self {
            Self::new(|_| CommandOutput::ok(""))
        }

        pub(crate) fn calls(&self) -> Vec<Invocation> {
            self.calls.borrow().clone()
        }

        /// Display lines of every recorded call.
        pub(crate) fn lines(&self) -> Vec<String> {
            self.calls.borrow().iter().map(Invocation::display).collect()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn execute(&self, invocation: &Invocation) -> Result<CommandOutput> {
            self.calls.borrow_mut().push(invocation.clone());
            Ok((self.responder)(invocation))
        }
    }

    /// True when the invocation is `git <subcommand> ...`.
    pub(crate) fn is_git(invocation: &Invocation, subcommand: &str) -> bool {
        invocation.program == "git" && invocation.args.first().map(String::as_str) == Some(subcommand)
    }
}
