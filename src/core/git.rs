use std::path::Path;

use crate::credential::CredentialHandle;
use crate::error::{CommandFailedDetails, Error, Result};
use crate::utils::command::{CommandOutput, CommandRunner, Invocation};

// ============================================================================
// Git session
// ============================================================================

/// Git invocations bound to one runner and one transport configuration.
///
/// When a credential is present every invocation built here carries
/// `GIT_SSH_COMMAND`, so no git call in a run can bypass the key.
pub struct Git<'a> {
    runner: &'a dyn CommandRunner,
    transport_env: Vec<(String, String)>,
}

impl<'a> Git<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            transport_env: vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())],
        }
    }

    pub fn with_credential(
        runner: &'a dyn CommandRunner,
        credential: Option<&CredentialHandle>,
        strict_host_key_checking: bool,
    ) -> Self {
        let mut git = Self::new(runner);
        if let Some(handle) = credential {
            let ssh_command = handle.ssh_command(strict_host_key_checking);
            log_status!("git", "Using GIT_SSH_COMMAND={}", ssh_command);
            git.transport_env
                .push(("GIT_SSH_COMMAND".to_string(), ssh_command));
        }
        git
    }

    pub fn transport_env(&self) -> &[(String, String)] {
        &self.transport_env
    }

    fn invocation(&self, dir: Option<&Path>, args: &[&str]) -> Invocation {
        let invocation = Invocation::new("git", args.iter().copied()).with_envs(&self.transport_env);
        match dir {
            Some(dir) => invocation.in_dir(dir),
            None => invocation,
        }
    }

    fn checked(
        &self,
        invocation: Invocation,
        on_failure: fn(CommandFailedDetails) -> Error,
    ) -> Result<CommandOutput> {
        let output = self.runner.execute(&invocation)?;
        if !output.success {
            return Err(on_failure(output.failure_details(&invocation)));
        }
        Ok(output)
    }

    // ========================================================================
    // Working tree
    // ========================================================================

    /// `git status --porcelain` lines for the working tree.
    pub fn status_porcelain(&self, dir: &Path) -> Result<Vec<String>> {
        let output = self.checked(
            self.invocation(Some(dir), &["status", "--porcelain"]),
            Error::git_command_failed,
        )?;

        Ok(output
            .stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(String::from)
            .collect())
    }

    /// Check if a git working directory has no uncommitted changes.
    pub fn is_clean(&self, dir: &Path) -> Result<bool> {
        Ok(self.status_porcelain(dir)?.is_empty())
    }

    /// Short hash of HEAD, or None outside a repository.
    pub fn short_sha(&self, dir: &Path) -> Option<String> {
        let output = self
            .runner
            .run_unchecked(&self.invocation(Some(dir), &["rev-parse", "--short", "HEAD"]));
        let sha = output.stdout.trim();
        if output.success && !sha.is_empty() {
            Some(sha.to_string())
        } else {
            None
        }
    }

    // ========================================================================
    // Clone / commit
    // ========================================================================

    /// Clone a git repository into `dest` (which may exist if empty).
    pub fn clone(&self, url: &str, dest: &Path) -> Result<()> {
        let dest = dest.to_string_lossy();
        self.checked(
            self.invocation(None, &["clone", url, &dest]),
            Error::git_clone_failed,
        )?;
        Ok(())
    }

    /// Create `branch` or reset it to the current HEAD, and check it out.
    pub fn checkout_reset(&self, dir: &Path, branch: &str) -> Result<()> {
        self.checked(
            self.invocation(Some(dir), &["checkout", "-B", branch]),
            Error::git_command_failed,
        )?;
        Ok(())
    }

    pub fn add_all(&self, dir: &Path) -> Result<()> {
        self.checked(
            self.invocation(Some(dir), &["add", "-A"]),
            Error::git_command_failed,
        )?;
        Ok(())
    }

    /// Commit staged changes. Returns `false` without committing when there
    /// is nothing to commit.
    pub fn commit_all(&self, dir: &Path, message: &str) -> Result<bool> {
        if self.is_clean(dir)? {
            log_status!("git", "Nothing to commit, working tree clean");
            return Ok(false);
        }

        self.checked(
            self.invocation(Some(dir), &["commit", "-m", message]),
            Error::git_commit_failed,
        )?;
        Ok(true)
    }

    // ========================================================================
    // Remotes / push
    // ========================================================================

    pub fn remote_add(&self, dir: &Path, name: &str, url: &str) -> Result<()> {
        self.checked(
            self.invocation(Some(dir), &["remote", "add", name, url]),
            Error::git_command_failed,
        )?;
        Ok(())
    }

    /// Remove a remote if it exists. Never fails.
    pub fn remote_remove(&self, dir: &Path, name: &str) -> CommandOutput {
        self.runner
            .run_unchecked(&self.invocation(Some(dir), &["remote", "remove", name]))
    }

    /// Push with pre-built arguments (see [`crate::push::push_args`]).
    pub fn push(&self, dir: &Path, args: &[String]) -> Result<CommandOutput> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.checked(self.invocation(Some(dir), &args), Error::git_push_failed)
    }
}
