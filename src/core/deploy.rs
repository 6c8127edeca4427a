use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;

use crate::credential::{self, KeyFormat};
use crate::defaults::Defaults;
use crate::error::{Error, Result};
use crate::git::Git;
use crate::payload;
use crate::push::{self, PushResult};
use crate::status::{self, Clock, StatusOutcome, StatusPoll, StatusQuery, StatusRules, StatusSource};
use crate::target::{PushMode, RemoteTarget};
use crate::utils::command::CommandRunner;

// =============================================================================
// Types
// =============================================================================

/// Inputs for one deployment run.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub target: RemoteTarget,
    pub mode: PushMode,
    /// Repository pushed in direct-HEAD mode.
    pub repo_dir: PathBuf,
    /// Push HEAD even when the working tree has uncommitted changes.
    pub allow_dirty: bool,
    /// Artifact commit message; defaults to `<prefix>: <UTC timestamp>`.
    pub commit_message: Option<String>,
    /// SSH key material. Never logged.
    pub key_material: Option<String>,
    pub key_format: KeyFormat,
    pub status: Option<StatusQuery>,
    pub skip_poll: bool,
    /// Where the key file and the ephemeral clone are created.
    pub scratch_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub polled: bool,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub result: Option<StatusPoll>,
}

/// Result of a deployment. The push and the remote status are separate facts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
    pub push: PushResult,
    pub status: StatusReport,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

// =============================================================================
// Orchestration
// =============================================================================

/// Run a deployment: precondition, credential, payload, push, status.
///
/// The key file and the ephemeral clone are owned by guards in this function,
/// so they are removed on every exit path. An explicit failure status from the
/// remote is returned as `deploy.failed` carrying the push result; a status
/// timeout is only a warning.
pub fn run(
    runner: &dyn CommandRunner,
    source: &dyn StatusSource,
    clock: &dyn Clock,
    options: &DeployOptions,
    defaults: &Defaults,
) -> Result<DeployReport> {
    let mut warnings = Vec::new();

    log_status!(
        "deploy",
        "Deploying {} to {} branch {}",
        options.mode.as_str(),
        options.target.url,
        options.target.branch
    );

    if let PushMode::DirectHead = options.mode {
        check_worktree(runner, options, &mut warnings)?;
    }

    let credential = credential::materialize(
        options.key_material.as_deref(),
        options.key_format,
        &options.scratch_dir,
    )?;

    let pushed = push_payload(runner, options, defaults, credential.as_ref(), &mut warnings);

    if let Some(handle) = credential {
        handle.release();
    }
    let push = pushed?;

    let status = observe(source, clock, options, defaults, &push, &mut warnings)?;

    Ok(DeployReport {
        push,
        status,
        warnings,
    })
}

fn check_worktree(
    runner: &dyn CommandRunner,
    options: &DeployOptions,
    warnings: &mut Vec<String>,
) -> Result<()> {
    let changes = Git::new(runner).status_porcelain(&options.repo_dir)?;
    if changes.is_empty() {
        return Ok(());
    }

    if !options.allow_dirty {
        return Err(Error::dirty_worktree(
            options.repo_dir.display().to_string(),
            changes,
        ));
    }

    let warning = format!(
        "Working tree has {} uncommitted change(s); pushing HEAD without them",
        changes.len()
    );
    log_status!("deploy", "{}", warning);
    warnings.push(warning);
    Ok(())
}

fn push_payload(
    runner: &dyn CommandRunner,
    options: &DeployOptions,
    defaults: &Defaults,
    credential: Option<&credential::CredentialHandle>,
    warnings: &mut Vec<String>,
) -> Result<PushResult> {
    let git = Git::with_credential(runner, credential, defaults.deploy.strict_host_key_checking);

    let commit_message = options.commit_message.clone().unwrap_or_else(|| {
        payload::default_commit_message(&defaults.deploy.commit_message_prefix, Utc::now())
    });

    let prepared = payload::prepare(
        &git,
        &options.target,
        &options.mode,
        &options.repo_dir,
        &commit_message,
        &options.scratch_dir,
    )?;

    let result = push::execute(
        &git,
        &options.target,
        &prepared,
        &defaults.deploy.remote_name_prefix,
    );

    if let payload::PreparedPayload::Artifact(checkout) = prepared {
        if !checkout.committed {
            warnings.push("Artifact matches the remote branch; nothing new was committed".to_string());
        }
        checkout.release();
    }

    result
}

fn observe(
    source: &dyn StatusSource,
    clock: &dyn Clock,
    options: &DeployOptions,
    defaults: &Defaults,
    push: &PushResult,
    warnings: &mut Vec<String>,
) -> Result<StatusReport> {
    let query = match &options.status {
        Some(query) => query,
        None => return Ok(StatusReport::default()),
    };

    if options.skip_poll {
        log_status!("deploy", "Skipping status poll");
        return Ok(StatusReport {
            skipped: true,
            url: Some(query.url.clone()),
            ..StatusReport::default()
        });
    }

    let rules = StatusRules::from_defaults(&defaults.status);
    let poll = status::poll(source, clock, query, &rules);

    if poll.transport_errors > 0 {
        warnings.push(format!(
            "{} status request(s) failed and were retried",
            poll.transport_errors
        ));
    }
    if let StatusOutcome::TimedOut(_) = poll.outcome {
        warnings.push(format!(
            "Status poll timed out after {}s; the deployment may still complete",
            query.timeout.as_secs()
        ));
    }

    let push_details = serde_json::to_value(push).unwrap_or_default();
    let poll = poll.into_result(&query.url, Some(push_details))?;

    Ok(StatusReport {
        polled: true,
        skipped: false,
        url: Some(query.url.clone()),
        result: Some(poll),
    })
}
