//! Push executor. A single push attempt is authoritative: failures are
//! returned, never retried.

use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::git::Git;
use crate::payload::PreparedPayload;
use crate::target::RemoteTarget;

const CLONE_REMOTE: &str = "origin";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResult {
    pub mode: String,
    pub remote: String,
    pub branch: String,
    pub forced: bool,
    pub success: bool,
    /// Artifact mode only: whether a new commit was created before pushing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed: Option<bool>,
}

/// Arguments for `git push`. `--force` always precedes the destination.
pub fn push_args(remote: &str, branch: &str, force: bool) -> Vec<String> {
    let mut args = vec!["push".to_string()];
    if force {
        args.push("--force".to_string());
    }
    args.push(remote.to_string());
    args.push(format!("HEAD:refs/heads/{}", branch));
    args
}

/// Remote name unique to this invocation, so concurrent runs in the same
/// repository never collide.
pub fn temporary_remote_name(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &id[..8])
}

/// Push the prepared payload to `target`.
pub fn execute(
    git: &Git<'_>,
    target: &RemoteTarget,
    payload: &PreparedPayload,
    remote_name_prefix: &str,
) -> Result<PushResult> {
    let committed = match payload {
        PreparedPayload::Head { repo_dir } => {
            let remote = temporary_remote_name(remote_name_prefix);
            git.remote_add(repo_dir, &remote, &target.url)?;

            log_status!(
                "push",
                "Pushing current HEAD to {} branch {}",
                target.url,
                target.branch
            );
            let pushed = git.push(
                repo_dir,
                &push_args(&remote, &target.branch, target.force),
            );

            // Removal runs whether or not the push succeeded.
            let removed = git.remote_remove(repo_dir, &remote);
            if !removed.success {
                log_status!(
                    "push",
                    "Could not remove temporary remote {}: {}",
                    remote,
                    removed.error_text()
                );
            }

            pushed?;
            None
        }
        PreparedPayload::Artifact(checkout) => {
            log_status!(
                "push",
                "Pushing artifact commit to {} branch {}",
                target.url,
                target.branch
            );
            git.push(
                checkout.path(),
                &push_args(CLONE_REMOTE, &target.branch, target.force),
            )?;
            Some(checkout.committed)
        }
    };

    log_status!(
        "push",
        "Push to {} branch {} complete",
        target.url,
        target.branch
    );

    Ok(PushResult {
        mode: payload.mode_name().to_string(),
        remote: target.url.clone(),
        branch: target.branch.clone(),
        forced: target.force,
        success: true,
        committed,
    })
}
