use clap::Args;
use serde::Serialize;

use gitship::credential::KeyFormat;
use gitship::defaults;
use gitship::deploy::{self, DeployOptions, DeployReport};
use gitship::paths;
use gitship::status::SystemClock;
use gitship::target::{PushMode, RemoteTarget};
use gitship::utils::command::SystemRunner;
use gitship::HttpStatusSource;

use super::{env_value, status_query, CmdResult, KEY_ENV, STATUS_TOKEN_ENV};

#[derive(Args)]
pub struct DeployArgs {
    /// Deployment remote URL (e.g. git@git.example.com:org/app.git)
    #[arg(long)]
    pub remote: String,

    /// Branch on the remote to push to [default: main]
    #[arg(long)]
    pub branch: Option<String>,

    /// Push the contents of this directory instead of the current HEAD
    #[arg(long, value_name = "DIR")]
    pub artifact_dir: Option<String>,

    /// Commit message for artifact pushes
    #[arg(long = "commit-msg", value_name = "MSG")]
    pub commit_msg: Option<String>,

    /// Push HEAD even if the working tree has uncommitted changes
    #[arg(long)]
    pub allow_dirty: bool,

    /// Force-push to the remote branch
    #[arg(long)]
    pub force: bool,

    /// Deployment status URL to poll after pushing
    #[arg(long, value_name = "URL")]
    pub status_url: Option<String>,

    /// Give up polling after this many seconds [default: 300]
    #[arg(long, value_name = "SECS")]
    pub status_timeout: Option<u64>,

    /// Seconds between status polls [default: 3]
    #[arg(long, value_name = "SECS")]
    pub status_interval: Option<u64>,

    /// Push without polling the status URL
    #[arg(long)]
    pub skip_poll: bool,

    /// How to read GIT_SSH_KEY: auto, base64 or raw
    #[arg(long, default_value = "auto")]
    pub key_format: KeyFormat,

    /// Repository to push in HEAD mode
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub repo: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutput {
    pub command: String,
    #[serde(flatten)]
    pub report: DeployReport,
}

pub fn run(args: DeployArgs) -> CmdResult<DeployOutput> {
    if args.remote.trim().is_empty() {
        return Err(gitship::Error::validation_missing_argument(vec![
            "remote".to_string(),
        ]));
    }

    let defaults = defaults::load_defaults();

    let branch = args
        .branch
        .clone()
        .unwrap_or_else(|| defaults.deploy.branch.clone());
    let mode = PushMode::from_artifact_dir(args.artifact_dir.as_deref().map(paths::expand));

    let status = match args.status_url.as_deref() {
        Some(url) => Some(status_query(
            url,
            args.status_timeout,
            args.status_interval,
            env_value(STATUS_TOKEN_ENV),
            &defaults.status,
        )?),
        None => None,
    };

    let options = DeployOptions {
        target: RemoteTarget::new(args.remote.trim(), branch, args.force),
        mode,
        repo_dir: paths::expand(&args.repo),
        allow_dirty: args.allow_dirty,
        commit_message: args.commit_msg,
        key_material: env_value(KEY_ENV),
        key_format: args.key_format,
        status,
        skip_poll: args.skip_poll,
        scratch_dir: paths::scratch(),
    };

    let source = HttpStatusSource::new(std::time::Duration::from_secs(
        defaults.status.request_timeout_secs,
    ));

    let report = deploy::run(&SystemRunner, &source, &SystemClock, &options, &defaults)?;

    Ok((
        DeployOutput {
            command: "deploy.run".to_string(),
            report,
        },
        0,
    ))
}
