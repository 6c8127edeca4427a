use clap::Args;
use serde::Serialize;

use gitship::defaults;
use gitship::paths;
use gitship::pipeline::{self, PipelineOptions, PipelineReport, RegistryLogin};
use gitship::utils::command::SystemRunner;

use super::{env_value, CmdResult, GHCR_TOKEN_ENV, GHCR_USER_ENV};

#[derive(Args)]
pub struct PipelineArgs {
    /// Image reference without tag, e.g. ghcr.io/org/app
    #[arg(long)]
    pub image: String,

    /// Target environment name [default: prod]
    #[arg(long)]
    pub target: Option<String>,

    /// Path to the project root
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub project_dir: String,

    /// Skip npm install and tests
    #[arg(long)]
    pub skip_tests: bool,

    /// Build the image but do not push it
    #[arg(long)]
    pub no_push: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub command: String,
    #[serde(flatten)]
    pub report: PipelineReport,
}

pub fn run(args: PipelineArgs) -> CmdResult<PipelineOutput> {
    let image = args.image.trim();
    if image.is_empty() {
        return Err(gitship::Error::validation_missing_argument(vec![
            "image".to_string(),
        ]));
    }
    if image.rsplit('/').next().is_some_and(|name| name.contains(':')) {
        return Err(gitship::Error::validation_invalid_argument(
            "image",
            "Pass the image without a tag; the git short sha is appended",
        ));
    }

    let registry_login = match (env_value(&[GHCR_USER_ENV]), env_value(&[GHCR_TOKEN_ENV])) {
        (Some(user), Some(token)) => Some(RegistryLogin { user, token }),
        _ => None,
    };

    let options = PipelineOptions {
        image: image.to_string(),
        target: args.target,
        project_dir: paths::expand(&args.project_dir),
        skip_tests: args.skip_tests,
        no_push: args.no_push,
        registry_login,
    };

    let report = pipeline::run(&SystemRunner, &options, &defaults::load_defaults().pipeline)?;

    Ok((
        PipelineOutput {
            command: "pipeline.run".to_string(),
            report,
        },
        0,
    ))
}
