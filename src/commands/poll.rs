use clap::Args;
use serde::Serialize;

use gitship::defaults;
use gitship::status::{self, StatusOutcome, StatusPoll, StatusRules, SystemClock};
use gitship::HttpStatusSource;

use super::{env_value, status_query, CmdResult, STATUS_TOKEN_ENV};

#[derive(Args)]
pub struct PollArgs {
    /// Deployment status URL
    #[arg(long, value_name = "URL")]
    pub status_url: String,

    /// Give up after this many seconds [default: 300]
    #[arg(long, value_name = "SECS")]
    pub status_timeout: Option<u64>,

    /// Seconds between polls [default: 3]
    #[arg(long, value_name = "SECS")]
    pub status_interval: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOutput {
    pub command: String,
    pub url: String,
    #[serde(flatten)]
    pub result: StatusPoll,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub fn run(args: PollArgs) -> CmdResult<PollOutput> {
    let defaults = defaults::load_defaults();
    let query = status_query(
        &args.status_url,
        args.status_timeout,
        args.status_interval,
        env_value(STATUS_TOKEN_ENV),
        &defaults.status,
    )?;

    let source = HttpStatusSource::new(std::time::Duration::from_secs(
        defaults.status.request_timeout_secs,
    ));
    let rules = StatusRules::from_defaults(&defaults.status);

    let result = status::poll(&source, &SystemClock, &query, &rules).into_result(&query.url, None)?;

    let mut warnings = Vec::new();
    if let StatusOutcome::TimedOut(_) = result.outcome {
        warnings.push(format!(
            "Status poll timed out after {}s",
            query.timeout.as_secs()
        ));
    }

    Ok((
        PollOutput {
            command: "poll.run".to_string(),
            url: query.url,
            result,
            warnings,
        },
        0,
    ))
}
