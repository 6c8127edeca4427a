use std::env;
use std::time::Duration;

use gitship::defaults::StatusDefaults;
use gitship::status::StatusQuery;

pub type CmdResult<T> = gitship::Result<(T, i32)>;

// ============================================================================
// Environment (CLI layer only)
// ============================================================================

/// SSH key material for pushes.
pub(crate) const KEY_ENV: &[&str] = &["GIT_SSH_KEY", "GIT_SSH_KEY_BASE64"];
/// Bearer token for the status endpoint.
pub(crate) const STATUS_TOKEN_ENV: &[&str] = &["GITSHIP_STATUS_TOKEN", "BACKEND_IM_TOKEN"];
pub(crate) const GHCR_USER_ENV: &str = "GHCR_USER";
pub(crate) const GHCR_TOKEN_ENV: &str = "GHCR_TOKEN";

/// First non-empty value among `names`.
pub(crate) fn env_value(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

// ============================================================================
// Status polling arguments
// ============================================================================

/// Build a status query from CLI overrides and configured defaults.
pub(crate) fn status_query(
    url: &str,
    timeout_secs: Option<u64>,
    interval_secs: Option<u64>,
    token: Option<String>,
    defaults: &StatusDefaults,
) -> gitship::Result<StatusQuery> {
    if url.trim().is_empty() {
        return Err(gitship::Error::validation_invalid_argument(
            "status-url",
            "Status URL cannot be empty",
        ));
    }

    let interval = interval_secs.unwrap_or(defaults.interval_secs);
    if interval == 0 {
        return Err(gitship::Error::validation_invalid_argument(
            "status-interval",
            "Poll interval must be at least 1 second",
        ));
    }

    Ok(StatusQuery {
        url: url.to_string(),
        token,
        interval: Duration::from_secs(interval),
        timeout: Duration::from_secs(timeout_secs.unwrap_or(defaults.timeout_secs)),
    })
}

pub mod config;
pub mod deploy;
pub mod pipeline;
pub mod poll;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args))
    };
}

pub(crate) fn run_json(command: crate::Commands) -> (gitship::Result<serde_json::Value>, i32) {
    crate::tty::status("gitship is working...");

    match command {
        crate::Commands::Deploy(args) => dispatch!(args, deploy),
        crate::Commands::Pipeline(args) => dispatch!(args, pipeline),
        crate::Commands::Poll(args) => dispatch!(args, poll),
        crate::Commands::Config(args) => dispatch!(args, config),
    }
}
