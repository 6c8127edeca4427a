use serde::{Deserialize, Serialize};
use std::fs;

use crate::paths;

/// Root configuration structure for gitship.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GitshipConfig {
    #[serde(default)]
    pub defaults: Defaults,
}

/// All configurable defaults that can be overridden via gitship.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_deploy")]
    pub deploy: DeployDefaults,

    #[serde(default = "default_status")]
    pub status: StatusDefaults,

    #[serde(default = "default_pipeline")]
    pub pipeline: PipelineDefaults,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            deploy: default_deploy(),
            status: default_status(),
            pipeline: default_pipeline(),
        }
    }
}

/// Configuration for git push deployments
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployDefaults {
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Prefix of the temporary remote registered for direct HEAD pushes.
    #[serde(default = "default_remote_name_prefix")]
    pub remote_name_prefix: String,

    #[serde(default = "default_commit_message_prefix")]
    pub commit_message_prefix: String,

    /// `StrictHostKeyChecking` for pushes made with a temporary key.
    #[serde(default)]
    pub strict_host_key_checking: bool,
}

/// Configuration for deployment status polling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDefaults {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Candidate field names, checked in order.
    #[serde(default = "default_status_fields")]
    pub status_fields: Vec<String>,

    #[serde(default = "default_success_tokens")]
    pub success_tokens: Vec<String>,

    #[serde(default = "default_failure_tokens")]
    pub failure_tokens: Vec<String>,
}

/// Configuration for the build/test/package pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDefaults {
    #[serde(default = "default_target")]
    pub target: String,

    /// Dockerfile written when the project has none.
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_deploy() -> DeployDefaults {
    DeployDefaults {
        branch: default_branch(),
        remote_name_prefix: default_remote_name_prefix(),
        commit_message_prefix: default_commit_message_prefix(),
        strict_host_key_checking: false,
    }
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_remote_name_prefix() -> String {
    "gitship_deploy".to_string()
}

fn default_commit_message_prefix() -> String {
    "deploy".to_string()
}

fn default_status() -> StatusDefaults {
    StatusDefaults {
        interval_secs: default_interval_secs(),
        timeout_secs: default_timeout_secs(),
        request_timeout_secs: default_request_timeout_secs(),
        status_fields: default_status_fields(),
        success_tokens: default_success_tokens(),
        failure_tokens: default_failure_tokens(),
    }
}

fn default_interval_secs() -> u64 {
    3
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_status_fields() -> Vec<String> {
    vec![
        "status".to_string(),
        "state".to_string(),
        "deploy_status".to_string(),
    ]
}

fn default_success_tokens() -> Vec<String> {
    vec![
        "done".to_string(),
        "success".to_string(),
        "ready".to_string(),
    ]
}

fn default_failure_tokens() -> Vec<String> {
    vec!["failed".to_string(), "error".to_string()]
}

fn default_pipeline() -> PipelineDefaults {
    PipelineDefaults {
        target: default_target(),
        dockerfile: default_dockerfile(),
    }
}

fn default_target() -> String {
    "prod".to_string()
}

fn default_dockerfile() -> String {
    concat!(
        "FROM node:18-alpine\n",
        "WORKDIR /app\n",
        "COPY package*.json ./\n",
        "RUN npm ci --only=production\n",
        "COPY . .\n",
        "ENV NODE_ENV=production\n",
        "EXPOSE 8080\n",
        "CMD [\"node\", \"./dist/index.js\"]\n",
    )
    .to_string()
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load defaults, merging file config with built-in defaults.
/// If gitship.json is missing or invalid, returns built-in defaults.
pub fn load_defaults() -> Defaults {
    load_config().defaults
}

/// Load the full gitship.json config, falling back to defaults on any error.
pub fn load_config() -> GitshipConfig {
    match load_config_from_file() {
        Ok(config) => config,
        Err(err) => {
            if config_exists() {
                log_status!("config", "Ignoring gitship.json: {}", describe(&err));
            }
            GitshipConfig::default()
        }
    }
}

fn describe(err: &crate::Error) -> String {
    match err.details.get("problem").or_else(|| err.details.get("error")) {
        Some(serde_json::Value::String(detail)) => format!("{} ({})", err.message, detail),
        _ => err.message.clone(),
    }
}

/// Attempt to load config from gitship.json file.
fn load_config_from_file() -> crate::Result<GitshipConfig> {
    let path = paths::gitship_json()?;

    if !path.exists() {
        return Err(crate::Error::other("gitship.json not found"));
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        crate::Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    let config = parse_config(&content)
        .map_err(|e| crate::Error::config_invalid_json(path.display().to_string(), e))?;
    validate(config)
}

/// Reject values the deploy and poll loops cannot work with.
fn validate(config: GitshipConfig) -> crate::Result<GitshipConfig> {
    let status = &config.defaults.status;

    if status.interval_secs == 0 {
        return Err(crate::Error::config_invalid_value(
            "defaults.status.intervalSecs",
            Some("0".to_string()),
            "must be at least 1",
        ));
    }
    if status.request_timeout_secs == 0 {
        return Err(crate::Error::config_invalid_value(
            "defaults.status.requestTimeoutSecs",
            Some("0".to_string()),
            "must be at least 1",
        ));
    }
    if status.status_fields.is_empty() {
        return Err(crate::Error::config_invalid_value(
            "defaults.status.statusFields",
            None,
            "must name at least one field",
        ));
    }
    if config.defaults.deploy.branch.trim().is_empty() {
        return Err(crate::Error::config_invalid_value(
            "defaults.deploy.branch",
            None,
            "cannot be empty",
        ));
    }

    Ok(config)
}

fn parse_config(content: &str) -> std::result::Result<GitshipConfig, serde_json::Error> {
    serde_json::from_str(content)
}

/// Check if gitship.json file exists
pub fn config_exists() -> bool {
    paths::gitship_json()
        .map(|p| p.exists())
        .unwrap_or(false)
}

/// Get the path to gitship.json (for display purposes)
pub fn config_path() -> crate::Result<String> {
    Ok(paths::gitship_json()?.display().to_string())
}

/// Get built-in defaults (ignoring any file config)
pub fn builtin_defaults() -> Defaults {
    Defaults::default()
}
