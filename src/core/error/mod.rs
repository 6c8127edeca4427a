use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationMissingArgument,
    ValidationInvalidArgument,
    ValidationInvalidJson,

    PreconditionDirtyWorktree,
    PreconditionArtifactDirNotFound,
    PreconditionManifestNotFound,
    PreconditionToolNotFound,

    CredentialWriteFailed,

    CommandFailed,

    GitCloneFailed,
    GitCommitFailed,
    GitPushFailed,
    GitCommandFailed,

    StatusTransportFailed,
    DeployFailed,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",
            ErrorCode::ValidationInvalidJson => "validation.invalid_json",

            ErrorCode::PreconditionDirtyWorktree => "precondition.dirty_worktree",
            ErrorCode::PreconditionArtifactDirNotFound => "precondition.artifact_dir_not_found",
            ErrorCode::PreconditionManifestNotFound => "precondition.manifest_not_found",
            ErrorCode::PreconditionToolNotFound => "precondition.tool_not_found",

            ErrorCode::CredentialWriteFailed => "credential.write_failed",

            ErrorCode::CommandFailed => "command.failed",

            ErrorCode::GitCloneFailed => "git.clone_failed",
            ErrorCode::GitCommitFailed => "git.commit_failed",
            ErrorCode::GitPushFailed => "git.push_failed",
            ErrorCode::GitCommandFailed => "git.command_failed",

            ErrorCode::StatusTransportFailed => "status.transport_failed",
            ErrorCode::DeployFailed => "deploy.failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }

    /// Precondition failures are detected before any network operation.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ErrorCode::PreconditionDirtyWorktree
                | ErrorCode::PreconditionArtifactDirNotFound
                | ErrorCode::PreconditionManifestNotFound
                | ErrorCode::PreconditionToolNotFound
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidJsonDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Captured result of an external command that exited unsuccessfully.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirtyWorktreeDetails {
    pub path: String,
    pub changes: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathNotFoundDetails {
    pub path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolNotFoundDetails {
    pub tool: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialWriteDetails {
    pub dir: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTransportDetails {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployFailedDetails {
    pub status_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub payload: Value,
    /// Push outcome, present when the failure was reported after a push.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<Value>,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            to_details(MissingArgumentDetails { args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
    ) -> Self {
        let problem = problem.into();
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            format!("Invalid argument: {}", problem),
            to_details(InvalidArgumentDetails {
                field: field.into(),
                problem,
            }),
        )
    }

    pub fn validation_invalid_json(err: serde_json::Error, context: Option<String>) -> Self {
        let details = serde_json::json!({
            "error": err.to_string(),
            "context": context,
        });

        Self::new(ErrorCode::ValidationInvalidJson, "Invalid JSON", details)
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            to_details(ConfigInvalidJsonDetails {
                path: path.into(),
                error: err.to_string(),
            }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            to_details(ConfigInvalidValueDetails {
                key: key.into(),
                value,
                problem: problem.into(),
            }),
        )
    }

    pub fn dirty_worktree(path: impl Into<String>, changes: Vec<String>) -> Self {
        Self::new(
            ErrorCode::PreconditionDirtyWorktree,
            "Refusing to push with a dirty working tree",
            to_details(DirtyWorktreeDetails {
                path: path.into(),
                changes,
            }),
        )
        .with_hint("Commit or stash your changes, or rerun with --allow-dirty")
    }

    pub fn artifact_dir_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::PreconditionArtifactDirNotFound,
            format!("Artifact directory {} does not exist", path),
            to_details(PathNotFoundDetails { path }),
        )
    }

    pub fn manifest_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::PreconditionManifestNotFound,
            format!("{} not found in project root", path),
            to_details(PathNotFoundDetails { path }),
        )
    }

    pub fn tool_not_found(tool: impl Into<String>, error: impl Into<String>) -> Self {
        let tool = tool.into();
        Self::new(
            ErrorCode::PreconditionToolNotFound,
            format!("{} CLI not found in PATH", tool),
            to_details(ToolNotFoundDetails {
                tool,
                error: error.into(),
            }),
        )
    }

    pub fn credential_write(dir: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::CredentialWriteFailed,
            "Failed to write temporary SSH key",
            to_details(CredentialWriteDetails {
                dir: dir.into(),
                error: error.into(),
            }),
        )
    }

    pub fn command_failed(details: CommandFailedDetails) -> Self {
        Self::with_command_details(
            ErrorCode::CommandFailed,
            format!(
                "Command failed: {} (exit {})",
                details.command, details.exit_code
            ),
            details,
        )
    }

    pub fn git_clone_failed(details: CommandFailedDetails) -> Self {
        Self::with_command_details(ErrorCode::GitCloneFailed, "git clone failed", details)
    }

    pub fn git_commit_failed(details: CommandFailedDetails) -> Self {
        Self::with_command_details(ErrorCode::GitCommitFailed, "git commit failed", details)
    }

    pub fn git_push_failed(details: CommandFailedDetails) -> Self {
        Self::with_command_details(ErrorCode::GitPushFailed, "git push failed", details)
            .with_hint("Check the remote URL, branch permissions and SSH credentials")
    }

    pub fn git_command_failed(details: CommandFailedDetails) -> Self {
        let message = format!("{} failed", details.command);
        Self::with_command_details(ErrorCode::GitCommandFailed, message, details)
    }

    fn with_command_details(
        code: ErrorCode,
        message: impl Into<String>,
        details: CommandFailedDetails,
    ) -> Self {
        Self::new(code, message, to_details(details))
    }

    pub fn status_transport(
        url: impl Into<String>,
        status: Option<u16>,
        error: impl Into<String>,
    ) -> Self {
        let mut err = Self::new(
            ErrorCode::StatusTransportFailed,
            "Status request failed",
            to_details(StatusTransportDetails {
                url: url.into(),
                status,
                error: error.into(),
            }),
        );
        err.retryable = Some(true);
        err
    }

    pub fn deploy_failed(details: DeployFailedDetails) -> Self {
        let message = match &details.status {
            Some(status) => format!("Deployment failed: remote reported '{}'", status),
            None => "Deployment failed".to_string(),
        };
        Self::new(ErrorCode::DeployFailed, message, to_details(details))
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            to_details(InternalIoErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            to_details(InternalJsonErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::internal_unexpected(message)
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}
