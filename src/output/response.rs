//! CLI response formatting and output.
//!
//! Provides JSON envelope, printing, and exit code mapping.

use gitship::error::Hint;
use gitship::{Error, ErrorCode, Result};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct CliResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CliError>,
}

#[derive(Debug, Serialize)]
pub struct CliError {
    pub code: String,
    pub message: String,
    pub details: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<Hint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl<T: Serialize> CliResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            warnings: Vec::new(),
            error: None,
        }
    }

    fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Error::internal_json(e.to_string(), Some("serialize response".to_string()))
        })
    }
}

impl CliResponse<()> {
    pub fn from_error(err: &Error) -> Self {
        Self {
            success: false,
            data: None,
            warnings: Vec::new(),
            error: Some(CliError {
                code: err.code.as_str().to_string(),
                message: err.message.clone(),
                details: err.details.clone(),
                hints: if err.hints.is_empty() {
                    None
                } else {
                    Some(err.hints.clone())
                },
                retryable: err.retryable,
            }),
        }
    }
}

fn print_response<T: Serialize>(response: &CliResponse<T>) -> Result<()> {
    use std::io::{self, Write};

    let payload = response.to_json()?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", payload) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            return Ok(()); // Exit gracefully on SIGPIPE
        }
        return Err(Error::internal_io(
            e.to_string(),
            Some("write stdout".to_string()),
        ));
    }
    Ok(())
}

/// Move a top-level `warnings` array out of command data into the envelope.
fn take_warnings(data: &mut Value) -> Vec<String> {
    let taken = data
        .as_object_mut()
        .and_then(|obj| obj.remove("warnings"));

    match taken {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    }
}

pub fn response_for(result: Result<Value>) -> CliResponse<Value> {
    match result {
        Ok(mut data) => {
            let warnings = take_warnings(&mut data);
            CliResponse::success(data).with_warnings(warnings)
        }
        Err(err) => {
            let envelope = CliResponse::<()>::from_error(&err);
            CliResponse {
                success: false,
                data: None,
                warnings: Vec::new(),
                error: envelope.error,
            }
        }
    }
}

pub fn print_json_result(result: Result<Value>) -> Result<()> {
    print_response(&response_for(result))
}

pub fn map_cmd_result_to_json<T: Serialize>(result: Result<(T, i32)>) -> (Result<Value>, i32) {
    match result {
        Ok((data, exit_code)) => match serde_json::to_value(data) {
            Ok(value) => (Ok(value), exit_code),
            Err(err) => (
                Err(Error::internal_json(
                    err.to_string(),
                    Some("serialize response".to_string()),
                )),
                1,
            ),
        },
        Err(err) => {
            let exit_code = exit_code_for_error(err.code);
            (Err(err), exit_code)
        }
    }
}

pub fn exit_code_for_error(code: ErrorCode) -> i32 {
    match code {
        ErrorCode::ConfigInvalidJson
        | ErrorCode::ConfigInvalidValue
        | ErrorCode::ValidationMissingArgument
        | ErrorCode::ValidationInvalidArgument
        | ErrorCode::ValidationInvalidJson => 2,

        ErrorCode::PreconditionDirtyWorktree
        | ErrorCode::PreconditionArtifactDirNotFound
        | ErrorCode::PreconditionManifestNotFound
        | ErrorCode::PreconditionToolNotFound => 3,

        ErrorCode::CredentialWriteFailed => 10,

        ErrorCode::CommandFailed
        | ErrorCode::GitCloneFailed
        | ErrorCode::GitCommitFailed
        | ErrorCode::GitPushFailed
        | ErrorCode::GitCommandFailed
        | ErrorCode::StatusTransportFailed => 20,

        ErrorCode::DeployFailed => 30,

        ErrorCode::InternalIoError
        | ErrorCode::InternalJsonError
        | ErrorCode::InternalUnexpected => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitship::error::{CommandFailedDetails, DeployFailedDetails};
    use serde_json::json;

    fn push_failure() -> Error {
        Error::git_push_failed(CommandFailedDetails {
            command: "git push origin HEAD:refs/heads/main".to_string(),
            exit_code: 1,
            stdout: String::new(),
            stderr: "rejected: non-fast-forward".to_string(),
        })
    }

    #[test]
    fn push_failure_serializes_command_output() {
        let json = CliResponse::<()>::from_error(&push_failure()).to_json().unwrap();

        assert!(json.contains("\"code\": \"git.push_failed\""));
        assert!(json.contains("rejected: non-fast-forward"));
        assert!(json.contains("\"exitCode\": 1"));
        assert!(json.contains("\"hints\""));
    }

    #[test]
    fn push_failure_maps_to_exit_code_20() {
        let (_value, exit_code) = map_cmd_result_to_json::<Value>(Err(push_failure()));
        assert_eq!(exit_code, 20);
    }

    #[test]
    fn precondition_and_deploy_failures_have_distinct_exit_codes() {
        let dirty = Error::dirty_worktree("/srv/app", vec![" M a".to_string()]);
        let failed = Error::deploy_failed(DeployFailedDetails {
            status_url: "https://api.example.com/d/1".to_string(),
            status: Some("failed".to_string()),
            payload: json!({"status": "failed"}),
            push: None,
        });

        assert_eq!(map_cmd_result_to_json::<Value>(Err(dirty)).1, 3);
        assert_eq!(map_cmd_result_to_json::<Value>(Err(failed)).1, 30);
        assert_eq!(exit_code_for_error(ErrorCode::CredentialWriteFailed), 10);
    }

    #[test]
    fn warnings_move_into_the_envelope() {
        let response = response_for(Ok(json!({
            "command": "deploy.run",
            "warnings": ["Status poll timed out after 300s"]
        })));

        assert!(response.success);
        assert_eq!(response.warnings, vec!["Status poll timed out after 300s"]);
        assert!(response.data.unwrap().get("warnings").is_none());
    }

    #[test]
    fn success_without_warnings_omits_the_field() {
        let json = response_for(Ok(json!({"command": "config.path"})))
            .to_json()
            .unwrap();
        assert!(!json.contains("warnings"));
        assert!(!json.contains("\"error\""));
    }
}
