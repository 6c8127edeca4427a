//! Deployment status polling.
//!
//! The remote platform deploys asynchronously after a push and may expose a
//! JSON status resource. The poller reads it until the status is terminal or
//! the deadline passes. Transport errors never end polling early; an explicit
//! failure status ends it immediately.

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::defaults::StatusDefaults;
use crate::error::{DeployFailedDetails, Error, Result};

/// One status resource to watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusQuery {
    pub url: String,
    pub token: Option<String>,
    pub interval: Duration,
    pub timeout: Duration,
}

/// How to read a status payload.
#[derive(Debug, Clone)]
pub struct StatusRules {
    pub status_fields: Vec<String>,
    pub success_tokens: Vec<String>,
    pub failure_tokens: Vec<String>,
}

impl StatusRules {
    pub fn from_defaults(defaults: &StatusDefaults) -> Self {
        Self {
            status_fields: defaults.status_fields.clone(),
            success_tokens: defaults.success_tokens.clone(),
            failure_tokens: defaults.failure_tokens.clone(),
        }
    }
}

/// Fetches the current status payload.
pub trait StatusSource {
    fn fetch(&self, query: &StatusQuery) -> Result<Value>;
}

/// Time source for the poll loop.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Poll loop state. Only `Polling` has outgoing transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Polling { last: Option<Value> },
    Succeeded(Value),
    Failed(Value),
    TimedOut(Option<Value>),
}

/// Terminal result of a poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "payload", rename_all = "camelCase")]
pub enum StatusOutcome {
    Success(Value),
    Failed(Value),
    TimedOut(Option<Value>),
}

impl StatusOutcome {
    pub fn payload(&self) -> Option<&Value> {
        match self {
            StatusOutcome::Success(p) | StatusOutcome::Failed(p) => Some(p),
            StatusOutcome::TimedOut(p) => p.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPoll {
    #[serde(flatten)]
    pub outcome: StatusOutcome,
    pub attempts: u32,
    pub transport_errors: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<String>,
}

impl StatusPoll {
    /// Convert an explicit failure into a `deploy.failed` error.
    /// `push` is attached to the error details when the poll followed a push.
    pub fn into_result(self, url: &str, push: Option<Value>) -> Result<StatusPoll> {
        match self.outcome {
            StatusOutcome::Failed(payload) => Err(Error::deploy_failed(DeployFailedDetails {
                status_url: url.to_string(),
                status: self.last_status,
                payload,
                push,
            })),
            _ => Ok(self),
        }
    }
}

/// First candidate field present in the payload, as a string.
///
/// A present field with a non-string value resolves to `None` (pending);
/// later candidates are not consulted.
pub fn resolve_status(payload: &Value, fields: &[String]) -> Option<String> {
    let object = payload.as_object()?;
    let value = fields.iter().find_map(|field| object.get(field))?;
    value.as_str().map(String::from)
}

fn matches_any(status: &str, tokens: &[String]) -> bool {
    tokens.iter().any(|t| t.eq_ignore_ascii_case(status))
}

/// Next state after receiving `payload` while polling.
pub fn transition(payload: Value, status: Option<&str>, rules: &StatusRules) -> PollState {
    match status {
        Some(s) if matches_any(s, &rules.success_tokens) => PollState::Succeeded(payload),
        Some(s) if matches_any(s, &rules.failure_tokens) => PollState::Failed(payload),
        _ => PollState::Polling {
            last: Some(payload),
        },
    }
}

/// Poll `query.url` once per interval until a terminal status or the deadline.
pub fn poll(
    source: &dyn StatusSource,
    clock: &dyn Clock,
    query: &StatusQuery,
    rules: &StatusRules,
) -> StatusPoll {
    log_status!(
        "status",
        "Polling status URL: {} (timeout {}s)",
        query.url,
        query.timeout.as_secs()
    );

    // A timeout past the clock's range means no deadline.
    let deadline = clock.now().checked_add(query.timeout);
    let mut state = PollState::Polling { last: None };
    let mut attempts = 0;
    let mut transport_errors = 0;
    let mut last_status = None;

    let outcome = loop {
        state = match state {
            PollState::Polling { last } if deadline.is_some_and(|d| clock.now() >= d) => {
                PollState::TimedOut(last)
            }
            PollState::Polling { last } => {
                attempts += 1;
                let next = match source.fetch(query) {
                    Ok(payload) => {
                        let status = resolve_status(&payload, &rules.status_fields);
                        log_status!(
                            "status",
                            "status -> {} payload -> {}",
                            status.as_deref().unwrap_or("<none>"),
                            payload
                        );
                        let next = transition(payload, status.as_deref(), rules);
                        last_status = status;
                        next
                    }
                    Err(err) => {
                        transport_errors += 1;
                        log_status!("status", "Status poll request error: {}", describe(&err));
                        PollState::Polling { last }
                    }
                };
                if matches!(next, PollState::Polling { .. }) {
                    clock.sleep(query.interval);
                }
                next
            }
            PollState::Succeeded(payload) => {
                log_status!("status", "Deployment finished successfully");
                break StatusOutcome::Success(payload);
            }
            PollState::Failed(payload) => {
                log_status!("status", "Deployment failed");
                break StatusOutcome::Failed(payload);
            }
            PollState::TimedOut(last) => {
                log_status!("status", "Status poll timed out");
                break StatusOutcome::TimedOut(last);
            }
        };
    };

    StatusPoll {
        outcome,
        attempts,
        transport_errors,
        last_status,
    }
}

fn describe(err: &Error) -> String {
    match err.details.get("error").and_then(Value::as_str) {
        Some(detail) => format!("{}: {}", err.message, detail),
        None => err.message.clone(),
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{ManualClock, ScriptedSource};
    use super::*;
    use crate::defaults::builtin_defaults;
    use crate::ErrorCode;
    use serde_json::json;

    fn rules() -> StatusRules {
        StatusRules::from_defaults(&builtin_defaults().status)
    }

    fn query(timeout: u64, interval: u64) -> StatusQuery {
        StatusQuery {
            url: "https://api.example.com/v1/deploys/123".to_string(),
            token: None,
            interval: Duration::from_secs(interval),
            timeout: Duration::from_secs(timeout),
        }
    }

    fn transport_error() -> Error {
        Error::status_transport("https://api.example.com/v1/deploys/123", None, "connection reset")
    }

    #[test]
    fn succeeds_on_third_poll_and_stops() {
        let source = ScriptedSource::new(vec![
            Ok(json!({"status": "pending"})),
            Ok(json!({"status": "pending"})),
            Ok(json!({"status": "done"})),
            Ok(json!({"status": "pending"})),
        ]);
        let clock = ManualClock::new();

        let result = poll(&source, &clock, &query(300, 3), &rules());

        assert_eq!(result.outcome, StatusOutcome::Success(json!({"status": "done"})));
        assert_eq!(source.calls.get(), 3);
        assert_eq!(result.attempts, 3);
        assert_eq!(clock.elapsed(), Duration::from_secs(6));
    }

    #[test]
    fn huge_timeout_polls_without_deadline() {
        let source = ScriptedSource::new(vec![
            Ok(json!({"status": "pending"})),
            Ok(json!({"status": "success"})),
        ]);
        let clock = ManualClock::new();

        let result = poll(&source, &clock, &query(u64::MAX, 3), &rules());

        assert_eq!(result.outcome, StatusOutcome::Success(json!({"status": "success"})));
        assert_eq!(source.calls.get(), 2);
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn times_out_with_last_seen_payload() {
        let source = ScriptedSource::new(vec![
            Ok(json!({"status": "queued", "n": 1})),
            Ok(json!({"status": "building", "n": 2})),
        ]);
        let clock = ManualClock::new();

        let result = poll(&source, &clock, &query(6, 3), &rules());

        assert_eq!(source.calls.get(), 2);
        assert_eq!(
            result.outcome,
            StatusOutcome::TimedOut(Some(json!({"status": "building", "n": 2})))
        );
        assert_eq!(result.last_status.as_deref(), Some("building"));
        assert!(result.into_result("u", None).is_ok());
    }

    #[test]
    fn explicit_failure_stops_immediately() {
        let source = ScriptedSource::new(vec![
            Ok(json!({"status": "pending"})),
            Ok(json!({"state": "FAILED", "reason": "build error"})),
            Ok(json!({"status": "done"})),
        ]);
        let clock = ManualClock::new();

        let result = poll(&source, &clock, &query(300, 3), &rules());

        assert_eq!(source.calls.get(), 2);
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
        assert!(matches!(result.outcome, StatusOutcome::Failed(_)));

        let err = result
            .into_result("https://api.example.com/v1/deploys/123", Some(json!({"success": true})))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DeployFailed);
        assert_eq!(err.details["status"], "FAILED");
        assert_eq!(err.details["payload"]["reason"], "build error");
        assert_eq!(err.details["push"]["success"], true);
    }

    #[test]
    fn transport_errors_do_not_stop_polling() {
        let source = ScriptedSource::new(vec![
            Err(transport_error()),
            Err(transport_error()),
            Ok(json!({"deploy_status": "Ready"})),
        ]);
        let clock = ManualClock::new();

        let result = poll(&source, &clock, &query(300, 3), &rules());

        assert!(matches!(result.outcome, StatusOutcome::Success(_)));
        assert_eq!(result.transport_errors, 2);
        assert_eq!(result.attempts, 3);
    }

    #[test]
    fn only_transport_errors_time_out_without_payload() {
        let source = ScriptedSource::new(vec![Err(transport_error())]);
        let clock = ManualClock::new();

        let result = poll(&source, &clock, &query(9, 3), &rules());

        assert_eq!(result.outcome, StatusOutcome::TimedOut(None));
        assert_eq!(result.attempts, 3);
        assert_eq!(result.transport_errors, 3);
    }

    #[test]
    fn transport_error_keeps_previous_payload() {
        let source = ScriptedSource::new(vec![
            Ok(json!({"status": "pending"})),
            Err(transport_error()),
        ]);
        let clock = ManualClock::new();

        let result = poll(&source, &clock, &query(6, 3), &rules());

        assert_eq!(
            result.outcome,
            StatusOutcome::TimedOut(Some(json!({"status": "pending"})))
        );
    }

    #[test]
    fn zero_timeout_never_polls() {
        let source = ScriptedSource::new(vec![Ok(json!({"status": "done"}))]);
        let clock = ManualClock::new();

        let result = poll(&source, &clock, &query(0, 3), &rules());

        assert_eq!(source.calls.get(), 0);
        assert_eq!(result.outcome, StatusOutcome::TimedOut(None));
    }

    #[test]
    fn resolve_status_uses_first_present_field() {
        let fields = rules().status_fields;
        assert_eq!(
            resolve_status(&json!({"state": "done", "deploy_status": "failed"}), &fields).as_deref(),
            Some("done")
        );
        assert_eq!(
            resolve_status(&json!({"status": "pending", "state": "done"}), &fields).as_deref(),
            Some("pending")
        );
        assert_eq!(resolve_status(&json!({"status": 3, "state": "done"}), &fields), None);
        assert_eq!(resolve_status(&json!({"phase": "done"}), &fields), None);
        assert_eq!(resolve_status(&json!(["done"]), &fields), None);
    }

    #[test]
    fn tokens_match_case_insensitively() {
        let rules = rules();
        assert!(matches!(
            transition(json!({}), Some("SUCCESS"), &rules),
            PollState::Succeeded(_)
        ));
        assert!(matches!(
            transition(json!({}), Some("Error"), &rules),
            PollState::Failed(_)
        ));
        assert!(matches!(
            transition(json!({}), Some("deploying"), &rules),
            PollState::Polling { last: Some(_) }
        ));
        assert!(matches!(
            transition(json!({}), None, &rules),
            PollState::Polling { .. }
        ));
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let poll = StatusPoll {
            outcome: StatusOutcome::TimedOut(None),
            attempts: 2,
            transport_errors: 0,
            last_status: None,
        };
        let value = serde_json::to_value(&poll).unwrap();
        assert_eq!(value["outcome"], "timedOut");
        assert_eq!(value["attempts"], 2);
    }
}
