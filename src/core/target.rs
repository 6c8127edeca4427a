//! Deployment target and payload mode.

use serde::Serialize;
use std::path::PathBuf;

/// Where a deployment is pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTarget {
    pub url: String,
    pub branch: String,
    pub force: bool,
}

impl RemoteTarget {
    pub fn new(url: impl Into<String>, branch: impl Into<String>, force: bool) -> Self {
        Self {
            url: url.into(),
            branch: branch.into(),
            force,
        }
    }
}

/// What gets pushed. Chosen once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMode {
    /// Push the repository's current HEAD as-is.
    DirectHead,
    /// Replace the remote branch's tree with the contents of a directory.
    ArtifactDir(PathBuf),
}

impl PushMode {
    pub fn from_artifact_dir(dir: Option<PathBuf>) -> Self {
        match dir {
            Some(dir) => PushMode::ArtifactDir(dir),
            None => PushMode::DirectHead,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PushMode::DirectHead => "direct-head",
            PushMode::ArtifactDir(_) => "artifact-dir",
        }
    }
}
