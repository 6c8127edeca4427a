//! Build, test, package and push a container image.
//!
//! A fixed sequence over the command runner: npm install/test/build, then
//! `docker build` and `docker push` of `<image>:<short sha>`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::defaults::PipelineDefaults;
use crate::error::{Error, Result};
use crate::git::Git;
use crate::utils::command::{CommandRunner, Invocation};

const MANIFEST: &str = "package.json";
const DOCKERFILE: &str = "Dockerfile";
const GHCR_PREFIX: &str = "ghcr.io/";

/// Registry credentials. The token is only ever written to stdin.
#[derive(Debug, Clone)]
pub struct RegistryLogin {
    pub user: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Image reference without tag, e.g. `ghcr.io/org/app`.
    pub image: String,
    pub target: Option<String>,
    pub project_dir: PathBuf,
    pub skip_tests: bool,
    pub no_push: bool,
    pub registry_login: Option<RegistryLogin>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub image_ref: String,
    pub target: String,
    pub logged_in: bool,
    pub tested: bool,
    pub built: bool,
    pub dockerfile_created: bool,
    pub pushed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    scripts: HashMap<String, String>,
}

/// Image tag for the project: the short git sha, or `ts<UTC timestamp>`
/// outside a repository.
pub fn image_tag(runner: &dyn CommandRunner, project_dir: &Path, now: DateTime<Utc>) -> String {
    Git::new(runner)
        .short_sha(project_dir)
        .unwrap_or_else(|| now.format("ts%Y%m%d%H%M%S").to_string())
}

pub fn run(
    runner: &dyn CommandRunner,
    options: &PipelineOptions,
    defaults: &PipelineDefaults,
) -> Result<PipelineReport> {
    let project_dir = options.project_dir.as_path();
    let mut report = PipelineReport {
        image_ref: format!(
            "{}:{}",
            options.image,
            image_tag(runner, project_dir, Utc::now())
        ),
        target: options
            .target
            .clone()
            .unwrap_or_else(|| defaults.target.clone()),
        logged_in: false,
        tested: false,
        built: false,
        dockerfile_created: false,
        pushed: false,
        warnings: Vec::new(),
    };

    log_status!(
        "pipeline",
        "Building {} for target {}",
        report.image_ref,
        report.target
    );

    require_docker(runner)?;
    report.logged_in = registry_login(runner, &options.image, options.registry_login.as_ref())?;

    if options.skip_tests {
        log_status!("pipeline", "Skipping install and tests (--skip-tests)");
    } else {
        let (tested, built) = npm_install_and_test(runner, project_dir)?;
        report.tested = tested;
        report.built = built;
    }

    if !project_dir.join(DOCKERFILE).exists() {
        write_default_dockerfile(project_dir, &defaults.dockerfile)?;
        report.dockerfile_created = true;
        report.warnings.push(format!(
            "No Dockerfile found; wrote a default Node.js Dockerfile to {}",
            project_dir.join(DOCKERFILE).display()
        ));
    }

    runner.run(
        &Invocation::new("docker", ["build", "-t", report.image_ref.as_str(), "."])
            .in_dir(project_dir)
            .passthrough(),
    )?;

    if options.no_push {
        log_status!("pipeline", "Built {} (not pushed, --no-push set)", report.image_ref);
    } else {
        runner.run(&Invocation::new("docker", ["push", report.image_ref.as_str()]).passthrough())?;
        report.pushed = true;
    }

    log_status!("pipeline", "artifact:{}", report.image_ref);
    Ok(report)
}

fn require_docker(runner: &dyn CommandRunner) -> Result<()> {
    let output = runner.run_unchecked(&Invocation::new("docker", ["--version"]));
    if output.success {
        Ok(())
    } else {
        Err(Error::tool_not_found("docker", output.error_text())
            .with_hint("Install Docker (or Podman with a docker shim) and make sure it is on PATH"))
    }
}

fn registry_login(
    runner: &dyn CommandRunner,
    image: &str,
    login: Option<&RegistryLogin>,
) -> Result<bool> {
    if !image.starts_with(GHCR_PREFIX) {
        log_status!(
            "pipeline",
            "Ensure you are logged in to your container registry (docker login) if auth is required"
        );
        return Ok(false);
    }

    match login {
        Some(login) => {
            log_status!("pipeline", "Logging in to ghcr.io as {}", login.user);
            runner.run(
                &Invocation::new(
                    "docker",
                    ["login", "ghcr.io", "-u", login.user.as_str(), "--password-stdin"],
                )
                .with_stdin(login.token.as_str()),
            )?;
            Ok(true)
        }
        None => {
            log_status!(
                "pipeline",
                "No GHCR_USER/GHCR_TOKEN set; assuming docker is already logged in to ghcr.io"
            );
            Ok(false)
        }
    }
}

/// `npm ci`, then the `test` and `build` scripts when the manifest defines them.
fn npm_install_and_test(runner: &dyn CommandRunner, project_dir: &Path) -> Result<(bool, bool)> {
    let manifest_path = project_dir.join(MANIFEST);
    if !manifest_path.is_file() {
        return Err(Error::manifest_not_found(manifest_path.display().to_string()));
    }

    let content = fs::read_to_string(&manifest_path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("read {}", manifest_path.display())))
    })?;
    let manifest: PackageManifest = serde_json::from_str(&content).map_err(|e| {
        Error::validation_invalid_json(e, Some(manifest_path.display().to_string()))
    })?;

    let npm = |args: &[&str]| {
        runner.run(
            &Invocation::new("npm", args.iter().copied())
                .in_dir(project_dir)
                .passthrough(),
        )
    };

    npm(&["ci"])?;

    let tested = manifest.scripts.contains_key("test");
    if tested {
        npm(&["test"])?;
    } else {
        log_status!("pipeline", "No `test` script in package.json, skipping tests");
    }

    let built = manifest.scripts.contains_key("build");
    if built {
        npm(&["run", "build"])?;
    } else {
        log_status!("pipeline", "No `build` script in package.json, skipping build");
    }

    Ok((tested, built))
}

fn write_default_dockerfile(project_dir: &Path, content: &str) -> Result<()> {
    let path = project_dir.join(DOCKERFILE);
    fs::write(&path, content)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("write {}", path.display()))))?;
    log_status!(
        "pipeline",
        "Wrote default Dockerfile to {}; review the start command",
        path.display()
    );
    Ok(())
}
