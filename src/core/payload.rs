//! Payload preparation: decide which tree gets pushed.
//!
//! Direct-HEAD mode pushes the repository as it is. Artifact mode builds a
//! throwaway clone of the remote whose working tree is replaced by the
//! artifact directory and committed on the target branch.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::git::Git;
use crate::target::{PushMode, RemoteTarget};

const GIT_DIR: &str = ".git";

/// The tree that the push executor will push.
#[derive(Debug)]
pub enum PreparedPayload {
    Head { repo_dir: PathBuf },
    Artifact(ArtifactCheckout),
}

impl PreparedPayload {
    pub fn mode_name(&self) -> &'static str {
        match self {
            PreparedPayload::Head { .. } => "direct-head",
            PreparedPayload::Artifact(_) => "artifact-dir",
        }
    }
}

/// An ephemeral clone holding committed artifact content.
/// Dropping it removes the clone directory.
#[derive(Debug)]
pub struct ArtifactCheckout {
    dir: TempDir,
    pub source: PathBuf,
    pub committed: bool,
    pub files_copied: usize,
}

impl ArtifactCheckout {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the clone directory now, reporting but swallowing errors.
    pub fn release(self) {
        let display = self.dir.path().display().to_string();
        match self.dir.close() {
            Ok(()) => log_status!("payload", "Removed temporary clone {}", display),
            Err(e) => log_status!("payload", "Could not remove {}: {}", display, e),
        }
    }
}

/// `<prefix>: <UTC timestamp>`
pub fn default_commit_message(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{}: {}", prefix, now.format("%Y-%m-%dT%H:%M:%SZ"))
}

/// Produce the payload for `mode`.
pub fn prepare(
    git: &Git<'_>,
    target: &RemoteTarget,
    mode: &PushMode,
    repo_dir: &Path,
    commit_message: &str,
    scratch_dir: &Path,
) -> Result<PreparedPayload> {
    match mode {
        PushMode::DirectHead => Ok(PreparedPayload::Head {
            repo_dir: repo_dir.to_path_buf(),
        }),
        PushMode::ArtifactDir(source) => {
            prepare_artifact(git, target, source, commit_message, scratch_dir)
                .map(PreparedPayload::Artifact)
        }
    }
}

fn prepare_artifact(
    git: &Git<'_>,
    target: &RemoteTarget,
    source: &Path,
    commit_message: &str,
    scratch_dir: &Path,
) -> Result<ArtifactCheckout> {
    if !source.is_dir() {
        return Err(Error::artifact_dir_not_found(source.display().to_string()));
    }

    let dir = tempfile::Builder::new()
        .prefix("gitship-clone-")
        .tempdir_in(scratch_dir)
        .map_err(|e| {
            Error::internal_io(
                e.to_string(),
                Some(format!("create clone dir in {}", scratch_dir.display())),
            )
        })?;

    log_status!("payload", "Cloning remote into {}", dir.path().display());
    git.clone(&target.url, dir.path())?;
    git.checkout_reset(dir.path(), &target.branch)?;

    clear_worktree(dir.path())?;

    log_status!(
        "payload",
        "Copying artifact from {} to temporary clone",
        source.display()
    );
    let files_copied = copy_tree(source, dir.path())?;

    git.add_all(dir.path())?;
    let committed = git.commit_all(dir.path(), commit_message)?;

    Ok(ArtifactCheckout {
        dir,
        source: source.to_path_buf(),
        committed,
        files_copied,
    })
}

/// Delete every top-level entry except `.git`.
pub fn clear_worktree(dir: &Path) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| io_error(e, "read", dir))?;

    for entry in entries {
        let entry = entry.map_err(|e| io_error(e, "read", dir))?;
        if entry.file_name() == GIT_DIR {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| io_error(e, "stat", &path))?;
        if file_type.is_dir() {
            fs::remove_dir_all(&path).map_err(|e| io_error(e, "remove", &path))?;
        } else {
            fs::remove_file(&path).map_err(|e| io_error(e, "remove", &path))?;
        }
    }

    Ok(())
}

/// Copy the contents of `src` into `dest`, keeping the directory layout,
/// permission bits and modification times. A top-level `.git` in `src` is
/// skipped. Returns the number of files and links copied.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<usize> {
    let mut copied = 0;

    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !(e.depth() == 1 && e.file_name() == GIT_DIR));

    for entry in walker {
        let entry = entry.map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("walk {}", src.display())))
        })?;

        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::internal_unexpected(e.to_string()))?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| io_error(e, "create", &target))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
            copied += 1;
        } else {
            copy_file(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    // fs::copy carries permission bits over
    fs::copy(from, to).map_err(|e| io_error(e, "copy", from))?;

    let meta = fs::metadata(from).map_err(|e| io_error(e, "stat", from))?;
    let mut times = fs::FileTimes::new();
    if let Ok(modified) = meta.modified() {
        times = times.set_modified(modified);
    }
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }

    open_for_times(to)
        .and_then(|f| f.set_times(times))
        .map_err(|e| io_error(e, "set times on", to))
}

// futimens works on a read-only descriptor, so read-only files are fine.
#[cfg(unix)]
fn open_for_times(path: &Path) -> std::io::Result<fs::File> {
    fs::File::open(path)
}

#[cfg(not(unix))]
fn open_for_times(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new().write(true).open(path)
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let link = fs::read_link(from).map_err(|e| io_error(e, "read link", from))?;
    std::os::unix::fs::symlink(&link, to).map_err(|e| io_error(e, "link", to))
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    if from.is_dir() {
        fs::create_dir_all(to).map_err(|e| io_error(e, "create", to))?;
        copy_tree(from, to).map(|_| ())
    } else {
        copy_file(from, to)
    }
}

fn io_error(e: std::io::Error, action: &str, path: &Path) -> Error {
    Error::internal_io(e.to_string(), Some(format!("{} {}", action, path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::command::fake::{is_git, ScriptedRunner};
    use crate::utils::command::CommandOutput;
    use crate::ErrorCode;
    use chrono::TimeZone;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = WalkDir::new(dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| !e.path().starts_with(dir.join(GIT_DIR)))
            .map(|e| {
                e.path()
                    .strip_prefix(dir)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        names.sort();
        names
    }

    fn target() -> RemoteTarget {
        RemoteTarget::new("git@example.com:org/app.git", "main", false)
    }

    #[test]
    fn default_commit_message_is_timestamped() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            default_commit_message("deploy", now),
            "deploy: 2024-03-09T07:05:01Z"
        );
    }

    #[test]
    fn clear_worktree_keeps_only_git_dir() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join(".git/HEAD"), "ref: refs/heads/main\n");
        write(&dir.path().join("old.txt"), "old");
        write(&dir.path().join("assets/app.js"), "js");
        write(&dir.path().join(".env"), "SECRET=1");

        clear_worktree(dir.path()).unwrap();

        assert!(entries(dir.path()).is_empty());
        assert!(dir.path().join(".git/HEAD").exists());
    }

    #[test]
    fn copy_tree_mirrors_nested_layout() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(&src.path().join("index.html"), "<html>");
        write(&src.path().join("static/css/site.css"), "body{}");
        write(&src.path().join(".htaccess"), "Options -Indexes");
        fs::create_dir_all(src.path().join("empty")).unwrap();

        let copied = copy_tree(src.path(), dest.path()).unwrap();

        assert_eq!(copied, 3);
        assert_eq!(
            entries(dest.path()),
            vec![
                ".htaccess",
                "empty",
                "index.html",
                "static",
                "static/css",
                "static/css/site.css"
            ]
        );
        assert_eq!(
            fs::read_to_string(dest.path().join("static/css/site.css")).unwrap(),
            "body{}"
        );
    }

    #[test]
    fn copy_tree_skips_source_git_dir() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        write(&src.path().join(".git/config"), "[core]");
        write(&src.path().join("app.js"), "1");

        copy_tree(src.path(), dest.path()).unwrap();

        assert!(!dest.path().join(".git").exists());
        assert!(dest.path().join("app.js").exists());
    }

    #[test]
    fn copy_tree_preserves_modification_time() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let file = src.path().join("build.txt");
        write(&file, "v1");
        let old = std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        fs::OpenOptions::new()
            .write(true)
            .open(&file)
            .unwrap()
            .set_modified(old)
            .unwrap();

        copy_tree(src.path(), dest.path()).unwrap();

        let copied = fs::metadata(dest.path().join("build.txt")).unwrap();
        assert_eq!(copied.modified().unwrap(), old);
    }

    #[cfg(unix)]
    #[test]
    fn copy_tree_preserves_permissions_and_symlinks() {
        use std::os::unix::fs::PermissionsExt;

        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let script = src.path().join("start.sh");
        write(&script, "#!/bin/sh\n");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        std::os::unix::fs::symlink("start.sh", src.path().join("run")).unwrap();

        copy_tree(src.path(), dest.path()).unwrap();

        let mode = fs::metadata(dest.path().join("start.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(
            fs::read_link(dest.path().join("run")).unwrap(),
            PathBuf::from("start.sh")
        );
    }

    #[test]
    fn direct_head_runs_no_commands() {
        let runner = ScriptedRunner::succeeding();
        let git = Git::new(&runner);
        let scratch = tempfile::tempdir().unwrap();

        let payload = prepare(
            &git,
            &target(),
            &PushMode::DirectHead,
            Path::new("/srv/app"),
            "deploy: x",
            scratch.path(),
        )
        .unwrap();

        assert!(matches!(payload, PreparedPayload::Head { ref repo_dir } if repo_dir == Path::new("/srv/app")));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn missing_artifact_dir_fails_before_cloning() {
        let runner = ScriptedRunner::succeeding();
        let git = Git::new(&runner);
        let scratch = tempfile::tempdir().unwrap();
        let missing = scratch.path().join("dist");

        let err = prepare(
            &git,
            &target(),
            &PushMode::ArtifactDir(missing),
            Path::new("."),
            "deploy: x",
            scratch.path(),
        )
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::PreconditionArtifactDirNotFound);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn artifact_checkout_replaces_clone_contents() {
        let scratch = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        write(&source.path().join("index.html"), "new");
        write(&source.path().join("js/app.js"), "app");

        // Simulate a clone that already holds tracked files.
        let runner = ScriptedRunner::new(|inv| {
            if is_git(inv, "clone") {
                let dest = PathBuf::from(inv.args.last().unwrap());
                write(&dest.join(".git/HEAD"), "ref: refs/heads/main\n");
                write(&dest.join("legacy.php"), "old");
                write(&dest.join("index.html"), "old");
                CommandOutput::ok("")
            } else if is_git(inv, "status") {
                CommandOutput::ok("M  index.html\nD  legacy.php\nA  js/app.js\n")
            } else {
                CommandOutput::ok("")
            }
        });
        let git = Git::new(&runner);

        let payload = prepare(
            &git,
            &target(),
            &PushMode::ArtifactDir(source.path().to_path_buf()),
            Path::new("."),
            "deploy: test",
            scratch.path(),
        )
        .unwrap();

        let checkout = match payload {
            PreparedPayload::Artifact(checkout) => checkout,
            other => panic!("unexpected payload {:?}", other),
        };

        assert!(checkout.committed);
        assert_eq!(checkout.files_copied, 2);
        assert_eq!(entries(checkout.path()), vec!["index.html", "js", "js/app.js"]);
        assert_eq!(
            fs::read_to_string(checkout.path().join("index.html")).unwrap(),
            "new"
        );

        let lines = runner.lines();
        assert!(lines[0].starts_with("git clone git@example.com:org/app.git "));
        assert_eq!(lines[1], "git checkout -B main");
        assert_eq!(lines[2], "git add -A");
        assert_eq!(lines.last().unwrap(), "git commit -m 'deploy: test'");

        let clone_dir = checkout.path().to_path_buf();
        checkout.release();
        assert!(!clone_dir.exists());
    }

    #[test]
    fn clone_failure_removes_clone_dir() {
        let scratch = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new(|_| CommandOutput::failed(128, "Could not read from remote"));
        let git = Git::new(&runner);

        let err = prepare(
            &git,
            &target(),
            &PushMode::ArtifactDir(source.path().to_path_buf()),
            Path::new("."),
            "deploy: x",
            scratch.path(),
        )
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::GitCloneFailed);
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn nothing_to_commit_is_not_an_error() {
        let scratch = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        write(&source.path().join("index.html"), "same");
        let runner = ScriptedRunner::succeeding();
        let git = Git::new(&runner);

        let payload = prepare(
            &git,
            &target(),
            &PushMode::ArtifactDir(source.path().to_path_buf()),
            Path::new("."),
            "deploy: x",
            scratch.path(),
        )
        .unwrap();

        match payload {
            PreparedPayload::Artifact(checkout) => assert!(!checkout.committed),
            other => panic!("unexpected payload {:?}", other),
        }
        assert!(!runner.calls().iter().any(|c| is_git(c, "commit")));
    }
}
