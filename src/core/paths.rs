use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

/// Base gitship config directory (universal ~/.config/gitship/ on all platforms)
pub fn gitship() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("gitship"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("gitship"))
    }
}

/// Global gitship.json config file path
pub fn gitship_json() -> Result<PathBuf> {
    Ok(gitship()?.join("gitship.json"))
}

/// Directory for per-run scratch files (temporary keys, ephemeral clones).
pub fn scratch() -> PathBuf {
    env::temp_dir()
}

/// Expand `~` and environment references in a user-supplied path.
pub fn expand(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}
