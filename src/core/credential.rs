//! Temporary SSH key files for authenticating a push.
//!
//! Key material arrives as an opaque string (base64 or raw PEM/OpenSSH text)
//! and is written to an owner-only file that lives exactly as long as the
//! returned [`CredentialHandle`].

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use base64::Engine;
use tempfile::TempPath;

use crate::error::{Error, Result};
use crate::utils::shell;

/// Marker that identifies decoded key material.
const KEY_MARKER: &[u8] = b"BEGIN";
/// The marker must appear within this many leading bytes.
const MARKER_WINDOW: usize = 50;

/// How to interpret key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyFormat {
    /// Try base64 first, fall back to raw when the decoded bytes lack the marker.
    #[default]
    Auto,
    Base64,
    Raw,
}

impl FromStr for KeyFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(KeyFormat::Auto),
            "base64" => Ok(KeyFormat::Base64),
            "raw" => Ok(KeyFormat::Raw),
            other => Err(format!(
                "unknown key format '{}' (expected auto, base64 or raw)",
                other
            )),
        }
    }
}

impl fmt::Display for KeyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyFormat::Auto => "auto",
            KeyFormat::Base64 => "base64",
            KeyFormat::Raw => "raw",
        };
        f.write_str(name)
    }
}

fn decode_base64(candidate: &str) -> Option<Vec<u8>> {
    let cleaned: String = candidate.split_whitespace().collect();
    base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .ok()
}

fn has_marker(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(MARKER_WINDOW)];
    window
        .windows(KEY_MARKER.len())
        .any(|w| w == KEY_MARKER)
}

/// Turn key material into the bytes written to disk.
///
/// Surrounding whitespace is trimmed in every mode, so `Raw` and the `Auto`
/// fallback write the trimmed string rather than the input verbatim. Keys
/// pasted into CI secrets often carry stray newlines or indentation.
///
/// `Auto` is a heuristic: a raw key that happens to be valid base64 and
/// decodes to something containing the marker would be misread. Use
/// `Raw` or `Base64` to pin the interpretation.
pub fn decode_key_material(input: &str, format: KeyFormat) -> Result<Vec<u8>> {
    let candidate = input.trim();

    match format {
        KeyFormat::Raw => Ok(candidate.as_bytes().to_vec()),
        KeyFormat::Base64 => decode_base64(candidate).ok_or_else(|| {
            Error::validation_invalid_argument("key-format", "key material is not valid base64")
        }),
        KeyFormat::Auto => match decode_base64(candidate) {
            Some(decoded) if has_marker(&decoded) => Ok(decoded),
            _ => Ok(candidate.as_bytes().to_vec()),
        },
    }
}

/// Owner of a temporary key file. Dropping the handle deletes the file.
#[derive(Debug)]
pub struct CredentialHandle {
    path: TempPath,
}

impl CredentialHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value for `GIT_SSH_COMMAND` that makes this key the only identity used.
    pub fn ssh_command(&self, strict_host_key_checking: bool) -> String {
        format!(
            "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking={}",
            shell::quote_path(&self.path.to_string_lossy()),
            if strict_host_key_checking { "yes" } else { "no" }
        )
    }

    /// Delete the key file now. Errors are swallowed.
    pub fn release(self) {
        let display = self.path.display().to_string();
        match self.path.close() {
            Ok(()) => log_status!("credential", "Removed temporary SSH key {}", display),
            Err(e) => log_status!("credential", "Could not remove {}: {}", display, e),
        }
    }
}

/// Write key material to a fresh owner-only file inside `scratch_dir`.
///
/// Returns `Ok(None)` when no key material is supplied, meaning the push
/// relies on whatever SSH agent or config is already present.
pub fn materialize(
    key_material: Option<&str>,
    format: KeyFormat,
    scratch_dir: &Path,
) -> Result<Option<CredentialHandle>> {
    let material = match key_material {
        Some(m) if !m.trim().is_empty() => m,
        _ => return Ok(None),
    };

    let bytes = decode_key_material(material, format)?;
    let write_error =
        |e: std::io::Error| Error::credential_write(scratch_dir.display().to_string(), e.to_string());

    // tempfile creates the file with mode 0600 on Unix.
    let mut file = tempfile::Builder::new()
        .prefix("gitship-key-")
        .tempfile_in(scratch_dir)
        .map_err(write_error)?;

    file.write_all(&bytes).map_err(write_error)?;
    file.flush().map_err(write_error)?;
    restrict_permissions(file.path()).map_err(write_error)?;

    let path = file.into_temp_path();
    log_status!("credential", "Wrote temporary SSH key to {}", path.display());

    Ok(Some(CredentialHandle { path }))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
