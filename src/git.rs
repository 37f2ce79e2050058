//! Git clone/fetch as a black box
//!
//! Remote libraries are mirrored with the `git` binary on PATH; this module
//! only knows a URL, a target path, and a ref. Network attempts are bounded
//! by a small retry count with a short backoff, after which the caller
//! decides whether the failure is fatal (it usually downgrades to a
//! skip-with-warning).

use crate::output;
use indicatif::ProgressBar;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use thiserror::Error;

/// Attempts per network operation before giving up.
pub const NETWORK_ATTEMPTS: u32 = 3;
/// Pause between attempts.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum GitError {
    #[error(
        "unsupported git URL scheme: {0}\n\
         only https://, http://, ssh://, and git@ URLs are supported"
    )]
    UnsupportedScheme(String),

    #[error("git {operation} failed for {url} after {attempts} attempts: {details}")]
    OperationFailed {
        operation: &'static str,
        url: String,
        attempts: u32,
        details: String,
    },

    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),
}

/// RAII guard for progress bars - ensures cleanup on any exit path.
struct ProgressGuard(ProgressBar);

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        self.0.finish_and_clear();
    }
}

/// Validate that a URL uses an allowed scheme for git operations.
pub fn validate_git_url(url: &str) -> Result<(), GitError> {
    if url.starts_with("https://")
        || url.starts_with("http://")
        || url.starts_with("git@")
        || url.starts_with("ssh://")
    {
        Ok(())
    } else {
        Err(GitError::UnsupportedScheme(url.to_string()))
    }
}

/// Last path segment of a git URL without its `.git` suffix.
pub fn repo_name(url: &str) -> Result<String, GitError> {
    let trimmed = url.trim_end_matches('/').trim_end_matches(".git");
    let name = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or_default()
        .to_string();
    if name.is_empty() {
        return Err(GitError::UnsupportedScheme(url.to_string()));
    }
    Ok(name)
}

/// Mirror `url` at `dest`, pinned to `reference` (`None` tracks the remote's
/// default branch).
///
/// A valid existing clone is fetched and reset to the ref; an invalid one is
/// removed and re-cloned. Each network operation retries up to
/// [`NETWORK_ATTEMPTS`] times with [`RETRY_BACKOFF`] between attempts.
pub fn clone_or_fetch(url: &str, reference: Option<&str>, dest: &Path) -> Result<(), GitError> {
    validate_git_url(url)?;

    if dest.join(".git").exists() {
        if repo_is_valid(dest) {
            return fetch(url, reference, dest);
        }
        output::warning(&format!(
            "git: {} exists but is invalid, re-cloning",
            dest.display()
        ));
        let _ = std::fs::remove_dir_all(dest);
    }

    clone(url, reference, dest)
}

fn repo_is_valid(dest: &Path) -> bool {
    Command::new("git")
        .args(["-C", &dest.to_string_lossy(), "rev-parse", "HEAD"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn clone(url: &str, reference: Option<&str>, dest: &Path) -> Result<(), GitError> {
    output::detail(&format!("git clone {url}"));
    let _guard = ProgressGuard(output::spinner(&format!("cloning {url}")));

    let dest_str = dest.to_string_lossy().to_string();
    with_retries("clone", url, || {
        // A failed attempt can leave a partial checkout behind; clear it so
        // the retry starts clean.
        let _ = std::fs::remove_dir_all(dest);
        let mut args = vec!["clone", "--depth", "1"];
        if let Some(reference) = reference {
            args.push("--branch");
            args.push(reference);
        }
        args.push(url);
        args.push(&dest_str);
        run_git(&args)
    })
}

fn fetch(url: &str, reference: Option<&str>, dest: &Path) -> Result<(), GitError> {
    output::detail(&format!("git fetch {url}"));
    let _guard = ProgressGuard(output::spinner(&format!("fetching {url}")));

    let dest_str = dest.to_string_lossy().to_string();
    with_retries("fetch", url, || {
        run_git(&[
            "-C",
            &dest_str,
            "fetch",
            "--depth",
            "1",
            "origin",
            reference.unwrap_or("HEAD"),
        ])
    })?;
    // Local operation, not retried.
    run_git(&["-C", &dest_str, "checkout", "-q", "FETCH_HEAD"]).map_err(|details| {
        GitError::OperationFailed { operation: "checkout", url: url.to_string(), attempts: 1, details }
    })
}

fn with_retries(
    operation: &'static str,
    url: &str,
    mut attempt: impl FnMut() -> Result<(), String>,
) -> Result<(), GitError> {
    let mut last = String::new();
    for n in 1..=NETWORK_ATTEMPTS {
        match attempt() {
            Ok(()) => return Ok(()),
            Err(details) => {
                last = details;
                if n < NETWORK_ATTEMPTS {
                    output::detail(&format!("git {operation} attempt {n} failed, retrying"));
                    std::thread::sleep(RETRY_BACKOFF);
                }
            }
        }
    }
    Err(GitError::OperationFailed {
        operation,
        url: url.to_string(),
        attempts: NETWORK_ATTEMPTS,
        details: last,
    })
}

/// Run git with stderr captured for diagnostics; stdout is discarded.
fn run_git(args: &[&str]) -> Result<(), String> {
    let output = Command::new("git")
        .args(args)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::piped())
        .output()
        .map_err(|e| format!("failed to run git: {e}"))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}
