//! Fetch step: post downloading is delegated to an external program.
//!
//! The downloader is expected to write everything it fetches for a handle
//! into `<staging_dir>/<handle>/`, the layout `instaloader <handle>` produces
//! when run from the staging directory.

use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus};

use thiserror::Error;
use tracing::warn;

use crate::config::FetchConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    /// The remote service reported that the account does not exist.
    #[error("profile '{username}' does not exist")]
    ProfileNotFound { username: String },

    #[error("failed to launch downloader '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("downloader exited with {status} for '{username}'")]
    CommandFailed { username: String, status: ExitStatus },
}

/// Report from a completed fetch.
#[derive(Debug, Default, Clone)]
pub struct FetchReport {
    /// Number of downloader warnings (individual post failures, retries).
    pub warnings: usize,
}

pub trait PostFetcher {
    /// Download all posts for `username` into `<staging_dir>/<username>/`.
    fn fetch(&self, username: &str, staging_dir: &Path) -> Result<FetchReport, FetchError>;
}

/// Runs the configured downloader program once per handle.
pub struct CommandFetcher {
    program: String,
    args: Vec<String>,
    not_found_markers: Vec<String>,
}

impl CommandFetcher {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            not_found_markers: config
                .not_found_markers
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
        }
    }
}

impl PostFetcher for CommandFetcher {
    fn fetch(&self, username: &str, staging_dir: &Path) -> Result<FetchReport, FetchError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(username)
            .current_dir(staging_dir)
            .output()
            .map_err(|e| FetchError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        // Per-post failures surface as downloader stderr lines; log them
        // individually and keep going.
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut warnings = 0;
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            warn!("{}: {}", username, line);
            warnings += 1;
        }

        if !output.status.success() {
            let stderr_lower = stderr.to_lowercase();
            if self
                .not_found_markers
                .iter()
                .any(|marker| stderr_lower.contains(marker))
            {
                return Err(FetchError::ProfileNotFound {
                    username: username.to_string(),
                });
            }
            return Err(FetchError::CommandFailed {
                username: username.to_string(),
                status: output.status,
            });
        }

        Ok(FetchReport { warnings })
    }
}
