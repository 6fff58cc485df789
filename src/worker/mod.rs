//! Worker loop: claim pending accounts one at a time, fetch and file their
//! posts, and resolve each to a terminal status.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::fetch::{FetchError, PostFetcher};
use crate::media;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub staging_dir: PathBuf,
    pub images_dir: PathBuf,
    pub metadata_csv: PathBuf,
    /// Delay between iterations, applied regardless of outcome.
    pub delay: Duration,
    /// Process at most one account, then exit without sleeping.
    pub once: bool,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            staging_dir: config.staging_dir.clone(),
            images_dir: config.media.images_dir.clone(),
            metadata_csv: config.media.metadata_csv.clone(),
            delay: Duration::from_secs(config.worker.delay_secs),
            once: false,
        }
    }
}

pub struct Worker<F: PostFetcher> {
    db: Database,
    fetcher: F,
    settings: WorkerSettings,
}

impl<F: PostFetcher> Worker<F> {
    pub fn new(db: Database, fetcher: F, settings: WorkerSettings) -> Self {
        Self { db, fetcher, settings }
    }

    /// Drain the pending queue. Returns once no `Pending` account remains,
    /// or after one account in `once` mode.
    pub fn run(&self) -> Result<()> {
        std::fs::create_dir_all(&self.settings.staging_dir)?;

        loop {
            let account = match self.db.next_pending()? {
                Some(account) => account,
                None => {
                    info!("no pending accounts left in the store");
                    break;
                }
            };

            info!("processing account: {}", account.username);
            self.process_account(&account.username)?;

            if self.settings.once {
                break;
            }

            info!(
                "sleeping {}s before the next account",
                self.settings.delay.as_secs()
            );
            thread::sleep(self.settings.delay);
        }

        let counts = self.db.status_counts()?;
        info!(
            "run complete: {} done, {} failed, {} pending",
            counts.done, counts.failed, counts.pending
        );
        Ok(())
    }

    /// One account, start to terminal status. Fetch and filing failures are
    /// resolved here; only store errors propagate.
    fn process_account(&self, username: &str) -> Result<()> {
        match self.fetcher.fetch(username, &self.settings.staging_dir) {
            Ok(report) => {
                if report.warnings > 0 {
                    warn!(
                        "{} post download warning(s) for '{}'",
                        report.warnings, username
                    );
                }
            }
            Err(FetchError::ProfileNotFound { .. }) => {
                error!("profile '{}' does not exist", username);
                return self.resolve_failed(username);
            }
            Err(e) => {
                error!("failed to download posts for '{}': {}", username, e);
                return self.resolve_failed(username);
            }
        }

        match media::file_staged_media(
            username,
            &self.settings.staging_dir,
            &self.settings.images_dir,
            &self.settings.metadata_csv,
        ) {
            Ok(summary) => {
                info!("filed {} image(s) for '{}'", summary.images_filed, username);
                self.resolve_done(username)
            }
            Err(e) => {
                error!("failed to file media for '{}': {:#}", username, e);
                self.resolve_failed(username)
            }
        }
    }

    fn resolve_done(&self, username: &str) -> Result<()> {
        if !self.db.mark_done(username)? {
            warn!("account '{}' was not pending; status left unchanged", username);
        }
        Ok(())
    }

    fn resolve_failed(&self, username: &str) -> Result<()> {
        if !self.db.mark_failed(username)? {
            warn!("account '{}' was not pending; status left unchanged", username);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AccountStatus, NewAccount};
    use crate::fetch::FetchReport;
    use std::fs;
    use std::io;
    use std::path::Path;
    use tempfile::tempdir;

    /// Writes fixture posts into the staging layout the downloader would.
    struct FixtureFetcher {
        files: Vec<(&'static str, &'static [u8])>,
    }

    impl PostFetcher for FixtureFetcher {
        fn fetch(&self, username: &str, staging_dir: &Path) -> Result<FetchReport, FetchError> {
            let dir = staging_dir.join(username);
            fs::create_dir_all(&dir).map_err(|e| FetchError::Spawn {
                program: "fixture".to_string(),
                source: e,
            })?;
            for (name, bytes) in &self.files {
                fs::write(dir.join(name), bytes).map_err(|e| FetchError::Spawn {
                    program: "fixture".to_string(),
                    source: e,
                })?;
            }
            Ok(FetchReport::default())
        }
    }

    struct NotFoundFetcher;

    impl PostFetcher for NotFoundFetcher {
        fn fetch(&self, username: &str, _staging_dir: &Path) -> Result<FetchReport, FetchError> {
            Err(FetchError::ProfileNotFound { username: username.to_string() })
        }
    }

    struct BrokenFetcher;

    impl PostFetcher for BrokenFetcher {
        fn fetch(&self, _username: &str, _staging_dir: &Path) -> Result<FetchReport, FetchError> {
            Err(FetchError::Spawn {
                program: "broken".to_string(),
                source: io::Error::new(io::ErrorKind::Other, "boom"),
            })
        }
    }

    /// Reports success without staging anything, so the filing step fails.
    struct EmptyHandedFetcher;

    impl PostFetcher for EmptyHandedFetcher {
        fn fetch(&self, _username: &str, _staging_dir: &Path) -> Result<FetchReport, FetchError> {
            Ok(FetchReport::default())
        }
    }

    fn store_with(usernames: &[&str]) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let staged: Vec<NewAccount> = usernames
            .iter()
            .map(|u| NewAccount { name: u.to_string(), username: u.to_string() })
            .collect();
        db.insert_accounts(&staged).unwrap();
        db
    }

    fn settings_in(dir: &Path) -> WorkerSettings {
        WorkerSettings {
            staging_dir: dir.join("staging"),
            images_dir: dir.join("images"),
            metadata_csv: dir.join("meta_data.csv"),
            delay: Duration::ZERO,
            once: false,
        }
    }

    #[test]
    fn test_successful_accounts_end_done() {
        let workdir = tempdir().unwrap();
        let db = store_with(&["alice_h", "bob_h"]);
        let worker = Worker::new(
            db,
            FixtureFetcher {
                files: vec![("post.jpg", b"x".as_ref()), ("post.txt", b"hi".as_ref())],
            },
            settings_in(workdir.path()),
        );
        worker.run().unwrap();

        assert_eq!(worker.db.status_of("alice_h").unwrap(), Some(AccountStatus::Done));
        assert_eq!(worker.db.status_of("bob_h").unwrap(), Some(AccountStatus::Done));
        assert!(worker.db.next_pending().unwrap().is_none());
        // Staged folders are gone, images are in the shared folder.
        assert!(!workdir.path().join("staging/alice_h").exists());
        assert!(workdir.path().join("images/post.jpg").exists());
    }

    #[test]
    fn test_missing_profile_ends_failed() {
        let workdir = tempdir().unwrap();
        let db = store_with(&["ghost_h"]);
        let worker = Worker::new(db, NotFoundFetcher, settings_in(workdir.path()));
        worker.run().unwrap();

        assert_eq!(
            worker.db.status_of("ghost_h").unwrap(),
            Some(AccountStatus::Failed)
        );
    }

    #[test]
    fn test_fetch_error_ends_failed_and_loop_continues() {
        let workdir = tempdir().unwrap();
        let db = store_with(&["alice_h", "bob_h"]);
        let worker = Worker::new(db, BrokenFetcher, settings_in(workdir.path()));
        worker.run().unwrap();

        // Both accounts were attempted; neither aborted the loop.
        assert_eq!(worker.db.status_of("alice_h").unwrap(), Some(AccountStatus::Failed));
        assert_eq!(worker.db.status_of("bob_h").unwrap(), Some(AccountStatus::Failed));
    }

    #[test]
    fn test_filing_failure_ends_failed() {
        let workdir = tempdir().unwrap();
        let db = store_with(&["alice_h"]);
        let worker = Worker::new(db, EmptyHandedFetcher, settings_in(workdir.path()));
        worker.run().unwrap();

        assert_eq!(
            worker.db.status_of("alice_h").unwrap(),
            Some(AccountStatus::Failed)
        );
    }

    #[test]
    fn test_once_mode_processes_a_single_account() {
        let workdir = tempdir().unwrap();
        let db = store_with(&["alice_h", "bob_h"]);
        let mut settings = settings_in(workdir.path());
        settings.once = true;
        let worker = Worker::new(
            db,
            FixtureFetcher { files: vec![("post.jpg", b"x".as_ref())] },
            settings,
        );
        worker.run().unwrap();

        assert_eq!(worker.db.status_of("alice_h").unwrap(), Some(AccountStatus::Done));
        assert_eq!(
            worker.db.status_of("bob_h").unwrap(),
            Some(AccountStatus::Pending)
        );
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let workdir = tempdir().unwrap();
        let db = store_with(&["alice_h"]);
        let worker = Worker::new(
            db,
            FixtureFetcher { files: vec![("post.jpg", b"x".as_ref())] },
            settings_in(workdir.path()),
        );
        worker.run().unwrap();
        // Nothing pending: the loop terminates immediately.
        worker.run().unwrap();

        let counts = worker.db.status_counts().unwrap();
        assert_eq!(counts.done, 1);
        assert_eq!(counts.pending, 0);
    }
}
