//! Account store: a single SQLite table shared by the importer and the
//! worker loop. Both jobs go through [`Database`] so they agree on one
//! schema definition.

mod accounts;
mod schema;

pub use accounts::{Account, AccountStatus, NewAccount, StatusCounts};
pub use schema::SCHEMA;

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use std::collections::HashSet;
use std::path::Path;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open account store at {}", path.display()))?;
        Ok(Self { conn })
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("failed to initialize account store")?;
        Ok(())
    }

    /// All handles currently in the store, for import-time deduplication.
    pub fn usernames(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT username FROM users")?;
        let usernames = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(usernames)
    }

    /// Batch-insert staged accounts as `Pending` inside one transaction.
    ///
    /// A constraint failure rolls back the whole batch; rows committed by
    /// earlier batches are unaffected.
    pub fn insert_accounts(&self, accounts: &[NewAccount]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO users (name, username, status) VALUES (?, ?, ?)",
            )?;
            for account in accounts {
                stmt.execute(rusqlite::params![
                    account.name,
                    account.username,
                    AccountStatus::Pending.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(accounts.len())
    }

    /// The next `Pending` account in the store's natural order, if any.
    pub fn next_pending(&self) -> Result<Option<Account>> {
        let result = self.conn.query_row(
            r#"
            SELECT id, name, username, status
            FROM users
            WHERE status = 'Pending'
            ORDER BY id
            LIMIT 1
            "#,
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        );
        match result {
            Ok((id, name, username, status)) => {
                let status = AccountStatus::from_str(&status)
                    .ok_or_else(|| anyhow!("unknown status '{}' for account '{}'", status, username))?;
                Ok(Some(Account { id, name, username, status }))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// `Pending -> Done`. Returns false when the row was not `Pending`, in
    /// which case nothing is written.
    pub fn mark_done(&self, username: &str) -> Result<bool> {
        self.transition(username, AccountStatus::Done)
    }

    /// `Pending -> Failed`. Returns false when the row was not `Pending`.
    pub fn mark_failed(&self, username: &str) -> Result<bool> {
        self.transition(username, AccountStatus::Failed)
    }

    fn transition(&self, username: &str, to: AccountStatus) -> Result<bool> {
        debug_assert!(to.is_terminal());
        let changed = self.conn.execute(
            "UPDATE users SET status = ? WHERE username = ? AND status = 'Pending'",
            rusqlite::params![to.as_str(), username],
        )?;
        Ok(changed > 0)
    }

    pub fn status_of(&self, username: &str) -> Result<Option<AccountStatus>> {
        let result = self.conn.query_row(
            "SELECT status FROM users WHERE username = ?",
            [username],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(status) => Ok(Some(
                AccountStatus::from_str(&status)
                    .ok_or_else(|| anyhow!("unknown status '{}' for account '{}'", status, username))?,
            )),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn status_counts(&self) -> Result<StatusCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM users GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .filter_map(|r| r.ok());

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match AccountStatus::from_str(&status) {
                Some(AccountStatus::Pending) => counts.pending = count,
                Some(AccountStatus::Done) => counts.done = count,
                Some(AccountStatus::Failed) => counts.failed = count,
                None => {}
            }
        }
        Ok(counts)
    }
}
