//! CSV import into the account store.
//!
//! Reads a `Name,username` CSV, deduplicates against the store and the
//! current run, and batch-inserts the remainder as `Pending`.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::{error, info};

use crate::db::{Database, NewAccount};

/// Outcome of one import run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    pub skipped_duplicates: usize,
    pub skipped_empty: usize,
}

pub fn import_csv(db: &Database, csv_path: &Path) -> Result<ImportSummary> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;

    let headers = reader.headers()?.clone();
    let (name_col, username_col) = match (
        find_column(&headers, "name"),
        find_column(&headers, "username"),
    ) {
        (Some(name), Some(username)) => (name, username),
        _ => bail!(
            "CSV headers do not match expected names ('Name' and 'username'), got {:?}",
            headers
        ),
    };

    let mut seen = db.usernames()?;
    let mut staged: Vec<NewAccount> = Vec::new();
    let mut summary = ImportSummary::default();

    for record in reader.records() {
        let record = record.context("failed to read CSV record")?;
        let username = record.get(username_col).unwrap_or("").trim();
        if username.is_empty() {
            summary.skipped_empty += 1;
            continue;
        }
        // Already in the store, or staged earlier in this run.
        if seen.contains(username) {
            info!("skipping duplicate username: {}", username);
            summary.skipped_duplicates += 1;
            continue;
        }

        let name = record.get(name_col).unwrap_or("").trim();
        seen.insert(username.to_string());
        staged.push(NewAccount {
            name: name.to_string(),
            username: username.to_string(),
        });
    }

    if !staged.is_empty() {
        match db.insert_accounts(&staged) {
            Ok(added) => summary.added = added,
            Err(e) => {
                // Rows committed by earlier runs stay committed.
                error!("integrity error while inserting new accounts: {}", e);
            }
        }
    }

    info!("{} new accounts added", summary.added);
    Ok(summary)
}

/// Case- and whitespace-insensitive header lookup, tolerating a UTF-8 BOM on
/// the first column.
fn find_column(headers: &csv::StringRecord, wanted: &str) -> Option<usize> {
    headers.iter().position(|header| {
        header
            .trim_start_matches('\u{feff}')
            .trim()
            .eq_ignore_ascii_case(wanted)
    })
}
