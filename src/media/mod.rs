//! Filing step: move a handle's staged images into the shared library folder
//! and append one metadata row per image.

use anyhow::{bail, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

const METADATA_HEADER: [&str; 3] = ["username", "path", "description"];

/// Result of filing one handle's staged folder.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MediaSummary {
    pub images_filed: usize,
}

/// File every image from `<staging_dir>/<username>/` into `images_dir`,
/// append `{username, path, caption}` rows to `metadata_csv`, then remove
/// the staged folder.
pub fn file_staged_media(
    username: &str,
    staging_dir: &Path,
    images_dir: &Path,
    metadata_csv: &Path,
) -> Result<MediaSummary> {
    let source_dir = staging_dir.join(username);
    if !source_dir.is_dir() {
        bail!("no staged folder for '{}' at {}", username, source_dir.display());
    }

    std::fs::create_dir_all(images_dir)
        .with_context(|| format!("failed to create {}", images_dir.display()))?;

    let images = discover_images(&source_dir);
    let mut writer = open_metadata_writer(metadata_csv)?;
    let mut summary = MediaSummary::default();

    for image in &images {
        let filename = match image.file_name() {
            Some(name) => name,
            None => continue,
        };
        let destination = images_dir.join(filename);
        std::fs::copy(image, &destination)
            .with_context(|| format!("failed to copy {} into library", image.display()))?;

        let caption = read_caption(&image.with_extension("txt"));
        writer.write_record([
            username,
            destination.to_string_lossy().as_ref(),
            caption.as_str(),
        ])?;
        summary.images_filed += 1;
    }
    writer.flush()?;

    // The staged folder is redundant once everything is filed.
    std::fs::remove_dir_all(&source_dir)
        .with_context(|| format!("failed to remove staged folder {}", source_dir.display()))?;

    Ok(summary)
}

fn discover_images(directory: &Path) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for entry in WalkDir::new(directory)
        .max_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if path.is_file() {
            if let Some(ext) = path.extension() {
                let ext_lower = ext.to_string_lossy().to_lowercase();
                if IMAGE_EXTENSIONS.contains(&ext_lower.as_str()) {
                    images.push(path.to_path_buf());
                }
            }
        }
    }

    // Sort by path for consistent ordering
    images.sort();
    images
}

/// Open the metadata CSV for appending, writing the header row only when the
/// file is empty.
fn open_metadata_writer(path: &Path) -> Result<csv::Writer<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let needs_header = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if needs_header {
        writer.write_record(METADATA_HEADER)?;
    }
    Ok(writer)
}

/// Read a sibling caption file, tolerating non-UTF-8 text. Missing or
/// unreadable captions become the empty string.
fn read_caption(path: &Path) -> String {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                warn!("could not read caption {}: {}", path.display(), e);
            }
            return String::new();
        }
    };

    match String::from_utf8(bytes) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            // Windows-1252 decoding never fails, stray bytes become
            // replacement characters.
            let bytes = e.into_bytes();
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            text.trim().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn stage_handle(staging: &Path, username: &str, files: &[(&str, &[u8])]) {
        let dir = staging.join(username);
        fs::create_dir_all(&dir).unwrap();
        for (name, bytes) in files {
            fs::write(dir.join(name), bytes).unwrap();
        }
    }

    fn read_metadata(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        reader
            .records()
            .map(|r| r.unwrap().iter().map(|f| f.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_files_images_and_removes_staged_folder() {
        let workdir = tempdir().unwrap();
        let staging = workdir.path();
        let images_dir = workdir.path().join("images");
        let metadata_csv = workdir.path().join("meta_data.csv");

        stage_handle(
            staging,
            "alice_h",
            &[
                ("post1.jpg", b"jpg-bytes".as_ref()),
                ("post1.txt", b"beach day".as_ref()),
                ("post2.PNG", b"png-bytes".as_ref()),
                ("post2.mp4", b"video-bytes".as_ref()),
            ],
        );

        let summary =
            file_staged_media("alice_h", staging, &images_dir, &metadata_csv).unwrap();

        assert_eq!(summary.images_filed, 2);
        assert!(images_dir.join("post1.jpg").exists());
        assert!(images_dir.join("post2.PNG").exists());
        assert!(!images_dir.join("post2.mp4").exists());
        assert!(!staging.join("alice_h").exists());

        let rows = read_metadata(&metadata_csv);
        assert_eq!(rows[0], vec!["username", "path", "description"]);
        assert_eq!(rows[1][0], "alice_h");
        assert_eq!(rows[1][2], "beach day");
        // post2 has no caption file
        assert_eq!(rows[2][2], "");
    }

    #[test]
    fn test_header_written_exactly_once_across_appends() {
        let workdir = tempdir().unwrap();
        let staging = workdir.path();
        let images_dir = workdir.path().join("images");
        let metadata_csv = workdir.path().join("meta_data.csv");

        stage_handle(staging, "alice_h", &[("a.jpg", b"x".as_ref())]);
        file_staged_media("alice_h", staging, &images_dir, &metadata_csv).unwrap();

        stage_handle(staging, "bob_h", &[("b.jpg", b"y".as_ref())]);
        file_staged_media("bob_h", staging, &images_dir, &metadata_csv).unwrap();

        let rows = read_metadata(&metadata_csv);
        let headers = rows
            .iter()
            .filter(|r| r[0] == "username" && r[1] == "path")
            .count();
        assert_eq!(headers, 1);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_non_utf8_caption_falls_back() {
        let workdir = tempdir().unwrap();
        let staging = workdir.path();
        let images_dir = workdir.path().join("images");
        let metadata_csv = workdir.path().join("meta_data.csv");

        // "café" in Windows-1252: 0xE9 is not valid UTF-8.
        stage_handle(
            staging,
            "alice_h",
            &[
                ("a.jpg", b"x".as_ref()),
                ("a.txt", b"caf\xe9".as_ref()),
            ],
        );
        file_staged_media("alice_h", staging, &images_dir, &metadata_csv).unwrap();

        let rows = read_metadata(&metadata_csv);
        assert_eq!(rows[1][2], "caf\u{e9}");
    }

    #[test]
    fn test_missing_staged_folder_is_an_error() {
        let workdir = tempdir().unwrap();
        let result = file_staged_media(
            "ghost_h",
            workdir.path(),
            &workdir.path().join("images"),
            &workdir.path().join("meta_data.csv"),
        );
        assert!(result.is_err());
    }
}
