//! `.tar.gz` backup of the state and workspace directories.

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use {
    axum::{
        body::Body,
        extract::State,
        http::{
            StatusCode,
            header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        },
        response::{IntoResponse, Response},
    },
    chrono::{DateTime, SecondsFormat, Utc},
    flate2::{Compression, write::GzEncoder},
    tokio_util::io::{ReaderStream, SyncIoBridge},
    tracing::{info, warn},
};

use crate::state::AppState;

const DATA_ROOT: &str = "/data";
const PIPE_CAPACITY: usize = 64 * 1024;

/// Archive root plus the entries to pack, relative to it.
///
/// Relative directories are resolved against the working directory first.
/// Entries are relative to `/data` when both directories live there so the
/// archive restores onto a fresh volume, else relative to `/`. A workspace
/// nested inside the state directory is packed once.
pub fn archive_layout(state_dir: &Path, workspace_dir: &Path) -> (PathBuf, Vec<PathBuf>) {
    let state_dir = resolve(state_dir);
    let workspace_dir = resolve(workspace_dir);
    let data = Path::new(DATA_ROOT);
    let root = if state_dir.starts_with(data) && workspace_dir.starts_with(data) {
        data
    } else {
        Path::new("/")
    };
    let mut entries = Vec::new();
    for dir in [&state_dir, &workspace_dir] {
        if *dir != state_dir && dir.starts_with(&state_dir) {
            continue;
        }
        match dir.strip_prefix(root) {
            Ok(rel) if !rel.as_os_str().is_empty() => {
                if !entries.iter().any(|e: &PathBuf| e == rel) {
                    entries.push(rel.to_path_buf());
                }
            },
            _ => warn!(dir = %dir.display(), root = %root.display(), "directory left out of backup"),
        }
    }
    (root.to_path_buf(), entries)
}

fn resolve(dir: &Path) -> PathBuf {
    std::path::absolute(dir).unwrap_or_else(|e| {
        warn!(dir = %dir.display(), error = %e, "cannot resolve backup directory");
        dir.to_path_buf()
    })
}

/// `openclaw-backup-2026-10-16T08-30-00-000Z.tar.gz`
pub fn backup_filename(now: DateTime<Utc>) -> String {
    let stamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("openclaw-backup-{stamp}.tar.gz")
}

/// Write a gzip-compressed tar of `entries` (relative to `root`).
/// Missing entries are skipped.
pub fn write_archive<W: Write>(writer: W, root: &Path, entries: &[PathBuf]) -> io::Result<W> {
    let mut tar = tar::Builder::new(GzEncoder::new(writer, Compression::default()));
    tar.follow_symlinks(false);
    for entry in entries {
        let full = root.join(entry);
        if full.is_dir() {
            tar.append_dir_all(entry, &full)?;
        } else if full.is_file() {
            tar.append_path_with_name(&full, entry)?;
        }
    }
    let mut writer = tar.into_inner()?.finish()?;
    writer.flush()?;
    Ok(writer)
}

/// `GET /setup/export`: streamed while the archive is being built.
pub async fn export_backup(State(state): State<AppState>) -> Response {
    let settings = &state.gateway.settings;
    let (root, entries) = archive_layout(&settings.state_dir(), &settings.workspace_dir());
    let filename = backup_filename(Utc::now());
    info!(%filename, root = %root.display(), "exporting backup");

    let (reader, writer) = tokio::io::duplex(PIPE_CAPACITY);
    let bridge = SyncIoBridge::new(writer);
    tokio::task::spawn_blocking(move || {
        if let Err(e) = write_archive(bridge, &root, &entries) {
            warn!(error = %e, "backup export aborted");
        }
    });

    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, "application/gzip".to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, chrono::TimeZone, flate2::read::GzDecoder};

    #[test]
    fn data_volume_layout() {
        let (root, entries) =
            archive_layout(Path::new("/data/.openclaw"), Path::new("/data/workspace"));
        assert_eq!(root, PathBuf::from("/data"));
        assert_eq!(entries, vec![PathBuf::from(".openclaw"), PathBuf::from("workspace")]);
    }

    #[test]
    fn nested_workspace_packed_once() {
        let (root, entries) =
            archive_layout(Path::new("/home/u/.openclaw"), Path::new("/home/u/.openclaw/workspace"));
        assert_eq!(root, PathBuf::from("/"));
        assert_eq!(entries, vec![PathBuf::from("home/u/.openclaw")]);
    }

    #[test]
    fn relative_dirs_are_resolved() {
        let (root, entries) =
            archive_layout(Path::new("data/.openclaw"), Path::new("data/workspace"));
        let cwd = std::env::current_dir().unwrap();
        let expected: Vec<PathBuf> = ["data/.openclaw", "data/workspace"]
            .iter()
            .map(|d| cwd.join(d).strip_prefix(&root).unwrap().to_path_buf())
            .collect();
        assert_eq!(entries, expected);
        assert!(entries.iter().all(|e| e.is_relative()));
    }

    #[test]
    fn filename_matches_iso_stamp() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 8, 30, 5).unwrap();
        assert_eq!(backup_filename(now), "openclaw-backup-2026-10-16T08-30-05-000Z.tar.gz");
    }

    #[test]
    fn archive_contains_both_trees() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("state/config")).unwrap();
        std::fs::write(dir.path().join("state/openclaw.json"), "{}").unwrap();
        std::fs::create_dir_all(dir.path().join("workspace")).unwrap();
        std::fs::write(dir.path().join("workspace/USER.md"), "# User\n").unwrap();

        let entries = vec![
            PathBuf::from("state"),
            PathBuf::from("workspace"),
            PathBuf::from("missing"),
        ];
        let bytes = write_archive(Vec::new(), dir.path(), &entries).unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(bytes.as_slice()));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        assert!(names.iter().any(|n| n == "state/openclaw.json"), "{names:?}");
        assert!(names.iter().any(|n| n == "workspace/USER.md"), "{names:?}");
        assert!(!names.iter().any(|n| n.starts_with("missing")));
    }
}
