// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only routing history and the per-process session snapshot.
//!
//! Writes never fail the caller: every I/O error is logged and dropped.

use std::path::{Path, PathBuf};

use chrono::{Local, SecondsFormat};
use tiergate_core::{LogEntry, SessionSnapshot};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const HISTORY_FILE: &str = "logs/routing_history.jsonl";
const SESSION_FILE: &str = "session.json";

/// Local timestamp in RFC 3339 form, as written to every record.
pub fn timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// Handle to the history directory.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    dir: PathBuf,
}

impl HistoryLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    pub fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    /// Appends one JSON line. The file is opened, written with a single
    /// `write_all` and closed on every call.
    pub async fn append(&self, entry: &LogEntry) {
        let mut line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize routing history entry");
                return;
            }
        };
        line.push('\n');

        let path = self.history_path();
        if let Err(e) = append_line(&path, line.as_bytes()).await {
            warn!(path = %path.display(), error = %e, "failed to append routing history");
        } else {
            debug!(tier = %entry.tier, success = entry.success, "routing history appended");
        }
    }

    /// Overwrites `session.json` with pretty JSON.
    pub async fn write_session_snapshot(&self, snapshot: &SessionSnapshot) {
        let path = self.session_path();
        let body = match serde_json::to_string_pretty(snapshot) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "failed to serialize session snapshot");
                return;
            }
        };
        let result = async {
            ensure_parent(&path).await?;
            tokio::fs::write(&path, body).await
        }
        .await;
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to write session snapshot");
        }
    }
}

async fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) => tokio::fs::create_dir_all(parent).await,
        None => Ok(()),
    }
}

async fn append_line(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    ensure_parent(path).await?;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await
}
