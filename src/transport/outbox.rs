//! Outbox transport: every message becomes an `.eml` file in a directory.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use crate::error::{MergeError, Result, TransportError};
use crate::transport::{compose, BccHeader, OutgoingMessage, Transport};

/// Writes composed messages to `dir`, keeping the `Bcc` header.
///
/// Files are named `{seq}_{timestamp}_{to}.eml` so a directory listing
/// follows send order. The sequence continues from the highest number
/// already in the directory, so a resumed run sorts after the stopped one.
#[derive(Debug)]
pub struct OutboxTransport {
    dir: PathBuf,
    sequence: usize,
}

impl OutboxTransport {
    /// Open (creating if needed) the outbox directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| MergeError::io(&dir, e))?;
        let sequence = highest_sequence(&dir)?;
        debug!(dir = %dir.display(), sequence, "Opened outbox");
        Ok(Self { dir, sequence })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_path(&self, to: &str) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let name = format!(
            "{:05}_{stamp}_{}.eml",
            self.sequence + 1,
            sanitize_filename_part(to, 60)
        );
        unique_path(&self.dir.join(name))
    }
}

impl Transport for OutboxTransport {
    fn name(&self) -> &'static str {
        "outbox"
    }

    fn send(&mut self, message: &OutgoingMessage<'_>) -> std::result::Result<(), TransportError> {
        let formatted = compose(message, BccHeader::Keep)?.formatted();
        let path = self.next_path(&message.to);
        std::fs::write(&path, formatted).map_err(|e| TransportError::Delivery {
            transport: "outbox",
            reason: format!("{}: {e}", path.display()),
        })?;
        self.sequence += 1;
        debug!(path = %path.display(), to = %message.to, "Wrote message to outbox");
        Ok(())
    }
}

/// Largest `{seq}_` prefix among the `.eml` files in `dir`, or 0.
fn highest_sequence(dir: &Path) -> Result<usize> {
    let entries = std::fs::read_dir(dir).map_err(|e| MergeError::io(dir, e))?;
    let mut highest = 0;
    for entry in entries {
        let entry = entry.map_err(|e| MergeError::io(dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.ends_with(".eml") {
            continue;
        }
        let seq = name
            .split_once('_')
            .and_then(|(prefix, _)| prefix.parse::<usize>().ok());
        if let Some(seq) = seq {
            highest = highest.max(seq);
        }
    }
    Ok(highest)
}

/// Replace characters that are unsafe in filenames with `_`, truncating to
/// `max_len`.
pub fn sanitize_filename_part(s: &str, max_len: usize) -> String {
    let sanitized: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | '@') {
                c
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect();

    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}

/// Append a counter to `path` until it names a file that does not exist.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("message");
    let parent = path.parent().unwrap_or(Path::new("."));
    let mut i = 1usize;
    loop {
        let candidate = parent.join(format!("{stem}_{i}.eml"));
        if !candidate.exists() {
            return candidate;
        }
        i += 1;
    }
}
