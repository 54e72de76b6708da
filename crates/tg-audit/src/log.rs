// log.rs - Append-only, hash-chained JSONL consent audit log.
//
// One ConsentEvent per line. Each event carries the SHA-256 of the previous
// raw line in `previous_hash`, so inserting, deleting or editing lines
// breaks the chain and `verify_chain` reports the first bad line.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::AuditError;
use crate::event::ConsentEvent;
use crate::hasher;

/// An append-only audit log backed by a JSONL file.
pub struct AuditLog {
    writer: BufWriter<File>,
    path: PathBuf,
    /// Hash of the last line written; becomes the next event's `previous_hash`.
    last_hash: Option<String>,
}

impl AuditLog {
    /// Open (or create) an audit log at the given path.
    ///
    /// An existing log is scanned for its last line so new events continue
    /// the chain.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| AuditError::OpenFailed {
                    path: path.clone(),
                    source,
                })?;
            }
        }

        let last_hash = if path.exists() {
            Self::read_last_hash(&path)?
        } else {
            None
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            last_hash,
        })
    }

    /// Append an event, linking it to the previous one. Flushes after writing.
    ///
    /// On failure the file is cut back to its length before the call and any
    /// buffered bytes are discarded, so a failed append never leaves a
    /// partial line ahead of the next one.
    pub fn append(&mut self, event: &mut ConsentEvent) -> Result<(), AuditError> {
        event.previous_hash = self.last_hash.clone();
        let json = serde_json::to_string(event)?;

        let committed_len = self.writer.get_ref().metadata()?.len();
        if let Err(e) = writeln!(self.writer, "{}", json).and_then(|_| self.writer.flush()) {
            tracing::warn!(path = %self.path.display(), error = %e, "audit append failed");
            self.discard_partial(committed_len)?;
            return Err(e.into());
        }

        // Only advance the chain once the line is durably handed to the OS.
        self.last_hash = Some(hasher::hash_str(&json));
        tracing::debug!(
            path = %self.path.display(),
            subject = %event.subject_id,
            sub_capability = %event.sub_capability_key,
            action = %event.action,
            "audit event appended"
        );
        Ok(())
    }

    /// Drop everything after `len` bytes: unflushed buffer contents and any
    /// partial line that reached the file.
    fn discard_partial(&mut self, len: u64) -> Result<(), AuditError> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|source| AuditError::OpenFailed {
                path: self.path.clone(),
                source,
            })?;
        file.set_len(len)?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // `into_parts` hands back the buffer instead of flushing it on drop.
        let _ = stale.into_parts();
        Ok(())
    }

    /// Read all events, oldest first. Blank lines are skipped.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<ConsentEvent>, AuditError> {
        let reader = Self::reader(path.as_ref())?;
        let mut events = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }

        Ok(events)
    }

    /// Verify the hash chain. Returns the number of events on success, or
    /// `IntegrityViolation` naming the first broken line.
    pub fn verify_chain(path: impl AsRef<Path>) -> Result<usize, AuditError> {
        let reader = Self::reader(path.as_ref())?;
        let mut previous_hash: Option<String> = None;
        let mut count = 0;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let event: ConsentEvent = serde_json::from_str(&line)?;
            if event.previous_hash != previous_hash {
                tracing::warn!(path = %path.as_ref().display(), line = line_num + 1, "audit chain broken");
                return Err(AuditError::IntegrityViolation {
                    line: line_num + 1,
                    expected: previous_hash.unwrap_or_else(|| "None".to_string()),
                    actual: event.previous_hash.unwrap_or_else(|| "None".to_string()),
                });
            }

            // Hash the raw line; re-serializing could reorder fields.
            previous_hash = Some(hasher::hash_str(&line));
            count += 1;
        }

        tracing::debug!(path = %path.as_ref().display(), events = count, "audit chain verified");
        Ok(count)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(path: &Path) -> Result<BufReader<File>, AuditError> {
        let file = File::open(path).map_err(|source| AuditError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(BufReader::new(file))
    }

    fn read_last_hash(path: &Path) -> Result<Option<String>, AuditError> {
        let mut last_line: Option<String> = None;
        for line in Self::reader(path)?.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                last_line = Some(line);
            }
        }
        Ok(last_line.map(|line| hasher::hash_str(&line)))
    }
}
