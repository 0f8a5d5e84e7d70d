// log.rs — Bounded, hash-chained JSONL audit log.
//
// One JSON object per line, oldest first. Each record's `previous_hash` is
// the SHA-256 of the raw line before it, so edits, insertions, and deletions
// inside the retained window break the chain.
//
// The log keeps at most `retention` records. Once full, every append evicts
// the oldest line by writing the retained window to a fresh temp file beside
// the log and renaming it into place, so a full log costs one window rewrite
// per record. The first retained record's `previous_hash` then points at an
// evicted line; it is treated as the chain anchor and not checked.
//
// One writer per file. The retained window is cached in memory at open, so
// two processes appending to the same path fork the chain; `verify_chain`
// reports the fork.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::AuditError;
use crate::record::VerdictRecord;
use crate::sink::LogSink;

/// Records kept when no retention is configured.
pub const DEFAULT_RETENTION: usize = 1000;

/// A rolling audit log backed by a JSONL file.
pub struct RollingAuditLog {
    writer: BufWriter<File>,
    path: PathBuf,
    retention: usize,
    /// Raw lines currently in the file, oldest first.
    lines: VecDeque<String>,
}

impl RollingAuditLog {
    /// Open (or create) a log at `path` keeping at most `retention` records.
    ///
    /// An existing file longer than `retention` is trimmed immediately.
    pub fn open(path: impl AsRef<Path>, retention: usize) -> Result<Self, AuditError> {
        if retention == 0 {
            return Err(AuditError::InvalidRetention);
        }
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;
        }

        let mut lines = if path.exists() {
            read_lines(&path)?
        } else {
            VecDeque::new()
        };

        let trimmed = lines.len() > retention;
        while lines.len() > retention {
            lines.pop_front();
        }
        if trimmed {
            rewrite(&path, lines.iter().map(String::as_str))?;
        }

        let writer = open_append(&path)?;
        Ok(Self {
            writer,
            path,
            retention,
            lines,
        })
    }

    /// Read all retained records, oldest first. Skips blank lines.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<VerdictRecord>, AuditError> {
        read_lines(path.as_ref())?
            .iter()
            .map(|line| serde_json::from_str(line).map_err(AuditError::from))
            .collect()
    }

    /// Verify the hash chain between consecutive retained records.
    ///
    /// Returns the number of records checked, or an `IntegrityViolation`
    /// naming the first broken link.
    pub fn verify_chain(path: impl AsRef<Path>) -> Result<usize, AuditError> {
        let file = File::open(path.as_ref()).map_err(|source| AuditError::OpenFailed {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);
        let mut previous_hash: Option<String> = None;
        let mut checked = 0;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let record: VerdictRecord = serde_json::from_str(&line)?;

            // The first retained record anchors the chain.
            if checked > 0 && record.previous_hash != previous_hash {
                return Err(AuditError::IntegrityViolation {
                    line: line_num + 1,
                    expected: previous_hash.unwrap_or_else(|| "None".to_string()),
                    actual: record.previous_hash.unwrap_or_else(|| "None".to_string()),
                });
            }

            // Hash the raw line, not a re-serialization: field order could change.
            previous_hash = Some(line_hash(&line));
            checked += 1;
        }

        Ok(checked)
    }

    /// Number of records currently retained.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl LogSink for RollingAuditLog {
    fn append(&mut self, record: &mut VerdictRecord) -> Result<(), AuditError> {
        record.previous_hash = self.lines.back().map(|line| line_hash(line));
        let json = serde_json::to_string(record)?;

        if self.lines.len() < self.retention {
            writeln!(self.writer, "{}", json)?;
            self.writer.flush()?;
            self.lines.push_back(json);
            return Ok(());
        }

        // Full: evict the oldest and rewrite. State only changes once the
        // rewrite has landed.
        let evicted = self.lines.len() + 1 - self.retention;
        let window = self
            .lines
            .iter()
            .skip(evicted)
            .map(String::as_str)
            .chain(std::iter::once(json.as_str()));
        rewrite(&self.path, window)?;
        self.writer = open_append(&self.path)?;
        self.lines.drain(..evicted);
        self.lines.push_back(json);
        Ok(())
    }
}

fn line_hash(line: &str) -> String {
    format!("{:x}", Sha256::digest(line.as_bytes()))
}

fn open_append(path: &Path) -> Result<BufWriter<File>, AuditError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| AuditError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(BufWriter::new(file))
}

fn read_lines(path: &Path) -> Result<VecDeque<String>, AuditError> {
    let file = File::open(path).map_err(|source| AuditError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let mut lines = VecDeque::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if !line.trim().is_empty() {
            lines.push_back(line);
        }
    }
    Ok(lines)
}

/// Replace the file's contents with `lines` via a uniquely named temp file
/// in the same directory, then rename. A failed rewrite leaves the log as it
/// was and removes the temp file.
fn rewrite<'a>(path: &Path, lines: impl IntoIterator<Item = &'a str>) -> Result<(), AuditError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;

    {
        let mut writer = BufWriter::new(&mut tmp);
        for line in lines {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use svp_policy::VerdictStatus;
    use tempfile::tempdir;

    fn record(trace_id: &str) -> VerdictRecord {
        VerdictRecord {
            trace_id: trace_id.to_string(),
            timestamp: Utc::now(),
            domain: "INFRASTRUCTURE".to_string(),
            status: VerdictStatus::Blocked,
            layer: None,
            reason: Some("test".to_string()),
            score: None,
            matched_concept: None,
            degraded: false,
            previous_hash: None,
        }
    }

    fn trace_ids(path: &Path) -> Vec<String> {
        RollingAuditLog::read_all(path)
            .unwrap()
            .into_iter()
            .map(|r| r.trace_id)
            .collect()
    }

    #[test]
    fn append_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        {
            let mut log = RollingAuditLog::open(&path, 10).unwrap();
            log.append(&mut record("t-1")).unwrap();
            log.append(&mut record("t-2")).unwrap();
            assert_eq!(log.len(), 2);
        }

        assert_eq!(trace_ids(&path), vec!["t-1", "t-2"]);
    }

    #[test]
    fn first_record_has_no_previous_hash() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut log = RollingAuditLog::open(&path, 10).unwrap();
        log.append(&mut record("t-1")).unwrap();
        log.append(&mut record("t-2")).unwrap();

        let records = RollingAuditLog::read_all(&path).unwrap();
        assert!(records[0].previous_hash.is_none());
        assert!(records[1].previous_hash.is_some());
    }

    #[test]
    fn hash_chain_is_valid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let mut log = RollingAuditLog::open(&path, 10).unwrap();
            for i in 0..5 {
                log.append(&mut record(&format!("t-{}", i))).unwrap();
            }
        }
        assert_eq!(RollingAuditLog::verify_chain(&path).unwrap(), 5);
    }

    #[test]
    fn retention_evicts_oldest_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let mut log = RollingAuditLog::open(&path, 3).unwrap();
            for i in 0..5 {
                log.append(&mut record(&format!("t-{}", i))).unwrap();
            }
            assert_eq!(log.len(), 3);
        }

        assert_eq!(trace_ids(&path), vec!["t-2", "t-3", "t-4"]);
        // The chain still verifies; the first retained record is the anchor.
        assert_eq!(RollingAuditLog::verify_chain(&path).unwrap(), 3);
    }

    #[test]
    fn eviction_leaves_no_temp_files_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let mut log = RollingAuditLog::open(&path, 2).unwrap();
            for i in 0..6 {
                log.append(&mut record(&format!("t-{}", i))).unwrap();
            }
        }

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("audit.jsonl")]);
    }

    #[test]
    fn reopen_continues_chain_and_window() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let mut log = RollingAuditLog::open(&path, 3).unwrap();
            log.append(&mut record("t-0")).unwrap();
            log.append(&mut record("t-1")).unwrap();
        }
        {
            let mut log = RollingAuditLog::open(&path, 3).unwrap();
            log.append(&mut record("t-2")).unwrap();
            log.append(&mut record("t-3")).unwrap();
        }

        assert_eq!(trace_ids(&path), vec!["t-1", "t-2", "t-3"]);
        assert_eq!(RollingAuditLog::verify_chain(&path).unwrap(), 3);
    }

    #[test]
    fn reopen_with_smaller_retention_trims() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let mut log = RollingAuditLog::open(&path, 10).unwrap();
            for i in 0..6 {
                log.append(&mut record(&format!("t-{}", i))).unwrap();
            }
        }

        let log = RollingAuditLog::open(&path, 2).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(trace_ids(&path), vec!["t-4", "t-5"]);
    }

    #[test]
    fn tampering_breaks_chain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let mut log = RollingAuditLog::open(&path, 10).unwrap();
            for i in 0..3 {
                log.append(&mut record(&format!("t-{}", i))).unwrap();
            }
        }

        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.replacen("t-1", "t-X", 1)).unwrap();

        match RollingAuditLog::verify_chain(&path) {
            Err(AuditError::IntegrityViolation { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected IntegrityViolation, got {:?}", other),
        }
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".svp").join("audit.jsonl");
        let mut log = RollingAuditLog::open(&path, 5).unwrap();
        log.append(&mut record("t-0")).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn zero_retention_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            RollingAuditLog::open(dir.path().join("audit.jsonl"), 0),
            Err(AuditError::InvalidRetention)
        ));
    }
}
