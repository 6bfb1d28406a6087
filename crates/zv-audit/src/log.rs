// log.rs — Append-only JSONL provision log.
//
// One JSON record per line. Each record carries `previous_hash`, the SHA-256
// of the preceding raw line, so inserting, deleting or editing a line breaks
// the chain. `verify_chain` also recomputes every plan hash, which catches an
// edited plan even on the last line.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::ProvisionLogError;
use crate::hasher;
use crate::record::ProvisionRecord;

/// An append-only provision log backed by a JSONL file.
pub struct ProvisionLog {
    writer: BufWriter<File>,
    path: PathBuf,
    /// Hash of the last line written; becomes the next record's `previous_hash`.
    last_hash: Option<String>,
}

impl ProvisionLog {
    /// Open (or create) a log, recovering the chain head from existing lines.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProvisionLogError> {
        let path = path.as_ref().to_path_buf();
        let open_failed = |source| ProvisionLogError::OpenFailed {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(open_failed)?;
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
            .map_err(open_failed)?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            last_hash,
        })
    }

    /// Append a record, linking it to the previous one. Flushes after writing.
    pub fn append(&mut self, record: &mut ProvisionRecord) -> Result<(), ProvisionLogError> {
        record.previous_hash = self.last_hash.clone();
        let json = serde_json::to_string(record)?;
        self.last_hash = Some(hasher::hash_str(&json));

        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;

        tracing::debug!(
            log_id = %record.log_id,
            status = %record.status,
            path = %self.path.display(),
            "provision record appended"
        );
        Ok(())
    }

    /// Read all records, oldest first. A missing log reads as empty.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<ProvisionRecord>, ProvisionLogError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for line in Self::lines(path)? {
            let (_, line) = line?;
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    /// The last `n` records, oldest first.
    pub fn tail(path: impl AsRef<Path>, n: usize) -> Result<Vec<ProvisionRecord>, ProvisionLogError> {
        let mut records = Self::read_all(path)?;
        let skip = records.len().saturating_sub(n);
        Ok(records.split_off(skip))
    }

    /// Check every link and every plan hash. Returns the number of records.
    pub fn verify_chain(path: impl AsRef<Path>) -> Result<usize, ProvisionLogError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(0);
        }
        let mut previous_hash: Option<String> = None;
        let mut count = 0;

        for line in Self::lines(path)? {
            let (line_num, line) = line?;
            let record: ProvisionRecord = serde_json::from_str(&line)?;

            if record.previous_hash != previous_hash {
                return Err(ProvisionLogError::ChainBroken {
                    line: line_num,
                    expected: previous_hash.unwrap_or_else(|| "None".to_string()),
                    actual: record.previous_hash.unwrap_or_else(|| "None".to_string()),
                });
            }
            if !record.plan_matches_hash() {
                return Err(ProvisionLogError::PlanHashMismatch {
                    line: line_num,
                    computed: hasher::hash_json(&record.plan),
                    recorded: record.plan_hash,
                });
            }

            // Hash the raw line, not a re-serialization.
            previous_hash = Some(hasher::hash_str(&line));
            count += 1;
        }
        Ok(count)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-blank lines with their 1-based line numbers.
    fn lines(
        path: &Path,
    ) -> Result<impl Iterator<Item = Result<(usize, String), ProvisionLogError>>, ProvisionLogError>
    {
        let file = File::open(path).map_err(|source| ProvisionLogError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(BufReader::new(file)
            .lines()
            .enumerate()
            .filter_map(|(i, line)| match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(Ok((i + 1, line))),
                Err(e) => Some(Err(e.into())),
            }))
    }

    fn read_last_hash(path: &Path) -> Result<Option<String>, ProvisionLogError> {
        let mut last_line = None;
        for line in Self::lines(path)? {
            last_line = Some(line?.1);
        }
        Ok(last_line.map(|line| hasher::hash_str(&line)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ProvisionStatus;
    use tempfile::tempdir;

    fn record(summary: &str) -> ProvisionRecord {
        ProvisionRecord::new(
            summary,
            serde_json::json!({"summary": summary}),
            ProvisionStatus::Success,
        )
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".zv/provision.jsonl");
        {
            let mut log = ProvisionLog::open(&path).unwrap();
            log.append(&mut record("first")).unwrap();
            log.append(&mut record("second")).unwrap();
        }
        let records = ProvisionLog::read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].summary, "first");
        assert!(records[0].previous_hash.is_none());
        assert!(records[1].previous_hash.is_some());
    }

    #[test]
    fn reopen_continues_chain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("provision.jsonl");
        for i in 0..3 {
            let mut log = ProvisionLog::open(&path).unwrap();
            log.append(&mut record(&format!("run {i}"))).unwrap();
        }
        assert_eq!(ProvisionLog::verify_chain(&path).unwrap(), 3);
    }

    #[test]
    fn deleted_line_breaks_chain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("provision.jsonl");
        {
            let mut log = ProvisionLog::open(&path).unwrap();
            for i in 0..3 {
                log.append(&mut record(&format!("run {i}"))).unwrap();
            }
        }
        let content = std::fs::read_to_string(&path).unwrap();
        let kept: Vec<&str> = content.lines().enumerate().filter(|(i, _)| *i != 1).map(|(_, l)| l).collect();
        std::fs::write(&path, kept.join("\n") + "\n").unwrap();

        match ProvisionLog::verify_chain(&path).unwrap_err() {
            ProvisionLogError::ChainBroken { line, .. } => assert_eq!(line, 2),
            other => panic!("expected ChainBroken, got {:?}", other),
        }
    }

    #[test]
    fn edited_plan_on_last_line_is_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("provision.jsonl");
        {
            let mut log = ProvisionLog::open(&path).unwrap();
            log.append(&mut record("only")).unwrap();
        }
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, content.replace("\"summary\":\"only\"}", "\"summary\":\"edited\"}"))
            .unwrap();
        assert!(matches!(
            ProvisionLog::verify_chain(&path),
            Err(ProvisionLogError::PlanHashMismatch { line: 1, .. })
        ));
    }

    #[test]
    fn tail_returns_newest_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("provision.jsonl");
        {
            let mut log = ProvisionLog::open(&path).unwrap();
            for i in 0..5 {
                log.append(&mut record(&format!("run {i}"))).unwrap();
            }
        }
        let tail = ProvisionLog::tail(&path, 2).unwrap();
        assert_eq!(
            tail.iter().map(|r| r.summary.as_str()).collect::<Vec<_>>(),
            ["run 3", "run 4"]
        );
        assert_eq!(ProvisionLog::tail(&path, 10).unwrap().len(), 5);
    }

    #[test]
    fn missing_log_is_empty_and_valid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.jsonl");
        assert!(ProvisionLog::read_all(&path).unwrap().is_empty());
        assert_eq!(ProvisionLog::verify_chain(&path).unwrap(), 0);
    }
}
