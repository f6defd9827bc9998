// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 LabelBerry Authors

//! Durable queue journal: write-tmp-then-rename JSON file under
//! `/var/lib/labelberry/queue.json` (spec §6), so a crash between the
//! write and the rename never leaves a half-written journal on disk.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::QueueEntry;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Journal {
    pub entries: Vec<QueueEntry>,
    pub next_seq: u64,
}

/// Load the journal from `path`. A missing file means a fresh device with
/// nothing queued yet, not an error.
pub fn load(path: &Path) -> Result<Journal, crate::error::QueueError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Journal::default()),
        Err(e) => Err(e.into()),
    }
}

/// Persist the journal atomically: write to `path.tmp`, then rename over
/// `path` (mirrors the teacher's credential-persistence pattern).
pub fn save(path: &Path, journal: &Journal) -> Result<(), crate::error::QueueError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(journal)?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use labelberry_common::{JobSource, JobState, Payload, Priority};
    use uuid::Uuid;

    use super::*;

    fn sample_entry() -> QueueEntry {
        QueueEntry {
            job_id: Uuid::new_v4(),
            payload: Payload::Inline { zpl: "^XA^XZ".into() },
            priority: Priority::default(),
            source: JobSource::Direct,
            created_at: chrono::Utc::now(),
            state: JobState::Queued,
            attempt: 0,
            last_error: None,
            crash_recovery_pending: false,
            next_attempt_at: None,
            seq: 1,
        }
    }

    #[test]
    fn roundtrips_through_disk() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("queue.json");

        let mut journal = Journal::default();
        journal.entries.push(sample_entry());
        journal.next_seq = 2;
        save(&path, &journal)?;

        let loaded = load(&path)?;
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.next_seq, 2);
        Ok(())
    }

    #[test]
    fn missing_file_loads_empty_journal() -> anyhow::Result<()> {
        let journal = load(Path::new("/nonexistent/labelberry/queue.json"))?;
        assert!(journal.entries.is_empty());
        Ok(())
    }

    #[test]
    fn no_leftover_tmp_file_after_save() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("queue.json");
        save(&path, &Journal::default())?;
        assert!(!path.with_extension("tmp").exists());
        Ok(())
    }
}
