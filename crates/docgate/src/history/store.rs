//! JSON-lines history log for processed documents

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result};

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 500;

/// Where a document entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeSource {
    Upload,
    Folder,
    Automation,
}

/// One processed-document outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub job_id: String,
    pub client: String,
    pub filename: String,
    pub source: IntakeSource,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn success(
        job_id: String,
        client: String,
        filename: String,
        source: IntakeSource,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            client,
            filename,
            source,
            success: true,
            exit_code: Some(0),
            timed_out: false,
            duration_ms,
            error: None,
            created_at: Utc::now(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn failure(
        job_id: String,
        client: String,
        filename: String,
        source: IntakeSource,
        exit_code: Option<i32>,
        timed_out: bool,
        duration_ms: u64,
        error: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            client,
            filename,
            source,
            success: false,
            exit_code,
            timed_out,
            duration_ms,
            error: Some(error),
            created_at: Utc::now(),
        }
    }
}

/// Filter and pagination for history queries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryFilter {
    pub client: Option<String>,
    /// Inclusive lower bound on `created_at`, RFC 3339.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`, RFC 3339.
    pub to: Option<DateTime<Utc>>,
    /// 1-based page number.
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub records: Vec<HistoryRecord>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Append-only JSON-lines history log.
///
/// One serialized record per line; corrupt lines are skipped on read so a
/// partial write can never take the whole history down.
pub struct HistoryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn append(&self, record: &HistoryRecord) -> Result<()> {
        let line = serde_json::to_string(record).map_err(|e| Error::History(e.to_string()))?;
        let _guard = self.lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    fn read_all_locked(&self) -> Result<Vec<HistoryRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)?;
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("skipping corrupt history line: {}", e),
            }
        }
        Ok(records)
    }

    /// Newest-first page of records matching the filter.
    pub fn query(&self, filter: &HistoryFilter) -> Result<HistoryPage> {
        let mut records = {
            let _guard = self.lock.lock();
            self.read_all_locked()?
        };
        records.retain(|r| {
            filter.client.as_deref().map_or(true, |c| r.client == c)
                && filter.from.map_or(true, |from| r.created_at >= from)
                && filter.to.map_or(true, |to| r.created_at <= to)
        });
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = records.len();
        let page_size = filter
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let page = filter.page.unwrap_or(1).max(1);
        let records = records
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        Ok(HistoryPage {
            records,
            total,
            page,
            page_size,
        })
    }

    /// Totals for the retained window.
    pub fn stats(&self) -> Result<HistoryStats> {
        let records = {
            let _guard = self.lock.lock();
            self.read_all_locked()?
        };
        let total = records.len();
        let succeeded = records.iter().filter(|r| r.success).count();
        Ok(HistoryStats {
            total,
            succeeded,
            failed: total - succeeded,
        })
    }

    /// Drop records older than `retention_days` via an atomic rewrite.
    /// Returns how many records were removed.
    pub fn prune(&self, retention_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let _guard = self.lock.lock();
        let records = self.read_all_locked()?;
        let kept: Vec<&HistoryRecord> =
            records.iter().filter(|r| r.created_at >= cutoff).collect();
        let removed = records.len() - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut file = File::create(&tmp)?;
            for record in &kept {
                let line =
                    serde_json::to_string(record).map_err(|e| Error::History(e.to_string()))?;
                writeln!(file, "{}", line)?;
            }
        }
        fs::rename(&tmp, &self.path)?;
        Ok(removed)
    }
}

/// History totals
#[derive(Debug, Clone, Serialize)]
pub struct HistoryStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}
