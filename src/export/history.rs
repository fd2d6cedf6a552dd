use crate::counting::CountSample;
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const SINK: &str = "history";
const FILE_EXTENSION: &str = "jsonl";

/// Append-only count history
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, sample: &CountSample) -> Result<()>;

    /// Rows with `start <= timestamp < end`, sorted by timestamp. Either bound
    /// may be open.
    async fn query(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<CountSample>>;

    /// Drop rows recorded before `cutoff`; returns how many partitions went
    async fn prune_before(&self, _cutoff: NaiveDate) -> Result<usize> {
        Ok(0)
    }
}

struct DayWriter {
    day: NaiveDate,
    path: PathBuf,
    file: BufWriter<File>,
    last_sync: Instant,
    // Set while a line is being written; a line left unterminated by a
    // cancelled or failed write gets closed off before the next one
    dirty: bool,
}

impl DayWriter {
    async fn open(dir: &Path, day: NaiveDate) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = partition_path(dir, day);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await?;

        let len = file.metadata().await?.len();
        let mut dirty = false;
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(std::io::SeekFrom::Start(len - 1)).await?;
            file.read_exact(&mut last).await?;
            dirty = last[0] != b'\n';
        }

        debug!("Opened history partition {}", path.display());
        Ok(Self {
            day,
            path,
            file: BufWriter::new(file),
            last_sync: Instant::now(),
            dirty,
        })
    }

    async fn append_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        if self.dirty {
            warn!("Terminating torn line in {}", self.path.display());
            self.file.write_all(b"\n").await?;
        }
        self.dirty = true;
        self.file.write_all(line).await?;
        self.file.flush().await?;
        self.dirty = false;

        // Sync to disk every 1 second for crash safety
        if self.last_sync.elapsed() >= Duration::from_secs(1) {
            self.sync().await?;
        }
        Ok(())
    }

    async fn sync(&mut self) -> std::io::Result<()> {
        self.file.flush().await?;
        self.file.get_ref().sync_data().await?;
        self.last_sync = Instant::now();
        Ok(())
    }
}

/// History as one JSON object per line, one file per UTC day
/// (`YYYY-MM-DD.jsonl`).
pub struct JsonlHistoryStore {
    dir: PathBuf,
    writer: Mutex<Option<DayWriter>>,
}

impl JsonlHistoryStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            writer: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Flush and sync the open partition
    pub async fn sync(&self) -> Result<()> {
        if let Some(writer) = self.writer.lock().await.as_mut() {
            writer
                .sync()
                .await
                .map_err(|e| StorageError::write(SINK, e))?;
        }
        Ok(())
    }

    /// Partition days present on disk, ascending
    pub async fn partitions(&self) -> Result<Vec<NaiveDate>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::read(SINK, e).into()),
        };

        let mut days = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::read(SINK, e))?
        {
            if let Some(day) = partition_day(&entry.path()) {
                days.push(day);
            }
        }
        days.sort();
        Ok(days)
    }

    async fn read_partition(&self, day: NaiveDate) -> Result<Vec<CountSample>> {
        let path = partition_path(&self.dir, day);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::read(SINK, e).into()),
        };

        let text = String::from_utf8_lossy(&bytes);
        let mut rows = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<CountSample>(line) {
                Ok(row) => rows.push(row),
                Err(e) => warn!(
                    "Skipping malformed history row {}:{}: {}",
                    path.display(),
                    index + 1,
                    e
                ),
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl HistoryStore for JsonlHistoryStore {
    async fn append(&self, sample: &CountSample) -> Result<()> {
        let day = sample.timestamp.date_naive();
        let mut line = serde_json::to_vec(sample)?;
        line.push(b'\n');

        let mut guard = self.writer.lock().await;
        if guard.as_ref().map(|w| w.day) != Some(day) {
            if let Some(mut previous) = guard.take() {
                if let Err(e) = previous.sync().await {
                    warn!("Failed to sync history partition {}: {}", previous.path.display(), e);
                }
            }
            let writer = DayWriter::open(&self.dir, day)
                .await
                .map_err(|e| StorageError::write(SINK, e))?;
            *guard = Some(writer);
        }

        let Some(writer) = guard.as_mut() else {
            return Err(StorageError::write(SINK, "no open partition").into());
        };
        writer
            .append_line(&line)
            .await
            .map_err(|e| StorageError::write(SINK, e))?;
        Ok(())
    }

    async fn query(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<CountSample>> {
        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                return Ok(Vec::new());
            }
        }

        let first_day = start.map(|s| s.date_naive());
        let last_day = end.map(|e| e.date_naive());

        let mut rows = Vec::new();
        for day in self.partitions().await? {
            if first_day.is_some_and(|first| day < first) || last_day.is_some_and(|last| day > last)
            {
                continue;
            }
            rows.extend(self.read_partition(day).await?.into_iter().filter(|row| {
                start.map_or(true, |s| row.timestamp >= s) && end.map_or(true, |e| row.timestamp < e)
            }));
        }

        rows.sort_by_key(|row| row.timestamp);
        debug!("History query returned {} rows", rows.len());
        Ok(rows)
    }

    async fn prune_before(&self, cutoff: NaiveDate) -> Result<usize> {
        {
            let mut guard = self.writer.lock().await;
            if guard.as_ref().is_some_and(|w| w.day < cutoff) {
                *guard = None;
            }
        }

        let mut removed = 0;
        for day in self.partitions().await? {
            if day >= cutoff {
                break;
            }
            let path = partition_path(&self.dir, day);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::write(SINK, e).into()),
            }
        }

        if removed > 0 {
            info!("Pruned {} history partitions before {}", removed, cutoff);
        }
        Ok(removed)
    }
}

fn partition_path(dir: &Path, day: NaiveDate) -> PathBuf {
    dir.join(format!("{}.{}", day.format("%Y-%m-%d"), FILE_EXTENSION))
}

fn partition_day(path: &Path) -> Option<NaiveDate> {
    if path.extension()?.to_str()? != FILE_EXTENSION {
        return None;
    }
    NaiveDate::parse_from_str(path.file_stem()?.to_str()?, "%Y-%m-%d").ok()
}
