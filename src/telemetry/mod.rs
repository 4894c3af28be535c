//! # Telemetry Module
//!
//! Journal of channel status snapshots as JSON lines.
//!
//! Each record is one line:
//!
//! ```text
//! {"timestamp":"2024-05-04T18:22:10.412+02:00","channel":3,"name":"Kitchen","position":42.0,...}
//! ```
//!
//! A new file is started every `max_records_per_file` records and only the
//! newest `max_files_to_keep` files are retained.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::shutter::ChannelStatus;

const FILE_PREFIX: &str = "status_";
const FILE_SUFFIX: &str = ".jsonl";

#[derive(Debug, Serialize)]
struct JournalRecord<'a> {
    timestamp: String,
    #[serde(flatten)]
    status: &'a ChannelStatus,
}

/// Rotating JSON-lines writer
#[derive(Debug)]
pub struct StatusJournal {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    files: VecDeque<PathBuf>,
    sequence: u32,
}

impl StatusJournal {
    /// Open the journal directory, creating it if needed
    ///
    /// Journal files left by earlier runs count towards `max_files_to_keep`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created or listed.
    pub fn open(config: &TelemetryConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.log_dir);
        fs::create_dir_all(&dir)?;

        let mut existing: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_journal_file(path))
            .collect();
        existing.sort();

        info!("Status journal at {}", dir.display());

        Ok(Self {
            dir,
            max_records_per_file: config.max_records_per_file.max(1),
            max_files_to_keep: config.max_files_to_keep.max(1),
            writer: None,
            records_in_file: 0,
            files: existing.into(),
            sequence: 0,
        })
    }

    /// Append one status snapshot
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written.
    pub fn record(&mut self, status: &ChannelStatus) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let record = JournalRecord {
            timestamp: Local::now().to_rfc3339(),
            status,
        };
        let line = serde_json::to_string(&record)?;

        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
            writer.flush()?;
        }
        self.records_in_file += 1;
        Ok(())
    }

    /// Journal files currently on disk, oldest first
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path)
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        self.sequence = self.sequence.wrapping_add(1);
        let name = format!(
            "{}{}_{:04}{}",
            FILE_PREFIX,
            Local::now().format("%Y%m%d_%H%M%S"),
            self.sequence,
            FILE_SUFFIX
        );
        let path = self.dir.join(name);

        let file = File::create(&path)?;
        debug!("Started journal file {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;
        self.files.push_back(path);
        self.prune();
        Ok(())
    }

    fn prune(&mut self) {
        while self.files.len() > self.max_files_to_keep {
            if let Some(oldest) = self.files.pop_front() {
                if let Err(e) = fs::remove_file(&oldest) {
                    warn!("Failed to remove old journal {}: {}", oldest.display(), e);
                }
            }
        }
    }
}

fn is_journal_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX))
}
