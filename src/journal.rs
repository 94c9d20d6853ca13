//! Trade Journal: append-only JSONL files for SIM and REAL
//! trades, plus the Self-Tuning Controller's decision log.
//!
//! Grounded on `wallet.rs`'s read-whole-file-then-parse idiom and on
//! `ai_auto_optimizer.py`'s loguru `serialize=True` JSONL decision log.

use crate::errors::SniperError;
use crate::types::{RunMode, TradeRecord};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// Append-only JSONL file. One writer at a time; reads are independent and idempotent.
pub struct JsonlFile {
    path: PathBuf,
    writer: Mutex<Option<File>>,
}

impl JsonlFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into(), writer: Mutex::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn writer_handle(&self) -> Result<File, SniperError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| SniperError::system(format!("opening journal {}: {e}", self.path.display())))
    }

    /// Append one record as a single JSON line. Atomic with respect to other
    /// `append` calls on this instance (single internal writer lock); does
    /// not itself guarantee atomicity across process crashes mid-write;
    /// durable exactly-once delivery is out of scope.
    pub async fn append<T: Serialize>(&self, record: &T) -> Result<(), SniperError> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| SniperError::data_shape("journal_write", e.to_string()))?;
        line.push(b'\n');

        let mut guard = self.writer.lock().await;
        if guard.is_none() {
            *guard = Some(self.writer_handle().await?);
        }
        let file = guard.as_mut().expect("just initialized");
        file.write_all(&line)
            .await
            .map_err(|e| SniperError::system(format!("writing journal {}: {e}", self.path.display())))?;
        file.flush().await.map_err(|e| SniperError::system(e.to_string()))
    }

    /// Read every record in the file, from the top, skipping lines that
    /// fail to deserialize.
    /// Idempotent: repeated calls return the same sequence as long as the
    /// file is unchanged.
    pub async fn read_all<T: DeserializeOwned>(&self) -> Result<Vec<T>, SniperError> {
        let file = match File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SniperError::system(e.to_string())),
        };
        let mut lines = BufReader::new(file).lines();
        let mut out = Vec::new();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| SniperError::system(e.to_string()))?
        {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(&line) {
                Ok(record) => out.push(record),
                Err(_) => continue,
            }
        }
        Ok(out)
    }
}

/// Trade Journal: routes each [`TradeRecord`] to `simulation.jsonl` or
/// `real.jsonl` by its `mode` tag.
pub struct Journal {
    simulation: JsonlFile,
    real: JsonlFile,
}

impl Journal {
    pub fn new<P: Into<PathBuf>>(simulation_path: P, real_path: P) -> Self {
        Self { simulation: JsonlFile::new(simulation_path), real: JsonlFile::new(real_path) }
    }

    pub async fn append(&self, record: &TradeRecord) -> Result<(), SniperError> {
        match record.mode {
            RunMode::Sim => self.simulation.append(record).await,
            RunMode::Real => self.real.append(record).await,
        }
    }

    pub async fn read_simulation(&self) -> Result<Vec<TradeRecord>, SniperError> {
        self.simulation.read_all().await
    }

    pub async fn read_real(&self) -> Result<Vec<TradeRecord>, SniperError> {
        self.real.read_all().await
    }
}

/// One structured entry in the Self-Tuning Controller's decision log.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OptimizerDecision {
    pub timestamp: u64,
    pub reason: String,
    pub action: String,
    pub old_params: crate::types::EngineParams,
    pub new_params: crate::types::EngineParams,
}

pub struct DecisionLog {
    file: JsonlFile,
}

impl DecisionLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { file: JsonlFile::new(path) }
    }

    pub async fn append(&self, entry: &OptimizerDecision) -> Result<(), SniperError> {
        self.file.append(entry).await
    }

    pub async fn read_all(&self) -> Result<Vec<OptimizerDecision>, SniperError> {
        self.file.read_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{now_secs, TokenId, TradeKind};
    use solana_sdk::pubkey::Pubkey;
    use tempfile::NamedTempFile;

    fn fixed_token(byte: u8) -> TokenId {
        let mut b = [0u8; 32];
        b.fill(byte);
        TokenId::new(Pubkey::new_from_array(b))
    }

    #[tokio::test]
    async fn write_then_read_all_yields_sequence_ending_with_record() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::remove_file(tmp.path()).ok();
        let journal = Journal::new(tmp.path().to_path_buf(), tmp.path().with_extension("real"));

        let record = TradeRecord {
            kind: TradeKind::Buy,
            token_id: fixed_token(7),
            price: 1.0,
            amount_native: 0.1,
            timestamp: now_secs(),
            mode: RunMode::Sim,
            forced: false,
        };
        journal.append(&record).await.unwrap();

        let all = journal.read_simulation().await.unwrap();
        assert_eq!(all.last().unwrap().token_id, record.token_id);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let tmp = NamedTempFile::new().unwrap();
        tokio::fs::write(tmp.path(), b"not json\n{\"broken\n").await.unwrap();
        let file = JsonlFile::new(tmp.path().to_path_buf());
        let records: Vec<TradeRecord> = file.read_all().await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let file = JsonlFile::new(PathBuf::from("/tmp/this-path-should-not-exist-12345.jsonl"));
        let records: Vec<TradeRecord> = file.read_all().await.unwrap();
        assert!(records.is_empty());
    }
}
