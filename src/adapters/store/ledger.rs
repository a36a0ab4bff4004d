//! Append-only JSON-lines trade ledger

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::file::{self, FileError};
use crate::domain::trade::TradeRecord;
use crate::ports::storage::{HistoryQuery, LedgerError, TradeLedger};

impl From<FileError> for LedgerError {
    fn from(e: FileError) -> Self {
        match e {
            FileError::Io(e) => LedgerError::Io(e.to_string()),
            FileError::Serde(e) => LedgerError::Serialization(e.to_string()),
        }
    }
}

pub struct JsonlTradeLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlTradeLedger {
    /// Ledger at `<data_dir>/trades.jsonl`
    pub fn open(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("trades.jsonl"),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl TradeLedger for JsonlTradeLedger {
    async fn append(&self, record: &TradeRecord) -> Result<(), LedgerError> {
        let _guard = self.write_lock.lock().await;
        file::append_line(&self.path, record).await?;
        tracing::debug!("Ledger: {}", record);
        Ok(())
    }

    async fn history(&self, query: &HistoryQuery) -> Result<Vec<TradeRecord>, LedgerError> {
        let records: Vec<TradeRecord> = file::read_lines(&self.path).await?;
        let mut out: Vec<TradeRecord> = records.into_iter().filter(|r| query.matches(r)).collect();
        // stable sort keeps append order for equal timestamps, then reverse for newest first
        out.sort_by_key(|r| r.created_at);
        out.reverse();
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::token::TokenIdentity;
    use crate::domain::trade::{ExecutionStatus, TradeSide};
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn record(wallet: &str, minutes_ago: i64) -> TradeRecord {
        let mut r = TradeRecord::new(wallet, TokenIdentity::unknown("M1"), TradeSide::Buy, ExecutionStatus::Success);
        r.created_at = Utc::now() - Duration::minutes(minutes_ago);
        r
    }

    #[tokio::test]
    async fn test_history_newest_first_and_filtered() {
        let dir = TempDir::new().unwrap();
        let ledger = JsonlTradeLedger::open(dir.path());

        let old = record("W1", 30);
        let new = record("W1", 1);
        ledger.append(&old).await.unwrap();
        ledger.append(&record("W2", 5)).await.unwrap();
        ledger.append(&new).await.unwrap();

        let history = ledger.history(&HistoryQuery::wallet("W1")).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, new.id);
        assert_eq!(history[1].id, old.id);

        let limited = ledger.history(&HistoryQuery::wallet("W1").with_limit(1)).await.unwrap();
        assert_eq!(limited.len(), 1);

        let since = HistoryQuery {
            since: Some(Utc::now() - Duration::minutes(10)),
            ..HistoryQuery::wallet("W1")
        };
        assert_eq!(ledger.history(&since).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_survives_reopen_and_torn_line() {
        let dir = TempDir::new().unwrap();
        let r = record("W1", 0);
        JsonlTradeLedger::open(dir.path()).append(&r).await.unwrap();

        let path = dir.path().join("trades.jsonl");
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{\"id\":\"trunc");
        std::fs::write(&path, raw).unwrap();

        let reopened = JsonlTradeLedger::open(dir.path());
        let history = reopened.history(&HistoryQuery::wallet("W1")).await.unwrap();
        assert_eq!(history, vec![r]);
    }

    #[tokio::test]
    async fn test_empty_ledger() {
        let dir = TempDir::new().unwrap();
        let ledger = JsonlTradeLedger::open(dir.path());
        assert!(ledger.history(&HistoryQuery::wallet("W1")).await.unwrap().is_empty());
    }
}
