//! JSON-file position store
//!
//! Positions live in `<data_dir>/positions.json`. Every mutation is a
//! read-modify-write under one async mutex, so the OPEN -> CLOSED transition
//! is applied exactly once even with concurrent closers.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::file::{self, FileError};
use crate::domain::position::{Position, PositionError, PositionExit};
use crate::ports::storage::{PositionStore, PositionStoreError};

impl From<FileError> for PositionStoreError {
    fn from(e: FileError) -> Self {
        match e {
            FileError::Io(e) => PositionStoreError::Io(e.to_string()),
            FileError::Serde(e) => PositionStoreError::Serialization(e.to_string()),
        }
    }
}

pub struct JsonPositionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonPositionStore {
    pub fn open(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("positions.json"),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Vec<Position>, PositionStoreError> {
        Ok(file::read_json(&self.path).await?)
    }
}

#[async_trait]
impl PositionStore for JsonPositionStore {
    async fn insert(&self, position: &Position) -> Result<(), PositionStoreError> {
        let _guard = self.lock.lock().await;
        let mut all = self.load().await?;
        all.push(position.clone());
        file::write_json(&self.path, &all).await?;
        tracing::debug!("Stored position {} for {}", position.id, position.token.symbol);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Position>, PositionStoreError> {
        Ok(self.load().await?.into_iter().find(|p| p.id == id))
    }

    async fn open_positions(&self, wallet: Option<&str>) -> Result<Vec<Position>, PositionStoreError> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|p| p.is_open() && wallet.map_or(true, |w| p.wallet == w))
            .collect())
    }

    async fn latest_open(&self, wallet: &str, mint: &str) -> Result<Option<Position>, PositionStoreError> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|p| p.is_open() && p.wallet == wallet && p.token.mint == mint)
            .max_by_key(|p| p.opened_at))
    }

    async fn close(&self, id: &str, exit: PositionExit) -> Result<Position, PositionStoreError> {
        let _guard = self.lock.lock().await;
        let mut all = self.load().await?;
        let position = all
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| PositionStoreError::NotFound(id.to_string()))?;

        position.close(exit).map_err(|e| match e {
            PositionError::AlreadyClosed => PositionStoreError::AlreadyClosed(id.to_string()),
            other => PositionStoreError::Serialization(other.to_string()),
        })?;
        let closed = position.clone();

        file::write_json(&self.path, &all).await?;
        Ok(closed)
    }

    async fn for_wallet(&self, wallet: &str) -> Result<Vec<Position>, PositionStoreError> {
        Ok(self.load().await?.into_iter().filter(|p| p.wallet == wallet).collect())
    }
}
