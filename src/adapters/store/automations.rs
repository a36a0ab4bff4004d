//! Automation activations (`automations.json`) and activity log (`activity.jsonl`)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::file::{self, FileError};
use crate::domain::playbook::{ActivityEntry, Automation};
use crate::ports::storage::{AutomationStore, AutomationStoreError};

impl From<FileError> for AutomationStoreError {
    fn from(e: FileError) -> Self {
        match e {
            FileError::Io(e) => AutomationStoreError::Io(e.to_string()),
            FileError::Serde(e) => AutomationStoreError::Serialization(e.to_string()),
        }
    }
}

pub struct FileAutomationStore {
    automations_path: PathBuf,
    activity_path: PathBuf,
    lock: Mutex<()>,
}

impl FileAutomationStore {
    pub fn open(data_dir: &Path) -> Self {
        Self {
            automations_path: data_dir.join("automations.json"),
            activity_path: data_dir.join("activity.jsonl"),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Vec<Automation>, AutomationStoreError> {
        Ok(file::read_json(&self.automations_path).await?)
    }
}

#[async_trait]
impl AutomationStore for FileAutomationStore {
    async fn get(&self, user_id: &str, playbook_id: &str) -> Result<Option<Automation>, AutomationStoreError> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|a| a.user_id == user_id && a.playbook_id == playbook_id))
    }

    async fn upsert(&self, automation: &Automation) -> Result<(), AutomationStoreError> {
        let _guard = self.lock.lock().await;
        let mut all = self.load().await?;
        match all
            .iter_mut()
            .find(|a| a.user_id == automation.user_id && a.playbook_id == automation.playbook_id)
        {
            Some(existing) => *existing = automation.clone(),
            None => all.push(automation.clone()),
        }
        file::write_json(&self.automations_path, &all).await?;
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Automation>, AutomationStoreError> {
        Ok(self.load().await?.into_iter().filter(|a| a.user_id == user_id).collect())
    }

    async fn record_execution(
        &self,
        user_id: &str,
        playbook_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AutomationStoreError> {
        let _guard = self.lock.lock().await;
        let mut all = self.load().await?;
        let Some(automation) = all
            .iter_mut()
            .find(|a| a.user_id == user_id && a.playbook_id == playbook_id)
        else {
            return Ok(false);
        };
        automation.record_execution(at);
        file::write_json(&self.automations_path, &all).await?;
        Ok(true)
    }

    async fn log_activity(&self, entry: &ActivityEntry) -> Result<(), AutomationStoreError> {
        let _guard = self.lock.lock().await;
        file::append_line(&self.activity_path, entry).await?;
        Ok(())
    }

    async fn activity(&self, user_id: &str, limit: usize) -> Result<Vec<ActivityEntry>, AutomationStoreError> {
        let entries: Vec<ActivityEntry> = file::read_lines(&self.activity_path).await?;
        Ok(entries
            .into_iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::playbook::{find_playbook, ActivityType, STOP_LOSS_GUARD};
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upsert_and_record_execution() {
        let dir = TempDir::new().unwrap();
        let store = FileAutomationStore::open(dir.path());
        let playbook = find_playbook(STOP_LOSS_GUARD).unwrap();

        assert!(!store.record_execution("u1", STOP_LOSS_GUARD, Utc::now()).await.unwrap());

        store.upsert(&Automation::activate("u1", &playbook, &json!({}))).await.unwrap();
        assert!(store.record_execution("u1", STOP_LOSS_GUARD, Utc::now()).await.unwrap());

        let reopened = FileAutomationStore::open(dir.path());
        let a = reopened.get("u1", STOP_LOSS_GUARD).await.unwrap().unwrap();
        assert_eq!(a.total_executions, 1);
        assert!(a.last_triggered.is_some());
        assert_eq!(reopened.list("u1").await.unwrap().len(), 1);
        assert!(reopened.list("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_activity_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = FileAutomationStore::open(dir.path());
        for title in ["first", "second", "third"] {
            store
                .log_activity(&ActivityEntry::new("u1", ActivityType::Trade, title, ""))
                .await
                .unwrap();
        }
        store
            .log_activity(&ActivityEntry::new("u2", ActivityType::Trade, "other", ""))
            .await
            .unwrap();

        let recent = store.activity("u1", 2).await.unwrap();
        let titles: Vec<_> = recent.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["third", "second"]);
    }
}
