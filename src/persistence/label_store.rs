use std::collections::HashMap;
use std::path::PathBuf;

use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{get_home_dir, CONFIG_DIR};

const LABELS_FILE: &str = "labels.toml";

// TOML keys must be strings, so pad indexes are stored stringified.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
struct LabelTable {
    labels: HashMap<String, String>,
}

/// User-assigned pad names, keyed by pad index and persisted across runs.
#[derive(Debug)]
pub struct LabelStore {
    path: PathBuf,
    table: RwLock<LabelTable>,
}

impl LabelStore {
    pub async fn load() -> Result<Self> {
        let mut path = get_home_dir();
        path.push(CONFIG_DIR);
        path.push(LABELS_FILE);
        Self::open(path).await
    }

    /// Opens a store backed by the given file, starting empty when missing.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let table = if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| eyre!("Failed to check if labels file exists: {}", e))?
        {
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| eyre!("Failed to read labels file: {}", e))?;
            toml::from_str(&content).map_err(|e| eyre!("Failed to parse labels file: {}", e))?
        } else {
            debug!(
                "Labels file {} does not exist, starting empty",
                path.display()
            );
            LabelTable::default()
        };

        Ok(Self {
            path,
            table: RwLock::new(table),
        })
    }

    pub async fn label_for(&self, index: usize) -> Option<String> {
        self.table.read().await.labels.get(&index.to_string()).cloned()
    }

    /// Stores the label and persists the table immediately.
    pub async fn set_label(&self, index: usize, label: &str) -> Result<()> {
        {
            let mut table = self.table.write().await;
            table.labels.insert(index.to_string(), label.to_string());
        }
        self.save().await?;
        info!("Label for pad {} saved", index);
        Ok(())
    }

    async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create labels directory: {}", e))?;
        }

        let content = {
            let table = self.table.read().await;
            toml::to_string_pretty(&*table)
                .map_err(|e| eyre!("Failed to serialize labels: {}", e))?
        };
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| eyre!("Failed to write labels file: {}", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_yields_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = LabelStore::open(dir.path().join("labels.toml")).await.unwrap();
        assert_eq!(store.label_for(0).await, None);
    }

    #[tokio::test]
    async fn labels_round_trip_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.toml");

        let store = LabelStore::open(path.clone()).await.unwrap();
        store.set_label(0, "left couch pad").await.unwrap();
        store.set_label(3, "tournament stick").await.unwrap();

        let reopened = LabelStore::open(path).await.unwrap();
        assert_eq!(
            reopened.label_for(0).await.as_deref(),
            Some("left couch pad")
        );
        assert_eq!(
            reopened.label_for(3).await.as_deref(),
            Some("tournament stick")
        );
        assert_eq!(reopened.label_for(1).await, None);
    }

    #[tokio::test]
    async fn relabeling_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = LabelStore::open(dir.path().join("labels.toml")).await.unwrap();

        store.set_label(2, "old").await.unwrap();
        store.set_label(2, "new").await.unwrap();
        assert_eq!(store.label_for(2).await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.toml");
        tokio::fs::write(&path, "labels = 3").await.unwrap();

        assert!(LabelStore::open(path).await.is_err());
    }
}
