use chrono::Utc;
use std::path::Path;

use crate::collection::Collection;
use crate::config::Settings;
use crate::error::{Result, StashError};
use crate::naming::validate_collection_name;
use crate::record::{
    CollectionInfo, Metadata, normalize_metadata, space_from_metadata, validate_metadata,
};
use crate::store::{self, Store};

/// Client bound to a local storage directory.
#[derive(Clone)]
pub struct PersistentClient {
    settings: Settings,
    store: Store,
}

impl PersistentClient {
    /// Opens (or creates) the store at `path` with default settings.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_settings(Settings::new(path.as_ref())).await
    }

    pub async fn with_settings(settings: Settings) -> Result<Self> {
        std::fs::create_dir_all(&settings.path)?;
        let db_file = settings.db_file();
        let store = Store::open(&db_file)?;
        tracing::info!("Opened store at {}", db_file.display());
        Ok(Self { settings, store })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Nanoseconds since the Unix epoch, after a round trip to the database.
    pub async fn heartbeat(&self) -> Result<i64> {
        let conn = self.store.lock().await;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX))
    }

    /// All collections in creation order.
    pub async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let conn = self.store.lock().await;
        store::list_collections(&conn)
    }

    pub async fn count_collections(&self) -> Result<usize> {
        let conn = self.store.lock().await;
        store::count_collections(&conn)
    }

    pub async fn create_collection(
        &self,
        name: &str,
        metadata: Option<Metadata>,
    ) -> Result<Collection> {
        validate_collection_name(name)?;
        let metadata = normalize_metadata(metadata);
        validate_metadata(metadata.as_ref(), &format!("collection {}", name))?;
        space_from_metadata(metadata.as_ref())?;

        let mut conn = self.store.lock().await;
        let tx = conn.transaction()?;
        if store::collection_by_name(&tx, name)?.is_some() {
            return Err(StashError::CollectionExists(name.to_string()));
        }
        let info = CollectionInfo {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            metadata,
            dimension: None,
            created_at: Utc::now(),
        };
        store::insert_collection(&tx, &info)?;
        tx.commit()?;
        tracing::info!("Created collection {} ({})", info.name, info.id);
        Ok(Collection::new(self.store.clone(), info))
    }

    pub async fn get_collection(&self, name: &str) -> Result<Collection> {
        let conn = self.store.lock().await;
        let info = store::collection_by_name(&conn, name)?
            .ok_or_else(|| StashError::CollectionNotFound(name.to_string()))?;
        Ok(Collection::new(self.store.clone(), info))
    }

    /// Returns the existing collection untouched, or creates it with `metadata`.
    pub async fn get_or_create_collection(
        &self,
        name: &str,
        metadata: Option<Metadata>,
    ) -> Result<Collection> {
        match self.get_collection(name).await {
            Err(StashError::CollectionNotFound(_)) => {
                match self.create_collection(name, metadata).await {
                    // Lost a race with another handle creating the same name
                    Err(StashError::CollectionExists(_)) => self.get_collection(name).await,
                    other => other,
                }
            }
            other => other,
        }
    }

    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut conn = self.store.lock().await;
        let tx = conn.transaction()?;
        let info = store::collection_by_name(&tx, name)?
            .ok_or_else(|| StashError::CollectionNotFound(name.to_string()))?;
        store::delete_collection(&tx, &info.id)?;
        tx.commit()?;
        tracing::info!("Deleted collection {} ({})", info.name, info.id);
        Ok(())
    }

    /// Drops every collection. Only allowed when `Settings::allow_reset` is set.
    pub async fn reset(&self) -> Result<()> {
        if !self.settings.allow_reset {
            return Err(StashError::ResetDisabled);
        }
        let mut conn = self.store.lock().await;
        let tx = conn.transaction()?;
        store::delete_all(&tx)?;
        tx.commit()?;
        tracing::warn!("Reset store at {}", self.settings.path.display());
        Ok(())
    }
}
