use rusqlite::Connection;
use std::collections::HashSet;

use crate::distance::Space;
use crate::error::{Result, StashError};
use crate::naming::validate_collection_name;
use crate::record::{
    CollectionInfo, GetRequest, GetResult, Include, Metadata, PEEK_INCLUDE, QueryResult, Record,
    metadata_matches, normalize_metadata, space_from_metadata, validate_metadata,
};
use crate::store::{self, Store};

pub const DEFAULT_PEEK_LIMIT: usize = 10;
pub const DEFAULT_N_RESULTS: usize = 10;

/// Handle to one named collection. Cheap to clone; every call re-reads the
/// collection row so a handle to a deleted collection fails cleanly.
#[derive(Clone)]
pub struct Collection {
    store: Store,
    info: CollectionInfo,
}

#[derive(Clone, Copy)]
enum WriteMode {
    Add,
    Upsert,
    Update,
}

impl Collection {
    pub(crate) fn new(store: Store, info: CollectionInfo) -> Self {
        Self { store, info }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Metadata as of the last `refresh`, `modify` or lookup of this handle.
    pub fn metadata(&self) -> Option<&Metadata> {
        self.info.metadata.as_ref()
    }

    /// Snapshot taken when the handle was obtained; see [`Collection::refresh`].
    pub fn info(&self) -> &CollectionInfo {
        &self.info
    }

    /// Distance space from the cached metadata.
    pub fn space(&self) -> Result<Space> {
        self.info.space()
    }

    /// Re-reads name, metadata and dimension, picking up `modify` calls made
    /// through other handles.
    pub async fn refresh(&mut self) -> Result<()> {
        let conn = self.store.lock().await;
        let info = self.live(&conn)?;
        drop(conn);
        self.info = info;
        Ok(())
    }

    fn live(&self, conn: &Connection) -> Result<CollectionInfo> {
        store::collection_by_id(conn, &self.info.id)?
            .ok_or_else(|| StashError::CollectionNotFound(self.info.name.clone()))
    }

    pub async fn count(&self) -> Result<usize> {
        let conn = self.store.lock().await;
        let info = self.live(&conn)?;
        store::count_records(&conn, &info.id)
    }

    /// First `limit` records in insertion order, with embeddings, documents and metadatas.
    pub async fn peek(&self, limit: usize) -> Result<GetResult> {
        let conn = self.store.lock().await;
        let info = self.live(&conn)?;
        let records = if limit == 0 {
            Vec::new()
        } else {
            store::scan_records(&conn, &info.id, Some(limit), 0)?
        };
        Ok(GetResult::from_records(records, &PEEK_INCLUDE))
    }

    /// Inserts new records. Ids already stored are left untouched and skipped.
    pub async fn add(&self, records: Vec<Record>) -> Result<usize> {
        self.write(records, WriteMode::Add).await
    }

    /// Inserts new records and replaces existing ones in place.
    pub async fn upsert(&self, records: Vec<Record>) -> Result<usize> {
        self.write(records, WriteMode::Upsert).await
    }

    /// Replaces existing records. Unknown ids are skipped.
    pub async fn update(&self, records: Vec<Record>) -> Result<usize> {
        self.write(records, WriteMode::Update).await
    }

    async fn write(&self, mut records: Vec<Record>, mode: WriteMode) -> Result<usize> {
        let mut conn = self.store.lock().await;
        let tx = conn.transaction()?;
        let info = self.live(&tx)?;

        let dimension = validate_records(&records, info.dimension)?;
        for record in records.iter_mut() {
            record.metadata = normalize_metadata(record.metadata.take());
        }

        let mut written = 0;
        for record in &records {
            let exists = store::record_exists(&tx, &info.id, &record.id)?;
            match mode {
                WriteMode::Add if exists => {
                    tracing::warn!("Add of existing id {} in {}, skipping", record.id, info.name);
                }
                WriteMode::Update if !exists => {
                    tracing::warn!("Update of missing id {} in {}, skipping", record.id, info.name);
                }
                WriteMode::Add => {
                    store::insert_record(&tx, &info.id, record)?;
                    written += 1;
                }
                WriteMode::Upsert | WriteMode::Update => {
                    store::upsert_record(&tx, &info.id, record)?;
                    written += 1;
                }
            }
        }

        if info.dimension.is_none() && written > 0 {
            store::set_dimension(&tx, &info.id, dimension)?;
            tracing::debug!("Collection {} dimension fixed at {}", info.name, dimension);
        }
        tx.commit()?;
        tracing::debug!("Wrote {} of {} records to {}", written, records.len(), info.name);
        Ok(written)
    }

    pub async fn get(&self, request: GetRequest) -> Result<GetResult> {
        let conn = self.store.lock().await;
        let info = self.live(&conn)?;

        if request.ids.is_none() && request.filter.is_none() {
            let records = store::scan_records(&conn, &info.id, request.limit, request.offset)?;
            return Ok(GetResult::from_records(records, &request.include));
        }

        let wanted: Option<HashSet<&str>> = request
            .ids
            .as_ref()
            .map(|ids| ids.iter().map(String::as_str).collect());
        let records = store::scan_records(&conn, &info.id, None, 0)?
            .into_iter()
            .filter(|r| wanted.as_ref().is_none_or(|w| w.contains(r.id.as_str())))
            .filter(|r| {
                request
                    .filter
                    .as_ref()
                    .is_none_or(|f| metadata_matches(r.metadata.as_ref(), f))
            })
            .skip(request.offset)
            .take(request.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(GetResult::from_records(records, &request.include))
    }

    /// Removes the given ids and returns how many existed.
    pub async fn delete<S: AsRef<str>>(&self, ids: &[S]) -> Result<usize> {
        let mut conn = self.store.lock().await;
        let tx = conn.transaction()?;
        let info = self.live(&tx)?;
        let mut removed = 0;
        for id in ids {
            if store::delete_record(&tx, &info.id, id.as_ref())? {
                removed += 1;
            }
        }
        tx.commit()?;
        tracing::debug!("Deleted {} records from {}", removed, info.name);
        Ok(removed)
    }

    /// Removes every record whose metadata matches `filter`.
    pub async fn delete_where(&self, filter: &Metadata) -> Result<usize> {
        let mut conn = self.store.lock().await;
        let tx = conn.transaction()?;
        let info = self.live(&tx)?;
        let doomed: Vec<String> = store::scan_records(&tx, &info.id, None, 0)?
            .into_iter()
            .filter(|r| metadata_matches(r.metadata.as_ref(), filter))
            .map(|r| r.id)
            .collect();
        for id in &doomed {
            store::delete_record(&tx, &info.id, id)?;
        }
        tx.commit()?;
        Ok(doomed.len())
    }

    /// Exact nearest neighbours for each query embedding, closest first.
    pub async fn query(
        &self,
        query_embeddings: &[Vec<f32>],
        n_results: usize,
        include: &[Include],
    ) -> Result<QueryResult> {
        if query_embeddings.is_empty() {
            return Err(StashError::InvalidInput(
                "expected at least one query embedding".to_string(),
            ));
        }
        let conn = self.store.lock().await;
        let info = self.live(&conn)?;
        let space = info.space()?;

        let mut result = QueryResult::new(include);
        let Some(dimension) = info.dimension else {
            // Nothing stored yet
            for _ in query_embeddings {
                result.push(Vec::new());
            }
            return Ok(result);
        };
        for query in query_embeddings {
            if query.iter().any(|v| !v.is_finite()) {
                return Err(StashError::InvalidInput(
                    "query embedding has a non-finite value".to_string(),
                ));
            }
            if query.len() != dimension {
                return Err(StashError::DimensionMismatch {
                    expected: dimension,
                    got: query.len(),
                });
            }
        }

        let records = store::scan_records(&conn, &info.id, None, 0)?;
        drop(conn);

        for query in query_embeddings {
            let mut scored: Vec<(f32, &Record)> = records
                .iter()
                .map(|r| (space.distance(query, &r.embedding), r))
                .collect();
            // Stable sort keeps insertion order among equal distances
            scored.sort_by(|a, b| a.0.total_cmp(&b.0));
            let hits = scored
                .into_iter()
                .take(n_results)
                .map(|(d, r)| (d, r.clone()))
                .collect();
            result.push(hits);
        }
        Ok(result)
    }

    /// Renames the collection and/or replaces its metadata.
    pub async fn modify(
        &mut self,
        new_name: Option<&str>,
        new_metadata: Option<Metadata>,
    ) -> Result<()> {
        let mut conn = self.store.lock().await;
        let tx = conn.transaction()?;
        let mut info = self.live(&tx)?;

        if let Some(name) = new_name {
            validate_collection_name(name)?;
            if name != info.name && store::collection_by_name(&tx, name)?.is_some() {
                return Err(StashError::CollectionExists(name.to_string()));
            }
            info.name = name.to_string();
        }
        if let Some(metadata) = new_metadata {
            let metadata = normalize_metadata(Some(metadata));
            validate_metadata(metadata.as_ref(), &format!("collection {}", info.name))?;
            let old_space = info.space()?;
            let new_space = space_from_metadata(metadata.as_ref())?;
            if old_space != new_space {
                return Err(StashError::InvalidInput(format!(
                    "changing the distance space of {} from {} to {} is not supported",
                    info.name, old_space, new_space
                )));
            }
            info.metadata = metadata;
        }

        store::update_collection(&tx, &info.id, &info.name, info.metadata.as_ref())?;
        tx.commit()?;
        tracing::info!("Modified collection {} ({})", info.name, info.id);
        self.info = info;
        Ok(())
    }
}

/// Checks a batch and returns its embedding dimension.
fn validate_records(records: &[Record], dimension: Option<usize>) -> Result<usize> {
    let first = records
        .first()
        .ok_or_else(|| StashError::InvalidInput("expected at least one record".to_string()))?;
    let batch_dim = first.embedding.len();
    if batch_dim == 0 {
        return Err(StashError::InvalidInput(format!(
            "record {} has an empty embedding",
            first.id
        )));
    }
    if let Some(expected) = dimension {
        if expected != batch_dim {
            return Err(StashError::DimensionMismatch {
                expected,
                got: batch_dim,
            });
        }
    }

    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if record.id.is_empty() {
            return Err(StashError::InvalidInput("record ids must be non-empty".to_string()));
        }
        if !seen.insert(record.id.as_str()) {
            return Err(StashError::DuplicateId(record.id.clone()));
        }
        if record.embedding.len() != batch_dim {
            return Err(StashError::DimensionMismatch {
                expected: batch_dim,
                got: record.embedding.len(),
            });
        }
        if record.embedding.iter().any(|v| !v.is_finite()) {
            return Err(StashError::InvalidInput(format!(
                "record {} has a non-finite embedding value",
                record.id
            )));
        }
        validate_metadata(record.metadata.as_ref(), &format!("record {}", record.id))?;
    }
    Ok(batch_dim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_validation() {
        let ok = vec![Record::new("a", vec![1.0, 2.0]), Record::new("b", vec![3.0, 4.0])];
        assert_eq!(validate_records(&ok, None).unwrap(), 2);
        assert_eq!(validate_records(&ok, Some(2)).unwrap(), 2);
        assert!(matches!(
            validate_records(&ok, Some(3)),
            Err(StashError::DimensionMismatch { expected: 3, got: 2 })
        ));

        let dup = vec![Record::new("a", vec![1.0]), Record::new("a", vec![2.0])];
        assert!(matches!(validate_records(&dup, None), Err(StashError::DuplicateId(id)) if id == "a"));

        let ragged = vec![Record::new("a", vec![1.0]), Record::new("b", vec![2.0, 3.0])];
        assert!(matches!(
            validate_records(&ragged, None),
            Err(StashError::DimensionMismatch { expected: 1, got: 2 })
        ));

        assert!(validate_records(&[], None).is_err());
        assert!(validate_records(&[Record::new("", vec![1.0])], None).is_err());
        assert!(validate_records(&[Record::new("a", vec![])], None).is_err());
        assert!(validate_records(&[Record::new("a", vec![f32::NAN])], None).is_err());
    }
}
