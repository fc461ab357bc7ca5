use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::{Result, StashError};
use crate::record::{CollectionInfo, Metadata, Record};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS collections (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        dimension INTEGER,
        metadata TEXT,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS records (
        seq_id INTEGER PRIMARY KEY AUTOINCREMENT,
        collection_id TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
        id TEXT NOT NULL,
        embedding BLOB NOT NULL,
        document TEXT,
        metadata TEXT,
        UNIQUE (collection_id, id)
    );
    CREATE INDEX IF NOT EXISTS records_by_collection ON records (collection_id, seq_id);
";

/// Shared handle to the SQLite file backing a client and its collections.
#[derive(Clone)]
pub struct Store {
    // Wrap connection for async access
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn decode_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(StashError::Corrupt(format!(
            "embedding blob of {} bytes is not a sequence of f32",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn metadata_to_sql(metadata: Option<&Metadata>) -> Result<Option<String>> {
    Ok(metadata.map(serde_json::to_string).transpose()?)
}

fn metadata_from_sql(raw: Option<String>) -> Result<Option<Metadata>> {
    Ok(raw.as_deref().map(serde_json::from_str).transpose()?)
}

struct RawCollection {
    id: String,
    name: String,
    dimension: Option<i64>,
    metadata: Option<String>,
    created_at: String,
}

impl RawCollection {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            dimension: row.get(2)?,
            metadata: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_info(self) -> Result<CollectionInfo> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| StashError::Corrupt(format!("bad created_at for {}: {}", self.name, e)))?
            .with_timezone(&Utc);
        Ok(CollectionInfo {
            id: self.id,
            name: self.name,
            metadata: metadata_from_sql(self.metadata)?,
            dimension: self.dimension.map(|d| d as usize),
            created_at,
        })
    }
}

struct RawRecord {
    id: String,
    embedding: Vec<u8>,
    document: Option<String>,
    metadata: Option<String>,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            embedding: row.get(1)?,
            document: row.get(2)?,
            metadata: row.get(3)?,
        })
    }

    fn into_record(self) -> Result<Record> {
        Ok(Record {
            embedding: decode_embedding(&self.embedding)?,
            metadata: metadata_from_sql(self.metadata)?,
            id: self.id,
            document: self.document,
        })
    }
}

const COLLECTION_COLUMNS: &str = "id, name, dimension, metadata, created_at";
const RECORD_COLUMNS: &str = "id, embedding, document, metadata";

// --- collections ---

pub fn list_collections(conn: &Connection) -> Result<Vec<CollectionInfo>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLLECTION_COLUMNS} FROM collections ORDER BY rowid"
    ))?;
    let raws = stmt
        .query_map([], RawCollection::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawCollection::into_info).collect()
}

pub fn count_collections(conn: &Connection) -> Result<usize> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM collections", [], |r| r.get(0))?;
    Ok(n as usize)
}

pub fn collection_by_name(conn: &Connection, name: &str) -> Result<Option<CollectionInfo>> {
    conn.query_row(
        &format!("SELECT {COLLECTION_COLUMNS} FROM collections WHERE name = ?1"),
        params![name],
        RawCollection::from_row,
    )
    .optional()?
    .map(RawCollection::into_info)
    .transpose()
}

pub fn collection_by_id(conn: &Connection, id: &str) -> Result<Option<CollectionInfo>> {
    conn.query_row(
        &format!("SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = ?1"),
        params![id],
        RawCollection::from_row,
    )
    .optional()?
    .map(RawCollection::into_info)
    .transpose()
}

pub fn insert_collection(conn: &Connection, info: &CollectionInfo) -> Result<()> {
    conn.execute(
        "INSERT INTO collections (id, name, dimension, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            info.id,
            info.name,
            info.dimension.map(|d| d as i64),
            metadata_to_sql(info.metadata.as_ref())?,
            info.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn update_collection(
    conn: &Connection,
    id: &str,
    name: &str,
    metadata: Option<&Metadata>,
) -> Result<()> {
    conn.execute(
        "UPDATE collections SET name = ?2, metadata = ?3 WHERE id = ?1",
        params![id, name, metadata_to_sql(metadata)?],
    )?;
    Ok(())
}

pub fn set_dimension(conn: &Connection, id: &str, dimension: usize) -> Result<()> {
    conn.execute(
        "UPDATE collections SET dimension = ?2 WHERE id = ?1",
        params![id, dimension as i64],
    )?;
    Ok(())
}

/// Records go with the collection through the cascading foreign key.
pub fn delete_collection(conn: &Connection, id: &str) -> Result<bool> {
    let n = conn.execute("DELETE FROM collections WHERE id = ?1", params![id])?;
    Ok(n > 0)
}

pub fn delete_all(conn: &Connection) -> Result<()> {
    conn.execute_batch("DELETE FROM records; DELETE FROM collections;")?;
    Ok(())
}

// --- records ---

pub fn count_records(conn: &Connection, collection_id: &str) -> Result<usize> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM records WHERE collection_id = ?1",
        params![collection_id],
        |r| r.get(0),
    )?;
    Ok(n as usize)
}

pub fn record_exists(conn: &Connection, collection_id: &str, id: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM records WHERE collection_id = ?1 AND id = ?2",
            params![collection_id, id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Records in insertion order; `limit = None` reads everything.
pub fn scan_records(
    conn: &Connection,
    collection_id: &str,
    limit: Option<usize>,
    offset: usize,
) -> Result<Vec<Record>> {
    // SQLite treats a negative LIMIT as "no limit"
    let limit = limit
        .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
        .unwrap_or(-1);
    let offset = i64::try_from(offset).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {RECORD_COLUMNS} FROM records WHERE collection_id = ?1
         ORDER BY seq_id LIMIT ?2 OFFSET ?3"
    ))?;
    let raws = stmt
        .query_map(params![collection_id, limit, offset], RawRecord::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawRecord::into_record).collect()
}

pub fn insert_record(conn: &Connection, collection_id: &str, record: &Record) -> Result<()> {
    conn.prepare_cached(
        "INSERT INTO records (collection_id, id, embedding, document, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?
    .execute(params![
        collection_id,
        record.id,
        encode_embedding(&record.embedding),
        record.document,
        metadata_to_sql(record.metadata.as_ref())?,
    ])?;
    Ok(())
}

/// Insert or replace in place; an existing row keeps its `seq_id`.
pub fn upsert_record(conn: &Connection, collection_id: &str, record: &Record) -> Result<()> {
    conn.prepare_cached(
        "INSERT INTO records (collection_id, id, embedding, document, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (collection_id, id) DO UPDATE SET
             embedding = excluded.embedding,
             document = excluded.document,
             metadata = excluded.metadata",
    )?
    .execute(params![
        collection_id,
        record.id,
        encode_embedding(&record.embedding),
        record.document,
        metadata_to_sql(record.metadata.as_ref())?,
    ])?;
    Ok(())
}

pub fn delete_record(conn: &Connection, collection_id: &str, id: &str) -> Result<bool> {
    let n = conn
        .prepare_cached("DELETE FROM records WHERE collection_id = ?1 AND id = ?2")?
        .execute(params![collection_id, id])?;
    Ok(n > 0)
}
