use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::distance::{SPACE_KEY, Space};
use crate::error::{Result, StashError};

/// Scalar values allowed in record and collection metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(v) => write!(f, "{}", v),
            MetadataValue::Int(v) => write!(f, "{}", v),
            MetadataValue::Float(v) => write!(f, "{}", v),
            MetadataValue::Str(v) => f.write_str(v),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Str(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Str(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl MetadataValue {
    /// Parses a command-line style value: bools and numbers first, string otherwise.
    pub fn parse_loose(raw: &str) -> Self {
        if let Ok(b) = raw.parse::<bool>() {
            MetadataValue::Bool(b)
        } else if let Ok(i) = raw.parse::<i64>() {
            MetadataValue::Int(i)
        } else if let Some(f) = raw.parse::<f64>().ok().filter(|f| f.is_finite()) {
            MetadataValue::Float(f)
        } else {
            MetadataValue::Str(raw.to_string())
        }
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// True when every key/value pair of `filter` is present in `metadata`.
pub fn metadata_matches(metadata: Option<&Metadata>, filter: &Metadata) -> bool {
    if filter.is_empty() {
        return true;
    }
    match metadata {
        Some(md) => filter.iter().all(|(k, v)| md.get(k) == Some(v)),
        None => false,
    }
}

/// Rejects values that cannot round-trip through the JSON metadata column.
pub(crate) fn validate_metadata(metadata: Option<&Metadata>, owner: &str) -> Result<()> {
    let Some(md) = metadata else {
        return Ok(());
    };
    for (key, value) in md {
        if key.is_empty() {
            return Err(StashError::InvalidInput(format!(
                "{} has an empty metadata key",
                owner
            )));
        }
        if let MetadataValue::Float(f) = value {
            if !f.is_finite() {
                return Err(StashError::InvalidInput(format!(
                    "{} has a non-finite value for metadata key {}",
                    owner, key
                )));
            }
        }
    }
    Ok(())
}

/// Empty maps are stored as "no metadata".
pub(crate) fn normalize_metadata(metadata: Option<Metadata>) -> Option<Metadata> {
    metadata.filter(|md| !md.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Record {
    pub fn new(id: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            embedding,
            document: None,
            metadata: None,
        }
    }

    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Include {
    Embeddings,
    Documents,
    Metadatas,
    Distances,
}

pub const GET_DEFAULT_INCLUDE: [Include; 2] = [Include::Documents, Include::Metadatas];
pub const PEEK_INCLUDE: [Include; 3] = [Include::Embeddings, Include::Documents, Include::Metadatas];
pub const QUERY_DEFAULT_INCLUDE: [Include; 3] =
    [Include::Documents, Include::Metadatas, Include::Distances];

#[derive(Debug, Clone, PartialEq)]
pub struct GetRequest {
    pub ids: Option<Vec<String>>,
    /// Metadata equality filter
    pub filter: Option<Metadata>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub include: Vec<Include>,
}

impl Default for GetRequest {
    fn default() -> Self {
        Self {
            ids: None,
            filter: None,
            limit: None,
            offset: 0,
            include: GET_DEFAULT_INCLUDE.to_vec(),
        }
    }
}

impl GetRequest {
    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, filter: Metadata) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn include(mut self, include: &[Include]) -> Self {
        self.include = include.to_vec();
        self
    }
}

/// Columnar result of `get` and `peek`; a column is `None` when it was not requested.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetResult {
    pub ids: Vec<String>,
    pub embeddings: Option<Vec<Vec<f32>>>,
    pub documents: Option<Vec<Option<String>>>,
    pub metadatas: Option<Vec<Option<Metadata>>>,
    pub included: Vec<Include>,
}

impl GetResult {
    pub(crate) fn from_records(records: Vec<Record>, include: &[Include]) -> Self {
        let mut result = GetResult {
            ids: Vec::with_capacity(records.len()),
            embeddings: include.contains(&Include::Embeddings).then(Vec::new),
            documents: include.contains(&Include::Documents).then(Vec::new),
            metadatas: include.contains(&Include::Metadatas).then(Vec::new),
            included: include
                .iter()
                .copied()
                .filter(|i| *i != Include::Distances)
                .collect(),
        };
        for record in records {
            result.ids.push(record.id);
            if let Some(col) = result.embeddings.as_mut() {
                col.push(record.embedding);
            }
            if let Some(col) = result.documents.as_mut() {
                col.push(record.document);
            }
            if let Some(col) = result.metadatas.as_mut() {
                col.push(record.metadata);
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// One column set per query embedding.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub ids: Vec<Vec<String>>,
    pub distances: Option<Vec<Vec<f32>>>,
    pub embeddings: Option<Vec<Vec<Vec<f32>>>>,
    pub documents: Option<Vec<Vec<Option<String>>>>,
    pub metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    pub included: Vec<Include>,
}

impl QueryResult {
    pub(crate) fn new(include: &[Include]) -> Self {
        QueryResult {
            ids: Vec::new(),
            distances: include.contains(&Include::Distances).then(Vec::new),
            embeddings: include.contains(&Include::Embeddings).then(Vec::new),
            documents: include.contains(&Include::Documents).then(Vec::new),
            metadatas: include.contains(&Include::Metadatas).then(Vec::new),
            included: include.to_vec(),
        }
    }

    /// Appends the neighbours of one query embedding, already sorted by distance.
    pub(crate) fn push(&mut self, hits: Vec<(f32, Record)>) {
        let mut ids = Vec::with_capacity(hits.len());
        let mut distances = Vec::with_capacity(hits.len());
        let mut embeddings = Vec::new();
        let mut documents = Vec::new();
        let mut metadatas = Vec::new();
        for (distance, record) in hits {
            ids.push(record.id);
            distances.push(distance);
            embeddings.push(record.embedding);
            documents.push(record.document);
            metadatas.push(record.metadata);
        }
        self.ids.push(ids);
        if let Some(col) = self.distances.as_mut() {
            col.push(distances);
        }
        if let Some(col) = self.embeddings.as_mut() {
            col.push(embeddings);
        }
        if let Some(col) = self.documents.as_mut() {
            col.push(documents);
        }
        if let Some(col) = self.metadatas.as_mut() {
            col.push(metadatas);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub id: String,
    pub name: String,
    pub metadata: Option<Metadata>,
    /// Fixed by the first insert
    pub dimension: Option<usize>,
    pub created_at: DateTime<Utc>,
}

impl CollectionInfo {
    pub fn space(&self) -> Result<Space> {
        space_from_metadata(self.metadata.as_ref())
    }
}

pub(crate) fn space_from_metadata(metadata: Option<&Metadata>) -> Result<Space> {
    match metadata.and_then(|md| md.get(SPACE_KEY)) {
        None => Ok(Space::L2),
        Some(MetadataValue::Str(s)) => s.parse(),
        Some(other) => other.to_string().parse(),
    }
}

impl fmt::Display for CollectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Collection(name={}, id={})", self.name, self.id)
    }
}
