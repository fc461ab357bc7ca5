//! Embedded persistent vector store.
//!
//! A [`PersistentClient`] is bound to a directory holding a single SQLite file.
//! It manages named collections; each [`Collection`] stores records made of an
//! id, an embedding, an optional document and optional scalar metadata.
//!
//! ```no_run
//! # async fn run() -> stash_core::Result<()> {
//! use stash_core::PersistentClient;
//!
//! let client = PersistentClient::open("./chroma_db").await?;
//! println!("{:?}", client.list_collections().await?);
//!
//! let collection = client.get_collection("your_collection_name").await?;
//! println!("Count: {}", collection.count().await?);
//! println!("First 5 items: {:?}", collection.peek(5).await?);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod collection;
pub mod config;
pub mod distance;
pub mod error;
pub mod naming;
pub mod record;
pub mod store;

pub use client::PersistentClient;
pub use collection::{Collection, DEFAULT_N_RESULTS, DEFAULT_PEEK_LIMIT};
pub use config::Settings;
pub use distance::{SPACE_KEY, Space};
pub use error::{Result, StashError};
pub use record::{
    CollectionInfo, GetRequest, GetResult, Include, Metadata, MetadataValue, QueryResult, Record,
};
