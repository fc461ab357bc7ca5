use serde::Serialize;
use stash_core::{
    CollectionInfo, GetRequest, GetResult, Include, Metadata, MetadataValue, PersistentClient,
    QueryResult, Record, SPACE_KEY, Settings, Space, StashError,
};
use std::error::Error;
use std::io::Write;
use std::path::Path;

use crate::output;
use crate::{Cli, Commands};

type CliResult = Result<(), Box<dyn Error>>;

/// `key=value` pairs for --meta and --where.
pub fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

fn to_metadata(pairs: Vec<(String, String)>) -> Metadata {
    pairs
        .into_iter()
        .map(|(k, v)| (k, MetadataValue::parse_loose(&v)))
        .collect()
}

#[derive(Serialize)]
struct InspectReport<'a> {
    collections: &'a [CollectionInfo],
    name: &'a str,
    count: usize,
    sample: &'a GetResult,
}

pub async fn run(cli: Cli, out: &mut impl Write) -> CliResult {
    let mut settings = Settings::from_env();
    if let Some(path) = cli.path {
        settings.path = path;
    }
    let json = cli.json;
    let client = PersistentClient::with_settings(settings).await?;

    match cli.command {
        Commands::Collections => {
            let infos = client.list_collections().await?;
            if json {
                output::json(out, &infos)?;
            } else {
                output::collections(out, &infos)?;
            }
        }
        Commands::Create { name, space, meta } => {
            let mut metadata = to_metadata(meta);
            if let Some(space) = space {
                let space: Space = space.parse()?;
                metadata.insert(SPACE_KEY.to_string(), space.as_str().into());
            }
            let collection = client.create_collection(&name, Some(metadata)).await?;
            if json {
                output::json(out, collection.info())?;
            } else {
                writeln!(out, "Created collection {} ({})", collection.name(), collection.id())?;
            }
        }
        Commands::Delete { name } => {
            client.delete_collection(&name).await?;
            if json {
                output::json(out, &serde_json::json!({ "deleted": name }))?;
            } else {
                writeln!(out, "Deleted collection {}", name)?;
            }
        }
        Commands::Count { name } => {
            let count = client.get_collection(&name).await?.count().await?;
            if json {
                output::json(out, &count)?;
            } else {
                writeln!(out, "Count: {}", count)?;
            }
        }
        Commands::Peek { name, limit } => {
            let sample = client.get_collection(&name).await?.peek(limit).await?;
            if json {
                output::json(out, &sample)?;
            } else {
                output::records(out, &sample)?;
            }
        }
        Commands::Inspect { name, limit } => inspect(&client, &name, limit, json, out).await?,
        Commands::Get {
            name,
            ids,
            filter,
            limit,
            offset,
            embeddings,
        } => {
            let mut request = GetRequest::default().offset(offset);
            if !ids.is_empty() {
                request = request.ids(ids);
            }
            if !filter.is_empty() {
                request = request.filter(to_metadata(filter));
            }
            if let Some(limit) = limit {
                request = request.limit(limit);
            }
            if embeddings {
                request.include.push(Include::Embeddings);
            }
            let result = client.get_collection(&name).await?.get(request).await?;
            if json {
                output::json(out, &result)?;
            } else {
                output::records(out, &result)?;
            }
        }
        Commands::Query {
            name,
            vector,
            n_results,
        } => {
            let result: QueryResult = client
                .get_collection(&name)
                .await?
                .query(&[vector], n_results, &stash_core::record::QUERY_DEFAULT_INCLUDE)
                .await?;
            if json {
                output::json(out, &result)?;
            } else {
                output::query(out, &result)?;
            }
        }
        Commands::Import { name, file, upsert } => {
            let records = read_records(&file)?;
            if records.is_empty() {
                return Err(StashError::InvalidInput(format!(
                    "{} contains no records",
                    file.display()
                ))
                .into());
            }
            let (collection, created) = match client.get_collection(&name).await {
                Ok(collection) => (collection, false),
                Err(StashError::CollectionNotFound(_)) => {
                    (client.create_collection(&name, None).await?, true)
                }
                Err(e) => return Err(e.into()),
            };
            let total = records.len();
            let outcome = if upsert {
                collection.upsert(records).await
            } else {
                collection.add(records).await
            };
            let written = match outcome {
                Ok(written) => written,
                Err(e) => {
                    // Leave no empty collection behind for a rejected file
                    if created {
                        client.delete_collection(&name).await?;
                    }
                    return Err(e.into());
                }
            };
            tracing::info!("Imported {} of {} records from {}", written, total, file.display());
            if json {
                output::json(out, &written)?;
            } else {
                writeln!(out, "Imported {} of {} records into {}", written, total, name)?;
            }
        }
        Commands::Remove { name, ids } => {
            let removed = client.get_collection(&name).await?.delete(ids.as_slice()).await?;
            if json {
                output::json(out, &removed)?;
            } else {
                writeln!(out, "Removed {} records from {}", removed, name)?;
            }
        }
        Commands::Reset => {
            client.reset().await?;
            if json {
                output::json(out, &serde_json::json!({ "reset": true }))?;
            } else {
                writeln!(out, "Store reset")?;
            }
        }
    }
    Ok(())
}

/// List collections, then count and sample the named one.
async fn inspect(
    client: &PersistentClient,
    name: &str,
    limit: usize,
    json: bool,
    out: &mut impl Write,
) -> CliResult {
    let infos = client.list_collections().await?;
    let collection = client.get_collection(name).await?;
    let count = collection.count().await?;
    let sample = collection.peek(limit).await?;

    if json {
        let report = InspectReport {
            collections: &infos,
            name,
            count,
            sample: &sample,
        };
        output::json(out, &report)?;
        return Ok(());
    }

    writeln!(out, "Collections:")?;
    output::collections(out, &infos)?;
    writeln!(out)?;
    writeln!(out, "Collection: {}", collection.name())?;
    writeln!(out, "Count: {}", count)?;
    writeln!(out, "First {} items:", limit)?;
    output::records(out, &sample)?;
    Ok(())
}

/// One JSON record per line; blank lines are skipped.
fn read_records(path: &Path) -> Result<Vec<Record>, StashError> {
    let text = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(line).map_err(|e| {
            StashError::InvalidInput(format!("{}:{}: {}", path.display(), lineno + 1, e))
        })?;
        records.push(record);
    }
    Ok(records)
}
