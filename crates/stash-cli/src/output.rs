use serde::Serialize;
use stash_core::{CollectionInfo, GetResult, Metadata, QueryResult};
use std::io::{self, Write};

// Embeddings are long; text output only shows the head
const EMBEDDING_PREVIEW: usize = 4;

pub fn json<T: Serialize>(out: &mut impl Write, value: &T) -> io::Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    writeln!(out, "{}", text)
}

pub fn collections(out: &mut impl Write, infos: &[CollectionInfo]) -> io::Result<()> {
    if infos.is_empty() {
        return writeln!(out, "No collections found");
    }
    for info in infos {
        let dimension = info
            .dimension
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{}\tid={}\tdim={}\tcreated={}",
            info.name,
            info.id,
            dimension,
            info.created_at.format("%Y-%m-%d %H:%M:%S")
        )?;
    }
    Ok(())
}

pub fn embedding_preview(embedding: &[f32]) -> String {
    let head: Vec<String> = embedding
        .iter()
        .take(EMBEDDING_PREVIEW)
        .map(|v| format!("{:.4}", v))
        .collect();
    if embedding.len() > EMBEDDING_PREVIEW {
        format!("[{}, ...] ({} dims)", head.join(", "), embedding.len())
    } else {
        format!("[{}]", head.join(", "))
    }
}

fn metadata_text(metadata: Option<&Metadata>) -> String {
    match metadata {
        Some(md) => md
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", "),
        None => "-".to_string(),
    }
}

pub fn records(out: &mut impl Write, result: &GetResult) -> io::Result<()> {
    if result.is_empty() {
        return writeln!(out, "  (no records)");
    }
    for (i, id) in result.ids.iter().enumerate() {
        writeln!(out, "- {}", id)?;
        if let Some(docs) = &result.documents {
            writeln!(out, "    document: {}", docs[i].as_deref().unwrap_or("-"))?;
        }
        if let Some(mds) = &result.metadatas {
            writeln!(out, "    metadata: {}", metadata_text(mds[i].as_ref()))?;
        }
        if let Some(embs) = &result.embeddings {
            writeln!(out, "    embedding: {}", embedding_preview(&embs[i]))?;
        }
    }
    Ok(())
}

pub fn query(out: &mut impl Write, result: &QueryResult) -> io::Result<()> {
    for (q, ids) in result.ids.iter().enumerate() {
        if result.ids.len() > 1 {
            writeln!(out, "Query {}:", q)?;
        }
        if ids.is_empty() {
            writeln!(out, "  (no results)")?;
        }
        for (i, id) in ids.iter().enumerate() {
            let distance = result
                .distances
                .as_ref()
                .map(|d| format!("{:.6}", d[q][i]))
                .unwrap_or_default();
            let document = result
                .documents
                .as_ref()
                .and_then(|d| d[q][i].clone())
                .unwrap_or_default();
            writeln!(out, "{:>3}. {}\t{}\t{}", i + 1, id, distance, document)?;
        }
    }
    Ok(())
}
