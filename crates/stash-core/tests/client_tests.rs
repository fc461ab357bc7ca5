use stash_core::{
    GetRequest, Include, Metadata, MetadataValue, PersistentClient, Record, SPACE_KEY, Settings, StashError,
};
use tempfile::tempdir;

fn space(name: &str) -> Metadata {
    let mut md = Metadata::new();
    md.insert(SPACE_KEY.to_string(), name.into());
    md
}

fn sample_records() -> Vec<Record> {
    (0..8)
        .map(|i| {
            Record::new(format!("doc-{}", i), vec![i as f32, 1.0, 0.0])
                .with_document(format!("document number {}", i))
                .with_meta("parity", if i % 2 == 0 { "even" } else { "odd" })
                .with_meta("n", i as i64)
        })
        .collect()
}

#[tokio::test]
async fn open_creates_missing_directory() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("chroma_db");
    let client = PersistentClient::open(&path).await.unwrap();

    assert!(path.join("stash.sqlite3").exists());
    assert!(client.list_collections().await.unwrap().is_empty());
    assert_eq!(client.count_collections().await.unwrap(), 0);
    assert!(client.heartbeat().await.unwrap() > 0);
}

#[tokio::test]
async fn list_collections_in_creation_order() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();
    for name in ["zeta", "alpha", "mid"] {
        client.create_collection(name, None).await.unwrap();
    }

    let names: Vec<String> = client
        .list_collections()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    assert_eq!(client.count_collections().await.unwrap(), 3);
}

#[tokio::test]
async fn create_get_and_missing_collections() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();

    let created = client.create_collection("notes", None).await.unwrap();
    let fetched = client.get_collection("notes").await.unwrap();
    assert_eq!(created.id(), fetched.id());
    assert_eq!(fetched.name(), "notes");

    assert!(matches!(
        client.create_collection("notes", None).await,
        Err(StashError::CollectionExists(name)) if name == "notes"
    ));
    assert!(matches!(
        client.get_collection("your_collection_name").await,
        Err(StashError::CollectionNotFound(_))
    ));
    assert!(matches!(
        client.create_collection("x", None).await,
        Err(StashError::InvalidCollectionName { .. })
    ));
    assert!(matches!(
        client.create_collection("bad-space", Some(space("hamming"))).await,
        Err(StashError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn get_or_create_keeps_existing_metadata() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();

    let first = client
        .get_or_create_collection("vectors", Some(space("cosine")))
        .await
        .unwrap();
    let second = client
        .get_or_create_collection("vectors", Some(space("ip")))
        .await
        .unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(second.space().unwrap().as_str(), "cosine");
}

#[tokio::test]
async fn count_and_peek_follow_insertion_order() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();
    let collection = client.create_collection("docs", None).await.unwrap();

    assert_eq!(collection.count().await.unwrap(), 0);
    assert!(collection.peek(5).await.unwrap().is_empty());

    assert_eq!(collection.add(sample_records()).await.unwrap(), 8);
    assert_eq!(collection.count().await.unwrap(), 8);

    let peek = collection.peek(5).await.unwrap();
    assert_eq!(peek.ids, vec!["doc-0", "doc-1", "doc-2", "doc-3", "doc-4"]);
    let embeddings = peek.embeddings.as_ref().unwrap();
    assert_eq!(embeddings[2], vec![2.0, 1.0, 0.0]);
    assert_eq!(
        peek.documents.as_ref().unwrap()[1].as_deref(),
        Some("document number 1")
    );
    assert!(peek.metadatas.is_some());
    assert_eq!(
        peek.included,
        vec![Include::Embeddings, Include::Documents, Include::Metadatas]
    );

    assert_eq!(collection.peek(100).await.unwrap().len(), 8);
    assert!(collection.peek(0).await.unwrap().is_empty());
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = tempdir().unwrap();
    {
        let client = PersistentClient::open(dir.path()).await.unwrap();
        let collection = client.create_collection("persisted", None).await.unwrap();
        collection.add(sample_records()).await.unwrap();
    }

    let client = PersistentClient::open(dir.path()).await.unwrap();
    let collection = client.get_collection("persisted").await.unwrap();
    assert_eq!(collection.count().await.unwrap(), 8);
    assert_eq!(collection.info().dimension, Some(3));
    let peek = collection.peek(1).await.unwrap();
    assert_eq!(peek.ids, vec!["doc-0"]);
    let md = peek.metadatas.unwrap()[0].clone().unwrap();
    assert_eq!(md["parity"], MetadataValue::from("even"));
}

#[tokio::test]
async fn add_skips_existing_ids_and_upsert_replaces_in_place() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();
    let collection = client.create_collection("docs", None).await.unwrap();
    collection.add(sample_records()).await.unwrap();

    let again = vec![
        Record::new("doc-1", vec![9.0, 9.0, 9.0]).with_document("changed"),
        Record::new("doc-new", vec![9.0, 9.0, 9.0]),
    ];
    assert_eq!(collection.add(again.clone()).await.unwrap(), 1);
    assert_eq!(collection.count().await.unwrap(), 9);
    let got = collection
        .get(GetRequest::default().ids(["doc-1"]))
        .await
        .unwrap();
    assert_eq!(got.documents.unwrap()[0].as_deref(), Some("document number 1"));

    assert_eq!(collection.upsert(again).await.unwrap(), 2);
    assert_eq!(collection.count().await.unwrap(), 9);
    let peek = collection.peek(2).await.unwrap();
    assert_eq!(peek.ids, vec!["doc-0", "doc-1"]);
    assert_eq!(peek.documents.unwrap()[1].as_deref(), Some("changed"));
    assert_eq!(peek.embeddings.unwrap()[1], vec![9.0, 9.0, 9.0]);
}

#[tokio::test]
async fn update_only_touches_existing_ids() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();
    let collection = client.create_collection("docs", None).await.unwrap();
    collection.add(sample_records()).await.unwrap();

    let written = collection
        .update(vec![
            Record::new("doc-2", vec![0.0, 0.0, 0.0]),
            Record::new("ghost", vec![0.0, 0.0, 0.0]),
        ])
        .await
        .unwrap();
    assert_eq!(written, 1);
    assert_eq!(collection.count().await.unwrap(), 8);
    let got = collection
        .get(GetRequest::default().ids(["doc-2", "ghost"]).include(&[Include::Embeddings]))
        .await
        .unwrap();
    assert_eq!(got.ids, vec!["doc-2"]);
    assert_eq!(got.embeddings.unwrap()[0], vec![0.0, 0.0, 0.0]);
    assert!(got.documents.is_none());
}

#[tokio::test]
async fn first_insert_fixes_dimension() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();
    let collection = client.create_collection("dims", None).await.unwrap();

    collection
        .add(vec![Record::new("a", vec![1.0, 2.0])])
        .await
        .unwrap();
    assert!(matches!(
        collection.add(vec![Record::new("b", vec![1.0, 2.0, 3.0])]).await,
        Err(StashError::DimensionMismatch { expected: 2, got: 3 })
    ));
    assert!(matches!(
        collection
            .add(vec![Record::new("c", vec![1.0, 2.0]), Record::new("c", vec![1.0, 2.0])])
            .await,
        Err(StashError::DuplicateId(_))
    ));
    // Failed batches write nothing
    assert_eq!(collection.count().await.unwrap(), 1);
}

#[tokio::test]
async fn get_with_filter_limit_and_offset() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();
    let collection = client.create_collection("docs", None).await.unwrap();
    collection.add(sample_records()).await.unwrap();

    let page = collection
        .get(GetRequest::default().offset(2).limit(3))
        .await
        .unwrap();
    assert_eq!(page.ids, vec!["doc-2", "doc-3", "doc-4"]);
    assert!(page.embeddings.is_none());
    assert_eq!(page.documents.as_ref().map(Vec::len), Some(3));

    let mut filter = Metadata::new();
    filter.insert("parity".into(), "odd".into());
    let odd = collection
        .get(GetRequest::default().filter(filter.clone()).offset(1).limit(2))
        .await
        .unwrap();
    assert_eq!(odd.ids, vec!["doc-3", "doc-5"]);

    let removed = collection.delete_where(&filter).await.unwrap();
    assert_eq!(removed, 4);
    assert_eq!(collection.count().await.unwrap(), 4);
}

#[tokio::test]
async fn delete_records_by_id() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();
    let collection = client.create_collection("docs", None).await.unwrap();
    collection.add(sample_records()).await.unwrap();

    let removed = collection.delete(&["doc-0", "doc-7", "missing"]).await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(collection.peek(1).await.unwrap().ids, vec!["doc-1"]);
    assert_eq!(collection.count().await.unwrap(), 6);
}

#[tokio::test]
async fn query_orders_by_distance() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();
    let collection = client.create_collection("docs", None).await.unwrap();
    collection.add(sample_records()).await.unwrap();

    let result = collection
        .query(&[vec![5.2, 1.0, 0.0], vec![0.0, 1.0, 0.0]], 3, &[Include::Distances])
        .await
        .unwrap();
    assert_eq!(result.ids[0], vec!["doc-5", "doc-6", "doc-4"]);
    assert_eq!(result.ids[1], vec!["doc-0", "doc-1", "doc-2"]);
    let distances = result.distances.unwrap();
    assert!(distances[0].windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(distances[1][1], 1.0);
    assert!(result.documents.is_none());

    assert!(matches!(
        collection.query(&[vec![1.0]], 3, &[]).await,
        Err(StashError::DimensionMismatch { expected: 3, got: 1 })
    ));
}

#[tokio::test]
async fn cosine_space_ignores_magnitude() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();
    let collection = client
        .create_collection("angles", Some(space("cosine")))
        .await
        .unwrap();
    collection
        .add(vec![
            Record::new("far-aligned", vec![100.0, 0.0]),
            Record::new("near-diagonal", vec![1.0, 1.0]),
        ])
        .await
        .unwrap();

    let result = collection
        .query(&[vec![1.0, 0.0]], 1, &[Include::Distances])
        .await
        .unwrap();
    assert_eq!(result.ids[0], vec!["far-aligned"]);
}

#[tokio::test]
async fn query_on_empty_collection_returns_empty_rows() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();
    let collection = client.create_collection("empty", None).await.unwrap();

    let result = collection
        .query(&[vec![1.0, 2.0]], 5, &[Include::Documents])
        .await
        .unwrap();
    assert_eq!(result.ids, vec![Vec::<String>::new()]);
}

#[tokio::test]
async fn deleted_collection_invalidates_handles() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();
    let collection = client.create_collection("doomed", None).await.unwrap();
    collection.add(sample_records()).await.unwrap();

    client.delete_collection("doomed").await.unwrap();
    assert!(matches!(
        collection.count().await,
        Err(StashError::CollectionNotFound(name)) if name == "doomed"
    ));
    assert!(matches!(
        client.delete_collection("doomed").await,
        Err(StashError::CollectionNotFound(_))
    ));

    // Recreating the name starts empty
    let fresh = client.create_collection("doomed", None).await.unwrap();
    assert_eq!(fresh.count().await.unwrap(), 0);
}

#[tokio::test]
async fn modify_renames_and_guards_space() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();
    client.create_collection("taken", None).await.unwrap();
    let mut collection = client
        .create_collection("original", Some(space("ip")))
        .await
        .unwrap();

    assert!(matches!(
        collection.modify(Some("taken"), None).await,
        Err(StashError::CollectionExists(_))
    ));
    assert!(matches!(
        collection.modify(None, Some(space("l2"))).await,
        Err(StashError::InvalidInput(_))
    ));

    let mut md = space("ip");
    md.insert("owner".into(), "search-team".into());
    collection.modify(Some("renamed"), Some(md)).await.unwrap();
    assert_eq!(collection.name(), "renamed");

    let reloaded = client.get_collection("renamed").await.unwrap();
    assert_eq!(reloaded.id(), collection.id());
    assert_eq!(
        reloaded.metadata().unwrap()["owner"],
        MetadataValue::from("search-team")
    );
    assert!(client.get_collection("original").await.is_err());
}

#[tokio::test]
async fn reset_requires_permission() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();
    client.create_collection("keep", None).await.unwrap();
    assert!(matches!(client.reset().await, Err(StashError::ResetDisabled)));
    assert_eq!(client.count_collections().await.unwrap(), 1);

    let client = PersistentClient::with_settings(Settings::new(dir.path()).allow_reset(true))
        .await
        .unwrap();
    client.reset().await.unwrap();
    assert!(client.list_collections().await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_metadata_is_stored_as_none() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();
    let collection = client
        .create_collection("plain", Some(Metadata::new()))
        .await
        .unwrap();
    assert!(collection.metadata().is_none());

    collection
        .add(vec![Record::new("a", vec![1.0]).with_metadata(Metadata::new())])
        .await
        .unwrap();
    let peek = collection.peek(1).await.unwrap();
    assert_eq!(peek.metadatas.unwrap(), vec![None]);
}

#[tokio::test]
async fn non_finite_metadata_is_rejected_and_store_stays_readable() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();

    let mut md = Metadata::new();
    md.insert("lang".into(), MetadataValue::parse_loose("nan"));
    let langs = client.create_collection("langs", Some(md)).await.unwrap();
    assert_eq!(
        langs.metadata().unwrap()["lang"],
        MetadataValue::Str("nan".into())
    );

    let mut bad = Metadata::new();
    bad.insert("score".into(), f64::NAN.into());
    assert!(matches!(
        client.create_collection("broken", Some(bad.clone())).await,
        Err(StashError::InvalidInput(_))
    ));

    let mut collection = client.create_collection("scores", None).await.unwrap();
    assert!(matches!(
        collection
            .add(vec![Record::new("a", vec![1.0]).with_meta("score", f64::INFINITY)])
            .await,
        Err(StashError::InvalidInput(_))
    ));
    assert!(matches!(
        collection
            .upsert(vec![Record::new("a", vec![1.0]).with_meta("score", f64::NEG_INFINITY)])
            .await,
        Err(StashError::InvalidInput(_))
    ));
    assert!(matches!(
        collection.modify(None, Some(bad)).await,
        Err(StashError::InvalidInput(_))
    ));

    assert_eq!(client.list_collections().await.unwrap().len(), 2);
    client.get_collection("langs").await.unwrap();
    assert!(collection.peek(5).await.unwrap().is_empty());
}

#[tokio::test]
async fn huge_offset_returns_nothing_on_every_path() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();
    let collection = client.create_collection("docs", None).await.unwrap();
    collection.add(sample_records()).await.unwrap();

    let plain = collection
        .get(GetRequest::default().offset(usize::MAX))
        .await
        .unwrap();
    assert!(plain.is_empty());
    let by_id = collection
        .get(GetRequest::default().ids(["doc-0", "doc-1"]).offset(usize::MAX))
        .await
        .unwrap();
    assert!(by_id.is_empty());

    let unbounded = collection
        .get(GetRequest::default().limit(usize::MAX))
        .await
        .unwrap();
    assert_eq!(unbounded.len(), 8);
}

#[tokio::test]
async fn query_rejects_non_finite_values() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();
    let collection = client.create_collection("docs", None).await.unwrap();
    collection.add(sample_records()).await.unwrap();

    for bad in [f32::NAN, f32::INFINITY] {
        assert!(matches!(
            collection.query(&[vec![bad, 1.0, 0.0]], 3, &[]).await,
            Err(StashError::InvalidInput(_))
        ));
    }
}

#[tokio::test]
async fn refresh_picks_up_changes_from_other_handles() {
    let dir = tempdir().unwrap();
    let client = PersistentClient::open(dir.path()).await.unwrap();
    let mut reader = client.create_collection("shared", None).await.unwrap();
    let mut writer = client.get_collection("shared").await.unwrap();

    let mut md = Metadata::new();
    md.insert("owner".into(), "ops".into());
    writer.modify(Some("shared-renamed"), Some(md)).await.unwrap();
    writer
        .add(vec![Record::new("a", vec![1.0, 2.0])])
        .await
        .unwrap();

    // Cached until refreshed
    assert!(reader.metadata().is_none());
    assert_eq!(reader.name(), "shared");

    reader.refresh().await.unwrap();
    assert_eq!(reader.name(), "shared-renamed");
    assert_eq!(reader.metadata().unwrap()["owner"], MetadataValue::from("ops"));
    assert_eq!(reader.info().dimension, Some(2));

    client.delete_collection("shared-renamed").await.unwrap();
    assert!(matches!(
        reader.refresh().await,
        Err(StashError::CollectionNotFound(_))
    ));
}
