//! Full-stack integration tests over the SQLite backend.
//!
//! Every test runs against a file-backed temporary database so that the
//! executor's fresh-connection-per-call mode and the statement cache's
//! dedicated connections all see the same data.

use std::sync::Arc;

use streamcat_catalog::{storable_registry, FileResource, ParserInfo, StreamInfo, Topology};
use streamcat_storage::{
    CacheBackedStorageManager, CacheConfig, Connection, ConnectionSource, ExecutionConfig,
    QueryExecutor, QueryParam, SqlStorageManager, SqliteConnectionSource, SqliteDialect, Storable,
    StorableEntity, StorageError, StorageManager, Value,
};
use tempfile::TempDir;

const SCHEMA: &[&str] = &[
    "CREATE TABLE topologies (id INTEGER PRIMARY KEY, name TEXT NOT NULL, config TEXT, ts INTEGER NOT NULL)",
    "CREATE TABLE streams (id INTEGER PRIMARY KEY, topology_id INTEGER NOT NULL, stream_id TEXT NOT NULL, schema TEXT NOT NULL, ts INTEGER NOT NULL)",
    "CREATE TABLE parser_info (id INTEGER PRIMARY KEY, name TEXT NOT NULL, class_name TEXT NOT NULL, jar_path TEXT NOT NULL, version INTEGER NOT NULL, ts INTEGER NOT NULL)",
    "CREATE TABLE files (name TEXT NOT NULL, version INTEGER NOT NULL, stored_path TEXT NOT NULL, ts INTEGER NOT NULL, PRIMARY KEY (name, version))",
];

async fn setup_with(config: ExecutionConfig) -> (TempDir, SqlStorageManager) {
    let dir = tempfile::tempdir().unwrap();
    let source = SqliteConnectionSource::from_path(dir.path().join("catalog.db")).unwrap();

    let mut conn = source.connect().await.unwrap();
    for ddl in SCHEMA {
        conn.execute(ddl, &[]).await.unwrap();
    }
    conn.close().await.unwrap();

    let executor = QueryExecutor::new(
        config,
        Arc::new(source),
        Arc::new(SqliteDialect::new()),
        Arc::new(storable_registry().unwrap()),
    );
    (dir, SqlStorageManager::new(executor))
}

async fn setup() -> (TempDir, SqlStorageManager) {
    setup_with(ExecutionConfig::default()).await
}

fn topology(id: i64, name: &str) -> Topology {
    let mut topology = Topology::new(id, name);
    topology.timestamp_ms = 1_700_000_000_000 + id;
    topology
        .config
        .insert("workers".to_string(), id.to_string());
    topology
}

fn parser(id: i64, name: &str, version: i64) -> ParserInfo {
    ParserInfo {
        id,
        name: name.to_string(),
        class_name: format!("com.streamcat.parsers.{name}"),
        jar_path: format!("/var/lib/streamcat/{name}-{version}.jar"),
        version,
        timestamp_ms: 1_700_000_000_000,
    }
}

fn file(name: &str, version: i64) -> FileResource {
    FileResource {
        name: name.to_string(),
        stored_path: format!("/var/lib/streamcat/files/{name}-{version}"),
        version,
        timestamp_ms: 1_700_000_000_000,
    }
}

#[tokio::test]
async fn add_get_remove_round_trip() {
    let (_dir, store) = setup().await;
    let entity = topology(1, "clickstream");

    store.add(Box::new(entity.clone())).await.unwrap();

    let fetched = store.get(&entity.key()).await.unwrap().unwrap();
    assert_eq!(fetched.downcast_ref::<Topology>(), Some(&entity));

    let prior = store.remove(&entity.key()).await.unwrap().unwrap();
    assert_eq!(prior.downcast_ref::<Topology>(), Some(&entity));
    assert!(store.get(&entity.key()).await.unwrap().is_none());

    store.cleanup().await.unwrap();
}

#[tokio::test]
async fn get_absent_key_is_none_and_remove_absent_is_none() {
    let (_dir, store) = setup().await;
    let key = topology(404, "ghost").key();
    assert!(store.get(&key).await.unwrap().is_none());
    assert!(store.remove(&key).await.unwrap().is_none());
    store.cleanup().await.unwrap();
}

#[tokio::test]
async fn add_is_insert_only() {
    let (_dir, store) = setup().await;
    let entity = topology(1, "clickstream");
    store.add(Box::new(entity.clone())).await.unwrap();

    // Re-adding identical state is accepted.
    store.add(Box::new(entity.clone())).await.unwrap();

    // Conflicting state under the same key is rejected and the stored
    // entity is unchanged.
    let conflicting = topology(1, "renamed");
    let err = store.add(Box::new(conflicting)).await.unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists { .. }));

    let fetched = store.get(&entity.key()).await.unwrap().unwrap();
    assert_eq!(fetched.downcast_ref::<Topology>(), Some(&entity));
    store.cleanup().await.unwrap();
}

#[tokio::test]
async fn add_or_update_is_idempotent_and_overwrites() {
    let (_dir, store) = setup().await;
    let original = topology(1, "clickstream");

    store.add_or_update(Box::new(original.clone())).await.unwrap();
    store.add_or_update(Box::new(original.clone())).await.unwrap();
    assert_eq!(store.list("topologies").await.unwrap().len(), 1);

    let renamed = topology(1, "clickstream-v2");
    store.add_or_update(Box::new(renamed.clone())).await.unwrap();
    let fetched = store.get(&renamed.key()).await.unwrap().unwrap();
    assert_eq!(fetched.downcast_ref::<Topology>(), Some(&renamed));
    store.cleanup().await.unwrap();
}

#[tokio::test]
async fn find_filters_conjunctively_and_empty_filters_mean_list() {
    let (_dir, store) = setup().await;
    store.add(Box::new(parser(1, "json", 1))).await.unwrap();
    store.add(Box::new(parser(2, "json", 2))).await.unwrap();
    store.add(Box::new(parser(3, "avro", 2))).await.unwrap();

    let everything = store.find("parser_info", &[]).await.unwrap();
    assert_eq!(everything.len(), store.list("parser_info").await.unwrap().len());
    assert_eq!(everything.len(), 3);

    let v2 = store
        .find("parser_info", &[QueryParam::new("version", 2i64)])
        .await
        .unwrap();
    assert_eq!(v2.len(), 2);

    let json_v2 = store
        .find(
            "parser_info",
            &[
                QueryParam::new("version", 2i64),
                QueryParam::new("name", "json"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(json_v2.len(), 1);
    assert_eq!(
        json_v2[0].downcast_ref::<ParserInfo>().unwrap().id,
        2
    );

    // No match is an empty vector, never an error.
    let none = store
        .find("parser_info", &[QueryParam::new("version", 99i64)])
        .await
        .unwrap();
    assert!(none.is_empty());
    store.cleanup().await.unwrap();
}

#[tokio::test]
async fn list_of_empty_namespace_is_an_empty_vector() {
    let (_dir, store) = setup().await;
    assert!(store.list("streams").await.unwrap().is_empty());
    store.cleanup().await.unwrap();
}

#[tokio::test]
async fn next_id_is_strictly_increasing_and_positive() {
    let (_dir, store) = setup().await;
    let mut previous = 0;
    for _ in 0..100 {
        let id = store.next_id("topologies").await.unwrap();
        assert!(id > previous, "{id} not greater than {previous}");
        previous = id;
    }
    store.cleanup().await.unwrap();
}

#[tokio::test]
async fn next_id_survives_entity_deletion() {
    let (_dir, store) = setup().await;
    let first = store.next_id("topologies").await.unwrap();
    let entity = topology(first, "ephemeral");
    store.add(Box::new(entity.clone())).await.unwrap();
    store.remove(&entity.key()).await.unwrap();

    let second = store.next_id("topologies").await.unwrap();
    assert!(second > first);
    store.cleanup().await.unwrap();
}

#[tokio::test]
async fn next_id_rejects_non_incremental_namespace() {
    let (_dir, store) = setup().await;
    let err = store.next_id(FileResource::NAMESPACE).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::NonIncrementalColumn { ref namespace } if namespace == "files"
    ));
    store.cleanup().await.unwrap();
}

#[tokio::test]
async fn composite_key_namespace_round_trips() {
    let (_dir, store) = setup().await;
    store.add(Box::new(file("udf.jar", 1))).await.unwrap();
    store.add(Box::new(file("udf.jar", 2))).await.unwrap();

    // Same name, different version: distinct entities.
    assert_eq!(store.list("files").await.unwrap().len(), 2);
    let v2 = store.get(&file("udf.jar", 2).key()).await.unwrap().unwrap();
    assert_eq!(v2.downcast_ref::<FileResource>().unwrap().version, 2);

    let matched = store
        .find("files", &[QueryParam::new("name", "udf.jar")])
        .await
        .unwrap();
    assert_eq!(matched.len(), 2);
    store.cleanup().await.unwrap();
}

#[tokio::test]
async fn streams_namespace_round_trips() {
    let (_dir, store) = setup().await;
    let stream = StreamInfo {
        id: 1,
        topology_id: 42,
        stream_id: "clicks".to_string(),
        schema: r#"[{"name":"url","type":"STRING"}]"#.to_string(),
        timestamp_ms: 1_700_000_000_000,
    };
    store.add(Box::new(stream.clone())).await.unwrap();

    let by_topology = store
        .find("streams", &[QueryParam::new("topology_id", 42i64)])
        .await
        .unwrap();
    assert_eq!(by_topology.len(), 1);
    assert_eq!(by_topology[0].downcast_ref::<StreamInfo>(), Some(&stream));
    store.cleanup().await.unwrap();
}

#[tokio::test]
async fn statement_cache_reuses_one_connection_under_concurrency() {
    let (_dir, store) = setup_with(ExecutionConfig {
        statement_cache_size: Some(8),
        ..Default::default()
    })
    .await;
    let store = Arc::new(store);
    store.add(Box::new(topology(1, "shared"))).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store.get(&topology(1, "shared").key()).await.unwrap()
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().is_some());
    }

    // The add used two shapes (select-by-key, insert); all sixteen reads
    // reuse the select-by-key connection. Nothing else was opened.
    assert_eq!(store.executor().connections().open_count().await, 2);
    store.cleanup().await.unwrap();
    assert_eq!(store.executor().connections().open_count().await, 0);
}

#[tokio::test]
async fn statement_cache_capacity_eviction_closes_connections() {
    let (_dir, store) = setup_with(ExecutionConfig {
        statement_cache_size: Some(1),
        ..Default::default()
    })
    .await;

    store.list("topologies").await.unwrap();
    assert_eq!(store.executor().connections().open_count().await, 1);

    // A second shape evicts the first entry and closes its connection.
    store.list("streams").await.unwrap();
    assert_eq!(store.executor().connections().open_count().await, 1);
    store.cleanup().await.unwrap();
}

#[tokio::test]
async fn uncached_mode_leaves_no_connections_behind() {
    let (_dir, store) = setup_with(ExecutionConfig {
        statement_cache_size: None,
        ..Default::default()
    })
    .await;

    store.add(Box::new(topology(1, "a"))).await.unwrap();
    store.list("topologies").await.unwrap();
    store.next_id("topologies").await.unwrap();
    assert_eq!(store.executor().connections().open_count().await, 0);
    store.cleanup().await.unwrap();
}

#[tokio::test]
async fn cached_manager_reads_through_and_counts() {
    let (_dir, store) = setup().await;
    let manager =
        CacheBackedStorageManager::write_through(store, CacheConfig { capacity: 64 });

    let entity = topology(1, "hot");
    manager.add(Box::new(entity.clone())).await.unwrap();

    // add populated the cache, so this read is a hit.
    let cached = manager.get(&entity.key()).await.unwrap().unwrap();
    assert_eq!(cached.downcast_ref::<Topology>(), Some(&entity));
    let stats = manager.cache_stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 0);

    manager.cleanup().await.unwrap();
}

#[tokio::test]
async fn cached_manager_failed_write_leaves_cache_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("catalog.db");
    let source = SqliteConnectionSource::from_path(&db_path).unwrap();
    let mut conn = source.connect().await.unwrap();
    for ddl in SCHEMA {
        conn.execute(ddl, &[]).await.unwrap();
    }
    conn.close().await.unwrap();

    let executor = QueryExecutor::new(
        ExecutionConfig::default(),
        Arc::new(SqliteConnectionSource::from_path(&db_path).unwrap()),
        Arc::new(SqliteDialect::new()),
        Arc::new(storable_registry().unwrap()),
    );
    let manager = CacheBackedStorageManager::write_through(
        SqlStorageManager::new(executor),
        CacheConfig { capacity: 64 },
    );

    let entity = topology(1, "stable");
    manager.add_or_update(Box::new(entity.clone())).await.unwrap();

    // Break the backing store out from under the manager.
    let source = SqliteConnectionSource::from_path(&db_path).unwrap();
    let mut conn = source.connect().await.unwrap();
    conn.execute("DROP TABLE topologies", &[]).await.unwrap();
    conn.close().await.unwrap();

    let err = manager
        .add_or_update(Box::new(topology(1, "mutated")))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Database(_)));

    // The cache still serves the last successfully written state.
    let cached = manager.get(&entity.key()).await.unwrap().unwrap();
    assert_eq!(cached.downcast_ref::<Topology>(), Some(&entity));
    manager.cleanup().await.unwrap();
}

#[tokio::test]
async fn unknown_value_kind_in_filter_matches_nothing() {
    let (_dir, store) = setup().await;
    store.add(Box::new(topology(1, "t"))).await.unwrap();

    let matched = store
        .find("topologies", &[QueryParam::new("name", Value::Integer(1))])
        .await
        .unwrap();
    assert!(matched.is_empty());
    store.cleanup().await.unwrap();
}
