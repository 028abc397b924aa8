use catalog::{
    initial_snapshot, ArtifactNode, DomainNode, GraphLayoutSnapshot, GraphSnapshotPayload,
    InitializeOptions, LayoutPosition, ModuleNode, SnapshotStore, StoreError,
    CURRENT_SNAPSHOT_VERSION,
};
use rusqlite::Connection;
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

async fn open_store(path: &Path) -> SnapshotStore {
    let mut store = SnapshotStore::new();
    store
        .initialize(InitializeOptions::at_path(path).without_seed())
        .await
        .expect("failed to initialize store");
    store
}

fn sample_snapshot() -> GraphSnapshotPayload {
    let billing = ModuleNode::new("billing", "Billing")
        .with_field("description", "Invoices and receipts")
        .with_field("domains", json!(["finance"]))
        .with_field("lifecycle", json!({"stage": "ga", "since": 2021}));

    let ledger = ModuleNode::new("ledger", "Ledger").with_field("produces", json!(["journal"]));

    let journal = ArtifactNode::new("journal", "Journal")
        .with_field("producerId", "ledger")
        .with_field("consumerIds", json!(["billing"]));

    GraphSnapshotPayload::new(
        vec![
            DomainNode::new("finance", "Finance")
                .with_description("Money")
                .with_children(vec![DomainNode::new("tax", "Tax")]),
            DomainNode::new("hr", "HR"),
        ],
        vec![billing, ledger],
        vec![journal],
    )
}

#[tokio::test]
async fn test_round_trip_identity() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut store = open_store(&temp_dir.path().join("graph.sqlite")).await;

    let mut layout = GraphLayoutSnapshot::new();
    layout.insert("billing".to_string(), LayoutPosition::new(10.0, -4.5));
    layout.insert("finance".to_string(), LayoutPosition::pinned(1.0, 2.0, 3.0, 4.0));
    let snapshot = sample_snapshot().with_layout(layout);

    store.persist_snapshot(&snapshot).expect("persist failed");
    let loaded = store.load_snapshot().expect("load failed");

    assert_eq!(loaded.domains, snapshot.domains);
    assert_eq!(loaded.modules, snapshot.modules);
    assert_eq!(loaded.artifacts, snapshot.artifacts);
    assert_eq!(loaded.layout, snapshot.layout);

    // Версия и время подставляются по умолчанию
    assert_eq!(loaded.version, Some(CURRENT_SNAPSHOT_VERSION));
    assert!(loaded.exported_at.is_some());
}

#[tokio::test]
async fn test_explicit_version_and_timestamp_are_kept() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut store = open_store(&temp_dir.path().join("graph.sqlite")).await;

    let mut snapshot = sample_snapshot();
    snapshot.version = Some(7);
    snapshot.exported_at = Some("2024-03-01T12:00:00.000Z".to_string());

    store.persist_snapshot(&snapshot).expect("persist failed");
    let loaded = store.load_snapshot().expect("load failed");

    assert_eq!(loaded, snapshot);
}

#[tokio::test]
async fn test_seed_once() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let db_path = temp_dir.path().join("seeded.sqlite");

    let mut store = SnapshotStore::new();
    store
        .initialize(InitializeOptions::at_path(&db_path))
        .await
        .expect("first initialize failed");
    let first = store.load_snapshot().expect("load failed");
    store.close();

    // Второй запуск с другим набором не должен ничего менять
    let mut other = GraphSnapshotPayload::new(
        vec![DomainNode::new("other", "Other")],
        vec![ModuleNode::new("other-module", "Other module")],
        vec![],
    );
    other.version = Some(99);

    store
        .initialize(InitializeOptions::at_path(&db_path).with_initial_data(other))
        .await
        .expect("second initialize failed");
    let second = store.load_snapshot().expect("load failed");

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_empty_store_gets_initial_dataset() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let db_path = temp_dir.path().join("nested").join("dir").join("catalog.sqlite");

    let mut store = SnapshotStore::new();
    store
        .initialize(InitializeOptions::at_path(&db_path))
        .await
        .expect("initialize failed");

    let seed = initial_snapshot();
    let loaded = store.load_snapshot().expect("load failed");

    assert_eq!(loaded.modules.len(), seed.modules.len());
    assert_eq!(loaded.artifacts.len(), seed.artifacts.len());
    assert_eq!(loaded.domain_count(), seed.domain_count());
    assert_eq!(loaded.domains, seed.domains);
    assert!(db_path.exists());
}

#[tokio::test]
async fn test_custom_seed_is_used() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let custom = sample_snapshot();

    let mut store = SnapshotStore::new();
    store
        .initialize(
            InitializeOptions::at_path(temp_dir.path().join("custom.sqlite"))
                .with_initial_data(custom.clone()),
        )
        .await
        .expect("initialize failed");

    let loaded = store.load_snapshot().expect("load failed");
    assert_eq!(loaded.modules, custom.modules);
    assert_eq!(loaded.domains, custom.domains);
}

#[tokio::test]
async fn test_without_seed_starts_empty() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let store = open_store(&temp_dir.path().join("empty.sqlite")).await;

    let loaded = store.load_snapshot().expect("load failed");
    assert!(loaded.domains.is_empty());
    assert!(loaded.modules.is_empty());
    assert!(loaded.artifacts.is_empty());
    assert_eq!(loaded.layout, None);
    assert_eq!(loaded.exported_at, None);
    assert_eq!(loaded.version, Some(CURRENT_SNAPSHOT_VERSION));
}

#[tokio::test]
async fn test_layout_sanitization_on_persist() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut store = open_store(&temp_dir.path().join("layout.sqlite")).await;

    let mut layout = GraphLayoutSnapshot::new();
    layout.insert(
        "valid".to_string(),
        LayoutPosition {
            x: 1.0,
            y: 2.0,
            fx: Some(f64::NAN),
            fy: Some(3.0),
        },
    );
    layout.insert("invalidNumbers".to_string(), LayoutPosition::new(f64::NAN, 5.0));
    layout.insert(
        "withInfinity".to_string(),
        LayoutPosition {
            x: 3.0,
            y: 4.0,
            fx: Some(6.0),
            fy: Some(f64::INFINITY),
        },
    );

    store
        .persist_snapshot(&sample_snapshot().with_layout(layout))
        .expect("persist failed");
    let loaded = store.load_snapshot().expect("load failed").layout.expect("layout kept");

    let mut expected = GraphLayoutSnapshot::new();
    expected.insert(
        "valid".to_string(),
        LayoutPosition {
            x: 1.0,
            y: 2.0,
            fx: None,
            fy: Some(3.0),
        },
    );
    expected.insert(
        "withInfinity".to_string(),
        LayoutPosition {
            x: 3.0,
            y: 4.0,
            fx: Some(6.0),
            fy: None,
        },
    );
    assert_eq!(loaded, expected);
}

#[tokio::test]
async fn test_layout_is_removed_when_absent() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut store = open_store(&temp_dir.path().join("layout.sqlite")).await;

    let mut layout = GraphLayoutSnapshot::new();
    layout.insert("billing".to_string(), LayoutPosition::new(0.0, 0.0));
    store
        .persist_snapshot(&sample_snapshot().with_layout(layout))
        .expect("persist failed");

    store
        .persist_snapshot(&sample_snapshot())
        .expect("second persist failed");
    assert_eq!(store.load_snapshot().expect("load failed").layout, None);

    // Раскладка целиком из мусора тоже означает "нет раскладки"
    let mut junk = GraphLayoutSnapshot::new();
    junk.insert("billing".to_string(), LayoutPosition::new(f64::NAN, f64::NAN));
    store
        .persist_snapshot(&sample_snapshot().with_layout(junk))
        .expect("third persist failed");
    assert_eq!(store.load_snapshot().expect("load failed").layout, None);
}

#[tokio::test]
async fn test_nested_domains_round_trip() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut store = open_store(&temp_dir.path().join("domains.sqlite")).await;

    let snapshot = GraphSnapshotPayload::new(
        vec![DomainNode::new("root", "Root Domain")
            .with_children(vec![DomainNode::new("child", "Child Domain")])],
        vec![],
        vec![],
    );
    store.persist_snapshot(&snapshot).expect("persist failed");

    let loaded = store.load_snapshot().expect("load failed");
    assert_eq!(loaded.domains.len(), 1);
    assert_eq!(loaded.domains[0].name, "Root Domain");
    assert_eq!(loaded.domains[0].children.len(), 1);
    assert_eq!(loaded.domains[0].children[0].id, "child");
    assert_eq!(loaded.domains[0].children[0].name, "Child Domain");

    let json = serde_json::to_value(&loaded.domains[0].children[0]).expect("serialize");
    assert!(json.get("children").is_none());
}

#[tokio::test]
async fn test_sibling_and_record_order_survive() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut store = open_store(&temp_dir.path().join("order.sqlite")).await;

    let names = ["zeta", "alpha", "mu", "beta", "omega"];
    let snapshot = GraphSnapshotPayload::new(
        vec![DomainNode::new("root", "Root").with_children(
            names.iter().map(|n| DomainNode::new(*n, *n)).collect(),
        )],
        names.iter().map(|n| ModuleNode::new(*n, *n)).collect(),
        names.iter().map(|n| ArtifactNode::new(*n, *n)).collect(),
    );
    store.persist_snapshot(&snapshot).expect("persist failed");

    let loaded = store.load_snapshot().expect("load failed");
    let child_ids: Vec<&str> = loaded.domains[0].children.iter().map(|d| d.id.as_str()).collect();
    let module_ids: Vec<&str> = loaded.modules.iter().map(|m| m.id.as_str()).collect();
    let artifact_ids: Vec<&str> = loaded.artifacts.iter().map(|a| a.id.as_str()).collect();

    assert_eq!(child_ids, names);
    assert_eq!(module_ids, names);
    assert_eq!(artifact_ids, names);
}

#[tokio::test]
async fn test_full_replace_removes_missing_content() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut store = open_store(&temp_dir.path().join("replace.sqlite")).await;

    store.persist_snapshot(&sample_snapshot()).expect("persist failed");

    let smaller = GraphSnapshotPayload::new(
        vec![DomainNode::new("hr", "HR")],
        vec![ModuleNode::new("ledger", "Ledger")],
        vec![],
    );
    store.persist_snapshot(&smaller).expect("persist failed");

    let loaded = store.load_snapshot().expect("load failed");
    assert_eq!(loaded.domains, smaller.domains);
    assert_eq!(loaded.modules, smaller.modules);
    assert!(loaded.artifacts.is_empty());
}

#[tokio::test]
async fn test_failed_write_is_atomic() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let db_path = temp_dir.path().join("atomic.sqlite");
    let mut store = open_store(&db_path).await;

    let before = sample_snapshot();
    store.persist_snapshot(&before).expect("persist failed");
    let stored_before = store.load_snapshot().expect("load failed");

    // Дубликат id модуля нарушает PRIMARY KEY посреди транзакции
    let broken = GraphSnapshotPayload::new(
        vec![DomainNode::new("new-domain", "New")],
        vec![
            ModuleNode::new("dup", "First"),
            ModuleNode::new("dup", "Second"),
        ],
        vec![ArtifactNode::new("new-artifact", "New")],
    );
    let result = store.persist_snapshot(&broken);
    assert!(matches!(result, Err(StoreError::Transaction(_))));

    assert_eq!(store.load_snapshot().expect("load failed"), stored_before);

    // Файл на диске тоже не изменился
    store.close();
    let reopened = open_store(&db_path).await;
    assert_eq!(reopened.load_snapshot().expect("load failed"), stored_before);
}

#[tokio::test]
async fn test_duplicate_domain_id_is_rejected() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut store = open_store(&temp_dir.path().join("dup-domain.sqlite")).await;
    store.persist_snapshot(&sample_snapshot()).expect("persist failed");

    let broken = GraphSnapshotPayload::new(
        vec![
            DomainNode::new("same", "One"),
            DomainNode::new("same", "Two"),
        ],
        vec![],
        vec![],
    );
    assert!(store.persist_snapshot(&broken).is_err());
    assert_eq!(
        store.load_snapshot().expect("load failed").modules,
        sample_snapshot().modules
    );
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let db_path = temp_dir.path().join("durable.sqlite");

    let mut store = open_store(&db_path).await;
    store.persist_snapshot(&sample_snapshot()).expect("persist failed");
    let written = store.load_snapshot().expect("load failed");
    store.close();

    let mut fresh = SnapshotStore::new();
    fresh
        .initialize(InitializeOptions::at_path(&db_path))
        .await
        .expect("initialize failed");
    assert_eq!(fresh.load_snapshot().expect("load failed"), written);
}

#[tokio::test]
async fn test_reinitialize_replaces_handle() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let first_path = temp_dir.path().join("first.sqlite");
    let second_path = temp_dir.path().join("second.sqlite");

    let mut store = open_store(&first_path).await;
    store.persist_snapshot(&sample_snapshot()).expect("persist failed");

    store
        .initialize(InitializeOptions::at_path(&second_path).without_seed())
        .await
        .expect("re-initialize failed");
    assert_eq!(store.database_path(), Some(second_path.as_path()));
    assert!(store.load_snapshot().expect("load failed").modules.is_empty());
}

#[tokio::test]
async fn test_close_is_idempotent_and_blocks_access() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut store = open_store(&temp_dir.path().join("close.sqlite")).await;

    store.close();
    store.close();

    assert!(!store.is_open());
    assert_eq!(store.database_path(), None);
    assert!(matches!(store.load_snapshot(), Err(StoreError::NotInitialized)));
    assert!(matches!(
        store.persist_snapshot(&sample_snapshot()),
        Err(StoreError::NotInitialized)
    ));
}

#[tokio::test]
async fn test_corrupt_file_falls_back_to_fresh_database() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let db_path = temp_dir.path().join("corrupt.sqlite");
    std::fs::write(&db_path, b"definitely not a sqlite database, just some bytes")
        .expect("failed to write junk file");

    let mut store = SnapshotStore::new();
    store
        .initialize(InitializeOptions::at_path(&db_path))
        .await
        .expect("initialize should recover");

    let loaded = store.load_snapshot().expect("load failed");
    assert_eq!(loaded.modules.len(), initial_snapshot().modules.len());

    // Образ перезаписан валидной базой
    store.close();
    let reopened = open_store(&db_path).await;
    assert_eq!(
        reopened.load_snapshot().expect("load failed").modules.len(),
        initial_snapshot().modules.len()
    );
}

#[tokio::test]
async fn test_malformed_persisted_layout_is_ignored() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let db_path = temp_dir.path().join("bad-layout.sqlite");

    let mut store = open_store(&db_path).await;
    store.persist_snapshot(&sample_snapshot()).expect("persist failed");
    store.close();

    {
        let conn = Connection::open(&db_path).expect("open file");
        conn.execute(
            "INSERT INTO metadata (key, value) VALUES ('layout', '{broken')
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [],
        )
        .expect("corrupt layout");
        conn.execute(
            "UPDATE metadata SET value = 'not-a-number' WHERE key = 'snapshotVersion'",
            [],
        )
        .expect("corrupt version");
    }

    let store = open_store(&db_path).await;
    let loaded = store.load_snapshot().expect("load should not fail");
    assert_eq!(loaded.layout, None);
    assert_eq!(loaded.version, Some(CURRENT_SNAPSHOT_VERSION));
    assert_eq!(loaded.modules, sample_snapshot().modules);
}

#[tokio::test]
async fn test_undecodable_record_is_an_error() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let db_path = temp_dir.path().join("bad-record.sqlite");

    let mut store = open_store(&db_path).await;
    store.persist_snapshot(&sample_snapshot()).expect("persist failed");
    store.close();

    {
        let conn = Connection::open(&db_path).expect("open file");
        conn.execute("UPDATE modules SET data = '[1, 2' WHERE id = 'ledger'", [])
            .expect("corrupt module");
    }

    let store = open_store(&db_path).await;
    match store.load_snapshot() {
        Err(StoreError::Decode { kind, id, .. }) => {
            assert_eq!(kind, "module");
            assert_eq!(id, "ledger");
        }
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_flush_keeps_memory_in_sync_with_disk() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let db_path = temp_dir.path().join("graph.sqlite");
    let tmp_path = temp_dir.path().join("graph.sqlite.tmp");

    let mut store = open_store(&db_path).await;
    let before = sample_snapshot();
    store.persist_snapshot(&before).expect("persist failed");

    // Файл базы подменён непустым каталогом: rename поверх него невозможен
    std::fs::remove_file(&db_path).expect("remove db file");
    std::fs::create_dir(&db_path).expect("create dir in place of db");
    std::fs::write(db_path.join("keep"), b"x").expect("fill dir");

    let replacement = GraphSnapshotPayload::new(
        vec![DomainNode::new("ops", "Ops")],
        vec![ModuleNode::new("pager", "Pager")],
        Vec::new(),
    );
    let err = store
        .persist_snapshot(&replacement)
        .expect_err("flush into a directory must fail");
    assert!(matches!(err, StoreError::Io { .. }), "unexpected error: {err:?}");
    assert!(!tmp_path.exists(), "temporary image must be cleaned up");

    let loaded = store.load_snapshot().expect("load failed");
    assert_eq!(loaded.domains, before.domains);
    assert_eq!(loaded.modules, before.modules);
    assert_eq!(loaded.artifacts, before.artifacts);

    // После отката соединение рабочее, следующая запись проходит
    std::fs::remove_dir_all(&db_path).expect("remove dir");
    store.persist_snapshot(&replacement).expect("persist after recovery");
    store.close();

    let reopened = open_store(&db_path).await;
    let loaded = reopened.load_snapshot().expect("load failed");
    assert_eq!(loaded.modules, replacement.modules);
    assert_eq!(loaded.domains, replacement.domains);
}
