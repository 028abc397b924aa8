use crate::domain_tree::{flatten_domain_tree, rebuild_domain_tree, DomainRow};
use crate::errors::{StoreError, StoreResult};
use crate::layout::{normalize_layout, normalize_layout_value};
use crate::schema::{
    content_is_empty, delete_metadata, ensure_schema, read_metadata, upsert_metadata, META_LAYOUT,
    META_SNAPSHOT_VERSION, META_UPDATED_AT,
};
use crate::seed::initial_snapshot;
use crate::types::{GraphLayoutSnapshot, GraphSnapshotPayload, CURRENT_SNAPSHOT_VERSION};
use chrono::{SecondsFormat, Utc};
use rusqlite::backup::{Backup, Progress};
use rusqlite::{params, Connection, DatabaseName, Transaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Файл базы по умолчанию, относительно рабочего каталога
pub const DEFAULT_DATABASE_PATH: &str = "data/catalog.sqlite";

/// Параметры `SnapshotStore::initialize`
#[derive(Debug, Clone)]
pub struct InitializeOptions {
    pub database_path: Option<PathBuf>,
    /// Засеять пустую базу начальными данными
    pub seed_with_initial_data: bool,
    /// Данные для засева; `None` - встроенный каталог
    pub initial_data: Option<GraphSnapshotPayload>,
}

impl Default for InitializeOptions {
    fn default() -> Self {
        Self {
            database_path: None,
            seed_with_initial_data: true,
            initial_data: None,
        }
    }
}

impl InitializeOptions {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn without_seed(mut self) -> Self {
        self.seed_with_initial_data = false;
        self
    }

    pub fn with_initial_data(mut self, data: GraphSnapshotPayload) -> Self {
        self.initial_data = Some(data);
        self
    }
}

/// Значение, прочитанное из базы или подставленное по умолчанию
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<T> {
    Stored(T),
    Fallback(T),
}

impl<T> Resolved<T> {
    pub fn into_inner(self) -> T {
        match self {
            Resolved::Stored(value) | Resolved::Fallback(value) => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolved::Fallback(_))
    }
}

struct OpenDatabase {
    conn: Connection,
    path: PathBuf,
}

/// Хранилище снапшотов графа поверх встроенного SQLite
///
/// Рабочая база живёт в памяти, файл на диске - её полный образ,
/// перезаписываемый после каждой успешной записи и в конце `initialize`.
/// Внутренней синхронизации нет: вызывающий код сам сериализует доступ.
#[derive(Default)]
pub struct SnapshotStore {
    db: Option<OpenDatabase>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.db.is_some()
    }

    /// Путь активного файла базы, `None` если хранилище закрыто
    pub fn database_path(&self) -> Option<&Path> {
        self.db.as_ref().map(|db| db.path.as_path())
    }

    /// Открыть (или переоткрыть) хранилище
    ///
    /// Повреждённый файл не считается ошибкой: пишется предупреждение и
    /// создаётся пустая база. Непустая база никогда не засевается повторно.
    pub async fn initialize(&mut self, options: InitializeOptions) -> StoreResult<()> {
        let path = options
            .database_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let mut conn = open_database(&path)?;
        self.close();

        ensure_schema(&conn)?;

        if options.seed_with_initial_data {
            if content_is_empty(&conn)? {
                let seed = options.initial_data.unwrap_or_else(initial_snapshot);
                info!(
                    path = %path.display(),
                    domains = seed.domain_count(),
                    modules = seed.modules.len(),
                    artifacts = seed.artifacts.len(),
                    "Seeding empty snapshot store"
                );
                write_snapshot(&mut conn, &seed)?;
            } else {
                debug!(path = %path.display(), "Snapshot store already populated, skipping seed");
            }
        }

        flush_to_disk(&conn, &path)?;
        info!(path = %path.display(), "Snapshot store initialized");

        self.db = Some(OpenDatabase { conn, path });
        Ok(())
    }

    /// Прочитать полный снапшот
    pub fn load_snapshot(&self) -> StoreResult<GraphSnapshotPayload> {
        let db = self.db.as_ref().ok_or(StoreError::NotInitialized)?;
        let conn = &db.conn;

        let domain_rows = load_domain_rows(conn)?;
        let modules = load_records(conn, "modules", "module")?;
        let artifacts = load_records(conn, "artifacts", "artifact")?;

        let version = resolve_version(read_metadata(conn, META_SNAPSHOT_VERSION)?);
        let updated_at = read_metadata(conn, META_UPDATED_AT)?;
        let layout = read_metadata(conn, META_LAYOUT)?.and_then(|raw| parse_stored_layout(&raw));

        Ok(GraphSnapshotPayload {
            version: Some(version.into_inner()),
            exported_at: updated_at,
            domains: rebuild_domain_tree(domain_rows),
            modules,
            artifacts,
            layout,
        })
    }

    /// Полностью заменить содержимое хранилища снапшотом
    ///
    /// Всё, чего нет в `snapshot`, удаляется. При ошибке транзакции или
    /// записи файла база остаётся в прежнем состоянии.
    #[instrument(skip(self, snapshot), fields(modules = snapshot.modules.len(), artifacts = snapshot.artifacts.len()))]
    pub fn persist_snapshot(&mut self, snapshot: &GraphSnapshotPayload) -> StoreResult<()> {
        let db = self.db.as_mut().ok_or(StoreError::NotInitialized)?;

        let on_disk = copy_in_memory(&db.conn)?;
        write_snapshot(&mut db.conn, snapshot)?;

        if let Err(err) = flush_to_disk(&db.conn, &db.path) {
            // Память должна совпадать с файлом, иначе после рестарта данные "откатятся"
            warn!(path = %db.path.display(), error = %err, "Flush failed, reverting in-memory database");
            db.conn = on_disk;
            return Err(err);
        }

        info!(domains = snapshot.domain_count(), "Snapshot persisted");
        Ok(())
    }

    /// Закрыть базу; повторный вызов ничего не делает
    pub fn close(&mut self) {
        if let Some(db) = self.db.take() {
            if let Err((_, err)) = db.conn.close() {
                warn!(path = %db.path.display(), error = %err, "Failed to close database cleanly");
            }
            debug!(path = %db.path.display(), "Snapshot store closed");
        }
    }
}

/// Структурная проверка входящего JSON: объект с массивами
/// `domains`, `modules` и `artifacts`
pub fn is_valid_snapshot_shape(value: &Value) -> bool {
    value.as_object().is_some_and(|object| {
        ["domains", "modules", "artifacts"]
            .iter()
            .all(|key| object.get(*key).is_some_and(Value::is_array))
    })
}

fn open_database(path: &Path) -> StoreResult<Connection> {
    let mut conn = Connection::open_in_memory().map_err(StoreError::EngineLoad)?;

    if path.exists() {
        match restore_from_file(&mut conn, path) {
            Ok(()) => {
                debug!(path = %path.display(), "Loaded database image from disk");
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "Database file is unreadable, starting with an empty database"
                );
                conn = Connection::open_in_memory().map_err(StoreError::EngineLoad)?;
            }
        }
    }

    Ok(conn)
}

fn restore_from_file(conn: &mut Connection, path: &Path) -> rusqlite::Result<()> {
    conn.restore(DatabaseName::Main, path, None::<fn(Progress)>)?;

    let check: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
    if check != "ok" {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CORRUPT),
            Some(check),
        ));
    }
    Ok(())
}

/// Записать полный образ базы: сначала во временный файл, затем rename
fn flush_to_disk(conn: &Connection, path: &Path) -> StoreResult<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let io_error = |source| StoreError::Io {
        path: tmp_path.clone(),
        source,
    };

    if tmp_path.exists() {
        std::fs::remove_file(&tmp_path).map_err(io_error)?;
    }

    let written = conn
        .backup(DatabaseName::Main, &tmp_path, None)
        .map_err(|source| StoreError::Flush {
            path: path.to_path_buf(),
            source,
        })
        .and_then(|()| {
            std::fs::rename(&tmp_path, path).map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        });

    if let Err(err) = written {
        if tmp_path.exists() {
            if let Err(cleanup) = std::fs::remove_file(&tmp_path) {
                warn!(path = %tmp_path.display(), error = %cleanup, "Failed to remove temporary image");
            }
        }
        return Err(err);
    }

    debug!(path = %path.display(), "Database flushed to disk");
    Ok(())
}

/// Копия базы в новом in-memory соединении
fn copy_in_memory(conn: &Connection) -> StoreResult<Connection> {
    let mut copy = Connection::open_in_memory().map_err(StoreError::EngineLoad)?;
    {
        let backup = Backup::new(conn, &mut copy)?;
        backup.run_to_completion(-1, Duration::ZERO, None)?;
    }
    ensure_schema(&copy)?;
    Ok(copy)
}

fn write_snapshot(conn: &mut Connection, snapshot: &GraphSnapshotPayload) -> StoreResult<()> {
    let tx = conn.transaction().map_err(StoreError::Transaction)?;

    match replace_contents(&tx, snapshot) {
        Ok(()) => tx.commit().map_err(StoreError::Transaction),
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                warn!(error = %rollback_err, "Rollback after failed snapshot write also failed");
            }
            Err(StoreError::Transaction(err))
        }
    }
}

fn replace_contents(tx: &Transaction<'_>, snapshot: &GraphSnapshotPayload) -> rusqlite::Result<()> {
    tx.execute_batch(
        "DELETE FROM domains;
         DELETE FROM modules;
         DELETE FROM artifacts;",
    )?;

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO domains (id, name, description, parent_id, position)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for row in flatten_domain_tree(&snapshot.domains) {
            stmt.execute(params![
                row.id,
                row.name,
                row.description,
                row.parent_id,
                row.position
            ])?;
        }
    }

    insert_records(
        tx,
        "modules",
        snapshot.modules.iter().map(|m| (m.id.as_str(), m)),
    )?;
    insert_records(
        tx,
        "artifacts",
        snapshot.artifacts.iter().map(|a| (a.id.as_str(), a)),
    )?;

    match normalize_layout(snapshot.layout.as_ref()) {
        Some(layout) => upsert_metadata(tx, META_LAYOUT, &to_json(&layout)?)?,
        None => delete_metadata(tx, META_LAYOUT)?,
    }

    let version = snapshot.version.unwrap_or(CURRENT_SNAPSHOT_VERSION);
    upsert_metadata(tx, META_SNAPSHOT_VERSION, &version.to_string())?;

    let updated_at = snapshot.exported_at.clone().unwrap_or_else(now_timestamp);
    upsert_metadata(tx, META_UPDATED_AT, &updated_at)?;

    Ok(())
}

fn insert_records<'a, T>(
    tx: &Transaction<'_>,
    table: &str,
    records: impl Iterator<Item = (&'a str, &'a T)>,
) -> rusqlite::Result<()>
where
    T: Serialize + 'a,
{
    let mut stmt = tx.prepare_cached(&format!(
        "INSERT INTO {table} (id, position, data) VALUES (?1, ?2, ?3)"
    ))?;

    for (position, (id, record)) in records.enumerate() {
        stmt.execute(params![id, position as i64, to_json(record)?])?;
    }
    Ok(())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> rusqlite::Result<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn load_domain_rows(conn: &Connection) -> StoreResult<Vec<DomainRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, parent_id, position
         FROM domains
         ORDER BY parent_id IS NOT NULL, parent_id, position",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(DomainRow {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                parent_id: row.get(3)?,
                position: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn load_records<T: DeserializeOwned>(
    conn: &Connection,
    table: &str,
    kind: &'static str,
) -> StoreResult<Vec<T>> {
    let mut stmt = conn.prepare(&format!("SELECT id, data FROM {table} ORDER BY position"))?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (id, data) = row?;
        let record =
            serde_json::from_str(&data).map_err(|source| StoreError::Decode { kind, id, source })?;
        records.push(record);
    }
    Ok(records)
}

fn resolve_version(raw: Option<String>) -> Resolved<i64> {
    match raw.as_deref().map(str::trim).and_then(|s| s.parse().ok()) {
        Some(version) => Resolved::Stored(version),
        None => {
            debug!(stored = ?raw, "Snapshot version missing or invalid, using current");
            Resolved::Fallback(CURRENT_SNAPSHOT_VERSION)
        }
    }
}

fn parse_stored_layout(raw: &str) -> Option<GraphLayoutSnapshot> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => normalize_layout_value(&value),
        Err(err) => {
            warn!(error = %err, "Ignoring malformed persisted layout");
            None
        }
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
