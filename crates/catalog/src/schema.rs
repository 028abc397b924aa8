use rusqlite::{params, Connection, OptionalExtension};

/// Ключ метаданных: версия формата снапшота
pub const META_SNAPSHOT_VERSION: &str = "snapshotVersion";
/// Ключ метаданных: время последней записи
pub const META_UPDATED_AT: &str = "updatedAt";
/// Ключ метаданных: сериализованная раскладка графа
pub const META_LAYOUT: &str = "layout";

const SCHEMA_SQL: &str = r#"
    -- Произвольные пары ключ-значение
    CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value TEXT
    );

    -- Дерево доменов, порядок братьев хранится в position
    CREATE TABLE IF NOT EXISTS domains (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        parent_id TEXT REFERENCES domains(id) ON DELETE CASCADE,
        position INTEGER NOT NULL
    );

    -- Модули и артефакты хранятся непрозрачным JSON
    CREATE TABLE IF NOT EXISTS modules (
        id TEXT PRIMARY KEY,
        position INTEGER NOT NULL,
        data TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS artifacts (
        id TEXT PRIMARY KEY,
        position INTEGER NOT NULL,
        data TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_domains_parent ON domains(parent_id, position);
    CREATE INDEX IF NOT EXISTS idx_modules_position ON modules(position);
    CREATE INDEX IF NOT EXISTS idx_artifacts_position ON artifacts(position);
"#;

/// Создать таблицы, если их ещё нет
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA_SQL)
}

pub fn read_metadata(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM metadata WHERE key = ?1",
        params![key],
        |row| row.get::<_, Option<String>>(0),
    )
    .optional()
    .map(Option::flatten)
}

pub fn upsert_metadata(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn delete_metadata(conn: &Connection, key: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM metadata WHERE key = ?1", params![key])?;
    Ok(())
}

/// Все три таблицы с содержимым пусты
pub fn content_is_empty(conn: &Connection) -> rusqlite::Result<bool> {
    for table in ["domains", "modules", "artifacts"] {
        let has_rows: bool = conn.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {table})"),
            [],
            |row| row.get(0),
        )?;
        if has_rows {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        ensure_schema(&conn).expect("schema");
        conn
    }

    #[test]
    fn test_ensure_schema_is_repeatable() {
        let conn = memory_db();
        ensure_schema(&conn).expect("second schema pass");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .expect("prepare")
            .query_map([], |row| row.get(0))
            .expect("query")
            .collect::<Result<_, _>>()
            .expect("collect");
        assert_eq!(tables, vec!["artifacts", "domains", "metadata", "modules"]);
    }

    #[test]
    fn test_metadata_upsert_and_delete() {
        let conn = memory_db();
        assert_eq!(read_metadata(&conn, META_LAYOUT).expect("read"), None);

        upsert_metadata(&conn, META_SNAPSHOT_VERSION, "1").expect("insert");
        upsert_metadata(&conn, META_SNAPSHOT_VERSION, "2").expect("update");
        assert_eq!(
            read_metadata(&conn, META_SNAPSHOT_VERSION).expect("read"),
            Some("2".to_string())
        );

        delete_metadata(&conn, META_SNAPSHOT_VERSION).expect("delete");
        assert_eq!(read_metadata(&conn, META_SNAPSHOT_VERSION).expect("read"), None);
    }

    #[test]
    fn test_content_is_empty_ignores_metadata() {
        let conn = memory_db();
        upsert_metadata(&conn, META_UPDATED_AT, "2024-01-01T00:00:00Z").expect("insert");
        assert!(content_is_empty(&conn).expect("check"));

        conn.execute(
            "INSERT INTO artifacts (id, position, data) VALUES ('a', 0, '{}')",
            [],
        )
        .expect("insert artifact");
        assert!(!content_is_empty(&conn).expect("check"));
    }

    #[test]
    fn test_deleting_parent_cascades() {
        let conn = memory_db();
        conn.execute_batch(
            "INSERT INTO domains (id, name, parent_id, position) VALUES ('root', 'Root', NULL, 0);
             INSERT INTO domains (id, name, parent_id, position) VALUES ('child', 'Child', 'root', 0);",
        )
        .expect("insert domains");

        conn.execute("DELETE FROM domains WHERE id = 'root'", [])
            .expect("delete root");
        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM domains", [], |row| row.get(0))
            .expect("count");
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_dangling_parent_is_rejected() {
        let conn = memory_db();
        let result = conn.execute(
            "INSERT INTO domains (id, name, parent_id, position) VALUES ('x', 'X', 'nope', 0)",
            [],
        );
        assert!(result.is_err());
    }
}
