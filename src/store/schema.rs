//! Schema creation and versioning.

use rusqlite::Connection;

use super::{StoreError, StoreResult};

pub fn ensure_schema(conn: &Connection, expected_version: i64) -> StoreResult<()> {
    let on_disk: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    if on_disk == 0 {
        create_schema(conn)?;
        conn.pragma_update(None, "user_version", expected_version)?;
        return Ok(());
    }

    if on_disk != expected_version {
        return Err(StoreError::SchemaVersionMismatch {
            on_disk,
            expected: expected_version,
        });
    }

    Ok(())
}

fn create_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS nodes (
            id TEXT PRIMARY KEY,
            type TEXT NOT NULL,
            name TEXT NOT NULL,
            package TEXT NOT NULL,
            file_path TEXT NOT NULL,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            exported INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            snippet TEXT NOT NULL,
            props TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_nodes_name ON nodes(name);
        CREATE INDEX IF NOT EXISTS idx_nodes_file_path ON nodes(file_path);
        CREATE INDEX IF NOT EXISTS idx_nodes_type_name ON nodes(type, name);

        CREATE TABLE IF NOT EXISTS edges (
            source TEXT NOT NULL,
            target TEXT NOT NULL,
            type TEXT NOT NULL,
            meta TEXT NOT NULL,
            PRIMARY KEY (source, target, type)
        );
        CREATE INDEX IF NOT EXISTS idx_edges_source_type ON edges(source, type);
        CREATE INDEX IF NOT EXISTS idx_edges_target_type ON edges(target, type);
        ",
    )?;
    Ok(())
}
