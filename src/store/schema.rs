// src/store/schema.rs
//! Catalog store schema.

use crate::constants::STORE_BUSY_TIMEOUT;
use crate::error::StorageError;
use rusqlite::{Connection, OptionalExtension};

/// Idempotent DDL for the catalog tables.
///
/// Related resources hang off several kinds of parent, so their parent link
/// is a `(parent_kind, parent_id)` pair without a foreign key.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS courses (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    cover_url TEXT,
    thumbnail_url TEXT,
    trailer_url TEXT,
    is_free INTEGER,
    is_coming_soon INTEGER NOT NULL DEFAULT 0,
    order_index INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS chapters (
    id TEXT PRIMARY KEY,
    course_id TEXT NOT NULL REFERENCES courses(id),
    title TEXT NOT NULL,
    order_index INTEGER NOT NULL,
    subchapter_count INTEGER NOT NULL,
    is_coming_soon INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS subchapters (
    id TEXT PRIMARY KEY,
    chapter_id TEXT NOT NULL REFERENCES chapters(id),
    title TEXT NOT NULL,
    slug TEXT NOT NULL,
    content_type TEXT NOT NULL,
    order_index INTEGER NOT NULL,
    duration TEXT,
    is_free INTEGER,
    thumbnail_url TEXT,
    video_ids TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS videos (
    id TEXT PRIMARY KEY,
    subchapter_id TEXT NOT NULL REFERENCES subchapters(id),
    title TEXT NOT NULL,
    duration TEXT,
    media_kind TEXT NOT NULL,
    media_value TEXT NOT NULL,
    description TEXT,
    thumbnail_url TEXT,
    is_free INTEGER,
    is_drm_protected INTEGER,
    order_index INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS related_resources (
    resource_type TEXT NOT NULL,
    id TEXT NOT NULL,
    parent_kind TEXT NOT NULL,
    parent_id TEXT NOT NULL,
    order_index INTEGER NOT NULL,
    payload TEXT NOT NULL,
    PRIMARY KEY (resource_type, id)
);

-- A lecturer record is stored once; every video that lists it gets a link.
CREATE TABLE IF NOT EXISTS video_lecturers (
    video_id TEXT NOT NULL REFERENCES videos(id),
    lecturer_id TEXT NOT NULL,
    order_index INTEGER NOT NULL,
    PRIMARY KEY (video_id, lecturer_id)
);

CREATE INDEX IF NOT EXISTS idx_chapters_course ON chapters (course_id, order_index);
CREATE INDEX IF NOT EXISTS idx_subchapters_chapter ON subchapters (chapter_id, order_index);
CREATE INDEX IF NOT EXISTS idx_videos_subchapter ON videos (subchapter_id, order_index);
CREATE INDEX IF NOT EXISTS idx_related_parent ON related_resources (parent_kind, parent_id, order_index);
CREATE INDEX IF NOT EXISTS idx_video_lecturers_lecturer ON video_lecturers (lecturer_id);
";

pub const TABLES: [&str; 6] = [
    "courses",
    "chapters",
    "subchapters",
    "videos",
    "related_resources",
    "video_lecturers",
];

/// Per-connection settings. Foreign keys are off by default in SQLite.
pub fn configure(conn: &Connection) -> Result<(), StorageError> {
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(STORE_BUSY_TIMEOUT)?;
    Ok(())
}

/// Creates any missing table or index.
pub fn ensure_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(CREATE_TABLES)?;
    Ok(())
}

/// Fails with `MissingSchema` naming the first absent table.
pub fn verify_schema(conn: &Connection) -> Result<(), StorageError> {
    for table in TABLES {
        let found: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .optional()?;
        if found.is_none() {
            return Err(StorageError::MissingSchema {
                table: table.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        verify_schema(&conn).unwrap();
    }

    #[test]
    fn verify_names_the_missing_table() {
        let conn = Connection::open_in_memory().unwrap();
        match verify_schema(&conn) {
            Err(StorageError::MissingSchema { table }) => assert_eq!(table, "courses"),
            other => panic!("expected MissingSchema, got {:?}", other),
        }
    }
}
