// src/store/sqlite.rs
//! SQLite-backed catalog store.
//!
//! Uses a single `Mutex<Connection>`; every call runs on the blocking pool,
//! so batch commits are serialized and async workers never block on disk.

use super::{schema, CatalogStore};
use crate::constants::STORE_BUSY_RETRY_DELAY;
use crate::error::StorageError;
use crate::model::{
    Chapter, Course, Entity, MediaReference, RelatedResource, ResourceType, Subchapter, Video,
};
use crate::types::{EntityKind, ResourceId};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row, Transaction};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

// The first parent to claim a shared record keeps it. A conflicting write
// from any other parent is ignored as a whole, position included, so repeated
// runs converge on one state whichever parent wins the claim.
const UPSERT_COURSE: &str = r"
INSERT INTO courses (id, slug, title, description, cover_url, thumbnail_url, trailer_url,
                     is_free, is_coming_soon, order_index)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT(id) DO UPDATE SET
    slug = excluded.slug,
    title = excluded.title,
    description = excluded.description,
    cover_url = excluded.cover_url,
    thumbnail_url = excluded.thumbnail_url,
    trailer_url = excluded.trailer_url,
    is_free = excluded.is_free,
    is_coming_soon = excluded.is_coming_soon,
    order_index = excluded.order_index";

const UPSERT_CHAPTER: &str = r"
INSERT INTO chapters (id, course_id, title, order_index, subchapter_count, is_coming_soon)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(id) DO UPDATE SET
    title = excluded.title,
    order_index = excluded.order_index,
    subchapter_count = excluded.subchapter_count,
    is_coming_soon = excluded.is_coming_soon
WHERE chapters.course_id = excluded.course_id";

const UPSERT_SUBCHAPTER: &str = r"
INSERT INTO subchapters (id, chapter_id, title, slug, content_type, order_index, duration,
                         is_free, thumbnail_url, video_ids)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT(id) DO UPDATE SET
    title = excluded.title,
    slug = excluded.slug,
    content_type = excluded.content_type,
    order_index = excluded.order_index,
    duration = excluded.duration,
    is_free = excluded.is_free,
    thumbnail_url = excluded.thumbnail_url,
    video_ids = excluded.video_ids
WHERE subchapters.chapter_id = excluded.chapter_id";

const UPSERT_VIDEO: &str = r"
INSERT INTO videos (id, subchapter_id, title, duration, media_kind, media_value, description,
                    thumbnail_url, is_free, is_drm_protected, order_index)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
ON CONFLICT(id) DO UPDATE SET
    title = excluded.title,
    duration = excluded.duration,
    media_kind = excluded.media_kind,
    media_value = excluded.media_value,
    description = excluded.description,
    thumbnail_url = excluded.thumbnail_url,
    is_free = excluded.is_free,
    is_drm_protected = excluded.is_drm_protected,
    order_index = excluded.order_index
WHERE videos.subchapter_id = excluded.subchapter_id";

const UPSERT_RELATED: &str = r"
INSERT INTO related_resources (resource_type, id, parent_kind, parent_id, order_index, payload)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(resource_type, id) DO UPDATE SET
    order_index = excluded.order_index,
    payload = excluded.payload
WHERE related_resources.parent_kind = excluded.parent_kind
  AND related_resources.parent_id = excluded.parent_id";

const OWNS_VIDEO: &str = "SELECT subchapter_id = ?2 FROM videos WHERE id = ?1";

const CLEAR_VIDEO_LECTURERS: &str = "DELETE FROM video_lecturers WHERE video_id = ?1";

const INSERT_VIDEO_LECTURER: &str = r"
INSERT INTO video_lecturers (video_id, lecturer_id, order_index) VALUES (?1, ?2, ?3)
ON CONFLICT(video_id, lecturer_id) DO NOTHING";

const COUNT_DANGLING: &str = r"
SELECT
    (SELECT COUNT(*) FROM chapters WHERE course_id NOT IN (SELECT id FROM courses))
  + (SELECT COUNT(*) FROM subchapters WHERE chapter_id NOT IN (SELECT id FROM chapters))
  + (SELECT COUNT(*) FROM videos WHERE subchapter_id NOT IN (SELECT id FROM subchapters))
  + (SELECT COUNT(*) FROM related_resources r WHERE
        (r.parent_kind = 'course' AND r.parent_id NOT IN (SELECT id FROM courses))
     OR (r.parent_kind = 'chapter' AND r.parent_id NOT IN (SELECT id FROM chapters))
     OR (r.parent_kind = 'subchapter' AND r.parent_id NOT IN (SELECT id FROM subchapters))
     OR (r.parent_kind = 'video' AND r.parent_id NOT IN (SELECT id FROM videos))
     OR r.parent_kind NOT IN ('course', 'chapter', 'subchapter', 'video'))
  + (SELECT COUNT(*) FROM video_lecturers WHERE video_id NOT IN (SELECT id FROM videos))";

/// Row counts per table, plus children whose parent row is missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub courses: u64,
    pub chapters: u64,
    pub subchapters: u64,
    pub videos: u64,
    pub related_resources: u64,
    pub lecturer_links: u64,
    pub dangling: u64,
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "courses:           {}", self.courses)?;
        writeln!(f, "chapters:          {}", self.chapters)?;
        writeln!(f, "subchapters:       {}", self.subchapters)?;
        writeln!(f, "videos:            {}", self.videos)?;
        writeln!(f, "related resources: {}", self.related_resources)?;
        writeln!(f, "lecturer links:    {}", self.lecturer_links)?;
        write!(f, "dangling children: {}", self.dangling)
    }
}

/// Full store contents, each table ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogExport {
    pub courses: Vec<Course>,
    pub chapters: Vec<Chapter>,
    pub subchapters: Vec<Subchapter>,
    pub videos: Vec<Video>,
    pub related_resources: Vec<RelatedResource>,
}

/// SQLite-backed catalog storage.
///
/// [`SqliteCatalogStore::open`] expects the schema to exist already;
/// [`SqliteCatalogStore::open_or_create`] and
/// [`SqliteCatalogStore::in_memory`] bootstrap it.
#[derive(Clone)]
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogStore {
    /// Opens an existing store, failing with `MissingSchema` if it was never
    /// bootstrapped.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        schema::configure(&conn)?;
        schema::verify_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Opens a store, creating the file and schema as needed.
    pub fn open_or_create(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        schema::configure(&conn)?;
        schema::ensure_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        schema::configure(&conn)?;
        schema::ensure_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn with_connection<T, F>(&self, operation: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            operation(&mut guard)
        })
        .await
        .map_err(|e| StorageError::Join(e.to_string()))?
    }

    /// Ids of `kind` records under `parent_id`, in order-index order.
    ///
    /// Courses hang off [`ResourceId::catalog_root`]; related resources are
    /// matched on parent id alone.
    pub async fn child_ids(
        &self,
        kind: EntityKind,
        parent_id: &ResourceId,
    ) -> Result<Vec<ResourceId>, StorageError> {
        let sql = match kind {
            EntityKind::Course => "SELECT id FROM courses ORDER BY order_index, id",
            EntityKind::Chapter => {
                "SELECT id FROM chapters WHERE course_id = ?1 ORDER BY order_index, id"
            }
            EntityKind::Subchapter => {
                "SELECT id FROM subchapters WHERE chapter_id = ?1 ORDER BY order_index, id"
            }
            EntityKind::Video => {
                "SELECT id FROM videos WHERE subchapter_id = ?1 ORDER BY order_index, id"
            }
            EntityKind::RelatedResource => {
                "SELECT id FROM related_resources WHERE parent_id = ?1
                 ORDER BY resource_type, order_index, id"
            }
        };
        let parent = match kind {
            EntityKind::Course if parent_id != &ResourceId::catalog_root() => {
                return Ok(Vec::new())
            }
            EntityKind::Course => None,
            _ => Some(parent_id.to_string()),
        };

        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(sql)?;
            let ids = match parent {
                Some(parent) => stmt
                    .query_map([parent], |row| id_at(row, 0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
                None => stmt
                    .query_map([], |row| id_at(row, 0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
            };
            Ok(ids)
        })
        .await
    }

    pub async fn stats(&self) -> Result<StoreStats, StorageError> {
        self.with_connection(|conn| {
            let conn: &Connection = conn;
            let count = |table: &str| -> Result<u64, StorageError> {
                let n: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                        row.get(0)
                    })?;
                Ok(n as u64)
            };
            let dangling: i64 = conn.query_row(COUNT_DANGLING, [], |row| row.get(0))?;

            Ok(StoreStats {
                courses: count("courses")?,
                chapters: count("chapters")?,
                subchapters: count("subchapters")?,
                videos: count("videos")?,
                related_resources: count("related_resources")?,
                lecturer_links: count("video_lecturers")?,
                dangling: dangling as u64,
            })
        })
        .await
    }

    /// Deterministic dump of every table.
    pub async fn export(&self) -> Result<CatalogExport, StorageError> {
        self.with_connection(|conn| {
            Ok(CatalogExport {
                courses: query_all(
                    conn,
                    "SELECT id, slug, title, description, cover_url, thumbnail_url, trailer_url,
                            is_free, is_coming_soon, order_index
                     FROM courses ORDER BY id",
                    course_from_row,
                )?,
                chapters: query_all(
                    conn,
                    "SELECT id, course_id, title, order_index, subchapter_count, is_coming_soon
                     FROM chapters ORDER BY id",
                    chapter_from_row,
                )?,
                subchapters: query_all(
                    conn,
                    "SELECT id, chapter_id, title, slug, content_type, order_index, duration,
                            is_free, thumbnail_url, video_ids
                     FROM subchapters ORDER BY id",
                    subchapter_from_row,
                )?,
                videos: videos_with_lecturers(conn)?,
                related_resources: query_all(
                    conn,
                    "SELECT id, resource_type, parent_kind, parent_id, order_index, payload
                     FROM related_resources ORDER BY resource_type, id",
                    related_from_row,
                )?,
            })
        })
        .await
    }
}

#[async_trait::async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn upsert_batch(&self, entities: Vec<Entity>) -> Result<usize, StorageError> {
        if entities.is_empty() {
            return Ok(0);
        }
        let entities = Arc::new(entities);
        let batch = Arc::clone(&entities);

        match self.with_connection(move |conn| write_batch(conn, &batch)).await {
            Err(err) if err.is_transient() => {
                log::warn!(
                    "Store busy, retrying batch of {} record(s) once: {}",
                    entities.len(),
                    err
                );
                tokio::time::sleep(STORE_BUSY_RETRY_DELAY).await;
                self.with_connection(move |conn| write_batch(conn, &entities))
                    .await
            }
            result => result,
        }
    }
}

/// One transaction per batch: everything commits or nothing does.
fn write_batch(conn: &mut Connection, entities: &[Entity]) -> Result<usize, StorageError> {
    let tx = conn.transaction()?;
    for entity in entities {
        write_entity(&tx, entity)?;
    }
    tx.commit()?;
    Ok(entities.len())
}

fn write_entity(tx: &Transaction<'_>, entity: &Entity) -> rusqlite::Result<()> {
    match entity {
        Entity::Course(c) => {
            tx.prepare_cached(UPSERT_COURSE)?.execute(params![
                c.id.as_str(),
                c.slug,
                c.title,
                c.description,
                c.cover_url,
                c.thumbnail_url,
                c.trailer_url,
                c.is_free,
                c.is_coming_soon,
                c.order_index,
            ])?;
        }
        Entity::Chapter(c) => {
            tx.prepare_cached(UPSERT_CHAPTER)?.execute(params![
                c.id.as_str(),
                c.course_id.as_str(),
                c.title,
                c.order_index,
                c.subchapter_count,
                c.is_coming_soon,
            ])?;
        }
        Entity::Subchapter(s) => {
            let video_ids = serde_json::to_string(&s.video_ids)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            tx.prepare_cached(UPSERT_SUBCHAPTER)?.execute(params![
                s.id.as_str(),
                s.chapter_id.as_str(),
                s.title,
                s.slug,
                s.content_type,
                s.order_index,
                s.duration,
                s.is_free,
                s.thumbnail_url,
                video_ids,
            ])?;
        }
        Entity::Video(v) => {
            tx.prepare_cached(UPSERT_VIDEO)?.execute(params![
                v.id.as_str(),
                v.subchapter_id.as_str(),
                v.title,
                v.duration,
                v.media.kind_name(),
                v.media.value(),
                v.description,
                v.thumbnail_url,
                v.is_free,
                v.is_drm_protected,
                v.order_index,
            ])?;
            let owned: bool = tx.prepare_cached(OWNS_VIDEO)?.query_row(
                params![v.id.as_str(), v.subchapter_id.as_str()],
                |row| row.get(0),
            )?;
            if owned {
                tx.prepare_cached(CLEAR_VIDEO_LECTURERS)?
                    .execute([v.id.as_str()])?;
                let mut insert = tx.prepare_cached(INSERT_VIDEO_LECTURER)?;
                for (position, lecturer_id) in v.lecturer_ids.iter().enumerate() {
                    insert.execute(params![v.id.as_str(), lecturer_id.as_str(), position as i64])?;
                }
            }
        }
        Entity::RelatedResource(r) => {
            let payload = serde_json::to_string(&r.payload)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            tx.prepare_cached(UPSERT_RELATED)?.execute(params![
                r.resource_type.as_str(),
                r.id.as_str(),
                r.parent_kind.as_str(),
                r.parent_id.as_str(),
                r.order_index,
                payload,
            ])?;
        }
    }
    Ok(())
}

fn videos_with_lecturers(conn: &Connection) -> Result<Vec<Video>, StorageError> {
    let mut videos = query_all(
        conn,
        "SELECT id, subchapter_id, title, duration, media_kind, media_value,
                description, thumbnail_url, is_free, is_drm_protected, order_index
         FROM videos ORDER BY id",
        video_from_row,
    )?;
    let links = query_all(
        conn,
        "SELECT video_id, lecturer_id FROM video_lecturers ORDER BY video_id, order_index",
        |row| Ok((id_at(row, 0)?, id_at(row, 1)?)),
    )?;

    let mut by_video: HashMap<ResourceId, Vec<ResourceId>> = HashMap::new();
    for (video_id, lecturer_id) in links {
        by_video.entry(video_id).or_default().push(lecturer_id);
    }
    for video in &mut videos {
        video.lecturer_ids = by_video.remove(&video.id).unwrap_or_default();
    }
    Ok(videos)
}

fn query_all<T>(
    conn: &Connection,
    sql: &str,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>, StorageError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], map)?
        .collect::<rusqlite::Result<Vec<T>>>()?;
    Ok(rows)
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn id_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<ResourceId> {
    let raw: String = row.get(idx)?;
    ResourceId::parse(&raw).map_err(|e| conversion_error(idx, e))
}

fn json_at<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn course_from_row(row: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: id_at(row, 0)?,
        slug: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        cover_url: row.get(4)?,
        thumbnail_url: row.get(5)?,
        trailer_url: row.get(6)?,
        is_free: row.get(7)?,
        is_coming_soon: row.get(8)?,
        order_index: row.get(9)?,
    })
}

fn chapter_from_row(row: &Row<'_>) -> rusqlite::Result<Chapter> {
    Ok(Chapter {
        id: id_at(row, 0)?,
        course_id: id_at(row, 1)?,
        title: row.get(2)?,
        order_index: row.get(3)?,
        subchapter_count: row.get(4)?,
        is_coming_soon: row.get(5)?,
    })
}

fn subchapter_from_row(row: &Row<'_>) -> rusqlite::Result<Subchapter> {
    Ok(Subchapter {
        id: id_at(row, 0)?,
        chapter_id: id_at(row, 1)?,
        title: row.get(2)?,
        slug: row.get(3)?,
        content_type: row.get(4)?,
        order_index: row.get(5)?,
        duration: row.get(6)?,
        is_free: row.get(7)?,
        thumbnail_url: row.get(8)?,
        video_ids: json_at(row, 9)?,
    })
}

fn video_from_row(row: &Row<'_>) -> rusqlite::Result<Video> {
    let media_kind: String = row.get(4)?;
    let media = MediaReference::from_parts(&media_kind, row.get(5)?)
        .ok_or_else(|| conversion_error(4, format!("unknown media kind `{}`", media_kind)))?;
    Ok(Video {
        id: id_at(row, 0)?,
        subchapter_id: id_at(row, 1)?,
        title: row.get(2)?,
        duration: row.get(3)?,
        media,
        description: row.get(6)?,
        thumbnail_url: row.get(7)?,
        is_free: row.get(8)?,
        is_drm_protected: row.get(9)?,
        order_index: row.get(10)?,
        lecturer_ids: Vec::new(),
    })
}

fn related_from_row(row: &Row<'_>) -> rusqlite::Result<RelatedResource> {
    let resource_type: String = row.get(1)?;
    let parent_kind: String = row.get(2)?;
    Ok(RelatedResource {
        id: id_at(row, 0)?,
        resource_type: ResourceType::from_name(&resource_type).ok_or_else(|| {
            conversion_error(1, format!("unknown resource type `{}`", resource_type))
        })?,
        parent_kind: EntityKind::from_name(&parent_kind)
            .ok_or_else(|| conversion_error(2, format!("unknown parent kind `{}`", parent_kind)))?,
        parent_id: id_at(row, 3)?,
        order_index: row.get(4)?,
        payload: json_at(row, 5)?,
    })
}
