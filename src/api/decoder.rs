// src/api/decoder.rs
//! Turns raw catalog payloads into typed records.
//!
//! Decoding is strict about required fields and silent about extra ones. A
//! missing or mistyped required field fails the whole payload with the JSON
//! path of the field, because a half-decoded record would break the
//! references its children rely on.

use crate::crawl::task::{Task, TaskKind};
use crate::error::DecodeError;
use crate::model::{
    Chapter, Course, Entity, MediaReference, RelatedResource, ResourceType, Subchapter, Video,
};
use crate::types::{EntityKind, ResourceId};
use serde_json::{Map, Value};

/// The record shapes the API returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Course,
    Chapter,
    Book,
    Subchapter,
    Video,
    Lecturer,
}

/// What a record cannot tell about itself: who its parent is and where it
/// sat in the listing it came from.
#[derive(Debug, Clone, Copy)]
pub struct RecordContext<'a> {
    pub parent: Option<&'a ResourceId>,
    pub position: usize,
}

/// All records decoded from one endpoint payload, parents before children.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Decoded {
    pub entities: Vec<Entity>,
}

impl Decoded {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Decodes a single record.
pub fn decode(
    kind: RecordKind,
    payload: &Value,
    context: RecordContext<'_>,
) -> Result<Entity, DecodeError> {
    decode_at(kind, payload, context, "")
}

/// Decodes everything a task's endpoint returned.
pub fn decode_response(task: &Task, payload: &Value) -> Result<Decoded, DecodeError> {
    let root = Fields::of(payload, "")?;
    let mut entities = Vec::new();

    match task.kind {
        TaskKind::ListCourses => {
            for (i, course) in root.required_array("data")?.iter().enumerate() {
                let path = format!("data[{}]", i);
                let context = RecordContext {
                    parent: None,
                    position: i,
                };
                entities.push(decode_at(RecordKind::Course, course, context, &path)?);
            }
        }
        TaskKind::CourseContent => {
            let course_id = &task.resource_id;
            for (i, chapter) in root.required_array("chapters")?.iter().enumerate() {
                let path = format!("chapters[{}]", i);
                let context = RecordContext {
                    parent: Some(course_id),
                    position: i,
                };
                entities.push(decode_at(RecordKind::Chapter, chapter, context, &path)?);
            }
            for (i, book) in root.optional_array("books")?.iter().enumerate() {
                let path = format!("books[{}]", i);
                let context = RecordContext {
                    parent: Some(course_id),
                    position: i,
                };
                entities.push(decode_at(RecordKind::Book, book, context, &path)?);
            }
        }
        TaskKind::ChapterSubchapters => {
            let chapter_id = &task.resource_id;
            for (i, subchapter) in root.required_array("subchapters")?.iter().enumerate() {
                let path = format!("subchapters[{}]", i);
                let context = RecordContext {
                    parent: Some(chapter_id),
                    position: i,
                };
                entities.push(decode_at(RecordKind::Subchapter, subchapter, context, &path)?);
            }
        }
        TaskKind::VideoDetail => {
            let title = root.required_str("subchapter_name")?;
            let order = root.required_i64("order")?;
            let video_value = root.required_value("video")?;
            let context = RecordContext {
                parent: task.parent_id.as_ref(),
                position: 0,
            };
            let video_fields = Fields::of(video_value, "video")?;
            let mut video = decode_video(&video_fields, context)?;
            if video.id != task.resource_id {
                return Err(video_fields.mismatch(
                    "id",
                    format!("expected video {}, found {}", task.resource_id, video.id),
                ));
            }
            video.title = title;
            video.order_index = order;
            let video_id = video.id.clone();
            entities.push(Entity::Video(video));

            for (i, lecturer) in video_fields.optional_array("lecturers")?.iter().enumerate() {
                let path = format!("video.lecturers[{}]", i);
                let context = RecordContext {
                    parent: Some(&video_id),
                    position: i,
                };
                entities.push(decode_at(RecordKind::Lecturer, lecturer, context, &path)?);
            }
        }
    }

    Ok(Decoded { entities })
}

fn decode_at(
    kind: RecordKind,
    value: &Value,
    context: RecordContext<'_>,
    path: &str,
) -> Result<Entity, DecodeError> {
    let fields = Fields::of(value, path)?;
    let position = context.position as i64;

    let entity = match kind {
        RecordKind::Course => Entity::Course(Course {
            id: fields.required_id("id")?,
            slug: fields.required_str("slug")?,
            title: fields.required_str("course_name")?,
            description: fields.optional_text("description")?,
            cover_url: fields.optional_text("cover")?,
            thumbnail_url: fields.optional_text("thumbnail")?,
            trailer_url: fields.optional_text("trailer")?,
            is_free: fields.optional_bool("is_free")?,
            is_coming_soon: fields.optional_bool("is_coming_soon")?.unwrap_or(false),
            order_index: position,
        }),
        RecordKind::Chapter => Entity::Chapter(Chapter {
            id: fields.required_id("chapter_id")?,
            course_id: fields.parent(context)?,
            title: fields.required_str("chapter_name")?,
            order_index: fields.required_i64("order")?,
            subchapter_count: fields.required_i64("subchapter_counts")?,
            is_coming_soon: fields.optional_bool("is_coming_soon")?.unwrap_or(false),
        }),
        RecordKind::Subchapter => Entity::Subchapter(Subchapter {
            id: fields.required_id("id")?,
            chapter_id: fields.parent(context)?,
            title: fields.required_str("subchapter_name")?,
            slug: fields.required_str("subchapter_slug")?,
            content_type: fields.required_str("type")?,
            order_index: fields.required_i64("order")?,
            duration: fields.optional_text("duration")?,
            is_free: fields.optional_bool("is_free")?,
            thumbnail_url: fields.optional_text("thumbnail")?,
            video_ids: fields.optional_id("video_id")?.into_iter().collect(),
        }),
        RecordKind::Video => Entity::Video(decode_video(&fields, context)?),
        RecordKind::Book => {
            fields.required_str("title")?;
            Entity::RelatedResource(RelatedResource {
                id: fields.required_id("slug")?,
                resource_type: ResourceType::Book,
                parent_kind: EntityKind::Course,
                parent_id: fields.parent(context)?,
                order_index: position,
                payload: value.clone(),
            })
        }
        RecordKind::Lecturer => {
            fields.required_str("name")?;
            Entity::RelatedResource(RelatedResource {
                id: fields.required_id("id")?,
                resource_type: ResourceType::Lecturer,
                parent_kind: EntityKind::Video,
                parent_id: fields.parent(context)?,
                order_index: position,
                payload: value.clone(),
            })
        }
    };

    Ok(entity)
}

fn decode_video(fields: &Fields<'_>, context: RecordContext<'_>) -> Result<Video, DecodeError> {
    let id = fields.required_id("id")?;
    let media = fields.media_reference()?;
    let lecturers_path = fields.field_path("lecturers");
    let mut lecturer_ids = Vec::new();
    for (i, lecturer) in fields.optional_array("lecturers")?.iter().enumerate() {
        let path = format!("{}[{}]", lecturers_path, i);
        lecturer_ids.push(Fields::of(lecturer, &path)?.required_id("id")?);
    }
    Ok(Video {
        title: fields
            .optional_text("title")?
            .unwrap_or_else(|| id.to_string()),
        id,
        subchapter_id: fields.parent(context)?,
        duration: fields.optional_text("duration")?,
        media,
        description: fields.optional_text("description")?,
        thumbnail_url: fields.optional_text("thumbnail")?,
        is_free: fields.optional_bool("is_free")?,
        is_drm_protected: fields.optional_bool("is_drm_protected")?,
        order_index: context.position as i64,
        lecturer_ids,
    })
}

/// Typed, path-aware access to one JSON object.
struct Fields<'a> {
    object: &'a Map<String, Value>,
    path: &'a str,
}

impl<'a> Fields<'a> {
    fn of(value: &'a Value, path: &'a str) -> Result<Self, DecodeError> {
        match value {
            Value::Object(object) => Ok(Self { object, path }),
            other => Err(DecodeError::schema_mismatch(
                if path.is_empty() { "$" } else { path },
                format!("expected an object, found {}", type_name(other)),
            )),
        }
    }

    fn field_path(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.path, name)
        }
    }

    fn mismatch(&self, name: &str, reason: impl Into<String>) -> DecodeError {
        DecodeError::schema_mismatch(self.field_path(name), reason)
    }

    /// Present and not null.
    fn present(&self, name: &str) -> Option<&'a Value> {
        self.object.get(name).filter(|v| !v.is_null())
    }

    fn required_value(&self, name: &str) -> Result<&'a Value, DecodeError> {
        self.present(name)
            .ok_or_else(|| self.mismatch(name, "required field is missing"))
    }

    fn required_str(&self, name: &str) -> Result<String, DecodeError> {
        match self.required_value(name)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(self.mismatch(name, format!("expected a string, found {}", type_name(other)))),
        }
    }

    fn required_i64(&self, name: &str) -> Result<i64, DecodeError> {
        let value = self.required_value(name)?;
        value
            .as_i64()
            .ok_or_else(|| self.mismatch(name, format!("expected an integer, found {}", type_name(value))))
    }

    fn required_id(&self, name: &str) -> Result<ResourceId, DecodeError> {
        let value = self.required_value(name)?;
        self.id_from(name, value)
    }

    fn optional_id(&self, name: &str) -> Result<Option<ResourceId>, DecodeError> {
        self.present(name).map(|v| self.id_from(name, v)).transpose()
    }

    fn id_from(&self, name: &str, value: &Value) -> Result<ResourceId, DecodeError> {
        match value {
            Value::String(s) => {
                ResourceId::parse(s).map_err(|e| self.mismatch(name, e.to_string()))
            }
            Value::Number(n) => n
                .as_u64()
                .map(ResourceId::from_number)
                .ok_or_else(|| self.mismatch(name, format!("id {} is not a non-negative integer", n))),
            other => Err(self.mismatch(
                name,
                format!("expected a string or integer id, found {}", type_name(other)),
            )),
        }
    }

    /// Strings, and numbers rendered as strings. Absent or null is `None`.
    fn optional_text(&self, name: &str) -> Result<Option<String>, DecodeError> {
        match self.present(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(self.mismatch(name, format!("expected a string, found {}", type_name(other)))),
        }
    }

    fn optional_bool(&self, name: &str) -> Result<Option<bool>, DecodeError> {
        match self.present(name) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.mismatch(name, format!("expected a boolean, found {}", type_name(other)))),
        }
    }

    fn required_array(&self, name: &str) -> Result<&'a [Value], DecodeError> {
        match self.required_value(name)? {
            Value::Array(items) => Ok(items.as_slice()),
            other => Err(self.mismatch(name, format!("expected an array, found {}", type_name(other)))),
        }
    }

    fn optional_array(&self, name: &str) -> Result<&'a [Value], DecodeError> {
        match self.present(name) {
            None => Ok(&[][..]),
            Some(Value::Array(items)) => Ok(items.as_slice()),
            Some(other) => Err(self.mismatch(name, format!("expected an array, found {}", type_name(other)))),
        }
    }

    /// First available of playback URL, DRM URL and Mux playback id.
    fn media_reference(&self) -> Result<MediaReference, DecodeError> {
        if let Some(url) = self.optional_text("video_url")?.filter(|s| !s.is_empty()) {
            return Ok(MediaReference::Url(url));
        }
        if let Some(url) = self.optional_text("drm_video_url")?.filter(|s| !s.is_empty()) {
            return Ok(MediaReference::DrmUrl(url));
        }
        if let Some(id) = self.optional_text("mux_playback_id")?.filter(|s| !s.is_empty()) {
            return Ok(MediaReference::MuxPlayback(id));
        }
        Err(self.mismatch(
            "video_url",
            "one of video_url, drm_video_url or mux_playback_id is required",
        ))
    }

    fn parent(&self, context: RecordContext<'_>) -> Result<ResourceId, DecodeError> {
        context.parent.cloned().ok_or_else(|| {
            DecodeError::schema_mismatch(
                if self.path.is_empty() { "$" } else { self.path },
                "record has no parent reference",
            )
        })
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeErrorKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn id(s: &str) -> ResourceId {
        ResourceId::parse(s).unwrap()
    }

    #[test]
    fn course_listing_decodes_in_listing_order() {
        let payload = json!({
            "data": [
                {"id": "c1", "course_name": "Python", "slug": "python", "is_free": true, "is_new": true},
                {"id": 7, "course_name": "SQL", "slug": "sql", "cover": null}
            ]
        });
        let decoded = decode_response(&Task::list_courses(50), &payload).unwrap();

        assert_eq!(decoded.len(), 2);
        match &decoded.entities[1] {
            Entity::Course(course) => {
                assert_eq!(course.id, id("7"));
                assert_eq!(course.title, "SQL");
                assert_eq!(course.order_index, 1);
                assert_eq!(course.cover_url, None);
                assert!(!course.is_coming_soon);
            }
            other => panic!("expected a course, got {:?}", other),
        }
    }

    #[test]
    fn missing_required_field_names_its_path() {
        let payload = json!({
            "data": [
                {"id": "c1", "course_name": "Python", "slug": "python"},
                {"id": "c2", "slug": "sql"}
            ]
        });
        let err = decode_response(&Task::list_courses(50), &payload).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::SchemaMismatch);
        assert_eq!(err.field, "data[1].course_name");
    }

    #[test]
    fn mistyped_field_is_a_mismatch_not_a_default() {
        let task = Task::course_content(&id("c1"), "python");
        let payload = json!({
            "chapters": [{"chapter_id": "ch1", "chapter_name": "Intro", "order": "first", "subchapter_counts": 3}]
        });
        let err = decode_response(&task, &payload).unwrap_err();
        assert_eq!(err.field, "chapters[0].order");
    }

    #[test]
    fn course_content_yields_chapters_then_books() {
        let task = Task::course_content(&id("c1"), "python");
        let payload = json!({
            "chapters": [
                {"chapter_id": "ch1", "chapter_name": "Intro", "order": 0, "subchapter_counts": 2}
            ],
            "books": [
                {"slug": "think-python", "title": "Think Python", "rating": 4.5}
            ]
        });
        let decoded = decode_response(&task, &payload).unwrap();
        let kinds: Vec<_> = decoded.entities.iter().map(Entity::kind).collect();
        assert_eq!(kinds, vec![EntityKind::Chapter, EntityKind::RelatedResource]);
        assert_eq!(
            decoded.entities[1].parent(),
            Some((EntityKind::Course, &id("c1")))
        );
    }

    #[test]
    fn books_are_optional() {
        let task = Task::course_content(&id("c1"), "python");
        let decoded = decode_response(&task, &json!({"chapters": []})).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn subchapter_video_id_is_optional() {
        let task = Task::chapter_subchapters(&id("ch1"), &id("c1"), "python");
        let payload = json!({
            "subchapters": [
                {"id": "s1", "type": "video", "order": 0, "subchapter_name": "Loops",
                 "subchapter_slug": "loops", "video_id": "v1", "duration": "05:10"},
                {"id": "s2", "type": "exercise", "order": 1, "subchapter_name": "Practice",
                 "subchapter_slug": "practice", "video_id": null}
            ]
        });
        let decoded = decode_response(&task, &payload).unwrap();
        match (&decoded.entities[0], &decoded.entities[1]) {
            (Entity::Subchapter(first), Entity::Subchapter(second)) => {
                assert_eq!(first.video_ids, vec![id("v1")]);
                assert!(second.video_ids.is_empty());
                assert_eq!(first.chapter_id, id("ch1"));
            }
            other => panic!("unexpected entities {:?}", other),
        }
    }

    #[test]
    fn video_detail_yields_video_and_lecturers() {
        let task = Task::video_detail(&id("v1"), &id("s1"), "python", "loops");
        let payload = json!({
            "id": "s1",
            "subchapter_name": "Loops",
            "subchapter_slug": "loops",
            "order": 3,
            "video": {
                "id": "v1",
                "mux_playback_id": "mux-abc",
                "duration": 310,
                "lecturers": [{"id": "l1", "name": "Ada"}]
            }
        });
        let decoded = decode_response(&task, &payload).unwrap();
        assert_eq!(decoded.len(), 2);
        match &decoded.entities[0] {
            Entity::Video(video) => {
                assert_eq!(video.title, "Loops");
                assert_eq!(video.order_index, 3);
                assert_eq!(video.subchapter_id, id("s1"));
                assert_eq!(video.media, MediaReference::MuxPlayback("mux-abc".into()));
                assert_eq!(video.duration.as_deref(), Some("310"));
            }
            other => panic!("expected a video, got {:?}", other),
        }
        assert_eq!(
            decoded.entities[1].parent(),
            Some((EntityKind::Video, &id("v1")))
        );
    }

    #[test]
    fn video_keeps_every_lecturer_in_listed_order() {
        let task = Task::video_detail(&id("v2"), &id("s2"), "python", "loops");
        let payload = json!({
            "subchapter_name": "Loops", "order": 1,
            "video": {
                "id": "v2", "video_url": "https://cdn.example.test/v2.m3u8",
                "lecturers": [{"id": "l2", "name": "Grace"}, {"id": 17, "name": "Ada"}]
            }
        });
        let decoded = decode_response(&task, &payload).unwrap();
        match &decoded.entities[0] {
            Entity::Video(video) => assert_eq!(video.lecturer_ids, vec![id("l2"), id("17")]),
            other => panic!("expected a video, got {:?}", other),
        }
    }

    #[test]
    fn lecturer_without_id_names_its_path() {
        let task = Task::video_detail(&id("v1"), &id("s1"), "python", "loops");
        let payload = json!({
            "subchapter_name": "Loops", "order": 0,
            "video": {"id": "v1", "video_url": "u", "lecturers": [{"name": "Ada"}]}
        });
        let err = decode_response(&task, &payload).unwrap_err();
        assert_eq!(err.field, "video.lecturers[0].id");
    }

    #[test]
    fn video_detail_for_another_video_is_a_mismatch() {
        let task = Task::video_detail(&id("v1"), &id("s1"), "python", "loops");
        let payload = json!({
            "subchapter_name": "Loops", "order": 0,
            "video": {"id": "v9", "video_url": "https://cdn.example.test/v9.m3u8"}
        });
        let err = decode_response(&task, &payload).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::SchemaMismatch);
        assert_eq!(err.field, "video.id");
    }

    #[test]
    fn video_without_media_reference_is_rejected() {
        let task = Task::video_detail(&id("v1"), &id("s1"), "python", "loops");
        let payload = json!({
            "id": "s1", "subchapter_name": "Loops", "order": 0,
            "video": {"id": "v1", "video_url": ""}
        });
        let err = decode_response(&task, &payload).unwrap_err();
        assert_eq!(err.field, "video.video_url");
    }

    #[test]
    fn video_detail_without_video_is_a_mismatch() {
        let task = Task::video_detail(&id("v1"), &id("s1"), "python", "loops");
        let payload = json!({"id": "s1", "subchapter_name": "Loops", "order": 0, "video": null});
        let err = decode_response(&task, &payload).unwrap_err();
        assert_eq!(err.field, "video");
    }

    #[test]
    fn single_record_paths_start_at_the_field() {
        let err = decode(
            RecordKind::Lecturer,
            &json!({"id": "l1"}),
            RecordContext {
                parent: Some(&id("v1")),
                position: 0,
            },
        )
        .unwrap_err();
        assert_eq!(err.field, "name");

        let err = decode(RecordKind::Course, &json!([]), RecordContext { parent: None, position: 0 })
            .unwrap_err();
        assert_eq!(err.field, "$");
    }
}
