// src/model/mod.rs
//! Typed catalog records.
//!
//! Every record carries the id of its parent, so the hierarchy can be stored
//! relationally without nested collections. Child order is the `order_index`
//! the API reports, never the order in which fetches completed.

use crate::types::{EntityKind, ResourceId};
use serde::{Deserialize, Serialize};

/// Root of the hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: ResourceId,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub trailer_url: Option<String>,
    pub is_free: Option<bool>,
    pub is_coming_soon: bool,
    /// Position in the course listing.
    pub order_index: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ResourceId,
    pub course_id: ResourceId,
    pub title: String,
    pub order_index: i64,
    pub subchapter_count: i64,
    pub is_coming_soon: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subchapter {
    pub id: ResourceId,
    pub chapter_id: ResourceId,
    pub title: String,
    pub slug: String,
    /// `video`, `exercise`, … as reported by the API.
    pub content_type: String,
    pub order_index: i64,
    pub duration: Option<String>,
    pub is_free: Option<bool>,
    pub thumbnail_url: Option<String>,
    /// Videos attached to this subchapter; the API exposes at most one.
    pub video_ids: Vec<ResourceId>,
}

/// Where a video's media can be retrieved from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MediaReference {
    /// Plain playback URL (usually HLS).
    Url(String),
    /// DRM-protected playback URL.
    DrmUrl(String),
    /// Mux playback id.
    MuxPlayback(String),
}

impl MediaReference {
    pub fn kind_name(&self) -> &'static str {
        match self {
            MediaReference::Url(_) => "url",
            MediaReference::DrmUrl(_) => "drm_url",
            MediaReference::MuxPlayback(_) => "mux_playback",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            MediaReference::Url(v) | MediaReference::DrmUrl(v) | MediaReference::MuxPlayback(v) => v,
        }
    }

    /// Rebuilds a reference from its stored `(kind, value)` columns.
    pub fn from_parts(kind: &str, value: String) -> Option<Self> {
        match kind {
            "url" => Some(MediaReference::Url(value)),
            "drm_url" => Some(MediaReference::DrmUrl(value)),
            "mux_playback" => Some(MediaReference::MuxPlayback(value)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: ResourceId,
    pub subchapter_id: ResourceId,
    pub title: String,
    pub duration: Option<String>,
    pub media: MediaReference,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub is_free: Option<bool>,
    pub is_drm_protected: Option<bool>,
    pub order_index: i64,
    /// Lecturers in listed order. A lecturer record is stored once; these
    /// links are kept for every video.
    pub lecturer_ids: Vec<ResourceId>,
}

/// What a related resource is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Book,
    Lecturer,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Book => "book",
            ResourceType::Lecturer => "lecturer",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "book" => Some(ResourceType::Book),
            "lecturer" => Some(ResourceType::Lecturer),
            _ => None,
        }
    }
}

/// Metadata hanging off another entity: books off courses, lecturers off
/// videos. The payload is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedResource {
    pub id: ResourceId,
    pub resource_type: ResourceType,
    pub parent_kind: EntityKind,
    pub parent_id: ResourceId,
    pub order_index: i64,
    pub payload: serde_json::Value,
}

/// One decoded record of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Course(Course),
    Chapter(Chapter),
    Subchapter(Subchapter),
    Video(Video),
    RelatedResource(RelatedResource),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Course(_) => EntityKind::Course,
            Entity::Chapter(_) => EntityKind::Chapter,
            Entity::Subchapter(_) => EntityKind::Subchapter,
            Entity::Video(_) => EntityKind::Video,
            Entity::RelatedResource(_) => EntityKind::RelatedResource,
        }
    }

    pub fn id(&self) -> &ResourceId {
        match self {
            Entity::Course(c) => &c.id,
            Entity::Chapter(c) => &c.id,
            Entity::Subchapter(s) => &s.id,
            Entity::Video(v) => &v.id,
            Entity::RelatedResource(r) => &r.id,
        }
    }

    /// The parent this record references, `None` for courses.
    pub fn parent(&self) -> Option<(EntityKind, &ResourceId)> {
        match self {
            Entity::Course(_) => None,
            Entity::Chapter(c) => Some((EntityKind::Course, &c.course_id)),
            Entity::Subchapter(s) => Some((EntityKind::Chapter, &s.chapter_id)),
            Entity::Video(v) => Some((EntityKind::Subchapter, &v.subchapter_id)),
            Entity::RelatedResource(r) => Some((r.parent_kind, &r.parent_id)),
        }
    }

    pub fn order_index(&self) -> i64 {
        match self {
            Entity::Course(c) => c.order_index,
            Entity::Chapter(c) => c.order_index,
            Entity::Subchapter(s) => s.order_index,
            Entity::Video(v) => v.order_index,
            Entity::RelatedResource(r) => r.order_index,
        }
    }

    /// Human-readable label for logs.
    pub fn display_title(&self) -> &str {
        match self {
            Entity::Course(c) => &c.title,
            Entity::Chapter(c) => &c.title,
            Entity::Subchapter(s) => &s.title,
            Entity::Video(v) => &v.title,
            Entity::RelatedResource(r) => r.resource_type.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ResourceId {
        ResourceId::parse(s).unwrap()
    }

    #[test]
    fn related_resource_parent_is_polymorphic() {
        let entity = Entity::RelatedResource(RelatedResource {
            id: id("lect-1"),
            resource_type: ResourceType::Lecturer,
            parent_kind: EntityKind::Video,
            parent_id: id("vid-1"),
            order_index: 0,
            payload: serde_json::json!({"name": "Ada"}),
        });
        assert_eq!(entity.kind(), EntityKind::RelatedResource);
        assert_eq!(entity.parent(), Some((EntityKind::Video, &id("vid-1"))));
    }

    #[test]
    fn media_reference_parts_round_trip() {
        let media = MediaReference::MuxPlayback("abc".into());
        let rebuilt = MediaReference::from_parts(media.kind_name(), media.value().to_string());
        assert_eq!(rebuilt, Some(media));
        assert_eq!(MediaReference::from_parts("rtmp", "x".into()), None);
    }
}
