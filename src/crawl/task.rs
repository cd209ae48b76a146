// src/crawl/task.rs
//! Units of crawl work.

use crate::api::Endpoint;
use crate::types::{EntityKind, ResourceId};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Root listing of every course.
    ListCourses,
    /// Chapters and books of one course.
    CourseContent,
    /// Subchapters of one chapter.
    ChapterSubchapters,
    /// Detail of one video, reached through its subchapter.
    VideoDetail,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::ListCourses => "list_courses",
            TaskKind::CourseContent => "course_content",
            TaskKind::ChapterSubchapters => "chapter_subchapters",
            TaskKind::VideoDetail => "video_detail",
        }
    }

    /// Kind of the entity a task is keyed on. `None` for the root listing.
    pub fn subject(&self) -> Option<EntityKind> {
        match self {
            TaskKind::ListCourses => None,
            TaskKind::CourseContent => Some(EntityKind::Course),
            TaskKind::ChapterSubchapters => Some(EntityKind::Chapter),
            TaskKind::VideoDetail => Some(EntityKind::Video),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fetch to perform.
///
/// `resource_id` is the entity the task is about (the course whose content
/// is listed, the video whose detail is fetched); `parent_id` is that
/// entity's parent, [`ResourceId::catalog_root`] for courses and `None`
/// only for the root listing. The course slug travels down the tree
/// because the detail endpoint is addressed by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub kind: TaskKind,
    pub parent_id: Option<ResourceId>,
    pub resource_id: ResourceId,
    pub endpoint: Endpoint,
    pub course_slug: Option<String>,
}

impl Task {
    pub fn list_courses(page_size: u32) -> Self {
        Self {
            kind: TaskKind::ListCourses,
            parent_id: None,
            resource_id: ResourceId::catalog_root(),
            endpoint: Endpoint::CourseListing { limit: page_size },
            course_slug: None,
        }
    }

    pub fn course_content(course_id: &ResourceId, course_slug: &str) -> Self {
        Self {
            kind: TaskKind::CourseContent,
            parent_id: Some(ResourceId::catalog_root()),
            resource_id: course_id.clone(),
            endpoint: Endpoint::CourseContent {
                course_slug: course_slug.to_string(),
            },
            course_slug: Some(course_slug.to_string()),
        }
    }

    pub fn chapter_subchapters(
        chapter_id: &ResourceId,
        course_id: &ResourceId,
        course_slug: &str,
    ) -> Self {
        Self {
            kind: TaskKind::ChapterSubchapters,
            parent_id: Some(course_id.clone()),
            resource_id: chapter_id.clone(),
            endpoint: Endpoint::ChapterSubchapters {
                chapter_id: chapter_id.to_string(),
            },
            course_slug: Some(course_slug.to_string()),
        }
    }

    pub fn video_detail(
        video_id: &ResourceId,
        subchapter_id: &ResourceId,
        course_slug: &str,
        subchapter_slug: &str,
    ) -> Self {
        Self {
            kind: TaskKind::VideoDetail,
            parent_id: Some(subchapter_id.clone()),
            resource_id: video_id.clone(),
            endpoint: Endpoint::SubchapterDetail {
                course_slug: course_slug.to_string(),
                subchapter_slug: subchapter_slug.to_string(),
            },
            course_slug: Some(course_slug.to_string()),
        }
    }

    /// True for the entity this task was already claimed under.
    pub fn is_subject(&self, kind: EntityKind, id: &ResourceId) -> bool {
        self.kind.subject() == Some(kind) && &self.resource_id == id
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.resource_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ResourceId {
        ResourceId::parse(s).unwrap()
    }

    #[test]
    fn every_task_below_the_listing_names_its_parent() {
        assert_eq!(Task::list_courses(50).parent_id, None);
        assert_eq!(
            Task::course_content(&id("c1"), "python").parent_id,
            Some(ResourceId::catalog_root())
        );
        assert_eq!(
            Task::chapter_subchapters(&id("ch1"), &id("c1"), "python").parent_id,
            Some(id("c1"))
        );
        assert_eq!(
            Task::video_detail(&id("v1"), &id("s1"), "python", "intro").parent_id,
            Some(id("s1"))
        );
    }

    #[test]
    fn subject_is_scoped_by_kind() {
        let task = Task::course_content(&id("c1"), "python");
        assert!(task.is_subject(EntityKind::Course, &id("c1")));
        assert!(!task.is_subject(EntityKind::Chapter, &id("c1")));
    }
}
