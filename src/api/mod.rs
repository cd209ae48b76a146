// src/api/mod.rs
//! Catalog API interaction: endpoints, the HTTP client, request pacing and
//! payload decoding.
//!
//! The crawler depends on [`CatalogApi`] only, never on HTTP details, so a
//! stub implementation can drive the whole pipeline in tests.

pub mod client;
pub mod decoder;
pub mod pacing;

use crate::error::FetchError;
use std::fmt;

/// One addressable resource of the catalog API.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Every course visible to the token.
    CourseListing { limit: u32 },
    /// Chapters and books of one course.
    CourseContent { course_slug: String },
    /// Subchapters of one chapter.
    ChapterSubchapters { chapter_id: String },
    /// Detail of one subchapter, including its video and lecturers.
    SubchapterDetail {
        course_slug: String,
        subchapter_slug: String,
    },
}

impl Endpoint {
    /// Path segments below the API base, without the trailing empty segment.
    pub fn segments(&self) -> Vec<&str> {
        match self {
            Endpoint::CourseListing { .. } => vec!["courses", "v2", "private"],
            Endpoint::CourseContent { course_slug } => vec!["courses", course_slug, "content"],
            Endpoint::ChapterSubchapters { chapter_id } => {
                vec!["courses", chapter_id, "subchapter"]
            }
            Endpoint::SubchapterDetail {
                course_slug,
                subchapter_slug,
            } => vec![
                "courses",
                "v2",
                "private",
                course_slug,
                "subchapter",
                subchapter_slug,
            ],
        }
    }

    /// Path below the API base. Always ends with `/`; the API redirects
    /// otherwise.
    pub fn path(&self) -> String {
        format!("/{}/", self.segments().join("/"))
    }

    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            Endpoint::CourseListing { limit } => vec![("limit", limit.to_string())],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())?;
        let query = self.query();
        for (i, (key, value)) in query.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, key, value)?;
        }
        Ok(())
    }
}

/// The ability to retrieve raw catalog payloads.
///
/// Implementations own authentication, retries and pacing; callers see either
/// a JSON document or a classified [`FetchError`].
#[async_trait::async_trait]
pub trait CatalogApi: Send + Sync {
    async fn fetch(&self, endpoint: &Endpoint) -> Result<serde_json::Value, FetchError>;
}

pub use client::HttpCatalogClient;
pub use decoder::{decode, decode_response, Decoded};
pub use pacing::RequestPacer;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_paths_match_the_api_layout() {
        assert_eq!(
            Endpoint::CourseListing { limit: 50 }.to_string(),
            "/courses/v2/private/?limit=50"
        );
        assert_eq!(
            Endpoint::CourseContent {
                course_slug: "python-101".into()
            }
            .path(),
            "/courses/python-101/content/"
        );
        assert_eq!(
            Endpoint::ChapterSubchapters {
                chapter_id: "17".into()
            }
            .path(),
            "/courses/17/subchapter/"
        );
        assert_eq!(
            Endpoint::SubchapterDetail {
                course_slug: "python-101".into(),
                subchapter_slug: "loops".into()
            }
            .path(),
            "/courses/v2/private/python-101/subchapter/loops/"
        );
    }
}
