// tests/support/mod.rs
//! Shared fixtures: an in-process catalog API and a small sample catalog.

#![allow(dead_code)]

use course_crawler::error::{FetchError, FetchErrorKind};
use course_crawler::{CatalogApi, Endpoint};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Serves canned payloads keyed by endpoint path.
///
/// Unknown paths answer like a 404; paths marked failing answer like a
/// server that stayed unavailable through every retry.
#[derive(Default)]
pub struct MockCatalogApi {
    responses: HashMap<String, Value>,
    failing: HashSet<String>,
    delay: Duration,
    path_delays: HashMap<String, Duration>,
    fetches: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockCatalogApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, path: &str, payload: Value) -> Self {
        self.responses.insert(path.to_string(), payload);
        self
    }

    pub fn failing(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Overrides the default delay for one path.
    pub fn with_path_delay(mut self, path: &str, delay: Duration) -> Self {
        self.path_delays.insert(path.to_string(), delay);
        self
    }

    pub fn fetch_count(&self, path: &str) -> usize {
        self.fetches.lock().get(path).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CatalogApi for MockCatalogApi {
    async fn fetch(&self, endpoint: &Endpoint) -> Result<Value, FetchError> {
        let path = endpoint.path();
        *self.fetches.lock().entry(path.clone()).or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = self.path_delays.get(&path).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&path) {
            return Err(FetchError {
                kind: FetchErrorKind::Exhausted,
                endpoint: endpoint.to_string(),
                status: Some(503),
                attempts: 4,
                message: "service unavailable".to_string(),
            });
        }
        self.responses
            .get(&path)
            .cloned()
            .ok_or_else(|| FetchError::rejected(endpoint.to_string(), Some(404), "not found"))
    }
}

pub const LISTING: &str = "/courses/v2/private/";

pub fn content_path(course_slug: &str) -> String {
    format!("/courses/{}/content/", course_slug)
}

pub fn subchapters_path(chapter_id: &str) -> String {
    format!("/courses/{}/subchapter/", chapter_id)
}

pub fn detail_path(course_slug: &str, subchapter_slug: &str) -> String {
    format!(
        "/courses/v2/private/{}/subchapter/{}/",
        course_slug, subchapter_slug
    )
}

fn chapter(id: &str, name: &str, order: i64, count: i64) -> Value {
    json!({"chapter_id": id, "chapter_name": name, "order": order, "subchapter_counts": count})
}

fn subchapter(id: &str, slug: &str, order: i64, video_id: Option<&str>) -> Value {
    json!({
        "id": id,
        "type": if video_id.is_some() { "video" } else { "quiz" },
        "order": order,
        "subchapter_name": format!("Lesson {}", slug),
        "subchapter_slug": slug,
        "video_id": video_id,
    })
}

fn detail(name: &str, order: i64, video_id: &str, lecturers: Value) -> Value {
    json!({
        "id": format!("detail-{}", video_id),
        "subchapter_name": name,
        "order": order,
        "video": {
            "id": video_id,
            "video_url": format!("https://cdn.example.test/{}.m3u8", video_id),
            "duration": "10:00",
            "is_free": false,
            "lecturers": lecturers,
        }
    })
}

/// Two courses sharing chapter `ch1`; video `v1` listed under two
/// subchapters; lecturer `l1` attached to both videos.
///
/// Shared records sit at different positions under each parent: `ch1` is
/// first in `python` and second in `sql`, `v1` is titled differently
/// through `recap`, and `l1` is first on `v1` and second on `v2`.
///
/// Expected store: 2 courses, 3 chapters, 4 subchapters, 2 videos, 3
/// related resources (book `py-book`, lecturers `l1` and `l2`), 3 lecturer
/// links, 8 tasks.
pub fn sample_catalog() -> MockCatalogApi {
    let ada = json!({"id": "l1", "name": "Ada"});
    let grace = json!({"id": "l2", "name": "Grace"});
    let v1 = detail("Intro", 1, "v1", json!([ada.clone()]));
    let v1_recap = detail("Recap", 1, "v1", json!([ada.clone()]));
    let v2 = detail("Loops", 2, "v2", json!([grace, ada]));

    MockCatalogApi::new()
        .with_response(
            LISTING,
            json!({"data": [
                {"id": "c1", "course_name": "Python", "slug": "python", "is_free": true},
                {"id": "c2", "course_name": "SQL", "slug": "sql"}
            ]}),
        )
        .with_response(
            &content_path("python"),
            json!({
                "chapters": [chapter("ch1", "Basics", 1, 2), chapter("ch2", "Review", 2, 1)],
                "books": [{"slug": "py-book", "title": "Python Crash Course"}]
            }),
        )
        .with_response(
            &content_path("sql"),
            json!({
                "chapters": [chapter("ch3", "Queries", 1, 1), chapter("ch1", "Basics", 2, 2)]
            }),
        )
        .with_response(
            &subchapters_path("ch1"),
            json!({"subchapters": [
                subchapter("s2", "loops", 2, Some("v2")),
                subchapter("s1", "intro", 1, Some("v1"))
            ]}),
        )
        .with_response(
            &subchapters_path("ch2"),
            json!({"subchapters": [subchapter("s3", "recap", 1, Some("v1"))]}),
        )
        .with_response(
            &subchapters_path("ch3"),
            json!({"subchapters": [subchapter("s4", "select-quiz", 1, None)]}),
        )
        .with_response(&detail_path("python", "intro"), v1.clone())
        .with_response(&detail_path("python", "recap"), v1_recap)
        .with_response(&detail_path("sql", "intro"), v1)
        .with_response(&detail_path("python", "loops"), v2.clone())
        .with_response(&detail_path("sql", "loops"), v2)
}

/// Total tasks a full crawl of [`sample_catalog`] runs.
pub const SAMPLE_TASKS: usize = 8;
