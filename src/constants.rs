// src/constants.rs
//! Domain constants that define the operational boundaries of the crawler.
//!
//! Each constant is named for the concept it constrains. Reading them top to
//! bottom tells you how the crawler talks to the catalog API, how hard it
//! retries, and how it winds down.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Catalog API boundaries
// ---------------------------------------------------------------------------

/// Base URL of the catalog API when neither `--api-base-url` nor
/// `API_BASE_URL` is given.
pub const DEFAULT_API_BASE_URL: &str = "https://api.gradient.academy";

/// Origin the API expects browser-like clients to announce.
pub const API_ORIGIN: &str = "https://gradient.academy";

/// User agent sent with every request.
pub const API_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 course-crawler";

/// How many courses the listing endpoint is asked for.
pub const DEFAULT_COURSE_PAGE_SIZE: u32 = 50;

/// Per-request timeout, covering connect, send and body read.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Requests per second across all workers. The API starts answering 429
/// quickly above this rate.
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 2;

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Total attempts per fetch, first try included.
pub const DEFAULT_RETRY_LIMIT: u32 = 4;

/// Delay before the first retry; doubles per attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);

/// Upper bound for a single backoff sleep.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Pause before the single batch-level retry of a busy SQLite transaction.
pub const STORE_BUSY_RETRY_DELAY: Duration = Duration::from_millis(50);

/// How long SQLite itself waits on a locked database before reporting busy.
pub const STORE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

/// Hard ceiling on concurrent workers, whatever the configuration says.
pub const MAX_CONCURRENCY: usize = 32;

/// How long an idle worker sleeps before re-checking the queue.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long in-flight tasks may keep running after cancellation.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error display
// ---------------------------------------------------------------------------

/// Maximum characters shown when previewing error response bodies.
pub const ERROR_BODY_PREVIEW_LENGTH: usize = 200;
