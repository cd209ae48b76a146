// src/api/pacing.rs
//! Spaces request starts across all workers.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Hands out request slots at most `1/rate` apart.
///
/// The lock is held only long enough to reserve the next slot; the wait for
/// that slot happens outside it.
#[derive(Debug)]
pub struct RequestPacer {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn per_second(requests_per_second: u32) -> Option<Self> {
        if requests_per_second == 0 {
            return None;
        }
        Some(Self {
            interval: Duration::from_secs(1) / requests_per_second,
            next_slot: Mutex::new(None),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until this caller's slot comes up.
    pub async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}
