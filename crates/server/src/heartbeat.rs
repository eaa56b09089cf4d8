// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Corvid Contributors

//! Last-heartbeat-received clock, consulted by the discovery loop.

use std::sync::RwLock;
use std::time::Duration;

use tokio::time::Instant;

/// Records when we last heard a heartbeat and whether that is recent
/// enough.
pub struct Heartbeat {
    last: RwLock<Instant>,
    max_diff: Duration,
}

impl Heartbeat {
    pub fn new(max_diff: Duration) -> Self {
        Self {
            last: RwLock::new(Instant::now()),
            max_diff,
        }
    }

    /// Pulse the clock: a heartbeat just arrived.
    pub fn beat(&self) {
        *self.last.write().unwrap() = Instant::now();
    }

    /// Whether a heartbeat arrived within the allowed window.
    pub fn healthy(&self) -> bool {
        let last = *self.last.read().unwrap();
        last + self.max_diff > Instant::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn healthy_until_window_elapses() {
        let hb = Heartbeat::new(Duration::from_secs(60));
        assert!(hb.healthy());

        advance(Duration::from_secs(59)).await;
        assert!(hb.healthy());

        advance(Duration::from_secs(2)).await;
        assert!(!hb.healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn beat_resets_the_clock() {
        let hb = Heartbeat::new(Duration::from_secs(60));
        advance(Duration::from_secs(61)).await;
        assert!(!hb.healthy());

        hb.beat();
        assert!(hb.healthy());
    }
}
