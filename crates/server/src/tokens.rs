// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Corvid Contributors
//
// This file is part of Corvid.
//
// Corvid is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// Corvid is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Corvid. If not, see <https://www.gnu.org/licenses/>.

//! Per-calling-service admission tokens
//!
//! Each caller gets its own bounded pool so one noisy neighbour cannot
//! starve every other caller. Pools are allocated lazily with a
//! double-checked write on miss.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};

/// Admission pools for every calling service.
pub struct TokenBuckets {
    buckets: RwLock<HashMap<String, Arc<Semaphore>>>,
    tokens_per_caller: usize,
    inflight: Arc<AtomicU64>,
}

impl TokenBuckets {
    pub fn new(tokens_per_caller: usize) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            tokens_per_caller,
            inflight: Arc::new(AtomicU64::new(0)),
        }
    }

    async fn bucket(&self, caller: &str) -> Arc<Semaphore> {
        {
            let buckets = self.buckets.read().await;
            if let Some(bucket) = buckets.get(caller) {
                return Arc::clone(bucket);
            }
        }

        let mut buckets = self.buckets.write().await;
        // Double check after taking the write lock
        if let Some(bucket) = buckets.get(caller) {
            return Arc::clone(bucket);
        }
        let bucket = Arc::new(Semaphore::new(self.tokens_per_caller));
        buckets.insert(caller.to_string(), Arc::clone(&bucket));
        bucket
    }

    /// Acquire a token for this caller, bounded by `timeout`. `None` when
    /// the pool stayed exhausted for the whole wait.
    pub async fn acquire(&self, caller: &str, timeout: Duration) -> Option<AdmissionToken> {
        let bucket = self.bucket(caller).await;
        let permit = tokio::time::timeout(timeout, Arc::clone(&bucket).acquire_owned())
            .await
            .ok()?
            .ok()?;

        let now_in_flight = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!("corvid_server_tokens_available", "caller" => caller.to_string())
            .set(bucket.available_permits() as f64);
        metrics::gauge!("corvid_server_inflight_requests", "caller" => caller.to_string())
            .set(now_in_flight as f64);

        Some(AdmissionToken {
            _permit: permit,
            inflight: Arc::clone(&self.inflight),
        })
    }

    pub fn inflight(&self) -> u64 {
        self.inflight.load(Ordering::SeqCst)
    }

    /// (caller, available, capacity) for every allocated pool.
    pub async fn snapshot(&self) -> Vec<(String, usize, usize)> {
        let buckets = self.buckets.read().await;
        buckets
            .iter()
            .map(|(caller, bucket)| {
                (
                    caller.clone(),
                    bucket.available_permits(),
                    self.tokens_per_caller,
                )
            })
            .collect()
    }
}

/// Held for the duration of one admitted request.
pub struct AdmissionToken {
    _permit: OwnedSemaphorePermit,
    inflight: Arc<AtomicU64>,
}

impl Drop for AdmissionToken {
    fn drop(&mut self) {
        self.inflight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tokens_bound_concurrency_per_caller() {
        let buckets = Arc::new(TokenBuckets::new(2));

        let t1 = buckets.acquire("caller", Duration::from_millis(10)).await;
        let t2 = buckets.acquire("caller", Duration::from_millis(10)).await;
        assert!(t1.is_some() && t2.is_some());
        assert_eq!(buckets.inflight(), 2);

        // Pool exhausted: third acquisition times out
        assert!(buckets
            .acquire("caller", Duration::from_millis(10))
            .await
            .is_none());

        // Another caller has its own pool
        assert!(buckets
            .acquire("other", Duration::from_millis(10))
            .await
            .is_some());

        drop(t1);
        assert!(buckets
            .acquire("caller", Duration::from_millis(10))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn dropping_tokens_releases_inflight() {
        let buckets = TokenBuckets::new(1);
        let token = buckets.acquire("caller", Duration::from_millis(10)).await;
        assert_eq!(buckets.inflight(), 1);
        drop(token);
        assert_eq!(buckets.inflight(), 0);
    }

    #[tokio::test]
    async fn snapshot_reports_capacity() {
        let buckets = TokenBuckets::new(3);
        let _token = buckets.acquire("caller", Duration::from_millis(10)).await;
        let snapshot = buckets.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0, "caller");
        assert_eq!(snapshot[0].1, 2);
        assert_eq!(snapshot[0].2, 3);
    }
}
