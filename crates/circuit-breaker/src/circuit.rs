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

//! A single circuit

use std::time::Duration;

use corvid_errors::PlatformError;
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Breaker tuning, overridable globally and per (service, endpoint).
#[derive(Debug, Clone)]
pub struct Options {
    pub disabled: bool,

    /// Failure rate at which the circuit trips
    pub threshold: f64,
    /// Calls required before the rate is meaningful
    pub min_samples: u64,

    /// Backoff growth factor applied on every re-open
    pub multiplier: f64,
    /// Randomization applied to each backoff interval, 0 disables
    pub randomization_factor: f64,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub max_elapsed_time_ms: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            disabled: false,
            threshold: 0.95,
            min_samples: 100,
            multiplier: 2.0,
            randomization_factor: 0.0,
            initial_interval_ms: 100,
            max_interval_ms: 60 * 1000,
            max_elapsed_time_ms: 24 * 3600 * 1000,
        }
    }
}

/// Partial options as they appear in configuration; present fields overlay
/// onto whatever the options already hold.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptionsPatch {
    pub disabled: Option<bool>,
    pub threshold: Option<f64>,
    pub min_samples: Option<u64>,
    pub multiplier: Option<f64>,
    pub randomization_factor: Option<f64>,
    pub initial_interval_ms: Option<u64>,
    pub max_interval_ms: Option<u64>,
    pub max_elapsed_time_ms: Option<u64>,
}

impl Options {
    pub(crate) fn apply(&mut self, patch: &OptionsPatch) {
        if let Some(v) = patch.disabled {
            self.disabled = v;
        }
        if let Some(v) = patch.threshold {
            self.threshold = v;
        }
        if let Some(v) = patch.min_samples {
            self.min_samples = v;
        }
        if let Some(v) = patch.multiplier {
            self.multiplier = v;
        }
        if let Some(v) = patch.randomization_factor {
            self.randomization_factor = v;
        }
        if let Some(v) = patch.initial_interval_ms {
            self.initial_interval_ms = v;
        }
        if let Some(v) = patch.max_interval_ms {
            self.max_interval_ms = v;
        }
        if let Some(v) = patch.max_elapsed_time_ms {
            self.max_elapsed_time_ms = v;
        }
    }
}

struct CircuitState {
    opts: Options,

    successes: u64,
    failures: u64,

    /// End of the current open window; `None` while closed or half-open
    open_until: Option<Instant>,
    half_open: bool,
    /// Whether the half-open probe has been handed out
    probe_admitted: bool,

    /// Interval the next trip will use
    backoff_interval: Duration,
    /// When the breaker first tripped in this backoff sequence
    backoff_started: Option<Instant>,
}

impl CircuitState {
    fn new(opts: Options) -> Self {
        let initial = Duration::from_millis(opts.initial_interval_ms);
        Self {
            opts,
            successes: 0,
            failures: 0,
            open_until: None,
            half_open: false,
            probe_admitted: false,
            backoff_interval: initial,
            backoff_started: None,
        }
    }

    fn should_trip(&self) -> bool {
        let total = self.successes + self.failures;
        if total < self.opts.min_samples {
            return false;
        }
        (self.failures as f64) / (total as f64) >= self.opts.threshold
    }

    /// The interval for this trip, advancing the sequence for the next one.
    fn next_interval(&mut self) -> Duration {
        let now = Instant::now();
        let started = *self.backoff_started.get_or_insert(now);
        let max = Duration::from_millis(self.opts.max_interval_ms);

        let mut interval = self.backoff_interval.min(max);
        if self.opts.randomization_factor > 0.0 {
            let delta = interval.as_secs_f64() * self.opts.randomization_factor;
            let jitter = rand::random::<f64>() * 2.0 * delta - delta;
            interval = Duration::from_secs_f64((interval.as_secs_f64() + jitter).max(0.0));
        }

        // Past the elapsed ceiling the sequence stops growing and stays at
        // the max interval.
        if now.duration_since(started)
            >= Duration::from_millis(self.opts.max_elapsed_time_ms)
        {
            self.backoff_interval = max;
            return max;
        }

        let next = self.backoff_interval.as_secs_f64() * self.opts.multiplier;
        self.backoff_interval = Duration::from_secs_f64(next).min(max);
        interval
    }

    fn trip(&mut self) {
        let interval = self.next_interval();
        self.open_until = Some(Instant::now() + interval);
        self.half_open = false;
        self.probe_admitted = false;
    }

    fn reset(&mut self) {
        self.successes = 0;
        self.failures = 0;
        self.open_until = None;
        self.half_open = false;
        self.probe_admitted = false;
        self.backoff_interval = Duration::from_millis(self.opts.initial_interval_ms);
        self.backoff_started = None;
    }

    fn open(&mut self) -> bool {
        if let Some(until) = self.open_until {
            if Instant::now() < until {
                return true;
            }
            // Window elapsed: half-open, admit a single probe
            self.open_until = None;
            self.half_open = true;
            self.probe_admitted = true;
            return false;
        }

        if self.half_open {
            if self.probe_admitted {
                return true;
            }
            self.probe_admitted = true;
            return false;
        }

        false
    }

    fn success(&mut self) {
        if self.half_open {
            self.reset();
            return;
        }
        self.successes += 1;
    }

    fn fail(&mut self) {
        self.failures += 1;

        if self.half_open {
            // Probe failed, back to open with a longer window
            self.trip();
            return;
        }
        if self.open_until.is_none() && self.should_trip() {
            self.trip();
        }
    }
}

/// A circuit for one (service, endpoint) pair. Safe for concurrent
/// `open`/`result` from any number of callers.
pub struct Circuit {
    disabled: bool,
    state: RwLock<CircuitState>,
}

impl Circuit {
    pub fn new(opts: Options) -> Self {
        Self {
            disabled: opts.disabled,
            state: RwLock::new(CircuitState::new(opts)),
        }
    }

    /// Whether a caller must not attempt a request right now. A `false`
    /// return from an open-window circuit admits the half-open probe.
    pub async fn open(&self) -> bool {
        if self.disabled {
            return false;
        }
        self.state.write().await.open()
    }

    /// Report the outcome of a call. `None` counts as success.
    pub async fn result(&self, err: Option<&PlatformError>) {
        let mut state = self.state.write().await;
        match err {
            Some(_) => state.fail(),
            None => state.success(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn timeout_err() -> PlatformError {
        PlatformError::timeout("code", "description")
    }

    #[tokio::test(start_paused = true)]
    async fn trips_after_min_samples_at_threshold() {
        let circuit = Circuit::new(Options::default());

        for _ in 0..99 {
            circuit.result(Some(&timeout_err())).await;
        }
        assert!(!circuit.open().await, "below min samples, must stay closed");

        circuit.result(Some(&timeout_err())).await;
        assert!(circuit.open().await);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_circuit_is_ready() {
        let circuit = Circuit::new(Options::default());
        assert!(!circuit.open().await);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_backoff_window() {
        let circuit = Circuit::new(Options::default());

        for _ in 0..100 {
            circuit.result(Some(&timeout_err())).await;
        }
        assert!(circuit.open().await);

        advance(Duration::from_millis(101)).await;
        assert!(!circuit.open().await, "window elapsed, probe admitted");
        circuit.result(None).await;
        assert!(!circuit.open().await, "successful probe closes the circuit");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens_with_multiplied_window() {
        let circuit = Circuit::new(Options::default());

        for _ in 0..100 {
            circuit.result(Some(&timeout_err())).await;
        }
        advance(Duration::from_millis(101)).await;
        assert!(!circuit.open().await);

        // Probe fails: 100ms * multiplier(2) = 200ms window
        circuit.result(Some(&timeout_err())).await;
        assert!(circuit.open().await);
        advance(Duration::from_millis(101)).await;
        assert!(circuit.open().await, "still inside the doubled window");
        advance(Duration::from_millis(100)).await;
        assert!(!circuit.open().await);
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_probe_admitted_while_half_open() {
        let circuit = Circuit::new(Options::default());

        for _ in 0..100 {
            circuit.result(Some(&timeout_err())).await;
        }
        advance(Duration::from_millis(101)).await;

        assert!(!circuit.open().await, "first caller gets the probe");
        assert!(circuit.open().await, "second caller is held back");
    }

    #[tokio::test(start_paused = true)]
    async fn successes_keep_rate_below_threshold() {
        let circuit = Circuit::new(Options::default());

        // 10% successes keeps the failure rate at 0.9, under 0.95
        for _ in 0..20 {
            circuit.result(None).await;
        }
        for _ in 0..180 {
            circuit.result(Some(&timeout_err())).await;
        }
        assert!(!circuit.open().await);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_circuit_never_opens() {
        let circuit = Circuit::new(Options {
            disabled: true,
            ..Options::default()
        });

        for _ in 0..200 {
            circuit.result(Some(&timeout_err())).await;
        }
        assert!(!circuit.open().await);
    }
}
