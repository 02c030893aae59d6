// Copyright 2024 Tally Labs Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![warn(missing_docs)]
//! # Relayer Monitor
//!
//! The in-memory operational log and state counters the host
//! application and the monitor HTTP API read from. The log is a bounded
//! ring buffer, an observability aid rather than an audit trail: once
//! full, the oldest entries are silently dropped.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Prometheus metrics for the relayer.
pub mod metrics;

pub use metrics::Metrics;

/// How many log entries the ring buffer retains.
pub const LOG_CAPACITY: usize = 100;

/// Severity tag of an operational log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Routine progress.
    Info,
    /// Recovered or degraded conditions.
    Warn,
    /// Failures surfaced to the caller.
    Error,
    /// A decryption made it on-chain.
    Success,
}

/// One entry of the operational log.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// Milliseconds since the unix epoch.
    pub timestamp_ms: u64,
    /// Severity tag.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// Optional structured payload (target ids, tx hashes, counts).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A point-in-time snapshot of the relayer's operational state.
///
/// Always a deep copy; callers can never reach the live buffers through it.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerState {
    /// Whether the poll scheduler is active.
    pub is_running: bool,
    /// When the scheduler last completed a watch-list pass.
    pub last_check_ms: Option<u64>,
    /// When a decrypted result last made it on-chain.
    pub last_decryption_ms: Option<u64>,
    /// Targets processed since process start.
    pub processed_count: u64,
    /// Errors observed since process start.
    pub error_count: u64,
    /// The most recent log entries, oldest first.
    pub logs: Vec<LogEntry>,
}

#[derive(Debug, Default)]
struct Inner {
    running: bool,
    last_check_ms: Option<u64>,
    last_decryption_ms: Option<u64>,
    processed_count: u64,
    error_count: u64,
    logs: VecDeque<LogEntry>,
}

/// The operational monitor: bounded log + counters + live subscriptions.
///
/// Cheap to clone; all clones share the same state. Appends are safe
/// from any task. Subscribers receive entries over a broadcast channel,
/// so a slow or dropped subscriber can never block an append or starve
/// other subscribers.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<RwLock<Inner>>,
    feed: broadcast::Sender<LogEntry>,
    capacity: usize,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("capacity", &self.capacity)
            .finish()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl Monitor {
    /// Creates a monitor with the standard [`LOG_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    /// Creates a monitor retaining at most `capacity` log entries.
    pub fn with_capacity(capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(capacity.max(16));
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            feed,
            capacity,
        }
    }

    /// Appends an entry, evicting the oldest one once full, and fans it
    /// out to all current subscribers.
    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) {
        let entry = LogEntry {
            timestamp_ms: now_ms(),
            level,
            message: message.into(),
            data,
        };
        {
            let mut inner = self.inner.write();
            while inner.logs.len() >= self.capacity.max(1) {
                inner.logs.pop_front();
            }
            inner.logs.push_back(entry.clone());
        }
        // No receivers is fine, the entry is already in the buffer.
        let _ = self.feed.send(entry);
    }

    /// Appends an info-level entry.
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message, None);
    }

    /// Appends a warn-level entry.
    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message, None);
    }

    /// Appends an error-level entry.
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message, None);
    }

    /// Appends a success-level entry.
    pub fn success(&self, message: impl Into<String>) {
        self.log(LogLevel::Success, message, None);
    }

    /// Subscribes to the live log feed. Dropping the receiver
    /// unsubscribes; a lagging receiver only loses its own entries.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.feed.subscribe()
    }

    /// Returns a defensive snapshot of the current state.
    pub fn state(&self) -> RelayerState {
        let inner = self.inner.read();
        RelayerState {
            is_running: inner.running,
            last_check_ms: inner.last_check_ms,
            last_decryption_ms: inner.last_decryption_ms,
            processed_count: inner.processed_count,
            error_count: inner.error_count,
            logs: inner.logs.iter().cloned().collect(),
        }
    }

    /// Flags the poll scheduler as running or stopped.
    pub fn set_running(&self, running: bool) {
        self.inner.write().running = running;
    }

    /// Whether the poll scheduler is currently flagged as running.
    pub fn is_running(&self) -> bool {
        self.inner.read().running
    }

    /// Records the completion of a watch-list pass.
    pub fn note_check(&self) {
        self.inner.write().last_check_ms = Some(now_ms());
    }

    /// Records one processed target.
    pub fn note_processed(&self) {
        self.inner.write().processed_count += 1;
    }

    /// Records a decryption that made it on-chain.
    pub fn note_decryption(&self) {
        self.inner.write().last_decryption_ms = Some(now_ms());
    }

    /// Records one error.
    pub fn note_error(&self) {
        self.inner.write().error_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_keeps_the_most_recent_entries() {
        let monitor = Monitor::new();
        for i in 0..150u32 {
            monitor.info(format!("entry {i}"));
        }
        let state = monitor.state();
        assert_eq!(state.logs.len(), LOG_CAPACITY);
        // oldest-first order preserved, entries 50..150 survive.
        assert_eq!(state.logs.first().unwrap().message, "entry 50");
        assert_eq!(state.logs.last().unwrap().message, "entry 149");
    }

    #[test]
    fn snapshot_is_defensive() {
        let monitor = Monitor::new();
        monitor.info("one");
        let mut state = monitor.state();
        state.logs.clear();
        state.processed_count = 99;
        let fresh = monitor.state();
        assert_eq!(fresh.logs.len(), 1);
        assert_eq!(fresh.processed_count, 0);
    }

    #[test]
    fn counters_and_timestamps() {
        let monitor = Monitor::new();
        assert!(!monitor.state().is_running);
        monitor.set_running(true);
        monitor.note_check();
        monitor.note_processed();
        monitor.note_processed();
        monitor.note_error();
        monitor.note_decryption();
        let state = monitor.state();
        assert!(state.is_running);
        assert_eq!(state.processed_count, 2);
        assert_eq!(state.error_count, 1);
        assert!(state.last_check_ms.is_some());
        assert!(state.last_decryption_ms.is_some());
    }

    #[tokio::test]
    async fn dropped_subscriber_does_not_affect_others() {
        let monitor = Monitor::new();
        let mut alive = monitor.subscribe();
        let dead = monitor.subscribe();
        drop(dead);
        monitor.warn("still delivered");
        let entry = alive.recv().await.unwrap();
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.message, "still delivered");
    }

    #[test]
    fn structured_data_round_trips_into_the_snapshot() {
        let monitor = Monitor::new();
        monitor.log(
            LogLevel::Success,
            "stored",
            Some(serde_json::json!({ "txHash": "0xabc" })),
        );
        let state = monitor.state();
        let data = state.logs[0].data.as_ref().unwrap();
        assert_eq!(data["txHash"], "0xabc");
    }
}
