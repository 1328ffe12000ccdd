// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Live broadcaster (C7): fan-out of ingested records to WebSocket
//! subscribers, each with its own filter predicate, plus a periodic stats
//! heartbeat.
//!
//! Subscribers come and go far more often than the registry itself is
//! iterated wholesale, so a `DashMap`-keyed registry beats a single
//! `Mutex<Vec<_>>`.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::model::{Filter, Record, wire::RecordDto};

pub type SubscriptionId = Uuid;

/// A message delivered to a subscriber's sink.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Connected,
    NewLogs { logs: Vec<RecordDto>, count: usize },
    StatsUpdate(StatsSnapshot),
    Pong,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    pub total_logs: u64,
    pub success_logs: u64,
    pub error_logs: u64,
    pub success_rate: f64,
}

struct Subscription {
    filter: Mutex<Filter>,
    sink: mpsc::Sender<OutboundMessage>,
    consecutive_failures: AtomicU64,
}

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    errors: AtomicU64,
}

/// Per-sink outbound buffer depth (SPEC_FULL.md §4.7).
const SINK_BUFFER: usize = 256;
const MAX_CONSECUTIVE_FAILURES: u64 = 2;

pub struct Broadcaster {
    subscriptions: DashMap<SubscriptionId, Arc<Subscription>>,
    counters: Counters,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
            counters: Counters::default(),
        }
    }

    /// Registers a new subscriber and returns its id plus the receiving end
    /// of its outbound channel.
    pub fn subscribe(&self, filter: Filter) -> (SubscriptionId, mpsc::Receiver<OutboundMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(SINK_BUFFER);
        self.subscriptions.insert(
            id,
            Arc::new(Subscription {
                filter: Mutex::new(filter),
                sink: tx,
                consecutive_failures: AtomicU64::new(0),
            }),
        );
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.remove(&id);
    }

    /// Replaces a live subscriber's predicate in response to a `subscribe`
    /// control message (SPEC_FULL.md §4.7).
    pub async fn update_filter(&self, id: SubscriptionId, filter: Filter) {
        if let Some(sub) = self.subscriptions.get(&id) {
            *sub.filter.lock().await = filter;
        }
    }

    /// Evaluates every live predicate against `record` and delivers matches.
    /// A sink whose buffer is full is treated as lagging; two consecutive
    /// failures unsubscribe it.
    pub async fn publish(&self, record: &Record) {
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        if record.is_error() {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
        }

        let dto = RecordDto::from(record);
        let message = OutboundMessage::NewLogs {
            logs: vec![dto],
            count: 1,
        };

        let mut dead = Vec::new();
        for entry in self.subscriptions.iter() {
            let id = *entry.key();
            let sub = entry.value().clone();
            let matches = sub.filter.lock().await.matches(record);
            if !matches {
                continue;
            }
            match sub.sink.try_send(message.clone()) {
                Ok(()) => sub.consecutive_failures.store(0, Ordering::Relaxed),
                Err(_) => {
                    let failures = sub.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                    if failures >= MAX_CONSECUTIVE_FAILURES {
                        dead.push(id);
                    }
                },
            }
        }
        for id in dead {
            self.unsubscribe(id);
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        let total = self.counters.total.load(Ordering::Relaxed);
        let errors = self.counters.errors.load(Ordering::Relaxed);
        let success = total.saturating_sub(errors);
        let success_rate = if total == 0 {
            0.0
        } else {
            (success as f64 / total as f64) * 100.0
        };
        StatsSnapshot {
            total_logs: total,
            success_logs: success,
            error_logs: errors,
            success_rate: (success_rate * 100.0).round() / 100.0,
        }
    }

    /// Pushes the current stats snapshot to every live subscriber. Called by
    /// a periodic heartbeat task (default every 2s, SPEC_FULL.md §4.7).
    pub async fn broadcast_stats(&self) {
        let snapshot = self.stats();
        let message = OutboundMessage::StatsUpdate(snapshot);
        let mut dead = Vec::new();
        for entry in self.subscriptions.iter() {
            if entry.value().sink.try_send(message.clone()).is_err() {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.unsubscribe(id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn sample(api_name: &str, log_level: crate::model::LogLevel) -> Record {
        Record {
            correlation_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            timestamp_raw: "2025-01-01T00:00:00+00:00".to_string(),
            api_name: api_name.to_string(),
            service_name: "svc".to_string(),
            log_level,
            session_id: None,
            party_id: None,
            record_type: None,
            has_error: None,
            duration_ms: None,
            url: None,
            request: None,
            response: None,
            error_message: None,
            error_trace: None,
            header_log: None,
            source_file: "a.log".to_string(),
            ingested_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscriber_isolation_by_predicate() {
        let b = Broadcaster::new();
        let (_id_a, mut rx_a) = b.subscribe(Filter {
            api_name: Some("X".to_string()),
            ..Default::default()
        });
        let (_id_b, mut rx_b) = b.subscribe(Filter {
            log_level: Some(crate::model::LogLevel::Error),
            ..Default::default()
        });

        let record = sample("X", crate::model::LogLevel::Info);
        b.publish(&record).await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_subscriber_is_removed_after_two_failures() {
        let b = Broadcaster::new();
        let (id, rx) = b.subscribe(Filter::default());
        drop(rx);
        let record = sample("X", crate::model::LogLevel::Info);
        b.publish(&record).await;
        b.publish(&record).await;
        assert!(b.subscriptions.get(&id).is_none());
    }
}
