// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Ingest pipeline (C6): consumes parsed records from the tailer, writes
//! through to the hot store, publishes to live subscribers, and batches
//! durable writes to the cold store with exponential-backoff retry.
//!
//! The retry wrapper is grounded directly on the journal-client reader's
//! `ExponentialBackoff` (base/cap/indefinite retries over the
//! `exponential-backoff` crate); the channel-decoupled batch-writer shape is
//! grounded on the native ingestion pipeline's log channel + batch flush.

use std::{sync::Arc, time::Duration};

use exponential_backoff::Backoff;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{broadcast::Broadcaster, cold_store::ColdStore, hot_store::HotStore, model::Record};

pub struct IngestConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// Bound on records held in memory awaiting a durable write before they
    /// spill to a local replay file (SPEC_FULL.md §4.6).
    pub max_pending_batch: usize,
    pub spill_path: std::path::PathBuf,
}

pub struct IngestPipeline {
    hot: Arc<HotStore>,
    cold: Arc<ColdStore>,
    broadcaster: Arc<Broadcaster>,
    cfg: IngestConfig,
    cancel: CancellationToken,
}

impl IngestPipeline {
    pub fn new(
        hot: Arc<HotStore>,
        cold: Arc<ColdStore>,
        broadcaster: Arc<Broadcaster>,
        cfg: IngestConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            hot,
            cold,
            broadcaster,
            cfg,
            cancel,
        }
    }

    /// Drains `rx` until the channel closes or cancellation fires, batching
    /// records for the cold store while writing through hot/broadcast
    /// immediately per record (SPEC_FULL.md §4.6 ordering note: subscribers
    /// may observe a record before it is durable).
    pub async fn run(self, mut rx: mpsc::Receiver<Record>) {
        let mut batch: Vec<Record> = Vec::with_capacity(self.cfg.batch_size);
        let mut ticker = tokio::time::interval(self.cfg.flush_interval);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.flush(&mut batch).await;
                    return;
                }
                maybe = rx.recv() => {
                    match maybe {
                        Some(record) => {
                            self.write_through(&record).await;
                            batch.push(record);
                            if batch.len() >= self.cfg.batch_size {
                                self.flush(&mut batch).await;
                            }
                        }
                        None => {
                            self.flush(&mut batch).await;
                            return;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.flush(&mut batch).await;
                    }
                }
            }

            if batch.len() > self.cfg.max_pending_batch {
                self.spill(&mut batch).await;
            }
        }
    }

    async fn write_through(&self, record: &Record) {
        if let Err(err) = self.hot.put(record).await {
            warn!(error = %err, cid = %record.correlation_id, "hot store write failed");
        }
        self.broadcaster.publish(record).await;
    }

    async fn flush(&self, batch: &mut Vec<Record>) {
        if batch.is_empty() {
            return;
        }
        let to_write = std::mem::take(batch);
        if let Err(err) = self.write_with_retry(&to_write).await {
            warn!(error = %err, count = to_write.len(), "cold store write exhausted retries, spilling");
            self.spill_records(&to_write).await;
        } else {
            info!(count = to_write.len(), "flushed batch to cold store");
        }
    }

    /// Base 500ms, cap 30s, indefinite retries (SPEC_FULL.md §4.6).
    async fn write_with_retry(&self, records: &[Record]) -> anyhow::Result<()> {
        let backoff = Backoff::new(u32::MAX, Duration::from_millis(500), Some(Duration::from_secs(30)));
        let mut attempt = 0u32;
        loop {
            match self.cold.upsert_batch(records).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    attempt += 1;
                    let Some(delay) = backoff.next(attempt) else {
                        return Err(err);
                    };
                    warn!(attempt, error = %err, delay_ms = delay.as_millis(), "cold store write failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {},
                        _ = self.cancel.cancelled() => return Err(err),
                    }
                },
            }
        }
    }

    async fn spill(&self, batch: &mut Vec<Record>) {
        let overflow: Vec<Record> = batch.drain(..).collect();
        self.spill_records(&overflow).await;
    }

    async fn spill_records(&self, records: &[Record]) {
        let Ok(serialized) = serde_json::to_string(records) else {
            return;
        };
        if let Some(parent) = self.cfg.spill_path.parent()
            && let Err(err) = tokio::fs::create_dir_all(parent).await
        {
            warn!(error = %err, "failed to create spill directory");
            return;
        }
        use tokio::io::AsyncWriteExt;
        match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.cfg.spill_path)
            .await
        {
            Ok(mut file) => {
                let _ = file.write_all(serialized.as_bytes()).await;
                let _ = file.write_all(b"\n").await;
            },
            Err(err) => warn!(error = %err, "failed to spill batch to disk"),
        }
    }
}
