// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! File tailer (C3): recursively discovers `*.log`/`*.txt` files under a
//! root, reads each incrementally from its last known position, and hands
//! complete frames to the ingest pipeline. Files are processed independently
//! but each file's own bytes are always parsed strictly in offset order, so
//! the position cursor for that file advances monotonically.

use std::{
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use tokio::{
    io::{AsyncReadExt, AsyncSeekExt},
    sync::{Semaphore, mpsc},
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use crate::{
    model::Record,
    parser,
    position::{FileIdentity, PositionStore, Reconciled},
};

pub struct TailerConfig {
    pub root: PathBuf,
    pub scan_interval: Duration,
    pub max_parallel_files: usize,
}

pub struct Tailer {
    cfg: TailerConfig,
    positions: Arc<PositionStore>,
    cancel: CancellationToken,
}

impl Tailer {
    pub fn new(cfg: TailerConfig, positions: Arc<PositionStore>, cancel: CancellationToken) -> Self {
        Self {
            cfg,
            positions,
            cancel,
        }
    }

    /// Runs the scan loop until cancelled, forwarding parsed records to
    /// `sink`. Never returns an error: per-file I/O failures are logged and
    /// skipped so one bad file cannot stall the others.
    pub async fn run(self, sink: mpsc::Sender<Record>) {
        let semaphore = Arc::new(Semaphore::new(self.cfg.max_parallel_files.max(1)));
        let mut ticker = tokio::time::interval(self.cfg.scan_interval);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("tailer shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.scan_once(&semaphore, &sink).await;
                }
            }
        }
    }

    async fn scan_once(&self, semaphore: &Arc<Semaphore>, sink: &mpsc::Sender<Record>) {
        let files = match discover_files(&self.cfg.root) {
            Ok(f) => f,
            Err(err) => {
                warn!(error = %err, "failed to walk log root");
                return;
            },
        };

        let mut handles = Vec::with_capacity(files.len());
        for path in files {
            let permit = semaphore.clone().acquire_owned().await;
            let Ok(permit) = permit else { continue };
            let positions = self.positions.clone();
            let sink = sink.clone();
            let cancel = self.cancel.clone();
            let span = tracing::info_span!("tail_file", path = %path.display());
            handles.push(tokio::spawn(
                async move {
                    let _permit = permit;
                    if let Err(err) = process_file(&path, &positions, &sink, &cancel).await {
                        warn!(error = %err, "failed to tail file");
                    }
                }
                .instrument(span),
            ));
        }

        for h in handles {
            let _ = h.await;
        }
    }
}

fn discover_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in WalkBuilder::new(root).hidden(false).build() {
        let entry = entry.context("walking log root")?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let is_log = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ext == "log" || ext == "txt");
        if is_log {
            out.push(path.to_path_buf());
        }
    }
    Ok(out)
}

async fn process_file(
    path: &Path,
    positions: &Arc<PositionStore>,
    sink: &mpsc::Sender<Record>,
    cancel: &CancellationToken,
) -> Result<()> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("stat {path:?}"))?;
    let identity = FileIdentity {
        dev: metadata.dev(),
        ino: metadata.ino(),
    };
    let size = metadata.size();

    let from = match positions.reconcile(path, size, identity) {
        Reconciled::Rotated => {
            debug!("file rotated, resetting position to 0");
            0
        },
        Reconciled::Continue { from } => from,
    };

    if from >= size {
        return Ok(());
    }

    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("open {path:?}"))?;
    file.seek(std::io::SeekFrom::Start(from))
        .await
        .with_context(|| format!("seek {path:?}"))?;

    let to_read = (size - from) as usize;
    let mut buf = vec![0u8; to_read];
    let mut read_total = 0usize;
    while read_total < to_read {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let n = file.read(&mut buf[read_total..]).await?;
        if n == 0 {
            break;
        }
        read_total += n;
    }
    buf.truncate(read_total);

    let source_hint = path.to_string_lossy().to_string();
    let outcome = parser::parse(&buf, &source_hint);

    if outcome.counters.rejected > 0
        || outcome.counters.field_missing > 0
        || outcome.counters.cid_mismatch > 0
        || outcome.counters.oversized > 0
    {
        warn!(
            rejected = outcome.counters.rejected,
            field_missing = outcome.counters.field_missing,
            cid_mismatch = outcome.counters.cid_mismatch,
            oversized = outcome.counters.oversized,
            "frame parse anomalies"
        );
    }

    for record in outcome.records {
        if sink.send(record).await.is_err() {
            // Receiver gone; nothing more to do this pass.
            return Ok(());
        }
    }

    positions.advance(path, from + outcome.consumed as u64);
    Ok(())
}
