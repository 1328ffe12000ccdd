// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Shared fixtures for the tailer/parser/position integration scenarios.

use std::{path::Path, time::Duration};
use std::sync::Arc;

use logstream_server::{
    model::Record,
    position::PositionStore,
    tailer::{Tailer, TailerConfig},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

pub struct Harness {
    pub positions: Arc<PositionStore>,
    pub rx: mpsc::Receiver<Record>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Harness {
    /// Spawns a tailer against `root` with a short scan interval so tests
    /// don't have to wait long for a pass.
    pub fn spawn(root: &Path) -> Self {
        let positions = Arc::new(PositionStore::new());
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(64);
        let tailer = Tailer::new(
            TailerConfig {
                root: root.to_path_buf(),
                scan_interval: Duration::from_millis(30),
                max_parallel_files: 4,
            },
            positions.clone(),
            cancel.clone(),
        );
        let handle = tokio::spawn(tailer.run(tx));
        Self {
            positions,
            rx,
            cancel,
            handle,
        }
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

pub async fn recv_with_timeout(rx: &mut mpsc::Receiver<Record>, millis: u64) -> Option<Record> {
    tokio::time::timeout(Duration::from_millis(millis), rx.recv())
        .await
        .ok()
        .flatten()
}

/// Wraps `body` between twin ten-asterisk markers carrying `cid`.
pub fn frame(cid: &str, body: &str) -> String {
    format!("{m}{cid}{m}\n{body}\n{m}{cid}{m}\n", m = "*".repeat(10))
}
