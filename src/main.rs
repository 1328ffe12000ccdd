// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use logstream_server::{
    aggregate::Aggregator,
    api::build_router,
    broadcast::Broadcaster,
    cfg::{config::AppConfig, logger::init_logger},
    cold_store::ColdStore,
    hot_store::HotStore,
    ingest::{IngestConfig, IngestPipeline},
    position::PositionStore,
    query::QueryRouter,
    retention::RetentionSweeper,
    state::AppState,
    tailer::{Tailer, TailerConfig},
};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Real-time log ingestion, indexing, and query service.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Override the HTTP bind address (otherwise read from HTTP_BIND_ADDR).
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = AppConfig::from_env().context("failed to load configuration")?;
    if let Some(bind) = cli.bind {
        cfg.http_bind_addr = bind;
    }

    let _logger_guard = init_logger(&cfg).context("failed to initialize logger")?;
    info!(bind = %cfg.http_bind_addr, "starting logstream-server");

    let cancel = CancellationToken::new();

    let cold = Arc::new(
        ColdStore::connect(&cfg.database_url, cfg.max_workers as u32 * 3)
            .await
            .context("failed to connect to cold store")?,
    );
    cold.migrate().await.context("failed to run cold store migrations")?;

    let hot = Arc::new(
        HotStore::connect(&cfg.redis_url(), cfg.cache_ttl_seconds.max(cfg.log_file_retention_days as u64 * 86_400))
            .await
            .context("failed to connect to hot store")?,
    );

    let positions = Arc::new(PositionStore::new());
    match cold.load_positions().await {
        Ok(snapshot) => positions.restore(snapshot),
        Err(err) => tracing::warn!(error = %err, "failed to restore file positions, starting from scratch"),
    }

    let broadcaster = Arc::new(Broadcaster::new());
    let query_router = Arc::new(QueryRouter::new(
        hot.clone(),
        cold.clone(),
        cfg.log_file_retention_days,
    ));
    let aggregator = Arc::new(Aggregator::new(cold.clone()));

    let state = AppState {
        config: Arc::new(cfg.clone()),
        hot: hot.clone(),
        cold: cold.clone(),
        broadcaster: broadcaster.clone(),
        query_router,
        aggregator,
        positions: positions.clone(),
    };

    let (record_tx, record_rx) = tokio::sync::mpsc::channel(4096);

    let tailer = Tailer::new(
        TailerConfig {
            root: cfg.log_base_path.clone(),
            scan_interval: cfg.tailer_scan_interval(),
            max_parallel_files: cfg.max_workers,
        },
        positions.clone(),
        cancel.clone(),
    );
    let tailer_handle = tokio::spawn(tailer.run(record_tx));

    let ingest = IngestPipeline::new(
        hot.clone(),
        cold.clone(),
        broadcaster.clone(),
        IngestConfig {
            batch_size: cfg.log_batch_size,
            flush_interval: cfg.flush_interval(),
            max_pending_batch: cfg.log_batch_size * 10,
            spill_path: cfg.log_base_path.join(".ingest-spill.jsonl"),
        },
        cancel.clone(),
    );
    let ingest_handle = tokio::spawn(ingest.run(record_rx));

    let sweeper = RetentionSweeper::new(
        cold.clone(),
        cfg.cold_store_retention_days,
        cfg.retention_sweep_interval(),
        cancel.clone(),
    );
    let sweeper_handle = tokio::spawn(sweeper.run());

    let heartbeat_handle = tokio::spawn(heartbeat_loop(
        broadcaster.clone(),
        cfg.broadcast_heartbeat_interval(),
        cancel.clone(),
    ));

    let position_sync_handle = tokio::spawn(position_sync_loop(
        positions.clone(),
        cold.clone(),
        cancel.clone(),
    ));

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&cfg.http_bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.http_bind_addr))?;

    let server_cancel = cancel.clone();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        server_cancel.cancelled().await;
    });

    tokio::select! {
        result = server => {
            result.context("http server error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            cancel.cancel();
        }
    }

    cancel.cancel();
    let _ = tokio::join!(
        tailer_handle,
        ingest_handle,
        sweeper_handle,
        heartbeat_handle,
        position_sync_handle
    );

    Ok(())
}

async fn heartbeat_loop(broadcaster: Arc<Broadcaster>, interval: std::time::Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                broadcaster.broadcast_stats().await;
            }
        }
    }
}

/// Periodically persists the in-memory position table to the cold store so
/// a restart resumes from the last safely processed offset (SPEC_FULL.md
/// §4.2).
async fn position_sync_loop(positions: Arc<PositionStore>, cold: Arc<ColdStore>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                sync_once(&positions, &cold).await;
                return;
            }
            _ = ticker.tick() => {
                sync_once(&positions, &cold).await;
            }
        }
    }
}

async fn sync_once(positions: &Arc<PositionStore>, cold: &Arc<ColdStore>) {
    for (path, offset) in positions.snapshot() {
        let key = PositionStore::key_for(&path);
        if let Err(err) = cold.save_position(&key, &path, offset).await {
            tracing::warn!(error = %err, path = %path, "failed to persist file position");
        }
    }
}
