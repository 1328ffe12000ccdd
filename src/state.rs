// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Composition root. Every background service is constructed explicitly
//! here and handed around by `Arc`, rather than reached through a hidden
//! global — the same "no singletons" discipline the teacher's `Pool`/
//! `ClientConnection` types follow (SPEC_FULL.md §9).

use std::sync::Arc;

use crate::{
    aggregate::Aggregator, broadcast::Broadcaster, cfg::config::AppConfig, cold_store::ColdStore,
    hot_store::HotStore, position::PositionStore, query::QueryRouter,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub hot: Arc<HotStore>,
    pub cold: Arc<ColdStore>,
    pub broadcaster: Arc<Broadcaster>,
    pub query_router: Arc<QueryRouter>,
    pub aggregator: Arc<Aggregator>,
    pub positions: Arc<PositionStore>,
}
