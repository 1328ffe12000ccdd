// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Aggregator (C9): time-bucketed and grouped rollups. Historical windows
//! are pushed down to the cold store's SQL aggregates; when the grouping
//! touches only hot-tier-fresh data, pulling rows and folding them in-process
//! would be equivalent, but SPEC_FULL.md scopes aggregation to the cold
//! store's durable view since that is the one source every record eventually
//! reaches.

use std::sync::Arc;

use serde::Serialize;

use crate::{
    cold_store::ColdStore,
    model::AnalyticsFilter,
};

pub struct Aggregator {
    cold: Arc<ColdStore>,
}

#[derive(Debug, Serialize)]
pub struct OverviewResponse {
    pub total_logs: i64,
    pub error_count: i64,
    pub success_count: i64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct DailyPoint {
    pub date: String,
    pub error: i64,
    pub success: i64,
}

#[derive(Debug, Serialize)]
pub struct ErrorDistributionPoint {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Serialize)]
pub struct UrlPerformancePoint {
    pub url: String,
    pub avg_response_time_ms: f64,
    pub count: i64,
}

impl Aggregator {
    pub fn new(cold: Arc<ColdStore>) -> Self {
        Self { cold }
    }

    pub async fn overview(&self, filter: &AnalyticsFilter) -> anyhow::Result<OverviewResponse> {
        let stats = self.cold.overview(filter).await?;
        let success = stats.total - stats.errors;
        let success_rate = if stats.total == 0 {
            0.0
        } else {
            round2(success as f64 / stats.total as f64 * 100.0)
        };
        Ok(OverviewResponse {
            total_logs: stats.total,
            error_count: stats.errors,
            success_count: success,
            success_rate,
            avg_duration_ms: round2(stats.avg_duration_ms.unwrap_or(0.0)),
        })
    }

    pub async fn logs_per_day(&self, filter: &AnalyticsFilter) -> anyhow::Result<Vec<DailyPoint>> {
        let buckets = self.cold.daily_breakdown(filter).await?;
        Ok(buckets
            .into_iter()
            .map(|b| DailyPoint {
                date: b.day,
                error: b.error,
                success: b.success,
            })
            .collect())
    }

    pub async fn error_distribution(
        &self,
        filter: &AnalyticsFilter,
    ) -> anyhow::Result<Vec<ErrorDistributionPoint>> {
        let rows = self.cold.error_distribution(filter).await?;
        Ok(rows
            .into_iter()
            .map(|r| ErrorDistributionPoint {
                name: r.key,
                value: r.count,
            })
            .collect())
    }

    pub async fn top_response_time_urls(
        &self,
        limit: u32,
    ) -> anyhow::Result<Vec<UrlPerformancePoint>> {
        let rows = self.cold.top_response_time_urls(limit).await?;
        Ok(rows
            .into_iter()
            .map(|r| UrlPerformancePoint {
                url: r.url,
                avg_response_time_ms: round2(r.avg_duration_ms),
                count: r.count,
            })
            .collect())
    }

    pub async fn url_heat_map(&self, limit: u32) -> anyhow::Result<Vec<ErrorDistributionPoint>> {
        let rows = self.cold.url_heat_map(limit).await?;
        Ok(rows
            .into_iter()
            .map(|(url, count)| ErrorDistributionPoint { name: url, value: count })
            .collect())
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
