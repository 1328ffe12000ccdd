// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Query router (C8): plans which tier(s) a filter needs, executes them
//! (concurrently when both), and merges with dedup-by-correlation-id,
//! preferring the hot copy (SPEC_FULL.md §4.8).

use std::{collections::HashMap, sync::Arc};

use chrono::{Duration as ChronoDuration, Utc};

use crate::{
    cold_store::ColdStore,
    hot_store::HotStore,
    model::{Filter, QueryPlan, QueryResult, Record},
};

pub struct QueryRouter {
    hot: Arc<HotStore>,
    cold: Arc<ColdStore>,
    hot_retention_days: i64,
}

impl QueryRouter {
    pub fn new(hot: Arc<HotStore>, cold: Arc<ColdStore>, hot_retention_days: i64) -> Self {
        Self {
            hot,
            cold,
            hot_retention_days,
        }
    }

    fn plan(&self, filter: &Filter) -> QueryPlan {
        if filter.correlation_id.is_some() {
            return QueryPlan::Both;
        }
        let hot_cutoff = Utc::now() - ChronoDuration::days(self.hot_retention_days);
        match (filter.start_date, filter.end_date) {
            (None, None) => QueryPlan::Both,
            (Some(start), _) if start >= hot_cutoff => QueryPlan::HotOnly,
            (_, Some(end)) if end < hot_cutoff => QueryPlan::ColdOnly,
            _ => QueryPlan::Both,
        }
    }

    pub async fn execute(&self, filter: Filter) -> QueryResult {
        let filter = filter.normalized();
        let plan = self.plan(&filter);

        let (hot_records, hot_ok, cold_records, cold_total, cold_ok) = match plan {
            QueryPlan::HotOnly => {
                let (records, ok) = self.query_hot(&filter).await;
                (records, ok, Vec::new(), 0, true)
            },
            QueryPlan::ColdOnly => {
                let (records, total, ok) = self.query_cold(&filter).await;
                (Vec::new(), true, records, total, ok)
            },
            QueryPlan::Both => {
                let (hot_fut, cold_fut) =
                    futures::join!(self.query_hot(&filter), self.query_cold(&filter));
                let (hot_records, hot_ok) = hot_fut;
                let (cold_records, cold_total, cold_ok) = cold_fut;
                (hot_records, hot_ok, cold_records, cold_total, cold_ok)
            },
        };

        let merged = merge_dedup(hot_records, cold_records);
        let total = if plan == QueryPlan::HotOnly {
            merged.len() as u64
        } else {
            // cold_total already counts everything cold-side matching the
            // filter; hot-only-visible dedup additions are rare enough
            // (hot is newer-than-retention-cutoff data, normally present in
            // cold too once flushed) that using cold_total as the base and
            // reconciling against the merged length is more honest than
            // double counting.
            cold_total.max(merged.len() as u64)
        };

        let page_start = filter.offset as usize;
        let page_end = (page_start + filter.limit as usize).min(merged.len());
        let logs = if page_start < merged.len() {
            merged[page_start..page_end].to_vec()
        } else {
            Vec::new()
        };

        QueryResult {
            logs,
            total,
            from_cache: hot_ok && !matches!(plan, QueryPlan::ColdOnly),
            from_db: cold_ok && !matches!(plan, QueryPlan::HotOnly),
            degraded: !hot_ok || !cold_ok,
        }
    }

    async fn query_hot(&self, filter: &Filter) -> (Vec<Record>, bool) {
        match self.hot.enumerate(10_000).await {
            Ok(records) => (
                records
                    .into_iter()
                    .filter(|r| filter.matches(r))
                    .collect(),
                true,
            ),
            Err(_) => (Vec::new(), false),
        }
    }

    /// Fetches every cold row up through the end of the requested page
    /// (offset 0 .. offset+limit), so `execute()` can apply offset/limit
    /// once against the merged hot+cold set instead of pre-paginating here
    /// and then slicing an already-paginated page a second time.
    async fn query_cold(&self, filter: &Filter) -> (Vec<Record>, u64, bool) {
        let window = Filter {
            offset: 0,
            limit: filter.offset.saturating_add(filter.limit),
            ..filter.clone()
        };
        match self.cold.query(&window).await {
            Ok((records, total)) => (records, total, true),
            Err(_) => (Vec::new(), 0, false),
        }
    }
}

/// Union by `correlation_id`, hot preferred on conflict, sorted by
/// `(timestamp desc, correlation_id asc)` for stable pagination.
fn merge_dedup(hot: Vec<Record>, cold: Vec<Record>) -> Vec<Record> {
    let mut by_cid: HashMap<String, Record> = HashMap::with_capacity(hot.len() + cold.len());
    for record in cold {
        by_cid.insert(record.correlation_id.clone(), record);
    }
    for record in hot {
        // Hot is authoritative: always overwrite whatever cold contributed.
        by_cid.insert(record.correlation_id.clone(), record);
    }
    let mut merged: Vec<Record> = by_cid.into_values().collect();
    merged.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.correlation_id.cmp(&b.correlation_id))
    });
    merged
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::model::LogLevel;

    fn record(cid: &str, ts_secs: i64) -> Record {
        Record {
            correlation_id: cid.to_string(),
            timestamp: Utc.timestamp_opt(ts_secs, 0).unwrap(),
            timestamp_raw: "".to_string(),
            api_name: "X".to_string(),
            service_name: "Y".to_string(),
            log_level: LogLevel::Info,
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

    #[test]
    fn merge_prefers_hot_on_duplicate_cid() {
        let mut hot_copy = record("dup", 100);
        hot_copy.service_name = "hot".to_string();
        let mut cold_copy = record("dup", 100);
        cold_copy.service_name = "cold".to_string();

        let merged = merge_dedup(vec![hot_copy], vec![cold_copy, record("other", 50)]);
        assert_eq!(merged.len(), 2);
        let dup = merged.iter().find(|r| r.correlation_id == "dup").unwrap();
        assert_eq!(dup.service_name, "hot");
    }

    #[test]
    fn merge_orders_by_timestamp_desc_then_cid_asc() {
        let merged = merge_dedup(
            vec![record("b", 200), record("a", 200)],
            vec![record("c", 100)],
        );
        let ids: Vec<_> = merged.iter().map(|r| r.correlation_id.clone()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
