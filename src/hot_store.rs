// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Hot store (C4): a remote cache tier keyed `log:<correlation_id>`, reached
//! over a single multiplexed connection that reconnects on its own.
//!
//! `redis::aio::ConnectionManager` already implements the "single logical
//! connection, automatic reconnect with backoff" contract SPEC_FULL.md §4.4
//! asks for, so this module is a thin, typed wrapper rather than its own
//! reconnect loop (cf. the backoff/reconnect idiom in the TextToVideoAPI
//! worker, which hand-rolls the same thing atop a sync client).

use redis::{AsyncCommands, aio::ConnectionManager};

use crate::model::Record;

#[derive(Clone)]
pub struct HotStore {
    conn: ConnectionManager,
    ttl_seconds: u64,
}

impl HotStore {
    pub async fn connect(redis_url: &str, ttl_seconds: u64) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn, ttl_seconds })
    }

    fn key(cid: &str) -> String {
        format!("log:{cid}")
    }

    /// Best-effort write-through. Callers treat failure as non-fatal
    /// (`CacheUnavailable`, SPEC_FULL.md §7) and keep ingesting.
    pub async fn put(&self, record: &Record) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(record)?;
        let _: () = conn
            .set_ex(Self::key(&record.correlation_id), payload, self.ttl_seconds)
            .await?;
        Ok(())
    }

    pub async fn get(&self, cid: &str) -> anyhow::Result<Option<Record>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::key(cid)).await?;
        Ok(match raw {
            Some(s) => Some(serde_json::from_str(&s)?),
            None => None,
        })
    }

    pub async fn delete(&self, cid: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::key(cid)).await?;
        Ok(())
    }

    /// Scans cached keys and returns decoded records, sorted by timestamp
    /// descending, truncated to `limit`. Caps internal enumeration at 10,000
    /// keys (SPEC_FULL.md §4.4) to bound a single scan.
    pub async fn enumerate(&self, limit: usize) -> anyhow::Result<Vec<Record>> {
        const ENUMERATION_CAP: usize = 10_000;
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys("log:*").await?;
        let mut records = Vec::with_capacity(keys.len().min(ENUMERATION_CAP));
        for key in keys.into_iter().take(ENUMERATION_CAP) {
            let raw: Option<String> = conn.get(&key).await?;
            if let Some(s) = raw
                && let Ok(record) = serde_json::from_str::<Record>(&s)
            {
                records.push(record);
            }
        }
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }

    pub async fn save_position(&self, key: &str, offset: u64) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, offset).await?;
        Ok(())
    }

    pub async fn count(&self) -> anyhow::Result<u64> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys("log:*").await?;
        Ok(keys.len() as u64)
    }
}
