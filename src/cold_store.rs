// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Cold store (C5): the durable, indexed, relational tier. Backed by
//! Postgres via `sqlx`, using the runtime `query_as` API (not the
//! compile-time `query!` macro) so the crate builds without a live database
//! connection or a checked-in `.sqlx` metadata cache.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool, postgres::PgPoolOptions};

use crate::model::{AnalyticsFilter, Filter, HeaderLog, Record, RecordType};

#[derive(Debug, Clone)]
pub struct ColdStore {
    pool: PgPool,
}

#[derive(FromRow)]
struct RecordRow {
    correlation_id: String,
    timestamp: DateTime<Utc>,
    timestamp_raw: String,
    api_name: String,
    service_name: String,
    log_level: String,
    session_id: Option<String>,
    party_id: Option<String>,
    log_type: Option<String>,
    has_error: Option<String>,
    duration_ms: Option<i64>,
    url: Option<String>,
    request_data: Option<Value>,
    response_data: Option<Value>,
    error_message: Option<String>,
    error_trace: Option<String>,
    header_log: Option<Value>,
    file_name: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for Record {
    type Error = anyhow::Error;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(Record {
            correlation_id: row.correlation_id,
            timestamp: row.timestamp,
            timestamp_raw: row.timestamp_raw,
            api_name: row.api_name,
            service_name: row.service_name,
            log_level: row.log_level.parse()?,
            session_id: row.session_id,
            party_id: row.party_id,
            record_type: match row.log_type.as_deref() {
                Some("in") => Some(RecordType::In),
                Some("out") => Some(RecordType::Out),
                Some("error") => Some(RecordType::Error),
                _ => None,
            },
            has_error: row.has_error,
            duration_ms: row.duration_ms,
            url: row.url,
            request: row.request_data,
            response: row.response_data,
            error_message: row.error_message,
            error_trace: row.error_trace,
            header_log: row
                .header_log
                .and_then(|v| serde_json::from_value::<HeaderLog>(v).ok()),
            source_file: row.file_name,
            ingested_at: row.created_at,
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct ErrorBreakdownRow {
    pub key: String,
    pub count: i64,
}

#[derive(Debug, Default, Clone)]
pub struct DailyBucket {
    pub day: String,
    pub error: i64,
    pub success: i64,
}

#[derive(Debug, Default, Clone)]
pub struct OverviewStats {
    pub total: i64,
    pub errors: i64,
    pub avg_duration_ms: Option<f64>,
}

#[derive(Debug, Default, Clone)]
pub struct UrlStat {
    pub url: String,
    pub avg_duration_ms: f64,
    pub count: i64,
}

impl ColdStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS log_entries (
                id BIGSERIAL PRIMARY KEY,
                correlation_id TEXT NOT NULL UNIQUE,
                timestamp TIMESTAMPTZ NOT NULL,
                timestamp_raw TEXT NOT NULL,
                api_name TEXT NOT NULL,
                service_name TEXT NOT NULL,
                log_level TEXT NOT NULL,
                session_id TEXT,
                party_id TEXT,
                log_type TEXT,
                request_data JSONB,
                response_data JSONB,
                has_error TEXT,
                error_message TEXT,
                error_trace TEXT,
                duration_ms BIGINT,
                url TEXT,
                header_log JSONB,
                file_name TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS idx_log_entries_timestamp ON log_entries (timestamp);
            CREATE INDEX IF NOT EXISTS idx_log_entries_api_name ON log_entries (api_name);
            CREATE INDEX IF NOT EXISTS idx_log_entries_service_name ON log_entries (service_name);
            CREATE INDEX IF NOT EXISTS idx_log_entries_session_id ON log_entries (session_id);
            CREATE INDEX IF NOT EXISTS idx_log_entries_has_error ON log_entries (has_error);

            CREATE TABLE IF NOT EXISTS file_positions (
                key TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                byte_offset BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Idempotent on `correlation_id`; last write wins on conflict.
    pub async fn upsert_batch(&self, records: &[Record]) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO log_entries (
                    correlation_id, timestamp, timestamp_raw, api_name, service_name,
                    log_level, session_id, party_id, log_type, request_data, response_data,
                    has_error, error_message, error_trace, duration_ms, url, header_log,
                    file_name, created_at
                ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)
                ON CONFLICT (correlation_id) DO UPDATE SET
                    timestamp = EXCLUDED.timestamp,
                    timestamp_raw = EXCLUDED.timestamp_raw,
                    api_name = EXCLUDED.api_name,
                    service_name = EXCLUDED.service_name,
                    log_level = EXCLUDED.log_level,
                    session_id = EXCLUDED.session_id,
                    party_id = EXCLUDED.party_id,
                    log_type = EXCLUDED.log_type,
                    request_data = EXCLUDED.request_data,
                    response_data = EXCLUDED.response_data,
                    has_error = EXCLUDED.has_error,
                    error_message = EXCLUDED.error_message,
                    error_trace = EXCLUDED.error_trace,
                    duration_ms = EXCLUDED.duration_ms,
                    url = EXCLUDED.url,
                    header_log = EXCLUDED.header_log,
                    file_name = EXCLUDED.file_name,
                    created_at = EXCLUDED.created_at
                WHERE log_entries.created_at <= EXCLUDED.created_at
                "#,
            )
            .bind(&record.correlation_id)
            .bind(record.timestamp)
            .bind(&record.timestamp_raw)
            .bind(&record.api_name)
            .bind(&record.service_name)
            .bind(record.log_level.to_string())
            .bind(&record.session_id)
            .bind(&record.party_id)
            .bind(record.record_type.map(|t| match t {
                RecordType::In => "in",
                RecordType::Out => "out",
                RecordType::Error => "error",
            }))
            .bind(&record.request)
            .bind(&record.response)
            .bind(&record.has_error)
            .bind(&record.error_message)
            .bind(&record.error_trace)
            .bind(record.duration_ms)
            .bind(&record.url)
            .bind(
                record
                    .header_log
                    .as_ref()
                    .map(|h| serde_json::to_value(h).unwrap_or(Value::Null)),
            )
            .bind(&record.source_file)
            .bind(record.ingested_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn query(&self, filter: &Filter) -> anyhow::Result<(Vec<Record>, u64)> {
        let log_level = filter.log_level.map(|l| l.to_string());
        let rows: Vec<RecordRow> = sqlx::query_as(
            r#"
            SELECT correlation_id, timestamp, timestamp_raw, api_name, service_name,
                   log_level, session_id, party_id, log_type, has_error, duration_ms, url,
                   request_data, response_data, error_message, error_trace, header_log,
                   file_name, created_at
            FROM log_entries
            WHERE ($1::text IS NULL OR correlation_id = $1)
              AND ($2::text IS NULL OR api_name = $2)
              AND ($3::text IS NULL OR service_name = $3)
              AND ($4::text IS NULL OR session_id = $4)
              AND ($5::text IS NULL OR log_level = $5)
              AND ($6::timestamptz IS NULL OR timestamp >= $6)
              AND ($7::timestamptz IS NULL OR timestamp <= $7)
            ORDER BY timestamp DESC, correlation_id ASC
            LIMIT $8 OFFSET $9
            "#,
        )
        .bind(&filter.correlation_id)
        .bind(&filter.api_name)
        .bind(&filter.service_name)
        .bind(&filter.session_id)
        .bind(&log_level)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.limit as i64)
        .bind(filter.offset as i64)
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM log_entries
            WHERE ($1::text IS NULL OR correlation_id = $1)
              AND ($2::text IS NULL OR api_name = $2)
              AND ($3::text IS NULL OR service_name = $3)
              AND ($4::text IS NULL OR session_id = $4)
              AND ($5::text IS NULL OR log_level = $5)
              AND ($6::timestamptz IS NULL OR timestamp >= $6)
              AND ($7::timestamptz IS NULL OR timestamp <= $7)
            "#,
        )
        .bind(&filter.correlation_id)
        .bind(&filter.api_name)
        .bind(&filter.service_name)
        .bind(&filter.session_id)
        .bind(&log_level)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .fetch_one(&self.pool)
        .await?;

        let records = rows
            .into_iter()
            .map(Record::try_from)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok((records, total.0 as u64))
    }

    pub async fn overview(&self, filter: &AnalyticsFilter) -> anyhow::Result<OverviewStats> {
        let row: (i64, i64, Option<f64>) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE has_error = 'True'),
                AVG(duration_ms) FILTER (WHERE duration_ms IS NOT NULL)
            FROM log_entries
            WHERE ($1::text IS NULL OR api_name = $1)
              AND ($2::text IS NULL OR service_name = $2)
              AND ($3::timestamptz IS NULL OR timestamp >= $3)
              AND ($4::timestamptz IS NULL OR timestamp <= $4)
            "#,
        )
        .bind(&filter.api_name)
        .bind(&filter.service_name)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(OverviewStats {
            total: row.0,
            errors: row.1,
            avg_duration_ms: row.2,
        })
    }

    pub async fn daily_breakdown(
        &self,
        filter: &AnalyticsFilter,
    ) -> anyhow::Result<Vec<DailyBucket>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT
                to_char(timestamp, 'YYYY-MM-DD') AS day,
                COUNT(*) FILTER (WHERE has_error = 'True') AS errors,
                COUNT(*) FILTER (WHERE has_error IS DISTINCT FROM 'True') AS success
            FROM log_entries
            WHERE ($1::text IS NULL OR api_name = $1)
              AND ($2::text IS NULL OR service_name = $2)
              AND ($3::timestamptz IS NULL OR timestamp >= $3)
              AND ($4::timestamptz IS NULL OR timestamp <= $4)
            GROUP BY day
            ORDER BY day ASC
            "#,
        )
        .bind(&filter.api_name)
        .bind(&filter.service_name)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(day, error, success)| DailyBucket {
                day,
                error,
                success,
            })
            .collect())
    }

    pub async fn error_distribution(
        &self,
        filter: &AnalyticsFilter,
    ) -> anyhow::Result<Vec<ErrorBreakdownRow>> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT api_name, service_name, COUNT(*)
            FROM log_entries
            WHERE log_level = 'ERROR'
              AND ($1::text IS NULL OR api_name = $1)
              AND ($2::text IS NULL OR service_name = $2)
              AND ($3::timestamptz IS NULL OR timestamp >= $3)
              AND ($4::timestamptz IS NULL OR timestamp <= $4)
            GROUP BY api_name, service_name
            ORDER BY COUNT(*) DESC
            "#,
        )
        .bind(&filter.api_name)
        .bind(&filter.service_name)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(api, svc, count)| ErrorBreakdownRow {
                key: format!("{api} - {svc}"),
                count,
            })
            .collect())
    }

    pub async fn top_response_time_urls(&self, limit: u32) -> anyhow::Result<Vec<UrlStat>> {
        let limit = limit.clamp(1, 50);
        let rows: Vec<(String, f64, i64)> = sqlx::query_as(
            r#"
            SELECT url, AVG(duration_ms) AS avg_ms, COUNT(*)
            FROM log_entries
            WHERE url IS NOT NULL AND duration_ms IS NOT NULL
            GROUP BY url
            ORDER BY avg_ms DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(url, avg_duration_ms, count)| UrlStat {
                url,
                avg_duration_ms,
                count,
            })
            .collect())
    }

    pub async fn url_heat_map(&self, limit: u32) -> anyhow::Result<Vec<(String, i64)>> {
        let limit = limit.clamp(1, 100);
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT url, COUNT(*) FROM log_entries
            WHERE url IS NOT NULL
            GROUP BY url
            ORDER BY COUNT(*) DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM log_entries WHERE timestamp < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn save_position(&self, key: &str, file_path: &str, offset: u64) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO file_positions (key, file_path, byte_offset, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (key) DO UPDATE SET
                byte_offset = EXCLUDED.byte_offset,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key)
        .bind(file_path)
        .bind(offset as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_positions(&self) -> anyhow::Result<Vec<(String, u64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT file_path, byte_offset FROM file_positions")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(p, o)| (p, o as u64)).collect())
    }
}
