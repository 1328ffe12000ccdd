// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The canonical record shape and the filters used to query it.
//!
//! Internally everything is snake_case. The two wire boundaries that need
//! camelCase (the on-disk frame JSON and the HTTP/WS surface) get their own
//! DTOs in [`wire`] with an explicit `From`/`TryFrom` conversion, rather than
//! `#[serde(rename_all = "camelCase")]` sprinkled across the canonical type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity of a logged exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            other => anyhow::bail!("unknown log level: {other}"),
        }
    }
}

/// Direction marker for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    In,
    Out,
    Error,
}

/// The nested header envelope, retained opaquely beyond a few indexed fields.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HeaderLog {
    pub timestamp: Option<String>,
    pub log_level: Option<String>,
    pub application: Option<String>,
    pub thread: Option<String>,
    pub logger: Option<String>,
    pub session_id: Option<String>,
    pub correlation_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// The canonical, snake_case, internal record shape.
///
/// `has_error` is intentionally `Option<String>`: the upstream producers emit
/// the literal strings `"True"`/`"False"`, sometimes omitting the field
/// entirely. Treat it as opaque and compare with `==`, never as a bool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    /// Original timestamp string as it appeared on the wire, offset and all.
    pub timestamp_raw: String,
    pub api_name: String,
    pub service_name: String,
    pub log_level: LogLevel,
    pub session_id: Option<String>,
    pub party_id: Option<String>,
    pub record_type: Option<RecordType>,
    pub has_error: Option<String>,
    pub duration_ms: Option<i64>,
    pub url: Option<String>,
    pub request: Option<Value>,
    pub response: Option<Value>,
    pub error_message: Option<String>,
    pub error_trace: Option<String>,
    pub header_log: Option<HeaderLog>,
    pub source_file: String,
    pub ingested_at: DateTime<Utc>,
}

impl Record {
    /// True only for the exact literal `"True"`, never inferred from presence.
    pub fn is_error(&self) -> bool {
        self.has_error.as_deref() == Some("True")
    }
}

/// Filter accepted by the query router (C8).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Filter {
    pub correlation_id: Option<String>,
    pub api_name: Option<String>,
    pub service_name: Option<String>,
    pub log_level: Option<LogLevel>,
    pub session_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    100
}

impl Filter {
    pub fn normalized(mut self) -> Self {
        self.limit = self.limit.clamp(1, 1000);
        self
    }

    /// Evaluates every set predicate against a candidate record.
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(cid) = &self.correlation_id
            && &record.correlation_id != cid
        {
            return false;
        }
        if let Some(v) = &self.api_name
            && &record.api_name != v
        {
            return false;
        }
        if let Some(v) = &self.service_name
            && &record.service_name != v
        {
            return false;
        }
        if let Some(v) = &self.session_id
            && record.session_id.as_ref() != Some(v)
        {
            return false;
        }
        if let Some(v) = self.log_level
            && record.log_level != v
        {
            return false;
        }
        if let Some(start) = self.start_date
            && record.timestamp < start
        {
            return false;
        }
        if let Some(end) = self.end_date
            && record.timestamp > end
        {
            return false;
        }
        true
    }
}

/// Filter accepted by the aggregator (C9); a subset of [`Filter`]'s range
/// fields plus grouping knobs that have no meaning for a point query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyticsFilter {
    pub api_name: Option<String>,
    pub service_name: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "default_top_limit")]
    pub limit: u32,
}

fn default_top_limit() -> u32 {
    10
}

/// Which tiers a query plan touches; see SPEC_FULL.md §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPlan {
    HotOnly,
    ColdOnly,
    Both,
}

/// Result envelope returned by the query router.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub logs: Vec<Record>,
    pub total: u64,
    pub from_cache: bool,
    pub from_db: bool,
    pub degraded: bool,
}

pub mod wire {
    //! DTOs matching the on-disk frame JSON and the HTTP/WS camelCase
    //! surface, with conversions into/out of the canonical [`super::Record`].

    use anyhow::{Context, Result};
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    use super::{HeaderLog, LogLevel, Record, RecordType};

    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct WireHeaderLog {
        pub timestamp: Option<String>,
        pub log_level: Option<String>,
        pub application: Option<String>,
        pub thread: Option<String>,
        pub logger: Option<String>,
        pub session_id: Option<String>,
        pub correlation_id: Option<String>,
        #[serde(flatten)]
        pub extra: serde_json::Map<String, Value>,
    }

    /// Shape of the JSON body enclosed by a frame's twin markers.
    #[derive(Debug, Clone, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WireRecord {
        pub correlation_id: String,
        pub timestamp: String,
        pub api_name: String,
        pub service_name: String,
        pub log_level: String,
        pub session_id: Option<String>,
        pub party_id: Option<String>,
        #[serde(rename = "type")]
        pub r#type: Option<String>,
        pub has_error: Option<String>,
        pub duration_ms: Option<i64>,
        pub url: Option<String>,
        pub request: Option<Value>,
        pub response: Option<Value>,
        pub error_message: Option<String>,
        pub error_trace: Option<String>,
        pub header_log: Option<WireHeaderLog>,
    }

    impl WireRecord {
        /// Converts into the canonical record, stamping provenance fields.
        ///
        /// The marker `cid` is authoritative over the one embedded in the
        /// JSON body when they disagree (see SPEC_FULL.md §4.1); the caller
        /// passes the marker cid separately so this function can enforce
        /// that without re-parsing the frame.
        pub fn into_record(self, marker_cid: &str, source_file: &str) -> Result<Record> {
            let timestamp = chrono::DateTime::parse_from_rfc3339(&self.timestamp)
                .with_context(|| format!("invalid timestamp: {}", self.timestamp))?
                .with_timezone(&Utc);
            let log_level: LogLevel = self.log_level.parse()?;
            let record_type = match self.r#type.as_deref() {
                Some("in") => Some(RecordType::In),
                Some("out") => Some(RecordType::Out),
                Some("error") => Some(RecordType::Error),
                _ => None,
            };
            Ok(Record {
                correlation_id: marker_cid.to_string(),
                timestamp,
                timestamp_raw: self.timestamp,
                api_name: self.api_name,
                service_name: self.service_name,
                log_level,
                session_id: self.session_id,
                party_id: self.party_id,
                record_type,
                has_error: self.has_error,
                duration_ms: self.duration_ms,
                url: self.url,
                request: self.request,
                response: self.response,
                error_message: self.error_message,
                error_trace: self.error_trace,
                header_log: self.header_log.map(|h| HeaderLog {
                    timestamp: h.timestamp,
                    log_level: h.log_level,
                    application: h.application,
                    thread: h.thread,
                    logger: h.logger,
                    session_id: h.session_id,
                    correlation_id: h.correlation_id,
                    extra: h.extra,
                }),
                source_file: source_file.to_string(),
                ingested_at: Utc::now(),
            })
        }
    }

    /// HTTP/WS-facing camelCase view of a [`Record`].
    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct RecordDto {
        pub correlation_id: String,
        pub timestamp: String,
        pub api_name: String,
        pub service_name: String,
        pub log_level: String,
        pub session_id: Option<String>,
        pub party_id: Option<String>,
        pub has_error: Option<String>,
        pub duration_ms: Option<i64>,
        pub url: Option<String>,
        pub request: Option<Value>,
        pub response: Option<Value>,
        pub error_message: Option<String>,
        pub error_trace: Option<String>,
        pub source_file: String,
    }

    impl From<&Record> for RecordDto {
        fn from(r: &Record) -> Self {
            RecordDto {
                correlation_id: r.correlation_id.clone(),
                timestamp: r.timestamp_raw.clone(),
                api_name: r.api_name.clone(),
                service_name: r.service_name.clone(),
                log_level: r.log_level.to_string(),
                session_id: r.session_id.clone(),
                party_id: r.party_id.clone(),
                has_error: r.has_error.clone(),
                duration_ms: r.duration_ms,
                url: r.url.clone(),
                request: r.request.clone(),
                response: r.response.clone(),
                error_message: r.error_message.clone(),
                error_trace: r.error_trace.clone(),
                source_file: r.source_file.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record {
            correlation_id: "a1b2c3d4-0000-0000-0000-000000000001".to_string(),
            timestamp: Utc::now(),
            timestamp_raw: "2025-01-01T00:00:00+00:00".to_string(),
            api_name: "X".to_string(),
            service_name: "Y".to_string(),
            log_level: LogLevel::Info,
            session_id: None,
            party_id: None,
            record_type: None,
            has_error: Some("True".to_string()),
            duration_ms: Some(12),
            url: None,
            request: None,
            response: None,
            error_message: Some("boom".to_string()),
            error_trace: None,
            header_log: None,
            source_file: "a.log".to_string(),
            ingested_at: Utc::now(),
        }
    }

    #[test]
    fn has_error_is_literal_string_comparison() {
        let mut r = sample();
        assert!(r.is_error());
        r.has_error = Some("False".to_string());
        assert!(!r.is_error());
        r.has_error = None;
        assert!(!r.is_error());
    }

    #[test]
    fn filter_matches_all_set_predicates() {
        let r = sample();
        let f = Filter {
            api_name: Some("X".to_string()),
            service_name: Some("Z".to_string()),
            ..Default::default()
        };
        assert!(!f.matches(&r));

        let f2 = Filter {
            api_name: Some("X".to_string()),
            ..Default::default()
        };
        assert!(f2.matches(&r));
    }

    #[test]
    fn filter_limit_is_clamped() {
        let f = Filter {
            limit: 5000,
            ..Default::default()
        }
        .normalized();
        assert_eq!(f.limit, 1000);

        let f2 = Filter {
            limit: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(f2.limit, 1);
    }
}
