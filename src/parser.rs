// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Frame parser (C1): recovers complete records from a byte range bounded by
//! twin ten-asterisk sentinel markers carrying a correlation id.
//!
//! Stateless by contract (SPEC_FULL.md §4.1): all framing state — the
//! position cursor — lives with the caller. A call never emits a record
//! whose markers are not both inside the range it was given, and it reports
//! exactly how many leading bytes were consumed so the caller can advance
//! past only what was actually parsed.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::wire::WireRecord;

/// Ten literal asterisks, a correlation id, ten literal asterisks.
static MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*{10}([0-9a-f-]{36})\*{10}").expect("valid regex"));

/// Largest frame body the parser will accept before dropping it unparsed.
const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParseCounters {
    pub parsed: u64,
    pub rejected: u64,
    pub field_missing: u64,
    pub cid_mismatch: u64,
    pub oversized: u64,
}

/// Result of a single parse pass.
pub struct ParseOutcome {
    pub records: Vec<crate::model::Record>,
    pub consumed: usize,
    pub counters: ParseCounters,
}

/// Parses as many complete frames as possible from the front of `data`.
///
/// `source_hint` is recorded as `Record::source_file` provenance and is not
/// interpreted.
pub fn parse(data: &[u8], source_hint: &str) -> ParseOutcome {
    let text = String::from_utf8_lossy(data);
    let mut records = Vec::new();
    let mut counters = ParseCounters::default();
    let mut consumed_chars = 0usize;

    let matches: Vec<_> = MARKER.find_iter(&text).collect();
    let mut i = 0;
    while i + 1 < matches.len() {
        let open = &matches[i];
        let open_caps = MARKER.captures(open.as_str()).expect("matched marker");
        let open_cid = open_caps[1].to_owned();

        // Find the next marker carrying the *same* cid to close this frame.
        let mut close_idx = None;
        for (j, m) in matches.iter().enumerate().skip(i + 1) {
            let caps = MARKER.captures(m.as_str()).expect("matched marker");
            if &caps[1] == open_cid.as_str() {
                close_idx = Some(j);
                break;
            }
        }

        let Some(j) = close_idx else {
            // No matching close yet: stop here, leave this open marker (and
            // everything after it) unconsumed for the next pass.
            break;
        };

        let close = &matches[j];
        let body_start = open.end();
        let body_end = close.start();
        if body_end < body_start {
            // Malformed overlap; skip past the open marker defensively.
            i = j;
            continue;
        }
        let body = text[body_start..body_end].trim();

        if body.len() > MAX_FRAME_BYTES {
            counters.oversized += 1;
            consumed_chars = close.end();
            i = j + 1;
            continue;
        }

        match serde_json::from_str::<WireRecord>(body) {
            Ok(wire) => {
                if wire.correlation_id != open_cid {
                    counters.cid_mismatch += 1;
                }
                match wire.into_record(&open_cid, source_hint) {
                    Ok(record) => {
                        records.push(record);
                        counters.parsed += 1;
                    },
                    Err(_) => {
                        counters.field_missing += 1;
                    },
                }
            },
            Err(_) => {
                counters.rejected += 1;
            },
        }

        consumed_chars = close.end();
        i = j + 1;
    }

    // `consumed_chars` is a char-boundary offset into the lossy-decoded
    // string; since markers and JSON are ASCII-bounded this always lands on
    // a valid byte boundary in `data` for well-formed UTF-8 input. Guard
    // against the pathological non-UTF8 case by never exceeding data's len.
    let consumed = consumed_chars.min(data.len());

    ParseOutcome {
        records,
        consumed,
        counters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(cid: &str, body: &str) -> String {
        format!("{m}{cid}{m}\n{body}\n{m}{cid}{m}\n", m = "*".repeat(10))
    }

    #[test]
    fn round_trip_single_frame() {
        let cid = "a1b2c3d4-0000-0000-0000-000000000001";
        let body = format!(
            r#"{{"correlationId":"{cid}","timestamp":"2025-01-01T00:00:00+00:00","apiName":"X","serviceName":"Y","logLevel":"INFO"}}"#
        );
        let input = frame(cid, &body);
        let out = parse(input.as_bytes(), "a.log");
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.consumed, input.len());
        assert_eq!(out.counters.parsed, 1);
        assert_eq!(out.records[0].correlation_id, cid);
    }

    #[test]
    fn incomplete_trailing_frame_consumes_nothing() {
        let cid = "a1b2c3d4-0000-0000-0000-000000000002";
        let body = format!(
            r#"{{"correlationId":"{cid}","timestamp":"2025-01-01T00:00:00+00:00","apiName":"X","serviceName":"Y","logLevel":"INFO"}}"#
        );
        let input = format!("{m}{cid}{m}\n{body}\n", m = "*".repeat(10));
        let out = parse(input.as_bytes(), "a.log");
        assert!(out.records.is_empty());
        assert_eq!(out.consumed, 0);
    }

    #[test]
    fn malformed_json_is_rejected_but_consumed() {
        let cid = "a1b2c3d4-0000-0000-0000-000000000003";
        let input = frame(cid, r#"{"correlationId":"x", "apiName":"#);
        let out = parse(input.as_bytes(), "a.log");
        assert!(out.records.is_empty());
        assert_eq!(out.counters.rejected, 1);
        assert_eq!(out.consumed, input.len());
    }

    #[test]
    fn two_frames_back_to_back() {
        let cid1 = "a1b2c3d4-0000-0000-0000-000000000004";
        let cid2 = "a1b2c3d4-0000-0000-0000-000000000005";
        let body1 = format!(
            r#"{{"correlationId":"{cid1}","timestamp":"2025-01-01T00:00:00+00:00","apiName":"X","serviceName":"Y","logLevel":"INFO"}}"#
        );
        let body2 = format!(
            r#"{{"correlationId":"{cid2}","timestamp":"2025-01-01T00:01:00+00:00","apiName":"X","serviceName":"Y","logLevel":"ERROR"}}"#
        );
        let mut input = frame(cid1, &body1);
        input.push_str(&frame(cid2, &body2));
        let out = parse(input.as_bytes(), "a.log");
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.consumed, input.len());
    }

    #[test]
    fn cid_mismatch_prefers_marker_cid() {
        let marker_cid = "a1b2c3d4-0000-0000-0000-000000000006";
        let body_cid = "a1b2c3d4-0000-0000-0000-000000000007";
        let body = format!(
            r#"{{"correlationId":"{body_cid}","timestamp":"2025-01-01T00:00:00+00:00","apiName":"X","serviceName":"Y","logLevel":"INFO"}}"#
        );
        let input = frame(marker_cid, &body);
        let out = parse(input.as_bytes(), "a.log");
        assert_eq!(out.counters.cid_mismatch, 1);
        assert_eq!(out.records[0].correlation_id, marker_cid);
    }
}
