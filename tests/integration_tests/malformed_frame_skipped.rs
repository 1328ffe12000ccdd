// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tempfile::tempdir;

use super::common::{Harness, frame, recv_with_timeout};

#[tokio::test]
async fn malformed_frame_skipped_and_next_frame_still_parsed() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("app.log");

    let bad_cid = "a1b2c3d4-0000-0000-0000-000000000005";
    let marker = "*".repeat(10);
    let bad = format!("{marker}{bad_cid}{marker}\n{{\"correlationId\":\"x\", \"apiName\":\n{marker}{bad_cid}{marker}\n");

    let good_cid = "a1b2c3d4-0000-0000-0000-000000000006";
    let good_body = format!(
        r#"{{"correlationId":"{good_cid}","timestamp":"2025-01-01T00:00:00+00:00","apiName":"X","serviceName":"Y","logLevel":"INFO"}}"#
    );
    let good = frame(good_cid, &good_body);

    std::fs::write(&path, format!("{bad}{good}")).expect("write log");

    let mut harness = Harness::spawn(dir.path());
    let record = recv_with_timeout(&mut harness.rx, 2000)
        .await
        .expect("good record delivered despite a malformed predecessor");
    assert_eq!(record.correlation_id, good_cid);

    harness.shutdown().await;
}
