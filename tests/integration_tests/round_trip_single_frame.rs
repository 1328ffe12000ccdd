// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tempfile::tempdir;

use super::common::{Harness, frame, recv_with_timeout};

#[tokio::test]
async fn round_trip_single_frame() {
    let dir = tempdir().expect("tempdir");
    let cid = "a1b2c3d4-0000-0000-0000-000000000001";
    let body = format!(
        r#"{{"correlationId":"{cid}","timestamp":"2025-01-01T00:00:00+00:00","apiName":"X","serviceName":"Y","logLevel":"INFO"}}"#
    );
    std::fs::write(dir.path().join("app.log"), frame(cid, &body)).expect("write log");

    let mut harness = Harness::spawn(dir.path());
    let record = recv_with_timeout(&mut harness.rx, 2000)
        .await
        .expect("record delivered within one scan pass");
    assert_eq!(record.correlation_id, cid);
    assert_eq!(record.api_name, "X");
    assert_eq!(record.service_name, "Y");

    harness.shutdown().await;
}
