// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::io::Write;

use tempfile::tempdir;

use super::common::{Harness, recv_with_timeout};

#[tokio::test]
async fn incomplete_frame_then_completed() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("app.log");
    let cid = "a1b2c3d4-0000-0000-0000-000000000002";
    let body = format!(
        r#"{{"correlationId":"{cid}","timestamp":"2025-01-01T00:00:00+00:00","apiName":"X","serviceName":"Y","logLevel":"INFO"}}"#
    );
    let marker = "*".repeat(10);
    std::fs::write(&path, format!("{marker}{cid}{marker}\n{body}\n")).expect("write opening");

    let mut harness = Harness::spawn(dir.path());
    assert!(
        recv_with_timeout(&mut harness.rx, 200).await.is_none(),
        "no record until the closing marker arrives"
    );

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .expect("reopen for append");
    file.write_all(format!("{marker}{cid}{marker}\n").as_bytes())
        .expect("append closing marker");

    let record = recv_with_timeout(&mut harness.rx, 2000)
        .await
        .expect("record delivered once the frame completes");
    assert_eq!(record.correlation_id, cid);

    harness.shutdown().await;
}
