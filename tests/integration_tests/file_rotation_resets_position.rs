// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tempfile::tempdir;

use super::common::{Harness, frame, recv_with_timeout};

#[tokio::test]
async fn file_rotation_resets_position() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("app.log");

    let cid1 = "a1b2c3d4-0000-0000-0000-000000000003";
    let body1 = format!(
        r#"{{"correlationId":"{cid1}","timestamp":"2025-01-01T00:00:00+00:00","apiName":"X","serviceName":"Y","logLevel":"INFO"}}"#
    );
    std::fs::write(&path, frame(cid1, &body1)).expect("write first file");

    let mut harness = Harness::spawn(dir.path());
    let first = recv_with_timeout(&mut harness.rx, 2000)
        .await
        .expect("first record delivered");
    assert_eq!(first.correlation_id, cid1);

    // Rotation: the old inode is removed and a new file takes its place at
    // the same path, so the tailer must reset its cursor to 0 rather than
    // seek to the old file's tail offset.
    std::fs::remove_file(&path).expect("remove rotated file");
    let cid2 = "a1b2c3d4-0000-0000-0000-000000000004";
    let body2 = format!(
        r#"{{"correlationId":"{cid2}","timestamp":"2025-01-01T00:01:00+00:00","apiName":"X","serviceName":"Y","logLevel":"ERROR"}}"#
    );
    std::fs::write(&path, frame(cid2, &body2)).expect("write post-rotation file");

    let second = recv_with_timeout(&mut harness.rx, 2000)
        .await
        .expect("record delivered from the rotated file");
    assert_eq!(second.correlation_id, cid2);

    harness.shutdown().await;
}
