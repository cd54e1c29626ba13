// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use pdp_modify_core::bus::BusSource;

use crate::scenarios::common::{harness, params, update};

/// §8 scenario 3: a second `addRequest` for the same PDP/kind before the
/// Publisher drains the first supersedes it in place — only the latest
/// content is ever transmitted.
#[tokio::test]
async fn second_update_before_drain_supersedes_the_first() {
    let h = harness(params(2_000, 1), params(2_000, 1));

    h.map
        .add_update(update("pdp_1", "G", "S", vec!["p1"], "u-1"))
        .await
        .unwrap();
    h.map
        .add_update(update("pdp_1", "G", "S", vec!["p1", "p2"], "u-2"))
        .await
        .unwrap();

    let sent = h.bus.recv().await.unwrap();
    assert_eq!(sent["requestId"], "u-2");
    let policy_names: Vec<&str> = sent["policies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(policy_names, vec!["p1", "p2"]);

    // Only one token was ever transmitted on this topic.
    assert!(
        tokio::time::timeout(Duration::from_millis(50), h.bus.recv())
            .await
            .is_err()
    );
}
