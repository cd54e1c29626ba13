// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use pdp_modify_core::bus::BusSource;

use crate::scenarios::common::{harness, params, status_for_update, update};

/// §8 scenario 1: a targeted UPDATE answered by a matching PdpStatus
/// completes the round trip and drops the PDP's map entry.
#[tokio::test]
async fn happy_update_completes_and_clears_the_entry() {
    let h = harness(params(500, 1), params(500, 1));

    h.map
        .add_update(update("pdp_1", "G", "S", vec!["p1"], "u-1"))
        .await
        .unwrap();

    let sent = h.bus.recv().await.unwrap();
    assert_eq!(sent["messageName"], "PDP_UPDATE");
    assert_eq!(sent["name"], "pdp_1");

    h.dispatcher
        .dispatch(status_for_update("pdp_1", "u-1", "G", "S", vec!["p1"]))
        .await;

    assert!(!h.map.is_tracked("pdp_1").await);

    // Exactly one message was ever enqueued — nothing else is queued behind
    // it once the round trip completes.
    assert!(
        tokio::time::timeout(Duration::from_millis(50), h.bus.recv())
            .await
            .is_err()
    );
}
