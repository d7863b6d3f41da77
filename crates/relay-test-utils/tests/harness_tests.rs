// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue behaviour through the assembled harness.

use relay_core::{ChannelAdapter, Destination, DestinationType, RejectReason};
use relay_lease::LeaseRequest;
use relay_test_utils::TestHarness;

fn request(limit: u32, lease_seconds: u32) -> LeaseRequest {
    LeaseRequest {
        limit: Some(limit),
        lease_seconds: Some(lease_seconds),
    }
}

#[tokio::test]
async fn dm_is_leased_acked_and_gone() {
    let h = TestHarness::new().await.unwrap();
    let outcome = h.ingest(h.dm_event("U1", "m-1", "hi")).await.unwrap();
    assert_eq!(h.notifier.nudges(), vec!["B1".to_string()]);

    let leased = h.lease.lease("B1", request(10, 300)).await.unwrap();
    assert_eq!(leased.len(), 1);
    assert_eq!(leased[0].message.id, outcome.message_id);
    assert_eq!(leased[0].message.content, "hi");

    let lease_id = leased[0].delivery.lease_id.clone().unwrap();
    let ids = vec![leased[0].delivery.id.clone()];
    let ack = h.lease.ack("B1", &lease_id, &ids).await.unwrap();
    assert_eq!(ack.acked, ids);

    assert!(h.lease.lease("B1", request(10, 300)).await.unwrap().is_empty());
}

#[tokio::test]
async fn unacked_lease_is_reissued_after_reap() {
    let h = TestHarness::new().await.unwrap();
    h.ingest(h.dm_event("U1", "m-1", "hi")).await.unwrap();

    let first = h.lease.lease("B1", request(10, 300)).await.unwrap();
    let first_lease = first[0].delivery.lease_id.clone().unwrap();

    h.advance_secs(301);
    assert_eq!(h.lease.reap().await.unwrap(), 1);

    let second = h.lease.lease("B1", request(10, 300)).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].delivery.id, first[0].delivery.id);
    assert_eq!(second[0].delivery.attempts, 1);
    assert_ne!(second[0].delivery.lease_id.as_ref(), Some(&first_lease));

    let stale = h
        .lease
        .ack("B1", &first_lease, &[first[0].delivery.id.clone()])
        .await
        .unwrap();
    assert!(stale.acked.is_empty());
    assert_eq!(stale.rejected[0].reason, RejectReason::LeaseMismatch);
}

#[tokio::test]
async fn replayed_event_yields_one_delivery() {
    let h = TestHarness::new().await.unwrap();
    h.ingest(h.dm_event("U1", "m-1", "hi")).await.unwrap();
    h.ingest(h.dm_event("U1", "m-1", "hi")).await.unwrap();

    let leased = h.lease.lease("B1", request(10, 300)).await.unwrap();
    assert_eq!(leased.len(), 1);
}

#[tokio::test]
async fn unrouted_event_reaches_no_backend() {
    let h = TestHarness::new().await.unwrap();
    let outcome = h.ingest(h.dm_event("U2", "m-9", "hello?")).await.unwrap();
    assert!(outcome.created);
    assert!(outcome.delivery.is_none());

    for backend in ["B1", "B2"] {
        assert!(h.lease.lease(backend, request(10, 300)).await.unwrap().is_empty());
    }
    assert!(h.notifier.nudges().is_empty());
}

#[tokio::test]
async fn dm_route_beats_channel_and_default() {
    let config = r#"
[[chat_bots]]
id = "A"
token = "t"
allow_all_channels = true

[[backend_bots]]
id = "B1"
api_key = "k1"

[[backend_bots]]
id = "B2"
api_key = "k2"

[[backend_bots]]
id = "B3"
api_key = "k3"

[routing.defaults]
A = "B3"

[[routes]]
chat_bot_id = "A"
scope_type = "dm_user"
scope_id = "U1"
backend_bot_id = "B1"

[[routes]]
chat_bot_id = "A"
scope_type = "channel"
scope_id = "dm-U1"
backend_bot_id = "B2"
"#;
    let h = TestHarness::builder().with_config(config).build().await.unwrap();

    let dm = h.ingest(h.dm_event("U1", "1", "a")).await.unwrap();
    assert_eq!(dm.delivery.unwrap().0, "B1");

    let other = h.ingest(h.dm_event("U7", "2", "b")).await.unwrap();
    assert_eq!(other.delivery.unwrap().0, "B3");
}

#[tokio::test]
async fn oldest_message_is_leased_first() {
    let h = TestHarness::new().await.unwrap();
    for i in 0..3 {
        h.ingest(h.dm_event("U1", &format!("m-{i}"), &format!("n{i}")))
            .await
            .unwrap();
        h.advance_secs(1);
    }

    let leased = h.lease.lease("B1", request(2, 60)).await.unwrap();
    let contents: Vec<_> = leased.iter().map(|l| l.message.content.as_str()).collect();
    assert_eq!(contents, vec!["n0", "n1"]);
}

#[tokio::test]
async fn mock_channel_captures_sends() {
    let h = TestHarness::new().await.unwrap();
    let dest = Destination {
        kind: DestinationType::Dm,
        id: "U1".into(),
    };
    let receipt = h.channel.send_text(&dest, "pong", Some("m-1")).await.unwrap();
    assert_eq!(receipt.channel_id, "dm-U1");

    let sent = h.channel.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].reply_to.as_deref(), Some("m-1"));
}

#[tokio::test]
async fn injected_events_come_back_in_order() {
    let h = TestHarness::new().await.unwrap();
    h.channel.inject(h.dm_event("U1", "1", "first")).await;
    h.channel.inject(h.dm_event("U1", "2", "second")).await;

    assert_eq!(h.channel.receive().await.unwrap().content, "first");
    assert_eq!(h.channel.receive().await.unwrap().content, "second");
}
