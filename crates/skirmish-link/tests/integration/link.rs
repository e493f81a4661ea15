//! Session establishment, buffering, interception, and rate limiting.

use std::sync::Arc;

use skirmish_link::{MemoryNet, PeerLink};
use skirmish_protocol::{self as proto, Message};

use crate::harness::*;

#[tokio::test(start_paused = true)]
async fn test_host_and_guest_exchange_messages() {
    let net = MemoryNet::new();
    let host = PeerLink::new(Arc::new(net.transport()));
    let guest = PeerLink::new(Arc::new(net.transport()));

    let mut host_connected = connect_events(&host);
    let mut guest_connected = connect_events(&guest);
    let mut host_data = data_stream(&host);
    let mut guest_data = data_stream(&guest);

    let addr = host.host().await.unwrap();
    guest.join(addr).await.unwrap();

    recv_within(&mut host_connected, "host connect").await;
    recv_within(&mut guest_connected, "guest connect").await;

    guest.send(crew_share()).await;
    let received = recv_within(&mut host_data, "crew share at host").await;
    assert!(matches!(received, Message::CrewShare { .. }));

    host.send(Message::StartBattle {
        battle: sample_battle(),
    })
    .await;
    let received = recv_within(&mut guest_data, "start battle at guest").await;
    assert!(matches!(received, Message::StartBattle { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_control_traffic_is_intercepted() {
    let net = MemoryNet::new();
    let host = PeerLink::new(Arc::new(net.transport()));
    let guest = PeerLink::new(Arc::new(net.transport()));

    let mut host_sync_requests = sync_request_events(&host);
    let mut host_data = data_stream(&host);
    let mut guest_data = data_stream(&guest);
    let mut host_connected = connect_events(&host);

    let addr = host.host().await.unwrap();
    guest.join(addr).await.unwrap();
    recv_within(&mut host_connected, "host connect").await;

    // The guest requests a sync on open; it reaches the dedicated
    // subscriber, not the data subscribers.
    recv_within(&mut host_sync_requests, "sync request at host").await;

    // Let a few heartbeat rounds happen.
    tokio::time::sleep(std::time::Duration::from_secs(
        proto::HEARTBEAT_INTERVAL_SECS * 3,
    ))
    .await;
    settle().await;

    assert!(host_data.try_recv().is_err(), "host saw control traffic");
    assert!(guest_data.try_recv().is_err(), "guest saw control traffic");
}

#[tokio::test(start_paused = true)]
async fn test_offline_sends_buffer_and_flush_in_order() {
    let net = MemoryNet::new();
    let host = PeerLink::new(Arc::new(net.transport()));
    let guest = PeerLink::new(Arc::new(net.transport()));

    let mut host_data = data_stream(&host);

    // No connection attempt yet: these buffer instead of failing.
    for i in 0..3 {
        guest.send(action_message(i)).await;
    }

    let addr = host.host().await.unwrap();
    guest.join(addr).await.unwrap();

    for expected in ["m0", "m1", "m2"] {
        let message = recv_within(&mut host_data, "buffered message").await;
        assert_eq!(actor_of(&message), expected);
    }

    // Queue drained: nothing further arrives.
    settle().await;
    assert!(host_data.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_inbound_connection_is_rejected() {
    let net = MemoryNet::new();
    let host = PeerLink::new(Arc::new(net.transport()));
    let first = PeerLink::new(Arc::new(net.transport()));
    let second = PeerLink::new(Arc::new(net.transport()));

    let mut host_connected = connect_events(&host);
    let mut host_data = data_stream(&host);
    let mut second_disconnected = disconnect_events(&second);

    let addr = host.host().await.unwrap();
    first.join(addr.clone()).await.unwrap();
    recv_within(&mut host_connected, "first guest connect").await;

    // The second join is closed immediately without displacing the
    // first connection.
    second.join(addr).await.unwrap();
    recv_within(&mut second_disconnected, "second guest closed").await;

    // Host never treated it as a session.
    settle().await;
    assert!(host_connected.try_recv().is_err());

    // The original pairing still works.
    first.send(crew_share()).await;
    let received = recv_within(&mut host_data, "crew share from first guest").await;
    assert!(matches!(received, Message::CrewShare { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_drops_excess_sends() {
    let net = MemoryNet::new();
    let host = PeerLink::new(Arc::new(net.transport()));
    let guest = PeerLink::new(Arc::new(net.transport()));

    let mut host_data = data_stream(&host);
    let mut guest_connected = connect_events(&guest);

    let addr = host.host().await.unwrap();
    guest.join(addr).await.unwrap();
    recv_within(&mut guest_connected, "guest connect").await;

    // The clock is paused, so all of these land in one rate window.
    let cap = proto::RATE_LIMIT_PER_SEC as i32;
    for i in 0..(cap + 5) {
        guest.send(action_message(i)).await;
    }

    for i in 0..cap {
        let message = recv_within(&mut host_data, "rate-limited message").await;
        assert_eq!(actor_of(&message), format!("m{i}"));
    }

    // The excess was dropped outright, not queued for later.
    settle().await;
    assert!(host_data.try_recv().is_err());
}
