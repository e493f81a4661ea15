//! Reconnect sequences: backoff, recovery, exhaustion, and the pong
//! watchdog.

use std::sync::Arc;

use skirmish_link::{Endpoint as _, FlakyTransport, LinkError, MemoryNet, PeerLink, Transport};
use skirmish_protocol as proto;

use crate::harness::*;

#[tokio::test(start_paused = true)]
async fn test_reconnect_exhaustion_is_terminal_and_clean() {
    let net = MemoryNet::new();
    let guest = PeerLink::new(Arc::new(net.transport()));

    let mut errors = error_events(&guest);
    let mut reconnecting = reconnecting_events(&guest);

    // Nothing listens at this address: the dial fails, and every
    // backoff redial fails the same way.
    guest.join("mem-nowhere").await.unwrap();
    recv_within(&mut reconnecting, "reconnecting").await;

    let mut fatal = 0;
    loop {
        match recv_within(&mut errors, "peer error").await {
            LinkError::ConnectionFailed { attempts } => {
                assert_eq!(attempts, proto::MAX_RECONNECT_ATTEMPTS);
                fatal += 1;
                break;
            }
            LinkError::Dial(_) | LinkError::Discovery(_) => {}
            other => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!(fatal, 1);

    // The failure fired exactly once; the link is fully torn down and
    // usable again.
    settle().await;
    assert!(errors.try_recv().is_err());
    let addr = guest.host().await.unwrap();
    assert!(addr.starts_with("mem-"));
}

#[tokio::test(start_paused = true)]
async fn test_guest_redials_until_host_returns() {
    let net = MemoryNet::new();
    let host = PeerLink::new(Arc::new(net.named_transport("arena-host")));
    let guest = PeerLink::new(Arc::new(net.transport()));

    let mut guest_connected = connect_events(&guest);
    let mut guest_disconnected = disconnect_events(&guest);
    let mut guest_reconnecting = reconnecting_events(&guest);

    let addr = host.host().await.unwrap();
    guest.join(addr.clone()).await.unwrap();
    recv_within(&mut guest_connected, "initial connect").await;

    // The host goes away; the guest notices and starts redialling.
    host.disconnect().await;
    recv_within(&mut guest_disconnected, "guest disconnect").await;
    recv_within(&mut guest_reconnecting, "guest reconnecting").await;

    // The host returns on the same address before the attempt budget
    // runs out.
    let addr2 = host.host().await.unwrap();
    assert_eq!(addr2, addr);

    recv_within(&mut guest_connected, "reconnect").await;
}

#[tokio::test(start_paused = true)]
async fn test_acquisition_failure_surfaces_as_peer_error() {
    let net = MemoryNet::new();
    let link = PeerLink::new(Arc::new(FlakyTransport::new(net.transport(), 1)));

    let mut errors = error_events(&link);

    let result = link.host().await;
    assert!(matches!(result, Err(LinkError::Discovery(_))));
    assert!(matches!(
        recv_within(&mut errors, "discovery error").await,
        LinkError::Discovery(_)
    ));

    // The transport recovered; hosting works now.
    assert!(link.host().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_pong_silence_triggers_reconnect() {
    let net = MemoryNet::new();
    let host = PeerLink::new(Arc::new(net.transport()));

    let mut host_connected = connect_events(&host);
    let mut host_disconnected = disconnect_events(&host);
    let mut host_reconnecting = reconnecting_events(&host);

    let addr = host.host().await.unwrap();

    // A raw peer that connects and then never answers a ping.
    let transport = net.transport();
    let mut raw_endpoint = transport.acquire().await.unwrap();
    let _silent_conn = raw_endpoint.connect(&addr).await.unwrap();

    recv_within(&mut host_connected, "host connect").await;

    // The watchdog declares the link stale after the pong timeout.
    recv_within(&mut host_disconnected, "stale disconnect").await;
    recv_within(&mut host_reconnecting, "host reconnecting").await;
}
