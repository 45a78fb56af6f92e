//! Integration tests for hosted sessions
//!
//! These tests run real hosts and clients over loopback TCP.

use client::{ClientLink, ClientView, LinkConfig, LinkError, LinkExit};
use host::{
    AcceptorConfig, ConnectionAcceptor, HostConfig, HostGame, HostSession, PortChoice,
    SessionState, HOST_SLOT,
};
use shared::shutdown;
use shared::wire::{self, Record, RECORD_SIZE};
use shared::{Position, MAX_HEALTH, MAX_PLAYERS};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};

fn loopback(port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
}

fn fast_link() -> LinkConfig {
    LinkConfig {
        poll_interval: Duration::from_millis(50),
    }
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        sleep(Duration::from_millis(5)).await;
    }
}

/// WIRE FORMAT TESTS
mod wire_tests {
    use super::*;

    /// A record laid out by hand with plain bincode decodes as expected
    #[test]
    fn hand_built_record_decodes() {
        let raw: (u8, u8, u8, u8, f32, f32, f32) = (1, 1, 7, 1, 1.5, 0.0, -2.5);
        let bytes = bincode::serialize(&raw).unwrap();
        assert_eq!(bytes.len(), RECORD_SIZE);

        let mut record = [0u8; RECORD_SIZE];
        record.copy_from_slice(&bytes);
        assert_eq!(
            wire::decode(&record).unwrap(),
            Record::PeerState {
                slot: 7,
                active: true,
                position: Position::new(1.5, 0.0, -2.5),
            }
        );
    }

    /// Our encoding matches the same hand-built layout byte for byte
    #[test]
    fn encoded_position_matches_layout() {
        let encoded = wire::encode(&Record::Position(Position::new(1.0, 0.0, 2.0))).unwrap();
        let expected = bincode::serialize(&(1u8, 0u8, 0xFFu8, 0u8, 1.0f32, 0.0f32, 2.0f32)).unwrap();
        assert_eq!(&encoded[..], &expected[..]);
    }
}

/// HOST SESSION TESTS
mod session_tests {
    use super::*;

    async fn upload_only_host() -> HostSession {
        let config = HostConfig::default().with_port(0).with_snapshot_rate(None);
        HostSession::start(&config).await.unwrap()
    }

    /// A position sent by a client shows up in its slot
    #[tokio::test]
    async fn client_position_reaches_host() {
        let host = upload_only_host().await;
        let session = Arc::clone(host.session());

        let mut stream = TcpStream::connect(loopback(host.port())).await.unwrap();
        wait_until("slot 1", || session.is_occupied(1)).await;

        let record = wire::encode(&Record::Position(Position::new(1.0, 0.0, 2.0))).unwrap();
        stream.write_all(&record).await.unwrap();

        wait_until("position update", || {
            session.position(1) == Some(Position::new(1.0, 0.0, 2.0))
        })
        .await;

        host.shutdown().await.unwrap();
    }

    /// The same through a real client link and frame-loop view
    #[tokio::test]
    async fn client_link_reports_view_position() {
        let host = upload_only_host().await;
        let session = Arc::clone(host.session());

        let view = ClientView::new(Position::new(-3.0, 0.0, 4.0));
        let link = ClientLink::connect(loopback(host.port()), view.clone(), fast_link())
            .await
            .unwrap();
        let (trigger, signal) = shutdown::channel();
        let link_handle = tokio::spawn(link.run(signal));

        wait_until("first report", || {
            session.position(1) == Some(Position::new(-3.0, 0.0, 4.0))
        })
        .await;

        view.set_local_position(Position::new(6.0, 0.0, 6.0));
        wait_until("second report", || {
            session.position(1) == Some(Position::new(6.0, 0.0, 6.0))
        })
        .await;

        // Upload-only hosts never write to the client.
        assert_eq!(view.records_received(), 0);

        trigger.trigger();
        assert_eq!(link_handle.await.unwrap().unwrap(), LinkExit::Cancelled);
        wait_until("slot freed", || !session.is_occupied(1)).await;

        host.shutdown().await.unwrap();
    }

    /// Closing the host ends every link within one poll interval
    #[tokio::test]
    async fn host_shutdown_ends_client_links() {
        let host = upload_only_host().await;
        let session = Arc::clone(host.session());
        let config = LinkConfig {
            poll_interval: Duration::from_millis(250),
        };

        let (_trigger, signal) = shutdown::channel();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let link = ClientLink::connect(loopback(host.port()), ClientView::default(), config.clone())
                .await
                .unwrap();
            handles.push(tokio::spawn(link.run(signal.clone())));
        }
        wait_until("three players", || session.occupied_count() == 4).await;

        host.shutdown().await.unwrap();

        for handle in handles {
            let exit = timeout(Duration::from_millis(600), handle)
                .await
                .expect("link kept running after the host closed")
                .unwrap();
            match exit {
                Ok(LinkExit::HostClosed) | Err(LinkError::Io(_)) | Err(LinkError::Wire(_)) => {}
                other => panic!("Unexpected link exit: {:?}", other),
            }
        }
    }

    /// Joining a host that is not listening fails without retrying
    #[tokio::test]
    async fn join_without_host_fails() {
        let host = upload_only_host().await;
        let port = host.port();
        host.shutdown().await.unwrap();

        let result = ClientLink::connect(loopback(port), ClientView::default(), fast_link()).await;
        assert!(matches!(result, Err(LinkError::Connect { .. })));
    }
}

/// CAPACITY TESTS
mod capacity_tests {
    use super::*;

    async fn bare_acceptor() -> (Arc<SessionState>, u16) {
        let session = Arc::new(SessionState::new("127.0.0.1"));
        session.start();
        let config = AcceptorConfig {
            port: PortChoice::Fixed(0),
            snapshot_interval: None,
        };
        let acceptor = ConnectionAcceptor::bind(Arc::clone(&session), &config)
            .await
            .unwrap();
        let port = acceptor.local_port();
        tokio::spawn(acceptor.run());
        (session, port)
    }

    /// Never more than ten players, and back to zero once everyone leaves
    #[tokio::test]
    async fn slots_fill_and_drain() {
        let (session, port) = bare_acceptor().await;

        let mut streams = Vec::new();
        for expected in 1..=MAX_PLAYERS {
            streams.push(TcpStream::connect(loopback(port)).await.unwrap());
            wait_until("slot allocation", || session.occupied_count() == expected).await;
        }

        let mut rejected = Vec::new();
        for _ in 0..2 {
            rejected.push(TcpStream::connect(loopback(port)).await.unwrap());
        }
        for stream in rejected.iter_mut() {
            let mut buf = [0u8; RECORD_SIZE];
            let read = timeout(Duration::from_secs(2), stream.read(&mut buf)).await;
            assert!(
                matches!(read, Ok(Ok(0)) | Ok(Err(_))),
                "connection beyond capacity was kept open"
            );
        }
        assert_eq!(session.occupied_count(), MAX_PLAYERS);
        assert_eq!(session.active_count(), MAX_PLAYERS);

        // Leave in an interleaved order.
        let mut order: Vec<usize> = (0..MAX_PLAYERS).step_by(2).collect();
        order.extend((1..MAX_PLAYERS).step_by(2));
        let mut streams: Vec<Option<TcpStream>> = streams.into_iter().map(Some).collect();
        for index in order {
            streams[index] = None;
            assert!(session.occupied_count() <= MAX_PLAYERS);
        }

        wait_until("all slots free", || session.occupied_count() == 0).await;
        assert_eq!(session.active_count(), 0);
        session.stop();
    }

    /// A freed slot can be reused while others stay put
    #[tokio::test]
    async fn rejoin_takes_lowest_free_slot() {
        let (session, port) = bare_acceptor().await;

        let mut streams = Vec::new();
        for slot in 0..4 {
            streams.push(TcpStream::connect(loopback(port)).await.unwrap());
            wait_until("slot allocation", || session.is_occupied(slot)).await;
        }

        streams.remove(2);
        wait_until("slot 2 freed", || !session.is_occupied(2)).await;

        let _rejoin = TcpStream::connect(loopback(port)).await.unwrap();
        wait_until("slot 2 reused", || session.is_occupied(2)).await;
        assert_eq!(session.occupied_count(), 4);
        session.stop();
    }
}

/// PEER SNAPSHOT TESTS
mod broadcast_tests {
    use super::*;

    /// Two clients see each other and the host through the peer snapshots
    #[tokio::test]
    async fn clients_see_each_other() {
        let config = HostConfig::default().with_port(0).with_snapshot_rate(Some(200));
        let host = HostSession::start(&config).await.unwrap();
        let session = Arc::clone(host.session());
        session.set_position(HOST_SLOT, Position::new(0.0, 0.0, 9.0));

        let (trigger, signal) = shutdown::channel();
        let alice = ClientView::new(Position::new(10.0, 0.0, 0.0));
        let bob = ClientView::new(Position::new(-10.0, 0.0, 0.0));

        let mut handles = Vec::new();
        for view in [&alice, &bob] {
            let link = ClientLink::connect(loopback(host.port()), view.clone(), fast_link())
                .await
                .unwrap();
            handles.push(tokio::spawn(link.run(signal.clone())));
        }
        wait_until("both clients", || session.occupied_count() == 3).await;
        wait_until("positions reported", || {
            session.position(1) == Some(Position::new(10.0, 0.0, 0.0))
                && session.position(2) == Some(Position::new(-10.0, 0.0, 0.0))
        })
        .await;

        wait_until("alice sees bob", || {
            alice.peer(2).map(|peer| peer.position) == Some(Position::new(-10.0, 0.0, 0.0))
        })
        .await;
        wait_until("bob sees alice", || {
            bob.peer(1).map(|peer| peer.position) == Some(Position::new(10.0, 0.0, 0.0))
        })
        .await;
        wait_until("alice sees the host", || {
            alice.peer(HOST_SLOT).map(|peer| peer.position) == Some(Position::new(0.0, 0.0, 9.0))
        })
        .await;

        // Never told about themselves, and empty slots are reported as inactive.
        assert_eq!(alice.peer(1), None);
        assert_eq!(bob.peer(2), None);
        wait_until("empty slot reported", || alice.peer(5).is_some_and(|peer| !peer.active)).await;
        assert_eq!(alice.local_position(), Position::new(10.0, 0.0, 0.0));

        trigger.trigger();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), LinkExit::Cancelled);
        }
        host.shutdown().await.unwrap();
    }
}

/// COMBAT TESTS
mod combat_tests {
    use super::*;
    use host::{Autopilot, CombatResolver};

    /// A client parked in the line of fire takes damage from the host's frame loop
    #[tokio::test]
    async fn host_frames_damage_connected_client() {
        let config = HostConfig::default().with_port(0).with_snapshot_rate(None);
        let host = HostSession::start(&config).await.unwrap();
        let session = Arc::clone(host.session());

        // Just ahead of the autopilot's starting point.
        let view = ClientView::new(Position::new(20.0, 0.0, 6.0));
        let link = ClientLink::connect(loopback(host.port()), view, fast_link())
            .await
            .unwrap();
        let (trigger, signal) = shutdown::channel();
        let link_handle = tokio::spawn(link.run(signal));
        wait_until("client position", || {
            session.position(1) == Some(Position::new(20.0, 0.0, 6.0))
        })
        .await;

        // Default rules: the target never regenerates, so every hit shows.
        let mut game = HostGame::new(Arc::clone(&session))
            .with_combat(CombatResolver::new(HOST_SLOT))
            .with_autopilot(Autopilot::default());

        let mut hits = 0;
        for _ in 0..120 {
            hits += game.frame().hits;
        }

        assert!(hits >= 1);
        assert_eq!(session.health(1), Some(MAX_HEALTH - 20 * hits as i32));
        assert_eq!(session.health(HOST_SLOT), Some(MAX_HEALTH));

        trigger.trigger();
        link_handle.await.unwrap().unwrap();
        host.shutdown().await.unwrap();
    }
}
