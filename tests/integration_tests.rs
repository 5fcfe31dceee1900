//! Integration tests for the tower defense netcode
//!
//! These tests drive several sessions against each other, both in memory and
//! through a real relay on loopback.

use assert_approx_eq::assert_approx_eq;
use client::config::SessionConfig;
use client::network::{Peer, PeerMessage};
use client::registry::EnemyKey;
use client::session::{Selection, Session};
use relay::network::{Relay, RelayMessage};
use shared::{
    EnemyDeath, GameStart, TowerKind, Vec3, WireMessage, MAX_DATAGRAM, RELAY_HELLO,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{sleep, timeout};
use tokio_test::assert_ok;

fn session(local_player: i32, player_count: usize) -> Session {
    Session::new(SessionConfig {
        local_player,
        player_count,
        seed: 11,
        ..SessionConfig::default()
    })
}

/// Delivers everything `from` queued to `to`, through the byte encoding.
fn pump(from: &mut Session, to: &mut Session) -> usize {
    let messages = from.drain_outbox();
    let count = messages.len();
    for message in messages {
        let bytes = message.encode_bytes().unwrap();
        to.receive_datagram(&bytes);
    }
    count
}

/// PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests a message crossing a real UDP socket unchanged
    #[tokio::test]
    async fn message_survives_udp_roundtrip() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let message = WireMessage::EnemyDeath(EnemyDeath {
            enemy_id: 12,
            spawner_id: 3,
        });
        sender
            .send_to(&message.encode_bytes().unwrap(), receiver.local_addr().unwrap())
            .await
            .unwrap();

        let mut buffer = [0u8; MAX_DATAGRAM];
        let (len, _) = timeout(Duration::from_secs(1), receiver.recv_from(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(WireMessage::decode_bytes(&buffer[..len]).unwrap(), message);
    }

    /// Tests the action envelope accepted alongside the header form
    #[test]
    fn legacy_envelope_is_understood() {
        let decoded =
            WireMessage::decode(r#"{"action":"GAME_START","startUnix":1700000000.5}"#).unwrap();
        assert_eq!(
            decoded,
            WireMessage::GameStart(GameStart {
                start_unix: 1_700_000_000.5
            })
        );
    }
}

/// SESSION SYNCHRONISATION TESTS
mod session_sync_tests {
    use super::*;

    #[test]
    fn host_start_reaches_guest() {
        let mut host = session(0, 2);
        let mut guest = session(1, 2);

        assert!(!guest.broadcast_game_start(5.0));
        assert!(host.broadcast_game_start(5.0));
        pump(&mut host, &mut guest);

        assert_eq!(host.match_start(), Some(5.0));
        assert_eq!(guest.match_start(), Some(5.0));
    }

    #[test]
    fn guest_build_is_replicated_to_host() {
        let mut host = session(0, 2);
        let mut guest = session(1, 2);

        assert!(guest.request_build_toggle());
        guest.point_at(Vec3::new(55.0, 0.0, 3.0));
        assert!(guest.confirm_placement());
        let base_id = *guest.registry().bases.keys().next().unwrap();
        assert_eq!(base_id, 100_001);
        guest.cancel_action();
        assert!(guest.select(Selection::Base(base_id)));
        assert!(guest.upgrade_lab(TowerKind::Laser));
        assert!(guest.create_tower(TowerKind::Laser));
        pump(&mut guest, &mut host);

        let base = &host.registry().bases[&base_id];
        assert_eq!(base.owner_index, 1);
        assert_eq!(base.position, Vec3::new(55.0, 0.1, 3.0));
        let tower = &host.registry().towers[&base_id];
        assert_eq!(tower.kind, TowerKind::Laser);
        assert_eq!(tower.level, 2);
        assert_eq!(tower.owner_index, 1);

        // moving carries the tower along
        assert!(guest.request_move_toggle());
        guest.point_at(Vec3::new(57.0, 0.0, 3.0));
        assert!(guest.confirm_placement());
        pump(&mut guest, &mut host);
        assert_eq!(host.registry().bases.len(), 1);
        assert_eq!(host.registry().bases[&base_id].position.x, 57.0);
        assert_eq!(host.registry().towers[&base_id].position.x, 57.0);
    }

    #[test]
    fn owner_decides_damage_and_gold() {
        let mut host = session(0, 2);
        let mut guest = session(1, 2);

        assert!(host.request_build_toggle());
        host.point_at(Vec3::new(-10.0, 0.0, -17.0));
        assert!(host.confirm_placement());
        host.cancel_action();
        assert!(host.select(Selection::Base(1)));
        assert!(host.create_tower(TowerKind::Machine));
        let spent = 1000 - host.economy().gold();

        assert!(host.broadcast_game_start(0.0));
        pump(&mut host, &mut guest);

        for _ in 0..300 {
            host.tick(0.1);
            guest.tick(0.1);
            pump(&mut host, &mut guest);
            pump(&mut guest, &mut host);
        }

        assert!(host.economy().gold() > 1000 - spent, "host never earned kill gold");
        assert_eq!(guest.economy().gold(), 1000);

        // every enemy alive on its owner matches the replica elsewhere
        for (key, enemy) in host.registry().enemies.iter() {
            if !enemy.is_authoritative() {
                continue;
            }
            let replica = guest.registry().enemy(*key).unwrap();
            assert_approx_eq!(replica.hp, enemy.hp);
            assert!(!replica.is_authoritative());
        }
        for (key, enemy) in guest.registry().enemies.iter() {
            if enemy.is_authoritative() {
                assert_approx_eq!(host.registry().enemy(*key).unwrap().hp, enemy.hp);
            }
        }
        assert!(host.registry().enemies.keys().any(|key| key.spawner_id == 1));
    }

    #[test]
    fn replicated_death_removes_enemy_without_gold() {
        let mut host = session(0, 2);
        let mut guest = session(1, 2);
        assert!(host.broadcast_game_start(0.0));
        pump(&mut host, &mut guest);

        for _ in 0..80 {
            host.tick(0.1);
            pump(&mut host, &mut guest);
        }
        let key: EnemyKey = *guest
            .registry()
            .enemies
            .keys()
            .find(|key| key.spawner_id == 0)
            .unwrap();

        let death = WireMessage::EnemyDeath(EnemyDeath {
            enemy_id: key.enemy_id,
            spawner_id: key.spawner_id,
        });
        guest.receive_datagram(&death.encode_bytes().unwrap());
        guest.receive_datagram(&death.encode_bytes().unwrap());
        guest.tick(0.0);

        assert!(guest.registry().enemy(key).is_none());
        assert_eq!(guest.economy().gold(), 1000);
    }
}

/// RELAY TESTS
mod relay_tests {
    use super::*;

    async fn start_relay() -> (SocketAddr, UnboundedSender<RelayMessage>) {
        let mut relay = Relay::new("127.0.0.1:0", 4, Duration::from_secs(5))
            .await
            .unwrap();
        let addr = relay.local_addr().unwrap();
        let tx = relay.sender();
        tokio::spawn(async move {
            let _ = relay.run().await;
        });
        (addr, tx)
    }

    /// Tests raw forwarding between two registered sockets
    #[tokio::test]
    async fn relay_forwards_encoded_messages() {
        let (relay_addr, relay_tx) = start_relay().await;
        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        b.send_to(RELAY_HELLO.as_bytes(), relay_addr).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        let message = WireMessage::GameStart(GameStart { start_unix: 42.0 });
        a.send_to(&message.encode_bytes().unwrap(), relay_addr)
            .await
            .unwrap();

        let mut buffer = [0u8; MAX_DATAGRAM];
        let (len, from) = timeout(Duration::from_secs(1), b.recv_from(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from, relay_addr);
        assert_eq!(WireMessage::decode_bytes(&buffer[..len]).unwrap(), message);

        relay_tx.send(RelayMessage::Shutdown).unwrap();
    }

    /// Tests two full peers talking through the relay
    #[tokio::test]
    async fn peers_share_match_start_through_relay() {
        let (relay_addr, relay_tx) = start_relay().await;
        let relay_addr = relay_addr.to_string();

        let mut host = Peer::new("127.0.0.1:0", &relay_addr, session(0, 2), 60)
            .await
            .unwrap();
        let mut guest = Peer::new("127.0.0.1:0", &relay_addr, session(1, 2), 60)
            .await
            .unwrap();
        let host_tx = host.sender();
        let guest_tx = guest.sender();

        let driver = tokio::spawn(async move {
            sleep(Duration::from_millis(200)).await;
            host_tx
                .send(PeerMessage::Input("start".to_string()))
                .unwrap();
            sleep(Duration::from_millis(400)).await;
            host_tx.send(PeerMessage::Shutdown).unwrap();
            guest_tx.send(PeerMessage::Shutdown).unwrap();
        });

        let (host_result, guest_result) = tokio::join!(host.run(), guest.run());
        assert_ok!(host_result);
        assert_ok!(guest_result);
        driver.await.unwrap();

        assert!(host.session().is_started());
        assert!(guest.session().is_started());
        assert_eq!(host.session().match_start(), guest.session().match_start());

        relay_tx.send(RelayMessage::Shutdown).unwrap();
    }
}
