//! Integration tests for the predator/prey server
//!
//! These tests drive `GameState` through whole gameplay scenarios and run a
//! real server over UDP.

use assert_approx_eq::assert_approx_eq;
use bincode::{deserialize, serialize};
use server::admission::Admission;
use server::config::{AdminCredentials, ServerConfig};
use server::game::{GameEvent, GameState};
use server::network::{Server, ServerMessage};
use server::persistence::{self, JsonFileStore};
use shared::{
    MoveInput, Packet, QueueReason, Settings, Species, Stats, BASE_SPEED, FOX_ENERGY_MAX_MS,
    FOX_SPEED_BONUS, FOX_SPEED_FACTOR, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{sleep, timeout, Instant};

fn state_with_caps(max_foxes: u32, max_rabbits: u32) -> GameState {
    GameState::with_seed(
        Settings {
            max_foxes,
            max_rabbits,
        },
        Stats::default(),
        42,
    )
}

fn place(state: &mut GameState, id: u32, x: f32, y: f32) {
    let player = state.player_mut(id).unwrap();
    player.x = x;
    player.y = y;
}

/// GAMEPLAY SCENARIOS
mod scenario_tests {
    use super::*;

    /// A fox eats the only rabbit while a second fox waits
    #[test]
    fn fox_eats_rabbit_while_second_fox_waits() {
        let mut state = state_with_caps(1, 1);

        assert_eq!(state.join(1, "A".into(), Species::Fox), Admission::Admitted);
        assert_eq!(
            state.join(2, "B".into(), Species::Fox),
            Admission::Queued(QueueReason::Capacity)
        );
        assert_eq!(state.join(3, "C".into(), Species::Rabbit), Admission::Admitted);
        state.drain_events();

        place(&mut state, 1, 400.0, 400.0);
        place(&mut state, 3, 410.0, 400.0);
        state.tick(100);

        let events = state.drain_events();
        assert!(events.contains(&GameEvent::Eaten { id: 3 }));

        let rabbit = state.player(3).unwrap();
        assert!(!rabbit.in_game);
        assert!(state.is_waiting(3));

        let fox = state.player(1).unwrap();
        assert_eq!(fox.energy_ms(), Some(FOX_ENERGY_MAX_MS));
        assert_eq!(fox.speed_mul, FOX_SPEED_BONUS);
        assert_eq!(state.stats().rabbits_eaten, 1);
        assert_eq!(state.hits().len(), 1);

        // Bonus lasts five seconds
        state.tick(5_000);
        assert_eq!(state.player(1).unwrap().speed_mul, FOX_SPEED_BONUS);
        state.tick(5_100);
        assert_eq!(state.player(1).unwrap().speed_mul, 1.0);

        // Eating does not raise the fox cap
        assert_eq!(state.settings().max_foxes, 1);
        assert!(state.is_waiting(2));
        assert!(!state.player(2).unwrap().in_game);
    }

    /// A fed fox outruns a rabbit until its bonus wears off
    #[test]
    fn fed_fox_moves_faster_until_bonus_expires() {
        let mut state = state_with_caps(1, 2);
        state.join(1, "A".into(), Species::Fox);
        state.join(2, "C".into(), Species::Rabbit);
        place(&mut state, 1, 400.0, 400.0);
        place(&mut state, 2, 400.0, 420.0);
        state.tick(100);

        let right = MoveInput {
            right: true,
            ..MoveInput::default()
        };

        state.apply_move(1, right, Some(100.0));
        let fox = state.player(1).unwrap();
        assert_approx_eq!(fox.vx, BASE_SPEED * FOX_SPEED_FACTOR * FOX_SPEED_BONUS, 1e-3);
        assert_approx_eq!(fox.x, 400.0 + fox.vx * 0.1, 1e-3);

        state.tick(5_100);
        state.apply_move(1, right, Some(100.0));
        assert_approx_eq!(
            state.player(1).unwrap().vx,
            BASE_SPEED * FOX_SPEED_FACTOR,
            1e-3
        );
    }

    /// Two rabbits meet and make room for a waiting one
    #[test]
    fn rabbits_meeting_admits_waiting_rabbit() {
        let mut state = state_with_caps(5, 2);

        state.join(1, "D".into(), Species::Rabbit);
        state.join(2, "E".into(), Species::Rabbit);
        assert_eq!(
            state.join(3, "F".into(), Species::Rabbit),
            Admission::Queued(QueueReason::Capacity)
        );
        state.drain_events();

        place(&mut state, 1, 800.0, 300.0);
        place(&mut state, 2, 820.0, 300.0);
        state.tick(100);

        assert_eq!(state.hearts().len(), 1);
        assert_eq!(state.settings().max_rabbits, 3);
        assert_eq!(state.stats().hearts, 1);
        assert!(state.player(3).unwrap().in_game);
        assert!(!state.is_waiting(3));

        let events = state.drain_events();
        assert!(events.contains(&GameEvent::SettingsChanged));
        assert!(events.contains(&GameEvent::StatsChanged));
    }

    /// A starving fox gives up its slot to the fox that was waiting
    #[test]
    fn starved_fox_frees_slot_for_waiting_fox() {
        let mut state = state_with_caps(1, 20);

        state.join(1, "A".into(), Species::Fox);
        state.join(2, "B".into(), Species::Fox);
        state.player_mut(1).unwrap().fox.as_mut().unwrap().energy_ms = 100;
        state.drain_events();

        state.tick(100);

        let events = state.drain_events();
        assert!(events.contains(&GameEvent::OutOfEnergy { id: 1 }));
        assert!(!state.player(1).unwrap().in_game);
        assert_eq!(state.counts().foxes, 0);

        // B waited longer, so B goes first
        assert_eq!(state.drain_lobby(), Some(2));
        assert!(state.player(2).unwrap().in_game);
        assert!(state.is_waiting(1));
        assert_eq!(state.drain_lobby(), None);
    }

    /// Hearts are rate limited per pair and expire after their window
    #[test]
    fn heart_cooldown_and_expiry() {
        let mut state = state_with_caps(5, 20);
        state.join(1, "D".into(), Species::Rabbit);
        state.join(2, "E".into(), Species::Rabbit);
        place(&mut state, 1, 800.0, 300.0);
        place(&mut state, 2, 800.0, 310.0);

        state.tick(100);
        assert_eq!(state.hearts().len(), 1);

        state.tick(1_500);
        assert_eq!(state.hearts().len(), 1);
        assert_eq!(state.stats().hearts, 1);

        state.tick(1_600);
        assert!(state.hearts().is_empty());
        assert_eq!(state.stats().hearts, 1);

        state.tick(1_700);
        assert_eq!(state.hearts().len(), 1);
        assert_eq!(state.hearts()[0].t, 1_700);
        assert_eq!(state.stats().hearts, 2);
        assert_eq!(state.settings().max_rabbits, 22);
    }

    /// A fox that eats twice raises the fox cap exactly once
    #[test]
    fn second_meal_reproduces_once() {
        let mut state = state_with_caps(1, 20);
        state.join(1, "A".into(), Species::Fox);
        state.join(2, "B".into(), Species::Fox);

        for (rabbit, now) in [(10u32, 100u64), (11, 200), (12, 300)] {
            state.join(rabbit, "r".into(), Species::Rabbit);
            place(&mut state, 1, 1000.0, 600.0);
            place(&mut state, rabbit, 1000.0, 610.0);
            state.tick(now);
        }

        assert_eq!(state.stats().rabbits_eaten, 3);
        assert_eq!(state.stats().fox_births, 1);
        assert_eq!(state.settings().max_foxes, 2);
        assert!(state.player(2).unwrap().in_game);
    }
}

/// PERSISTENCE TESTS
mod persistence_tests {
    use super::*;

    #[test]
    fn settings_and_stats_survive_restart() {
        let dir = temp_dir("restart");
        {
            let store = JsonFileStore::new(&dir).unwrap();
            let mut state = GameState::new(
                persistence::load_settings(&store),
                persistence::load_stats(&store),
            );
            state.update_settings(Some(7.0), Some(30.0));
            persistence::save_document(&store, persistence::SETTINGS_KEY, &state.settings())
                .unwrap();
        }

        let store = JsonFileStore::new(&dir).unwrap();
        let settings = persistence::load_settings(&store);
        assert_eq!(
            settings,
            Settings {
                max_foxes: 7,
                max_rabbits: 30
            }
        );
        assert!(dir.join("stats.json").exists());

        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("settings.json")).unwrap())
                .unwrap();
        assert_eq!(on_disk["maxFoxes"], 7);
        assert_eq!(on_disk["maxRabbits"], 30);

        let stats: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("stats.json")).unwrap())
                .unwrap();
        assert_eq!(stats["hearts"], 0);
        assert_eq!(stats["rabbitsEaten"], 0);
        assert_eq!(stats["foxBirths"], 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn operator_values_are_clamped() {
        let mut state = state_with_caps(5, 20);

        state.update_settings(Some(1e9), Some(-3.0));
        assert_eq!(
            state.settings(),
            Settings {
                max_foxes: 100,
                max_rabbits: 0
            }
        );

        state.update_settings(Some(f64::NAN), Some(12.9));
        assert_eq!(state.settings().max_foxes, 100);
        assert_eq!(state.settings().max_rabbits, 12);
    }
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "foxhole-integration-{}-{}",
        name,
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// LIVE NETWORK TESTS
mod network_tests {
    use super::*;

    async fn start_server(config: ServerConfig) -> (SocketAddr, UnboundedSender<ServerMessage>) {
        let mut server = Server::new(config).await.expect("server should start");
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        (addr, shutdown)
    }

    async fn send(socket: &UdpSocket, packet: &Packet, addr: SocketAddr) {
        socket.send_to(&serialize(packet).unwrap(), addr).await.unwrap();
    }

    /// Receives until a packet satisfies `pred`, failing after two seconds
    async fn recv_until(socket: &UdpSocket, pred: impl Fn(&Packet) -> bool) -> Packet {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut buf = vec![0u8; 65_536];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let (len, _) = timeout(remaining, socket.recv_from(&mut buf))
                .await
                .expect("timed out waiting for packet")
                .unwrap();
            let packet: Packet = deserialize(&buf[..len]).unwrap();
            if pred(&packet) {
                return packet;
            }
        }
    }

    async fn connect(socket: &UdpSocket, addr: SocketAddr) -> u32 {
        send(
            socket,
            &Packet::Connect {
                client_version: PROTOCOL_VERSION,
            },
            addr,
        )
        .await;

        match recv_until(socket, |p| matches!(p, Packet::Hello { .. })).await {
            Packet::Hello { client_id, .. } => client_id,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn join_and_receive_ticks() {
        let dir = temp_dir("live-join");
        let (addr, shutdown) = start_server(ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            data_dir: dir.clone(),
            ..ServerConfig::default()
        })
        .await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let id = connect(&client, addr).await;

        send(
            &client,
            &Packet::JoinLobby {
                name: "Todd".to_string(),
                species: "fox".to_string(),
            },
            addr,
        )
        .await;

        let entered = recv_until(&client, |p| matches!(p, Packet::EnteredGame { .. })).await;
        assert!(matches!(entered, Packet::EnteredGame { ok: true, reason: None, .. }));

        let frame = recv_until(&client, |p| matches!(p, Packet::Tick { .. })).await;
        match frame {
            Packet::Tick { state, .. } => {
                let me = state.players.iter().find(|p| p.id == id).unwrap();
                assert_eq!(me.name, "Todd");
                assert_eq!(me.species, Species::Fox);
                assert!(me.in_game);
                assert!(me.energy_ms.is_some());
                assert_eq!(state.counts.foxes, 1);
            }
            _ => unreachable!(),
        }

        send(&client, &Packet::Disconnect, addr).await;
        shutdown.send(ServerMessage::Shutdown).unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn admin_settings_are_broadcast_and_persisted() {
        let dir = temp_dir("live-admin");
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            data_dir: dir.clone(),
            admin: Some(AdminCredentials {
                user: "warden".to_string(),
                pass: "burrow".to_string(),
            }),
            ..ServerConfig::default()
        };
        let (addr, shutdown) = start_server(config.clone()).await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        connect(&client, addr).await;

        send(
            &client,
            &Packet::AdminLogin {
                user: "warden".to_string(),
                pass: "burrow".to_string(),
            },
            addr,
        )
        .await;
        let login = recv_until(&client, |p| matches!(p, Packet::AdminLoginResult { .. })).await;
        assert_eq!(login, Packet::AdminLoginResult { ok: true });

        send(
            &client,
            &Packet::UpdateSettings {
                max_foxes: Some(7.0),
                max_rabbits: Some(30.0),
            },
            addr,
        )
        .await;

        let expected = Settings {
            max_foxes: 7,
            max_rabbits: 30,
        };
        let broadcast = recv_until(&client, |p| matches!(p, Packet::Settings(_))).await;
        assert_eq!(broadcast, Packet::Settings(expected));

        shutdown.send(ServerMessage::Shutdown).unwrap();

        // The writer runs in the background
        let store = JsonFileStore::new(&dir).unwrap();
        for _ in 0..100 {
            if persistence::load_settings(&store) == expected {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }

        let restarted = Server::new(ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..config
        })
        .await
        .unwrap();
        assert_eq!(restarted.game_state().settings(), expected);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn settings_from_non_admin_are_ignored() {
        let dir = temp_dir("live-nonadmin");
        let (addr, shutdown) = start_server(ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            data_dir: dir.clone(),
            ..ServerConfig::default()
        })
        .await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        connect(&client, addr).await;

        send(
            &client,
            &Packet::UpdateSettings {
                max_foxes: Some(0.0),
                max_rabbits: Some(0.0),
            },
            addr,
        )
        .await;
        send(
            &client,
            &Packet::JoinLobby {
                name: "Hazel".to_string(),
                species: "rabbit".to_string(),
            },
            addr,
        )
        .await;

        // Default caps still admit the rabbit
        let entered = recv_until(&client, |p| matches!(p, Packet::EnteredGame { .. })).await;
        match entered {
            Packet::EnteredGame { ok, settings, .. } => {
                assert!(ok);
                assert_eq!(settings, Settings::default());
            }
            _ => unreachable!(),
        }

        shutdown.send(ServerMessage::Shutdown).unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }
}
