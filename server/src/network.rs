//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::ClientManager;
use crate::config::{AdminCredentials, ServerConfig};
use crate::game::{GameEvent, GameState};
use crate::persistence::{self, DocumentStore, JsonFileStore, PersistJob};
use crate::protocol::Command;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PROTOCOL_VERSION, WORLD};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

const RECV_BUFFER_SIZE: usize = 2048;
const TIMEOUT_CHECK_PERIOD: Duration = Duration::from_secs(1);
const STATUS_LOG_TICKS: u64 = 100;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<u32>,
    },
}

/// Main server coordinating networking and game simulation
///
/// Owns the UDP socket, the `ClientManager` and the `GameState`. Packet
/// reception, packet sending and timeout checks run in their own tasks and
/// talk to the main loop over unbounded channels: `ServerMessage` flows in,
/// `GameMessage` flows out. All game mutations happen on the main loop, one
/// message or tick at a time, so the simulation needs no locking.
///
/// Settings and stats are written by a background persistence task, so a
/// slow disk never delays a tick.
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState,
    tick_duration: Duration,
    admin: Option<AdminCredentials>,
    started: Instant,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
    persist_tx: mpsc::UnboundedSender<PersistJob>,
}

impl Server {
    /// Binds the socket and loads persisted documents from `config.data_dir`.
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = JsonFileStore::new(&config.data_dir)?;
        Self::with_store(config, Arc::new(store)).await
    }

    /// Binds the socket and loads documents from an arbitrary store.
    ///
    /// Missing documents are replaced by defaults and written back; malformed
    /// ones fall back to defaults and are overwritten on the next change.
    /// Without `config.admin` every admin login is refused.
    ///
    /// # Errors
    /// Fails only if the socket cannot be bound.
    pub async fn with_store(
        config: ServerConfig,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let settings = persistence::load_settings(store.as_ref());
        let stats = persistence::load_stats(store.as_ref());
        info!(
            "Loaded caps (foxes {}, rabbits {}) and stats {:?}",
            settings.max_foxes, settings.max_rabbits, stats
        );
        if config.admin.is_none() {
            warn!("No admin credentials configured, admin login is disabled");
        }

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let persist_tx = persistence::spawn_writer(store);

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(
                config.max_clients,
                config.client_timeout,
            ))),
            game_state: GameState::new(settings, stats),
            tick_duration: config.tick_duration,
            admin: config.admin,
            started: Instant::now(),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
            persist_tx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sending `ServerMessage::Shutdown` on this handle stops `run`.
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn game_state(&self) -> &GameState {
        &self.game_state
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; RECV_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        let data = match serialize(&packet) {
                            Ok(data) => data,
                            Err(e) => {
                                error!("Failed to encode broadcast: {}", e);
                                continue;
                            }
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TIMEOUT_CHECK_PERIOD);

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    async fn send_to_client(&self, client_id: u32, packet: Packet) {
        let addr = {
            let clients = self.clients.read().await;
            clients.get_addr(client_id)
        };

        match addr {
            Some(addr) => self.send_packet(packet, addr),
            None => debug!("Dropping {:?} for departed client {}", packet, client_id),
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<u32>) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    fn persist(&self, job: PersistJob) {
        if let Err(e) = self.persist_tx.send(job) {
            error!("Persistence writer is gone, dropping {:?}", e.0);
        }
    }

    /// Processes incoming packets and updates game state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect { client_version } = packet {
            self.handle_connect(client_version, addr).await;
            self.flush_events().await;
            return;
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            let client_id = clients.find_client_by_addr(addr);
            if let Some(id) = client_id {
                clients.touch(id);
            }
            client_id
        };

        let Some(client_id) = client_id else {
            debug!("Ignoring packet from unconnected address {}", addr);
            return;
        };

        match Command::from_packet(packet) {
            Some(command) => self.handle_command(client_id, command).await,
            None => warn!("Unexpected packet type from client {} at {}", client_id, addr),
        }

        self.flush_events().await;
    }

    async fn handle_connect(&mut self, client_version: u32, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            self.send_packet(
                Packet::Disconnected {
                    reason: "Protocol version mismatch".to_string(),
                },
                addr,
            );
            return;
        }

        // A reconnect from the same address starts over
        let existing_client_id = {
            let clients = self.clients.read().await;
            clients.find_client_by_addr(addr)
        };

        if let Some(existing_id) = existing_client_id {
            info!("Removing existing client {} from {}", existing_id, addr);
            let mut clients = self.clients.write().await;
            clients.remove_client(&existing_id);
            self.game_state.remove_player(&existing_id);
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            clients.add_client(addr)
        };

        let response = match client_id {
            Some(client_id) => Packet::Hello {
                client_id,
                world: WORLD,
                settings: self.game_state.settings(),
            },
            None => Packet::Disconnected {
                reason: "Server full".to_string(),
            },
        };
        self.send_packet(response, addr);
    }

    async fn handle_command(&mut self, client_id: u32, command: Command) {
        match command {
            Command::Join { name, species } => {
                let admission = self.game_state.join(client_id, name, species);
                debug!("Client {} join outcome: {:?}", client_id, admission);
            }

            Command::Move { input, dt } => {
                self.game_state.apply_move(client_id, input, dt);
            }

            Command::AdminLogin { user, pass } => {
                let ok = self
                    .admin
                    .as_ref()
                    .map(|creds| creds.matches(&user, &pass))
                    .unwrap_or(false);

                if ok {
                    info!("Client {} logged in as admin", client_id);
                    self.clients.write().await.set_admin(client_id);
                } else {
                    warn!("Rejected admin login from client {}", client_id);
                }
                self.send_to_client(client_id, Packet::AdminLoginResult { ok })
                    .await;
            }

            Command::UpdateSettings {
                max_foxes,
                max_rabbits,
            } => {
                let is_admin = self.clients.read().await.is_admin(client_id);
                if is_admin {
                    self.game_state.update_settings(max_foxes, max_rabbits);
                } else {
                    debug!("Dropping settings update from non-admin {}", client_id);
                }
            }

            Command::Heartbeat => {}

            Command::Leave => {
                info!("Client {} disconnected", client_id);
                self.clients.write().await.remove_client(&client_id);
                self.game_state.remove_player(&client_id);
            }
        }
    }

    /// Turns pending game events into packets and persistence jobs.
    ///
    /// Per-connection notifications go out in order. Broadcasts and
    /// document writes are coalesced to one of each per batch.
    async fn flush_events(&mut self) {
        let events = self.game_state.drain_events();
        if events.is_empty() {
            return;
        }

        let mut settings_changed = false;
        let mut stats_changed = false;
        let mut state_changed = false;

        for event in events {
            match event {
                GameEvent::EnteredGame { id, admission } => {
                    let packet = Packet::EnteredGame {
                        ok: admission.is_admitted(),
                        reason: admission.reason(),
                        settings: self.game_state.settings(),
                        world: WORLD,
                    };
                    self.send_to_client(id, packet).await;
                }
                GameEvent::OutOfEnergy { id } => {
                    self.send_to_client(id, Packet::OutOfEnergy).await;
                }
                GameEvent::Eaten { id } => {
                    self.send_to_client(id, Packet::Eaten).await;
                }
                GameEvent::SettingsChanged => settings_changed = true,
                GameEvent::StatsChanged => stats_changed = true,
                GameEvent::StateChanged => state_changed = true,
            }
        }

        if settings_changed {
            let settings = self.game_state.settings();
            self.persist(PersistJob::Settings(settings));
            self.broadcast_packet(Packet::Settings(settings), None);
        }
        if stats_changed {
            self.persist(PersistJob::Stats(self.game_state.stats()));
        }
        if state_changed {
            self.broadcast_packet(Packet::State(self.game_state.snapshot()), None);
        }
    }

    /// Milliseconds since the server started, the simulation's clock
    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Advances the simulation one step and sends the per-tick frame
    async fn run_tick(&mut self) {
        let now = self.now_ms();
        self.game_state.tick(now);
        self.flush_events().await;

        let client_count = {
            let clients = self.clients.read().await;
            clients.len()
        };

        if client_count == 0 {
            return;
        }

        let packet = Packet::Tick {
            state: self.game_state.snapshot(),
            hearts: self.game_state.hearts(),
            hits: self.game_state.hits(),
        };
        self.broadcast_packet(packet, None);

        if self.game_state.tick % STATUS_LOG_TICKS == 0 {
            let counts = self.game_state.counts();
            debug!(
                "Tick {}: {} clients, {} foxes, {} rabbits, {} waiting",
                self.game_state.tick,
                client_count,
                counts.foxes,
                counts.rabbits,
                self.game_state.lobby_len()
            );
        }
    }

    /// Main server loop coordinating all operations
    ///
    /// Spawns the receiver, sender and timeout tasks, then alternates between
    /// inbound messages and the fixed-rate tick until a
    /// `ServerMessage::Shutdown` arrives. Ticks that fall behind are skipped
    /// rather than replayed in a burst.
    ///
    /// Every tick sends one `Packet::Tick` frame with the snapshot and the
    /// live markers to every connected client.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Server started, ticking every {} ms",
            self.tick_duration.as_millis()
        );

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.game_state.remove_player(&client_id);
                            self.flush_events().await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    self.run_tick().await;
                },
            }
        }

        Ok(())
    }
}
