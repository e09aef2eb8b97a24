//! Connection registry for the multiplayer server
//!
//! Tracks every UDP peer that has completed the `Connect` handshake:
//! - Client id assignment and capacity limits
//! - Address lookup for routing inbound datagrams to a client id
//! - Liveness tracking and timeout cleanup
//! - The per-session admin flag set by a successful `AdminLogin`
//!
//! Player simulation state lives in `GameState`; this table only holds
//! what the transport needs.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected peer
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier, also used as the player id
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Set once this session has passed an admin login
    pub is_admin: bool,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            is_admin: false,
        }
    }

    /// Returns true if nothing has been heard from this client within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// The manager is the transport's view of who is connected. It is shared
/// behind an `RwLock` between the server loop, which registers and removes
/// clients as packets arrive, and the timeout task, which sweeps silent
/// ones out.
///
/// Client ids start at 1 and are never reused within a process, so a stale
/// id held by some other system can never alias a newer connection. The same
/// id doubles as the player id inside `GameState`.
///
/// # Capacity
///
/// `max_clients` bounds connections, not players in play. Species caps are
/// enforced separately at admission, so a full game still accepts
/// connections that then wait in the lobby.
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
    timeout: Duration,
}

impl ClientManager {
    /// Creates an empty registry.
    ///
    /// # Arguments
    /// * `max_clients` - Connections accepted before `add_client` refuses
    /// * `timeout` - Silence after which `check_timeouts` drops a client
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Registers a new connection
    ///
    /// The client starts out live (`last_seen` is now) and without admin
    /// rights. Callers look up existing addresses with `find_client_by_addr`
    /// first; this method does not deduplicate.
    ///
    /// Returns Some(client_id) if successful, None if the server is full.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client, returning false if it was already gone
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Maps the source address of a datagram back to its client id
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get_addr(&self, client_id: u32) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Refreshes the liveness timestamp of a client
    pub fn touch(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_seen = Instant::now();
        }
    }

    /// Grants admin rights for the rest of this session.
    ///
    /// Rights are not persisted and vanish with the connection; a reconnect
    /// has to log in again.
    pub fn set_admin(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.is_admin = true;
        }
    }

    pub fn is_admin(&self, client_id: u32) -> bool {
        self.clients
            .get(&client_id)
            .map(|client| client.is_admin)
            .unwrap_or(false)
    }

    /// Removes every client that has been silent longer than the timeout
    ///
    /// Any inbound packet counts as a sign of life (see `touch`), so clients
    /// that only send heartbeats stay connected. Run periodically by the
    /// server's timeout task.
    ///
    /// Returns the removed ids so the game state can drop their players.
    pub fn check_timeouts(&mut self) -> Vec<u32> {
        let timeout = self.timeout;
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// All client ids with their addresses, used for broadcasts
    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
