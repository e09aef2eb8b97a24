//! # Predator/Prey Game Server Library
//!
//! This library provides the authoritative server for a top-down multiplayer
//! game in which foxes hunt rabbits. It owns the canonical game state,
//! validates client inputs, and broadcasts updates so every connected
//! client sees the same world.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! All movement, collisions, energy, and population decisions are made here.
//! Clients send intents (join, move) and render whatever the server tells
//! them.
//!
//! ### Population Economy
//! The number of foxes and rabbits allowed in play is capped. Rabbits meeting
//! each other raise the rabbit cap, foxes that have eaten twice raise the fox
//! cap, and an authenticated operator can set both directly. Players that
//! cannot be admitted wait in a lobby and are let in, oldest first, when a
//! slot frees up.
//!
//! ### Client Management
//! Handles the lifecycle of client connections:
//! - Connection establishment and id assignment
//! - Liveness tracking and timeouts
//! - Operator authentication
//!
//! ## Module Organization
//!
//! - `game`: `GameState`, the single owner of all mutable simulation state,
//!   and the `GameEvent` outbox
//! - `admission`: capacity checks, the waiting lobby, and its drain
//! - `movement`: per-input motion and world clamping
//! - `collision`: the fixed-rate tick: energy drain, bonus expiry, and pair
//!   interactions
//! - `economy`: capacity caps and their growth and operator overrides
//! - `snapshot`: read-only projections broadcast to clients
//! - `protocol`: validation of inbound packets into `Command`s
//! - `persistence`: settings and stats documents
//! - `client_manager`: the connection registry
//! - `network`: UDP transport and the server loop
//! - `config`: runtime configuration
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "0.0.0.0:3000".to_string(),
//!         ..ServerConfig::default()
//!     };
//!
//!     // Runs until a Shutdown message arrives on `shutdown_handle()`
//!     let mut server = Server::new(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server uses an event-driven architecture with internal async tasks:
//! - **Network Receiver**: Continuously listens for incoming packets
//! - **Network Sender**: Processes outgoing packet queue and broadcasts
//! - **Timeout Checker**: Monitors client health and removes silent connections
//! - **Persistence Writer**: Writes settings and stats documents off the loop
//! - **Main Loop**: Applies packets as they arrive and runs the tick

pub mod admission;
pub mod client_manager;
pub mod collision;
pub mod config;
pub mod economy;
pub mod game;
pub mod movement;
pub mod network;
pub mod persistence;
pub mod protocol;
pub mod snapshot;
