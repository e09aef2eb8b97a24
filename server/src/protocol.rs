//! Boundary validation of inbound packets.
//!
//! Client packets are converted into `Command`s before they reach the game
//! state: names are cleaned and bounded, species strings resolved, and
//! non-finite numbers dropped. Server-to-client packet variants arriving from
//! a client are rejected here.

use shared::{MoveInput, Packet, Species, DEFAULT_NAME, MAX_NAME_LEN};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Join {
        name: String,
        species: Species,
    },
    Move {
        input: MoveInput,
        dt: Option<f64>,
    },
    AdminLogin {
        user: String,
        pass: String,
    },
    UpdateSettings {
        max_foxes: Option<f64>,
        max_rabbits: Option<f64>,
    },
    Heartbeat,
    Leave,
}

impl Command {
    /// Returns None for packets a client must not send, and for `Connect`,
    /// which the network layer handles before a client id exists.
    pub fn from_packet(packet: Packet) -> Option<Command> {
        match packet {
            Packet::JoinLobby { name, species } => Some(Command::Join {
                name: sanitize_name(&name),
                species: Species::parse_lenient(&species),
            }),
            Packet::Move { input, dt } => Some(Command::Move { input, dt }),
            Packet::AdminLogin { user, pass } => Some(Command::AdminLogin { user, pass }),
            Packet::UpdateSettings {
                max_foxes,
                max_rabbits,
            } => Some(Command::UpdateSettings {
                max_foxes: max_foxes.filter(|v| v.is_finite()),
                max_rabbits: max_rabbits.filter(|v| v.is_finite()),
            }),
            Packet::Heartbeat => Some(Command::Heartbeat),
            Packet::Disconnect => Some(Command::Leave),
            _ => None,
        }
    }
}

/// Strips control characters, trims, and caps the length in characters.
///
/// Surrounding whitespace is removed before the cap is applied, so padding
/// never pushes the real name out of the first `MAX_NAME_LEN` characters.
pub fn sanitize_name(raw: &str) -> String {
    let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();
    let bounded: String = cleaned.trim().chars().take(MAX_NAME_LEN).collect();
    let trimmed = bounded.trim_end();

    if trimmed.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}
