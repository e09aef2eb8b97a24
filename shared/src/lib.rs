use serde::{Deserialize, Serialize};

pub const WORLD_WIDTH: f32 = 2000.0;
pub const WORLD_HEIGHT: f32 = 1200.0;
pub const BASE_SPEED: f32 = 150.0;
pub const FOX_SPEED_FACTOR: f32 = 1.05;
pub const FOX_SPEED_BONUS: f32 = 1.2;
pub const SPEED_BONUS_MS: u64 = 5_000;
pub const FOX_ENERGY_MAX_MS: u32 = 45_000;
pub const COLLIDE_RADIUS: f32 = 32.0;
pub const TICK_MS: u64 = 100;
pub const ENERGY_DRAIN_PER_TICK_MS: u32 = TICK_MS as u32;
pub const HEART_WINDOW_MS: u64 = 1_500;
pub const HIT_WINDOW_MS: u64 = 700;
pub const PAIR_COOLDOWN_MS: u64 = 1_500;
pub const MAX_RABBITS_CEILING: u32 = 500;
pub const MAX_FOXES_LIMIT: u32 = 100;
pub const MAX_RABBITS_LIMIT: u32 = 200;
pub const MAX_NAME_LEN: usize = 16;
pub const DEFAULT_NAME: &str = "Player";
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Species {
    Fox,
    Rabbit,
}

impl Species {
    /// Only the exact string `"fox"` joins as a fox; anything else,
    /// including other casings, joins as a rabbit.
    pub fn parse_lenient(raw: &str) -> Self {
        if raw == "fox" {
            Species::Fox
        } else {
            Species::Rabbit
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub width: f32,
    pub height: f32,
}

pub const WORLD: WorldBounds = WorldBounds {
    width: WORLD_WIDTH,
    height: WORLD_HEIGHT,
};

/// Per-species population caps.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub max_foxes: u32,
    pub max_rabbits: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_foxes: 5,
            max_rabbits: 20,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub hearts: u64,
    pub rabbits_eaten: u64,
    pub fox_births: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpeciesCounts {
    pub foxes: u32,
    pub rabbits: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveInput {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

/// Public projection of a player. Energy is only present for foxes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerView {
    pub id: u32,
    pub name: String,
    pub species: Species,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub alive: bool,
    pub in_game: bool,
    pub speed_mul: f32,
    pub energy_ms: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Snapshot {
    pub players: Vec<PlayerView>,
    pub settings: Settings,
    pub world: WorldBounds,
    pub counts: SpeciesCounts,
    pub queue: u32,
    pub stats: Stats,
}

/// Short-lived marker for a heart (two rabbits meeting) or a hit (a fox eating).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct EventMarker {
    pub x: f32,
    pub y: f32,
    pub t: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum QueueReason {
    Capacity,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Client -> server
    Connect {
        client_version: u32,
    },
    Heartbeat,
    JoinLobby {
        name: String,
        species: String,
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
    Disconnect,

    // Server -> client
    Hello {
        client_id: u32,
        world: WorldBounds,
        settings: Settings,
    },
    EnteredGame {
        ok: bool,
        reason: Option<QueueReason>,
        settings: Settings,
        world: WorldBounds,
    },
    OutOfEnergy,
    Eaten,
    AdminLoginResult {
        ok: bool,
    },
    Settings(Settings),
    State(Snapshot),
    Tick {
        state: Snapshot,
        hearts: Vec<EventMarker>,
        hits: Vec<EventMarker>,
    },
    Disconnected {
        reason: String,
    },
}
