//! Authoritative simulation state.
//!
//! `GameState` is the single owner of everything the simulation mutates:
//! players, the waiting lobby, capacity caps, stats, short-lived event
//! markers and the rabbit pair cooldowns. The component modules
//! (`admission`, `movement`, `collision`, `economy`, `snapshot`) extend it
//! with `impl GameState` blocks.
//!
//! No I/O happens here. Every outcome a connection or the persistence layer
//! must hear about is pushed into an outbox of `GameEvent`s, drained by the
//! network layer after each operation.

use crate::admission::Admission;
use crate::collision::PairKey;
use crate::economy::Economy;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    EventMarker, Settings, Species, Stats, FOX_ENERGY_MAX_MS, WORLD_HEIGHT, WORLD_WIDTH,
};
use std::collections::{BTreeMap, HashMap, VecDeque};

const SPAWN_MARGIN: f32 = 50.0;

/// Fox-only state. Its presence on a `Player` is what makes energy defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoxState {
    pub energy_ms: u32,
    pub rabbits_eaten: u32,
    /// Set on the second rabbit; never cleared for the lifetime of the player
    pub has_reproduced: bool,
}

impl Default for FoxState {
    fn default() -> Self {
        Self {
            energy_ms: FOX_ENERGY_MAX_MS,
            rabbits_eaten: 0,
            has_reproduced: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: u32,
    pub name: String,
    pub species: Species,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub speed_mul: f32,
    /// Tick time at which `speed_mul` falls back to 1
    pub speed_bonus_until: Option<u64>,
    pub alive: bool,
    pub in_game: bool,
    pub fox: Option<FoxState>,
}

impl Player {
    pub fn new(id: u32, name: String, species: Species, x: f32, y: f32) -> Self {
        Self {
            id,
            name,
            species,
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            speed_mul: 1.0,
            speed_bonus_until: None,
            alive: true,
            in_game: false,
            fox: match species {
                Species::Fox => Some(FoxState::default()),
                Species::Rabbit => None,
            },
        }
    }

    pub fn energy_ms(&self) -> Option<u32> {
        self.fox.map(|fox| fox.energy_ms)
    }

    /// Alive and occupying a slot in the simulation
    pub fn is_active(&self) -> bool {
        self.alive && self.in_game
    }

    pub(crate) fn clear_speed_bonus(&mut self) {
        self.speed_mul = 1.0;
        self.speed_bonus_until = None;
    }
}

/// Outcomes the network layer has to act upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    /// Result of an admission decision for one connection
    EnteredGame { id: u32, admission: Admission },
    OutOfEnergy { id: u32 },
    Eaten { id: u32 },
    /// Caps changed: persist and broadcast
    SettingsChanged,
    /// Counters changed: persist
    StatsChanged,
    /// Join, leave, admission or eviction
    StateChanged,
}

/// Everything the simulation knows, in one place.
///
/// `GameState` owns the player table, the waiting lobby, the population caps,
/// the lifetime counters, the heart and hit markers, the per-pair heart
/// cooldowns and the spawn RNG. The behaviour is split across modules that
/// each add an `impl GameState` block: `admission`, `movement`, `collision`,
/// `economy` and `snapshot`.
///
/// Nothing here touches the network or the disk. Every outcome that the
/// outside world must hear about is pushed as a `GameEvent` onto an internal
/// outbox, which the caller empties with `drain_events` after each mutation.
///
/// Time is passed in explicitly as milliseconds (see `tick`), which keeps the
/// whole state deterministic under `with_seed`.
pub struct GameState {
    /// Number of completed ticks
    pub tick: u64,
    pub(crate) players: BTreeMap<u32, Player>,
    /// Waiting set in arrival order, no duplicates
    pub(crate) lobby: VecDeque<u32>,
    pub(crate) economy: Economy,
    pub(crate) stats: Stats,
    pub(crate) hearts: VecDeque<EventMarker>,
    pub(crate) hits: VecDeque<EventMarker>,
    pub(crate) pair_cooldowns: HashMap<PairKey, u64>,
    rng: StdRng,
    events: Vec<GameEvent>,
}

impl GameState {
    /// Creates an empty world with the given caps and counters.
    ///
    /// Both usually come from the persisted documents. Spawn points are
    /// seeded from OS entropy.
    pub fn new(settings: Settings, stats: Stats) -> Self {
        Self::with_rng(settings, stats, StdRng::from_entropy())
    }

    /// Deterministic spawn points, for tests and replays
    pub fn with_seed(settings: Settings, stats: Stats, seed: u64) -> Self {
        Self::with_rng(settings, stats, StdRng::seed_from_u64(seed))
    }

    fn with_rng(settings: Settings, stats: Stats, rng: StdRng) -> Self {
        Self {
            tick: 0,
            players: BTreeMap::new(),
            lobby: VecDeque::new(),
            economy: Economy::new(settings),
            stats,
            hearts: VecDeque::new(),
            hits: VecDeque::new(),
            pair_cooldowns: HashMap::new(),
            rng,
            events: Vec::new(),
        }
    }

    /// Creates (or replaces) the player for a connection and asks for a slot.
    ///
    /// A second join from the same connection discards the old player,
    /// including a fox's energy and any place it held in the lobby, and runs
    /// admission again from scratch. The new player spawns at a random point
    /// on either river bank.
    ///
    /// The name and species are expected to be validated already (see
    /// `protocol::Command`).
    ///
    /// # Returns
    /// `Admission::Admitted` if the species had room, otherwise the queue
    /// reason the player is waiting under. An `EnteredGame` event for the
    /// connection and a `StateChanged` event are queued either way.
    pub fn join(&mut self, client_id: u32, name: String, species: Species) -> Admission {
        if self.players.contains_key(&client_id) {
            self.lobby.retain(|id| *id != client_id);
        }

        let (x, y) = self.spawn_point();
        info!(
            "Player {} ({:?}) '{}' joined the lobby",
            client_id, species, name
        );
        self.players
            .insert(client_id, Player::new(client_id, name, species, x, y));

        let admission = self
            .request_entry(client_id)
            .unwrap_or(Admission::Queued(shared::QueueReason::Capacity));
        self.events.push(GameEvent::StateChanged);
        admission
    }

    /// Drops a player from both the table and the lobby.
    ///
    /// Called on disconnect and on timeout. Freeing a slot here does not let
    /// anyone in from the lobby; that only happens on cap growth or an
    /// operator update.
    ///
    /// Returns false if there was no player for this id.
    pub fn remove_player(&mut self, client_id: &u32) -> bool {
        self.lobby.retain(|id| id != client_id);
        if self.players.remove(client_id).is_some() {
            info!("Removed player {}", client_id);
            self.events.push(GameEvent::StateChanged);
            true
        } else {
            false
        }
    }

    pub fn player(&self, client_id: u32) -> Option<&Player> {
        self.players.get(&client_id)
    }

    pub fn player_mut(&mut self, client_id: u32) -> Option<&mut Player> {
        self.players.get_mut(&client_id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn settings(&self) -> Settings {
        self.economy.settings()
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn lobby_len(&self) -> usize {
        self.lobby.len()
    }

    pub fn is_waiting(&self, client_id: u32) -> bool {
        self.lobby.contains(&client_id)
    }

    /// Live heart markers, oldest first
    pub fn hearts(&self) -> Vec<EventMarker> {
        self.hearts.iter().copied().collect()
    }

    /// Live hit markers, oldest first
    pub fn hits(&self) -> Vec<EventMarker> {
        self.hits.iter().copied().collect()
    }

    /// Takes every pending outcome, in the order they happened.
    ///
    /// The outbox is left empty. Events are not deduplicated here, so one
    /// tick may yield several `StateChanged`; coalescing is up to the caller.
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn push_event(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    pub(crate) fn bump_stats(&mut self, update: impl FnOnce(&mut Stats)) {
        update(&mut self.stats);
        self.events.push(GameEvent::StatsChanged);
    }

    /// A random point on either bank of the river, away from the edges.
    pub(crate) fn spawn_point(&mut self) -> (f32, f32) {
        let x: f32 = self.rng.gen_range(SPAWN_MARGIN..WORLD_WIDTH - SPAWN_MARGIN);
        let side: f32 = if self.rng.gen_bool(0.5) { 0.25 } else { 0.75 };
        let y = WORLD_HEIGHT * side + self.rng.gen_range(-50.0f32..50.0);

        (
            x.clamp(SPAWN_MARGIN, WORLD_WIDTH - SPAWN_MARGIN),
            y.clamp(SPAWN_MARGIN, WORLD_HEIGHT - SPAWN_MARGIN),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> GameState {
        GameState::with_seed(Settings::default(), Stats::default(), 7)
    }

    #[test]
    fn test_player_creation() {
        let fox = Player::new(1, "red".to_string(), Species::Fox, 100.0, 200.0);
        assert_eq!(fox.energy_ms(), Some(FOX_ENERGY_MAX_MS));
        assert!(fox.alive);
        assert!(!fox.in_game);
        assert_eq!(fox.speed_mul, 1.0);

        let rabbit = Player::new(2, "bun".to_string(), Species::Rabbit, 0.0, 0.0);
        assert_eq!(rabbit.energy_ms(), None);
        assert!(rabbit.fox.is_none());
    }

    #[test]
    fn test_spawn_point_within_margin() {
        let mut state = state();
        for _ in 0..1000 {
            let (x, y) = state.spawn_point();
            assert!((SPAWN_MARGIN..=WORLD_WIDTH - SPAWN_MARGIN).contains(&x));
            assert!((SPAWN_MARGIN..=WORLD_HEIGHT - SPAWN_MARGIN).contains(&y));
        }
    }

    #[test]
    fn test_same_seed_same_spawns() {
        let mut a = state();
        let mut b = state();
        assert_eq!(a.spawn_point(), b.spawn_point());
        assert_eq!(a.spawn_point(), b.spawn_point());
    }

    #[test]
    fn test_join_and_remove() {
        let mut state = state();

        assert_eq!(state.join(1, "bun".to_string(), Species::Rabbit), Admission::Admitted);
        assert_eq!(state.player_count(), 1);
        assert!(state.player(1).unwrap().in_game);

        assert!(state.remove_player(&1));
        assert!(!state.remove_player(&1));
        assert_eq!(state.player_count(), 0);
    }

    #[test]
    fn test_remove_clears_lobby_entry() {
        let mut state = GameState::with_seed(
            Settings {
                max_foxes: 0,
                max_rabbits: 0,
            },
            Stats::default(),
            1,
        );

        state.join(4, "late".to_string(), Species::Fox);
        assert!(state.is_waiting(4));

        state.remove_player(&4);
        assert!(!state.is_waiting(4));
        assert_eq!(state.lobby_len(), 0);
    }

    #[test]
    fn test_rejoin_replaces_player() {
        let mut state = GameState::with_seed(
            Settings {
                max_foxes: 0,
                max_rabbits: 5,
            },
            Stats::default(),
            1,
        );

        state.join(1, "first".to_string(), Species::Fox);
        assert!(state.is_waiting(1));

        assert_eq!(state.join(1, "second".to_string(), Species::Rabbit), Admission::Admitted);
        let player = state.player(1).unwrap();
        assert_eq!(player.name, "second");
        assert_eq!(player.species, Species::Rabbit);
        assert!(!state.is_waiting(1));
        assert_eq!(state.player_count(), 1);
    }

    #[test]
    fn test_drain_events_empties_outbox() {
        let mut state = state();
        state.join(1, "bun".to_string(), Species::Rabbit);

        let events = state.drain_events();
        assert!(events.contains(&GameEvent::StateChanged));
        assert!(events.contains(&GameEvent::EnteredGame {
            id: 1,
            admission: Admission::Admitted
        }));
        assert!(state.drain_events().is_empty());
    }
}
