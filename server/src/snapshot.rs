//! Read-only projection of the simulation for broadcasting.
//!
//! Building a snapshot has no side effects and depends only on `GameState`,
//! so two calls against the same state produce identical bytes.

use crate::game::{GameState, Player};
use shared::{PlayerView, Snapshot, Species, SpeciesCounts, WORLD};

impl From<&Player> for PlayerView {
    fn from(p: &Player) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            species: p.species,
            x: p.x,
            y: p.y,
            vx: p.vx,
            vy: p.vy,
            alive: p.alive,
            in_game: p.in_game,
            speed_mul: p.speed_mul,
            energy_ms: p.energy_ms(),
        }
    }
}

impl GameState {
    pub fn counts(&self) -> SpeciesCounts {
        SpeciesCounts {
            foxes: self.active_count(Species::Fox),
            rabbits: self.active_count(Species::Rabbit),
        }
    }

    /// Players in id order with caps, counts, lobby size and stats.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            players: self.players.values().map(PlayerView::from).collect(),
            settings: self.settings(),
            world: WORLD,
            counts: self.counts(),
            queue: self.lobby.len() as u32,
            stats: self.stats,
        }
    }
}
