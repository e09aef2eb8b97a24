//! Capacity-gated lobby admission.
//!
//! A player may occupy an active slot only while the number of alive,
//! in-game players of its species is strictly below that species' cap.
//! Everyone else waits in the lobby in arrival order. `drain_lobby`
//! promotes at most one waiter per call, so a single cap increase never
//! floods the field in one step.
//!
//! Caps are only checked at admission time. Lowering a cap does not evict
//! players that are already in the game.

use crate::game::{GameEvent, GameState};
use log::{debug, info};
use shared::{QueueReason, Species, FOX_ENERGY_MAX_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Queued(QueueReason),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }

    pub fn reason(&self) -> Option<QueueReason> {
        match self {
            Admission::Admitted => None,
            Admission::Queued(reason) => Some(*reason),
        }
    }
}

impl GameState {
    /// Number of alive, in-game players of a species
    pub fn active_count(&self, species: Species) -> u32 {
        self.players
            .values()
            .filter(|p| p.species == species && p.is_active())
            .count() as u32
    }

    pub fn has_capacity(&self, species: Species) -> bool {
        self.active_count(species) < self.economy.cap(species)
    }

    /// Admits the player if its species has room, otherwise parks it in the lobby.
    ///
    /// Returns None for an unknown id.
    pub fn request_entry(&mut self, client_id: u32) -> Option<Admission> {
        let species = self.players.get(&client_id)?.species;

        let admission = if self.has_capacity(species) {
            self.admit(client_id);
            Admission::Admitted
        } else {
            self.enqueue(client_id);
            debug!("Player {} queued, {:?} cap reached", client_id, species);
            Admission::Queued(QueueReason::Capacity)
        };

        if !admission.is_admitted() {
            self.push_event(GameEvent::EnteredGame {
                id: client_id,
                admission,
            });
        }
        Some(admission)
    }

    /// Admits the first waiter whose species has room. At most one per call.
    pub fn drain_lobby(&mut self) -> Option<u32> {
        let candidate = self.lobby.iter().copied().find(|id| {
            self.players
                .get(id)
                .map(|p| self.has_capacity(p.species))
                .unwrap_or(false)
        })?;

        self.admit(candidate);
        Some(candidate)
    }

    pub(crate) fn enqueue(&mut self, client_id: u32) {
        if !self.lobby.contains(&client_id) {
            self.lobby.push_back(client_id);
        }
    }

    fn admit(&mut self, client_id: u32) {
        let (x, y) = self.spawn_point();
        let Some(player) = self.players.get_mut(&client_id) else {
            return;
        };

        player.in_game = true;
        player.alive = true;
        player.x = x;
        player.y = y;
        player.vx = 0.0;
        player.vy = 0.0;
        player.clear_speed_bonus();
        if let Some(fox) = player.fox.as_mut() {
            fox.energy_ms = FOX_ENERGY_MAX_MS;
        }
        info!(
            "Player {} ({:?}) entered the game at ({:.0}, {:.0})",
            client_id, player.species, x, y
        );

        self.lobby.retain(|id| *id != client_id);
        self.push_event(GameEvent::EnteredGame {
            id: client_id,
            admission: Admission::Admitted,
        });
        self.push_event(GameEvent::StateChanged);
    }
}
