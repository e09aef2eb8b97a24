//! Population caps and how they grow.
//!
//! Caps rise from gameplay (rabbit hearts, fox reproduction) and can be set
//! by an operator. Every change is persisted, broadcast, and followed by a
//! lobby drain so a waiting player can take the new slot.

use crate::game::{GameEvent, GameState};
use log::info;
use shared::{Settings, Species, MAX_FOXES_LIMIT, MAX_RABBITS_CEILING, MAX_RABBITS_LIMIT};

#[derive(Debug, Clone)]
pub struct Economy {
    settings: Settings,
}

impl Economy {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn cap(&self, species: Species) -> u32 {
        match species {
            Species::Fox => self.settings.max_foxes,
            Species::Rabbit => self.settings.max_rabbits,
        }
    }

    /// One more rabbit slot, never beyond `MAX_RABBITS_CEILING`.
    ///
    /// Returns whether the cap actually moved.
    pub fn grow_rabbits(&mut self) -> bool {
        let before = self.settings.max_rabbits;
        self.settings.max_rabbits = before.saturating_add(1).min(MAX_RABBITS_CEILING);
        self.settings.max_rabbits != before
    }

    /// One more fox slot. Unlike rabbits there is no ceiling here.
    pub fn grow_foxes(&mut self) {
        self.settings.max_foxes = self.settings.max_foxes.saturating_add(1);
    }

    /// Applies operator-supplied caps, clamped into their valid ranges.
    ///
    /// Missing or non-finite values leave that cap alone. Returns true if at
    /// least one value was applied.
    pub fn apply_operator(&mut self, max_foxes: Option<f64>, max_rabbits: Option<f64>) -> bool {
        let foxes = clamp_cap(max_foxes, MAX_FOXES_LIMIT);
        let rabbits = clamp_cap(max_rabbits, MAX_RABBITS_LIMIT);

        if let Some(foxes) = foxes {
            self.settings.max_foxes = foxes;
        }
        if let Some(rabbits) = rabbits {
            self.settings.max_rabbits = rabbits;
        }
        foxes.is_some() || rabbits.is_some()
    }
}

fn clamp_cap(value: Option<f64>, limit: u32) -> Option<u32> {
    value
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, limit as f64).trunc() as u32)
}

impl GameState {
    /// Operator path for changing caps. Callers check authorization first.
    pub fn update_settings(&mut self, max_foxes: Option<f64>, max_rabbits: Option<f64>) {
        if !self.economy.apply_operator(max_foxes, max_rabbits) {
            return;
        }

        let settings = self.economy.settings();
        info!(
            "Caps set by operator: {} foxes, {} rabbits",
            settings.max_foxes, settings.max_rabbits
        );
        self.push_event(GameEvent::SettingsChanged);
        self.drain_lobby();
    }

    /// Two rabbits met: one more rabbit slot.
    pub(crate) fn grow_rabbit_cap(&mut self) {
        if self.economy.grow_rabbits() {
            self.push_event(GameEvent::SettingsChanged);
        }
        self.drain_lobby();
    }

    /// A fox reproduced: one more fox slot.
    pub(crate) fn grow_fox_cap(&mut self) {
        self.economy.grow_foxes();
        info!("Fox cap grew to {}", self.economy.settings().max_foxes);
        self.push_event(GameEvent::SettingsChanged);
        self.drain_lobby();
    }
}
