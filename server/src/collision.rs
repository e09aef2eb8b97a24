//! Fixed-tick collision and event engine.
//!
//! One call to `GameState::tick` performs, in order:
//! 1. expiry of fox speed bonuses whose deadline has passed
//! 2. fox energy drain, evicting foxes that run dry
//! 3. pairwise proximity checks between active players
//!    - two rabbits: a heart (rate limited per pair), one more rabbit slot
//!    - fox and rabbit: the rabbit is eaten, the fox refuels and speeds up;
//!      a fox's second rabbit grants one more fox slot, once per fox
//! 4. pruning of expired heart/hit markers and pair cooldowns
//!
//! `now_ms` is supplied by the caller, so the engine never reads a clock.

use crate::game::{GameEvent, GameState};
use log::{debug, info};
use shared::{
    EventMarker, Species, COLLIDE_RADIUS, ENERGY_DRAIN_PER_TICK_MS, FOX_ENERGY_MAX_MS,
    FOX_SPEED_BONUS, HEART_WINDOW_MS, HIT_WINDOW_MS, PAIR_COOLDOWN_MS, SPEED_BONUS_MS,
};
use std::collections::VecDeque;

/// Order-independent key for a pair of players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey(u32, u32);

impl PairKey {
    pub fn new(a: u32, b: u32) -> Self {
        if a <= b {
            PairKey(a, b)
        } else {
            PairKey(b, a)
        }
    }
}

/// Position and species of an active player, copied out for pair tests.
#[derive(Clone, Copy)]
struct Body {
    id: u32,
    species: Species,
    x: f32,
    y: f32,
}

fn distance_sq(a: &Body, b: &Body) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Drops markers from the front once `t + window <= now`.
fn expire_markers(queue: &mut VecDeque<EventMarker>, now_ms: u64, window_ms: u64) {
    while queue
        .front()
        .is_some_and(|marker| marker.t.saturating_add(window_ms) <= now_ms)
    {
        queue.pop_front();
    }
}

impl GameState {
    /// Runs one simulation step at time `now_ms` (milliseconds since start).
    pub fn tick(&mut self, now_ms: u64) {
        self.tick += 1;

        self.expire_speed_bonuses(now_ms);
        self.drain_energy();
        self.resolve_pairs(now_ms);

        expire_markers(&mut self.hearts, now_ms, HEART_WINDOW_MS);
        expire_markers(&mut self.hits, now_ms, HIT_WINDOW_MS);
        self.pair_cooldowns
            .retain(|_, last| now_ms.saturating_sub(*last) <= PAIR_COOLDOWN_MS);
    }

    fn expire_speed_bonuses(&mut self, now_ms: u64) {
        for player in self.players.values_mut() {
            if player.speed_bonus_until.is_some_and(|until| until <= now_ms) {
                player.clear_speed_bonus();
            }
        }
    }

    fn drain_energy(&mut self) {
        let mut starved = Vec::new();

        for player in self.players.values_mut() {
            if !player.is_active() {
                continue;
            }
            let Some(fox) = player.fox.as_mut() else {
                continue;
            };

            fox.energy_ms = fox.energy_ms.saturating_sub(ENERGY_DRAIN_PER_TICK_MS);
            if fox.energy_ms == 0 {
                fox.rabbits_eaten = 0;
                player.alive = false;
                player.in_game = false;
                player.clear_speed_bonus();
                starved.push(player.id);
            }
        }

        for id in starved {
            info!("Fox {} ran out of energy", id);
            self.enqueue(id);
            self.push_event(GameEvent::OutOfEnergy { id });
            self.push_event(GameEvent::StateChanged);
        }
    }

    fn resolve_pairs(&mut self, now_ms: u64) {
        let ids: Vec<u32> = self
            .players
            .values()
            .filter(|p| p.is_active())
            .map(|p| p.id)
            .collect();
        let radius_sq = COLLIDE_RADIUS * COLLIDE_RADIUS;

        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                // An earlier pair this tick may have taken one of them out
                let (Some(a), Some(b)) = (self.current_body(ids[i]), self.current_body(ids[j]))
                else {
                    continue;
                };
                if distance_sq(&a, &b) > radius_sq {
                    continue;
                }

                match (a.species, b.species) {
                    (Species::Rabbit, Species::Rabbit) => self.rabbits_meet(&a, &b, now_ms),
                    (Species::Fox, Species::Rabbit) => self.fox_eats(a.id, b.id, now_ms),
                    (Species::Rabbit, Species::Fox) => self.fox_eats(b.id, a.id, now_ms),
                    (Species::Fox, Species::Fox) => {}
                }
            }
        }
    }

    fn current_body(&self, id: u32) -> Option<Body> {
        self.players
            .get(&id)
            .filter(|p| p.is_active())
            .map(|p| Body {
                id: p.id,
                species: p.species,
                x: p.x,
                y: p.y,
            })
    }

    fn rabbits_meet(&mut self, a: &Body, b: &Body, now_ms: u64) {
        let key = PairKey::new(a.id, b.id);
        if let Some(last) = self.pair_cooldowns.get(&key) {
            if now_ms.saturating_sub(*last) <= PAIR_COOLDOWN_MS {
                return;
            }
        }
        self.pair_cooldowns.insert(key, now_ms);

        debug!("Rabbits {} and {} met", a.id, b.id);
        self.hearts.push_back(EventMarker {
            x: (a.x + b.x) / 2.0,
            y: (a.y + b.y) / 2.0,
            t: now_ms,
        });
        self.bump_stats(|stats| stats.hearts += 1);
        self.grow_rabbit_cap();
    }

    fn fox_eats(&mut self, fox_id: u32, rabbit_id: u32, now_ms: u64) {
        let Some(rabbit) = self.players.get_mut(&rabbit_id) else {
            return;
        };
        rabbit.alive = false;
        rabbit.in_game = false;
        let (x, y) = (rabbit.x, rabbit.y);

        self.enqueue(rabbit_id);
        self.push_event(GameEvent::Eaten { id: rabbit_id });
        self.push_event(GameEvent::StateChanged);

        let mut reproduced = false;
        if let Some(fox) = self.players.get_mut(&fox_id) {
            fox.speed_mul = FOX_SPEED_BONUS;
            fox.speed_bonus_until = Some(now_ms + SPEED_BONUS_MS);
            if let Some(state) = fox.fox.as_mut() {
                state.energy_ms = FOX_ENERGY_MAX_MS;
                state.rabbits_eaten += 1;
                if state.rabbits_eaten >= 2 && !state.has_reproduced {
                    state.has_reproduced = true;
                    reproduced = true;
                }
            }
        }
        info!("Fox {} ate rabbit {}", fox_id, rabbit_id);

        self.hits.push_back(EventMarker { x, y, t: now_ms });
        self.bump_stats(|stats| stats.rabbits_eaten += 1);

        if reproduced {
            info!("Fox {} reproduced", fox_id);
            self.bump_stats(|stats| stats.fox_births += 1);
            self.grow_fox_cap();
        }
    }
}
