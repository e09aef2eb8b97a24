//! Input-driven movement.
//!
//! Each `Move` message is applied as soon as it arrives, independent of the
//! tick. Only the latest input matters; nothing is buffered.

use crate::game::GameState;
use shared::{MoveInput, Species, BASE_SPEED, FOX_SPEED_FACTOR, WORLD_HEIGHT, WORLD_WIDTH};

const DEFAULT_DT_MS: f32 = 16.0;
const MAX_DT_MS: f32 = 100.0;

///Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    ///Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f32,
    ///Value along the y-axis.
    /// Positive direction is down, matching screen coordinates.
    pub y: f32,
}

impl Vector2 {
    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the normalized vector, or zero for the zero vector.
    pub fn normalize(&self) -> Vector2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vector2::default()
        } else {
            Vector2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }
}

/// Unit direction for a set of arrow keys. Diagonals are not faster.
pub fn direction(input: &MoveInput) -> Vector2 {
    let mut dir = Vector2::default();
    if input.up {
        dir.y -= 1.0;
    }
    if input.down {
        dir.y += 1.0;
    }
    if input.left {
        dir.x -= 1.0;
    }
    if input.right {
        dir.x += 1.0;
    }
    dir.normalize()
}

/// Bounds a client-reported frame time to `0..=100` ms.
///
/// Missing, non-finite or zero values fall back to 16 ms.
pub fn resolve_dt_ms(hint: Option<f64>) -> f32 {
    let dt = match hint {
        Some(dt) if dt.is_finite() => (dt as f32).clamp(0.0, MAX_DT_MS),
        _ => return DEFAULT_DT_MS,
    };
    if dt == 0.0 {
        DEFAULT_DT_MS
    } else {
        dt
    }
}

pub fn base_speed(species: Species) -> f32 {
    match species {
        Species::Fox => BASE_SPEED * FOX_SPEED_FACTOR,
        Species::Rabbit => BASE_SPEED,
    }
}

impl GameState {
    /// Moves a player according to one input message.
    ///
    /// Returns false if the player is unknown or not currently in play.
    pub fn apply_move(&mut self, client_id: u32, input: MoveInput, dt_hint: Option<f64>) -> bool {
        let Some(player) = self.players.get_mut(&client_id) else {
            return false;
        };
        if !player.is_active() {
            return false;
        }

        let dt_secs = resolve_dt_ms(dt_hint) / 1000.0;
        let velocity = direction(&input).scale(base_speed(player.species) * player.speed_mul);

        player.x = (player.x + velocity.x * dt_secs).clamp(0.0, WORLD_WIDTH);
        player.y = (player.y + velocity.y * dt_secs).clamp(0.0, WORLD_HEIGHT);
        player.vx = velocity.x;
        player.vy = velocity.y;
        true
    }
}
