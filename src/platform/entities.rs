//! Scene-side collaborators
//!
//! Meshes, AI steering and visual effects live in the presentation layer. The
//! core only sees positions, flags and the narrow operations below.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::difficulty::{LevelSettings, SpawnKind};
use crate::platform::input::MovementInput;

/// A clover in the meadow
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clover {
    pub id: u32,
    pub position: Vec3,
    /// Flipped exactly once, by the collision check that collects it
    pub collected: bool,
    pub four_leaf: bool,
}

impl Clover {
    pub fn new(id: u32, position: Vec3, four_leaf: bool) -> Self {
        Self {
            id,
            position,
            collected: false,
            four_leaf,
        }
    }
}

/// Mushroom power-up flavours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MushroomVariant {
    Health,
    Speed,
    Invincibility,
}

/// Collectible type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectibleKind {
    Mushroom(MushroomVariant),
    Coin,
    BuddyBug,
}

/// A pickup that is not a clover
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collectible {
    pub id: u32,
    pub kind: CollectibleKind,
    pub position: Vec3,
}

/// Anything that hurts on contact (enemy bug, bee, spider, slug)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Critter {
    pub id: u32,
    pub position: Vec3,
}

/// The player's bug
pub trait Player {
    fn position(&self) -> Vec3;
    /// Apply movement for this frame; returns true if the bug moved
    fn update_movement(&mut self, input: &MovementInput, speed_boost_active: bool, dt: f32) -> bool;
    fn animate_legs(&mut self, dt: f32);
    /// Decay the hit flash
    fn update_flash(&mut self, now: f64);
    /// Visual reaction to a hit (flash, knock back)
    fn take_damage(&mut self, amount: u32, now: f64);
    /// Difficulty preset scaling of the bug's base speed
    fn set_speed_multiplier(&mut self, _multiplier: f32) {}
    fn reset(&mut self) {}
}

/// Owner of the clover meshes
pub trait CloverField {
    fn clovers(&self) -> &[Clover];
    fn clovers_mut(&mut self) -> &mut [Clover];
    /// Hide a collected clover; removal from the scene is up to the field
    fn hide(&mut self, id: u32);
    fn reset(&mut self) {}
}

/// Owner of mushrooms, coins and buddy bugs
pub trait CollectiblesManager {
    /// Remove and return the first collectible within `radius` of `pos`
    fn check_collection(&mut self, pos: Vec3, radius: f32) -> Option<Collectible>;
    fn update(&mut self, dt: f32, now: f64);
    fn reset(&mut self) {}
}

/// Read-only view of the creatures that hurt the bug
pub trait EnemyManager {
    fn enemies(&self) -> &[Critter];
    fn bees(&self) -> &[Critter];
    fn check_spider_collisions(&self, pos: Vec3, radius: f32) -> bool;
    fn check_slug_collisions(&self, pos: Vec3, radius: f32) -> bool;
}

/// Spawning and AI for the creatures of the current level
pub trait LevelManager: EnemyManager {
    fn update(&mut self, dt: f32, player_pos: Vec3, settings: &LevelSettings);
    fn spawn(&mut self, kind: SpawnKind);
    /// Extra enemy granted on level-up
    fn spawn_additional_enemy(&mut self);
    fn enemy_count(&self) -> u32;
    /// Halt continuous spawning (victory/game over)
    fn stop_spawning(&mut self);
    fn reset(&mut self) {}
}

/// Purely visual systems driven once per frame
pub trait Effects {
    fn update_day_night(&mut self, _dt: f32) {}
    fn update_particles(&mut self, _dt: f32) {}
    fn update_ripples(&mut self, _dt: f32) {}
    fn spawn_ripple(&mut self, _pos: Vec3) {}
    fn clover_burst(&mut self, _pos: Vec3, _four_leaf: bool) {}
    fn follow_camera(&mut self, _target: Vec3, _dt: f32) {}
}

/// Draws the scene
pub trait FrameRenderer {
    fn render(&mut self);
}
