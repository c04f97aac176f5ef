//! Bugdom - a 3D clover-collecting bug arcade game
//!
//! Core modules:
//! - `state`: Authoritative progression state (score, combo, health, level, power-ups)
//! - `difficulty`: Per-level enemy tables and easy/medium/hard presets
//! - `collision`: Radius-based proximity queries between the bug and the world
//! - `game_loop`: Per-frame orchestration of input, collisions, rules and presentation
//! - `tasks`: Cancelable registry for delayed spawns
//! - `platform`: Collaborator interfaces (input, player, entity managers, storage, time)
//! - `meadow`: In-memory world collaborators for the web build, the native demo and tests

pub mod audio;
pub mod collision;
pub mod difficulty;
pub mod errors;
pub mod game_loop;
pub mod highscores;
pub mod meadow;
pub mod platform;
pub mod settings;
pub mod state;
pub mod tasks;
pub mod ui;

pub use difficulty::{Difficulty, DifficultyPreset, LevelSettings};
pub use game_loop::{GameLoop, Subsystems};
pub use highscores::HighScore;
pub use settings::Settings;
pub use state::{GamePhase, GameStateManager};

/// Game configuration constants
pub mod consts {
    /// Clovers in a full run; collecting all of them wins the game
    pub const TOTAL_CLOVERS: u32 = 30;
    pub const CLOVERS_PER_LEVEL: u32 = 3;
    pub const MAX_LEVEL: u32 = 10;

    /// Combo scoring
    pub const MAX_COMBO_MULTIPLIER: u32 = 5;
    /// Collections further apart than this (ms) break the combo
    pub const COMBO_WINDOW_MS: f64 = 3000.0;
    /// Every this many chained clovers bumps the multiplier by one
    pub const COMBO_STEP: u32 = 3;

    /// Player defaults
    pub const DEFAULT_MAX_HEALTH: u32 = 100;
    pub const HEALTH_MUSHROOM_HEAL: u32 = 25;

    /// Power-up durations (ms)
    pub const SPEED_BOOST_DURATION_MS: f64 = 8000.0;
    pub const INVINCIBILITY_DURATION_MS: f64 = 10000.0;

    /// Proximity radii (world units)
    pub const COLLECTION_RADIUS: f32 = 2.5;
    pub const ENEMY_COLLISION_RADIUS: f32 = 1.5;
    pub const BEE_COLLISION_RADIUS: f32 = 1.2;
    /// Spiders and slugs; handed to the enemy manager's own proximity checks
    pub const CRITTER_COLLISION_RADIUS: f32 = 2.0;

    /// Scoring
    pub const CLOVER_POINTS: u64 = 5;
    pub const FOUR_LEAF_POINTS: u64 = 15;
    pub const COIN_VALUE: u64 = 50;
    pub const BUDDY_BUG_BONUS: u64 = 100;

    /// Base damage per hit, before the difficulty multiplier
    pub const ENEMY_DAMAGE: u32 = 20;
    pub const BEE_DAMAGE: u32 = 10;
    pub const SPIDER_DAMAGE: u32 = 15;
    pub const SLUG_DAMAGE: u32 = 10;
    /// Hits inside this window after a damaging hit are ignored (matches the hit flash)
    pub const HIT_COOLDOWN_MS: f64 = 1000.0;

    /// Chance per moving frame that the bug leaves a ripple behind
    pub const RIPPLE_CHANCE: f64 = 0.1;

    /// Largest frame delta fed to the simulation (s), prevents huge jumps after a stall
    pub const MAX_FRAME_DT: f32 = 0.1;

    /// Default on-screen lifetime of a notification (ms)
    pub const NOTIFICATION_DURATION_MS: u32 = 5000;
    /// Error ring buffer capacity
    pub const ERROR_LOG_CAPACITY: usize = 100;
}
