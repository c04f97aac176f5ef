//! Difficulty tables and presets
//!
//! Each level has a base row (enemy speed, enemy cap, spawn interval). The
//! selected preset scales that row and the player's own stats.

use serde::{Deserialize, Serialize};

use crate::consts::{CLOVERS_PER_LEVEL, MAX_LEVEL};

/// Player-selectable difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    /// Multipliers applied on top of the base level table
    pub fn preset(&self) -> DifficultyPreset {
        match self {
            Difficulty::Easy => DifficultyPreset {
                player_speed: 1.2,
                enemy_speed: 0.7,
                enemy_count: 0.7,
                spawn_rate: 1.5,
                damage: 0.5,
            },
            Difficulty::Medium => DifficultyPreset::default(),
            Difficulty::Hard => DifficultyPreset {
                player_speed: 0.9,
                enemy_speed: 1.3,
                enemy_count: 1.5,
                spawn_rate: 0.7,
                damage: 1.5,
            },
        }
    }
}

/// Scaling factors for one difficulty
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyPreset {
    pub player_speed: f32,
    pub enemy_speed: f32,
    pub enemy_count: f32,
    /// Multiplies the spawn interval, so values above 1 spawn less often
    pub spawn_rate: f32,
    pub damage: f32,
}

impl Default for DifficultyPreset {
    fn default() -> Self {
        Self {
            player_speed: 1.0,
            enemy_speed: 1.0,
            enemy_count: 1.0,
            spawn_rate: 1.0,
            damage: 1.0,
        }
    }
}

/// Enemy behaviour for a single level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelSettings {
    /// World units per frame
    pub enemy_speed: f32,
    pub max_enemies: u32,
    /// Interval between timed spawns (ms); 0 disables timed spawning
    pub spawn_rate_ms: f64,
}

/// Base table, index 0 is level 1
pub const BASE_DIFFICULTY_SETTINGS: [LevelSettings; MAX_LEVEL as usize] = [
    LevelSettings {
        enemy_speed: 0.030,
        max_enemies: 1,
        spawn_rate_ms: 0.0,
    },
    LevelSettings {
        enemy_speed: 0.035,
        max_enemies: 2,
        spawn_rate_ms: 15000.0,
    },
    LevelSettings {
        enemy_speed: 0.040,
        max_enemies: 2,
        spawn_rate_ms: 14000.0,
    },
    LevelSettings {
        enemy_speed: 0.045,
        max_enemies: 3,
        spawn_rate_ms: 13000.0,
    },
    LevelSettings {
        enemy_speed: 0.050,
        max_enemies: 3,
        spawn_rate_ms: 12000.0,
    },
    LevelSettings {
        enemy_speed: 0.055,
        max_enemies: 4,
        spawn_rate_ms: 11000.0,
    },
    LevelSettings {
        enemy_speed: 0.060,
        max_enemies: 4,
        spawn_rate_ms: 10000.0,
    },
    LevelSettings {
        enemy_speed: 0.065,
        max_enemies: 5,
        spawn_rate_ms: 9000.0,
    },
    LevelSettings {
        enemy_speed: 0.070,
        max_enemies: 5,
        spawn_rate_ms: 8000.0,
    },
    LevelSettings {
        enemy_speed: 0.080,
        max_enemies: 6,
        spawn_rate_ms: 7000.0,
    },
];

/// Clamp a level into the playable range
#[inline]
pub fn clamp_level(level: u32) -> u32 {
    level.clamp(1, MAX_LEVEL)
}

/// Base table row for a level (out-of-range levels are clamped)
pub fn base_settings(level: u32) -> LevelSettings {
    BASE_DIFFICULTY_SETTINGS[(clamp_level(level) - 1) as usize]
}

/// Compose the base row for `level` with a preset
pub fn settings_for(level: u32, preset: &DifficultyPreset) -> LevelSettings {
    let base = base_settings(level);
    LevelSettings {
        enemy_speed: base.enemy_speed * preset.enemy_speed,
        max_enemies: (base.max_enemies as f32 * preset.enemy_count).ceil() as u32,
        // Level 1 has no timed spawns; keep the sentinel instead of scaling it
        spawn_rate_ms: if base.spawn_rate_ms > 0.0 {
            base.spawn_rate_ms * preset.spawn_rate as f64
        } else {
            0.0
        },
    }
}

/// Level implied by a clover count
#[inline]
pub fn level_for_clovers(clovers: u32) -> u32 {
    (clovers / CLOVERS_PER_LEVEL + 1).min(MAX_LEVEL)
}

/// Creatures that join the hunt as levels progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpawnKind {
    Enemy,
    Bee,
    Spider,
    Slug,
}

/// Staggered introductions for a freshly entered level: `(delay_ms, kind)`
pub fn introductions(level: u32) -> Vec<(f64, SpawnKind)> {
    let level = clamp_level(level);
    let mut out = Vec::new();
    let mut delay = 2000.0;
    if level >= 3 {
        out.push((delay, SpawnKind::Bee));
        delay += 2000.0;
    }
    if level >= 5 {
        out.push((delay, SpawnKind::Spider));
        delay += 2000.0;
    }
    if level >= 7 {
        out.push((delay, SpawnKind::Slug));
    }
    out
}
