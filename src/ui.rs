//! HUD and popup output
//!
//! The DOM side implements [`Hud`]; the core only pushes numbers and messages.

use crate::consts::NOTIFICATION_DURATION_MS;
use crate::state::GameSummary;

/// Transient on-screen message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    /// Auto-dismiss after this many ms
    pub duration_ms: u32,
}

impl Notification {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            duration_ms: NOTIFICATION_DURATION_MS,
        }
    }

    pub fn with_duration(mut self, duration_ms: u32) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Everything the game shows besides the 3D scene
pub trait Hud {
    fn update_score(&mut self, score: u64, high_score: u64);
    fn update_clovers(&mut self, collected: u32, total: u32);
    fn update_combo(&mut self, count: u32, multiplier: u32);
    fn update_health(&mut self, health: u32, max_health: u32, extra_lives: u32);
    fn update_level(&mut self, level: u32);
    fn update_power_ups(&mut self, speed_boost: bool, invincible: bool);

    fn show_combo_popup(&mut self, multiplier: u32, points: u64);
    fn show_level_up(&mut self, level: u32);
    fn show_power_up(&mut self, message: &str);
    fn show_paused(&mut self, paused: bool);
    fn show_victory(&mut self, summary: &GameSummary);
    fn show_game_over(&mut self, summary: &GameSummary);
    /// Dismiss the victory and game over screens
    fn hide_end_screens(&mut self);

    fn notify(&mut self, notification: &Notification);
}
