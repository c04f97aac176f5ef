//! Authoritative progression state
//!
//! One instance per play session, mutated in place and reset on a new game.
//! Every setter clamps instead of failing; the only I/O is the high score.

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::difficulty::{self, Difficulty, DifficultyPreset, LevelSettings};
use crate::highscores::HighScore;
use crate::platform::Storage;

/// Current phase of gameplay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GamePhase {
    #[default]
    Playing,
    Paused,
    /// Terminal, for both defeat and victory (see `game_won`)
    GameOver,
}

/// Power-ups that ran out during `update_power_ups`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiredPowerUps {
    pub speed_boost: bool,
    pub invincibility: bool,
}

impl ExpiredPowerUps {
    pub fn any(&self) -> bool {
        self.speed_boost || self.invincibility
    }
}

/// End-of-run numbers for the victory/game over screens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub score: u64,
    pub high_score: u64,
    pub is_new_high_score: bool,
    pub clovers_collected: u32,
    pub level: u32,
    pub won: bool,
    pub difficulty: Difficulty,
    pub elapsed_ms: f64,
}

/// Score, combo, health, level, power-ups and phase for one session
pub struct GameStateManager {
    score: u64,
    high_score: HighScore,
    is_new_high_score: bool,
    clovers_collected: u32,

    game_state: GamePhase,
    game_won: bool,
    current_level: u32,

    player_health: u32,
    max_health: u32,
    extra_lives: u32,

    speed_boost_active: bool,
    speed_boost_end_time: f64,
    invincibility_active: bool,
    invincibility_end_time: f64,

    combo_count: u32,
    combo_multiplier: u32,
    /// 0 means nothing collected yet
    last_collect_time: f64,

    selected_difficulty: Difficulty,

    game_start_time: Option<f64>,
    paused_time_accumulated: f64,
    pause_started: Option<f64>,
    end_time: Option<f64>,

    storage: Box<dyn Storage>,
}

impl GameStateManager {
    /// Create a fresh session, loading the best score from `storage`
    pub fn new(storage: Box<dyn Storage>) -> Self {
        let high_score = HighScore::load(storage.as_ref());
        Self {
            score: 0,
            high_score,
            is_new_high_score: false,
            clovers_collected: 0,
            game_state: GamePhase::Playing,
            game_won: false,
            current_level: 1,
            player_health: DEFAULT_MAX_HEALTH,
            max_health: DEFAULT_MAX_HEALTH,
            extra_lives: 0,
            speed_boost_active: false,
            speed_boost_end_time: 0.0,
            invincibility_active: false,
            invincibility_end_time: 0.0,
            combo_count: 0,
            combo_multiplier: 1,
            last_collect_time: 0.0,
            selected_difficulty: Difficulty::default(),
            game_start_time: None,
            paused_time_accumulated: 0.0,
            pause_started: None,
            end_time: None,
            storage,
        }
    }

    /// Back to defaults for a new game. Keeps the high score and difficulty.
    pub fn reset(&mut self) {
        self.score = 0;
        self.is_new_high_score = false;
        self.clovers_collected = 0;
        self.game_state = GamePhase::Playing;
        self.game_won = false;
        self.current_level = 1;
        self.max_health = DEFAULT_MAX_HEALTH;
        self.player_health = DEFAULT_MAX_HEALTH;
        self.extra_lives = 0;
        self.speed_boost_active = false;
        self.speed_boost_end_time = 0.0;
        self.invincibility_active = false;
        self.invincibility_end_time = 0.0;
        self.combo_count = 0;
        self.combo_multiplier = 1;
        self.last_collect_time = 0.0;
        self.game_start_time = None;
        self.paused_time_accumulated = 0.0;
        self.pause_started = None;
        self.end_time = None;
        log::debug!("Game state reset");
    }

    /// Backing store for persisted values
    pub fn storage_mut(&mut self) -> &mut dyn Storage {
        self.storage.as_mut()
    }

    // === Score ===

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn add_score(&mut self, points: u64) {
        self.score = self.score.saturating_add(points);
    }

    pub fn high_score(&self) -> u64 {
        self.high_score.best()
    }

    pub fn is_new_high_score(&self) -> bool {
        self.is_new_high_score
    }

    /// Promote the current score to best score if it beats it, persisting on success
    pub fn check_and_update_high_score(&mut self) -> bool {
        if !self.high_score.record(self.score) {
            return false;
        }
        self.is_new_high_score = true;
        self.high_score.save(self.storage.as_mut());
        true
    }

    // === Clovers and level ===

    pub fn clovers_collected(&self) -> u32 {
        self.clovers_collected
    }

    /// Count one clover. Level-up and victory are the caller's call.
    pub fn add_clover_collected(&mut self) {
        self.clovers_collected = (self.clovers_collected + 1).min(TOTAL_CLOVERS);
    }

    pub fn current_level(&self) -> u32 {
        self.current_level
    }

    pub fn set_current_level(&mut self, level: u32) {
        self.current_level = difficulty::clamp_level(level);
    }

    /// Advance one level; false if already at the top
    pub fn increment_level(&mut self) -> bool {
        if self.current_level >= MAX_LEVEL {
            return false;
        }
        self.current_level += 1;
        true
    }

    // === Phase ===

    pub fn game_state(&self) -> GamePhase {
        self.game_state
    }

    pub fn set_game_state(&mut self, phase: GamePhase) {
        self.game_state = phase;
    }

    pub fn is_playing(&self) -> bool {
        self.game_state == GamePhase::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.game_state == GamePhase::Paused
    }

    pub fn is_game_over(&self) -> bool {
        self.game_state == GamePhase::GameOver
    }

    pub fn game_won(&self) -> bool {
        self.game_won
    }

    /// Once won, a session stays won until `reset`
    pub fn set_game_won(&mut self, won: bool) {
        self.game_won |= won;
    }

    // === Health ===

    pub fn player_health(&self) -> u32 {
        self.player_health
    }

    pub fn max_health(&self) -> u32 {
        self.max_health
    }

    pub fn set_player_health(&mut self, health: i64) {
        self.player_health = health.clamp(0, self.max_health as i64) as u32;
    }

    /// Subtract health (floored at 0); returns the new health
    pub fn damage_player(&mut self, amount: u32) -> u32 {
        self.player_health = self.player_health.saturating_sub(amount);
        self.player_health
    }

    /// Add health (capped at max); returns the new health
    pub fn heal_player(&mut self, amount: u32) -> u32 {
        self.player_health = self.player_health.saturating_add(amount).min(self.max_health);
        self.player_health
    }

    pub fn extra_lives(&self) -> u32 {
        self.extra_lives
    }

    pub fn add_extra_life(&mut self) {
        self.extra_lives = self.extra_lives.saturating_add(1);
    }

    /// Spend an extra life if one is left
    pub fn consume_extra_life(&mut self) -> bool {
        if self.extra_lives == 0 {
            return false;
        }
        self.extra_lives -= 1;
        true
    }

    /// Base damage scaled by the difficulty (never below 1)
    pub fn damage_for(&self, base: u32) -> u32 {
        ((base as f32 * self.preset().damage).round() as u32).max(1)
    }

    // === Power-ups ===

    pub fn speed_boost_active(&self) -> bool {
        self.speed_boost_active
    }

    pub fn speed_boost_end_time(&self) -> f64 {
        self.speed_boost_end_time
    }

    pub fn activate_speed_boost(&mut self, now: f64) {
        self.speed_boost_active = true;
        self.speed_boost_end_time = now + SPEED_BOOST_DURATION_MS;
    }

    pub fn invincibility_active(&self) -> bool {
        self.invincibility_active
    }

    pub fn invincibility_end_time(&self) -> f64 {
        self.invincibility_end_time
    }

    pub fn activate_invincibility(&mut self, now: f64) {
        self.invincibility_active = true;
        self.invincibility_end_time = now + INVINCIBILITY_DURATION_MS;
    }

    /// Turn off power-ups whose time is up
    pub fn update_power_ups(&mut self, now: f64) -> ExpiredPowerUps {
        let mut expired = ExpiredPowerUps::default();
        if self.speed_boost_active && now >= self.speed_boost_end_time {
            self.speed_boost_active = false;
            expired.speed_boost = true;
        }
        if self.invincibility_active && now >= self.invincibility_end_time {
            self.invincibility_active = false;
            expired.invincibility = true;
        }
        expired
    }

    // === Combo ===

    pub fn combo_count(&self) -> u32 {
        self.combo_count
    }

    pub fn combo_multiplier(&self) -> u32 {
        self.combo_multiplier
    }

    pub fn last_collect_time(&self) -> f64 {
        self.last_collect_time
    }

    pub fn set_last_collect_time(&mut self, now: f64) {
        self.last_collect_time = now;
    }

    pub fn set_combo_count(&mut self, count: u32) {
        self.combo_count = count;
    }

    pub fn increment_combo_count(&mut self) {
        self.combo_count = self.combo_count.saturating_add(1);
    }

    /// One extra multiplier step per `COMBO_STEP` chained clovers, capped
    pub fn update_combo_multiplier(&mut self) {
        self.combo_multiplier = (1 + self.combo_count / COMBO_STEP).min(MAX_COMBO_MULTIPLIER);
    }

    /// Break the combo if the last collection is older than the window
    pub fn check_combo_expiration(&mut self, now: f64) -> bool {
        if self.last_collect_time == 0.0 || now - self.last_collect_time <= COMBO_WINDOW_MS {
            return false;
        }
        self.combo_count = 0;
        self.combo_multiplier = 1;
        true
    }

    // === Difficulty ===

    pub fn selected_difficulty(&self) -> Difficulty {
        self.selected_difficulty
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.selected_difficulty = difficulty;
    }

    /// Select a preset by name; unknown names leave the selection alone
    pub fn set_selected_difficulty(&mut self, name: &str) -> bool {
        match Difficulty::from_str(name) {
            Some(d) => {
                self.selected_difficulty = d;
                true
            }
            None => {
                log::warn!("Unknown difficulty {:?}", name);
                false
            }
        }
    }

    pub fn preset(&self) -> DifficultyPreset {
        self.selected_difficulty.preset()
    }

    /// Base table row for `level` scaled by the active preset
    pub fn difficulty_settings(&self, level: u32) -> LevelSettings {
        difficulty::settings_for(level, &self.preset())
    }

    pub fn current_settings(&self) -> LevelSettings {
        self.difficulty_settings(self.current_level)
    }

    // === Session time ===

    pub fn start_session(&mut self, now: f64) {
        self.game_start_time = Some(now);
        self.paused_time_accumulated = 0.0;
        self.pause_started = None;
        self.end_time = None;
    }

    pub fn session_started(&self) -> bool {
        self.game_start_time.is_some()
    }

    /// Pause and remember when, so the pause is left out of the elapsed time
    pub fn pause(&mut self, now: f64) {
        if self.game_state != GamePhase::Playing {
            return;
        }
        self.game_state = GamePhase::Paused;
        self.pause_started = Some(now);
    }

    pub fn resume(&mut self, now: f64) {
        if self.game_state != GamePhase::Paused {
            return;
        }
        self.game_state = GamePhase::Playing;
        if let Some(started) = self.pause_started.take() {
            self.paused_time_accumulated += (now - started).max(0.0);
        }
    }

    /// Freeze the clock at the end of a run
    pub fn finish(&mut self, now: f64) {
        if self.end_time.is_none() {
            self.end_time = Some(now);
        }
    }

    /// Active play time in ms
    pub fn elapsed_ms(&self, now: f64) -> f64 {
        let Some(start) = self.game_start_time else {
            return 0.0;
        };
        let end = self.end_time.unwrap_or(now);
        let current_pause = self.pause_started.map(|p| (end - p).max(0.0)).unwrap_or(0.0);
        (end - start - self.paused_time_accumulated - current_pause).max(0.0)
    }

    pub fn summary(&self, now: f64) -> GameSummary {
        GameSummary {
            score: self.score,
            high_score: self.high_score.best(),
            is_new_high_score: self.is_new_high_score,
            clovers_collected: self.clovers_collected,
            level: self.current_level,
            won: self.game_won,
            difficulty: self.selected_difficulty,
            elapsed_ms: self.elapsed_ms(now),
        }
    }
}
