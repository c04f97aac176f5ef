//! Per-frame orchestration
//!
//! Each frame while playing: read input, move the bug, run the collision
//! queries, turn hits into state changes plus audio/HUD output, advance the
//! delegated world systems, expire the combo, render and reschedule.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::audio::{AudioSink, SoundEffect};
use crate::collision::{self, CollisionEvent, CritterKind};
use crate::consts::*;
use crate::difficulty::{self, SpawnKind};
use crate::errors::{self, ErrorSource, SharedErrorLog};
use crate::platform::*;
use crate::settings::Settings;
use crate::state::{ExpiredPowerUps, GamePhase, GameStateManager};
use crate::tasks::TaskRegistry;
use crate::ui::{Hud, Notification};

/// Everything outside the core the loop talks to
pub struct Subsystems {
    pub input: Box<dyn InputSource>,
    pub player: Box<dyn Player>,
    pub clovers: Box<dyn CloverField>,
    pub collectibles: Box<dyn CollectiblesManager>,
    pub level: Box<dyn LevelManager>,
    pub effects: Box<dyn Effects>,
    pub renderer: Box<dyn FrameRenderer>,
    pub scheduler: Box<dyn FrameScheduler>,
    pub audio: Box<dyn AudioSink>,
    pub hud: Box<dyn Hud>,
}

/// Delayed work for the current level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpawnTask {
    /// Staggered first appearance of a creature type
    Introduce(SpawnKind),
    /// Recurring enemy spawn at the level's spawn rate
    Timed,
}

/// Frame-driven game orchestrator
pub struct GameLoop {
    state: GameStateManager,
    sys: Subsystems,
    settings: Settings,
    tasks: TaskRegistry<SpawnTask>,
    errors: SharedErrorLog,
    /// Error log entries already shown to the player
    errors_seen: u64,
    clock: FrameClock,
    running: bool,
    frame: Option<FrameHandle>,
    /// Ripple rolls
    rng: Pcg32,
    last_hit_time: Option<f64>,
    /// Reused collision event buffer
    events: Vec<CollisionEvent>,
}

impl GameLoop {
    pub fn new(
        mut state: GameStateManager,
        mut sys: Subsystems,
        settings: Settings,
        errors: SharedErrorLog,
        seed: u64,
    ) -> Self {
        let settings = settings.sanitized();
        state.set_difficulty(settings.difficulty);
        sys.player
            .set_speed_multiplier(settings.difficulty.preset().player_speed);
        sys.audio.set_volume(settings.effective_volume());

        Self {
            state,
            sys,
            settings,
            tasks: TaskRegistry::new(),
            errors,
            errors_seen: 0,
            clock: FrameClock::new(),
            running: false,
            frame: None,
            rng: Pcg32::seed_from_u64(seed),
            last_hit_time: None,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> &GameStateManager {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut GameStateManager {
        &mut self.state
    }

    pub fn subsystems(&self) -> &Subsystems {
        &self.sys
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn errors(&self) -> &SharedErrorLog {
        &self.errors
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.pending()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    // === Lifecycle ===

    /// Begin requesting frames. Does nothing if already running.
    pub fn start(&mut self, now: f64) {
        if self.running {
            log::debug!("start() ignored, loop already running");
            return;
        }
        if !self.state.session_started() {
            self.state.start_session(now);
            self.schedule_level_tasks(now);
            self.refresh_hud();
            log::info!(
                "New session on {} difficulty",
                self.state.selected_difficulty().as_str()
            );
        }
        self.running = true;
        self.clock.reset();
        self.frame = Some(self.sys.scheduler.request_frame());
    }

    /// Cancel the next frame. Safe to call when already stopped.
    pub fn stop(&mut self) {
        self.running = false;
        if let Some(handle) = self.frame.take() {
            self.sys.scheduler.cancel_frame(handle);
        }
    }

    /// Host callback for a scheduled frame (`now` in ms, monotonic)
    pub fn frame(&mut self, now: f64) {
        if !self.running {
            return;
        }
        self.frame = None;
        let dt = self.clock.tick(now);

        if self.state.is_playing() {
            let error_log = Arc::clone(&self.errors);
            if errors::guard(&error_log, "tick", || self.tick(now, dt)).is_none() {
                log::warn!("Frame at {:.0} ms abandoned", now);
            }
        }
        self.surface_errors();

        self.sys.renderer.render();

        // Victory or game over may have stopped the loop mid-tick
        if self.running {
            self.frame = Some(self.sys.scheduler.request_frame());
        }
    }

    /// Pause or resume; returns true if now paused
    pub fn toggle_pause(&mut self, now: f64) -> bool {
        match self.state.game_state() {
            GamePhase::Playing => {
                self.state.pause(now);
                self.sys.hud.show_paused(true);
                log::info!("Paused");
                true
            }
            GamePhase::Paused => {
                self.state.resume(now);
                self.clock.reset();
                self.sys.hud.show_paused(false);
                log::info!("Resumed");
                false
            }
            GamePhase::GameOver => false,
        }
    }

    /// Throw away the current run and start a new one
    pub fn restart(&mut self, now: f64) {
        self.stop();
        self.state.reset();
        self.tasks.cancel_all();
        self.last_hit_time = None;
        self.sys.player.reset();
        self.sys.clovers.reset();
        self.sys.collectibles.reset();
        self.sys.level.reset();
        self.sys.hud.hide_end_screens();
        self.sys.hud.show_paused(false);
        self.start(now);
    }

    /// Switch difficulty by name and persist it; unknown names are ignored
    pub fn set_difficulty(&mut self, name: &str) -> bool {
        if !self.state.set_selected_difficulty(name) {
            return false;
        }
        let difficulty = self.state.selected_difficulty();
        self.settings.difficulty = difficulty;
        self.settings.save(self.state.storage_mut());
        self.surface_errors();
        self.sys
            .player
            .set_speed_multiplier(difficulty.preset().player_speed);
        log::info!("Difficulty set to {}", difficulty.as_str());
        true
    }

    /// Replace the preferences (volume, difficulty, ...) and persist them
    pub fn apply_settings(&mut self, settings: Settings) {
        let settings = settings.sanitized();
        self.state.set_difficulty(settings.difficulty);
        self.sys
            .player
            .set_speed_multiplier(settings.difficulty.preset().player_speed);
        self.sys.audio.set_volume(settings.effective_volume());
        settings.save(self.state.storage_mut());
        self.settings = settings;
        self.surface_errors();
    }

    /// Tell the player about errors recorded since the last call, once per batch
    fn surface_errors(&mut self) {
        let message = {
            let log = errors::lock(&self.errors);
            let total = log.total_recorded();
            if total == self.errors_seen {
                return;
            }
            let storage = log
                .since(self.errors_seen)
                .any(|e| e.source == ErrorSource::Storage);
            self.errors_seen = total;
            if storage {
                "Progress could not be loaded or saved"
            } else {
                "Something went wrong, but the game keeps going"
            }
        };
        self.sys.hud.notify(&Notification::new(message));
    }

    // === Frame ===

    fn tick(&mut self, now: f64, dt: f32) {
        // Input and movement
        let input = self.sys.input.movement_input();
        let moved = self
            .sys
            .player
            .update_movement(&input, self.state.speed_boost_active(), dt);
        if moved && !self.settings.reduced_motion && self.rng.random_bool(RIPPLE_CHANCE) {
            self.sys.effects.spawn_ripple(self.sys.player.position());
        }

        self.sys.player.animate_legs(dt);
        self.sys.player.update_flash(now);

        let expired = self.state.update_power_ups(now);
        if expired.any() {
            self.on_power_ups_expired(expired);
        }

        self.run_collisions(now);
        if !self.state.is_playing() {
            return;
        }

        // Delegated world systems
        let pos = self.sys.player.position();
        let settings = self.state.current_settings();
        self.sys.effects.update_day_night(dt);
        self.sys.effects.update_particles(dt);
        self.sys.effects.update_ripples(dt);
        self.sys.collectibles.update(dt, now);
        self.sys.level.update(dt, pos, &settings);
        self.run_due_tasks(now);
        self.sys.effects.follow_camera(pos, dt);

        if self.state.check_combo_expiration(now) {
            log::debug!("Combo expired");
            self.sys.hud.update_combo(0, 1);
        }
    }

    fn run_collisions(&mut self, now: f64) {
        let pos = self.sys.player.position();
        let mut events = std::mem::take(&mut self.events);

        collision::check_clover_collisions(pos, self.sys.clovers.clovers_mut(), &mut events);
        collision::check_collectible_collisions(
            pos,
            self.sys.collectibles.as_mut(),
            now,
            &mut events,
        );
        collision::check_enemy_collisions(pos, self.sys.level.enemies(), &mut events);
        collision::check_bee_collisions(pos, self.sys.level.bees(), &mut events);
        collision::check_critter_collisions(pos, self.sys.level.as_ref(), &mut events);

        for event in events.drain(..) {
            // Nothing applies after the run has ended this frame
            if !self.state.is_playing() {
                break;
            }
            self.apply_collision(event, now);
        }
        self.events = events;
    }

    fn apply_collision(&mut self, event: CollisionEvent, now: f64) {
        match event {
            CollisionEvent::Clover { id, four_leaf } => self.on_clover_collect(id, four_leaf, now),
            CollisionEvent::Mushroom { variant, now } => self.on_mushroom_collect(variant, now),
            CollisionEvent::Coin { value } => self.on_coin_collect(value),
            CollisionEvent::BuddyBug => self.on_buddy_bug_collect(),
            CollisionEvent::Enemy { .. } => {
                self.on_hit(ENEMY_DAMAGE, now);
            }
            CollisionEvent::Bee { .. } => {
                self.on_hit(BEE_DAMAGE, now);
            }
            CollisionEvent::Critter(kind) => {
                let damage = match kind {
                    CritterKind::Spider => SPIDER_DAMAGE,
                    CritterKind::Slug => SLUG_DAMAGE,
                };
                if self.on_hit(damage, now) {
                    log::debug!("Bitten by a {}", kind.as_str());
                }
            }
        }
    }

    // === Scoring ===

    /// Score a collected clover and check for level-up and victory
    pub fn on_clover_collect(&mut self, clover_id: u32, four_leaf: bool, now: f64) {
        self.state.increment_combo_count();
        self.state.set_last_collect_time(now);
        self.state.update_combo_multiplier();

        let multiplier = self.state.combo_multiplier();
        let base = if four_leaf { FOUR_LEAF_POINTS } else { CLOVER_POINTS };
        let points = base * multiplier as u64;
        self.state.add_score(points);
        self.state.add_clover_collected();

        self.sys.audio.play(if four_leaf {
            SoundEffect::FourLeafCollect
        } else {
            SoundEffect::CloverCollect
        });
        self.sys.clovers.hide(clover_id);
        self.sys
            .effects
            .clover_burst(self.sys.player.position(), four_leaf);

        if multiplier > 1 {
            self.sys.hud.show_combo_popup(multiplier, points);
        }
        self.sys
            .hud
            .update_score(self.state.score(), self.state.high_score());
        self.sys
            .hud
            .update_clovers(self.state.clovers_collected(), TOTAL_CLOVERS);
        self.sys
            .hud
            .update_combo(self.state.combo_count(), multiplier);

        let clovers = self.state.clovers_collected();
        log::debug!(
            "Clover {} (+{}, x{}), {}/{}",
            clover_id,
            points,
            multiplier,
            clovers,
            TOTAL_CLOVERS
        );

        let level = self.state.current_level();
        if clovers / CLOVERS_PER_LEVEL + 1 > level && level < MAX_LEVEL {
            self.level_up(now);
        }

        if clovers >= TOTAL_CLOVERS && !self.state.game_won() {
            self.victory(now);
        }
    }

    fn level_up(&mut self, now: f64) {
        if !self.state.increment_level() {
            return;
        }
        let level = self.state.current_level();
        log::info!("Level up! Now on level {}", level);
        self.sys.hud.show_level_up(level);
        self.sys.hud.update_level(level);
        self.sys.audio.play(SoundEffect::LevelUp);
        self.sys.level.spawn_additional_enemy();
        self.schedule_level_tasks(now);
    }

    pub fn on_mushroom_collect(&mut self, variant: MushroomVariant, now: f64) {
        let message = match variant {
            MushroomVariant::Health => {
                if self.state.player_health() < self.state.max_health() {
                    self.state.heal_player(HEALTH_MUSHROOM_HEAL);
                    format!("+{} health", HEALTH_MUSHROOM_HEAL)
                } else {
                    self.state.add_extra_life();
                    "Extra life!".to_string()
                }
            }
            MushroomVariant::Speed => {
                self.state.activate_speed_boost(now);
                "Speed boost!".to_string()
            }
            MushroomVariant::Invincibility => {
                self.state.activate_invincibility(now);
                "Invincible!".to_string()
            }
        };
        log::debug!("Mushroom {:?}: {}", variant, message);

        self.sys.hud.show_power_up(&message);
        self.refresh_health();
        self.sys.hud.update_power_ups(
            self.state.speed_boost_active(),
            self.state.invincibility_active(),
        );
        self.sys.audio.play(SoundEffect::PowerUp);
    }

    pub fn on_coin_collect(&mut self, value: u64) {
        self.state.add_score(value);
        self.sys.audio.play(SoundEffect::Coin);
        self.sys
            .hud
            .update_score(self.state.score(), self.state.high_score());
    }

    pub fn on_buddy_bug_collect(&mut self) {
        self.state.add_score(BUDDY_BUG_BONUS);
        self.sys.audio.play(SoundEffect::BuddyBug);
        self.sys
            .hud
            .show_power_up(&format!("Buddy bug! +{}", BUDDY_BUG_BONUS));
        self.sys
            .hud
            .update_score(self.state.score(), self.state.high_score());
    }

    fn on_power_ups_expired(&mut self, expired: ExpiredPowerUps) {
        if expired.speed_boost {
            log::debug!("Speed boost wore off");
        }
        if expired.invincibility {
            log::debug!("Invincibility wore off");
        }
        self.sys.hud.update_power_ups(
            self.state.speed_boost_active(),
            self.state.invincibility_active(),
        );
    }

    // === Damage ===

    /// Apply a hit; returns false if it was absorbed (invincible or cooling down)
    pub fn on_hit(&mut self, base_damage: u32, now: f64) -> bool {
        if self.state.invincibility_active() {
            return false;
        }
        if let Some(last) = self.last_hit_time {
            if now - last < HIT_COOLDOWN_MS {
                return false;
            }
        }
        self.last_hit_time = Some(now);

        let damage = self.state.damage_for(base_damage);
        let health = self.state.damage_player(damage);
        self.sys.player.take_damage(damage, now);
        self.sys.audio.play(SoundEffect::Hit);
        self.refresh_health();
        log::debug!("Hit for {} ({} health left)", damage, health);

        if health == 0 {
            self.on_player_down(now);
        }
        true
    }

    fn on_player_down(&mut self, now: f64) {
        if self.state.consume_extra_life() {
            let max = self.state.max_health();
            self.state.set_player_health(max as i64);
            log::info!("Extra life used, {} left", self.state.extra_lives());
            self.sys.audio.play(SoundEffect::ExtraLife);
            self.sys
                .hud
                .notify(&Notification::new("Extra life used!").with_duration(2000));
            self.refresh_health();
        } else {
            self.game_over(now);
        }
    }

    // === Endings ===

    /// All clovers collected. Fires once per session.
    pub fn victory(&mut self, now: f64) {
        if self.state.game_won() {
            return;
        }
        log::info!("Victory! Score {}", self.state.score());
        self.state.set_game_won(true);
        self.end_run(now);

        let summary = self.state.summary(now);
        self.sys.audio.play(SoundEffect::Victory);
        if summary.is_new_high_score {
            self.sys.audio.play(SoundEffect::HighScore);
        }
        self.sys.hud.show_victory(&summary);
    }

    /// Out of health and extra lives
    pub fn game_over(&mut self, now: f64) {
        if self.state.is_game_over() {
            return;
        }
        log::info!("Game over. Score {}", self.state.score());
        self.end_run(now);

        let summary = self.state.summary(now);
        self.sys.audio.play(SoundEffect::GameOver);
        if summary.is_new_high_score {
            self.sys.audio.play(SoundEffect::HighScore);
        }
        self.sys.hud.show_game_over(&summary);
    }

    fn end_run(&mut self, now: f64) {
        self.state.set_game_state(GamePhase::GameOver);
        self.state.finish(now);
        self.tasks.cancel_all();
        self.sys.level.stop_spawning();
        self.state.check_and_update_high_score();
        self.stop();
    }

    // === Spawning ===

    /// Replace pending spawns with the current level's
    fn schedule_level_tasks(&mut self, now: f64) {
        // Cancel first: nothing queued for the old level may fire into this one
        self.tasks.cancel_all();
        for (delay, kind) in difficulty::introductions(self.state.current_level()) {
            self.tasks.schedule(now + delay, SpawnTask::Introduce(kind));
        }
        self.schedule_timed_spawn(now);
    }

    fn schedule_timed_spawn(&mut self, now: f64) {
        let rate = self.state.current_settings().spawn_rate_ms;
        if rate > 0.0 {
            self.tasks.schedule(now + rate, SpawnTask::Timed);
        }
    }

    fn run_due_tasks(&mut self, now: f64) {
        for task in self.tasks.drain_due(now) {
            match task {
                SpawnTask::Introduce(kind) => {
                    log::debug!("Introducing {:?}", kind);
                    self.sys.level.spawn(kind);
                }
                SpawnTask::Timed => {
                    let cap = self.state.current_settings().max_enemies;
                    if self.sys.level.enemy_count() < cap {
                        self.sys.level.spawn(SpawnKind::Enemy);
                    }
                    self.schedule_timed_spawn(now);
                }
            }
        }
    }

    // === HUD ===

    fn refresh_health(&mut self) {
        self.sys.hud.update_health(
            self.state.player_health(),
            self.state.max_health(),
            self.state.extra_lives(),
        );
    }

    /// Push every HUD value
    pub fn refresh_hud(&mut self) {
        self.sys
            .hud
            .update_score(self.state.score(), self.state.high_score());
        self.sys
            .hud
            .update_clovers(self.state.clovers_collected(), TOTAL_CLOVERS);
        self.sys
            .hud
            .update_combo(self.state.combo_count(), self.state.combo_multiplier());
        self.sys.hud.update_level(self.state.current_level());
        self.refresh_health();
        self.sys.hud.update_power_ups(
            self.state.speed_boost_active(),
            self.state.invincibility_active(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::difficulty::Difficulty;
    use crate::errors::shared_log;
    use crate::errors::ErrorSource;
    use crate::meadow::{self, HudEvent, Watch, World};
    use glam::Vec3;

    const FRAME_MS: f64 = 1000.0 / 60.0;

    fn game_with(world: World) -> (GameLoop, Watch) {
        let (sys, watch) = meadow::build(world);
        let state = GameStateManager::new(Box::new(MemoryStorage::new()));
        let game = GameLoop::new(state, sys, Settings::default(), shared_log(), 42);
        (game, watch)
    }

    fn clover_at(id: u32, pos: Vec3, four_leaf: bool) -> Clover {
        Clover::new(id, pos, four_leaf)
    }

    fn critter_at(id: u32, x: f32) -> Critter {
        Critter {
            id,
            position: Vec3::new(x, 0.0, 0.0),
        }
    }

    struct ExplodingEffects;

    impl Effects for ExplodingEffects {
        fn update_particles(&mut self, _dt: f32) {
            panic!("particle buffer overflow");
        }
    }

    #[test]
    fn test_start_is_idempotent() {
        let (mut game, watch) = game_with(World::empty());
        game.start(0.0);
        game.start(5.0);
        assert!(game.is_running());
        assert_eq!(watch.frames_requested.get(), 1);
    }

    #[test]
    fn test_stop_is_safe_twice() {
        let (mut game, watch) = game_with(World::empty());
        game.stop();
        game.start(0.0);
        game.stop();
        game.stop();
        assert!(!game.is_running());
        assert_eq!(watch.frames_cancelled.get(), 1);

        // A frame that fires after stop does nothing
        game.frame(16.0);
        assert_eq!(watch.frames_rendered.get(), 0);
    }

    #[test]
    fn test_frame_reschedules() {
        let (mut game, watch) = game_with(World::empty());
        game.start(0.0);
        for i in 1..=3 {
            game.frame(i as f64 * FRAME_MS);
        }
        assert_eq!(watch.frames_rendered.get(), 3);
        assert_eq!(watch.frames_requested.get(), 4);
    }

    #[test]
    fn test_clover_collected_through_frame() {
        let world = World {
            clovers: vec![clover_at(1, Vec3::new(2.0, 0.0, 0.0), false)],
            ..World::empty()
        };
        let (mut game, watch) = game_with(world);
        game.start(0.0);
        game.frame(FRAME_MS);

        assert_eq!(game.state().clovers_collected(), 1);
        assert_eq!(game.state().score(), 5);
        assert!(game.subsystems().clovers.clovers()[0].collected);
        assert_eq!(*watch.hidden.borrow(), vec![1]);
        assert_eq!(watch.sound_count(SoundEffect::CloverCollect), 1);
        assert_eq!(watch.bursts.get(), 1);

        // Standing still on the collected clover does nothing more
        game.frame(2.0 * FRAME_MS);
        assert_eq!(game.state().clovers_collected(), 1);
        assert_eq!(watch.sound_count(SoundEffect::CloverCollect), 1);
    }

    #[test]
    fn test_four_leaf_with_combo_multiplier() {
        let (mut game, watch) = game_with(World::empty());
        game.start(0.0);
        // Two more and the multiplier reaches 3 on the next collection
        game.state_mut().set_combo_count(5);
        game.on_clover_collect(9, true, 100.0);

        assert_eq!(game.state().combo_multiplier(), 3);
        assert_eq!(game.state().score(), 45);
        assert_eq!(
            watch.last_hud(|e| matches!(e, HudEvent::ComboPopup { .. })),
            Some(HudEvent::ComboPopup {
                multiplier: 3,
                points: 45
            })
        );
    }

    #[test]
    fn test_plain_clover_without_combo() {
        let (mut game, watch) = game_with(World::empty());
        game.start(0.0);
        game.on_clover_collect(1, false, 100.0);
        assert_eq!(game.state().score(), 5);
        assert_eq!(game.state().combo_multiplier(), 1);
        assert_eq!(watch.hud_count(|e| matches!(e, HudEvent::ComboPopup { .. })), 0);
        assert_eq!(watch.last_hud(|e| matches!(e, HudEvent::Score(_))), Some(HudEvent::Score(5)));
    }

    #[test]
    fn test_level_up_fires_once_on_third_clover() {
        let (mut game, watch) = game_with(World::empty());
        game.start(0.0);
        game.on_clover_collect(1, false, 100.0);
        game.on_clover_collect(2, false, 200.0);
        assert_eq!(game.state().current_level(), 1);

        game.on_clover_collect(3, false, 300.0);
        assert_eq!(game.state().current_level(), 2);
        assert_eq!(watch.hud_count(|e| matches!(e, HudEvent::LevelUp(2))), 1);
        assert_eq!(watch.sound_count(SoundEffect::LevelUp), 1);
        assert_eq!(watch.level.borrow().additional_enemies, 1);

        game.on_clover_collect(4, false, 400.0);
        assert_eq!(game.state().current_level(), 2);
        assert_eq!(watch.sound_count(SoundEffect::LevelUp), 1);
    }

    #[test]
    fn test_no_level_up_past_max() {
        let (mut game, watch) = game_with(World::empty());
        game.start(0.0);
        game.state_mut().set_current_level(MAX_LEVEL);
        for id in 0..29 {
            game.on_clover_collect(id, false, 100.0 + id as f64);
        }
        assert_eq!(game.state().current_level(), MAX_LEVEL);
        assert_eq!(watch.sound_count(SoundEffect::LevelUp), 0);
    }

    #[test]
    fn test_full_run_levels_and_victory_once() {
        let (mut game, watch) = game_with(World::empty());
        game.start(0.0);
        for id in 0..TOTAL_CLOVERS {
            game.on_clover_collect(id, false, 100.0 * (id + 1) as f64);
        }
        assert_eq!(game.state().current_level(), MAX_LEVEL);
        assert!(game.state().game_won());
        assert!(game.state().is_game_over());
        assert!(!game.is_running());
        assert_eq!(watch.hud_count(|e| matches!(e, HudEvent::Victory(_))), 1);
        assert_eq!(watch.sound_count(SoundEffect::Victory), 1);
        assert!(watch.level.borrow().stopped);
        assert_eq!(game.pending_tasks(), 0);

        // Another collection after the win must not celebrate again
        game.on_clover_collect(99, false, 10_000.0);
        assert_eq!(watch.hud_count(|e| matches!(e, HudEvent::Victory(_))), 1);
        assert_eq!(watch.sound_count(SoundEffect::Victory), 1);
    }

    #[test]
    fn test_victory_saves_high_score() {
        let (mut game, watch) = game_with(World::empty());
        game.start(0.0);
        for id in 0..TOTAL_CLOVERS {
            game.on_clover_collect(id, false, 100.0 * (id + 1) as f64);
        }
        let score = game.state().score();
        assert_eq!(game.state().high_score(), score);
        assert!(game.state().is_new_high_score());
        assert_eq!(watch.sound_count(SoundEffect::HighScore), 1);
        match watch.last_hud(|e| matches!(e, HudEvent::Victory(_))) {
            Some(HudEvent::Victory(summary)) => {
                assert!(summary.won);
                assert_eq!(summary.clovers_collected, TOTAL_CLOVERS);
                assert_eq!(summary.score, score);
            }
            other => panic!("expected victory screen, got {:?}", other),
        }
    }

    #[test]
    fn test_enemy_hit_and_cooldown() {
        let world = World {
            enemies: vec![critter_at(1, 1.0)],
            ..World::empty()
        };
        let (mut game, watch) = game_with(world);
        game.start(0.0);
        game.frame(FRAME_MS);
        assert_eq!(game.state().player_health(), 100 - ENEMY_DAMAGE);
        assert_eq!(watch.damage_taken.get(), ENEMY_DAMAGE);
        assert_eq!(watch.sound_count(SoundEffect::Hit), 1);

        // Still touching, but inside the cooldown
        game.frame(2.0 * FRAME_MS);
        assert_eq!(game.state().player_health(), 100 - ENEMY_DAMAGE);

        assert!(game.on_hit(ENEMY_DAMAGE, FRAME_MS + HIT_COOLDOWN_MS));
        assert_eq!(game.state().player_health(), 100 - 2 * ENEMY_DAMAGE);
    }

    #[test]
    fn test_invincibility_blocks_damage() {
        let (mut game, _watch) = game_with(World::empty());
        game.start(0.0);
        game.on_mushroom_collect(MushroomVariant::Invincibility, 0.0);
        assert!(!game.on_hit(ENEMY_DAMAGE, 100.0));
        assert_eq!(game.state().player_health(), 100);
    }

    #[test]
    fn test_spider_damage_when_slug_also_touching() {
        let world = World {
            spiders: vec![critter_at(1, 0.5)],
            slugs: vec![critter_at(2, 0.5)],
            ..World::empty()
        };
        let (mut game, _watch) = game_with(world);
        game.start(0.0);
        game.frame(FRAME_MS);
        assert_eq!(game.state().player_health(), 100 - SPIDER_DAMAGE);
    }

    #[test]
    fn test_game_over_when_out_of_health() {
        let (mut game, watch) = game_with(World::empty());
        game.start(0.0);
        game.state_mut().set_player_health(10);
        assert!(game.on_hit(ENEMY_DAMAGE, 500.0));

        assert_eq!(game.state().player_health(), 0);
        assert!(game.state().is_game_over());
        assert!(!game.state().game_won());
        assert!(!game.is_running());
        assert_eq!(watch.hud_count(|e| matches!(e, HudEvent::GameOver(_))), 1);
        assert_eq!(watch.sound_count(SoundEffect::GameOver), 1);
        assert!(watch.level.borrow().stopped);
    }

    #[test]
    fn test_extra_life_instead_of_game_over() {
        let (mut game, watch) = game_with(World::empty());
        game.start(0.0);
        game.state_mut().add_extra_life();
        game.state_mut().set_player_health(5);
        game.on_hit(BEE_DAMAGE, 500.0);

        assert!(game.state().is_playing());
        assert_eq!(game.state().extra_lives(), 0);
        assert_eq!(game.state().player_health(), game.state().max_health());
        assert_eq!(watch.sound_count(SoundEffect::ExtraLife), 1);
    }

    #[test]
    fn test_health_mushroom_heals_or_grants_life() {
        let (mut game, watch) = game_with(World::empty());
        game.start(0.0);

        game.on_mushroom_collect(MushroomVariant::Health, 0.0);
        assert_eq!(game.state().extra_lives(), 1);

        game.state_mut().damage_player(40);
        game.on_mushroom_collect(MushroomVariant::Health, 10.0);
        assert_eq!(game.state().player_health(), 60 + HEALTH_MUSHROOM_HEAL);
        assert_eq!(game.state().extra_lives(), 1);
        assert_eq!(watch.sound_count(SoundEffect::PowerUp), 2);
    }

    #[test]
    fn test_speed_mushroom_through_frame_then_expires() {
        let world = World {
            collectibles: vec![Collectible {
                id: 1,
                kind: CollectibleKind::Mushroom(MushroomVariant::Speed),
                position: Vec3::new(1.0, 0.0, 0.0),
            }],
            ..World::empty()
        };
        let (mut game, watch) = game_with(world);
        game.start(0.0);
        game.frame(1000.0);
        assert!(game.state().speed_boost_active());
        assert_eq!(
            game.state().speed_boost_end_time(),
            1000.0 + SPEED_BOOST_DURATION_MS
        );
        assert_eq!(
            watch.last_hud(|e| matches!(e, HudEvent::PowerUp(_))),
            Some(HudEvent::PowerUp("Speed boost!".to_string()))
        );

        game.frame(1000.0 + SPEED_BOOST_DURATION_MS);
        assert!(!game.state().speed_boost_active());
    }

    #[test]
    fn test_coin_and_buddy_bug() {
        let (mut game, watch) = game_with(World::empty());
        game.start(0.0);
        game.on_coin_collect(COIN_VALUE);
        game.on_buddy_bug_collect();
        assert_eq!(game.state().score(), COIN_VALUE + BUDDY_BUG_BONUS);
        assert_eq!(watch.sound_count(SoundEffect::Coin), 1);
        assert_eq!(watch.sound_count(SoundEffect::BuddyBug), 1);
    }

    #[test]
    fn test_combo_expires_during_frame() {
        let (mut game, watch) = game_with(World::empty());
        game.start(0.0);
        game.frame(FRAME_MS);
        game.state_mut().set_combo_count(4);
        game.state_mut().set_last_collect_time(1000.0);
        game.frame(3000.0);
        assert_eq!(game.state().combo_count(), 4);

        game.frame(4500.0);
        assert_eq!(game.state().combo_count(), 0);
        assert_eq!(
            watch.last_hud(|e| matches!(e, HudEvent::Combo { .. })),
            Some(HudEvent::Combo {
                count: 0,
                multiplier: 1
            })
        );
    }

    #[test]
    fn test_pause_skips_simulation() {
        let world = World {
            clovers: vec![clover_at(1, Vec3::new(1.0, 0.0, 0.0), false)],
            ..World::empty()
        };
        let (mut game, watch) = game_with(world);
        game.start(0.0);
        assert!(game.toggle_pause(5.0));
        game.frame(FRAME_MS);
        assert_eq!(game.state().clovers_collected(), 0);
        // Still rendering and rescheduling while paused
        assert_eq!(watch.frames_rendered.get(), 1);
        assert!(game.is_running());

        assert!(!game.toggle_pause(100.0));
        game.frame(120.0);
        assert_eq!(game.state().clovers_collected(), 1);
    }

    #[test]
    fn test_moving_bug_leaves_ripples() {
        let (mut game, watch) = game_with(World::empty());
        watch.set_input(MovementInput {
            forward: true,
            ..Default::default()
        });
        game.start(0.0);
        for i in 1..=600 {
            game.frame(i as f64 * FRAME_MS);
        }
        assert!(watch.player_pos.get().z < 0.0);
        let ripples = watch.ripples.get();
        // ~10% of 600 frames
        assert!(ripples > 20 && ripples < 120, "ripples = {}", ripples);
    }

    #[test]
    fn test_level_change_replaces_pending_spawns() {
        let (mut game, watch) = game_with(World::empty());
        game.start(0.0);
        // Level 1 has no timed spawns and no introductions
        assert_eq!(game.pending_tasks(), 0);

        game.state_mut().set_current_level(2);
        game.state_mut().add_clover_collected();
        game.state_mut().add_clover_collected();
        game.state_mut().add_clover_collected();
        game.state_mut().add_clover_collected();
        game.state_mut().add_clover_collected();
        // Sixth clover takes level 2 to 3: a bee introduction plus the timed spawn
        game.on_clover_collect(6, false, 1000.0);
        assert_eq!(game.state().current_level(), 3);
        assert_eq!(game.pending_tasks(), 2);

        // Next level-up drops the old timers before queueing new ones
        for id in 7..=9 {
            game.on_clover_collect(id, false, 1100.0);
        }
        assert_eq!(game.state().current_level(), 4);
        assert_eq!(game.pending_tasks(), 2);

        // The stale level-3 timers never fire
        game.frame(1100.0 + 2000.0);
        let spawned = watch.level.borrow().spawned.clone();
        assert_eq!(
            spawned,
            vec![SpawnKind::Enemy, SpawnKind::Enemy, SpawnKind::Bee]
        );
    }

    #[test]
    fn test_timed_spawns_respect_enemy_cap() {
        let (mut game, watch) = game_with(World::empty());
        game.start(0.0);
        game.state_mut().set_current_level(2);
        game.schedule_level_tasks(0.0);
        let rate = game.state().current_settings().spawn_rate_ms;
        let cap = game.state().current_settings().max_enemies;

        for n in 1..=5 {
            game.frame(n as f64 * rate);
        }
        assert_eq!(game.subsystems().level.enemy_count(), cap);
        assert_eq!(watch.level.borrow().spawned.len(), cap as usize);
        // Always one timed spawn waiting
        assert_eq!(game.pending_tasks(), 1);
    }

    #[test]
    fn test_panicking_subsystem_does_not_stop_loop() {
        let (mut sys, watch) = meadow::build(World::empty());
        sys.effects = Box::new(ExplodingEffects);
        let state = GameStateManager::new(Box::new(MemoryStorage::new()));
        let error_log = shared_log();
        let mut game = GameLoop::new(state, sys, Settings::default(), error_log.clone(), 1);

        game.start(0.0);
        game.frame(FRAME_MS);
        game.frame(2.0 * FRAME_MS);

        assert!(game.is_running());
        assert_eq!(watch.frames_requested.get(), 3);
        assert_eq!(errors::lock(&error_log).len(), 2);
        assert_eq!(watch.frames_rendered.get(), 2);
        let notified = watch.hud_count(|e| {
            matches!(e, HudEvent::Notify(n) if n.duration_ms == NOTIFICATION_DURATION_MS)
        });
        assert_eq!(notified, 2);
    }

    #[test]
    fn test_recorded_errors_reach_hud_once() {
        let (mut game, watch) = game_with(World::empty());
        game.start(0.0);
        game.frame(FRAME_MS);
        assert_eq!(watch.hud_count(|e| matches!(e, HudEvent::Notify(_))), 0);

        // What the panic hook leaves behind when a callback outside the frame fails
        errors::lock(game.errors()).record(ErrorSource::Uncaught, "listener failed", 20.0);
        game.frame(2.0 * FRAME_MS);
        game.frame(3.0 * FRAME_MS);
        assert_eq!(watch.hud_count(|e| matches!(e, HudEvent::Notify(_))), 1);
        assert!(game.is_running());

        // Noticed even while paused
        game.toggle_pause(60.0);
        errors::lock(game.errors()).record(ErrorSource::Uncaught, "again", 70.0);
        game.frame(4.0 * FRAME_MS);
        assert_eq!(watch.hud_count(|e| matches!(e, HudEvent::Notify(_))), 2);
    }

    #[test]
    fn test_storage_failures_reach_hud() {
        let (sys, watch) = meadow::build(World::empty());
        let error_log = shared_log();
        let storage = ReportingStorage::new(MemoryStorage::broken(), error_log.clone());
        // Loading the high score already fails once
        let state = GameStateManager::new(Box::new(storage));
        let mut game = GameLoop::new(state, sys, Settings::default(), error_log.clone(), 5);

        assert!(game.set_difficulty("hard"));
        assert_eq!(
            watch.last_hud(|e| matches!(e, HudEvent::Notify(_))),
            Some(HudEvent::Notify(Notification::new("Progress could not be loaded or saved")))
        );
        {
            let log = errors::lock(&error_log);
            assert_eq!(log.len(), 2);
            assert!(log.entries().all(|e| e.source == ErrorSource::Storage));
        }

        game.start(0.0);
        game.frame(FRAME_MS);
        assert_eq!(watch.hud_count(|e| matches!(e, HudEvent::Notify(_))), 1);

        game.apply_settings(Settings::default());
        assert_eq!(watch.hud_count(|e| matches!(e, HudEvent::Notify(_))), 2);
    }

    #[test]
    fn test_critter_reached_after_teleport() {
        let world = World {
            spiders: vec![critter_at(1, 10.0)],
            ..World::empty()
        };
        let (mut game, watch) = game_with(world);
        game.start(0.0);
        game.frame(FRAME_MS);
        assert_eq!(game.state().player_health(), 100);
        assert!(!watch.flashing.get());

        watch.teleport(Vec3::new(10.0, 0.0, 0.0));
        game.frame(2.0 * FRAME_MS);
        assert_eq!(game.state().player_health(), 100 - SPIDER_DAMAGE);
        assert!(watch.flashing.get());

        // The flash ends with the hit cooldown
        watch.teleport(Vec3::ZERO);
        game.frame(2.0 * FRAME_MS + HIT_COOLDOWN_MS);
        assert!(!watch.flashing.get());
    }

    #[test]
    fn test_level_update_uses_difficulty_settings() {
        let (mut game, watch) = game_with(World::empty());
        assert!(game.set_difficulty("hard"));
        game.start(0.0);
        game.state_mut().set_current_level(4);
        game.frame(FRAME_MS);
        game.frame(2.0 * FRAME_MS);

        let level = watch.level.borrow();
        assert_eq!(level.updates, 2);
        assert_eq!(level.last_settings, Some(game.state().current_settings()));
        assert_eq!(
            level.last_settings,
            Some(difficulty::settings_for(4, &Difficulty::Hard.preset()))
        );
    }

    #[test]
    fn test_restart_resets_run_but_keeps_best() {
        let world = World {
            clovers: vec![clover_at(1, Vec3::new(1.0, 0.0, 0.0), true)],
            ..World::empty()
        };
        let (mut game, watch) = game_with(world);
        game.start(0.0);
        game.frame(FRAME_MS);
        game.state_mut().set_player_health(5);
        game.on_hit(ENEMY_DAMAGE, 100.0);
        assert!(game.state().is_game_over());
        let best = game.state().high_score();
        assert_eq!(best, FOUR_LEAF_POINTS);

        assert_eq!(watch.hud_count(|e| matches!(e, HudEvent::GameOver(_))), 1);
        let events_before = watch.hud.borrow().len();

        game.restart(5000.0);
        // The game over screen goes away and the pause menu stays closed
        let after: Vec<HudEvent> = watch.hud.borrow()[events_before..].to_vec();
        assert!(after.contains(&HudEvent::EndScreensHidden));
        assert!(after.contains(&HudEvent::Paused(false)));
        assert!(watch.hidden.borrow().is_empty());
        assert!(game.is_running());
        assert!(game.state().is_playing());
        assert_eq!(game.state().score(), 0);
        assert_eq!(game.state().high_score(), best);
        assert!(!game.subsystems().clovers.clovers()[0].collected);
        assert!(!watch.level.borrow().stopped);

        // The clover can be collected again
        game.frame(5000.0 + FRAME_MS);
        assert_eq!(game.state().clovers_collected(), 1);
    }

    #[test]
    fn test_set_difficulty_persists() {
        let (mut game, _watch) = game_with(World::empty());
        assert!(game.set_difficulty("hard"));
        assert_eq!(game.settings().difficulty, Difficulty::Hard);
        assert_eq!(game.state().selected_difficulty(), Difficulty::Hard);
        let stored = Settings::load(game.state_mut().storage_mut());
        assert_eq!(stored.difficulty, Difficulty::Hard);

        assert!(!game.set_difficulty("legendary"));
        assert_eq!(game.settings().difficulty, Difficulty::Hard);
    }

    #[test]
    fn test_apply_settings_updates_state_and_storage() {
        let (mut game, _watch) = game_with(World::empty());
        game.apply_settings(Settings {
            difficulty: Difficulty::Easy,
            muted: true,
            ..Settings::default()
        });
        assert_eq!(game.state().selected_difficulty(), Difficulty::Easy);
        assert_eq!(game.settings().effective_volume(), 0.0);

        let stored = Settings::load(game.state_mut().storage_mut());
        assert!(stored.muted);
        assert_eq!(stored.difficulty, Difficulty::Easy);
    }

    #[test]
    fn test_autopilot_clears_meadow() {
        let (mut game, watch) = game_with(World::meadow(3));
        game.state_mut().set_difficulty(Difficulty::Easy);
        game.start(0.0);
        let mut now = 0.0;
        while game.is_running() && now < 600_000.0 {
            now += FRAME_MS;
            let input = meadow::autopilot(
                game.subsystems().player.position(),
                game.subsystems().clovers.clovers(),
            );
            watch.set_input(input);
            // Stay alive: this test is about collection, not dodging
            game.state_mut().set_player_health(100);
            game.frame(now);
        }
        assert!(game.state().game_won());
        assert_eq!(game.state().clovers_collected(), TOTAL_CLOVERS);
        assert_eq!(game.state().current_level(), MAX_LEVEL);
    }
}
