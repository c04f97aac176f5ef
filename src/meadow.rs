//! The meadow: in-memory collaborators
//!
//! A complete, scene-less implementation of every world trait. The web build
//! runs its simulation on it (the page only supplies input, frames, audio and
//! the HUD), the native demo drives a whole run with it, and tests read the
//! shared [`Watch`] handles to see what the game asked of its collaborators.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::audio::{AudioSink, SoundEffect};
use crate::collision::within;
use crate::consts::{HIT_COOLDOWN_MS, TOTAL_CLOVERS};
use crate::difficulty::{LevelSettings, SpawnKind};
use crate::game_loop::Subsystems;
use crate::platform::*;
use crate::state::GameSummary;
use crate::ui::{Hud, Notification};

/// Bug speed in world units per second
pub const PLAYER_SPEED: f32 = 8.0;
pub const SPEED_BOOST_FACTOR: f32 = 1.5;
/// Distance from the origin where new creatures appear
pub const SPAWN_RING_RADIUS: f32 = 30.0;
/// Frames per second the per-frame enemy speeds are tuned for
const REFERENCE_FPS: f32 = 60.0;

/// Starting layout of a run
#[derive(Debug, Clone, Default)]
pub struct World {
    pub player_start: Vec3,
    pub clovers: Vec<Clover>,
    pub collectibles: Vec<Collectible>,
    pub enemies: Vec<Critter>,
    pub bees: Vec<Critter>,
    pub spiders: Vec<Critter>,
    pub slugs: Vec<Critter>,
}

impl World {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A full meadow: every clover, a few pickups and one enemy
    pub fn meadow(seed: u64) -> Self {
        let mut rng = Pcg32::seed_from_u64(seed);
        let scatter = |rng: &mut Pcg32| {
            Vec3::new(
                rng.random_range(-40.0..40.0),
                0.0,
                rng.random_range(-40.0..40.0),
            )
        };

        let clovers = (0..TOTAL_CLOVERS)
            .map(|id| Clover::new(id, scatter(&mut rng), id % 5 == 4))
            .collect();

        let kinds = [
            CollectibleKind::Mushroom(MushroomVariant::Health),
            CollectibleKind::Mushroom(MushroomVariant::Speed),
            CollectibleKind::Mushroom(MushroomVariant::Invincibility),
            CollectibleKind::Coin,
            CollectibleKind::Coin,
            CollectibleKind::Coin,
            CollectibleKind::BuddyBug,
        ];
        let collectibles = kinds
            .iter()
            .enumerate()
            .map(|(i, &kind)| Collectible {
                id: i as u32,
                kind,
                position: scatter(&mut rng),
            })
            .collect();

        Self {
            player_start: Vec3::ZERO,
            clovers,
            collectibles,
            enemies: vec![Critter {
                id: 1000,
                position: Vec3::new(SPAWN_RING_RADIUS, 0.0, SPAWN_RING_RADIUS),
            }],
            ..Self::default()
        }
    }
}

/// Input set from outside (tests, autopilot)
pub struct MeadowInput {
    current: Rc<Cell<MovementInput>>,
}

impl InputSource for MeadowInput {
    fn movement_input(&mut self) -> MovementInput {
        self.current.get()
    }
}

/// Bug that slides over a flat meadow
pub struct MeadowPlayer {
    position: Rc<Cell<Vec3>>,
    start: Vec3,
    speed_multiplier: f32,
    flash_until: f64,
    flashing: Rc<Cell<bool>>,
    stride: f32,
    damage_taken: Rc<Cell<u32>>,
}

impl Player for MeadowPlayer {
    fn position(&self) -> Vec3 {
        self.position.get()
    }

    fn update_movement(
        &mut self,
        input: &MovementInput,
        speed_boost_active: bool,
        dt: f32,
    ) -> bool {
        let axis = |pos: bool, neg: bool| (pos as i32 - neg as i32) as f32;
        let dir = Vec3::new(
            axis(input.right, input.left),
            0.0,
            axis(input.backward, input.forward),
        );
        if dir == Vec3::ZERO {
            return false;
        }
        let boost = if speed_boost_active { SPEED_BOOST_FACTOR } else { 1.0 };
        let step = dir.normalize() * PLAYER_SPEED * self.speed_multiplier * boost * dt;
        self.position.set(self.position.get() + step);
        true
    }

    fn animate_legs(&mut self, dt: f32) {
        self.stride = (self.stride + dt * 10.0) % std::f32::consts::TAU;
    }

    fn update_flash(&mut self, now: f64) {
        if self.flashing.get() && now >= self.flash_until {
            self.flashing.set(false);
        }
    }

    fn take_damage(&mut self, amount: u32, now: f64) {
        self.flashing.set(true);
        self.flash_until = now + HIT_COOLDOWN_MS;
        self.damage_taken.set(self.damage_taken.get() + amount);
    }

    fn set_speed_multiplier(&mut self, multiplier: f32) {
        self.speed_multiplier = multiplier;
    }

    fn reset(&mut self) {
        self.position.set(self.start);
        self.flashing.set(false);
        self.stride = 0.0;
    }
}

/// Clovers as plain data
pub struct MeadowClovers {
    clovers: Vec<Clover>,
    hidden: Rc<RefCell<Vec<u32>>>,
}

impl CloverField for MeadowClovers {
    fn clovers(&self) -> &[Clover] {
        &self.clovers
    }

    fn clovers_mut(&mut self) -> &mut [Clover] {
        &mut self.clovers
    }

    fn hide(&mut self, id: u32) {
        self.hidden.borrow_mut().push(id);
    }

    fn reset(&mut self) {
        for clover in &mut self.clovers {
            clover.collected = false;
        }
        self.hidden.borrow_mut().clear();
    }
}

/// Pickups that stay where they were placed
pub struct MeadowCollectibles {
    initial: Vec<Collectible>,
    items: Vec<Collectible>,
}

impl CollectiblesManager for MeadowCollectibles {
    fn check_collection(&mut self, pos: Vec3, radius: f32) -> Option<Collectible> {
        let idx = self.items.iter().position(|c| within(pos, c.position, radius))?;
        Some(self.items.remove(idx))
    }

    fn update(&mut self, _dt: f32, _now: f64) {}

    fn reset(&mut self) {
        self.items = self.initial.clone();
    }
}

/// What the level manager was asked to do
#[derive(Debug, Clone, Default)]
pub struct LevelLog {
    pub spawned: Vec<SpawnKind>,
    pub additional_enemies: u32,
    pub stopped: bool,
    pub updates: u32,
    pub last_settings: Option<LevelSettings>,
}

/// Enemies and bees that crawl straight at the bug
pub struct MeadowLevel {
    initial: World,
    enemies: Vec<Critter>,
    bees: Vec<Critter>,
    spiders: Vec<Critter>,
    slugs: Vec<Critter>,
    next_id: u32,
    spawning: bool,
    log: Rc<RefCell<LevelLog>>,
}

impl MeadowLevel {
    fn spawn_point(id: u32) -> Vec3 {
        let angle = id as f32 * 2.4;
        Vec3::new(angle.cos(), 0.0, angle.sin()) * SPAWN_RING_RADIUS
    }

    fn chase(critters: &mut [Critter], target: Vec3, step: f32) {
        for critter in critters {
            let to_target = target - critter.position;
            let dist = to_target.length();
            if dist > f32::EPSILON {
                critter.position += to_target / dist * step.min(dist);
            }
        }
    }
}

impl EnemyManager for MeadowLevel {
    fn enemies(&self) -> &[Critter] {
        &self.enemies
    }

    fn bees(&self) -> &[Critter] {
        &self.bees
    }

    fn check_spider_collisions(&self, pos: Vec3, radius: f32) -> bool {
        self.spiders.iter().any(|s| within(pos, s.position, radius))
    }

    fn check_slug_collisions(&self, pos: Vec3, radius: f32) -> bool {
        self.slugs.iter().any(|s| within(pos, s.position, radius))
    }
}

impl LevelManager for MeadowLevel {
    fn update(&mut self, dt: f32, player_pos: Vec3, settings: &LevelSettings) {
        let step = settings.enemy_speed * REFERENCE_FPS * dt;
        Self::chase(&mut self.enemies, player_pos, step);
        Self::chase(&mut self.bees, player_pos, step * 1.2);
        let mut log = self.log.borrow_mut();
        log.updates += 1;
        log.last_settings = Some(*settings);
    }

    fn spawn(&mut self, kind: SpawnKind) {
        if !self.spawning {
            return;
        }
        let critter = Critter {
            id: self.next_id,
            position: Self::spawn_point(self.next_id),
        };
        self.next_id += 1;
        match kind {
            SpawnKind::Enemy => self.enemies.push(critter),
            SpawnKind::Bee => self.bees.push(critter),
            SpawnKind::Spider => self.spiders.push(critter),
            SpawnKind::Slug => self.slugs.push(critter),
        }
        self.log.borrow_mut().spawned.push(kind);
    }

    fn spawn_additional_enemy(&mut self) {
        self.log.borrow_mut().additional_enemies += 1;
        self.spawn(SpawnKind::Enemy);
    }

    fn enemy_count(&self) -> u32 {
        self.enemies.len() as u32
    }

    fn stop_spawning(&mut self) {
        self.spawning = false;
        self.log.borrow_mut().stopped = true;
    }

    fn reset(&mut self) {
        self.enemies = self.initial.enemies.clone();
        self.bees = self.initial.bees.clone();
        self.spiders = self.initial.spiders.clone();
        self.slugs = self.initial.slugs.clone();
        self.spawning = true;
        *self.log.borrow_mut() = LevelLog::default();
    }
}

/// Counts visual effect requests
pub struct MeadowEffects {
    ripples: Rc<Cell<u32>>,
    bursts: Rc<Cell<u32>>,
}

impl Effects for MeadowEffects {
    fn spawn_ripple(&mut self, _pos: Vec3) {
        self.ripples.set(self.ripples.get() + 1);
    }

    fn clover_burst(&mut self, _pos: Vec3, _four_leaf: bool) {
        self.bursts.set(self.bursts.get() + 1);
    }
}

/// Counts rendered frames
pub struct MeadowRenderer {
    frames: Rc<Cell<u64>>,
}

impl FrameRenderer for MeadowRenderer {
    fn render(&mut self) {
        self.frames.set(self.frames.get() + 1);
    }
}

/// Frame scheduler driven by hand: the host calls `GameLoop::frame` itself
pub struct MeadowScheduler {
    next_id: u64,
    requested: Rc<Cell<u64>>,
    cancelled: Rc<Cell<u64>>,
}

impl FrameScheduler for MeadowScheduler {
    fn request_frame(&mut self) -> FrameHandle {
        self.next_id += 1;
        self.requested.set(self.requested.get() + 1);
        FrameHandle(self.next_id)
    }

    fn cancel_frame(&mut self, _handle: FrameHandle) {
        self.cancelled.set(self.cancelled.get() + 1);
    }
}

/// Remembers every sound played
pub struct RecordingAudio {
    played: Rc<RefCell<Vec<SoundEffect>>>,
}

impl AudioSink for RecordingAudio {
    fn play(&mut self, effect: SoundEffect) {
        log::trace!("sound: {:?}", effect);
        self.played.borrow_mut().push(effect);
    }
}

/// HUD output, as data
#[derive(Debug, Clone, PartialEq)]
pub enum HudEvent {
    Score(u64),
    Clovers(u32),
    Combo { count: u32, multiplier: u32 },
    Health(u32),
    Level(u32),
    PowerUps { speed_boost: bool, invincible: bool },
    ComboPopup { multiplier: u32, points: u64 },
    LevelUp(u32),
    PowerUp(String),
    Paused(bool),
    Victory(GameSummary),
    GameOver(GameSummary),
    EndScreensHidden,
    Notify(Notification),
}

/// Remembers every HUD call
pub struct RecordingHud {
    events: Rc<RefCell<Vec<HudEvent>>>,
}

impl RecordingHud {
    fn push(&self, event: HudEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl Hud for RecordingHud {
    fn update_score(&mut self, score: u64, _high_score: u64) {
        self.push(HudEvent::Score(score));
    }

    fn update_clovers(&mut self, collected: u32, _total: u32) {
        self.push(HudEvent::Clovers(collected));
    }

    fn update_combo(&mut self, count: u32, multiplier: u32) {
        self.push(HudEvent::Combo { count, multiplier });
    }

    fn update_health(&mut self, health: u32, _max_health: u32, _extra_lives: u32) {
        self.push(HudEvent::Health(health));
    }

    fn update_level(&mut self, level: u32) {
        self.push(HudEvent::Level(level));
    }

    fn update_power_ups(&mut self, speed_boost: bool, invincible: bool) {
        self.push(HudEvent::PowerUps {
            speed_boost,
            invincible,
        });
    }

    fn show_combo_popup(&mut self, multiplier: u32, points: u64) {
        self.push(HudEvent::ComboPopup { multiplier, points });
    }

    fn show_level_up(&mut self, level: u32) {
        log::info!("LEVEL {}!", level);
        self.push(HudEvent::LevelUp(level));
    }

    fn show_power_up(&mut self, message: &str) {
        log::info!("{}", message);
        self.push(HudEvent::PowerUp(message.to_string()));
    }

    fn show_paused(&mut self, paused: bool) {
        self.push(HudEvent::Paused(paused));
    }

    fn show_victory(&mut self, summary: &GameSummary) {
        self.push(HudEvent::Victory(summary.clone()));
    }

    fn show_game_over(&mut self, summary: &GameSummary) {
        self.push(HudEvent::GameOver(summary.clone()));
    }

    fn hide_end_screens(&mut self) {
        self.push(HudEvent::EndScreensHidden);
    }

    fn notify(&mut self, notification: &Notification) {
        log::warn!("{}", notification.message);
        self.push(HudEvent::Notify(notification.clone()));
    }
}

/// Shared handles into the meadow collaborators
#[derive(Clone, Default)]
pub struct Watch {
    pub input: Rc<Cell<MovementInput>>,
    pub player_pos: Rc<Cell<Vec3>>,
    pub flashing: Rc<Cell<bool>>,
    pub damage_taken: Rc<Cell<u32>>,
    /// Clover ids hidden from the scene since the last reset
    pub hidden: Rc<RefCell<Vec<u32>>>,
    pub sounds: Rc<RefCell<Vec<SoundEffect>>>,
    pub hud: Rc<RefCell<Vec<HudEvent>>>,
    pub level: Rc<RefCell<LevelLog>>,
    pub ripples: Rc<Cell<u32>>,
    pub bursts: Rc<Cell<u32>>,
    pub frames_rendered: Rc<Cell<u64>>,
    pub frames_requested: Rc<Cell<u64>>,
    pub frames_cancelled: Rc<Cell<u64>>,
}

impl Watch {
    pub fn set_input(&self, input: MovementInput) {
        self.input.set(input);
    }

    pub fn teleport(&self, pos: Vec3) {
        self.player_pos.set(pos);
    }

    pub fn sound_count(&self, effect: SoundEffect) -> usize {
        self.sounds.borrow().iter().filter(|&&e| e == effect).count()
    }

    pub fn hud_count(&self, pred: impl Fn(&HudEvent) -> bool) -> usize {
        self.hud.borrow().iter().filter(|e| pred(*e)).count()
    }

    pub fn last_hud(&self, pred: impl Fn(&HudEvent) -> bool) -> Option<HudEvent> {
        self.hud.borrow().iter().rev().find(|e| pred(*e)).cloned()
    }
}

/// Wire a world into a full set of subsystems
pub fn build(world: World) -> (Subsystems, Watch) {
    let watch = Watch::default();
    watch.player_pos.set(world.player_start);

    let subsystems = Subsystems {
        input: Box::new(MeadowInput {
            current: watch.input.clone(),
        }),
        player: Box::new(MeadowPlayer {
            position: watch.player_pos.clone(),
            start: world.player_start,
            speed_multiplier: 1.0,
            flash_until: 0.0,
            flashing: watch.flashing.clone(),
            stride: 0.0,
            damage_taken: watch.damage_taken.clone(),
        }),
        clovers: Box::new(MeadowClovers {
            clovers: world.clovers.clone(),
            hidden: watch.hidden.clone(),
        }),
        collectibles: Box::new(MeadowCollectibles {
            initial: world.collectibles.clone(),
            items: world.collectibles.clone(),
        }),
        level: Box::new(MeadowLevel {
            enemies: world.enemies.clone(),
            bees: world.bees.clone(),
            spiders: world.spiders.clone(),
            slugs: world.slugs.clone(),
            next_id: 10_000,
            spawning: true,
            log: watch.level.clone(),
            initial: world,
        }),
        effects: Box::new(MeadowEffects {
            ripples: watch.ripples.clone(),
            bursts: watch.bursts.clone(),
        }),
        renderer: Box::new(MeadowRenderer {
            frames: watch.frames_rendered.clone(),
        }),
        scheduler: Box::new(MeadowScheduler {
            next_id: 0,
            requested: watch.frames_requested.clone(),
            cancelled: watch.frames_cancelled.clone(),
        }),
        audio: Box::new(RecordingAudio {
            played: watch.sounds.clone(),
        }),
        hud: Box::new(RecordingHud {
            events: watch.hud.clone(),
        }),
    };

    (subsystems, watch)
}

/// Steer toward the nearest clover that is still in the meadow
pub fn autopilot(player: Vec3, clovers: &[Clover]) -> MovementInput {
    let target = clovers
        .iter()
        .filter(|c| !c.collected)
        .min_by(|a, b| {
            a.position
                .distance_squared(player)
                .total_cmp(&b.position.distance_squared(player))
        });
    let Some(target) = target else {
        return MovementInput::NONE;
    };
    let delta = target.position - player;
    let dead_zone = 0.25;
    MovementInput {
        forward: delta.z < -dead_zone,
        backward: delta.z > dead_zone,
        left: delta.x < -dead_zone,
        right: delta.x > dead_zone,
    }
}
