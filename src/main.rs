//! Bugdom entry point
//!
//! On the web: wires the game loop to requestAnimationFrame, the keyboard, the
//! DOM HUD, Web Audio and LocalStorage. Natively: plays one autopiloted run
//! through the meadow and prints the result.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_game {
    use std::cell::{Cell, RefCell};
    use std::rc::{Rc, Weak};

    use wasm_bindgen::prelude::*;
    use web_sys::{Document, KeyboardEvent};

    use bugdom::audio::AudioManager;
    use bugdom::consts::TOTAL_CLOVERS;
    use bugdom::errors::{self, SharedErrorLog};
    use bugdom::meadow::{self, World};
    use bugdom::platform::storage::LocalStorage;
    use bugdom::platform::{
        FrameHandle, FrameScheduler, InputSource, MemoryStorage, MovementInput, ReportingStorage,
        Storage,
    };
    use bugdom::state::GameSummary;
    use bugdom::ui::{Hud, Notification};
    use bugdom::{GameLoop, GameStateManager, Settings};

    /// Same clock as the requestAnimationFrame timestamps
    fn now() -> f64 {
        web_sys::window()
            .and_then(|w| w.performance())
            .map(|p| p.now())
            .unwrap_or(0.0)
    }

    /// Keyboard state, written by the key listeners
    struct KeyboardInput {
        keys: Rc<Cell<MovementInput>>,
    }

    impl InputSource for KeyboardInput {
        fn movement_input(&mut self) -> MovementInput {
            self.keys.get()
        }
    }

    /// Schedules `GameLoop::frame` through requestAnimationFrame
    struct RafScheduler {
        game: Weak<RefCell<GameLoop>>,
    }

    impl FrameScheduler for RafScheduler {
        fn request_frame(&mut self) -> FrameHandle {
            let Some(window) = web_sys::window() else {
                return FrameHandle(0);
            };
            let game = self.game.clone();
            let closure = Closure::once(move |time: f64| {
                let Some(game) = game.upgrade() else { return };
                // Skip the frame rather than panic if something else holds the game
                if let Ok(mut g) = game.try_borrow_mut() {
                    g.frame(time);
                };
            });
            let id = window
                .request_animation_frame(closure.as_ref().unchecked_ref())
                .unwrap_or(0);
            closure.forget();
            FrameHandle(id as u64)
        }

        fn cancel_frame(&mut self, handle: FrameHandle) {
            if let Some(window) = web_sys::window() {
                let _ = window.cancel_animation_frame(handle.0 as i32);
            }
        }
    }

    /// HUD backed by plain DOM elements
    struct DomHud {
        document: Document,
    }

    impl DomHud {
        fn set_text(&self, id: &str, text: &str) {
            if let Some(el) = self.document.get_element_by_id(id) {
                el.set_text_content(Some(text));
            }
        }

        fn set_visible(&self, id: &str, visible: bool) {
            if let Some(el) = self.document.get_element_by_id(id) {
                let _ = el.set_attribute("class", if visible { "" } else { "hidden" });
            }
        }

        /// Show an element, then hide it again after `ms`
        fn flash(&self, id: &str, ms: u32) {
            self.set_visible(id, true);
            let Some(window) = web_sys::window() else { return };
            let document = self.document.clone();
            let id = id.to_string();
            let closure = Closure::once(move || {
                if let Some(el) = document.get_element_by_id(&id) {
                    let _ = el.set_attribute("class", "hidden");
                }
            });
            let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(
                closure.as_ref().unchecked_ref(),
                ms as i32,
            );
            closure.forget();
        }

        fn show_summary(&self, id: &str, summary: &GameSummary) {
            self.set_text(&format!("{}-score", id), &summary.score.to_string());
            self.set_text(
                &format!("{}-clovers", id),
                &format!("{}/{}", summary.clovers_collected, TOTAL_CLOVERS),
            );
            self.set_text(&format!("{}-level", id), &summary.level.to_string());
            self.set_text(
                &format!("{}-time", id),
                &format!("{:.0}s", summary.elapsed_ms / 1000.0),
            );
            self.set_visible(&format!("{}-new-high", id), summary.is_new_high_score);
            self.set_visible(id, true);
        }
    }

    impl Hud for DomHud {
        fn update_score(&mut self, score: u64, high_score: u64) {
            self.set_text("score", &score.to_string());
            self.set_text("high-score", &high_score.to_string());
        }

        fn update_clovers(&mut self, collected: u32, total: u32) {
            self.set_text("clovers", &format!("{}/{}", collected, total));
        }

        fn update_combo(&mut self, count: u32, multiplier: u32) {
            self.set_text("combo", &format!("{} (x{})", count, multiplier));
        }

        fn update_health(&mut self, health: u32, max_health: u32, extra_lives: u32) {
            self.set_text("health", &format!("{}/{}", health, max_health));
            self.set_text("lives", &extra_lives.to_string());
        }

        fn update_level(&mut self, level: u32) {
            self.set_text("level", &level.to_string());
        }

        fn update_power_ups(&mut self, speed_boost: bool, invincible: bool) {
            self.set_visible("speed-icon", speed_boost);
            self.set_visible("shield-icon", invincible);
        }

        fn show_combo_popup(&mut self, multiplier: u32, points: u64) {
            self.set_text("combo-popup", &format!("x{} +{}", multiplier, points));
            self.flash("combo-popup", 1000);
        }

        fn show_level_up(&mut self, level: u32) {
            self.set_text("level-up", &format!("Level {}!", level));
            self.flash("level-up", 2000);
        }

        fn show_power_up(&mut self, message: &str) {
            self.set_text("power-up", message);
            self.flash("power-up", 2000);
        }

        fn show_paused(&mut self, paused: bool) {
            self.set_visible("pause-menu", paused);
        }

        fn show_victory(&mut self, summary: &GameSummary) {
            self.show_summary("victory", summary);
        }

        fn show_game_over(&mut self, summary: &GameSummary) {
            self.show_summary("game-over", summary);
        }

        fn hide_end_screens(&mut self) {
            self.set_visible("victory", false);
            self.set_visible("game-over", false);
        }

        fn notify(&mut self, notification: &Notification) {
            self.set_text("notification", &notification.message);
            self.flash("notification", notification.duration_ms);
        }
    }

    fn open_storage(error_log: &SharedErrorLog) -> Box<dyn Storage> {
        match LocalStorage::open() {
            Ok(storage) => Box::new(ReportingStorage::new(storage, error_log.clone())),
            Err(e) => {
                log::warn!("{}; progress will not be saved", e);
                Box::new(MemoryStorage::new())
            }
        }
    }

    pub fn run() {
        console_error_panic_hook::set_once();
        if let Err(e) = console_log::init_with_level(log::Level::Info) {
            web_sys::console::error_1(&format!("Failed to init logger: {}", e).into());
        }

        let error_log = errors::shared_log();
        errors::install_panic_hook(error_log.clone());

        log::info!("Bugdom starting...");

        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            log::error!("No document, cannot start");
            return;
        };

        // Hide loading indicator
        if let Some(loading) = document.get_element_by_id("loading") {
            let _ = loading.set_attribute("class", "hidden");
        }

        let seed = js_sys::Date::now() as u64;
        let storage = open_storage(&error_log);
        let settings = Settings::load(storage.as_ref());
        let state = GameStateManager::new(storage);

        let keys = Rc::new(Cell::new(MovementInput::NONE));
        let mut audio = AudioManager::new();
        audio.resume();

        let (mut sys, _watch) = meadow::build(World::meadow(seed));
        sys.input = Box::new(KeyboardInput { keys: keys.clone() });
        sys.audio = Box::new(audio);
        sys.hud = Box::new(DomHud {
            document: document.clone(),
        });

        let game = Rc::new_cyclic(|weak: &Weak<RefCell<GameLoop>>| {
            sys.scheduler = Box::new(RafScheduler { game: weak.clone() });
            RefCell::new(GameLoop::new(state, sys, settings, error_log.clone(), seed))
        });

        log::info!("Game initialized with seed: {}", seed);

        setup_keyboard(game.clone(), keys);
        setup_auto_pause(game.clone(), &document);
        report_errors(Rc::downgrade(&game), error_log, document);

        game.borrow_mut().start(now());
        log::info!("Bugdom running!");
    }

    fn set_key(keys: &Cell<MovementInput>, key: &str, down: bool) -> bool {
        let mut input = keys.get();
        match key {
            "w" | "W" | "ArrowUp" => input.forward = down,
            "s" | "S" | "ArrowDown" => input.backward = down,
            "a" | "A" | "ArrowLeft" => input.left = down,
            "d" | "D" | "ArrowRight" => input.right = down,
            _ => return false,
        }
        keys.set(input);
        true
    }

    fn setup_keyboard(game: Rc<RefCell<GameLoop>>, keys: Rc<Cell<MovementInput>>) {
        let Some(window) = web_sys::window() else { return };

        {
            let keys = keys.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |event: KeyboardEvent| {
                let key = event.key();
                if set_key(&keys, &key, true) {
                    event.prevent_default();
                    return;
                }
                let Ok(mut g) = game.try_borrow_mut() else { return };
                let now = now();
                match key.as_str() {
                    "Escape" | "p" | "P" => {
                        g.toggle_pause(now);
                    }
                    "r" | "R" if g.state().is_game_over() => g.restart(now),
                    "1" => {
                        g.set_difficulty("easy");
                    }
                    "2" => {
                        g.set_difficulty("medium");
                    }
                    "3" => {
                        g.set_difficulty("hard");
                    }
                    _ => {}
                }
            });
            let _ = window
                .add_event_listener_with_callback("keydown", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        {
            let closure = Closure::<dyn FnMut(_)>::new(move |event: KeyboardEvent| {
                set_key(&keys, &event.key(), false);
            });
            let _ = window
                .add_event_listener_with_callback("keyup", closure.as_ref().unchecked_ref());
            closure.forget();
        }
    }

    fn setup_auto_pause(game: Rc<RefCell<GameLoop>>, document: &Document) {
        let Some(window) = web_sys::window() else { return };

        // Visibility change (tab switch, minimize)
        {
            let game = game.clone();
            let doc = document.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
                if doc.visibility_state() != web_sys::VisibilityState::Hidden {
                    return;
                }
                let Ok(mut g) = game.try_borrow_mut() else { return };
                if g.state().is_playing() {
                    g.toggle_pause(now());
                    log::info!("Auto-paused (tab hidden)");
                }
            });
            let _ = document.add_event_listener_with_callback(
                "visibilitychange",
                closure.as_ref().unchecked_ref(),
            );
            closure.forget();
        }

        // Window blur (click outside)
        {
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::FocusEvent| {
                let Ok(mut g) = game.try_borrow_mut() else { return };
                if g.settings().pause_on_blur && g.state().is_playing() {
                    g.toggle_pause(now());
                    log::info!("Auto-paused (window blur)");
                }
            });
            let _ = window
                .add_event_listener_with_callback("blur", closure.as_ref().unchecked_ref());
            closure.forget();
        }
    }

    /// Keep telling the player about errors once the game itself can't.
    ///
    /// A panic aborts the wasm instance mid-frame, so the game stays borrowed
    /// and never reaches its own notification. The hook has recorded the panic
    /// by then; this timer runs outside the game and shows it from the DOM.
    fn report_errors(game: Weak<RefCell<GameLoop>>, error_log: SharedErrorLog, document: Document) {
        let Some(window) = web_sys::window() else { return };
        let mut hud = DomHud { document };
        let mut seen = 0;
        let closure = Closure::<dyn FnMut()>::new(move || {
            let wedged = game.upgrade().is_none_or(|g| g.try_borrow_mut().is_err());
            let message = {
                let entries = errors::lock(&error_log);
                let total = entries.total_recorded();
                if total == seen {
                    return;
                }
                seen = total;
                match entries.latest() {
                    Some(latest) => {
                        log::warn!("{} error(s) recorded, latest: {}", total, latest.message);
                        latest.message.clone()
                    }
                    None => return,
                }
            };
            if wedged {
                hud.notify(&Notification::new(format!(
                    "The game stopped responding ({}). Reload the page to play again.",
                    message
                )));
            }
        });
        let _ = window.set_interval_with_callback_and_timeout_and_arguments_0(
            closure.as_ref().unchecked_ref(),
            1000,
        );
        closure.forget();
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn wasm_main() {
    wasm_game::run();
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    use bugdom::errors;
    use bugdom::meadow::{self, World};
    use bugdom::platform::{MemoryStorage, ReportingStorage};
    use bugdom::platform::time::now_ms;
    use bugdom::{GameLoop, GameStateManager, Settings};

    env_logger::init();
    log::info!("Bugdom (native) starting...");
    log::info!("Native mode plays an autopilot run, use `trunk serve` for the web version");

    let error_log = errors::shared_log();
    errors::install_panic_hook(error_log.clone());

    let seed = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| now_ms() as u64);

    let (sys, watch) = meadow::build(World::meadow(seed));
    let storage = ReportingStorage::new(MemoryStorage::new(), error_log.clone());
    let state = GameStateManager::new(Box::new(storage));
    let mut game = GameLoop::new(state, sys, Settings::default(), error_log.clone(), seed);

    // Ten simulated minutes at 60 fps
    let frame_ms = 1000.0 / 60.0;
    let max_frames = 60 * 60 * 10;
    let mut now = 0.0;
    game.start(now);
    for _ in 0..max_frames {
        if !game.is_running() {
            break;
        }
        now += frame_ms;
        let input = meadow::autopilot(
            game.subsystems().player.position(),
            game.subsystems().clovers.clovers(),
        );
        watch.set_input(input);
        game.frame(now);
    }
    game.stop();

    let summary = game.state().summary(now);
    log::info!("Run finished after {} frames", watch.frames_rendered.get());
    println!("\nSeed:       {}", seed);
    println!("Result:     {}", if summary.won { "victory" } else { "game over" });
    println!("Score:      {}", summary.score);
    println!(
        "Clovers:    {}/{}",
        summary.clovers_collected,
        bugdom::consts::TOTAL_CLOVERS
    );
    println!("Level:      {}", summary.level);
    println!("Time:       {:.1}s", summary.elapsed_ms / 1000.0);
    println!("Errors:     {}", errors::lock(&error_log).total_recorded());
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}
