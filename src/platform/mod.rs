//! Platform abstraction layer
//!
//! The core only talks to the outside world through these traits:
//! - Time and frame scheduling
//! - Input events
//! - Storage (LocalStorage on web)
//! - Scene-owned entities (player, clovers, collectibles, enemies)

pub mod entities;
pub mod input;
pub mod storage;
pub mod time;

pub use entities::{
    CloverField, Clover, Collectible, CollectibleKind, CollectiblesManager, Critter, Effects,
    EnemyManager, FrameRenderer, LevelManager, MushroomVariant, Player,
};
pub use input::{InputSource, MovementInput};
pub use storage::{MemoryStorage, ReportingStorage, Storage};
pub use time::{FrameClock, FrameHandle, FrameScheduler};
