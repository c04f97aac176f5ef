//! Best score persistence
//!
//! Stored in LocalStorage as a plain decimal string.

use crate::platform::Storage;

/// Best score across sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HighScore {
    best: u64,
}

impl HighScore {
    /// LocalStorage key
    pub const STORAGE_KEY: &'static str = "bugdom_highscore";

    pub fn new(best: u64) -> Self {
        Self { best }
    }

    pub fn best(&self) -> u64 {
        self.best
    }

    /// Check if a score beats the stored best
    pub fn qualifies(&self, score: u64) -> bool {
        score > self.best
    }

    /// Record a score; returns true if it became the new best
    pub fn record(&mut self, score: u64) -> bool {
        if !self.qualifies(score) {
            return false;
        }
        self.best = score;
        true
    }

    /// Parse a stored value; anything but a non-negative integer counts as missing
    pub fn parse(raw: &str) -> Option<u64> {
        raw.trim().parse::<u64>().ok()
    }

    /// Load the best score, defaulting to 0 on missing or corrupt data
    pub fn load(storage: &dyn Storage) -> Self {
        match storage.get_item(Self::STORAGE_KEY) {
            Ok(Some(raw)) => match Self::parse(&raw) {
                Some(best) => {
                    log::info!("Loaded high score {}", best);
                    Self::new(best)
                }
                None => {
                    log::warn!("Ignoring corrupt high score {:?}", raw);
                    Self::default()
                }
            },
            Ok(None) => {
                log::info!("No high score found, starting fresh");
                Self::default()
            }
            Err(e) => {
                log::warn!("Could not load high score: {}", e);
                Self::default()
            }
        }
    }

    /// Save the best score; failures are logged and skipped
    pub fn save(&self, storage: &mut dyn Storage) {
        match storage.set_item(Self::STORAGE_KEY, &self.best.to_string()) {
            Ok(()) => log::info!("High score saved ({})", self.best),
            Err(e) => log::warn!("Could not save high score: {}", e),
        }
    }
}
