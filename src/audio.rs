//! Sound effects
//!
//! The core fires [`SoundEffect`]s at an [`AudioSink`] and forgets about them.
//! In the browser, [`AudioManager`] synthesizes them with the Web Audio API -
//! no external files needed.

/// Sound effect types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundEffect {
    /// Three-leaf clover picked up
    CloverCollect,
    /// Four-leaf clover picked up
    FourLeafCollect,
    /// Mushroom power-up
    PowerUp,
    Coin,
    BuddyBug,
    /// Bug got hurt
    Hit,
    /// Extra life spent instead of dying
    ExtraLife,
    LevelUp,
    Victory,
    GameOver,
    /// New high score
    HighScore,
}

/// Fire-and-forget audio output
pub trait AudioSink {
    fn play(&mut self, effect: SoundEffect);
    fn set_volume(&mut self, _volume: f32) {}
}

#[cfg(target_arch = "wasm32")]
pub use web::AudioManager;

#[cfg(target_arch = "wasm32")]
mod web {
    use web_sys::{AudioContext, GainNode, OscillatorNode, OscillatorType};

    use super::{AudioSink, SoundEffect};

    /// Audio manager for the game
    pub struct AudioManager {
        ctx: Option<AudioContext>,
        volume: f32,
    }

    impl Default for AudioManager {
        fn default() -> Self {
            Self::new()
        }
    }

    impl AudioManager {
        pub fn new() -> Self {
            // Try to create audio context (may fail if not in secure context)
            let ctx = AudioContext::new().ok();
            if ctx.is_none() {
                log::warn!("Failed to create AudioContext - audio disabled");
            }
            Self { ctx, volume: 0.8 }
        }

        /// Resume audio context (required after user gesture)
        pub fn resume(&self) {
            if let Some(ctx) = &self.ctx {
                let _ = ctx.resume();
            }
        }

        /// Create an oscillator with gain envelope
        fn create_osc(
            &self,
            ctx: &AudioContext,
            freq: f32,
            osc_type: OscillatorType,
        ) -> Option<(OscillatorNode, GainNode)> {
            let osc = ctx.create_oscillator().ok()?;
            let gain = ctx.create_gain().ok()?;

            osc.set_type(osc_type);
            osc.frequency().set_value(freq);
            osc.connect_with_audio_node(&gain).ok()?;
            gain.connect_with_audio_node(&ctx.destination()).ok()?;

            Some((osc, gain))
        }

        /// One enveloped note starting `delay` seconds from now
        fn note(
            &self,
            ctx: &AudioContext,
            freq: f32,
            osc_type: OscillatorType,
            level: f32,
            delay: f64,
            len: f64,
        ) {
            let Some((osc, gain)) = self.create_osc(ctx, freq, osc_type) else {
                return;
            };
            let t = ctx.current_time() + delay;

            gain.gain().set_value_at_time(0.0, ctx.current_time()).ok();
            gain.gain().set_value_at_time(self.volume * level, t).ok();
            gain.gain()
                .exponential_ramp_to_value_at_time(0.01, t + len)
                .ok();

            osc.start_with_when(t).ok();
            osc.stop_with_when(t + len + 0.02).ok();
        }

        /// Rising or falling run of notes
        fn arpeggio(
            &self,
            ctx: &AudioContext,
            freqs: &[f32],
            osc_type: OscillatorType,
            level: f32,
            step: f64,
        ) {
            for (i, &freq) in freqs.iter().enumerate() {
                self.note(ctx, freq, osc_type, level, i as f64 * step, step * 1.5);
            }
        }
    }

    impl AudioSink for AudioManager {
        fn play(&mut self, effect: SoundEffect) {
            if self.volume <= 0.0 {
                return;
            }

            let Some(ctx) = &self.ctx else { return };

            // Resume context if suspended (browsers require user gesture)
            if ctx.state() == web_sys::AudioContextState::Suspended {
                let _ = ctx.resume();
            }

            use OscillatorType::*;
            match effect {
                SoundEffect::CloverCollect => self.note(ctx, 880.0, Sine, 0.4, 0.0, 0.12),
                SoundEffect::FourLeafCollect => {
                    self.arpeggio(ctx, &[880.0, 1108.7, 1318.5], Sine, 0.4, 0.06)
                }
                SoundEffect::PowerUp => {
                    self.arpeggio(ctx, &[440.0, 554.4, 659.3, 880.0], Triangle, 0.35, 0.07)
                }
                SoundEffect::Coin => {
                    self.note(ctx, 987.8, Square, 0.2, 0.0, 0.06);
                    self.note(ctx, 1318.5, Square, 0.2, 0.06, 0.2);
                }
                SoundEffect::BuddyBug => self.arpeggio(ctx, &[659.3, 784.0], Triangle, 0.35, 0.1),
                SoundEffect::Hit => self.note(ctx, 110.0, Sawtooth, 0.5, 0.0, 0.2),
                SoundEffect::ExtraLife => {
                    self.arpeggio(ctx, &[523.3, 659.3, 784.0, 1046.5], Square, 0.25, 0.08)
                }
                SoundEffect::LevelUp => {
                    self.arpeggio(ctx, &[392.0, 523.3, 659.3, 784.0], Triangle, 0.4, 0.1)
                }
                SoundEffect::Victory => self.arpeggio(
                    ctx,
                    &[523.3, 659.3, 784.0, 1046.5, 784.0, 1046.5],
                    Triangle,
                    0.45,
                    0.14,
                ),
                SoundEffect::GameOver => {
                    self.arpeggio(ctx, &[392.0, 329.6, 261.6, 196.0], Sawtooth, 0.35, 0.2)
                }
                SoundEffect::HighScore => {
                    self.arpeggio(ctx, &[784.0, 987.8, 1174.7, 1568.0], Sine, 0.4, 0.09)
                }
            }
        }

        fn set_volume(&mut self, volume: f32) {
            self.volume = volume.clamp(0.0, 1.0);
        }
    }
}
