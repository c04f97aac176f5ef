//! Unified movement input (keyboard and touch merged by the host)

/// Directional intent for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MovementInput {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
}

impl MovementInput {
    pub const NONE: MovementInput = MovementInput {
        forward: false,
        backward: false,
        left: false,
        right: false,
    };

    /// True if any direction is held
    pub fn is_moving(&self) -> bool {
        self.forward || self.backward || self.left || self.right
    }

    /// Merge two sources (e.g. keyboard and on-screen joystick)
    pub fn merge(self, other: MovementInput) -> Self {
        Self {
            forward: self.forward || other.forward,
            backward: self.backward || other.backward,
            left: self.left || other.left,
            right: self.right || other.right,
        }
    }
}

/// Anything that can report the player's current movement intent
pub trait InputSource {
    fn movement_input(&mut self) -> MovementInput;
}
