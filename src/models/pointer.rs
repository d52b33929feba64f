use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
    Other,
}

/// A button press observed anywhere on screen.
#[derive(Debug, Clone, Copy)]
pub struct PointerPress {
    pub x: f64,
    pub y: f64,
    pub button: PointerButton,
    pub at: Instant,
}

impl PointerPress {
    pub fn primary(x: f64, y: f64, at: Instant) -> Self {
        Self {
            x,
            y,
            button: PointerButton::Primary,
            at,
        }
    }

    /// Straight-line distance in screen points.
    pub fn distance_to(&self, other: &PointerPress) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}
