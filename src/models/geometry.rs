use serde::{Deserialize, Serialize};

/// A screen area in global pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub top: u32,
    pub left: u32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    /// Square of side `size` centred on a pointer position. Coordinates left
    /// of or above the origin are pulled back to zero; the far edges are left
    /// for [`CaptureRegion::clip_to`] to trim against the real screen.
    pub fn centered_on(x: f64, y: f64, size: u32) -> Self {
        let half = f64::from(size / 2);
        let left = (x.round() - half).max(0.0) as u32;
        let top = (y.round() - half).max(0.0) as u32;
        Self::new(left, top, size, size)
    }

    pub fn right(&self) -> u64 {
        u64::from(self.left) + u64::from(self.width)
    }

    pub fn bottom(&self) -> u64 {
        u64::from(self.top) + u64::from(self.height)
    }

    /// Intersection with `screen`, or `None` when nothing of the region is
    /// visible on it.
    pub fn clip_to(&self, screen: &ScreenRect) -> Option<CaptureRegion> {
        let left = i64::from(self.left).max(i64::from(screen.x));
        let top = i64::from(self.top).max(i64::from(screen.y));
        let right = (self.right() as i64).min(screen.right());
        let bottom = (self.bottom() as i64).min(screen.bottom());

        if right <= left || bottom <= top {
            return None;
        }

        Some(CaptureRegion::new(
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }
}

/// Bounds of one physical display in global coordinates. Displays left of or
/// above the primary one have negative origins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScreenRect {
    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= i64::from(self.x) && x < self.right() && y >= i64::from(self.y) && y < self.bottom()
    }
}

/// Bounding box of an on-screen window, as reported by the window system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl WindowBounds {
    /// Edges count as inside.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}
