use super::StatusSink;
use crate::models::WindowBounds;

/// Status sink for running without the floating window: every update goes to
/// the log, and the configured window rectangle is reported as its bounds so
/// clicks over that screen area are still ignored.
pub struct ConsoleStatus {
    bounds: Option<WindowBounds>,
}

impl ConsoleStatus {
    pub fn new(bounds: Option<WindowBounds>) -> Self {
        Self { bounds }
    }
}

impl StatusSink for ConsoleStatus {
    fn update_status(&self, message: &str) {
        log::info!("[status] {message}");
    }

    fn window_bounds(&self) -> Option<WindowBounds> {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_configured_bounds() {
        let bounds = WindowBounds {
            x: 10.0,
            y: 10.0,
            width: 200.0,
            height: 70.0,
        };
        let status = ConsoleStatus::new(Some(bounds));
        status.update_status("Waiting for user search...");
        assert_eq!(status.window_bounds(), Some(bounds));
        assert!(ConsoleStatus::new(None).window_bounds().is_none());
    }
}
