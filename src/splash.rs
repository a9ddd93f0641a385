use std::time::Duration;

use slint::{Timer, TimerMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Splash,
    Main,
}

/// Screen history. The last entry is what is on display.
#[derive(Debug, Clone)]
pub struct Navigator {
    history: Vec<Screen>,
}

impl Navigator {
    pub fn new(initial: Screen) -> Self {
        Self {
            history: vec![initial],
        }
    }

    pub fn current(&self) -> Screen {
        self.history.last().copied().unwrap_or(Screen::Main)
    }

    /// Shows `screen` and forgets everything before it, so back navigation
    /// cannot return to a finished screen.
    pub fn replace_clearing_history(&mut self, screen: Screen) {
        self.history.clear();
        self.history.push(screen);
    }

    /// Pops the current screen. `None` means there is nothing to go back to
    /// and the app should exit.
    pub fn back(&mut self) -> Option<Screen> {
        if self.history.len() <= 1 {
            return None;
        }
        self.history.pop();
        Some(self.current())
    }
}

/// One-shot delayed transition off the splash screen.
///
/// The timer belongs to the router: dropping it (or calling [`cancel`])
/// before the delay elapses means the transition never runs.
///
/// [`cancel`]: SplashRouter::cancel
pub struct SplashRouter {
    timer: Timer,
}

impl SplashRouter {
    pub fn start(delay: Duration, on_elapsed: impl FnOnce() + 'static) -> Self {
        let timer = Timer::default();
        let mut on_elapsed = Some(on_elapsed);
        timer.start(TimerMode::SingleShot, delay, move || {
            if let Some(route) = on_elapsed.take() {
                route();
            }
        });
        Self { timer }
    }

    pub fn is_pending(&self) -> bool {
        self.timer.running()
    }

    pub fn cancel(&self) {
        self.timer.stop();
    }
}

impl Drop for SplashRouter {
    fn drop(&mut self) {
        self.cancel();
    }
}
