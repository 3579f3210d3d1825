//! Input synthesis for the catch and recast gestures (enigo).

use anyhow::{anyhow, bail, Context, Result};
use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use tracing::{debug, warn};

/// Performs the two gestures of a fishing cycle.
pub trait ActionExecutor {
    /// Modifier-held secondary click at a global screen coordinate.
    fn catch_at(&mut self, x: i32, y: i32) -> Result<()>;
    /// Single key press that casts the line again.
    fn recast(&mut self) -> Result<()>;
}

pub struct EnigoExecutor {
    enigo: Enigo,
    recast_key: char,
}

impl EnigoExecutor {
    pub fn new(recast_key: char) -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| anyhow!("Failed to initialise input injection: {e}"))?;
        Ok(Self { enigo, recast_key })
    }

    /// Refuses to act while the cursor is parked in the top-left corner.
    fn check_failsafe(&self) -> Result<()> {
        let (x, y) = self
            .enigo
            .location()
            .map_err(|e| anyhow!("Failed to read cursor position: {e}"))?;
        if is_failsafe_corner(x, y) {
            warn!(x, y, "failsafe corner reached");
            bail!("Failsafe triggered: mouse cursor moved to the top-left corner");
        }
        Ok(())
    }
}

fn is_failsafe_corner(x: i32, y: i32) -> bool {
    x == 0 && y == 0
}

impl ActionExecutor for EnigoExecutor {
    fn catch_at(&mut self, x: i32, y: i32) -> Result<()> {
        self.check_failsafe()?;
        debug!(x, y, "shift + right click");

        self.enigo
            .key(Key::Shift, Direction::Press)
            .map_err(|e| anyhow!("Failed to press shift: {e}"))?;
        let clicked = self
            .enigo
            .move_mouse(x, y, Coordinate::Abs)
            .and_then(|_| self.enigo.button(Button::Right, Direction::Click));
        // Shift must come back up even when the click failed.
        let released = self.enigo.key(Key::Shift, Direction::Release);

        clicked.map_err(|e| anyhow!("Failed to right click at ({x}, {y}): {e}"))?;
        released.map_err(|e| anyhow!("Failed to release shift: {e}"))?;
        Ok(())
    }

    fn recast(&mut self) -> Result<()> {
        self.check_failsafe()?;
        debug!(key = %self.recast_key, "recast key press");
        self.enigo
            .key(Key::Unicode(self.recast_key), Direction::Click)
            .map_err(|e| anyhow!("Failed to press recast key '{}': {e}", self.recast_key))
            .context("Recast failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failsafe_corner() {
        assert!(is_failsafe_corner(0, 0));
        assert!(!is_failsafe_corner(-1920, 0));
        assert!(!is_failsafe_corner(0, 10));
        assert!(!is_failsafe_corner(640, 480));
    }

    #[test]
    #[ignore = "requires a desktop session and accessibility permissions"]
    fn test_recast_presses_key() {
        let mut exec = EnigoExecutor::new('1').expect("enigo init failed");
        exec.recast().unwrap();
    }
}
