//! Lifecycle state machine.
//!
//! ```text
//! Created --serve--> Serving --shutdown--> ShuttingDown --drained--> Stopped
//!                       \______________listener failure_____________/
//! ```
//!
//! Transitions only move forward. The cell is an atomic so the signal task,
//! the accept loop and callers of `shutdown` can race on it safely.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Created = 0,
    Serving = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LifecycleState::Created,
            1 => LifecycleState::Serving,
            2 => LifecycleState::ShuttingDown,
            _ => LifecycleState::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Created => "created",
            LifecycleState::Serving => "serving",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic holder of a [`LifecycleState`].
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(LifecycleState::Created as u8))
    }

    pub fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Move from `from` to `to`. Fails with the actual state otherwise.
    pub fn transition(
        &self,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<(), LifecycleState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(LifecycleState::from_u8)
    }

    /// Move forward to `to` from whatever earlier state the cell holds.
    ///
    /// Returns the state that was replaced, or `None` if the cell was
    /// already at or past `to`.
    pub fn advance(&self, to: LifecycleState) -> Option<LifecycleState> {
        let mut current = self.0.load(Ordering::SeqCst);
        loop {
            if current >= to as u8 {
                return None;
            }
            match self
                .0
                .compare_exchange(current, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Some(LifecycleState::from_u8(current)),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_requires_expected_state() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), LifecycleState::Created);
        assert!(cell
            .transition(LifecycleState::Created, LifecycleState::Serving)
            .is_ok());
        assert_eq!(
            cell.transition(LifecycleState::Created, LifecycleState::Serving),
            Err(LifecycleState::Serving)
        );
    }

    #[test]
    fn advance_never_moves_backwards() {
        let cell = StateCell::new();
        assert_eq!(
            cell.advance(LifecycleState::Stopped),
            Some(LifecycleState::Created)
        );
        assert_eq!(cell.advance(LifecycleState::ShuttingDown), None);
        assert_eq!(cell.get(), LifecycleState::Stopped);
    }
}
