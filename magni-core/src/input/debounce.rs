//! Debouncing for level-sampled inputs.

use log::trace;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Logical level of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Line reads 0.
    Low,
    /// Line reads 1.
    High,
}

impl Level {
    /// Level from a raw bit.
    pub fn from_bit(bit: bool) -> Self {
        if bit { Level::High } else { Level::Low }
    }
}

/// Which edge of a button press is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Report when the button goes down.
    Press,
    /// Report when the button comes back up.
    #[default]
    Release,
}

/// Last accepted level of one input and when it changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceRecord {
    /// Last accepted level.
    pub level: Level,
    /// When that level was accepted; `None` for the initial idle level.
    pub changed_at: Option<Instant>,
}

/// Turns raw level samples into clean activations.
///
/// A sample is accepted only if it differs from the recorded level and at
/// least `window` has passed since the last accepted change. Rejected samples
/// leave the record untouched, so bounce inside the window collapses into the
/// first transition.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    pressed: Level,
    trigger: Trigger,
    record: DebounceRecord,
}

impl Debouncer {
    /// Create a debouncer for a button that idles released.
    ///
    /// With `active_low` the line reads `Low` while pressed (pull-up wiring).
    pub fn new(window: Duration, active_low: bool, trigger: Trigger) -> Self {
        let pressed = if active_low { Level::Low } else { Level::High };
        let idle = if active_low { Level::High } else { Level::Low };
        Self {
            window,
            pressed,
            trigger,
            record: DebounceRecord {
                level: idle,
                changed_at: None,
            },
        }
    }

    /// The current record.
    pub fn record(&self) -> DebounceRecord {
        self.record
    }

    /// Feed one sample taken at `at`.
    ///
    /// Returns `true` when this sample completes an activation on the
    /// configured trigger edge.
    pub fn update(&mut self, level: Level, at: Instant) -> bool {
        if level == self.record.level {
            return false;
        }
        if let Some(changed_at) = self.record.changed_at {
            let elapsed = at.saturating_duration_since(changed_at);
            if elapsed < self.window {
                trace!("bounce rejected: {:?} after {:?}", level, elapsed);
                return false;
            }
        }
        self.record = DebounceRecord {
            level,
            changed_at: Some(at),
        };
        match self.trigger {
            Trigger::Press => level == self.pressed,
            Trigger::Release => level != self.pressed,
        }
    }
}
