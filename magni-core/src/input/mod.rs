//! Input sources.
//!
//! An [`InputSource`] turns one physical device into a stream of
//! [`PressedEvent`]s. Sources are polled with a timeout so the multiplexer can
//! stop them promptly on shutdown.

mod debounce;
mod gpio;
mod keys;
mod pointer;
mod scripted;

pub use debounce::{DebounceRecord, Debouncer, Level, Trigger};
pub use gpio::{GpioSource, LevelReader, SysfsPin};
pub use keys::KeySource;
pub use pointer::PointerSource;
pub use scripted::{ScriptedFeed, ScriptedSource};

use crate::command::InputId;
use crate::error::SourceError;
use std::time::{Duration, Instant};

/// One clean activation of a physical input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressedEvent {
    /// The input that was activated.
    pub input: InputId,
    /// When the activation was observed.
    pub at: Instant,
}

impl PressedEvent {
    /// An activation observed now.
    pub fn now(input: InputId) -> Self {
        Self {
            input,
            at: Instant::now(),
        }
    }
}

/// Trait for input devices.
pub trait InputSource: Send {
    /// Source name for logs.
    fn name(&self) -> &str;

    /// Open the underlying OS handle.
    fn acquire(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Wait up to `timeout` for the next activation.
    ///
    /// Returns `Ok(None)` when nothing happened in time. Any error ends the
    /// source; [`SourceError::Disconnected`] marks a clean end of input.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<PressedEvent>, SourceError>;

    /// Release the underlying OS handle.
    fn release(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}
