//! In-memory input source for tests and simulations.

use super::{InputSource, PressedEvent};
use crate::command::InputId;
use crate::error::SourceError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

enum Script {
    Press(InputId),
    Fail(String),
}

/// Feeding end of a [`ScriptedSource`].
///
/// Dropping every feed disconnects the source once its queue is drained.
#[derive(Clone)]
pub struct ScriptedFeed {
    tx: Sender<Script>,
    acquired: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

impl ScriptedFeed {
    /// Queue an activation of `input`.
    pub fn press(&self, input: InputId) {
        let _ = self.tx.send(Script::Press(input));
    }

    /// Queue a read failure; the source ends when it reaches it.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.tx.send(Script::Fail(reason.into()));
    }

    /// Whether the source has been acquired.
    pub fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Whether the source has been released.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// An input source driven from code.
///
/// # Example
///
/// ```
/// use magni_core::{InputId, InputSource, ScriptedSource};
/// use std::time::Duration;
///
/// let (feed, mut source) = ScriptedSource::channel("buttons");
/// feed.press(InputId::Pin(4));
/// let event = source.next_event(Duration::from_millis(10)).unwrap();
/// assert_eq!(event.map(|e| e.input), Some(InputId::Pin(4)));
/// ```
pub struct ScriptedSource {
    name: String,
    rx: Receiver<Script>,
    acquired: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
    fail_acquire: bool,
    fail_release: bool,
}

impl ScriptedSource {
    /// Create a source and its feed.
    pub fn channel(name: impl Into<String>) -> (ScriptedFeed, ScriptedSource) {
        let (tx, rx) = mpsc::channel();
        let acquired = Arc::new(AtomicBool::new(false));
        let released = Arc::new(AtomicBool::new(false));
        let feed = ScriptedFeed {
            tx,
            acquired: Arc::clone(&acquired),
            released: Arc::clone(&released),
        };
        let source = ScriptedSource {
            name: name.into(),
            rx,
            acquired,
            released,
            fail_acquire: false,
            fail_release: false,
        };
        (feed, source)
    }

    /// Make [`InputSource::acquire`] fail.
    pub fn failing_acquire(mut self) -> Self {
        self.fail_acquire = true;
        self
    }

    /// Make [`InputSource::release`] fail (it is still marked released).
    pub fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }
}

impl InputSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&mut self) -> Result<(), SourceError> {
        if self.fail_acquire {
            return Err(SourceError::Acquire {
                name: self.name.clone(),
                reason: "scripted failure".into(),
            });
        }
        self.acquired.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn next_event(&mut self, timeout: Duration) -> Result<Option<PressedEvent>, SourceError> {
        match self.rx.recv_timeout(timeout) {
            Ok(Script::Press(input)) => Ok(Some(PressedEvent::now(input))),
            Ok(Script::Fail(reason)) => Err(SourceError::Unreadable {
                name: self.name.clone(),
                reason,
            }),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SourceError::Disconnected(self.name.clone())),
        }
    }

    fn release(&mut self) -> Result<(), SourceError> {
        self.released.store(true, Ordering::SeqCst);
        if self.fail_release {
            return Err(SourceError::Release {
                name: self.name.clone(),
                reason: "scripted failure".into(),
            });
        }
        Ok(())
    }
}
