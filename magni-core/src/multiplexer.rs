//! Merges input sources into one command queue.
//!
//! Each source runs on its own pump thread. A pump polls its source, looks the
//! input up in the shared [`BindingTable`] and pushes one [`Dispatch`] per
//! bound activation onto a single queue. The controller is the only consumer,
//! so commands are applied one at a time. Order is kept per source; events
//! from different sources interleave in whatever order the pumps deliver them.

use crate::command::{BindingTable, Command};
use crate::error::SourceError;
use crate::input::InputSource;
use log::{debug, error, trace, warn};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A message on the command queue.
#[derive(Debug)]
pub enum Dispatch {
    /// A bound input produced a command.
    Command {
        /// Name of the producing source or injector.
        source: String,
        /// The command.
        command: Command,
    },
    /// A source stopped producing events.
    SourceEnded {
        /// Name of the source.
        source: String,
        /// Why it ended.
        error: SourceError,
    },
}

/// Pushes commands onto the queue from outside any input source, e.g. from a
/// signal handler.
#[derive(Debug, Clone)]
pub struct CommandInjector {
    name: String,
    tx: Sender<Dispatch>,
}

impl CommandInjector {
    /// Queue `command`. Returns `false` once the controller has stopped.
    pub fn send(&self, command: Command) -> bool {
        self.tx
            .send(Dispatch::Command {
                source: self.name.clone(),
                command,
            })
            .is_ok()
    }

    /// Queue [`Command::Quit`].
    pub fn quit(&self) -> bool {
        self.send(Command::Quit)
    }
}

type Pump = JoinHandle<Option<Box<dyn InputSource>>>;
type Handoff = Sender<Box<dyn InputSource>>;

/// The input multiplexer.
pub struct InputMultiplexer {
    bindings: Arc<BindingTable>,
    poll_interval: Duration,
    tx: Sender<Dispatch>,
    rx: Receiver<Dispatch>,
    stop: Arc<AtomicBool>,
    pumps: Vec<(String, Pump)>,
}

impl InputMultiplexer {
    /// Create a multiplexer. Pumps wake at least every `poll_interval` to
    /// check for shutdown.
    pub fn new(bindings: BindingTable, poll_interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            bindings: Arc::new(bindings),
            poll_interval,
            tx,
            rx,
            stop: Arc::new(AtomicBool::new(false)),
            pumps: Vec::new(),
        }
    }

    /// A handle for queueing commands directly.
    pub fn injector(&self, name: impl Into<String>) -> CommandInjector {
        CommandInjector {
            name: name.into(),
            tx: self.tx.clone(),
        }
    }

    /// Start pumping an acquired source.
    ///
    /// The source is handed to the pump thread only once that thread exists,
    /// so a failed spawn leaves it here to be released.
    ///
    /// # Errors
    /// Returns an error if the pump thread cannot be spawned. The source has
    /// been released by then.
    pub fn spawn(&mut self, source: Box<dyn InputSource>) -> Result<(), SourceError> {
        let name = source.name().to_string();
        let bindings = Arc::clone(&self.bindings);
        let tx = self.tx.clone();
        let stop = Arc::clone(&self.stop);
        let poll_interval = self.poll_interval;
        let (handoff, inbox) = mpsc::channel::<Box<dyn InputSource>>();

        let spawned = thread::Builder::new()
            .name(format!("pump-{name}"))
            .spawn(move || {
                let source = inbox.recv().ok()?;
                Some(pump(source, &bindings, &tx, &stop, poll_interval))
            })
            .map(|handle| (handle, handoff));
        self.adopt(name, source, spawned)
    }

    fn adopt(
        &mut self,
        name: String,
        source: Box<dyn InputSource>,
        spawned: io::Result<(Pump, Handoff)>,
    ) -> Result<(), SourceError> {
        let (mut source, reason) = match spawned {
            Ok((handle, handoff)) => match handoff.send(source) {
                Ok(()) => {
                    debug!("pumping {}", name);
                    self.pumps.push((name, handle));
                    return Ok(());
                }
                Err(mpsc::SendError(source)) => {
                    (source, "pump exited before taking its source".to_string())
                }
            },
            Err(e) => (source, format!("failed to spawn pump: {e}")),
        };
        if let Err(e) = source.release() {
            warn!("{}", e);
        }
        Err(SourceError::Acquire { name, reason })
    }

    /// Number of sources handed to [`spawn`](Self::spawn).
    pub fn source_count(&self) -> usize {
        self.pumps.len()
    }

    /// Block until the next message.
    pub fn recv(&self) -> Option<Dispatch> {
        self.rx.recv().ok()
    }

    /// Discard every queued message, returning how many commands were dropped.
    pub fn discard_pending(&self) -> usize {
        self.rx
            .try_iter()
            .filter(|dispatch| matches!(dispatch, Dispatch::Command { .. }))
            .count()
    }

    /// Stop every pump and hand back the sources for release.
    ///
    /// Returns once each pump has noticed the stop flag, which takes at most
    /// one poll interval. A pump that panicked loses its source; that is
    /// logged and the rest are still returned.
    pub fn shutdown(&mut self) -> Vec<Box<dyn InputSource>> {
        self.stop.store(true, Ordering::SeqCst);
        let mut sources = Vec::with_capacity(self.pumps.len());
        for (name, handle) in self.pumps.drain(..) {
            match handle.join() {
                Ok(Some(source)) => sources.push(source),
                Ok(None) => debug!("pump for {} never took its source", name),
                Err(_) => error!("pump for {} panicked; its source cannot be released", name),
            }
        }
        sources
    }
}

impl Drop for InputMultiplexer {
    fn drop(&mut self) {
        if !self.pumps.is_empty() {
            warn!("multiplexer dropped with {} running pump(s)", self.pumps.len());
            self.stop.store(true, Ordering::SeqCst);
        }
    }
}

fn pump(
    mut source: Box<dyn InputSource>,
    bindings: &BindingTable,
    tx: &Sender<Dispatch>,
    stop: &AtomicBool,
    poll_interval: Duration,
) -> Box<dyn InputSource> {
    let name = source.name().to_string();
    while !stop.load(Ordering::SeqCst) {
        match source.next_event(poll_interval) {
            Ok(Some(event)) => match bindings.lookup(event.input) {
                Some(command) => {
                    trace!("{}: {} -> {:?}", name, event.input, command);
                    let dispatch = Dispatch::Command {
                        source: name.clone(),
                        command,
                    };
                    if tx.send(dispatch).is_err() {
                        break;
                    }
                }
                None => trace!("{}: {} is not bound", name, event.input),
            },
            Ok(None) => {}
            Err(error) => {
                let _ = tx.send(Dispatch::SourceEnded {
                    source: name.clone(),
                    error,
                });
                break;
            }
        }
    }
    source
}
