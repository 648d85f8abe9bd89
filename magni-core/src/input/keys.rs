//! Keyboard source, read from the terminal in raw mode or from a byte stream.

use super::{InputSource, PressedEvent};
use crate::command::{InputId, KEY_BACKSPACE, KEY_ENTER, KEY_ESCAPE, KEY_INTERRUPT, KEY_TAB};
use crate::error::SourceError;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseButton, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use log::{debug, trace, warn};
use std::io::{self, IsTerminal, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

type ByteStream = Box<dyn Read + Send>;

// =============================================================================
// EVENT CONVERSION
// =============================================================================

fn key_code(key: &KeyEvent) -> Option<u32> {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(KEY_INTERRUPT),
        KeyCode::Char(c) => Some(u32::from(c)),
        KeyCode::Enter => Some(KEY_ENTER),
        KeyCode::Esc => Some(KEY_ESCAPE),
        KeyCode::Tab => Some(KEY_TAB),
        KeyCode::Backspace => Some(KEY_BACKSPACE),
        _ => None,
    }
}

/// Map a terminal event to an input. Only key presses and mouse button
/// downs count; repeats, releases, motion and resizes are dropped.
fn terminal_input(event: &Event) -> Option<InputId> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => key_code(key).map(InputId::Key),
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => Some(InputId::Pointer(1)),
            MouseEventKind::Down(MouseButton::Middle) => Some(InputId::Pointer(2)),
            MouseEventKind::Down(MouseButton::Right) => Some(InputId::Pointer(3)),
            _ => None,
        },
        _ => None,
    }
}

// =============================================================================
// KEY SOURCE
// =============================================================================

enum Backend {
    /// The controlling terminal, switched to raw mode while acquired.
    Terminal {
        capture_mouse: bool,
        raw: bool,
        mouse: bool,
    },
    /// One key per byte, read on a helper thread.
    Stream {
        stream: Option<ByteStream>,
        rx: Option<Receiver<io::Result<u8>>>,
    },
}

/// Key presses from the terminal or from a byte stream.
///
/// On a terminal, raw mode is enabled on acquire so every key arrives as it
/// is pressed, without line buffering or echo, and restored on release.
/// Ctrl-C then arrives as key 3 instead of a signal. With mouse capture on,
/// clicks are reported as pointer buttons 1 to 3.
///
/// A byte stream yields one key-down per byte. Keys are edge-triggered, so
/// no debouncing is applied.
pub struct KeySource {
    name: String,
    backend: Backend,
}

impl KeySource {
    /// Read keys from `stream`, one per byte.
    pub fn new(name: impl Into<String>, stream: impl Read + Send + 'static) -> Self {
        Self {
            name: name.into(),
            backend: Backend::Stream {
                stream: Some(Box::new(stream)),
                rx: None,
            },
        }
    }

    /// Read keys from the controlling terminal in raw mode, with mouse
    /// capture.
    pub fn terminal() -> Self {
        Self {
            name: "terminal".to_string(),
            backend: Backend::Terminal {
                capture_mouse: true,
                raw: false,
                mouse: false,
            },
        }
    }

    /// Read keys from standard input: the terminal when stdin is one,
    /// otherwise the piped bytes.
    pub fn stdin() -> Self {
        if io::stdin().is_terminal() {
            Self::terminal()
        } else {
            Self::new("stdin", io::stdin())
        }
    }

    /// Enable or disable terminal mouse capture. No effect on byte streams.
    pub fn with_mouse(mut self, enabled: bool) -> Self {
        if let Backend::Terminal { capture_mouse, .. } = &mut self.backend {
            *capture_mouse = enabled;
        }
        self
    }

    fn unreadable(&self, reason: impl ToString) -> SourceError {
        SourceError::Unreadable {
            name: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    /// Undo raw mode and mouse capture. Both steps run even if one fails.
    fn restore_terminal(&mut self) -> io::Result<()> {
        let Backend::Terminal { raw, mouse, .. } = &mut self.backend else {
            return Ok(());
        };
        let mut result = Ok(());
        if *mouse {
            *mouse = false;
            result = execute!(io::stdout(), DisableMouseCapture);
        }
        if *raw {
            *raw = false;
            result = result.and(disable_raw_mode());
        }
        result
    }
}

fn pump_bytes(mut stream: ByteStream, tx: mpsc::Sender<io::Result<u8>>) {
    let mut buf = [0u8; 64];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => {
                for byte in &buf[..n] {
                    if tx.send(Ok(*byte)).is_err() {
                        return;
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        }
    }
}

impl InputSource for KeySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&mut self) -> Result<(), SourceError> {
        let name = self.name.clone();
        let acquire_error = |reason: String| SourceError::Acquire {
            name: name.clone(),
            reason,
        };
        match &mut self.backend {
            Backend::Terminal {
                capture_mouse,
                raw,
                mouse,
            } => {
                if *raw {
                    return Err(acquire_error("already acquired".into()));
                }
                enable_raw_mode().map_err(|e| acquire_error(e.to_string()))?;
                *raw = true;
                if *capture_mouse {
                    match execute!(io::stdout(), EnableMouseCapture) {
                        Ok(()) => *mouse = true,
                        Err(e) => warn!("{}: mouse capture unavailable: {}", name, e),
                    }
                }
            }
            Backend::Stream { stream, rx } => {
                let bytes = stream
                    .take()
                    .ok_or_else(|| acquire_error("already acquired".into()))?;
                let (tx, receiver) = mpsc::channel();
                thread::Builder::new()
                    .name(format!("{}-reader", name))
                    .spawn(move || pump_bytes(bytes, tx))
                    .map_err(|e| acquire_error(e.to_string()))?;
                *rx = Some(receiver);
            }
        }
        debug!("{} acquired", self.name);
        Ok(())
    }

    fn next_event(&mut self, timeout: Duration) -> Result<Option<PressedEvent>, SourceError> {
        let input = match &self.backend {
            Backend::Terminal { raw: false, .. } | Backend::Stream { rx: None, .. } => {
                return Err(self.unreadable("not acquired"));
            }
            Backend::Terminal { .. } => {
                if !event::poll(timeout).map_err(|e| self.unreadable(e))? {
                    return Ok(None);
                }
                let event = event::read().map_err(|e| self.unreadable(e))?;
                trace!("{} read {:?}", self.name, event);
                match terminal_input(&event) {
                    Some(input) => input,
                    None => return Ok(None),
                }
            }
            Backend::Stream { rx: Some(rx), .. } => match rx.recv_timeout(timeout) {
                Ok(Ok(byte)) => {
                    trace!("{} read byte {}", self.name, byte);
                    InputId::Key(u32::from(byte))
                }
                Ok(Err(e)) => return Err(self.unreadable(e)),
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SourceError::Disconnected(self.name.clone()));
                }
            },
        };
        Ok(Some(PressedEvent::now(input)))
    }

    fn release(&mut self) -> Result<(), SourceError> {
        if let Backend::Stream { rx, .. } = &mut self.backend {
            // the reader thread exits on its next byte once the receiver is gone
            *rx = None;
        }
        self.restore_terminal().map_err(|e| SourceError::Release {
            name: self.name.clone(),
            reason: e.to_string(),
        })
    }
}

impl Drop for KeySource {
    fn drop(&mut self) {
        if let Err(e) = self.restore_terminal() {
            warn!("{}: failed to restore terminal: {}", self.name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::MouseEvent;
    use std::io::Cursor;

    const WAIT: Duration = Duration::from_secs(1);

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn click(kind: MouseEventKind) -> Event {
        Event::Mouse(MouseEvent {
            kind,
            column: 10,
            row: 4,
            modifiers: KeyModifiers::NONE,
        })
    }

    #[test]
    fn test_key_source_emits_each_byte() {
        let mut src = KeySource::new("keys", Cursor::new(b"/\r".to_vec()));
        src.acquire().unwrap();

        let first = src.next_event(WAIT).unwrap().unwrap();
        assert_eq!(first.input, InputId::Key('/' as u32));
        let second = src.next_event(WAIT).unwrap().unwrap();
        assert_eq!(second.input, InputId::Key(KEY_ENTER));
    }

    #[test]
    fn test_key_source_end_of_stream_disconnects() {
        let mut src = KeySource::new("keys", Cursor::new(Vec::new()));
        src.acquire().unwrap();
        let err = src.next_event(WAIT).unwrap_err();
        assert!(matches!(err, SourceError::Disconnected(_)));
        assert!(!err.is_failure());
    }

    #[test]
    fn test_key_source_read_error_is_failure() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("device gone"))
            }
        }

        let mut src = KeySource::new("keys", Broken);
        src.acquire().unwrap();
        assert!(src.next_event(WAIT).unwrap_err().is_failure());
    }

    #[test]
    fn test_key_source_acquire_twice_fails() {
        let mut src = KeySource::new("keys", Cursor::new(Vec::new()));
        src.acquire().unwrap();
        assert!(src.acquire().is_err());
    }

    #[test]
    fn test_unacquired_terminal_is_unreadable() {
        let mut src = KeySource::terminal().with_mouse(false);
        assert!(matches!(
            src.next_event(Duration::ZERO),
            Err(SourceError::Unreadable { .. })
        ));
        // nothing was switched on, so release has nothing to undo
        assert!(src.release().is_ok());
    }

    #[test]
    fn test_terminal_keys_map_to_key_codes() {
        assert_eq!(terminal_input(&key(KeyCode::Enter)), Some(InputId::Key(KEY_ENTER)));
        assert_eq!(terminal_input(&key(KeyCode::Esc)), Some(InputId::Key(KEY_ESCAPE)));
        assert_eq!(terminal_input(&key(KeyCode::Char('7'))), Some(InputId::Key('7' as u32)));
        assert_eq!(terminal_input(&key(KeyCode::Char('/'))), Some(InputId::Key('/' as u32)));
        assert_eq!(terminal_input(&key(KeyCode::Up)), None);

        let interrupt = Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert_eq!(terminal_input(&interrupt), Some(InputId::Key(KEY_INTERRUPT)));
    }

    #[test]
    fn test_terminal_key_release_and_repeat_ignored() {
        for kind in [KeyEventKind::Release, KeyEventKind::Repeat] {
            let event = Event::Key(KeyEvent::new_with_kind(
                KeyCode::Enter,
                KeyModifiers::NONE,
                kind,
            ));
            assert_eq!(terminal_input(&event), None);
        }
        assert_eq!(terminal_input(&Event::Resize(80, 24)), None);
    }

    #[test]
    fn test_mouse_clicks_map_to_pointer_buttons() {
        assert_eq!(
            terminal_input(&click(MouseEventKind::Down(MouseButton::Left))),
            Some(InputId::Pointer(1))
        );
        assert_eq!(
            terminal_input(&click(MouseEventKind::Down(MouseButton::Right))),
            Some(InputId::Pointer(3))
        );
        assert_eq!(terminal_input(&click(MouseEventKind::Up(MouseButton::Left))), None);
        assert_eq!(terminal_input(&click(MouseEventKind::Moved)), None);
    }
}
