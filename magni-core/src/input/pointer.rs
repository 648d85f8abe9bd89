//! Pointer buttons read from a Linux evdev device.

use super::{InputSource, PressedEvent};
use crate::command::InputId;
use crate::error::SourceError;
use log::{debug, trace};
use std::ffi::c_long;
use std::fs::File;
use std::io::{self, Read};
use std::mem::size_of;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

// struct input_event { struct timeval time; __u16 type; __u16 code; __s32 value; }
const TIME_SIZE: usize = 2 * size_of::<c_long>();
const EVENT_SIZE: usize = TIME_SIZE + 8;

const EV_KEY: u16 = 0x01;
const BTN_LEFT: u16 = 0x110;
const BTN_RIGHT: u16 = 0x111;
const BTN_MIDDLE: u16 = 0x112;
const BTN_SIDE: u16 = 0x113;
const BTN_EXTRA: u16 = 0x114;
const KEY_DOWN: i32 = 1;

/// Button numbers follow the X11 convention: 1 left, 2 middle, 3 right.
fn button_number(code: u16) -> Option<u16> {
    match code {
        BTN_LEFT => Some(1),
        BTN_MIDDLE => Some(2),
        BTN_RIGHT => Some(3),
        BTN_SIDE => Some(8),
        BTN_EXTRA => Some(9),
        _ => None,
    }
}

type EventStream = Box<dyn Read + Send>;

enum Device {
    Path(PathBuf),
    Stream(EventStream),
}

/// Pointer button presses from an evdev node such as `/dev/input/event0`.
///
/// Only button-down events are reported; motion and release are ignored.
/// Like [`KeySource`](super::KeySource), the blocking read runs on a helper
/// thread.
pub struct PointerSource {
    name: String,
    device: Option<Device>,
    rx: Option<Receiver<io::Result<u16>>>,
}

impl PointerSource {
    /// Read the evdev node at `path`. The file is opened on acquire.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: format!("pointer:{}", path.display()),
            device: Some(Device::Path(path)),
            rx: None,
        }
    }

    /// Read raw `input_event` records from `stream`.
    pub fn from_reader(name: impl Into<String>, stream: impl Read + Send + 'static) -> Self {
        Self {
            name: name.into(),
            device: Some(Device::Stream(Box::new(stream))),
            rx: None,
        }
    }

    fn acquire_error(&self, reason: impl ToString) -> SourceError {
        SourceError::Acquire {
            name: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

fn pump_events(mut stream: EventStream, tx: Sender<io::Result<u16>>) {
    let mut record = [0u8; EVENT_SIZE];
    loop {
        match stream.read_exact(&mut record) {
            Ok(()) => {
                let kind = u16::from_ne_bytes([record[TIME_SIZE], record[TIME_SIZE + 1]]);
                let code = u16::from_ne_bytes([record[TIME_SIZE + 2], record[TIME_SIZE + 3]]);
                let value = i32::from_ne_bytes([
                    record[TIME_SIZE + 4],
                    record[TIME_SIZE + 5],
                    record[TIME_SIZE + 6],
                    record[TIME_SIZE + 7],
                ]);
                if kind != EV_KEY || value != KEY_DOWN {
                    continue;
                }
                if let Some(button) = button_number(code)
                    && tx.send(Ok(button)).is_err()
                {
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        }
    }
}

impl InputSource for PointerSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&mut self) -> Result<(), SourceError> {
        let stream: EventStream = match self.device.take() {
            Some(Device::Stream(stream)) => stream,
            Some(Device::Path(path)) => match File::open(&path) {
                Ok(file) => Box::new(file),
                Err(e) => {
                    let err = self.acquire_error(format!("{}: {e}", path.display()));
                    self.device = Some(Device::Path(path));
                    return Err(err);
                }
            },
            None => return Err(self.acquire_error("already acquired")),
        };
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name(format!("{}-reader", self.name))
            .spawn(move || pump_events(stream, tx))
            .map_err(|e| self.acquire_error(e))?;
        self.rx = Some(rx);
        debug!("{} acquired", self.name);
        Ok(())
    }

    fn next_event(&mut self, timeout: Duration) -> Result<Option<PressedEvent>, SourceError> {
        let rx = self.rx.as_ref().ok_or_else(|| SourceError::Unreadable {
            name: self.name.clone(),
            reason: "not acquired".into(),
        })?;
        match rx.recv_timeout(timeout) {
            Ok(Ok(button)) => {
                trace!("{} button {}", self.name, button);
                Ok(Some(PressedEvent::now(InputId::Pointer(button))))
            }
            Ok(Err(e)) => Err(SourceError::Unreadable {
                name: self.name.clone(),
                reason: e.to_string(),
            }),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SourceError::Disconnected(self.name.clone())),
        }
    }

    fn release(&mut self) -> Result<(), SourceError> {
        self.rx = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const WAIT: Duration = Duration::from_secs(1);
    const EV_REL: u16 = 0x02;

    fn event(kind: u16, code: u16, value: i32) -> Vec<u8> {
        let mut record = vec![0u8; TIME_SIZE];
        record.extend_from_slice(&kind.to_ne_bytes());
        record.extend_from_slice(&code.to_ne_bytes());
        record.extend_from_slice(&value.to_ne_bytes());
        record
    }

    #[test]
    fn test_pointer_reports_button_downs_only() {
        let stream: Vec<u8> = [
            event(EV_REL, 0, 5),
            event(EV_KEY, BTN_LEFT, 1),
            event(EV_KEY, BTN_LEFT, 0),
            event(EV_KEY, BTN_RIGHT, 1),
        ]
        .concat();
        let mut src = PointerSource::from_reader("mouse", Cursor::new(stream));
        src.acquire().unwrap();

        assert_eq!(
            src.next_event(WAIT).unwrap().map(|e| e.input),
            Some(InputId::Pointer(1))
        );
        assert_eq!(
            src.next_event(WAIT).unwrap().map(|e| e.input),
            Some(InputId::Pointer(3))
        );
        assert!(matches!(
            src.next_event(WAIT),
            Err(SourceError::Disconnected(_))
        ));
    }

    #[test]
    fn test_pointer_missing_device_fails_acquire() {
        let mut src = PointerSource::open("/nonexistent/event99");
        assert!(matches!(src.acquire(), Err(SourceError::Acquire { .. })));
        // still retryable
        assert!(matches!(src.acquire(), Err(SourceError::Acquire { .. })));
    }

    #[test]
    fn test_button_numbers() {
        assert_eq!(button_number(BTN_MIDDLE), Some(2));
        assert_eq!(button_number(0x100), None);
    }
}
