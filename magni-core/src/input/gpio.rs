//! GPIO button sources.

use super::debounce::{Debouncer, Level};
use super::{InputSource, PressedEvent};
use crate::command::InputId;
use crate::error::SourceError;
use log::{debug, info};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";
const EXPORT_RETRIES: u32 = 10;
const EXPORT_RETRY_DELAY: Duration = Duration::from_millis(10);
const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(2);

/// Reads the raw level of one digital line.
pub trait LevelReader: Send {
    /// Open the line.
    fn acquire(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Sample the line.
    fn read_level(&mut self) -> Result<Level, SourceError>;

    /// Close the line.
    fn release(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}

// =============================================================================
// GpioSource
// =============================================================================

/// A push button on a GPIO line.
///
/// The line is sampled every `sample_interval` while waiting for an event and
/// every sample passes through the [`Debouncer`].
pub struct GpioSource<R> {
    name: String,
    pin: u16,
    reader: R,
    debouncer: Debouncer,
    sample_interval: Duration,
}

impl<R: LevelReader> GpioSource<R> {
    /// Create a source for `pin` read through `reader`.
    pub fn new(pin: u16, reader: R, debouncer: Debouncer) -> Self {
        Self {
            name: format!("gpio{pin}"),
            pin,
            reader,
            debouncer,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }

    /// Change how often the line is sampled.
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }
}

impl<R: LevelReader> InputSource for GpioSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&mut self) -> Result<(), SourceError> {
        self.reader.acquire()?;
        debug!("{} acquired", self.name);
        Ok(())
    }

    fn next_event(&mut self, timeout: Duration) -> Result<Option<PressedEvent>, SourceError> {
        let deadline = Instant::now() + timeout;
        loop {
            let level = self
                .reader
                .read_level()
                .map_err(|e| SourceError::Unreadable {
                    name: self.name.clone(),
                    reason: e.to_string(),
                })?;
            let now = Instant::now();
            if self.debouncer.update(level, now) {
                return Ok(Some(PressedEvent {
                    input: InputId::Pin(self.pin),
                    at: now,
                }));
            }
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(self.sample_interval.min(deadline - now));
        }
    }

    fn release(&mut self) -> Result<(), SourceError> {
        self.reader.release()
    }
}

// =============================================================================
// SysfsPin
// =============================================================================

/// A GPIO line read through the Linux sysfs interface.
///
/// Exports the line on acquire if it is not already exported and unexports it
/// again on release. Pull resistors cannot be configured through sysfs; wire
/// them externally or set them in the device tree.
#[derive(Debug)]
pub struct SysfsPin {
    pin: u16,
    root: PathBuf,
    value: Option<File>,
    exported: bool,
}

impl SysfsPin {
    /// A line under `/sys/class/gpio`.
    pub fn new(pin: u16) -> Self {
        Self::with_root(pin, SYSFS_GPIO_ROOT)
    }

    /// A line under a different sysfs root.
    pub fn with_root(pin: u16, root: impl Into<PathBuf>) -> Self {
        Self {
            pin,
            root: root.into(),
            value: None,
            exported: false,
        }
    }

    fn line_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }

    fn acquire_error(&self, reason: impl ToString) -> SourceError {
        SourceError::Acquire {
            name: format!("gpio{}", self.pin),
            reason: reason.to_string(),
        }
    }

    fn set_direction_input(&self) -> Result<(), SourceError> {
        let direction = self.line_dir().join("direction");
        let mut attempt = 0;
        loop {
            match fs::write(&direction, "in") {
                Ok(()) => return Ok(()),
                // a freshly exported line needs a moment before udev hands it over
                Err(_) if self.exported && attempt < EXPORT_RETRIES => {
                    attempt += 1;
                    thread::sleep(EXPORT_RETRY_DELAY);
                }
                Err(e) => return Err(self.acquire_error(format!("{}: {e}", direction.display()))),
            }
        }
    }
}

impl LevelReader for SysfsPin {
    fn acquire(&mut self) -> Result<(), SourceError> {
        if !self.line_dir().exists() {
            fs::write(self.root.join("export"), self.pin.to_string())
                .map_err(|e| self.acquire_error(format!("export: {e}")))?;
            self.exported = true;
            info!("exported gpio{}", self.pin);
        }
        self.set_direction_input()?;
        let value = File::open(self.line_dir().join("value"))
            .map_err(|e| self.acquire_error(format!("value: {e}")))?;
        self.value = Some(value);
        Ok(())
    }

    fn read_level(&mut self) -> Result<Level, SourceError> {
        let pin = self.pin;
        let file = self
            .value
            .as_mut()
            .ok_or_else(|| SourceError::Unreadable {
                name: format!("gpio{pin}"),
                reason: "line not acquired".into(),
            })?;
        file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; 1];
        file.read_exact(&mut buf)?;
        match buf[0] {
            bit @ (b'0' | b'1') => Ok(Level::from_bit(bit == b'1')),
            other => Err(SourceError::Unreadable {
                name: format!("gpio{pin}"),
                reason: format!("unexpected value byte {other:#04x}"),
            }),
        }
    }

    fn release(&mut self) -> Result<(), SourceError> {
        self.value = None;
        if self.exported {
            self.exported = false;
            fs::write(self.root.join("unexport"), self.pin.to_string()).map_err(|e| {
                SourceError::Release {
                    name: format!("gpio{}", self.pin),
                    reason: e.to_string(),
                }
            })?;
            debug!("unexported gpio{}", self.pin);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Trigger;
    use std::collections::VecDeque;
    use std::path::Path;

    struct ScriptedLevels {
        levels: VecDeque<Result<Level, SourceError>>,
        last: Level,
    }

    impl ScriptedLevels {
        fn new(levels: Vec<Result<Level, SourceError>>) -> Self {
            Self {
                levels: levels.into(),
                last: Level::High,
            }
        }
    }

    impl LevelReader for ScriptedLevels {
        fn read_level(&mut self) -> Result<Level, SourceError> {
            match self.levels.pop_front() {
                Some(Ok(level)) => {
                    self.last = level;
                    Ok(level)
                }
                Some(Err(e)) => Err(e),
                None => Ok(self.last),
            }
        }
    }

    fn source(levels: Vec<Result<Level, SourceError>>) -> GpioSource<ScriptedLevels> {
        GpioSource::new(
            4,
            ScriptedLevels::new(levels),
            Debouncer::new(Duration::ZERO, true, Trigger::Press),
        )
        .with_sample_interval(Duration::from_millis(1))
    }

    #[test]
    fn test_gpio_source_reports_press() {
        let mut src = source(vec![Ok(Level::High), Ok(Level::Low)]);
        let event = src
            .next_event(Duration::from_millis(100))
            .unwrap()
            .expect("press");
        assert_eq!(event.input, InputId::Pin(4));
    }

    #[test]
    fn test_gpio_source_times_out_when_idle() {
        let mut src = source(vec![]);
        assert!(src.next_event(Duration::from_millis(5)).unwrap().is_none());
    }

    #[test]
    fn test_gpio_read_failure_is_terminal() {
        let mut src = source(vec![Err(SourceError::Disconnected("bus".into()))]);
        let err = src.next_event(Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, SourceError::Unreadable { .. }));
        assert!(err.is_failure());
    }

    fn fake_sysfs(name: &str, value: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("magni-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        let line = root.join("gpio17");
        fs::create_dir_all(&line).unwrap();
        fs::write(line.join("direction"), "out").unwrap();
        fs::write(line.join("value"), value).unwrap();
        root
    }

    fn read_file(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_sysfs_pin_reads_exported_line() {
        let root = fake_sysfs("sysfs-read", "1\n");
        let mut pin = SysfsPin::with_root(17, &root);
        pin.acquire().unwrap();
        assert_eq!(read_file(&root.join("gpio17/direction")), "in");
        assert_eq!(pin.read_level().unwrap(), Level::High);

        fs::write(root.join("gpio17/value"), "0\n").unwrap();
        assert_eq!(pin.read_level().unwrap(), Level::Low);

        pin.release().unwrap();
        assert!(!root.join("unexport").exists());
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_sysfs_pin_unacquired_read_fails() {
        let mut pin = SysfsPin::with_root(17, std::env::temp_dir());
        assert!(pin.read_level().is_err());
    }

    #[test]
    fn test_sysfs_pin_missing_root_fails_acquire() {
        let mut pin = SysfsPin::with_root(17, "/nonexistent/magni/gpio");
        assert!(matches!(pin.acquire(), Err(SourceError::Acquire { .. })));
    }
}
