//! Controller configuration.
//!
//! Loaded once at startup from TOML and immutable afterwards. Every key is
//! optional; [`Config::default`] reproduces the reference setup: camera
//! mounted behind the page 24.5 cm above the table, line widths of
//! 12.5, 9 and 5 cm, Enter/`/`/Escape on the keyboard and buttons on BCM
//! pins 4 and 18.
//!
//! ```toml
//! rotation = 180
//! default_factor = 2.5
//! widths_cm = [12.5, 9, 5]
//!
//! [screen]
//! width = 1920
//! height = 1080
//!
//! [gpio]
//! pins = [4, 18]
//!
//! [[bindings]]
//! input = { key = 32 }
//! command = "next_factor"
//!
//! [[bindings]]
//! input = { pin = 23 }
//! command = { set_factor = 6 }
//! ```

use crate::command::{Binding, BindingTable};
use crate::error::ConfigError;
use crate::geometry::{Addressing, CropGeometry, Rotation, Size};
use crate::input::Trigger;
use crate::magnifier::{ScaleLadder, WIDTH_PER_DISTANCE};
use log::info;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Camera-side settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraConfig {
    /// Crop coordinate convention of the backend.
    pub addressing: Addressing,
    /// Sensor width in pixels.
    pub sensor_width: u32,
    /// Sensor height in pixels.
    pub sensor_height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            addressing: Addressing::Normalized,
            sensor_width: 3280,
            sensor_height: 2464,
        }
    }
}

/// GPIO button settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GpioConfig {
    /// BCM line numbers to open. Empty disables GPIO input.
    pub pins: Vec<u16>,
    /// Buttons pull the line low when pressed.
    pub active_low: bool,
    /// Which edge of a press is reported.
    pub trigger: Trigger,
    /// Debounce window in milliseconds.
    pub bounce_ms: u64,
    /// Sampling period in milliseconds.
    pub sample_ms: u64,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            pins: Vec::new(),
            active_low: true,
            trigger: Trigger::Release,
            bounce_ms: 50,
            sample_ms: 2,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Camera mounting rotation in degrees (0 or 180).
    pub rotation: u16,
    /// Lowest allowed scale factor; also the factor at which
    /// `default_width_cm` fills the screen.
    pub default_factor: f64,
    /// Explicit scale ladder. Takes precedence over `widths_cm` and must
    /// include `default_factor`.
    pub factors: Option<Vec<f64>>,
    /// Line widths to cycle through, in cm. The full view width is prepended.
    pub widths_cm: Vec<f64>,
    /// Visible surface width at `default_factor`, in cm.
    pub default_width_cm: Option<f64>,
    /// Camera to surface distance, used when `default_width_cm` is unset.
    pub distance_to_surface_cm: f64,
    /// Screen the preview fills.
    pub screen: Size,
    /// Camera settings.
    pub camera: CameraConfig,
    /// GPIO settings.
    pub gpio: GpioConfig,
    /// evdev nodes to read pointer buttons from.
    pub pointer_devices: Vec<PathBuf>,
    /// Report terminal mouse clicks as pointer buttons while the keyboard is
    /// read from a terminal.
    pub capture_mouse: bool,
    /// How often input pumps check for shutdown, in milliseconds.
    pub poll_interval_ms: u64,
    /// Directory for captured stills.
    pub capture_dir: PathBuf,
    /// Input bindings. Empty means the stock bindings.
    pub bindings: Vec<Binding>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rotation: 180,
            default_factor: 2.5,
            factors: None,
            widths_cm: vec![12.5, 9.0, 5.0],
            default_width_cm: None,
            distance_to_surface_cm: 24.5,
            screen: Size::new(1920, 1080),
            camera: CameraConfig::default(),
            gpio: GpioConfig::default(),
            pointer_devices: Vec::new(),
            capture_mouse: true,
            poll_interval_ms: 10,
            capture_dir: PathBuf::from("."),
            bindings: Vec::new(),
        }
    }
}

impl Config {
    /// Read and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&text)?;
        info!("loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value the controller relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.default_factor.is_finite() || self.default_factor <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "default_factor {} must be a positive number",
                self.default_factor
            )));
        }
        self.rotation()?;
        self.geometry()?;
        let ladder = self.ladder()?;
        if let Some(low) = ladder.factors().iter().find(|f| **f < self.default_factor) {
            return Err(ConfigError::Invalid(format!(
                "scale factor {low} is below default_factor {}",
                self.default_factor
            )));
        }
        // from the floor, NextFactor can only reach the ladder through a preset <= floor
        if !ladder.factors().contains(&self.default_factor) {
            return Err(ConfigError::Invalid(format!(
                "scale factors {:?} must include default_factor {}",
                ladder.factors(),
                self.default_factor
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be at least 1".into()));
        }
        Ok(())
    }

    /// Mounting rotation.
    pub fn rotation(&self) -> Result<Rotation, ConfigError> {
        Rotation::try_from(self.rotation)
    }

    /// Width of the full camera view on the surface, in cm.
    pub fn default_width_cm(&self) -> f64 {
        self.default_width_cm
            .unwrap_or(self.distance_to_surface_cm * WIDTH_PER_DISTANCE)
    }

    /// The scale ladder, either explicit or derived from line widths.
    pub fn ladder(&self) -> Result<ScaleLadder, ConfigError> {
        match &self.factors {
            Some(factors) => ScaleLadder::new(factors.clone()),
            None => {
                let full = self.default_width_cm();
                let widths: Vec<f64> = std::iter::once(full)
                    .chain(self.widths_cm.iter().copied())
                    .collect();
                ScaleLadder::from_widths(self.default_factor, full, &widths)
            }
        }
    }

    /// Crop geometry for the configured camera and screen.
    pub fn geometry(&self) -> Result<CropGeometry, ConfigError> {
        CropGeometry::new(
            Size::new(self.camera.sensor_width, self.camera.sensor_height),
            self.screen,
            self.rotation()?,
            self.camera.addressing,
        )
    }

    /// The binding table, falling back to the stock bindings.
    pub fn binding_table(&self) -> BindingTable {
        if self.bindings.is_empty() {
            BindingTable::new(BindingTable::default_bindings())
        } else {
            BindingTable::new(self.bindings.iter().copied())
        }
    }

    /// Input pump poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// GPIO debounce window.
    pub fn bounce_window(&self) -> Duration {
        Duration::from_millis(self.gpio.bounce_ms)
    }
}
