//! Crop window geometry.
//!
//! The crop is anchored to a corner rather than centered so the start of a
//! text line stays in the same place on screen while zooming.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Create a size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// How a camera backend expects crop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Addressing {
    /// Fractions of the frame in `[0, 1]`.
    #[default]
    Normalized,
    /// Absolute sensor pixels.
    Pixels,
}

/// Camera mounting rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    /// Camera mounted upright; crop anchored top-left.
    Upright,
    /// Camera mounted upside down (behind the page); crop anchored to the
    /// opposite corner so the reading start stays put after rotation.
    #[default]
    HalfTurn,
}

impl Rotation {
    /// Rotation in degrees, as passed to the camera.
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Upright => 0,
            Rotation::HalfTurn => 180,
        }
    }
}

impl TryFrom<u16> for Rotation {
    type Error = ConfigError;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::Upright),
            180 => Ok(Rotation::HalfTurn),
            other => Err(ConfigError::Invalid(format!(
                "rotation {other} not supported (expected 0 or 180)"
            ))),
        }
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region<T> {
    /// Left edge.
    pub x: T,
    /// Top edge.
    pub y: T,
    /// Width.
    pub width: T,
    /// Height.
    pub height: T,
}

/// A crop window in the units the backend expects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CropWindow {
    /// Fractions of the frame.
    Normalized(Region<f64>),
    /// Sensor pixels.
    Pixels(Region<u32>),
}

impl CropWindow {
    /// The window as fractions of a frame of size `sensor`.
    pub fn as_fractions(&self, sensor: Size) -> Region<f64> {
        match *self {
            CropWindow::Normalized(region) => region,
            CropWindow::Pixels(region) => {
                let w = f64::from(sensor.width);
                let h = f64::from(sensor.height);
                Region {
                    x: f64::from(region.x) / w,
                    y: f64::from(region.y) / h,
                    width: f64::from(region.width) / w,
                    height: f64::from(region.height) / h,
                }
            }
        }
    }
}

/// Derives crop windows from a scale factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropGeometry {
    sensor: Size,
    aspect: f64,
    rotation: Rotation,
    addressing: Addressing,
}

impl CropGeometry {
    /// Create a geometry for a sensor and the screen the preview fills.
    ///
    /// # Errors
    /// Returns an error if any dimension is zero.
    pub fn new(
        sensor: Size,
        screen: Size,
        rotation: Rotation,
        addressing: Addressing,
    ) -> Result<Self, ConfigError> {
        if sensor.width == 0 || sensor.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "sensor size {}x{} has a zero dimension",
                sensor.width, sensor.height
            )));
        }
        if screen.width == 0 || screen.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "screen size {}x{} has a zero dimension",
                screen.width, screen.height
            )));
        }
        Ok(Self {
            sensor,
            aspect: f64::from(screen.width) / f64::from(screen.height),
            rotation,
            addressing,
        })
    }

    /// Sensor dimensions.
    pub fn sensor(&self) -> Size {
        self.sensor
    }

    /// Camera mounting rotation.
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Crop window for `factor`.
    ///
    /// Width is `sensor_width / factor` and height follows the screen aspect
    /// ratio, both capped at the sensor and never below one pixel.
    pub fn window(&self, factor: f64) -> CropWindow {
        let factor = if factor.is_finite() && factor > 0.0 {
            factor
        } else {
            1.0
        };
        let sensor_w = f64::from(self.sensor.width);
        let sensor_h = f64::from(self.sensor.height);

        let width = (sensor_w / factor).min(sensor_w).max(1.0);
        let height = (width / self.aspect).min(sensor_h).max(1.0);

        match self.addressing {
            Addressing::Pixels => {
                let width = (width.floor() as u32).clamp(1, self.sensor.width);
                let height = (height.floor() as u32).clamp(1, self.sensor.height);
                let (x, y) = match self.rotation {
                    Rotation::Upright => (0, 0),
                    Rotation::HalfTurn => (self.sensor.width - width, self.sensor.height - height),
                };
                CropWindow::Pixels(Region {
                    x,
                    y,
                    width,
                    height,
                })
            }
            Addressing::Normalized => {
                let width = width / sensor_w;
                let height = height / sensor_h;
                let (x, y) = match self.rotation {
                    Rotation::Upright => (0.0, 0.0),
                    Rotation::HalfTurn => ((1.0 - width).max(0.0), (1.0 - height).max(0.0)),
                };
                CropWindow::Normalized(Region {
                    x,
                    y,
                    width,
                    height,
                })
            }
        }
    }
}
