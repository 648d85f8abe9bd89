//! Camera control facade.
//!
//! Every camera backend implements [`Camera`]. Backends differ in how they
//! address the crop (see [`Addressing`]) and in which optional operations they
//! support; [`Capabilities`] is read once when the controller is built and the
//! optional operations are only called when advertised.

mod mock;

pub use mock::{CameraCall, MockCamera, MockRecorder};

use crate::error::CameraError;
use crate::geometry::{Addressing, CropWindow, Rotation, Size};
use crate::magnifier::Appearance;
use std::fmt;
use std::path::Path;

/// Optional operations a backend supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// [`Camera::apply_crop`].
    pub crop: bool,
    /// [`Camera::set_appearance`].
    pub appearance: bool,
    /// [`Camera::trigger_autofocus`].
    pub autofocus: bool,
    /// [`Camera::capture_still`].
    pub capture: bool,
}

impl Capabilities {
    /// Every optional operation.
    pub const fn all() -> Self {
        Self {
            crop: true,
            appearance: true,
            autofocus: true,
            capture: true,
        }
    }

    /// No optional operation.
    pub const fn none() -> Self {
        Self {
            crop: false,
            appearance: false,
            autofocus: false,
            capture: false,
        }
    }
}

/// Adjustable image controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Additive brightness.
    Brightness,
    /// Contrast gain.
    Contrast,
    /// Manual lens position (dioptres on most autofocus modules).
    LensPosition,
}

impl Control {
    /// All controls the controller knows how to drive.
    pub const ALL: [Control; 3] = [Control::Brightness, Control::Contrast, Control::LensPosition];

    /// Control name as used by camera drivers.
    pub fn name(self) -> &'static str {
        match self {
            Control::Brightness => "Brightness",
            Control::Contrast => "Contrast",
            Control::LensPosition => "LensPosition",
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Range a backend reports for a control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlRange {
    /// Smallest accepted value.
    pub min: f64,
    /// Largest accepted value.
    pub max: f64,
    /// Value the control starts at.
    pub default: f64,
}

impl ControlRange {
    /// Create a range; `default` is clamped into `[min, max]`.
    pub fn new(min: f64, max: f64, default: f64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            default: default.clamp(min, max),
        }
    }

    /// Clamp `value` into the range.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

/// Trait for camera backends.
///
/// The optional operations have default bodies returning
/// [`CameraError::Unsupported`]; a backend overrides the ones it advertises in
/// [`Camera::capabilities`].
pub trait Camera: Send {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Optional operations this backend supports. Queried once.
    fn capabilities(&self) -> Capabilities;

    /// Crop coordinate convention. Queried once.
    fn addressing(&self) -> Addressing;

    /// Sensor dimensions, used to size pixel crops and to convert between
    /// pixels and fractions.
    fn sensor_size(&self) -> Size;

    /// Open the device and start the preview, rotated to match how the
    /// camera is mounted.
    fn start(&mut self, rotation: Rotation) -> Result<(), CameraError>;

    /// Set the region of interest.
    fn apply_crop(&mut self, _window: CropWindow) -> Result<(), CameraError> {
        Err(CameraError::Unsupported("crop"))
    }

    /// Set the colour appearance.
    ///
    /// `window` is the current crop; backends that must set inversion and crop
    /// together re-apply it here.
    fn set_appearance(
        &mut self,
        _appearance: Appearance,
        _window: CropWindow,
    ) -> Result<(), CameraError> {
        Err(CameraError::Unsupported("appearance"))
    }

    /// Run an autofocus cycle weighted to `region`.
    fn trigger_autofocus(&mut self, _region: CropWindow) -> Result<(), CameraError> {
        Err(CameraError::Unsupported("autofocus"))
    }

    /// Save a still image to `path`.
    fn capture_still(&mut self, _path: &Path) -> Result<(), CameraError> {
        Err(CameraError::Unsupported("capture"))
    }

    /// Range of a control, or `None` when the backend does not expose it.
    fn query_control_range(&self, _control: Control) -> Option<ControlRange> {
        None
    }

    /// Set a control previously reported by [`Camera::query_control_range`].
    fn set_control(&mut self, control: Control, _value: f64) -> Result<(), CameraError> {
        Err(CameraError::Unsupported(control.name()))
    }

    /// Stop the preview.
    fn stop(&mut self) -> Result<(), CameraError>;

    /// Release the device.
    fn close(&mut self) -> Result<(), CameraError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_range_clamps() {
        let range = ControlRange::new(-1.0, 1.0, 0.0);
        assert_eq!(range.clamp(2.0), 1.0);
        assert_eq!(range.clamp(-2.0), -1.0);
        assert_eq!(range.clamp(0.25), 0.25);
        assert_eq!(range.clamp(f64::NAN), 0.0);
    }

    #[test]
    fn test_control_range_normalizes_bounds() {
        let range = ControlRange::new(10.0, 0.0, 50.0);
        assert_eq!(range.min, 0.0);
        assert_eq!(range.max, 10.0);
        assert_eq!(range.default, 10.0);
    }
}
