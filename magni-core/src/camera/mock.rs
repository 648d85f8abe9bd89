//! Mock camera for testing and dry runs.

use super::{Camera, Capabilities, Control, ControlRange};
use crate::error::CameraError;
use crate::geometry::{Addressing, CropWindow, Rotation, Size};
use crate::magnifier::Appearance;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// One call received by a [`MockCamera`].
#[derive(Debug, Clone, PartialEq)]
pub enum CameraCall {
    /// [`Camera::start`] with the requested rotation.
    Start(Rotation),
    /// [`Camera::apply_crop`].
    Crop(CropWindow),
    /// [`Camera::set_appearance`].
    Appearance(Appearance, CropWindow),
    /// [`Camera::trigger_autofocus`].
    Autofocus(CropWindow),
    /// [`Camera::capture_still`].
    Capture(PathBuf),
    /// [`Camera::set_control`].
    SetControl(Control, f64),
    /// [`Camera::stop`].
    Stop,
    /// [`Camera::close`].
    Close,
}

impl CameraCall {
    fn operation(&self) -> &'static str {
        match self {
            CameraCall::Start(_) => "start",
            CameraCall::Crop(_) => "crop",
            CameraCall::Appearance(..) => "appearance",
            CameraCall::Autofocus(_) => "autofocus",
            CameraCall::Capture(_) => "capture",
            CameraCall::SetControl(..) => "set_control",
            CameraCall::Stop => "stop",
            CameraCall::Close => "close",
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<CameraCall>,
    failing: HashSet<&'static str>,
}

/// A mock camera backend.
///
/// This allows running the controller without a camera attached. Every call
/// is recorded and can be inspected through a [`MockRecorder`], which stays
/// valid after the camera has been moved into a controller.
///
/// # Example
///
/// ```
/// use magni_core::{Camera, CameraCall, MockCamera, Rotation};
///
/// let mut camera = MockCamera::new();
/// let recorder = camera.recorder();
/// camera.start(Rotation::HalfTurn).unwrap();
/// assert_eq!(recorder.calls(), vec![CameraCall::Start(Rotation::HalfTurn)]);
/// ```
#[derive(Debug)]
pub struct MockCamera {
    capabilities: Capabilities,
    addressing: Addressing,
    sensor: Size,
    ranges: HashMap<Control, ControlRange>,
    state: Arc<Mutex<MockState>>,
}

impl MockCamera {
    /// Create a mock with every capability, normalized addressing, an
    /// 8 megapixel sensor and brightness, contrast and lens controls.
    pub fn new() -> Self {
        let ranges = HashMap::from([
            (Control::Brightness, ControlRange::new(0.0, 100.0, 50.0)),
            (Control::Contrast, ControlRange::new(0.0, 32.0, 1.0)),
            (Control::LensPosition, ControlRange::new(0.0, 15.0, 1.0)),
        ]);
        Self {
            capabilities: Capabilities::all(),
            addressing: Addressing::Normalized,
            sensor: Size::new(3280, 2464),
            ranges,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Replace the advertised capabilities.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Replace the addressing mode.
    pub fn with_addressing(mut self, addressing: Addressing) -> Self {
        self.addressing = addressing;
        self
    }

    /// Replace the sensor size.
    pub fn with_sensor(mut self, sensor: Size) -> Self {
        self.sensor = sensor;
        self
    }

    /// Expose a control with the given range.
    pub fn with_control(mut self, control: Control, range: ControlRange) -> Self {
        self.ranges.insert(control, range);
        self
    }

    /// Hide a control.
    pub fn without_control(mut self, control: Control) -> Self {
        self.ranges.remove(&control);
        self
    }

    /// Make every call of `operation` fail (e.g. `"stop"`, `"crop"`).
    pub fn failing(self, operation: &'static str) -> Self {
        self.lock().failing.insert(operation);
        self
    }

    /// A handle for inspecting recorded calls.
    pub fn recorder(&self) -> MockRecorder {
        MockRecorder {
            state: Arc::clone(&self.state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: CameraCall) -> Result<(), CameraError> {
        debug!("mock camera: {:?}", call);
        let operation = call.operation();
        let mut state = self.lock();
        state.calls.push(call);
        if state.failing.contains(operation) {
            return Err(CameraError::Call {
                operation,
                reason: "injected failure".into(),
            });
        }
        Ok(())
    }

    fn require(&self, supported: bool, operation: &'static str) -> Result<(), CameraError> {
        if supported {
            Ok(())
        } else {
            Err(CameraError::Unsupported(operation))
        }
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera for MockCamera {
    fn name(&self) -> &str {
        "mock"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn addressing(&self) -> Addressing {
        self.addressing
    }

    fn sensor_size(&self) -> Size {
        self.sensor
    }

    fn start(&mut self, rotation: Rotation) -> Result<(), CameraError> {
        debug!("mock camera starting at {} degrees", rotation.degrees());
        self.record(CameraCall::Start(rotation))
            .map_err(|e| CameraError::Open(e.to_string()))
    }

    fn apply_crop(&mut self, window: CropWindow) -> Result<(), CameraError> {
        self.require(self.capabilities.crop, "crop")?;
        self.record(CameraCall::Crop(window))
    }

    fn set_appearance(
        &mut self,
        appearance: Appearance,
        window: CropWindow,
    ) -> Result<(), CameraError> {
        self.require(self.capabilities.appearance, "appearance")?;
        self.record(CameraCall::Appearance(appearance, window))
    }

    fn trigger_autofocus(&mut self, region: CropWindow) -> Result<(), CameraError> {
        self.require(self.capabilities.autofocus, "autofocus")?;
        self.record(CameraCall::Autofocus(region))
    }

    fn capture_still(&mut self, path: &Path) -> Result<(), CameraError> {
        self.require(self.capabilities.capture, "capture")?;
        self.record(CameraCall::Capture(path.to_path_buf()))
    }

    fn query_control_range(&self, control: Control) -> Option<ControlRange> {
        self.ranges.get(&control).copied()
    }

    fn set_control(&mut self, control: Control, value: f64) -> Result<(), CameraError> {
        self.require(self.ranges.contains_key(&control), control.name())?;
        self.record(CameraCall::SetControl(control, value))
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        self.record(CameraCall::Stop)
    }

    fn close(&mut self) -> Result<(), CameraError> {
        self.record(CameraCall::Close)
    }
}

/// Read access to the calls a [`MockCamera`] received.
#[derive(Debug, Clone)]
pub struct MockRecorder {
    state: Arc<Mutex<MockState>>,
}

impl MockRecorder {
    /// All recorded calls, oldest first.
    pub fn calls(&self) -> Vec<CameraCall> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .calls
            .clone()
    }

    /// The most recent crop, from either a crop or an appearance call.
    pub fn last_crop(&self) -> Option<CropWindow> {
        self.calls().into_iter().rev().find_map(|call| match call {
            CameraCall::Crop(window) | CameraCall::Appearance(_, window) => Some(window),
            _ => None,
        })
    }

    /// The most recent appearance set on the camera.
    pub fn last_appearance(&self) -> Option<Appearance> {
        self.calls().into_iter().rev().find_map(|call| match call {
            CameraCall::Appearance(appearance, _) => Some(appearance),
            _ => None,
        })
    }

    /// Number of recorded crop calls.
    pub fn crop_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, CameraCall::Crop(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Region;

    fn window() -> CropWindow {
        CropWindow::Normalized(Region {
            x: 0.0,
            y: 0.0,
            width: 0.5,
            height: 0.5,
        })
    }

    #[test]
    fn test_mock_records_calls() {
        let mut camera = MockCamera::new();
        let recorder = camera.recorder();

        camera.start(Rotation::Upright).unwrap();
        camera.apply_crop(window()).unwrap();
        camera
            .set_appearance(Appearance::Inverted, window())
            .unwrap();
        camera.stop().unwrap();

        assert_eq!(recorder.calls().len(), 4);
        assert_eq!(recorder.calls()[0], CameraCall::Start(Rotation::Upright));
        assert_eq!(recorder.crop_count(), 1);
        assert_eq!(recorder.last_appearance(), Some(Appearance::Inverted));
    }

    #[test]
    fn test_mock_respects_capabilities() {
        let mut camera = MockCamera::new().with_capabilities(Capabilities::none());
        assert!(matches!(
            camera.apply_crop(window()),
            Err(CameraError::Unsupported("crop"))
        ));
        assert!(camera.recorder().calls().is_empty());
    }

    #[test]
    fn test_mock_injected_failure_is_still_recorded() {
        let mut camera = MockCamera::new().failing("stop");
        assert!(camera.stop().is_err());
        assert_eq!(camera.recorder().calls(), vec![CameraCall::Stop]);
    }

    #[test]
    fn test_mock_hidden_control() {
        let mut camera = MockCamera::new().without_control(Control::Contrast);
        assert!(camera.query_control_range(Control::Contrast).is_none());
        assert!(camera.set_control(Control::Contrast, 1.0).is_err());
    }
}
