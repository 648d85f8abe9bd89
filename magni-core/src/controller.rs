//! The magnifier controller: lifecycle, command loop and teardown.

use crate::camera::{Camera, Capabilities, Control};
use crate::command::Command;
use crate::config::Config;
use crate::controls::ControlBank;
use crate::error::{CameraError, ControllerError, ReleaseFailure};
use crate::geometry::{CropGeometry, CropWindow};
use crate::input::InputSource;
use crate::magnifier::Magnifier;
use crate::multiplexer::{CommandInjector, Dispatch, InputMultiplexer};
use crate::state::{ControllerState, Lifecycle};

use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};

type ReadAloudHook = Box<dyn FnMut(&Path) + Send>;

// =============================================================================
// Outcome
// =============================================================================

/// Why the command loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A Quit command arrived from an input or injector.
    Quit,
    /// Every input ended cleanly (e.g. end of stdin).
    SourcesClosed,
    /// Every input ended and at least one of them failed.
    SourcesFailed,
}

impl StopReason {
    /// Process exit code for this reason.
    pub fn exit_code(self) -> u8 {
        match self {
            StopReason::Quit | StopReason::SourcesClosed => 0,
            StopReason::SourcesFailed => 2,
        }
    }
}

/// Result of a completed run.
#[derive(Debug)]
pub struct Outcome {
    /// Why the loop ended.
    pub reason: StopReason,
    /// Commands still queued at stop time; never applied.
    pub discarded: usize,
    /// Resources that failed to release during shutdown.
    pub release_failures: Vec<ReleaseFailure>,
}

/// Whether the loop keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

// =============================================================================
// Controller
// =============================================================================

/// The magnifier controller.
///
/// Owns the camera, the magnification state and the input multiplexer. All
/// state changes happen on the thread that calls [`Controller::run`]; input
/// sources only talk to it through the command queue.
///
/// # Example
///
/// ```
/// use magni_core::{Config, Controller, InputId, MockCamera, ScriptedSource, StopReason};
///
/// let camera = MockCamera::new();
/// let mut controller = Controller::new(&Config::default(), Box::new(camera))?;
///
/// let (feed, keys) = ScriptedSource::channel("keys");
/// controller.add_source(Box::new(keys));
/// feed.press(InputId::Key(13)); // Enter: next factor
/// feed.press(InputId::Key(27)); // Escape: quit
///
/// let outcome = controller.run()?;
/// assert_eq!(outcome.reason, StopReason::Quit);
/// # Ok::<(), magni_core::ControllerError>(())
/// ```
pub struct Controller {
    camera: Box<dyn Camera>,
    capabilities: Capabilities,
    geometry: CropGeometry,
    magnifier: Magnifier,
    controls: ControlBank,
    mux: InputMultiplexer,
    pending: Vec<Box<dyn InputSource>>,
    lifecycle: Lifecycle,
    launched: bool,
    camera_started: bool,
    active_sources: usize,
    failed_sources: usize,
    capture_dir: PathBuf,
    captures: u32,
    read_aloud: Option<ReadAloudHook>,
}

impl Controller {
    /// Build a controller for `camera` from a validated configuration.
    ///
    /// The camera's capabilities, addressing mode and control ranges are read
    /// here, once.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::Config`] if the configuration is invalid
    pub fn new(config: &Config, camera: Box<dyn Camera>) -> Result<Self, ControllerError> {
        config.validate()?;

        let capabilities = camera.capabilities();
        let geometry = CropGeometry::new(
            camera.sensor_size(),
            config.screen,
            config.rotation()?,
            camera.addressing(),
        )?;
        if camera.addressing() != config.camera.addressing {
            warn!(
                "camera {} uses {:?} addressing, configuration says {:?}; using the camera's",
                camera.name(),
                camera.addressing(),
                config.camera.addressing
            );
        }
        info!(
            "camera {}: {:?} addressing, sensor {}x{}, {:?}",
            camera.name(),
            camera.addressing(),
            geometry.sensor().width,
            geometry.sensor().height,
            capabilities
        );

        let controls = ControlBank::query(&*camera);
        let magnifier = Magnifier::new(config.ladder()?, config.default_factor);
        let mux = InputMultiplexer::new(config.binding_table(), config.poll_interval());

        Ok(Self {
            camera,
            capabilities,
            geometry,
            magnifier,
            controls,
            mux,
            pending: Vec::new(),
            lifecycle: Lifecycle::Starting,
            launched: false,
            camera_started: false,
            active_sources: 0,
            failed_sources: 0,
            capture_dir: config.capture_dir.clone(),
            captures: 0,
            read_aloud: None,
        })
    }

    /// Add an input source. It is acquired when [`run`](Self::run) starts.
    pub fn add_source(&mut self, source: Box<dyn InputSource>) {
        debug!("added input {}", source.name());
        self.pending.push(source);
    }

    /// A handle for queueing commands from outside any input source.
    pub fn injector(&self, name: impl Into<String>) -> CommandInjector {
        self.mux.injector(name)
    }

    /// Register the pipeline that reads captured text aloud.
    pub fn on_read_aloud(&mut self, hook: impl FnMut(&Path) + Send + 'static) {
        self.read_aloud = Some(Box::new(hook));
    }

    /// Get a snapshot of the current state.
    pub fn state(&self) -> ControllerState {
        ControllerState {
            lifecycle: self.lifecycle,
            factor: self.magnifier.factor(),
            appearance: self.magnifier.appearance(),
            crop: Some(self.crop_window()),
            captures: self.captures,
            active_sources: self.active_sources,
        }
    }

    /// Start, consume commands until stopped, and tear down.
    ///
    /// Teardown runs on every path out of this function; a failed start
    /// releases whatever was acquired before returning the error.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::CameraAcquisition`] if the camera cannot start
    /// - [`ControllerError::SourceAcquisition`] if an input cannot be acquired
    /// - [`ControllerError::AlreadyStopped`] if this controller already ran
    pub fn run(&mut self) -> Result<Outcome, ControllerError> {
        if self.lifecycle != Lifecycle::Starting {
            return Err(ControllerError::AlreadyStopped);
        }

        if let Err(e) = self.start() {
            error!("startup failed: {}", e);
            self.teardown();
            return Err(e);
        }

        let reason = self.consume();
        self.lifecycle = Lifecycle::Stopping;
        let discarded = self.mux.discard_pending();
        if discarded > 0 {
            info!("discarded {} command(s) queued after stop", discarded);
        }
        let release_failures = self.teardown();

        Ok(Outcome {
            reason,
            discarded,
            release_failures,
        })
    }

    fn start(&mut self) -> Result<(), ControllerError> {
        // from here on Drop must tear down, even if startup panics
        self.launched = true;
        let rotation = self.geometry.rotation();
        info!("starting camera {} at {} degrees", self.camera.name(), rotation.degrees());
        self.camera
            .start(rotation)
            .map_err(ControllerError::CameraAcquisition)?;
        self.camera_started = true;

        for mut source in std::mem::take(&mut self.pending) {
            if let Err(e) = source.acquire() {
                if let Err(release) = source.release() {
                    debug!("release after failed acquire: {}", release);
                }
                return Err(ControllerError::SourceAcquisition(e));
            }
            self.mux
                .spawn(source)
                .map_err(ControllerError::SourceAcquisition)?;
            self.active_sources += 1;
        }

        if self.capabilities.crop {
            let window = self.crop_window();
            self.camera
                .apply_crop(window)
                .map_err(ControllerError::CameraAcquisition)?;
        } else {
            warn!("camera {} cannot crop; magnification disabled", self.camera.name());
        }

        self.lifecycle = Lifecycle::Running;
        info!(
            "running with {} input(s) at factor {:.2}",
            self.mux.source_count(),
            self.magnifier.factor()
        );
        Ok(())
    }

    fn consume(&mut self) -> StopReason {
        loop {
            if self.active_sources == 0 {
                return if self.failed_sources > 0 {
                    error!("all inputs lost");
                    StopReason::SourcesFailed
                } else {
                    info!("all inputs closed");
                    StopReason::SourcesClosed
                };
            }
            let Some(dispatch) = self.mux.recv() else {
                return StopReason::SourcesClosed;
            };
            match dispatch {
                Dispatch::Command { source, command } => {
                    debug!("{}: {:?}", source, command);
                    if self.apply(command) == Flow::Stop {
                        info!("quit requested by {}", source);
                        return StopReason::Quit;
                    }
                }
                Dispatch::SourceEnded { source, error } => {
                    self.active_sources -= 1;
                    if error.is_failure() {
                        self.failed_sources += 1;
                        warn!(
                            "input {} lost: {}; {} input(s) remain",
                            source, error, self.active_sources
                        );
                    } else {
                        info!("input {} closed", source);
                    }
                }
            }
        }
    }

    /// Apply one command. Only a running controller touches the camera.
    ///
    /// Camera failures are logged and do not stop the controller; commands for
    /// operations the camera does not support do nothing.
    fn apply(&mut self, command: Command) -> Flow {
        if self.lifecycle != Lifecycle::Running {
            debug!("ignoring {:?} while {:?}", command, self.lifecycle);
            return Flow::Stop;
        }
        match command {
            Command::NextFactor => {
                self.magnifier.next_factor();
                self.factor_changed();
            }
            Command::SetFactor(requested) => {
                let factor = self.magnifier.set_factor(requested);
                if factor != requested {
                    debug!("factor {} clamped to {}", requested, factor);
                }
                self.factor_changed();
            }
            Command::Zoom(delta) => {
                self.magnifier.zoom(delta);
                self.factor_changed();
            }
            Command::ToggleAppearance => self.toggle_appearance(),
            Command::Focus { multiplier: None } => self.autofocus(),
            Command::Focus {
                multiplier: Some(multiplier),
            } => self.adjust(Control::LensPosition, |bank, control| {
                bank.scale(control, multiplier)
            }),
            Command::AdjustBrightness(delta) => {
                self.adjust(Control::Brightness, |bank, control| bank.offset(control, delta))
            }
            Command::AdjustContrast(multiplier) => self.adjust(Control::Contrast, |bank, control| {
                bank.scale(control, multiplier)
            }),
            Command::Capture => {
                self.capture();
            }
            Command::ReadAloud => self.read_aloud(),
            Command::Quit => return Flow::Stop,
        }
        Flow::Continue
    }

    fn crop_window(&self) -> CropWindow {
        self.geometry.window(self.magnifier.factor())
    }

    fn factor_changed(&mut self) {
        if !self.capabilities.crop {
            info!("scale factor {:.2}", self.magnifier.factor());
            return;
        }
        let window = self.crop_window();
        let region = window.as_fractions(self.geometry.sensor());
        info!(
            "scale factor {:.2}, crop {:.3}x{:.3} at ({:.3}, {:.3})",
            self.magnifier.factor(),
            region.width,
            region.height,
            region.x,
            region.y
        );
        if let Err(e) = self.camera.apply_crop(window) {
            warn!("failed to apply crop {:?}: {}", window, e);
        }
    }

    fn toggle_appearance(&mut self) {
        let appearance = self.magnifier.toggle_appearance();
        info!("appearance {}", appearance);
        if !self.capabilities.appearance {
            debug!("camera {} has no appearance control", self.camera.name());
            return;
        }
        let window = self.crop_window();
        if let Err(e) = self.camera.set_appearance(appearance, window) {
            warn!("failed to set appearance {}: {}", appearance, e);
        }
    }

    fn autofocus(&mut self) {
        if !self.capabilities.autofocus {
            debug!("camera {} has no autofocus", self.camera.name());
            return;
        }
        let window = self.crop_window();
        if let Err(e) = self.camera.trigger_autofocus(window) {
            warn!("autofocus failed: {}", e);
        }
    }

    fn adjust(
        &mut self,
        control: Control,
        update: impl FnOnce(&mut ControlBank, Control) -> Option<f64>,
    ) {
        let Some(value) = update(&mut self.controls, control) else {
            debug!("camera {} has no {} control", self.camera.name(), control);
            return;
        };
        info!("{} {:.2}", control, value);
        if let Err(e) = self.camera.set_control(control, value) {
            warn!("failed to set {}: {}", control, e);
        }
    }

    fn capture(&mut self) -> Option<PathBuf> {
        if !self.capabilities.capture {
            debug!("camera {} cannot capture stills", self.camera.name());
            return None;
        }
        let path = self
            .capture_dir
            .join(format!("magni-{:04}.jpg", self.captures + 1));
        match self.camera.capture_still(&path) {
            Ok(()) => {
                self.captures += 1;
                info!("captured {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("capture to {} failed: {}", path.display(), e);
                None
            }
        }
    }

    fn read_aloud(&mut self) {
        let Some(path) = self.capture() else {
            return;
        };
        match self.read_aloud.as_mut() {
            Some(hook) => hook(&path),
            None => info!("no read-aloud pipeline registered; kept {}", path.display()),
        }
    }

    /// Release inputs, stop and close the camera. Each step runs even if an
    /// earlier one failed.
    fn teardown(&mut self) -> Vec<ReleaseFailure> {
        if self.lifecycle == Lifecycle::Stopped {
            return Vec::new();
        }
        self.lifecycle = Lifecycle::Stopping;
        info!("stopping");
        let mut failures = Vec::new();

        for mut source in self.mux.shutdown() {
            let name = source.name().to_string();
            match source.release() {
                Ok(()) => debug!("released {}", name),
                Err(error) => failures.push(ReleaseFailure::Source { name, error }),
            }
        }
        self.active_sources = 0;

        let mut camera_step = |step: &'static str, result: Result<(), CameraError>| {
            if let Err(error) = result {
                failures.push(ReleaseFailure::Camera { step, error });
            }
        };
        if self.camera_started {
            camera_step("stop", self.camera.stop());
        }
        camera_step("close", self.camera.close());
        self.camera_started = false;

        for failure in &failures {
            error!("release failed: {}", failure);
        }
        self.lifecycle = Lifecycle::Stopped;
        info!("stopped");
        failures
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.launched && self.lifecycle != Lifecycle::Stopped {
            warn!("controller dropped while {:?}; tearing down", self.lifecycle);
            self.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraCall, Capabilities, ControlRange, MockCamera, MockRecorder};
    use crate::command::InputId;
    use crate::geometry::{Addressing, Region, Rotation};
    use crate::input::ScriptedSource;
    use crate::magnifier::Appearance;
    use std::sync::{Arc, Mutex};

    fn config() -> Config {
        Config {
            default_factor: 2.0,
            factors: Some(vec![2.0, 5.0, 10.0]),
            poll_interval_ms: 5,
            capture_dir: PathBuf::from("/tmp/captures"),
            ..Config::default()
        }
    }

    /// A started controller with no inputs, and how many camera calls the
    /// startup made.
    fn started(camera: MockCamera) -> (Controller, MockRecorder, usize) {
        let recorder = camera.recorder();
        let mut c = Controller::new(&config(), Box::new(camera)).unwrap();
        c.start().unwrap();
        let startup = recorder.calls().len();
        (c, recorder, startup)
    }

    #[test]
    fn test_factor_commands_update_crop() {
        let (mut c, recorder, _) = started(MockCamera::new());

        c.apply(Command::NextFactor);
        assert_eq!(c.state().factor, 5.0);
        c.apply(Command::SetFactor(7.0));
        c.apply(Command::NextFactor);
        assert_eq!(c.state().factor, 10.0);
        c.apply(Command::Zoom(-100.0));
        assert_eq!(c.state().factor, 2.0);

        // the initial crop plus one per command
        assert_eq!(recorder.crop_count(), 5);
        assert_eq!(recorder.last_crop(), c.state().crop);
    }

    #[test]
    fn test_toggle_appearance_reapplies_current_crop() {
        let (mut c, recorder, _) = started(MockCamera::new());
        c.apply(Command::SetFactor(4.0));
        c.apply(Command::ToggleAppearance);

        let expected = c.state().crop.unwrap();
        assert_eq!(
            recorder.calls().last(),
            Some(&CameraCall::Appearance(Appearance::Inverted, expected))
        );

        c.apply(Command::ToggleAppearance);
        assert_eq!(c.state().appearance, Appearance::Normal);
        assert_eq!(recorder.last_appearance(), Some(Appearance::Normal));
    }

    #[test]
    fn test_pixel_backend_gets_pixel_crop() {
        let (mut c, recorder, _) =
            started(MockCamera::new().with_addressing(Addressing::Pixels));
        c.apply(Command::SetFactor(4.0));
        match recorder.last_crop() {
            Some(CropWindow::Pixels(Region { width, .. })) => assert_eq!(width, 820),
            other => panic!("expected pixel crop, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_operations_are_noops() {
        let camera = MockCamera::new()
            .with_capabilities(Capabilities::none())
            .without_control(Control::Brightness)
            .without_control(Control::Contrast)
            .without_control(Control::LensPosition);
        let (mut c, recorder, startup) = started(camera);
        assert_eq!(startup, 1);

        for command in [
            Command::NextFactor,
            Command::ToggleAppearance,
            Command::Focus { multiplier: None },
            Command::Focus {
                multiplier: Some(2.0),
            },
            Command::AdjustBrightness(10.0),
            Command::AdjustContrast(1.5),
            Command::Capture,
            Command::ReadAloud,
        ] {
            assert_eq!(c.apply(command), Flow::Continue);
        }
        assert_eq!(recorder.calls().len(), startup);
        // state still tracks the command even without a camera to show it
        assert_eq!(c.state().factor, 5.0);
        assert_eq!(c.state().appearance, Appearance::Inverted);
    }

    #[test]
    fn test_controls_are_clamped_to_reported_range() {
        let camera = MockCamera::new()
            .with_control(Control::Brightness, ControlRange::new(0.0, 100.0, 90.0));
        let (mut c, recorder, startup) = started(camera);

        c.apply(Command::AdjustBrightness(5.0));
        c.apply(Command::AdjustBrightness(5.0));
        c.apply(Command::AdjustContrast(2.0));
        c.apply(Command::Focus {
            multiplier: Some(4.0),
        });

        assert_eq!(
            recorder.calls()[startup..],
            [
                CameraCall::SetControl(Control::Brightness, 95.0),
                CameraCall::SetControl(Control::Brightness, 100.0),
                CameraCall::SetControl(Control::Contrast, 2.0),
                CameraCall::SetControl(Control::LensPosition, 4.0),
            ]
        );
    }

    #[test]
    fn test_autofocus_uses_current_crop() {
        let (mut c, recorder, startup) = started(MockCamera::new());
        c.apply(Command::Focus { multiplier: None });
        assert_eq!(
            recorder.calls()[startup..],
            [CameraCall::Autofocus(c.state().crop.unwrap())]
        );
    }

    #[test]
    fn test_capture_numbers_files_and_feeds_read_aloud() {
        let (mut c, recorder, startup) = started(MockCamera::new());
        let heard = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&heard);
        c.on_read_aloud(move |path| sink.lock().unwrap().push(path.to_path_buf()));

        c.apply(Command::Capture);
        c.apply(Command::ReadAloud);

        assert_eq!(c.state().captures, 2);
        assert_eq!(
            recorder.calls()[startup..],
            [
                CameraCall::Capture(PathBuf::from("/tmp/captures/magni-0001.jpg")),
                CameraCall::Capture(PathBuf::from("/tmp/captures/magni-0002.jpg")),
            ]
        );
        assert_eq!(
            *heard.lock().unwrap(),
            vec![PathBuf::from("/tmp/captures/magni-0002.jpg")]
        );
    }

    #[test]
    fn test_failed_capture_does_not_count() {
        let (mut c, _recorder, _) = started(MockCamera::new().failing("capture"));
        c.apply(Command::Capture);
        assert_eq!(c.state().captures, 0);
    }

    #[test]
    fn test_camera_call_failure_keeps_state() {
        let (mut c, _recorder, _) = started(MockCamera::new().failing("appearance"));
        assert_eq!(c.apply(Command::ToggleAppearance), Flow::Continue);
        assert_eq!(c.state().appearance, Appearance::Inverted);
    }

    #[test]
    fn test_failing_initial_crop_fails_start() {
        let camera = MockCamera::new().failing("crop");
        let mut c = Controller::new(&config(), Box::new(camera)).unwrap();
        assert!(matches!(c.start(), Err(ControllerError::CameraAcquisition(_))));
    }

    #[test]
    fn test_quit_stops() {
        let (mut c, _recorder, _) = started(MockCamera::new());
        assert_eq!(c.apply(Command::Quit), Flow::Stop);
    }

    #[test]
    fn test_commands_before_start_are_ignored() {
        let camera = MockCamera::new();
        let recorder = camera.recorder();
        let mut c = Controller::new(&config(), Box::new(camera)).unwrap();

        assert_eq!(c.apply(Command::NextFactor), Flow::Stop);
        assert_eq!(c.state().factor, 2.0);
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn test_commands_after_teardown_never_reach_camera() {
        let camera = MockCamera::new();
        let recorder = camera.recorder();
        let mut c = Controller::new(&config(), Box::new(camera)).unwrap();
        let (feed, keys) = ScriptedSource::channel("keys");
        c.add_source(Box::new(keys));
        feed.press(InputId::Key(27));
        c.run().unwrap();

        for command in [Command::NextFactor, Command::ToggleAppearance, Command::Capture] {
            assert_eq!(c.apply(command), Flow::Stop);
        }
        let calls = recorder.calls();
        assert_eq!(&calls[calls.len() - 2..], &[CameraCall::Stop, CameraCall::Close]);
        assert_eq!(c.state().factor, 2.0);
        assert_eq!(c.state().captures, 0);
    }

    #[test]
    fn test_start_passes_mount_rotation_to_camera() {
        let (_c, recorder, _) = started(MockCamera::new());
        assert_eq!(recorder.calls()[0], CameraCall::Start(Rotation::HalfTurn));

        let upright = Config {
            rotation: 0,
            ..config()
        };
        let camera = MockCamera::new();
        let recorder = camera.recorder();
        let mut c = Controller::new(&upright, Box::new(camera)).unwrap();
        c.start().unwrap();
        assert_eq!(recorder.calls()[0], CameraCall::Start(Rotation::Upright));
    }

    #[test]
    fn test_stop_reason_exit_codes() {
        assert_eq!(StopReason::Quit.exit_code(), 0);
        assert_eq!(StopReason::SourcesClosed.exit_code(), 0);
        assert_ne!(StopReason::SourcesFailed.exit_code(), 0);
    }
}
