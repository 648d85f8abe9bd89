//! Controller state snapshot.

use crate::geometry::CropWindow;
use crate::magnifier::Appearance;

/// Lifecycle of a controller run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// Acquiring the camera and inputs.
    #[default]
    Starting,
    /// Consuming commands.
    Running,
    /// Releasing resources.
    Stopping,
    /// Done; terminal.
    Stopped,
}

/// A snapshot of the controller's current state.
///
/// Use [`Controller::state`](crate::Controller::state) to obtain a snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControllerState {
    /// Where the controller is in its lifecycle.
    pub lifecycle: Lifecycle,
    /// Current scale factor.
    pub factor: f64,
    /// Current appearance.
    pub appearance: Appearance,
    /// Crop window for the current factor.
    pub crop: Option<CropWindow>,
    /// Stills captured during this run.
    pub captures: u32,
    /// Inputs still producing events.
    pub active_sources: usize,
}
