//! Error types for the magnifier controller.

/// Errors raised while loading or validating the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML or has the wrong shape.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed fine but is outside what the controller can use.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors reported by a camera backend.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// The backend does not implement the requested operation.
    #[error("Camera does not support {0}")]
    Unsupported(&'static str),

    /// The camera could not be opened or started.
    #[error("Failed to open camera: {0}")]
    Open(String),

    /// A call into the camera driver failed.
    #[error("Camera call {operation} failed: {reason}")]
    Call {
        /// The facade operation that failed.
        operation: &'static str,
        /// Driver-provided reason.
        reason: String,
    },

    /// An I/O error occurred (e.g., writing a captured still).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by an input source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The input device or line could not be acquired.
    #[error("Failed to acquire input {name}: {reason}")]
    Acquire {
        /// Source name.
        name: String,
        /// Why acquisition failed.
        reason: String,
    },

    /// The source ended normally (e.g. end of stream, feeder dropped).
    #[error("Input {0} disconnected")]
    Disconnected(String),

    /// The underlying hardware channel can no longer be read.
    #[error("Input {name} became unreadable: {reason}")]
    Unreadable {
        /// Source name.
        name: String,
        /// Why the read failed.
        reason: String,
    },

    /// The source could not release its OS handle.
    #[error("Failed to release input {name}: {reason}")]
    Release {
        /// Source name.
        name: String,
        /// Why the release failed.
        reason: String,
    },

    /// An I/O error occurred while talking to the device.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Whether the source ended because of a read failure rather than a clean
    /// end of input.
    pub fn is_failure(&self) -> bool {
        !matches!(self, SourceError::Disconnected(_))
    }
}

/// Errors that stop the controller from reaching the running state.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The camera could not be started or the initial crop could not be applied.
    #[error("Camera acquisition failed: {0}")]
    CameraAcquisition(#[source] CameraError),

    /// An input source could not be acquired.
    #[error("Input acquisition failed: {0}")]
    SourceAcquisition(#[source] SourceError),

    /// `run` was called on a controller that already ran.
    #[error("Controller already stopped - create a new one to run again")]
    AlreadyStopped,
}

/// A resource that failed to release during shutdown.
///
/// Shutdown never aborts on these; they are collected and reported in the
/// run outcome.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseFailure {
    /// An input source refused to release.
    #[error("input {name}: {error}")]
    Source {
        /// Source name.
        name: String,
        /// The release error.
        error: SourceError,
    },

    /// The camera failed to stop or close.
    #[error("camera {step}: {error}")]
    Camera {
        /// `"stop"` or `"close"`.
        step: &'static str,
        /// The camera error.
        error: CameraError,
    },
}
