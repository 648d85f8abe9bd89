//! Input dispatch and magnification control for a camera-based reading
//! magnifier.
//!
//! A camera looks down at a page and its preview fills a screen. Buttons on
//! GPIO lines, keys and pointer buttons are mapped to commands that cycle
//! through preset magnifications, invert the colours, focus, adjust the image
//! and capture stills. This crate holds everything between the inputs and
//! the camera driver:
//!
//! - input sources ([`GpioSource`] with debouncing, [`KeySource`],
//!   [`PointerSource`])
//! - an [`InputMultiplexer`] that turns inputs into one serial command queue
//! - the [`Magnifier`] state machine and [`CropGeometry`]
//! - a [`Camera`] facade with per-backend [`Capabilities`]
//! - the [`Controller`], which owns all of the above and guarantees teardown
//!
//! # Example
//!
//! ```no_run
//! use magni_core::{Config, Controller, GpioSource, KeySource, MockCamera, Debouncer, SysfsPin};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("magni.toml")?;
//!     let mut controller = Controller::new(&config, Box::new(MockCamera::new()))?;
//!
//!     controller.add_source(Box::new(KeySource::stdin()));
//!     for &pin in &config.gpio.pins {
//!         let debouncer = Debouncer::new(
//!             config.bounce_window(),
//!             config.gpio.active_low,
//!             config.gpio.trigger,
//!         );
//!         controller.add_source(Box::new(GpioSource::new(pin, SysfsPin::new(pin), debouncer)));
//!     }
//!
//!     let outcome = controller.run()?;
//!     println!("stopped: {:?}", outcome.reason);
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! Use [`MockCamera`] and [`ScriptedSource`] to drive the controller without
//! hardware:
//!
//! ```
//! use magni_core::{CameraCall, Config, Controller, InputId, MockCamera, ScriptedSource};
//!
//! let camera = MockCamera::new();
//! let recorder = camera.recorder();
//! let mut controller = Controller::new(&Config::default(), Box::new(camera)).unwrap();
//!
//! let (feed, buttons) = ScriptedSource::channel("buttons");
//! controller.add_source(Box::new(buttons));
//! feed.press(InputId::Pin(18)); // toggle appearance
//! drop(feed);
//!
//! controller.run().unwrap();
//! assert_eq!(recorder.calls().last(), Some(&CameraCall::Close));
//! ```

#![warn(missing_docs)]

mod camera;
mod command;
mod config;
mod controller;
mod controls;
mod error;
mod geometry;
mod input;
mod magnifier;
mod multiplexer;
mod state;

// Re-export public API
pub use camera::{
    Camera, CameraCall, Capabilities, Control, ControlRange, MockCamera, MockRecorder,
};
pub use command::{Binding, BindingTable, Command, InputId};
pub use config::{CameraConfig, Config, GpioConfig};
pub use controller::{Controller, Outcome, StopReason};
pub use controls::ControlBank;
pub use error::{CameraError, ConfigError, ControllerError, ReleaseFailure, SourceError};
pub use geometry::{Addressing, CropGeometry, CropWindow, Region, Rotation, Size};
pub use input::{
    DebounceRecord, Debouncer, GpioSource, InputSource, KeySource, Level, LevelReader,
    PointerSource, PressedEvent, ScriptedFeed, ScriptedSource, SysfsPin, Trigger,
};
pub use magnifier::{Appearance, Magnifier, ScaleLadder, WIDTH_PER_DISTANCE};
pub use multiplexer::{CommandInjector, Dispatch, InputMultiplexer};
pub use state::{ControllerState, Lifecycle};
