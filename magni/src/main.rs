use log::{error, info, warn};
use magni_core::{
    Config, Controller, ControllerError, Debouncer, GpioSource, KeySource, MockCamera,
    PointerSource, Size, SysfsPin,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

const DEFAULT_CONFIG: &str = "magni.toml";

fn load_config() -> Result<Config, magni_core::ConfigError> {
    match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => Config::load(path),
        None if Path::new(DEFAULT_CONFIG).exists() => Config::load(DEFAULT_CONFIG),
        None => {
            info!("no {} found, using built-in defaults", DEFAULT_CONFIG);
            Ok(Config::default())
        }
    }
}

fn build(config: &Config) -> Result<Controller, ControllerError> {
    // No hardware camera driver is linked in; the mock records what a real
    // backend would be asked to do.
    let camera = MockCamera::new()
        .with_addressing(config.camera.addressing)
        .with_sensor(Size::new(
            config.camera.sensor_width,
            config.camera.sensor_height,
        ));
    let mut controller = Controller::new(config, Box::new(camera))?;

    controller.add_source(Box::new(KeySource::stdin().with_mouse(config.capture_mouse)));
    for &pin in &config.gpio.pins {
        let debouncer = Debouncer::new(
            config.bounce_window(),
            config.gpio.active_low,
            config.gpio.trigger,
        );
        let source = GpioSource::new(pin, SysfsPin::new(pin), debouncer)
            .with_sample_interval(Duration::from_millis(config.gpio.sample_ms.max(1)));
        controller.add_source(Box::new(source));
    }
    for device in &config.pointer_devices {
        controller.add_source(Box::new(PointerSource::open(device)));
    }

    controller.on_read_aloud(|path| {
        warn!(
            "read-aloud requested but no speech pipeline is available; still saved to {}",
            path.display()
        );
    });
    Ok(controller)
}

fn main() -> ExitCode {
    env_logger::init();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };

    let mut controller = match build(&config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };

    let injector = controller.injector("signal");
    if let Err(e) = ctrlc::set_handler(move || {
        if !injector.quit() {
            warn!("signal received after shutdown");
        }
    }) {
        warn!("failed to install signal handler: {}", e);
    }

    match controller.run() {
        Ok(outcome) => {
            for failure in &outcome.release_failures {
                warn!("{}", failure);
            }
            info!(
                "stopped ({:?}), {} queued command(s) discarded",
                outcome.reason, outcome.discarded
            );
            ExitCode::from(outcome.reason.exit_code())
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(1)
        }
    }
}
