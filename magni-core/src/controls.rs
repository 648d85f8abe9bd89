//! Bounded accumulators for image controls.

use crate::camera::{Camera, Control, ControlRange};
use log::debug;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    range: ControlRange,
    value: f64,
}

/// Current values of the controls a backend advertises.
///
/// Built once from [`Camera::query_control_range`]. Adjusting a control the
/// backend did not advertise returns `None` and changes nothing.
#[derive(Debug, Clone, Default)]
pub struct ControlBank {
    controls: HashMap<Control, Accumulator>,
}

impl ControlBank {
    /// Query every known control from `camera`.
    pub fn query(camera: &dyn Camera) -> Self {
        let controls = Control::ALL
            .into_iter()
            .filter_map(|control| {
                let range = camera.query_control_range(control)?;
                debug!(
                    "{} control {}: {}..{} (default {})",
                    camera.name(),
                    control,
                    range.min,
                    range.max,
                    range.default
                );
                Some((
                    control,
                    Accumulator {
                        range,
                        value: range.default,
                    },
                ))
            })
            .collect();
        Self { controls }
    }

    /// Current value of `control`.
    pub fn value(&self, control: Control) -> Option<f64> {
        self.controls.get(&control).map(|acc| acc.value)
    }

    /// Add `delta` to `control`, clamped to its range.
    pub fn offset(&mut self, control: Control, delta: f64) -> Option<f64> {
        self.update(control, |value| value + delta)
    }

    /// Multiply `control` by `factor`, clamped to its range.
    pub fn scale(&mut self, control: Control, factor: f64) -> Option<f64> {
        self.update(control, |value| value * factor)
    }

    fn update(&mut self, control: Control, f: impl FnOnce(f64) -> f64) -> Option<f64> {
        let acc = self.controls.get_mut(&control)?;
        acc.value = acc.range.clamp(f(acc.value));
        Some(acc.value)
    }
}
