//! Scale factor and appearance state machine.
//!
//! [`Magnifier`] owns the current scale factor and colour appearance. It is a
//! plain value type with no I/O; the controller applies its results to the
//! camera.

use crate::error::ConfigError;
use log::warn;
use std::fmt;

/// Visible surface width per cm of camera-to-surface distance,
/// measured on the reference setup.
pub const WIDTH_PER_DISTANCE: f64 = 0.67;

// =============================================================================
// Scale Ladder
// =============================================================================

/// Preset scale factors cycled through by [`Magnifier::next_factor`].
///
/// Ascending order is conventional but not required.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleLadder {
    factors: Vec<f64>,
}

impl ScaleLadder {
    /// Create a ladder from explicit factors.
    ///
    /// # Errors
    /// Returns an error if the list is empty or holds a non-positive or
    /// non-finite value.
    pub fn new(factors: Vec<f64>) -> Result<Self, ConfigError> {
        if factors.is_empty() {
            return Err(ConfigError::Invalid("scale ladder is empty".into()));
        }
        if let Some(bad) = factors.iter().find(|v| !v.is_finite() || **v <= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "scale factor {bad} must be a positive number"
            )));
        }
        Ok(Self { factors })
    }

    /// Build a ladder from line widths to fit on screen.
    ///
    /// `default_factor` is the magnification at which `default_width_cm` of the
    /// surface fills the screen; each entry of `widths_cm` becomes
    /// `default_factor * default_width_cm / width`. A width equal to
    /// `default_width_cm` maps to exactly `default_factor`.
    pub fn from_widths(
        default_factor: f64,
        default_width_cm: f64,
        widths_cm: &[f64],
    ) -> Result<Self, ConfigError> {
        if let Some(bad) = widths_cm.iter().find(|w| !w.is_finite() || **w <= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "line width {bad} cm must be a positive number"
            )));
        }
        Self::new(
            widths_cm
                .iter()
                .map(|width| default_factor * (default_width_cm / width))
                .collect(),
        )
    }

    /// The preset factors in configured order.
    pub fn factors(&self) -> &[f64] {
        &self.factors
    }

    /// The first preset, used as the initial factor.
    pub fn first(&self) -> f64 {
        self.factors[0]
    }

    /// Number of presets.
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    /// Always false; a ladder cannot be empty.
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// The preset following the largest preset that is `<= current`,
    /// wrapping after the last. `None` when every preset is above `current`.
    pub fn next_after(&self, current: f64) -> Option<f64> {
        let closest = self
            .factors
            .iter()
            .copied()
            .filter(|v| *v <= current)
            .reduce(f64::max)?;
        let index = self.factors.iter().position(|v| *v == closest)?;
        Some(self.factors[(index + 1) % self.factors.len()])
    }
}

// =============================================================================
// Appearance
// =============================================================================

/// Colour appearance of the preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Appearance {
    /// Natural colours.
    #[default]
    Normal,
    /// Negative image, light text on dark background.
    Inverted,
}

impl Appearance {
    /// The other appearance.
    pub fn toggled(self) -> Self {
        match self {
            Appearance::Normal => Appearance::Inverted,
            Appearance::Inverted => Appearance::Normal,
        }
    }
}

impl fmt::Display for Appearance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Appearance::Normal => f.write_str("normal"),
            Appearance::Inverted => f.write_str("inverted"),
        }
    }
}

// =============================================================================
// Magnifier
// =============================================================================

/// The magnification state machine.
///
/// The factor never drops below `default_factor`; requests below it are
/// clamped rather than rejected.
#[derive(Debug, Clone)]
pub struct Magnifier {
    ladder: ScaleLadder,
    default_factor: f64,
    factor: f64,
    appearance: Appearance,
}

impl Magnifier {
    /// Create a magnifier starting at the first ladder preset.
    pub fn new(ladder: ScaleLadder, default_factor: f64) -> Self {
        let factor = ladder.first().max(default_factor);
        Self {
            ladder,
            default_factor,
            factor,
            appearance: Appearance::Normal,
        }
    }

    /// Current scale factor.
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Current appearance.
    pub fn appearance(&self) -> Appearance {
        self.appearance
    }

    /// Advance to the next preset.
    ///
    /// An off-ladder factor rounds down to the closest preset before stepping,
    /// so a factor of 7 on `[2, 5, 10]` moves to 10. A factor below every
    /// preset falls back to the floor.
    pub fn next_factor(&mut self) -> f64 {
        let next = self
            .ladder
            .next_after(self.factor)
            .unwrap_or(self.default_factor);
        self.set_factor(next)
    }

    /// Set an absolute factor, clamped to the floor.
    pub fn set_factor(&mut self, requested: f64) -> f64 {
        self.factor = if requested.is_nan() {
            self.default_factor
        } else {
            requested.max(self.default_factor)
        };
        if !self.factor.is_finite() {
            warn!("ignoring infinite scale factor request");
            self.factor = self.default_factor;
        }
        self.factor
    }

    /// Change the factor by `delta`, clamped to the floor.
    pub fn zoom(&mut self, delta: f64) -> f64 {
        self.set_factor(self.factor + delta)
    }

    /// Flip the appearance and return the new one.
    pub fn toggle_appearance(&mut self) -> Appearance {
        self.appearance = self.appearance.toggled();
        self.appearance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn magnifier(factors: &[f64], floor: f64) -> Magnifier {
        Magnifier::new(ScaleLadder::new(factors.to_vec()).unwrap(), floor)
    }

    #[test]
    fn test_next_factor_cycles_ladder() {
        let mut m = magnifier(&[2.0, 5.0, 10.0], 1.0);
        assert_eq!(m.factor(), 2.0);
        assert_eq!(m.next_factor(), 5.0);
        assert_eq!(m.next_factor(), 10.0);
        assert_eq!(m.next_factor(), 2.0);
    }

    #[test]
    fn test_next_factor_rounds_down_off_ladder() {
        let mut m = magnifier(&[2.0, 5.0, 10.0], 1.0);
        m.set_factor(7.0);
        assert_eq!(m.next_factor(), 10.0);
    }

    #[test]
    fn test_next_factor_above_ladder_wraps() {
        let mut m = magnifier(&[2.0, 5.0, 10.0], 1.0);
        m.set_factor(42.0);
        assert_eq!(m.next_factor(), 2.0);
    }

    #[test]
    fn test_next_factor_below_ladder_falls_back_to_floor() {
        let mut m = magnifier(&[2.0, 5.0, 10.0], 1.0);
        m.set_factor(1.5);
        assert_eq!(m.next_factor(), 1.0);
    }

    #[test]
    fn test_next_factor_unordered_ladder() {
        let mut m = magnifier(&[5.0, 2.0, 10.0], 1.0);
        m.set_factor(6.0);
        // closest preset <= 6 is 5 at index 0
        assert_eq!(m.next_factor(), 2.0);
        assert_eq!(m.next_factor(), 10.0);
        assert_eq!(m.next_factor(), 5.0);
    }

    #[test]
    fn test_ladder_cycle_returns_to_start() {
        let ladders: [&[f64]; 4] = [
            &[2.5],
            &[2.5, 3.3],
            &[2.5, 3.28, 4.56, 8.2],
            &[1.0, 2.0, 4.0, 8.0, 16.0],
        ];
        for factors in ladders {
            for start in factors {
                let mut m = magnifier(factors, 1.0);
                m.set_factor(*start);
                let mut seen = Vec::new();
                for _ in 0..factors.len() {
                    seen.push(m.next_factor());
                }
                assert_eq!(m.factor(), *start, "ladder {factors:?} from {start}");
                for v in factors.iter() {
                    assert!(seen.contains(v), "ladder {factors:?} skipped {v}");
                }
            }
        }
    }

    #[test]
    fn test_any_start_lands_on_ladder_then_cycles() {
        let factors = [2.0, 5.0, 10.0];
        for start in [2.0, 3.0, 5.0, 7.0, 9.99, 10.0, 100.0] {
            let mut m = magnifier(&factors, 2.0);
            m.set_factor(start);
            let first = m.next_factor();
            assert!(factors.contains(&first));
            for _ in 0..factors.len() {
                m.next_factor();
            }
            assert_eq!(m.factor(), first);
        }
    }

    #[test]
    fn test_set_factor_clamps_to_floor() {
        let mut m = magnifier(&[2.5, 5.0], 2.5);
        for requested in [-100.0, -1.0, 0.0, 1.0, 2.4, f64::NAN, f64::NEG_INFINITY] {
            assert_eq!(m.set_factor(requested), 2.5, "request {requested}");
        }
        assert_eq!(m.set_factor(6.0), 6.0);
        assert!(m.set_factor(f64::INFINITY) >= 2.5);
    }

    #[test]
    fn test_zoom_is_relative_and_clamped() {
        let mut m = magnifier(&[3.0], 2.5);
        assert_eq!(m.zoom(0.5), 3.5);
        assert_eq!(m.zoom(-10.0), 2.5);
    }

    #[test]
    fn test_toggle_appearance_is_involution() {
        let mut m = magnifier(&[2.0], 1.0);
        let before = m.appearance();
        assert_eq!(m.toggle_appearance(), Appearance::Inverted);
        assert_eq!(m.toggle_appearance(), before);
    }

    #[test]
    fn test_ladder_from_widths() {
        let default_width = 24.5 * WIDTH_PER_DISTANCE;
        let ladder =
            ScaleLadder::from_widths(2.5, default_width, &[default_width, 12.5, 9.0, 5.0]).unwrap();
        let f = ladder.factors();
        assert!((f[0] - 2.5).abs() < 1e-9);
        assert!((f[1] - 2.5 * default_width / 12.5).abs() < 1e-9);
        assert!(f.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_ladder_rejects_bad_values() {
        assert!(ScaleLadder::new(vec![]).is_err());
        assert!(ScaleLadder::new(vec![2.0, 0.0]).is_err());
        assert!(ScaleLadder::new(vec![f64::NAN]).is_err());
        assert!(ScaleLadder::from_widths(2.5, 16.0, &[-1.0]).is_err());
    }
}
