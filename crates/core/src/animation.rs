//! Time-driven animation state.
//!
//! [`AnimationState`] holds accumulated angle and phases and is advanced by a
//! pure transition, [`AnimationState::advanced`]. Phases grow without bound;
//! periodicity comes from the trig functions that read them.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// A sinusoid `offset + amplitude * sin(phase + phase_shift)` whose phase
/// advances at `rate` rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Oscillation {
    pub amplitude: f32,
    pub rate: f32,
    /// Constant added to every sample.
    pub offset: f32,
    /// Radians added to the accumulated phase; sets the value at time zero.
    pub phase_shift: f32,
}

impl Oscillation {
    /// An oscillation that always evaluates to zero.
    pub const NONE: Oscillation = Oscillation {
        amplitude: 0.0,
        rate: 0.0,
        offset: 0.0,
        phase_shift: 0.0,
    };

    pub fn new(amplitude: f32, rate: f32) -> Self {
        Self {
            amplitude,
            rate,
            ..Self::NONE
        }
    }

    /// Swings between `low` and `high`, starting at `low`.
    pub fn between(low: f32, high: f32, rate: f32) -> Self {
        Self {
            amplitude: (high - low) / 2.0,
            rate,
            offset: (high + low) / 2.0,
            phase_shift: -std::f32::consts::FRAC_PI_2,
        }
    }

    /// Value at `phase`.
    pub fn sample(&self, phase: f64) -> f32 {
        let shifted = phase + f64::from(self.phase_shift);
        self.offset + self.amplitude * shifted.sin() as f32
    }

    pub fn is_active(&self) -> bool {
        self.amplitude != 0.0 || self.offset != 0.0
    }
}

impl Default for Oscillation {
    fn default() -> Self {
        Self::NONE
    }
}

/// How animation state maps elapsed time to motion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationSpec {
    /// Radians of rotation per second.
    pub spin_rate: f32,
    /// Rotation axis in object space. Normalized when the model matrix is built.
    pub spin_axis: Vec3,
    /// Vertical offset in world units.
    pub bob: Oscillation,
    /// Uniform scale offset; scale is `1 + pulse`.
    pub pulse: Oscillation,
}

impl Default for AnimationSpec {
    /// One radian per second about +Y, no bobbing or pulsing.
    fn default() -> Self {
        Self {
            spin_rate: 1.0,
            spin_axis: Vec3::Y,
            bob: Oscillation::NONE,
            pulse: Oscillation::NONE,
        }
    }
}

/// Accumulated animation scalars. Stored as `f64` so long runs keep precision.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnimationState {
    /// Accumulated rotation angle in radians.
    pub angle: f64,
    pub bob_phase: f64,
    pub pulse_phase: f64,
    /// Total elapsed seconds.
    pub elapsed: f64,
}

impl AnimationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The state after `dt` more seconds. Negative or non-finite `dt` is
    /// treated as zero.
    pub fn advanced(self, dt: f64, spec: &AnimationSpec) -> Self {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        Self {
            angle: self.angle + dt * f64::from(spec.spin_rate),
            bob_phase: self.bob_phase + dt * f64::from(spec.bob.rate),
            pulse_phase: self.pulse_phase + dt * f64::from(spec.pulse.rate),
            elapsed: self.elapsed + dt,
        }
    }

    pub fn advance(&mut self, dt: f64, spec: &AnimationSpec) {
        *self = self.advanced(dt, spec);
    }

    /// Current bob offset for `spec`.
    pub fn bob_offset(&self, spec: &AnimationSpec) -> f32 {
        spec.bob.sample(self.bob_phase)
    }

    /// Current uniform scale for `spec`.
    pub fn scale(&self, spec: &AnimationSpec) -> f32 {
        1.0 + spec.pulse.sample(self.pulse_phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_spec_spins_one_radian_per_second() {
        let spec = AnimationSpec::default();
        let state = AnimationState::new().advanced(2.5, &spec);
        assert!((state.angle - 2.5).abs() < 1e-12);
        assert_eq!(state.bob_phase, 0.0);
        assert_eq!(state.scale(&spec), 1.0);
    }

    #[test]
    fn spin_rate_scales_angle() {
        let spec = AnimationSpec {
            spin_rate: 3.0,
            ..AnimationSpec::default()
        };
        let state = AnimationState::new().advanced(0.5, &spec);
        assert!((state.angle - 1.5).abs() < 1e-12);
    }

    #[test]
    fn phases_are_not_wrapped() {
        let spec = AnimationSpec {
            pulse: Oscillation::new(0.5, 2.0),
            ..AnimationSpec::default()
        };
        let mut state = AnimationState::new();
        for _ in 0..100 {
            state.advance(1.0, &spec);
        }
        assert!((state.angle - 100.0).abs() < 1e-9, "angle {}", state.angle);
        assert!((state.pulse_phase - 200.0).abs() < 1e-9);
    }

    #[test]
    fn negative_and_nan_dt_are_ignored() {
        let spec = AnimationSpec::default();
        let state = AnimationState::new()
            .advanced(-1.0, &spec)
            .advanced(f64::NAN, &spec);
        assert_eq!(state, AnimationState::new());
    }

    #[test]
    fn oscillation_samples_sine() {
        let osc = Oscillation::new(2.0, 1.0);
        assert!((osc.sample(std::f64::consts::FRAC_PI_2) - 2.0).abs() < 1e-6);
        assert!(osc.sample(0.0).abs() < 1e-6);
        assert!(!Oscillation::NONE.is_active());
    }

    #[test]
    fn between_starts_low_and_peaks_high() {
        let osc = Oscillation::between(0.0, 1.0, 2.0);
        assert!(osc.sample(0.0).abs() < 1e-6);
        assert!((osc.sample(std::f64::consts::PI) - 1.0).abs() < 1e-6);
        assert!(osc.is_active());
    }

    #[test]
    fn between_matches_integrated_sine_rate() {
        // Accumulating dt * sin(2t) gives (1 - cos 2t) / 2.
        let osc = Oscillation::between(0.0, 1.0, 2.0);
        let dt = 1e-4;
        let mut integrated = 0.0f64;
        for step in 0..30_000u32 {
            let t = step as f64 * dt;
            integrated += dt * (2.0 * t).sin();
            if step.is_multiple_of(5_000) {
                let sampled = f64::from(osc.sample(2.0 * (t + dt)));
                assert!((sampled - integrated).abs() < 1e-3, "t={t}: {sampled} vs {integrated}");
            }
        }
    }

    #[test]
    fn spec_deserializes_with_defaults() {
        let spec: AnimationSpec =
            serde_json::from_str(r#"{"spin_rate": 2.0, "pulse": {"amplitude": 0.25}}"#).unwrap();
        assert_eq!(spec.spin_rate, 2.0);
        assert_eq!(spec.spin_axis, Vec3::Y);
        assert_eq!(spec.pulse.amplitude, 0.25);
        assert_eq!(spec.pulse.rate, 0.0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn step() -> impl Strategy<Value = f64> {
            0.0_f64..0.25
        }

        proptest! {
            #[test]
            fn replayed_steps_match_single_update(
                steps in prop::collection::vec(step(), 1..64),
                spin_rate in 0.1_f32..4.0,
                pulse_rate in 0.0_f32..4.0,
            ) {
                let spec = AnimationSpec {
                    spin_rate,
                    pulse: Oscillation::new(0.5, pulse_rate),
                    ..AnimationSpec::default()
                };
                let total: f64 = steps.iter().sum();
                let replayed = steps
                    .iter()
                    .fold(AnimationState::new(), |s, &dt| s.advanced(dt, &spec));
                let single = AnimationState::new().advanced(total, &spec);
                prop_assert!(
                    (replayed.angle - single.angle).abs() < 1e-9,
                    "replayed {} vs single {}", replayed.angle, single.angle
                );
                prop_assert!((replayed.pulse_phase - single.pulse_phase).abs() < 1e-9);
                prop_assert!((replayed.elapsed - total).abs() < 1e-12);
            }

            #[test]
            fn angle_is_monotonic_for_positive_rate(
                steps in prop::collection::vec(step(), 1..32),
            ) {
                let spec = AnimationSpec::default();
                let mut state = AnimationState::new();
                for dt in steps {
                    let before = state.angle;
                    state.advance(dt, &spec);
                    prop_assert!(state.angle >= before);
                }
            }
        }
    }
}
