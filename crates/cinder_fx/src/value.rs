//! # Time-Varying Particle Values
//!
//! A [`ParticleValue`] describes how an authored attribute varies: a
//! constant, a random range sampled once at spawn, or a keyframed curve
//! over normalized age. Definitions are immutable after construction and
//! evaluation is a pure function of time - no hidden state.
//!
//! ## Degraded data policy
//!
//! Authored documents degrade visually, never fatally:
//! - A missing value field defaults to the neutral constant
//! - An inverted random range is reordered before sampling
//! - Evaluation time is clamped to `[0, 1]`, so out-of-range saved
//!   keyframes cannot read outside the curve

use cinder_core::{Vec3, Vec4};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Types that can be lerped and uniformly sampled between two endpoints.
///
/// Implemented for the attribute payloads the simulation stores:
/// scalars, vectors, and colors.
pub trait Interpolate: Copy + PartialEq {
    /// The neutral value used when authored data is absent.
    const NEUTRAL: Self;

    /// Linear interpolation: `a` at t=0, `b` at t=1.
    #[must_use]
    fn lerp_between(a: Self, b: Self, t: f32) -> Self;

    /// Uniform sample between `a` and `b`, component-wise.
    ///
    /// Tolerates inverted ranges (`a > b`).
    #[must_use]
    fn sample_between<R: Rng>(a: Self, b: Self, rng: &mut R) -> Self;
}

/// Uniform sample in a possibly-inverted scalar range.
fn sample_f32<R: Rng>(a: f32, b: f32, rng: &mut R) -> f32 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if hi - lo <= f32::EPSILON {
        lo
    } else {
        rng.gen_range(lo..=hi)
    }
}

impl Interpolate for f32 {
    const NEUTRAL: Self = 0.0;

    fn lerp_between(a: Self, b: Self, t: f32) -> Self {
        a + (b - a) * t
    }

    fn sample_between<R: Rng>(a: Self, b: Self, rng: &mut R) -> Self {
        sample_f32(a, b, rng)
    }
}

impl Interpolate for Vec3 {
    const NEUTRAL: Self = Vec3::ZERO;

    fn lerp_between(a: Self, b: Self, t: f32) -> Self {
        a.lerp(b, t)
    }

    fn sample_between<R: Rng>(a: Self, b: Self, rng: &mut R) -> Self {
        Vec3::new(
            sample_f32(a.x, b.x, rng),
            sample_f32(a.y, b.y, rng),
            sample_f32(a.z, b.z, rng),
        )
    }
}

impl Interpolate for Vec4 {
    const NEUTRAL: Self = Vec4::ZERO;

    fn lerp_between(a: Self, b: Self, t: f32) -> Self {
        a.lerp(b, t)
    }

    fn sample_between<R: Rng>(a: Self, b: Self, rng: &mut R) -> Self {
        Vec4::new(
            sample_f32(a.x, b.x, rng),
            sample_f32(a.y, b.y, rng),
            sample_f32(a.z, b.z, rng),
            sample_f32(a.w, b.w, rng),
        )
    }
}

/// A single point on a keyframed curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keyframe<T> {
    /// Normalized time in `[0, 1]`.
    pub t: f32,
    /// The value at that time.
    pub value: T,
}

/// How an authored particle attribute varies over a particle's life.
///
/// Keyframe lists must be sorted by time; the authoring tools write them
/// sorted and the sampler treats unsorted lists as an authoring error
/// (it still cannot read out of bounds).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticleValue<T: Interpolate> {
    /// The same value for every particle at every age.
    Constant(T),
    /// Uniform random in `[min, max]`, sampled once per particle at spawn.
    RandomRange {
        /// Lower bound (component-wise).
        min: T,
        /// Upper bound (component-wise).
        max: T,
    },
    /// Piecewise-linear curve over normalized age.
    Keyframes(Vec<Keyframe<T>>),
}

/// Scalar attribute definition.
pub type ScalarValue = ParticleValue<f32>;
/// Vector attribute definition.
pub type Vec3Value = ParticleValue<Vec3>;
/// Color attribute definition.
pub type ColorValue = ParticleValue<Vec4>;

impl<T: Interpolate> Default for ParticleValue<T> {
    fn default() -> Self {
        Self::Constant(T::NEUTRAL)
    }
}

impl<T: Interpolate> ParticleValue<T> {
    /// Evaluates the value at normalized age `t` (clamped to `[0, 1]`).
    ///
    /// `RandomRange` has no time dependence, so it evaluates to its
    /// midpoint here; use [`ParticleValue::sample_spawn`] for the
    /// per-particle draw.
    #[must_use]
    pub fn evaluate(&self, t: f32) -> T {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Constant(v) => *v,
            Self::RandomRange { min, max } => T::lerp_between(*min, *max, 0.5),
            Self::Keyframes(keys) => sample_keyframes(keys, t),
        }
    }

    /// Draws the spawn-time value for one particle.
    ///
    /// `Constant` and `Keyframes` ignore the rng; `RandomRange` consumes
    /// exactly one draw per component so replays stay deterministic.
    #[must_use]
    pub fn sample_spawn<R: Rng>(&self, rng: &mut R) -> T {
        match self {
            Self::Constant(v) => *v,
            Self::RandomRange { min, max } => T::sample_between(*min, *max, rng),
            Self::Keyframes(keys) => sample_keyframes(keys, 0.0),
        }
    }

    /// True if evaluation depends on normalized age.
    #[must_use]
    pub fn is_time_varying(&self) -> bool {
        matches!(self, Self::Keyframes(_))
    }
}

/// Samples a sorted keyframe list at clamped time `t`.
fn sample_keyframes<T: Interpolate>(keys: &[Keyframe<T>], t: f32) -> T {
    let Some(first) = keys.first() else {
        return T::NEUTRAL;
    };
    if t <= first.t {
        return first.value;
    }
    for pair in keys.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if t >= a.t && t <= b.t {
            let span = b.t - a.t;
            if span <= f32::EPSILON {
                return b.value;
            }
            return T::lerp_between(a.value, b.value, (t - a.t) / span);
        }
    }
    // Past the last key (or unsorted authored data): hold the last value.
    keys.last().map_or(T::NEUTRAL, |k| k.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_constant_evaluate() {
        let v = ScalarValue::Constant(3.0);
        assert_eq!(v.evaluate(0.0), 3.0);
        assert_eq!(v.evaluate(1.0), 3.0);
        assert_eq!(v.evaluate(99.0), 3.0); // out-of-range clamps
    }

    #[test]
    fn test_keyframes_lerp() {
        let v = ScalarValue::Keyframes(vec![
            Keyframe { t: 0.0, value: 0.0 },
            Keyframe { t: 1.0, value: 10.0 },
        ]);
        assert_eq!(v.evaluate(0.5), 5.0);
        assert_eq!(v.evaluate(-1.0), 0.0);
        assert_eq!(v.evaluate(2.0), 10.0);
    }

    #[test]
    fn test_random_range_inverted_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let v = ScalarValue::RandomRange { min: 5.0, max: 1.0 };
        for _ in 0..64 {
            let s = v.sample_spawn(&mut rng);
            assert!((1.0..=5.0).contains(&s));
        }
    }

    #[test]
    fn test_random_range_deterministic() {
        let v = Vec3Value::RandomRange {
            min: Vec3::new(-1.0, 0.0, -1.0),
            max: Vec3::new(1.0, 5.0, 1.0),
        };
        let a: Vec<Vec3> = {
            let mut rng = ChaCha8Rng::seed_from_u64(42);
            (0..16).map(|_| v.sample_spawn(&mut rng)).collect()
        };
        let b: Vec<Vec3> = {
            let mut rng = ChaCha8Rng::seed_from_u64(42);
            (0..16).map(|_| v.sample_spawn(&mut rng)).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_json_round_trip() {
        let values = [
            ScalarValue::Constant(2.5),
            ScalarValue::RandomRange { min: 0.5, max: 1.5 },
            ScalarValue::Keyframes(vec![
                Keyframe { t: 0.0, value: 1.0 },
                Keyframe { t: 0.5, value: 0.25 },
                Keyframe { t: 1.0, value: 0.0 },
            ]),
        ];
        for v in &values {
            let json = serde_json::to_string(v).unwrap();
            let back: ScalarValue = serde_json::from_str(&json).unwrap();
            assert_eq!(*v, back);
        }
    }

    #[test]
    fn test_empty_keyframes_neutral() {
        let v = ColorValue::Keyframes(Vec::new());
        assert_eq!(v.evaluate(0.5), Vec4::ZERO);
    }
}
