//! # Update Modules
//!
//! An update module mutates one slice of a group's attribute state,
//! once per frame, over the live range `[0, live_count)`. Modules are
//! tagged variants dispatched through a single match - no virtual calls
//! in the per-particle loop, and the set stays open through
//! [`ModuleId`]-keyed registration in the effect library.
//!
//! ## Field ownership and ordering
//!
//! Each variant documents the fields it writes. The authored order is
//! authoritative: force modules must accumulate into velocity before
//! `Translate` consumes it, and `Lifetime` must run last because it
//! flags expired rows. The framework preserves the authored order
//! exactly (including across save/load) and treats a wrong order as an
//! authoring error, not a framework fault.

use crate::group::ParticleStore;
use crate::value::{ColorValue, ScalarValue, Vec3Value};
use cinder_core::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Stable identifier for each update module kind.
///
/// Used for serialization, editor lookup, and the GPU parameter block.
/// Values are part of the authored-data format: never reorder them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ModuleId {
    /// Constant acceleration.
    Gravity = 0,
    /// Constant directional force.
    LinearForce = 1,
    /// Velocity damping.
    Drag = 2,
    /// Procedural turbulence force.
    NoiseForce = 3,
    /// Authored position path over life.
    KeyframePath = 4,
    /// Color curve over life.
    ColorOverLife = 5,
    /// UV offset scroll.
    UvScroll = 6,
    /// Rotation speed over life.
    RotationOverLife = 7,
    /// Scale curve over life.
    ScaleOverLife = 8,
    /// Velocity integration into position.
    Translate = 9,
    /// Trail length accumulation.
    Trail = 10,
    /// Renderer geometry pattern selector.
    ShapeGeometry = 11,
    /// Aging and expiry.
    Lifetime = 12,
}

/// Visual geometry pattern emitted by [`UpdateModule::ShapeGeometry`].
///
/// These drive which atlas row / mesh ribbon the renderer picks for a
/// particle. They are render-facing only: the module writing them never
/// touches position, velocity, or lifetime, so a pattern can never
/// corrupt core simulation state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryPattern {
    /// Curved slash arc.
    Crescent,
    /// Extruded tube.
    Cylinder,
    /// Jagged bolt.
    Lightning,
    /// Flat quad.
    Plane,
    /// Expanding ring.
    Ring,
}

impl GeometryPattern {
    /// Atlas row index for the renderer.
    #[must_use]
    pub(crate) const fn atlas_row(self) -> f32 {
        match self {
            Self::Crescent => 0.0,
            Self::Cylinder => 1.0,
            Self::Lightning => 2.0,
            Self::Plane => 3.0,
            Self::Ring => 4.0,
        }
    }

    /// Pattern-specific spin rate in radians per second.
    #[must_use]
    pub(crate) const fn spin_rate(self) -> f32 {
        match self {
            Self::Crescent => 2.0,
            Self::Cylinder => 0.0,
            Self::Lightning => 0.0,
            Self::Plane => 0.5,
            Self::Ring => 1.0,
        }
    }
}

/// One link in a group's update chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "module", rename_all = "snake_case")]
pub enum UpdateModule {
    /// Writes velocity: `v += acceleration * dt`.
    Gravity {
        /// Acceleration in world units per second squared.
        acceleration: Vec3,
    },
    /// Writes velocity: `v += force * dt`. Same integration as gravity,
    /// kept separate so authored content can toggle them independently.
    LinearForce {
        /// Force treated as acceleration (unit particle mass).
        force: Vec3,
    },
    /// Writes velocity: exponential damping, stable for any `dt`.
    Drag {
        /// Damping coefficient per second.
        coefficient: f32,
    },
    /// Writes velocity: adds deterministic sine-product turbulence
    /// derived from position and age. No rng - replays stay identical.
    NoiseForce {
        /// Force amplitude.
        amplitude: f32,
        /// Spatial frequency of the noise field.
        frequency: f32,
    },
    /// Writes position: moves each particle along the delta of an
    /// authored path curve between last frame's and this frame's
    /// normalized age. Composes with `Translate` instead of fighting it.
    KeyframePath {
        /// Position offset curve over normalized age.
        path: Vec3Value,
    },
    /// Writes color from a curve over normalized age.
    ColorOverLife {
        /// Color definition.
        color: ColorValue,
    },
    /// Writes uv offset: `uv += speed * dt`.
    UvScroll {
        /// Scroll speed in UV units per second.
        speed: Vec2,
    },
    /// Writes rotation: `rot += speed(t) * dt`.
    RotationOverLife {
        /// Angular speed in radians per second over normalized age.
        speed: ScalarValue,
    },
    /// Writes scale from a curve over normalized age.
    ScaleOverLife {
        /// Per-axis scale definition.
        scale: Vec3Value,
    },
    /// Writes position: `p += v * dt`. Consumes velocity, so force
    /// modules must be ordered before it.
    Translate,
    /// Writes the scratch slot: accumulates distance travelled, which
    /// the renderer reads as a trail length. Claims the scratch slot -
    /// do not combine with other scratch users in one chain.
    Trail,
    /// Writes uv offset and rotation to select renderer geometry.
    /// Render-facing fields only; never touches simulation state.
    ShapeGeometry {
        /// Which pattern the renderer should draw.
        pattern: GeometryPattern,
    },
    /// Writes age and lifetime, and flags expired rows for the batch
    /// compaction pass. Must be authored last in any correct chain.
    Lifetime,
}

impl UpdateModule {
    /// The stable identifier of this module kind.
    #[must_use]
    pub const fn id(&self) -> ModuleId {
        match self {
            Self::Gravity { .. } => ModuleId::Gravity,
            Self::LinearForce { .. } => ModuleId::LinearForce,
            Self::Drag { .. } => ModuleId::Drag,
            Self::NoiseForce { .. } => ModuleId::NoiseForce,
            Self::KeyframePath { .. } => ModuleId::KeyframePath,
            Self::ColorOverLife { .. } => ModuleId::ColorOverLife,
            Self::UvScroll { .. } => ModuleId::UvScroll,
            Self::RotationOverLife { .. } => ModuleId::RotationOverLife,
            Self::ScaleOverLife { .. } => ModuleId::ScaleOverLife,
            Self::Translate => ModuleId::Translate,
            Self::Trail => ModuleId::Trail,
            Self::ShapeGeometry { .. } => ModuleId::ShapeGeometry,
            Self::Lifetime => ModuleId::Lifetime,
        }
    }

    /// Applies this module over the live range.
    ///
    /// This is the fixed dispatch table for the hot loop: one match,
    /// then a straight-line pass over structure-of-arrays slices.
    pub fn apply(&self, store: &mut ParticleStore, dt: f32) {
        let n = store.live_count();
        match self {
            Self::Gravity { acceleration } => {
                for v in &mut store.velocity[..n] {
                    *v += *acceleration * dt;
                }
            }
            Self::LinearForce { force } => {
                for v in &mut store.velocity[..n] {
                    *v += *force * dt;
                }
            }
            Self::Drag { coefficient } => {
                let damp = 1.0 / (1.0 + coefficient.max(0.0) * dt);
                for v in &mut store.velocity[..n] {
                    *v = *v * damp;
                }
            }
            Self::NoiseForce { amplitude, frequency } => {
                for i in 0..n {
                    let turb = turbulence(store.position[i], store.age[i], *frequency);
                    store.velocity[i] += turb * (*amplitude * dt);
                }
            }
            Self::KeyframePath { path } => {
                for i in 0..n {
                    let total = store.age[i] + store.lifetime[i].max(0.0);
                    if total <= f32::EPSILON {
                        continue;
                    }
                    let t0 = (store.age[i] / total).clamp(0.0, 1.0);
                    let t1 = ((store.age[i] + dt) / total).clamp(0.0, 1.0);
                    store.position[i] += path.evaluate(t1) - path.evaluate(t0);
                }
            }
            Self::ColorOverLife { color } => {
                for i in 0..n {
                    store.color[i] = color.evaluate(store.norm_age(i));
                }
            }
            Self::UvScroll { speed } => {
                for uv in &mut store.uv_offset[..n] {
                    *uv += *speed * dt;
                }
            }
            Self::RotationOverLife { speed } => {
                for i in 0..n {
                    store.rotation[i] += speed.evaluate(store.norm_age(i)) * dt;
                }
            }
            Self::ScaleOverLife { scale } => {
                for i in 0..n {
                    store.scale[i] = scale.evaluate(store.norm_age(i));
                }
            }
            Self::Translate => {
                for i in 0..n {
                    let v = store.velocity[i];
                    store.position[i] += v * dt;
                }
            }
            Self::Trail => {
                for i in 0..n {
                    store.scratch[i] += store.velocity[i].length() * dt;
                }
            }
            Self::ShapeGeometry { pattern } => {
                for i in 0..n {
                    store.uv_offset[i] = Vec2::new(store.norm_age(i), pattern.atlas_row());
                    store.rotation[i] += pattern.spin_rate() * dt;
                }
            }
            Self::Lifetime => {
                for i in 0..n {
                    store.age[i] += dt;
                    store.lifetime[i] -= dt;
                    if store.lifetime[i] <= 0.0 {
                        store.mark_expired(i);
                    }
                }
            }
        }
    }
}

/// Deterministic sine-product turbulence field.
fn turbulence(p: Vec3, age: f32, freq: f32) -> Vec3 {
    Vec3::new(
        (p.y * freq + age * 1.7).sin() * (p.z * freq + age * 1.3).cos(),
        (p.z * freq + age * 1.1).sin() * (p.x * freq + age * 1.9).cos(),
        (p.x * freq + age * 1.5).sin() * (p.y * freq + age * 2.3).cos(),
    )
}
