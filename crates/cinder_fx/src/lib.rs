//! # CINDER FX
//!
//! Particle effect simulation: authored effect assets, per-instance
//! emitter groups, and a fixed pipeline of spawn and update modules.
//!
//! ## Design Principles
//!
//! 1. **Fixed memory** - every group pre-allocates its particle
//!    storage; the hot path never grows, and spawn overflow clamps
//! 2. **Authored order is law** - update modules run in exactly the
//!    order content specifies, including across save/load
//! 3. **Deterministic replay** - all randomness flows through one
//!    seeded rng per group; identical seeds reproduce identical frames
//! 4. **Narrow GPU contract** - upload parameters and spawns, read
//!    back one counter; the lagged count is a documented property
//! 5. **Resilient content** - malformed effect entries are skipped
//!    with a log line, stale handles are benign, the frame update is
//!    infallible
//!
//! ## Frame shape
//!
//! [`ParticleManager::update`] drives everything: schedule due emitter
//! nodes, advance every phase machine, simulate every group, reclaim
//! dead instances. The renderer then pulls
//! [`ParticleManager::draw_data`] and draws without mutating anything.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod effect;
pub mod error;
pub mod gpu;
pub mod group;
pub mod manager;
pub mod modules;
pub mod phase;
pub mod render;
pub mod value;

pub use effect::{EffectAsset, EffectLibrary, EffectNode, EmitterSpec, SimMode};
pub use error::{FxError, FxResult};
pub use gpu::{GpuBufferId, GpuGroup, GpuParticleBackend, HeadlessBackend};
pub use group::{CpuGroup, ParticleStore};
pub use manager::{EffectHandle, FxStats, ParticleManager};
pub use modules::{GeometryPattern, ModuleId, ParticleInit, SpawnParams, SpawnShape, UpdateModule};
pub use phase::{EmitterPhase, EmitterTiming, PhaseMachine};
pub use render::{GpuDrawInfo, GroupDrawData, ParticleDrawView};
pub use value::{ColorValue, Keyframe, ParticleValue, ScalarValue, Vec3Value};
