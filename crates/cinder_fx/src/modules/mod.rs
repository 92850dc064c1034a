//! # Particle Module Chain
//!
//! Modules come in exactly two capability sets:
//! - **Spawn** (`spawn`): decide where a particle starts and what its
//!   initial attributes are
//! - **Update** (`update`): mutate the live attribute arrays once per
//!   frame, in authored order
//!
//! Both are plain data, cloned into each live group at instantiation,
//! so concurrent effect instances never alias mutable module state.

pub mod spawn;
pub mod update;

pub use spawn::{ParticleInit, SpawnParams, SpawnShape};
pub use update::{GeometryPattern, ModuleId, UpdateModule};
