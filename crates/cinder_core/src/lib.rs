//! # CINDER Core
//!
//! Leaf types shared by the simulation and its collaborators.
//!
//! ## Design Principles
//!
//! 1. **Plain data** - every type here is `Copy`, `Pod`, and serde-friendly
//! 2. **No backend knowledge** - nothing in this crate touches the GPU
//! 3. **Safe reuse** - handles carry a generation counter so stale
//!    references are detected, never dereferenced

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod handle;
pub mod math;

pub use handle::RawHandle;
pub use math::{Quaternion, Transform, Vec2, Vec3, Vec4};
