//! # Renderer-Facing Views
//!
//! The renderer consumes finalized per-particle state; it never mutates
//! it. CPU groups hand out a borrow of the live attribute range for the
//! current frame. GPU groups cannot do that without a synchronous
//! readback, so they expose a buffer id plus the live count published
//! for the *previous completed* frame - the one-frame visual lag is a
//! documented property, not an accident.

use crate::gpu::GpuBufferId;
use crate::group::ParticleStore;
use cinder_core::{Transform, Vec2, Vec3, Vec4};

/// Read-only view of one CPU group's live particles.
///
/// Every slice has the same length: `live_count`.
#[derive(Clone, Copy)]
pub struct ParticleDrawView<'a> {
    /// Number of live particles (length of every slice).
    pub live_count: usize,
    /// The emitter origin at draw time.
    ///
    /// When `world_space` is false the position slice is emitter-local
    /// and the renderer must apply this transform per draw.
    pub origin: Transform,
    /// True when positions are already in world space.
    pub world_space: bool,
    /// Particle positions.
    pub position: &'a [Vec3],
    /// Particle velocities (for stretched billboards / motion blur).
    pub velocity: &'a [Vec3],
    /// Per-axis scales.
    pub scale: &'a [Vec3],
    /// Rotations in radians.
    pub rotation: &'a [f32],
    /// RGBA colors.
    pub color: &'a [Vec4],
    /// UV offsets.
    pub uv_offset: &'a [Vec2],
    /// Per-module scratch values (trail lengths and the like).
    pub scratch: &'a [f32],
}

impl<'a> ParticleDrawView<'a> {
    /// Borrows the live range of a store.
    #[must_use]
    pub fn from_store(store: &'a ParticleStore, origin: Transform, world_space: bool) -> Self {
        let n = store.live_count();
        Self {
            live_count: n,
            origin,
            world_space,
            position: &store.position[..n],
            velocity: &store.velocity[..n],
            scale: &store.scale[..n],
            rotation: &store.rotation[..n],
            color: &store.color[..n],
            uv_offset: &store.uv_offset[..n],
            scratch: &store.scratch[..n],
        }
    }

    /// True when there is nothing to draw.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live_count == 0
    }
}

/// Draw handle for one GPU group.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GpuDrawInfo {
    /// The backend buffer holding the particle rows.
    pub buffer: GpuBufferId,
    /// Live count from the previous completed frame.
    ///
    /// GPU particle visual state lags CPU-driven gameplay by up to one
    /// frame; renderers must treat this as a hint, not a promise.
    pub live_count_hint: u32,
    /// The emitter origin at draw time; applied per draw when
    /// `world_space` is false.
    pub origin: Transform,
    /// True when buffer rows hold world-space positions.
    pub world_space: bool,
}

/// Per-group draw data, CPU or GPU.
pub enum GroupDrawData<'a> {
    /// CPU group: borrow the attribute arrays directly.
    Cpu(ParticleDrawView<'a>),
    /// GPU group: draw from the backend buffer.
    Gpu(GpuDrawInfo),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::spawn::ParticleInit;

    #[test]
    fn test_view_matches_live_range() {
        let mut store = ParticleStore::new(8);
        for i in 0..3 {
            let idx = store
                .push_row(ParticleInit {
                    position: Vec3::new(i as f32, 0.0, 0.0),
                    velocity: Vec3::ZERO,
                    scale: Vec3::ONE,
                    rotation: 0.0,
                    color: Vec4::ONE,
                    lifetime: 1.0,
                })
                .unwrap();
            assert_eq!(idx, i);
        }
        let view = ParticleDrawView::from_store(&store, Transform::IDENTITY, true);
        assert_eq!(view.live_count, 3);
        assert_eq!(view.position.len(), 3);
        assert_eq!(view.position[2], Vec3::new(2.0, 0.0, 0.0));
        assert!(!view.is_empty());
    }

    #[test]
    fn test_local_space_view_carries_the_emitter_origin() {
        let mut store = ParticleStore::new(4);
        let _ = store.push_row(ParticleInit {
            position: Vec3::new(0.5, 0.0, 0.0),
            velocity: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: 0.0,
            color: Vec4::ONE,
            lifetime: 1.0,
        });
        let origin = Transform::from_position(Vec3::new(100.0, 2.0, 0.0));
        let view = ParticleDrawView::from_store(&store, origin, false);
        assert!(!view.world_space);
        assert_eq!(view.origin.position, Vec3::new(100.0, 2.0, 0.0));
        // Positions stay emitter-local; placement is the renderer's job.
        assert_eq!(view.position[0], Vec3::new(0.5, 0.0, 0.0));
    }
}
