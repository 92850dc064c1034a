//! # Particle Groups
//!
//! A group owns the per-particle attribute storage for one emitter
//! instance and the ordered module chain that evolves it. Storage is
//! structure-of-arrays: pre-allocated parallel arrays, dense in
//! `[0, live_count)`, cache-friendly to batch-update and trivial to
//! upload to a GPU buffer.
//!
//! ## Invariants
//!
//! - `0 <= live_count <= capacity`, always
//! - Rows `[0, live_count)` are live; removal is swap-to-end, O(1),
//!   order-not-preserving (particles are visually fungible)
//! - Expired rows are only compacted after every module has run for the
//!   frame - no partial-frame removal

use crate::modules::spawn::{ParticleInit, SpawnParams};
use crate::modules::update::UpdateModule;
use crate::phase::{EmitterPhase, EmitterTiming, PhaseMachine};
use crate::render::ParticleDrawView;
use cinder_core::{Transform, Vec2, Vec3, Vec4};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Fixed substep used when prewarming a freshly created group.
const PREWARM_STEP: f32 = 1.0 / 30.0;

/// Structure-of-arrays storage for one group's particles.
///
/// Attribute arrays are public so update modules can iterate them as
/// plain slices; the live range and the expiry flags stay private so
/// the invariants above cannot be broken from outside.
pub struct ParticleStore {
    capacity: usize,
    live_count: usize,
    expired: Box<[bool]>,
    /// Particle positions.
    pub position: Box<[Vec3]>,
    /// Particle velocities.
    pub velocity: Box<[Vec3]>,
    /// Per-axis scales.
    pub scale: Box<[Vec3]>,
    /// Rotations in radians.
    pub rotation: Box<[f32]>,
    /// RGBA colors.
    pub color: Box<[Vec4]>,
    /// UV offsets for the renderer.
    pub uv_offset: Box<[Vec2]>,
    /// Remaining lifetime in seconds.
    pub lifetime: Box<[f32]>,
    /// Seconds since spawn.
    pub age: Box<[f32]>,
    /// Opaque per-module scratch slot (e.g. trail length accumulation).
    pub scratch: Box<[f32]>,
}

impl ParticleStore {
    /// Creates storage for at most `capacity` particles.
    ///
    /// All memory is pre-allocated upfront; nothing grows later.
    ///
    /// # Panics
    ///
    /// Panics if capacity is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero");
        Self {
            capacity,
            live_count: 0,
            expired: vec![false; capacity].into_boxed_slice(),
            position: vec![Vec3::ZERO; capacity].into_boxed_slice(),
            velocity: vec![Vec3::ZERO; capacity].into_boxed_slice(),
            scale: vec![Vec3::ONE; capacity].into_boxed_slice(),
            rotation: vec![0.0; capacity].into_boxed_slice(),
            color: vec![Vec4::ONE; capacity].into_boxed_slice(),
            uv_offset: vec![Vec2::ZERO; capacity].into_boxed_slice(),
            lifetime: vec![0.0; capacity].into_boxed_slice(),
            age: vec![0.0; capacity].into_boxed_slice(),
            scratch: vec![0.0; capacity].into_boxed_slice(),
        }
    }

    /// Returns the fixed capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the current number of live particles.
    #[inline]
    #[must_use]
    pub const fn live_count(&self) -> usize {
        self.live_count
    }

    /// Returns how many more particles fit right now.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.capacity - self.live_count
    }

    /// Writes one new particle row and extends the live range.
    ///
    /// Returns the new row index, or `None` when the group is full -
    /// spawning never grows capacity.
    pub fn push_row(&mut self, init: ParticleInit) -> Option<usize> {
        if self.live_count >= self.capacity {
            return None;
        }
        let i = self.live_count;
        self.position[i] = init.position;
        self.velocity[i] = init.velocity;
        self.scale[i] = init.scale;
        self.rotation[i] = init.rotation;
        self.color[i] = init.color;
        self.uv_offset[i] = Vec2::ZERO;
        self.lifetime[i] = init.lifetime;
        self.age[i] = 0.0;
        self.scratch[i] = 0.0;
        self.expired[i] = false;
        self.live_count += 1;
        Some(i)
    }

    /// Normalized age of row `i` in `[0, 1]`.
    ///
    /// Computed from `age / (age + remaining)`, so it needs no separate
    /// total-lifetime array. A row at or past expiry reads 1.0.
    #[inline]
    #[must_use]
    pub fn norm_age(&self, i: usize) -> f32 {
        let total = self.age[i] + self.lifetime[i].max(0.0);
        if total <= f32::EPSILON {
            1.0
        } else {
            (self.age[i] / total).clamp(0.0, 1.0)
        }
    }

    /// Flags row `i` for removal during the next compaction pass.
    #[inline]
    pub fn mark_expired(&mut self, i: usize) {
        self.expired[i] = true;
    }

    /// O(1) removal: copies the last live row into `i`, shrinks the
    /// live range.
    pub fn swap_remove(&mut self, i: usize) {
        debug_assert!(i < self.live_count);
        let last = self.live_count - 1;
        if i != last {
            self.position[i] = self.position[last];
            self.velocity[i] = self.velocity[last];
            self.scale[i] = self.scale[last];
            self.rotation[i] = self.rotation[last];
            self.color[i] = self.color[last];
            self.uv_offset[i] = self.uv_offset[last];
            self.lifetime[i] = self.lifetime[last];
            self.age[i] = self.age[last];
            self.scratch[i] = self.scratch[last];
            self.expired[i] = self.expired[last];
        }
        self.expired[last] = false;
        self.live_count -= 1;
    }

    /// Removes every row flagged by [`ParticleStore::mark_expired`].
    ///
    /// Walks the live range top-down so a swapped-in row is still
    /// visited. Returns the number of rows removed.
    pub fn compact_expired(&mut self) -> usize {
        let mut removed = 0;
        let mut i = self.live_count;
        while i > 0 {
            i -= 1;
            if self.expired[i] {
                self.swap_remove(i);
                removed += 1;
            }
        }
        removed
    }

    /// Drops every live particle.
    pub fn clear(&mut self) {
        for flag in &mut self.expired[..self.live_count] {
            *flag = false;
        }
        self.live_count = 0;
    }
}

/// A CPU-simulated particle group: storage + ordered module chain +
/// lifecycle phase, all driven by one seeded rng.
pub struct CpuGroup {
    store: ParticleStore,
    spawn: SpawnParams,
    modules: Vec<UpdateModule>,
    phase: PhaseMachine,
    rng: ChaCha8Rng,
    origin: Transform,
    world_space: bool,
    spawned_this_frame: u32,
    culled_this_frame: u32,
}

impl CpuGroup {
    /// Creates an active group.
    ///
    /// The module chain runs in exactly the order given - the pipeline
    /// is order-sensitive and the framework preserves authored order
    /// rather than policing it.
    #[must_use]
    pub fn new(
        capacity: usize,
        timing: EmitterTiming,
        spawn: SpawnParams,
        modules: Vec<UpdateModule>,
        origin: Transform,
        world_space: bool,
        seed: u64,
    ) -> Self {
        let mut phase = PhaseMachine::new(timing);
        phase.activate();
        Self {
            store: ParticleStore::new(capacity),
            spawn,
            modules,
            phase,
            rng: ChaCha8Rng::seed_from_u64(seed),
            origin,
            world_space,
            spawned_this_frame: 0,
            culled_this_frame: 0,
        }
    }

    /// Runs the group forward by `duration` seconds in fixed substeps,
    /// so a looping emitter appears mid-stream on its first visible
    /// frame instead of starting empty.
    pub fn prewarm(&mut self, duration: f32) {
        let mut remaining = duration;
        while remaining > 0.0 {
            let dt = remaining.min(PREWARM_STEP);
            let _ = self.advance_phase(dt);
            self.update(dt);
            remaining -= dt;
        }
    }

    /// Current lifecycle phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> EmitterPhase {
        self.phase.phase()
    }

    /// Advances the lifecycle phase. Returns true if the phase changed.
    ///
    /// The manager calls this for every group before any group runs its
    /// module chain, so a group that enters Finishing this frame still
    /// gets one last full update pass.
    pub fn advance_phase(&mut self, dt: f32) -> bool {
        self.phase.advance(dt, self.store.live_count())
    }

    /// Requests a stop. Immediate stops cancel all pending emission;
    /// graceful stops let the current duration or loop drain naturally.
    pub fn request_stop(&mut self, immediate: bool) {
        self.phase.request_stop(immediate);
    }

    /// Runs one frame: pending spawns, then the module chain in order
    /// over the live range, then batch compaction of expired rows.
    pub fn update(&mut self, dt: f32) {
        self.spawned_this_frame = 0;
        self.culled_this_frame = 0;

        let requested = self.phase.take_pending_spawns();
        self.spawned_this_frame = self.spawn_particles(requested);

        for module in &self.modules {
            module.apply(&mut self.store, dt);
        }

        self.culled_this_frame = self.store.compact_expired() as u32;
    }

    /// Spawns up to `count` particles, clamped to remaining capacity.
    ///
    /// Spawning against a Dead group is a no-op; it indicates a logic
    /// fault upstream but must not corrupt state.
    pub fn spawn_particles(&mut self, count: u32) -> u32 {
        if self.phase.phase() == EmitterPhase::Dead || count == 0 {
            return 0;
        }
        let requested = count as usize;
        let granted = requested.min(self.store.remaining());
        if granted < requested {
            tracing::debug!(
                requested,
                granted,
                capacity = self.store.capacity(),
                "spawn request clamped to capacity"
            );
        }
        for _ in 0..granted {
            let init = self
                .spawn
                .sample_init(&self.origin, self.world_space, &mut self.rng);
            // Cannot fail: granted is clamped to remaining capacity above.
            let _ = self.store.push_row(init);
        }
        granted as u32
    }

    /// Number of live particles.
    #[inline]
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.store.live_count()
    }

    /// Fixed capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Particles spawned during the last update.
    #[inline]
    #[must_use]
    pub fn spawned_this_frame(&self) -> u32 {
        self.spawned_this_frame
    }

    /// Particles removed during the last update.
    #[inline]
    #[must_use]
    pub fn culled_this_frame(&self) -> u32 {
        self.culled_this_frame
    }

    /// Read-only view of the live attribute range for rendering.
    ///
    /// The view carries the emitter origin so local-space groups can be
    /// placed by the renderer.
    #[must_use]
    pub fn draw_view(&self) -> ParticleDrawView<'_> {
        ParticleDrawView::from_store(&self.store, self.origin, self.world_space)
    }

    /// Borrow of the underlying storage (modules and tests).
    #[inline]
    #[must_use]
    pub fn store(&self) -> &ParticleStore {
        &self.store
    }
}
