//! # GPU Simulation Bridge
//!
//! GPU groups keep the same authoring surface as CPU groups - one spawn
//! definition, one ordered module chain, one phase machine - but the
//! per-particle work happens on a backend the framework never sees
//! directly. The contract with the backend is deliberately narrow:
//!
//! - **Upload**: a packed module-parameter block plus this frame's
//!   staged spawn rows, pushed every dispatch
//! - **Readback**: *only* a live-particle counter, published through a
//!   channel after the backend finishes a frame
//!
//! The counter therefore describes the *previous completed* frame.
//! Phase bookkeeping and the renderer both consume it as a hint; the
//! up-to-one-frame lag is an accepted property of the design, traded
//! for never stalling the simulation thread on a readback.

use crate::error::FxResult;
use crate::modules::spawn::SpawnParams;
use crate::modules::update::UpdateModule;
use crate::phase::{EmitterPhase, EmitterTiming, PhaseMachine};
use crate::render::GpuDrawInfo;
use bytemuck::{Pod, Zeroable};
use cinder_core::Transform;
use crossbeam_channel::{Receiver, Sender};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// Maximum number of update modules one GPU dispatch can carry.
///
/// Chains longer than this are truncated at encode time; CPU groups
/// have no such limit.
pub const MAX_GPU_MODULES: usize = 16;

/// Opaque identifier for one backend-owned particle buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GpuBufferId(pub u64);

/// One staged spawn row, packed for direct buffer upload.
///
/// Layout is four vec4s (64 bytes): position+lifetime, velocity+
/// rotation, color, scale+per-particle random seed.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct GpuSpawnRow {
    /// xyz: spawn position, w: lifetime in seconds.
    pub pos_life: [f32; 4],
    /// xyz: initial velocity, w: rotation in radians.
    pub vel_rot: [f32; 4],
    /// RGBA color.
    pub color: [f32; 4],
    /// xyz: per-axis scale, w: uniform random seed in `[0, 1)`.
    pub scale_seed: [f32; 4],
}

/// One encoded module in a [`GpuModuleBlock`].
///
/// Fixed 48-byte stride: the stable module id, then eight parameter
/// floats whose meaning depends on the id. Value curves collapse to
/// two-point ramps (the curve endpoints) at encode time.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct GpuModuleEntry {
    /// Stable [`crate::modules::ModuleId`] value.
    pub id: u32,
    /// Std430 alignment padding.
    pub _pad: [u32; 3],
    /// Module parameters; layout documented per id in `encode_modules`.
    pub params: [f32; 8],
}

/// The uniform parameter block uploaded once per dispatch.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct GpuModuleBlock {
    /// Number of valid entries.
    pub module_count: u32,
    /// Std430 alignment padding.
    pub _pad: [u32; 3],
    /// Encoded module chain, in authored order.
    pub entries: [GpuModuleEntry; MAX_GPU_MODULES],
}

/// Encodes an authored module chain into the fixed GPU block.
///
/// Parameter packing per module id:
///
/// | module             | params                                     |
/// |--------------------|--------------------------------------------|
/// | `gravity`          | `[0..3]` acceleration                      |
/// | `linear_force`     | `[0..3]` force                             |
/// | `drag`             | `[0]` coefficient                          |
/// | `noise_force`      | `[0]` amplitude, `[1]` frequency           |
/// | `keyframe_path`    | `[0..3]` start, `[3..6]` end               |
/// | `color_over_life`  | `[0..4]` start color, `[4..8]` end color   |
/// | `uv_scroll`        | `[0..2]` scroll speed                      |
/// | `rotation_over_life` | `[0]` start speed, `[1]` end speed       |
/// | `scale_over_life`  | `[0..3]` start, `[3..6]` end               |
/// | `shape_geometry`   | `[0]` atlas row, `[1]` spin rate           |
/// | others             | none                                       |
///
/// Keyframed values lose their interior points here - the GPU path
/// interpolates the endpoints only. Chains longer than
/// [`MAX_GPU_MODULES`] are truncated.
#[must_use]
pub fn encode_modules(modules: &[UpdateModule]) -> GpuModuleBlock {
    let mut block = GpuModuleBlock::zeroed();
    if modules.len() > MAX_GPU_MODULES {
        tracing::debug!(
            authored = modules.len(),
            max = MAX_GPU_MODULES,
            "module chain truncated for gpu dispatch"
        );
    }
    for (entry, module) in block.entries.iter_mut().zip(modules) {
        entry.id = u32::from(module.id() as u16);
        let p = &mut entry.params;
        match module {
            UpdateModule::Gravity { acceleration } => {
                p[0..3].copy_from_slice(&[acceleration.x, acceleration.y, acceleration.z]);
            }
            UpdateModule::LinearForce { force } => {
                p[0..3].copy_from_slice(&[force.x, force.y, force.z]);
            }
            UpdateModule::Drag { coefficient } => {
                p[0] = *coefficient;
            }
            UpdateModule::NoiseForce { amplitude, frequency } => {
                p[0] = *amplitude;
                p[1] = *frequency;
            }
            UpdateModule::KeyframePath { path } => {
                let a = path.evaluate(0.0);
                let b = path.evaluate(1.0);
                p[0..3].copy_from_slice(&[a.x, a.y, a.z]);
                p[3..6].copy_from_slice(&[b.x, b.y, b.z]);
            }
            UpdateModule::ColorOverLife { color } => {
                let a = color.evaluate(0.0);
                let b = color.evaluate(1.0);
                p[0..4].copy_from_slice(&[a.x, a.y, a.z, a.w]);
                p[4..8].copy_from_slice(&[b.x, b.y, b.z, b.w]);
            }
            UpdateModule::UvScroll { speed } => {
                p[0] = speed.x;
                p[1] = speed.y;
            }
            UpdateModule::RotationOverLife { speed } => {
                p[0] = speed.evaluate(0.0);
                p[1] = speed.evaluate(1.0);
            }
            UpdateModule::ScaleOverLife { scale } => {
                let a = scale.evaluate(0.0);
                let b = scale.evaluate(1.0);
                p[0..3].copy_from_slice(&[a.x, a.y, a.z]);
                p[3..6].copy_from_slice(&[b.x, b.y, b.z]);
            }
            UpdateModule::ShapeGeometry { pattern } => {
                p[0] = pattern.atlas_row();
                p[1] = pattern.spin_rate();
            }
            UpdateModule::Translate | UpdateModule::Trail | UpdateModule::Lifetime => {}
        }
        block.module_count += 1;
    }
    block
}

/// Device-side executor for GPU particle groups.
///
/// Implementations own buffer memory and the compute pipeline that
/// applies the encoded module block. They publish each frame's live
/// count through the channel handed to `allocate` - that is the entire
/// readback surface.
pub trait GpuParticleBackend: Send + Sync {
    /// Allocates one particle buffer with room for `capacity` rows.
    ///
    /// `counters` receives one live-count message per completed
    /// dispatch.
    fn allocate(&self, capacity: u32, counters: Sender<u32>) -> FxResult<GpuBufferId>;

    /// Runs one simulation frame: upload `spawns`, apply `block` over
    /// the live rows, retire expired rows, publish the new live count.
    fn dispatch(&self, buffer: GpuBufferId, block: &GpuModuleBlock, spawns: &[GpuSpawnRow], dt: f32);

    /// Releases a buffer. Ids are never reused by the framework.
    fn release(&self, buffer: GpuBufferId);
}

/// A GPU-simulated particle group.
///
/// Spawning and phase logic run on the CPU exactly as they do for
/// [`crate::group::CpuGroup`]; the attribute arrays live behind the
/// backend. Because the live count arrives one frame late, capacity
/// clamping here is conservative: the estimate adds rows staged last
/// frame that the hint cannot include yet.
pub struct GpuGroup {
    backend: Arc<dyn GpuParticleBackend>,
    buffer: GpuBufferId,
    capacity: u32,
    phase: PhaseMachine,
    spawn: SpawnParams,
    block: GpuModuleBlock,
    staging: Vec<GpuSpawnRow>,
    counter_rx: Receiver<u32>,
    live_count_hint: u32,
    last_frame_spawns: u32,
    rng: ChaCha8Rng,
    origin: Transform,
    world_space: bool,
}

impl GpuGroup {
    /// Creates an active group with a backend buffer of `capacity`
    /// rows.
    pub fn new(
        backend: Arc<dyn GpuParticleBackend>,
        capacity: u32,
        timing: EmitterTiming,
        spawn: SpawnParams,
        modules: &[UpdateModule],
        origin: Transform,
        world_space: bool,
        seed: u64,
    ) -> FxResult<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let buffer = backend.allocate(capacity, tx)?;
        let mut phase = PhaseMachine::new(timing);
        phase.activate();
        Ok(Self {
            backend,
            buffer,
            capacity,
            phase,
            spawn,
            block: encode_modules(modules),
            staging: Vec::with_capacity(capacity as usize),
            counter_rx: rx,
            live_count_hint: 0,
            last_frame_spawns: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            origin,
            world_space,
        })
    }

    /// Current lifecycle phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> EmitterPhase {
        self.phase.phase()
    }

    /// Fixed buffer capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Live count published for the previous completed frame.
    #[inline]
    #[must_use]
    pub const fn live_count_hint(&self) -> u32 {
        self.live_count_hint
    }

    /// Drains the counter mailbox and advances the lifecycle phase.
    ///
    /// The live estimate feeding the phase machine includes rows staged
    /// last frame, so a burst cannot race the lagged counter into a
    /// premature Finishing -> Dead collapse.
    pub fn advance_phase(&mut self, dt: f32) -> bool {
        while let Ok(count) = self.counter_rx.try_recv() {
            self.live_count_hint = count.min(self.capacity);
        }
        self.phase.advance(dt, self.estimated_live() as usize)
    }

    /// Requests a stop. Immediate stops also discard any staged rows
    /// that have not been dispatched yet.
    pub fn request_stop(&mut self, immediate: bool) {
        self.phase.request_stop(immediate);
        if immediate {
            self.staging.clear();
        }
    }

    /// Runs one frame: stage pending spawns (clamped to the estimated
    /// free space), then hand the block and staged rows to the backend.
    pub fn update(&mut self, dt: f32) {
        if self.phase.is_dead() {
            self.last_frame_spawns = 0;
            return;
        }

        self.staging.clear();
        let requested = self.phase.take_pending_spawns();
        let budget = self.capacity.saturating_sub(self.estimated_live());
        let granted = requested.min(budget);
        if granted < requested {
            tracing::debug!(
                requested,
                granted,
                capacity = self.capacity,
                "gpu spawn request clamped to estimated free space"
            );
        }
        for _ in 0..granted {
            let init = self
                .spawn
                .sample_init(&self.origin, self.world_space, &mut self.rng);
            self.staging.push(GpuSpawnRow {
                pos_life: [init.position.x, init.position.y, init.position.z, init.lifetime],
                vel_rot: [init.velocity.x, init.velocity.y, init.velocity.z, init.rotation],
                color: [init.color.x, init.color.y, init.color.z, init.color.w],
                scale_seed: [init.scale.x, init.scale.y, init.scale.z, self.rng.gen::<f32>()],
            });
        }
        self.last_frame_spawns = granted;

        self.backend
            .dispatch(self.buffer, &self.block, &self.staging, dt);
    }

    /// Draw handle for the renderer, carrying the emitter origin for
    /// local-space groups.
    #[must_use]
    pub const fn draw_info(&self) -> GpuDrawInfo {
        GpuDrawInfo {
            buffer: self.buffer,
            live_count_hint: self.live_count_hint,
            origin: self.origin,
            world_space: self.world_space,
        }
    }

    /// Lagged-counter live estimate: the last published count plus the
    /// rows staged since it was measured.
    fn estimated_live(&self) -> u32 {
        (self.live_count_hint + self.last_frame_spawns).min(self.capacity)
    }
}

impl Drop for GpuGroup {
    fn drop(&mut self) {
        self.backend.release(self.buffer);
    }
}

/// Reference backend that simulates the counter protocol on the CPU.
///
/// It tracks only per-row lifetimes - enough to produce exact live
/// counts with the same one-frame publication lag a real device
/// exhibits. Used by headless servers and the test suite.
#[derive(Default)]
pub struct HeadlessBackend {
    inner: parking_lot::Mutex<HeadlessState>,
}

#[derive(Default)]
struct HeadlessState {
    next_id: u64,
    buffers: std::collections::HashMap<u64, HeadlessBuffer>,
}

struct HeadlessBuffer {
    capacity: u32,
    lifetimes: Vec<f32>,
    counters: Sender<u32>,
}

impl GpuParticleBackend for HeadlessBackend {
    fn allocate(&self, capacity: u32, counters: Sender<u32>) -> FxResult<GpuBufferId> {
        let mut state = self.inner.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.buffers.insert(
            id,
            HeadlessBuffer {
                capacity,
                lifetimes: Vec::with_capacity(capacity as usize),
                counters,
            },
        );
        Ok(GpuBufferId(id))
    }

    fn dispatch(&self, buffer: GpuBufferId, _block: &GpuModuleBlock, spawns: &[GpuSpawnRow], dt: f32) {
        let mut state = self.inner.lock();
        let Some(buf) = state.buffers.get_mut(&buffer.0) else {
            return;
        };
        for life in &mut buf.lifetimes {
            *life -= dt;
        }
        buf.lifetimes.retain(|life| *life > 0.0);
        for row in spawns {
            if buf.lifetimes.len() >= buf.capacity as usize {
                break;
            }
            buf.lifetimes.push(row.pos_life[3]);
        }
        // Receiver may already be gone during group teardown.
        let _ = buf.counters.send(buf.lifetimes.len() as u32);
    }

    fn release(&self, buffer: GpuBufferId) {
        self.inner.lock().buffers.remove(&buffer.0);
    }
}
