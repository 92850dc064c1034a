//! # Effect Instance Manager
//!
//! The manager owns every live effect instance and drives them all
//! with one `update(dt)` per frame. The frame is strictly three
//! passes:
//!
//! 1. **Schedule**: advance instance clocks, fire due emitter nodes,
//!    advance every group's lifecycle phase
//! 2. **Simulate**: run every group's spawn + module chain
//! 3. **Reclaim**: retire instances whose groups are all Dead
//!
//! Phase advancement for *all* groups happens before *any* group
//! simulates, so an effect triggered and stopped in the same frame
//! still gets exactly one full update pass before it can drain.
//!
//! Handles are generational: a reclaimed slot bumps its generation, so
//! a handle held past an effect's death goes benignly stale instead of
//! aliasing whatever reuses the slot.

use crate::effect::{EffectLibrary, EmitterSpec, SimMode};
use crate::error::{FxError, FxResult};
use crate::gpu::{GpuGroup, GpuParticleBackend};
use crate::group::CpuGroup;
use crate::render::GroupDrawData;
use cinder_core::{RawHandle, Transform};
use std::sync::Arc;

/// Generational handle to one live effect instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EffectHandle(RawHandle);

impl EffectHandle {
    /// The canonical invalid handle.
    pub const NULL: Self = Self(RawHandle::NULL);

    /// True for the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0.is_null()
    }
}

/// Aggregate per-frame counters, refreshed by every `update`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FxStats {
    /// Live effect instances.
    pub instances_live: u32,
    /// Live particle groups across all instances.
    pub groups_live: u32,
    /// Live particles: exact for CPU groups, lagged hints for GPU.
    pub particles_live: u32,
    /// Particles spawned by CPU groups this frame.
    pub spawned_this_frame: u32,
    /// Particles culled by CPU groups this frame.
    pub culled_this_frame: u32,
}

/// A live group, CPU- or GPU-simulated.
enum GroupSim {
    Cpu(CpuGroup),
    Gpu(GpuGroup),
}

impl GroupSim {
    fn advance_phase(&mut self, dt: f32) {
        match self {
            Self::Cpu(g) => {
                let _ = g.advance_phase(dt);
            }
            Self::Gpu(g) => {
                let _ = g.advance_phase(dt);
            }
        }
    }

    fn update(&mut self, dt: f32) {
        match self {
            Self::Cpu(g) => g.update(dt),
            Self::Gpu(g) => g.update(dt),
        }
    }

    fn request_stop(&mut self, immediate: bool) {
        match self {
            Self::Cpu(g) => g.request_stop(immediate),
            Self::Gpu(g) => g.request_stop(immediate),
        }
    }

    fn is_dead(&self) -> bool {
        match self {
            Self::Cpu(g) => g.phase() == crate::phase::EmitterPhase::Dead,
            Self::Gpu(g) => g.phase() == crate::phase::EmitterPhase::Dead,
        }
    }
}

/// One live effect: its clock, not-yet-started nodes, and live groups.
struct EffectInstance {
    elapsed: f32,
    pending: Vec<(f32, EmitterSpec)>,
    groups: Vec<GroupSim>,
    origin: Transform,
}

impl EffectInstance {
    fn is_finished(&self) -> bool {
        self.pending.is_empty() && self.groups.iter().all(GroupSim::is_dead)
    }
}

/// Owns and updates every live effect instance.
pub struct ParticleManager {
    library: Arc<EffectLibrary>,
    gpu_backend: Option<Arc<dyn GpuParticleBackend>>,
    slots: Vec<Option<EffectInstance>>,
    generations: Vec<u32>,
    free_list: Vec<usize>,
    stats: FxStats,
    next_seed: u64,
}

impl ParticleManager {
    /// Creates a manager over a loaded effect library. CPU-only until
    /// a backend is attached.
    #[must_use]
    pub fn new(library: Arc<EffectLibrary>) -> Self {
        Self {
            library,
            gpu_backend: None,
            slots: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            stats: FxStats::default(),
            next_seed: 1,
        }
    }

    /// Attaches the GPU backend used for `sim = gpu` emitters.
    #[must_use]
    pub fn with_gpu_backend(mut self, backend: Arc<dyn GpuParticleBackend>) -> Self {
        self.gpu_backend = Some(backend);
        self
    }

    /// Instantiates the named effect at `origin`.
    ///
    /// Nodes with a zero start offset fire immediately (including
    /// prewarm); delayed nodes are scheduled against the instance
    /// clock.
    ///
    /// # Errors
    ///
    /// Returns [`FxError::EffectNotFound`] for an unregistered name,
    /// or [`FxError::AllocationFailed`] if the GPU backend refuses a
    /// buffer.
    pub fn trigger(&mut self, name: &str, origin: Transform) -> FxResult<EffectHandle> {
        let asset = self
            .library
            .get(name)
            .ok_or_else(|| FxError::EffectNotFound(name.to_owned()))?
            .clone();

        let mut instance = EffectInstance {
            elapsed: 0.0,
            pending: Vec::new(),
            groups: Vec::new(),
            origin,
        };
        for node in &asset.nodes {
            if node.start_offset <= 0.0 {
                let group = self.instantiate(&node.emitter, origin)?;
                instance.groups.push(group);
            } else {
                instance.pending.push((node.start_offset, node.emitter.clone()));
            }
        }
        instance.pending.sort_by(|a, b| a.0.total_cmp(&b.0));

        let index = match self.free_list.pop() {
            Some(i) => {
                self.slots[i] = Some(instance);
                i
            }
            None => {
                self.slots.push(Some(instance));
                self.generations.push(0);
                self.slots.len() - 1
            }
        };
        Ok(EffectHandle(RawHandle::new(
            index as u32,
            self.generations[index],
        )))
    }

    /// Runs one frame for every live instance.
    pub fn update(&mut self, dt: f32) {
        // Pass 1: clocks, due nodes, phase advancement.
        for slot in 0..self.slots.len() {
            let Some(mut instance) = self.slots[slot].take() else {
                continue;
            };
            instance.elapsed += dt;
            while instance
                .pending
                .first()
                .is_some_and(|(at, _)| *at <= instance.elapsed)
            {
                let (_, spec) = instance.pending.remove(0);
                match self.instantiate(&spec, instance.origin) {
                    Ok(group) => instance.groups.push(group),
                    Err(e) => {
                        tracing::warn!(emitter = %spec.name, error = %e, "dropping emitter node");
                    }
                }
            }
            for group in &mut instance.groups {
                group.advance_phase(dt);
            }
            self.slots[slot] = Some(instance);
        }

        // Pass 2: simulate every group, collecting stats.
        let mut stats = FxStats::default();
        for instance in self.slots.iter_mut().flatten() {
            stats.instances_live += 1;
            for group in &mut instance.groups {
                group.update(dt);
                stats.groups_live += 1;
                match group {
                    GroupSim::Cpu(g) => {
                        stats.particles_live += g.live_count() as u32;
                        stats.spawned_this_frame += g.spawned_this_frame();
                        stats.culled_this_frame += g.culled_this_frame();
                    }
                    GroupSim::Gpu(g) => {
                        stats.particles_live += g.live_count_hint();
                    }
                }
            }
        }
        self.stats = stats;

        // Pass 3: reclaim finished instances.
        for slot in 0..self.slots.len() {
            let finished = self.slots[slot]
                .as_ref()
                .is_some_and(EffectInstance::is_finished);
            if finished {
                self.slots[slot] = None;
                self.generations[slot] = self.generations[slot].wrapping_add(1);
                self.free_list.push(slot);
            }
        }
    }

    /// Requests a stop on one instance.
    ///
    /// Not-yet-started nodes are cancelled either way; immediate stops
    /// also cancel scheduled spawns so the instance drains as fast as
    /// its shortest-lived particles allow. Returns false for a stale
    /// handle - stopping an already-dead effect is benign.
    pub fn stop(&mut self, handle: EffectHandle, immediate: bool) -> bool {
        let Some(instance) = self.resolve_mut(handle) else {
            return false;
        };
        instance.pending.clear();
        for group in &mut instance.groups {
            group.request_stop(immediate);
        }
        true
    }

    /// True while the handle refers to a live instance.
    #[must_use]
    pub fn is_alive(&self, handle: EffectHandle) -> bool {
        self.resolve(handle).is_some()
    }

    /// Counters from the most recent `update`.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> FxStats {
        self.stats
    }

    /// Collects per-group draw data for the renderer.
    #[must_use]
    pub fn draw_data(&self) -> Vec<GroupDrawData<'_>> {
        let mut out = Vec::new();
        for instance in self.slots.iter().flatten() {
            for group in &instance.groups {
                match group {
                    GroupSim::Cpu(g) => out.push(GroupDrawData::Cpu(g.draw_view())),
                    GroupSim::Gpu(g) => out.push(GroupDrawData::Gpu(g.draw_info())),
                }
            }
        }
        out
    }

    fn instantiate(&mut self, spec: &EmitterSpec, origin: Transform) -> FxResult<GroupSim> {
        let seed = self.next_seed.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        self.next_seed += 1;

        if spec.sim == SimMode::Gpu {
            if let Some(backend) = &self.gpu_backend {
                if spec.prewarm > 0.0 {
                    // Prewarming would need a synchronous burst of
                    // dispatches; the counter protocol has no way to
                    // fast-forward a device-side buffer.
                    tracing::warn!(
                        emitter = %spec.name,
                        prewarm = spec.prewarm,
                        "prewarm is ignored for gpu-simulated emitters"
                    );
                }
                let group = GpuGroup::new(
                    Arc::clone(backend),
                    spec.capacity as u32,
                    spec.timing,
                    spec.spawn.clone(),
                    &spec.modules,
                    origin,
                    spec.world_space,
                    seed,
                )?;
                return Ok(GroupSim::Gpu(group));
            }
            // Same semantics, just slower; keeps headless builds and
            // tests running without a device.
            tracing::warn!(
                emitter = %spec.name,
                "no gpu backend attached; simulating on cpu"
            );
        }

        let mut group = CpuGroup::new(
            spec.capacity.max(1),
            spec.timing,
            spec.spawn.clone(),
            spec.modules.clone(),
            origin,
            spec.world_space,
            seed,
        );
        if spec.prewarm > 0.0 {
            group.prewarm(spec.prewarm);
        }
        Ok(GroupSim::Cpu(group))
    }

    fn resolve(&self, handle: EffectHandle) -> Option<&EffectInstance> {
        let index = handle.0.index() as usize;
        if handle.is_null()
            || index >= self.slots.len()
            || self.generations[index] != handle.0.generation()
        {
            return None;
        }
        self.slots[index].as_ref()
    }

    fn resolve_mut(&mut self, handle: EffectHandle) -> Option<&mut EffectInstance> {
        let index = handle.0.index() as usize;
        if handle.is_null()
            || index >= self.slots.len()
            || self.generations[index] != handle.0.generation()
        {
            return None;
        }
        self.slots[index].as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{EffectAsset, EffectNode};
    use crate::gpu::HeadlessBackend;
    use crate::modules::update::UpdateModule;
    use crate::phase::EmitterTiming;
    use crate::value::ScalarValue;
    use cinder_core::Vec3;

    fn burst_emitter(name: &str, capacity: usize, burst: u32) -> EmitterSpec {
        EmitterSpec {
            name: name.to_owned(),
            capacity,
            timing: EmitterTiming {
                duration: 0.0,
                looping: false,
                rate: 0.0,
                burst,
            },
            spawn: crate::modules::SpawnParams {
                lifetime: ScalarValue::Constant(0.5),
                ..crate::modules::SpawnParams::default()
            },
            modules: vec![UpdateModule::Translate, UpdateModule::Lifetime],
            ..EmitterSpec::default()
        }
    }

    fn library_with(assets: Vec<EffectAsset>) -> Arc<EffectLibrary> {
        let mut library = EffectLibrary::new();
        for asset in assets {
            library.insert(asset).unwrap();
        }
        Arc::new(library)
    }

    fn single_node_asset(name: &str, emitter: EmitterSpec) -> EffectAsset {
        EffectAsset {
            name: name.to_owned(),
            nodes: vec![EffectNode {
                start_offset: 0.0,
                emitter,
            }],
        }
    }

    #[test]
    fn test_trigger_unknown_effect_fails() {
        let mut manager = ParticleManager::new(library_with(Vec::new()));
        let err = manager.trigger("missing", Transform::IDENTITY).unwrap_err();
        assert!(matches!(err, FxError::EffectNotFound(name) if name == "missing"));
    }

    #[test]
    fn test_full_lifecycle_and_reclaim() {
        let library = library_with(vec![single_node_asset(
            "burst",
            burst_emitter("core", 64, 16),
        )]);
        let mut manager = ParticleManager::new(library);
        let handle = manager.trigger("burst", Transform::IDENTITY).unwrap();
        assert!(manager.is_alive(handle));

        manager.update(0.1);
        assert_eq!(manager.stats().spawned_this_frame, 16);
        assert_eq!(manager.stats().particles_live, 16);

        // Drain: 0.5s lifetime at 0.1s steps, then one frame for the
        // Finishing -> Dead collapse and one for reclaim.
        for _ in 0..8 {
            manager.update(0.1);
        }
        assert!(!manager.is_alive(handle));
        assert_eq!(manager.stats().instances_live, 0);
    }

    #[test]
    fn test_same_frame_trigger_and_graceful_stop_still_emits() {
        let library = library_with(vec![single_node_asset(
            "burst",
            burst_emitter("core", 64, 16),
        )]);
        let mut manager = ParticleManager::new(library);
        let handle = manager.trigger("burst", Transform::IDENTITY).unwrap();
        assert!(manager.stop(handle, false));

        manager.update(0.1);
        assert_eq!(manager.stats().spawned_this_frame, 16);
    }

    #[test]
    fn test_immediate_stop_cancels_emission() {
        let library = library_with(vec![single_node_asset(
            "burst",
            burst_emitter("core", 64, 16),
        )]);
        let mut manager = ParticleManager::new(library);
        let handle = manager.trigger("burst", Transform::IDENTITY).unwrap();
        assert!(manager.stop(handle, true));

        manager.update(0.1);
        assert_eq!(manager.stats().spawned_this_frame, 0);
        manager.update(0.1);
        assert!(!manager.is_alive(handle));
    }

    #[test]
    fn test_stale_handle_is_benign_after_slot_reuse() {
        let library = library_with(vec![single_node_asset(
            "burst",
            burst_emitter("core", 8, 4),
        )]);
        let mut manager = ParticleManager::new(library);
        let first = manager.trigger("burst", Transform::IDENTITY).unwrap();
        manager.stop(first, true);
        manager.update(0.1);
        manager.update(0.1);
        assert!(!manager.is_alive(first));

        // Slot reuse bumps the generation; the old handle stays dead.
        let second = manager.trigger("burst", Transform::IDENTITY).unwrap();
        assert_ne!(first, second);
        assert!(!manager.is_alive(first));
        assert!(!manager.stop(first, false));
        assert!(manager.is_alive(second));
    }

    #[test]
    fn test_delayed_node_fires_at_offset() {
        let asset = EffectAsset {
            name: "staged".to_owned(),
            nodes: vec![
                EffectNode {
                    start_offset: 0.0,
                    emitter: burst_emitter("first", 8, 2),
                },
                EffectNode {
                    start_offset: 0.25,
                    emitter: burst_emitter("second", 8, 2),
                },
            ],
        };
        let mut manager = ParticleManager::new(library_with(vec![asset]));
        let _ = manager.trigger("staged", Transform::IDENTITY).unwrap();

        manager.update(0.1);
        assert_eq!(manager.stats().groups_live, 1);
        manager.update(0.1);
        assert_eq!(manager.stats().groups_live, 1);
        manager.update(0.1); // clock crosses 0.25
        assert_eq!(manager.stats().groups_live, 2);
    }

    #[test]
    fn test_local_space_groups_at_different_origins_are_distinguishable() {
        let mut emitter = burst_emitter("core", 8, 4);
        emitter.world_space = false;
        let library = library_with(vec![single_node_asset("attached", emitter)]);
        let mut manager = ParticleManager::new(library);

        let left = Transform::from_position(Vec3::new(-100.0, 0.0, 0.0));
        let right = Transform::from_position(Vec3::new(100.0, 0.0, 0.0));
        let _ = manager.trigger("attached", left).unwrap();
        let _ = manager.trigger("attached", right).unwrap();
        manager.update(0.1);

        let draws = manager.draw_data();
        assert_eq!(draws.len(), 2);
        let origins: Vec<Vec3> = draws
            .iter()
            .map(|d| match d {
                GroupDrawData::Cpu(view) => {
                    // Local-space positions are near the emitter, not
                    // near either world origin.
                    assert!(!view.world_space);
                    assert!(view.position.iter().all(|p| p.length() < 10.0));
                    view.origin.position
                }
                GroupDrawData::Gpu(info) => info.origin.position,
            })
            .collect();
        assert_ne!(origins[0], origins[1]);
        assert!(origins.contains(&left.position));
        assert!(origins.contains(&right.position));
    }

    #[test]
    fn test_gpu_emitter_without_backend_falls_back_to_cpu() {
        let mut emitter = burst_emitter("core", 16, 8);
        emitter.sim = SimMode::Gpu;
        let library = library_with(vec![single_node_asset("gpu_burst", emitter)]);
        let mut manager = ParticleManager::new(library);
        let _ = manager.trigger("gpu_burst", Transform::IDENTITY).unwrap();

        manager.update(0.1);
        assert_eq!(manager.stats().spawned_this_frame, 8);
    }

    #[test]
    fn test_gpu_emitter_ignores_prewarm_and_starts_cold() {
        let mut emitter = burst_emitter("core", 16, 8);
        emitter.sim = SimMode::Gpu;
        emitter.prewarm = 2.0;
        let library = library_with(vec![single_node_asset("warm_gpu", emitter)]);
        let mut manager = ParticleManager::new(library)
            .with_gpu_backend(Arc::new(HeadlessBackend::default()));
        let handle = manager.trigger("warm_gpu", Transform::IDENTITY).unwrap();
        assert!(manager.is_alive(handle));

        // No prewarm happened: the first frame's lagged count is zero,
        // the burst lands on schedule afterwards.
        manager.update(0.1);
        assert_eq!(manager.stats().particles_live, 0);
        manager.update(0.1);
        assert_eq!(manager.stats().particles_live, 8);
    }

    #[test]
    fn test_gpu_emitter_with_backend_uses_it() {
        let mut emitter = burst_emitter("core", 16, 8);
        emitter.sim = SimMode::Gpu;
        let library = library_with(vec![single_node_asset("gpu_burst", emitter)]);
        let mut manager = ParticleManager::new(library)
            .with_gpu_backend(Arc::new(HeadlessBackend::default()));
        let _ = manager.trigger("gpu_burst", Transform::IDENTITY).unwrap();

        manager.update(0.1);
        // GPU counts lag a frame.
        assert_eq!(manager.stats().particles_live, 0);
        manager.update(0.1);
        assert_eq!(manager.stats().particles_live, 8);

        let draws = manager.draw_data();
        assert_eq!(draws.len(), 1);
        assert!(matches!(draws[0], GroupDrawData::Gpu(_)));
    }
}
