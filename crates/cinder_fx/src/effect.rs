//! # Effect Assets and the Library
//!
//! An effect is pure authored data: named emitter specs, each with a
//! start offset, a spawn definition, and an ordered update chain.
//! Nothing in here simulates - the manager instantiates live groups
//! from these specs, cloning the module chain per group so concurrent
//! instances never share mutable state.
//!
//! The on-disk format is one JSON document holding every effect. Load
//! is resilient per entry: a malformed effect is logged and skipped,
//! and the rest of the document still loads.

use crate::error::{FxError, FxResult};
use crate::modules::spawn::SpawnParams;
use crate::modules::update::{ModuleId, UpdateModule};
use crate::phase::EmitterTiming;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Where an emitter's per-particle work runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimMode {
    /// Simulated on the CPU in structure-of-arrays storage.
    #[default]
    Cpu,
    /// Simulated by a [`crate::gpu::GpuParticleBackend`].
    Gpu,
}

/// One authored emitter: everything needed to instantiate a group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterSpec {
    /// Emitter name, for editor display and log lines.
    pub name: String,
    /// Maximum live particles for one instantiated group.
    pub capacity: usize,
    /// Emission timing.
    pub timing: EmitterTiming,
    /// Spawn definition.
    pub spawn: SpawnParams,
    /// Update chain, applied in exactly this order.
    pub modules: Vec<UpdateModule>,
    /// CPU or GPU simulation.
    pub sim: SimMode,
    /// Whether spawned particles live in world space (true) or follow
    /// the emitter origin (false).
    pub world_space: bool,
    /// Seconds to pre-simulate on instantiation, so looping emitters
    /// appear mid-stream instead of starting empty.
    ///
    /// CPU-simulated emitters only. A GPU emitter ignores prewarm (and
    /// logs a warning): there is no way to fast-forward a device-side
    /// buffer through the one-counter readback contract.
    pub prewarm: f32,
}

impl Default for EmitterSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            capacity: 256,
            timing: EmitterTiming::default(),
            spawn: SpawnParams::default(),
            modules: Vec::new(),
            sim: SimMode::Cpu,
            world_space: true,
            prewarm: 0.0,
        }
    }
}

/// One emitter within an effect, delayed by `start_offset`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectNode {
    /// Seconds after the effect triggers before this emitter starts.
    pub start_offset: f32,
    /// The emitter to instantiate.
    pub emitter: EmitterSpec,
}

/// A complete named effect: one or more emitter nodes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectAsset {
    /// Unique effect name; the trigger key.
    pub name: String,
    /// Emitter nodes, fired by ascending start offset.
    pub nodes: Vec<EffectNode>,
}

/// Top-level shape of the effect document.
#[derive(Serialize, Deserialize)]
struct EffectDocument {
    effects: Vec<serde_json::Value>,
}

/// Name-keyed registry of loaded effect assets.
///
/// Assets are immutable once inserted and shared by `Arc`, so the
/// manager can hold a reference across frames without cloning whole
/// module chains until instantiation.
#[derive(Debug, Default)]
pub struct EffectLibrary {
    effects: HashMap<String, Arc<EffectAsset>>,
}

impl EffectLibrary {
    /// Creates an empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one effect asset.
    ///
    /// # Errors
    ///
    /// Returns [`FxError::DuplicateEffect`] if the name is taken.
    pub fn insert(&mut self, asset: EffectAsset) -> FxResult<()> {
        if self.effects.contains_key(&asset.name) {
            return Err(FxError::DuplicateEffect(asset.name));
        }
        warn_on_missing_lifetime(&asset);
        self.effects.insert(asset.name.clone(), Arc::new(asset));
        Ok(())
    }

    /// Looks up an effect by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<EffectAsset>> {
        self.effects.get(name)
    }

    /// Number of registered effects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// True when no effects are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Iterates registered effect names, in arbitrary order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.effects.keys().map(String::as_str)
    }

    /// Loads a library from one JSON document.
    ///
    /// Each entry is decoded independently: a malformed or duplicate
    /// entry is logged and skipped rather than failing the whole load.
    ///
    /// # Errors
    ///
    /// Returns [`FxError::InvalidDocument`] only when the document
    /// itself (the top-level `effects` array) does not parse.
    pub fn from_json_str(text: &str) -> FxResult<Self> {
        let doc: EffectDocument =
            serde_json::from_str(text).map_err(|e| FxError::InvalidDocument(e.to_string()))?;
        let mut library = Self::new();
        for (index, entry) in doc.effects.into_iter().enumerate() {
            match serde_json::from_value::<EffectAsset>(entry) {
                Ok(asset) => {
                    if let Err(e) = library.insert(asset) {
                        tracing::warn!(index, error = %e, "skipping effect entry");
                    }
                }
                Err(e) => {
                    tracing::warn!(index, error = %e, "skipping malformed effect entry");
                }
            }
        }
        Ok(library)
    }

    /// Serializes the library back to the JSON document format.
    ///
    /// Effects are emitted sorted by name so the output is stable
    /// across runs.
    ///
    /// # Errors
    ///
    /// Returns [`FxError::InvalidDocument`] if serialization fails.
    pub fn to_json_string(&self) -> FxResult<String> {
        let mut assets: Vec<&EffectAsset> = self.effects.values().map(Arc::as_ref).collect();
        assets.sort_by(|a, b| a.name.cmp(&b.name));
        let doc = EffectDocument {
            effects: assets
                .into_iter()
                .map(serde_json::to_value)
                .collect::<Result<_, _>>()
                .map_err(|e| FxError::InvalidDocument(e.to_string()))?,
        };
        serde_json::to_string_pretty(&doc).map_err(|e| FxError::InvalidDocument(e.to_string()))
    }
}

/// An emitter whose chain never ages particles leaks them forever.
/// Legal (authored intentionally for persistent fields) but almost
/// always a mistake, so it gets a log line at load time.
fn warn_on_missing_lifetime(asset: &EffectAsset) {
    for node in &asset.nodes {
        let has_lifetime = node
            .emitter
            .modules
            .iter()
            .any(|m| m.id() == ModuleId::Lifetime);
        if !has_lifetime {
            tracing::warn!(
                effect = %asset.name,
                emitter = %node.emitter.name,
                "emitter chain has no lifetime module; particles will never expire"
            );
        }
    }
}
