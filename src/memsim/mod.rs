//! `MemorySim`: a deterministic in-memory simulation backend.
//!
//! | Module        | Contents                                            |
//! |---------------|-----------------------------------------------------|
//! | [`config`]    | `MemorySimConfig`, `EntityConfig`, `MemorySimBuilder` |
//! | [`event`]     | `Event`, `EventId`, `Phase`                          |
//! | [`scheduler`] | min-heap keyed by `(time, phase, id)`                |
//! | [`trace`]     | `TraceEntry` and replay fingerprints                 |
//!
//! The engine sits behind one `parking_lot::Mutex`. Callbacks are always
//! delivered with that lock released, so user functions may register,
//! write and deregister freely.

pub mod config;
pub mod event;
pub mod scheduler;
pub mod trace;

mod engine;
mod hierarchy;

#[cfg(test)]
mod tests;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::backend::GpiImpl;
use crate::callback::{Armable, CallbackHandle};
use crate::error::{GpiError, GpiResult};
use crate::handle::{
    Alphabet, BackendId, CallbackId, HandleDesc, HandleId, KindMask, ObjectHandle, SignalValue,
};
use crate::time::SimTime;

pub use config::{EntityConfig, MemorySimBuilder, MemorySimConfig};
pub use event::{EventId, Phase};
pub use trace::TraceEntry;

use engine::Engine;
use hierarchy::{Hierarchy, Node};

pub struct MemorySim {
    id: BackendId,
    name: String,
    alphabet: Alphabet,
    me: Weak<MemorySim>,
    engine: Mutex<Engine>,
}

impl MemorySim {
    pub fn builder() -> MemorySimBuilder {
        MemorySimBuilder::new()
    }

    /// Validate `config`, build its hierarchy and start at time zero.
    pub fn from_config(config: MemorySimConfig) -> GpiResult<Arc<Self>> {
        config.validate()?;
        let hierarchy = build_hierarchy(&config)?;
        let engine = Engine::new(hierarchy, &config);
        let sim = Arc::new_cyclic(|me| MemorySim {
            id: BackendId::next(),
            name: config.name.clone(),
            alphabet: config.alphabet,
            me: me.clone(),
            engine: Mutex::new(engine),
        });
        info!(
            backend = %sim.name,
            id = %sim.id,
            entities = config.entities.len(),
            "memsim ready"
        );
        Ok(sim)
    }

    // ── Driving ───────────────────────────────────────────────

    pub fn now(&self) -> SimTime {
        self.engine.lock().now()
    }

    /// Deliver the next due callback, if any.
    pub fn step(&self) -> Option<TraceEntry> {
        self.step_until(None)
    }

    fn step_until(&self, limit: Option<SimTime>) -> Option<TraceEntry> {
        let event = self.engine.lock().next_due(limit)?;
        let delivered = match event.callback.run_callback() {
            Ok(delivered) => delivered,
            Err(e) => {
                warn!(callback = %event.callback.id(), error = %e, "delivery failed");
                false
            }
        };
        let entry = self.engine.lock().finish_delivery(&event, delivered);
        debug!(%entry, "dispatched");
        Some(entry)
    }

    /// Run until nothing is left to deliver or the simulation ends.
    /// Returns the number of dispatched events.
    pub fn run(&self) -> u64 {
        let mut count = 0;
        while self.step().is_some() {
            count += 1;
        }
        count
    }

    /// Dispatch at most `max_steps` events.
    pub fn run_for(&self, max_steps: u64) -> u64 {
        let mut count = 0;
        while count < max_steps && self.step().is_some() {
            count += 1;
        }
        count
    }

    /// Dispatch everything due at or before `t`, then move time to `t`.
    ///
    /// Callbacks waiting for the next slot fire at `t` when no earlier
    /// slot opens.
    pub fn run_until(&self, t: SimTime) -> u64 {
        let mut count = 0;
        while self.step_until(Some(t)).is_some() {
            count += 1;
        }
        self.engine.lock().advance_to(t);
        count
    }

    /// `true` when nothing is queued for delivery.
    pub fn is_finished(&self) -> bool {
        self.engine.lock().is_idle()
    }

    pub fn has_ended(&self) -> bool {
        self.engine.lock().has_ended()
    }

    pub fn events_processed(&self) -> u64 {
        self.engine.lock().events_processed()
    }

    /// Callbacks currently armed with the engine.
    pub fn pending_callbacks(&self) -> usize {
        self.engine.lock().pending_count()
    }

    /// Delivery phase in progress, if called from inside a callback.
    pub fn current_phase(&self) -> Option<Phase> {
        self.engine.lock().phase()
    }

    // ── Hierarchy ─────────────────────────────────────────────

    /// Remove an entity and everything below it. Handles to the removed
    /// entities become stale and callbacks watching them are deleted;
    /// returns how many entities were removed.
    pub fn remove(&self, id: HandleId) -> GpiResult<usize> {
        let (removed, orphans) = self.engine.lock().remove(id)?;
        for cb in &orphans {
            if let Err(e) = cb.cleanup_callback() {
                warn!(callback = %cb.id(), error = %e, "could not delete orphaned watcher");
            }
        }
        debug!(handle = %id, removed, watchers = orphans.len(), "subtree removed");
        Ok(removed)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.engine.lock().hierarchy.len()
    }

    // ── Trace ─────────────────────────────────────────────────

    pub fn trace(&self) -> Vec<TraceEntry> {
        self.engine.lock().trace().to_vec()
    }

    /// Replay fingerprint of everything dispatched so far.
    pub fn trace_hash(&self) -> u64 {
        trace::trace_hash(self.engine.lock().trace())
    }

    #[cfg(feature = "serialize")]
    pub fn trace_json(&self) -> GpiResult<String> {
        serde_json::to_string_pretty(self.engine.lock().trace())
            .map_err(|e| GpiError::InvalidConfig(e.to_string()))
    }

    fn wrap(&self, desc: HandleDesc) -> ObjectHandle {
        ObjectHandle::from_desc(self.handle_ref(), self.id, desc)
    }
}

impl std::fmt::Debug for MemorySim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySim")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("alphabet", &self.alphabet)
            .finish_non_exhaustive()
    }
}

impl GpiImpl for MemorySim {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> BackendId {
        self.id
    }

    fn handle_ref(&self) -> Weak<dyn GpiImpl> {
        self.me.clone()
    }

    fn value_alphabet(&self) -> Alphabet {
        self.alphabet
    }

    fn sim_end(&self) {
        let mut engine = self.engine.lock();
        if !engine.has_ended() {
            engine.end();
            info!(backend = %self.name, time = %engine.now(), "simulation end requested");
        }
    }

    fn get_sim_time(&self) -> (u32, u32) {
        self.engine.lock().now().split()
    }

    fn get_root_handle(&self, name: &str) -> GpiResult<ObjectHandle> {
        let desc = {
            let engine = self.engine.lock();
            engine
                .hierarchy
                .root(name)
                .and_then(|k| engine.hierarchy.desc(k))
        };
        match desc {
            Some(desc) => Ok(self.wrap(desc)),
            None => Err(GpiError::RootNotFound(name.to_string())),
        }
    }

    fn child_by_name(&self, parent: HandleId, name: &str) -> Option<HandleDesc> {
        let engine = self.engine.lock();
        let key = engine.hierarchy.child_by_name(parent, name)?;
        engine.hierarchy.desc(key)
    }

    fn child_by_index(&self, parent: HandleId, index: u32) -> Option<HandleDesc> {
        let engine = self.engine.lock();
        let key = engine.hierarchy.child_by_index(parent, index)?;
        engine.hierarchy.desc(key)
    }

    fn next_child(
        &self,
        parent: HandleId,
        selector: KindMask,
        cursor: usize,
    ) -> Option<(usize, HandleDesc)> {
        let engine = self.engine.lock();
        let (next, key) = engine.hierarchy.next_child(parent, selector, cursor)?;
        Some((next, engine.hierarchy.desc(key)?))
    }

    fn read_binstr(&self, signal: HandleId) -> GpiResult<String> {
        self.engine.lock().read(signal)
    }

    fn write_binstr(&self, signal: HandleId, value: &str) -> GpiResult<()> {
        self.engine.lock().write(signal, value)
    }

    fn prime_callback(&self, callback: &CallbackHandle) -> GpiResult<()> {
        self.engine.lock().prime(callback, &self.name)
    }

    fn release_callback(&self, callback: CallbackId) {
        self.engine.lock().release(callback);
    }
}

fn build_hierarchy(config: &MemorySimConfig) -> GpiResult<Hierarchy> {
    let mut hierarchy = Hierarchy::new();
    for entity in &config.entities {
        let (parent, name) = match entity.path.rsplit_once('.') {
            Some((parent_path, name)) => {
                let parent = hierarchy.resolve_path(parent_path).ok_or_else(|| {
                    GpiError::InvalidConfig(format!(
                        "parent of {:?} must be declared first",
                        entity.path
                    ))
                })?;
                (Some(parent), name)
            }
            None => (None, entity.path.as_str()),
        };

        let mut node = Node::new(name, entity.kind, entity.width);
        if let Some(type_name) = &entity.type_name {
            node.type_name = type_name.clone();
        }
        if let Some(width) = entity.width {
            node.value = Some(match &entity.init {
                Some(init) => SignalValue::from(init.as_str()).to_binstr(
                    &entity.path,
                    width,
                    config.alphabet,
                )?,
                None => std::iter::repeat(config.alphabet.initial_symbol())
                    .take(width as usize)
                    .collect(),
            });
        }
        hierarchy.insert(parent, node)?;
    }
    Ok(hierarchy)
}
