//! The engine state behind `MemorySim`'s lock.
//!
//! Everything here runs with the engine lock held and never calls into a
//! callback's lifecycle or user function. Delivery happens in
//! `MemorySim::step`, after the lock is released.

use std::collections::BTreeMap;

use tracing::{error, trace};

use crate::callback::{CallbackHandle, CallbackKind};
use crate::error::{GpiError, GpiResult};
use crate::handle::{CallbackId, HandleId};
use crate::time::SimTime;

use super::config::MemorySimConfig;
use super::event::{Event, EventId, Phase};
use super::hierarchy::Hierarchy;
use super::scheduler::Scheduler;
use super::trace::TraceEntry;

/// How the engine holds on to one armed callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Registration {
    /// Queued as this event; any other event for the callback is stale.
    Scheduled(EventId),
    /// Waiting for the next time slot to open.
    NextSlot,
    /// Watching a signal for changes.
    Watching(HandleId),
}

#[derive(Debug)]
pub(crate) struct Engine {
    pub hierarchy: Hierarchy,
    scheduler: Scheduler,
    now: SimTime,
    /// Phase being delivered, `None` between deliveries.
    phase: Option<Phase>,
    /// Latest phase delivered in the current slot. Phases up to and
    /// including it are closed to new work.
    slot_phase: Option<Phase>,
    /// Delta cycle of the value-change event being delivered.
    delta: u32,
    registrations: BTreeMap<CallbackId, Registration>,
    /// Released into the scheduler, at their phase, when time next advances.
    next_slot: Vec<(CallbackHandle, Phase)>,
    watchers: BTreeMap<HandleId, Vec<CallbackHandle>>,
    ended: bool,
    events_processed: u64,
    max_pending: Option<usize>,
    max_deltas: u32,
    trace: Vec<TraceEntry>,
}

impl Engine {
    pub fn new(hierarchy: Hierarchy, config: &MemorySimConfig) -> Self {
        Engine {
            hierarchy,
            scheduler: Scheduler::new(),
            now: SimTime::ZERO,
            phase: None,
            slot_phase: None,
            delta: 0,
            registrations: BTreeMap::new(),
            next_slot: Vec::new(),
            watchers: BTreeMap::new(),
            ended: false,
            events_processed: 0,
            max_pending: config.max_pending_callbacks,
            max_deltas: config.max_deltas_per_slot,
            trace: Vec::new(),
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Callbacks currently armed with the engine.
    pub fn pending_count(&self) -> usize {
        self.registrations.len()
    }

    /// `true` when nothing is queued. Callbacks waiting for the next slot
    /// do not count: without queued work time never advances to release them.
    pub fn is_idle(&self) -> bool {
        self.ended || self.scheduler.is_empty()
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    // ── Callbacks ─────────────────────────────────────────────

    pub fn prime(&mut self, callback: &CallbackHandle, backend: &str) -> GpiResult<()> {
        if self.ended {
            return Err(GpiError::SimulationEnded);
        }
        let kind = callback.kind();
        if let Some(max) = self.max_pending {
            if self.registrations.len() >= max {
                return Err(GpiError::RegistrationFailed {
                    backend: backend.to_string(),
                    kind: kind.label(),
                    reason: format!("{max} callbacks already pending"),
                });
            }
        }

        let registration = match kind {
            CallbackKind::Timer { delay } => {
                let at = self
                    .now
                    .plus(delay.as_ps())
                    .ok_or(GpiError::TimeOverflow)?;
                self.place(at, Phase::Timer, callback)
            }
            CallbackKind::ReadOnly => self.place(self.now, Phase::ReadOnly, callback),
            CallbackKind::ReadWrite => self.place(self.now, Phase::ReadWrite, callback),
            CallbackKind::NextTime => {
                self.next_slot.push((callback.clone(), Phase::NextTime));
                Registration::NextSlot
            }
            CallbackKind::ValueChange { signal, .. } => {
                let node = self.hierarchy.get(signal).ok_or(GpiError::StaleHandle(signal))?;
                if !node.kind.is_signal() {
                    return Err(GpiError::NotASignal(signal));
                }
                self.watchers.entry(signal).or_default().push(callback.clone());
                Registration::Watching(signal)
            }
        };
        trace!(callback = %callback.id(), ?registration, "primed");
        self.registrations.insert(callback.id(), registration);
        Ok(())
    }

    /// Queue `callback` at `(at, phase)`, or hold it for the next slot if
    /// that phase of the current slot has already been delivered.
    fn place(&mut self, at: SimTime, phase: Phase, callback: &CallbackHandle) -> Registration {
        if at == self.now && self.slot_phase.is_some_and(|p| p >= phase) {
            trace!(callback = %callback.id(), %phase, "phase closed, deferred to next slot");
            self.next_slot.push((callback.clone(), phase));
            return Registration::NextSlot;
        }
        Registration::Scheduled(self.scheduler.schedule(at, phase, callback.clone()))
    }

    /// Forget `callback`. Queued events for it are skipped when popped.
    pub fn release(&mut self, callback: CallbackId) {
        match self.registrations.remove(&callback) {
            Some(Registration::Watching(signal)) => {
                if let Some(list) = self.watchers.get_mut(&signal) {
                    list.retain(|cb| cb.id() != callback);
                    if list.is_empty() {
                        self.watchers.remove(&signal);
                    }
                }
            }
            Some(Registration::NextSlot) => self.next_slot.retain(|(cb, _)| cb.id() != callback),
            Some(Registration::Scheduled(_)) | None => {}
        }
    }

    fn is_live(&self, event: &Event) -> bool {
        match self.registrations.get(&event.callback.id()) {
            Some(Registration::Scheduled(id)) => *id == event.id,
            Some(Registration::Watching(_)) => event.phase == Phase::ValueChange,
            Some(Registration::NextSlot) | None => false,
        }
    }

    // ── Values ────────────────────────────────────────────────

    pub fn read(&self, signal: HandleId) -> GpiResult<String> {
        let node = self.hierarchy.get(signal).ok_or(GpiError::StaleHandle(signal))?;
        node.value.clone().ok_or(GpiError::NotASignal(signal))
    }

    /// Deposit `value` and queue value-change deliveries for watchers
    /// whose edge the change satisfies.
    ///
    /// A write made while delivering delta `n` schedules delta `n + 1`;
    /// going past `max_deltas_per_slot` ends the simulation instead.
    pub fn write(&mut self, signal: HandleId, value: &str) -> GpiResult<()> {
        if self.phase == Some(Phase::ReadOnly) {
            return Err(GpiError::ReadOnlyPhase);
        }
        let node = self
            .hierarchy
            .get_mut(signal)
            .ok_or(GpiError::StaleHandle(signal))?;
        if !node.kind.is_signal() {
            return Err(GpiError::NotASignal(signal));
        }
        if !node.kind.is_writable() {
            return Err(GpiError::ReadOnly(node.path.clone()));
        }
        let width = node.width.unwrap_or(0);
        let actual = value.chars().count();
        if actual != width as usize {
            return Err(GpiError::WidthMismatch {
                name: node.path.clone(),
                expected: width,
                actual,
            });
        }
        let old = node.value.replace(value.to_string()).unwrap_or_default();
        if old == value {
            return Ok(());
        }
        trace!(signal = %node.path, old = %old, new = %value, "value changed");

        let Some(list) = self.watchers.get(&signal) else {
            return Ok(());
        };
        let due: Vec<CallbackHandle> = list
            .iter()
            .filter(|cb| match cb.kind() {
                CallbackKind::ValueChange { edge, .. } => edge.matches(&old, value),
                _ => false,
            })
            .cloned()
            .collect();
        if due.is_empty() {
            return Ok(());
        }

        let delta = if self.phase == Some(Phase::ValueChange) {
            self.delta + 1
        } else {
            1
        };
        if delta > self.max_deltas {
            error!(
                time = %self.now,
                limit = self.max_deltas,
                "delta limit exceeded, ending simulation"
            );
            self.ended = true;
            return Ok(());
        }
        for cb in due {
            self.scheduler.schedule_delta(self.now, delta, cb);
        }
        Ok(())
    }

    /// Drop a subtree, together with the watchers of its signals.
    ///
    /// Returns how many entities went and the orphaned watchers; the
    /// caller deletes those once the engine lock is released.
    pub fn remove(&mut self, id: HandleId) -> GpiResult<(usize, Vec<CallbackHandle>)> {
        let removed = self.hierarchy.remove(id)?;
        let mut orphans = Vec::new();
        for gone in &removed {
            if let Some(list) = self.watchers.remove(gone) {
                for cb in list {
                    self.registrations.remove(&cb.id());
                    orphans.push(cb);
                }
            }
        }
        Ok((removed.len(), orphans))
    }

    // ── Dispatch ──────────────────────────────────────────────

    /// Pop the next deliverable event no later than `limit`, advancing
    /// time and phase to it.
    ///
    /// With a `limit`, callbacks waiting for the next slot are released
    /// at `limit` when nothing else is due before it.
    ///
    /// One-shot registrations are consumed here; recurring ones stay.
    pub fn next_due(&mut self, limit: Option<SimTime>) -> Option<Event> {
        loop {
            if self.ended {
                return None;
            }
            // Stale events neither open a slot nor get delivered.
            while let Some(head) = self.scheduler.peek_next() {
                if self.is_live(head) {
                    break;
                }
                if let Some(stale) = self.scheduler.pop_next() {
                    trace!(event = %stale.id, callback = %stale.callback.id(), "stale event skipped");
                }
            }
            let due = self
                .scheduler
                .peek_next()
                .map(|e| e.at)
                .filter(|at| limit.map_or(true, |l| *at <= l));
            let slot = match (due, limit) {
                (Some(at), _) => at,
                (None, Some(l)) if !self.next_slot.is_empty() => l,
                _ => return None,
            };

            // Time is about to move: held callbacks open the new slot.
            if slot > self.now && !self.next_slot.is_empty() {
                for (cb, phase) in std::mem::take(&mut self.next_slot) {
                    let id = self.scheduler.schedule(slot, phase, cb.clone());
                    self.registrations.insert(cb.id(), Registration::Scheduled(id));
                }
                continue;
            }
            if due.is_none() {
                return None;
            }

            let event = self.scheduler.pop_next()?;

            if event.at > self.now {
                self.now = event.at;
                self.slot_phase = None;
            }
            self.slot_phase = self.slot_phase.max(Some(event.phase));
            self.delta = event.delta;

            if !event.callback.kind().is_recurring() {
                self.registrations.remove(&event.callback.id());
            }
            self.phase = Some(event.phase);
            self.events_processed += 1;
            return Some(event);
        }
    }

    /// Close the delivery opened by `next_due` and record it.
    pub fn finish_delivery(&mut self, event: &Event, delivered: bool) -> TraceEntry {
        self.phase = None;
        let entry = TraceEntry {
            time: event.at,
            phase: event.phase,
            event_id: event.id,
            callback: event.callback.id(),
            kind: event.callback.kind().label().to_string(),
            delivered,
        };
        self.trace.push(entry.clone());
        entry
    }

    /// Move time forward to `t` without delivering anything.
    pub fn advance_to(&mut self, t: SimTime) {
        if t > self.now && !self.ended {
            self.now = t;
            self.slot_phase = None;
        }
    }

    pub fn end(&mut self) {
        self.ended = true;
    }
}
