//! `CallbackHandle`: a notification request and its lifecycle.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::backend::GpiImpl;
use crate::error::{GpiError, GpiResult};
use crate::handle::value::lsb;
use crate::handle::{BackendId, CallbackId, HandleId, Identifiable};
use crate::time::SimTime;

use super::state::{CallbackState, Lifecycle, Transition};

/// Opaque data handed to the user function on every firing.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// The user function stored on a callback.
pub type CallbackFn = Box<dyn FnMut(&Payload) -> anyhow::Result<()> + Send>;

/// Which value transition a value-change callback reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Edge {
    /// Least significant bit becomes `1`.
    Rising,
    /// Least significant bit becomes `0`.
    Falling,
    /// Any change of value.
    Any,
}

impl Edge {
    /// Whether the change `old -> new` satisfies this edge.
    pub fn matches(self, old: &str, new: &str) -> bool {
        if old == new {
            return false;
        }
        match self {
            Edge::Any => true,
            Edge::Rising => lsb(new) == Some('1') && lsb(old) != Some('1'),
            Edge::Falling => lsb(new) == Some('0') && lsb(old) != Some('0'),
        }
    }
}

/// The condition a callback waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum CallbackKind {
    /// After `delay` of simulation time, relative to when it is armed.
    Timer { delay: SimTime },
    /// The read-only phase of the current time slot.
    ReadOnly,
    /// The read-write phase of the current time slot.
    ReadWrite,
    /// The start of the next time slot.
    NextTime,
    /// A value change on `signal`.
    ValueChange { signal: HandleId, edge: Edge },
}

impl CallbackKind {
    /// Value-change callbacks stay registered after firing.
    pub fn is_recurring(&self) -> bool {
        matches!(self, CallbackKind::ValueChange { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            CallbackKind::Timer { .. } => "timed",
            CallbackKind::ReadOnly => "read-only",
            CallbackKind::ReadWrite => "read-write",
            CallbackKind::NextTime => "next-time",
            CallbackKind::ValueChange { edge: Edge::Rising, .. } => "rising-edge",
            CallbackKind::ValueChange { edge: Edge::Falling, .. } => "falling-edge",
            CallbackKind::ValueChange { edge: Edge::Any, .. } => "value-change",
        }
    }
}

/// Lifecycle operations on a callback.
pub trait Armable: Identifiable {
    /// FREE → PRIMED. Registers with the backend's engine; on refusal
    /// the handle stays FREE and the backend's error is returned.
    ///
    /// Called from inside the callback's own function, a one-shot
    /// callback is registered again once the function returns and ends
    /// PRIMED instead of FREE.
    fn arm_callback(&self) -> GpiResult<()>;

    /// PRIMED → PRE_CALL → user function → POST_CALL → FREE/PRIMED.
    ///
    /// Only the backend calls this, when its engine reaches the
    /// registered condition. Returns `Ok(false)` if the callback was
    /// deregistered before delivery; the user function did not run.
    /// A function that panics is not called again: the callback ends
    /// in DELETE.
    fn run_callback(&self) -> GpiResult<bool>;

    /// Any state → DELETE, releasing native resources.
    ///
    /// Returns the state observed just before deletion. Calling it on an
    /// already deleted handle is a no-op that returns `Delete`.
    fn cleanup_callback(&self) -> GpiResult<CallbackState>;
}

struct Shared {
    id: CallbackId,
    kind: CallbackKind,
    backend_id: BackendId,
    backend: Weak<dyn GpiImpl>,
    // Lock order: lifecycle, then function/payload, then the backend's own locks.
    lifecycle: Mutex<Lifecycle>,
    function: Mutex<Option<CallbackFn>>,
    payload: Mutex<Option<Payload>>,
    fire_count: AtomicU64,
    last_error: Mutex<Option<String>>,
    /// Set by `arm_callback` while the callback is firing.
    rearm: AtomicBool,
}

/// What happened when the user function was due.
enum Outcome {
    NoFunction,
    Returned(Option<String>),
    Panicked(String),
}

/// A pending or active notification request.
///
/// Cloning yields another reference to the same callback: the backend
/// keeps one to deliver it, the host keeps one to deregister it.
#[derive(Clone)]
pub struct CallbackHandle {
    shared: Arc<Shared>,
}

impl CallbackHandle {
    /// Build a FREE callback bound to `backend`.
    pub fn new(backend: Weak<dyn GpiImpl>, backend_id: BackendId, kind: CallbackKind) -> Self {
        CallbackHandle {
            shared: Arc::new(Shared {
                id: CallbackId::next(),
                kind,
                backend_id,
                backend,
                lifecycle: Mutex::new(Lifecycle::new()),
                function: Mutex::new(None),
                payload: Mutex::new(None),
                fire_count: AtomicU64::new(0),
                last_error: Mutex::new(None),
                rearm: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> CallbackId {
        self.shared.id
    }

    pub fn kind(&self) -> CallbackKind {
        self.shared.kind
    }

    /// Store the function and payload used by the next firings.
    ///
    /// Must not be called while this same callback is firing.
    pub fn set_user_data<F, P>(&self, function: F, payload: P) -> GpiResult<()>
    where
        F: FnMut(&Payload) -> anyhow::Result<()> + Send + 'static,
        P: Any + Send + Sync,
    {
        let lc = self.shared.lifecycle.lock();
        if lc.state() == CallbackState::Delete {
            return Err(GpiError::CallbackDeleted(self.id()));
        }
        *self.shared.function.lock() = Some(Box::new(function));
        *self.shared.payload.lock() = Some(Arc::new(payload));
        Ok(())
    }

    /// The stored payload, if any.
    pub fn get_user_data(&self) -> Option<Payload> {
        self.shared.payload.lock().clone()
    }

    pub fn get_call_state(&self) -> CallbackState {
        self.shared.lifecycle.lock().state()
    }

    /// Overwrite the state without checking the transition table.
    ///
    /// For backend adapters whose native engine reports state changes
    /// the core did not initiate. Host code should not call this.
    pub fn set_call_state(&self, state: CallbackState) {
        self.shared.lifecycle.lock().force(state);
    }

    /// The most recent states, oldest first.
    pub fn recent_states(&self) -> Vec<CallbackState> {
        self.shared.lifecycle.lock().trail()
    }

    /// How many times the user function has been invoked. Firings
    /// without user data are not counted.
    pub fn fire_count(&self) -> u64 {
        self.shared.fire_count.load(Ordering::Acquire)
    }

    /// Failure reported by the most recent invocation, if it failed.
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }

    /// DELETE → FREE, for backends that pool callback handles.
    ///
    /// Clears counters and diagnostics. User data is already gone.
    pub fn recycle(&self) -> GpiResult<()> {
        let mut lc = self.shared.lifecycle.lock();
        lc.apply(self.id(), Transition::Recycle)?;
        self.shared.fire_count.store(0, Ordering::Release);
        *self.shared.last_error.lock() = None;
        Ok(())
    }

    /// Whether both values refer to the same callback.
    pub fn same_as(&self, other: &CallbackHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Register again with the backend after a re-arm request. Called
    /// with the lifecycle lock held, like `arm_callback`.
    fn prime_again(&self) -> bool {
        match self.backend().and_then(|backend| backend.prime_callback(self)) {
            Ok(()) => {
                debug!(callback = %self.id(), kind = self.kind().label(), "re-armed");
                true
            }
            Err(e) => {
                warn!(callback = %self.id(), kind = self.kind().label(), error = %e, "re-arm refused");
                let mut last = self.shared.last_error.lock();
                if last.is_none() {
                    *last = Some(format!("re-arm refused: {e}"));
                }
                false
            }
        }
    }

    fn record_outcome(&self, failure: Option<String>) {
        self.shared.fire_count.fetch_add(1, Ordering::AcqRel);
        if let Some(msg) = &failure {
            warn!(callback = %self.id(), kind = self.kind().label(), error = %msg, "callback function failed");
        }
        *self.shared.last_error.lock() = failure;
    }
}

impl Identifiable for CallbackHandle {
    fn backend_id(&self) -> BackendId {
        self.shared.backend_id
    }

    fn backend(&self) -> GpiResult<Arc<dyn GpiImpl>> {
        self.shared.backend.upgrade().ok_or(GpiError::BackendGone)
    }
}

impl Armable for CallbackHandle {
    fn arm_callback(&self) -> GpiResult<()> {
        let mut lc = self.shared.lifecycle.lock();
        match lc.state() {
            CallbackState::Delete => return Err(GpiError::CallbackDeleted(self.id())),
            CallbackState::Free => {}
            from if from.is_firing() && !self.kind().is_recurring() => {
                if self.shared.rearm.swap(true, Ordering::AcqRel) {
                    return Err(GpiError::IllegalTransition {
                        callback: self.id(),
                        from,
                        transition: Transition::Arm,
                    });
                }
                debug!(callback = %self.id(), kind = self.kind().label(), "re-arm requested");
                return Ok(());
            }
            from => {
                return Err(GpiError::IllegalTransition {
                    callback: self.id(),
                    from,
                    transition: Transition::Arm,
                })
            }
        }
        let backend = self.backend()?;
        // The backend must not touch this handle's lifecycle while priming.
        if let Err(e) = backend.prime_callback(self) {
            warn!(callback = %self.id(), kind = self.kind().label(), error = %e, "arm refused");
            return Err(e);
        }
        lc.apply(self.id(), Transition::Arm)?;
        debug!(callback = %self.id(), kind = self.kind().label(), backend = backend.name(), "armed");
        Ok(())
    }

    fn run_callback(&self) -> GpiResult<bool> {
        {
            let mut lc = self.shared.lifecycle.lock();
            if lc.state() == CallbackState::Delete {
                trace!(callback = %self.id(), "deregistered before delivery");
                return Ok(false);
            }
            lc.apply(self.id(), Transition::Fire)?;
            self.shared.rearm.store(false, Ordering::Release);
        }

        // No locks are held while the user function runs: it may re-enter
        // the backend to register, write, re-arm or deregister.
        let function = self.shared.function.lock().take();
        let payload = self
            .shared
            .payload
            .lock()
            .clone()
            .unwrap_or_else(|| Arc::new(()) as Payload);

        let (function, outcome) = match function {
            None => {
                debug!(callback = %self.id(), "fired without user data");
                (None, Outcome::NoFunction)
            }
            Some(mut f) => match catch_unwind(AssertUnwindSafe(|| f(&payload))) {
                Ok(Ok(())) => (Some(f), Outcome::Returned(None)),
                Ok(Err(e)) => (Some(f), Outcome::Returned(Some(format!("{e:#}")))),
                Err(panic) => (None, Outcome::Panicked(panic_message(panic.as_ref()))),
            },
        };
        match &outcome {
            Outcome::NoFunction => {}
            Outcome::Returned(failure) => self.record_outcome(failure.clone()),
            Outcome::Panicked(msg) => self.record_outcome(Some(msg.clone())),
        }

        let mut lc = self.shared.lifecycle.lock();
        let rearm = self.shared.rearm.swap(false, Ordering::AcqRel);
        if lc.state() == CallbackState::Delete {
            // Deregistered from inside the function or by another thread.
            return Ok(true);
        }
        lc.apply(self.id(), Transition::Complete)?;

        if let Outcome::Panicked(msg) = outcome {
            lc.apply(self.id(), Transition::Cleanup)?;
            self.shared.function.lock().take();
            self.shared.payload.lock().take();
            if let Some(backend) = self.shared.backend.upgrade() {
                backend.release_callback(self.id());
            }
            error!(callback = %self.id(), kind = self.kind().label(), error = %msg, "callback function panicked, callback deleted");
            return Ok(true);
        }

        let rearmed = rearm && self.prime_again();
        if rearmed {
            lc.apply(self.id(), Transition::Arm)?;
        } else {
            lc.apply(
                self.id(),
                Transition::Finish {
                    recurring: self.kind().is_recurring(),
                },
            )?;
        }
        if let Some(f) = function {
            let mut slot = self.shared.function.lock();
            if slot.is_none() {
                *slot = Some(f);
            }
        }
        Ok(true)
    }

    fn cleanup_callback(&self) -> GpiResult<CallbackState> {
        let mut lc = self.shared.lifecycle.lock();
        let prior = lc.state();
        if prior == CallbackState::Delete {
            return Ok(prior);
        }
        lc.apply(self.id(), Transition::Cleanup)?;
        self.shared.function.lock().take();
        self.shared.payload.lock().take();
        if let Some(backend) = self.shared.backend.upgrade() {
            backend.release_callback(self.id());
        }
        debug!(callback = %self.id(), from = %prior, "deleted");
        Ok(prior)
    }
}

impl PartialEq for CallbackHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for CallbackHandle {}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("backend", &self.backend_id())
            .field("state", &self.get_call_state())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_matching() {
        assert!(Edge::Rising.matches("0", "1"));
        assert!(Edge::Rising.matches("x", "1"));
        assert!(!Edge::Rising.matches("1", "1"));
        assert!(!Edge::Rising.matches("1", "0"));
        assert!(Edge::Falling.matches("1", "0"));
        assert!(Edge::Falling.matches("z", "0"));
        assert!(Edge::Any.matches("01", "00"));
        assert!(!Edge::Any.matches("01", "01"));
    }

    #[test]
    fn test_multi_bit_edges_follow_lsb() {
        assert!(Edge::Rising.matches("10", "01"));
        assert!(!Edge::Rising.matches("01", "11"));
    }

    #[test]
    fn test_kind_categories() {
        assert!(!CallbackKind::Timer { delay: SimTime::ZERO }.is_recurring());
        assert!(!CallbackKind::ReadOnly.is_recurring());
        let vc = CallbackKind::ValueChange {
            signal: HandleId::new(1),
            edge: Edge::Rising,
        };
        assert!(vc.is_recurring());
        assert_eq!(vc.label(), "rising-edge");
    }

    fn orphan() -> CallbackHandle {
        let backend: Weak<dyn GpiImpl> = Weak::<crate::memsim::MemorySim>::new();
        CallbackHandle::new(backend, BackendId::next(), CallbackKind::ReadWrite)
    }

    #[test]
    fn test_arm_without_backend_stays_free() {
        let cb = orphan();
        assert_eq!(cb.arm_callback().unwrap_err(), GpiError::BackendGone);
        assert_eq!(cb.get_call_state(), CallbackState::Free);
    }

    #[test]
    fn test_run_reports_function_error_and_completes() {
        let cb = orphan();
        cb.set_user_data(|_p: &Payload| anyhow::bail!("boom"), ()).unwrap();
        cb.set_call_state(CallbackState::Primed);
        assert!(cb.run_callback().unwrap());
        assert_eq!(cb.get_call_state(), CallbackState::Free);
        assert_eq!(cb.fire_count(), 1);
        assert!(cb.last_error().unwrap().contains("boom"));
    }

    #[test]
    fn test_run_survives_panicking_function() {
        let cb = orphan();
        cb.set_user_data(|_p: &Payload| -> anyhow::Result<()> { panic!("kaput") }, ())
            .unwrap();
        cb.set_call_state(CallbackState::Primed);
        assert!(cb.run_callback().unwrap());
        let trail = cb.recent_states();
        assert_eq!(
            &trail[trail.len() - 3..],
            &[CallbackState::PreCall, CallbackState::PostCall, CallbackState::Delete]
        );
        assert_eq!(cb.fire_count(), 1);
        assert!(cb.last_error().unwrap().contains("kaput"));
        assert!(cb.get_user_data().is_none());
        assert!(!cb.run_callback().unwrap());
        assert_eq!(cb.fire_count(), 1);
    }

    #[test]
    fn test_firing_without_user_data_is_not_counted() {
        let cb = orphan();
        cb.set_call_state(CallbackState::Primed);
        assert!(cb.run_callback().unwrap());
        assert_eq!(cb.fire_count(), 0);
        assert!(cb.last_error().is_none());
        assert_eq!(cb.get_call_state(), CallbackState::Free);
    }

    #[test]
    fn test_rearm_without_backend_ends_free() {
        let cb = orphan();
        let me = cb.clone();
        let inner = Arc::new(Mutex::new(None));
        let seen = inner.clone();
        cb.set_user_data(
            move |_p: &Payload| {
                *seen.lock() = Some(me.arm_callback());
                Ok(())
            },
            (),
        )
        .unwrap();
        cb.set_call_state(CallbackState::Primed);
        assert!(cb.run_callback().unwrap());
        assert_eq!(*inner.lock(), Some(Ok(())));
        assert_eq!(cb.get_call_state(), CallbackState::Free);
        assert!(cb.last_error().unwrap().contains("re-arm refused"));
        cb.cleanup_callback().unwrap();
    }

    #[test]
    fn test_cleanup_twice_is_noop() {
        let cb = orphan();
        assert_eq!(cb.cleanup_callback().unwrap(), CallbackState::Free);
        assert_eq!(cb.cleanup_callback().unwrap(), CallbackState::Delete);
        assert_eq!(cb.get_call_state(), CallbackState::Delete);
    }

    #[test]
    fn test_deleted_callback_rejects_reuse() {
        let cb = orphan();
        cb.cleanup_callback().unwrap();
        assert_eq!(cb.arm_callback().unwrap_err(), GpiError::CallbackDeleted(cb.id()));
        assert!(cb.set_user_data(|_p: &Payload| Ok(()), 1u8).is_err());
        assert!(!cb.run_callback().unwrap());
    }

    #[test]
    fn test_recycle_resets_to_free() {
        let cb = orphan();
        cb.cleanup_callback().unwrap();
        cb.recycle().unwrap();
        assert_eq!(cb.get_call_state(), CallbackState::Free);
        assert!(cb.get_user_data().is_none());
    }
}
