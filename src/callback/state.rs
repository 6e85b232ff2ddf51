//! The callback lifecycle state machine.
//!
//! ```text
//!            arm                fire               complete
//!   FREE ─────────► PRIMED ─────────► PRE_CALL ─────────► POST_CALL
//!    ▲ ▲                ▲                                      │
//!    │ │                └── finish (recurring) or arm ─────────┤
//!    │ └─────────────────────────  finish (one-shot) ──────────┘
//!    │
//!    └──── recycle ──── DELETE ◄──── cleanup (from any state)
//! ```
//!
//! Every transition goes through [`CallbackState::next`]; anything not in
//! the table is rejected, so e.g. firing a FREE callback cannot happen.
//! `POST_CALL → PRIMED` on arm is taken when a one-shot callback asked to
//! be re-armed from inside its own function.

use std::collections::VecDeque;

use crate::error::{GpiError, GpiResult};
use crate::handle::CallbackId;

/// Where a callback is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum CallbackState {
    /// Created or finished; not registered with the engine.
    Free,
    /// Registered and eligible to fire.
    Primed,
    /// Firing: the user function is about to run or running.
    PreCall,
    /// The user function has returned.
    PostCall,
    /// Deregistered. Native resources are released.
    Delete,
}

impl CallbackState {
    /// Apply `transition`, or `None` if it is not legal from this state.
    pub fn next(self, transition: Transition) -> Option<CallbackState> {
        use CallbackState::*;
        match (self, transition) {
            (_, Transition::Cleanup) => Some(Delete),
            (Free, Transition::Arm) => Some(Primed),
            (Primed, Transition::Fire) => Some(PreCall),
            (PreCall, Transition::Complete) => Some(PostCall),
            (PostCall, Transition::Finish { recurring: false }) => Some(Free),
            (PostCall, Transition::Finish { recurring: true }) => Some(Primed),
            (PostCall, Transition::Arm) => Some(Primed),
            (Delete, Transition::Recycle) => Some(Free),
            _ => None,
        }
    }

    /// PRE_CALL or POST_CALL.
    pub fn is_firing(self) -> bool {
        matches!(self, CallbackState::PreCall | CallbackState::PostCall)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallbackState::Free => "FREE",
            CallbackState::Primed => "PRIMED",
            CallbackState::PreCall => "PRE_CALL",
            CallbackState::PostCall => "POST_CALL",
            CallbackState::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for CallbackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Host or registration path arms the callback.
    Arm,
    /// Backend reached the registered condition.
    Fire,
    /// User function returned (successfully or not).
    Complete,
    /// Post-call settling; recurring callbacks stay registered.
    Finish { recurring: bool },
    /// Deregistration.
    Cleanup,
    /// A backend pool reuses a deleted handle.
    Recycle,
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::Arm => f.write_str("arm"),
            Transition::Fire => f.write_str("fire"),
            Transition::Complete => f.write_str("complete"),
            Transition::Finish { recurring: true } => f.write_str("finish(recurring)"),
            Transition::Finish { recurring: false } => f.write_str("finish(one-shot)"),
            Transition::Cleanup => f.write_str("cleanup"),
            Transition::Recycle => f.write_str("recycle"),
        }
    }
}

const TRAIL_LEN: usize = 16;

/// Current state plus a short trail of the states it has passed through.
#[derive(Debug, Clone)]
pub(crate) struct Lifecycle {
    state: CallbackState,
    trail: VecDeque<CallbackState>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        let mut trail = VecDeque::with_capacity(TRAIL_LEN);
        trail.push_back(CallbackState::Free);
        Lifecycle {
            state: CallbackState::Free,
            trail,
        }
    }

    pub(crate) fn state(&self) -> CallbackState {
        self.state
    }

    /// Checked transition.
    pub(crate) fn apply(
        &mut self,
        callback: CallbackId,
        transition: Transition,
    ) -> GpiResult<CallbackState> {
        match self.state.next(transition) {
            Some(next) => {
                self.record(next);
                Ok(next)
            }
            None => Err(GpiError::IllegalTransition {
                callback,
                from: self.state,
                transition,
            }),
        }
    }

    /// Unchecked overwrite, for backend adapters.
    pub(crate) fn force(&mut self, state: CallbackState) {
        self.record(state);
    }

    pub(crate) fn trail(&self) -> Vec<CallbackState> {
        self.trail.iter().copied().collect()
    }

    fn record(&mut self, state: CallbackState) {
        self.state = state;
        if self.trail.len() == TRAIL_LEN {
            self.trail.pop_front();
        }
        self.trail.push_back(state);
    }
}
