//! Structured error types for the co-simulation interface.
//!
//! Discovery misses are not errors: `get_handle_by_name` and friends
//! return `Option`. Everything else that can fail returns
//! `Result<T, GpiError>`. Contract violations (width mismatch, use after
//! delete, double arming) are surfaced as typed variants instead of
//! aborting, and [`GpiError::class`] tells callers which bucket an error
//! falls into.

use crate::callback::{CallbackState, Transition};
use crate::handle::{Alphabet, CallbackId, HandleId};

/// Which part of the error taxonomy an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A name, index, root or path did not resolve.
    NotFound,
    /// The backend could not arm a callback or honour a request.
    Registration,
    /// Host or backend code broke the handle/callback contract.
    ContractViolation,
}

/// The top-level error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GpiError {
    // ── Discovery ─────────────────────────────────────────

    /// No top-level entity with this name exists.
    #[error("no root handle named {0:?}")]
    RootNotFound(String),

    /// A dotted path did not resolve to an entity.
    #[error("no handle at path {0:?}")]
    PathNotFound(String),

    // ── Registration ──────────────────────────────────────

    /// The backend refused to register a callback with its engine.
    #[error("backend {backend} could not arm {kind} callback: {reason}")]
    RegistrationFailed {
        backend: String,
        kind: &'static str,
        reason: String,
    },

    /// The callback was issued by a different backend instance.
    #[error("callback {callback} is not known to backend {backend}")]
    UnknownCallback { callback: CallbackId, backend: String },

    /// No implementation interface has been registered.
    #[error("no implementation interface is registered")]
    NoBackend,

    /// An implementation interface is already active.
    #[error("implementation interface {0:?} is already registered")]
    AlreadyRegistered(String),

    /// The backend that issued a handle has been dropped.
    #[error("the backend that issued this handle is gone")]
    BackendGone,

    /// `sim_end` has been requested; the engine accepts no new work.
    #[error("simulation has ended")]
    SimulationEnded,

    /// Scheduling would overflow 64-bit simulation time.
    #[error("simulation time overflow")]
    TimeOverflow,

    /// A backend configuration could not be applied.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Contract violations ───────────────────────────────

    /// A handle id refers to an entity the backend no longer has.
    #[error("handle {0} is stale")]
    StaleHandle(HandleId),

    /// A value operation was attempted on a non-signal entity.
    #[error("handle {0} does not carry a value")]
    NotASignal(HandleId),

    /// A binary string's length does not match the signal width.
    #[error("signal {name} is {expected} bits wide, value has {actual}")]
    WidthMismatch {
        name: String,
        expected: u32,
        actual: usize,
    },

    /// A value contains a symbol the backend cannot represent.
    #[error("symbol {symbol:?} is outside the {alphabet} alphabet")]
    InvalidSymbol { symbol: char, alphabet: Alphabet },

    /// The entity cannot be written (e.g. a parameter).
    #[error("signal {0} is read-only")]
    ReadOnly(String),

    /// Writes are forbidden while read-only callbacks are being delivered.
    #[error("writes are not permitted during the read-only phase")]
    ReadOnlyPhase,

    /// A callback state transition outside the lifecycle.
    #[error("callback {callback}: cannot apply {transition} in state {from}")]
    IllegalTransition {
        callback: CallbackId,
        from: CallbackState,
        transition: Transition,
    },

    /// The callback has been deleted and must not be reused.
    #[error("callback {0} has been deleted")]
    CallbackDeleted(CallbackId),

    // ── Clock / session ───────────────────────────────────

    /// `start_clock` on a helper that is already running.
    #[error("clock on {0} is already running")]
    ClockRunning(String),

    /// A clock half-period must be strictly positive.
    #[error("clock half-period must be positive, got {0}ps")]
    InvalidPeriod(i64),

    /// An embedding lifecycle entry point was called out of order.
    #[error("embedding session: {0}")]
    Session(String),
}

impl GpiError {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            GpiError::RootNotFound(_) | GpiError::PathNotFound(_) => ErrorClass::NotFound,
            GpiError::RegistrationFailed { .. }
            | GpiError::UnknownCallback { .. }
            | GpiError::NoBackend
            | GpiError::AlreadyRegistered(_)
            | GpiError::BackendGone
            | GpiError::SimulationEnded
            | GpiError::TimeOverflow
            | GpiError::InvalidConfig(_) => ErrorClass::Registration,
            GpiError::StaleHandle(_)
            | GpiError::NotASignal(_)
            | GpiError::WidthMismatch { .. }
            | GpiError::InvalidSymbol { .. }
            | GpiError::ReadOnly(_)
            | GpiError::ReadOnlyPhase
            | GpiError::IllegalTransition { .. }
            | GpiError::CallbackDeleted(_)
            | GpiError::ClockRunning(_)
            | GpiError::InvalidPeriod(_)
            | GpiError::Session(_) => ErrorClass::ContractViolation,
        }
    }

    /// Shorthand for [`ErrorClass::ContractViolation`].
    pub fn is_contract_violation(&self) -> bool {
        self.class() == ErrorClass::ContractViolation
    }
}

/// Convenience alias for `Result<T, GpiError>`.
pub type GpiResult<T> = Result<T, GpiError>;
