//! Callback handles and their lifecycle state machine.

pub mod handle;
pub mod state;

pub use handle::{Armable, CallbackFn, CallbackHandle, CallbackKind, Edge, Payload};
pub use state::{CallbackState, Transition};
