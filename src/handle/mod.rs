//! Hierarchy and signal handles.
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`id`] | [`HandleId`], [`CallbackId`], [`BackendId`] |
//! | [`kind`] | [`ObjectKind`], [`KindMask`] |
//! | [`value`] | [`Alphabet`], [`SignalValue`] |
//! | [`traits`] | capability traits |
//! | [`object`] | [`ObjectHandle`], [`HandleDesc`] |
//! | [`signal`] | [`SignalHandle`] |
//! | [`iter`] | [`HandleIterator`] |

pub mod id;
pub mod iter;
pub mod kind;
pub mod object;
pub mod signal;
pub mod traits;
pub mod value;

pub use id::{BackendId, CallbackId, HandleId};
pub use iter::HandleIterator;
pub use kind::{KindMask, ObjectKind};
pub use object::{HandleDesc, ObjectHandle};
pub use signal::SignalHandle;
pub use traits::{HierarchyNavigable, Identifiable, ValueAccessible};
pub use value::{Alphabet, SignalValue};
