//! # cosim-gpi: Generic Procedural Interface for co-simulation
//!
//! A uniform layer between a host test environment and an HDL simulation
//! engine. Host code discovers design entities, reads and writes signal
//! values and arms callbacks on simulation events without knowing which
//! engine sits underneath.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │   host code / scripting      │ ← embed_init, Clock, handles
//! │  ┌────────────────────────┐  │
//! │  │  registry              │  │ ← the one active GpiImpl
//! │  │  ┌──────────────────┐  │  │
//! │  │  │  ObjectHandle    │  │  │ ← hierarchy navigation
//! │  │  │  SignalHandle    │  │  │ ← values, edge callbacks
//! │  │  │  CallbackHandle  │  │  │ ← FREE/PRIMED/PRE_CALL/POST_CALL/DELETE
//! │  │  └──────────────────┘  │  │
//! │  │  ┌──────────────────┐  │  │
//! │  │  │  GpiImpl         │  │  │ ← backend adapter (e.g. MemorySim)
//! │  │  └──────────────────┘  │  │
//! │  └────────────────────────┘  │
//! └──────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use cosim_gpi::{Clock, GpiImpl, HierarchyNavigable, MemorySim, SimTime, ValueAccessible};
//!
//! let sim = MemorySim::builder()
//!     .module("top")
//!     .reg("top.clk", 1)
//!     .init("top.clk", "0")
//!     .build()
//!     .unwrap();
//!
//! let clk = sim
//!     .get_root_handle("top")
//!     .unwrap()
//!     .get_handle_by_name("clk")
//!     .unwrap()
//!     .into_signal()
//!     .unwrap();
//!
//! let clock = Clock::new(clk.clone()).unwrap();
//! clock.start_clock(500).unwrap();
//! sim.run_until(SimTime::from_ps(1000));
//! assert_eq!(clk.get_signal_value_binstr().unwrap(), "1");
//! ```

pub mod backend;
pub mod callback;
pub mod clock;
pub mod embed;
pub mod error;
pub mod handle;
pub mod memsim;
pub mod registry;
pub mod time;

// Re-exports for convenience.
pub use backend::GpiImpl;
pub use callback::{Armable, CallbackFn, CallbackHandle, CallbackKind, CallbackState, Edge, Payload};
pub use clock::Clock;
pub use embed::{EmbedHost, SessionStage, SimInfo};
pub use error::{ErrorClass, GpiError, GpiResult};
pub use handle::{
    Alphabet, BackendId, CallbackId, HandleDesc, HandleId, HandleIterator, HierarchyNavigable,
    Identifiable, KindMask, ObjectHandle, ObjectKind, SignalHandle, SignalValue, ValueAccessible,
};
pub use memsim::{MemorySim, MemorySimBuilder, MemorySimConfig};
pub use time::SimTime;
