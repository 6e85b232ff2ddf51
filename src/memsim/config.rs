/// Configuration and fluent builder for the in-memory engine.
///
/// A `MemorySimConfig` is plain data: engine limits plus a flat list of
/// entities addressed by dotted path. It can be written by hand, built
/// with `MemorySimBuilder`, or (with the `serialize` feature) loaded
/// from JSON.

use std::sync::Arc;

use crate::error::{GpiError, GpiResult};
use crate::handle::{Alphabet, ObjectKind};

use super::MemorySim;

// ── Config ────────────────────────────────────────────────────────────

/// One entity of the design.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityConfig {
    /// Dotted path; the parent must be declared earlier.
    pub path: String,
    pub kind: ObjectKind,
    /// Bit-width, required for nets, registers and parameters.
    #[cfg_attr(feature = "serialize", serde(default))]
    pub width: Option<u32>,
    /// Native type string; defaults to the kind's name.
    #[cfg_attr(feature = "serialize", serde(default))]
    pub type_name: Option<String>,
    /// Initial value; defaults to all initial symbols of the alphabet.
    #[cfg_attr(feature = "serialize", serde(default))]
    pub init: Option<String>,
}

impl EntityConfig {
    pub fn new(path: impl Into<String>, kind: ObjectKind, width: Option<u32>) -> Self {
        EntityConfig {
            path: path.into(),
            kind,
            width,
            type_name: None,
            init: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct MemorySimConfig {
    /// Backend name reported through `GpiImpl::name`.
    pub name: String,
    pub alphabet: Alphabet,
    /// Arming fails once this many callbacks are registered.
    pub max_pending_callbacks: Option<usize>,
    /// Deliveries allowed within one time slot before the engine
    /// declares a runaway loop and ends the simulation.
    pub max_deltas_per_slot: u32,
    pub entities: Vec<EntityConfig>,
}

impl Default for MemorySimConfig {
    fn default() -> Self {
        MemorySimConfig {
            name: "memsim".to_string(),
            alphabet: Alphabet::FourState,
            max_pending_callbacks: None,
            max_deltas_per_slot: 10_000,
            entities: Vec::new(),
        }
    }
}

impl MemorySimConfig {
    /// Parse a JSON document.
    #[cfg(feature = "serialize")]
    pub fn from_json(json: &str) -> GpiResult<Self> {
        serde_json::from_str(json).map_err(|e| GpiError::InvalidConfig(e.to_string()))
    }

    /// Render as pretty-printed JSON.
    #[cfg(feature = "serialize")]
    pub fn to_json(&self) -> GpiResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| GpiError::InvalidConfig(e.to_string()))
    }

    /// Reject settings the engine cannot honour.
    pub fn validate(&self) -> GpiResult<()> {
        if self.max_deltas_per_slot == 0 {
            return Err(GpiError::InvalidConfig(
                "max_deltas_per_slot must be at least 1".into(),
            ));
        }
        for e in &self.entities {
            if e.path.is_empty() || e.path.split('.').any(str::is_empty) {
                return Err(GpiError::InvalidConfig(format!("malformed path {:?}", e.path)));
            }
            match (e.kind.is_signal(), e.width) {
                (true, Some(0)) | (true, None) => {
                    return Err(GpiError::InvalidConfig(format!(
                        "signal {:?} needs a non-zero width",
                        e.path
                    )))
                }
                (false, Some(_)) => {
                    return Err(GpiError::InvalidConfig(format!(
                        "{} {:?} cannot have a width",
                        e.kind, e.path
                    )))
                }
                (false, None) if e.init.is_some() => {
                    return Err(GpiError::InvalidConfig(format!(
                        "{} {:?} cannot have a value",
                        e.kind, e.path
                    )))
                }
                _ => {}
            }
        }
        Ok(())
    }
}

// ── MemorySimBuilder ──────────────────────────────────────────────────

/// Fluent builder for a `MemorySim`.
///
/// # Example
/// ```rust
/// use cosim_gpi::memsim::MemorySim;
///
/// let sim = MemorySim::builder()
///     .module("top")
///     .reg("top.clk", 1)
///     .net("top.data", 8)
///     .param("top.WIDTH", 32, "00000000000000000000000000001000")
///     .init("top.clk", "0")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySimBuilder {
    config: MemorySimConfig,
}

impl MemorySimBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: MemorySimConfig) -> Self {
        MemorySimBuilder { config }
    }

    // ── Engine ────────────────────────────────────────────────

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn alphabet(mut self, alphabet: Alphabet) -> Self {
        self.config.alphabet = alphabet;
        self
    }

    pub fn max_pending_callbacks(mut self, limit: usize) -> Self {
        self.config.max_pending_callbacks = Some(limit);
        self
    }

    pub fn max_deltas_per_slot(mut self, limit: u32) -> Self {
        self.config.max_deltas_per_slot = limit;
        self
    }

    // ── Hierarchy ─────────────────────────────────────────────

    /// Declare a custom entity.
    pub fn entity(mut self, entity: EntityConfig) -> Self {
        self.config.entities.push(entity);
        self
    }

    pub fn module(self, path: &str) -> Self {
        self.entity(EntityConfig::new(path, ObjectKind::Module, None))
    }

    pub fn scope(self, path: &str) -> Self {
        self.entity(EntityConfig::new(path, ObjectKind::Scope, None))
    }

    pub fn net(self, path: &str, width: u32) -> Self {
        self.entity(EntityConfig::new(path, ObjectKind::Net, Some(width)))
    }

    pub fn reg(self, path: &str, width: u32) -> Self {
        self.entity(EntityConfig::new(path, ObjectKind::Register, Some(width)))
    }

    /// A read-only constant with a fixed value.
    pub fn param(self, path: &str, width: u32, value: &str) -> Self {
        let mut e = EntityConfig::new(path, ObjectKind::Parameter, Some(width));
        e.init = Some(value.to_string());
        self.entity(e)
    }

    /// Set the initial value of an already declared signal.
    pub fn init(mut self, path: &str, value: &str) -> Self {
        if let Some(e) = self.config.entities.iter_mut().rev().find(|e| e.path == path) {
            e.init = Some(value.to_string());
        }
        self
    }

    /// Override the native type string of an already declared entity.
    pub fn type_name(mut self, path: &str, type_name: &str) -> Self {
        if let Some(e) = self.config.entities.iter_mut().rev().find(|e| e.path == path) {
            e.type_name = Some(type_name.to_string());
        }
        self
    }

    // ── Build ─────────────────────────────────────────────────

    pub fn config(&self) -> &MemorySimConfig {
        &self.config
    }

    /// Validate and construct the engine.
    pub fn build(self) -> GpiResult<Arc<MemorySim>> {
        MemorySim::from_config(self.config)
    }
}
