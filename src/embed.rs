//! Lifecycle entry points for the host that embeds the scripting runtime.
//!
//! ```text
//!   Idle ──embed_init──► Initialised ──embed_init_scripting_runtime──► ScriptingReady
//!                             │                                              │
//!                             └───────────────── embed_end ─────────────────┴──► Ended
//! ```
//!
//! The scripting runtime may only be brought up once a root handle has
//! been resolved through the registry. An [`EmbedHost`] installed before
//! `embed_init` receives each transition.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{GpiError, GpiResult};

/// Metadata the simulator hands over at session start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SimInfo {
    pub argv: Vec<String>,
    pub product: String,
    pub version: String,
}

impl SimInfo {
    pub fn new(product: impl Into<String>, version: impl Into<String>) -> Self {
        SimInfo {
            argv: Vec::new(),
            product: product.into(),
            version: version.into(),
        }
    }

    pub fn with_argv<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv = argv.into_iter().map(Into::into).collect();
        self
    }
}

/// Receiver of the session lifecycle, typically the scripting bootstrap.
pub trait EmbedHost: Send + Sync {
    fn on_init(&self, info: &SimInfo) -> anyhow::Result<()>;

    fn on_scripting_ready(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_end(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    Idle,
    Initialised,
    ScriptingReady,
    Ended,
}

impl std::fmt::Display for SessionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStage::Idle => "idle",
            SessionStage::Initialised => "initialised",
            SessionStage::ScriptingReady => "scripting-ready",
            SessionStage::Ended => "ended",
        };
        f.write_str(s)
    }
}

struct Session {
    stage: SessionStage,
    root_resolved: bool,
    info: Option<SimInfo>,
    host: Option<Arc<dyn EmbedHost>>,
}

static SESSION: Mutex<Session> = parking_lot::const_mutex(Session {
    stage: SessionStage::Idle,
    root_resolved: false,
    info: None,
    host: None,
});

/// Install the host that receives lifecycle notifications.
/// Only allowed before `embed_init`.
pub fn install_host(host: Arc<dyn EmbedHost>) -> GpiResult<()> {
    let mut session = SESSION.lock();
    if session.stage != SessionStage::Idle {
        return Err(GpiError::Session(format!(
            "cannot install a host once the session is {}",
            session.stage
        )));
    }
    session.host = Some(host);
    Ok(())
}

/// Start the session. Called once by the simulator.
pub fn embed_init(info: SimInfo) -> GpiResult<()> {
    let host = {
        let mut session = SESSION.lock();
        if session.stage != SessionStage::Idle {
            return Err(GpiError::Session(format!(
                "embed_init called while {}",
                session.stage
            )));
        }
        session.info = Some(info.clone());
        session.stage = SessionStage::Initialised;
        session.host.clone()
    };
    info!(product = %info.product, version = %info.version, args = info.argv.len(), "session initialised");
    if let Some(host) = host {
        if let Err(e) = host.on_init(&info) {
            SESSION.lock().stage = SessionStage::Idle;
            return Err(GpiError::Session(format!("host refused init: {e:#}")));
        }
    }
    Ok(())
}

/// Bring up the scripting runtime. Requires an initialised session and a
/// root handle resolved through the registry.
pub fn embed_init_scripting_runtime() -> GpiResult<()> {
    let host = {
        let mut session = SESSION.lock();
        if session.stage != SessionStage::Initialised {
            return Err(GpiError::Session(format!(
                "scripting runtime cannot start while {}",
                session.stage
            )));
        }
        if !session.root_resolved {
            return Err(GpiError::Session("no root handle has been resolved yet".into()));
        }
        session.stage = SessionStage::ScriptingReady;
        session.host.clone()
    };
    info!("scripting runtime ready");
    if let Some(host) = host {
        if let Err(e) = host.on_scripting_ready() {
            SESSION.lock().stage = SessionStage::Initialised;
            return Err(GpiError::Session(format!("host failed to start scripting: {e:#}")));
        }
    }
    Ok(())
}

/// Tear the session down. A second call is a no-op.
pub fn embed_end() -> GpiResult<()> {
    let host = {
        let mut session = SESSION.lock();
        match session.stage {
            SessionStage::Idle => {
                return Err(GpiError::Session("embed_end called before embed_init".into()))
            }
            SessionStage::Ended => {
                debug!("session already ended");
                return Ok(());
            }
            SessionStage::Initialised | SessionStage::ScriptingReady => {}
        }
        session.stage = SessionStage::Ended;
        session.host.clone()
    };
    info!("session ended");
    if let Some(host) = host {
        host.on_end();
    }
    Ok(())
}

pub fn session_stage() -> SessionStage {
    SESSION.lock().stage
}

/// Metadata passed to `embed_init`, if the session has started.
pub fn sim_info() -> Option<SimInfo> {
    SESSION.lock().info.clone()
}

/// Forget everything and return to `Idle`, dropping the installed host.
pub fn reset_session() {
    let mut session = SESSION.lock();
    if session.stage == SessionStage::ScriptingReady {
        warn!("resetting a session whose scripting runtime is still up");
    }
    session.stage = SessionStage::Idle;
    session.root_resolved = false;
    session.info = None;
    session.host = None;
}

pub(crate) fn note_root_resolved() {
    let mut session = SESSION.lock();
    if !session.root_resolved {
        session.root_resolved = true;
        debug!("first root handle resolved");
    }
}
