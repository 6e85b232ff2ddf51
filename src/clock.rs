//! A free-running clock driven through timed callbacks.
//!
//! [`Clock::start_clock`] drives the first edge immediately, then
//! re-arms a fresh timed callback every half-period. Stopping deregisters
//! whatever toggle is pending, so no edge is driven afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::callback::{Armable, CallbackHandle, CallbackKind, Payload};
use crate::error::{GpiError, GpiResult};
use crate::handle::{HierarchyNavigable, Identifiable, SignalHandle, ValueAccessible};
use crate::registry;
use crate::time::SimTime;

struct Running {
    pending: CallbackHandle,
    half_period: u64,
    generation: u64,
}

struct Shared {
    signal: SignalHandle,
    running: Mutex<Option<Running>>,
    generation: AtomicU64,
    toggles: AtomicU64,
}

/// Drives a 1-bit writable signal with a 50% duty cycle.
pub struct Clock {
    shared: Arc<Shared>,
}

impl Clock {
    /// Wrap `signal`, which must be one bit wide and writable.
    pub fn new(signal: SignalHandle) -> GpiResult<Self> {
        if signal.width() != 1 {
            return Err(GpiError::WidthMismatch {
                name: signal.get_name_str().to_string(),
                expected: 1,
                actual: signal.width() as usize,
            });
        }
        if !signal.kind().is_writable() {
            return Err(GpiError::ReadOnly(signal.get_name_str().to_string()));
        }
        Ok(Clock {
            shared: Arc::new(Shared {
                signal,
                running: Mutex::new(None),
                generation: AtomicU64::new(0),
                toggles: AtomicU64::new(0),
            }),
        })
    }

    /// Resolve `path` through the active backend and wrap it.
    pub fn from_path(path: &str) -> GpiResult<Self> {
        let signal = registry::get_handle_by_path(path)?.try_into_signal()?;
        Clock::new(signal)
    }

    pub fn signal(&self) -> &SignalHandle {
        &self.shared.signal
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.lock().is_some()
    }

    pub fn half_period(&self) -> Option<u64> {
        self.shared.running.lock().as_ref().map(|r| r.half_period)
    }

    /// Edges driven since creation.
    pub fn toggles(&self) -> u64 {
        self.shared.toggles.load(Ordering::Acquire)
    }

    /// Toggle now, then every `half_period_ps`.
    pub fn start_clock(&self, half_period_ps: i64) -> GpiResult<()> {
        if half_period_ps <= 0 {
            return Err(GpiError::InvalidPeriod(half_period_ps));
        }
        let half_period = half_period_ps as u64;
        let mut running = self.shared.running.lock();
        if running.is_some() {
            return Err(GpiError::ClockRunning(self.shared.signal.get_name_str().to_string()));
        }
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        // Arm before driving so a refused start leaves the signal alone.
        let pending = arm_next(&self.shared, half_period, generation)?;
        if let Err(e) = self.shared.toggle() {
            if let Err(cleanup) = pending.cleanup_callback() {
                warn!(callback = %pending.id(), error = %cleanup, "could not deregister clock toggle");
            }
            return Err(e);
        }
        *running = Some(Running {
            pending,
            half_period,
            generation,
        });
        info!(
            signal = self.shared.signal.get_name_str(),
            half_period = %SimTime::from_ps(half_period),
            "clock started"
        );
        Ok(())
    }

    /// Deregister the pending toggle. Does nothing if already stopped.
    pub fn stop_clock(&self) {
        self.shared.stop();
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("signal", &self.shared.signal.get_name_str())
            .field("half_period", &self.half_period())
            .field("toggles", &self.toggles())
            .finish()
    }
}

impl Shared {
    fn toggle(&self) -> GpiResult<()> {
        let next = if self.signal.get_signal_value_binstr()? == "1" {
            "0"
        } else {
            "1"
        };
        self.signal.set_signal_value(next.into())?;
        self.toggles.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        if let Err(e) = running.pending.cleanup_callback() {
            warn!(callback = %running.pending.id(), error = %e, "could not deregister clock toggle");
        }
        debug!(signal = self.signal.get_name_str(), "clock stopped");
    }

    /// One half-period elapsed: drive the edge and queue the next one.
    fn tick(self: &Arc<Self>, generation: u64) -> anyhow::Result<()> {
        let mut running = self.running.lock();
        let half_period = match running.as_ref() {
            Some(r) if r.generation == generation => r.half_period,
            // Stopped (or restarted) while this toggle was being delivered.
            _ => return Ok(()),
        };
        let result = self
            .toggle()
            .and_then(|()| arm_next(self, half_period, generation));
        match result {
            Ok(pending) => {
                if let Some(r) = running.as_mut() {
                    r.pending = pending;
                }
                Ok(())
            }
            Err(GpiError::SimulationEnded) => {
                debug!(signal = self.signal.get_name_str(), "simulation ended, clock stops");
                *running = None;
                Ok(())
            }
            Err(e) => {
                *running = None;
                Err(e.into())
            }
        }
    }
}

fn arm_next(shared: &Arc<Shared>, half_period: u64, generation: u64) -> GpiResult<CallbackHandle> {
    let backend = shared.signal.backend()?;
    let callback = CallbackHandle::new(
        backend.handle_ref(),
        backend.id(),
        CallbackKind::Timer {
            delay: SimTime::from_ps(half_period),
        },
    );
    let weak: Weak<Shared> = Arc::downgrade(shared);
    callback.set_user_data(
        move |_p: &Payload| match weak.upgrade() {
            Some(shared) => shared.tick(generation),
            None => Ok(()),
        },
        (),
    )?;
    callback.arm_callback()?;
    Ok(callback)
}
