//! Scenario tests for `MemorySim` driven through `GpiImpl`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use parking_lot::Mutex;

use crate::backend::GpiImpl;
use crate::callback::{Armable, CallbackHandle, CallbackKind, CallbackState, Payload};
use crate::error::GpiError;
use crate::handle::{Alphabet, HierarchyNavigable, SignalHandle, SignalValue, ValueAccessible};
use crate::memsim::{MemorySim, Phase};
use crate::time::SimTime;

fn design() -> Arc<MemorySim> {
    MemorySim::builder()
        .module("top")
        .reg("top.clk", 1)
        .init("top.clk", "0")
        .net("top.data", 8)
        .param("top.WIDTH", 4, "1000")
        .module("top.core")
        .net("top.core.ready", 1)
        .build()
        .unwrap()
}

fn signal(sim: &Arc<MemorySim>, path: &str) -> SignalHandle {
    let mut parts = path.split('.');
    let mut h = sim.get_root_handle(parts.next().unwrap()).unwrap();
    for p in parts {
        h = h.get_handle_by_name(p).unwrap();
    }
    h.into_signal().unwrap()
}

type Log = Arc<Mutex<Vec<(u64, &'static str)>>>;

/// A user function recording `(now, tag)` each time it runs.
fn tagger(sim: &Arc<MemorySim>, log: &Log, tag: &'static str) -> impl FnMut(&Payload) -> anyhow::Result<()> {
    let weak: Weak<MemorySim> = Arc::downgrade(sim);
    let log = log.clone();
    move |_p: &Payload| {
        let sim = weak.upgrade().ok_or_else(|| anyhow::anyhow!("backend dropped"))?;
        log.lock().push((sim.now().as_ps(), tag));
        Ok(())
    }
}

fn counter(cb: &CallbackHandle) -> Arc<AtomicU64> {
    let hits = Arc::new(AtomicU64::new(0));
    let h = hits.clone();
    cb.set_user_data(
        move |_p: &Payload| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        (),
    )
    .unwrap();
    hits
}

// ── Timed callbacks ───────────────────────────────────────────────────

#[test]
fn test_timed_callback_fires_once_with_payload() {
    let sim = design();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let cb = sim.register_timed_callback(1000).unwrap();
    assert_eq!(cb.get_call_state(), CallbackState::Primed);

    let weak: Weak<MemorySim> = Arc::downgrade(&sim);
    let log = seen.clone();
    cb.set_user_data(
        move |p: &Payload| {
            let sim = weak.upgrade().ok_or_else(|| anyhow::anyhow!("backend dropped"))?;
            let value = *p.downcast_ref::<i32>().ok_or_else(|| anyhow::anyhow!("bad payload"))?;
            log.lock().push((SimTime::from_parts(sim.get_sim_time().0, sim.get_sim_time().1), value));
            Ok(())
        },
        42i32,
    )
    .unwrap();

    assert_eq!(sim.run(), 1);
    assert_eq!(*seen.lock(), vec![(SimTime::from_ps(1000), 42)]);
    assert_eq!(cb.get_call_state(), CallbackState::Free);
    assert_eq!(cb.fire_count(), 1);
    assert_eq!(sim.pending_callbacks(), 0);
}

#[test]
fn test_timed_delay_is_relative_to_now() {
    let sim = design();
    sim.run_until(SimTime::from_ps(500));
    assert_eq!(sim.now(), SimTime::from_ps(500));
    let cb = sim.register_timed_callback(100).unwrap();
    counter(&cb);
    sim.run();
    assert_eq!(sim.now(), SimTime::from_ps(600));
}

#[test]
fn test_get_sim_time_splits_halves() {
    let sim = design();
    let t = (3u64 << 32) | 7;
    sim.run_until(SimTime::from_ps(t));
    assert_eq!(sim.get_sim_time(), (3, 7));
}

#[test]
fn test_timer_overflow_is_refused() {
    let sim = design();
    sim.run_until(SimTime::from_ps(10));
    let err = sim.register_timed_callback(u64::MAX).unwrap_err();
    assert_eq!(err, GpiError::TimeOverflow);
}

// ── Phases ────────────────────────────────────────────────────────────

#[test]
fn test_phase_order_within_slot() {
    let sim = design();
    let order = Arc::new(Mutex::new(Vec::new()));
    let rw = sim.register_readwrite_callback().unwrap();
    let ro = sim.register_readonly_callback().unwrap();
    let timer = sim.register_timed_callback(0).unwrap();
    for (cb, tag) in [(&rw, "rw"), (&ro, "ro"), (&timer, "timer")] {
        let o = order.clone();
        cb.set_user_data(
            move |_p: &Payload| {
                o.lock().push(tag);
                Ok(())
            },
            (),
        )
        .unwrap();
    }
    sim.run();
    assert_eq!(*order.lock(), vec!["timer", "ro", "rw"]);

    let phases: Vec<Phase> = sim.trace().iter().map(|e| e.phase).collect();
    assert_eq!(phases, vec![Phase::Timer, Phase::ReadOnly, Phase::ReadWrite]);
}

#[test]
fn test_write_rejected_in_readonly_phase() {
    let sim = design();
    let data = signal(&sim, "top.data");
    let outcome = Arc::new(Mutex::new(None));
    let cb = sim.register_readonly_callback().unwrap();
    let out = outcome.clone();
    let d = data.clone();
    cb.set_user_data(
        move |_p: &Payload| {
            *out.lock() = Some(d.set_signal_value(SignalValue::Int(5)));
            Ok(())
        },
        (),
    )
    .unwrap();
    sim.run();
    assert_eq!(*outcome.lock(), Some(Err(GpiError::ReadOnlyPhase)));
    assert_eq!(data.get_signal_value_binstr().unwrap(), "xxxxxxxx");
}

#[test]
fn test_nexttime_opens_the_next_slot() {
    let sim = design();
    let order = Arc::new(Mutex::new(Vec::new()));
    let timer = sim.register_timed_callback(100).unwrap();
    let next = sim.register_nexttime_callback().unwrap();
    for (cb, tag) in [(&timer, "timer"), (&next, "next")] {
        let o = order.clone();
        cb.set_user_data(
            move |_p: &Payload| {
                o.lock().push(tag);
                Ok(())
            },
            (),
        )
        .unwrap();
    }
    sim.run();
    assert_eq!(*order.lock(), vec!["next", "timer"]);
    assert!(sim.trace().iter().all(|e| e.time == SimTime::from_ps(100)));
}

#[test]
fn test_nexttime_alone_stays_pending() {
    let sim = design();
    let cb = sim.register_nexttime_callback().unwrap();
    assert_eq!(sim.run(), 0);
    assert!(sim.is_finished());
    assert_eq!(cb.get_call_state(), CallbackState::Primed);
}

#[test]
fn test_readonly_registered_from_readwrite_waits_for_next_slot() {
    let sim = design();
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let rw1 = sim.register_readwrite_callback().unwrap();
    let rw2 = sim.register_readwrite_callback().unwrap();
    let timer = sim.register_timed_callback(100).unwrap();

    let weak: Weak<MemorySim> = Arc::downgrade(&sim);
    let mut record = tagger(&sim, &log, "rw1");
    let ro_log = log.clone();
    rw1.set_user_data(
        move |p: &Payload| {
            record(p)?;
            let sim = weak.upgrade().ok_or_else(|| anyhow::anyhow!("backend dropped"))?;
            assert_eq!(sim.current_phase(), Some(Phase::ReadWrite));
            let ro = sim.register_readonly_callback()?;
            ro.set_user_data(tagger(&sim, &ro_log, "ro"), ())?;
            Ok(())
        },
        (),
    )
    .unwrap();
    rw2.set_user_data(tagger(&sim, &log, "rw2"), ()).unwrap();
    timer.set_user_data(tagger(&sim, &log, "timer"), ()).unwrap();

    sim.run();
    assert_eq!(
        *log.lock(),
        vec![(0, "rw1"), (0, "rw2"), (100, "timer"), (100, "ro")]
    );
    let keys: Vec<(SimTime, Phase)> = sim.trace().iter().map(|e| (e.time, e.phase)).collect();
    assert!(keys.windows(2).all(|w| w[0] <= w[1]), "slot phases reordered: {keys:?}");
}

#[test]
fn test_readwrite_registered_from_value_change_waits_for_next_slot() {
    let sim = design();
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let clk = signal(&sim, "top.clk");
    let watcher = clk.rising_edge_cb();
    let weak: Weak<MemorySim> = Arc::downgrade(&sim);
    let rw_log = log.clone();
    watcher
        .set_user_data(
            move |_p: &Payload| {
                let sim = weak.upgrade().ok_or_else(|| anyhow::anyhow!("backend dropped"))?;
                let rw = sim.register_readwrite_callback()?;
                rw.set_user_data(tagger(&sim, &rw_log, "rw"), ())?;
                Ok(())
            },
            (),
        )
        .unwrap();
    watcher.arm_callback().unwrap();
    clk.set_signal_value("1".into()).unwrap();

    assert_eq!(sim.run(), 1);
    assert!(log.lock().is_empty());
    assert_eq!(sim.run_until(SimTime::from_ps(40)), 1);
    assert_eq!(*log.lock(), vec![(40, "rw")]);
}

#[test]
fn test_run_until_releases_pending_nexttime() {
    let sim = design();
    let cb = sim.register_nexttime_callback().unwrap();
    let hits = counter(&cb);
    assert_eq!(sim.run_until(SimTime::from_ps(50)), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(sim.now(), SimTime::from_ps(50));
    assert_eq!(sim.trace()[0].phase, Phase::NextTime);
    assert_eq!(sim.trace()[0].time, SimTime::from_ps(50));
    assert_eq!(cb.get_call_state(), CallbackState::Free);
    assert_eq!(sim.pending_callbacks(), 0);
}

// ── Re-arming ─────────────────────────────────────────────────────────

#[test]
fn test_timer_rearms_itself_from_its_function() {
    let sim = design();
    let cb = sim.register_timed_callback(10).unwrap();
    let me = cb.clone();
    let weak: Weak<MemorySim> = Arc::downgrade(&sim);
    let times = Arc::new(Mutex::new(Vec::new()));
    let t = times.clone();
    cb.set_user_data(
        move |_p: &Payload| {
            let sim = weak.upgrade().ok_or_else(|| anyhow::anyhow!("backend dropped"))?;
            let mut t = t.lock();
            t.push(sim.now().as_ps());
            if t.len() < 5 {
                me.arm_callback()?;
            }
            Ok(())
        },
        (),
    )
    .unwrap();

    assert_eq!(sim.run(), 5);
    assert_eq!(*times.lock(), vec![10, 20, 30, 40, 50]);
    assert_eq!(cb.fire_count(), 5);
    assert_eq!(cb.get_call_state(), CallbackState::Free);
    assert!(cb
        .recent_states()
        .windows(2)
        .any(|w| w == [CallbackState::PostCall, CallbackState::Primed]));
    cb.cleanup_callback().unwrap();
}

#[test]
fn test_recurring_callback_is_still_armed_while_firing() {
    let sim = design();
    let clk = signal(&sim, "top.clk");
    let cb = clk.rising_edge_cb();
    let me = cb.clone();
    let outcome = Arc::new(Mutex::new(None));
    let out = outcome.clone();
    cb.set_user_data(
        move |_p: &Payload| {
            *out.lock() = Some(me.arm_callback());
            Ok(())
        },
        (),
    )
    .unwrap();
    cb.arm_callback().unwrap();
    clk.set_signal_value("1".into()).unwrap();
    sim.run();

    assert!(matches!(
        *outcome.lock(),
        Some(Err(GpiError::IllegalTransition { from: CallbackState::PreCall, .. }))
    ));
    assert_eq!(cb.get_call_state(), CallbackState::Primed);
    cb.cleanup_callback().unwrap();
}

#[test]
fn test_panicking_watcher_is_deleted() {
    let sim = design();
    let clk = signal(&sim, "top.clk");
    let cb = clk.rising_edge_cb();
    cb.set_user_data(|_p: &Payload| -> anyhow::Result<()> { panic!("kaput") }, ())
        .unwrap();
    cb.arm_callback().unwrap();

    for v in ["1", "0", "1"] {
        clk.set_signal_value(v.into()).unwrap();
        sim.run();
    }
    assert_eq!(cb.get_call_state(), CallbackState::Delete);
    assert_eq!(cb.fire_count(), 1);
    assert!(cb.last_error().unwrap().contains("kaput"));
    assert_eq!(sim.pending_callbacks(), 0);
}

// ── Value changes ─────────────────────────────────────────────────────

#[test]
fn test_edge_callbacks_are_recurring() {
    let sim = design();
    let clk = signal(&sim, "top.clk");
    let rising = clk.rising_edge_cb();
    let falling = clk.falling_edge_cb();
    let any = clk.value_change_cb();
    let r = counter(&rising);
    let f = counter(&falling);
    let a = counter(&any);
    rising.arm_callback().unwrap();
    falling.arm_callback().unwrap();
    any.arm_callback().unwrap();

    for v in ["1", "0", "1", "1"] {
        clk.set_signal_value(v.into()).unwrap();
        sim.run();
    }
    assert_eq!(r.load(Ordering::SeqCst), 2);
    assert_eq!(f.load(Ordering::SeqCst), 1);
    assert_eq!(a.load(Ordering::SeqCst), 3);
    assert_eq!(rising.get_call_state(), CallbackState::Primed);
}

#[test]
fn test_value_change_on_scope_is_refused() {
    let sim = design();
    let top = sim.get_root_handle("top").unwrap();
    let cb = CallbackHandle::new(
        sim.handle_ref(),
        sim.id(),
        CallbackKind::ValueChange {
            signal: top.handle_id(),
            edge: crate::callback::Edge::Any,
        },
    );
    assert_eq!(cb.arm_callback().unwrap_err(), GpiError::NotASignal(top.handle_id()));
    assert_eq!(cb.get_call_state(), CallbackState::Free);
}

#[test]
fn test_parameter_is_read_only() {
    let sim = design();
    let width = signal(&sim, "top.WIDTH");
    assert_eq!(width.get_signal_value_binstr().unwrap(), "1000");
    assert!(matches!(
        width.set_signal_value(SignalValue::Int(1)),
        Err(GpiError::ReadOnly(_))
    ));
}

#[test]
fn test_delta_loop_ends_simulation() {
    let sim = MemorySim::builder()
        .module("top")
        .reg("top.osc", 1)
        .init("top.osc", "0")
        .max_deltas_per_slot(50)
        .build()
        .unwrap();
    let osc = signal(&sim, "top.osc");
    let cb = osc.value_change_cb();
    let o = osc.clone();
    cb.set_user_data(
        move |_p: &Payload| {
            let next = if o.get_signal_value_binstr()? == "1" { "0" } else { "1" };
            o.set_signal_value(next.into())?;
            Ok(())
        },
        (),
    )
    .unwrap();
    cb.arm_callback().unwrap();
    osc.set_signal_value("1".into()).unwrap();

    assert_eq!(sim.run(), 50);
    assert!(sim.has_ended());
    assert_eq!(sim.now(), SimTime::ZERO);
}

#[test]
fn test_delta_limit_ignores_independent_callbacks() {
    let sim = MemorySim::builder()
        .module("top")
        .reg("top.clk", 1)
        .init("top.clk", "0")
        .max_deltas_per_slot(3)
        .build()
        .unwrap();
    let clk = signal(&sim, "top.clk");
    let mut hits: Vec<Arc<AtomicU64>> = (0..4)
        .map(|_| counter(&sim.register_readwrite_callback().unwrap()))
        .collect();
    for _ in 0..4 {
        let watcher = clk.rising_edge_cb();
        hits.push(counter(&watcher));
        watcher.arm_callback().unwrap();
    }
    let later = counter(&sim.register_timed_callback(100).unwrap());

    clk.set_signal_value("1".into()).unwrap();
    assert_eq!(sim.run(), 9);
    assert!(!sim.has_ended());
    assert!(hits.iter().all(|h| h.load(Ordering::SeqCst) == 1));
    assert_eq!(later.load(Ordering::SeqCst), 1);
}

// ── Registration limits and termination ───────────────────────────────

#[test]
fn test_pending_limit_keeps_handle_free() {
    let sim = MemorySim::builder()
        .module("top")
        .max_pending_callbacks(2)
        .build()
        .unwrap();
    sim.register_timed_callback(10).unwrap();
    sim.register_timed_callback(20).unwrap();

    let extra = CallbackHandle::new(sim.handle_ref(), sim.id(), CallbackKind::ReadWrite);
    let err = extra.arm_callback().unwrap_err();
    assert!(matches!(err, GpiError::RegistrationFailed { kind: "read-write", .. }));
    assert_eq!(extra.get_call_state(), CallbackState::Free);

    sim.run();
    extra.arm_callback().unwrap();
}

#[test]
fn test_sim_end_refuses_new_work() {
    let sim = design();
    let cb = sim.register_timed_callback(10).unwrap();
    let hits = counter(&cb);
    sim.sim_end();
    sim.sim_end();
    assert_eq!(sim.register_readwrite_callback().unwrap_err(), GpiError::SimulationEnded);
    assert_eq!(sim.run(), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(sim.is_finished());
}

#[test]
fn test_run_for_and_run_until_bounds() {
    let sim = design();
    for t in [10, 20, 30] {
        counter(&sim.register_timed_callback(t).unwrap());
    }
    assert_eq!(sim.run_for(1), 1);
    assert_eq!(sim.run_until(SimTime::from_ps(25)), 1);
    assert_eq!(sim.now(), SimTime::from_ps(25));
    assert_eq!(sim.run(), 1);
    assert_eq!(sim.events_processed(), 3);
}

// ── Deregistration ────────────────────────────────────────────────────

#[test]
fn test_deregistered_callback_never_runs() {
    let sim = design();
    let cb = sim.register_timed_callback(10).unwrap();
    let hits = counter(&cb);
    sim.deregister_callback(&cb).unwrap();
    assert_eq!(cb.get_call_state(), CallbackState::Delete);
    sim.run();
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(sim.trace().is_empty());
}

#[test]
fn test_deregister_from_foreign_backend_is_refused() {
    let a = design();
    let b = design();
    let cb = a.register_timed_callback(10).unwrap();
    assert!(matches!(
        b.deregister_callback(&cb),
        Err(GpiError::UnknownCallback { .. })
    ));
    assert_eq!(cb.get_call_state(), CallbackState::Primed);
}

#[test]
fn test_callback_may_deregister_itself_while_firing() {
    let sim = design();
    let clk = signal(&sim, "top.clk");
    let cb = clk.value_change_cb();
    let me = cb.clone();
    cb.set_user_data(
        move |_p: &Payload| {
            me.cleanup_callback()?;
            Ok(())
        },
        (),
    )
    .unwrap();
    cb.arm_callback().unwrap();

    clk.set_signal_value("1".into()).unwrap();
    sim.run();
    clk.set_signal_value("0".into()).unwrap();
    sim.run();

    assert_eq!(cb.fire_count(), 1);
    assert_eq!(cb.get_call_state(), CallbackState::Delete);
}

#[test]
fn test_deregister_races_delivery() {
    for _ in 0..100 {
        let sim = design();
        let cb = sim.register_timed_callback(10).unwrap();
        let hits = counter(&cb);

        let runner = {
            let sim = sim.clone();
            thread::spawn(move || sim.run())
        };
        let prior = cb.cleanup_callback().unwrap();
        runner.join().unwrap();

        let expected = if prior == CallbackState::Primed { 0 } else { 1 };
        assert_eq!(hits.load(Ordering::SeqCst), expected, "prior state {prior}");
        assert_eq!(cb.get_call_state(), CallbackState::Delete);
    }
}

// ── Hierarchy mutation ────────────────────────────────────────────────

#[test]
fn test_removed_subtree_goes_stale() {
    let sim = design();
    let ready = signal(&sim, "top.core.ready");
    let watcher = ready.value_change_cb();
    counter(&watcher);
    watcher.arm_callback().unwrap();
    let core = sim
        .get_root_handle("top")
        .unwrap()
        .get_handle_by_name("core")
        .unwrap();

    assert_eq!(sim.entity_count(), 6);
    assert_eq!(sim.remove(core.handle_id()).unwrap(), 2);
    assert_eq!(sim.entity_count(), 4);
    assert_eq!(watcher.get_call_state(), CallbackState::Delete);
    assert!(matches!(ready.get_signal_value_binstr(), Err(GpiError::StaleHandle(_))));
    assert!(matches!(
        ready.set_signal_value("1".into()),
        Err(GpiError::StaleHandle(_))
    ));
    assert!(core.get_handle_by_name("ready").is_none());
    assert_eq!(core.iterate_handle(crate::handle::KindMask::all()).count(), 0);
    assert_eq!(sim.pending_callbacks(), 0);
    assert_eq!(sim.remove(core.handle_id()).unwrap_err(), GpiError::StaleHandle(core.handle_id()));
}

// ── Alphabet ──────────────────────────────────────────────────────────

#[test]
fn test_binary_backend_initialises_to_zero() {
    let sim = MemorySim::builder()
        .alphabet(Alphabet::Binary)
        .module("top")
        .net("top.bus", 4)
        .build()
        .unwrap();
    let bus = signal(&sim, "top.bus");
    assert_eq!(bus.get_signal_value_binstr().unwrap(), "0000");
    assert!(matches!(
        bus.set_signal_value("10x1".into()),
        Err(GpiError::InvalidSymbol { symbol: 'x', .. })
    ));
}

#[test]
fn test_bad_config_is_refused() {
    let err = MemorySim::builder().net("orphan.n", 1).build().unwrap_err();
    assert!(matches!(err, GpiError::InvalidConfig(_)));
    let err = MemorySim::builder()
        .module("top")
        .param("top.P", 2, "101")
        .build()
        .unwrap_err();
    assert!(matches!(err, GpiError::WidthMismatch { .. }));
}

// ── Determinism ───────────────────────────────────────────────────────

#[test]
fn test_identical_runs_hash_equal() {
    fn scenario() -> u64 {
        let sim = design();
        let clk = signal(&sim, "top.clk");
        let edge = clk.rising_edge_cb();
        counter(&edge);
        edge.arm_callback().unwrap();
        for t in [5, 15, 25] {
            let cb = sim.register_timed_callback(t).unwrap();
            let c = clk.clone();
            cb.set_user_data(
                move |_p: &Payload| {
                    let next = if c.get_signal_value_binstr()? == "1" { 0 } else { 1 };
                    c.set_signal_value(SignalValue::Int(next))?;
                    Ok(())
                },
                (),
            )
            .unwrap();
        }
        sim.run();
        sim.trace_hash()
    }
    assert_eq!(scenario(), scenario());
}

#[cfg(feature = "serialize")]
#[test]
fn test_trace_json_lists_deliveries() {
    let sim = design();
    counter(&sim.register_timed_callback(7).unwrap());
    sim.run();
    let json = sim.trace_json().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.as_array().map(Vec::len), Some(1));
    assert_eq!(parsed[0]["kind"], "timed");
}
