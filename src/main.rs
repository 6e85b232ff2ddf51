use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use cosim_gpi::embed::{self, SessionStage, SimInfo};
use cosim_gpi::registry;
use cosim_gpi::{Armable, Clock, HierarchyNavigable, MemorySim, Payload, SimTime, ValueAccessible};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("═══════════════════════════════════════════════════════");
    println!("  cosim-gpi: clock + edge counter on the in-memory backend");
    println!("═══════════════════════════════════════════════════════");
    println!();

    embed::embed_init(
        SimInfo::new("memsim", env!("CARGO_PKG_VERSION")).with_argv(std::env::args()),
    )?;

    // ── Run twice, compare fingerprints ───────────────────────
    let hash_1 = run_session("Run 1")?;
    let hash_2 = run_session("Run 2")?;

    println!("  Verification:");
    println!("    Run 1 trace hash: {:016x}", hash_1);
    println!("    Run 2 trace hash: {:016x}", hash_2);
    if hash_1 == hash_2 {
        println!("    ✓ Traces are IDENTICAL, dispatch is deterministic.");
    } else {
        println!("    ✗ MISMATCH, dispatch order differs between runs!");
    }
    println!();

    embed::embed_end()?;
    Ok(())
}

fn run_session(label: &str) -> anyhow::Result<u64> {
    let sim = MemorySim::builder()
        .name("memsim-demo")
        .module("top")
        .reg("top.clk", 1)
        .init("top.clk", "0")
        .module("top.counter")
        .reg("top.counter.count", 8)
        .init("top.counter.count", "00000000")
        .build()?;
    registry::register_impl(sim.clone())?;

    let top = registry::get_root_handle("top")?;
    if embed::session_stage() == SessionStage::Initialised {
        embed::embed_init_scripting_runtime()?;
    }

    // Count rising edges into top.counter.count.
    let count = registry::get_handle_by_path("top.counter.count")?.try_into_signal()?;
    let clk = registry::get_handle_by_path("top.clk")?.try_into_signal()?;
    let edges = Arc::new(AtomicU64::new(0));
    let rising = clk.rising_edge_cb();
    {
        let edges = edges.clone();
        let count = count.clone();
        rising.set_user_data(
            move |_p: &Payload| {
                let n = edges.fetch_add(1, Ordering::SeqCst) + 1;
                count.set_signal_value((n as i64).into())?;
                Ok(())
            },
            (),
        )?;
    }
    rising.arm_callback()?;

    let clock = Clock::new(clk)?;
    clock.start_clock(500)?;

    // A timed sampler at 2.5ns samples the counter.
    let sampler = registry::register_timed_callback(2_500)?;
    {
        let count = count.clone();
        let sim: Weak<MemorySim> = Arc::downgrade(&sim);
        sampler.set_user_data(
            move |_p: &Payload| {
                let phase = sim
                    .upgrade()
                    .and_then(|s| s.current_phase())
                    .map_or("-", |p| p.as_str());
                println!(
                    "    sample @2500ps ({phase}): count = {}",
                    count.get_signal_value_binstr()?
                );
                Ok(())
            },
            (),
        )?;
    }

    let dispatched = sim.run_until(SimTime::from_ps(10_000));
    clock.stop_clock();
    registry::deregister_callback(&rising)?;

    println!(
        "  {}: root {:?} ({} entities), {} dispatches, {} toggles, {} rising edges, count = {}",
        label,
        top.get_name_str(),
        sim.entity_count(),
        dispatched,
        clock.toggles(),
        edges.load(Ordering::SeqCst),
        count.get_signal_value_binstr()?,
    );

    let hash = sim.trace_hash();
    registry::unregister_impl();
    Ok(hash)
}
