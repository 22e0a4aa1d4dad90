#![warn(clippy::unwrap_used, clippy::pedantic)]
#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::doc_markdown
)]
use std::{
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use clap::Parser;
use color_eyre::eyre::{self, ensure, WrapErr};
use orrery::{
    config::SystemConfiguration,
    conjunction::ConjunctionEvent,
    control::KONAMI,
    scheduler::{FixedRate, FrameScheduler, OnConjunction},
    simulation::{Simulation, Snapshot},
};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const PORTFOLIO: &str = include_str!("../systems/portfolio.toml");

/// Run the orbital simulation headlessly and log what a renderer would see.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// System file (TOML). Defaults to the built-in portfolio system.
    #[arg(short, long)]
    system: Option<PathBuf>,
    /// Wall-clock seconds to run for
    #[arg(short = 't', long, default_value_t = 5.0)]
    seconds: f64,
    /// Initial time scale, clamped to the ceiling
    #[arg(long)]
    time_scale: Option<f64>,
    /// Start with the speed override engaged
    #[arg(long)]
    konami: bool,
    /// Seconds between telemetry reports
    #[arg(long, default_value_t = 1.0)]
    report_every: f64,
    /// Orbit-plane length of one orbit index unit, for the final positions
    #[arg(long, default_value_t = 1.0)]
    base_radius: f64,
    /// Write the final snapshot to this file as RON
    #[arg(long)]
    dump: Option<PathBuf>,
}

fn secs(value: f64, what: &str) -> eyre::Result<Duration> {
    Duration::try_from_secs_f64(value).wrap_err_with(|| format!("invalid {what}: {value}"))
}

fn report_interval(value: f64) -> eyre::Result<Duration> {
    let interval = secs(value, "report interval")?;
    ensure!(!interval.is_zero(), "report interval must be positive, got {value}");
    Ok(interval)
}

fn report(snapshot: &Snapshot, cycle: Option<f64>, epoch_base: u64) {
    let t = snapshot.telemetry;
    let forecast = t.forecast(cycle);
    info!(
        frame = snapshot.frame,
        elapsed = %t.elapsed,
        time_scale = t.time_scale,
        conjunctions = t.conjunction_count,
        epoch_alignments = t.epoch_alignments(epoch_base),
        cycle_remaining = forecast.map(|f| f.remaining),
        next_alignment_in = ?forecast
            .and_then(|f| f.wall_eta())
            .and_then(|eta| time::Duration::try_from(eta).ok()),
        "telemetry"
    );
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let system = match &args.system {
        Some(path) => SystemConfiguration::load(path)?,
        None => SystemConfiguration::from_toml(PORTFOLIO).wrap_err("built-in system")?,
    };
    let run_for = secs(args.seconds, "run time")?;
    let report_every = report_interval(args.report_every)?;
    let refresh = FixedRate::new(system.simulation.refresh_hz)?;
    let epoch_base = system.simulation.epoch_base;

    let sim = Simulation::from_system(system);
    let registry = sim.registry().clone();
    let cycle = sim.system_cycle();
    if let Some(cycle) = cycle {
        info!(cycle, bodies = registry.len(), "system loaded");
    } else {
        info!(bodies = registry.len(), "system loaded, no whole-second cycle");
    }

    let handle = FrameScheduler::new(sim)
        .observe(OnConjunction(|ev: &ConjunctionEvent| {
            info!(
                a = %ev.a,
                b = %ev.b,
                separation = ev.separation_deg,
                at = %ev.elapsed,
                count = ev.count,
                "conjunction"
            );
        }))
        .start(refresh)?;

    if args.konami {
        for key in KONAMI {
            handle.press_key(key)?;
        }
    }
    if let Some(scale) = args.time_scale {
        handle.set_time_scale(scale)?;
    }

    let deadline = Instant::now() + run_for;
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(report_every.min(deadline - now));
        report(&handle.snapshot(), cycle, epoch_base);
    }

    let sim = handle.cancel()?;
    let snapshot = sim.snapshot();
    report(&snapshot, cycle, epoch_base);
    for (id, position, layer) in snapshot.positions(&registry, args.base_radius) {
        debug!(%id, x = position.x, y = position.y, ?layer, "final position");
    }

    if let Some(path) = args.dump {
        let ron = ron::ser::to_string_pretty(&snapshot, ron::ser::PrettyConfig::default())?;
        std::fs::write(&path, ron).wrap_err_with(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "snapshot written");
    }
    Ok(())
}

#[test]
fn report_interval_must_be_positive() {
    assert!(report_interval(0.0).is_err());
    assert!(report_interval(-1.0).is_err());
    assert!(report_interval(f64::NAN).is_err());
    assert!(report_interval(1e-12).is_err());
    assert_eq!(report_interval(0.5).unwrap(), Duration::from_millis(500));
}

#[test]
fn report_survives_a_crawling_clock() {
    let registry = orrery::bodies::BodyRegistry::new(vec![orrery::bodies::Body::new(
        "a", 1.0, 30.0, 1.0,
    )])
    .unwrap();
    let mut sim = Simulation::new(orrery::config::SimulationConfig::default(), registry);
    sim.control_mut().set_time_scale(1e-15);
    report(&sim.snapshot(), Some(37800.0), 0);
}
