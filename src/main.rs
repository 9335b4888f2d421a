//! Headless N-body driver
//!
//! Runs the engine on a fixed tick and logs the meters. Options come from
//! `NBODY_*` environment variables; `RUST_LOG` controls verbosity.

use nbody::{Command, Engine, Preferences};
use nbody_simulation::{ComputeDevices, ComputeType};
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Frames between meter log lines.
const REPORT_EVERY: u64 = 60;

fn env_value<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring {name}={raw:?}: not a valid value");
            None
        }
    }
}

fn preferences_from_env() -> Preferences {
    let mut prefs = Preferences::default();
    if let Some(demo) = env_value("NBODY_DEMO") {
        prefs.demo = demo;
    }
    if let Some(bodies) = env_value("NBODY_BODIES") {
        prefs.bodies = bodies;
    }
    if let Ok(name) = std::env::var("NBODY_COMPUTE") {
        match ComputeType::from_name(&name) {
            Some(kind) => prefs.compute = kind,
            None => log::warn!("Unknown compute type {name:?}"),
        }
    }
    prefs.time_step = env_value("NBODY_TIME_STEP");
    prefs.softening = env_value("NBODY_SOFTENING");
    prefs.damping = env_value("NBODY_DAMPING");
    prefs.cluster_scale = env_value("NBODY_CLUSTER_SCALE");
    prefs.velocity_scale = env_value("NBODY_VELOCITY_SCALE");
    if let Some(max) = env_value("NBODY_MAX_UPDATES") {
        prefs.max_updates = max;
    }
    if let Some(max) = env_value("NBODY_MAX_FRAMERATE") {
        prefs.max_frame_rate = max;
    }
    if let Some(max) = env_value("NBODY_MAX_CPU") {
        prefs.max_cpu = max;
    }
    if let Some(flag) = env_value::<u8>("NBODY_GPU_ONLY") {
        prefs.is_gpu_only = flag != 0;
    }
    prefs
}

/// Largest coordinate magnitude among the displayed positions.
fn extent(positions: &[f32]) -> f32 {
    positions
        .chunks_exact(4)
        .flat_map(|p| &p[..3])
        .fold(0.0, |max, x| max.max(x.abs()))
}

fn main() {
    // Initialize logger (RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting N-body simulation...");

    let prefs = preferences_from_env();
    let frames: u64 = env_value("NBODY_FRAMES").unwrap_or(600);
    let switch_every: u64 = env_value("NBODY_SWITCH_EVERY").unwrap_or(0);
    let frame_budget = match prefs.max_frame_rate {
        0 => Duration::ZERO,
        fps => Duration::from_secs_f64(1.0 / fps as f64),
    };

    let mut engine = match Engine::new(prefs, ComputeDevices::probe()) {
        Ok(engine) => engine,
        Err(err) => {
            log::error!("Failed to start: {err}");
            std::process::exit(1);
        }
    };

    if env_value::<u8>("NBODY_HYBRID").is_some_and(|flag| flag != 0) {
        if let Err(err) = engine.apply(Command::ToggleHybrid) {
            log::warn!("Hybrid mode unavailable: {err}");
        }
    }

    for frame in 1..=frames {
        let started = Instant::now();

        if switch_every > 0 && frame % switch_every == 0 {
            if let Err(err) = engine.apply(Command::NextCompute) {
                log::error!("Switch failed: {err}");
            }
        }

        match engine.tick() {
            Ok(stats) if stats.frame % REPORT_EVERY == 0 => log::info!(
                "[{}] frame {} | {:.1} fps | {:.3} Mbody/s | {:.3} Ginteractions/s | step {} | year {:.3} | extent {:.2}",
                stats.label,
                stats.frame,
                stats.fps,
                stats.performance * 1e-6,
                stats.updates * 1e-9,
                stats.update_count,
                stats.year,
                extent(engine.positions())
            ),
            Ok(_) => {}
            Err(err) => {
                log::error!("Simulation failed: {err}");
                std::process::exit(1);
            }
        }

        if let Some(rest) = frame_budget.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    log::info!(
        "Finished \"{}\" after {} steps ({:.3} years simulated)",
        engine.preferences().demo().name,
        engine.facade().update_count(),
        engine.facade().year()
    );
}
