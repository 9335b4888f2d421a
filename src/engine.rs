//! Per-frame driver: applies commands, steps the facade and pulls positions for display

use nbody_simulation::{
    ComputeDevices, ComputeType, Facade, SimulationError, StepOutcome,
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::preferences::Preferences;

/// Frames averaged for the frame-rate readout.
const FRAME_WINDOW: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TogglePause,
    /// Advance one step on the next tick while paused.
    StepOnce,
    Select(ComputeType),
    NextCompute,
    NextDemo,
    PreviousDemo,
    SetBodies(usize),
    /// Regenerate the current demo's initial conditions.
    Reset,
    /// Split the bodies between the current backend and a second one.
    ToggleHybrid,
}

/// Meter readings after one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStats {
    pub frame: u64,
    pub stepped: bool,
    pub fps: f64,
    pub performance: f64,
    pub updates: f64,
    pub update_count: u64,
    pub year: f64,
    pub label: String,
}

pub struct Engine {
    preferences: Preferences,
    devices: ComputeDevices,
    facade: Facade,
    /// Second backend integrating the upper part of the dataset in hybrid mode.
    partner: Option<Facade>,
    positions: Vec<f32>,
    frame: u64,
    frame_times: VecDeque<f64>,
    last_frame: Option<Instant>,
    last_step: Option<Instant>,
    step_one_frame: bool,
}

impl Engine {
    pub fn new(preferences: Preferences, devices: ComputeDevices) -> Result<Self, SimulationError> {
        let devices = devices.with_max_threads(preferences.max_cpu);
        let mut facade = build_facade(&preferences, &devices)?;
        facade.start(false)?;
        log::info!(
            "Running \"{}\" with {} bodies on {}",
            preferences.demo().name,
            facade.size(),
            facade.label()
        );

        Ok(Self {
            positions: vec![0.0; facade.size() * 4],
            preferences,
            devices,
            facade,
            partner: None,
            frame: 0,
            frame_times: VecDeque::with_capacity(FRAME_WINDOW),
            last_frame: None,
            last_step: None,
            step_one_frame: false,
        })
    }

    pub fn facade(&self) -> &Facade {
        &self.facade
    }

    pub fn partner(&self) -> Option<&Facade> {
        self.partner.as_ref()
    }

    pub fn is_hybrid(&self) -> bool {
        self.partner.is_some()
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// Positions (x, y, z, mass) as of the last tick.
    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    pub fn apply(&mut self, command: Command) -> Result<(), SimulationError> {
        log::debug!("Command {command:?}");
        match command {
            Command::TogglePause => {
                self.step_one_frame = false;
                self.set_paused(!self.facade.is_paused())
            }
            Command::StepOnce => {
                self.step_one_frame = self.facade.is_paused();
                Ok(())
            }
            Command::ToggleHybrid => match self.partner {
                Some(_) => self.leave_hybrid(),
                None => self.enter_hybrid(),
            },
            // Reconfiguration works on the whole dataset
            _ => {
                self.leave_hybrid()?;
                self.reconfigure(command)
            }
        }
    }

    fn reconfigure(&mut self, command: Command) -> Result<(), SimulationError> {
        match command {
            Command::Select(kind) => self.select(kind),
            Command::NextCompute => match self.next_compute() {
                Some(kind) => self.select(kind),
                None => Ok(()),
            },
            Command::NextDemo => self.set_demo(self.preferences.demo + 1),
            Command::PreviousDemo => {
                self.set_demo(self.preferences.demo + nbody_physics::Demo::ALL.len() - 1)
            }
            Command::SetBodies(bodies) => {
                let properties = self.facade.properties().with_bodies(bodies);
                self.facade.reset_properties(properties)?;
                self.preferences.bodies = bodies;
                self.positions.resize(bodies * 4, 0.0);
                Ok(())
            }
            Command::Reset => self.facade.reset(),
            Command::TogglePause | Command::StepOnce | Command::ToggleHybrid => Ok(()),
        }
    }

    /// Step (unless paused or throttled) and refresh the position buffer.
    pub fn tick(&mut self) -> Result<FrameStats, SimulationError> {
        let now = Instant::now();
        if let Some(last) = self.last_frame.replace(now) {
            self.frame_times.push_back((now - last).as_secs_f64());
            if self.frame_times.len() > FRAME_WINDOW {
                self.frame_times.pop_front();
            }
        }
        self.frame += 1;

        let mut stepped = false;
        if self.step_one_frame {
            self.step_one_frame = false;
            if self.facade.is_paused() {
                self.set_paused(false)?;
                let outcome = self.step_all();
                self.set_paused(true)?;
                stepped = outcome?;
            }
        } else if self.facade.is_active() && self.update_due(now) {
            stepped = self.step_all()?;
        }
        if stepped {
            self.last_step = Some(now);
        }

        self.pull_positions()?;

        let fps = if self.frame_times.is_empty() {
            0.0
        } else {
            self.frame_times.len() as f64 / self.frame_times.iter().sum::<f64>()
        };
        let partner = self.partner.as_ref();
        let label = match partner {
            Some(partner) => format!("{} + {}", self.facade.label(), partner.label()),
            None => self.facade.label(),
        };
        Ok(FrameStats {
            frame: self.frame,
            stepped,
            fps,
            performance: self.facade.performance() + partner.map_or(0.0, Facade::performance),
            updates: self.facade.updates() + partner.map_or(0.0, Facade::updates),
            update_count: self.facade.update_count(),
            year: self.facade.year(),
            label,
        })
    }

    fn set_paused(&mut self, paused: bool) -> Result<(), SimulationError> {
        for facade in std::iter::once(&mut self.facade).chain(self.partner.as_mut()) {
            if paused {
                facade.pause()?;
            } else {
                facade.unpause()?;
            }
        }
        Ok(())
    }

    /// Step every live backend; in hybrid mode the new positions are then shared.
    fn step_all(&mut self) -> Result<bool, SimulationError> {
        let advanced = self.facade.step()? == StepOutcome::Advanced;
        if let Some(partner) = self.partner.as_mut() {
            partner.step()?;
            if advanced {
                self.share_positions()?;
            }
        }
        Ok(advanced)
    }

    /// Gather positions for display. In hybrid mode each backend supplies its own range.
    fn pull_positions(&mut self) -> Result<(), SimulationError> {
        match self.partner.as_mut() {
            None => self.facade.position(&mut self.positions),
            Some(partner) => {
                let split = partner.simulator().range().start * 4;
                let (head, tail) = self.positions.split_at_mut(split);
                self.facade.position_in_range(head)?;
                partner.position_in_range(tail)
            }
        }
    }

    /// Merge the two halves and hand the full position set back to both backends.
    fn share_positions(&mut self) -> Result<(), SimulationError> {
        self.pull_positions()?;
        let Self {
            facade: main,
            partner,
            positions,
            ..
        } = self;
        for facade in std::iter::once(main).chain(partner.as_mut()) {
            let resume = facade.is_active();
            if resume {
                facade.pause()?;
            }
            facade.set_position(positions.as_slice())?;
            if resume {
                facade.unpause()?;
            }
        }
        Ok(())
    }

    /// A second backend to pair with the current one, GPUs first.
    fn partner_kind(&self) -> Option<ComputeType> {
        let current = self.facade.compute_type();
        [
            ComputeType::GpuPrimary,
            ComputeType::GpuSecondary,
            ComputeType::CpuMulti,
            ComputeType::CpuSingle,
        ]
        .into_iter()
        .filter(|&kind| kind != current && self.devices.supports(kind))
        .find(|kind| kind.is_gpu() || !self.preferences.is_gpu_only)
    }

    /// Keep the lower half of the bodies here and move the upper half to a second backend.
    fn enter_hybrid(&mut self) -> Result<(), SimulationError> {
        let kind = self.partner_kind().ok_or_else(|| {
            SimulationError::DeviceUnavailable("no second backend for hybrid mode".to_string())
        })?;
        let count = self.facade.size();
        let split = count / 2;
        let data = self.facade.bodies()?.clone();
        let mut partner =
            Facade::with_data(kind, self.devices.clone(), *self.facade.properties(), data)?;
        partner.set_range(split, count)?;
        if !self.facade.is_stopped() {
            partner.start(self.facade.is_paused())?;
        }
        self.facade.set_range(0, split)?;
        log::info!(
            "Hybrid: {split} bodies on {}, {} on {}",
            self.facade.label(),
            count - split,
            partner.label()
        );
        self.partner = Some(partner);
        Ok(())
    }

    /// Fold the partner's half back into the main backend and retire the partner.
    fn leave_hybrid(&mut self) -> Result<(), SimulationError> {
        let Some(partner) = self.partner.as_mut() else {
            return Ok(());
        };
        let count = self.facade.size();
        let split = partner.simulator().range().start * 4;

        let mut positions = vec![0.0; count * 4];
        let mut velocities = vec![0.0; count * 4];
        let mut upper = vec![0.0; count * 4];
        self.facade.position(&mut positions)?;
        self.facade.velocity(&mut velocities)?;
        partner.position(&mut upper)?;
        positions[split..].copy_from_slice(&upper[split..]);
        partner.velocity(&mut upper)?;
        velocities[split..].copy_from_slice(&upper[split..]);
        partner.stop()?;

        let resume = self.facade.is_active();
        if resume {
            self.facade.pause()?;
        }
        self.facade.set_position(&positions)?;
        self.facade.set_velocity(&velocities)?;
        self.facade.set_range(0, count)?;
        if resume {
            self.facade.unpause()?;
        }
        self.partner = None;
        log::info!("Hybrid mode off, all bodies on {}", self.facade.label());
        Ok(())
    }

    fn update_due(&self, now: Instant) -> bool {
        match (self.preferences.max_updates, self.last_step) {
            (0, _) | (_, None) => true,
            (max, Some(last)) => now - last >= Duration::from_secs_f64(1.0 / max as f64),
        }
    }

    /// Switch backends, keeping the current one when `kind` cannot be brought up.
    fn select(&mut self, kind: ComputeType) -> Result<(), SimulationError> {
        if self.preferences.is_gpu_only && !kind.is_gpu() {
            log::warn!("Ignoring {kind}: GPU-only mode");
            return Ok(());
        }
        match self.facade.set_compute_type(kind) {
            Ok(()) => {
                self.preferences.compute = kind;
                Ok(())
            }
            Err(err) if err.is_backend_failure() => {
                log::warn!("Staying on {}: {err}", self.facade.label());
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// The next compute type this host can run, in cycling order.
    fn next_compute(&self) -> Option<ComputeType> {
        let mut kind = self.facade.compute_type();
        for _ in 0..ComputeType::ALL.len() - 1 {
            kind = kind.next();
            let allowed = kind.is_gpu() || !self.preferences.is_gpu_only;
            if allowed && self.devices.supports(kind) {
                return Some(kind);
            }
        }
        None
    }

    fn set_demo(&mut self, demo: usize) -> Result<(), SimulationError> {
        let preferences = self.preferences.for_demo(demo);
        self.facade.reset_properties(preferences.properties())?;
        log::info!("Demo \"{}\"", preferences.demo().name);
        self.preferences = preferences;
        Ok(())
    }
}

/// Build the preferred backend, falling back to the CPU unless GPU-only.
fn build_facade(
    preferences: &Preferences,
    devices: &ComputeDevices,
) -> Result<Facade, SimulationError> {
    let mut candidates = vec![preferences.compute];
    if !preferences.is_gpu_only {
        for fallback in [ComputeType::CpuMulti, ComputeType::CpuSingle] {
            if !candidates.contains(&fallback) {
                candidates.push(fallback);
            }
        }
    }

    let properties = preferences.properties();
    let mut last_error = None;
    for kind in candidates {
        match Facade::new(kind, devices.clone(), properties) {
            Ok(facade) => return Ok(facade),
            Err(err) if err.is_backend_failure() => {
                log::warn!("{kind} unavailable: {err}");
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        SimulationError::DeviceUnavailable("no compute backend".to_string())
    }))
}
