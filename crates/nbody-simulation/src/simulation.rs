//! Simulator: one backend, one dataset, one run state
//!
//! ```text
//! Stopped --start(false)--> Active <--pause/unpause--> Paused
//!    ^                         |                          |
//!    +---------stop------------+----------stop------------+
//! ```

use nbody_physics::{check_range, BodyData, Layout, Properties, StepParams};
use std::fmt;
use std::ops::Range;

use crate::backend::Backend;
use crate::meter::StepMeter;
use crate::{ComputeDevices, ComputeType, SimulationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Stopped,
    Active,
    Paused,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Stopped => "stopped",
            RunState::Active => "active",
            RunState::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// What a call to [`Simulator::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Advanced,
    /// The simulator is paused; nothing changed.
    Paused,
}

pub struct Simulator {
    kind: ComputeType,
    properties: Properties,
    params: StepParams,
    backend: Backend,
    state: RunState,
    range: Range<usize>,
    update_count: u64,
    meter: StepMeter,
}

impl Simulator {
    /// Build a stopped simulator of `kind` that owns `data`.
    pub fn new(
        kind: ComputeType,
        devices: &ComputeDevices,
        properties: Properties,
        data: BodyData,
    ) -> Result<Self, SimulationError> {
        properties.validate()?;
        if data.len() != properties.bodies {
            return Err(SimulationError::SizeMismatch {
                expected: properties.bodies,
                actual: data.len(),
            });
        }

        let range = 0..data.len();
        let backend = Backend::create(kind, devices, data)?;
        log::info!("Created {} simulator for {} bodies", backend.label(), properties.bodies);

        Ok(Self {
            kind,
            params: StepParams::from(&properties),
            properties,
            backend,
            state: RunState::Stopped,
            range,
            update_count: 0,
            meter: StepMeter::default(),
        })
    }

    pub fn kind(&self) -> ComputeType {
        self.kind
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_acquired(&self) -> bool {
        self.state != RunState::Stopped && self.backend.is_acquired()
    }

    pub fn label(&self) -> String {
        self.backend.label()
    }

    pub fn size(&self) -> usize {
        self.properties.bodies
    }

    pub fn start(&mut self, paused: bool) -> Result<(), SimulationError> {
        if self.state != RunState::Stopped {
            return Err(self.violation("start"));
        }
        self.backend.acquire()?;
        self.meter.reset();
        self.state = if paused {
            RunState::Paused
        } else {
            RunState::Active
        };
        log::debug!("{} {}", self.label(), self.state);
        Ok(())
    }

    /// Release backend resources. The dataset is kept.
    ///
    /// If the latest state cannot be pulled off the device the simulator
    /// stays running and the error is returned.
    pub fn stop(&mut self) -> Result<(), SimulationError> {
        if self.state != RunState::Stopped {
            self.backend.release()?;
            self.state = RunState::Stopped;
            log::debug!("{} stopped", self.label());
        }
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), SimulationError> {
        match self.state {
            RunState::Stopped => Err(self.violation("pause")),
            _ => {
                self.state = RunState::Paused;
                Ok(())
            }
        }
    }

    pub fn unpause(&mut self) -> Result<(), SimulationError> {
        match self.state {
            RunState::Stopped => Err(self.violation("unpause")),
            _ => {
                self.state = RunState::Active;
                Ok(())
            }
        }
    }

    /// Advance every body in the active range by one time step.
    ///
    /// A paused simulator ignores the call and reports [`StepOutcome::Paused`].
    pub fn step(&mut self) -> Result<StepOutcome, SimulationError> {
        match self.state {
            RunState::Stopped => Err(self.violation("step")),
            RunState::Paused => Ok(StepOutcome::Paused),
            RunState::Active => {
                self.meter.begin();
                self.backend.advance(&self.range, &self.params)?;
                self.meter.end();
                self.update_count += 1;
                Ok(StepOutcome::Advanced)
            }
        }
    }

    /// Bodies updated per second.
    pub fn performance(&self) -> f64 {
        self.meter.rate(self.range.len() as f64)
    }

    /// Pairwise interactions evaluated per second.
    pub fn updates(&self) -> f64 {
        self.meter
            .rate(self.range.len() as f64 * self.properties.bodies as f64)
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Simulated time elapsed, in display years.
    pub fn year(&self) -> f64 {
        self.update_count as f64
            * self.properties.time_step as f64
            * self.properties.year_scale as f64
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn set_range(&mut self, range: Range<usize>) -> Result<(), SimulationError> {
        check_range(&range, self.size())?;
        self.range = range;
        Ok(())
    }

    /// The dataset as of the last completed step.
    pub fn data(&mut self) -> Result<&BodyData, SimulationError> {
        self.backend.data()
    }

    pub fn write_data(&mut self, dst: &mut [f32]) -> Result<(), SimulationError> {
        Ok(self.data()?.write(Layout::Packed, dst)?)
    }

    pub fn write_positions(&mut self, dst: &mut [f32]) -> Result<(), SimulationError> {
        let all = 0..self.size();
        Ok(self.data()?.write_positions(all, dst)?)
    }

    pub fn write_positions_in_range(&mut self, dst: &mut [f32]) -> Result<(), SimulationError> {
        let range = self.range();
        Ok(self.data()?.write_positions(range, dst)?)
    }

    pub fn write_velocities(&mut self, dst: &mut [f32]) -> Result<(), SimulationError> {
        Ok(self.data()?.write_velocities(dst)?)
    }

    /// Replace the whole dataset. The body count must not change.
    pub fn set_data(&mut self, data: BodyData) -> Result<(), SimulationError> {
        self.check_mutable("set data")?;
        if data.len() != self.size() {
            return Err(SimulationError::SizeMismatch {
                expected: self.size(),
                actual: data.len(),
            });
        }
        self.backend.replace(data)
    }

    pub fn set_packed(&mut self, src: &[f32]) -> Result<(), SimulationError> {
        self.check_mutable("set data")?;
        let data = BodyData::from_packed(src)?;
        self.set_data(data)
    }

    pub fn set_positions(&mut self, src: &[f32]) -> Result<(), SimulationError> {
        self.check_mutable("set positions")?;
        let mut data = self.data()?.clone();
        data.set_positions(src)?;
        self.backend.replace(data)
    }

    pub fn set_velocities(&mut self, src: &[f32]) -> Result<(), SimulationError> {
        self.check_mutable("set velocities")?;
        let mut data = self.data()?.clone();
        data.set_velocities(src)?;
        self.backend.replace(data)
    }

    fn check_mutable(&self, operation: &'static str) -> Result<(), SimulationError> {
        if self.state == RunState::Active {
            return Err(self.violation(operation));
        }
        Ok(())
    }

    fn violation(&self, operation: &'static str) -> SimulationError {
        SimulationError::StateViolation {
            operation,
            state: self.state,
        }
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Dropping {} with unsynced state: {e}", self.label());
        }
    }
}
