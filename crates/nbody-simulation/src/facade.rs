//! Facade: routes calls to the one live [`Simulator`] and swaps it out on reconfiguration

use nbody_physics::{generate, BodyData, Properties};

use crate::{ComputeDevices, ComputeType, RunState, SimulationError, Simulator, StepOutcome};

pub struct Facade {
    devices: ComputeDevices,
    simulator: Simulator,
}

impl Facade {
    /// Generate a dataset for `properties` and build a stopped simulator of `kind`.
    pub fn new(
        kind: ComputeType,
        devices: ComputeDevices,
        properties: Properties,
    ) -> Result<Self, SimulationError> {
        let data = generate(&properties)?;
        Self::with_data(kind, devices, properties, data)
    }

    pub fn with_data(
        kind: ComputeType,
        devices: ComputeDevices,
        properties: Properties,
        data: BodyData,
    ) -> Result<Self, SimulationError> {
        let simulator = Simulator::new(kind, &devices, properties, data)?;
        Ok(Self { devices, simulator })
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }

    pub fn devices(&self) -> &ComputeDevices {
        &self.devices
    }

    // Lifecycle

    pub fn start(&mut self, paused: bool) -> Result<(), SimulationError> {
        self.simulator.start(paused)
    }

    pub fn stop(&mut self) -> Result<(), SimulationError> {
        self.simulator.stop()
    }

    pub fn pause(&mut self) -> Result<(), SimulationError> {
        self.simulator.pause()
    }

    pub fn unpause(&mut self) -> Result<(), SimulationError> {
        self.simulator.unpause()
    }

    pub fn step(&mut self) -> Result<StepOutcome, SimulationError> {
        self.simulator.step()
    }

    // Reconfiguration

    /// Move the current dataset onto a simulator of `kind`.
    ///
    /// The run state is carried over. If the new backend cannot be built or
    /// started, the current simulator stays in place untouched.
    pub fn set_compute_type(&mut self, kind: ComputeType) -> Result<(), SimulationError> {
        if kind == self.compute_type() {
            return Ok(());
        }
        let snapshot = self.simulator.data()?.clone();
        let properties = *self.simulator.properties();
        let range = self.simulator.range();

        let mut next = Simulator::new(kind, &self.devices, properties, snapshot)?;
        next.set_range(range)?;
        self.install(next)?;
        log::info!("Switched compute to {}", self.label());
        Ok(())
    }

    /// Rebuild with new properties.
    ///
    /// The dataset is regenerated when the change affects the initial
    /// conditions and carried over otherwise.
    pub fn reset_properties(&mut self, properties: Properties) -> Result<(), SimulationError> {
        properties.validate()?;
        let current = *self.simulator.properties();
        let regenerate = properties.requires_regeneration(&current);
        let data = if regenerate {
            generate(&properties)?
        } else {
            self.simulator.data()?.clone()
        };

        let mut next = Simulator::new(self.compute_type(), &self.devices, properties, data)?;
        if !regenerate {
            next.set_range(self.simulator.range())?;
        }
        self.install(next)?;
        log::info!(
            "Reset properties ({} bodies, {}){}",
            properties.bodies,
            properties.config.name(),
            if regenerate { ", regenerated" } else { "" }
        );
        Ok(())
    }

    /// Regenerate the initial conditions for the current properties.
    pub fn reset(&mut self) -> Result<(), SimulationError> {
        let properties = *self.simulator.properties();
        let data = generate(&properties)?;
        let next = Simulator::new(self.compute_type(), &self.devices, properties, data)?;
        self.install(next)
    }

    /// Bring `next` to the current run state, then retire the old simulator.
    fn install(&mut self, mut next: Simulator) -> Result<(), SimulationError> {
        match self.simulator.state() {
            RunState::Stopped => {}
            RunState::Active => next.start(false)?,
            RunState::Paused => next.start(true)?,
        }
        self.simulator.stop()?;
        self.simulator = next;
        Ok(())
    }

    // Bulk access

    pub fn bodies(&mut self) -> Result<&BodyData, SimulationError> {
        self.simulator.data()
    }

    /// Copy the dataset into `dst`, 8 floats per body.
    pub fn data(&mut self, dst: &mut [f32]) -> Result<(), SimulationError> {
        self.simulator.write_data(dst)
    }

    /// Copy positions (x, y, z, mass) into `dst`, 4 floats per body.
    pub fn position(&mut self, dst: &mut [f32]) -> Result<(), SimulationError> {
        self.simulator.write_positions(dst)
    }

    pub fn velocity(&mut self, dst: &mut [f32]) -> Result<(), SimulationError> {
        self.simulator.write_velocities(dst)
    }

    /// Copy positions of the bodies in the current range only.
    pub fn position_in_range(&mut self, dst: &mut [f32]) -> Result<(), SimulationError> {
        self.simulator.write_positions_in_range(dst)
    }

    pub fn set_range(&mut self, min: usize, max: usize) -> Result<(), SimulationError> {
        self.simulator.set_range(min..max)
    }

    pub fn set_data(&mut self, src: &[f32]) -> Result<(), SimulationError> {
        self.simulator.set_packed(src)
    }

    pub fn set_position(&mut self, src: &[f32]) -> Result<(), SimulationError> {
        self.simulator.set_positions(src)
    }

    pub fn set_velocity(&mut self, src: &[f32]) -> Result<(), SimulationError> {
        self.simulator.set_velocities(src)
    }

    // Queries

    pub fn compute_type(&self) -> ComputeType {
        self.simulator.kind()
    }

    pub fn is_cpu_single_core(&self) -> bool {
        self.compute_type() == ComputeType::CpuSingle
    }

    pub fn is_cpu_multi_core(&self) -> bool {
        self.compute_type() == ComputeType::CpuMulti
    }

    pub fn is_gpu_primary(&self) -> bool {
        self.compute_type() == ComputeType::GpuPrimary
    }

    pub fn is_gpu_secondary(&self) -> bool {
        self.compute_type() == ComputeType::GpuSecondary
    }

    pub fn is_active(&self) -> bool {
        self.simulator.state() == RunState::Active
    }

    pub fn is_paused(&self) -> bool {
        self.simulator.state() == RunState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.simulator.state() == RunState::Stopped
    }

    pub fn is_acquired(&self) -> bool {
        self.simulator.is_acquired()
    }

    pub fn performance(&self) -> f64 {
        self.simulator.performance()
    }

    pub fn updates(&self) -> f64 {
        self.simulator.updates()
    }

    pub fn update_count(&self) -> u64 {
        self.simulator.update_count()
    }

    pub fn year(&self) -> f64 {
        self.simulator.year()
    }

    pub fn size(&self) -> usize {
        self.simulator.size()
    }

    pub fn label(&self) -> String {
        self.simulator.label()
    }

    pub fn properties(&self) -> &Properties {
        self.simulator.properties()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facade(bodies: usize) -> Facade {
        Facade::new(
            ComputeType::CpuSingle,
            ComputeDevices::cpu_only(4),
            Properties::from_demo(0, bodies),
        )
        .unwrap()
    }

    #[test]
    fn switching_keeps_run_state_and_range() {
        let mut facade = facade(64);
        facade.set_range(8, 40).unwrap();
        facade.start(true).unwrap();

        facade.set_compute_type(ComputeType::CpuMulti).unwrap();
        assert!(facade.is_cpu_multi_core());
        assert!(facade.is_paused());
        assert!(facade.is_acquired());
        assert_eq!(facade.simulator().range(), 8..40);
        assert_eq!(facade.label(), "Multi Core CPU (4 threads)");

        facade.unpause().unwrap();
        facade.set_compute_type(ComputeType::CpuSingle).unwrap();
        assert!(facade.is_active());
        assert_eq!(facade.step().unwrap(), StepOutcome::Advanced);
    }

    #[test]
    fn failed_switch_leaves_current_simulator() {
        let mut facade = facade(32);
        facade.start(false).unwrap();
        facade.step().unwrap();

        let err = facade.set_compute_type(ComputeType::GpuPrimary).unwrap_err();
        assert!(matches!(err, SimulationError::DeviceUnavailable(_)));
        assert!(facade.is_cpu_single_core());
        assert!(facade.is_active());
        assert_eq!(facade.update_count(), 1);
    }

    #[test]
    fn integration_only_reset_keeps_bodies() {
        let mut facade = facade(32);
        let before = facade.bodies().unwrap().clone();

        let mut properties = *facade.properties();
        properties.time_step *= 0.5;
        facade.reset_properties(properties).unwrap();
        assert_eq!(facade.bodies().unwrap(), &before);
        assert_eq!(facade.properties().time_step, properties.time_step);

        facade
            .reset_properties(properties.with_bodies(48))
            .unwrap();
        assert_eq!(facade.size(), 48);
        assert_eq!(facade.bodies().unwrap().len(), 48);
    }

    #[test]
    fn invalid_reset_is_rejected() {
        let mut facade = facade(16);
        let err = facade
            .reset_properties(facade.properties().with_bodies(0))
            .unwrap_err();
        assert!(matches!(err, SimulationError::InvalidConfig(_)));
        assert_eq!(facade.size(), 16);
    }

    #[test]
    fn reset_regenerates_initial_conditions() {
        let mut facade = facade(16);
        let initial = facade.bodies().unwrap().clone();
        facade.start(false).unwrap();
        facade.step().unwrap();
        assert_ne!(facade.bodies().unwrap(), &initial);

        facade.reset().unwrap();
        assert!(facade.is_active());
        assert_eq!(facade.update_count(), 0);
        assert_eq!(facade.bodies().unwrap(), &initial);
    }

    #[test]
    fn bulk_accessors() {
        let mut facade = facade(5);
        let mut packed = vec![0.0; 5 * 8];
        let mut positions = vec![0.0; 5 * 4];
        let mut velocities = vec![0.0; 5 * 4];
        facade.data(&mut packed).unwrap();
        facade.position(&mut positions).unwrap();
        facade.velocity(&mut velocities).unwrap();
        assert_eq!(&packed[..4], &positions[..4]);
        assert_eq!(&packed[4..8], &velocities[..4]);

        assert!(matches!(
            facade.position(&mut [0.0; 4]),
            Err(SimulationError::SizeMismatch { expected: 20, actual: 4 })
        ));

        facade.set_range(1, 3).unwrap();
        let mut ranged = vec![0.0; 2 * 4];
        facade.position_in_range(&mut ranged).unwrap();
        assert_eq!(&ranged[..], &positions[4..12]);

        packed[0] = 7.0;
        facade.set_data(&packed).unwrap();
        facade.position(&mut positions).unwrap();
        assert_eq!(positions[0], 7.0);
    }
}
