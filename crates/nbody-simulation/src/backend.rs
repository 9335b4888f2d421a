//! Dispatch over the compute backends

use nbody_physics::{BodyData, StepParams};
use std::ops::Range;

use crate::cpu::CpuBackend;
use crate::gpu::GpuBackend;
use crate::{ComputeDevices, ComputeType, SimulationError};

pub enum Backend {
    Cpu(CpuBackend),
    Gpu(GpuBackend),
}

impl Backend {
    /// Build the backend for `kind`, owning `data` as its working set.
    pub fn create(
        kind: ComputeType,
        devices: &ComputeDevices,
        data: BodyData,
    ) -> Result<Self, SimulationError> {
        if !devices.supports(kind) {
            return Err(SimulationError::DeviceUnavailable(format!(
                "{kind} is not present on this host"
            )));
        }
        match kind {
            ComputeType::CpuSingle => Ok(Backend::Cpu(CpuBackend::single(data))),
            ComputeType::CpuMulti => Ok(Backend::Cpu(CpuBackend::multi(
                data,
                devices.cpu_threads,
            )?)),
            ComputeType::GpuPrimary | ComputeType::GpuSecondary => {
                Ok(Backend::Gpu(GpuBackend::new(kind, data)?))
            }
        }
    }

    pub fn label(&self) -> String {
        match self {
            Backend::Cpu(cpu) => cpu.label(),
            Backend::Gpu(gpu) => gpu.label(),
        }
    }

    pub fn acquire(&mut self) -> Result<(), SimulationError> {
        match self {
            Backend::Cpu(cpu) => cpu.acquire(),
            Backend::Gpu(gpu) => gpu.acquire(),
        }
    }

    pub fn release(&mut self) -> Result<(), SimulationError> {
        match self {
            Backend::Cpu(cpu) => {
                cpu.release();
                Ok(())
            }
            Backend::Gpu(gpu) => gpu.release(),
        }
    }

    pub fn is_acquired(&self) -> bool {
        match self {
            Backend::Cpu(cpu) => cpu.is_acquired(),
            Backend::Gpu(gpu) => gpu.is_acquired(),
        }
    }

    pub fn advance(
        &mut self,
        active: &Range<usize>,
        params: &StepParams,
    ) -> Result<(), SimulationError> {
        match self {
            Backend::Cpu(cpu) => cpu.advance(active, params),
            Backend::Gpu(gpu) => gpu.advance(active, params),
        }
    }

    pub fn data(&mut self) -> Result<&BodyData, SimulationError> {
        match self {
            Backend::Cpu(cpu) => Ok(cpu.data()),
            Backend::Gpu(gpu) => gpu.data(),
        }
    }

    pub fn replace(&mut self, data: BodyData) -> Result<(), SimulationError> {
        match self {
            Backend::Cpu(cpu) => {
                cpu.replace(data);
                Ok(())
            }
            Backend::Gpu(gpu) => gpu.replace(data),
        }
    }
}
