//! Compute backend kinds and the devices available to run them

use std::fmt;

/// Where the force integration runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeType {
    CpuSingle,
    CpuMulti,
    GpuPrimary,
    GpuSecondary,
}

impl ComputeType {
    pub const ALL: [ComputeType; 4] = [
        ComputeType::CpuSingle,
        ComputeType::CpuMulti,
        ComputeType::GpuPrimary,
        ComputeType::GpuSecondary,
    ];

    pub fn is_gpu(&self) -> bool {
        matches!(self, ComputeType::GpuPrimary | ComputeType::GpuSecondary)
    }

    /// Index into [`ComputeDevices::accelerators`] for GPU kinds.
    pub fn accelerator_index(&self) -> Option<usize> {
        match self {
            ComputeType::GpuPrimary => Some(0),
            ComputeType::GpuSecondary => Some(1),
            _ => None,
        }
    }

    /// The next kind in cycling order.
    pub fn next(&self) -> ComputeType {
        match self {
            ComputeType::CpuSingle => ComputeType::CpuMulti,
            ComputeType::CpuMulti => ComputeType::GpuPrimary,
            ComputeType::GpuPrimary => ComputeType::GpuSecondary,
            ComputeType::GpuSecondary => ComputeType::CpuSingle,
        }
    }

    /// Parse names such as `cpu-single`, `cpu-multi`, `gpu`, `gpu-secondary`.
    pub fn from_name(name: &str) -> Option<ComputeType> {
        match name.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "cpu-single" | "single" | "cpu1" => Some(ComputeType::CpuSingle),
            "cpu-multi" | "multi" | "cpu" => Some(ComputeType::CpuMulti),
            "gpu-primary" | "gpu" | "primary" => Some(ComputeType::GpuPrimary),
            "gpu-secondary" | "secondary" => Some(ComputeType::GpuSecondary),
            _ => None,
        }
    }
}

impl fmt::Display for ComputeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComputeType::CpuSingle => "Single Core CPU",
            ComputeType::CpuMulti => "Multi Core CPU",
            ComputeType::GpuPrimary => "Primary GPU",
            ComputeType::GpuSecondary => "Secondary GPU",
        };
        f.write_str(name)
    }
}

/// A GPU adapter usable for compute.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceleratorInfo {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
}

/// Host CPU threads and accelerators, in preference order (discrete GPUs first).
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeDevices {
    pub cpu_threads: usize,
    pub accelerators: Vec<AcceleratorInfo>,
}

impl ComputeDevices {
    /// Query the host for hardware threads and wgpu adapters.
    pub fn probe() -> Self {
        let instance = create_instance();
        let accelerators: Vec<AcceleratorInfo> = accelerator_adapters(&instance)
            .iter()
            .map(|adapter| {
                let info = adapter.get_info();
                AcceleratorInfo {
                    name: info.name,
                    backend: info.backend,
                    device_type: info.device_type,
                }
            })
            .collect();

        let devices = Self {
            cpu_threads: hardware_threads(),
            accelerators,
        };
        log::info!(
            "Found {} CPU threads and {} accelerator(s)",
            devices.cpu_threads,
            devices.accelerators.len()
        );
        for (i, acc) in devices.accelerators.iter().enumerate() {
            log::info!("  [{}] {} ({:?}, {:?})", i, acc.name, acc.backend, acc.device_type);
        }
        devices
    }

    /// A host with no accelerators.
    pub fn cpu_only(cpu_threads: usize) -> Self {
        Self {
            cpu_threads: cpu_threads.max(1),
            accelerators: Vec::new(),
        }
    }

    /// Cap the worker pool size (0 leaves it unchanged).
    pub fn with_max_threads(mut self, max: usize) -> Self {
        if max > 0 {
            self.cpu_threads = self.cpu_threads.min(max);
        }
        self
    }

    pub fn accelerator(&self, kind: ComputeType) -> Option<&AcceleratorInfo> {
        kind.accelerator_index()
            .and_then(|index| self.accelerators.get(index))
    }

    pub fn supports(&self, kind: ComputeType) -> bool {
        !kind.is_gpu() || self.accelerator(kind).is_some()
    }
}

/// Number of logical CPUs visible to this process.
pub fn hardware_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

pub(crate) fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    })
}

/// Non-CPU adapters, discrete first.
pub(crate) fn accelerator_adapters(instance: &wgpu::Instance) -> Vec<wgpu::Adapter> {
    let mut adapters: Vec<wgpu::Adapter> = instance
        .enumerate_adapters(wgpu::Backends::PRIMARY)
        .into_iter()
        .filter(|adapter| adapter.get_info().device_type != wgpu::DeviceType::Cpu)
        .collect();
    adapters.sort_by_key(|adapter| match adapter.get_info().device_type {
        wgpu::DeviceType::DiscreteGpu => 0,
        wgpu::DeviceType::IntegratedGpu => 1,
        wgpu::DeviceType::VirtualGpu => 2,
        _ => 3,
    });
    adapters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_only_host_supports_only_cpu_kinds() {
        let devices = ComputeDevices::cpu_only(4);
        assert!(devices.supports(ComputeType::CpuSingle));
        assert!(devices.supports(ComputeType::CpuMulti));
        assert!(!devices.supports(ComputeType::GpuPrimary));
        assert!(!devices.supports(ComputeType::GpuSecondary));
    }

    #[test]
    fn secondary_needs_two_accelerators() {
        let gpu = AcceleratorInfo {
            name: "Test GPU".into(),
            backend: wgpu::Backend::Vulkan,
            device_type: wgpu::DeviceType::DiscreteGpu,
        };
        let mut devices = ComputeDevices::cpu_only(2);
        devices.accelerators.push(gpu.clone());
        assert!(devices.supports(ComputeType::GpuPrimary));
        assert!(!devices.supports(ComputeType::GpuSecondary));
        devices.accelerators.push(gpu);
        assert!(devices.supports(ComputeType::GpuSecondary));
    }

    #[test]
    fn names_parse_and_cycle() {
        assert_eq!(ComputeType::from_name("CPU_Multi"), Some(ComputeType::CpuMulti));
        assert_eq!(ComputeType::from_name("gpu"), Some(ComputeType::GpuPrimary));
        assert_eq!(ComputeType::from_name("tpu"), None);

        let mut kind = ComputeType::CpuSingle;
        for _ in 0..ComputeType::ALL.len() {
            kind = kind.next();
        }
        assert_eq!(kind, ComputeType::CpuSingle);
    }

    #[test]
    fn thread_cap() {
        assert_eq!(ComputeDevices::cpu_only(8).with_max_threads(3).cpu_threads, 3);
        assert_eq!(ComputeDevices::cpu_only(8).with_max_threads(0).cpu_threads, 8);
    }
}
