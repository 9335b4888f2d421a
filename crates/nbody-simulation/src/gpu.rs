//! wgpu compute backend
//!
//! Positions live in two storage buffers that swap roles every step; velocities
//! are updated in place since each invocation only touches its own slot. The host
//! copy of the dataset is refreshed lazily, the first time it is asked for after
//! a step.

use nbody_physics::{Body, BodyData, StepParams};
use std::ops::Range;

use crate::devices::{accelerator_adapters, create_instance};
use crate::params::KernelParams;
use crate::{ComputeType, RunState, SimulationError};

/// Bytes per position or velocity entry.
const VECTOR_BYTES: u64 = std::mem::size_of::<[f32; 4]>() as u64;

/// An opened accelerator.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    name: String,
}

impl GpuContext {
    /// Open the `index`-th accelerator (0 = primary, 1 = secondary).
    pub fn open(index: usize) -> Result<Self, SimulationError> {
        let instance = create_instance();
        let adapter = accelerator_adapters(&instance)
            .into_iter()
            .nth(index)
            .ok_or_else(|| {
                SimulationError::DeviceUnavailable(format!("no accelerator at index {index}"))
            })?;
        let info = adapter.get_info();

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("N-Body Device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| SimulationError::DeviceUnavailable(format!("{}: {e}", info.name)))?;

        log::info!("Opened {} ({:?})", info.name, info.backend);
        Ok(Self {
            device,
            queue,
            name: info.name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reject datasets whose buffers exceed the device limits.
    fn check_capacity(&self, count: usize) -> Result<(), SimulationError> {
        let limits = self.device.limits();
        let vector_bytes = count as u64 * VECTOR_BYTES;
        let staging_bytes = vector_bytes * 2;
        if vector_bytes > limits.max_storage_buffer_binding_size as u64
            || staging_bytes > limits.max_buffer_size
        {
            return Err(SimulationError::ResourceExhaustion(format!(
                "{count} bodies exceed the buffer limits of {}",
                self.name
            )));
        }
        Ok(())
    }

    fn wait(&self, submission: wgpu::SubmissionIndex) -> Result<(), SimulationError> {
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(submission),
                timeout: None,
            })
            .map(|_| ())
            .map_err(|e| SimulationError::Device(e.to_string()))
    }
}

/// Device resources for one dataset.
struct GpuBuffers {
    positions: [wgpu::Buffer; 2],
    velocities: wgpu::Buffer,
    params: wgpu::Buffer,
    staging: wgpu::Buffer,
    bind_groups: [wgpu::BindGroup; 2],
    pipeline: wgpu::ComputePipeline,
    /// Index of the position buffer holding the current state.
    current: usize,
    count: usize,
}

impl GpuBuffers {
    fn new(context: &GpuContext, data: &BodyData) -> Result<Self, SimulationError> {
        context.check_capacity(data.len())?;
        let device = &context.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

        let vector_bytes = data.len() as u64 * VECTOR_BYTES;
        let storage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC;

        let positions = [
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Position Buffer A"),
                size: vector_bytes,
                usage: storage,
                mapped_at_creation: false,
            }),
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Position Buffer B"),
                size: vector_bytes,
                usage: storage,
                mapped_at_creation: false,
            }),
        ];

        let velocities = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Velocity Buffer"),
            size: vector_bytes,
            usage: storage,
            mapped_at_creation: false,
        });

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Kernel Params Buffer"),
            size: std::mem::size_of::<KernelParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Positions followed by velocities
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging Buffer"),
            size: vector_bytes * 2,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Integration Compute Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/integrate.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Integration Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        // bind_groups[k] reads positions[k] and writes positions[1 - k]
        let bind_group = |k: usize, label: &str| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: positions[k].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: positions[1 - k].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: velocities.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: params.as_entire_binding(),
                    },
                ],
            })
        };
        let bind_groups = [
            bind_group(0, "Integration Bind Group A->B"),
            bind_group(1, "Integration Bind Group B->A"),
        ];

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Integration Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Integration Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(SimulationError::ResourceExhaustion(error.to_string()));
        }

        let buffers = Self {
            positions,
            velocities,
            params,
            staging,
            bind_groups,
            pipeline,
            current: 0,
            count: data.len(),
        };
        buffers.upload(context, data);
        Ok(buffers)
    }

    fn upload(&self, context: &GpuContext, data: &BodyData) {
        let split = data.to_split();
        context.queue.write_buffer(
            &self.positions[self.current],
            0,
            bytemuck::cast_slice(&split.positions),
        );
        context
            .queue
            .write_buffer(&self.velocities, 0, bytemuck::cast_slice(&split.velocities));
    }

    fn advance(
        &mut self,
        context: &GpuContext,
        params: &KernelParams,
    ) -> Result<(), SimulationError> {
        context
            .queue
            .write_buffer(&self.params, 0, bytemuck::cast_slice(&[*params]));

        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("N-Body Step Encoder"),
            });

        let (start, end) = (params.range[1] as usize, params.range[2] as usize);
        if start > 0 || end < self.count {
            // Bodies outside the active range carry over unchanged
            encoder.copy_buffer_to_buffer(
                &self.positions[self.current],
                0,
                &self.positions[1 - self.current],
                0,
                self.count as u64 * VECTOR_BYTES,
            );
        }

        let workgroups = params.workgroups();
        if workgroups > 0 {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Integration Compute Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipeline);
            compute_pass.set_bind_group(0, &self.bind_groups[self.current], &[]);
            compute_pass.dispatch_workgroups(workgroups, 1, 1);
        }

        let submission = context.queue.submit(std::iter::once(encoder.finish()));
        context.wait(submission)?;
        self.current = 1 - self.current;
        Ok(())
    }

    fn read_back(&self, context: &GpuContext) -> Result<Vec<Body>, SimulationError> {
        let vector_bytes = self.count as u64 * VECTOR_BYTES;
        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("N-Body Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(
            &self.positions[self.current],
            0,
            &self.staging,
            0,
            vector_bytes,
        );
        encoder.copy_buffer_to_buffer(&self.velocities, 0, &self.staging, vector_bytes, vector_bytes);
        let submission = context.queue.submit(std::iter::once(encoder.finish()));

        let slice = self.staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        context.wait(submission)?;
        rx.recv()
            .map_err(|e| SimulationError::Device(e.to_string()))?
            .map_err(|e| SimulationError::Device(e.to_string()))?;

        let vectors: Vec<[f32; 4]> = {
            let mapped = slice.get_mapped_range();
            mapped
                .chunks_exact(VECTOR_BYTES as usize)
                .map(bytemuck::pod_read_unaligned)
                .collect()
        };
        self.staging.unmap();

        let (positions, velocities) = vectors.split_at(self.count);
        Ok(positions
            .iter()
            .zip(velocities)
            .map(|(p, v)| Body {
                position: *p,
                velocity: *v,
            })
            .collect())
    }
}

pub struct GpuBackend {
    kind: ComputeType,
    context: GpuContext,
    buffers: Option<GpuBuffers>,
    mirror: HostMirror,
}

/// Host copy of the device dataset, stale after each dispatch until read back.
struct HostMirror {
    data: BodyData,
    stale: bool,
}

impl HostMirror {
    fn new(data: BodyData) -> Self {
        Self { data, stale: false }
    }

    /// Refresh from the device when stale. `read` is `None` once the device
    /// buffers are gone, in which case a stale mirror can no longer be trusted.
    fn refresh<F>(&mut self, read: Option<F>) -> Result<(), SimulationError>
    where
        F: FnOnce() -> Result<Vec<Body>, SimulationError>,
    {
        if !self.stale {
            return Ok(());
        }
        let read = read.ok_or_else(|| {
            SimulationError::Device("device state was lost before readback".to_string())
        })?;
        let bodies = read()?;
        if bodies.len() != self.data.len() {
            return Err(SimulationError::SizeMismatch {
                expected: self.data.len(),
                actual: bodies.len(),
            });
        }
        self.data.bodies_mut().copy_from_slice(&bodies);
        self.stale = false;
        Ok(())
    }
}

impl GpuBackend {
    pub fn new(kind: ComputeType, data: BodyData) -> Result<Self, SimulationError> {
        let index = kind.accelerator_index().ok_or_else(|| {
            SimulationError::DeviceUnavailable(format!("{kind} is not an accelerator"))
        })?;
        let context = GpuContext::open(index)?;
        context.check_capacity(data.len())?;
        Ok(Self {
            kind,
            context,
            buffers: None,
            mirror: HostMirror::new(data),
        })
    }

    pub fn label(&self) -> String {
        let role = match self.kind {
            ComputeType::GpuSecondary => "Secondary",
            _ => "Primary",
        };
        format!("{} ({role})", self.context.name())
    }

    /// Allocate device buffers and upload the host dataset.
    pub fn acquire(&mut self) -> Result<(), SimulationError> {
        if self.buffers.is_none() {
            self.buffers = Some(GpuBuffers::new(&self.context, &self.mirror.data)?);
            self.mirror.stale = false;
        }
        Ok(())
    }

    /// Pull the latest state to the host and free the device buffers.
    ///
    /// A failed readback keeps the buffers so the state can still be recovered.
    pub fn release(&mut self) -> Result<(), SimulationError> {
        self.sync()?;
        self.buffers = None;
        Ok(())
    }

    pub fn is_acquired(&self) -> bool {
        self.buffers.is_some()
    }

    pub fn advance(
        &mut self,
        active: &Range<usize>,
        params: &StepParams,
    ) -> Result<(), SimulationError> {
        let buffers = self
            .buffers
            .as_mut()
            .ok_or(SimulationError::StateViolation {
                operation: "step without device buffers",
                state: RunState::Stopped,
            })?;
        let kernel = KernelParams::new(params, buffers.count, active);
        buffers.advance(&self.context, &kernel)?;
        self.mirror.stale = true;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), SimulationError> {
        let context = &self.context;
        let read = self
            .buffers
            .as_ref()
            .map(|buffers| move || buffers.read_back(context));
        self.mirror.refresh(read)
    }

    pub fn data(&mut self) -> Result<&BodyData, SimulationError> {
        self.sync()?;
        Ok(&self.mirror.data)
    }

    pub fn replace(&mut self, data: BodyData) -> Result<(), SimulationError> {
        match &self.buffers {
            Some(buffers) if buffers.count == data.len() => buffers.upload(&self.context, &data),
            Some(_) => self.buffers = Some(GpuBuffers::new(&self.context, &data)?),
            None => self.context.check_capacity(data.len())?,
        }
        self.mirror = HostMirror::new(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    type Read = fn() -> Result<Vec<Body>, SimulationError>;

    fn mirror(count: usize) -> HostMirror {
        let bodies = (0..count)
            .map(|i| Body::new(Vec3::splat(i as f32), 1.0, Vec3::ZERO))
            .collect();
        HostMirror::new(BodyData::new(bodies).unwrap())
    }

    #[test]
    fn stale_mirror_without_buffers_is_an_error() {
        let mut mirror = mirror(3);
        mirror.stale = true;
        assert!(matches!(
            mirror.refresh(None::<Read>),
            Err(SimulationError::Device(_))
        ));
        assert!(mirror.stale);

        // A fresh mirror needs no device
        mirror.stale = false;
        assert!(mirror.refresh(None::<Read>).is_ok());
    }

    #[test]
    fn failed_readback_stays_stale() {
        let mut mirror = mirror(2);
        mirror.stale = true;
        let failed = mirror.refresh(Some(|| -> Result<Vec<Body>, SimulationError> {
            Err(SimulationError::Device("map failed".to_string()))
        }));
        assert!(failed.is_err());
        assert!(mirror.stale);

        let moved = vec![Body::new(Vec3::ONE, 2.0, Vec3::X); 2];
        mirror.refresh(Some(|| Ok(moved.clone()))).unwrap();
        assert!(!mirror.stale);
        assert_eq!(mirror.data.bodies(), &moved[..]);
    }

    #[test]
    fn readback_of_the_wrong_size_is_rejected() {
        let mut mirror = mirror(2);
        mirror.stale = true;
        let short = mirror.refresh(Some(|| Ok(vec![Body::new(Vec3::ZERO, 1.0, Vec3::ZERO)])));
        assert!(matches!(
            short,
            Err(SimulationError::SizeMismatch { expected: 2, actual: 1 })
        ));
    }
}
