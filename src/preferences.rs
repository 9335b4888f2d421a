//! Startup options for the engine

use nbody_physics::{Demo, Properties, DEFAULT_BODIES};
use nbody_simulation::ComputeType;

#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
    /// Index into [`Demo::ALL`].
    pub demo: usize,
    pub compute: ComputeType,
    pub bodies: usize,

    // Overrides for the demo's integration and layout values
    pub time_step: Option<f32>,
    pub cluster_scale: Option<f32>,
    pub velocity_scale: Option<f32>,
    pub softening: Option<f32>,
    pub damping: Option<f32>,

    /// Steps per second cap (0 = unlimited).
    pub max_updates: u32,
    /// Frames per second cap for the driver loop (0 = unlimited).
    pub max_frame_rate: u32,
    /// Worker pool size cap (0 = all hardware threads).
    pub max_cpu: usize,
    /// Never fall back to a CPU backend.
    pub is_gpu_only: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            demo: 0,
            compute: ComputeType::GpuPrimary,
            bodies: DEFAULT_BODIES,
            time_step: None,
            cluster_scale: None,
            velocity_scale: None,
            softening: None,
            damping: None,
            max_updates: 0,
            max_frame_rate: 60,
            max_cpu: 0,
            is_gpu_only: false,
        }
    }
}

impl Preferences {
    pub fn demo(&self) -> &'static Demo {
        &Demo::ALL[self.demo % Demo::ALL.len()]
    }

    /// Properties for the selected demo with any overrides applied.
    pub fn properties(&self) -> Properties {
        let mut properties = Properties::from_demo(self.demo, self.bodies);
        if let Some(time_step) = self.time_step {
            properties.time_step = time_step;
        }
        if let Some(cluster_scale) = self.cluster_scale {
            properties.cluster_scale = cluster_scale;
        }
        if let Some(velocity_scale) = self.velocity_scale {
            properties.velocity_scale = velocity_scale;
        }
        if let Some(softening) = self.softening {
            properties.softening = softening;
        }
        if let Some(damping) = self.damping {
            properties.damping = damping;
        }
        properties
    }

    /// Switch to another demo. Per-value overrides belong to the old demo and are dropped.
    pub fn for_demo(&self, demo: usize) -> Self {
        Self {
            demo: demo % Demo::ALL.len(),
            time_step: None,
            cluster_scale: None,
            velocity_scale: None,
            softening: None,
            damping: None,
            ..self.clone()
        }
    }
}
