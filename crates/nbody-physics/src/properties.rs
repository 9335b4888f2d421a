//! Simulation properties and the built-in demo presets

use crate::ConfigError;

/// Default number of bodies for a demo.
pub const DEFAULT_BODIES: usize = 8192;

/// Gravitational constant in simulation units.
pub const GRAVITY: f32 = 1.0;

/// Initial-condition layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Config {
    /// Uniform random ball with random velocities.
    Random,
    /// Thick shell rotating about the z axis.
    Shell,
    /// Two rotating disks on a collision course.
    Mwm31,
    /// Ball with radially outward velocities.
    Expand,
}

impl Config {
    pub const ALL: [Config; 4] = [Config::Random, Config::Shell, Config::Mwm31, Config::Expand];

    pub fn name(&self) -> &'static str {
        match self {
            Config::Random => "Random",
            Config::Shell => "Shell",
            Config::Mwm31 => "MW-M31 Merger",
            Config::Expand => "Expand",
        }
    }
}

/// Immutable configuration for one simulation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Properties {
    pub bodies: usize,
    pub config: Config,
    pub time_step: f32,
    pub cluster_scale: f32,
    pub velocity_scale: f32,
    /// Softening length ε; the kernel adds ε² to every squared separation.
    pub softening: f32,
    /// Multiplicative velocity damping per step (1.0 = none).
    pub damping: f32,
    pub gravity: f32,
    /// Factor mapping simulated time units to displayed years.
    pub year_scale: f32,
    /// Seed for the initial-condition random stream.
    pub seed: u64,
}

impl Default for Properties {
    fn default() -> Self {
        Demo::ALL[0].properties(DEFAULT_BODIES)
    }
}

impl Properties {
    pub fn from_demo(index: usize, bodies: usize) -> Self {
        Demo::ALL[index % Demo::ALL.len()].properties(bodies)
    }

    pub fn with_bodies(mut self, bodies: usize) -> Self {
        self.bodies = bodies;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bodies == 0 {
            return Err(ConfigError::NoBodies);
        }
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(ConfigError::TimeStep(self.time_step));
        }
        if !(self.softening.is_finite() && self.softening > 0.0) {
            return Err(ConfigError::Softening(self.softening));
        }
        if !(self.damping > 0.0 && self.damping <= 1.0) {
            return Err(ConfigError::Damping(self.damping));
        }
        if !(self.cluster_scale.is_finite() && self.cluster_scale > 0.0) {
            return Err(ConfigError::Scale {
                name: "cluster scale",
                value: self.cluster_scale,
            });
        }
        for (name, value) in [
            ("velocity scale", self.velocity_scale),
            ("gravity", self.gravity),
            ("year scale", self.year_scale),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Scale { name, value });
            }
        }
        Ok(())
    }

    /// Whether switching from `other` to `self` needs a freshly generated dataset.
    ///
    /// Integration-only changes (time step, softening, damping, gravity) keep the
    /// current bodies.
    pub fn requires_regeneration(&self, other: &Properties) -> bool {
        self.bodies != other.bodies
            || self.config != other.config
            || self.cluster_scale != other.cluster_scale
            || self.velocity_scale != other.velocity_scale
            || self.seed != other.seed
    }

    pub fn softening_squared(&self) -> f32 {
        self.softening * self.softening
    }
}

/// A named preset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Demo {
    pub name: &'static str,
    pub time_step: f32,
    pub cluster_scale: f32,
    pub velocity_scale: f32,
    pub softening: f32,
    pub damping: f32,
    /// Point sprite size hint for the rendering layer.
    pub point_size: f32,
    pub config: Config,
}

impl Demo {
    pub const ALL: [Demo; 6] = [
        Demo {
            name: "Rotating Shell",
            time_step: 0.016,
            cluster_scale: 1.54,
            velocity_scale: 8.0,
            softening: 0.1,
            damping: 1.0,
            point_size: 1.0,
            config: Config::Shell,
        },
        Demo {
            name: "Fast Shell",
            time_step: 0.016,
            cluster_scale: 0.68,
            velocity_scale: 20.0,
            softening: 0.1,
            damping: 1.0,
            point_size: 0.8,
            config: Config::Shell,
        },
        Demo {
            name: "Galaxy Merger",
            time_step: 0.004,
            cluster_scale: 1.0,
            velocity_scale: 1.0,
            softening: 0.1,
            damping: 1.0,
            point_size: 0.07,
            config: Config::Mwm31,
        },
        Demo {
            name: "Expanding Sphere",
            time_step: 0.0019,
            cluster_scale: 0.32,
            velocity_scale: 276.0,
            softening: 1.0,
            damping: 1.0,
            point_size: 1.0,
            config: Config::Expand,
        },
        Demo {
            name: "Damped Expansion",
            time_step: 0.0016,
            cluster_scale: 0.32,
            velocity_scale: 272.0,
            softening: 0.145,
            damping: 0.999,
            point_size: 0.08,
            config: Config::Expand,
        },
        Demo {
            name: "Cold Collapse",
            time_step: 0.016,
            cluster_scale: 6.04,
            velocity_scale: 0.0,
            softening: 1.0,
            damping: 1.0,
            point_size: 0.76,
            config: Config::Random,
        },
    ];

    pub fn properties(&self, bodies: usize) -> Properties {
        Properties {
            bodies,
            config: self.config,
            time_step: self.time_step,
            cluster_scale: self.cluster_scale,
            velocity_scale: self.velocity_scale,
            softening: self.softening,
            damping: self.damping,
            gravity: GRAVITY,
            year_scale: 1.0,
            seed: 0x5eed,
        }
    }
}
