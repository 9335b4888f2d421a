//! Initial conditions from bounded uniform random sampling
//!
//! Every layout draws per-axis samples from a [`UniformFloat3`] and remaps them to the
//! target shape. Directions come from rejection sampling inside the unit ball; samples
//! outside the ball or too close to the origin are discarded and redrawn, so no
//! zero-length vector is ever normalized.

use glam::{Quat, Vec2, Vec3};
use rand::distr::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::body::{Body, BodyData};
use crate::properties::{Config, Properties};
use crate::ConfigError;

/// Samples shorter than this are treated as degenerate and redrawn.
pub const DEGENERATE_LENGTH: f32 = f32::EPSILON;

/// Body count at which the random and expanding layouts start growing with N.
const SCALE_REFERENCE_BODIES: f32 = 1024.0;

/// Uniform real distribution over `[min, max)` on each axis, with its own stream.
#[derive(Debug, Clone)]
pub struct UniformFloat3 {
    min: f32,
    max: f32,
    seed: u64,
    rng: StdRng,
    distribution: Uniform<f32>,
}

impl UniformFloat3 {
    pub fn new(min: f32, max: f32, seed: u64) -> Result<Self, ConfigError> {
        let distribution =
            Uniform::new(min, max).map_err(|_| ConfigError::Distribution { min, max })?;
        Ok(Self {
            min,
            max,
            seed,
            rng: StdRng::seed_from_u64(seed),
            distribution,
        })
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    /// Restart the stream from its seed.
    pub fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.reset();
    }

    pub fn sample(&mut self) -> Vec3 {
        Vec3::new(self.scalar(), self.scalar(), self.scalar())
    }

    pub fn scalar(&mut self) -> f32 {
        self.distribution.sample(&mut self.rng)
    }
}

/// Radial limits of a generated cluster, measured from its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub inner: f32,
    pub outer: f32,
}

impl Bounds {
    /// Whether `radius` lies within the bounds, allowing for f32 rounding.
    pub fn contains(&self, radius: f32) -> bool {
        let slack = 1e-5 * self.outer;
        radius >= self.inner - slack && radius <= self.outer + slack
    }
}

/// Generates a [`BodyData`] from [`Properties`].
pub struct Generator {
    properties: Properties,
    /// Signed samples in [-1, 1) used for directions.
    direction: UniformFloat3,
    /// Unit interval samples used for radii.
    unit: UniformFloat3,
}

impl Generator {
    pub fn new(properties: &Properties) -> Result<Self, ConfigError> {
        properties.validate()?;
        Ok(Self {
            properties: *properties,
            direction: UniformFloat3::new(-1.0, 1.0, properties.seed)?,
            unit: UniformFloat3::new(0.0, 1.0, properties.seed.rotate_left(32) ^ 0x9e37_79b9)?,
        })
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Restart both random streams so the next dataset repeats the previous one.
    pub fn reset(&mut self) {
        self.direction.reset();
        self.unit.reset();
    }

    pub fn generate(&mut self) -> Result<BodyData, ConfigError> {
        let mut bodies = vec![Body::default(); self.properties.bodies];
        self.fill(&mut bodies);
        BodyData::new(bodies)
    }

    /// Write one body per slot of `bodies` using the configured layout.
    pub fn fill(&mut self, bodies: &mut [Body]) {
        log::debug!(
            "Generating {} bodies ({})",
            bodies.len(),
            self.properties.config.name()
        );
        match self.properties.config {
            Config::Random => self.config_random(bodies),
            Config::Shell => self.config_shell(bodies),
            Config::Mwm31 => self.config_mwm31(bodies),
            Config::Expand => self.config_expand(bodies),
        }
    }

    /// Radial bounds of the layout around [`Generator::cluster_center`].
    pub fn bounds(&self) -> Bounds {
        let scale = self.properties.cluster_scale;
        match self.properties.config {
            Config::Random | Config::Expand => Bounds {
                inner: 0.0,
                outer: self.count_scale(),
            },
            Config::Shell => Bounds {
                inner: 2.5 * scale,
                outer: 4.0 * scale,
            },
            Config::Mwm31 => Bounds {
                inner: 0.1 * scale,
                outer: 1.05 * scale,
            },
        }
    }

    /// Center of the cluster that body `index` belongs to.
    pub fn cluster_center(&self, index: usize) -> Vec3 {
        match self.properties.config {
            Config::Mwm31 => {
                let scale = self.properties.cluster_scale;
                let offset = Vec3::new(2.0 * scale, 0.5 * scale, 0.0);
                if index < self.first_galaxy_len() {
                    -offset
                } else {
                    offset
                }
            }
            _ => Vec3::ZERO,
        }
    }

    fn count_scale(&self) -> f32 {
        let n = self.properties.bodies as f32;
        self.properties.cluster_scale * (n / SCALE_REFERENCE_BODIES).max(1.0)
    }

    fn first_galaxy_len(&self) -> usize {
        self.properties.bodies.div_ceil(2)
    }

    /// A non-degenerate point inside the unit ball.
    fn ball_point(&mut self) -> Vec3 {
        loop {
            let point = self.direction.sample();
            let len = point.length();
            if len <= 1.0 && len > DEGENERATE_LENGTH {
                return point;
            }
        }
    }

    /// A unit direction in the xy plane.
    fn disk_direction(&mut self) -> Vec2 {
        loop {
            let point = self.direction.sample().truncate();
            let len = point.length();
            if len <= 1.0 && len > DEGENERATE_LENGTH {
                return point / len;
            }
        }
    }

    fn config_random(&mut self, bodies: &mut [Body]) {
        let scale = self.count_scale();
        let vscale = self.properties.velocity_scale * scale;
        for body in bodies.iter_mut() {
            let position = self.ball_point() * scale;
            let velocity = self.ball_point() * vscale;
            *body = Body::new(position, 1.0, velocity);
        }
    }

    fn config_shell(&mut self, bodies: &mut [Body]) {
        let Bounds { inner, outer } = self.bounds();
        let vscale = self.properties.cluster_scale * self.properties.velocity_scale;
        for body in bodies.iter_mut() {
            let point = self.ball_point().normalize();
            let position = point * (inner + (outer - inner) * self.unit.scalar());

            // Spin about z; fall back to x for points on the pole.
            let axis = if 1.0 - point.dot(Vec3::Z).abs() < 1e-6 {
                Vec3::X
            } else {
                Vec3::Z
            };
            let velocity = position.cross(axis) * vscale;
            *body = Body::new(position, 1.0, velocity);
        }
    }

    fn config_mwm31(&mut self, bodies: &mut [Body]) {
        let scale = self.properties.cluster_scale;
        let gravity = self.properties.gravity;
        let vscale = self.properties.velocity_scale;
        let inner = 0.1 * scale;
        let split = self.first_galaxy_len().min(bodies.len());
        let (first, second) = bodies.split_at_mut(split);

        let galaxies = [
            (first, Quat::IDENTITY, 1.0_f32),
            (second, Quat::from_rotation_x(0.5), -1.0_f32),
        ];
        for (galaxy_index, (galaxy, tilt, side)) in galaxies.into_iter().enumerate() {
            let count = galaxy.len() as f32;
            let center = self.cluster_center(galaxy_index * split);
            let approach = Vec3::new(side, 0.0, 0.0) * vscale * 0.25 * (gravity * count / (4.0 * scale)).sqrt();
            for body in galaxy.iter_mut() {
                let direction = self.disk_direction();
                let radius = inner + (scale - inner) * self.unit.scalar();
                let height = self.direction.scalar() * 0.05 * scale;
                let local = (direction * radius).extend(height);

                let enclosed = ((radius - inner) / (scale - inner)).max(0.05);
                let speed = vscale * (gravity * count * enclosed / radius).sqrt();
                let tangent = Vec3::Z.cross(direction.extend(0.0));

                let position = center + tilt * local;
                let velocity = approach + tilt * tangent * speed;
                *body = Body::new(position, 1.0, velocity);
            }
        }
    }

    fn config_expand(&mut self, bodies: &mut [Body]) {
        let scale = self.count_scale();
        let vscale = scale * self.properties.velocity_scale;
        for body in bodies.iter_mut() {
            let point = self.ball_point();
            *body = Body::new(point * scale, 1.0, point * vscale);
        }
    }
}

/// Validate `properties` and generate a fresh dataset.
pub fn generate(properties: &Properties) -> Result<BodyData, ConfigError> {
    Generator::new(properties)?.generate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::Demo;

    fn properties(config: Config, bodies: usize) -> Properties {
        let mut p = Properties::from_demo(0, bodies);
        p.config = config;
        p.cluster_scale = 1.5;
        p.velocity_scale = 2.0;
        p
    }

    #[test]
    fn zero_bodies_is_rejected() {
        let p = Properties::default().with_bodies(0);
        assert!(matches!(Generator::new(&p), Err(ConfigError::NoBodies)));
        assert!(matches!(generate(&p), Err(ConfigError::NoBodies)));
    }

    #[test]
    fn every_layout_stays_within_bounds() {
        for config in Config::ALL {
            let p = properties(config, 2000);
            let mut generator = Generator::new(&p).unwrap();
            let bounds = generator.bounds();
            let data = generator.generate().unwrap();
            assert_eq!(data.len(), 2000);
            for (i, body) in data.bodies().iter().enumerate() {
                assert!(body.is_finite(), "{config:?} body {i} not finite");
                let radius = (body.position() - generator.cluster_center(i)).length();
                assert!(
                    bounds.contains(radius) && radius > 0.0,
                    "{config:?} body {i} radius {radius} outside {bounds:?}"
                );
            }
        }
    }

    #[test]
    fn same_seed_same_dataset() {
        let p = properties(Config::Shell, 256);
        assert_eq!(generate(&p).unwrap(), generate(&p).unwrap());
        assert_ne!(generate(&p).unwrap(), generate(&p.with_seed(99)).unwrap());
    }

    #[test]
    fn reset_repeats_the_stream() {
        let p = properties(Config::Random, 64);
        let mut generator = Generator::new(&p).unwrap();
        let first = generator.generate().unwrap();
        let second = generator.generate().unwrap();
        assert_ne!(first, second);
        generator.reset();
        assert_eq!(generator.generate().unwrap(), first);
    }

    #[test]
    fn expand_velocities_point_outward() {
        let data = generate(&properties(Config::Expand, 500)).unwrap();
        for body in data.bodies() {
            assert!(body.position().dot(body.velocity()) > 0.0);
        }
    }

    #[test]
    fn shell_rotates_about_z() {
        let data = generate(&properties(Config::Shell, 500)).unwrap();
        let angular_z: f32 = data
            .bodies()
            .iter()
            .map(|b| b.position().cross(b.velocity()).z)
            .sum();
        assert!(angular_z.abs() > 0.0);
        for body in data.bodies() {
            let (p, v) = (body.position(), body.velocity());
            assert!(p.dot(v).abs() <= 1e-4 * p.length() * v.length() + 1e-6);
        }
    }

    #[test]
    fn merger_galaxies_approach_each_other() {
        let data = generate(&properties(Config::Mwm31, 1000)).unwrap();
        let (a, b) = data.bodies().split_at(500);
        let mean = |bodies: &[Body]| {
            bodies.iter().map(|b| b.velocity()).sum::<Vec3>() / bodies.len() as f32
        };
        assert!(mean(a).x > 0.0);
        assert!(mean(b).x < 0.0);
    }

    #[test]
    fn uniform_rejects_empty_interval() {
        assert!(UniformFloat3::new(1.0, 1.0, 0).is_err());
        let mut dist = UniformFloat3::new(-2.0, 3.0, 5).unwrap();
        for _ in 0..100 {
            let v = dist.sample();
            assert!(v.min_element() >= dist.min() && v.max_element() < dist.max());
        }
    }

    #[test]
    fn demos_generate() {
        for (i, _) in Demo::ALL.iter().enumerate() {
            let data = generate(&Properties::from_demo(i, 128)).unwrap();
            assert!(data.is_finite());
        }
    }
}
