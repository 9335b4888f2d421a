//! Body storage for the N-body simulation
//!
//! Two layouts are supported:
//! - *packed*: position and velocity interleaved per body (`[p0, v0, p1, v1, ...]`),
//!   which is what the CPU backends iterate over.
//! - *split*: all positions contiguous, then all velocities contiguous, which is what
//!   the GPU backend uploads into separate storage buffers.
//!
//! Every vector is 4 floats wide so both layouts can be copied straight into WGSL
//! `array<vec4<f32>>` buffers.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use std::ops::Range;

use crate::ConfigError;

/// Floats per body in the packed layout (position vec4 + velocity vec4).
pub const PACKED_STRIDE: usize = 8;

/// Floats per vector in the position or velocity arrays.
pub const VECTOR_STRIDE: usize = 4;

/// A single point mass.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Body {
    /// xyz: position, w: mass (zero marks a massless tracer)
    pub position: [f32; 4],
    /// xyz: velocity, w: reserved, carried through integration unchanged
    pub velocity: [f32; 4],
}

impl Body {
    pub fn new(position: Vec3, mass: f32, velocity: Vec3) -> Self {
        Self {
            position: position.extend(mass).to_array(),
            velocity: velocity.extend(1.0).to_array(),
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec4::from_array(self.position).truncate()
    }

    pub fn velocity(&self) -> Vec3 {
        Vec4::from_array(self.velocity).truncate()
    }

    pub fn mass(&self) -> f32 {
        self.position[3]
    }

    /// Inverse mass, or zero for a massless tracer.
    pub fn inverse_mass(&self) -> f32 {
        if self.mass() > 0.0 {
            1.0 / self.mass()
        } else {
            0.0
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().chain(self.velocity.iter()).all(|v| v.is_finite())
    }
}

/// Physical layout of a flat body buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Packed,
    Split,
}

/// Split layout: positions and velocities in separate, index-aligned arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitData {
    pub positions: Vec<[f32; 4]>,
    pub velocities: Vec<[f32; 4]>,
}

impl SplitData {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// The body dataset in packed layout.
///
/// Cloning produces an independent copy; buffers are never shared between owners.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyData {
    bodies: Vec<Body>,
}

impl BodyData {
    /// Wrap a body list, rejecting negative or non-finite masses.
    pub fn new(bodies: Vec<Body>) -> Result<Self, ConfigError> {
        validate_masses(&bodies)?;
        Ok(Self { bodies })
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn bodies_mut(&mut self) -> &mut [Body] {
        &mut self.bodies
    }

    pub fn is_finite(&self) -> bool {
        self.bodies.iter().all(Body::is_finite)
    }

    /// Build from a packed float buffer (8 floats per body).
    pub fn from_packed(src: &[f32]) -> Result<Self, ConfigError> {
        if src.len() % PACKED_STRIDE != 0 {
            return Err(ConfigError::Stride {
                len: src.len(),
                stride: PACKED_STRIDE,
            });
        }
        Self::new(bytemuck::cast_slice::<f32, Body>(src).to_vec())
    }

    /// Build from the split layout. Both arrays must have the same length.
    pub fn from_split(split: &SplitData) -> Result<Self, ConfigError> {
        if split.positions.len() != split.velocities.len() {
            return Err(ConfigError::BufferSize {
                expected: split.positions.len(),
                actual: split.velocities.len(),
            });
        }
        let bodies = split
            .positions
            .iter()
            .zip(split.velocities.iter())
            .map(|(p, v)| Body {
                position: *p,
                velocity: *v,
            })
            .collect();
        Self::new(bodies)
    }

    pub fn to_split(&self) -> SplitData {
        SplitData {
            positions: self.bodies.iter().map(|b| b.position).collect(),
            velocities: self.bodies.iter().map(|b| b.velocity).collect(),
        }
    }

    pub fn as_packed(&self) -> &[f32] {
        bytemuck::cast_slice(&self.bodies)
    }

    /// Copy the dataset into `dst` in the requested layout.
    pub fn write(&self, layout: Layout, dst: &mut [f32]) -> Result<(), ConfigError> {
        check_len(self.len() * PACKED_STRIDE, dst.len())?;
        match layout {
            Layout::Packed => dst.copy_from_slice(self.as_packed()),
            Layout::Split => {
                let (positions, velocities) = dst.split_at_mut(self.len() * VECTOR_STRIDE);
                self.write_positions(0..self.len(), positions)?;
                self.write_velocities(velocities)?;
            }
        }
        Ok(())
    }

    /// Copy 4-wide positions (x, y, z, mass) for `range` into `dst`.
    pub fn write_positions(&self, range: Range<usize>, dst: &mut [f32]) -> Result<(), ConfigError> {
        check_range(&range, self.len())?;
        check_len(range.len() * VECTOR_STRIDE, dst.len())?;
        for (chunk, body) in dst
            .chunks_exact_mut(VECTOR_STRIDE)
            .zip(&self.bodies[range])
        {
            chunk.copy_from_slice(&body.position);
        }
        Ok(())
    }

    /// Copy 4-wide velocities for every body into `dst`.
    pub fn write_velocities(&self, dst: &mut [f32]) -> Result<(), ConfigError> {
        check_len(self.len() * VECTOR_STRIDE, dst.len())?;
        for (chunk, body) in dst.chunks_exact_mut(VECTOR_STRIDE).zip(&self.bodies) {
            chunk.copy_from_slice(&body.velocity);
        }
        Ok(())
    }

    /// Overwrite all positions (and masses) from a 4-wide buffer.
    pub fn set_positions(&mut self, src: &[f32]) -> Result<(), ConfigError> {
        check_len(self.len() * VECTOR_STRIDE, src.len())?;
        for (index, chunk) in src.chunks_exact(VECTOR_STRIDE).enumerate() {
            check_mass(index, chunk[3])?;
        }
        for (body, chunk) in self.bodies.iter_mut().zip(src.chunks_exact(VECTOR_STRIDE)) {
            body.position.copy_from_slice(chunk);
        }
        Ok(())
    }

    /// Overwrite all velocities from a 4-wide buffer.
    pub fn set_velocities(&mut self, src: &[f32]) -> Result<(), ConfigError> {
        check_len(self.len() * VECTOR_STRIDE, src.len())?;
        for (body, chunk) in self.bodies.iter_mut().zip(src.chunks_exact(VECTOR_STRIDE)) {
            body.velocity.copy_from_slice(chunk);
        }
        Ok(())
    }
}

pub fn check_range(range: &Range<usize>, count: usize) -> Result<(), ConfigError> {
    if range.start > range.end || range.end > count {
        return Err(ConfigError::Range {
            min: range.start,
            max: range.end,
            count,
        });
    }
    Ok(())
}

fn check_len(expected: usize, actual: usize) -> Result<(), ConfigError> {
    if expected != actual {
        return Err(ConfigError::BufferSize { expected, actual });
    }
    Ok(())
}

fn check_mass(index: usize, mass: f32) -> Result<(), ConfigError> {
    if !mass.is_finite() || mass < 0.0 {
        return Err(ConfigError::Mass { index, mass });
    }
    Ok(())
}

fn validate_masses(bodies: &[Body]) -> Result<(), ConfigError> {
    bodies
        .iter()
        .enumerate()
        .try_for_each(|(index, body)| check_mass(index, body.mass()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BodyData {
        BodyData::new(vec![
            Body::new(Vec3::new(1.0, 2.0, 3.0), 4.0, Vec3::new(5.0, 6.0, 7.0)),
            Body::new(Vec3::new(-1.0, -2.0, -3.0), 0.5, Vec3::new(-5.0, -6.0, -7.0)),
        ])
        .unwrap()
    }

    #[test]
    fn packed_buffer_interleaves_position_and_velocity() {
        let data = sample();
        let mut dst = vec![0.0; 16];
        data.write(Layout::Packed, &mut dst).unwrap();
        assert_eq!(&dst[0..4], &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(&dst[4..8], &[5.0, 6.0, 7.0, 1.0]);
        assert_eq!(&dst[8..12], &[-1.0, -2.0, -3.0, 0.5]);
    }

    #[test]
    fn split_buffer_stores_positions_then_velocities() {
        let data = sample();
        let mut dst = vec![0.0; 16];
        data.write(Layout::Split, &mut dst).unwrap();
        assert_eq!(&dst[0..4], &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(&dst[4..8], &[-1.0, -2.0, -3.0, 0.5]);
        assert_eq!(&dst[8..12], &[5.0, 6.0, 7.0, 1.0]);
    }

    #[test]
    fn split_conversion_preserves_bits() {
        let data = sample();
        let back = BodyData::from_split(&data.to_split()).unwrap();
        assert_eq!(back, data);

        let packed = BodyData::from_packed(data.as_packed()).unwrap();
        assert_eq!(packed, data);
    }

    #[test]
    fn mismatched_split_arrays_are_rejected() {
        let mut split = sample().to_split();
        split.velocities.pop();
        assert!(matches!(
            BodyData::from_split(&split),
            Err(ConfigError::BufferSize { .. })
        ));
    }

    #[test]
    fn negative_mass_is_rejected() {
        let bodies = vec![Body::new(Vec3::ZERO, -1.0, Vec3::ZERO)];
        assert_eq!(
            BodyData::new(bodies),
            Err(ConfigError::Mass { index: 0, mass: -1.0 })
        );
    }

    #[test]
    fn massless_tracer_is_allowed() {
        let data = BodyData::new(vec![Body::new(Vec3::X, 0.0, Vec3::ZERO)]).unwrap();
        assert_eq!(data.bodies()[0].inverse_mass(), 0.0);
    }

    #[test]
    fn wrong_destination_size_is_rejected() {
        let data = sample();
        let mut dst = vec![0.0; 7];
        assert_eq!(
            data.write_positions(0..2, &mut dst),
            Err(ConfigError::BufferSize {
                expected: 8,
                actual: 7
            })
        );
    }

    #[test]
    fn positions_in_range_copy_only_the_range() {
        let data = sample();
        let mut dst = vec![0.0; 4];
        data.write_positions(1..2, &mut dst).unwrap();
        assert_eq!(dst, vec![-1.0, -2.0, -3.0, 0.5]);
        assert!(data.write_positions(1..3, &mut dst).is_err());
    }

    #[test]
    fn set_positions_validates_before_writing() {
        let mut data = sample();
        let before = data.clone();
        let src = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -2.0];
        assert!(data.set_positions(&src).is_err());
        assert_eq!(data, before);
    }
}
