//! Softened Newtonian gravity and the semi-implicit Euler update
//!
//! The CPU backends run these functions directly. The GPU shader in
//! `nbody-simulation` implements the same arithmetic in WGSL.

use glam::Vec3;
use std::ops::Range;

use crate::body::Body;
use crate::properties::Properties;

/// Per-step integration constants derived from [`Properties`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepParams {
    pub time_step: f32,
    pub softening_squared: f32,
    pub damping: f32,
    pub gravity: f32,
}

impl From<&Properties> for StepParams {
    fn from(properties: &Properties) -> Self {
        Self {
            time_step: properties.time_step,
            softening_squared: properties.softening_squared(),
            damping: properties.damping,
            gravity: properties.gravity,
        }
    }
}

/// Acceleration (without G) on a body at `position` due to `other`
/// a = m_j * r / (|r|² + ε²)^(3/2)
#[inline]
pub fn pair_acceleration(position: Vec3, other: &Body, softening_squared: f32) -> Vec3 {
    let r = other.position() - position;
    let dist_sq = r.length_squared() + softening_squared;
    let inv_dist = dist_sq.sqrt().recip();
    let inv_dist_cube = inv_dist * inv_dist * inv_dist;
    r * (other.mass() * inv_dist_cube)
}

/// Total gravitational acceleration at `position` from every body in `bodies`.
///
/// The body itself may be part of `bodies`: with ε > 0 its own term is exactly zero.
#[inline]
pub fn total_acceleration(position: Vec3, bodies: &[Body], params: &StepParams) -> Vec3 {
    let mut acc = Vec3::ZERO;
    for other in bodies {
        acc += pair_acceleration(position, other, params.softening_squared);
    }
    acc * params.gravity
}

/// v' = (v + a dt) * damping, p' = p + v' dt
#[inline]
pub fn integrate(body: &Body, acceleration: Vec3, params: &StepParams) -> Body {
    let velocity = (body.velocity() + acceleration * params.time_step) * params.damping;
    let position = body.position() + velocity * params.time_step;
    Body {
        position: position.extend(body.mass()).to_array(),
        velocity: velocity.extend(body.velocity[3]).to_array(),
    }
}

/// Advance the bodies `src[offset..offset + dst.len()]` by one step, writing into `dst`.
///
/// Only `src` is read, so every acceleration uses pre-step positions no matter how the
/// output is partitioned between workers. Indices outside `active` are copied unchanged.
pub fn advance_chunk(
    src: &[Body],
    offset: usize,
    dst: &mut [Body],
    active: &Range<usize>,
    params: &StepParams,
) {
    for (local, out) in dst.iter_mut().enumerate() {
        let index = offset + local;
        let body = &src[index];
        *out = if active.contains(&index) {
            let acc = total_acceleration(body.position(), src, params);
            integrate(body, acc, params)
        } else {
            *body
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> StepParams {
        StepParams {
            time_step: 0.01,
            softening_squared: 0.01 * 0.01,
            damping: 1.0,
            gravity: 1.0,
        }
    }

    #[test]
    fn pair_forces_are_equal_and_opposite() {
        let a = Body::new(Vec3::new(-1.0, 0.0, 0.0), 2.0, Vec3::ZERO);
        let b = Body::new(Vec3::new(1.0, 0.0, 0.0), 3.0, Vec3::ZERO);
        let eps2 = params().softening_squared;

        let on_a = pair_acceleration(a.position(), &b, eps2) * a.mass();
        let on_b = pair_acceleration(b.position(), &a, eps2) * b.mass();

        assert!((on_a + on_b).length() < 1e-6);
        assert!(on_a.x > 0.0, "a should be pulled toward b");
    }

    #[test]
    fn self_interaction_is_zero() {
        let a = Body::new(Vec3::new(0.3, -0.2, 0.1), 5.0, Vec3::ZERO);
        assert_eq!(pair_acceleration(a.position(), &a, 1e-4), Vec3::ZERO);
    }

    #[test]
    fn coincident_bodies_stay_finite() {
        let a = Body::new(Vec3::ONE, 1.0, Vec3::ZERO);
        let b = Body::new(Vec3::ONE, 1.0, Vec3::ZERO);
        let acc = total_acceleration(a.position(), &[a, b], &params());
        assert!(acc.is_finite());
    }

    #[test]
    fn inverse_square_far_field() {
        let origin = Vec3::ZERO;
        let mass = Body::new(Vec3::new(10.0, 0.0, 0.0), 1.0, Vec3::ZERO);
        let acc = pair_acceleration(origin, &mass, 1e-8);
        assert!((acc.x - 0.01).abs() < 1e-6);
    }

    #[test]
    fn damping_scales_velocity() {
        let mut p = params();
        p.damping = 0.5;
        let body = Body::new(Vec3::ZERO, 1.0, Vec3::new(2.0, 0.0, 0.0));
        let next = integrate(&body, Vec3::ZERO, &p);
        assert_eq!(next.velocity(), Vec3::new(1.0, 0.0, 0.0));
        assert!((next.position().x - 0.01).abs() < 1e-7);
        assert_eq!(next.mass(), 1.0);
    }

    #[test]
    fn chunked_advance_matches_whole_advance() {
        let src: Vec<Body> = (0..9)
            .map(|i| {
                let f = i as f32;
                Body::new(Vec3::new(f, f * 0.5, -f), 1.0 + f, Vec3::new(0.1, 0.0, f * 0.01))
            })
            .collect();
        let all = 0..src.len();

        let mut whole = vec![Body::default(); src.len()];
        advance_chunk(&src, 0, &mut whole, &all, &params());

        let mut chunked = vec![Body::default(); src.len()];
        for (i, chunk) in chunked.chunks_mut(4).enumerate() {
            advance_chunk(&src, i * 4, chunk, &all, &params());
        }

        assert_eq!(whole, chunked);
    }

    #[test]
    fn bodies_outside_active_range_are_carried() {
        let src = vec![
            Body::new(Vec3::ZERO, 1.0, Vec3::ZERO),
            Body::new(Vec3::X, 1.0, Vec3::ZERO),
        ];
        let mut dst = vec![Body::default(); 2];
        advance_chunk(&src, 0, &mut dst, &(0..1), &params());
        assert_ne!(dst[0], src[0]);
        assert_eq!(dst[1], src[1]);
    }
}
