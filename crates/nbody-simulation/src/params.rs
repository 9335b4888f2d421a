//! Uniform block shared with the integration shader

use bytemuck::{Pod, Zeroable};
use nbody_physics::StepParams;
use std::ops::Range;

/// Threads per workgroup in `integrate.wgsl`.
pub const WORKGROUP_SIZE: u32 = 256;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct KernelParams {
    // x: dt, y: damping, z: softening², w: G
    pub integration: [f32; 4],

    // x: body count, y: first active index, z: end of active range, w: padding
    pub range: [u32; 4],
}

impl KernelParams {
    pub fn new(step: &StepParams, count: usize, active: &Range<usize>) -> Self {
        Self {
            integration: [
                step.time_step,
                step.damping,
                step.softening_squared,
                step.gravity,
            ],
            range: [count as u32, active.start as u32, active.end as u32, 0],
        }
    }

    /// Workgroups needed to cover the active range.
    pub fn workgroups(&self) -> u32 {
        let active = self.range[2].saturating_sub(self.range[1]);
        active.div_ceil(WORKGROUP_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_wgsl_uniform() {
        assert_eq!(std::mem::size_of::<KernelParams>(), 32);
    }

    #[test]
    fn workgroups_cover_active_range() {
        let step = StepParams {
            time_step: 0.01,
            softening_squared: 0.01,
            damping: 1.0,
            gravity: 1.0,
        };
        assert_eq!(KernelParams::new(&step, 1000, &(0..1000)).workgroups(), 4);
        assert_eq!(KernelParams::new(&step, 1000, &(10..266)).workgroups(), 1);
        assert_eq!(KernelParams::new(&step, 1000, &(5..5)).workgroups(), 0);
    }
}
