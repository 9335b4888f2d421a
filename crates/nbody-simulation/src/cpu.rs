//! CPU backends: a single-threaded loop and a fixed-size rayon worker pool
//!
//! Both read the whole pre-step dataset and write the next state into a scratch
//! buffer, which is copied back once every body has been advanced. The pooled
//! variant splits the scratch buffer into one contiguous stripe per worker, so
//! writes never overlap and `pool.install` returning is the step barrier.

use nbody_physics::{advance_chunk, Body, BodyData, StepParams};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::ops::Range;

use crate::{RunState, SimulationError};

pub struct CpuBackend {
    threads: usize,
    threaded: bool,
    pool: Option<ThreadPool>,
    data: BodyData,
    scratch: Vec<Body>,
}

impl CpuBackend {
    pub fn single(data: BodyData) -> Self {
        Self {
            threads: 1,
            threaded: false,
            pool: None,
            scratch: vec![Body::default(); data.len()],
            data,
        }
    }

    /// A pooled backend with `threads` workers. The pool is built immediately.
    pub fn multi(data: BodyData, threads: usize) -> Result<Self, SimulationError> {
        let mut backend = Self {
            threads: threads.max(1),
            threaded: true,
            pool: None,
            scratch: vec![Body::default(); data.len()],
            data,
        };
        backend.acquire()?;
        Ok(backend)
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn label(&self) -> String {
        if self.threaded {
            format!("Multi Core CPU ({} threads)", self.threads)
        } else {
            "Single Core CPU".to_string()
        }
    }

    pub fn acquire(&mut self) -> Result<(), SimulationError> {
        if self.threaded && self.pool.is_none() {
            let pool = ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .thread_name(|i| format!("nbody-worker-{i}"))
                .build()
                .map_err(|e| {
                    SimulationError::ResourceExhaustion(format!(
                        "worker pool of {} threads: {e}",
                        self.threads
                    ))
                })?;
            log::debug!("Started {} CPU workers", self.threads);
            self.pool = Some(pool);
        }
        Ok(())
    }

    /// Drop the worker pool. Steps run synchronously, so none is in flight here.
    pub fn release(&mut self) {
        if self.pool.take().is_some() {
            log::debug!("Released {} CPU workers", self.threads);
        }
    }

    pub fn is_acquired(&self) -> bool {
        !self.threaded || self.pool.is_some()
    }

    pub fn advance(
        &mut self,
        active: &Range<usize>,
        params: &StepParams,
    ) -> Result<(), SimulationError> {
        let Self {
            threads,
            threaded,
            pool,
            data,
            scratch,
        } = self;
        let src = data.bodies();

        if *threaded {
            let pool = pool.as_ref().ok_or(SimulationError::StateViolation {
                operation: "step a released worker pool",
                state: RunState::Stopped,
            })?;
            let stride = src.len().div_ceil(*threads).max(1);
            pool.install(|| {
                scratch
                    .par_chunks_mut(stride)
                    .enumerate()
                    .for_each(|(chunk, dst)| advance_chunk(src, chunk * stride, dst, active, params));
            });
        } else {
            advance_chunk(src, 0, scratch, active, params);
        }

        data.bodies_mut().copy_from_slice(scratch);
        Ok(())
    }

    pub fn data(&self) -> &BodyData {
        &self.data
    }

    pub fn replace(&mut self, data: BodyData) {
        self.scratch.resize(data.len(), Body::default());
        self.data = data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbody_physics::{generate, Properties};

    fn setup(bodies: usize) -> (BodyData, StepParams) {
        let properties = Properties::from_demo(0, bodies);
        (generate(&properties).unwrap(), StepParams::from(&properties))
    }

    #[test]
    fn pooled_step_matches_single_step() {
        let (data, params) = setup(301);
        let all = 0..data.len();
        let mut single = CpuBackend::single(data.clone());
        let mut multi = CpuBackend::multi(data, 4).unwrap();

        for _ in 0..3 {
            single.advance(&all, &params).unwrap();
            multi.advance(&all, &params).unwrap();
        }
        assert_eq!(single.data(), multi.data());
    }

    #[test]
    fn released_pool_refuses_to_step() {
        let (data, params) = setup(16);
        let mut multi = CpuBackend::multi(data, 2).unwrap();
        multi.release();
        assert!(!multi.is_acquired());
        assert!(matches!(
            multi.advance(&(0..16), &params),
            Err(SimulationError::StateViolation { .. })
        ));
        multi.acquire().unwrap();
        assert!(multi.advance(&(0..16), &params).is_ok());
    }

    #[test]
    fn more_workers_than_bodies() {
        let (data, params) = setup(3);
        let mut multi = CpuBackend::multi(data.clone(), 8).unwrap();
        let mut single = CpuBackend::single(data);
        multi.advance(&(0..3), &params).unwrap();
        single.advance(&(0..3), &params).unwrap();
        assert_eq!(single.data(), multi.data());
    }

    #[test]
    fn labels() {
        let (data, _) = setup(4);
        assert_eq!(CpuBackend::single(data.clone()).label(), "Single Core CPU");
        assert_eq!(
            CpuBackend::multi(data, 2).unwrap().label(),
            "Multi Core CPU (2 threads)"
        );
    }
}
