//! These tests need a wgpu adapter and return early on hosts without one.

use nbody_physics::Properties;
use nbody_simulation::{ComputeDevices, ComputeType, Facade, SimulationError};

fn gpu_facade(properties: Properties) -> Option<Facade> {
    match Facade::new(ComputeType::GpuPrimary, ComputeDevices::probe(), properties) {
        Ok(facade) => Some(facade),
        Err(SimulationError::DeviceUnavailable(reason)) => {
            eprintln!("skipping: {reason}");
            None
        }
        Err(err) => panic!("failed to build GPU simulator: {err}"),
    }
}

fn positions(facade: &mut Facade) -> Vec<f32> {
    let mut dst = vec![0.0; facade.size() * 4];
    facade.position(&mut dst).unwrap();
    dst
}

#[test]
fn gpu_matches_cpu_within_tolerance() {
    let properties = Properties::from_demo(0, 1000);
    let Some(mut gpu) = gpu_facade(properties) else {
        return;
    };
    let mut cpu =
        Facade::new(ComputeType::CpuSingle, ComputeDevices::cpu_only(1), properties).unwrap();

    gpu.start(false).unwrap();
    cpu.start(false).unwrap();
    for _ in 0..5 {
        gpu.step().unwrap();
        cpu.step().unwrap();
    }

    let expected = positions(&mut cpu);
    let actual = positions(&mut gpu);
    for (i, (a, e)) in actual.iter().zip(&expected).enumerate() {
        assert!(
            (a - e).abs() <= 1e-3 * e.abs().max(1.0),
            "component {i}: gpu {a} vs cpu {e}"
        );
    }
}

#[test]
fn gpu_round_trip_preserves_dataset() {
    let properties = Properties::from_demo(2, 777);
    let Some(mut gpu) = gpu_facade(properties) else {
        return;
    };
    let mut before = vec![0.0; 777 * 8];
    gpu.data(&mut before).unwrap();

    gpu.start(true).unwrap();
    gpu.set_compute_type(ComputeType::CpuMulti).unwrap();
    assert!(gpu.is_paused());
    gpu.set_compute_type(ComputeType::GpuPrimary).unwrap();
    assert!(gpu.is_gpu_primary());

    let mut after = vec![0.0; 777 * 8];
    gpu.data(&mut after).unwrap();
    assert_eq!(before, after);
}

#[test]
fn gpu_range_leaves_other_bodies_alone() {
    let properties = Properties::from_demo(0, 300);
    let Some(mut gpu) = gpu_facade(properties) else {
        return;
    };
    let before = positions(&mut gpu);
    gpu.set_range(100, 200).unwrap();
    gpu.start(false).unwrap();
    gpu.step().unwrap();
    gpu.step().unwrap();
    let after = positions(&mut gpu);

    assert_eq!(&before[..400], &after[..400]);
    assert_eq!(&before[800..], &after[800..]);
    assert_ne!(&before[400..800], &after[400..800]);
}

#[test]
fn gpu_stop_keeps_stepped_state() {
    let properties = Properties::from_demo(0, 256);
    let Some(mut gpu) = gpu_facade(properties) else {
        return;
    };
    gpu.start(false).unwrap();
    gpu.step().unwrap();
    gpu.step().unwrap();

    // Stop straight after dispatch: the readback happens on release
    gpu.stop().unwrap();
    assert!(!gpu.is_acquired());
    let stopped = positions(&mut gpu);

    let mut cpu =
        Facade::new(ComputeType::CpuSingle, ComputeDevices::cpu_only(1), properties).unwrap();
    let initial = positions(&mut cpu);
    assert_ne!(stopped, initial);
}
