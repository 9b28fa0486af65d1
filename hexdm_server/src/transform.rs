//! Piston/tip/tilt to actuator conversion.
//!
//! Each hexagonal segment sits on three actuators placed on a circle of
//! radius `a0` at 120° spacing. For piston `p`, tip `t` and tilt `l`:
//!
//! ```text
//! act0 = (p + a0·(√3/2)·t + (a0/2)·l) / g
//! act1 = (p − a0·l) / g
//! act2 = (p − a0·(√3/2)·t + (a0/2)·l) / g
//! ```
//!
//! Segment `i` drives command positions `3i..3i+3`; every position past
//! `3·nseg` stays 0.

use hexdm_common::consts::NDOF;
use hexdm_common::dm::config::TransformConfig;
use hexdm_common::dm::types::{ActuatorCommand, SegmentPtt};

const HALF_SQRT_3: f64 = 0.866_025_403_784_438_6;

/// Drive values of the three actuators under one segment.
pub fn segment_to_actuators(ptt: SegmentPtt, config: &TransformConfig) -> [f64; NDOF] {
    let a0 = config.actuator_radius_um;
    let g = config.gain;
    let tip = a0 * HALF_SQRT_3 * ptt.tip;
    let tilt = a0 / 2.0 * ptt.tilt;
    [
        (ptt.piston + tip + tilt) / g,
        (ptt.piston - a0 * ptt.tilt) / g,
        (ptt.piston - tip + tilt) / g,
    ]
}

/// Convert a flat `[p, t, l, ...]` buffer of `nseg` segments into a new command.
pub fn ptt_to_actuator(ptt: &[f64], nseg: usize, config: &TransformConfig) -> ActuatorCommand {
    let mut command = ActuatorCommand::zeroed(config.command_size, NDOF * nseg);
    ptt_to_actuator_into(ptt, nseg, config, &mut command);
    command
}

/// Same as [`ptt_to_actuator`], reusing `command`.
///
/// Only the first `NDOF * nseg` positions are written; a buffer shorter
/// than `nseg` segments leaves the remaining positions untouched.
pub fn ptt_to_actuator_into(
    ptt: &[f64],
    nseg: usize,
    config: &TransformConfig,
    command: &mut ActuatorCommand,
) {
    let segments = ptt.chunks_exact(NDOF).take(nseg);
    for (dof, out) in segments.zip(command.values_mut().chunks_exact_mut(NDOF)) {
        let ptt = SegmentPtt::new(dof[0], dof[1], dof[2]);
        out.copy_from_slice(&segment_to_actuators(ptt, config));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexdm_common::consts::{COMMAND_SIZE, NSEG, NVACT};
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_zeros_map_to_zeros() {
        let cmd = ptt_to_actuator(&vec![0.0; NVACT], NSEG, &TransformConfig::default());
        assert_eq!(cmd.len(), COMMAND_SIZE);
        assert!(cmd.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_pure_piston() {
        let out = segment_to_actuators(SegmentPtt::new(4000.0, 0.0, 0.0), &TransformConfig::default());
        assert_eq!(out, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_tip_and_tilt_geometry() {
        let config = TransformConfig::default();
        let a0 = config.actuator_radius_um;

        let tip = segment_to_actuators(SegmentPtt::new(0.0, 1.0, 0.0), &config);
        assert!(close(tip[0], a0 * 3f64.sqrt() / 2.0 / 4000.0));
        assert!(close(tip[1], 0.0));
        assert!(close(tip[2], -tip[0]));

        let tilt = segment_to_actuators(SegmentPtt::new(0.0, 0.0, 1.0), &config);
        assert!(close(tilt[0], a0 / 2.0 / 4000.0));
        assert!(close(tilt[1], -a0 / 4000.0));
        assert!(close(tilt[2], tilt[0]));
    }

    #[test]
    fn test_segment_placement_and_tail() {
        let mut ptt = vec![0.0; NVACT];
        SegmentPtt::new(4000.0, 0.0, 0.0).write_flat(&mut ptt, 168);

        let cmd = ptt_to_actuator(&ptt, NSEG, &TransformConfig::default());
        assert_eq!(&cmd.values()[504..507], &[1.0, 1.0, 1.0]);
        assert!(cmd.values()[..504].iter().all(|v| *v == 0.0));
        assert!(cmd.values()[NVACT..].iter().all(|v| *v == 0.0));
        assert_eq!(cmd.active_len(), NVACT);
    }

    #[test]
    fn test_custom_gain() {
        let config = TransformConfig {
            gain: 2000.0,
            ..TransformConfig::default()
        };
        let out = segment_to_actuators(SegmentPtt::new(4000.0, 0.0, 0.0), &config);
        assert_eq!(out, [2.0, 2.0, 2.0]);
    }

    proptest! {
        #[test]
        fn prop_piston_is_common_mode(p in -1.0e5f64..1.0e5) {
            let out = segment_to_actuators(SegmentPtt::new(p, 0.0, 0.0), &TransformConfig::default());
            prop_assert!(close(out[0], p / 4000.0));
            prop_assert!(close(out[1], out[0]) && close(out[2], out[0]));
        }

        #[test]
        fn prop_actuator_mean_is_piston(
            p in -1.0e4f64..1.0e4,
            t in -10.0f64..10.0,
            l in -10.0f64..10.0,
        ) {
            let out = segment_to_actuators(SegmentPtt::new(p, t, l), &TransformConfig::default());
            let mean = (out[0] + out[1] + out[2]) / 3.0;
            prop_assert!((mean - p / 4000.0).abs() < 1e-9);
        }

        #[test]
        fn prop_transform_is_linear(
            a in prop::collection::vec(-100.0f64..100.0, 3 * 7),
            b in prop::collection::vec(-100.0f64..100.0, 3 * 7),
        ) {
            let config = TransformConfig::default();
            let sum: Vec<f64> = a.iter().zip(&b).map(|(x, y)| x + y).collect();
            let ca = ptt_to_actuator(&a, 7, &config);
            let cb = ptt_to_actuator(&b, 7, &config);
            let cs = ptt_to_actuator(&sum, 7, &config);
            for i in 0..21 {
                prop_assert!((cs.values()[i] - (ca.values()[i] + cb.values()[i])).abs() < 1e-9);
            }
        }
    }
}
