use ibl_core::Vec3;

use super::session::ProbeTrajectory;

/// Scene pose of a recording probe derived from its insertion trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbePlacement {
    /// Insertion point in scene units: `(-ml, -dv, ap) / scale`.
    pub entry: Vec3,
    /// Euler angles `(0, phi, theta)` in degrees.
    pub rotation_deg: Vec3,
    /// Insertion depth in scene units.
    pub depth: f32,
    /// Entry point pushed `depth` along the rotated probe axis.
    pub tip: Vec3,
}

impl ProbePlacement {
    pub fn from_trajectory(trajectory: &ProbeTrajectory, scale: f32) -> Self {
        let entry = [
            -trajectory.ml / scale,
            -trajectory.dv / scale,
            trajectory.ap / scale,
        ];
        let rotation_deg = [0.0, trajectory.phi, trajectory.theta];
        let depth = trajectory.depth / scale;

        // Local down axis rotated about z by theta, then about y by phi.
        let (sin_t, cos_t) = trajectory.theta.to_radians().sin_cos();
        let (sin_p, cos_p) = trajectory.phi.to_radians().sin_cos();
        let offset = [
            depth * sin_t * cos_p,
            -depth * cos_t,
            -depth * sin_t * sin_p,
        ];
        let tip = [
            entry[0] + offset[0],
            entry[1] + offset[1],
            entry[2] + offset[2],
        ];
        Self {
            entry,
            rotation_deg,
            depth,
            tip,
        }
    }
}
