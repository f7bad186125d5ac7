//! Vial-to-arm coordinate transform.

use rbc_config::QuadHoming;

/// A 2-D rigid (rotation + translation, no scale) transform, fitted
/// from two point correspondences.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform2D {
    cos: f64,
    sin: f64,
    tx: f64,
    ty: f64,
}

impl RigidTransform2D {
    /// Fit the unique orientation-preserving rigid transform mapping
    /// `from[0] -> to[0]` and `from[1] -> to[1]` exactly.
    pub fn fit(from: [(f64, f64); 2], to: [(f64, f64); 2]) -> Self {
        let dp = (from[1].0 - from[0].0, from[1].1 - from[0].1);
        let dq = (to[1].0 - to[0].0, to[1].1 - to[0].1);
        let theta = dq.1.atan2(dq.0) - dp.1.atan2(dp.0);
        let (sin, cos) = theta.sin_cos();
        let rotated = (
            cos * from[0].0 - sin * from[0].1,
            sin * from[0].0 + cos * from[0].1,
        );
        RigidTransform2D {
            cos,
            sin,
            tx: to[0].0 - rotated.0,
            ty: to[0].1 - rotated.1,
        }
    }

    pub fn apply(&self, p: (f64, f64)) -> (f64, f64) {
        (
            self.cos * p.0 - self.sin * p.1 + self.tx,
            self.sin * p.0 + self.cos * p.1 + self.ty,
        )
    }
}

/// The out-plane and in-plane transforms stacked for one quad, plus
/// its fixed z levels and wash-station coordinates. `z_out`/`z_in` are
/// taken from the `vial_0` reference point, since all vials in a quad
/// sit at the same height.
#[derive(Debug, Clone, Copy)]
pub struct QuadTransform {
    pub out_plane: RigidTransform2D,
    pub in_plane: RigidTransform2D,
    pub z_out: f64,
    pub z_in: f64,
    pub wash_xyz_out: (f64, f64, f64),
    pub wash_xyz_in: (f64, f64, f64),
}

impl QuadTransform {
    pub fn fit(homing: &QuadHoming) -> Self {
        const VIAL_0: (f64, f64) = (0.0, 36.0);
        const VIAL_17: (f64, f64) = (90.0, 0.0);
        QuadTransform {
            out_plane: RigidTransform2D::fit(
                [VIAL_0, VIAL_17],
                [(homing.vial_0.x_out, homing.vial_0.y), (homing.vial_17.x_out, homing.vial_17.y)],
            ),
            in_plane: RigidTransform2D::fit(
                [VIAL_0, VIAL_17],
                [(homing.vial_0.x_in, homing.vial_0.y), (homing.vial_17.x_in, homing.vial_17.y)],
            ),
            z_out: homing.vial_0.z_out,
            z_in: homing.vial_0.z_in,
            wash_xyz_out: (homing.wash.x_out, homing.wash.y, homing.wash.z_out),
            wash_xyz_in: (homing.wash.x_in, homing.wash.y, homing.wash.z_in),
        }
    }

    pub fn arm_out(&self, quad_xy: (f64, f64)) -> (f64, f64, f64) {
        let (x, y) = self.out_plane.apply(quad_xy);
        (x, y, self.z_out)
    }

    pub fn arm_in(&self, quad_xy: (f64, f64)) -> (f64, f64, f64) {
        let (x, y) = self.in_plane.apply(quad_xy);
        (x, y, self.z_in)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbc_config::ReferencePoint;

    fn homing() -> QuadHoming {
        QuadHoming {
            vial_0: ReferencePoint { x_out: 100.0, x_in: 105.0, y: 200.0, z_out: 10.0, z_in: -5.0 },
            vial_17: ReferencePoint { x_out: 190.0, x_in: 195.0, y: 164.0, z_out: 10.0, z_in: -5.0 },
            wash: ReferencePoint { x_out: 50.0, x_in: 50.0, y: 210.0, z_out: 12.0, z_in: -3.0 },
        }
    }

    #[test]
    fn transform_fidelity_maps_reference_points_exactly() {
        let homing = homing();
        let transform = QuadTransform::fit(&homing);
        let (x0, y0) = transform.out_plane.apply((0.0, 36.0));
        assert!((x0 - homing.vial_0.x_out).abs() < 1e-9);
        assert!((y0 - homing.vial_0.y).abs() < 1e-9);

        let (x17, y17) = transform.out_plane.apply((90.0, 0.0));
        assert!((x17 - homing.vial_17.x_out).abs() < 1e-9);
        assert!((y17 - homing.vial_17.y).abs() < 1e-9);
    }

    #[test]
    fn in_plane_uses_submerged_reference_x() {
        let transform = QuadTransform::fit(&homing());
        let (x0, _, z0) = transform.arm_in((0.0, 36.0));
        assert!((x0 - 105.0).abs() < 1e-9);
        assert_eq!(z0, -5.0);
    }
}
