//! Types, aliases and helper operations for doing math with `ultraviolet`.
use std::f64::consts::PI;
pub use ultraviolet as uv;

/// A Pose has a rotation and a translation, no scaling.
///
/// This is the transformation type used for every shape in collision queries.
pub type Pose = uv::DIsometry2;
pub type Vec2 = uv::DVec2;
pub type Rotor2 = uv::DRotor2;

/// An angle in either degrees or radians.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum Angle {
    Rad(f64),
    Deg(f64),
}
impl Angle {
    /// Get the angle as degrees.
    #[inline]
    pub fn deg(&self) -> f64 {
        match self {
            Angle::Rad(rad) => rad * 180.0 / PI,
            Angle::Deg(deg) => *deg,
        }
    }

    /// Get the angle as radians.
    #[inline]
    pub fn rad(&self) -> f64 {
        match self {
            Angle::Rad(rad) => *rad,
            Angle::Deg(deg) => deg * PI / 180.0,
        }
    }
}
impl Default for Angle {
    fn default() -> Self {
        Angle::Rad(0.0)
    }
}
impl From<Angle> for Rotor2 {
    #[inline]
    fn from(ang: Angle) -> Rotor2 {
        Rotor2::from_angle(ang.rad())
    }
}
impl From<Rotor2> for Angle {
    #[inline]
    fn from(rotor: Rotor2) -> Self {
        Angle::Rad(-rotor.bv.xy.atan2(rotor.s) * 2.0)
    }
}

// Vec2 utils

#[inline]
pub fn left_normal(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}
#[inline]
pub fn right_normal(v: Vec2) -> Vec2 {
    Vec2::new(v.y, -v.x)
}

/// The 2D cross product, i.e. the z component of the 3D cross product
/// of the vectors extended with z = 0.
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Normalize a vector in place and return its original length.
/// Vectors shorter than `f64::EPSILON` are left untouched and 0 is returned.
#[inline]
pub fn normalize_mut(v: &mut Vec2) -> f64 {
    let length = v.mag();
    if length < f64::EPSILON {
        return 0.0;
    }
    *v = *v * (1.0 / length);
    length
}

// pose utils

/// Transform a point from world space into the local space of a pose.
#[inline]
pub fn inv_transform(pose: &Pose, point: Vec2) -> Vec2 {
    pose.rotation.reversed() * (point - pose.translation)
}

/// Rotate a vector from world space into the local space of a pose, ignoring translation.
#[inline]
pub fn inv_rotate(pose: &Pose, v: Vec2) -> Vec2 {
    pose.rotation.reversed() * v
}

/// The pose of `b` relative to `a`, i.e. a transform from `b`'s local space into `a`'s.
#[inline]
pub fn relative_pose(a: &Pose, b: &Pose) -> Pose {
    a.inversed() * *b
}

//
// Sweep
//

/// The motion of a body over a time step, used in continuous collision detection.
///
/// The body's center of mass moves linearly from `c0` to `c1`
/// and its angle changes linearly from `a0` to `a1`.
/// Shapes are defined relative to the body origin, which may differ from the center of mass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sweep {
    /// Center of mass in body-local space.
    pub local_center: Vec2,
    /// World-space center of mass at time `alpha0`.
    pub c0: Vec2,
    /// World-space center of mass at the end of the step.
    pub c1: Vec2,
    /// Angle in radians at time `alpha0`.
    pub a0: f64,
    /// Angle in radians at the end of the step.
    pub a1: f64,
    /// Fraction of the current time step in the range [0,1].
    /// `c0` and `a0` are the positions at this time.
    pub alpha0: f64,
}

impl Sweep {
    /// A sweep that moves the body's center from `c0` to `c1` without rotating,
    /// with the center of mass at the body origin.
    pub fn linear(c0: Vec2, c1: Vec2) -> Self {
        Self {
            local_center: Vec2::zero(),
            c0,
            c1,
            a0: 0.0,
            a1: 0.0,
            alpha0: 0.0,
        }
    }

    /// Get the interpolated body pose at a specific time.
    ///
    /// `beta` is a factor in [0,1], where 0 indicates `alpha0`.
    pub fn transform(&self, beta: f64) -> Pose {
        let center = (1.0 - beta) * self.c0 + beta * self.c1;
        let angle = (1.0 - beta) * self.a0 + beta * self.a1;
        let rotation = Rotor2::from_angle(angle);
        // shift to origin
        let translation = center - rotation * self.local_center;
        Pose::new(translation, rotation)
    }

    /// Advance the sweep forward, yielding a new initial state.
    ///
    /// `alpha` is the new initial time.
    pub fn advance(&mut self, alpha: f64) {
        debug_assert!(self.alpha0 < 1.0);
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 += beta * (self.c1 - self.c0);
        self.a0 += beta * (self.a1 - self.a0);
        self.alpha0 = alpha;
    }

    /// Normalize the angles to the range [0, 2pi) relative to `a0`.
    pub fn normalize(&mut self) {
        let two_pi = 2.0 * PI;
        let d = two_pi * (self.a0 / two_pi).floor();
        self.a0 -= d;
        self.a1 -= d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_interpolates_center_and_angle() {
        let sweep = Sweep {
            local_center: Vec2::new(1.0, 0.0),
            c0: Vec2::new(0.0, 0.0),
            c1: Vec2::new(4.0, 2.0),
            a0: 0.0,
            a1: PI,
            alpha0: 0.0,
        };

        let start = sweep.transform(0.0);
        assert!((start.translation - Vec2::new(-1.0, 0.0)).mag() < 1e-12);

        let mid = sweep.transform(0.5);
        // center of mass is at (2, 1) and the local center is rotated by 90 degrees
        let center = mid * Vec2::new(1.0, 0.0);
        assert!((center - Vec2::new(2.0, 1.0)).mag() < 1e-12);
        assert!((Angle::from(mid.rotation).rad().abs() - PI / 2.0).abs() < 1e-9);
    }

    #[test]
    fn sweep_advance_moves_start() {
        let mut sweep = Sweep::linear(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));
        sweep.advance(0.5);
        assert_eq!(sweep.alpha0, 0.5);
        assert!((sweep.c0.x - 5.0).abs() < 1e-12);
        // the rest of the motion now maps onto [0,1] again
        let end = sweep.transform(1.0);
        assert!((end.translation.x - 10.0).abs() < 1e-12);
    }

    #[test]
    fn sweep_normalize_keeps_relative_angle() {
        let mut sweep = Sweep {
            a0: 7.0 * PI,
            a1: 7.5 * PI,
            ..Sweep::linear(Vec2::zero(), Vec2::zero())
        };
        sweep.normalize();
        assert!(sweep.a0 >= 0.0 && sweep.a0 < 2.0 * PI);
        assert!((sweep.a1 - sweep.a0 - 0.5 * PI).abs() < 1e-12);
    }

    #[test]
    fn inverse_transform_roundtrip() {
        let pose = Pose::new(Vec2::new(3.0, -2.0), Rotor2::from_angle(0.7));
        let p = Vec2::new(0.25, 4.0);
        let back = inv_transform(&pose, pose * p);
        assert!((back - p).mag() < 1e-12);
    }
}
