use super::{Point2d, Vector2d};
use cgmath::prelude::*;
use std::f64::consts::PI;

/// Rotates a vector 90 degrees counter-clockwise.
pub fn rot90(vec: Vector2d) -> Vector2d {
    Vector2d::new(-vec.y, vec.x)
}

/// The direction from `from` to `to` as an angle in radians.
pub fn heading(from: Point2d, to: Point2d) -> f64 {
    (to.y - from.y).atan2(to.x - from.x)
}

/// A vector of the given length pointing along `angle`.
pub fn polar(length: f64, angle: f64) -> Vector2d {
    Vector2d::new(length * angle.cos(), length * angle.sin())
}

/// The point halfway between `a` and `b`.
pub fn midpoint(a: Point2d, b: Point2d) -> Point2d {
    a.midpoint(b)
}

/// The signed angle to turn from heading `from` to reach heading `to`,
/// normalised into `(-PI, PI]`. Positive values are counter-clockwise.
pub fn angle_diff(to: f64, from: f64) -> f64 {
    let diff = (to - from).rem_euclid(2.0 * PI);
    if diff > PI {
        diff - 2.0 * PI
    } else {
        diff
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn angle_diff_takes_short_way_round() {
        assert_approx_eq!(angle_diff(0.1, -0.1), 0.2);
        assert_approx_eq!(angle_diff(-0.1, 0.1), -0.2);
        assert_approx_eq!(angle_diff(PI - 0.1, -PI + 0.1), -0.2);
        assert_approx_eq!(angle_diff(3.0 * PI, 0.0), PI);
    }

    #[test]
    fn heading_and_polar_agree() {
        let a = Point2d::new(1.0, 1.0);
        let b = Point2d::new(1.0, 3.0);
        let v = polar(2.0, heading(a, b));
        assert_approx_eq!(v.x, 0.0);
        assert_approx_eq!(v.y, 2.0);
        assert_eq!(midpoint(a, b), Point2d::new(1.0, 2.0));
    }
}
