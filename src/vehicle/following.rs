use crate::math::{polar, Rect};
use crate::quadtree::Bounded;
use crate::shape::Circle;
use arrayvec::ArrayVec;

/// The number of vehicle-length boxes stacked ahead of a vehicle when looking for traffic.
pub const LOOK_AHEAD_LENGTHS: usize = 6;

/// At or below this gap to the vehicle ahead, in vehicle lengths, the vehicle stops.
const ZERO_SPEED_LENGTHS: f64 = 2.0;

/// At or beyond this gap to the vehicle ahead, in vehicle lengths, the vehicle drives at full speed.
const MAX_SPEED_LENGTHS: f64 = 10.0;

/// The car following model of a vehicle.
#[derive(Clone, Copy, Debug)]
pub struct SpeedModel {
    /// The top speed of the vehicle.
    pub max_speed: f64,
    /// The acceleration of the vehicle when the road ahead is clear.
    pub acceleration: f64,
}

impl SpeedModel {
    /// The speed to drive at when the vehicle ahead is `gap` vehicle lengths away.
    /// Scales linearly from zero at the minimum following distance to full speed
    /// at the clear distance.
    pub fn follow(&self, gap: f64) -> f64 {
        let t = (gap - ZERO_SPEED_LENGTHS) / (MAX_SPEED_LENGTHS - ZERO_SPEED_LENGTHS);
        (self.max_speed * t).clamp(0.0, self.max_speed)
    }

    /// The speed after accelerating freely for `dt` seconds.
    pub fn accelerate(&self, speed: f64, dt: f64) -> f64 {
        f64::min(speed + dt * self.acceleration, self.max_speed)
    }
}

/// The boxes scanned for traffic ahead of a vehicle: its own bounding box
/// repeated at whole vehicle lengths along its heading.
pub fn look_ahead(circle: &Circle, heading: f64) -> ArrayVec<Rect, LOOK_AHEAD_LENGTHS> {
    let bounds = circle.bounds();
    let length = 2.0 * circle.radius;
    (0..LOOK_AHEAD_LENGTHS)
        .map(|i| bounds.translate(polar(i as f64 * length, heading)))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::Point2d;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn following_speed() {
        let model = SpeedModel {
            max_speed: 5.0,
            acceleration: 30.0,
        };
        assert_approx_eq!(model.follow(1.0), 0.0);
        assert_approx_eq!(model.follow(2.0), 0.0);
        assert_approx_eq!(model.follow(6.0), 2.5);
        assert_approx_eq!(model.follow(12.0), 5.0);
        assert_approx_eq!(model.accelerate(0.0, 0.1), 3.0);
        assert_approx_eq!(model.accelerate(4.0, 0.1), 5.0);
    }

    #[test]
    fn look_ahead_boxes_follow_heading() {
        let circle = Circle::new(Point2d::new(0.0, 0.0), 0.25);
        let boxes = look_ahead(&circle, std::f64::consts::FRAC_PI_2);
        assert_eq!(boxes.len(), LOOK_AHEAD_LENGTHS);
        assert_approx_eq!(boxes[0].centre().y, 0.0);
        assert_approx_eq!(boxes[5].centre().y, 2.5);
        assert_approx_eq!(boxes[5].centre().x, 0.0);
    }
}
