use crate::math::{Point2d, Rect};
use crate::quadtree::Bounded;
use cgmath::MetricSpace;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A circular region, the base shape of every simulated entity.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Circle {
    /// The centre of the circle.
    pub centre: Point2d,
    /// The radius of the circle.
    pub radius: f64,
}

impl Circle {
    pub fn new(centre: Point2d, radius: f64) -> Self {
        Self { centre, radius }
    }

    /// Returns true if the point lies strictly inside the circle.
    pub fn contains(&self, p: Point2d) -> bool {
        self.centre.distance2(p) < self.radius * self.radius
    }

    /// Returns true if the other circle lies strictly inside this one.
    pub fn encloses(&self, other: &Circle) -> bool {
        self.centre.distance(other.centre) + other.radius < self.radius
    }

    /// Returns true if the two circles overlap.
    pub fn intersects(&self, other: &Circle) -> bool {
        self.centre.distance(other.centre) < self.radius + other.radius
    }

    pub fn distance_to(&self, other: &Circle) -> f64 {
        self.centre.distance(other.centre)
    }
}

impl Bounded for Circle {
    fn bounds(&self) -> Rect {
        Rect::around(self.centre, self.radius)
    }
}
