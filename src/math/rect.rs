use super::{Point2d, Vector2d};
use crate::util::Interval;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle, made up of its closed extents along each axis.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rect {
    pub x: Interval<f64>,
    pub y: Interval<f64>,
}

impl Rect {
    /// Creates a rectangle from its minimum corner and size.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x: Interval::new(x, x + width),
            y: Interval::new(y, y + height),
        }
    }

    /// The unit square at the origin.
    pub fn unit() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    /// The square of half-width `radius` centred on `centre`.
    pub fn around(centre: Point2d, radius: f64) -> Self {
        Self {
            x: Interval::disc(centre.x, radius),
            y: Interval::disc(centre.y, radius),
        }
    }

    pub fn width(&self) -> f64 {
        self.x.length()
    }

    pub fn height(&self) -> f64 {
        self.y.length()
    }

    pub fn min(&self) -> Point2d {
        Point2d::new(self.x.min, self.y.min)
    }

    pub fn centre(&self) -> Point2d {
        Point2d::new(self.x.midpoint(), self.y.midpoint())
    }

    /// Returns true if the interiors of the two rectangles overlap.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x.overlaps(&other.x) && self.y.overlaps(&other.y)
    }

    /// Returns true if the point lies inside or on the edge of the rectangle.
    pub fn contains_point(&self, p: Point2d) -> bool {
        self.x.contains(p.x) && self.y.contains(p.y)
    }

    /// Returns true if the other rectangle lies entirely within this one.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        self.x.encloses(&other.x) && self.y.encloses(&other.y)
    }

    /// The smallest rectangle containing both rectangles.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x: self.x.union(&other.x),
            y: self.y.union(&other.y),
        }
    }

    /// The rectangle moved by `offset`.
    pub fn translate(&self, offset: Vector2d) -> Rect {
        Rect {
            x: self.x + offset.x,
            y: self.y + offset.y,
        }
    }

    /// Splits the rectangle into four equal quadrants, ordered
    /// upper-right, upper-left, lower-left, lower-right.
    pub fn quadrants(&self) -> [Rect; 4] {
        let [left, right] = self.x.halves();
        let [lower, upper] = self.y.halves();
        [
            Rect { x: right, y: upper },
            Rect { x: left, y: upper },
            Rect { x: left, y: lower },
            Rect { x: right, y: lower },
        ]
    }
}

impl Default for Rect {
    fn default() -> Self {
        Self::unit()
    }
}
