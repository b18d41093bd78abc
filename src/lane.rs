use crate::math::{heading, midpoint, Point2d};
use crate::shape::Circle;
use crate::LaneId;
use cgmath::MetricSpace;

/// The default width of a lane.
pub const DEFAULT_LANE_WIDTH: f64 = 1.0;

/// A directed, straight lane of traffic between two intersections.
#[derive(Clone, Debug)]
pub struct Lane {
    /// The lane ID.
    id: LaneId,
    /// Where the lane begins.
    start: Point2d,
    /// Where the lane ends.
    finish: Point2d,
    /// The width of the lane.
    width: f64,
}

impl Lane {
    /// Creates a new lane.
    pub(crate) fn new(id: LaneId, start: Point2d, finish: Point2d, width: f64) -> Self {
        Self {
            id,
            start,
            finish,
            width,
        }
    }

    /// Gets the lane's ID.
    pub fn id(&self) -> LaneId {
        self.id
    }

    pub fn start(&self) -> Point2d {
        self.start
    }

    pub fn finish(&self) -> Point2d {
        self.finish
    }

    /// The point halfway along the lane.
    pub fn midpoint(&self) -> Point2d {
        midpoint(self.start, self.finish)
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// The direction of travel along the lane, in radians.
    pub fn heading(&self) -> f64 {
        heading(self.start, self.finish)
    }

    /// The length of the lane, which is also its weight when routing.
    pub fn length(&self) -> f64 {
        self.start.distance(self.finish)
    }

    /// Whether the lane begins inside the given region.
    pub fn starts_in(&self, region: &Circle) -> bool {
        region.contains(self.start)
    }

    /// Whether the lane ends inside the given region.
    pub fn finishes_in(&self, region: &Circle) -> bool {
        region.contains(self.finish)
    }
}
