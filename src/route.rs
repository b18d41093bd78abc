use crate::math::Point2d;
use crate::{IntersectionId, LaneId};
use cgmath::MetricSpace;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A point a vehicle steers towards, tagged with the network element it belongs to.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Waypoint {
    /// The world space coordinates of the waypoint.
    pub pos: Point2d,
    /// What the waypoint marks.
    pub kind: WaypointKind,
}

/// What a [Waypoint] marks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WaypointKind {
    /// The centre of an intersection.
    Intersection(IntersectionId),
    /// The start of a lane.
    LaneStart(LaneId),
    /// The midpoint of a lane.
    LaneMid(LaneId),
    /// The end of a lane.
    LaneFinish(LaneId),
}

/// An ordered sequence of waypoints leading to a goal.
///
/// The route is a stack: waypoints are pushed from the goal backwards,
/// so the next waypoint to visit is at the far end. An empty route means
/// the goal has been reached.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Route {
    points: Vec<Waypoint>,
}

impl Route {
    /// Creates an empty route.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Adds a waypoint to be visited before all the others.
    pub fn push(&mut self, waypoint: Waypoint) {
        self.points.push(waypoint);
    }

    /// The next waypoint to visit.
    pub fn peek(&self) -> Option<&Waypoint> {
        self.points.last()
    }

    /// Removes and returns the next waypoint to visit.
    pub fn pop(&mut self) -> Option<Waypoint> {
        self.points.pop()
    }

    /// Iterates over the remaining waypoints in the order they will be visited.
    pub fn waypoints(&self) -> impl Iterator<Item = &Waypoint> + '_ {
        self.points.iter().rev()
    }

    /// The length of the polyline through the remaining waypoints.
    pub fn path_length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| w[0].pos.distance(w[1].pos))
            .sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::IntersectionId;

    fn at(x: f64) -> Waypoint {
        Waypoint {
            pos: Point2d::new(x, 0.0),
            kind: WaypointKind::Intersection(IntersectionId::default()),
        }
    }

    #[test]
    fn route_is_a_stack() {
        let mut route = Route::new();
        route.push(at(3.0));
        route.push(at(1.0));
        route.push(at(0.0));
        assert_eq!(route.peek(), Some(&at(0.0)));
        assert_eq!(
            route.waypoints().map(|w| w.pos.x).collect::<Vec<_>>(),
            vec![0.0, 1.0, 3.0]
        );
        assert_eq!(route.path_length(), 3.0);
        assert_eq!(route.pop(), Some(at(0.0)));
        assert_eq!(route.len(), 2);
    }
}
