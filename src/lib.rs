pub use cgmath;
pub use error::{Result, SimError};
pub use graph::{RouteGraph, ShortestPaths};
pub use intersection::{AdmissionHint, ControlKind, Intersection, DEFAULT_INTERSECTION_RADIUS};
pub use lane::{Lane, DEFAULT_LANE_WIDTH};
pub use light::{Approach, SignalPhase, SignalTiming};
pub use network::{NetworkIndex, RoadNetwork};
pub use quadtree::{Bounded, SpatialIndex};
pub use queue::PriorityQueue;
pub use route::{Route, Waypoint, WaypointKind};
pub use shape::Circle;
use slotmap::new_key_type;
pub use slotmap::{Key, KeyData};
pub use util::Interval;
pub use vehicle::{StepContext, Vehicle, VehicleAttributes, VehicleEntry, VehicleHint};
pub use world::{
    Counters, IntersectionSnapshot, SignalSnapshot, Stats, VehicleSnapshot, World, WorldConfig,
};

mod error;
mod graph;
mod intersection;
mod lane;
mod light;
pub mod math;
mod network;
mod quadtree;
mod queue;
mod route;
pub mod scenario;
mod shape;
mod util;
mod vehicle;
mod world;

new_key_type! {
    /// Unique ID of an [Intersection].
    pub struct IntersectionId;
    /// Unique ID of a [Lane].
    pub struct LaneId;
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}
