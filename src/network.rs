use crate::error::{Result, SimError};
use crate::graph::RouteGraph;
use crate::intersection::{ControlKind, Intersection, DEFAULT_INTERSECTION_RADIUS};
use crate::lane::{Lane, DEFAULT_LANE_WIDTH};
use crate::light::SignalTiming;
use crate::math::{rot90, Point2d, Rect, Vector2d};
use crate::quadtree::{Bounded, SpatialIndex};
use crate::route::Route;
use crate::shape::Circle;
use crate::{IntersectionId, LaneId};
use cgmath::{InnerSpace, MetricSpace};
use rand::seq::IteratorRandom;
use rand::Rng;
use slotmap::{SecondaryMap, SlotMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How far into each intersection a street's lanes begin and end, as a fraction of its radius.
const LANE_REACH: f64 = 0.75;

/// The road network: intersections joined by directed lanes.
///
/// Everything derived from the layout (the route graph, the spatial index of
/// intersections, the bounds and the approaches of each signal) lives in a
/// [NetworkIndex], which is rebuilt after the layout changes.
#[derive(Debug)]
pub struct RoadNetwork {
    /// The intersections in the network.
    intersections: SlotMap<IntersectionId, Arc<Intersection>>,
    /// The lanes in the network.
    lanes: SlotMap<LaneId, Lane>,
    /// The index as of the last rebuild.
    index: Arc<NetworkIndex>,
    /// Set when the layout has changed since the last rebuild.
    stale: bool,
}

/// An immutable snapshot of the network's derived data, shared with every worker.
#[derive(Debug)]
pub struct NetworkIndex {
    graph: RouteGraph,
    tree: SpatialIndex<IntersectionEntry>,
    intersections: SecondaryMap<IntersectionId, Arc<Intersection>>,
    bounds: Rect,
}

#[derive(Clone, Copy, Debug)]
struct IntersectionEntry {
    id: IntersectionId,
    region: Circle,
}

impl Bounded for IntersectionEntry {
    fn bounds(&self) -> Rect {
        self.region.bounds()
    }
}

impl RoadNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self {
            intersections: SlotMap::with_key(),
            lanes: SlotMap::with_key(),
            index: Arc::new(NetworkIndex::empty()),
            stale: false,
        }
    }

    /// Adds an intersection of the default radius centred at `centre`.
    pub fn add_intersection(&mut self, kind: ControlKind, centre: Point2d) -> IntersectionId {
        let region = Circle::new(centre, DEFAULT_INTERSECTION_RADIUS);
        let now = Instant::now();
        self.stale = true;
        self.intersections
            .insert_with_key(|id| Arc::new(Intersection::new(id, region, kind, now)))
    }

    /// Adds a single lane from `start` to `finish`.
    pub fn add_lane(&mut self, start: Point2d, finish: Point2d) -> LaneId {
        self.stale = true;
        self.lanes
            .insert_with_key(|id| Lane::new(id, start, finish, DEFAULT_LANE_WIDTH))
    }

    /// Joins two intersections with one lane in each direction.
    ///
    /// The lanes reach three quarters of the way into each intersection and
    /// keep to the right, separated by `median`. Returns the lane from `a` to `b`,
    /// then the lane from `b` to `a`.
    pub fn add_two_way_street(
        &mut self,
        a: IntersectionId,
        b: IntersectionId,
        median: f64,
    ) -> (LaneId, LaneId) {
        let (a, b) = (self.intersections[a].region(), self.intersections[b].region());
        let dir = (b.centre - a.centre).normalize();
        let a_end = a.centre + dir * (a.radius * LANE_REACH);
        let b_end = b.centre - dir * (b.radius * LANE_REACH);
        let offset: Vector2d = -rot90(dir) * (0.5 * DEFAULT_LANE_WIDTH + 0.5 * median);

        let forward = self.add_lane(a_end + offset, b_end + offset);
        let backward = self.add_lane(b_end - offset, a_end - offset);
        (forward, backward)
    }

    pub fn intersection(&self, id: IntersectionId) -> Option<&Arc<Intersection>> {
        self.intersections.get(id)
    }

    pub fn lane(&self, id: LaneId) -> Option<&Lane> {
        self.lanes.get(id)
    }

    /// Returns an iterator over all the intersections in the network.
    pub fn iter_intersections(&self) -> impl Iterator<Item = &Arc<Intersection>> {
        self.intersections.values()
    }

    /// Returns an iterator over all the lanes in the network.
    pub fn iter_lanes(&self) -> impl Iterator<Item = &Lane> {
        self.lanes.values()
    }

    /// Finds the intersection whose centre is closest to `p`.
    pub fn closest_intersection(&self, p: Point2d) -> Option<IntersectionId> {
        self.intersections
            .iter()
            .min_by(|(_, a), (_, b)| {
                a.centre()
                    .distance2(p)
                    .total_cmp(&b.centre().distance2(p))
            })
            .map(|(id, _)| id)
    }

    /// Sets the timing of every signalised intersection.
    pub fn set_signal_timing(&self, timing: SignalTiming) {
        for intersection in self.intersections.values() {
            intersection.set_signal_timing(timing);
        }
    }

    /// Sets how long each approach of every signal keeps its green.
    pub fn set_cycle_duration(&self, cycle: Duration) {
        for intersection in self.intersections.values() {
            intersection.set_cycle_duration(cycle);
        }
    }

    /// Gets the network's index, rebuilding it first if the layout has changed.
    pub fn index(&mut self) -> Arc<NetworkIndex> {
        if self.stale {
            self.rebuild();
        }
        self.index.clone()
    }

    fn rebuild(&mut self) {
        for intersection in self.intersections.values() {
            let region = intersection.region();
            let incoming = self
                .lanes
                .values()
                .filter(|lane| lane.finishes_in(&region))
                .map(|lane| (lane.id(), lane.finish()))
                .collect();
            intersection.configure_approaches(incoming);
        }
        self.index = Arc::new(NetworkIndex::new(&self.intersections, &self.lanes));
        self.stale = false;
        log::info!(
            "Rebuilt network index: {} intersections, {} lanes, {} routable",
            self.intersections.len(),
            self.lanes.len(),
            self.index.graph.vertex_count()
        );
    }
}

impl Default for RoadNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkIndex {
    fn empty() -> Self {
        Self {
            graph: RouteGraph::default(),
            tree: SpatialIndex::new(Rect::unit()),
            intersections: SecondaryMap::new(),
            bounds: Rect::unit(),
        }
    }

    fn new(
        intersections: &SlotMap<IntersectionId, Arc<Intersection>>,
        lanes: &SlotMap<LaneId, Lane>,
    ) -> Self {
        let regions = intersections
            .iter()
            .map(|(id, i)| (id, i.region()))
            .collect::<Vec<_>>();
        let graph = RouteGraph::new(regions.iter().copied(), lanes.values());
        let tree = SpatialIndex::from_items(
            regions
                .iter()
                .map(|&(id, region)| IntersectionEntry { id, region }),
        );
        let bounds = regions
            .iter()
            .map(|(_, region)| region.bounds())
            .reduce(|a, b| a.union(&b))
            .unwrap_or_else(Rect::unit);
        Self {
            graph,
            tree,
            intersections: intersections.iter().map(|(id, i)| (id, i.clone())).collect(),
            bounds,
        }
    }

    /// The graph used for routing.
    pub fn graph(&self) -> &RouteGraph {
        &self.graph
    }

    /// The smallest rectangle containing every intersection.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn intersection(&self, id: IntersectionId) -> Option<&Arc<Intersection>> {
        self.intersections.get(id)
    }

    pub fn iter_intersections(&self) -> impl Iterator<Item = &Arc<Intersection>> {
        self.intersections.values()
    }

    /// The number of intersections.
    pub fn len(&self) -> usize {
        self.intersections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intersections.is_empty()
    }

    /// Finds an intersection whose region overlaps `circle`.
    pub fn intersection_on(&self, circle: &Circle) -> Option<&Arc<Intersection>> {
        self.tree
            .query_rect(&circle.bounds())
            .into_iter()
            .find(|entry| entry.region.intersects(circle))
            .and_then(|entry| self.intersections.get(entry.id))
    }

    /// Plans a route between two points.
    pub fn route(&self, start: Point2d, finish: Point2d) -> Result<Route> {
        self.graph.get_route(start, finish)
    }

    /// Picks an intersection uniformly at random.
    pub fn random_intersection(&self, rng: &mut impl Rng) -> Result<&Arc<Intersection>> {
        self.intersections
            .values()
            .choose(rng)
            .ok_or(SimError::EmptyNetwork)
    }

    /// Picks a point uniformly at random within the network's bounds.
    pub fn random_point(&self, rng: &mut impl Rng) -> Point2d {
        let Rect { x, y } = self.bounds;
        Point2d::new(
            x.min + rng.gen::<f64>() * x.length(),
            y.min + rng.gen::<f64>() * y.length(),
        )
    }
}

/// The point `distance` beyond the corner of `bounds` in the given quadrant,
/// along both axes.
pub(crate) fn beyond_corner(bounds: Rect, (right, up): (bool, bool), distance: f64) -> Point2d {
    let sign = |positive: bool| if positive { 1.0 } else { -1.0 };
    let centre = bounds.centre();
    centre
        + Vector2d::new(
            sign(right) * (0.5 * bounds.width() + distance),
            sign(up) * (0.5 * bounds.height() + distance),
        )
}
