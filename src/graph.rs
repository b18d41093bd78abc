use crate::error::{Result, SimError};
use crate::lane::Lane;
use crate::math::{midpoint, Point2d};
use crate::queue::PriorityQueue;
use crate::route::{Route, Waypoint, WaypointKind};
use crate::shape::Circle;
use crate::{IntersectionId, LaneId};
use cgmath::MetricSpace;
use slotmap::SecondaryMap;
use std::collections::HashMap;

/// A directed graph of intersections, weighted by lane length.
///
/// The graph is derived from the road network and rebuilt whenever the network changes.
#[derive(Clone, Debug, Default)]
pub struct RouteGraph {
    vertices: SecondaryMap<IntersectionId, Vertex>,
}

#[derive(Clone, Debug)]
struct Vertex {
    /// The centre of the intersection.
    centre: Point2d,
    /// The lane leading to each neighbouring intersection.
    edges: HashMap<IntersectionId, Edge>,
}

#[derive(Clone, Copy, Debug)]
struct Edge {
    lane: LaneId,
    start: Point2d,
    finish: Point2d,
    length: f64,
}

/// The result of a single-source shortest path search.
#[derive(Clone, Debug)]
pub struct ShortestPaths {
    source: IntersectionId,
    distance: SecondaryMap<IntersectionId, f64>,
    parent: SecondaryMap<IntersectionId, (IntersectionId, LaneId)>,
}

impl RouteGraph {
    /// Builds the graph from the network's intersections and lanes.
    ///
    /// Each lane becomes an edge from the intersection containing its start point
    /// to the intersection containing its finish point. Lanes which do not begin
    /// and end inside intersections are ignored, as are intersections no lane touches.
    pub fn new<'a>(
        intersections: impl IntoIterator<Item = (IntersectionId, Circle)>,
        lanes: impl IntoIterator<Item = &'a Lane>,
    ) -> Self {
        let intersections = intersections.into_iter().collect::<Vec<_>>();
        let mut graph = Self::default();

        for lane in lanes {
            let start = intersections.iter().find(|(_, c)| lane.starts_in(c));
            let finish = intersections.iter().find(|(_, c)| lane.finishes_in(c));
            if let (Some(&(from, from_c)), Some(&(to, to_c))) = (start, finish) {
                graph.add_edge((from, from_c.centre), (to, to_c.centre), lane);
            }
        }

        graph
    }

    fn add_edge(
        &mut self,
        (from, from_centre): (IntersectionId, Point2d),
        (to, to_centre): (IntersectionId, Point2d),
        lane: &Lane,
    ) {
        for (id, centre) in [(from, from_centre), (to, to_centre)] {
            if !self.vertices.contains_key(id) {
                self.vertices.insert(
                    id,
                    Vertex {
                        centre,
                        edges: HashMap::new(),
                    },
                );
            }
        }
        let edge = Edge {
            lane: lane.id(),
            start: lane.start(),
            finish: lane.finish(),
            length: lane.length(),
        };
        self.vertices[from].edges.insert(to, edge);
    }

    /// The number of intersections in the graph.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// The number of directed edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.vertices.values().map(|v| v.edges.len()).sum()
    }

    /// Whether the intersection is a vertex of the graph.
    pub fn contains(&self, id: IntersectionId) -> bool {
        self.vertices.contains_key(id)
    }

    /// The lanes leaving an intersection, with the intersection each leads to.
    pub fn edges_from(&self, id: IntersectionId) -> impl Iterator<Item = (IntersectionId, LaneId)> + '_ {
        self.vertices
            .get(id)
            .into_iter()
            .flat_map(|v| v.edges.iter().map(|(to, edge)| (*to, edge.lane)))
    }

    /// Finds the intersection whose centre is closest to `p`.
    pub fn closest_vertex(&self, p: Point2d) -> Option<IntersectionId> {
        self.vertices
            .iter()
            .map(|(id, v)| (id, v.centre.distance2(p)))
            .fold(None, |best: Option<(IntersectionId, f64)>, (id, dist)| match best {
                Some((_, best_dist)) if best_dist <= dist => best,
                _ => Some((id, dist)),
            })
            .map(|(id, _)| id)
    }

    /// Computes the shortest distance from `source` to every reachable intersection.
    pub fn shortest_paths(&self, source: IntersectionId) -> ShortestPaths {
        let mut paths = ShortestPaths {
            source,
            distance: SecondaryMap::new(),
            parent: SecondaryMap::new(),
        };
        if !self.contains(source) {
            return paths;
        }

        let mut queue = PriorityQueue::new();
        paths.distance.insert(source, 0.0);
        queue.add_or_update(source, 0.0);

        while let Some(from) = queue.extract_min() {
            let from_dist = paths.distance[from];
            for (to, edge) in &self.vertices[from].edges {
                let dist = from_dist + edge.length;
                let closer = paths.distance.get(*to).map_or(true, |d| dist < *d);
                if closer {
                    paths.distance.insert(*to, dist);
                    paths.parent.insert(*to, (from, edge.lane));
                    queue.add_or_update(*to, dist);
                }
            }
        }

        paths
    }

    /// The shortest distance between two intersections, if the target is reachable.
    pub fn distance(&self, source: IntersectionId, target: IntersectionId) -> Option<f64> {
        self.shortest_paths(source).distance(target)
    }

    /// Plans a route between two arbitrary points.
    ///
    /// Both points are snapped to their closest intersection. The route visits
    /// the source intersection, then the start, midpoint and finish of every lane
    /// on the shortest path to the target intersection.
    pub fn get_route(&self, start: Point2d, finish: Point2d) -> Result<Route> {
        let source = self.closest_vertex(start).ok_or(SimError::EmptyNetwork)?;
        let target = self.closest_vertex(finish).ok_or(SimError::EmptyNetwork)?;
        let source_waypoint = Waypoint {
            pos: self.vertices[source].centre,
            kind: WaypointKind::Intersection(source),
        };

        let mut route = Route::new();
        if source == target {
            route.push(source_waypoint);
            return Ok(route);
        }

        let paths = self.shortest_paths(source);
        if paths.parent.get(target).is_none() {
            log::warn!("No route from {:?} to {:?}", source, target);
            return Err(SimError::RouteNotFound {
                from: source,
                to: target,
            });
        }

        let mut current = target;
        while current != source {
            let (parent, lane) = paths.parent[current];
            let edge = &self.vertices[parent].edges[&current];
            debug_assert_eq!(edge.lane, lane);
            route.push(Waypoint {
                pos: edge.finish,
                kind: WaypointKind::LaneFinish(lane),
            });
            route.push(Waypoint {
                pos: midpoint(edge.start, edge.finish),
                kind: WaypointKind::LaneMid(lane),
            });
            route.push(Waypoint {
                pos: edge.start,
                kind: WaypointKind::LaneStart(lane),
            });
            current = parent;
        }
        route.push(source_waypoint);

        Ok(route)
    }
}

impl ShortestPaths {
    /// The intersection the search started from.
    pub fn source(&self) -> IntersectionId {
        self.source
    }

    /// The shortest distance to `target`, if it is reachable.
    pub fn distance(&self, target: IntersectionId) -> Option<f64> {
        self.distance.get(target).copied()
    }

    /// The intersection and lane preceding `target` on its shortest path.
    pub fn parent(&self, target: IntersectionId) -> Option<(IntersectionId, LaneId)> {
        self.parent.get(target).copied()
    }
}
