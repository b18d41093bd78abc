//! Ready-made road networks.

use crate::intersection::ControlKind;
use crate::lane::DEFAULT_LANE_WIDTH;
use crate::light::SignalTiming;
use crate::math::Point2d;
use crate::network::RoadNetwork;
use itertools::iproduct;
use std::f64::consts::PI;

fn signalized() -> ControlKind {
    ControlKind::Signalized(SignalTiming::default())
}

/// Three signalised intersections in a row, 30 apart, joined by two streets.
pub fn small_network() -> RoadNetwork {
    let mut network = RoadNetwork::new();
    let [one, two, three] =
        [0.0, 30.0, 60.0].map(|x| network.add_intersection(signalized(), Point2d::new(x, 0.0)));
    network.add_two_way_street(one, two, 1.0);
    network.add_two_way_street(three, two, 1.0);
    network
}

/// A ring of `steps` unmanaged intersections of the given radius, each joined to the next.
pub fn circle_network(steps: usize, radius: f64) -> RoadNetwork {
    let mut network = RoadNetwork::new();
    let ids = (0..steps)
        .map(|i| {
            let theta = 2.0 * PI * i as f64 / steps as f64;
            let centre = Point2d::new(radius * theta.cos(), radius * theta.sin());
            network.add_intersection(ControlKind::Unmanaged, centre)
        })
        .collect::<Vec<_>>();
    for i in 0..steps {
        network.add_two_way_street(ids[i], ids[(i + 1) % steps], 0.5 * DEFAULT_LANE_WIDTH);
    }
    network
}

/// A `size` by `size` grid of signalised intersections joined to their neighbours,
/// with one diagonal street per square alternating in direction.
pub fn grid_network(size: usize, spacing: f64) -> RoadNetwork {
    let mut network = RoadNetwork::new();
    let median = 0.5 * DEFAULT_LANE_WIDTH;
    let mut ids = vec![vec![]; size];
    for (i, j) in iproduct!(0..size, 0..size) {
        let centre = Point2d::new(i as f64 * spacing, j as f64 * spacing);
        ids[i].push(network.add_intersection(signalized(), centre));
    }

    for (i, j) in iproduct!(0..size, 1..size) {
        network.add_two_way_street(ids[i][j - 1], ids[i][j], median);
    }
    for (i, j) in iproduct!(1..size, 0..size) {
        network.add_two_way_street(ids[i - 1][j], ids[i][j], median);
    }
    for (i, j) in iproduct!(1..size, 1..size) {
        let (start, finish) = if (i + j) % 2 == 0 {
            (ids[i][j - 1], ids[i - 1][j])
        } else {
            (ids[i - 1][j - 1], ids[i][j])
        };
        network.add_two_way_street(start, finish, median);
    }
    network
}
