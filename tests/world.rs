//! Tests that drive a whole world, stepped or threaded.

use std::thread;
use std::time::{Duration, Instant};
use traffic_arbiter::{
    math::Point2d, scenario, AdmissionHint, ControlKind, RoadNetwork, VehicleHint, World,
    WorldConfig,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn quiet(seed: u64) -> WorldConfig {
    WorldConfig {
        spawn_delay: None,
        seed: Some(seed),
        ..WorldConfig::default()
    }
}

/// Test that a single vehicle crosses three signalised intersections to its goal.
#[test]
fn vehicle_crosses_signals() {
    init_logging();
    let world = World::new(scenario::small_network(), quiet(1));
    let id = world
        .spawn_vehicle(Point2d::new(-10.0, 0.0), Some(Point2d::new(60.0, 0.0)))
        .unwrap();

    let mut now = Instant::now();
    let mut was_frozen = false;
    for _ in 0..6000 {
        now += Duration::from_millis(10);
        world.step(0.01, now);
        let vehicle = world.vehicle(id).unwrap();
        was_frozen |= vehicle.hint == VehicleHint::Frozen;
        if world.counters().completed() > 0 {
            break;
        }
    }
    assert_eq!(world.counters().completed(), 1);
    assert!(was_frozen);
    assert!(world.vehicle(id).unwrap().position.x > 50.0);
}

/// Test that all-way stops admit one vehicle at a time under real concurrency.
#[test]
fn threaded_all_way_stops_stay_exclusive() {
    init_logging();
    let mut network = RoadNetwork::new();
    let centres = [(0.0, 0.0), (30.0, 0.0), (30.0, 30.0), (0.0, 30.0)];
    let ids = centres.map(|(x, y)| network.add_intersection(ControlKind::AllWayStop, Point2d::new(x, y)));
    for i in 0..ids.len() {
        network.add_two_way_street(ids[i], ids[(i + 1) % ids.len()], 0.5);
    }
    let world = World::new(network, quiet(9));

    // Four vehicles converge on each stop from all sides. Finished vehicles
    // are retired straight away, which frees the stop for the next one.
    world.set_max_vehicles(0);
    let offsets = [(-6.0, 0.0), (6.0, 0.0), (0.0, -6.0), (0.0, 6.0)];
    for (x, y) in centres {
        let centre = Point2d::new(x, y);
        for (dx, dy) in offsets {
            let start = Point2d::new(x + dx, y + dy);
            world.spawn_vehicle(start, Some(centre)).unwrap();
        }
    }
    let total = centres.len() * offsets.len();

    world.start();
    assert!(world.is_running());
    let mut max_occupancy = 0;
    let mut max_queued = 0;
    let deadline = Instant::now() + Duration::from_secs(20);
    while Instant::now() < deadline && world.counters().completed() < total {
        for intersection in world.network().iter_intersections() {
            let occupancy = intersection.occupancy();
            assert!(occupancy <= 1);
            max_occupancy = max_occupancy.max(occupancy);
            max_queued = max_queued.max(intersection.queued());
        }
        thread::sleep(Duration::from_millis(1));
    }
    thread::sleep(Duration::from_millis(200));
    world.stop();
    assert!(!world.is_running());

    assert_eq!(max_occupancy, 1);
    assert!(max_queued >= 2);
    let stats = world.stats();
    assert_eq!(stats.born, total);
    assert_eq!(stats.completed, total);
    assert_eq!(stats.active, 0);
    assert!(world
        .intersections()
        .iter()
        .all(|i| i.kind == ControlKind::AllWayStop && i.hint == AdmissionHint::Clear));
}

/// Test that a threaded world on a ring retires finished vehicles down to the
/// cap and gives the rest new goals.
#[test]
fn threaded_ring_respects_cap() {
    init_logging();
    let world = World::new(scenario::circle_network(8, 30.0), quiet(3));
    let centres = world
        .network()
        .iter_intersections()
        .map(|i| i.centre())
        .take(4)
        .collect::<Vec<_>>();
    // Each vehicle starts further inside the ring than the last, so they
    // finish one at a time: the first two are retired, the rest rerouted.
    for (i, centre) in centres.iter().enumerate() {
        let scale = 0.8 - 0.2 * i as f64;
        let start = Point2d::new(scale * centre.x, scale * centre.y);
        world.spawn_vehicle(start, Some(*centre)).unwrap();
    }
    world.set_max_vehicles(2);

    world.start();
    let deadline = Instant::now() + Duration::from_secs(20);
    while Instant::now() < deadline
        && (world.vehicle_count() > 2 || world.counters().completed() < 4)
    {
        thread::sleep(Duration::from_millis(10));
    }
    world.stop();

    assert_eq!(world.vehicle_count(), 2);
    assert!(world.stats().completed >= 4);
    assert_eq!(world.stats().born, 4);
    for snapshot in world.intersections() {
        assert_eq!(snapshot.hint, AdmissionHint::Clear);
        assert_eq!(snapshot.signal, None);
    }
    // Restarting after a stop brings the workers back.
    world.start();
    thread::sleep(Duration::from_millis(50));
    world.stop();
    assert_eq!(world.vehicle_count(), 2);
}
