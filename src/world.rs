use crate::error::{Result, SimError};
use crate::intersection::{AdmissionHint, ControlKind, Intersection};
use crate::light::SignalPhase;
use crate::math::{Point2d, Rect};
use crate::network::{beyond_corner, NetworkIndex, RoadNetwork};
use crate::quadtree::SpatialIndex;
use crate::shape::Circle;
use crate::util::{lock, read, write};
use crate::vehicle::{StepContext, Vehicle, VehicleAttributes, VehicleEntry, VehicleHint};
use crate::{IntersectionId, VehicleId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// The parameters of a [World].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldConfig {
    /// Automatic spawning stops at this many vehicles, and finished vehicles
    /// are retired while the population exceeds it.
    pub max_vehicles: usize,
    /// The time between automatic spawns, or `None` to disable them.
    pub spawn_delay: Option<Duration>,
    /// How far beyond the corners of the network vehicles are spawned.
    pub spawn_distance: f64,
    /// The cadence of the orchestrator.
    pub world_tick: Duration,
    /// The cadence of each vehicle's worker.
    pub vehicle_tick: Duration,
    /// The cadence of each arbitrated intersection's worker.
    pub intersection_tick: Duration,
    /// The attributes given to new vehicles.
    pub vehicle: VehicleAttributes,
    /// Seeds the world's random number generator, for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            max_vehicles: 10,
            spawn_delay: Some(Duration::from_millis(400)),
            spawn_distance: 10.0,
            world_tick: Duration::from_millis(40),
            vehicle_tick: Duration::from_millis(10),
            intersection_tick: Duration::from_millis(10),
            vehicle: VehicleAttributes::default(),
            seed: None,
        }
    }
}

/// Counts of vehicles born and trips completed.
#[derive(Debug, Default)]
pub struct Counters {
    born: AtomicUsize,
    completed: AtomicUsize,
}

impl Counters {
    /// The number of vehicles ever spawned.
    pub fn born(&self) -> usize {
        self.born.load(Ordering::Relaxed)
    }

    /// The number of trips completed.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Zeroes both counters.
    pub fn reset(&self) {
        self.born.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
    }

    /// Counts a birth, returning the newborn's serial number.
    pub(crate) fn record_birth(&self) -> usize {
        self.born.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_completion(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Live counts for display.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Stats {
    /// Vehicles ever spawned.
    pub born: usize,
    /// Trips completed.
    pub completed: usize,
    /// Vehicles currently in the simulation.
    pub active: usize,
    /// Time since the world was created.
    pub elapsed: Duration,
}

/// A read-only view of a vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub number: usize,
    pub position: Point2d,
    pub heading: f64,
    pub speed: f64,
    pub hint: VehicleHint,
    /// Whether the vehicle has reached its goal and awaits a new one.
    pub completed: bool,
}

/// A read-only view of an intersection.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntersectionSnapshot {
    pub id: IntersectionId,
    pub region: Circle,
    pub kind: ControlKind,
    pub hint: AdmissionHint,
    /// The state of the signal, for signalised intersections.
    pub signal: Option<SignalSnapshot>,
}

/// A read-only view of a traffic signal.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SignalSnapshot {
    pub phase: SignalPhase,
    /// Where the light showing the green is, if it has a position.
    pub green: Option<Point2d>,
}

/// A running traffic simulation.
///
/// Once [started](World::start), every vehicle and every arbitrated intersection
/// is driven by its own thread, and an orchestrator thread spawns, reroutes and
/// retires vehicles. Alternatively the world can be driven on the calling thread
/// with [World::step].
pub struct World {
    shared: Arc<Shared>,
}

struct Shared {
    config: WorldConfig,
    network: RwLock<RoadNetwork>,
    /// The network's index as of the last edit.
    index: RwLock<Arc<NetworkIndex>>,
    population: Mutex<Population>,
    /// The positions of all vehicles as of the last orchestrator tick.
    traffic: RwLock<Arc<SpatialIndex<VehicleEntry>>>,
    counters: Counters,
    rng: Mutex<StdRng>,
    running: AtomicBool,
    workers: Mutex<Workers>,
    created: Instant,
}

struct Population {
    vehicles: SlotMap<VehicleId, Arc<Vehicle>>,
    max_vehicles: usize,
    spawn_delay: Option<Duration>,
    last_spawn: Instant,
}

#[derive(Default)]
struct Workers {
    handles: Vec<JoinHandle<()>>,
    /// The intersections which have a worker.
    staffed: HashSet<IntersectionId>,
}

impl World {
    /// Creates a world over the given network. No threads run until [World::start].
    pub fn new(mut network: RoadNetwork, config: WorldConfig) -> Self {
        let now = Instant::now();
        let index = network.index();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let population = Population {
            vehicles: SlotMap::with_key(),
            max_vehicles: config.max_vehicles,
            spawn_delay: config.spawn_delay,
            last_spawn: now,
        };
        Self {
            shared: Arc::new(Shared {
                config,
                network: RwLock::new(network),
                index: RwLock::new(index),
                population: Mutex::new(population),
                traffic: RwLock::new(Arc::new(SpatialIndex::default())),
                counters: Counters::default(),
                rng: Mutex::new(rng),
                running: AtomicBool::new(false),
                workers: Mutex::new(Workers::default()),
                created: now,
            }),
        }
    }

    /// Starts the orchestrator and a worker for every vehicle and arbitrated intersection.
    pub fn start(&self) {
        let shared = &self.shared;
        // Held across the flag flip so a concurrent spawn cannot also staff its vehicle.
        let population = lock(&shared.population);
        if shared.running.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!("Starting world");

        for vehicle in population.vehicles.values() {
            shared.start_vehicle_worker(vehicle.clone());
        }
        drop(population);
        shared.start_intersection_workers();

        let weak = Arc::downgrade(shared);
        let tick = shared.config.world_tick;
        let handle = thread::spawn(move || run_orchestrator(weak, tick));
        lock(&shared.workers).handles.push(handle);
    }

    /// Stops every thread and waits for them to exit.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let handles = {
            let mut workers = lock(&self.shared.workers);
            workers.staffed.clear();
            std::mem::take(&mut workers.handles)
        };
        let count = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                log::warn!("A worker panicked");
            }
        }
        log::info!("Stopped world and joined {} workers", count);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Runs one orchestrator tick, one arbitration of every intersection and one
    /// step of every vehicle, all on the calling thread.
    ///
    /// This drives the world deterministically and should not be mixed with [World::start].
    pub fn step(&self, dt: f64, now: Instant) {
        let shared = &self.shared;
        shared.tick(now);

        let network = shared.network_index();
        for intersection in network.iter_intersections() {
            intersection.arbitrate(now);
        }

        let traffic = shared.traffic();
        let ctx = StepContext {
            network: &network,
            traffic: &traffic,
            counters: &shared.counters,
            now,
        };
        let vehicles = lock(&shared.population)
            .vehicles
            .values()
            .cloned()
            .collect::<Vec<_>>();
        for vehicle in vehicles {
            vehicle.step(dt, &ctx);
        }
    }

    /// Runs one orchestrator tick: refreshes the traffic index, spawns a vehicle
    /// if one is due, and reroutes or retires vehicles which reached their goal.
    pub fn tick(&self, now: Instant) {
        self.shared.tick(now);
    }

    /// Spawns a vehicle at `start`, heading for `destination` or for a random
    /// intersection if none is given.
    pub fn spawn_vehicle(&self, start: Point2d, destination: Option<Point2d>) -> Result<VehicleId> {
        let mut population = lock(&self.shared.population);
        self.shared
            .spawn_vehicle(&mut population, start, destination, Instant::now())
    }

    /// Removes a vehicle from the simulation.
    pub fn remove_vehicle(&self, id: VehicleId) -> Result<()> {
        let mut population = lock(&self.shared.population);
        let vehicle = population
            .vehicles
            .remove(id)
            .ok_or(SimError::UnknownVehicle(id))?;
        vehicle.die();
        self.shared.refresh_traffic(&population);
        log::debug!("Removed vehicle {}", vehicle.number());
        Ok(())
    }

    pub fn set_max_vehicles(&self, max_vehicles: usize) {
        lock(&self.shared.population).max_vehicles = max_vehicles;
    }

    pub fn max_vehicles(&self) -> usize {
        lock(&self.shared.population).max_vehicles
    }

    /// Sets how many vehicles are spawned automatically per second.
    /// A rate of zero, or one too small to represent as a delay, disables automatic spawning.
    pub fn set_spawn_rate(&self, per_second: f64) {
        let mut population = lock(&self.shared.population);
        population.spawn_delay = if per_second > 0.0 {
            Duration::try_from_secs_f64(1.0 / per_second).ok()
        } else {
            None
        };
        population.last_spawn = Instant::now();
    }

    /// The number of vehicles spawned automatically per second.
    pub fn spawn_rate(&self) -> f64 {
        lock(&self.shared.population)
            .spawn_delay
            .map_or(0.0, |delay| 1.0 / delay.as_secs_f64())
    }

    /// Sets how long each approach of every signal keeps its green.
    pub fn set_signal_cycle_duration(&self, ms: u64) {
        read(&self.shared.network).set_cycle_duration(Duration::from_millis(ms));
    }

    /// Enables logging of a vehicle's steering decisions.
    pub fn set_vehicle_logging(&self, id: VehicleId, logging: bool) -> Result<()> {
        let population = lock(&self.shared.population);
        let vehicle = population
            .vehicles
            .get(id)
            .ok_or(SimError::UnknownVehicle(id))?;
        vehicle.set_logging(logging);
        Ok(())
    }

    /// Randomly assigns a top speed factor to each vehicle, which is sampled
    /// from a normal distribution with a mean of 1 and standard deviation of `stddev`.
    pub fn randomise_speed_factors(&self, stddev: f64) {
        let distr = match Normal::new(1.0, stddev) {
            Ok(distr) => distr,
            Err(err) => {
                log::warn!("Cannot randomise speed factors: {}", err);
                return;
            }
        };
        let population = lock(&self.shared.population);
        let mut rng = lock(&self.shared.rng);
        for vehicle in population.vehicles.values() {
            vehicle.set_speed_factor(distr.sample(&mut *rng).clamp(0.75, 1.25));
        }
    }

    /// Applies an edit to the road network, then rebuilds its index once
    /// and staffs any new arbitrated intersections.
    pub fn edit_network<R>(&self, edit: impl FnOnce(&mut RoadNetwork) -> R) -> R {
        let shared = &self.shared;
        let result = {
            let mut network = write(&shared.network);
            let result = edit(&mut *network);
            *write(&shared.index) = network.index();
            result
        };
        if self.is_running() {
            shared.start_intersection_workers();
        }
        result
    }

    /// The network's index as of the last edit.
    pub fn network(&self) -> Arc<NetworkIndex> {
        self.shared.network_index()
    }

    /// The smallest rectangle containing every intersection.
    pub fn bounds(&self) -> Rect {
        self.shared.network_index().bounds()
    }

    /// Snapshots every vehicle in the simulation.
    pub fn vehicles(&self) -> Vec<VehicleSnapshot> {
        lock(&self.shared.population)
            .vehicles
            .values()
            .map(|v| v.snapshot())
            .collect()
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<VehicleSnapshot> {
        lock(&self.shared.population)
            .vehicles
            .get(id)
            .map(|v| v.snapshot())
    }

    /// The waypoints a vehicle has yet to visit.
    pub fn route_of(&self, id: VehicleId) -> Result<Vec<Point2d>> {
        lock(&self.shared.population)
            .vehicles
            .get(id)
            .map(|v| v.remaining_route())
            .ok_or(SimError::UnknownVehicle(id))
    }

    /// Snapshots every intersection in the network.
    pub fn intersections(&self) -> Vec<IntersectionSnapshot> {
        let now = Instant::now();
        self.shared
            .network_index()
            .iter_intersections()
            .map(|i| snapshot_intersection(i, now))
            .collect()
    }

    /// Finds the vehicle covering `p`, as of the last orchestrator tick.
    pub fn vehicle_at(&self, p: Point2d) -> Option<VehicleId> {
        self.shared
            .traffic()
            .query_point(p)
            .into_iter()
            .find(|entry| entry.circle.contains(p))
            .map(|entry| entry.id)
    }

    pub fn vehicle_count(&self) -> usize {
        lock(&self.shared.population).vehicles.len()
    }

    pub fn counters(&self) -> &Counters {
        &self.shared.counters
    }

    pub fn stats(&self) -> Stats {
        Stats {
            born: self.shared.counters.born(),
            completed: self.shared.counters.completed(),
            active: self.vehicle_count(),
            elapsed: self.shared.created.elapsed(),
        }
    }

    /// Gets a dump of the world's current state as JSON.
    #[cfg(feature = "debug")]
    pub fn debug(&self) -> serde_json::Value {
        serde_json::json!({
            "stats": self.stats(),
            "bounds": self.bounds(),
            "vehicles": self.vehicles(),
            "intersections": self.intersections(),
        })
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn network_index(&self) -> Arc<NetworkIndex> {
        read(&self.index).clone()
    }

    fn traffic(&self) -> Arc<SpatialIndex<VehicleEntry>> {
        read(&self.traffic).clone()
    }

    fn tick(self: &Arc<Self>, now: Instant) {
        let mut population = lock(&self.population);
        self.refresh_traffic(&population);
        self.maybe_spawn(&mut population, now);
        self.handle_finished(&mut population);
    }

    fn refresh_traffic(&self, population: &Population) {
        let entries = population
            .vehicles
            .values()
            .filter(|v| v.is_alive())
            .map(|v| v.entry());
        *write(&self.traffic) = Arc::new(SpatialIndex::from_items(entries));
    }

    fn spawn_vehicle(
        self: &Arc<Self>,
        population: &mut Population,
        start: Point2d,
        destination: Option<Point2d>,
        now: Instant,
    ) -> Result<VehicleId> {
        let network = self.network_index();
        let destination = match destination {
            Some(destination) => destination,
            None => network.random_intersection(&mut *lock(&self.rng))?.centre(),
        };

        let circle = Circle::new(start, self.config.vehicle.radius);
        if population
            .vehicles
            .values()
            .any(|v| v.circle().intersects(&circle))
        {
            log::warn!("Cannot spawn a vehicle on top of another at {:?}", start);
            return Err(SimError::InvalidSpawnLocation(start));
        }

        let route = network.route(start, destination)?;
        let number = self.counters.record_birth();
        let attributes = self.config.vehicle;
        let id = population.vehicles.insert_with_key(|id| {
            Arc::new(Vehicle::new(id, number, attributes, start, destination, now))
        });
        let vehicle = population.vehicles[id].clone();
        vehicle.set_route(route, destination);
        self.refresh_traffic(population);
        if self.running.load(Ordering::Acquire) {
            self.start_vehicle_worker(vehicle);
        }
        log::debug!(
            "Spawned vehicle {} at {:?} heading for {:?}",
            number,
            start,
            destination
        );
        Ok(id)
    }

    /// Spawns a vehicle beyond a random corner of the network if one is due.
    fn maybe_spawn(self: &Arc<Self>, population: &mut Population, now: Instant) {
        let delay = match population.spawn_delay {
            Some(delay) => delay,
            None => return,
        };
        if now.saturating_duration_since(population.last_spawn) <= delay
            || population.vehicles.len() >= population.max_vehicles
        {
            return;
        }
        let network = self.network_index();
        if network.is_empty() {
            return;
        }

        let corner = {
            let mut rng = lock(&self.rng);
            (rng.gen::<bool>(), rng.gen::<bool>())
        };
        let p = beyond_corner(network.bounds(), corner, self.config.spawn_distance);
        let covered = population
            .vehicles
            .values()
            .any(|v| v.circle().contains(p));
        if covered {
            return;
        }
        match self.spawn_vehicle(population, p, None, now) {
            Ok(_) => population.last_spawn += delay,
            Err(err) => log::warn!("Automatic spawn at {:?} failed: {}", p, err),
        }
    }

    /// Gives vehicles which reached their goal a new one, or retires them if
    /// the population is over the cap.
    fn handle_finished(&self, population: &mut Population) {
        let over_cap = population.vehicles.len() > population.max_vehicles;
        let network = self.network_index();
        for vehicle in population.vehicles.values() {
            if !vehicle.is_alive() || !vehicle.completed_mission() {
                continue;
            }
            if over_cap {
                vehicle.die();
                log::debug!("Retired vehicle {}", vehicle.number());
                continue;
            }
            let destination = match network.random_intersection(&mut *lock(&self.rng)) {
                Ok(intersection) => intersection.centre(),
                Err(_) => continue,
            };
            match network.route(vehicle.position(), destination) {
                Ok(route) => {
                    vehicle.set_route(route, destination);
                    log::debug!(
                        "Vehicle {} rerouted to {:?}",
                        vehicle.number(),
                        destination
                    );
                }
                Err(err) => log::warn!("Cannot reroute vehicle {}: {}", vehicle.number(), err),
            }
        }
        population.vehicles.retain(|_, v| v.is_alive());
    }

    fn start_vehicle_worker(self: &Arc<Self>, vehicle: Arc<Vehicle>) {
        let weak = Arc::downgrade(self);
        let tick = self.config.vehicle_tick;
        let handle = thread::spawn(move || run_vehicle(weak, vehicle, tick));
        lock(&self.workers).handles.push(handle);
    }

    /// Starts a worker for every arbitrated intersection which lacks one.
    fn start_intersection_workers(self: &Arc<Self>) {
        let network = self.network_index();
        let mut workers = lock(&self.workers);
        for intersection in network.iter_intersections() {
            if !intersection.is_arbitrated() || !workers.staffed.insert(intersection.id()) {
                continue;
            }
            let weak = Arc::downgrade(self);
            let intersection = intersection.clone();
            let tick = self.config.intersection_tick;
            workers
                .handles
                .push(thread::spawn(move || run_intersection(weak, intersection, tick)));
        }
    }
}

fn snapshot_intersection(intersection: &Intersection, now: Instant) -> IntersectionSnapshot {
    let signal = intersection.signal_phase(now).map(|phase| SignalSnapshot {
        phase,
        green: intersection.green_position(),
    });
    IntersectionSnapshot {
        id: intersection.id(),
        region: intersection.region(),
        kind: intersection.kind(),
        hint: intersection.hint(now),
        signal,
    }
}

fn run_vehicle(shared: Weak<Shared>, vehicle: Arc<Vehicle>, tick: Duration) {
    log::debug!("Vehicle {} worker started", vehicle.number());
    let mut last = Instant::now();
    while let Some(shared) = shared.upgrade() {
        if !shared.running.load(Ordering::Acquire) || !vehicle.is_alive() {
            break;
        }
        let now = Instant::now();
        let dt = now.saturating_duration_since(last).as_secs_f64();
        last = now;
        let network = shared.network_index();
        let traffic = shared.traffic();
        vehicle.step(
            dt,
            &StepContext {
                network: &network,
                traffic: &traffic,
                counters: &shared.counters,
                now,
            },
        );
        drop(shared);
        thread::sleep(tick);
    }
    log::debug!("Vehicle {} worker exited", vehicle.number());
}

fn run_intersection(shared: Weak<Shared>, intersection: Arc<Intersection>, tick: Duration) {
    log::debug!("{:?} worker started", intersection.id());
    while let Some(shared) = shared.upgrade() {
        if !shared.running.load(Ordering::Acquire) {
            break;
        }
        drop(shared);
        intersection.arbitrate(Instant::now());
        thread::sleep(tick);
    }
    log::debug!("{:?} worker exited", intersection.id());
}

fn run_orchestrator(shared: Weak<Shared>, tick: Duration) {
    while let Some(shared) = shared.upgrade() {
        if !shared.running.load(Ordering::Acquire) {
            break;
        }
        shared.tick(Instant::now());
        drop(shared);
        thread::sleep(tick);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scenario;

    fn quiet() -> WorldConfig {
        WorldConfig {
            spawn_delay: None,
            seed: Some(7),
            ..WorldConfig::default()
        }
    }

    #[test]
    fn spawning_needs_a_network() {
        let world = World::new(RoadNetwork::new(), quiet());
        assert_eq!(
            world.spawn_vehicle(Point2d::new(0.0, 0.0), None),
            Err(SimError::EmptyNetwork)
        );
        assert_eq!(world.stats().born, 0);
    }

    #[test]
    fn spawning_on_top_of_a_vehicle_fails() {
        let world = World::new(scenario::small_network(), quiet());
        let p = Point2d::new(-10.0, 0.0);
        let id = world.spawn_vehicle(p, Some(Point2d::new(60.0, 0.0))).unwrap();
        assert_eq!(
            world.spawn_vehicle(Point2d::new(-10.2, 0.0), None),
            Err(SimError::InvalidSpawnLocation(Point2d::new(-10.2, 0.0)))
        );
        assert_eq!(world.vehicle_count(), 1);
        assert_eq!(world.vehicle_at(p), Some(id));
        assert_eq!(world.route_of(id).unwrap().last(), Some(&Point2d::new(57.0, -1.0)));
    }

    #[test]
    fn unknown_vehicles_are_reported() {
        let world = World::new(scenario::small_network(), quiet());
        let id = world.spawn_vehicle(Point2d::new(0.0, 0.0), None).unwrap();
        world.remove_vehicle(id).unwrap();
        assert_eq!(world.remove_vehicle(id), Err(SimError::UnknownVehicle(id)));
        assert_eq!(world.set_vehicle_logging(id, true), Err(SimError::UnknownVehicle(id)));
        assert_eq!(world.vehicle_at(Point2d::new(0.0, 0.0)), None);
    }

    #[test]
    fn automatic_spawns_respect_delay_and_cap() {
        let config = WorldConfig {
            max_vehicles: 2,
            spawn_delay: Some(Duration::from_millis(400)),
            seed: Some(1),
            ..WorldConfig::default()
        };
        let world = World::new(scenario::small_network(), config);
        let t0 = Instant::now();
        world.tick(t0);
        assert_eq!(world.vehicle_count(), 0);

        let bounds = world.bounds();
        for i in 1..=10 {
            world.tick(t0 + Duration::from_millis(500 * i));
        }
        let vehicles = world.vehicles();
        assert_eq!(vehicles.len(), 2);
        for vehicle in vehicles {
            assert!(!bounds.contains_point(vehicle.position));
        }
        assert_eq!(world.stats().born, 2);
    }

    #[test]
    fn spawn_rate_round_trips() {
        let world = World::new(scenario::small_network(), quiet());
        assert_eq!(world.spawn_rate(), 0.0);
        world.set_spawn_rate(4.0);
        assert_eq!(world.spawn_rate(), 4.0);
        world.set_spawn_rate(1e-300);
        assert_eq!(world.spawn_rate(), 0.0);
        world.set_spawn_rate(-2.0);
        assert_eq!(world.spawn_rate(), 0.0);
        world.set_max_vehicles(3);
        assert_eq!(world.max_vehicles(), 3);
    }

    #[test]
    fn finished_vehicles_are_retired_over_cap() {
        let world = World::new(scenario::small_network(), quiet());
        let ids = (0..3)
            .map(|i| {
                let p = Point2d::new(30.0, 10.0 * i as f64 - 10.0);
                world.spawn_vehicle(p, Some(p)).unwrap()
            })
            .collect::<Vec<_>>();
        world.set_max_vehicles(1);

        // Each vehicle is at its goal, so its first step completes the trip.
        world.step(0.01, Instant::now());
        assert_eq!(world.counters().completed(), 3);
        world.tick(Instant::now());
        assert_eq!(world.vehicle_count(), 0);
        assert!(ids.iter().all(|id| world.vehicle(*id).is_none()));
    }

    #[test]
    fn finished_vehicles_get_new_goals_under_cap() {
        let world = World::new(scenario::small_network(), quiet());
        let p = Point2d::new(30.0, 0.0);
        let id = world.spawn_vehicle(p, Some(p)).unwrap();
        world.step(0.01, Instant::now());
        assert!(world.vehicle(id).unwrap().completed);
        world.tick(Instant::now());
        assert_eq!(world.vehicle_count(), 1);
        assert!(!world.route_of(id).unwrap().is_empty());
        assert!(!world.vehicle(id).unwrap().completed);
    }

    #[test]
    fn signal_snapshots_report_phase() {
        let world = World::new(scenario::small_network(), quiet());
        let intersections = world.intersections();
        assert_eq!(intersections.len(), 3);
        for snapshot in intersections {
            assert_eq!(snapshot.hint, AdmissionHint::Clear);
            assert_eq!(
                snapshot.signal,
                Some(SignalSnapshot {
                    phase: SignalPhase::Resting,
                    green: None
                })
            );
        }
        world.set_signal_cycle_duration(2000);
        let kinds = world.intersections().into_iter().map(|i| i.kind);
        for kind in kinds {
            match kind {
                ControlKind::Signalized(timing) => assert_eq!(timing.cycle, Duration::from_millis(2000)),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn edits_rebuild_the_index() {
        let world = World::new(scenario::small_network(), quiet());
        let before = world.network();
        let id = world.edit_network(|net| {
            net.add_intersection(ControlKind::AllWayStop, Point2d::new(30.0, 30.0))
        });
        let after = world.network();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(after.intersection(id).is_some());
        assert_eq!(world.intersections().len(), 4);
    }

    #[test]
    fn counters_reset_to_zero() {
        let world = World::new(scenario::small_network(), quiet());
        let p = Point2d::new(30.0, 0.0);
        world.spawn_vehicle(p, Some(p)).unwrap();
        world.step(0.01, Instant::now());
        assert_eq!(world.counters().born(), 1);
        assert_eq!(world.counters().completed(), 1);

        world.counters().reset();
        assert_eq!(world.counters().born(), 0);
        assert_eq!(world.counters().completed(), 0);
        assert_eq!(world.stats().active, 1);

        world.spawn_vehicle(Point2d::new(0.0, 0.0), None).unwrap();
        assert_eq!(world.counters().born(), 1);
    }

    #[test]
    fn spawning_while_starting_gives_one_worker_per_vehicle() {
        for round in 0..20 {
            let world = Arc::new(World::new(scenario::small_network(), quiet()));
            world.set_max_vehicles(100);
            let spawner = {
                let world = world.clone();
                thread::spawn(move || {
                    for i in 0..10 {
                        let p = Point2d::new(-100.0 - 2.0 * i as f64, 100.0);
                        world.spawn_vehicle(p, Some(Point2d::new(0.0, 0.0))).unwrap();
                    }
                })
            };
            world.start();
            spawner.join().unwrap();

            let handles = lock(&world.shared.workers).handles.len();
            // One per vehicle, one per signal and the orchestrator.
            assert_eq!(handles, world.vehicle_count() + 3 + 1, "round {}", round);
            world.stop();
        }
    }

    #[test]
    fn speed_factors_are_clamped() {
        let world = World::new(scenario::small_network(), quiet());
        world.spawn_vehicle(Point2d::new(0.0, 0.0), None).unwrap();
        world.randomise_speed_factors(5.0);
        world.randomise_speed_factors(-1.0);
        assert_eq!(world.vehicle_count(), 1);
    }
}
