use self::following::{look_ahead, SpeedModel};
use self::steering::turn_towards;
use crate::intersection::Intersection;
use crate::light::GreenLight;
use crate::math::{heading, polar, Point2d, Rect};
use crate::network::NetworkIndex;
use crate::quadtree::{Bounded, SpatialIndex};
use crate::route::{Route, Waypoint, WaypointKind};
use crate::shape::Circle;
use crate::util::lock;
use crate::world::{Counters, VehicleSnapshot};
use crate::{IntersectionId, VehicleId};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

mod following;
mod steering;

/// A simulated vehicle.
///
/// A vehicle is shared between its own worker, the orchestrator and the
/// admission queues of the intersections it waits at. Its kinematic state is
/// only mutated by its worker; the flags are shared atomics.
#[derive(Debug)]
pub struct Vehicle {
    /// The vehicle's ID.
    id: VehicleId,
    /// The vehicle's serial number, counting every vehicle ever born.
    number: usize,
    /// The vehicle's physical attributes.
    attributes: VehicleAttributes,
    /// Cleared when the vehicle is removed from the simulation.
    alive: AtomicBool,
    /// Set while the vehicle waits to be admitted to an intersection.
    frozen: AtomicBool,
    /// Set once the vehicle reaches its final goal.
    completed: AtomicBool,
    /// Whether to log the vehicle's steering decisions.
    logging: AtomicBool,
    /// The green the vehicle was last admitted on.
    last_green: Mutex<Option<GreenLight>>,
    /// The kinematic and navigation state.
    state: Mutex<VehicleState>,
}

/// The attributes of a simulated vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VehicleAttributes {
    /// The radius of the vehicle's bounding circle.
    pub radius: f64,
    /// The top speed of the vehicle.
    pub max_speed: f64,
    /// The acceleration of the vehicle when the road ahead is clear.
    pub acceleration: f64,
    /// The fastest the vehicle can turn, in radians per second.
    pub angular_speed: f64,
    /// The vehicle does not steer below this speed.
    pub min_speed_to_turn: f64,
}

impl Default for VehicleAttributes {
    fn default() -> Self {
        Self {
            radius: 0.25,
            max_speed: 5.0,
            acceleration: 30.0,
            angular_speed: 4.0 * PI,
            min_speed_to_turn: 1.0,
        }
    }
}

/// What a vehicle is currently doing, for colouring it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VehicleHint {
    /// Driving with nothing ahead.
    Free,
    /// Slowed by another vehicle ahead.
    Braking,
    /// Stopped, waiting to be admitted to an intersection.
    Frozen,
}

/// A vehicle's entry in the spatial index of moving traffic.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehicleEntry {
    pub id: VehicleId,
    pub circle: Circle,
}

impl Bounded for VehicleEntry {
    fn bounds(&self) -> Rect {
        self.circle.bounds()
    }
}

/// Everything a vehicle reads from the rest of the simulation during a step.
pub struct StepContext<'a> {
    /// The road network.
    pub network: &'a NetworkIndex,
    /// The positions of all vehicles, as of the last orchestrator tick.
    pub traffic: &'a SpatialIndex<VehicleEntry>,
    /// The simulation's counters.
    pub counters: &'a Counters,
    /// The current time.
    pub now: Instant,
}

#[derive(Debug)]
struct VehicleState {
    /// The centre of the vehicle.
    pos: Point2d,
    /// The direction of travel in radians.
    heading: f64,
    /// The speed of the vehicle.
    speed: f64,
    /// A factor applied to the vehicle's top speed.
    speed_factor: f64,
    /// The waypoints still to visit.
    route: Route,
    /// The waypoint most recently reached.
    prev_goal: Option<Waypoint>,
    /// The waypoint currently steered towards.
    next_goal: Option<Waypoint>,
    /// Where the vehicle is ultimately headed.
    final_goal: Point2d,
    /// The intersection the vehicle is in or queued at.
    current_intersection: Option<(IntersectionId, Weak<Intersection>)>,
    /// Whether a vehicle was ahead on the last step.
    following: bool,
    /// When the vehicle last moved.
    last_moved: Instant,
}

impl Vehicle {
    /// Creates a new vehicle at `start`, facing `goal`, with an empty route.
    pub(crate) fn new(
        id: VehicleId,
        number: usize,
        attributes: VehicleAttributes,
        start: Point2d,
        goal: Point2d,
        now: Instant,
    ) -> Self {
        Self {
            id,
            number,
            attributes,
            alive: AtomicBool::new(true),
            frozen: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            logging: AtomicBool::new(false),
            last_green: Mutex::new(None),
            state: Mutex::new(VehicleState {
                pos: start,
                heading: heading(start, goal),
                speed: 0.0,
                speed_factor: 1.0,
                route: Route::new(),
                prev_goal: None,
                next_goal: None,
                final_goal: goal,
                current_intersection: None,
                following: false,
                last_moved: now,
            }),
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The vehicle's serial number.
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn attributes(&self) -> &VehicleAttributes {
        &self.attributes
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Whether the vehicle has reached its final goal.
    pub fn completed_mission(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// The vehicle's bounding circle.
    pub fn circle(&self) -> Circle {
        Circle::new(lock(&self.state).pos, self.attributes.radius)
    }

    pub fn position(&self) -> Point2d {
        lock(&self.state).pos
    }

    pub fn heading(&self) -> f64 {
        lock(&self.state).heading
    }

    pub fn speed(&self) -> f64 {
        lock(&self.state).speed
    }

    /// The waypoints the vehicle has yet to visit, in order.
    pub fn remaining_route(&self) -> Vec<Point2d> {
        lock(&self.state).route.waypoints().map(|w| w.pos).collect()
    }

    /// The waypoint the vehicle is steering towards.
    pub fn next_goal(&self) -> Option<Waypoint> {
        lock(&self.state).next_goal
    }

    /// The waypoint the vehicle reached most recently.
    pub fn prev_goal(&self) -> Option<Waypoint> {
        lock(&self.state).prev_goal
    }

    /// The intersection the vehicle is currently in or queued at.
    pub fn current_intersection(&self) -> Option<IntersectionId> {
        lock(&self.state).current_intersection.as_ref().map(|(id, _)| *id)
    }

    /// How long the vehicle has been standing still.
    pub fn stationary_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(lock(&self.state).last_moved)
    }

    /// Enables logging of the vehicle's steering decisions.
    pub fn set_logging(&self, logging: bool) {
        self.logging.store(logging, Ordering::Relaxed);
    }

    /// Sets the factor applied to the vehicle's top speed.
    pub(crate) fn set_speed_factor(&self, factor: f64) {
        lock(&self.state).speed_factor = factor;
    }

    /// Gives the vehicle a new route and final goal.
    pub(crate) fn set_route(&self, route: Route, final_goal: Point2d) {
        let mut state = lock(&self.state);
        state.route = route;
        state.final_goal = final_goal;
        self.completed.store(false, Ordering::Release);
    }

    /// Halts the vehicle until it is admitted.
    pub(crate) fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub(crate) fn unfreeze(&self) {
        self.frozen.store(false, Ordering::Release);
    }

    pub(crate) fn last_green(&self) -> Option<GreenLight> {
        *lock(&self.last_green)
    }

    pub(crate) fn set_last_green(&self, green: GreenLight) {
        *lock(&self.last_green) = Some(green);
    }

    /// Removes the vehicle from the simulation and relinquishes any intersection it holds.
    /// Its worker stops at the top of its next step.
    pub(crate) fn die(&self) {
        self.alive.store(false, Ordering::Release);
        let mut state = lock(&self.state);
        self.leave_intersection(&mut state);
    }

    /// The vehicle's entry in the traffic index.
    pub(crate) fn entry(&self) -> VehicleEntry {
        VehicleEntry {
            id: self.id,
            circle: self.circle(),
        }
    }

    pub(crate) fn snapshot(&self) -> VehicleSnapshot {
        let state = lock(&self.state);
        let hint = if self.is_frozen() {
            VehicleHint::Frozen
        } else if state.following {
            VehicleHint::Braking
        } else {
            VehicleHint::Free
        };
        VehicleSnapshot {
            id: self.id,
            number: self.number,
            position: state.pos,
            heading: state.heading,
            speed: state.speed,
            hint,
            completed: self.completed_mission(),
        }
    }

    /// Advances the vehicle by `dt` seconds.
    pub fn step(self: &Arc<Self>, dt: f64, ctx: &StepContext) {
        if !self.is_alive() {
            return;
        }
        let mut state = lock(&self.state);
        self.update_goals(&mut state, dt, ctx);
        self.handle_intersections(&mut state, ctx);
        self.moderate_speed(&mut state, dt, ctx);
        self.advance(&mut state, dt, ctx.now);
        if self.circle_of(&state).contains(state.final_goal) {
            self.reach_goal(ctx.counters);
        }
    }

    fn circle_of(&self, state: &VehicleState) -> Circle {
        Circle::new(state.pos, self.attributes.radius)
    }

    /// Steers towards the next waypoint and pops it once reached.
    fn update_goals(&self, state: &mut VehicleState, dt: f64, ctx: &StepContext) {
        let next = match state.route.peek() {
            Some(next) => *next,
            None => {
                self.reach_goal(ctx.counters);
                return;
            }
        };
        state.next_goal = Some(next);

        if !self.is_frozen() && state.speed > self.attributes.min_speed_to_turn {
            let max_turn = dt * self.attributes.angular_speed;
            let heading = turn_towards(state.heading, state.pos, next.pos, max_turn);
            if self.logging.load(Ordering::Relaxed) {
                log::debug!(
                    "Vehicle {} heading {:.2}π -> {:.2}π towards {:?}",
                    self.number,
                    state.heading / PI,
                    heading / PI,
                    next.kind
                );
            }
            state.heading = heading;
        }

        let circle = self.circle_of(state);
        let at_centre = match next.kind {
            WaypointKind::Intersection(id) => ctx
                .network
                .intersection(id)
                .map_or(false, |i| i.region().encloses(&circle)),
            _ => false,
        };
        if circle.contains(next.pos) || at_centre {
            state.prev_goal = state.route.pop();
        }
    }

    /// Requests admission on entering an intersection and gives it up on leaving.
    fn handle_intersections(self: &Arc<Self>, state: &mut VehicleState, ctx: &StepContext) {
        let on = ctx.network.intersection_on(&self.circle_of(state));
        let current = state.current_intersection.as_ref().map(|(id, _)| *id);
        match (current, on) {
            (None, Some(intersection)) => {
                if self.is_alive() {
                    intersection.take_in(self, state.next_goal.map(|w| w.kind));
                    state.current_intersection =
                        Some((intersection.id(), Arc::downgrade(intersection)));
                }
            }
            (Some(current), on) if on.map(|i| i.id()) != Some(current) => {
                self.leave_intersection(state);
            }
            _ => {}
        }
    }

    fn leave_intersection(&self, state: &mut VehicleState) {
        if let Some((_, intersection)) = state.current_intersection.take() {
            if let Some(intersection) = intersection.upgrade() {
                intersection.kick_out(self.id);
            }
        }
    }

    /// Sets the speed from the nearest vehicle ahead, if there is one.
    fn moderate_speed(&self, state: &mut VehicleState, dt: f64, ctx: &StepContext) {
        let model = SpeedModel {
            max_speed: self.attributes.max_speed * state.speed_factor,
            acceleration: self.attributes.acceleration,
        };
        let circle = self.circle_of(state);
        let length = 2.0 * self.attributes.radius;

        let closest = look_ahead(&circle, state.heading)
            .iter()
            .flat_map(|rect| ctx.traffic.query_rect(rect))
            .filter(|other| other.id != self.id)
            .map(|other| circle.distance_to(&other.circle))
            .fold(None, |min: Option<f64>, d| Some(min.map_or(d, |m| m.min(d))));

        state.following = closest.is_some();
        state.speed = match closest {
            Some(dist) => model.follow(dist / length),
            None => model.accelerate(state.speed, dt),
        };
    }

    /// Moves the vehicle along its heading, unless it is frozen.
    fn advance(&self, state: &mut VehicleState, dt: f64, now: Instant) {
        if self.is_frozen() || state.speed <= 0.0 {
            return;
        }
        state.pos += polar(state.speed * dt, state.heading);
        state.last_moved = now;
    }

    fn reach_goal(&self, counters: &Counters) {
        if !self.completed.swap(true, Ordering::AcqRel) {
            counters.record_completion();
            log::debug!("Vehicle {} reached its goal", self.number);
        }
    }
}
