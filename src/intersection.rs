use self::all_way::AllWayStop;
use self::signal::Signal;
use crate::light::{Approach, SignalPhase, SignalTiming};
use crate::math::Point2d;
use crate::route::WaypointKind;
use crate::shape::Circle;
use crate::util::lock;
use crate::vehicle::Vehicle;
use crate::{IntersectionId, LaneId, VehicleId};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

mod all_way;
mod signal;

/// The radius of an intersection's region.
pub const DEFAULT_INTERSECTION_RADIUS: f64 = 4.0;

/// An occupied intersection which has admitted nobody for this long is flagged as stale.
const STALE_ADMISSION: Duration = Duration::from_secs(3);

/// How an intersection decides who may enter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ControlKind {
    /// Anyone may enter at any time.
    Unmanaged,
    /// One vehicle at a time, first come first served.
    AllWayStop,
    /// A timed signal which gives each approach a green in turn.
    Signalized(SignalTiming),
}

/// The admission state of an intersection, for colouring it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AdmissionHint {
    /// No vehicle is inside.
    Clear,
    /// A vehicle is inside.
    Occupied,
    /// A vehicle is inside and nobody has been admitted for a while.
    Stale,
}

/// A circular region of road where vehicles must be admitted before entering.
///
/// Vehicles request entry with [Intersection::take_in] when their bounding circle
/// first overlaps the region and report leaving with [Intersection::kick_out].
/// Arbitrated intersections are driven by their own worker calling
/// [Intersection::arbitrate] on a fixed cadence.
#[derive(Debug)]
pub struct Intersection {
    id: IntersectionId,
    region: Circle,
    state: Mutex<Admission>,
}

#[derive(Debug)]
struct Admission {
    /// The vehicles currently admitted.
    inside: Vec<Arc<Vehicle>>,
    /// When a vehicle was last admitted.
    last_granted: Instant,
    control: Control,
}

#[derive(Debug)]
enum Control {
    Unmanaged,
    AllWayStop(AllWayStop),
    Signalized(Signal),
}

impl Intersection {
    pub(crate) fn new(id: IntersectionId, region: Circle, kind: ControlKind, now: Instant) -> Self {
        let control = match kind {
            ControlKind::Unmanaged => Control::Unmanaged,
            ControlKind::AllWayStop => Control::AllWayStop(AllWayStop::default()),
            ControlKind::Signalized(timing) => {
                Control::Signalized(Signal::new(region.centre, timing, now))
            }
        };
        Self {
            id,
            region,
            state: Mutex::new(Admission {
                inside: vec![],
                last_granted: now,
                control,
            }),
        }
    }

    pub fn id(&self) -> IntersectionId {
        self.id
    }

    /// The region in which admission applies.
    pub fn region(&self) -> Circle {
        self.region
    }

    pub fn centre(&self) -> Point2d {
        self.region.centre
    }

    pub fn kind(&self) -> ControlKind {
        match &lock(&self.state).control {
            Control::Unmanaged => ControlKind::Unmanaged,
            Control::AllWayStop(_) => ControlKind::AllWayStop,
            Control::Signalized(signal) => ControlKind::Signalized(signal.timing()),
        }
    }

    /// Whether the intersection needs a worker to admit vehicles.
    pub fn is_arbitrated(&self) -> bool {
        !matches!(lock(&self.state).control, Control::Unmanaged)
    }

    /// Requests entry for a vehicle arriving at the region while heading for `next_goal`.
    ///
    /// An all-way stop queues and freezes the vehicle unless it is already inside.
    /// A signal queues and freezes it at the approach matching `next_goal`,
    /// or at the default approach if none matches.
    pub fn take_in(&self, vehicle: &Arc<Vehicle>, next_goal: Option<WaypointKind>) {
        let mut state = lock(&self.state);
        let already_inside = state.inside.iter().any(|v| v.id() == vehicle.id());
        match &mut state.control {
            Control::Unmanaged => {}
            Control::AllWayStop(stop) => {
                if !already_inside {
                    stop.enqueue(vehicle.clone());
                    vehicle.freeze();
                }
            }
            Control::Signalized(signal) => {
                signal.enqueue(self.id, vehicle.clone(), next_goal);
                vehicle.freeze();
            }
        }
    }

    /// Admits the next waiting vehicle if the intersection's rules allow it.
    ///
    /// Returns the vehicle admitted. A vehicle which died while waiting is
    /// released from its queue but not admitted.
    pub fn grant_entry(&self, now: Instant) -> Option<VehicleId> {
        let mut state = lock(&self.state);
        let state = &mut *state;
        let vehicle = match &mut state.control {
            Control::Unmanaged => None,
            Control::AllWayStop(stop) => {
                if state.inside.is_empty() {
                    stop.dequeue()
                } else {
                    None
                }
            }
            Control::Signalized(signal) => signal.dequeue_green(self.id, state.inside.first(), now),
        }?;

        vehicle.unfreeze();
        if !vehicle.is_alive() {
            return None;
        }
        state.last_granted = now;
        state.inside.push(vehicle.clone());
        if let Control::AllWayStop(_) = state.control {
            assert!(
                state.inside.len() <= 1,
                "all-way stop {:?} admitted a second vehicle",
                self.id
            );
        }
        log::trace!("{:?} admitted vehicle {}", self.id, vehicle.number());
        Some(vehicle.id())
    }

    /// Records that a vehicle has physically left the region.
    pub fn kick_out(&self, id: VehicleId) {
        lock(&self.state).inside.retain(|v| v.id() != id);
    }

    /// Runs one iteration of the intersection's arbitration loop.
    ///
    /// A resting signal only checks whether anyone is waiting. Otherwise one
    /// vehicle may be admitted, after which a signal whose green has run its
    /// course moves on to the next approach.
    pub fn arbitrate(&self, now: Instant) -> Option<VehicleId> {
        {
            let mut state = lock(&self.state);
            if let Control::Signalized(signal) = &mut state.control {
                if signal.is_resting() {
                    signal.advance(now);
                    return None;
                }
            }
        }

        let admitted = self.grant_entry(now);

        let mut state = lock(&self.state);
        if let Control::Signalized(signal) = &mut state.control {
            if signal.should_advance(now) {
                signal.advance(now);
            }
        }
        admitted
    }

    /// Whether no vehicle is inside.
    pub fn is_clear(&self) -> bool {
        lock(&self.state).inside.is_empty()
    }

    pub fn is_inside(&self, id: VehicleId) -> bool {
        lock(&self.state).inside.iter().any(|v| v.id() == id)
    }

    /// The number of vehicles inside.
    pub fn occupancy(&self) -> usize {
        lock(&self.state).inside.len()
    }

    /// The number of vehicles waiting to be admitted.
    pub fn queued(&self) -> usize {
        match &lock(&self.state).control {
            Control::Unmanaged => 0,
            Control::AllWayStop(stop) => stop.len(),
            Control::Signalized(signal) => signal.queued(),
        }
    }

    /// Whether the vehicle is waiting to be admitted.
    pub fn is_queued(&self, id: VehicleId) -> bool {
        match &lock(&self.state).control {
            Control::Unmanaged => false,
            Control::AllWayStop(stop) => stop.is_queued(id),
            Control::Signalized(signal) => signal.is_queued(id),
        }
    }

    pub fn hint(&self, now: Instant) -> AdmissionHint {
        let state = lock(&self.state);
        if state.inside.is_empty() {
            AdmissionHint::Clear
        } else if now.saturating_duration_since(state.last_granted) > STALE_ADMISSION {
            AdmissionHint::Stale
        } else {
            AdmissionHint::Occupied
        }
    }

    /// The phase of the signal, if this is a signalised intersection.
    pub fn signal_phase(&self, now: Instant) -> Option<SignalPhase> {
        match &lock(&self.state).control {
            Control::Signalized(signal) => Some(signal.phase(now)),
            _ => None,
        }
    }

    /// The approach with the green, if this is an active signal.
    pub fn green_approach(&self) -> Option<Approach> {
        match &lock(&self.state).control {
            Control::Signalized(signal) => signal.green_approach(),
            _ => None,
        }
    }

    /// The position of the light showing the green, if it has one.
    pub fn green_position(&self) -> Option<Point2d> {
        match &lock(&self.state).control {
            Control::Signalized(signal) => signal.green_position(),
            _ => None,
        }
    }

    /// The approaches of a signalised intersection.
    pub fn approaches(&self) -> Vec<Approach> {
        match &lock(&self.state).control {
            Control::Signalized(signal) => signal.approaches().collect(),
            _ => vec![],
        }
    }

    /// Sets up one signal approach per lane finishing inside the region.
    pub(crate) fn configure_approaches(&self, incoming: Vec<(LaneId, Point2d)>) {
        if let Control::Signalized(signal) = &mut lock(&self.state).control {
            signal.configure(incoming);
        }
    }

    pub fn set_signal_timing(&self, timing: SignalTiming) {
        if let Control::Signalized(signal) = &mut lock(&self.state).control {
            signal.set_timing(timing);
        }
    }

    /// Changes how long each approach of a signal keeps its green.
    pub fn set_cycle_duration(&self, cycle: Duration) {
        if let Control::Signalized(signal) = &mut lock(&self.state).control {
            let timing = signal.timing();
            signal.set_timing(SignalTiming { cycle, ..timing });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lane::Lane;
    use slotmap::SlotMap;

    fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    struct Fixture {
        vehicles: SlotMap<VehicleId, ()>,
        lanes: SlotMap<LaneId, Lane>,
        intersection: Intersection,
        t0: Instant,
    }

    impl Fixture {
        fn new(kind: ControlKind) -> Self {
            let mut ids = SlotMap::<IntersectionId, ()>::with_key();
            let t0 = Instant::now();
            let region = Circle::new(Point2d::new(0.0, 0.0), DEFAULT_INTERSECTION_RADIUS);
            Self {
                vehicles: SlotMap::with_key(),
                lanes: SlotMap::with_key(),
                intersection: Intersection::new(ids.insert(()), region, kind, t0),
                t0,
            }
        }

        fn signal(timing: SignalTiming, lanes: usize) -> (Self, Vec<LaneId>) {
            let mut f = Self::new(ControlKind::Signalized(timing));
            let ids = (0..lanes)
                .map(|i| {
                    let finish = Point2d::new(-3.0, i as f64);
                    f.lanes.insert_with_key(|id| {
                        Lane::new(id, Point2d::new(-30.0, i as f64), finish, 1.0)
                    })
                })
                .collect::<Vec<_>>();
            f.intersection
                .configure_approaches(f.lanes.values().map(|l| (l.id(), l.finish())).collect());
            (f, ids)
        }

        fn vehicle(&mut self) -> Arc<Vehicle> {
            let number = self.vehicles.len() + 1;
            Arc::new(Vehicle::new(
                self.vehicles.insert(()),
                number,
                Default::default(),
                Point2d::new(-4.0, 0.0),
                Point2d::new(10.0, 0.0),
                self.t0,
            ))
        }

        fn arrive(&mut self, lane: Option<LaneId>) -> Arc<Vehicle> {
            let vehicle = self.vehicle();
            self.intersection
                .take_in(&vehicle, lane.map(WaypointKind::LaneFinish));
            vehicle
        }

        fn at(&self, ms: u64) -> Instant {
            self.t0 + Duration::from_millis(ms)
        }
    }

    #[test]
    fn unmanaged_admits_freely() {
        let mut f = Fixture::new(ControlKind::Unmanaged);
        let v = f.arrive(None);
        assert!(!v.is_frozen());
        assert_eq!(f.intersection.arbitrate(f.at(10)), None);
        assert!(!f.intersection.is_arbitrated());
        assert_eq!(f.intersection.hint(f.at(10)), AdmissionHint::Clear);
    }

    #[test]
    fn all_way_stop_admits_in_arrival_order() {
        let mut f = Fixture::new(ControlKind::AllWayStop);
        let first = f.arrive(None);
        assert!(first.is_frozen());
        assert_eq!(f.intersection.arbitrate(f.at(0)), Some(first.id()));
        assert!(!first.is_frozen());

        let waiting = (0..5).map(|_| f.arrive(None)).collect::<Vec<_>>();
        assert_eq!(f.intersection.queued(), 5);
        assert_eq!(f.intersection.arbitrate(f.at(10)), None);
        assert!(waiting.iter().all(|v| v.is_frozen()));

        f.intersection.kick_out(first.id());
        for (i, vehicle) in waiting.iter().enumerate() {
            let now = f.at(20 + 10 * i as u64);
            assert_eq!(f.intersection.arbitrate(now), Some(vehicle.id()));
            assert_eq!(f.intersection.arbitrate(now), None);
            assert_eq!(f.intersection.occupancy(), 1);
            assert!(waiting[i + 1..].iter().all(|v| v.is_frozen()));
            f.intersection.kick_out(vehicle.id());
        }
        assert!(f.intersection.is_clear());
    }

    #[test]
    fn all_way_stop_two_vehicles() {
        let mut f = Fixture::new(ControlKind::AllWayStop);
        let v1 = f.arrive(None);
        let v2 = f.arrive(None);
        assert_eq!(f.intersection.arbitrate(f.at(0)), Some(v1.id()));
        for t in 1..20 {
            assert_eq!(f.intersection.arbitrate(f.at(t * 10)), None);
            assert!(v2.is_frozen());
        }
        f.intersection.kick_out(v1.id());
        assert_eq!(f.intersection.arbitrate(f.at(200)), Some(v2.id()));
    }

    #[test]
    fn vehicle_already_inside_is_not_queued_again() {
        let mut f = Fixture::new(ControlKind::AllWayStop);
        let v = f.arrive(None);
        f.intersection.arbitrate(f.at(0));
        f.intersection.take_in(&v, None);
        assert!(!v.is_frozen());
        assert_eq!(f.intersection.queued(), 0);
    }

    #[test]
    fn dead_vehicle_is_released_but_not_admitted() {
        let mut f = Fixture::new(ControlKind::AllWayStop);
        let v1 = f.arrive(None);
        let v2 = f.arrive(None);
        v1.die();
        assert_eq!(f.intersection.arbitrate(f.at(0)), None);
        assert!(!v1.is_frozen());
        assert!(f.intersection.is_clear());
        assert_eq!(f.intersection.arbitrate(f.at(10)), Some(v2.id()));
    }

    #[test]
    fn stale_admission_is_flagged() {
        let mut f = Fixture::new(ControlKind::AllWayStop);
        f.arrive(None);
        f.intersection.arbitrate(f.at(0));
        assert_eq!(f.intersection.hint(f.at(2000)), AdmissionHint::Occupied);
        assert_eq!(f.intersection.hint(f.at(3001)), AdmissionHint::Stale);
    }

    #[test]
    fn dead_vehicle_does_not_hold_off_idle_gap() {
        let (mut f, lanes) = Fixture::signal(SignalTiming::default(), 1);
        let v1 = f.arrive(Some(lanes[0]));
        let v2 = f.arrive(Some(lanes[0]));
        let v3 = f.arrive(Some(lanes[0]));
        f.intersection.arbitrate(f.at(0));
        assert_eq!(f.intersection.grant_entry(f.at(10)), Some(v1.id()));
        f.intersection.kick_out(v1.id());

        v2.die();
        assert_eq!(f.intersection.grant_entry(f.at(1500)), None);
        assert!(!v2.is_frozen());
        assert_eq!(v2.last_green(), None);

        // The last real admission was at 10ms, so the idle gap starts on time.
        assert_eq!(f.intersection.signal_phase(f.at(2100)), Some(SignalPhase::Gap));
        assert_eq!(f.intersection.grant_entry(f.at(2100)), None);
        assert!(v3.is_frozen());
    }

    #[test]
    fn signal_reports_queued_vehicles() {
        let (mut f, lanes) = Fixture::signal(SignalTiming::default(), 2);
        let v1 = f.arrive(Some(lanes[1]));
        let v2 = f.arrive(None);
        assert!(f.intersection.is_queued(v1.id()));
        assert!(f.intersection.is_queued(v2.id()));

        f.intersection.arbitrate(f.at(0));
        assert_eq!(f.intersection.arbitrate(f.at(10)), Some(v2.id()));
        assert!(!f.intersection.is_queued(v2.id()));
        assert!(f.intersection.is_queued(v1.id()));
    }

    #[test]
    fn resting_signal_wakes_for_waiting_vehicle() {
        let (mut f, lanes) = Fixture::signal(SignalTiming::default(), 2);
        assert_eq!(f.intersection.signal_phase(f.at(0)), Some(SignalPhase::Resting));
        assert_eq!(f.intersection.arbitrate(f.at(0)), None);
        assert_eq!(f.intersection.signal_phase(f.at(0)), Some(SignalPhase::Resting));

        let v = f.arrive(Some(lanes[1]));
        assert!(v.is_frozen());
        assert_eq!(f.intersection.arbitrate(f.at(10)), None);
        assert_eq!(f.intersection.green_approach(), Some(Approach::Lane(lanes[1])));
        assert_eq!(f.intersection.green_position(), Some(Point2d::new(-3.0, 1.0)));
        assert_eq!(f.intersection.signal_phase(f.at(20)), Some(SignalPhase::Green));
        assert_eq!(f.intersection.arbitrate(f.at(20)), Some(v.id()));
    }

    #[test]
    fn unknown_goal_waits_at_default_approach() {
        let (mut f, _) = Fixture::signal(SignalTiming::default(), 1);
        let v = f.arrive(None);
        f.intersection.arbitrate(f.at(0));
        assert_eq!(f.intersection.green_approach(), Some(Approach::Default));
        assert_eq!(f.intersection.green_position(), None);
        assert_eq!(f.intersection.arbitrate(f.at(10)), Some(v.id()));
    }

    #[test]
    fn heading_for_centre_waits_at_centre_approach() {
        let (mut f, _) = Fixture::signal(SignalTiming::default(), 1);
        let v = f.vehicle();
        let id = f.intersection.id();
        f.intersection.take_in(&v, Some(WaypointKind::Intersection(id)));
        f.intersection.arbitrate(f.at(0));
        assert_eq!(f.intersection.green_approach(), Some(Approach::Centre));
        assert_eq!(f.intersection.green_position(), Some(f.intersection.centre()));
    }

    #[test]
    fn nothing_is_granted_during_idle_gap() {
        let (mut f, lanes) = Fixture::signal(SignalTiming::default(), 1);
        let v1 = f.arrive(Some(lanes[0]));
        let v2 = f.arrive(Some(lanes[0]));
        f.intersection.arbitrate(f.at(0));
        assert_eq!(f.intersection.grant_entry(f.at(10)), Some(v1.id()));
        f.intersection.kick_out(v1.id());

        assert_eq!(f.intersection.signal_phase(f.at(2100)), Some(SignalPhase::Gap));
        assert_eq!(f.intersection.grant_entry(f.at(2100)), None);
        assert!(v2.is_frozen());
    }

    #[test]
    fn nothing_is_granted_during_natural_gap() {
        let (mut f, lanes) = Fixture::signal(SignalTiming::default(), 1);
        let waiting = (0..6).map(|_| f.arrive(Some(lanes[0]))).collect::<Vec<_>>();
        f.intersection.arbitrate(f.at(0));
        for (i, t) in [10, 2000, 4000, 6000, 8000].into_iter().enumerate() {
            assert_eq!(f.intersection.grant_entry(f.at(t)), Some(waiting[i].id()));
            f.intersection.kick_out(waiting[i].id());
        }
        assert_eq!(f.intersection.signal_phase(f.at(9600)), Some(SignalPhase::Gap));
        assert_eq!(f.intersection.grant_entry(f.at(9600)), None);
        assert!(waiting[5].is_frozen());
    }

    #[test]
    fn green_moves_to_a_waiting_approach() {
        let (mut f, lanes) = Fixture::signal(SignalTiming::default(), 3);
        let v1 = f.arrive(Some(lanes[2]));
        f.intersection.arbitrate(f.at(0));
        assert_eq!(f.intersection.green_approach(), Some(Approach::Lane(lanes[2])));
        assert_eq!(f.intersection.arbitrate(f.at(10)), Some(v1.id()));
        f.intersection.kick_out(v1.id());

        let v2 = f.arrive(Some(lanes[0]));
        let v3 = f.arrive(None);
        // The green wraps past the end of the approaches.
        f.intersection.arbitrate(f.at(10_001));
        assert_eq!(f.intersection.green_approach(), Some(Approach::Default));
        assert_eq!(f.intersection.arbitrate(f.at(10_010)), Some(v3.id()));
        f.intersection.kick_out(v3.id());

        f.intersection.arbitrate(f.at(20_020));
        assert_eq!(f.intersection.green_approach(), Some(Approach::Lane(lanes[0])));
        assert_eq!(f.intersection.arbitrate(f.at(20_030)), Some(v2.id()));
        f.intersection.kick_out(v2.id());

        f.intersection.arbitrate(f.at(30_040));
        assert_eq!(f.intersection.signal_phase(f.at(30_040)), Some(SignalPhase::Resting));
    }

    #[test]
    fn platoon_follows_through_same_green() {
        let (mut f, lanes) = Fixture::signal(SignalTiming::default(), 2);
        let v1 = f.arrive(Some(lanes[0]));
        let v2 = f.arrive(Some(lanes[0]));
        f.intersection.arbitrate(f.at(0));
        assert_eq!(f.intersection.arbitrate(f.at(10)), Some(v1.id()));
        assert_eq!(f.intersection.arbitrate(f.at(20)), Some(v2.id()));
        assert_eq!(f.intersection.occupancy(), 2);
    }

    #[test]
    fn cross_traffic_waits_for_clearance() {
        let (mut f, lanes) = Fixture::signal(SignalTiming::default(), 2);
        let v1 = f.arrive(Some(lanes[0]));
        f.intersection.arbitrate(f.at(0));
        assert_eq!(f.intersection.arbitrate(f.at(10)), Some(v1.id()));

        let v2 = f.arrive(Some(lanes[1]));
        f.intersection.arbitrate(f.at(10_001));
        assert_eq!(f.intersection.green_approach(), Some(Approach::Lane(lanes[1])));
        assert_eq!(f.intersection.arbitrate(f.at(10_010)), None);
        assert!(v2.is_frozen());

        f.intersection.kick_out(v1.id());
        assert_eq!(f.intersection.arbitrate(f.at(10_020)), Some(v2.id()));
    }

    #[test]
    fn short_cycle_gaps_regardless_of_queue() {
        let timing = SignalTiming {
            cycle: ms(1000),
            ..SignalTiming::default()
        };
        let (mut f, lanes) = Fixture::signal(timing, 2);
        let v = f.arrive(Some(lanes[0]));
        f.intersection.arbitrate(f.at(0));
        assert_eq!(f.intersection.signal_phase(f.at(499)), Some(SignalPhase::Yellow));
        assert_eq!(f.intersection.signal_phase(f.at(501)), Some(SignalPhase::Gap));
        assert_eq!(f.intersection.grant_entry(f.at(501)), None);
        assert!(v.is_frozen());
        assert_eq!(f.intersection.queued(), 1);
    }

    #[test]
    fn cycle_duration_can_change() {
        let (f, _) = Fixture::signal(SignalTiming::default(), 0);
        f.intersection.set_cycle_duration(ms(4000));
        assert_eq!(
            f.intersection.kind(),
            ControlKind::Signalized(SignalTiming {
                cycle: ms(4000),
                ..SignalTiming::default()
            })
        );
    }

    #[test]
    fn reconfiguring_keeps_waiting_vehicles() {
        let (mut f, lanes) = Fixture::signal(SignalTiming::default(), 2);
        f.arrive(Some(lanes[0]));
        f.arrive(Some(lanes[1]));
        f.intersection.configure_approaches(vec![(lanes[1], Point2d::new(-3.0, 1.0))]);
        assert_eq!(
            f.intersection.approaches(),
            vec![Approach::Default, Approach::Centre, Approach::Lane(lanes[1])]
        );
        assert_eq!(f.intersection.queued(), 2);
        f.intersection.arbitrate(f.at(0));
        assert_eq!(f.intersection.green_approach(), Some(Approach::Default));
    }
}
