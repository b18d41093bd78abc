use crate::light::{Approach, GreenLight, SignalClock, SignalPhase, SignalTiming};
use crate::math::Point2d;
use crate::route::WaypointKind;
use crate::util::rotated_range;
use crate::vehicle::Vehicle;
use crate::{IntersectionId, LaneId, VehicleId};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

/// The state of a traffic signal: one queue per approach and a green which
/// cycles between the approaches that have vehicles waiting.
#[derive(Debug)]
pub(crate) struct Signal {
    /// The approaches, each with the position its light is drawn at.
    /// The first is always [Approach::Default] and the second [Approach::Centre].
    approaches: Vec<(Approach, Option<Point2d>)>,
    /// The vehicles waiting at each approach.
    queues: Vec<VecDeque<Arc<Vehicle>>>,
    /// The index of the approach with the green.
    turn: usize,
    /// Set while no vehicle is waiting anywhere.
    resting: bool,
    clock: SignalClock,
}

impl Signal {
    pub fn new(centre: Point2d, timing: SignalTiming, now: Instant) -> Self {
        let approaches = vec![(Approach::Default, None), (Approach::Centre, Some(centre))];
        Self {
            queues: approaches.iter().map(|_| VecDeque::new()).collect(),
            approaches,
            turn: 0,
            resting: true,
            clock: SignalClock::new(timing, now),
        }
    }

    /// Replaces the lane approaches with one per incoming lane.
    /// Vehicles already waiting keep their place, or move to the default
    /// queue if their lane no longer arrives here.
    pub fn configure(&mut self, incoming: impl IntoIterator<Item = (LaneId, Point2d)>) {
        let mut approaches = self.approaches[..2].to_vec();
        approaches.extend(incoming.into_iter().map(|(lane, finish)| (Approach::Lane(lane), Some(finish))));

        let green = self.approaches[self.turn].0;
        let mut queues = approaches.iter().map(|_| VecDeque::new()).collect::<Vec<_>>();
        for ((approach, _), queue) in self.approaches.iter().zip(self.queues.drain(..)) {
            let idx = approaches.iter().position(|(a, _)| a == approach).unwrap_or(0);
            queues[idx].extend(queue);
        }

        self.turn = approaches.iter().position(|(a, _)| *a == green).unwrap_or(0);
        self.approaches = approaches;
        self.queues = queues;
    }

    pub fn timing(&self) -> SignalTiming {
        self.clock.timing
    }

    pub fn set_timing(&mut self, timing: SignalTiming) {
        self.clock.timing = timing;
    }

    pub fn approaches(&self) -> impl Iterator<Item = Approach> + '_ {
        self.approaches.iter().map(|(a, _)| *a)
    }

    /// Queues a vehicle at the approach matching the waypoint it is heading for.
    pub fn enqueue(&mut self, id: IntersectionId, vehicle: Arc<Vehicle>, next_goal: Option<WaypointKind>) {
        let approach = match next_goal {
            Some(WaypointKind::LaneFinish(lane)) => Approach::Lane(lane),
            Some(WaypointKind::Intersection(goal)) if goal == id => Approach::Centre,
            _ => Approach::Default,
        };
        let idx = self.approaches.iter().position(|(a, _)| *a == approach).unwrap_or(0);
        self.queues[idx].push_back(vehicle);
    }

    pub fn queued(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    pub fn is_queued(&self, id: VehicleId) -> bool {
        self.queues.iter().flatten().any(|v| v.id() == id)
    }

    pub fn has_waiting(&self) -> bool {
        self.queues.iter().any(|q| !q.is_empty())
    }

    pub fn is_resting(&self) -> bool {
        self.resting
    }

    pub fn green_approach(&self) -> Option<Approach> {
        (!self.resting).then(|| self.approaches[self.turn].0)
    }

    /// Where the current green is drawn, if it has a position.
    pub fn green_position(&self) -> Option<Point2d> {
        if self.resting {
            return None;
        }
        self.approaches[self.turn].1
    }

    pub fn phase(&self, now: Instant) -> SignalPhase {
        if self.resting {
            SignalPhase::Resting
        } else {
            self.clock.phase(now)
        }
    }

    pub fn should_advance(&self, now: Instant) -> bool {
        self.clock.should_advance(now)
    }

    /// Takes the next vehicle from the green queue, if the green allows it.
    ///
    /// Nothing is admitted while resting or during the gap. A dead vehicle is
    /// taken from the queue without counting as an admission. A vehicle may
    /// enter while `occupant` is still inside only if the occupant was
    /// admitted on the same green.
    pub fn dequeue_green(
        &mut self,
        id: IntersectionId,
        occupant: Option<&Arc<Vehicle>>,
        now: Instant,
    ) -> Option<Arc<Vehicle>> {
        if self.resting || self.clock.is_gap(now) || self.queues[self.turn].is_empty() {
            return None;
        }
        let green = GreenLight {
            intersection: id,
            approach: self.approaches[self.turn].0,
        };
        if let Some(occupant) = occupant {
            if occupant.last_green() != Some(green) {
                return None;
            }
        }
        let vehicle = self.queues[self.turn].pop_front()?;
        if vehicle.is_alive() {
            vehicle.set_last_green(green);
            self.clock.admitted(now);
        }
        Some(vehicle)
    }

    /// Moves the green to the next approach with a vehicle waiting, or rests
    /// if there is none.
    pub fn advance(&mut self, now: Instant) {
        if !self.has_waiting() {
            self.resting = true;
            self.turn = 0;
            return;
        }
        let start = if self.resting { 0 } else { self.turn + 1 };
        let queues = &self.queues;
        self.turn = rotated_range(queues.len(), start)
            .find(|&i| !queues[i].is_empty())
            .unwrap_or(0);
        self.resting = false;
        self.clock.switch(now);
    }
}
