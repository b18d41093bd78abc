use crate::{IntersectionId, LaneId};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// The timing parameters of a signalised intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SignalTiming {
    /// The longest time one approach stays green, including its yellow and gap.
    pub cycle: Duration,
    /// The length of the all-red clearance interval at the end of a phase.
    pub gap: Duration,
    /// The length of the advisory yellow before the gap.
    pub yellow: Duration,
    /// How long a green may go without admitting a vehicle before the gap begins early.
    pub idle_admit_timeout: Duration,
}

impl Default for SignalTiming {
    fn default() -> Self {
        Self {
            cycle: Duration::from_millis(10_000),
            gap: Duration::from_millis(500),
            yellow: Duration::from_millis(500),
            idle_admit_timeout: Duration::from_millis(2_000),
        }
    }
}

/// The phase of a signalised intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SignalPhase {
    /// Nobody is waiting, so no approach has a green.
    Resting,
    /// The current approach may enter.
    Green,
    /// The current approach may still enter, but the gap is near.
    Yellow,
    /// All red while the intersection clears.
    Gap,
}

/// An incoming direction at a signalised intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Approach {
    /// Vehicles whose next waypoint matches no other approach.
    Default,
    /// Vehicles heading for the centre of the intersection itself.
    Centre,
    /// Vehicles arriving along the given lane.
    Lane(LaneId),
}

/// The green a vehicle was admitted on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct GreenLight {
    pub intersection: IntersectionId,
    pub approach: Approach,
}

/// Tracks when a signal last switched approach and last admitted a vehicle.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SignalClock {
    pub timing: SignalTiming,
    last_switched: Instant,
    last_admitted: Instant,
}

impl SignalClock {
    pub fn new(timing: SignalTiming, now: Instant) -> Self {
        Self {
            timing,
            last_switched: now,
            last_admitted: now,
        }
    }

    /// Restarts both timers, as happens when the green moves to a new approach.
    pub fn switch(&mut self, now: Instant) {
        self.last_switched = now;
        self.last_admitted = now;
    }

    pub fn admitted(&mut self, now: Instant) {
        self.last_admitted = now;
    }

    pub fn since_switched(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_switched)
    }

    pub fn since_admitted(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_admitted)
    }

    /// The yellow begins `gap + yellow` before the end of the cycle.
    pub fn is_yellow(&self, now: Instant) -> bool {
        let t = &self.timing;
        self.since_switched(now) > t.cycle.saturating_sub(t.gap + t.yellow)
    }

    /// The gap begins `gap` before the end of the cycle, or early once
    /// no vehicle has been admitted for the idle timeout.
    pub fn is_gap(&self, now: Instant) -> bool {
        let t = &self.timing;
        self.since_switched(now) > t.cycle.saturating_sub(t.gap)
            || self.since_admitted(now) > t.idle_admit_timeout
    }

    /// Whether the gap is over and the green should move on.
    pub fn should_advance(&self, now: Instant) -> bool {
        let t = &self.timing;
        self.since_switched(now) > t.cycle
            || self.since_admitted(now) > t.idle_admit_timeout + t.gap
    }

    /// The phase of an active (non-resting) signal.
    pub fn phase(&self, now: Instant) -> SignalPhase {
        if self.is_gap(now) {
            SignalPhase::Gap
        } else if self.is_yellow(now) {
            SignalPhase::Yellow
        } else {
            SignalPhase::Green
        }
    }
}
