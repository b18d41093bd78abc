use crate::vehicle::Vehicle;
use crate::VehicleId;
use std::collections::VecDeque;
use std::sync::Arc;

/// A single first-come first-served queue in front of an all-way stop.
#[derive(Debug, Default)]
pub(crate) struct AllWayStop {
    queue: VecDeque<Arc<Vehicle>>,
}

impl AllWayStop {
    pub fn enqueue(&mut self, vehicle: Arc<Vehicle>) {
        self.queue.push_back(vehicle);
    }

    /// Takes the vehicle at the head of the queue.
    pub fn dequeue(&mut self) -> Option<Arc<Vehicle>> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_queued(&self, id: VehicleId) -> bool {
        self.queue.iter().any(|v| v.id() == id)
    }
}
