use crate::math::Point2d;
use crate::{IntersectionId, VehicleId};

/// The errors reported by the simulation.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum SimError {
    /// The target intersection cannot be reached from the source intersection.
    #[error("no route from {from:?} to {to:?}")]
    RouteNotFound {
        from: IntersectionId,
        to: IntersectionId,
    },
    /// The road network has no intersections to route between.
    #[error("the road network has no intersections")]
    EmptyNetwork,
    /// Another vehicle already covers the requested spawn point.
    #[error("spawn location {0:?} is already occupied")]
    InvalidSpawnLocation(Point2d),
    /// No vehicle with this ID is being simulated.
    #[error("no such vehicle {0:?}")]
    UnknownVehicle(VehicleId),
}

pub type Result<T, E = SimError> = std::result::Result<T, E>;
