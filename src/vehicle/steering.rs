use crate::math::{angle_diff, heading, Point2d};

/// Turns `current` towards the direction from `pos` to `goal`,
/// by no more than `max_turn` radians.
pub fn turn_towards(current: f64, pos: Point2d, goal: Point2d, max_turn: f64) -> f64 {
    let diff = angle_diff(heading(pos, goal), current);
    current + diff.clamp(-max_turn, max_turn)
}
