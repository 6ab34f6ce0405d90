// src/direction.rs

use crate::types::Direction;

/// Classify overall travel direction from an episode's centroid trace.
///
/// The camera looks along the flap's axis, so horizontal drift of the motion
/// mass is all that distinguishes a cat leaving from a cat arriving: a trace
/// that ends left of where it started is outbound, the reverse is inbound.
/// A trace with a single entry (or no net drift) is ambiguous.
pub fn estimate(trace: &[f64]) -> Direction {
    let (Some(first), Some(last)) = (trace.first(), trace.last()) else {
        return Direction::Ambiguous;
    };
    if first > last {
        Direction::Outbound
    } else if first < last {
        Direction::Inbound
    } else {
        Direction::Ambiguous
    }
}
