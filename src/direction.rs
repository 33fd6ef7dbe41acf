use core::cmp::Ordering;

use crate::types::{Direction, RawSample};

pub fn effective_delta(sample: RawSample) -> i32 {
    if sample.major == 0 {
        sample.minor
    } else {
        sample.major
    }
}

pub fn resolve_tick(sample: RawSample) -> Direction {
    match effective_delta(sample).cmp(&0) {
        Ordering::Greater => Direction::Clockwise,
        Ordering::Less => Direction::CounterClockwise,
        Ordering::Equal => Direction::None,
    }
}
