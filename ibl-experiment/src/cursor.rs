use std::ops::Range;

use crate::error::DataIntegrityError;

/// Events newly crossed by one [`StreamCursor::advance_while`] call, and the
/// fault that stopped it early, if any.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Crossing {
    range: Range<usize>,
    fault: Option<DataIntegrityError>,
}

impl Crossing {
    pub fn count(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Crossed event indices in timestamp order.
    pub fn indices(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Fault found during this call. The events in [`indices`](Self::indices)
    /// all precede it and are still due.
    pub fn fault(&self) -> Option<&DataIntegrityError> {
        self.fault.as_ref()
    }
}

/// Monotonic pointer to the next undispatched event of one stream.
///
/// The index only moves forward. Once a fault is found the cursor is halted
/// and later calls cross nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamCursor {
    index: usize,
    halted: Option<DataIntegrityError>,
}

impl StreamCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crosses every event with `clock >= t`. The comparison is inclusive so
    /// an event stamped exactly at the clock fires on this tick.
    ///
    /// A timestamp smaller than its predecessor halts the cursor before that
    /// event. The events crossed ahead of it in the same call are returned
    /// alongside the fault. A halted cursor returns an empty crossing.
    pub fn advance_while(&mut self, times: &[f64], clock: f64) -> Crossing {
        let start = self.index;
        if self.halted.is_some() {
            return Crossing {
                range: start..start,
                fault: None,
            };
        }
        let mut fault = None;
        while let Some(&t) = times.get(self.index) {
            if clock < t {
                break;
            }
            if self.index > 0 && t < times[self.index - 1] {
                let err = DataIntegrityError::non_monotonic("", self.index);
                self.halted = Some(err.clone());
                fault = Some(err);
                break;
            }
            self.index += 1;
        }
        Crossing {
            range: start..self.index,
            fault,
        }
    }

    /// Halts the cursor with a fault found by the caller (for example a
    /// parallel array that ran out).
    pub fn halt(&mut self, err: DataIntegrityError) {
        if self.halted.is_none() {
            self.halted = Some(err);
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_exhausted(&self, times: &[f64]) -> bool {
        self.index >= times.len()
    }

    pub fn halted(&self) -> Option<&DataIntegrityError> {
        self.halted.as_ref()
    }

    /// Next timestamp that has not been crossed.
    pub fn peek(&self, times: &[f64]) -> Option<f64> {
        times.get(self.index).copied()
    }
}
