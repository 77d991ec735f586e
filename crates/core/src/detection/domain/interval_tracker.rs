/// One closed movement interval, in seconds from stream start.
/// `start_secs < end_secs` always holds once an event is recorded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MovementEvent {
    pub start_secs: f64,
    pub end_secs: f64,
}

/// Converts the per-frame movement signal plus its timestamp into a list of
/// closed movement intervals.
///
/// Two-state machine: `Idle --moving--> Moving` records the pending start
/// time; `Moving --still--> Idle` emits the interval. Repeating the current
/// state is a no-op.
///
/// Preconditions and policy:
/// - Input times must be monotonically non-decreasing; behavior under
///   out-of-order time is undefined.
/// - A movement run still open when the stream ends is discarded — no event
///   without an observed end. This is a deliberate product decision, not an
///   oversight; revisit it there rather than patching it here.
/// - State resets only by constructing a new tracker.
#[derive(Debug, Default)]
pub struct IntervalTracker {
    events: Vec<MovementEvent>,
    previously_moving: bool,
    pending_start: f64,
}

impl IntervalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one sample of the movement signal at `time_secs`.
    pub fn update(&mut self, moving: bool, time_secs: f64) {
        if moving && !self.previously_moving {
            self.previously_moving = true;
            self.pending_start = time_secs;
        } else if !moving && self.previously_moving {
            self.events.push(MovementEvent {
                start_secs: self.pending_start,
                end_secs: time_secs,
            });
            self.previously_moving = false;
            self.pending_start = 0.0;
        }
    }

    /// Snapshot of the accumulated events, safe to call mid-stream.
    pub fn events(&self) -> Vec<MovementEvent> {
        self.events.clone()
    }

    /// True while inside an unterminated movement run.
    pub fn is_moving(&self) -> bool {
        self.previously_moving
    }
}
