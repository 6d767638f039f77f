//! One-shot debounce timer for persistence.

/// Deadline armed on the first change in a window and fired once it elapses.
///
/// While armed, further `arm` calls are ignored, so at most one save happens
/// per window no matter how many changes land in it.
#[derive(Clone, Debug)]
pub struct SaveTimer {
    delay_ms: u64,
    due_at: Option<i64>,
}

impl SaveTimer {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            due_at: None,
        }
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    /// Arm the timer at `now`. Returns `false` if it was already pending.
    pub fn arm(&mut self, now: i64) -> bool {
        if self.due_at.is_some() {
            return false;
        }
        let delay = i64::try_from(self.delay_ms).unwrap_or(i64::MAX);
        self.due_at = Some(now.saturating_add(delay));
        true
    }

    pub fn is_pending(&self) -> bool {
        self.due_at.is_some()
    }

    pub fn due_at(&self) -> Option<i64> {
        self.due_at
    }

    /// Disarm and report `true` if the deadline has passed at `now`.
    pub fn fire_if_due(&mut self, now: i64) -> bool {
        match self.due_at {
            Some(due) if now >= due => {
                self.due_at = None;
                true
            }
            _ => false,
        }
    }

    /// Disarm without firing. Returns whether a save was pending.
    pub fn cancel(&mut self) -> bool {
        self.due_at.take().is_some()
    }
}
