use std::time::{Duration, Instant};

/// Default minimum gap between two records of the same plate.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(5);

/// Per-session memory of the last durable write.
///
/// Lives inside one session and is never shared, so it needs no lock.
#[derive(Clone, Debug, Default)]
pub struct DedupState {
    last_plate: Option<String>,
    last_persisted_at: Option<Instant>,
}

impl DedupState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_plate(&self) -> Option<&str> {
        self.last_plate.as_deref()
    }

    pub fn last_persisted_at(&self) -> Option<Instant> {
        self.last_persisted_at
    }

    /// Record a successful write. Both fields change together.
    pub fn mark_persisted(&mut self, plate: &str, at: Instant) {
        self.last_plate = Some(plate.to_string());
        self.last_persisted_at = Some(at);
    }
}

/// The single write rule: a new plate is recorded immediately, a repeated
/// plate only once the window has passed since its last record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PersistencePolicy {
    window: Duration,
}

impl Default for PersistencePolicy {
    fn default() -> Self {
        Self {
            window: DEFAULT_DEDUP_WINDOW,
        }
    }
}

impl PersistencePolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn should_persist(&self, state: &DedupState, plate: &str, now: Instant) -> bool {
        let (Some(last_plate), Some(last_at)) = (state.last_plate(), state.last_persisted_at())
        else {
            return true;
        };
        last_plate != plate || now.saturating_duration_since(last_at) > self.window
    }
}
