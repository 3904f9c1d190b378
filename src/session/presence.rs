use crate::session::adapter::PresenceChange;
use std::collections::HashSet;

/// Counts attendees currently present.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    present: HashSet<String>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a change and return the new count.
    pub fn apply(&mut self, change: &PresenceChange) -> usize {
        if change.present {
            self.present.insert(change.attendee_id.clone());
        } else {
            self.present.remove(&change.attendee_id);
        }
        self.present.len()
    }

    pub fn count(&self) -> usize {
        self.present.len()
    }

    pub fn is_present(&self, attendee_id: &str) -> bool {
        self.present.contains(attendee_id)
    }
}
