//! Test announcement sink.

use std::sync::Mutex;

use async_trait::async_trait;
use initiative_core::announce::{Announcement, AnnouncementSink};

/// Records every announcement in publication order.
#[derive(Debug, Default)]
pub struct RecordingAnnouncer {
    announcements: Mutex<Vec<Announcement>>,
}

impl RecordingAnnouncer {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of everything announced so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn announcements(&self) -> Vec<Announcement> {
        self.announcements.lock().unwrap().clone()
    }

    /// Returns the kind names of everything announced so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.announcements
            .lock()
            .unwrap()
            .iter()
            .map(Announcement::kind)
            .collect()
    }

    /// Forgets everything recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn clear(&self) {
        self.announcements.lock().unwrap().clear();
    }
}

#[async_trait]
impl AnnouncementSink for RecordingAnnouncer {
    async fn announce(&self, announcement: &Announcement) {
        self.announcements.lock().unwrap().push(announcement.clone());
    }
}
