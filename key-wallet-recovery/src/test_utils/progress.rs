use std::sync::{Arc, Mutex};

use crate::options::{ScanOptions, ScanPhase, ScanProgress};

/// Collects progress events for later inspection
#[derive(Clone, Default)]
pub struct ProgressRecorder {
    events: Arc<Mutex<Vec<ScanProgress>>>,
}

impl ProgressRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install this recorder as the progress callback of `options`
    pub fn attach(&self, options: ScanOptions) -> ScanOptions {
        let events = self.events.clone();
        options.with_progress_callback(move |p| events.lock().unwrap().push(p.clone()))
    }

    pub fn events(&self) -> Vec<ScanProgress> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, phase: ScanPhase) -> usize {
        self.events.lock().unwrap().iter().filter(|e| e.phase == phase).count()
    }
}
