//! Tracks which devices currently have an upgrade in flight

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::errors::UpgradeError;

/// Set of hostnames with an active job. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `hostname` for a new job
    ///
    /// The claim is released when the returned guard is dropped.
    pub fn try_acquire(&self, hostname: &str) -> Result<JobGuard, UpgradeError> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(hostname.to_string()) {
            return Err(UpgradeError::DuplicateJobError(hostname.to_string()));
        }
        debug!("{}: Job registered", hostname);
        Ok(JobGuard {
            active: self.active.clone(),
            hostname: hostname.to_string(),
        })
    }

    pub fn is_active(&self, hostname: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(hostname)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Holds a device's slot in the [`JobRegistry`]
#[derive(Debug)]
pub struct JobGuard {
    active: Arc<Mutex<HashSet<String>>>,
    hostname: String,
}

impl JobGuard {
    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.hostname);
    }
}
