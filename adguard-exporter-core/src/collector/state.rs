//! Per-appliance bookkeeping shared by concurrent collection cycles.
//!
//! One lock guards both maps. It is only ever held for map lookups and
//! inserts (plus the registry reset it protects), never across network I/O.

use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// Outcome of comparing a fetched version with the recorded baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    /// First observation; the version became the baseline.
    Baseline,
    /// Matches the baseline.
    Unchanged,
    /// Differs from the baseline; the change callback ran.
    Changed,
}

#[derive(Default)]
struct StateMaps {
    initialised: HashSet<String>,
    versions: HashMap<String, String>,
}

/// Initialization flags and baseline versions, keyed by appliance identity.
#[derive(Default)]
pub struct CollectorState {
    inner: Mutex<StateMaps>,
}

impl CollectorState {
    pub fn with_capacity(appliances: usize) -> Self {
        Self {
            inner: Mutex::new(StateMaps {
                initialised: HashSet::with_capacity(appliances),
                versions: HashMap::with_capacity(appliances),
            }),
        }
    }

    /// Run `init` the first time `server` is seen. Returns whether it ran.
    pub async fn initialise(&self, server: &str, init: impl FnOnce()) -> bool {
        let mut maps = self.inner.lock().await;
        if maps.initialised.contains(server) {
            return false;
        }
        init();
        maps.initialised.insert(server.to_string());
        true
    }

    pub async fn is_initialised(&self, server: &str) -> bool {
        self.inner.lock().await.initialised.contains(server)
    }

    /// Compare `version` with the baseline of `server`, recording it if absent.
    ///
    /// `on_change` runs inside the critical section when the versions differ.
    /// The baseline is never overwritten, so once an appliance drifts every
    /// later call reports `Changed` again.
    // TODO: move the baseline to the new version after a change once the
    // product owners confirm the repeated reset is unwanted.
    pub async fn reconcile_version(
        &self,
        server: &str,
        version: &str,
        on_change: impl FnOnce(),
    ) -> VersionCheck {
        let mut maps = self.inner.lock().await;
        match maps.versions.get(server) {
            None => {
                maps.versions.insert(server.to_string(), version.to_string());
                VersionCheck::Baseline
            }
            Some(baseline) if baseline == version => VersionCheck::Unchanged,
            Some(_) => {
                on_change();
                VersionCheck::Changed
            }
        }
    }

    pub async fn baseline_version(&self, server: &str) -> Option<String> {
        self.inner.lock().await.versions.get(server).cloned()
    }
}
