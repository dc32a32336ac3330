//! Per-cycle state shared between pipeline stages
//!
//! A [`CycleState`] is created empty when a workload enters the pipeline,
//! receives its affinity profile exactly once, and is then read by any
//! number of concurrent filter and score invocations. The profile is built
//! completely before it is published, and `OnceLock` makes the publication
//! visible to readers as a single step, so readers never see a partial
//! profile and never take a lock.

use crate::error::CycleStateError;
use crate::profile::AffinityProfile;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

static NEXT_CYCLE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct CycleState {
    id: u64,
    workload: String,
    profile: OnceLock<Arc<AffinityProfile>>,
}

impl CycleState {
    /// Start a new cycle for `workload`
    pub fn new(workload: impl Into<String>) -> Self {
        Self {
            id: NEXT_CYCLE_ID.fetch_add(1, Ordering::Relaxed),
            workload: workload.into(),
            profile: OnceLock::new(),
        }
    }

    /// Identifier of this cycle, unique within the process
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn workload(&self) -> &str {
        &self.workload
    }

    /// Publish the cycle's profile; a second publication is rejected and
    /// leaves the first in place
    pub fn publish(&self, profile: AffinityProfile) -> Result<Arc<AffinityProfile>, CycleStateError> {
        let profile = Arc::new(profile);
        self.profile
            .set(Arc::clone(&profile))
            .map_err(|_| CycleStateError::AlreadyPublished(self.id))?;
        Ok(profile)
    }

    /// The published profile
    pub fn profile(&self) -> Result<Arc<AffinityProfile>, CycleStateError> {
        self.profile
            .get()
            .cloned()
            .ok_or(CycleStateError::NotPublished(self.id))
    }

    pub fn is_published(&self) -> bool {
        self.profile.get().is_some()
    }
}
