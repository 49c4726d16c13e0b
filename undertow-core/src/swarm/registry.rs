//! Process-wide table of swarm jobs keyed by identifier.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::SwarmJob;
use super::job::Waiter;

/// Identifier to job table.
///
/// Every operation holds the lock for its whole check-and-mutate section and
/// never awaits inside it, so at most one job exists per identifier.
#[derive(Clone, Default)]
pub struct SwarmRegistry {
    jobs: Arc<Mutex<HashMap<String, Arc<SwarmJob>>>>,
}

impl SwarmRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the job for `identifier`, creating it with `create` if absent.
    ///
    /// `create` runs under the registry lock, so concurrent first requests
    /// for one identifier invoke it exactly once. The flag is true when this
    /// call created the job.
    ///
    /// # Errors
    /// Propagates the error returned by `create`; nothing is inserted.
    pub fn get_or_create<E>(
        &self,
        identifier: &str,
        create: impl FnOnce() -> Result<Arc<SwarmJob>, E>,
    ) -> Result<(Arc<SwarmJob>, bool), E> {
        self.get_or_create_then(identifier, create, Arc::clone)
    }

    /// Like [`get_or_create`](Self::get_or_create), but registers a readiness
    /// waiter before the lock is released. A job found here is never detached
    /// between lookup and attachment.
    ///
    /// # Errors
    /// Propagates the error returned by `create`; nothing is inserted.
    pub fn attach_or_create<E>(
        &self,
        identifier: &str,
        create: impl FnOnce() -> Result<Arc<SwarmJob>, E>,
    ) -> Result<(Waiter, bool), E> {
        self.get_or_create_then(identifier, create, SwarmJob::attach_waiter)
    }

    fn get_or_create_then<E, T>(
        &self,
        identifier: &str,
        create: impl FnOnce() -> Result<Arc<SwarmJob>, E>,
        then: impl FnOnce(&Arc<SwarmJob>) -> T,
    ) -> Result<(T, bool), E> {
        let mut jobs = self.jobs.lock();
        if let Some(job) = jobs.get(identifier) {
            return Ok((then(job), false));
        }

        let job = create()?;
        let value = then(&job);
        jobs.insert(identifier.to_string(), job);
        Ok((value, true))
    }

    /// Looks up the job for `identifier`.
    pub fn find(&self, identifier: &str) -> Option<Arc<SwarmJob>> {
        self.jobs.lock().get(identifier).cloned()
    }

    /// Removes the entry for `identifier`. Repeated calls are no-ops.
    pub fn remove(&self, identifier: &str) -> Option<Arc<SwarmJob>> {
        self.jobs.lock().remove(identifier)
    }

    /// Removes the entry only if it still refers to `job`.
    ///
    /// A stale job must not evict a fresh one created after it for the same
    /// identifier.
    pub fn remove_if_same(&self, job: &Arc<SwarmJob>) -> bool {
        let mut jobs = self.jobs.lock();
        match jobs.get(job.identifier()) {
            Some(current) if Arc::ptr_eq(current, job) => {
                jobs.remove(job.identifier());
                true
            }
            _ => false,
        }
    }

    /// Detaches `job` and drops its entry in one critical section, so no
    /// caller can find the job once it stops accepting readiness. Returns
    /// false, leaving the table untouched, when the job already settled.
    pub fn detach_and_remove(&self, job: &Arc<SwarmJob>) -> bool {
        let mut jobs = self.jobs.lock();
        if !job.detach_if_pending() {
            return false;
        }
        if jobs
            .get(job.identifier())
            .is_some_and(|current| Arc::ptr_eq(current, job))
        {
            jobs.remove(job.identifier());
        }
        true
    }

    /// Snapshot of all jobs, in no particular order.
    pub fn jobs(&self) -> Vec<Arc<SwarmJob>> {
        self.jobs.lock().values().cloned().collect()
    }

    /// Removes and returns every job.
    pub fn drain(&self) -> Vec<Arc<SwarmJob>> {
        self.jobs.lock().drain().map(|(_, job)| job).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}
