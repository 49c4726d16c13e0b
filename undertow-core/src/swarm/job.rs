//! Server-side record of one swarm download.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{SwarmContents, SwarmTorrent};

/// Lifecycle phase of a job.
#[derive(Debug, Clone)]
pub enum JobPhase {
    /// Waiting for the engine to report metadata
    Pending,
    /// Metadata known; files can be streamed
    Ready(SwarmContents),
    /// The engine reported an error
    Failed(String),
    /// Every interested caller gave up waiting
    TimedOut,
    /// Torn down explicitly
    Removed,
}

impl JobPhase {
    /// Returns true while no outcome has been published.
    pub fn is_pending(&self) -> bool {
        matches!(self, JobPhase::Pending)
    }

    /// Returns true for phases no event can leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobPhase::Failed(_) | JobPhase::TimedOut | JobPhase::Removed
        )
    }

    /// Short lowercase label for logs and the job listing.
    pub fn label(&self) -> &'static str {
        match self {
            JobPhase::Pending => "pending",
            JobPhase::Ready(_) => "ready",
            JobPhase::Failed(_) => "failed",
            JobPhase::TimedOut => "timed_out",
            JobPhase::Removed => "removed",
        }
    }
}

struct JobInner {
    waiters: usize,
    /// Registry entry removed after a waiter timed out; readiness is no longer accepted
    detached: bool,
    torrent: Option<Arc<dyn SwarmTorrent>>,
    driver: Option<JoinHandle<()>>,
}

/// One swarm download shared by every request for the same identifier.
///
/// Phase changes are published on a watch channel so all waiters see the
/// same transition. Every transition happens under the inner lock, which
/// makes "check phase, then change it" atomic against concurrent waiters
/// and the driver task.
pub struct SwarmJob {
    id: Uuid,
    identifier: String,
    created_at: DateTime<Utc>,
    phase: watch::Sender<JobPhase>,
    inner: Mutex<JobInner>,
}

impl SwarmJob {
    /// Creates a pending job owning `torrent`.
    pub fn new(identifier: impl Into<String>, torrent: Arc<dyn SwarmTorrent>) -> Arc<Self> {
        let (phase, _) = watch::channel(JobPhase::Pending);
        Arc::new(Self {
            id: Uuid::new_v4(),
            identifier: identifier.into(),
            created_at: Utc::now(),
            phase,
            inner: Mutex::new(JobInner {
                waiters: 0,
                detached: false,
                torrent: Some(torrent),
                driver: None,
            }),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current phase.
    pub fn phase(&self) -> JobPhase {
        self.phase.borrow().clone()
    }

    /// Contents if the job is ready.
    pub fn contents(&self) -> Option<SwarmContents> {
        match &*self.phase.borrow() {
            JobPhase::Ready(contents) => Some(contents.clone()),
            _ => None,
        }
    }

    /// Number of callers currently waiting on readiness.
    pub fn waiter_count(&self) -> usize {
        self.inner.lock().waiters
    }

    /// Returns true once the engine's backend resources were released.
    pub fn is_released(&self) -> bool {
        self.inner.lock().torrent.is_none()
    }

    /// Registers a readiness waiter. Dropping the returned value deregisters it.
    pub fn attach_waiter(self: &Arc<Self>) -> Waiter {
        self.inner.lock().waiters += 1;
        Waiter {
            job: Arc::clone(self),
            receiver: self.phase.subscribe(),
        }
    }

    /// Stores the task consuming the engine's events.
    pub(crate) fn set_driver(&self, driver: JoinHandle<()>) {
        let mut inner = self.inner.lock();
        if self.phase.borrow().is_terminal() {
            driver.abort();
        } else {
            inner.driver = Some(driver);
        }
    }

    /// Publishes readiness. Returns false when the job is detached or no
    /// longer pending, in which case the event is dropped.
    pub(crate) fn mark_ready(&self, contents: SwarmContents) -> bool {
        let inner = self.inner.lock();
        if inner.detached || !self.phase.borrow().is_pending() {
            return false;
        }
        self.phase.send_replace(JobPhase::Ready(contents));
        true
    }

    /// Publishes failure and releases the backend. Returns false if the job
    /// had already reached a terminal phase.
    pub(crate) fn mark_failed(&self, reason: String) -> bool {
        self.finish(JobPhase::Failed(reason), false)
    }

    /// Tears the job down as explicitly removed.
    pub(crate) fn mark_removed(&self) -> bool {
        self.finish(JobPhase::Removed, true)
    }

    /// Detaches only if no outcome was published yet. Returns false when the
    /// job settled in the meantime.
    pub(crate) fn detach_if_pending(&self) -> bool {
        let mut inner = self.inner.lock();
        if !self.phase.borrow().is_pending() {
            return false;
        }
        inner.detached = true;
        true
    }

    fn finish(&self, phase: JobPhase, abort_driver: bool) -> bool {
        let (torrent, driver) = {
            let mut inner = self.inner.lock();
            if self.phase.borrow().is_terminal() {
                return false;
            }
            inner.detached = true;
            self.phase.send_replace(phase);
            (inner.torrent.take(), inner.driver.take())
        };

        if let Some(torrent) = torrent {
            torrent.destroy();
        }
        if let Some(driver) = driver {
            if abort_driver {
                driver.abort();
            }
        }
        true
    }

    fn waiter_departed(&self) {
        let (torrent, driver) = {
            let mut inner = self.inner.lock();
            inner.waiters = inner.waiters.saturating_sub(1);
            if inner.waiters > 0 || !inner.detached || !self.phase.borrow().is_pending() {
                return;
            }
            self.phase.send_replace(JobPhase::TimedOut);
            (inner.torrent.take(), inner.driver.take())
        };

        tracing::info!(
            "Last waiter left detached job {} ({}), releasing download",
            self.id,
            self.identifier
        );
        if let Some(torrent) = torrent {
            torrent.destroy();
        }
        if let Some(driver) = driver {
            driver.abort();
        }
    }
}

impl fmt::Debug for SwarmJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwarmJob")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("phase", &self.phase.borrow().label())
            .finish()
    }
}

/// A caller suspended on a job's readiness.
pub struct Waiter {
    job: Arc<SwarmJob>,
    receiver: watch::Receiver<JobPhase>,
}

impl Waiter {
    /// Job this waiter is attached to.
    pub fn job(&self) -> &Arc<SwarmJob> {
        &self.job
    }

    /// Resolves with the first non-pending phase. Returns at once if the
    /// job already left `Pending`.
    pub async fn settled(&mut self) -> JobPhase {
        match self.receiver.wait_for(|phase| !phase.is_pending()).await {
            Ok(phase) => phase.clone(),
            Err(_) => JobPhase::Failed("job dropped".to_string()),
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.job.waiter_departed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::test_mocks::MockTorrent;

    fn job_with_torrent() -> (Arc<SwarmJob>, Arc<MockTorrent>) {
        let torrent = Arc::new(MockTorrent::default());
        let job = SwarmJob::new("magnet:?xt=urn:btih:abc", torrent.clone());
        (job, torrent)
    }

    fn contents() -> SwarmContents {
        SwarmContents {
            name: "movie".to_string(),
            files: Vec::new(),
        }
    }

    #[test]
    fn test_ready_transition() {
        let (job, torrent) = job_with_torrent();
        assert!(job.phase().is_pending());
        assert!(job.mark_ready(contents()));
        assert_eq!(job.phase().label(), "ready");
        assert!(!torrent.is_destroyed());
    }

    #[test]
    fn test_failure_releases_torrent_once() {
        let (job, torrent) = job_with_torrent();
        assert!(job.mark_failed("boom".to_string()));
        assert!(!job.mark_failed("again".to_string()));
        assert!(torrent.is_destroyed());
        assert_eq!(torrent.destroy_count(), 1);
        assert!(!job.mark_ready(contents()));
    }

    #[test]
    fn test_detached_job_ignores_late_readiness() {
        let (job, _torrent) = job_with_torrent();
        assert!(job.detach_if_pending());
        assert!(!job.mark_ready(contents()));
        assert!(job.phase().is_pending());
    }

    #[tokio::test]
    async fn test_last_waiter_releases_detached_job() {
        let (job, torrent) = job_with_torrent();
        let first = job.attach_waiter();
        let second = job.attach_waiter();
        assert_eq!(job.waiter_count(), 2);

        assert!(job.detach_if_pending());
        drop(first);
        assert!(!torrent.is_destroyed());
        assert!(job.phase().is_pending());

        drop(second);
        assert!(torrent.is_destroyed());
        assert_eq!(job.phase().label(), "timed_out");
        assert!(job.is_released());
    }

    #[tokio::test]
    async fn test_waiter_departure_keeps_attached_job() {
        let (job, torrent) = job_with_torrent();
        drop(job.attach_waiter());
        assert_eq!(job.waiter_count(), 0);
        assert!(!torrent.is_destroyed());
        assert!(job.phase().is_pending());
    }

    #[tokio::test]
    async fn test_settled_returns_immediately_when_ready() {
        let (job, _torrent) = job_with_torrent();
        job.mark_ready(contents());
        let mut waiter = job.attach_waiter();
        assert_eq!(waiter.settled().await.label(), "ready");
    }
}
