//! Swarm job lifecycle management.
//!
//! [`SwarmService`] is constructed once at startup and shared with the HTTP
//! layer. It deduplicates downloads per identifier, runs one driver task per
//! job that consumes the engine's events, and lets any number of requests
//! wait on a job with their own timeout.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job::{JobPhase, SwarmJob, Waiter};
use super::registry::SwarmRegistry;
use super::resolver::{MediaFile, MediaResolver, find_by_name};
use super::{SwarmContents, SwarmEngine, SwarmError, SwarmEvent};
use crate::UndertowError;

/// Outcome delivered to one readiness waiter. Exactly one per call.
#[derive(Debug, Clone)]
pub enum ReadyOutcome {
    Ready(SwarmContents),
    Failed(String),
    TimedOut,
}

/// Listing entry for one registry job.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub identifier: String,
    pub phase: &'static str,
    pub name: Option<String>,
    pub files: usize,
    pub waiters: usize,
    pub created_at: DateTime<Utc>,
}

/// Owner of the job table and bridge to the swarm engine.
#[derive(Clone)]
pub struct SwarmService {
    engine: Arc<dyn SwarmEngine>,
    registry: SwarmRegistry,
    resolver: MediaResolver,
}

impl SwarmService {
    /// Creates a service with an empty registry.
    pub fn new(engine: Arc<dyn SwarmEngine>, resolver: MediaResolver) -> Self {
        Self {
            engine,
            registry: SwarmRegistry::new(),
            resolver,
        }
    }

    pub fn registry(&self) -> &SwarmRegistry {
        &self.registry
    }

    /// Returns the job for `identifier`, asking the engine for a new
    /// download only when none exists. The flag is true for a new job.
    ///
    /// Must be called from within a tokio runtime; new jobs spawn their
    /// driver task.
    ///
    /// # Errors
    /// - `SwarmError::InvalidIdentifier` - Engine rejected the identifier
    /// - `SwarmError::Backend` - Engine refused the download
    pub fn admit(&self, identifier: &str) -> Result<(Arc<SwarmJob>, bool), SwarmError> {
        let mut events = None;
        let (job, created) = self
            .registry
            .get_or_create(identifier, || self.start_job(identifier, &mut events))?;
        self.launch(&job, events);
        Ok((job, created))
    }

    /// Admits `identifier` with a waiter attached under the registry lock,
    /// so a concurrent timeout cannot detach the job before this caller is
    /// counted.
    fn admit_waiting(&self, identifier: &str) -> Result<Waiter, SwarmError> {
        let mut events = None;
        let (waiter, _) = self
            .registry
            .attach_or_create(identifier, || self.start_job(identifier, &mut events))?;
        self.launch(waiter.job(), events);
        Ok(waiter)
    }

    fn start_job(
        &self,
        identifier: &str,
        events: &mut Option<mpsc::UnboundedReceiver<SwarmEvent>>,
    ) -> Result<Arc<SwarmJob>, SwarmError> {
        let handle = self.engine.add(identifier)?;
        *events = Some(handle.events);
        Ok(SwarmJob::new(identifier, handle.torrent))
    }

    /// Spawns the driver of a job created by this call.
    fn launch(&self, job: &Arc<SwarmJob>, events: Option<mpsc::UnboundedReceiver<SwarmEvent>>) {
        match events {
            Some(events) => {
                info!("Created swarm job {} for {}", job.id(), job.identifier());
                let driver =
                    tokio::spawn(drive_job(self.registry.clone(), Arc::clone(job), events));
                job.set_driver(driver);
            }
            None => {
                debug!("Attached to existing swarm job {} ({})", job.id(), job.phase().label());
            }
        }
    }

    /// Waits until `job` leaves `Pending` or `timeout` elapses.
    ///
    /// On timeout this caller alone gives up: the job leaves the registry so
    /// the identifier can be retried, and the download is released once the
    /// last remaining waiter departs.
    pub async fn await_ready(&self, job: &Arc<SwarmJob>, timeout: Duration) -> ReadyOutcome {
        self.wait(job.attach_waiter(), timeout).await
    }

    async fn wait(&self, mut waiter: Waiter, timeout: Duration) -> ReadyOutcome {
        let settled = tokio::time::timeout(timeout, waiter.settled()).await;
        let job = waiter.job();

        let phase = match settled {
            Ok(phase) => phase,
            Err(_) => {
                if self.registry.detach_and_remove(job) {
                    warn!(
                        "Torrent loading timed out after {:?}: {}",
                        timeout,
                        job.identifier()
                    );
                    return ReadyOutcome::TimedOut;
                }
                job.phase()
            }
        };

        match phase {
            JobPhase::Ready(contents) => ReadyOutcome::Ready(contents),
            JobPhase::Failed(reason) => ReadyOutcome::Failed(reason),
            JobPhase::Removed => ReadyOutcome::Failed("job removed".to_string()),
            JobPhase::TimedOut | JobPhase::Pending => ReadyOutcome::TimedOut,
        }
    }

    /// Admits `identifier`, waits for readiness and selects its media file.
    ///
    /// # Errors
    /// - `UndertowError::Swarm` - Engine refused the identifier or reported an error
    /// - `UndertowError::ResourceTimeout` - Not ready within `timeout`
    /// - `UndertowError::NoMediaFile` - Ready, but no file carries the media suffix
    pub async fn prepare_stream(
        &self,
        identifier: &str,
        timeout: Duration,
    ) -> crate::Result<MediaFile> {
        let waiter = self.admit_waiting(identifier)?;

        match self.wait(waiter, timeout).await {
            ReadyOutcome::Ready(contents) => {
                let media = self.resolver.resolve(&contents).ok_or_else(|| {
                    UndertowError::NoMediaFile {
                        resource: contents.name.clone(),
                        suffix: self.resolver.suffix().to_string(),
                    }
                })?;
                info!("Found {} file: {}", self.resolver.suffix(), media.name());
                Ok(media)
            }
            ReadyOutcome::Failed(reason) => Err(SwarmError::Backend { reason }.into()),
            ReadyOutcome::TimedOut => Err(UndertowError::ResourceTimeout {
                identifier: identifier.to_string(),
            }),
        }
    }

    /// Finds a file by exact name among ready jobs. The oldest job wins
    /// when several contain the same name.
    pub fn find_file(&self, name: &str) -> Option<MediaFile> {
        let mut jobs = self.registry.jobs();
        jobs.sort_by_key(|job| job.created_at());

        jobs.iter()
            .filter_map(|job| job.contents())
            .find_map(|contents| find_by_name(&contents, name))
    }

    /// Tears down the job for `identifier`. Returns false if none existed.
    pub fn remove(&self, identifier: &str) -> bool {
        match self.registry.remove(identifier) {
            Some(job) => {
                job.mark_removed();
                info!("Removed swarm job {} ({})", job.id(), identifier);
                true
            }
            None => false,
        }
    }

    /// Removes every job and releases its download.
    pub fn shutdown(&self) -> usize {
        let jobs = self.registry.drain();
        for job in &jobs {
            job.mark_removed();
        }
        info!("Released {} swarm jobs", jobs.len());
        jobs.len()
    }

    /// Listing of registry jobs, oldest first.
    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<_> = self
            .registry
            .jobs()
            .iter()
            .map(|job| {
                let phase = job.phase();
                let (name, files) = match &phase {
                    JobPhase::Ready(contents) => {
                        (Some(contents.name.clone()), contents.files.len())
                    }
                    _ => (None, 0),
                };
                JobSnapshot {
                    id: job.id(),
                    identifier: job.identifier().to_string(),
                    phase: phase.label(),
                    name,
                    files,
                    waiters: job.waiter_count(),
                    created_at: job.created_at(),
                }
            })
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.created_at);
        snapshots
    }
}

/// Consumes one download's events until it fails or the engine hangs up.
async fn drive_job(
    registry: SwarmRegistry,
    job: Arc<SwarmJob>,
    mut events: mpsc::UnboundedReceiver<SwarmEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SwarmEvent::Ready(contents) => {
                let name = contents.name.clone();
                let file_count = contents.files.len();
                if job.mark_ready(contents) {
                    info!("Torrent ready: {} ({} files)", name, file_count);
                } else {
                    debug!("Ignoring late readiness for stale job {}", job.id());
                }
            }
            SwarmEvent::Done => {
                info!("Torrent download finished: {}", job.identifier());
            }
            SwarmEvent::Error(e) => {
                error!("Torrent error for {}: {}", job.identifier(), e);
                registry.remove_if_same(&job);
                job.mark_failed(e.to_string());
                return;
            }
        }
    }

    if job.phase().is_pending() {
        registry.remove_if_same(&job);
        job.mark_failed(SwarmError::EngineShutdown.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::test_mocks::{MockFile, MockSwarmEngine};

    const ID: &str = "magnet:?xt=urn:btih:abc";

    fn service(engine: &MockSwarmEngine) -> SwarmService {
        SwarmService::new(Arc::new(engine.clone()), MediaResolver::new(".mp4"))
    }

    fn movie() -> Vec<MockFile> {
        vec![
            MockFile::new("notes.txt", vec![1u8; 10]),
            MockFile::new("movie.mp4", vec![7u8; 1000]),
        ]
    }

    #[tokio::test]
    async fn test_ready_job_resolves_media() {
        let engine = MockSwarmEngine::new();
        engine.seed_ready(ID, "Movie", movie());
        let service = service(&engine);

        let media = service
            .prepare_stream(ID, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(media.name(), "movie.mp4");
        assert_eq!(media.length(), 1000);
        assert_eq!(media.index, 1);
        assert_eq!(service.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_admissions_add_once() {
        let engine = MockSwarmEngine::new();
        let service = service(&engine);

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.prepare_stream(ID, Duration::from_secs(5)).await }
        });
        let second = tokio::spawn({
            let service = service.clone();
            async move { service.prepare_stream(ID, Duration::from_secs(5)).await }
        });

        while engine.add_count(ID) == 0 || service.registry().jobs()[0].waiter_count() < 2 {
            tokio::task::yield_now().await;
        }
        assert!(engine.emit_ready(ID, "Movie", movie()));

        assert_eq!(first.await.unwrap().unwrap().name(), "movie.mp4");
        assert_eq!(second.await.unwrap().unwrap().name(), "movie.mp4");
        assert_eq!(engine.add_count(ID), 1);
        assert_eq!(service.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_error_removes_job_and_fails_waiters() {
        let engine = MockSwarmEngine::new();
        let service = service(&engine);
        let (job, created) = service.admit(ID).unwrap();
        assert!(created);

        let waiting = tokio::spawn({
            let service = service.clone();
            let job = job.clone();
            async move { service.await_ready(&job, Duration::from_secs(5)).await }
        });
        while job.waiter_count() == 0 {
            tokio::task::yield_now().await;
        }

        engine.emit_error(ID, "no peers responded");
        assert!(matches!(
            waiting.await.unwrap(),
            ReadyOutcome::Failed(reason) if reason.contains("no peers")
        ));
        assert!(service.registry().find(ID).is_none());
        assert!(engine.is_destroyed(ID));

        let (_, created) = service.admit(ID).unwrap();
        assert!(created);
        assert_eq!(engine.add_count(ID), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_job_and_allows_retry() {
        let engine = MockSwarmEngine::new();
        let service = service(&engine);

        let result = service.prepare_stream(ID, Duration::from_secs(30)).await;
        assert!(matches!(result, Err(UndertowError::ResourceTimeout { .. })));
        assert!(service.registry().find(ID).is_none());
        assert!(engine.is_destroyed(ID));

        let (job, created) = service.admit(ID).unwrap();
        assert!(created);
        assert!(job.phase().is_pending());
        assert_eq!(engine.add_count(ID), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_waiter_timeouts_are_independent() {
        let engine = MockSwarmEngine::new();
        let service = service(&engine);
        let (job, _) = service.admit(ID).unwrap();

        let patient = tokio::spawn({
            let service = service.clone();
            let job = job.clone();
            async move { service.await_ready(&job, Duration::from_secs(60)).await }
        });
        while job.waiter_count() == 0 {
            tokio::task::yield_now().await;
        }

        let outcome = service.await_ready(&job, Duration::from_secs(5)).await;
        assert!(matches!(outcome, ReadyOutcome::TimedOut));
        assert!(service.registry().find(ID).is_none());
        // The patient caller still holds the download open
        assert!(!engine.is_destroyed(ID));

        // Readiness after detachment is not delivered
        engine.emit_ready(ID, "Movie", movie());
        assert!(matches!(patient.await.unwrap(), ReadyOutcome::TimedOut));
        assert!(engine.is_destroyed(ID));
        assert_eq!(job.phase().label(), "timed_out");
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_after_timeout_gets_fresh_job_and_full_window() {
        let engine = MockSwarmEngine::new();
        let service = service(&engine);

        let early = service.admit_waiting(ID).unwrap();
        let abandoned = Arc::clone(early.job());
        let outcome = service.wait(early, Duration::ZERO).await;
        assert!(matches!(outcome, ReadyOutcome::TimedOut));

        let late = service.admit_waiting(ID).unwrap();
        assert!(!Arc::ptr_eq(&abandoned, late.job()));
        assert!(late.job().phase().is_pending());
        assert_eq!(engine.add_count(ID), 2);

        let started = tokio::time::Instant::now();
        let outcome = service.wait(late, Duration::from_secs(30)).await;
        assert!(matches!(outcome, ReadyOutcome::TimedOut));
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attached_caller_outlives_sibling_timeout() {
        let engine = MockSwarmEngine::new();
        let service = service(&engine);

        let early = service.admit_waiting(ID).unwrap();
        let late = service.admit_waiting(ID).unwrap();
        assert!(Arc::ptr_eq(early.job(), late.job()));
        assert_eq!(late.job().waiter_count(), 2);

        let outcome = service.wait(early, Duration::ZERO).await;
        assert!(matches!(outcome, ReadyOutcome::TimedOut));
        assert!(service.registry().find(ID).is_none());
        assert!(late.job().phase().is_pending());
        assert!(!engine.is_destroyed(ID));

        let started = tokio::time::Instant::now();
        let outcome = service.wait(late, Duration::from_secs(30)).await;
        assert!(matches!(outcome, ReadyOutcome::TimedOut));
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(engine.is_destroyed(ID));
    }

    #[tokio::test]
    async fn test_no_media_file_is_client_error() {
        let engine = MockSwarmEngine::new();
        engine.seed_ready(ID, "Docs", vec![MockFile::new("readme.txt", vec![0u8; 4])]);
        let service = service(&engine);

        let error = service
            .prepare_stream(ID, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(error, UndertowError::NoMediaFile { .. }));
        assert!(error.is_user_error());
    }

    #[tokio::test]
    async fn test_add_failure_creates_no_job() {
        let engine = MockSwarmEngine::new();
        engine.fail_adds("engine refused");
        let service = service(&engine);

        assert!(service.admit(ID).is_err());
        assert!(service.registry().is_empty());
    }

    #[tokio::test]
    async fn test_find_file_and_remove() {
        let engine = MockSwarmEngine::new();
        engine.seed_ready(ID, "Movie", movie());
        let service = service(&engine);
        service
            .prepare_stream(ID, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(service.find_file("movie.mp4").unwrap().length(), 1000);
        assert!(service.find_file("missing.mp4").is_none());

        let snapshot = service.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].phase, "ready");
        assert_eq!(snapshot[0].files, 2);

        assert!(service.remove(ID));
        assert!(!service.remove(ID));
        assert!(engine.is_destroyed(ID));
        assert!(service.find_file("movie.mp4").is_none());
    }

    #[tokio::test]
    async fn test_error_after_ready_removes_job() {
        let engine = MockSwarmEngine::new();
        engine.seed_ready(ID, "Movie", movie());
        let service = service(&engine);
        let (job, _) = service.admit(ID).unwrap();
        assert!(matches!(
            service.await_ready(&job, Duration::from_secs(1)).await,
            ReadyOutcome::Ready(_)
        ));

        engine.emit_error(ID, "piece verification failed");
        while !job.phase().is_terminal() {
            tokio::task::yield_now().await;
        }
        assert!(service.registry().is_empty());
        assert!(service.find_file("movie.mp4").is_none());
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let engine = MockSwarmEngine::new();
        let service = service(&engine);
        service.admit(ID).unwrap();
        service.admit("magnet:?xt=urn:btih:def").unwrap();

        assert_eq!(service.shutdown(), 2);
        assert!(service.registry().is_empty());
        assert!(engine.is_destroyed(ID));
        assert!(engine.is_destroyed("magnet:?xt=urn:btih:def"));
    }
}
