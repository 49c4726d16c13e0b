//! Swarm engine backed by a local media library.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use undertow_core::magnet::MagnetParser;
use undertow_core::swarm::{
    SwarmContents, SwarmEngine, SwarmError, SwarmEvent, SwarmFile, SwarmHandle, SwarmTorrent,
};

use crate::LibraryFile;

/// Behaviour of the simulated swarm.
#[derive(Debug, Clone)]
pub struct LibraryEngineConfig {
    /// Delay before metadata is announced
    pub metadata_delay: Duration,
    /// Probability that a download fails instead of becoming ready (0.0 to 1.0)
    pub failure_rate: f64,
    /// Seed for failure injection
    pub seed: u64,
    /// Size of the chunks yielded by file reads
    pub chunk_size: usize,
}

impl Default for LibraryEngineConfig {
    fn default() -> Self {
        Self {
            metadata_delay: Duration::from_millis(200),
            failure_rate: 0.0,
            seed: 42,
            chunk_size: 256 * 1024,
        }
    }
}

/// Development engine resolving swarm identifiers against a directory.
///
/// A magnet's `dn` or hex info hash names either a subdirectory of the
/// library (its files, sorted by name, form the listing) or a single file.
/// Identifiers with no matching entry never become ready, like a swarm
/// without peers.
pub struct LibrarySwarmEngine {
    library_dir: PathBuf,
    config: LibraryEngineConfig,
    rng: Mutex<ChaCha8Rng>,
}

impl LibrarySwarmEngine {
    pub fn new(library_dir: impl Into<PathBuf>, mut config: LibraryEngineConfig) -> Self {
        config.failure_rate = config.failure_rate.clamp(0.0, 1.0);
        Self {
            library_dir: library_dir.into(),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(config.seed)),
            config,
        }
    }

    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }
}

impl SwarmEngine for LibrarySwarmEngine {
    fn add(&self, identifier: &str) -> Result<SwarmHandle, SwarmError> {
        let magnet = MagnetParser::parse(identifier)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| SwarmError::Backend {
            reason: format!("library engine needs a tokio runtime: {e}"),
        })?;

        let mut candidates: Vec<String> = magnet.display_name.into_iter().collect();
        candidates.push(magnet.info_hash.to_string());
        candidates.retain(|name| is_plain_name(name));

        let fail = self.rng.lock().random_bool(self.config.failure_rate);
        let cancelled = Arc::new(AtomicBool::new(false));
        let (events, receiver) = mpsc::unbounded_channel();

        runtime.spawn(announce(
            Announcement {
                library_dir: self.library_dir.clone(),
                candidates,
                delay: self.config.metadata_delay,
                fail,
                chunk_size: self.config.chunk_size,
                cancelled: Arc::clone(&cancelled),
            },
            events,
        ));

        debug!("Library engine added {}", magnet.info_hash);
        Ok(SwarmHandle {
            torrent: Arc::new(LibraryTorrent {
                info_hash: magnet.info_hash.to_string(),
                cancelled,
            }),
            events: receiver,
        })
    }
}

struct LibraryTorrent {
    info_hash: String,
    cancelled: Arc<AtomicBool>,
}

impl SwarmTorrent for LibraryTorrent {
    fn destroy(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            info!("Destroyed library download {}", self.info_hash);
        }
    }
}

struct Announcement {
    library_dir: PathBuf,
    candidates: Vec<String>,
    delay: Duration,
    fail: bool,
    chunk_size: usize,
    cancelled: Arc<AtomicBool>,
}

async fn announce(announcement: Announcement, events: mpsc::UnboundedSender<SwarmEvent>) {
    tokio::time::sleep(announcement.delay).await;
    if announcement.cancelled.load(Ordering::SeqCst) {
        return;
    }

    if announcement.fail {
        let _ = events.send(SwarmEvent::Error(SwarmError::Backend {
            reason: "Simulated swarm failure".to_string(),
        }));
        return;
    }

    match scan(&announcement).await {
        Ok(Some(contents)) => {
            info!(
                "Library entry {} ready ({} files)",
                contents.name,
                contents.files.len()
            );
            let _ = events.send(SwarmEvent::Ready(contents));
            // Local files are complete as soon as they are listed
            let _ = events.send(SwarmEvent::Done);
        }
        Ok(None) => {
            debug!(
                "No library entry for {:?}, staying pending",
                announcement.candidates
            );
            events.closed().await;
        }
        Err(e) => {
            warn!("Failed to scan library entry: {}", e);
            let _ = events.send(SwarmEvent::Error(SwarmError::Io(e)));
        }
    }
}

/// First candidate that exists in the library, as ready contents.
async fn scan(announcement: &Announcement) -> io::Result<Option<SwarmContents>> {
    for name in &announcement.candidates {
        let path = announcement.library_dir.join(name);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };

        let mut entries = if metadata.is_dir() {
            list_dir(&path).await?
        } else {
            vec![(name.clone(), path, metadata.len())]
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let files = entries
            .into_iter()
            .map(|(file_name, path, length)| {
                Arc::new(LibraryFile::new(
                    file_name,
                    path,
                    length,
                    announcement.chunk_size,
                    Arc::clone(&announcement.cancelled),
                )) as Arc<dyn SwarmFile>
            })
            .collect();

        return Ok(Some(SwarmContents {
            name: name.clone(),
            files,
        }));
    }

    Ok(None)
}

async fn list_dir(dir: &Path) -> io::Result<Vec<(String, PathBuf, u64)>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if metadata.is_file() {
            files.push((
                entry.file_name().to_string_lossy().into_owned(),
                entry.path(),
                metadata.len(),
            ));
        }
    }
    Ok(files)
}

/// A single normal path component, so names cannot escape the library.
fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tokio::time::timeout;

    use super::*;

    const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    fn instant_config() -> LibraryEngineConfig {
        LibraryEngineConfig {
            metadata_delay: Duration::ZERO,
            ..LibraryEngineConfig::default()
        }
    }

    fn magnet(display_name: &str) -> String {
        format!("magnet:?xt=urn:btih:{HASH}&dn={display_name}")
    }

    async fn next_event(handle: &mut SwarmHandle) -> Option<SwarmEvent> {
        timeout(Duration::from_millis(200), handle.events.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_directory_entry_lists_sorted_files() {
        let library = tempfile::tempdir().unwrap();
        let entry = library.path().join("Big Buck Bunny");
        std::fs::create_dir(&entry).unwrap();
        std::fs::write(entry.join("poster.jpg"), b"jpg").unwrap();
        std::fs::write(entry.join("bunny.mp4"), vec![5u8; 64]).unwrap();

        let engine = LibrarySwarmEngine::new(library.path(), instant_config());
        let mut handle = engine.add(&magnet("Big+Buck+Bunny")).unwrap();

        let Some(SwarmEvent::Ready(contents)) = next_event(&mut handle).await else {
            panic!("expected readiness");
        };
        assert_eq!(contents.name, "Big Buck Bunny");
        let names: Vec<_> = contents.files.iter().map(|file| file.name()).collect();
        assert_eq!(names, vec!["bunny.mp4", "poster.jpg"]);
        assert_eq!(contents.files[0].length(), 64);
        assert!(matches!(next_event(&mut handle).await, Some(SwarmEvent::Done)));
    }

    #[tokio::test]
    async fn test_info_hash_names_single_file() {
        let library = tempfile::tempdir().unwrap();
        std::fs::write(library.path().join(HASH), b"raw media").unwrap();

        let engine = LibrarySwarmEngine::new(library.path(), instant_config());
        let mut handle = engine
            .add(&format!("magnet:?xt=urn:btih:{HASH}"))
            .unwrap();

        let Some(SwarmEvent::Ready(contents)) = next_event(&mut handle).await else {
            panic!("expected readiness");
        };
        let mut stream = contents.files[0].open(None).unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().as_ref(), b"raw media");
    }

    #[tokio::test]
    async fn test_unknown_entry_stays_pending() {
        let library = tempfile::tempdir().unwrap();
        let engine = LibrarySwarmEngine::new(library.path(), instant_config());

        let mut handle = engine.add(&magnet("Missing")).unwrap();
        assert!(
            timeout(Duration::from_millis(100), handle.events.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_escaping_names_are_ignored() {
        let library = tempfile::tempdir().unwrap();
        let engine = LibrarySwarmEngine::new(library.path().join("inner"), instant_config());
        std::fs::create_dir(library.path().join("inner")).unwrap();
        std::fs::write(library.path().join("secret.mp4"), b"x").unwrap();

        let mut handle = engine.add(&magnet("..%2Fsecret.mp4")).unwrap();
        assert!(
            timeout(Duration::from_millis(100), handle.events.recv())
                .await
                .is_err()
        );
        assert!(!is_plain_name("../secret.mp4"));
        assert!(!is_plain_name(""));
        assert!(is_plain_name("Sintel (2010)"));
    }

    #[tokio::test]
    async fn test_failure_injection_is_seeded() {
        let library = tempfile::tempdir().unwrap();
        let config = LibraryEngineConfig {
            failure_rate: 1.0,
            ..instant_config()
        };
        let engine = LibrarySwarmEngine::new(library.path(), config);

        let mut handle = engine.add(&magnet("Anything")).unwrap();
        assert!(matches!(
            next_event(&mut handle).await,
            Some(SwarmEvent::Error(SwarmError::Backend { .. }))
        ));
    }

    #[tokio::test]
    async fn test_invalid_identifier_rejected() {
        let library = tempfile::tempdir().unwrap();
        let engine = LibrarySwarmEngine::new(library.path(), instant_config());
        assert!(matches!(
            engine.add("magnet:?dn=no-hash"),
            Err(SwarmError::InvalidIdentifier { .. })
        ));
    }

    #[tokio::test]
    async fn test_destroy_before_announce_suppresses_events() {
        let library = tempfile::tempdir().unwrap();
        std::fs::write(library.path().join(HASH), b"x").unwrap();
        let config = LibraryEngineConfig {
            metadata_delay: Duration::from_millis(50),
            ..LibraryEngineConfig::default()
        };
        let engine = LibrarySwarmEngine::new(library.path(), config);

        let mut handle = engine.add(&format!("magnet:?xt=urn:btih:{HASH}")).unwrap();
        handle.torrent.destroy();
        assert!(handle.events.recv().await.is_none());
    }
}
