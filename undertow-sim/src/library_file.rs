//! Files of a library entry, read from disk in swarm-sized chunks.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use undertow_core::streaming::{ByteRange, ByteStream};
use undertow_core::swarm::{SwarmError, SwarmFile};

/// One file of a ready library entry.
///
/// Shares the cancellation flag of its download; reads stop between
/// chunks once the download is destroyed.
#[derive(Debug)]
pub struct LibraryFile {
    name: String,
    path: PathBuf,
    length: u64,
    chunk_size: usize,
    cancelled: Arc<AtomicBool>,
}

impl LibraryFile {
    pub(crate) fn new(
        name: String,
        path: PathBuf,
        length: u64,
        chunk_size: usize,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            name,
            path,
            length,
            chunk_size: chunk_size.max(1),
            cancelled,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SwarmFile for LibraryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn open(&self, range: Option<ByteRange>) -> Result<ByteStream, SwarmError> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(SwarmError::Destroyed);
        }

        let (position, remaining) = match range {
            Some(range) => (range.start, range.len()),
            None => (0, self.length),
        };

        let read = ChunkedRead {
            path: self.path.clone(),
            file: None,
            position,
            remaining,
            chunk_size: self.chunk_size,
            cancelled: Arc::clone(&self.cancelled),
        };

        Ok(Box::pin(futures::stream::unfold(read, |mut read| async move {
            if read.remaining == 0 {
                return None;
            }
            match read.next_chunk().await {
                Ok(chunk) => Some((Ok(chunk), read)),
                Err(e) => {
                    read.remaining = 0;
                    Some((Err(e), read))
                }
            }
        })))
    }
}

struct ChunkedRead {
    path: PathBuf,
    file: Option<File>,
    position: u64,
    remaining: u64,
    chunk_size: usize,
    cancelled: Arc<AtomicBool>,
}

impl ChunkedRead {
    async fn next_chunk(&mut self) -> io::Result<Bytes> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(io::Error::other("swarm download destroyed"));
        }

        let mut file = match self.file.take() {
            Some(file) => file,
            None => {
                let mut file = File::open(&self.path).await?;
                file.seek(SeekFrom::Start(self.position)).await?;
                file
            }
        };

        let want = self.remaining.min(self.chunk_size as u64) as usize;
        let mut buffer = BytesMut::zeroed(want);
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} ended at byte {}", self.path.display(), self.position),
            ));
        }

        buffer.truncate(read);
        self.position += read as u64;
        self.remaining -= read as u64;
        self.file = Some(file);
        Ok(buffer.freeze())
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    async fn collect(stream: ByteStream) -> io::Result<Vec<u8>> {
        let chunks: Vec<_> = stream.collect().await;
        let mut data = Vec::new();
        for chunk in chunks {
            data.extend_from_slice(&chunk?);
        }
        Ok(data)
    }

    fn library_file(dir: &tempfile::TempDir, data: &[u8]) -> (LibraryFile, Arc<AtomicBool>) {
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, data).unwrap();
        let cancelled = Arc::new(AtomicBool::new(false));
        let file = LibraryFile::new(
            "clip.mp4".to_string(),
            path,
            data.len() as u64,
            7,
            cancelled.clone(),
        );
        (file, cancelled)
    }

    #[tokio::test]
    async fn test_reads_whole_file_in_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..100).collect();
        let (file, _) = library_file(&dir, &data);

        let mut stream = file.open(None).unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().len(), 7);
        let rest = collect(stream).await.unwrap();
        assert_eq!(rest, &data[7..]);
    }

    #[tokio::test]
    async fn test_reads_requested_range() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..100).collect();
        let (file, _) = library_file(&dir, &data);

        let stream = file.open(Some(ByteRange::new(40, 59))).unwrap();
        assert_eq!(collect(stream).await.unwrap(), &data[40..60]);
    }

    #[tokio::test]
    async fn test_destroyed_download_stops_reads() {
        let dir = tempfile::tempdir().unwrap();
        let (file, cancelled) = library_file(&dir, &[1u8; 50]);

        let mut stream = file.open(None).unwrap();
        assert!(stream.next().await.unwrap().is_ok());

        cancelled.store(true, Ordering::SeqCst);
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
        assert!(matches!(file.open(None), Err(SwarmError::Destroyed)));
    }

    #[tokio::test]
    async fn test_truncated_file_reports_eof() {
        let dir = tempfile::tempdir().unwrap();
        let (file, _) = library_file(&dir, &[1u8; 10]);
        std::fs::write(file.path(), [1u8; 4]).unwrap();

        assert!(collect(file.open(None).unwrap()).await.is_err());
    }
}
