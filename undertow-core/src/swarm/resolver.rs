//! Media file selection within a ready swarm resource.

use std::fmt;
use std::sync::Arc;

use super::{SwarmContents, SwarmFile};

/// A file selected from a job's listing.
#[derive(Clone)]
pub struct MediaFile {
    /// Position in the resource's file list
    pub index: usize,
    pub file: Arc<dyn SwarmFile>,
}

impl MediaFile {
    pub fn name(&self) -> &str {
        self.file.name()
    }

    pub fn length(&self) -> u64 {
        self.file.length()
    }
}

impl fmt::Debug for MediaFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaFile")
            .field("index", &self.index)
            .field("name", &self.name())
            .field("length", &self.length())
            .finish()
    }
}

/// Picks the playable file by name suffix.
#[derive(Debug, Clone)]
pub struct MediaResolver {
    suffix: String,
}

impl MediaResolver {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// First file, in listing order, whose name ends with the suffix.
    /// Matching is case-sensitive.
    pub fn resolve(&self, contents: &SwarmContents) -> Option<MediaFile> {
        contents
            .files
            .iter()
            .enumerate()
            .find(|(_, file)| file.name().ends_with(&self.suffix))
            .map(|(index, file)| MediaFile {
                index,
                file: Arc::clone(file),
            })
    }
}

/// First file whose name equals `name` exactly.
pub fn find_by_name(contents: &SwarmContents, name: &str) -> Option<MediaFile> {
    contents
        .files
        .iter()
        .enumerate()
        .find(|(_, file)| file.name() == name)
        .map(|(index, file)| MediaFile {
            index,
            file: Arc::clone(file),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::test_mocks::MockFile;

    fn contents(names: &[&str]) -> SwarmContents {
        SwarmContents {
            name: "pack".to_string(),
            files: names
                .iter()
                .map(|name| Arc::new(MockFile::new(*name, vec![0u8; 10])) as Arc<dyn SwarmFile>)
                .collect(),
        }
    }

    #[test]
    fn test_first_match_in_listing_order_wins() {
        let resolver = MediaResolver::new(".mp4");
        let pack = contents(&["readme.txt", "b.mp4", "a.mp4"]);

        let media = resolver.resolve(&pack).unwrap();
        assert_eq!(media.index, 1);
        assert_eq!(media.name(), "b.mp4");
    }

    #[test]
    fn test_suffix_is_case_sensitive() {
        let resolver = MediaResolver::new(".mp4");
        assert!(resolver.resolve(&contents(&["MOVIE.MP4", "cover.jpg"])).is_none());
        assert!(resolver.resolve(&contents(&["movie.mp4.part"])).is_none());
        assert!(resolver.resolve(&contents(&[])).is_none());
    }

    #[test]
    fn test_find_by_exact_name() {
        let pack = contents(&["movie.mp4", "movie.mp4.srt"]);
        assert_eq!(find_by_name(&pack, "movie.mp4").unwrap().index, 0);
        assert_eq!(find_by_name(&pack, "movie.mp4.srt").unwrap().index, 1);
        assert!(find_by_name(&pack, "movie").is_none());
    }
}
