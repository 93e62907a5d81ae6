use crate::error::PlaybackError;
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Which clip an unlock should play
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoundRequest {
    /// Uniformly random `.wav` from the cache
    Random,
    /// A specific clip, falling back to random when it is missing
    Named(String),
    /// No sound at all
    Silent,
}

impl SoundRequest {
    /// Interpret the server's optional `sound` field
    pub fn from_server(sound: Option<&str>) -> Self {
        match sound.map(str::trim) {
            None | Some("") => SoundRequest::Random,
            Some(name) if name.eq_ignore_ascii_case("none") => SoundRequest::Silent,
            Some(name) => SoundRequest::Named(name.to_string()),
        }
    }
}

/// Flat directory of cached `.wav` clips
#[derive(Debug, Clone)]
pub struct SoundLibrary {
    directory: PathBuf,
}

impl SoundLibrary {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Names of all `.wav` files, sorted. A missing directory is empty.
    pub fn list_clips(&self) -> Result<Vec<String>, PlaybackError> {
        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PlaybackError::Directory {
                    directory: self.directory.display().to_string(),
                    source: e,
                })
            }
        };

        let mut clips: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| is_wav(name))
            .collect();
        clips.sort();
        Ok(clips)
    }

    /// Resolve a request to a clip path; `None` means nothing to play
    pub fn select<R: Rng + ?Sized>(
        &self,
        request: &SoundRequest,
        rng: &mut R,
    ) -> Result<Option<PathBuf>, PlaybackError> {
        match request {
            SoundRequest::Silent => {
                info!("Silent unlock requested - no sound");
                Ok(None)
            }
            SoundRequest::Named(name) => match self.named_clip(name) {
                Some(path) => Ok(Some(path)),
                None => {
                    warn!("Sound not found: {}, playing random", name);
                    self.random_clip(rng)
                }
            },
            SoundRequest::Random => self.random_clip(rng),
        }
    }

    fn named_clip(&self, name: &str) -> Option<PathBuf> {
        // Only bare file names inside the cache directory are accepted
        let candidate = Path::new(name);
        if candidate.components().count() != 1 || candidate.file_name().is_none() {
            return None;
        }
        let path = self.directory.join(candidate);
        path.is_file().then_some(path)
    }

    fn random_clip<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Option<PathBuf>, PlaybackError> {
        let clips = self.list_clips()?;
        match clips.choose(rng) {
            Some(name) => Ok(Some(self.directory.join(name))),
            None => {
                info!("No .wav files in {}", self.directory.display());
                Ok(None)
            }
        }
    }
}

pub(crate) fn is_wav(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn library_with(files: &[&str]) -> (TempDir, SoundLibrary) {
        let dir = TempDir::new().unwrap();
        for name in files {
            std::fs::write(dir.path().join(name), b"RIFF").unwrap();
        }
        let library = SoundLibrary::new(dir.path());
        (dir, library)
    }

    #[test]
    fn test_request_from_server() {
        assert_eq!(SoundRequest::from_server(None), SoundRequest::Random);
        assert_eq!(SoundRequest::from_server(Some("")), SoundRequest::Random);
        assert_eq!(SoundRequest::from_server(Some("none")), SoundRequest::Silent);
        assert_eq!(
            SoundRequest::from_server(Some("chime.wav")),
            SoundRequest::Named("chime.wav".to_string())
        );
    }

    #[test]
    fn test_list_clips_only_wav() {
        let (_dir, library) = library_with(&["b.wav", "a.WAV", "notes.txt"]);
        assert_eq!(library.list_clips().unwrap(), vec!["a.WAV", "b.wav"]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let library = SoundLibrary::new("/nonexistent/doorbot/sounds");
        assert!(library.list_clips().unwrap().is_empty());
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(library.select(&SoundRequest::Random, &mut rng).unwrap(), None);
    }

    #[test]
    fn test_named_clip_falls_back_to_random() {
        let (dir, library) = library_with(&["only.wav"]);
        let mut rng = StdRng::seed_from_u64(7);

        let named = library
            .select(&SoundRequest::Named("only.wav".to_string()), &mut rng)
            .unwrap();
        assert_eq!(named, Some(dir.path().join("only.wav")));

        let fallback = library
            .select(&SoundRequest::Named("missing.wav".to_string()), &mut rng)
            .unwrap();
        assert_eq!(fallback, Some(dir.path().join("only.wav")));
    }

    #[test]
    fn test_named_clip_rejects_paths() {
        let (_dir, library) = library_with(&[]);
        assert!(library.named_clip("../etc/passwd").is_none());
        assert!(library.named_clip("/etc/passwd").is_none());
    }

    #[test]
    fn test_silent_request_selects_nothing() {
        let (_dir, library) = library_with(&["a.wav"]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(library.select(&SoundRequest::Silent, &mut rng).unwrap(), None);
    }
}
