use super::library::{SoundLibrary, SoundRequest};
use super::reservations::ClipReservations;
use crate::config::SoundConfig;
use crate::error::PlaybackError;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How a playback process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEnd {
    Finished,
    /// Killed for running past the maximum duration
    Killed,
    Failed(String),
}

/// A clip that is playing in the background
#[derive(Debug)]
pub struct Playback {
    pub clip: String,
    pub handle: JoinHandle<PlaybackEnd>,
}

/// Plays one clip per unlock
pub trait SoundPlayer: Send {
    /// Start playback and return immediately. `Ok(None)` means nothing
    /// was played (silent request or empty cache).
    fn play(&mut self, request: &SoundRequest) -> Result<Option<Playback>, PlaybackError>;

    /// Names of the clips available for playback
    fn available_clips(&self) -> Vec<String>;
}

/// Runs an external player (`aplay` by default) on clips from the cache
pub struct CommandPlayer {
    player: String,
    device: String,
    max_duration: Duration,
    library: SoundLibrary,
    reservations: ClipReservations,
}

impl CommandPlayer {
    pub fn new(config: &SoundConfig, reservations: ClipReservations) -> Self {
        Self {
            player: config.player.clone(),
            device: config.device.clone(),
            max_duration: config.max_duration(),
            library: SoundLibrary::new(config.directory_path()),
            reservations,
        }
    }

    fn spawn(&self, path: PathBuf) -> Result<Playback, PlaybackError> {
        // Reserve before the player opens the file so eviction leaves it alone
        let reservation = self.reservations.reserve(&path);
        // The evictor may have removed it after the library listed it
        if !path.is_file() {
            return Err(PlaybackError::ClipNotFound(path.display().to_string()));
        }

        let mut child = Command::new(&self.player)
            .arg("-D")
            .arg(&self.device)
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlaybackError::Spawn {
                player: self.player.clone(),
                source: e,
            })?;

        let clip = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        info!("Playing {}", clip);

        let max_duration = self.max_duration;
        let clip_name = clip.clone();
        let handle = tokio::spawn(async move {
            let _reservation = reservation;
            match tokio::time::timeout(max_duration, child.wait()).await {
                Ok(Ok(status)) if status.success() => {
                    debug!("Playback of {} finished", clip_name);
                    PlaybackEnd::Finished
                }
                Ok(Ok(status)) => {
                    warn!("Player exited with {} for {}", status, clip_name);
                    PlaybackEnd::Failed(status.to_string())
                }
                Ok(Err(e)) => {
                    warn!("Failed waiting for player: {}", e);
                    PlaybackEnd::Failed(e.to_string())
                }
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill player for {}: {}", clip_name, e);
                    }
                    info!("Sound stopped (max {:.1}s)", max_duration.as_secs_f64());
                    PlaybackEnd::Killed
                }
            }
        });

        Ok(Playback { clip, handle })
    }
}

impl SoundPlayer for CommandPlayer {
    fn play(&mut self, request: &SoundRequest) -> Result<Option<Playback>, PlaybackError> {
        let selected = self.library.select(request, &mut rand::thread_rng())?;
        match selected {
            Some(path) => self.spawn(path).map(Some),
            None => Ok(None),
        }
    }

    fn available_clips(&self) -> Vec<String> {
        self.library.list_clips().unwrap_or_else(|e| {
            warn!("Failed to list sounds: {}", e);
            Vec::new()
        })
    }
}
