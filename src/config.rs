use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DoorbotConfig {
    pub server: ServerConfig,
    pub door: DoorConfig,
    pub pins: PinConfig,
    pub sound: SoundConfig,
    pub cache: CacheConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// Base URL polled for the unlock flag
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Bearer token sent with every request (empty disables the header)
    #[serde(default)]
    pub api_key: String,

    /// Delay between polls in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: f64,

    /// Consecutive poll failures before the agent stops
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Sound list and heartbeat are reported every N polls
    #[serde(default = "default_report_every_polls")]
    pub report_every_polls: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DoorConfig {
    /// Relay settle time before the motor starts
    #[serde(default = "default_settle")]
    pub settle_secs: f64,

    /// Upper bound on waiting for the open end stop
    #[serde(default = "default_unlock_timeout")]
    pub unlock_timeout_secs: f64,

    /// Upper bound on waiting for the closed end stop
    #[serde(default = "default_relock_timeout")]
    pub relock_timeout_secs: f64,

    /// How long the bolt stays retracted
    #[serde(default = "default_hold")]
    pub hold_secs: f64,

    /// Limit switch sampling period
    #[serde(default = "default_limit_poll")]
    pub limit_poll_secs: f64,

    #[serde(default = "default_pwm_frequency")]
    pub pwm_frequency_hz: f64,

    #[serde(default = "default_pwm_duty")]
    pub pwm_duty_percent: f64,

    /// What to do about the bolt position when the process starts
    #[serde(default)]
    pub startup_recovery: StartupRecovery,
}

/// BCM pin numbers
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PinConfig {
    #[serde(default = "default_relay_pin")]
    pub relay: u8,

    #[serde(default = "default_direction_pin")]
    pub direction: u8,

    #[serde(default = "default_pwm_pin")]
    pub pwm: u8,

    /// Limit switch pressed when the bolt is fully retracted
    #[serde(default = "default_open_limit_pin")]
    pub open_limit: u8,

    /// Optional limit switch pressed when the bolt is fully extended
    pub closed_limit: Option<u8>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SoundConfig {
    /// Directory holding the cached `.wav` clips
    #[serde(default = "default_sound_directory")]
    pub directory: String,

    /// Playback is killed after this many seconds
    #[serde(default = "default_max_sound_duration")]
    pub max_duration_secs: f64,

    /// Player executable
    #[serde(default = "default_player")]
    pub player: String,

    /// ALSA device passed to the player
    #[serde(default = "default_sound_device")]
    pub device: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum total size of the sound directory
    #[serde(default = "default_cache_cap")]
    pub cap_bytes: u64,

    /// Seconds between sync/evict passes
    #[serde(default = "default_evict_interval")]
    pub evict_interval_secs: u64,

    /// Optional command that copies new clips into the sound directory
    pub sync_command: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AuditConfig {
    /// Local JSON backup of unlock events
    #[serde(default = "default_audit_path")]
    pub path: String,

    #[serde(default = "default_audit_max_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StartupRecovery {
    /// Trust that the bolt is extended and start polling right away
    #[default]
    AssumeLocked,
    /// Probe the open limit switch and run a relock if the bolt is retracted
    RelockIfOpen,
}

impl DoorbotConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("doorbot.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let mut builder = Config::builder()
            .set_default("server.url", default_server_url())?
            .set_default("server.api_key", "")?
            .set_default("server.poll_interval_secs", default_poll_interval())?
            .set_default("server.request_timeout_secs", default_request_timeout())?
            .set_default(
                "server.max_consecutive_failures",
                default_max_consecutive_failures() as i64,
            )?
            .set_default(
                "server.report_every_polls",
                default_report_every_polls() as i64,
            )?
            .set_default("door.settle_secs", default_settle())?
            .set_default("door.unlock_timeout_secs", default_unlock_timeout())?
            .set_default("door.relock_timeout_secs", default_relock_timeout())?
            .set_default("door.hold_secs", default_hold())?
            .set_default("door.limit_poll_secs", default_limit_poll())?
            .set_default("door.pwm_frequency_hz", default_pwm_frequency())?
            .set_default("door.pwm_duty_percent", default_pwm_duty())?
            .set_default("door.startup_recovery", "assume_locked")?
            .set_default("pins.relay", default_relay_pin() as i64)?
            .set_default("pins.direction", default_direction_pin() as i64)?
            .set_default("pins.pwm", default_pwm_pin() as i64)?
            .set_default("pins.open_limit", default_open_limit_pin() as i64)?
            .set_default("sound.directory", default_sound_directory())?
            .set_default("sound.max_duration_secs", default_max_sound_duration())?
            .set_default("sound.player", default_player())?
            .set_default("sound.device", default_sound_device())?
            .set_default("cache.cap_bytes", default_cache_cap() as i64)?
            .set_default(
                "cache.evict_interval_secs",
                default_evict_interval() as i64,
            )?
            .set_default("audit.path", default_audit_path())?
            .set_default("audit.max_entries", default_audit_max_entries() as i64)?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Nested keys use a double underscore, e.g. DOORBOT_SERVER__URL
            .add_source(
                Environment::with_prefix("DOORBOT")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // Deployment scripts export the key on its own
        if let Ok(api_key) = std::env::var("DOORBOT_API_KEY") {
            builder = builder.set_override("server.api_key", api_key)?;
        }

        let config: DoorbotConfig = builder.build()?.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config.redacted());

        Ok(config)
    }

    /// Copy with secrets blanked out, for logging
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.server.api_key.is_empty() {
            copy.server.api_key = "********".to_string();
        }
        copy
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.url.trim().is_empty() {
            return Err(ConfigError::Message(
                "Server url must not be empty".to_string(),
            ));
        }

        let positive = [
            ("server.poll_interval_secs", self.server.poll_interval_secs),
            ("server.request_timeout_secs", self.server.request_timeout_secs),
            ("door.unlock_timeout_secs", self.door.unlock_timeout_secs),
            ("door.relock_timeout_secs", self.door.relock_timeout_secs),
            ("door.hold_secs", self.door.hold_secs),
            ("door.limit_poll_secs", self.door.limit_poll_secs),
            ("door.pwm_frequency_hz", self.door.pwm_frequency_hz),
            ("sound.max_duration_secs", self.sound.max_duration_secs),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && Duration::try_from_secs_f64(value).is_ok()) {
                return Err(ConfigError::Message(format!(
                    "{} must be greater than 0 and finite",
                    name
                )));
            }
        }

        if !(self.door.settle_secs.is_finite() && self.door.settle_secs >= 0.0) {
            return Err(ConfigError::Message(
                "door.settle_secs must not be negative".to_string(),
            ));
        }

        if !(0.0..=100.0).contains(&self.door.pwm_duty_percent) {
            return Err(ConfigError::Message(
                "door.pwm_duty_percent must be between 0 and 100".to_string(),
            ));
        }

        if self.server.max_consecutive_failures == 0 {
            return Err(ConfigError::Message(
                "server.max_consecutive_failures must be greater than 0".to_string(),
            ));
        }

        if self.server.report_every_polls == 0 {
            return Err(ConfigError::Message(
                "server.report_every_polls must be greater than 0".to_string(),
            ));
        }

        if self.cache.cap_bytes == 0 {
            return Err(ConfigError::Message(
                "cache.cap_bytes must be greater than 0".to_string(),
            ));
        }

        if self.cache.evict_interval_secs == 0 {
            return Err(ConfigError::Message(
                "cache.evict_interval_secs must be greater than 0".to_string(),
            ));
        }

        if let Some(command) = &self.cache.sync_command {
            if command.is_empty() {
                return Err(ConfigError::Message(
                    "cache.sync_command must name a program".to_string(),
                ));
            }
        }

        let mut pins = vec![
            self.pins.relay,
            self.pins.direction,
            self.pins.pwm,
            self.pins.open_limit,
        ];
        pins.extend(self.pins.closed_limit);
        let unique: HashSet<u8> = pins.iter().copied().collect();
        if unique.len() != pins.len() {
            return Err(ConfigError::Message(
                "GPIO pins must all be distinct".to_string(),
            ));
        }

        Ok(())
    }
}

impl ServerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_secs)
    }
}

impl SoundConfig {
    pub fn directory_path(&self) -> PathBuf {
        PathBuf::from(&self.directory)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs_f64(self.max_duration_secs)
    }
}

impl CacheConfig {
    pub fn evict_interval(&self) -> Duration {
        Duration::from_secs(self.evict_interval_secs)
    }
}

impl Default for DoorbotConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                url: default_server_url(),
                api_key: String::new(),
                poll_interval_secs: default_poll_interval(),
                request_timeout_secs: default_request_timeout(),
                max_consecutive_failures: default_max_consecutive_failures(),
                report_every_polls: default_report_every_polls(),
            },
            door: DoorConfig {
                settle_secs: default_settle(),
                unlock_timeout_secs: default_unlock_timeout(),
                relock_timeout_secs: default_relock_timeout(),
                hold_secs: default_hold(),
                limit_poll_secs: default_limit_poll(),
                pwm_frequency_hz: default_pwm_frequency(),
                pwm_duty_percent: default_pwm_duty(),
                startup_recovery: StartupRecovery::default(),
            },
            pins: PinConfig {
                relay: default_relay_pin(),
                direction: default_direction_pin(),
                pwm: default_pwm_pin(),
                open_limit: default_open_limit_pin(),
                closed_limit: None,
            },
            sound: SoundConfig {
                directory: default_sound_directory(),
                max_duration_secs: default_max_sound_duration(),
                player: default_player(),
                device: default_sound_device(),
            },
            cache: CacheConfig {
                cap_bytes: default_cache_cap(),
                evict_interval_secs: default_evict_interval(),
                sync_command: None,
            },
            audit: AuditConfig {
                path: default_audit_path(),
                max_entries: default_audit_max_entries(),
            },
        }
    }
}

// Default value functions
fn default_server_url() -> String {
    "http://localhost:8878".to_string()
}
fn default_poll_interval() -> f64 {
    1.0
}
fn default_request_timeout() -> f64 {
    5.0
}
fn default_max_consecutive_failures() -> u32 {
    10
}
fn default_report_every_polls() -> u32 {
    60
}

fn default_settle() -> f64 {
    0.5
}
fn default_unlock_timeout() -> f64 {
    10.0
}
fn default_relock_timeout() -> f64 {
    6.5
} // Matches the fixed reverse time of single-switch installs
fn default_hold() -> f64 {
    10.0
}
fn default_limit_poll() -> f64 {
    0.1
}
fn default_pwm_frequency() -> f64 {
    500.0
}
fn default_pwm_duty() -> f64 {
    50.0
}

fn default_relay_pin() -> u8 {
    4
}
fn default_direction_pin() -> u8 {
    15
}
fn default_pwm_pin() -> u8 {
    18
}
fn default_open_limit_pin() -> u8 {
    7
}

fn default_sound_directory() -> String {
    "./sounds".to_string()
}
fn default_max_sound_duration() -> f64 {
    10.0
}
fn default_player() -> String {
    "aplay".to_string()
}
fn default_sound_device() -> String {
    "hw:0,0".to_string()
}

fn default_cache_cap() -> u64 {
    500 * 1024 * 1024
}
fn default_evict_interval() -> u64 {
    300
}

fn default_audit_path() -> String {
    "./unlock_log.json".to_string()
}
fn default_audit_max_entries() -> usize {
    100
}
