//! # Configuration Management Module
//!
//! Configuration is read from a TOML file into [`Config`], a loose mirror of the
//! file where every key is optional and numbers are kept wide. [`Settings::resolve`]
//! then turns it into the values the engine actually runs with, checking each
//! numeric value against its allowed range on its own. A value outside its range
//! is logged and replaced by its default; the rest of the file is unaffected.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use warpfx::config::{Config, Settings};
//!
//! fn main() -> anyhow::Result<()> {
//!     Config::create_default("config.toml")?;
//!     let config = Config::load("config.toml")?;
//!     let settings = Settings::resolve(&config);
//!     println!("Countdown: {}s", settings.countdown_seconds);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! warp_command = "pw"
//! cleanup_interval = 100
//! debug = false
//!
//! [countdown]
//! duration = 3
//! zoom_duration = 5
//! black_duration = 15
//! title = "<#f9e59d>ᴡᴀʀᴘɪɴɢ ɪɴ %seconds%"
//!
//! [countdown.sound]
//! enabled = true
//! type = "block.amethyst_block.break"
//! pitches = { "3" = 1.0, "2" = 1.2, "1" = 1.5 }
//!
//! [logging]
//! level = "info"
//! ```

use anyhow::{anyhow, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::Path;

use crate::transition::plan::Timings;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Command line run as the subject to perform the real teleport.
    pub warp_command: String,
    /// Ticks between orphaned-mount sweeps.
    pub cleanup_interval: i64,
    /// Promote transition tracing to info level.
    pub debug: bool,
    pub countdown: CountdownConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            warp_command: "pw".to_string(),
            cleanup_interval: 100,
            debug: false,
            countdown: CountdownConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownConfig {
    /// Seconds of countdown before the zoom starts.
    pub duration: i64,
    /// Ticks of zoom before the final title.
    pub zoom_duration: i64,
    /// Ticks of black screen between the final title and the teleport.
    pub black_duration: i64,
    pub zoom_speed_amplifier: i64,
    pub title: String,
    pub subtitle: String,
    pub final_title: String,
    pub final_subtitle: String,
    pub cancelled_title: String,
    pub cancelled_subtitle: String,
    pub title_timing: TitleTimingConfig,
    pub final_title_timing: TitleTimingConfig,
    /// Falls back to `title_timing` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_title_timing: Option<TitleTimingConfig>,
    pub blindness: EffectConfig,
    pub darkness: EffectConfig,
    pub sound: CountdownSoundConfig,
    pub final_sound: SoundConfig,
    pub arrival_sound: SoundConfig,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            duration: 3,
            zoom_duration: 5,
            black_duration: 15,
            zoom_speed_amplifier: 4,
            title: "<#f9e59d>ᴡᴀʀᴘɪɴɢ ɪɴ %seconds%".to_string(),
            subtitle: "<white>ᴅᴏ ɴᴏᴛ ᴍᴏᴠᴇ".to_string(),
            final_title: "<#7f91fd>ᴡᴀʀᴘɪɴɢ ᴛᴏ".to_string(),
            final_subtitle: "<white><sc>%warp%</sc>".to_string(),
            cancelled_title: "<red>TELEPORT CANCELLED".to_string(),
            cancelled_subtitle: "<gray>You moved".to_string(),
            title_timing: TitleTimingConfig::default(),
            final_title_timing: TitleTimingConfig::default(),
            cancelled_title_timing: None,
            blindness: EffectConfig::default(),
            darkness: EffectConfig::default(),
            sound: CountdownSoundConfig::default(),
            final_sound: SoundConfig {
                enabled: true,
                sound_type: "block.glass.break".to_string(),
                volume: 1.0,
                pitch: 0.8,
            },
            arrival_sound: SoundConfig {
                enabled: false,
                sound_type: "entity.enderman.teleport".to_string(),
                volume: 1.0,
                pitch: 1.0,
            },
        }
    }
}

/// Title fade timings in ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleTimingConfig {
    pub fade_in: i64,
    pub stay: i64,
    pub fade_out: i64,
}

impl Default for TitleTimingConfig {
    fn default() -> Self {
        Self {
            fade_in: 10,
            stay: 40,
            fade_out: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    pub enabled: bool,
    /// Seconds.
    pub duration: i64,
    pub amplifier: i64,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration: 3,
            amplifier: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownSoundConfig {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub sound_type: String,
    pub volume: f64,
    /// Pitch per remaining second, keyed by the second ("3", "2", "1").
    pub pitches: BTreeMap<String, f64>,
}

impl Default for CountdownSoundConfig {
    fn default() -> Self {
        let pitches = ["3", "2", "1"]
            .iter()
            .map(|s| (s.to_string(), 1.0))
            .collect();
        Self {
            enabled: true,
            sound_type: "block.amethyst_block.break".to_string(),
            volume: 1.0,
            pitches,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub sound_type: String,
    pub volume: f64,
    pub pitch: f64,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sound_type: String::new(),
            volume: 1.0,
            pitch: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        Self::from_toml_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path.display(), e))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Create a default configuration file
    pub fn create_default(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| anyhow!("Failed to create config directory {}: {}", parent.display(), e))?;
        }
        fs::write(path, content)
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path.display(), e))?;

        Ok(())
    }
}

/// Resolved title: templates plus tick timings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleSettings {
    pub title: String,
    pub subtitle: String,
    pub fade_in: u32,
    pub stay: u32,
    pub fade_out: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EffectSettings {
    pub enabled: bool,
    pub duration_seconds: u32,
    pub amplifier: u32,
}

impl EffectSettings {
    pub fn duration_ticks(&self) -> u32 {
        self.duration_seconds * 20
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoundSettings {
    pub enabled: bool,
    pub sound_type: String,
    pub volume: f32,
    pub pitch: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountdownSoundSettings {
    pub enabled: bool,
    pub sound_type: String,
    pub volume: f32,
    pub pitches: BTreeMap<u32, f32>,
}

/// Validated values the transition engine runs with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub warp_command: String,
    pub cleanup_interval: u64,
    pub debug: bool,
    pub countdown_seconds: u32,
    pub zoom_ticks: u32,
    pub black_ticks: u32,
    pub zoom_speed_amplifier: u32,
    pub countdown_title: TitleSettings,
    pub final_title: TitleSettings,
    pub cancelled_title: TitleSettings,
    pub blindness: EffectSettings,
    pub darkness: EffectSettings,
    pub countdown_sound: CountdownSoundSettings,
    pub final_sound: SoundSettings,
    pub arrival_sound: SoundSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings::resolve(&Config::default())
    }
}

fn validated_int(path: &str, value: i64, default: u32, min: u32, max: u32) -> u32 {
    if value < i64::from(min) || value > i64::from(max) {
        warn_out_of_range(path, value, min, max, default);
        return default;
    }
    value as u32
}

fn validated_float(path: &str, value: f64, default: f64, min: f64, max: f64) -> f32 {
    if !(min..=max).contains(&value) {
        warn_out_of_range(path, value, min, max, default);
        return default as f32;
    }
    value as f32
}

fn warn_out_of_range(path: &str, value: impl Display, min: impl Display, max: impl Display, default: impl Display) {
    warn!(
        "Invalid config value for '{}': {}. Must be between {} and {}. Using default: {}",
        path, value, min, max, default
    );
}

fn resolve_title(prefix: &str, title: &str, subtitle: &str, timing: &TitleTimingConfig) -> TitleSettings {
    TitleSettings {
        title: title.to_string(),
        subtitle: subtitle.to_string(),
        fade_in: validated_int(&format!("{}.fade_in", prefix), timing.fade_in, 10, 0, 200),
        stay: validated_int(&format!("{}.stay", prefix), timing.stay, 40, 0, 200),
        fade_out: validated_int(&format!("{}.fade_out", prefix), timing.fade_out, 10, 0, 200),
    }
}

fn resolve_effect(prefix: &str, effect: &EffectConfig) -> EffectSettings {
    EffectSettings {
        enabled: effect.enabled,
        duration_seconds: validated_int(&format!("{}.duration", prefix), effect.duration, 3, 1, 60),
        amplifier: validated_int(&format!("{}.amplifier", prefix), effect.amplifier, 0, 0, 10),
    }
}

fn resolve_sound(prefix: &str, sound: &SoundConfig, default_pitch: f64) -> SoundSettings {
    SoundSettings {
        enabled: sound.enabled,
        sound_type: sound.sound_type.clone(),
        volume: validated_float(&format!("{}.volume", prefix), sound.volume, 1.0, 0.0, 10.0),
        pitch: validated_float(&format!("{}.pitch", prefix), sound.pitch, default_pitch, 0.0, 2.0),
    }
}

impl Settings {
    pub fn resolve(config: &Config) -> Settings {
        let cd = &config.countdown;

        let warp_command = config.warp_command.trim().trim_start_matches('/').to_string();
        let warp_command = if warp_command.is_empty() {
            warn!("Invalid config value for 'warp_command': empty. Using default: pw");
            "pw".to_string()
        } else {
            warp_command
        };

        let mut pitches = BTreeMap::new();
        for (key, value) in &cd.sound.pitches {
            match key.trim().parse::<u32>() {
                Ok(second) if second >= 1 => {
                    let path = format!("countdown.sound.pitches.{}", key);
                    pitches.insert(second, validated_float(&path, *value, 1.0, 0.0, 2.0));
                }
                _ => warn!(
                    "Ignoring countdown.sound.pitches entry '{}': key must be a whole number of seconds",
                    key
                ),
            }
        }

        let cancelled_timing = cd.cancelled_title_timing.as_ref().unwrap_or(&cd.title_timing);

        Settings {
            warp_command,
            cleanup_interval: u64::from(validated_int(
                "cleanup_interval",
                config.cleanup_interval,
                100,
                1,
                72_000,
            )),
            debug: config.debug,
            countdown_seconds: validated_int("countdown.duration", cd.duration, 3, 1, 10),
            zoom_ticks: validated_int("countdown.zoom_duration", cd.zoom_duration, 5, 1, 100),
            black_ticks: validated_int("countdown.black_duration", cd.black_duration, 15, 1, 100),
            zoom_speed_amplifier: validated_int(
                "countdown.zoom_speed_amplifier",
                cd.zoom_speed_amplifier,
                4,
                0,
                10,
            ),
            countdown_title: resolve_title(
                "countdown.title_timing",
                &cd.title,
                &cd.subtitle,
                &cd.title_timing,
            ),
            final_title: resolve_title(
                "countdown.final_title_timing",
                &cd.final_title,
                &cd.final_subtitle,
                &cd.final_title_timing,
            ),
            cancelled_title: resolve_title(
                if cd.cancelled_title_timing.is_some() {
                    "countdown.cancelled_title_timing"
                } else {
                    "countdown.title_timing"
                },
                &cd.cancelled_title,
                &cd.cancelled_subtitle,
                cancelled_timing,
            ),
            blindness: resolve_effect("countdown.blindness", &cd.blindness),
            darkness: resolve_effect("countdown.darkness", &cd.darkness),
            countdown_sound: CountdownSoundSettings {
                enabled: cd.sound.enabled,
                sound_type: cd.sound.sound_type.clone(),
                volume: validated_float("countdown.sound.volume", cd.sound.volume, 1.0, 0.0, 10.0),
                pitches,
            },
            final_sound: resolve_sound("countdown.final_sound", &cd.final_sound, 0.8),
            arrival_sound: resolve_sound("countdown.arrival_sound", &cd.arrival_sound, 1.0),
        }
    }

    pub fn timings(&self) -> Timings {
        Timings {
            countdown_seconds: self.countdown_seconds,
            zoom_ticks: self.zoom_ticks,
            black_ticks: self.black_ticks,
        }
    }

    /// Countdown sound pitch for `seconds_left`, 1.0 when unset.
    pub fn countdown_pitch(&self, seconds_left: u32) -> f32 {
        self.countdown_sound
            .pitches
            .get(&seconds_left)
            .copied()
            .unwrap_or(1.0)
    }
}
