//! # Host World Interfaces
//!
//! The transition engine never owns game entities. Everything it touches on the
//! server (the subject being warped, the camera mount, sounds, titles and the
//! final named action) goes through the narrow traits defined here.
//!
//! Implementations must tolerate being called from inside a scheduled task and
//! may call back into the engine (for example `perform_command` re-dispatching a
//! teleport request). The engine therefore never holds a map guard across a call
//! into these traits.
//!
//! The [`crate::sim`] module contains an in-memory implementation used by the
//! tests and the `simulate` CLI subcommand.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::HostError;
use crate::text::RichText;

/// Stable identifier of a subject for the whole session.
pub type SubjectId = Uuid;

/// A position in a named world, with facing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub pitch: f32,
}

impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    pub fn with_rotation(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self
    }

    /// Squared distance to `other`, or `None` when the two are in different worlds.
    pub fn distance_squared(&self, other: &Location) -> Option<f64> {
        if self.world != other.world {
            return None;
        }
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        Some(dx * dx + dy * dy + dz * dz)
    }

    pub fn offset(&self, delta: Vector) -> Location {
        Location {
            world: self.world.clone(),
            x: self.x + delta.x,
            y: self.y + delta.y,
            z: self.z + delta.z,
            yaw: self.yaw,
            pitch: self.pitch,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.2}, {:.2}, {:.2})",
            self.world, self.x, self.y, self.z
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector {
    pub const ZERO: Vector = Vector {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector in the same direction. The zero vector stays zero.
    pub fn normalize(&self) -> Vector {
        let len = self.length();
        if len == 0.0 {
            return Vector::ZERO;
        }
        self.scale(1.0 / len)
    }

    pub fn scale(&self, factor: f64) -> Vector {
        Vector::new(self.x * factor, self.y * factor, self.z * factor)
    }
}

/// Status effects the transition applies and strips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    Darkness,
    Blindness,
    Invisibility,
    Speed,
}

impl EffectKind {
    /// Every kind a transition may apply; cleanup removes all of them.
    pub const TRANSITION: [EffectKind; 4] = [
        EffectKind::Darkness,
        EffectKind::Blindness,
        EffectKind::Invisibility,
        EffectKind::Speed,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            EffectKind::Darkness => "darkness",
            EffectKind::Blindness => "blindness",
            EffectKind::Invisibility => "invisibility",
            EffectKind::Speed => "speed",
        }
    }
}

/// An effect application: kind, length in ticks and amplifier. Effects are applied
/// without ambient particles or icons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effect {
    pub kind: EffectKind,
    pub duration_ticks: u32,
    pub amplifier: u32,
}

impl Effect {
    pub fn new(kind: EffectKind, duration_ticks: u32, amplifier: u32) -> Self {
        Self {
            kind,
            duration_ticks,
            amplifier,
        }
    }
}

/// Namespaced sound identifier (`namespace:path`, namespace defaults to `minecraft`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SoundKey {
    namespace: String,
    path: String,
}

impl SoundKey {
    pub fn parse(raw: &str) -> Result<Self, HostError> {
        let (namespace, path) = match raw.split_once(':') {
            Some((ns, path)) => (ns, path),
            None => ("minecraft", raw),
        };
        let ns_ok = !namespace.is_empty()
            && namespace
                .chars()
                .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_' | '-' | '.'));
        let path_ok = !path.is_empty()
            && path
                .chars()
                .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_' | '-' | '.' | '/'));
        if !ns_ok || !path_ok {
            return Err(HostError::InvalidIdentifier(raw.to_string()));
        }
        Ok(Self {
            namespace: namespace.to_string(),
            path: path.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for SoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

/// A sound played on the master channel, emitted by (and following) the subject.
#[derive(Debug, Clone, PartialEq)]
pub struct Sound {
    pub key: SoundKey,
    pub volume: f32,
    pub pitch: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleTimes {
    pub fade_in: Duration,
    pub stay: Duration,
    pub fade_out: Duration,
}

impl TitleTimes {
    /// Build from tick counts; one tick is 50 ms.
    pub fn from_ticks(fade_in: u32, stay: u32, fade_out: u32) -> Self {
        let ms = |ticks: u32| Duration::from_millis(u64::from(ticks) * 50);
        Self {
            fade_in: ms(fade_in),
            stay: ms(stay),
            fade_out: ms(fade_out),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Title {
    pub title: RichText,
    pub subtitle: RichText,
    pub times: TitleTimes,
}

/// An online entity that can be warped.
pub trait Subject: Send + Sync {
    fn id(&self) -> SubjectId;
    fn name(&self) -> String;
    fn is_online(&self) -> bool;
    fn has_permission(&self, permission: &str) -> bool;
    fn location(&self) -> Location;
    fn apply_effect(&self, effect: Effect) -> Result<(), HostError>;
    fn remove_effect(&self, kind: EffectKind);
    fn teleport(&self, to: &Location) -> Result<(), HostError>;
    /// Run a named host action (a command line) as this subject.
    fn perform_command(&self, command: &str) -> Result<(), HostError>;
    fn play_sound(&self, sound: &Sound) -> Result<(), HostError>;
    fn show_title(&self, title: Title);
    fn send_action_bar(&self, text: RichText);
    fn send_message(&self, text: RichText);
}

/// A camera vehicle that carries the subject during the zoom phase.
pub trait Mount: Send + Sync {
    fn id(&self) -> Uuid;
    fn attach(&self, passenger: &dyn Subject) -> Result<(), HostError>;
    fn detach(&self, passenger: &dyn Subject);
    /// Move by `delta` while keeping every passenger seated.
    fn reposition(&self, delta: Vector) -> Result<(), HostError>;
    fn destroy(&self);
    fn is_valid(&self) -> bool;
    fn passengers(&self) -> Vec<SubjectId>;
    fn eject_all(&self);
}

pub trait World: Send + Sync {
    /// Spawn an invisible, silent, AI-less, invulnerable, gravity-free mount.
    fn spawn_mount(&self, at: &Location) -> Result<Arc<dyn Mount>, HostError>;
}

/// Issuer of an admin command.
pub trait CommandSender: Send + Sync {
    fn name(&self) -> String;
    fn has_permission(&self, permission: &str) -> bool;
    fn send_message(&self, text: RichText);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_across_worlds_is_undefined() {
        let a = Location::new("world", 0.0, 64.0, 0.0);
        let b = Location::new("world_nether", 0.0, 64.0, 0.0);
        assert_eq!(a.distance_squared(&b), None);

        let moved = a.offset(Vector::new(0.3, 0.0, 0.4));
        let d2 = a.distance_squared(&moved).unwrap();
        assert!((d2 - 0.25).abs() < 1e-9);
    }

    #[test]
    fn normalize_handles_zero() {
        assert_eq!(Vector::ZERO.normalize(), Vector::ZERO);
        let unit = Vector::new(3.0, 0.0, 4.0).normalize();
        assert!((unit.length() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sound_keys() {
        let key = SoundKey::parse("block.glass.break").unwrap();
        assert_eq!(key.to_string(), "minecraft:block.glass.break");
        let custom = SoundKey::parse("myserver:warp/whoosh").unwrap();
        assert_eq!(custom.namespace(), "myserver");
        assert!(SoundKey::parse("Not A Sound").is_err());
        assert!(SoundKey::parse("").is_err());
        assert!(SoundKey::parse("minecraft:").is_err());
    }

    #[test]
    fn title_ticks_are_fifty_ms() {
        let times = TitleTimes::from_ticks(10, 40, 10);
        assert_eq!(times.fade_in, Duration::from_millis(500));
        assert_eq!(times.stay, Duration::from_millis(2000));
    }
}
