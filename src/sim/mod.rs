//! In-memory host used by the tests and the `simulate` subcommand.
//!
//! [`SimServer`] plays the part of the game server: it owns a deterministic
//! [`TickScheduler`], a [`SimWorld`] that spawns [`SimMount`]s, the known warps
//! and the online [`SimSubject`]s. Subjects record everything the engine does to
//! them as [`SimRecord`]s stamped with the tick they happened on.
//!
//! A subject's `perform_command` is routed back through the server, so the
//! commit's warp command re-enters the engine exactly like a real warp plugin.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use dashmap::DashMap;
use log::debug;
use uuid::Uuid;

use crate::config::Settings;
use crate::errors::HostError;
use crate::host::{
    CommandSender, Effect, EffectKind, Location, Mount, Sound, Subject, SubjectId, Title, Vector,
    World,
};
use crate::schedule::{TaskScheduler, TickScheduler};
use crate::service::WarpService;
use crate::text::RichText;
use crate::transition::{TransitionEngine, Verdict, WarpDescriptor};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Something the engine did to a subject.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Title { title: String, subtitle: String },
    ActionBar,
    Message(String),
    Sound { key: String, volume: f32, pitch: f32 },
    EffectApplied(Effect),
    EffectRemoved(EffectKind),
    Teleported(Location),
    Command(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimRecord {
    pub tick: u64,
    pub event: SimEvent,
}

pub struct SimSubject {
    this: Weak<SimSubject>,
    id: SubjectId,
    name: String,
    server: Weak<SimServer>,
    online: AtomicBool,
    reject_commands: AtomicBool,
    permissions: Mutex<HashSet<String>>,
    location: Mutex<Location>,
    effects: Mutex<HashMap<EffectKind, Effect>>,
    unknown_effects: Mutex<HashSet<EffectKind>>,
    records: Mutex<Vec<SimRecord>>,
}

impl SimSubject {
    fn record(&self, event: SimEvent) {
        let tick = self
            .server
            .upgrade()
            .map(|s| s.scheduler.current_tick())
            .unwrap_or(0);
        lock(&self.records).push(SimRecord { tick, event });
    }

    pub fn grant(&self, permission: &str) {
        lock(&self.permissions).insert(permission.to_string());
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Make `perform_command` fail with a host rejection.
    pub fn reject_commands(&self, reject: bool) {
        self.reject_commands.store(reject, Ordering::SeqCst);
    }

    /// Make applying `kind` fail as an unknown effect.
    pub fn forget_effect(&self, kind: EffectKind) {
        lock(&self.unknown_effects).insert(kind);
    }

    /// Move without going through the engine (as a mount ride or host teleport would).
    pub fn place(&self, location: Location) {
        *lock(&self.location) = location;
    }

    pub fn records(&self) -> Vec<SimRecord> {
        lock(&self.records).clone()
    }

    pub fn clear_records(&self) {
        lock(&self.records).clear();
    }

    pub fn has_effect(&self, kind: EffectKind) -> bool {
        lock(&self.effects).contains_key(&kind)
    }

    pub fn active_effects(&self) -> Vec<EffectKind> {
        let mut kinds: Vec<EffectKind> = lock(&self.effects).keys().copied().collect();
        kinds.sort_by_key(|k| k.key());
        kinds
    }

    /// `(tick, title, subtitle)` for every title shown.
    pub fn titles(&self) -> Vec<(u64, String, String)> {
        self.records()
            .into_iter()
            .filter_map(|r| match r.event {
                SimEvent::Title { title, subtitle } => Some((r.tick, title, subtitle)),
                _ => None,
            })
            .collect()
    }

    pub fn commands(&self) -> Vec<(u64, String)> {
        self.records()
            .into_iter()
            .filter_map(|r| match r.event {
                SimEvent::Command(c) => Some((r.tick, c)),
                _ => None,
            })
            .collect()
    }

    pub fn teleports(&self) -> Vec<(u64, Location)> {
        self.records()
            .into_iter()
            .filter_map(|r| match r.event {
                SimEvent::Teleported(l) => Some((r.tick, l)),
                _ => None,
            })
            .collect()
    }

    pub fn sounds(&self) -> Vec<(u64, String, f32)> {
        self.records()
            .into_iter()
            .filter_map(|r| match r.event {
                SimEvent::Sound { key, pitch, .. } => Some((r.tick, key, pitch)),
                _ => None,
            })
            .collect()
    }

    pub fn first_tick_of(&self, wanted: impl Fn(&SimEvent) -> bool) -> Option<u64> {
        self.records()
            .into_iter()
            .find(|r| wanted(&r.event))
            .map(|r| r.tick)
    }
}

impl Subject for SimSubject {
    fn id(&self) -> SubjectId {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn has_permission(&self, permission: &str) -> bool {
        lock(&self.permissions).contains(permission)
    }

    fn location(&self) -> Location {
        lock(&self.location).clone()
    }

    fn apply_effect(&self, effect: Effect) -> Result<(), HostError> {
        if lock(&self.unknown_effects).contains(&effect.kind) {
            return Err(HostError::InvalidIdentifier(effect.kind.key().to_string()));
        }
        lock(&self.effects).insert(effect.kind, effect);
        self.record(SimEvent::EffectApplied(effect));
        Ok(())
    }

    fn remove_effect(&self, kind: EffectKind) {
        if lock(&self.effects).remove(&kind).is_some() {
            self.record(SimEvent::EffectRemoved(kind));
        }
    }

    fn teleport(&self, to: &Location) -> Result<(), HostError> {
        self.place(to.clone());
        self.record(SimEvent::Teleported(to.clone()));
        Ok(())
    }

    fn perform_command(&self, command: &str) -> Result<(), HostError> {
        if self.reject_commands.load(Ordering::SeqCst) {
            return Err(HostError::Rejected(format!("command '{}' refused", command)));
        }
        self.record(SimEvent::Command(command.to_string()));
        let (Some(server), Some(me)) = (self.server.upgrade(), self.this.upgrade()) else {
            return Err(HostError::EntityGone(self.name.clone()));
        };
        server.dispatch_command(&me, command);
        Ok(())
    }

    fn play_sound(&self, sound: &Sound) -> Result<(), HostError> {
        self.record(SimEvent::Sound {
            key: sound.key.to_string(),
            volume: sound.volume,
            pitch: sound.pitch,
        });
        Ok(())
    }

    fn show_title(&self, title: Title) {
        self.record(SimEvent::Title {
            title: title.title.plain_text(),
            subtitle: title.subtitle.plain_text(),
        });
    }

    fn send_action_bar(&self, _text: RichText) {
        self.record(SimEvent::ActionBar);
    }

    fn send_message(&self, text: RichText) {
        self.record(SimEvent::Message(text.plain_text()));
    }
}

pub struct SimMount {
    id: Uuid,
    server: Weak<SimServer>,
    valid: AtomicBool,
    fail_reposition: AtomicBool,
    location: Mutex<Location>,
    passengers: Mutex<Vec<SubjectId>>,
}

impl SimMount {
    pub fn location(&self) -> Location {
        lock(&self.location).clone()
    }

    /// Remove from the world without going through the engine (chunk unload, etc.).
    pub fn vanish(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    pub fn fail_reposition(&self, fail: bool) {
        self.fail_reposition.store(fail, Ordering::SeqCst);
    }
}

impl Mount for SimMount {
    fn id(&self) -> Uuid {
        self.id
    }

    fn attach(&self, passenger: &dyn Subject) -> Result<(), HostError> {
        if !self.is_valid() {
            return Err(HostError::EntityGone(format!("mount {}", self.id)));
        }
        let mut passengers = lock(&self.passengers);
        if !passengers.contains(&passenger.id()) {
            passengers.push(passenger.id());
        }
        Ok(())
    }

    fn detach(&self, passenger: &dyn Subject) {
        lock(&self.passengers).retain(|id| *id != passenger.id());
    }

    fn reposition(&self, delta: Vector) -> Result<(), HostError> {
        if !self.is_valid() {
            return Err(HostError::EntityGone(format!("mount {}", self.id)));
        }
        if self.fail_reposition.load(Ordering::SeqCst) {
            return Err(HostError::Rejected("mount teleport refused".to_string()));
        }
        {
            let mut location = lock(&self.location);
            *location = location.offset(delta);
        }
        if let Some(server) = self.server.upgrade() {
            for id in self.passengers() {
                if let Some(subject) = server.subject(&id) {
                    let moved = subject.location().offset(delta);
                    subject.place(moved);
                }
            }
        }
        Ok(())
    }

    fn destroy(&self) {
        self.valid.store(false, Ordering::SeqCst);
        lock(&self.passengers).clear();
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn passengers(&self) -> Vec<SubjectId> {
        lock(&self.passengers).clone()
    }

    fn eject_all(&self) {
        lock(&self.passengers).clear();
    }
}

pub struct SimWorld {
    server: Weak<SimServer>,
    fail_spawn: AtomicBool,
    mounts: Mutex<Vec<Arc<SimMount>>>,
}

impl SimWorld {
    pub fn fail_spawn(&self, fail: bool) {
        self.fail_spawn.store(fail, Ordering::SeqCst);
    }

    /// Every mount ever spawned, valid or not.
    pub fn mounts(&self) -> Vec<Arc<SimMount>> {
        lock(&self.mounts).clone()
    }

    pub fn live_mounts(&self) -> usize {
        lock(&self.mounts).iter().filter(|m| m.is_valid()).count()
    }
}

impl World for SimWorld {
    fn spawn_mount(&self, at: &Location) -> Result<Arc<dyn Mount>, HostError> {
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(HostError::Rejected("mount spawn blocked".to_string()));
        }
        let mount = Arc::new(SimMount {
            id: Uuid::new_v4(),
            server: self.server.clone(),
            valid: AtomicBool::new(true),
            fail_reposition: AtomicBool::new(false),
            location: Mutex::new(at.clone()),
            passengers: Mutex::new(Vec::new()),
        });
        lock(&self.mounts).push(mount.clone());
        Ok(mount)
    }
}

/// Admin sender that keeps every message it receives.
pub struct SimConsole {
    name: String,
    permissions: HashSet<String>,
    messages: Mutex<Vec<String>>,
}

impl SimConsole {
    pub fn new(name: &str, permissions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }
}

impl CommandSender for SimConsole {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    fn send_message(&self, text: RichText) {
        lock(&self.messages).push(text.plain_text());
    }
}

pub struct SimServer {
    this: Weak<SimServer>,
    scheduler: Arc<TickScheduler>,
    world: Arc<SimWorld>,
    warps: Mutex<BTreeMap<String, Location>>,
    subjects: DashMap<SubjectId, Arc<SimSubject>>,
    service: OnceLock<Arc<WarpService>>,
}

impl SimServer {
    /// A server with no service installed yet.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<SimServer>| Self {
            this: this.clone(),
            scheduler: Arc::new(TickScheduler::new()),
            world: Arc::new(SimWorld {
                server: this.clone(),
                fail_spawn: AtomicBool::new(false),
                mounts: Mutex::new(Vec::new()),
            }),
            warps: Mutex::new(BTreeMap::new()),
            subjects: DashMap::new(),
            service: OnceLock::new(),
        })
    }

    /// A server running a [`WarpService`] with `settings`. `reload` on that service
    /// reads `warpfx.toml` in the working directory.
    pub fn with_settings(settings: Settings) -> Arc<Self> {
        let server = Self::new();
        let service = WarpService::with_settings(
            "warpfx.toml",
            server.world.clone(),
            server.scheduler.clone(),
            settings,
        );
        server.install(service);
        server
    }

    /// Install the service the server routes signals to. Only the first call wins.
    pub fn install(&self, service: Arc<WarpService>) -> bool {
        self.service.set(service).is_ok()
    }

    pub fn service(&self) -> Option<&Arc<WarpService>> {
        self.service.get()
    }

    pub fn engine(&self) -> Option<&Arc<TransitionEngine>> {
        self.service.get().map(|s| s.engine())
    }

    pub fn scheduler(&self) -> &Arc<TickScheduler> {
        &self.scheduler
    }

    pub fn world(&self) -> &Arc<SimWorld> {
        &self.world
    }

    pub fn add_warp(&self, name: &str, location: Location) {
        lock(&self.warps).insert(name.to_string(), location);
    }

    pub fn remove_warp(&self, name: &str) -> Option<Location> {
        lock(&self.warps).remove(name)
    }

    pub fn join(&self, name: &str, at: Location) -> Arc<SimSubject> {
        let subject = Arc::new_cyclic(|this: &Weak<SimSubject>| SimSubject {
            this: this.clone(),
            id: Uuid::new_v4(),
            name: name.to_string(),
            server: self.this.clone(),
            online: AtomicBool::new(true),
            reject_commands: AtomicBool::new(false),
            permissions: Mutex::new(HashSet::new()),
            location: Mutex::new(at),
            effects: Mutex::new(HashMap::new()),
            unknown_effects: Mutex::new(HashSet::new()),
            records: Mutex::new(Vec::new()),
        });
        self.subjects.insert(subject.id, subject.clone());
        subject
    }

    pub fn subject(&self, id: &SubjectId) -> Option<Arc<SimSubject>> {
        self.subjects.get(id).map(|s| s.value().clone())
    }

    /// Emulate the warp plugin: look the warp up, ask the engine, and teleport
    /// when allowed to proceed.
    pub fn warp(&self, subject: &Arc<SimSubject>, name: &str) -> Verdict {
        let location = lock(&self.warps).get(name).cloned();
        let descriptor = WarpDescriptor {
            name: Some(name.to_string()),
            location: location.clone(),
        };
        self.request_with(subject, &descriptor, location)
    }

    /// Fire a teleport request with an arbitrary descriptor.
    pub fn request_with(
        &self,
        subject: &Arc<SimSubject>,
        descriptor: &WarpDescriptor,
        location: Option<Location>,
    ) -> Verdict {
        let verdict = match self.engine() {
            Some(engine) => {
                let as_subject: Arc<dyn Subject> = subject.clone();
                engine.on_teleport_requested(as_subject, descriptor)
            }
            None => Verdict::Proceed,
        };
        if verdict == Verdict::Proceed {
            if let Some(to) = location {
                let _ = subject.teleport(&to);
            }
        }
        verdict
    }

    /// Emulate a movement packet. Applied only if the engine does not veto it.
    pub fn move_subject(&self, subject: &Arc<SimSubject>, to: Location) -> Verdict {
        let from = subject.location();
        let verdict = match self.engine() {
            Some(engine) => engine.on_move(&subject.id, &from, &to),
            None => Verdict::Proceed,
        };
        if verdict == Verdict::Proceed {
            subject.place(to);
        }
        verdict
    }

    pub fn damage(&self, subject: &Arc<SimSubject>) -> Verdict {
        match self.engine() {
            Some(engine) => engine.on_damage(&subject.id),
            None => Verdict::Proceed,
        }
    }

    pub fn quit(&self, subject: &Arc<SimSubject>) {
        if let Some(engine) = self.engine() {
            engine.on_disconnect(&subject.id);
        }
        subject.set_online(false);
        self.subjects.remove(&subject.id);
    }

    pub fn tick(&self) -> usize {
        self.scheduler.advance()
    }

    pub fn run_ticks(&self, ticks: u64) -> usize {
        self.scheduler.advance_by(ticks)
    }

    pub fn current_tick(&self) -> u64 {
        self.scheduler.current_tick()
    }

    /// Route a command line run by `subject`. Only the warp command is known: the
    /// one in the subject's running plan, else the engine's current one. Unknown
    /// warps are refused without firing a teleport request.
    fn dispatch_command(&self, subject: &Arc<SimSubject>, command: &str) {
        let Some(engine) = self.engine() else {
            return;
        };
        let warp_command = match engine.state(&subject.id()) {
            Some(state) => state.settings.warp_command.clone(),
            None => engine.settings().warp_command.clone(),
        };
        let mut parts = command.splitn(2, ' ');
        if parts.next() != Some(warp_command.as_str()) {
            return;
        }
        if let Some(name) = parts.next() {
            let known = lock(&self.warps).contains_key(name);
            if known {
                self.warp(subject, name);
            } else {
                debug!("Warp '{}' not found for {}", name, subject.name);
            }
        }
    }
}
