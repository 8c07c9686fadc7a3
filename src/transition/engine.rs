//! Transition engine
//!
//! Owns every subject's [`TransitionState`] and drives the plan computed in
//! [`crate::transition::plan`]. The host feeds it four signals: a teleport
//! request, movement, damage and disconnect. Phase actions run on the host
//! [`TaskScheduler`] and always look the state up again before acting, so a plan
//! that was cancelled or replaced simply finds nothing to do.
//!
//! Locking rules:
//! * State is only read or mutated through the [`StateStore`] calls; no guard is
//!   held while calling into the host, because host calls may re-enter the engine
//!   (the commit's named action re-fires `on_teleport_requested`).
//! * Every scheduled handle of a plan is adopted by the plan's
//!   [`CancellationScope`], which teardown cancels exactly once.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use dashmap::DashSet;
use log::{error, info, warn};

use crate::config::{Settings, SoundSettings, TitleSettings};
use crate::errors::{HostError, TransitionError};
use crate::host::{
    Effect, EffectKind, Location, Mount, Sound, SoundKey, Subject, SubjectId, Vector, World,
};
use crate::schedule::{CancellationScope, TaskScheduler};
use crate::text::{send_timed_text, RichText};
use crate::transition::plan::{PhaseList, PhaseStep, INVISIBILITY_DURATION_TICKS, SPEED_EXTRA_TICKS};
use crate::transition::state::{
    DashMapStore, Destination, DriveState, Phase, StateStore, TransitionState,
};

/// Subjects holding this permission are never intercepted.
pub const BYPASS_PERMISSION: &str = "warpfx.bypass";

/// Squared displacement above which a counting-down subject counts as moved.
pub const MOVEMENT_THRESHOLD_SQUARED: f64 = 0.1 * 0.1;

/// The mount spawns this far below the subject's feet.
pub const MOUNT_SPAWN_OFFSET: f64 = 0.3;

/// Debug-gated tracing: `info!` when `debug = true` in the config, `debug!` otherwise.
macro_rules! trace_plan {
    ($settings:expr, $($arg:tt)+) => {
        if $settings.debug {
            log::info!($($arg)+)
        } else {
            log::debug!($($arg)+)
        }
    };
}

/// Outcome for a host signal that the engine may veto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    Suppressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    Moved,
    Damaged,
    Disconnected,
    Fault,
    Shutdown,
    Requested,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CancelReason::Moved => "moved",
            CancelReason::Damaged => "damaged",
            CancelReason::Disconnected => "disconnected",
            CancelReason::Fault => "fault",
            CancelReason::Shutdown => "shutdown",
            CancelReason::Requested => "requested",
        };
        f.write_str(text)
    }
}

/// The warp a host teleport request refers to, as the host reports it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarpDescriptor {
    pub name: Option<String>,
    pub location: Option<Location>,
}

impl WarpDescriptor {
    pub fn new(name: impl Into<String>, location: Location) -> Self {
        Self {
            name: Some(name.into()),
            location: Some(location),
        }
    }

    /// Resolve into a destination. A missing location is fatal; a missing or
    /// empty name is logged and replaced by `Unknown`.
    pub fn resolve(&self, subject_name: &str) -> Result<Destination, TransitionError> {
        let location = self.location.clone().ok_or_else(|| TransitionError::InvalidWarp {
            subject: subject_name.to_string(),
            reason: "warp location is missing".to_string(),
        })?;
        let label = match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                warn!("Warp name is missing or empty for {}", subject_name);
                crate::text::formatter::UNKNOWN_WARP.to_string()
            }
        };
        Ok(Destination { label, location })
    }
}

pub struct TransitionEngine {
    this: Weak<TransitionEngine>,
    world: Arc<dyn World>,
    scheduler: Arc<dyn TaskScheduler>,
    settings: RwLock<Arc<Settings>>,
    states: Box<dyn StateStore<TransitionState>>,
    mounts: Box<dyn StateStore<Arc<dyn Mount>>>,
    exempt: DashSet<SubjectId>,
    next_plan: AtomicU64,
}

impl TransitionEngine {
    pub fn new(
        world: Arc<dyn World>,
        scheduler: Arc<dyn TaskScheduler>,
        settings: Settings,
    ) -> Arc<Self> {
        Self::with_stores(
            world,
            scheduler,
            settings,
            Box::new(DashMapStore::new()),
            Box::new(DashMapStore::new()),
        )
    }

    /// Build with caller-supplied stores for state and the mount registry.
    pub fn with_stores(
        world: Arc<dyn World>,
        scheduler: Arc<dyn TaskScheduler>,
        settings: Settings,
        states: Box<dyn StateStore<TransitionState>>,
        mounts: Box<dyn StateStore<Arc<dyn Mount>>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            world,
            scheduler,
            settings: RwLock::new(Arc::new(settings)),
            states,
            mounts,
            exempt: DashSet::new(),
            next_plan: AtomicU64::new(0),
        })
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Swap in new settings. Plans already running keep the snapshot they started with.
    pub fn apply_settings(&self, settings: Settings) {
        let mut guard = self
            .settings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(settings);
    }

    pub fn scheduler(&self) -> &Arc<dyn TaskScheduler> {
        &self.scheduler
    }

    pub fn phase(&self, id: &SubjectId) -> Phase {
        self.states.get(id).map(|s| s.phase).unwrap_or(Phase::Idle)
    }

    pub fn state(&self, id: &SubjectId) -> Option<TransitionState> {
        self.states.get(id)
    }

    pub fn active_count(&self) -> usize {
        self.states.len()
    }

    /// Whether the subject's next teleport request will be let through.
    pub fn is_exempt(&self, id: &SubjectId) -> bool {
        self.exempt.contains(id)
    }

    /// Subject to mount associations, as seen by the reconciler.
    pub fn mount_registry(&self) -> &dyn StateStore<Arc<dyn Mount>> {
        self.mounts.as_ref()
    }

    // ---- inbound signals -------------------------------------------------

    /// Host hook for a teleport about to happen.
    pub fn on_teleport_requested(
        &self,
        subject: Arc<dyn Subject>,
        warp: &WarpDescriptor,
    ) -> Verdict {
        let settings = self.settings();
        let id = subject.id();

        if subject.has_permission(BYPASS_PERMISSION) {
            trace_plan!(settings, "{} has bypass permission, allowing instant teleport", subject.name());
            return Verdict::Proceed;
        }

        if self.exempt.remove(&id).is_some() {
            trace_plan!(settings, "{} completed countdown, allowing warp to proceed", subject.name());
            return Verdict::Proceed;
        }

        let destination = match warp.resolve(&subject.name()) {
            Ok(destination) => destination,
            Err(e) => {
                error!("{}", e);
                return Verdict::Suppressed;
            }
        };

        if let Err(e) = self.request_transition(subject, destination) {
            warn!("Rejected teleport request: {}", e);
        }
        Verdict::Suppressed
    }

    /// Start a plan for `subject`. Fails if the subject already has one.
    pub fn request_transition(
        &self,
        subject: Arc<dyn Subject>,
        destination: Destination,
    ) -> Result<u64, TransitionError> {
        let id = subject.id();
        let settings = self.settings();
        let plan_id = self.next_plan.fetch_add(1, Ordering::SeqCst) + 1;
        let label = destination.label.clone();

        let state = TransitionState::new(plan_id, subject.clone(), destination, settings.clone());
        let scope = state.scope.clone();
        if self.states.insert_if_absent(id, state).is_err() {
            return Err(TransitionError::AlreadyActive(id));
        }

        let plan = PhaseList::countdown(&settings.timings());
        self.run_phase_list(id, plan_id, &scope, &plan);
        trace_plan!(
            settings,
            "Started {}s countdown for {} to {} (plan {}, {} steps)",
            settings.countdown_seconds,
            subject.name(),
            label,
            plan_id,
            plan.len()
        );
        Ok(plan_id)
    }

    /// Position update. Vetoed while riding; cancels a countdown past the threshold.
    pub fn on_move(&self, id: &SubjectId, from: &Location, to: &Location) -> Verdict {
        let Some(state) = self.states.get(id) else {
            return Verdict::Proceed;
        };
        match state.phase {
            Phase::Transitioning => Verdict::Suppressed,
            Phase::CountingDown => {
                let moved = from
                    .distance_squared(to)
                    .map_or(true, |d2| d2 > MOVEMENT_THRESHOLD_SQUARED);
                if moved {
                    self.cancel_transition(id, CancelReason::Moved);
                }
                Verdict::Proceed
            }
            _ => Verdict::Proceed,
        }
    }

    /// Incoming damage. Vetoed while riding; cancels a countdown.
    pub fn on_damage(&self, id: &SubjectId) -> Verdict {
        match self.phase(id) {
            Phase::Transitioning => Verdict::Suppressed,
            Phase::CountingDown => {
                self.cancel_transition(id, CancelReason::Damaged);
                Verdict::Proceed
            }
            _ => Verdict::Proceed,
        }
    }

    /// Subject left. A riding subject is put back where the zoom started first.
    pub fn on_disconnect(&self, id: &SubjectId) {
        if let Some(state) = self.states.get(id) {
            if state.phase == Phase::Transitioning {
                if let Some(origin) = &state.original_location {
                    match state.subject.teleport(origin) {
                        Ok(()) => trace_plan!(
                            state.settings,
                            "Teleported {} back to original location on disconnect",
                            state.subject.name()
                        ),
                        Err(e) => warn!(
                            "Could not return {} to {} on disconnect: {}",
                            state.subject.name(),
                            origin,
                            e
                        ),
                    }
                }
            }
        }
        self.cancel_transition(id, CancelReason::Disconnected);
    }

    /// Tear down the subject's plan. Idempotent; returns `false` when there was
    /// no state to tear down.
    pub fn cancel_transition(&self, id: &SubjectId, reason: CancelReason) -> bool {
        self.teardown(id, reason, None)
    }

    /// Flush everything synchronously: cancel all plans, eject and destroy all
    /// mounts, clear all bookkeeping. Returns how many plans were live.
    pub fn shutdown(&self) -> usize {
        let states = self.states.drain();
        let flushed = states.len();
        for (_, state) in states {
            state.scope.cancel();
            if let Some(mount) = &state.mount {
                force_remove(mount.as_ref());
            }
            for kind in EffectKind::TRANSITION {
                state.subject.remove_effect(kind);
            }
        }
        for (_, mount) in self.mounts.drain() {
            force_remove(mount.as_ref());
        }
        self.exempt.clear();
        info!(
            "Transition engine shut down ({} active transition(s) flushed, reason: {})",
            flushed,
            CancelReason::Shutdown
        );
        flushed
    }

    // ---- plan driver -----------------------------------------------------

    /// Schedule every step of `list` relative to now, owned by `scope`.
    fn run_phase_list(
        &self,
        id: SubjectId,
        plan_id: u64,
        scope: &CancellationScope,
        list: &PhaseList,
    ) {
        for (at, step) in list.absolute_offsets() {
            let engine = self.this.clone();
            let handle = self.scheduler.run_later(
                at,
                Box::new(move || {
                    if let Some(engine) = engine.upgrade() {
                        engine.fire(id, plan_id, step);
                    }
                }),
            );
            scope.adopt(handle);
        }
    }

    fn fire(&self, id: SubjectId, plan_id: u64, step: PhaseStep) {
        let Some(state) = self.states.get(&id) else {
            return;
        };
        if state.plan_id != plan_id || !step.accepts(state.phase) {
            return;
        }
        if let Err(e) = self.run_step(&state, step) {
            error!(
                "Error in {} step for {}: {}",
                step.label(),
                state.subject.name(),
                e
            );
            self.teardown(&id, CancelReason::Fault, Some(state.phase.is_active()));
        }
    }

    fn run_step(&self, state: &TransitionState, step: PhaseStep) -> Result<(), TransitionError> {
        let settings = &state.settings;
        let subject = state.subject.as_ref();
        match step {
            PhaseStep::Countdown { seconds_left } => {
                self.show_title(state, &settings.countdown_title, seconds_left as i32);
                let sound = &settings.countdown_sound;
                if sound.enabled {
                    play_sound(
                        settings,
                        subject,
                        &sound.sound_type,
                        sound.volume,
                        settings.countdown_pitch(seconds_left),
                    );
                }
            }
            PhaseStep::FadeEffects => {
                if settings.blindness.enabled {
                    apply_effect(
                        subject,
                        Effect::new(
                            EffectKind::Blindness,
                            settings.blindness.duration_ticks(),
                            settings.blindness.amplifier,
                        ),
                    )?;
                }
                if settings.darkness.enabled {
                    apply_effect(
                        subject,
                        Effect::new(
                            EffectKind::Darkness,
                            settings.darkness.duration_ticks(),
                            settings.darkness.amplifier,
                        ),
                    )?;
                }
                trace_plan!(settings, "Applied darkness/blindness early for {}", subject.name());
            }
            PhaseStep::Invisibility => {
                apply_effect(
                    subject,
                    Effect::new(EffectKind::Invisibility, INVISIBILITY_DURATION_TICKS, 0),
                )?;
            }
            PhaseStep::BeginZoom => self.begin_zoom(state)?,
            PhaseStep::FinalMessage => {
                self.show_title(state, &settings.final_title, -1);
                trace_plan!(settings, "Showing final message for {}", subject.name());
            }
            PhaseStep::Commit => self.commit(state)?,
            PhaseStep::ReleaseMount => self.release_mount(state),
            PhaseStep::ArrivalSound => {
                if subject.is_online() {
                    play_configured(settings, subject, &settings.arrival_sound);
                }
            }
            PhaseStep::StripEffects => self.finish(state),
        }
        Ok(())
    }

    fn show_title(&self, state: &TransitionState, title: &TitleSettings, seconds_left: i32) {
        send_timed_text(
            state.subject.as_ref(),
            &title.title,
            &title.subtitle,
            title.fade_in,
            title.stay,
            title.fade_out,
            Some(&state.destination.label),
            seconds_left,
        );
    }

    fn begin_zoom(&self, state: &TransitionState) -> Result<(), TransitionError> {
        let settings = &state.settings;
        let subject = &state.subject;
        let id = subject.id();
        let plan_id = state.plan_id;

        let origin = subject.location();
        let spawn_at = origin.offset(Vector::new(0.0, -MOUNT_SPAWN_OFFSET, 0.0));
        let mount = self.world.spawn_mount(&spawn_at)?;

        let mut promoted = false;
        self.states.update(&id, &mut |s| {
            if s.plan_id == plan_id && s.phase == Phase::CountingDown {
                s.phase = Phase::Transitioning;
                s.original_location = Some(origin.clone());
                s.mount = Some(mount.clone());
                s.drive = Some(DriveState::from_yaw(origin.yaw));
                promoted = true;
            }
        });
        if !promoted {
            mount.destroy();
            return Ok(());
        }
        self.mounts.set(id, mount.clone());

        mount.attach(subject.as_ref())?;
        apply_effect(
            subject.as_ref(),
            Effect::new(
                EffectKind::Speed,
                settings.zoom_ticks + SPEED_EXTRA_TICKS,
                settings.zoom_speed_amplifier,
            ),
        )?;

        let engine = self.this.clone();
        let handle = self.scheduler.run_timer(
            0,
            1,
            Box::new(move || {
                if let Some(engine) = engine.upgrade() {
                    engine.drive_tick(id, plan_id);
                }
            }),
        );
        state.scope.adopt(handle.clone());
        self.states.update(&id, &mut |s| {
            if s.plan_id == plan_id {
                if let Some(drive) = s.drive.as_mut() {
                    drive.handle = Some(handle.clone());
                }
            }
        });

        if settings.final_sound.enabled {
            play_configured(settings, subject.as_ref(), &settings.final_sound);
        }
        trace_plan!(settings, "{} is now riding the camera mount", subject.name());
        Ok(())
    }

    fn drive_tick(&self, id: SubjectId, plan_id: u64) {
        let Some(state) = self.states.get(&id) else {
            return;
        };
        if state.plan_id != plan_id {
            return;
        }
        let handle = state.drive.as_ref().and_then(|d| d.handle.clone());
        let mount = match (&state.mount, state.phase) {
            (Some(mount), Phase::Transitioning) if mount.is_valid() => mount.clone(),
            _ => {
                if let Some(handle) = handle {
                    handle.cancel();
                }
                return;
            }
        };

        let mut delta = None;
        self.states.update(&id, &mut |s| {
            if s.plan_id == plan_id && s.phase == Phase::Transitioning {
                delta = s.drive.as_mut().map(DriveState::advance);
            }
        });
        let Some(delta) = delta else {
            return;
        };

        if let Err(e) = mount.reposition(delta) {
            error!("Error in drive step for {}: {}", state.subject.name(), e);
            if let Some(handle) = handle {
                handle.cancel();
            }
            self.teardown(&id, CancelReason::Fault, Some(true));
            return;
        }
        state.subject.send_action_bar(RichText::empty());
    }

    fn commit(&self, state: &TransitionState) -> Result<(), TransitionError> {
        let settings = &state.settings;
        let subject = &state.subject;
        let id = subject.id();
        let plan_id = state.plan_id;

        let mut committed = false;
        let mut drive_handle = None;
        self.states.update(&id, &mut |s| {
            if s.plan_id == plan_id && s.phase == Phase::Transitioning {
                s.phase = Phase::Completing;
                s.original_location = None;
                drive_handle = s.drive.take().and_then(|d| d.handle);
                committed = true;
            }
        });
        if !committed {
            return Ok(());
        }
        if let Some(handle) = drive_handle {
            handle.cancel();
        }

        self.exempt.insert(id);
        let followups = PhaseList::commit_followups(settings.arrival_sound.enabled);
        self.run_phase_list(id, plan_id, &state.scope, &followups);

        let command = format!("{} {}", settings.warp_command, state.destination.label);
        let performed = subject.perform_command(&command);
        // The re-fired request runs synchronously, so the pass is spent either way.
        self.exempt.remove(&id);
        performed?;
        trace_plan!(settings, "Teleported {} to {}", subject.name(), state.destination.label);
        Ok(())
    }

    fn release_mount(&self, state: &TransitionState) {
        let subject = &state.subject;
        let id = subject.id();
        let plan_id = state.plan_id;

        let mut held = None;
        self.states.update(&id, &mut |s| {
            if s.plan_id == plan_id {
                held = s.mount.take();
            }
        });
        let registered = self.mounts.compare_and_delete(&id, &|m| {
            held.as_ref().map_or(true, |h| h.id() == m.id())
        });

        let online = subject.is_online();
        for mount in unique_mounts(held, registered) {
            if mount.is_valid() {
                if online {
                    mount.detach(subject.as_ref());
                }
                mount.destroy();
            }
        }
    }

    /// Last follow-up: strip ride effects and drop the state.
    fn finish(&self, state: &TransitionState) {
        let subject = &state.subject;
        let id = subject.id();
        if subject.is_online() {
            subject.remove_effect(EffectKind::Invisibility);
            subject.remove_effect(EffectKind::Speed);
        }
        let plan_id = state.plan_id;
        if self
            .states
            .compare_and_delete(&id, &|s| s.plan_id == plan_id)
            .is_some()
        {
            self.exempt.remove(&id);
            state.scope.cancel();
            trace_plan!(state.settings, "Transition finished for {}", subject.name());
        }
    }

    /// `notify` overrides whether the cancelled title is shown; by default it is
    /// shown when the removed state was still active.
    fn teardown(&self, id: &SubjectId, reason: CancelReason, notify: Option<bool>) -> bool {
        self.exempt.remove(id);
        let registered = self.mounts.delete(id);
        let Some(state) = self.states.delete(id) else {
            if let Some(mount) = registered {
                force_remove(mount.as_ref());
            }
            return false;
        };

        let cancelled = state.scope.cancel();
        let subject = state.subject.as_ref();
        for mount in unique_mounts(state.mount.clone(), registered) {
            if mount.is_valid() {
                mount.detach(subject);
                mount.destroy();
            }
        }
        for kind in EffectKind::TRANSITION {
            subject.remove_effect(kind);
        }

        if notify.unwrap_or_else(|| state.phase.is_active()) && subject.is_online() {
            let title = &state.settings.cancelled_title;
            send_timed_text(
                subject,
                &title.title,
                &title.subtitle,
                title.fade_in,
                title.stay,
                title.fade_out,
                Some(""),
                -1,
            );
        }
        trace_plan!(
            state.settings,
            "Cancelled {} countdown task(s) for {} ({}, was {})",
            cancelled,
            subject.name(),
            reason,
            state.phase
        );
        true
    }
}

impl fmt::Debug for TransitionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionEngine")
            .field("active", &self.states.len())
            .field("mounts", &self.mounts.len())
            .field("exempt", &self.exempt.len())
            .finish()
    }
}

fn unique_mounts(
    a: Option<Arc<dyn Mount>>,
    b: Option<Arc<dyn Mount>>,
) -> Vec<Arc<dyn Mount>> {
    match (a, b) {
        (Some(a), Some(b)) if a.id() == b.id() => vec![a],
        (a, b) => a.into_iter().chain(b).collect(),
    }
}

fn force_remove(mount: &dyn Mount) {
    mount.eject_all();
    if mount.is_valid() {
        mount.destroy();
    }
}

/// Apply an effect; an unknown effect is skipped with a warning.
fn apply_effect(subject: &dyn Subject, effect: Effect) -> Result<(), HostError> {
    match subject.apply_effect(effect) {
        Err(HostError::InvalidIdentifier(key)) => {
            warn!("Invalid effect {} for {}, skipping", key, subject.name());
            Ok(())
        }
        other => other,
    }
}

fn play_configured(settings: &Settings, subject: &dyn Subject, sound: &SoundSettings) {
    play_sound(settings, subject, &sound.sound_type, sound.volume, sound.pitch);
}

/// Sounds never fault a plan: any failure is a warning and the sound is skipped.
fn play_sound(settings: &Settings, subject: &dyn Subject, sound_type: &str, volume: f32, pitch: f32) {
    let key = match SoundKey::parse(sound_type) {
        Ok(key) => key,
        Err(e) => {
            warn!("Invalid sound: {} - {}", sound_type, e);
            return;
        }
    };
    let sound = Sound { key, volume, pitch };
    match subject.play_sound(&sound) {
        Ok(()) => trace_plan!(settings, "Playing sound: {}", sound.key),
        Err(e) => warn!("Invalid sound: {} - {}", sound_type, e),
    }
}
