//! Timing plan for a transition.
//!
//! A plan is an ordered [`PhaseList`]: phase steps separated by relative delays
//! in ticks. The countdown plan is derived from [`Timings`]; the commit follow-ups
//! are a short fixed list. Both are run by the same driver in the engine, so the
//! whole schedule can be checked here without a scheduler.

use std::fmt;

use crate::schedule::TICKS_PER_SECOND;
use crate::transition::state::Phase;

/// Invisibility goes on this many ticks before the zoom starts.
pub const INVISIBILITY_LEAD_TICKS: u64 = 3;
pub const INVISIBILITY_DURATION_TICKS: u32 = 40;
/// Speed lasts this much longer than the zoom itself.
pub const SPEED_EXTRA_TICKS: u32 = 20;
/// Delay between the commit and releasing the mount.
pub const MOUNT_RELEASE_DELAY: u64 = 2;
/// Delay between releasing the mount and the arrival sound.
pub const ARRIVAL_SOUND_DELAY: u64 = 8;
/// Delay between releasing the mount and stripping invisibility and speed.
pub const EFFECT_STRIP_DELAY: u64 = 10;

/// One scheduled action of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseStep {
    Countdown { seconds_left: u32 },
    FadeEffects,
    Invisibility,
    BeginZoom,
    FinalMessage,
    Commit,
    ReleaseMount,
    ArrivalSound,
    StripEffects,
}

impl PhaseStep {
    /// Whether the step may run while the subject is in `phase`.
    pub fn accepts(&self, phase: Phase) -> bool {
        match self {
            PhaseStep::Countdown { .. }
            | PhaseStep::FadeEffects
            | PhaseStep::Invisibility
            | PhaseStep::BeginZoom => phase == Phase::CountingDown,
            PhaseStep::FinalMessage | PhaseStep::Commit => phase == Phase::Transitioning,
            PhaseStep::ReleaseMount | PhaseStep::ArrivalSound | PhaseStep::StripEffects => {
                phase == Phase::Completing
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PhaseStep::Countdown { .. } => "countdown",
            PhaseStep::FadeEffects => "fade-effects",
            PhaseStep::Invisibility => "invisibility",
            PhaseStep::BeginZoom => "begin-zoom",
            PhaseStep::FinalMessage => "final-message",
            PhaseStep::Commit => "commit",
            PhaseStep::ReleaseMount => "release-mount",
            PhaseStep::ArrivalSound => "arrival-sound",
            PhaseStep::StripEffects => "strip-effects",
        }
    }
}

impl fmt::Display for PhaseStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStep::Countdown { seconds_left } => write!(f, "countdown({})", seconds_left),
            other => f.write_str(other.label()),
        }
    }
}

/// Validated durations a plan is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub countdown_seconds: u32,
    pub zoom_ticks: u32,
    pub black_ticks: u32,
}

impl Timings {
    pub fn zoom_start(&self) -> u64 {
        u64::from(self.countdown_seconds) * TICKS_PER_SECOND
    }

    pub fn final_message_at(&self) -> u64 {
        self.zoom_start() + u64::from(self.zoom_ticks)
    }

    pub fn commit_at(&self) -> u64 {
        self.final_message_at() + u64::from(self.black_ticks)
    }
}

/// Steps separated by relative delays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseList {
    steps: Vec<(u64, PhaseStep)>,
}

impl PhaseList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `step` to run `delay` ticks after the previous one.
    pub fn then(mut self, delay: u64, step: PhaseStep) -> Self {
        self.steps.push((delay, step));
        self
    }

    /// Build from absolute offsets. Steps sharing an offset keep their given order.
    pub fn from_absolute(mut absolute: Vec<(u64, PhaseStep)>) -> Self {
        absolute.sort_by_key(|(at, _)| *at);
        let mut previous = 0;
        let steps = absolute
            .into_iter()
            .map(|(at, step)| {
                let delay = at - previous;
                previous = at;
                (delay, step)
            })
            .collect();
        Self { steps }
    }

    /// The countdown plan for `timings`, from request to commit.
    pub fn countdown(timings: &Timings) -> Self {
        let d = u64::from(timings.countdown_seconds);
        let zoom_start = timings.zoom_start();
        let mut absolute = Vec::with_capacity(d as usize + 5);

        for i in 0..timings.countdown_seconds {
            absolute.push((
                u64::from(i) * TICKS_PER_SECOND,
                PhaseStep::Countdown {
                    seconds_left: timings.countdown_seconds - i,
                },
            ));
        }
        absolute.push(((d - 1) * TICKS_PER_SECOND, PhaseStep::FadeEffects));
        absolute.push((zoom_start - INVISIBILITY_LEAD_TICKS, PhaseStep::Invisibility));
        absolute.push((zoom_start, PhaseStep::BeginZoom));
        absolute.push((timings.final_message_at(), PhaseStep::FinalMessage));
        absolute.push((timings.commit_at(), PhaseStep::Commit));

        Self::from_absolute(absolute)
    }

    /// What runs after the commit: release the mount, optionally the arrival
    /// sound, then strip the ride effects and drop the state.
    pub fn commit_followups(arrival_sound: bool) -> Self {
        let list = PhaseList::new().then(MOUNT_RELEASE_DELAY, PhaseStep::ReleaseMount);
        if arrival_sound {
            list.then(ARRIVAL_SOUND_DELAY, PhaseStep::ArrivalSound)
                .then(EFFECT_STRIP_DELAY - ARRIVAL_SOUND_DELAY, PhaseStep::StripEffects)
        } else {
            list.then(EFFECT_STRIP_DELAY, PhaseStep::StripEffects)
        }
    }

    pub fn steps(&self) -> &[(u64, PhaseStep)] {
        &self.steps
    }

    /// Cumulative offsets from the start of the list.
    pub fn absolute_offsets(&self) -> Vec<(u64, PhaseStep)> {
        let mut at = 0;
        self.steps
            .iter()
            .map(|(delay, step)| {
                at += delay;
                (at, *step)
            })
            .collect()
    }

    /// Offset of the last step.
    pub fn span(&self) -> u64 {
        self.steps.iter().map(|(delay, _)| delay).sum()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
