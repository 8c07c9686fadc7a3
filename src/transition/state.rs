//! Per-subject transition state and the store that holds it.
//!
//! The engine keeps at most one [`TransitionState`] per subject. All access goes
//! through [`StateStore`] so every read-modify-write is atomic with respect to a
//! single subject, and no guard ever escapes a store call.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::Settings;
use crate::host::{Location, Mount, Subject, SubjectId, Vector};
use crate::schedule::{CancellationScope, TaskHandle};

/// Where a subject is in its transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    CountingDown,
    Transitioning,
    Completing,
}

impl Phase {
    /// A plan is running and the subject has not been sent yet.
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::CountingDown | Phase::Transitioning)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::CountingDown => "counting-down",
            Phase::Transitioning => "transitioning",
            Phase::Completing => "completing",
        };
        f.write_str(name)
    }
}

/// Resolved warp target.
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    pub label: String,
    pub location: Location,
}

/// Starting speed of the camera mount, in blocks per tick.
pub const INITIAL_DRIVE_SPEED: f64 = 0.3;
/// Speed added every tick, before the move.
pub const DRIVE_ACCELERATION: f64 = 0.1;

/// Camera mount drive: a fixed direction and a linearly ramping speed.
#[derive(Debug, Clone)]
pub struct DriveState {
    pub direction: Vector,
    pub speed: f64,
    pub handle: Option<TaskHandle>,
}

impl DriveState {
    /// Backwards from the horizontal facing and upward; vertical look is ignored.
    pub fn from_yaw(yaw_degrees: f32) -> Self {
        let yaw = f64::from(yaw_degrees).to_radians();
        Self {
            direction: Vector::new(yaw.sin(), 0.5, -yaw.cos()).normalize(),
            speed: INITIAL_DRIVE_SPEED,
            handle: None,
        }
    }

    /// Accelerate and return this tick's displacement.
    pub fn advance(&mut self) -> Vector {
        self.speed += DRIVE_ACCELERATION;
        self.direction.scale(self.speed)
    }
}

/// Live bookkeeping for one subject's plan.
#[derive(Clone)]
pub struct TransitionState {
    pub plan_id: u64,
    pub phase: Phase,
    pub subject: Arc<dyn Subject>,
    pub destination: Destination,
    pub scope: Arc<CancellationScope>,
    pub mount: Option<Arc<dyn Mount>>,
    pub original_location: Option<Location>,
    pub drive: Option<DriveState>,
    /// Settings snapshot taken when the plan was created.
    pub settings: Arc<Settings>,
}

impl TransitionState {
    pub fn new(
        plan_id: u64,
        subject: Arc<dyn Subject>,
        destination: Destination,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            plan_id,
            phase: Phase::CountingDown,
            subject,
            destination,
            scope: Arc::new(CancellationScope::new()),
            mount: None,
            original_location: None,
            drive: None,
            settings,
        }
    }
}

impl fmt::Debug for TransitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionState")
            .field("plan_id", &self.plan_id)
            .field("phase", &self.phase)
            .field("subject", &self.subject.name())
            .field("destination", &self.destination.label)
            .field("mount", &self.mount.as_ref().map(|m| m.id()))
            .field("original_location", &self.original_location)
            .field("drive", &self.drive)
            .finish()
    }
}

/// Keyed store with per-key atomic operations.
///
/// Implementations must not invoke the supplied closures while holding a guard
/// on any other key, and must never hand guards out to callers.
pub trait StateStore<V: Clone + Send + Sync>: Send + Sync {
    fn get(&self, id: &SubjectId) -> Option<V>;
    fn set(&self, id: SubjectId, value: V) -> Option<V>;
    /// Insert only if no value is present; hands the value back otherwise.
    fn insert_if_absent(&self, id: SubjectId, value: V) -> Result<(), V>;
    fn delete(&self, id: &SubjectId) -> Option<V>;
    /// Remove the value only if `predicate` accepts it.
    fn compare_and_delete(&self, id: &SubjectId, predicate: &dyn Fn(&V) -> bool) -> Option<V>;
    /// Mutate in place; returns `false` when no value was present.
    fn update(&self, id: &SubjectId, f: &mut dyn FnMut(&mut V)) -> bool;
    fn contains(&self, id: &SubjectId) -> bool;
    fn ids(&self) -> Vec<SubjectId>;
    fn drain(&self) -> Vec<(SubjectId, V)>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// [`StateStore`] over a sharded concurrent map.
#[derive(Debug)]
pub struct DashMapStore<V> {
    map: DashMap<SubjectId, V>,
}

impl<V> DashMapStore<V> {
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }
}

impl<V> Default for DashMapStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync> StateStore<V> for DashMapStore<V> {
    fn get(&self, id: &SubjectId) -> Option<V> {
        self.map.get(id).map(|v| v.value().clone())
    }

    fn set(&self, id: SubjectId, value: V) -> Option<V> {
        self.map.insert(id, value)
    }

    fn insert_if_absent(&self, id: SubjectId, value: V) -> Result<(), V> {
        match self.map.entry(id) {
            Entry::Occupied(_) => Err(value),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(())
            }
        }
    }

    fn delete(&self, id: &SubjectId) -> Option<V> {
        self.map.remove(id).map(|(_, v)| v)
    }

    fn compare_and_delete(&self, id: &SubjectId, predicate: &dyn Fn(&V) -> bool) -> Option<V> {
        self.map.remove_if(id, |_, v| predicate(v)).map(|(_, v)| v)
    }

    fn update(&self, id: &SubjectId, f: &mut dyn FnMut(&mut V)) -> bool {
        match self.map.get_mut(id) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }

    fn contains(&self, id: &SubjectId) -> bool {
        self.map.contains_key(id)
    }

    fn ids(&self) -> Vec<SubjectId> {
        self.map.iter().map(|e| *e.key()).collect()
    }

    fn drain(&self) -> Vec<(SubjectId, V)> {
        let ids = self.ids();
        ids.into_iter()
            .filter_map(|id| self.map.remove(&id))
            .collect()
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}
