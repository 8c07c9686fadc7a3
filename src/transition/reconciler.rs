//! Orphaned mount reconciler
//!
//! Runs every `cleanup_interval` ticks. A mount in the registry that is no longer
//! valid, or that carries nobody, is removed from the world (if still there) and
//! forgotten. Transition phases are never touched; a plan whose mount vanished
//! notices on its next drive tick.

use std::sync::Arc;

use crate::schedule::{TaskHandle, TaskScheduler};
use crate::transition::engine::TransitionEngine;

/// Counters accumulated across sweeps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub sweeps: u64,
    pub mounts_removed: u64,
}

pub struct MountReconciler {
    engine: Arc<TransitionEngine>,
    stats: std::sync::Mutex<ReconcileStats>,
}

impl MountReconciler {
    pub fn new(engine: Arc<TransitionEngine>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            stats: std::sync::Mutex::new(ReconcileStats::default()),
        })
    }

    /// One pass over the registry. Returns how many associations were dropped.
    pub fn sweep(&self) -> usize {
        let registry = self.engine.mount_registry();
        let mut removed = 0;
        for id in registry.ids() {
            let Some(mount) = registry.get(&id) else {
                continue;
            };
            if mount.is_valid() && !mount.passengers().is_empty() {
                continue;
            }
            let mount_id = mount.id();
            if registry
                .compare_and_delete(&id, &|held| held.id() == mount_id)
                .is_some()
            {
                if mount.is_valid() {
                    mount.destroy();
                }
                removed += 1;
            }
        }

        let mut stats = self
            .stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        stats.sweeps += 1;
        stats.mounts_removed += removed as u64;

        if removed > 0 {
            let settings = self.engine.settings();
            if settings.debug {
                log::info!("Cleaned up {} orphaned mount(s)", removed);
            } else {
                log::debug!("Cleaned up {} orphaned mount(s)", removed);
            }
        }
        removed
    }

    pub fn stats(&self) -> ReconcileStats {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Run [`sweep`](Self::sweep) every `interval` ticks on `scheduler`.
    pub fn start(self: &Arc<Self>, scheduler: &dyn TaskScheduler, interval: u64) -> TaskHandle {
        let reconciler = Arc::downgrade(self);
        scheduler.run_timer(
            interval,
            interval,
            Box::new(move || {
                if let Some(reconciler) = reconciler.upgrade() {
                    reconciler.sweep();
                }
            }),
        )
    }
}
