//! Warp transitions: per-subject state, timing plans, the engine that runs them
//! and the reconciler that sweeps up orphaned mounts.

pub mod engine;
pub mod plan;
pub mod reconciler;
pub mod state;

pub use engine::{CancelReason, TransitionEngine, Verdict, WarpDescriptor, BYPASS_PERMISSION};
pub use plan::{PhaseList, PhaseStep, Timings};
pub use reconciler::MountReconciler;
pub use state::{Destination, Phase, StateStore, TransitionState};
