//! # warpfx - cinematic warp transitions
//!
//! warpfx intercepts a "teleport now" request on a tick-driven game server and
//! turns it into a short sequence: a countdown with titles and sounds, a camera
//! zoom on an invisible mount, a black screen, and only then the real teleport.
//! Moving, taking damage or disconnecting during the countdown cancels the warp
//! and cleans up everything the sequence created.
//!
//! ## Features
//!
//! - **Tick-accurate plans**: every step is scheduled up front on the host's
//!   20 Hz scheduler and checks the subject's state again when it fires.
//! - **Safe interruption**: cancellation is idempotent and removes every task,
//!   effect and mount, whichever step the plan was at.
//! - **Configurable**: TOML config with per-value range checks and defaults.
//! - **Headless**: an in-memory host ([`sim`]) runs the whole thing without a
//!   game server, for tests and the `simulate` CLI.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use warpfx::config::Settings;
//! use warpfx::host::{Location, Subject};
//! use warpfx::sim::SimServer;
//!
//! let server = SimServer::with_settings(Settings::default());
//! server.add_warp("market", Location::new("world", 120.5, 72.0, -40.5));
//! let player = server.join("ari", Location::new("world", 0.0, 64.0, 0.0));
//!
//! server.warp(&player, "market");
//! server.run_ticks(100);
//! assert_eq!(player.location().x, 120.5);
//! ```
//!
//! ## Module Organization
//!
//! - [`transition`] - state machine, timing plan, engine and mount reconciler
//! - [`schedule`] - tick scheduler contract, deterministic scheduler, cancellation scopes
//! - [`host`] - traits the host world implements (subjects, mounts, world, senders)
//! - [`text`] - small caps, rich text markup and template formatting
//! - [`config`] - configuration file and validated settings
//! - [`commands`] - the admin reload command
//! - [`service`] - enable / reload / disable lifecycle
//! - [`sim`] - in-memory host implementation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │  WarpService    │────▶│ MountReconciler  │
//! └─────────────────┘     └──────────────────┘
//!          │                       │
//! ┌─────────────────┐              │
//! │TransitionEngine │◀─────────────┘
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ TaskScheduler + │ ← host traits
//! │ Subject / World │
//! └─────────────────┘
//! ```

pub mod commands;
pub mod config;
pub mod errors;
pub mod host;
pub mod schedule;
pub mod service;
pub mod sim;
pub mod text;
pub mod transition;
