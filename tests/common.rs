//! Test utilities & fixtures.
//! Builds a simulated server with one warp and one subject standing still.

use std::sync::Arc;

use warpfx::config::Settings;
use warpfx::host::Location;
use warpfx::sim::{SimServer, SimSubject};

pub const WARP: &str = "market";

pub fn warp_location() -> Location {
    Location::new("world", 120.5, 72.0, -40.5)
}

pub fn spawn_location() -> Location {
    Location::new("world", 0.5, 64.0, 0.5).with_rotation(90.0, 0.0)
}

/// Server with default settings, the `market` warp and subject `steve`.
pub fn setup() -> (Arc<SimServer>, Arc<SimSubject>) {
    setup_with(Settings::default())
}

#[allow(dead_code)]
pub fn setup_with(settings: Settings) -> (Arc<SimServer>, Arc<SimSubject>) {
    let server = SimServer::with_settings(settings);
    server.add_warp(WARP, warp_location());
    let subject = server.join("steve", spawn_location());
    (server, subject)
}

/// Offsets of `ticks` relative to `start`.
#[allow(dead_code)]
pub fn offsets(ticks: impl IntoIterator<Item = u64>, start: u64) -> Vec<u64> {
    ticks.into_iter().map(|t| t - start).collect()
}

/// Advance the server clock until it reads `tick`.
#[allow(dead_code)]
pub fn advance_to(server: &SimServer, tick: u64) {
    let now = server.current_tick();
    assert!(tick >= now, "cannot rewind from {} to {}", now, tick);
    server.run_ticks(tick - now);
}
