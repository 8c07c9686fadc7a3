mod common;

use common::{advance_to, setup, WARP};
use warpfx::host::{Mount, Subject};
use warpfx::transition::{Phase, StateStore};

#[test]
fn healthy_mount_is_left_alone() {
    let (server, steve) = setup();
    let engine = server.engine().unwrap().clone();
    let reconciler = server.service().unwrap().reconciler().clone();
    let start = server.current_tick();
    server.warp(&steve, WARP);
    advance_to(&server, start + 65);

    assert_eq!(reconciler.sweep(), 0);
    assert_eq!(engine.mount_registry().len(), 1);
    assert_eq!(server.world().live_mounts(), 1);
}

#[test]
fn vanished_mount_is_forgotten() {
    let (server, steve) = setup();
    let engine = server.engine().unwrap().clone();
    let reconciler = server.service().unwrap().reconciler().clone();
    let start = server.current_tick();
    server.warp(&steve, WARP);
    advance_to(&server, start + 62);

    server.world().mounts()[0].vanish();
    assert_eq!(reconciler.sweep(), 1);
    assert_eq!(engine.mount_registry().len(), 0);
    // Phases are not the reconciler's business
    assert_eq!(engine.phase(&steve.id()), Phase::Transitioning);

    // The ride stops, the commit still happens
    advance_to(&server, start + 63);
    let parked = steve.location();
    advance_to(&server, start + 79);
    assert_eq!(steve.location(), parked);
    advance_to(&server, start + 100);
    assert_eq!(steve.commands().len(), 1);
    assert_eq!(engine.phase(&steve.id()), Phase::Idle);
}

#[test]
fn riderless_mount_is_removed() {
    let (server, steve) = setup();
    let engine = server.engine().unwrap().clone();
    let reconciler = server.service().unwrap().reconciler().clone();
    let start = server.current_tick();
    server.warp(&steve, WARP);
    advance_to(&server, start + 62);

    let mount = server.world().mounts()[0].clone();
    mount.eject_all();
    assert_eq!(reconciler.sweep(), 1);
    assert!(!mount.is_valid());
    assert_eq!(server.world().live_mounts(), 0);
    assert_eq!(engine.mount_registry().len(), 0);

    let stats = reconciler.stats();
    assert_eq!(stats.sweeps, 1);
    assert_eq!(stats.mounts_removed, 1);
}

#[test]
fn sweeps_run_on_the_cleanup_interval() {
    let (server, _steve) = setup();
    let reconciler = server.service().unwrap().reconciler().clone();

    advance_to(&server, 99);
    assert_eq!(reconciler.stats().sweeps, 0);
    advance_to(&server, 100);
    assert_eq!(reconciler.stats().sweeps, 1);
    advance_to(&server, 300);
    assert_eq!(reconciler.stats().sweeps, 3);
}
