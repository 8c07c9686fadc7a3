mod common;

use common::{advance_to, setup, warp_location, WARP};
use warpfx::errors::TransitionError;
use warpfx::host::{Location, Subject};
use warpfx::transition::{Destination, Phase, Verdict, WarpDescriptor, BYPASS_PERMISSION};

#[test]
fn commit_lets_the_warp_through_exactly_once() {
    let (server, steve) = setup();
    let engine = server.engine().unwrap().clone();
    let start = server.current_tick();
    server.warp(&steve, WARP);

    advance_to(&server, start + 79);
    assert!(!engine.is_exempt(&steve.id()));

    advance_to(&server, start + 80);
    // Re-fired request consumed the exemption and went through
    assert!(!engine.is_exempt(&steve.id()));
    assert_eq!(steve.teleports().len(), 1);

    advance_to(&server, start + 100);
    assert_eq!(engine.phase(&steve.id()), Phase::Idle);

    // The next request starts a fresh countdown
    let again = server.current_tick();
    assert_eq!(server.warp(&steve, WARP), Verdict::Suppressed);
    assert_eq!(engine.phase(&steve.id()), Phase::CountingDown);
    advance_to(&server, again + 100);
    assert_eq!(steve.commands().len(), 2);
    assert_eq!(steve.teleports().len(), 2);
}

#[test]
fn repeat_request_during_countdown_is_ignored() {
    let (server, steve) = setup();
    let engine = server.engine().unwrap().clone();
    let start = server.current_tick();
    server.warp(&steve, WARP);
    let plan = engine.state(&steve.id()).unwrap().plan_id;

    advance_to(&server, start + 25);
    assert_eq!(server.warp(&steve, WARP), Verdict::Suppressed);
    assert_eq!(engine.state(&steve.id()).unwrap().plan_id, plan);

    advance_to(&server, start + 120);
    assert_eq!(steve.titles().len(), 4);
    assert_eq!(steve.commands().len(), 1);
    assert_eq!(steve.teleports().len(), 1);
}

#[test]
fn repeat_request_while_completing_is_ignored() {
    let (server, steve) = setup();
    let engine = server.engine().unwrap().clone();
    let start = server.current_tick();
    server.warp(&steve, WARP);
    advance_to(&server, start + 85);
    assert_eq!(engine.phase(&steve.id()), Phase::Completing);

    assert_eq!(server.warp(&steve, WARP), Verdict::Suppressed);
    advance_to(&server, start + 200);
    assert_eq!(engine.phase(&steve.id()), Phase::Idle);
    assert_eq!(steve.commands().len(), 1);
    assert_eq!(steve.location(), warp_location());
}

#[test]
fn direct_request_reports_already_active() {
    let (server, steve) = setup();
    let engine = server.engine().unwrap().clone();
    server.warp(&steve, WARP);

    let destination = Destination {
        label: "elsewhere".to_string(),
        location: Location::new("world", 5.0, 64.0, 5.0),
    };
    let err = engine
        .request_transition(steve.clone(), destination)
        .unwrap_err();
    assert!(matches!(err, TransitionError::AlreadyActive(id) if id == steve.id()));
}

#[test]
fn bypass_permission_teleports_instantly() {
    let (server, steve) = setup();
    let engine = server.engine().unwrap().clone();
    steve.grant(BYPASS_PERMISSION);

    assert_eq!(server.warp(&steve, WARP), Verdict::Proceed);
    assert_eq!(steve.location(), warp_location());
    assert_eq!(engine.active_count(), 0);

    server.run_ticks(100);
    assert!(steve.titles().is_empty());
    assert!(steve.commands().is_empty());
    assert_eq!(server.world().mounts().len(), 0);
}

#[test]
fn warp_without_location_is_dropped() {
    let (server, steve) = setup();
    let engine = server.engine().unwrap().clone();
    let descriptor = WarpDescriptor {
        name: Some("ghost".to_string()),
        location: None,
    };

    assert_eq!(server.request_with(&steve, &descriptor, None), Verdict::Suppressed);
    assert_eq!(engine.active_count(), 0);
    server.run_ticks(100);
    assert!(steve.titles().is_empty());
    assert!(steve.teleports().is_empty());
}

#[test]
fn unnamed_warp_shows_unknown() {
    let (server, steve) = setup();
    let start = server.current_tick();
    let descriptor = WarpDescriptor {
        name: Some("   ".to_string()),
        location: Some(warp_location()),
    };

    assert_eq!(
        server.request_with(&steve, &descriptor, Some(warp_location())),
        Verdict::Suppressed
    );
    advance_to(&server, start + 100);

    let titles = steve.titles();
    assert_eq!(titles[3].2, "ᴜɴᴋɴᴏᴡɴ");
    assert_eq!(steve.commands()[0].1, "pw Unknown");
}

#[test]
fn pass_is_spent_when_the_warp_never_fires() {
    let (server, steve) = setup();
    let engine = server.engine().unwrap().clone();
    let start = server.current_tick();
    server.warp(&steve, WARP);
    advance_to(&server, start + 70);

    // The warp plugin no longer knows the warp, so the command fires no request
    server.remove_warp(WARP);
    advance_to(&server, start + 80);
    assert_eq!(steve.commands().len(), 1);
    assert!(steve.teleports().is_empty());
    assert!(!engine.is_exempt(&steve.id()));
    assert_eq!(engine.phase(&steve.id()), Phase::Completing);

    let vault = Location::new("world", 999.0, 64.0, 999.0);
    server.add_warp("vault", vault.clone());
    advance_to(&server, start + 85);
    assert_eq!(server.warp(&steve, "vault"), Verdict::Suppressed);
    assert_ne!(steve.location(), vault);

    advance_to(&server, start + 100);
    assert_eq!(engine.phase(&steve.id()), Phase::Idle);
    let again = server.current_tick();
    assert_eq!(server.warp(&steve, "vault"), Verdict::Suppressed);
    assert_eq!(engine.phase(&steve.id()), Phase::CountingDown);
    assert_ne!(steve.location(), vault);

    advance_to(&server, again + 100);
    assert_eq!(steve.location(), vault);
}
