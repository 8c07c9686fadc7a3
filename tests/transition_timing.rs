mod common;

use common::{advance_to, setup, spawn_location, warp_location, WARP};
use warpfx::host::{EffectKind, Subject};
use warpfx::sim::SimEvent;
use warpfx::transition::{Phase, StateStore, Verdict};

#[test]
fn default_plan_runs_on_schedule() {
    let (server, steve) = setup();
    let engine = server.engine().unwrap().clone();
    let start = server.current_tick();

    assert_eq!(server.warp(&steve, WARP), Verdict::Suppressed);
    assert_eq!(engine.phase(&steve.id()), Phase::CountingDown);
    // Request is held, nothing moved yet
    assert!(steve.teleports().is_empty());

    advance_to(&server, start + 100);

    let titles = steve.titles();
    let title_ticks = common::offsets(titles.iter().map(|(t, _, _)| *t), start);
    assert_eq!(title_ticks, vec![1, 20, 40, 65]);
    assert_eq!(titles[0].1, "ᴡᴀʀᴘɪɴɢ ɪɴ 3");
    assert_eq!(titles[0].2, "ᴅᴏ ɴᴏᴛ ᴍᴏᴠᴇ");
    assert_eq!(titles[1].1, "ᴡᴀʀᴘɪɴɢ ɪɴ 2");
    assert_eq!(titles[2].1, "ᴡᴀʀᴘɪɴɢ ɪɴ 1");
    assert_eq!(titles[3].1, "ᴡᴀʀᴘɪɴɢ ᴛᴏ");
    assert_eq!(titles[3].2, "ᴍᴀʀᴋᴇᴛ");

    let sounds = steve.sounds();
    let countdown: Vec<u64> = sounds
        .iter()
        .filter(|(_, key, _)| key == "minecraft:block.amethyst_block.break")
        .map(|(t, _, _)| t - start)
        .collect();
    assert_eq!(countdown, vec![1, 20, 40]);
    let glass: Vec<(u64, f32)> = sounds
        .iter()
        .filter(|(_, key, _)| key == "minecraft:block.glass.break")
        .map(|(t, _, pitch)| (t - start, *pitch))
        .collect();
    assert_eq!(glass.len(), 1);
    assert_eq!(glass[0].0, 60);
    assert!((glass[0].1 - 0.8).abs() < 1e-6);

    let commands = steve.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].0 - start, 80);
    assert_eq!(commands[0].1, "pw market");

    let teleports = steve.teleports();
    assert_eq!(teleports.len(), 1);
    assert_eq!(teleports[0].0 - start, 80);
    assert_eq!(teleports[0].1, warp_location());
    assert_eq!(steve.location(), warp_location());

    assert_eq!(engine.phase(&steve.id()), Phase::Idle);
    assert_eq!(engine.active_count(), 0);
    assert!(!engine.is_exempt(&steve.id()));
    assert_eq!(server.world().live_mounts(), 0);
}

#[test]
fn effects_land_at_their_offsets() {
    let (server, steve) = setup();
    let start = server.current_tick();
    server.warp(&steve, WARP);
    advance_to(&server, start + 100);

    let applied = |kind: EffectKind| {
        steve.first_tick_of(|e| matches!(e, SimEvent::EffectApplied(fx) if fx.kind == kind))
            .map(|t| t - start)
    };
    assert_eq!(applied(EffectKind::Blindness), Some(40));
    assert_eq!(applied(EffectKind::Darkness), Some(40));
    assert_eq!(applied(EffectKind::Invisibility), Some(57));
    assert_eq!(applied(EffectKind::Speed), Some(60));

    let speed = steve
        .records()
        .into_iter()
        .find_map(|r| match r.event {
            SimEvent::EffectApplied(fx) if fx.kind == EffectKind::Speed => Some(fx),
            _ => None,
        })
        .unwrap();
    assert_eq!(speed.duration_ticks, 25);
    assert_eq!(speed.amplifier, 4);

    let removed = |kind: EffectKind| {
        steve.first_tick_of(|e| *e == SimEvent::EffectRemoved(kind))
            .map(|t| t - start)
    };
    assert_eq!(removed(EffectKind::Invisibility), Some(92));
    assert_eq!(removed(EffectKind::Speed), Some(92));
    assert!(!steve.has_effect(EffectKind::Invisibility));
    assert!(!steve.has_effect(EffectKind::Speed));
}

#[test]
fn phases_and_mount_follow_the_plan() {
    let (server, steve) = setup();
    let engine = server.engine().unwrap().clone();
    let start = server.current_tick();
    server.warp(&steve, WARP);

    advance_to(&server, start + 59);
    assert_eq!(engine.phase(&steve.id()), Phase::CountingDown);
    assert_eq!(server.world().live_mounts(), 0);

    advance_to(&server, start + 60);
    assert_eq!(engine.phase(&steve.id()), Phase::Transitioning);
    assert_eq!(server.world().live_mounts(), 1);
    let mount = server.world().mounts()[0].clone();
    let spawned_at = mount.location();
    assert!((spawned_at.y - (spawn_location().y - 0.3)).abs() < 1e-9);
    let state = engine.state(&steve.id()).unwrap();
    assert_eq!(state.original_location, Some(spawn_location()));

    // The mount carries the subject backwards and up
    advance_to(&server, start + 70);
    let riding = steve.location();
    assert!(riding.y > spawn_location().y);
    assert!(riding.distance_squared(&spawn_location()).unwrap() > 1.0);

    advance_to(&server, start + 80);
    assert_eq!(engine.phase(&steve.id()), Phase::Completing);
    // Mount stays until the release step
    assert_eq!(server.world().live_mounts(), 1);

    advance_to(&server, start + 82);
    assert_eq!(server.world().live_mounts(), 0);
    assert_eq!(engine.mount_registry().len(), 0);
    assert_eq!(engine.phase(&steve.id()), Phase::Completing);

    advance_to(&server, start + 92);
    assert_eq!(engine.phase(&steve.id()), Phase::Idle);
}

#[test]
fn shorter_countdown_shifts_the_plan() {
    let mut settings = warpfx::config::Settings::default();
    settings.countdown_seconds = 1;
    settings.zoom_ticks = 10;
    settings.black_ticks = 5;
    let (server, steve) = common::setup_with(settings);
    let start = server.current_tick();
    server.warp(&steve, WARP);
    advance_to(&server, start + 60);

    let title_ticks = common::offsets(steve.titles().iter().map(|(t, _, _)| *t), start);
    assert_eq!(title_ticks, vec![1, 30]);
    let commands = common::offsets(steve.commands().iter().map(|(t, _)| *t), start);
    assert_eq!(commands, vec![35]);
}
