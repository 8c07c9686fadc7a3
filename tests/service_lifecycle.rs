mod common;

use std::fs;

use common::{advance_to, spawn_location, warp_location, WARP};
use warpfx::commands::{ReloadCommand, RELOAD_PERMISSION};
use warpfx::host::Subject;
use warpfx::service::WarpService;
use warpfx::sim::{SimConsole, SimServer};
use warpfx::transition::Phase;

fn enabled_server(config: &str) -> (tempfile::TempDir, std::sync::Arc<SimServer>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, config).unwrap();
    let server = SimServer::new();
    let service = WarpService::enable(
        &path,
        server.world().clone(),
        server.scheduler().clone(),
    )
    .unwrap();
    server.install(service);
    server.add_warp(WARP, warp_location());
    (dir, server)
}

#[test]
fn enable_writes_default_config_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plugins").join("warpfx").join("config.toml");
    let server = SimServer::new();
    let service = WarpService::enable(
        &path,
        server.world().clone(),
        server.scheduler().clone(),
    )
    .unwrap();

    assert!(path.exists());
    assert!(service.is_enabled());
    assert_eq!(service.engine().settings().countdown_seconds, 3);
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("warp_command"));
}

#[test]
fn enable_reports_unparsable_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "countdown = [").unwrap();
    let server = SimServer::new();
    let result = WarpService::enable(&path, server.world().clone(), server.scheduler().clone());
    assert!(result.is_err());
}

#[test]
fn disable_flushes_live_transitions() {
    let (_dir, server) = enabled_server("");
    let service = server.service().unwrap().clone();
    let steve = server.join("steve", spawn_location());
    let alex = server.join("alex", spawn_location());
    let start = server.current_tick();
    server.warp(&steve, WARP);
    server.warp(&alex, WARP);
    advance_to(&server, start + 70);
    assert_eq!(server.world().live_mounts(), 2);

    assert_eq!(service.disable(), 2);
    assert!(!service.is_enabled());
    assert_eq!(server.world().live_mounts(), 0);
    assert!(steve.active_effects().is_empty());
    assert_eq!(service.engine().phase(&steve.id()), Phase::Idle);

    advance_to(&server, start + 200);
    assert!(steve.commands().is_empty());
    assert!(alex.commands().is_empty());
    assert_eq!(service.reconciler().stats().sweeps, 0);

    assert_eq!(service.disable(), 0);
}

#[test]
fn reload_updates_new_plans_only() {
    let (dir, server) = enabled_server("[countdown]\nduration = 3\n");
    let service = server.service().unwrap().clone();
    let steve = server.join("steve", spawn_location());
    let start = server.current_tick();
    server.warp(&steve, WARP);
    advance_to(&server, start + 10);

    fs::write(dir.path().join("config.toml"), "[countdown]\nduration = 5\n").unwrap();
    let settings = service.reload().unwrap();
    assert_eq!(settings.countdown_seconds, 5);

    // Running plan keeps its snapshot
    advance_to(&server, start + 100);
    let first = common::offsets(steve.commands().iter().map(|(t, _)| *t), start);
    assert_eq!(first, vec![80]);

    let again = server.current_tick();
    server.warp(&steve, WARP);
    advance_to(&server, again + 140);
    let second: Vec<u64> = steve.commands().iter().skip(1).map(|(t, _)| t - again).collect();
    assert_eq!(second, vec![120]);
}

#[test]
fn reload_mid_plan_keeps_the_planned_warp_command() {
    let (dir, server) = enabled_server("");
    let service = server.service().unwrap().clone();
    let steve = server.join("steve", spawn_location());
    let start = server.current_tick();
    server.warp(&steve, WARP);
    advance_to(&server, start + 10);

    fs::write(dir.path().join("config.toml"), "warp_command = \"warps\"\n").unwrap();
    assert_eq!(service.reload().unwrap().warp_command, "warps");

    advance_to(&server, start + 100);
    let commands = steve.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].1, "pw market");
    assert_eq!(steve.location(), warp_location());
    assert_eq!(service.engine().phase(&steve.id()), Phase::Idle);

    // New plans use the reloaded command
    let again = server.current_tick();
    server.warp(&steve, WARP);
    advance_to(&server, again + 100);
    assert_eq!(steve.commands()[1].1, "warps market");
    assert_eq!(steve.teleports().len(), 2);
}

#[test]
fn reload_reschedules_the_sweep() {
    let (dir, server) = enabled_server("cleanup_interval = 100\n");
    let service = server.service().unwrap().clone();

    fs::write(dir.path().join("config.toml"), "cleanup_interval = 10\n").unwrap();
    service.reload().unwrap();
    advance_to(&server, 50);
    assert_eq!(service.reconciler().stats().sweeps, 5);
}

#[test]
fn reload_command_requires_permission_first() {
    let (_dir, server) = enabled_server("");
    let command = ReloadCommand::new(server.service().unwrap().clone());
    let console = SimConsole::new("guest", &[]);

    assert!(command.execute(&console, "warpfx", &[]));
    assert_eq!(
        console.messages(),
        vec!["You don't have permission to use this command.".to_string()]
    );
    assert!(command.tab_complete(&console, &["re"]).is_empty());
}

#[test]
fn reload_command_prints_usage() {
    let (_dir, server) = enabled_server("");
    let command = ReloadCommand::new(server.service().unwrap().clone());
    let console = SimConsole::new("admin", &[RELOAD_PERMISSION]);

    command.execute(&console, "warpfx", &[]);
    command.execute(&console, "wfx", &["frobnicate"]);
    assert_eq!(
        console.messages(),
        vec![
            "Usage: /warpfx reload".to_string(),
            "Usage: /wfx reload".to_string()
        ]
    );
}

#[test]
fn reload_command_reports_summary() {
    let (dir, server) = enabled_server("");
    let command = ReloadCommand::new(server.service().unwrap().clone());
    let console = SimConsole::new("admin", &[RELOAD_PERMISSION]);

    fs::write(
        dir.path().join("config.toml"),
        "[countdown]\nduration = 5\n[countdown.blindness]\nenabled = false\n",
    )
    .unwrap();
    command.execute(&console, "warpfx", &["RELOAD"]);
    assert_eq!(
        console.messages(),
        vec![
            "✓ warpfx config reloaded successfully!".to_string(),
            "Countdown duration: 5 seconds".to_string(),
            "Final sound: Enabled".to_string(),
            "Blindness effect: Disabled".to_string(),
        ]
    );
    assert_eq!(server.engine().unwrap().settings().countdown_seconds, 5);
}

#[test]
fn reload_command_reports_errors() {
    let (dir, server) = enabled_server("[countdown]\nduration = 4\n");
    let command = ReloadCommand::new(server.service().unwrap().clone());
    let console = SimConsole::new("admin", &[RELOAD_PERMISSION]);

    fs::write(dir.path().join("config.toml"), "countdown = [").unwrap();
    command.execute(&console, "warpfx", &["reload"]);
    let messages = console.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("✗ Error reloading config:"));
    // Previous settings stay in force
    assert_eq!(server.engine().unwrap().settings().countdown_seconds, 4);
}

#[test]
fn reload_command_tab_completion() {
    let (_dir, server) = enabled_server("");
    let command = ReloadCommand::new(server.service().unwrap().clone());
    let console = SimConsole::new("admin", &[RELOAD_PERMISSION]);

    assert_eq!(command.tab_complete(&console, &["re"]), vec!["reload".to_string()]);
    assert_eq!(command.tab_complete(&console, &[""]), vec!["reload".to_string()]);
    assert!(command.tab_complete(&console, &["x"]).is_empty());
    assert!(command.tab_complete(&console, &["reload", ""]).is_empty());
}
