//! Binary entrypoint for the warpfx CLI.
//!
//! Commands:
//! - `init [--force]` - write a starter `config.toml`
//! - `check [--json]` - load and validate the config, print the resolved summary
//! - `simulate --warp <name> [...]` - run one simulated subject through a warp
//!
//! See the library crate docs for module-level details: `warpfx::`.
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};

use warpfx::commands::reload_summary;
use warpfx::config::{Config, Settings};
use warpfx::host::{Location, Subject};
use warpfx::schedule::{start_realtime_driver, TICK};
use warpfx::service::WarpService;
use warpfx::sim::{SimEvent, SimServer, SimSubject};
use warpfx::transition::{Verdict, BYPASS_PERMISSION};

#[derive(Parser)]
#[command(name = "warpfx")]
#[command(about = "Countdown and camera transitions for warp teleports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Validate the configuration and print the resolved settings
    Check {
        /// Print every resolved setting as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a simulated subject through a warp and print the timeline
    Simulate {
        /// Warp name to travel to
        #[arg(short, long, default_value = "spawn")]
        warp: String,
        /// Tick (after the request) at which the subject steps one block
        #[arg(long)]
        move_at: Option<u64>,
        /// Tick at which the subject takes damage
        #[arg(long)]
        damage_at: Option<u64>,
        /// Tick at which the subject disconnects
        #[arg(long)]
        quit_at: Option<u64>,
        /// Grant the bypass permission
        #[arg(long)]
        bypass: bool,
        /// Advance ticks in real time (50 ms each) instead of instantly
        #[arg(long)]
        realtime: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init { .. } => None,
        _ => Config::load(&cli.config).ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Init { force } => {
            if Path::new(&cli.config).exists() && !force {
                warn!(
                    "{} already exists; pass --force to overwrite it",
                    cli.config
                );
                return Ok(());
            }
            Config::create_default(&cli.config)?;
            println!("Wrote default configuration to {}", cli.config);
        }
        Commands::Check { json } => {
            let config = Config::load(&cli.config)?;
            let settings = Settings::resolve(&config);
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                println!("{} is valid", cli.config);
                for (name, value) in reload_summary(&settings) {
                    println!("{}: {}", name, value);
                }
                println!("Warp command: /{} <warp>", settings.warp_command);
                println!(
                    "Plan: zoom at tick {}, final title at {}, teleport at {}",
                    settings.timings().zoom_start(),
                    settings.timings().final_message_at(),
                    settings.timings().commit_at()
                );
            }
        }
        Commands::Simulate {
            warp,
            move_at,
            damage_at,
            quit_at,
            bypass,
            realtime,
        } => {
            let settings = match pre_config {
                Some(config) => Settings::resolve(&config),
                None => {
                    info!("No config at {}, simulating with defaults", cli.config);
                    Settings::default()
                }
            };
            let script = Script {
                move_at,
                damage_at,
                quit_at,
            };
            simulate(&cli.config, settings, &warp, script, bypass, realtime).await?;
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct Script {
    move_at: Option<u64>,
    damage_at: Option<u64>,
    quit_at: Option<u64>,
}

impl Script {
    /// Apply whatever is due at `tick` (relative to the request).
    fn apply(&self, server: &SimServer, subject: &Arc<SimSubject>, tick: u64) {
        if self.move_at == Some(tick) {
            let to = subject.location().offset(warpfx::host::Vector::new(1.0, 0.0, 0.0));
            let verdict = server.move_subject(subject, to);
            println!("{:>5}  ! move one block -> {:?}", tick, verdict);
        }
        if self.damage_at == Some(tick) {
            let verdict = server.damage(subject);
            println!("{:>5}  ! damage -> {:?}", tick, verdict);
        }
        if self.quit_at == Some(tick) {
            server.quit(subject);
            println!("{:>5}  ! disconnect", tick);
        }
    }
}

async fn simulate(
    config_path: &str,
    settings: Settings,
    warp: &str,
    script: Script,
    bypass: bool,
    realtime: bool,
) -> Result<()> {
    let horizon = settings.timings().commit_at() + 20;
    let server = SimServer::new();
    let service = WarpService::with_settings(
        config_path,
        server.world().clone(),
        server.scheduler().clone(),
        settings,
    );
    server.install(service.clone());
    server.add_warp(warp, Location::new("world", 120.5, 72.0, -40.5));

    let subject = server.join("steve", Location::new("world", 0.5, 64.0, 0.5).with_rotation(90.0, 0.0));
    if bypass {
        subject.grant(BYPASS_PERMISSION);
    }

    let start = server.current_tick();
    let verdict = server.warp(&subject, warp);
    println!("{:>5}  request /{} -> {:?}", 0, warp, verdict);
    script.apply(&server, &subject, 0);

    if verdict == Verdict::Suppressed {
        if realtime {
            let driver = start_realtime_driver(server.scheduler().clone());
            let mut applied_through = 0;
            while applied_through < horizon {
                tokio::time::sleep(TICK).await;
                let now = server.current_tick().saturating_sub(start);
                for tick in applied_through + 1..=now.min(horizon) {
                    script.apply(&server, &subject, tick);
                }
                applied_through = now.max(applied_through);
            }
            driver.shutdown().await;
        } else {
            for tick in 1..=horizon {
                server.tick();
                script.apply(&server, &subject, tick);
            }
        }
    }

    for record in subject.records() {
        println!("{:>5}  {}", record.tick.saturating_sub(start), describe(&record.event));
    }
    println!(
        "final: {} at {} (live mounts: {})",
        subject.name(),
        subject.location(),
        server.world().live_mounts()
    );

    service.disable();
    Ok(())
}

fn describe(event: &SimEvent) -> String {
    match event {
        SimEvent::Title { title, subtitle } => format!("title    {:?} / {:?}", title, subtitle),
        SimEvent::ActionBar => "actionbar cleared".to_string(),
        SimEvent::Message(text) => format!("message  {}", text),
        SimEvent::Sound { key, volume, pitch } => {
            format!("sound    {} (volume {:.1}, pitch {:.2})", key, volume, pitch)
        }
        SimEvent::EffectApplied(effect) => format!(
            "effect+  {} for {} ticks (amplifier {})",
            effect.kind.key(),
            effect.duration_ticks,
            effect.amplifier
        ),
        SimEvent::EffectRemoved(kind) => format!("effect-  {}", kind.key()),
        SimEvent::Teleported(to) => format!("teleport {}", to),
        SimEvent::Command(command) => format!("command  /{}", command),
    }
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity wins over the configured level
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok());
    let base_level = match verbosity {
        0 => configured.unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    let log_file = config.as_ref().and_then(|c| c.logging.file.clone());
    match log_file.and_then(|file| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(file)
            .ok()
    }) {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // Mirror to the console only when attached to a terminal
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
