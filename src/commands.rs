//! Admin command: `/<label> reload`.

use std::sync::Arc;

use log::error;

use crate::config::Settings;
use crate::host::CommandSender;
use crate::service::WarpService;
use crate::text::RichText;

/// Permission required to run or tab-complete the reload command.
pub const RELOAD_PERMISSION: &str = "warpfx.reload";

const SUBCOMMAND: &str = "reload";

pub struct ReloadCommand {
    service: Arc<WarpService>,
}

impl ReloadCommand {
    pub fn new(service: Arc<WarpService>) -> Self {
        Self { service }
    }

    /// Handle the command. Always returns `true` (the command was consumed).
    pub fn execute(&self, sender: &dyn CommandSender, label: &str, args: &[&str]) -> bool {
        // Permission is checked before argument parsing.
        if !sender.has_permission(RELOAD_PERMISSION) {
            sender.send_message(RichText::parse(
                "<red>You don't have permission to use this command.",
            ));
            return true;
        }

        match args.first() {
            Some(arg) if arg.eq_ignore_ascii_case(SUBCOMMAND) => {}
            _ => {
                sender.send_message(RichText::parse(&format!(
                    "<red>Usage: /{} reload",
                    crate::text::escape_tags(label)
                )));
                return true;
            }
        }

        match self.service.reload() {
            Ok(settings) => {
                sender.send_message(RichText::parse(
                    "<green><bold>✓</bold> warpfx config reloaded successfully!",
                ));
                for (name, value) in reload_summary(&settings) {
                    sender.send_message(RichText::parse(&format!(
                        "<gray>{}: <white>{}",
                        name, value
                    )));
                }
            }
            Err(e) => {
                sender.send_message(RichText::parse(&format!(
                    "<red><bold>✗</bold> Error reloading config: {}",
                    crate::text::escape_tags(&e.to_string())
                )));
                error!("Error reloading config requested by {}: {:#}", sender.name(), e);
            }
        }
        true
    }

    /// Completions for the argument being typed.
    pub fn tab_complete(&self, sender: &dyn CommandSender, args: &[&str]) -> Vec<String> {
        if args.len() != 1 || !sender.has_permission(RELOAD_PERMISSION) {
            return Vec::new();
        }
        let typed = args[0].to_ascii_lowercase();
        if SUBCOMMAND.starts_with(&typed) {
            vec![SUBCOMMAND.to_string()]
        } else {
            Vec::new()
        }
    }
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "Enabled"
    } else {
        "Disabled"
    }
}

/// The key settings echoed after a reload, as `(name, value)` pairs.
pub fn reload_summary(settings: &Settings) -> Vec<(&'static str, String)> {
    vec![
        (
            "Countdown duration",
            format!("{} seconds", settings.countdown_seconds),
        ),
        ("Final sound", enabled(settings.final_sound.enabled).to_string()),
        (
            "Blindness effect",
            enabled(settings.blindness.enabled).to_string(),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_reflects_settings() {
        let mut settings = Settings::default();
        settings.countdown_seconds = 5;
        settings.blindness.enabled = false;
        assert_eq!(
            reload_summary(&settings),
            vec![
                ("Countdown duration", "5 seconds".to_string()),
                ("Final sound", "Enabled".to_string()),
                ("Blindness effect", "Disabled".to_string()),
            ]
        );
    }
}
