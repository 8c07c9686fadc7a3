//! Service lifecycle: enable, reload and disable.
//!
//! [`WarpService`] ties the config file, the [`TransitionEngine`] and the
//! periodic [`MountReconciler`] together the way a host plugin loader would use
//! them.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use log::info;

use crate::config::{Config, Settings};
use crate::host::World;
use crate::schedule::{TaskHandle, TaskScheduler};
use crate::transition::{MountReconciler, TransitionEngine};

pub struct WarpService {
    config_path: PathBuf,
    scheduler: Arc<dyn TaskScheduler>,
    engine: Arc<TransitionEngine>,
    reconciler: Arc<MountReconciler>,
    reconciler_task: Mutex<Option<(TaskHandle, u64)>>,
}

impl WarpService {
    /// Load (creating a default file if missing) the config at `config_path`,
    /// build the engine and start the reconciler.
    pub fn enable(
        config_path: impl Into<PathBuf>,
        world: Arc<dyn World>,
        scheduler: Arc<dyn TaskScheduler>,
    ) -> Result<Arc<Self>> {
        let config_path = config_path.into();
        if !config_path.exists() {
            Config::create_default(&config_path)?;
            info!("Created default configuration at {}", config_path.display());
        }
        let config = Config::load(&config_path)?;
        Ok(Self::with_settings(
            config_path,
            world,
            scheduler,
            Settings::resolve(&config),
        ))
    }

    /// Start with already-resolved settings. `reload` still reads `config_path`.
    pub fn with_settings(
        config_path: impl Into<PathBuf>,
        world: Arc<dyn World>,
        scheduler: Arc<dyn TaskScheduler>,
        settings: Settings,
    ) -> Arc<Self> {
        let interval = settings.cleanup_interval;
        let countdown = settings.countdown_seconds;
        let engine = TransitionEngine::new(world, scheduler.clone(), settings);
        let reconciler = MountReconciler::new(engine.clone());
        let task = reconciler.start(scheduler.as_ref(), interval);

        info!("warpfx enabled");
        info!("Countdown duration: {} seconds", countdown);
        info!("Orphaned mount sweep every {} ticks", interval);

        Arc::new(Self {
            config_path: config_path.into(),
            scheduler,
            engine,
            reconciler,
            reconciler_task: Mutex::new(Some((task, interval))),
        })
    }

    pub fn engine(&self) -> &Arc<TransitionEngine> {
        &self.engine
    }

    pub fn reconciler(&self) -> &Arc<MountReconciler> {
        &self.reconciler
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Re-read the config file and swap the engine's settings. Running plans keep
    /// the settings they started with. The reconciler is rescheduled when its
    /// interval changed.
    pub fn reload(&self) -> Result<Arc<Settings>> {
        let config = Config::load(&self.config_path)?;
        self.engine.apply_settings(Settings::resolve(&config));
        let settings = self.engine.settings();

        let mut task = self
            .reconciler_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let restart = match task.as_ref() {
            Some((_, interval)) => *interval != settings.cleanup_interval,
            None => false,
        };
        if restart {
            if let Some((handle, _)) = task.take() {
                handle.cancel();
            }
            let handle = self
                .reconciler
                .start(self.scheduler.as_ref(), settings.cleanup_interval);
            *task = Some((handle, settings.cleanup_interval));
            info!(
                "Orphaned mount sweep rescheduled every {} ticks",
                settings.cleanup_interval
            );
        }

        info!("Configuration reloaded from {}", self.config_path.display());
        Ok(settings)
    }

    /// Stop the reconciler, then flush every live transition. Safe to call twice.
    pub fn disable(&self) -> usize {
        let task = self
            .reconciler_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some((handle, _)) = task {
            handle.cancel();
        }
        let flushed = self.engine.shutdown();
        info!("warpfx disabled");
        flushed
    }

    pub fn is_enabled(&self) -> bool {
        self.reconciler_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}
