//! File-backed rule settings.
//!
//! `FileSettings` owns the rules compiled from the config file and tells the
//! rule service when they change. Reloads take a `prepare` callback so the
//! daemon can update state that depends on the new config (such as the
//! system titlebar default) before subscribers are notified.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use openmica_core_rules::{
    Handler, Rule, RuleStore, SettingsChange, SettingsProvider, SubscriptionId,
};
use tracing::{info, warn};

use crate::config::{Config, ConfigWarning};

/// A config file read and compiled, not yet published.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Config,
    pub rules: Vec<Rule>,
    pub warnings: Vec<ConfigWarning>,
}

impl LoadedConfig {
    /// Validate and compile an already parsed config.
    pub fn from_config(mut config: Config) -> Self {
        let mut warnings = config.validate();
        let (rules, rule_warnings) = config.compile_rules();
        warnings.extend(rule_warnings);
        Self {
            config,
            rules,
            warnings,
        }
    }

    pub fn log_warnings(&self) {
        for w in &self.warnings {
            warn!("Config: {} - {}", w.field, w.message);
        }
    }
}

/// [`SettingsProvider`] backed by a TOML config file.
#[derive(Debug)]
pub struct FileSettings {
    store: RuleStore,
    path: RwLock<Option<PathBuf>>,
    config: RwLock<Config>,
    watching: AtomicBool,
}

impl FileSettings {
    /// Publish `loaded` as the initial state without notifying anyone.
    pub fn new(path: Option<PathBuf>, loaded: LoadedConfig) -> Self {
        Self {
            store: RuleStore::new(loaded.rules),
            path: RwLock::new(path),
            config: RwLock::new(loaded.config),
            watching: AtomicBool::new(false),
        }
    }

    /// Config file in use, if any.
    pub fn path(&self) -> Option<PathBuf> {
        self.path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The last successfully loaded config.
    pub fn config(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn rule_count(&self) -> usize {
        self.store.len()
    }

    /// Read and compile the config file without publishing it.
    ///
    /// Without a config file this yields the defaults.
    fn load(&self) -> Result<LoadedConfig> {
        load_from(self.path().as_deref())
    }

    /// Publish a loaded config and notify subscribers with `change`.
    fn commit(&self, loaded: LoadedConfig, change: SettingsChange) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = loaded.config;
        self.store.replace(loaded.rules, change);
    }

    /// Re-read the config file and publish it as `ConfigFileReloaded`.
    ///
    /// `prepare` sees the new config before subscribers are notified. A file
    /// that fails to load leaves the current rules in place.
    pub fn reload(&self, prepare: impl FnOnce(&Config)) -> Result<Vec<ConfigWarning>> {
        let loaded = self.load()?;
        loaded.log_warnings();
        prepare(&loaded.config);
        let warnings = loaded.warnings.clone();
        self.commit(loaded, SettingsChange::ConfigFileReloaded);
        info!("Configuration reloaded ({} rules)", self.rule_count());
        Ok(warnings)
    }

    /// Switch to a different config file and load it.
    ///
    /// The new file is read and compiled first. If that fails, the current
    /// path and rules stay in place and nobody is notified.
    pub fn set_config_path(
        &self,
        path: impl AsRef<Path>,
        prepare: impl FnOnce(&Config),
    ) -> Result<Vec<ConfigWarning>> {
        let path = path.as_ref().to_path_buf();
        let loaded = load_from(Some(&path))?;

        info!("Config path changed to {}", path.display());
        *self.path.write().unwrap_or_else(PoisonError::into_inner) = Some(path);
        self.store.notify(SettingsChange::ConfigFilePathChanged);

        loaded.log_warnings();
        prepare(&loaded.config);
        let warnings = loaded.warnings.clone();
        self.commit(loaded, SettingsChange::ConfigFileReloaded);
        info!("Configuration reloaded ({} rules)", self.rule_count());
        Ok(warnings)
    }

    /// Notify subscribers of a change that did not come from the file.
    pub fn notify(&self, change: SettingsChange) {
        self.store.notify(change);
    }

    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::SeqCst)
    }

    /// Record whether the config watcher is running.
    pub fn set_watching(&self, watching: bool) {
        if self.watching.swap(watching, Ordering::SeqCst) != watching {
            self.store
                .notify(SettingsChange::ConfigFileWatcherStateChanged);
        }
    }
}

fn load_from(path: Option<&Path>) -> Result<LoadedConfig> {
    let config = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::default(),
    };
    Ok(LoadedConfig::from_config(config))
}

impl SettingsProvider for FileSettings {
    fn rules(&self) -> Arc<[Rule]> {
        self.store.rules()
    }

    fn subscribe(&self, listener: Handler<SettingsChange>) -> SubscriptionId {
        self.store.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.store.unsubscribe(id);
    }
}
