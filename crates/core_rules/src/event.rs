//! Events exchanged between the rule service and its collaborators.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::target::WindowHandle;

/// A new top-level window appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOpened {
    pub handle: WindowHandle,
}

/// What changed in the settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsChange {
    /// A rule was added.
    RuleAdded,
    /// A rule was removed.
    RuleRemoved,
    /// A rule was edited or the rules were reordered.
    RuleChanged,
    /// The whole configuration was re-read from disk.
    ConfigFileReloaded,
    /// The ambient system titlebar default changed.
    SystemTitlebarChanged,
    /// The config file watcher was started or stopped.
    ConfigFileWatcherStateChanged,
    /// The config file moved to a different path.
    ConfigFilePathChanged,
}

impl SettingsChange {
    /// Whether windows need restyling after this change.
    ///
    /// Watcher state and file path changes are administrative and leave the
    /// rules untouched.
    pub fn affects_rules(self) -> bool {
        !matches!(
            self,
            Self::ConfigFileWatcherStateChanged | Self::ConfigFilePathChanged
        )
    }
}

/// Identifies one registered handler so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback invoked for every emitted event.
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Thread-safe registry of event handlers.
///
/// Handlers are invoked on the emitting thread, outside the registry lock,
/// so a handler may add or remove handlers without deadlocking.
pub struct Listeners<E> {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(SubscriptionId, Handler<E>)>>,
}

impl<E> Listeners<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Register a handler.
    pub fn add(&self, handler: Handler<E>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, handler));
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Remove every handler.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every registered handler with `event`.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Handler<E>> = self.lock().iter().map(|(_, h)| h.clone()).collect();
        for handler in snapshot {
            handler(event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Handler<E>)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}
