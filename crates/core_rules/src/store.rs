//! In-memory rule collection.

use std::sync::{Arc, PoisonError, RwLock};

use crate::event::{Handler, Listeners, SettingsChange, SubscriptionId};
use crate::platform::SettingsProvider;
use crate::rule::Rule;

/// A [`SettingsProvider`] holding rules in memory.
///
/// The rule list is an immutable `Arc<[Rule]>` swapped under a lock, so a
/// reader always gets a consistent snapshot even while a reload replaces it.
#[derive(Debug)]
pub struct RuleStore {
    rules: RwLock<Arc<[Rule]>>,
    listeners: Listeners<SettingsChange>,
}

impl RuleStore {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules: RwLock::new(rules.into()),
            listeners: Listeners::new(),
        }
    }

    /// Replace every rule and notify subscribers with `change`.
    pub fn replace(&self, rules: Vec<Rule>, change: SettingsChange) {
        *self.rules.write().unwrap_or_else(PoisonError::into_inner) = rules.into();
        self.notify(change);
    }

    /// Append a rule.
    pub fn push(&self, rule: Rule) {
        {
            let mut guard = self.rules.write().unwrap_or_else(PoisonError::into_inner);
            let mut rules = guard.to_vec();
            rules.push(rule);
            *guard = rules.into();
        }
        self.notify(SettingsChange::RuleAdded);
    }

    /// Remove every rule named `name`. Returns false if none matched.
    pub fn remove(&self, name: &str) -> bool {
        let removed = {
            let mut guard = self.rules.write().unwrap_or_else(PoisonError::into_inner);
            let before = guard.len();
            let rules: Vec<Rule> = guard.iter().filter(|r| r.name != name).cloned().collect();
            let removed = rules.len() != before;
            *guard = rules.into();
            removed
        };
        if removed {
            self.notify(SettingsChange::RuleRemoved);
        }
        removed
    }

    /// Notify subscribers without touching the rules.
    pub fn notify(&self, change: SettingsChange) {
        self.listeners.emit(&change);
    }

    pub fn len(&self) -> usize {
        self.rules.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl SettingsProvider for RuleStore {
    fn rules(&self) -> Arc<[Rule]> {
        self.rules.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn subscribe(&self, listener: Handler<SettingsChange>) -> SubscriptionId {
        self.listeners.add(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.remove(id);
    }
}
