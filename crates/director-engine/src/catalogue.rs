//! Per-game action catalogue.

use std::collections::HashMap;

use director_core::Action;

/// Mapping from action name to its most recently registered definition.
#[derive(Clone, Debug, Default)]
pub struct ActionCatalogue {
    actions: HashMap<String, Action>,
}

impl ActionCatalogue {
    /// Create an empty catalogue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or wholesale-replace each action by name. Returns how many were applied.
    pub fn register(&mut self, actions: impl IntoIterator<Item = Action>) -> usize {
        let mut applied = 0;
        for action in actions {
            let _ = self.actions.insert(action.name.clone(), action);
            applied += 1;
        }
        applied
    }

    /// Remove each named action if present. Returns how many were actually removed.
    pub fn unregister<S: AsRef<str>>(&mut self, names: impl IntoIterator<Item = S>) -> usize {
        names
            .into_iter()
            .filter(|name| self.actions.remove(name.as_ref()).is_some())
            .count()
    }

    /// Snapshot of every registered action, sorted by name.
    pub fn list(&self) -> Vec<Action> {
        let mut actions: Vec<Action> = self.actions.values().cloned().collect();
        actions.sort_by(|a, b| a.name.cmp(&b.name));
        actions
    }

    /// Drop every action.
    pub fn reset(&mut self) {
        self.actions.clear();
    }

    /// Look up an action by name.
    pub fn get(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether no actions are registered.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
