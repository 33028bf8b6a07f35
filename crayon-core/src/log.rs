//! The action log - the ordered record of what the user has done.
//!
//! Undo moves the newest action onto a redo stack, redo moves it back.
//! Appending a brand-new action discards the redo stack.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::{ActionKind, CanvasAction};

/// Ordered, append-only log of canvas actions with undo/redo.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionLog {
    /// Applied actions, oldest first.
    actions: Vec<CanvasAction>,
    /// Undone actions, most recently undone last.
    undone: Vec<CanvasAction>,
}

impl ActionLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log from already-recorded actions (e.g. a downloaded record).
    ///
    /// Missing ids and timestamps are assigned.
    #[must_use]
    pub fn from_actions(actions: Vec<CanvasAction>) -> Self {
        let mut log = Self::new();
        log.replace_all(actions);
        log
    }

    /// Append a new action, assigning its id and timestamp if missing.
    ///
    /// Clears the redo stack.
    pub fn append(&mut self, mut action: CanvasAction) -> &CanvasAction {
        action.assign_missing();
        if !self.undone.is_empty() {
            tracing::debug!(dropped = self.undone.len(), "New action discards redo stack");
            self.undone.clear();
        }
        self.actions.push(action);
        &self.actions[self.actions.len() - 1]
    }

    /// Remove the most recent action and keep it for redo.
    ///
    /// Returns `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Option<&CanvasAction> {
        let action = self.actions.pop()?;
        self.undone.push(action);
        self.undone.last()
    }

    /// Re-append the most recently undone action.
    ///
    /// Returns `None` when there is nothing to redo.
    pub fn redo(&mut self) -> Option<&CanvasAction> {
        let action = self.undone.pop()?;
        self.actions.push(action);
        self.actions.last()
    }

    /// Whether [`undo`](Self::undo) would do anything.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.actions.is_empty()
    }

    /// Whether [`redo`](Self::redo) would do anything.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.undone.is_empty()
    }

    /// Lazy view of the actions of one kind, in log order.
    ///
    /// The view is `Clone`, so it can be restarted without touching the log.
    #[must_use]
    pub fn actions_of_type(&self, kind: ActionKind) -> ActionsOfType<'_> {
        ActionsOfType {
            inner: self.actions.iter(),
            kind,
        }
    }

    /// Lazy view of the `fill` and `magic-fill` actions, in log order.
    #[must_use]
    pub fn fill_actions(&self) -> FillActions<'_> {
        FillActions {
            inner: self.actions.iter(),
        }
    }

    /// Hash of the fill subsequence's ids.
    ///
    /// Changes whenever a fill is added, undone, redone or replaced, and only then.
    #[must_use]
    pub fn fill_fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for action in self.fill_actions() {
            action.id().hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Hash of every applied action's id, in order.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for action in &self.actions {
            action.id().hash(&mut hasher);
        }
        hasher.finish()
    }

    /// All applied actions, oldest first.
    #[must_use]
    pub fn actions(&self) -> &[CanvasAction] {
        &self.actions
    }

    /// Iterate applied actions, oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, CanvasAction> {
        self.actions.iter()
    }

    /// The most recent action.
    #[must_use]
    pub fn last(&self) -> Option<&CanvasAction> {
        self.actions.last()
    }

    /// Number of applied actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Check if the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Replace the whole log (adopting a remote record). Clears redo.
    pub fn replace_all(&mut self, actions: Vec<CanvasAction>) {
        self.actions = actions;
        for action in &mut self.actions {
            action.assign_missing();
        }
        self.undone.clear();
    }

    /// Drop every action and the redo stack ("start over").
    pub fn clear(&mut self) {
        self.actions.clear();
        self.undone.clear();
    }

    /// Consume the log, returning the applied actions.
    #[must_use]
    pub fn into_actions(self) -> Vec<CanvasAction> {
        self.actions
    }
}

impl<'a> IntoIterator for &'a ActionLog {
    type Item = &'a CanvasAction;
    type IntoIter = std::slice::Iter<'a, CanvasAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

/// Iterator over the actions of one kind. See [`ActionLog::actions_of_type`].
#[derive(Debug, Clone)]
pub struct ActionsOfType<'a> {
    inner: std::slice::Iter<'a, CanvasAction>,
    kind: ActionKind,
}

impl<'a> Iterator for ActionsOfType<'a> {
    type Item = &'a CanvasAction;

    fn next(&mut self) -> Option<Self::Item> {
        let kind = self.kind;
        self.inner.by_ref().find(|a| a.kind() == kind)
    }
}

/// Iterator over fill and magic-fill actions. See [`ActionLog::fill_actions`].
#[derive(Debug, Clone)]
pub struct FillActions<'a> {
    inner: std::slice::Iter<'a, CanvasAction>,
}

impl<'a> Iterator for FillActions<'a> {
    type Item = &'a CanvasAction;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.by_ref().find(|a| a.kind().is_fill())
    }
}
