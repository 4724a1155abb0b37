//! Snapshot-based undo/redo history.

use crate::config::DEFAULT_HISTORY_DEPTH;
use std::collections::VecDeque;

/// State that can be captured and restored wholesale.
pub trait Snapshotable {
    type Snapshot;

    /// Capture the current state.
    fn snapshot(&self) -> Self::Snapshot;

    /// Replace the current state with `snapshot`.
    fn restore(&mut self, snapshot: Self::Snapshot);
}

/// Linear undo/redo stacks over opaque snapshots.
///
/// Call [`History::push`] *before* mutating the target so the pre-mutation
/// state is always recoverable. Pushing after an undo discards the redo
/// stack; pushing past `max_depth` evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct History<S> {
    undo_stack: VecDeque<S>,
    redo_stack: Vec<S>,
    max_depth: usize,
}

impl<S> Default for History<S> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

impl<S> History<S> {
    /// Create an empty history holding at most `max_depth` undo states.
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Capture `target` onto the undo stack.
    pub fn push<T>(&mut self, target: &T)
    where
        T: Snapshotable<Snapshot = S>,
    {
        self.push_snapshot(target.snapshot());
    }

    /// Push an already-captured snapshot.
    pub fn push_snapshot(&mut self, snapshot: S) {
        self.undo_stack.push_back(snapshot);
        self.redo_stack.clear();

        while self.undo_stack.len() > self.max_depth {
            self.undo_stack.pop_front();
        }
    }

    /// Undo the last change.
    /// Returns true if undo was performed, false if nothing to undo.
    pub fn undo<T>(&mut self, target: &mut T) -> bool
    where
        T: Snapshotable<Snapshot = S>,
    {
        let Some(snapshot) = self.undo_stack.pop_back() else {
            return false;
        };
        self.redo_stack.push(target.snapshot());
        target.restore(snapshot);
        true
    }

    /// Redo the last undone change.
    /// Returns true if redo was performed, false if nothing to redo.
    pub fn redo<T>(&mut self, target: &mut T) -> bool
    where
        T: Snapshotable<Snapshot = S>,
    {
        let Some(snapshot) = self.redo_stack.pop() else {
            return false;
        };
        self.undo_stack.push_back(target.snapshot());
        while self.undo_stack.len() > self.max_depth {
            self.undo_stack.pop_front();
        }
        target.restore(snapshot);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Drop both stacks.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
