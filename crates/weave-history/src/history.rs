use serde::{Deserialize, Serialize};
use tracing::debug;
use weave_graph::{ExecMode, Graph};
use weave_tx::{Direction, Transaction};
use weave_types::fatal;

/// Replays stored transactions on a document.
pub trait TransactionExecutor {
    /// Apply `tx` backward, skipping what no longer applies.
    fn execute_correct_backward(&mut self, tx: &Transaction, undo_mode: bool);

    /// Apply `tx` forward, skipping what no longer applies.
    fn execute_correct_forward(&mut self, tx: &Transaction, undo_mode: bool);
}

impl TransactionExecutor for Graph {
    fn execute_correct_backward(&mut self, tx: &Transaction, undo_mode: bool) {
        if let Err(e) = self.execute(tx, Direction::Backward, ExecMode::Correct, undo_mode) {
            fatal!("correct execution cannot fail: {e}");
        }
    }

    fn execute_correct_forward(&mut self, tx: &Transaction, undo_mode: bool) {
        if let Err(e) = self.execute(tx, Direction::Forward, ExecMode::Correct, undo_mode) {
            fatal!("correct execution cannot fail: {e}");
        }
    }
}

/// Serializable form of a [`History`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryState {
    pub steps: Vec<Transaction>,
    pub first_redo: usize,
}

/// Linear undo history. Steps before the redo cursor can be undone, steps
/// at or after it redone. Adding a step discards the redo branch.
#[derive(Clone, Debug, Default)]
pub struct History {
    steps: Vec<Transaction>,
    first_redo: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed transaction. Transactions with nothing to undo
    /// are ignored; returns whether the step was added.
    pub fn add_undo_step(&mut self, tx: Transaction) -> bool {
        if !tx.has_opcode_in_undo() {
            return false;
        }
        self.steps.truncate(self.first_redo);
        debug!(id = %tx.id(), label = tx.label().unwrap_or(""), "undo step added");
        self.steps.push(tx);
        self.first_redo = self.steps.len();
        true
    }

    /// Undo the last step. Fatal when there is nothing to undo.
    pub fn execute_undo(&mut self, executor: &mut dyn TransactionExecutor) {
        if !self.can_undo() {
            fatal!("undo requested with nothing to undo");
        }
        self.first_redo -= 1;
        executor.execute_correct_backward(&self.steps[self.first_redo], true);
    }

    /// Redo the first undone step. Fatal when there is nothing to redo.
    pub fn execute_redo(&mut self, executor: &mut dyn TransactionExecutor) {
        if !self.can_redo() {
            fatal!("redo requested with nothing to redo");
        }
        executor.execute_correct_forward(&self.steps[self.first_redo], true);
        self.first_redo += 1;
    }

    /// Drop the step at `index` without replaying anything.
    pub fn erase(&mut self, index: usize) {
        if index >= self.steps.len() {
            fatal!("history index {index} out of range ({} steps)", self.steps.len());
        }
        self.steps.remove(index);
        if index < self.first_redo {
            self.first_redo -= 1;
        }
    }

    pub fn clear(&mut self) {
        self.steps.clear();
        self.first_redo = 0;
    }

    pub fn can_undo(&self) -> bool {
        self.first_redo > 0
    }

    pub fn can_redo(&self) -> bool {
        self.first_redo < self.steps.len()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.last_undo().and_then(|i| self.steps[i].label())
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.first_redo().and_then(|i| self.steps[i].label())
    }

    /// Index of the step the next undo replays.
    pub fn last_undo(&self) -> Option<usize> {
        self.first_redo.checked_sub(1)
    }

    /// Index of the step the next redo replays.
    pub fn first_redo(&self) -> Option<usize> {
        self.can_redo().then_some(self.first_redo)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Transaction] {
        &self.steps
    }

    pub fn to_state(&self) -> HistoryState {
        HistoryState { steps: self.steps.clone(), first_redo: self.first_redo }
    }

    pub fn from_state(state: HistoryState) -> Self {
        let first_redo = state.first_redo.min(state.steps.len());
        Self { steps: state.steps, first_redo }
    }
}
