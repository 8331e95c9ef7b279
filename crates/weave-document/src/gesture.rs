use weave_tx::Transaction;

/// A commit gesture in progress.
///
/// Intermediate commits are squashed into one net transaction kept here,
/// outside the history, until the gesture ends.
#[derive(Clone, Debug, Default)]
pub struct PendingGesture {
    /// Number of the first commit of the gesture.
    pub(crate) first_nbr: u64,
    pub(crate) label: String,
    pub(crate) tx: Option<Transaction>,
    pub(crate) commits: usize,
}

impl PendingGesture {
    pub(crate) fn new(first_nbr: u64) -> Self {
        Self { first_nbr, ..Self::default() }
    }

    /// Net effect of the gesture so far.
    pub fn transaction(&self) -> Option<&Transaction> {
        self.tx.as_ref()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn commits(&self) -> usize {
        self.commits
    }
}
