//! Replay-based linear undo history.
//!
//! A [`History`] stores committed transactions and a redo cursor. Undo and
//! redo do not recompute anything: they hand the stored transaction to a
//! [`TransactionExecutor`], which replays it backward or forward in undo
//! mode. Histories can be persisted through a [`HistoryStore`].

pub mod error;
pub mod history;
pub mod store;

pub use error::{HistoryError, HistoryResult};
pub use history::{History, HistoryState, TransactionExecutor};
pub use store::{FileHistoryStore, HistoryStore, MemoryHistoryStore};
