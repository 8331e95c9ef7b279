//! Transactions: the unit of change exchanged between replicas and replayed
//! by the undo history.
//!
//! A [`Transaction`] is an ordered list of [`Opcode`]s. Each opcode targets
//! one node by [`Ref`](weave_types::Ref) and carries both the value before and
//! after the change, so undo is a pure data replay of the
//! [inverse](Transaction::inverted).

pub mod opcode;
pub mod transaction;

pub use opcode::{OpCode, OpFlags, Opcode, Operation};
pub use transaction::{Direction, Transaction};
