use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use weave_codec::WireMessage;
use weave_graph::{ExecMode, Graph};
use weave_history::TransactionExecutor;
use weave_schema::ClassRegistry;
use weave_tx::{Direction, OpCode, Transaction};
use weave_types::{fatal, FourCc, Ref, TxId, TxIdRange};

use crate::carrier::{Carrier, CarrierState};
use crate::error::{DocumentError, DocumentResult};
use crate::observer::DocumentObserver;

type SignalHandler = Box<dyn FnMut(Ref, &[u8]) + Send>;

/// A committed transaction the server has not acknowledged yet.
#[derive(Clone, Debug)]
struct PushEntry {
    range: TxIdRange,
    tx: Transaction,
    sent: bool,
}

/// A replica of a shared document.
///
/// Local edits go straight into [`graph_mut`](Document::graph_mut) and stay
/// pending until [`commit`](Document::commit). Committed transactions are
/// queued and sent by [`push`](Document::push); they are kept until the
/// server acknowledges or denies them, so that remote transactions can be
/// applied underneath them.
pub struct Document {
    graph: Graph,
    user: u64,
    nbr: u64,
    entries: Vec<PushEntry>,
    observer: Option<Box<dyn DocumentObserver>>,
    carrier: Option<Box<dyn Carrier>>,
    signals: HashMap<FourCc, Vec<SignalHandler>>,
}

/// Correct-mode execution, which only reports the opcodes it skipped.
fn execute_correct(graph: &mut Graph, tx: &Transaction, direction: Direction, undo_mode: bool) -> Transaction {
    match graph.execute(tx, direction, ExecMode::Correct, undo_mode) {
        Ok(applied) => applied,
        Err(e) => fatal!("correct execution cannot fail: {e}"),
    }
}

impl Document {
    pub fn new(registry: Arc<ClassRegistry>, user: u64, actor: u32) -> Self {
        Self::from_graph(Graph::new(registry, actor), user)
    }

    pub fn from_graph(graph: Graph, user: u64) -> Self {
        Self {
            graph,
            user,
            nbr: 0,
            entries: Vec::new(),
            observer: None,
            carrier: None,
            signals: HashMap::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn root(&self) -> Ref {
        self.graph.root()
    }

    pub fn user(&self) -> u64 {
        self.user
    }

    pub fn actor(&self) -> u32 {
        self.graph.actor()
    }

    /// Number the next commit will carry.
    pub fn next_nbr(&self) -> u64 {
        self.nbr + 1
    }

    /// Commits not yet acknowledged by the server.
    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    /// Commits not yet handed to the carrier.
    pub fn unsent(&self) -> usize {
        self.entries.iter().filter(|e| !e.sent).count()
    }

    /// Replace the whole graph, dropping queued commits.
    pub fn replace_graph(&mut self, graph: Graph) {
        if !self.entries.is_empty() {
            warn!(pending = self.entries.len(), "dropping unacknowledged commits");
        }
        self.graph = graph;
        self.entries.clear();
    }

    // ------------------------------------------------------------------
    // Observers and signals
    // ------------------------------------------------------------------

    pub fn set_observer(&mut self, observer: Box<dyn DocumentObserver>) {
        self.observer = Some(observer);
    }

    pub fn clear_observer(&mut self) -> Option<Box<dyn DocumentObserver>> {
        self.observer.take()
    }

    fn notify(&mut self) {
        if let Some(observer) = self.observer.as_mut() {
            observer.document_changed(&self.graph);
        }
    }

    /// Register a handler for signals of `kind` sent by other peers.
    pub fn connect_signal(&mut self, kind: FourCc, handler: impl FnMut(Ref, &[u8]) + Send + 'static) {
        self.signals.entry(kind).or_default().push(Box::new(handler));
    }

    /// Send a transient signal to the other peers. Dropped without a carrier.
    pub fn send_signal(&mut self, kind: FourCc, target: Ref, payload: impl Into<Vec<u8>>) {
        match self.carrier.as_mut() {
            Some(carrier) => carrier.send(WireMessage::Signal { kind, target, payload: payload.into() }),
            None => debug!(%kind, "no carrier, signal dropped"),
        }
    }

    fn dispatch_signal(&mut self, kind: FourCc, target: Ref, payload: &[u8]) {
        match self.signals.get_mut(&kind) {
            Some(handlers) => {
                for handler in handlers.iter_mut() {
                    handler(target, payload);
                }
            }
            None => debug!(%kind, "unhandled signal"),
        }
    }

    // ------------------------------------------------------------------
    // Carrier
    // ------------------------------------------------------------------

    pub fn set_carrier(&mut self, carrier: Box<dyn Carrier>) {
        self.carrier = Some(carrier);
    }

    pub fn take_carrier(&mut self) -> Option<Box<dyn Carrier>> {
        self.carrier.take()
    }

    pub fn carrier_mut(&mut self) -> Option<&mut (dyn Carrier + 'static)> {
        self.carrier.as_deref_mut()
    }

    pub fn carrier_state(&self) -> CarrierState {
        self.carrier.as_ref().map_or(CarrierState::Disconnected, |c| c.state())
    }

    // ------------------------------------------------------------------
    // Commit / push
    // ------------------------------------------------------------------

    /// Turn the pending diff into a transaction.
    ///
    /// The observer sees the graph with its change flags before they are
    /// folded into the baseline. A clean graph yields an empty transaction
    /// that is neither numbered nor queued.
    pub fn commit(&mut self, label: &str) -> Transaction {
        let mut tx = self.graph.make();
        if tx.is_empty() {
            self.graph.synchronize();
            return tx;
        }
        self.nbr += 1;
        let id = TxId::new(self.user, self.graph.actor(), self.nbr);
        tx.set_id(id);
        if !label.is_empty() {
            tx.set_label(label);
        }
        self.notify();
        self.graph.synchronize();
        self.entries.push(PushEntry { range: TxIdRange::single(id), tx: tx.clone(), sent: false });
        debug!(%id, opcodes = tx.len(), "commit");
        tx
    }

    /// Hand every unsent commit to the carrier. Without a carrier the commits
    /// stay queued.
    pub fn push(&mut self) {
        let Some(carrier) = self.carrier.as_mut() else {
            return;
        };
        for entry in self.entries.iter_mut().filter(|e| !e.sent) {
            let msg = if entry.range.is_single() {
                WireMessage::Tx { tx: entry.tx.clone() }
            } else {
                WireMessage::Squash { range: entry.range, tx: entry.tx.clone() }
            };
            carrier.send(msg);
            entry.sent = true;
            debug!(last = %entry.range.last, "pushed");
        }
    }

    /// Discard the pending diff.
    pub fn revert(&mut self) {
        self.graph.revert();
    }

    /// Collapse the unsent commits numbered `nbr` or later into one queued
    /// transaction with their net effect.
    ///
    /// Returns the squashed transaction, or `None` when there was nothing to
    /// squash or the commits cancel out, in which case they are dropped.
    pub fn squash_since(&mut self, nbr: u64) -> Option<Transaction> {
        if !self.graph.is_clean() {
            fatal!("squash with uncommitted changes");
        }
        let start = self.entries.iter().position(|e| !e.sent && e.range.first.nbr >= nbr)?;
        let squashed: Vec<PushEntry> = self.entries.drain(start..).collect();
        for entry in squashed.iter().rev() {
            execute_correct(&mut self.graph, &entry.tx, Direction::Backward, false);
        }
        let back = self.graph.make();
        self.graph.revert();

        let mut tx = back.inverted();
        for entry in &squashed {
            for opcode in entry.tx.opcodes().iter().filter(|o| o.op.code() == OpCode::MessagePush) {
                tx.push(opcode.clone());
            }
        }
        let (first, last) = match (squashed.first(), squashed.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return None,
        };
        let range = first.range.merge(&last.range);
        tx.set_id(range.last);
        if let Some(label) = last.tx.label() {
            tx.set_label(label);
        }
        if tx.is_empty() {
            debug!(first = %range.first, last = %range.last, "squashed commits cancel out");
            return None;
        }
        debug!(first = %range.first, last = %range.last, opcodes = tx.len(), "squash");
        self.entries.push(PushEntry { range, tx: tx.clone(), sent: false });
        Some(tx)
    }

    /// Squash every unsent commit.
    pub fn squash(&mut self) -> Option<Transaction> {
        self.squash_since(0)
    }

    // ------------------------------------------------------------------
    // Pull
    // ------------------------------------------------------------------

    /// Merge inbound traffic into the document.
    ///
    /// The pending local diff is stashed, remote transactions are applied
    /// underneath the queued commits, the observer is notified once if that
    /// changed the graph, and the stash is replayed in rebase mode so that
    /// local edits win their conflicts. Returns whether anything was received.
    pub fn pull(&mut self) -> DocumentResult<bool> {
        let Some(carrier) = self.carrier.as_mut() else {
            return Ok(false);
        };
        carrier.process();
        let mut inbox = Vec::new();
        while let Some(msg) = carrier.receive() {
            inbox.push(msg);
        }
        if inbox.is_empty() {
            return Ok(false);
        }

        let stash = self.graph.make();
        self.graph.revert();

        let mut result = Ok(true);
        let mut reloaded = false;
        let mut locals = Vec::new();
        for msg in inbox {
            match msg {
                WireMessage::Backend { snapshot } => {
                    reloaded = true;
                    if let Err(e) = self.load_backend(&snapshot) {
                        result = Err(e);
                    }
                }
                WireMessage::Tx { tx } | WireMessage::Squash { tx, .. } => self.apply_remote(&tx),
                WireMessage::Ack { id } => self.acknowledge(id),
                WireMessage::Deny { id } => self.roll_back(id),
                WireMessage::Local { tx } => locals.push(tx),
                WireMessage::Signal { kind, target, payload } => self.dispatch_signal(kind, target, &payload),
                WireMessage::Greet { .. } => warn!("unexpected greet on a document"),
            }
        }

        if reloaded || !self.graph.is_clean() {
            self.notify();
        }
        self.graph.synchronize();

        if !stash.is_empty() {
            if let Err(e) = self.graph.execute(&stash, Direction::Forward, ExecMode::Rebase, false) {
                fatal!("rebase execution cannot fail: {e}");
            }
        }
        for tx in &locals {
            execute_correct(&mut self.graph, tx, Direction::Forward, false);
        }
        result
    }

    fn load_backend(&mut self, snapshot: &weave_graph::Snapshot) -> DocumentResult<()> {
        if !self.entries.is_empty() {
            warn!(pending = self.entries.len(), "backend replaces unacknowledged commits");
            self.entries.clear();
        }
        self.graph.load_snapshot(snapshot).map_err(DocumentError::from)?;
        info!(version = %snapshot.version, nodes = self.graph.len(), "backend loaded");
        Ok(())
    }

    /// Apply a transaction that the server already ordered before every
    /// queued commit.
    fn apply_remote(&mut self, tx: &Transaction) {
        for entry in self.entries.iter().rev() {
            execute_correct(&mut self.graph, &entry.tx, Direction::Backward, false);
        }
        if let Err(e) = self.graph.execute(tx, Direction::Forward, ExecMode::Strict, false) {
            fatal!("remote transaction {} does not apply: {e}", tx.id());
        }
        for entry in self.entries.iter_mut() {
            entry.tx = execute_correct(&mut self.graph, &entry.tx, Direction::Forward, false);
        }
        debug!(id = %tx.id(), opcodes = tx.len(), "remote transaction applied");
    }

    fn acknowledge(&mut self, id: TxId) {
        match self.entries.iter().position(|e| e.range.last == id) {
            Some(pos) => {
                self.entries.remove(pos);
                debug!(%id, "acknowledged");
            }
            None => warn!(%id, "acknowledgement for unknown transaction"),
        }
    }

    fn roll_back(&mut self, id: TxId) {
        let Some(pos) = self.entries.iter().position(|e| e.range.last == id) else {
            warn!(%id, "denial for unknown transaction");
            return;
        };
        for entry in self.entries[pos..].iter().rev() {
            execute_correct(&mut self.graph, &entry.tx, Direction::Backward, false);
        }
        self.entries.remove(pos);
        for entry in self.entries[pos..].iter_mut() {
            entry.tx = execute_correct(&mut self.graph, &entry.tx, Direction::Forward, false);
        }
        warn!(%id, "transaction denied and rolled back");
    }
}

impl TransactionExecutor for Document {
    fn execute_correct_backward(&mut self, tx: &Transaction, undo_mode: bool) {
        execute_correct(&mut self.graph, tx, Direction::Backward, undo_mode);
    }

    fn execute_correct_forward(&mut self, tx: &Transaction, undo_mode: bool) {
        execute_correct(&mut self.graph, tx, Direction::Forward, undo_mode);
    }
}
