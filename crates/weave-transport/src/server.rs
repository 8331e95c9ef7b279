use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use weave_codec::{SnapshotFile, WireMessage};
use weave_document::DocumentValidator;
use weave_graph::{ExecMode, Graph, Snapshot};
use weave_schema::ClassRegistry;
use weave_tx::{Direction, Transaction};
use weave_types::TxId;

use crate::error::TransportResult;

pub type SessionId = u64;

/// Actor id of the server's own graph. The server never allocates refs.
const SERVER_ACTOR: u32 = 0;

/// Greet metadata entry naming the actor a client allocates refs under.
pub const ACTOR_KEY: &str = "actor";

/// Greet for `user` allocating refs under `actor`.
pub fn greeting(user: u64, actor: u32, session: u64) -> WireMessage {
    let metadata = BTreeMap::from([(ACTOR_KEY.to_string(), actor.to_string())]);
    WireMessage::Greet { user, session, metadata }
}

struct Session {
    user: Option<u64>,
    actor: Option<u32>,
    outbox: UnboundedSender<WireMessage>,
}

/// The authoritative copy of a document.
///
/// Transactions are validated strictly against the current state, in the
/// order sessions deliver them. An accepted transaction is acknowledged to
/// its sender and relayed to every other greeted session; a rejected one is
/// denied and leaves no trace. An optional [`DocumentValidator`] gets the
/// last word on transactions that applied.
///
/// Each greeted session owns its actor: a greet that declares no actor, the
/// server's actor, or one already held by another session closes the session
/// without a backend.
pub struct DocumentServer {
    graph: Graph,
    sessions: BTreeMap<SessionId, Session>,
    next_session: SessionId,
    revision: u64,
    saved: u64,
    validator: Option<Box<dyn DocumentValidator>>,
}

impl DocumentServer {
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self::from_graph(Graph::new(registry, SERVER_ACTOR))
    }

    /// Serve a committed graph.
    pub fn from_graph(mut graph: Graph) -> Self {
        graph.synchronize();
        Self { graph, sessions: BTreeMap::new(), next_session: 1, revision: 0, saved: 0, validator: None }
    }

    /// Check every transaction with `validator` once it applied strictly.
    pub fn with_validator(mut self, validator: impl DocumentValidator + 'static) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Load `path` if it exists, otherwise start from an empty document.
    pub fn open(registry: Arc<ClassRegistry>, tags: &SnapshotFile, path: &Path) -> TransportResult<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no snapshot, starting empty");
            return Ok(Self::new(registry));
        }
        let graph = tags.load(path, registry, SERVER_ACTOR)?;
        info!(path = %path.display(), nodes = graph.len(), "snapshot loaded");
        Ok(Self::from_graph(graph))
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn snapshot(&self) -> Snapshot {
        self.graph.snapshot()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of transactions accepted so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether transactions were accepted after the last saved revision.
    pub fn is_dirty(&self) -> bool {
        self.revision != self.saved
    }

    /// Record that the document as of `revision` is on disk.
    pub fn mark_saved(&mut self, revision: u64) {
        self.saved = revision;
    }

    pub fn open_session(&mut self, outbox: UnboundedSender<WireMessage>) -> SessionId {
        let id = self.next_session;
        self.next_session += 1;
        self.sessions.insert(id, Session { user: None, actor: None, outbox });
        debug!(session = id, "session opened");
        id
    }

    pub fn close_session(&mut self, id: SessionId) {
        if let Some(session) = self.sessions.remove(&id) {
            info!(session = id, user = ?session.user, "session closed");
        }
    }

    pub fn has_session(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Process one message from `session`.
    pub fn handle(&mut self, session: SessionId, msg: WireMessage) {
        match msg {
            WireMessage::Greet { user, session: client_session, metadata } => {
                if !self.sessions.contains_key(&session) {
                    warn!(session, "greet on unknown session");
                    return;
                }
                let actor = metadata.get(ACTOR_KEY).and_then(|a| a.parse::<u32>().ok());
                let Some(actor) = actor.filter(|&a| a != SERVER_ACTOR && !self.actor_in_use(session, a)) else {
                    warn!(session, user, actor = ?metadata.get(ACTOR_KEY), "greet refused, actor missing or taken");
                    self.sessions.remove(&session);
                    return;
                };
                if let Some(s) = self.sessions.get_mut(&session) {
                    s.user = Some(user);
                    s.actor = Some(actor);
                }
                info!(session, user, actor, client_session, "greeted");
                self.send(session, WireMessage::Backend { snapshot: self.graph.snapshot() });
            }
            WireMessage::Tx { tx } => {
                let id = tx.id();
                self.accept(session, id, tx);
            }
            WireMessage::Squash { range, tx } => self.accept(session, range.last, tx),
            WireMessage::Signal { kind, target, payload } => {
                self.relay(session, &WireMessage::Signal { kind, target, payload });
            }
            other => warn!(session, kind = other.type_name(), "unexpected message from client"),
        }
    }

    /// Have `session` apply `tx` as its own local edit.
    pub fn send_local(&mut self, session: SessionId, tx: Transaction) {
        self.send(session, WireMessage::Local { tx });
    }

    fn accept(&mut self, session: SessionId, id: TxId, tx: Transaction) {
        if !self.is_greeted(session) {
            warn!(session, %id, "transaction before greet");
            self.send(session, WireMessage::Deny { id });
            return;
        }
        let verdict = match self.graph.execute(&tx, Direction::Forward, ExecMode::Strict, false) {
            Ok(_) => self.validate(&tx),
            Err(e) => Err(e.to_string()),
        };
        match verdict {
            Ok(()) => {
                self.graph.synchronize();
                self.revision += 1;
                debug!(session, %id, opcodes = tx.len(), "transaction accepted");
                self.send(session, WireMessage::Ack { id });
                self.relay(session, &WireMessage::Tx { tx });
            }
            Err(reason) => {
                self.graph.revert();
                warn!(session, %id, %reason, "transaction denied");
                self.send(session, WireMessage::Deny { id });
            }
        }
    }

    fn validate(&self, tx: &Transaction) -> Result<(), String> {
        match &self.validator {
            Some(validator) => validator.validate(&self.graph, tx).map_err(|r| r.to_string()),
            None => Ok(()),
        }
    }

    fn is_greeted(&self, session: SessionId) -> bool {
        self.sessions.get(&session).is_some_and(|s| s.user.is_some())
    }

    fn actor_in_use(&self, session: SessionId, actor: u32) -> bool {
        self.sessions.iter().any(|(&id, s)| id != session && s.actor == Some(actor))
    }

    fn send(&self, session: SessionId, msg: WireMessage) {
        if let Some(s) = self.sessions.get(&session) {
            if s.outbox.send(msg).is_err() {
                debug!(session, "outbox closed");
            }
        }
    }

    fn relay(&self, from: SessionId, msg: &WireMessage) {
        for (&id, s) in self.sessions.iter().filter(|(&id, s)| id != from && s.user.is_some()) {
            if s.outbox.send(msg.clone()).is_err() {
                debug!(session = id, "outbox closed");
            }
        }
    }
}
