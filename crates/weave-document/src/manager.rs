use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use weave_graph::Graph;
use weave_history::{History, HistoryStore};
use weave_schema::ClassRegistry;
use weave_tx::Transaction;
use weave_types::fatal;

use crate::carrier::{Carrier, CarrierState};
use crate::config::EngineConfig;
use crate::document::Document;
use crate::error::{DocumentError, DocumentResult};
use crate::gesture::PendingGesture;

const CONNECT_POLL: Duration = Duration::from_millis(1);

/// An editing session: a document with undo history, commit gestures and a
/// connection that is pulled periodically.
pub struct DocumentManager {
    document: Document,
    history: History,
    gesture: Option<PendingGesture>,
    config: EngineConfig,
    connected: bool,
    last_pull: Option<Instant>,
}

impl DocumentManager {
    pub fn new(registry: Arc<ClassRegistry>, config: EngineConfig) -> Self {
        let document = Document::new(registry, config.user_id, config.actor);
        Self::with_document(document, config)
    }

    pub fn with_document(document: Document, config: EngineConfig) -> Self {
        Self {
            document,
            history: History::new(),
            gesture: None,
            config,
            connected: false,
            last_pull: None,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn graph(&self) -> &Graph {
        self.document.graph()
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        self.document.graph_mut()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Commits and gestures
    // ------------------------------------------------------------------

    /// Commit and push the pending diff. A non-empty labelled commit becomes
    /// an undo step; an empty label commits outside the history.
    pub fn commit(&mut self, label: &str) -> Transaction {
        if self.gesture.is_some() {
            fatal!("commit during a commit gesture");
        }
        let tx = self.document.commit(label);
        if !label.is_empty() {
            self.history.add_undo_step(tx.clone());
        }
        self.document.push();
        tx
    }

    pub fn start_commit_gesture(&mut self) {
        if self.gesture.is_some() {
            fatal!("nested commit gesture");
        }
        self.gesture = Some(PendingGesture::new(self.document.next_nbr()));
        debug!("commit gesture started");
    }

    /// Commit an intermediate state of the gesture. The commit is neither
    /// pushed nor recorded; it is squashed with the earlier ones.
    pub fn commit_gesture(&mut self, label: &str) {
        let Some(gesture) = self.gesture.as_mut() else {
            fatal!("gesture commit outside a commit gesture");
        };
        self.document.commit(label);
        gesture.tx = self.document.squash_since(gesture.first_nbr);
        gesture.label = label.to_string();
        gesture.commits += 1;
    }

    /// Close the gesture: its net effect is pushed as one message and
    /// recorded as one undo step.
    pub fn end_commit_gesture(&mut self) {
        let Some(gesture) = self.gesture.take() else {
            fatal!("no commit gesture to end");
        };
        self.document.push();
        if let Some(tx) = gesture.tx {
            if !gesture.label.is_empty() {
                self.history.add_undo_step(tx);
            }
        }
        debug!(commits = gesture.commits, "commit gesture ended");
    }

    pub fn is_in_commit_gesture(&self) -> bool {
        self.gesture.is_some()
    }

    pub fn gesture(&self) -> Option<&PendingGesture> {
        self.gesture.as_ref()
    }

    // ------------------------------------------------------------------
    // Undo / redo
    // ------------------------------------------------------------------

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.history.undo_label()
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.history.redo_label()
    }

    /// Undo the last step and commit the result outside the history.
    /// Fatal while edits are pending: they would be committed with the undo
    /// and never become undoable themselves.
    pub fn undo(&mut self) {
        if self.gesture.is_some() {
            fatal!("undo during a commit gesture");
        }
        if !self.graph().is_clean() {
            fatal!("undo with uncommitted edits");
        }
        self.history.execute_undo(&mut self.document);
        self.document.commit("");
        self.document.push();
    }

    /// Redo the first undone step. Fatal while edits are pending.
    pub fn redo(&mut self) {
        if self.gesture.is_some() {
            fatal!("redo during a commit gesture");
        }
        if !self.graph().is_clean() {
            fatal!("redo with uncommitted edits");
        }
        self.history.execute_redo(&mut self.document);
        self.document.commit("");
        self.document.push();
    }

    pub fn save_history(&self, store: &dyn HistoryStore) -> DocumentResult<()> {
        store.save(&self.history.to_state())?;
        Ok(())
    }

    /// Restore history saved by [`save_history`](Self::save_history).
    /// Returns whether the store held any.
    pub fn load_history(&mut self, store: &dyn HistoryStore) -> DocumentResult<bool> {
        match store.load()? {
            Some(state) => {
                self.history = History::from_state(state);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------

    /// Attach `carrier` and wait until the backend arrives, then load it.
    pub fn connect(&mut self, carrier: Box<dyn Carrier>) -> DocumentResult<()> {
        let timeout = self.config.connect_timeout();
        let started = Instant::now();
        self.document.set_carrier(carrier);
        loop {
            let Some(carrier) = self.document.carrier_mut() else {
                return Err(DocumentError::ConnectFailed);
            };
            carrier.process();
            match carrier.state() {
                CarrierState::Connected if carrier.is_loaded() => break,
                CarrierState::Disconnected => {
                    self.document.take_carrier();
                    warn!("connection closed before the backend arrived");
                    return Err(DocumentError::ConnectFailed);
                }
                _ => {}
            }
            if started.elapsed() >= timeout {
                carrier.disconnect();
                self.document.take_carrier();
                warn!(?timeout, "connection timed out");
                return Err(DocumentError::ConnectTimeout(timeout));
            }
            thread::sleep(CONNECT_POLL);
        }
        self.document.pull()?;
        self.connected = true;
        self.last_pull = Some(Instant::now());
        info!(user = self.config.user_id, actor = self.config.actor, "connected");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Pull now.
    pub fn pull(&mut self) -> DocumentResult<bool> {
        self.last_pull = Some(Instant::now());
        self.document.pull()
    }

    /// Periodic driver: pulls once the pull interval has elapsed. Returns
    /// whether anything was received.
    pub fn tick(&mut self) -> DocumentResult<bool> {
        if !self.connected {
            return Ok(false);
        }
        if self.document.carrier_state() == CarrierState::Disconnected {
            warn!("connection lost");
            self.connected = false;
            return Ok(false);
        }
        let due = self.last_pull.map_or(true, |t| t.elapsed() >= self.config.pull_interval());
        if !due {
            return Ok(false);
        }
        self.pull()
    }

    /// Stop pulling and close the connection. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        self.connected = false;
        if let Some(mut carrier) = self.document.take_carrier() {
            carrier.disconnect();
            info!("disconnected");
        }
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    /// Write the committed state of the document.
    pub fn save(&self, path: &Path) -> DocumentResult<()> {
        self.config.file_tags()?.save(path, self.document.graph())?;
        info!(path = %path.display(), "document saved");
        Ok(())
    }

    /// Replace the document with the file's content. History is cleared.
    pub fn load(&mut self, path: &Path) -> DocumentResult<()> {
        let registry = Arc::clone(self.document.graph().registry());
        let graph = self.config.file_tags()?.load(path, registry, self.config.actor)?;
        self.document.replace_graph(graph);
        self.history.clear();
        info!(path = %path.display(), "document loaded");
        Ok(())
    }
}

impl Drop for DocumentManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}
