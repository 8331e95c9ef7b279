use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, warn};
use weave_codec::WireMessage;
use weave_document::{Carrier, CarrierState};

use crate::server::{greeting, DocumentServer, SessionId};

/// In-process access to a [`DocumentServer`].
///
/// Messages sent by a [`LocalCarrier`] are handled synchronously; replies and
/// relays queue up in the receiving carriers until they are processed.
#[derive(Clone)]
pub struct LocalHub {
    server: Arc<Mutex<DocumentServer>>,
}

impl LocalHub {
    pub fn new(server: DocumentServer) -> Self {
        Self { server: Arc::new(Mutex::new(server)) }
    }

    /// Lock the server. A panic on another thread while it held the lock
    /// leaves the server usable; every handler leaves it consistent.
    pub fn server(&self) -> MutexGuard<'_, DocumentServer> {
        self.server.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a session for `user` editing as `actor` and greet the server.
    /// A refused greet shows as a disconnected carrier.
    pub fn connect(&self, user: u64, actor: u32) -> LocalCarrier {
        let (outbox, inbound) = unbounded_channel();
        let session = {
            let mut server = self.server();
            let session = server.open_session(outbox);
            server.handle(session, greeting(user, actor, session));
            session
        };
        debug!(session, user, actor, "local carrier connected");
        LocalCarrier {
            hub: self.clone(),
            session,
            inbound,
            received: VecDeque::new(),
            loaded: false,
            state: CarrierState::Connected,
        }
    }
}

pub struct LocalCarrier {
    hub: LocalHub,
    session: SessionId,
    inbound: UnboundedReceiver<WireMessage>,
    received: VecDeque<WireMessage>,
    loaded: bool,
    state: CarrierState,
}

impl LocalCarrier {
    pub fn session(&self) -> SessionId {
        self.session
    }
}

impl Carrier for LocalCarrier {
    fn process(&mut self) {
        loop {
            match self.inbound.try_recv() {
                Ok(msg) => {
                    if matches!(msg, WireMessage::Backend { .. }) {
                        self.loaded = true;
                    }
                    self.received.push_back(msg);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.state != CarrierState::Disconnected {
                        warn!(session = self.session, "session closed by the server");
                        self.state = CarrierState::Disconnected;
                    }
                    break;
                }
            }
        }
    }

    fn send(&mut self, msg: WireMessage) {
        if self.state != CarrierState::Connected {
            debug!(session = self.session, kind = msg.type_name(), "carrier closed, message dropped");
            return;
        }
        self.hub.server().handle(self.session, msg);
    }

    fn receive(&mut self) -> Option<WireMessage> {
        self.received.pop_front()
    }

    fn state(&self) -> CarrierState {
        self.state
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn disconnect(&mut self) {
        if self.state == CarrierState::Disconnected {
            return;
        }
        self.state = CarrierState::Disconnected;
        self.hub.server().close_session(self.session);
    }
}

impl Drop for LocalCarrier {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use weave_schema::{ClassRegistry, FieldKind};

    use super::*;

    fn hub() -> LocalHub {
        let mut r = ClassRegistry::new("hub-test.1");
        r.declare("ht.Root").member("count", FieldKind::Int).finish();
        r.set_root("ht.Root");
        LocalHub::new(DocumentServer::new(Arc::new(r.seal())))
    }

    #[test]
    fn connect_greets_and_loads_on_process() {
        let hub = hub();
        let mut carrier = hub.connect(1, 1);
        assert!(!carrier.is_loaded());
        carrier.process();
        assert!(carrier.is_loaded());
        assert!(matches!(carrier.receive(), Some(WireMessage::Backend { .. })));
        assert!(carrier.receive().is_none());
    }

    #[test]
    fn disconnect_closes_the_session_once() {
        let hub = hub();
        let mut carrier = hub.connect(1, 1);
        assert_eq!(hub.server().session_count(), 1);
        carrier.disconnect();
        carrier.disconnect();
        assert_eq!(carrier.state(), CarrierState::Disconnected);
        assert_eq!(hub.server().session_count(), 0);
    }

    #[test]
    fn dropping_a_carrier_closes_its_session() {
        let hub = hub();
        drop(hub.connect(1, 1));
        assert_eq!(hub.server().session_count(), 0);
    }

    #[test]
    fn a_taken_actor_leaves_the_carrier_disconnected() {
        let hub = hub();
        let _first = hub.connect(1, 7);
        let mut second = hub.connect(2, 7);
        second.process();
        assert_eq!(second.state(), CarrierState::Disconnected);
        assert!(!second.is_loaded());
        assert_eq!(hub.server().session_count(), 1);
    }

    #[test]
    fn a_poisoned_lock_does_not_stop_the_hub() {
        let hub = hub();
        let mut carrier = hub.connect(1, 1);
        let poisoner = hub.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.server();
            panic!("editor crashed while holding the server");
        })
        .join();
        assert!(hub.server.is_poisoned());
        carrier.disconnect();
        assert_eq!(hub.server().session_count(), 0);
    }
}
