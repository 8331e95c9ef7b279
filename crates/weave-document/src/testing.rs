use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use weave_codec::WireMessage;
use weave_graph::{Graph, Position};
use weave_schema::{ClassRegistry, FieldKind};
use weave_types::Ref;

use crate::carrier::{Carrier, CarrierState};

pub(crate) fn fixture_registry() -> Arc<ClassRegistry> {
    let mut r = ClassRegistry::new("doc-fixture.1");
    r.declare("dt.Item")
        .member("value", FieldKind::Int)
        .member("children", FieldKind::array("dt.Item"))
        .finish();
    r.declare("dt.Root")
        .member("title", FieldKind::Blob)
        .member("count", FieldKind::Int)
        .member("items", FieldKind::array("dt.Item"))
        .member("bag", FieldKind::collection("dt.Item"))
        .member("ping", FieldKind::Message)
        .member_without_undo("scratch", FieldKind::Int)
        .finish();
    r.set_root("dt.Root");
    Arc::new(r.seal())
}

pub(crate) fn item(g: &mut Graph, container: Ref, value: i64) -> Ref {
    let class = g.registry().class_id("dt.Item").unwrap();
    let x = g.insert(container, class, Position::End);
    let v = g.member(x, "value").unwrap();
    g.set_int(v, value);
    x
}

pub(crate) fn values(g: &Graph, container: Ref) -> Vec<i64> {
    g.elements(container)
        .into_iter()
        .map(|e| g.get_int(g.member(e, "value").unwrap()))
        .collect()
}

#[derive(Default)]
struct Wire {
    inbound: VecDeque<WireMessage>,
    outbound: Vec<WireMessage>,
    loaded: bool,
    state: Option<CarrierState>,
}

/// Carrier whose traffic is scripted by the test through [`Remote`].
pub(crate) struct ScriptedCarrier {
    wire: Arc<Mutex<Wire>>,
    received: VecDeque<WireMessage>,
}

#[derive(Clone)]
pub(crate) struct Remote {
    wire: Arc<Mutex<Wire>>,
}

impl ScriptedCarrier {
    pub(crate) fn new() -> (ScriptedCarrier, Remote) {
        let wire = Arc::new(Mutex::new(Wire::default()));
        (ScriptedCarrier { wire: wire.clone(), received: VecDeque::new() }, Remote { wire })
    }
}

impl Remote {
    pub(crate) fn deliver(&self, msg: WireMessage) {
        self.wire.lock().unwrap().inbound.push_back(msg);
    }

    pub(crate) fn sent(&self) -> Vec<WireMessage> {
        self.wire.lock().unwrap().outbound.clone()
    }

    pub(crate) fn set_state(&self, state: CarrierState) {
        self.wire.lock().unwrap().state = Some(state);
    }
}

impl Carrier for ScriptedCarrier {
    fn process(&mut self) {
        let mut wire = self.wire.lock().unwrap();
        while let Some(msg) = wire.inbound.pop_front() {
            if matches!(msg, WireMessage::Backend { .. }) {
                wire.loaded = true;
            }
            self.received.push_back(msg);
        }
    }

    fn send(&mut self, msg: WireMessage) {
        self.wire.lock().unwrap().outbound.push(msg);
    }

    fn receive(&mut self) -> Option<WireMessage> {
        self.received.pop_front()
    }

    fn state(&self) -> CarrierState {
        self.wire.lock().unwrap().state.unwrap_or(CarrierState::Connected)
    }

    fn is_loaded(&self) -> bool {
        self.wire.lock().unwrap().loaded
    }

    fn disconnect(&mut self) {
        self.wire.lock().unwrap().state = Some(CarrierState::Disconnected);
    }
}
