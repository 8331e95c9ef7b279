//! Patcher editing through a document manager: undo, gestures, listener
//! callbacks and replication.

use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use weave_codec::fingerprint;
use weave_document::{DocumentManager, EngineConfig};
use weave_graph::Graph;
use weave_patcher::{patcher_registry, Patcher, PatcherListener, PatcherObserver, PatcherValidator};
use weave_transport::{DocumentServer, LocalHub};
use weave_tx::Operation;
use weave_types::Ref;

fn manager() -> (DocumentManager, Patcher) {
    let m = DocumentManager::new(patcher_registry(), EngineConfig::default());
    let p = Patcher::new(m.graph()).unwrap();
    (m, p)
}

#[derive(Clone, Debug, PartialEq)]
enum Event {
    ObjectAdded(Ref),
    ObjectRemoved(Ref),
    LinkAdded(Ref),
    LinkRemoved(Ref),
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Event>>>);

impl Recorder {
    fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl PatcherListener for Recorder {
    fn object_added(&mut self, _: &Graph, obj: Ref) {
        self.0.lock().unwrap().push(Event::ObjectAdded(obj));
    }
    fn object_removed(&mut self, _: &Graph, obj: Ref) {
        self.0.lock().unwrap().push(Event::ObjectRemoved(obj));
    }
    fn link_added(&mut self, _: &Graph, link: Ref) {
        self.0.lock().unwrap().push(Event::LinkAdded(link));
    }
    fn link_removed(&mut self, _: &Graph, link: Ref) {
        self.0.lock().unwrap().push(Event::LinkRemoved(link));
    }
}

fn observed(m: &mut DocumentManager, p: &Patcher) -> Recorder {
    let rec = Recorder::default();
    m.document_mut().set_observer(Box::new(PatcherObserver::new(p.clone(), rec.clone())));
    rec
}

/// Plus and print added in one labelled commit.
fn scenario_a(m: &mut DocumentManager, p: &Patcher) -> (Ref, Ref) {
    let plus = p.add_object(m.graph_mut(), "plus", 20.0, 20.0).unwrap();
    let print = p.add_object(m.graph_mut(), "print", 20.0, 80.0).unwrap();
    m.commit("Add Plus+Print");
    (plus, print)
}

#[test]
fn adding_two_objects_is_one_undo_step() {
    let (mut m, p) = manager();
    let (plus, print) = scenario_a(&mut m, &p);

    assert_eq!(m.history().len(), 1);
    assert!(m.can_undo());
    assert!(!m.can_redo());
    assert_eq!(m.undo_label(), Some("Add Plus+Print"));
    assert_eq!(p.inlets(m.graph(), plus).unwrap().len(), 2);
    assert_eq!(p.outlets(m.graph(), plus).unwrap().len(), 1);
    assert_eq!(p.objects(m.graph()), vec![plus, print]);
}

#[test]
fn linking_produces_refs_to_both_objects() {
    let (mut m, p) = manager();
    let (plus, print) = scenario_a(&mut m, &p);
    let rec = observed(&mut m, &p);

    let link = p.add_link(m.graph_mut(), plus, 0, print, 0).unwrap();
    let tx = m.commit("Link");

    let targets: Vec<Ref> = tx
        .opcodes()
        .iter()
        .filter_map(|op| match op.op {
            Operation::ObjectRefSet { new, .. } => Some(new),
            _ => None,
        })
        .collect();
    assert!(targets.contains(&plus));
    assert!(targets.contains(&print));
    assert_eq!(rec.take(), vec![Event::LinkAdded(link)]);
}

#[test]
fn undoing_the_link_restores_the_objects_exactly() {
    let (mut m, p) = manager();
    let (plus, print) = scenario_a(&mut m, &p);
    let after_a = m.graph().snapshot();
    let link = p.add_link(m.graph_mut(), plus, 0, print, 0).unwrap();
    m.commit("Link");
    let rec = observed(&mut m, &p);

    m.undo();
    assert!(p.links(m.graph()).is_empty());
    assert_eq!(m.graph().snapshot(), after_a);
    assert!(m.can_redo());
    assert_eq!(m.redo_label(), Some("Link"));
    assert_eq!(rec.take(), vec![Event::LinkRemoved(link)]);

    m.redo();
    assert_eq!(p.links(m.graph()), vec![link]);
    assert_eq!(rec.take(), vec![Event::LinkAdded(link)]);
}

#[test]
fn removing_a_linked_object_notifies_links_first() {
    let (mut m, p) = manager();
    let (plus, print) = scenario_a(&mut m, &p);
    let link = p.add_link(m.graph_mut(), plus, 0, print, 0).unwrap();
    m.commit("Link");
    let rec = observed(&mut m, &p);

    p.remove_object(m.graph_mut(), plus).unwrap();
    m.commit("Remove");
    assert_eq!(rec.take(), vec![Event::LinkRemoved(link), Event::ObjectRemoved(plus)]);

    m.undo();
    assert_eq!(rec.take(), vec![Event::ObjectAdded(plus), Event::LinkAdded(link)]);
    assert_eq!(p.position(m.graph(), plus).unwrap(), (20.0, 20.0));
}

#[test]
fn replacement_undoes_as_one_step() {
    let (mut m, p) = manager();
    let (plus, print) = scenario_a(&mut m, &p);
    p.add_link(m.graph_mut(), plus, 0, print, 0).unwrap();
    m.commit("Link");
    let before = m.graph().snapshot();

    let toggle = p.replace_object(m.graph_mut(), plus, "toggle").unwrap();
    m.commit("Replace");
    assert_eq!(p.position(m.graph(), toggle).unwrap(), (20.0, 20.0));
    assert_eq!(p.links(m.graph()).len(), 1);

    m.undo();
    assert_eq!(m.graph().snapshot(), before);
}

#[test]
fn users_stay_out_of_the_history() {
    let (mut m, p) = manager();
    p.add_user(m.graph_mut(), 42).unwrap();
    m.commit("Join");
    assert!(!m.can_undo());

    scenario_a(&mut m, &p);
    m.undo();
    assert_eq!(p.user_ids(m.graph()).unwrap(), vec![42]);
}

fn drag(k: usize) {
    let (mut m, p) = manager();
    let (plus, _) = scenario_a(&mut m, &p);
    let steps = m.history().len();

    m.start_commit_gesture();
    for i in 1..=k {
        p.move_object(m.graph_mut(), plus, 20.0 + i as f64, 20.0).unwrap();
        m.commit_gesture("Move");
    }
    m.end_commit_gesture();

    assert_eq!(m.history().len(), steps + 1);
    assert_eq!(m.document().pending(), 2);
    assert_eq!(p.position(m.graph(), plus).unwrap(), (20.0 + k as f64, 20.0));
    m.undo();
    assert_eq!(p.position(m.graph(), plus).unwrap(), (20.0, 20.0));
}

#[test]
fn a_drag_gesture_is_one_undo_step() {
    for k in [1, 5, 100] {
        drag(k);
    }
}

fn peer(hub: &LocalHub, user: u64) -> DocumentManager {
    let actor = user as u32;
    let config = EngineConfig { user_id: user, actor, pull_interval_ms: 0, ..Default::default() };
    let mut m = DocumentManager::new(patcher_registry(), config);
    m.connect(Box::new(hub.connect(user, actor))).unwrap();
    m
}

#[test]
fn replacement_reaches_the_other_peer() {
    let hub = LocalHub::new(DocumentServer::new(patcher_registry()));
    let mut m1 = peer(&hub, 1);
    let mut m2 = peer(&hub, 2);
    let p = Patcher::new(m1.graph()).unwrap();
    let rec = observed(&mut m2, &p);

    let (plus, print) = scenario_a(&mut m1, &p);
    let link = p.add_link(m1.graph_mut(), plus, 0, print, 0).unwrap();
    m1.commit("Link");
    m2.pull().unwrap();
    assert_eq!(
        rec.take(),
        vec![Event::ObjectAdded(plus), Event::ObjectAdded(print), Event::LinkAdded(link)]
    );

    let toggle = p.replace_object(m1.graph_mut(), plus, "toggle").unwrap();
    m1.commit("Replace");
    m2.pull().unwrap();
    let events = rec.take();
    assert_eq!(events[0], Event::LinkRemoved(link));
    assert!(events.contains(&Event::ObjectRemoved(plus)));
    assert!(events.contains(&Event::ObjectAdded(toggle)));
    assert!(matches!(events.last(), Some(Event::LinkAdded(_))));

    m1.pull().unwrap();
    assert_eq!(
        fingerprint(&m1.graph().snapshot()).unwrap(),
        fingerprint(&m2.graph().snapshot()).unwrap()
    );
}

/// A validating server whose patcher holds two `+` boxes.
fn validating_hub() -> (LocalHub, Patcher) {
    let mut seed = Graph::new(patcher_registry(), 90);
    let p = Patcher::new(&seed).unwrap();
    p.add_object(&mut seed, "+", 0.0, 0.0).unwrap();
    p.add_object(&mut seed, "+", 0.0, 50.0).unwrap();
    let server = DocumentServer::from_graph(seed).with_validator(PatcherValidator::new(p.clone()));
    (LocalHub::new(server), p)
}

fn counts(g: &Graph, p: &Patcher) -> (usize, usize) {
    (p.objects(g).len(), p.links(g).len())
}

fn remove_all_objects(m: &mut DocumentManager, p: &Patcher) {
    for obj in p.objects(m.graph()) {
        p.remove_object(m.graph_mut(), obj).unwrap();
    }
}

fn link_first_two(m: &mut DocumentManager, p: &Patcher) {
    let objs = p.objects(m.graph());
    p.add_link(m.graph_mut(), objs[0], 0, objs[1], 0).unwrap();
}

#[test]
fn a_link_to_objects_removed_first_is_denied() {
    let (hub, p) = validating_hub();
    let mut m1 = peer(&hub, 11);
    let mut m2 = peer(&hub, 12);

    remove_all_objects(&mut m1, &p);
    link_first_two(&mut m2, &p);

    m1.commit("Remove");
    assert_eq!(counts(hub.server().graph(), &p).0, 0);
    m2.commit("Link");
    assert_eq!(counts(hub.server().graph(), &p), (0, 0));

    m1.pull().unwrap();
    assert_eq!(counts(m1.graph(), &p), (0, 0));
    m2.pull().unwrap();
    assert_eq!(counts(m2.graph(), &p), (0, 0));
    assert_eq!(m2.document().pending(), 0);
    assert!(m2.graph().is_clean());
}

#[test]
fn removing_objects_linked_first_is_denied() {
    let (hub, p) = validating_hub();
    let mut m1 = peer(&hub, 11);
    let mut m2 = peer(&hub, 12);

    remove_all_objects(&mut m1, &p);
    link_first_two(&mut m2, &p);

    m2.commit("Link");
    assert_eq!(counts(hub.server().graph(), &p), (2, 1));
    m1.commit("Remove");
    assert_eq!(counts(hub.server().graph(), &p), (2, 1));

    m1.pull().unwrap();
    assert_eq!(counts(m1.graph(), &p), (2, 1));
    assert_eq!(m1.document().pending(), 0);
    m2.pull().unwrap();
    assert_eq!(counts(m2.graph(), &p), (2, 1));
    assert_eq!(
        fingerprint(&m1.graph().snapshot()).unwrap(),
        fingerprint(&hub.server().snapshot()).unwrap()
    );
    assert_eq!(
        fingerprint(&m2.graph().snapshot()).unwrap(),
        fingerprint(&hub.server().snapshot()).unwrap()
    );
}

#[derive(Clone, Debug)]
enum Edit {
    Add(usize, f64, f64),
    Move(usize, f64, f64),
    Link(usize, usize),
    Remove(usize),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0usize..3, -50.0..50.0f64, -50.0..50.0f64).prop_map(|(n, x, y)| Edit::Add(n, x, y)),
        (0usize..8, -50.0..50.0f64, -50.0..50.0f64).prop_map(|(i, x, y)| Edit::Move(i, x, y)),
        (0usize..8, 0usize..8).prop_map(|(a, b)| Edit::Link(a, b)),
        (0usize..8).prop_map(Edit::Remove),
    ]
}

fn apply(m: &mut DocumentManager, p: &Patcher, edit: &Edit) {
    let objects = p.objects(m.graph());
    let pick = |i: usize| (!objects.is_empty()).then(|| objects[i % objects.len()]);
    match *edit {
        Edit::Add(n, x, y) => {
            p.add_object(m.graph_mut(), ["plus", "print", "toggle"][n], x, y).unwrap();
        }
        Edit::Move(i, x, y) => {
            if let Some(obj) = pick(i) {
                p.move_object(m.graph_mut(), obj, x, y).unwrap();
            }
        }
        Edit::Link(a, b) => {
            if let (Some(a), Some(b)) = (pick(a), pick(b)) {
                if p.can_connect(m.graph(), a, 0, b, 0) {
                    p.add_link(m.graph_mut(), a, 0, b, 0).unwrap();
                }
            }
        }
        Edit::Remove(i) => {
            if let Some(obj) = pick(i) {
                p.remove_object(m.graph_mut(), obj).unwrap();
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn undo_all_then_redo_all_is_a_no_op(edits in prop::collection::vec(edit(), 1..12)) {
        let (mut m, p) = manager();
        for (i, e) in edits.iter().enumerate() {
            apply(&mut m, &p, e);
            m.commit(&format!("edit {i}"));
        }
        let end = m.graph().snapshot();
        let steps = m.history().len();

        for _ in 0..steps {
            m.undo();
        }
        prop_assert!(!m.can_undo());
        prop_assert!(p.objects(m.graph()).is_empty());
        for _ in 0..steps {
            m.redo();
        }
        prop_assert!(!m.can_redo());
        prop_assert_eq!(m.graph().snapshot(), end);
        prop_assert!(m.graph().is_clean());
    }
}
