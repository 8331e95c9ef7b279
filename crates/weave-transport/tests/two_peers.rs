//! Two document managers editing through one server.

use std::sync::Arc;

use weave_codec::fingerprint;
use weave_document::{DocumentManager, EngineConfig};
use weave_graph::{Graph, Position};
use weave_schema::{ClassRegistry, FieldKind};
use weave_transport::{DocumentServer, LocalHub};
use weave_types::Ref;

fn registry() -> Arc<ClassRegistry> {
    let mut r = ClassRegistry::new("peers.1");
    r.declare("pp.Item").member("value", FieldKind::Int).finish();
    r.declare("pp.Root")
        .member("count", FieldKind::Int)
        .member("title", FieldKind::Blob)
        .member("a", FieldKind::array("pp.Item"))
        .member("b", FieldKind::array("pp.Item"))
        .finish();
    r.set_root("pp.Root");
    Arc::new(r.seal())
}

fn member(g: &Graph, name: &str) -> Ref {
    g.member(g.root(), name).unwrap()
}

fn add_item(g: &mut Graph, container: Ref, value: i64) -> Ref {
    let class = g.registry().class_id("pp.Item").unwrap();
    let x = g.insert(container, class, Position::End);
    let v = g.member(x, "value").unwrap();
    g.set_int(v, value);
    x
}

/// A server whose document holds one item `X` in container `a`.
fn seeded_hub() -> (LocalHub, Ref) {
    let mut g = Graph::new(registry(), 50);
    let a = member(&g, "a");
    let x = add_item(&mut g, a, 1);
    g.synchronize();
    (LocalHub::new(DocumentServer::from_graph(g)), x)
}

fn peer(hub: &LocalHub, user: u64, actor: u32) -> DocumentManager {
    let config = EngineConfig { user_id: user, actor, pull_interval_ms: 0, ..EngineConfig::default() };
    let mut m = DocumentManager::new(registry(), config);
    m.connect(Box::new(hub.connect(user, actor))).unwrap();
    m
}

fn settle(peers: &mut [&mut DocumentManager]) {
    for _ in 0..2 {
        for p in peers.iter_mut() {
            p.pull().unwrap();
        }
    }
}

fn print(m: &DocumentManager) -> String {
    fingerprint(&m.graph().snapshot()).unwrap()
}

#[test]
fn peers_start_from_the_server_snapshot() {
    let (hub, x) = seeded_hub();
    let p1 = peer(&hub, 1, 1);
    let p2 = peer(&hub, 2, 2);
    assert!(p1.graph().contains(x));
    assert_eq!(p1.graph().snapshot(), hub.server().snapshot());
    assert_eq!(print(&p1), print(&p2));
}

#[test]
fn move_is_seen_by_the_other_peer() {
    let (hub, x) = seeded_hub();
    let mut p1 = peer(&hub, 1, 1);
    let mut p2 = peer(&hub, 2, 2);
    let (a, b) = (member(p1.graph(), "a"), member(p1.graph(), "b"));

    p1.graph_mut().move_element(x, b, Position::End);
    p1.commit("move");
    p2.pull().unwrap();

    assert_eq!(p2.graph().parent(x), Some(b));
    assert!(!p2.graph().elements(a).contains(&x));
    assert_eq!(p2.graph().elements(b), vec![x]);
    assert_eq!(print(&p2), fingerprint(&hub.server().snapshot()).unwrap());
}

#[test]
fn concurrent_edits_converge() {
    let (hub, x) = seeded_hub();
    let mut p1 = peer(&hub, 1, 1);
    let mut p2 = peer(&hub, 2, 2);
    let (a, b) = (member(p1.graph(), "a"), member(p1.graph(), "b"));
    let title = member(p1.graph(), "title");

    add_item(p1.graph_mut(), a, 10);
    p1.graph_mut().set_string(title, "one");
    p1.commit("p1");

    add_item(p2.graph_mut(), b, 20);
    let value = p2.graph().member(x, "value").unwrap();
    p2.graph_mut().set_int(value, 5);
    p2.commit("p2");

    settle(&mut [&mut p1, &mut p2]);
    assert_eq!(print(&p1), print(&p2));
    assert_eq!(print(&p1), fingerprint(&hub.server().snapshot()).unwrap());
    assert_eq!(p1.document().pending(), 0);
    assert_eq!(p2.document().pending(), 0);
    assert_eq!(p1.graph().get_string(title), "one");
    assert_eq!(p1.graph().get_int(value), 5);
}

#[test]
fn uncommitted_edits_survive_a_pull() {
    let (hub, _) = seeded_hub();
    let mut p1 = peer(&hub, 1, 1);
    let mut p2 = peer(&hub, 2, 2);
    let count = member(p1.graph(), "count");
    let title = member(p1.graph(), "title");

    p1.graph_mut().set_int(count, 3);
    p1.commit("count");
    p2.graph_mut().set_string(title, "draft");
    p2.pull().unwrap();

    assert_eq!(p2.graph().get_int(count), 3);
    assert_eq!(p2.graph().get_string(title), "draft");
    assert!(p2.graph().changed(title));
    p2.commit("title");
    settle(&mut [&mut p1, &mut p2]);
    assert_eq!(print(&p1), print(&p2));
}

#[test]
fn denied_change_is_rolled_back() {
    let (hub, _) = seeded_hub();
    let mut p1 = peer(&hub, 1, 1);
    let mut p2 = peer(&hub, 2, 2);
    let count = member(p1.graph(), "count");

    p1.graph_mut().set_int(count, 1);
    p1.commit("first");
    p2.graph_mut().set_int(count, 2);
    p2.commit("second");

    settle(&mut [&mut p1, &mut p2]);
    assert_eq!(p2.graph().get_int(count), 1);
    assert_eq!(p2.document().pending(), 0);
    assert_eq!(print(&p1), print(&p2));
}

#[test]
fn erase_against_a_concurrent_move_is_denied() {
    let (hub, x) = seeded_hub();
    let mut p1 = peer(&hub, 1, 1);
    let mut p2 = peer(&hub, 2, 2);
    let b = member(p1.graph(), "b");

    p1.graph_mut().move_element(x, b, Position::End);
    p1.commit("move");
    p2.graph_mut().erase(x);
    p2.commit("erase");

    settle(&mut [&mut p1, &mut p2]);
    assert_eq!(p2.graph().parent(x), Some(b));
    assert_eq!(print(&p1), print(&p2));
}

#[test]
fn gesture_reaches_the_peer_as_one_transaction() {
    let (hub, x) = seeded_hub();
    let mut p1 = peer(&hub, 1, 1);
    let mut p2 = peer(&hub, 2, 2);
    let value = p1.graph().member(x, "value").unwrap();

    let seen = Arc::new(std::sync::Mutex::new(0usize));
    let counter = Arc::clone(&seen);
    p2.document_mut().set_observer(Box::new(move |_: &Graph| *counter.lock().unwrap() += 1));

    p1.start_commit_gesture();
    for n in 2..=6 {
        p1.graph_mut().set_int(value, n);
        p1.commit_gesture("drag");
    }
    p1.end_commit_gesture();
    assert_eq!(p1.history().len(), 1);

    p2.pull().unwrap();
    assert_eq!(p2.graph().get_int(value), 6);
    assert_eq!(*seen.lock().unwrap(), 1);

    p1.pull().unwrap();
    assert_eq!(p1.document().pending(), 0);

    p1.undo();
    p2.pull().unwrap();
    assert_eq!(p2.graph().get_int(value), 1);
}

#[test]
fn signals_are_relayed_but_not_stored() {
    let (hub, _) = seeded_hub();
    let mut p1 = peer(&hub, 1, 1);
    let mut p2 = peer(&hub, 2, 2);
    let got = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&got);
    let kind = weave_types::FourCc::new(b"curs");
    p2.document_mut().connect_signal(kind, move |target, payload| {
        sink.lock().unwrap().push((target, payload.to_vec()));
    });
    let before = hub.server().snapshot();

    p1.document_mut().send_signal(kind, Ref::ROOT, vec![4, 2]);
    p2.pull().unwrap();
    assert_eq!(*got.lock().unwrap(), vec![(Ref::ROOT, vec![4, 2])]);
    assert_eq!(hub.server().snapshot(), before);
}

#[test]
fn local_transactions_from_the_server_become_local_edits() {
    let (hub, _) = seeded_hub();
    let mut p1 = peer(&hub, 1, 1);
    let count = member(p1.graph(), "count");

    let mut scratch = Graph::new(registry(), 60);
    scratch.set_int(count, 9);
    let tx = scratch.make();
    let session = 1;
    hub.server().send_local(session, tx);

    p1.pull().unwrap();
    assert_eq!(p1.graph().get_int(count), 9);
    assert!(p1.graph().changed(count));
    p1.commit("from server");
    p1.pull().unwrap();
    assert_eq!(fingerprint(&hub.server().snapshot()).unwrap(), print(&p1));
}

#[test]
fn a_second_peer_with_the_same_actor_is_turned_away() {
    let (hub, x) = seeded_hub();
    let mut p1 = peer(&hub, 1, 1);

    let config = EngineConfig { user_id: 2, actor: 1, pull_interval_ms: 0, ..EngineConfig::default() };
    let mut p2 = DocumentManager::new(registry(), config);
    let err = p2.connect(Box::new(hub.connect(2, 1))).unwrap_err();
    assert!(matches!(err, weave_document::DocumentError::ConnectFailed));
    assert!(!p2.is_connected());
    assert_eq!(hub.server().session_count(), 1);

    let a = member(p1.graph(), "a");
    let mine = add_item(p1.graph_mut(), a, 2);
    p1.commit("add");
    p1.pull().unwrap();
    assert_eq!(p1.document().pending(), 0);
    assert_eq!(hub.server().graph().elements(a), vec![x, mine]);
}
