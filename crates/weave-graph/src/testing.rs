use std::sync::Arc;

use weave_schema::{ClassRegistry, FieldKind};
use weave_types::Ref;

use crate::graph::Graph;
use crate::node::Position;

pub(crate) fn fixture_registry() -> Arc<ClassRegistry> {
    let mut r = ClassRegistry::new("fixture.1");
    r.declare_enum("fx.Mode", &["off", "on", "auto"]);
    r.declare("fx.Item")
        .member("value", FieldKind::Int)
        .member("label", FieldKind::Blob)
        .member("peer", FieldKind::object_ref("fx.Item"))
        .member("children", FieldKind::array("fx.Item"))
        .finish();
    r.declare("fx.Special").inherit("fx.Item").member("weight", FieldKind::Float).finish();
    r.declare("fx.Root")
        .member("title", FieldKind::Blob)
        .member("count", FieldKind::Int)
        .member("ratio", FieldKind::Float)
        .member("flag", FieldKind::Bool)
        .member("mode", FieldKind::enumeration("fx.Mode"))
        .member("a", FieldKind::array("fx.Item"))
        .member("b", FieldKind::array("fx.Item"))
        .member("bag", FieldKind::collection("fx.Item"))
        .member("bang", FieldKind::Message)
        .member_without_undo("local", FieldKind::collection("fx.Item"))
        .finish();
    r.set_root("fx.Root");
    Arc::new(r.seal())
}

/// Append an `fx.Item` with the given value.
pub(crate) fn item(g: &mut Graph, container: Ref, value: i64) -> Ref {
    let class = g.registry().class_id("fx.Item").unwrap();
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
