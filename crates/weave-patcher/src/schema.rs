use std::sync::Arc;

use weave_schema::{ClassRegistry, FieldKind};

pub const SCHEMA_VERSION: &str = "weave-patcher.1";

/// Type of data flowing through an inlet or outlet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PinKind {
    Control,
    Signal,
}

impl PinKind {
    pub(crate) const ENUM: &'static str = "patcher.PinKind";

    pub(crate) fn index(self) -> i64 {
        match self {
            PinKind::Control => 0,
            PinKind::Signal => 1,
        }
    }

    pub(crate) fn from_index(index: i64) -> PinKind {
        if index == 1 {
            PinKind::Signal
        } else {
            PinKind::Control
        }
    }
}

/// Registry holding the patcher classes, `patcher.Patcher` as root.
pub fn patcher_registry() -> Arc<ClassRegistry> {
    let mut r = ClassRegistry::new(SCHEMA_VERSION);
    r.declare_enum(PinKind::ENUM, &["control", "signal"]);
    r.declare("patcher.Inlet").member("kind", FieldKind::enumeration(PinKind::ENUM)).finish();
    r.declare("patcher.Outlet").member("kind", FieldKind::enumeration(PinKind::ENUM)).finish();

    // geometry lives in its own base class so it can be molded across
    // object classes
    r.declare("patcher.Box")
        .member("x", FieldKind::Float)
        .member("y", FieldKind::Float)
        .member("width", FieldKind::Float)
        .member("height", FieldKind::Float)
        .finish();
    r.declare("patcher.Object")
        .inherit("patcher.Box")
        .member("name", FieldKind::Blob)
        .member("text", FieldKind::Blob)
        .member("inlets", FieldKind::array("patcher.Inlet"))
        .member("outlets", FieldKind::array("patcher.Outlet"))
        .finish();
    r.declare("patcher.Plus").inherit("patcher.Object").finish();
    r.declare("patcher.Print").inherit("patcher.Object").finish();
    r.declare("patcher.Toggle").inherit("patcher.Object").member("value", FieldKind::Bool).finish();
    r.declare("patcher.ErrorBox").inherit("patcher.Object").member("error", FieldKind::Blob).finish();

    r.declare("patcher.Link")
        .member("sender", FieldKind::object_ref("patcher.Object"))
        .member("receiver", FieldKind::object_ref("patcher.Object"))
        .member("outlet", FieldKind::Int)
        .member("inlet", FieldKind::Int)
        .finish();
    r.declare("patcher.User").member("id", FieldKind::Int).finish();

    r.declare("patcher.Patcher")
        .member("objects", FieldKind::array("patcher.Object"))
        .member("links", FieldKind::array("patcher.Link"))
        .member_without_undo("users", FieldKind::collection("patcher.User"))
        .finish();
    r.set_root("patcher.Patcher");
    Arc::new(r.seal())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_classes_share_the_box_base() {
        let r = patcher_registry();
        let base = r.class_id("patcher.Box").unwrap();
        for name in ["patcher.Plus", "patcher.Print", "patcher.Toggle", "patcher.ErrorBox"] {
            assert!(r.is_a(r.class_id(name).unwrap(), base), "{name}");
        }
        assert_eq!(r.version(), SCHEMA_VERSION);
    }

    #[test]
    fn pin_kinds_match_the_enum() {
        let r = patcher_registry();
        let e = r.enum_by_name(PinKind::ENUM).unwrap();
        assert_eq!(e.index_of("signal"), Some(PinKind::Signal.index()));
        assert_eq!(PinKind::from_index(PinKind::Control.index()), PinKind::Control);
    }
}
