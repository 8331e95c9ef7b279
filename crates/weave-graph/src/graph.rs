use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use weave_schema::{ClassId, ClassRegistry, MemberKind};
use weave_types::{fatal, Ref};

use crate::error::{GraphError, GraphResult};
use crate::node::{Node, Payload, Presence};
use crate::value::Value;

/// Arena of versioned nodes rooted at [`Ref::ROOT`].
///
/// Public mutators treat misuse (wrong kind, unknown ref, writing into a
/// removed subtree) as a contract violation. The transaction executor uses
/// the fallible variants instead, since remote data may legitimately fail to
/// apply.
pub struct Graph {
    pub(crate) registry: Arc<ClassRegistry>,
    pub(crate) nodes: HashMap<Ref, Node>,
    pub(crate) actor: u32,
    pub(crate) next_counter: u32,
    pub(crate) rng: StdRng,
}

impl Graph {
    /// A graph holding a default root object. Refs allocated by this graph
    /// carry `actor` in their upper half.
    pub fn new(registry: Arc<ClassRegistry>, actor: u32) -> Self {
        Self::with_rng(registry, actor, StdRng::from_entropy())
    }

    /// Like [`Graph::new`] with deterministic key generation.
    pub fn with_seed(registry: Arc<ClassRegistry>, actor: u32, seed: u64) -> Self {
        Self::with_rng(registry, actor, StdRng::seed_from_u64(seed))
    }

    fn with_rng(registry: Arc<ClassRegistry>, actor: u32, rng: StdRng) -> Self {
        let mut graph = Self {
            registry,
            nodes: HashMap::new(),
            actor,
            next_counter: 1,
            rng,
        };
        graph.build_root();
        graph
    }

    pub(crate) fn build_root(&mut self) {
        self.nodes.clear();
        let root_class = self.registry.root();
        self.instantiate(root_class, Ref::ROOT, Ref::NULL, Presence::Resident, true);
        if self.actor == 0 {
            let span = self.registry.class(root_class).ref_span();
            self.next_counter = self.next_counter.max(Ref::ROOT.counter() + span);
        }
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    pub fn root(&self) -> Ref {
        Ref::ROOT
    }

    pub fn actor(&self) -> u32 {
        self.actor
    }

    /// Number of bound nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, r: Ref) -> bool {
        self.nodes.contains_key(&r)
    }

    // ------------------------------------------------------------------
    // Arena plumbing
    // ------------------------------------------------------------------

    pub(crate) fn node(&self, r: Ref) -> &Node {
        match self.nodes.get(&r) {
            Some(node) => node,
            None => fatal!("no node bound at {r:?}"),
        }
    }

    pub(crate) fn node_mut(&mut self, r: Ref) -> &mut Node {
        match self.nodes.get_mut(&r) {
            Some(node) => node,
            None => fatal!("no node bound at {r:?}"),
        }
    }

    pub(crate) fn try_node(&self, r: Ref) -> GraphResult<&Node> {
        self.nodes.get(&r).ok_or(GraphError::MissingNode(r))
    }

    pub(crate) fn allocate(&mut self, span: u32) -> Ref {
        let r = Ref::new(self.actor, self.next_counter);
        self.next_counter = match self.next_counter.checked_add(span) {
            Some(next) => next,
            None => fatal!("ref space of actor {} exhausted", self.actor),
        };
        r
    }

    /// Keep the allocator ahead of refs bound explicitly for our own actor.
    pub(crate) fn reserve(&mut self, r: Ref, span: u32) {
        if r.actor() == self.actor {
            let end = r.counter().saturating_add(span);
            self.next_counter = self.next_counter.max(end);
        }
    }

    fn bind(&mut self, r: Ref, node: Node) {
        if r.is_null() || self.nodes.contains_key(&r) {
            fatal!("ref {r:?} bound twice");
        }
        self.nodes.insert(r, node);
    }

    /// Build an instance of `class` occupying `base` and the following refs.
    pub(crate) fn instantiate(
        &mut self,
        class: ClassId,
        base: Ref,
        parent: Ref,
        presence: Presence,
        undo: bool,
    ) {
        let mut next = base.offset(1);
        self.build_object(class, base, parent, presence, undo, &mut next);
    }

    fn build_object(
        &mut self,
        class: ClassId,
        r: Ref,
        parent: Ref,
        presence: Presence,
        undo: bool,
        next: &mut Ref,
    ) {
        let registry = Arc::clone(&self.registry);
        let mut members = Vec::with_capacity(registry.class(class).members().len());
        // Bind the object first so children can find their parent.
        self.bind(
            r,
            Node {
                parent,
                kind: MemberKind::Object(class),
                presence,
                modifications: 0,
                undo,
                slot_key: None,
                payload: Payload::Object { class, members: Vec::new() },
            },
        );
        for member in registry.class(class).members() {
            let mr = *next;
            *next = next.offset(1);
            let member_undo = undo && member.undo;
            match member.kind {
                MemberKind::Object(c) => self.build_object(c, mr, r, presence, member_undo, next),
                kind => self.bind(mr, Node::leaf(kind, r, presence, member_undo)),
            }
            members.push(mr);
        }
        if let Payload::Object { members: slot, .. } = &mut self.node_mut(r).payload {
            *slot = members;
        }
    }

    /// Add `delta` change units to `from` and all of its ancestors.
    pub(crate) fn bump(&mut self, from: Ref, delta: i64) {
        if delta == 0 {
            return;
        }
        let mut current = from;
        while !current.is_null() {
            let node = self.node_mut(current);
            let updated = node.modifications as i64 + delta;
            if updated < 0 {
                fatal!("modification counter of {current:?} went negative");
            }
            node.modifications = updated as u32;
            current = node.parent;
        }
    }

    // ------------------------------------------------------------------
    // Structure queries
    // ------------------------------------------------------------------

    pub fn parent(&self, r: Ref) -> Option<Ref> {
        let parent = self.node(r).parent;
        (!parent.is_null()).then_some(parent)
    }

    pub fn kind(&self, r: Ref) -> MemberKind {
        self.node(r).kind
    }

    /// Concrete class of an object node.
    pub fn class_of(&self, r: Ref) -> ClassId {
        match self.node(r).payload {
            Payload::Object { class, .. } => class,
            _ => fatal!("{r:?} is not an object"),
        }
    }

    pub fn class_name(&self, r: Ref) -> &str {
        self.registry.class(self.class_of(r)).name()
    }

    pub fn is_a(&self, r: Ref, class: ClassId) -> bool {
        match self.nodes.get(&r).map(|n| &n.payload) {
            Some(Payload::Object { class: c, .. }) => self.registry.is_a(*c, class),
            _ => false,
        }
    }

    /// Member refs of an object, in flattened declaration order.
    pub fn members(&self, obj: Ref) -> &[Ref] {
        match &self.node(obj).payload {
            Payload::Object { members, .. } => members,
            _ => fatal!("{obj:?} is not an object"),
        }
    }

    pub fn member(&self, obj: Ref, name: &str) -> GraphResult<Ref> {
        let node = self.try_node(obj)?;
        match &node.payload {
            Payload::Object { class, members } => {
                let index = self.registry.member_index(*class, name)?;
                Ok(members[index])
            }
            _ => Err(GraphError::KindMismatch { node: obj, expected: "object" }),
        }
    }

    /// Nearest ancestor (or `r` itself) that is an instance of `class`.
    pub fn ancestor_of_class(&self, r: Ref, class: ClassId) -> Option<Ref> {
        let mut current = r;
        while !current.is_null() {
            if self.is_a(current, class) {
                return Some(current);
            }
            current = self.nodes.get(&current)?.parent;
        }
        None
    }

    pub fn is_ancestor(&self, ancestor: Ref, r: Ref) -> bool {
        let mut current = r;
        while let Some(node) = self.nodes.get(&current) {
            if current == ancestor {
                return true;
            }
            current = node.parent;
        }
        false
    }

    // ------------------------------------------------------------------
    // Change-state queries
    // ------------------------------------------------------------------

    pub fn presence(&self, r: Ref) -> Presence {
        self.node(r).presence
    }

    pub fn added(&self, r: Ref) -> bool {
        self.presence(r) == Presence::Added
    }

    pub fn removed(&self, r: Ref) -> bool {
        self.presence(r) == Presence::Removed
    }

    pub fn resident(&self, r: Ref) -> bool {
        self.presence(r) == Presence::Resident
    }

    /// Whether anything in the subtree differs from the baseline.
    pub fn changed(&self, r: Ref) -> bool {
        let node = self.node(r);
        match &node.payload {
            Payload::Scalar { value, before } => {
                value != before || node.presence == Presence::Added
            }
            _ => node.is_pending(),
        }
    }

    pub fn modifications(&self, r: Ref) -> u32 {
        self.node(r).modifications
    }

    /// Whether the whole graph is synchronized.
    pub fn is_clean(&self) -> bool {
        self.modifications(Ref::ROOT) == 0
    }

    pub fn is_undo_enabled(&self, r: Ref) -> bool {
        self.node(r).undo
    }

    // ------------------------------------------------------------------
    // Scalar cells
    // ------------------------------------------------------------------

    pub fn value(&self, r: Ref) -> &Value {
        match &self.node(r).payload {
            Payload::Scalar { value, .. } => value,
            _ => fatal!("{r:?} is not a value cell"),
        }
    }

    /// Baseline value of a cell. Default for cells of an added subtree.
    pub fn before(&self, r: Ref) -> &Value {
        match &self.node(r).payload {
            Payload::Scalar { before, .. } => before,
            _ => fatal!("{r:?} is not a value cell"),
        }
    }

    pub fn get_bool(&self, r: Ref) -> bool {
        self.value(r).as_bool().unwrap_or_else(|| fatal!("{r:?} is not a bool"))
    }

    pub fn get_int(&self, r: Ref) -> i64 {
        match self.value(r) {
            Value::Int(v) => *v,
            _ => fatal!("{r:?} is not an int"),
        }
    }

    pub fn get_float(&self, r: Ref) -> f64 {
        self.value(r).as_float().unwrap_or_else(|| fatal!("{r:?} is not a float"))
    }

    pub fn get_enum(&self, r: Ref) -> i64 {
        match self.value(r) {
            Value::Enum(v) => *v,
            _ => fatal!("{r:?} is not an enum"),
        }
    }

    pub fn get_blob(&self, r: Ref) -> &[u8] {
        self.value(r).as_blob().unwrap_or_else(|| fatal!("{r:?} is not a blob"))
    }

    /// Blob content read as UTF-8, lossily.
    pub fn get_string(&self, r: Ref) -> String {
        String::from_utf8_lossy(self.get_blob(r)).into_owned()
    }

    pub fn get_object_ref(&self, r: Ref) -> Ref {
        self.value(r).as_object_ref().unwrap_or_else(|| fatal!("{r:?} is not an object ref"))
    }

    /// Assign a cell. Writing the current value is a no-op.
    pub fn set_value(&mut self, r: Ref, value: Value) {
        if let Err(e) = self.try_set_value(r, value) {
            fatal!("cannot set {r:?}: {e}");
        }
    }

    pub fn set_bool(&mut self, r: Ref, v: bool) {
        self.set_value(r, Value::Bool(v));
    }

    pub fn set_int(&mut self, r: Ref, v: i64) {
        self.set_value(r, Value::Int(v));
    }

    pub fn set_float(&mut self, r: Ref, v: f64) {
        self.set_value(r, Value::Float(v));
    }

    pub fn set_enum(&mut self, r: Ref, index: i64) {
        self.set_value(r, Value::Enum(index));
    }

    pub fn set_blob(&mut self, r: Ref, v: impl Into<Vec<u8>>) {
        self.set_value(r, Value::Blob(v.into()));
    }

    pub fn set_string(&mut self, r: Ref, v: &str) {
        self.set_value(r, Value::Blob(v.as_bytes().to_vec()));
    }

    pub fn set_object_ref(&mut self, r: Ref, target: Ref) {
        self.set_value(r, Value::ObjectRef(target));
    }

    pub(crate) fn try_set_value(&mut self, r: Ref, value: Value) -> GraphResult<()> {
        let enum_count = match self.try_node(r)?.kind {
            MemberKind::Enum(id) => Some(self.registry.enum_class(id).enumerators().len() as i64),
            _ => None,
        };
        let node = self.nodes.get_mut(&r).ok_or(GraphError::MissingNode(r))?;
        if node.presence == Presence::Removed {
            return Err(GraphError::RemovedNode(r));
        }
        let Payload::Scalar { value: current, before } = &mut node.payload else {
            return Err(GraphError::KindMismatch { node: r, expected: "value cell" });
        };
        if !current.same_kind(&value) {
            return Err(GraphError::KindMismatch { node: r, expected: current.kind_name() });
        }
        if let (Some(count), Value::Enum(index)) = (enum_count, &value) {
            if *index < 0 || *index >= count {
                return Err(GraphError::InvalidEnumerator { node: r, index: *index });
            }
        }
        if *current == value {
            return Ok(());
        }
        let was_dirty = current != before;
        *current = value;
        let dirty = current != before;
        match (was_dirty, dirty) {
            (false, true) => self.bump(r, 1),
            (true, false) => self.bump(r, -1),
            _ => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Queue a one-shot message; it travels with the next commit.
    pub fn send_message(&mut self, r: Ref, data: impl Into<Vec<u8>>) {
        if let Err(e) = self.try_send_message(r, data.into()) {
            fatal!("cannot send message on {r:?}: {e}");
        }
    }

    pub(crate) fn try_send_message(&mut self, r: Ref, data: Vec<u8>) -> GraphResult<()> {
        let node = self.nodes.get_mut(&r).ok_or(GraphError::MissingNode(r))?;
        if node.presence == Presence::Removed {
            return Err(GraphError::RemovedNode(r));
        }
        let Payload::Message { pending } = &mut node.payload else {
            return Err(GraphError::KindMismatch { node: r, expected: "message" });
        };
        pending.push(data);
        if pending.len() == 1 {
            self.bump(r, 1);
        }
        Ok(())
    }

    /// Messages received or sent during the current cycle.
    pub fn messages(&self, r: Ref) -> &[Vec<u8>] {
        match &self.node(r).payload {
            Payload::Message { pending } => pending,
            _ => fatal!("{r:?} is not a message"),
        }
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("version", &self.registry.version())
            .field("actor", &self.actor)
            .field("nodes", &self.nodes.len())
            .field("modifications", &self.node(Ref::ROOT).modifications)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture_registry, item};

    #[test]
    fn root_is_built_under_actor_zero() {
        let g = Graph::new(fixture_registry(), 1);
        assert!(g.contains(Ref::ROOT));
        assert_eq!(g.class_name(Ref::ROOT), "fx.Root");
        assert!(g.is_clean());
        for m in g.members(Ref::ROOT) {
            assert_eq!(m.actor(), 0);
        }
    }

    #[test]
    fn idempotent_assignment_does_not_touch_counter() {
        let mut g = Graph::new(fixture_registry(), 1);
        let title = g.member(Ref::ROOT, "title").unwrap();
        g.set_string(title, "");
        assert!(!g.changed(title));
        assert_eq!(g.modifications(Ref::ROOT), 0);

        g.set_string(title, "hello");
        assert!(g.changed(title));
        assert_eq!(g.modifications(Ref::ROOT), 1);
        g.set_string(title, "hello");
        assert_eq!(g.modifications(Ref::ROOT), 1);
    }

    #[test]
    fn writing_back_the_baseline_clears_the_diff() {
        let mut g = Graph::new(fixture_registry(), 1);
        let count = g.member(Ref::ROOT, "count").unwrap();
        g.set_int(count, 4);
        g.set_int(count, 0);
        assert!(!g.changed(count));
        assert!(g.is_clean());
    }

    #[test]
    fn member_lookup_errors_are_recoverable() {
        let g = Graph::new(fixture_registry(), 1);
        assert!(g.member(Ref::ROOT, "nope").is_err());
        assert_eq!(
            g.member(Ref::new(9, 9), "x"),
            Err(GraphError::MissingNode(Ref::new(9, 9)))
        );
    }

    #[test]
    #[should_panic(expected = "cannot set")]
    fn kind_mismatch_is_fatal() {
        let mut g = Graph::new(fixture_registry(), 1);
        let count = g.member(Ref::ROOT, "count").unwrap();
        g.set_bool(count, true);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn enumerator_out_of_range_is_fatal() {
        let mut g = Graph::new(fixture_registry(), 1);
        let mode = g.member(Ref::ROOT, "mode").unwrap();
        g.set_enum(mode, 7);
    }

    #[test]
    fn messages_count_once() {
        let mut g = Graph::new(fixture_registry(), 1);
        let bang = g.member(Ref::ROOT, "bang").unwrap();
        g.send_message(bang, b"a".to_vec());
        g.send_message(bang, b"b".to_vec());
        assert_eq!(g.messages(bang).len(), 2);
        assert_eq!(g.modifications(Ref::ROOT), 1);
    }

    #[test]
    fn ancestor_queries() {
        let mut g = Graph::new(fixture_registry(), 1);
        let a = g.member(Ref::ROOT, "a").unwrap();
        let x = item(&mut g, a, 1);
        let value = g.member(x, "value").unwrap();
        let root_class = g.class_of(Ref::ROOT);
        assert_eq!(g.ancestor_of_class(value, root_class), Some(Ref::ROOT));
        assert!(g.is_ancestor(a, value));
        assert!(!g.is_ancestor(value, a));
        assert_eq!(g.parent(x), Some(a));
        assert_eq!(g.parent(Ref::ROOT), None);
    }
}
