use std::sync::Arc;

use weave_schema::ClassId;
use weave_types::{fatal, KeyFloat, KeyRandom, Ref};

use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::node::{Container, ContainerKey, MoveLink, Payload, Position, Presence, Slot, SlotView};
use crate::sync::Purge;

impl Graph {
    pub(crate) fn container(&self, r: Ref) -> &Container {
        match self.node(r).container() {
            Some(c) => c,
            None => fatal!("{r:?} is not a container"),
        }
    }

    fn container_mut(&mut self, r: Ref) -> &mut Container {
        match self.node_mut(r).container_mut() {
            Some(c) => c,
            None => fatal!("{r:?} is not a container"),
        }
    }

    pub(crate) fn try_container(&self, r: Ref) -> GraphResult<&Container> {
        self.try_node(r)?
            .container()
            .ok_or(GraphError::KindMismatch { node: r, expected: "container" })
    }

    /// Live elements in key order.
    pub fn elements(&self, container: Ref) -> Vec<Ref> {
        self.container(container)
            .slots
            .values()
            .filter(|s| s.state != Presence::Removed)
            .map(|s| s.elem)
            .collect()
    }

    /// Every slot, removed ones included, in key order.
    pub fn slots(&self, container: Ref) -> Vec<SlotView> {
        self.container(container)
            .slots
            .iter()
            .map(|(key, s)| SlotView {
                key: key.clone(),
                elem: s.elem,
                state: s.state,
                moved: s.link.is_some(),
            })
            .collect()
    }

    pub fn element_count(&self, container: Ref) -> usize {
        self.container(container)
            .slots
            .values()
            .filter(|s| s.state != Presence::Removed)
            .count()
    }

    pub fn element_class(&self, container: Ref) -> ClassId {
        self.container(container).elem_class
    }

    pub fn is_array(&self, container: Ref) -> bool {
        self.container(container).ordered
    }

    /// Key of the slot currently holding `elem`.
    pub fn key_of(&self, elem: Ref) -> Option<&ContainerKey> {
        self.nodes.get(&elem)?.slot_key.as_ref()
    }

    pub fn find_if(
        &self,
        container: Ref,
        mut pred: impl FnMut(&Graph, Ref) -> bool,
    ) -> Option<Ref> {
        self.elements(container).into_iter().find(|e| pred(self, *e))
    }

    pub fn count_if(&self, container: Ref, mut pred: impl FnMut(&Graph, Ref) -> bool) -> usize {
        self.elements(container).into_iter().filter(|e| pred(self, *e)).count()
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Insert a default-constructed instance of `class`. Returns its ref.
    pub fn insert(&mut self, container: Ref, class: ClassId, position: Position) -> Ref {
        let key = self.make_key(container, position);
        let span = self.registry.class(class).ref_span();
        let elem = self.allocate(span);
        if let Err(e) = self.try_insert_at(container, key, class, elem) {
            fatal!("cannot insert into {container:?}: {e}");
        }
        elem
    }

    /// Insert, then initialise the new element's fields.
    pub fn emplace(
        &mut self,
        container: Ref,
        class: ClassId,
        position: Position,
        init: impl FnOnce(&mut Graph, Ref),
    ) -> Ref {
        let elem = self.insert(container, class, position);
        init(self, elem);
        elem
    }

    pub fn erase(&mut self, elem: Ref) {
        if let Err(e) = self.try_erase(elem) {
            fatal!("cannot erase {elem:?}: {e}");
        }
    }

    /// Move `elem` into `dst` (possibly its current container).
    pub fn move_element(&mut self, elem: Ref, dst: Ref, position: Position) {
        let key = self.make_key(dst, position);
        if let Err(e) = self.try_move_to(elem, dst, key) {
            fatal!("cannot move {elem:?} into {dst:?}: {e}");
        }
    }

    pub fn clear(&mut self, container: Ref) {
        for elem in self.elements(container) {
            self.erase(elem);
        }
    }

    /// Deep copy of `src` into `dst` with fresh refs.
    pub fn copy_object(&mut self, src: Ref, dst: Ref, position: Position) -> Ref {
        let class = self.class_of(src);
        let copy = self.insert(dst, class, position);
        self.copy_members(src, copy);
        copy
    }

    fn copy_members(&mut self, src: Ref, dst: Ref) {
        let pairs: Vec<(Ref, Ref)> =
            self.members(src).iter().copied().zip(self.members(dst).iter().copied()).collect();
        for (from, to) in pairs {
            match &self.node(from).payload {
                Payload::Scalar { value, .. } => {
                    let value = value.clone();
                    self.set_value(to, value);
                }
                Payload::Object { .. } => self.copy_members(from, to),
                Payload::Container(_) => {
                    for elem in self.elements(from) {
                        self.copy_object(elem, to, Position::End);
                    }
                }
                Payload::Message { .. } => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------

    pub(crate) fn make_key(&mut self, container: Ref, position: Position) -> ContainerKey {
        let c = self.container(container);
        if !c.ordered {
            loop {
                let key = ContainerKey::Random(KeyRandom::generate(&mut self.rng));
                if !self.container(container).slots.contains_key(&key) {
                    return key;
                }
            }
        }
        let anchor = |elem: Ref| -> ContainerKey {
            match self.nodes.get(&elem) {
                Some(node) if node.parent == container => match &node.slot_key {
                    Some(key) => key.clone(),
                    None => fatal!("{elem:?} is not an element"),
                },
                _ => fatal!("{elem:?} is not an element of {container:?}"),
            }
        };
        let (left, right) = match position {
            Position::Start => (None, c.slots.keys().next().cloned()),
            Position::End => (c.slots.keys().next_back().cloned(), None),
            Position::Before(elem) => {
                let k = anchor(elem);
                (c.slots.range(..k.clone()).next_back().map(|(k, _)| k.clone()), Some(k))
            }
            Position::After(elem) => {
                let k = anchor(elem);
                let next = c
                    .slots
                    .range(k.clone()..)
                    .map(|(k, _)| k)
                    .find(|candidate| **candidate != k)
                    .cloned();
                (Some(k), next)
            }
        };
        self.float_key_between(left.as_ref(), right.as_ref())
    }

    pub(crate) fn float_key_between(
        &mut self,
        left: Option<&ContainerKey>,
        right: Option<&ContainerKey>,
    ) -> ContainerKey {
        let l: Option<&KeyFloat> = left.and_then(ContainerKey::as_float);
        let r: Option<&KeyFloat> = right.and_then(ContainerKey::as_float);
        ContainerKey::Float(KeyFloat::generate(l, r, &mut self.rng))
    }

    /// A free key right after `key`, for inserts that lost a key race.
    pub(crate) fn key_after(&mut self, container: Ref, key: &ContainerKey) -> ContainerKey {
        let c = self.container(container);
        if !c.ordered {
            return self.make_key(container, Position::End);
        }
        let next = c.slots.range(key.clone()..).map(|(k, _)| k).find(|k| *k != key).cloned();
        self.float_key_between(Some(key), next.as_ref())
    }

    // ------------------------------------------------------------------
    // Fallible primitives shared with the executor
    // ------------------------------------------------------------------

    fn check_target(&self, container: Ref, key: &ContainerKey) -> GraphResult<()> {
        let node = self.try_node(container)?;
        if node.presence == Presence::Removed {
            return Err(GraphError::RemovedNode(container));
        }
        let c = node
            .container()
            .ok_or(GraphError::KindMismatch { node: container, expected: "container" })?;
        match (c.ordered, key) {
            (true, ContainerKey::Float(_)) | (false, ContainerKey::Random(_)) => Ok(()),
            (true, _) => Err(GraphError::KindMismatch { node: container, expected: "collection" }),
            (false, _) => Err(GraphError::KindMismatch { node: container, expected: "array" }),
        }
    }

    pub(crate) fn try_insert_at(
        &mut self,
        container: Ref,
        key: ContainerKey,
        class: ClassId,
        elem: Ref,
    ) -> GraphResult<()> {
        self.check_target(container, &key)?;
        let registry = Arc::clone(&self.registry);
        let Some(class_desc) = registry.try_class(class) else {
            return Err(GraphError::ClassMismatch { container, class });
        };
        let c = self.container(container);
        if !registry.is_a(class, c.elem_class) {
            return Err(GraphError::ClassMismatch { container, class });
        }
        if c.slots.contains_key(&key) {
            return Err(GraphError::KeyOccupied(container));
        }
        let span = class_desc.ref_span();
        if elem.is_null() {
            return Err(GraphError::MissingNode(elem));
        }
        for i in 0..span {
            if self.nodes.contains_key(&elem.offset(i)) {
                return Err(GraphError::RefInUse(elem.offset(i)));
            }
        }

        let undo = self.node(container).undo;
        self.instantiate(class, elem, container, Presence::Added, undo);
        self.reserve(elem, span);
        self.node_mut(elem).slot_key = Some(key.clone());
        self.container_mut(container)
            .slots
            .insert(key, Slot { elem, state: Presence::Added, link: None });
        self.bump(container, 1);
        Ok(())
    }

    /// Bring back an element erased earlier in the current window.
    pub(crate) fn try_revive(&mut self, container: Ref, key: &ContainerKey, elem: Ref) -> GraphResult<()> {
        let slot = self
            .try_container(container)?
            .slots
            .get(key)
            .ok_or(GraphError::MissingElement { container, elem })?;
        if slot.elem != elem || slot.state != Presence::Removed || slot.link.is_some() {
            return Err(GraphError::KeyOccupied(container));
        }
        if let Some(slot) = self.container_mut(container).slots.get_mut(key) {
            slot.state = Presence::Resident;
        }
        self.mark_subtree(elem, Presence::Resident);
        self.bump(container, -1);
        Ok(())
    }

    pub(crate) fn try_erase(&mut self, elem: Ref) -> GraphResult<()> {
        let node = self.try_node(elem)?;
        let container = node.parent;
        let key = node
            .slot_key
            .clone()
            .ok_or(GraphError::KindMismatch { node: elem, expected: "container element" })?;
        let count = node.modifications as i64;
        let slot = match self.try_container(container)?.slots.get(&key) {
            Some(slot) => slot.clone(),
            None => fatal!("element {elem:?} lost its slot in {container:?}"),
        };

        match (slot.state, slot.link) {
            (Presence::Removed, _) => return Err(GraphError::RemovedNode(elem)),
            (Presence::Added, None) => {
                self.container_mut(container).slots.remove(&key);
                self.bump(container, -(1 + count));
                self.purge(elem, Purge::Erase);
            }
            (Presence::Added, Some(origin)) => {
                self.container_mut(container).slots.remove(&key);
                self.bump(container, -(1 + count));
                self.return_erased(elem, origin);
            }
            (Presence::Resident, _) => {
                if let Some(slot) = self.container_mut(container).slots.get_mut(&key) {
                    slot.state = Presence::Removed;
                }
                self.bump(container, 1);
                self.mark_subtree(elem, Presence::Removed);
            }
        }
        Ok(())
    }

    /// An element moved in during this window and erased again: it is
    /// erased from where the baseline has it.
    pub(crate) fn return_erased(&mut self, elem: Ref, origin: MoveLink) {
        match self.container_mut(origin.container).slots.get_mut(&origin.key) {
            Some(slot) => slot.link = None,
            None => fatal!("move origin of {elem:?} vanished"),
        }
        let node = self.node_mut(elem);
        node.parent = origin.container;
        node.slot_key = Some(origin.key);
        let count = node.modifications as i64;
        self.bump(origin.container, count);
        self.mark_subtree(elem, Presence::Removed);
    }

    pub(crate) fn try_move_to(&mut self, elem: Ref, dst: Ref, key: ContainerKey) -> GraphResult<()> {
        self.check_target(dst, &key)?;
        let node = self.try_node(elem)?;
        let src = node.parent;
        let src_key = node
            .slot_key
            .clone()
            .ok_or(GraphError::KindMismatch { node: elem, expected: "container element" })?;
        let count = node.modifications as i64;
        let class = match node.payload {
            Payload::Object { class, .. } => class,
            _ => return Err(GraphError::KindMismatch { node: elem, expected: "object" }),
        };
        let src_slot = match self.try_container(src)?.slots.get(&src_key) {
            Some(slot) => slot.clone(),
            None => fatal!("element {elem:?} lost its slot in {src:?}"),
        };
        if src_slot.state == Presence::Removed {
            return Err(GraphError::RemovedNode(elem));
        }
        if src == dst && src_key == key {
            return Ok(());
        }
        let dst_container = self.container(dst);
        if !self.registry.is_a(class, dst_container.elem_class) {
            return Err(GraphError::ClassMismatch { container: dst, class });
        }
        if self.is_ancestor(elem, dst) {
            return Err(GraphError::Cycle { elem, container: dst });
        }
        let restoring = match dst_container.slots.get(&key) {
            None => false,
            Some(s) => {
                let back_link = MoveLink { container: src, key: src_key.clone() };
                if s.elem == elem && s.state == Presence::Removed && s.link.as_ref() == Some(&back_link) {
                    true
                } else {
                    return Err(GraphError::KeyOccupied(dst));
                }
            }
        };

        match (src_slot.state, src_slot.link) {
            (Presence::Added, None) => {
                self.container_mut(src).slots.remove(&src_key);
                self.bump(src, -(1 + count));
                self.place(elem, dst, key, Slot { elem, state: Presence::Added, link: None });
                self.bump(dst, 1 + count);
            }
            (Presence::Added, Some(origin)) => {
                self.container_mut(src).slots.remove(&src_key);
                self.bump(src, -(1 + count));
                if restoring {
                    if let Some(slot) = self.container_mut(dst).slots.get_mut(&key) {
                        slot.state = Presence::Resident;
                        slot.link = None;
                    }
                    self.set_location(elem, dst, key);
                    self.bump(dst, count - 1);
                } else {
                    match self.container_mut(origin.container).slots.get_mut(&origin.key) {
                        Some(slot) => slot.link = Some(MoveLink { container: dst, key: key.clone() }),
                        None => fatal!("move origin of {elem:?} vanished"),
                    }
                    self.place(elem, dst, key, Slot { elem, state: Presence::Added, link: Some(origin) });
                    self.bump(dst, 1 + count);
                }
            }
            (Presence::Resident, _) => {
                if let Some(slot) = self.container_mut(src).slots.get_mut(&src_key) {
                    slot.state = Presence::Removed;
                    slot.link = Some(MoveLink { container: dst, key: key.clone() });
                }
                self.bump(src, 1 - count);
                let link = MoveLink { container: src, key: src_key };
                self.place(elem, dst, key, Slot { elem, state: Presence::Added, link: Some(link) });
                self.bump(dst, 1 + count);
            }
            (Presence::Removed, _) => return Err(GraphError::RemovedNode(elem)),
        }
        Ok(())
    }

    fn place(&mut self, elem: Ref, dst: Ref, key: ContainerKey, slot: Slot) {
        self.container_mut(dst).slots.insert(key.clone(), slot);
        self.set_location(elem, dst, key);
    }

    pub(crate) fn set_location(&mut self, elem: Ref, container: Ref, key: ContainerKey) {
        let node = self.node_mut(elem);
        node.parent = container;
        node.slot_key = Some(key);
    }
}
