use std::sync::Arc;

use tracing::debug;
use weave_codec::Mold;
use weave_graph::{Graph, Position};
use weave_schema::{ClassId, ClassRegistry};
use weave_types::Ref;

use crate::error::{PatcherError, PatcherResult};
use crate::factory::ObjectFactory;
use crate::schema::PinKind;

/// Both ends of a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkEnds {
    pub sender: Ref,
    pub outlet: usize,
    pub receiver: Ref,
    pub inlet: usize,
}

/// Editing operations on the patcher stored in a graph.
///
/// A `Patcher` only caches refs and class ids; every operation takes the
/// graph it edits, so it works the same on a bare [`Graph`] and on the graph
/// of a [`DocumentManager`](weave_document::DocumentManager). Changes stay
/// pending until the caller commits.
#[derive(Clone, Debug)]
pub struct Patcher {
    objects: Ref,
    links: Ref,
    users: Ref,
    box_class: ClassId,
    link_class: ClassId,
    user_class: ClassId,
    factory: ObjectFactory,
}

impl Patcher {
    pub fn new(graph: &Graph) -> PatcherResult<Self> {
        let registry: &Arc<ClassRegistry> = graph.registry();
        let root = graph.root();
        Ok(Self {
            objects: graph.member(root, "objects")?,
            links: graph.member(root, "links")?,
            users: graph.member(root, "users")?,
            box_class: registry.class_id("patcher.Box")?,
            link_class: registry.class_id("patcher.Link")?,
            user_class: registry.class_id("patcher.User")?,
            factory: ObjectFactory::new(registry)?,
        })
    }

    pub fn factory(&self) -> &ObjectFactory {
        &self.factory
    }

    pub(crate) fn objects_container(&self) -> Ref {
        self.objects
    }

    pub(crate) fn links_container(&self) -> Ref {
        self.links
    }

    pub fn objects(&self, graph: &Graph) -> Vec<Ref> {
        graph.elements(self.objects)
    }

    pub fn links(&self, graph: &Graph) -> Vec<Ref> {
        graph.elements(self.links)
    }

    pub fn is_object(&self, graph: &Graph, obj: Ref) -> bool {
        graph.contains(obj) && graph.parent(obj) == Some(self.objects) && !graph.removed(obj)
    }

    pub fn is_link(&self, graph: &Graph, link: Ref) -> bool {
        graph.contains(link) && graph.parent(link) == Some(self.links) && !graph.removed(link)
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    /// Create the object described by `text` at `(x, y)`.
    pub fn add_object(&self, graph: &mut Graph, text: &str, x: f64, y: f64) -> PatcherResult<Ref> {
        let obj = self.factory.create(graph, self.objects, text, Position::End)?;
        self.set_position(graph, obj, x, y)?;
        debug!(?obj, text, "object added");
        Ok(obj)
    }

    /// Remove `obj` and every link attached to it.
    pub fn remove_object(&self, graph: &mut Graph, obj: Ref) -> PatcherResult<()> {
        self.check_object(graph, obj)?;
        for link in self.links_of(graph, obj)? {
            graph.erase(link);
        }
        graph.erase(obj);
        debug!(?obj, "object removed");
        Ok(())
    }

    /// Replace `old` by the object described by `text`, keeping its
    /// geometry and the links the new object can still take.
    pub fn replace_object(&self, graph: &mut Graph, old: Ref, text: &str) -> PatcherResult<Ref> {
        self.check_object(graph, old)?;
        let new = self.factory.create(graph, self.objects, text, Position::After(old))?;
        Mold::make(graph, old).apply(graph, new, self.box_class)?;

        let mut relinks = Vec::new();
        for link in self.links_of(graph, old)? {
            let mut ends = self.link_ends(graph, link)?;
            if ends.sender == old {
                ends.sender = new;
            }
            if ends.receiver == old {
                ends.receiver = new;
            }
            relinks.push(ends);
        }
        self.remove_object(graph, old)?;
        for ends in relinks {
            if self.can_connect(graph, ends.sender, ends.outlet, ends.receiver, ends.inlet) {
                self.add_link(graph, ends.sender, ends.outlet, ends.receiver, ends.inlet)?;
            } else {
                debug!(?ends, "link dropped by replacement");
            }
        }
        debug!(?old, ?new, text, "object replaced");
        Ok(new)
    }

    pub fn move_object(&self, graph: &mut Graph, obj: Ref, x: f64, y: f64) -> PatcherResult<()> {
        self.check_object(graph, obj)?;
        self.set_position(graph, obj, x, y)
    }

    pub fn position(&self, graph: &Graph, obj: Ref) -> PatcherResult<(f64, f64)> {
        self.check_object(graph, obj)?;
        Ok((graph.get_float(graph.member(obj, "x")?), graph.get_float(graph.member(obj, "y")?)))
    }

    pub fn size(&self, graph: &Graph, obj: Ref) -> PatcherResult<(f64, f64)> {
        self.check_object(graph, obj)?;
        Ok((
            graph.get_float(graph.member(obj, "width")?),
            graph.get_float(graph.member(obj, "height")?),
        ))
    }

    pub fn resize_object(&self, graph: &mut Graph, obj: Ref, width: f64, height: f64) -> PatcherResult<()> {
        self.check_object(graph, obj)?;
        graph.set_float(graph.member(obj, "width")?, width);
        graph.set_float(graph.member(obj, "height")?, height);
        Ok(())
    }

    pub fn object_name(&self, graph: &Graph, obj: Ref) -> PatcherResult<String> {
        Ok(graph.get_string(graph.member(obj, "name")?))
    }

    pub fn object_text(&self, graph: &Graph, obj: Ref) -> PatcherResult<String> {
        Ok(graph.get_string(graph.member(obj, "text")?))
    }

    pub fn inlets(&self, graph: &Graph, obj: Ref) -> PatcherResult<Vec<PinKind>> {
        pins(graph, graph.member(obj, "inlets")?)
    }

    pub fn outlets(&self, graph: &Graph, obj: Ref) -> PatcherResult<Vec<PinKind>> {
        pins(graph, graph.member(obj, "outlets")?)
    }

    fn set_position(&self, graph: &mut Graph, obj: Ref, x: f64, y: f64) -> PatcherResult<()> {
        graph.set_float(graph.member(obj, "x")?, x);
        graph.set_float(graph.member(obj, "y")?, y);
        Ok(())
    }

    fn check_object(&self, graph: &Graph, obj: Ref) -> PatcherResult<()> {
        if self.is_object(graph, obj) {
            Ok(())
        } else {
            Err(PatcherError::UnknownObject(obj))
        }
    }

    // ------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------

    /// Whether `sender:outlet -> receiver:inlet` would be a valid new link:
    /// two distinct live objects, pins in range and of the same kind, and
    /// no identical link already present.
    pub fn can_connect(&self, graph: &Graph, sender: Ref, outlet: usize, receiver: Ref, inlet: usize) -> bool {
        if sender == receiver || !self.is_object(graph, sender) || !self.is_object(graph, receiver) {
            return false;
        }
        let (Ok(outlets), Ok(inlets)) = (self.outlets(graph, sender), self.inlets(graph, receiver)) else {
            return false;
        };
        let (Some(from), Some(to)) = (outlets.get(outlet), inlets.get(inlet)) else {
            return false;
        };
        if from != to {
            return false;
        }
        let wanted = LinkEnds { sender, outlet, receiver, inlet };
        !self.links(graph).into_iter().any(|l| self.link_ends(graph, l).is_ok_and(|e| e == wanted))
    }

    pub fn add_link(
        &self,
        graph: &mut Graph,
        sender: Ref,
        outlet: usize,
        receiver: Ref,
        inlet: usize,
    ) -> PatcherResult<Ref> {
        if !self.can_connect(graph, sender, outlet, receiver, inlet) {
            return Err(PatcherError::CannotConnect { from: sender, outlet, to: receiver, inlet });
        }
        let link = graph.insert(self.links, self.link_class, Position::End);
        graph.set_object_ref(graph.member(link, "sender")?, sender);
        graph.set_object_ref(graph.member(link, "receiver")?, receiver);
        graph.set_int(graph.member(link, "outlet")?, outlet as i64);
        graph.set_int(graph.member(link, "inlet")?, inlet as i64);
        debug!(?link, ?sender, outlet, ?receiver, inlet, "link added");
        Ok(link)
    }

    pub fn remove_link(&self, graph: &mut Graph, link: Ref) -> PatcherResult<()> {
        if !self.is_link(graph, link) {
            return Err(PatcherError::UnknownLink(link));
        }
        graph.erase(link);
        debug!(?link, "link removed");
        Ok(())
    }

    pub fn link_ends(&self, graph: &Graph, link: Ref) -> PatcherResult<LinkEnds> {
        Ok(LinkEnds {
            sender: graph.get_object_ref(graph.member(link, "sender")?),
            outlet: index(graph.get_int(graph.member(link, "outlet")?)),
            receiver: graph.get_object_ref(graph.member(link, "receiver")?),
            inlet: index(graph.get_int(graph.member(link, "inlet")?)),
        })
    }

    /// Live links with `obj` at either end.
    pub fn links_of(&self, graph: &Graph, obj: Ref) -> PatcherResult<Vec<Ref>> {
        let mut out = Vec::new();
        for link in self.links(graph) {
            let ends = self.link_ends(graph, link)?;
            if ends.sender == obj || ends.receiver == obj {
                out.push(link);
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Register `id` as a user of the patcher. Users are not part of the
    /// undo history.
    pub fn add_user(&self, graph: &mut Graph, id: u64) -> PatcherResult<Ref> {
        if let Some(user) = self.find_user(graph, id)? {
            return Ok(user);
        }
        let user = graph.insert(self.users, self.user_class, Position::End);
        graph.set_int(graph.member(user, "id")?, id as i64);
        debug!(id, "user added");
        Ok(user)
    }

    pub fn remove_user(&self, graph: &mut Graph, id: u64) -> PatcherResult<()> {
        let user = self.find_user(graph, id)?.ok_or(PatcherError::UnknownUser(id))?;
        graph.erase(user);
        debug!(id, "user removed");
        Ok(())
    }

    pub fn user_ids(&self, graph: &Graph) -> PatcherResult<Vec<u64>> {
        let mut ids = graph
            .elements(self.users)
            .into_iter()
            .map(|u| -> PatcherResult<u64> { Ok(graph.get_int(graph.member(u, "id")?) as u64) })
            .collect::<PatcherResult<Vec<_>>>()?;
        ids.sort_unstable();
        Ok(ids)
    }

    fn find_user(&self, graph: &Graph, id: u64) -> PatcherResult<Option<Ref>> {
        for user in graph.elements(self.users) {
            if graph.get_int(graph.member(user, "id")?) as u64 == id {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }
}

fn pins(graph: &Graph, container: Ref) -> PatcherResult<Vec<PinKind>> {
    graph
        .elements(container)
        .into_iter()
        .map(|pin| -> PatcherResult<PinKind> {
            Ok(PinKind::from_index(graph.get_enum(graph.member(pin, "kind")?)))
        })
        .collect()
}

fn index(value: i64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::patcher_registry;

    fn setup() -> (Graph, Patcher) {
        let g = Graph::new(patcher_registry(), 1);
        let p = Patcher::new(&g).unwrap();
        (g, p)
    }

    #[test]
    fn add_object_places_it() {
        let (mut g, p) = setup();
        let obj = p.add_object(&mut g, "plus", 10.0, 30.0).unwrap();
        assert_eq!(p.objects(&g), vec![obj]);
        assert_eq!(p.position(&g, obj).unwrap(), (10.0, 30.0));
        assert_eq!(p.object_name(&g, obj).unwrap(), "plus");
        assert_eq!(p.inlets(&g, obj).unwrap(), vec![PinKind::Control, PinKind::Control]);
    }

    #[test]
    fn can_connect_checks_range_self_and_duplicates() {
        let (mut g, p) = setup();
        let plus = p.add_object(&mut g, "+", 0.0, 0.0).unwrap();
        let print = p.add_object(&mut g, "print", 0.0, 50.0).unwrap();

        assert!(p.can_connect(&g, plus, 0, print, 0));
        assert!(!p.can_connect(&g, plus, 1, print, 0));
        assert!(!p.can_connect(&g, plus, 0, print, 1));
        assert!(!p.can_connect(&g, plus, 0, plus, 0));
        assert!(!p.can_connect(&g, print, 0, plus, 0));

        p.add_link(&mut g, plus, 0, print, 0).unwrap();
        assert!(!p.can_connect(&g, plus, 0, print, 0));
        assert!(matches!(
            p.add_link(&mut g, plus, 0, print, 0),
            Err(PatcherError::CannotConnect { .. })
        ));
    }

    #[test]
    fn remove_object_takes_its_links() {
        let (mut g, p) = setup();
        let a = p.add_object(&mut g, "+", 0.0, 0.0).unwrap();
        let b = p.add_object(&mut g, "+", 0.0, 50.0).unwrap();
        let c = p.add_object(&mut g, "print", 0.0, 90.0).unwrap();
        p.add_link(&mut g, a, 0, b, 1).unwrap();
        let kept = p.add_link(&mut g, b, 0, c, 0).unwrap();

        p.remove_object(&mut g, a).unwrap();
        assert_eq!(p.links(&g), vec![kept]);
        assert_eq!(p.objects(&g), vec![b, c]);
        assert!(matches!(p.remove_object(&mut g, a), Err(PatcherError::UnknownObject(_))));
    }

    #[test]
    fn replace_keeps_geometry_and_valid_links() {
        let (mut g, p) = setup();
        let src = p.add_object(&mut g, "toggle", 0.0, 0.0).unwrap();
        let old = p.add_object(&mut g, "+", 40.0, 60.0).unwrap();
        let sink = p.add_object(&mut g, "print", 0.0, 120.0).unwrap();
        p.resize_object(&mut g, old, 90.0, 25.0).unwrap();
        p.add_link(&mut g, src, 0, old, 1).unwrap();
        p.add_link(&mut g, old, 0, sink, 0).unwrap();

        let new = p.replace_object(&mut g, old, "toggle").unwrap();
        assert!(!p.is_object(&g, old));
        assert_eq!(p.objects(&g), vec![src, new, sink]);
        assert_eq!(p.position(&g, new).unwrap(), (40.0, 60.0));
        assert_eq!(p.size(&g, new).unwrap(), (90.0, 25.0));
        assert_eq!(p.object_name(&g, new).unwrap(), "toggle");

        // the toggle has a single inlet, so only the outgoing link survives
        let links = p.links(&g);
        assert_eq!(links.len(), 1);
        let ends = p.link_ends(&g, links[0]).unwrap();
        assert_eq!(ends, LinkEnds { sender: new, outlet: 0, receiver: sink, inlet: 0 });
    }

    #[test]
    fn replace_with_unknown_text_gives_an_error_box() {
        let (mut g, p) = setup();
        let old = p.add_object(&mut g, "print", 5.0, 5.0).unwrap();
        let new = p.replace_object(&mut g, old, "nosuch 1 2").unwrap();
        assert_eq!(g.class_name(new), "patcher.ErrorBox");
        assert_eq!(p.object_text(&g, new).unwrap(), "nosuch 1 2");
        assert_eq!(p.position(&g, new).unwrap(), (5.0, 5.0));
    }

    #[test]
    fn users_are_unique_by_id() {
        let (mut g, p) = setup();
        let first = p.add_user(&mut g, 7).unwrap();
        assert_eq!(p.add_user(&mut g, 7).unwrap(), first);
        p.add_user(&mut g, 3).unwrap();
        assert_eq!(p.user_ids(&g).unwrap(), vec![3, 7]);
        p.remove_user(&mut g, 7).unwrap();
        assert_eq!(p.user_ids(&g).unwrap(), vec![3]);
        assert!(matches!(p.remove_user(&mut g, 7), Err(PatcherError::UnknownUser(7))));
    }
}
