use std::sync::Arc;

use weave_graph::{Graph, Position};
use weave_schema::{ClassId, ClassRegistry};
use weave_types::Ref;

use crate::error::PatcherResult;
use crate::schema::PinKind;

const DEFAULT_WIDTH: f64 = 60.0;
const DEFAULT_HEIGHT: f64 = 20.0;

/// What the factory builds for one object text.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectSpec {
    pub class: ClassId,
    pub name: String,
    pub inlets: Vec<PinKind>,
    pub outlets: Vec<PinKind>,
    /// Set for texts naming no known object.
    pub error: Option<String>,
    pub size: (f64, f64),
}

/// Maps object texts such as `"+ 1"` or `"print"` to classes and pins.
#[derive(Clone, Debug)]
pub struct ObjectFactory {
    plus: ClassId,
    print: ClassId,
    toggle: ClassId,
    error: ClassId,
}

impl ObjectFactory {
    pub fn new(registry: &Arc<ClassRegistry>) -> PatcherResult<Self> {
        Ok(Self {
            plus: registry.class_id("patcher.Plus")?,
            print: registry.class_id("patcher.Print")?,
            toggle: registry.class_id("patcher.Toggle")?,
            error: registry.class_id("patcher.ErrorBox")?,
        })
    }

    /// Resolve `text`. The first word names the object; the rest are
    /// arguments kept in the object's text.
    pub fn resolve(&self, text: &str) -> ObjectSpec {
        use PinKind::Control;
        let name = text.split_whitespace().next().unwrap_or_default();
        let (class, name, inlets, outlets, size) = match name {
            "+" | "plus" => (self.plus, "plus", vec![Control, Control], vec![Control], None),
            "print" => (self.print, "print", vec![Control], vec![], None),
            "toggle" => (self.toggle, "toggle", vec![Control], vec![Control], Some((20.0, 20.0))),
            _ => {
                return ObjectSpec {
                    class: self.error,
                    name: "errorbox".to_string(),
                    inlets: Vec::new(),
                    outlets: Vec::new(),
                    error: Some(format!("unknown object \"{name}\"")),
                    size: (DEFAULT_WIDTH, DEFAULT_HEIGHT),
                }
            }
        };
        ObjectSpec {
            class,
            name: name.to_string(),
            inlets,
            outlets,
            error: None,
            size: size.unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT)),
        }
    }

    /// Build the object for `text` into `container`.
    pub fn create(
        &self,
        graph: &mut Graph,
        container: Ref,
        text: &str,
        position: Position,
    ) -> PatcherResult<Ref> {
        let spec = self.resolve(text);
        let obj = graph.insert(container, spec.class, position);
        graph.set_string(graph.member(obj, "name")?, &spec.name);
        graph.set_string(graph.member(obj, "text")?, text.trim());
        let (width, height) = spec.size;
        graph.set_float(graph.member(obj, "width")?, width);
        graph.set_float(graph.member(obj, "height")?, height);
        if let Some(error) = &spec.error {
            graph.set_string(graph.member(obj, "error")?, error);
        }
        add_pins(graph, graph.member(obj, "inlets")?, &spec.inlets)?;
        add_pins(graph, graph.member(obj, "outlets")?, &spec.outlets)?;
        Ok(obj)
    }
}

fn add_pins(graph: &mut Graph, container: Ref, kinds: &[PinKind]) -> PatcherResult<()> {
    let class = graph.element_class(container);
    for kind in kinds {
        let pin = graph.insert(container, class, Position::End);
        graph.set_enum(graph.member(pin, "kind")?, kind.index());
    }
    Ok(())
}
