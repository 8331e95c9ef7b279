use std::collections::HashMap;

use tracing::debug;
use weave_types::fatal;

use crate::class::{Class, ClassId, EnumClass, EnumId, FieldKind, Member, MemberKind};
use crate::error::{SchemaError, SchemaResult};

/// Explicit registry of every class and enum a document may contain.
///
/// Built once, then sealed and shared. Declaration mistakes (declaring a
/// name twice, inheriting after members, unknown referenced classes) are
/// contract violations and therefore fatal.
#[derive(Clone, Debug)]
pub struct ClassRegistry {
    version: String,
    classes: Vec<Class>,
    class_names: HashMap<String, ClassId>,
    enums: Vec<EnumClass>,
    enum_names: HashMap<String, EnumId>,
    root: Option<ClassId>,
    sealed: bool,
}

impl ClassRegistry {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            classes: Vec::new(),
            class_names: HashMap::new(),
            enums: Vec::new(),
            enum_names: HashMap::new(),
            root: None,
            sealed: false,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Start declaring a class.
    pub fn declare(&mut self, name: &str) -> ClassBuilder<'_> {
        self.check_open(name);
        if self.class_names.contains_key(name) || self.enum_names.contains_key(name) {
            fatal!("class {name} declared twice");
        }
        ClassBuilder {
            registry: self,
            name: name.to_string(),
            base: None,
            members: Vec::new(),
            own_start: 0,
        }
    }

    pub fn declare_enum(&mut self, name: &str, enumerators: &[&str]) -> EnumId {
        self.check_open(name);
        if self.class_names.contains_key(name) || self.enum_names.contains_key(name) {
            fatal!("enum {name} declared twice");
        }
        if enumerators.is_empty() {
            fatal!("enum {name} declared without enumerators");
        }
        let id = EnumId(self.enums.len() as u32);
        self.enums.push(EnumClass {
            id,
            name: name.to_string(),
            enumerators: enumerators.iter().map(|e| e.to_string()).collect(),
        });
        self.enum_names.insert(name.to_string(), id);
        debug!(name, enumerators = enumerators.len(), "enum declared");
        id
    }

    /// Select the class instantiated as the root of every document.
    pub fn set_root(&mut self, name: &str) {
        match self.class_names.get(name) {
            Some(id) => self.root = Some(*id),
            None => fatal!("root class {name} is not declared"),
        }
    }

    /// Freeze the registry. Further declarations are fatal.
    pub fn seal(mut self) -> Self {
        if self.root.is_none() {
            fatal!("registry {} sealed without a root class", self.version);
        }
        self.sealed = true;
        self
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn root(&self) -> ClassId {
        match self.root {
            Some(id) => id,
            None => fatal!("registry {} has no root class", self.version),
        }
    }

    pub fn class(&self, id: ClassId) -> &Class {
        match self.classes.get(id.0 as usize) {
            Some(class) => class,
            None => fatal!("unknown class id {}", id.0),
        }
    }

    pub fn try_class(&self, id: ClassId) -> Option<&Class> {
        self.classes.get(id.0 as usize)
    }

    pub fn class_id(&self, name: &str) -> SchemaResult<ClassId> {
        self.class_names
            .get(name)
            .copied()
            .ok_or_else(|| SchemaError::UnknownClass(name.to_string()))
    }

    pub fn class_by_name(&self, name: &str) -> SchemaResult<&Class> {
        self.class_id(name).map(|id| self.class(id))
    }

    pub fn enum_class(&self, id: EnumId) -> &EnumClass {
        match self.enums.get(id.0 as usize) {
            Some(e) => e,
            None => fatal!("unknown enum id {}", id.0),
        }
    }

    pub fn enum_by_name(&self, name: &str) -> SchemaResult<&EnumClass> {
        self.enum_names
            .get(name)
            .map(|id| self.enum_class(*id))
            .ok_or_else(|| SchemaError::UnknownEnum(name.to_string()))
    }

    pub fn classes(&self) -> impl Iterator<Item = &Class> {
        self.classes.iter()
    }

    /// The class followed by its bases, most derived first.
    pub fn chain(&self, id: ClassId) -> Vec<ClassId> {
        let mut chain = vec![id];
        let mut current = self.class(id).base;
        while let Some(base) = current {
            chain.push(base);
            current = self.class(base).base;
        }
        chain
    }

    /// Whether `id` is `base` or derives from it.
    pub fn is_a(&self, id: ClassId, base: ClassId) -> bool {
        self.chain(id).contains(&base)
    }

    /// Member index lookup by name, as a recoverable error.
    pub fn member_index(&self, id: ClassId, member: &str) -> SchemaResult<usize> {
        let class = self.class(id);
        class.member_index(member).ok_or_else(|| SchemaError::UnknownMember {
            class: class.name.clone(),
            member: member.to_string(),
        })
    }

    pub fn check_version(&self, found: &str) -> SchemaResult<()> {
        if found == self.version {
            Ok(())
        } else {
            Err(SchemaError::VersionMismatch {
                expected: self.version.clone(),
                found: found.to_string(),
            })
        }
    }

    fn check_open(&self, name: &str) {
        if self.sealed {
            fatal!("cannot declare {name}: registry {} is sealed", self.version);
        }
    }

    fn resolve(&self, owner: &str, owner_id: ClassId, kind: &FieldKind) -> MemberKind {
        let class = |name: &str| -> ClassId {
            if name == owner {
                return owner_id;
            }
            match self.class_names.get(name) {
                Some(id) => *id,
                None => fatal!("{owner} references undeclared class {name}"),
            }
        };
        match kind {
            FieldKind::Bool => MemberKind::Bool,
            FieldKind::Int => MemberKind::Int,
            FieldKind::Float => MemberKind::Float,
            FieldKind::Blob => MemberKind::Blob,
            FieldKind::Message => MemberKind::Message,
            FieldKind::Enum(name) => match self.enum_names.get(name) {
                Some(id) => MemberKind::Enum(*id),
                None => fatal!("{owner} references undeclared enum {name}"),
            },
            FieldKind::ObjectRef(name) => MemberKind::ObjectRef(class(name)),
            FieldKind::Object(name) => {
                if name == owner {
                    fatal!("class {owner} embeds itself");
                }
                MemberKind::Object(class(name))
            }
            FieldKind::Array(name) => MemberKind::Array(class(name)),
            FieldKind::Collection(name) => MemberKind::Collection(class(name)),
        }
    }
}

/// In-progress class declaration.
///
/// ```
/// # use weave_schema::{ClassRegistry, FieldKind};
/// let mut registry = ClassRegistry::new("demo.1");
/// registry.declare("demo.Point").member("x", FieldKind::Float).member("y", FieldKind::Float).finish();
/// registry.declare("demo.Root").member("points", FieldKind::array("demo.Point")).finish();
/// registry.set_root("demo.Root");
/// let registry = registry.seal();
/// assert_eq!(registry.class_by_name("demo.Point").unwrap().ref_span(), 3);
/// ```
pub struct ClassBuilder<'a> {
    registry: &'a mut ClassRegistry,
    name: String,
    base: Option<ClassId>,
    members: Vec<Member>,
    own_start: usize,
}

impl ClassBuilder<'_> {
    /// Declare the single base class. Must precede every member.
    pub fn inherit(mut self, base: &str) -> Self {
        if self.base.is_some() {
            fatal!("class {}: multiple inheritance is not supported", self.name);
        }
        if !self.members.is_empty() {
            fatal!("class {}: inherit must be declared before members", self.name);
        }
        let base_id = match self.registry.class_names.get(base) {
            Some(id) => *id,
            None => fatal!("class {} inherits undeclared class {base}", self.name),
        };
        self.members = self.registry.class(base_id).members.clone();
        self.own_start = self.members.len();
        self.base = Some(base_id);
        self
    }

    pub fn member(self, name: &str, kind: FieldKind) -> Self {
        self.push_member(name, kind, true)
    }

    /// A member whose changes never enter the undo history.
    pub fn member_without_undo(self, name: &str, kind: FieldKind) -> Self {
        self.push_member(name, kind, false)
    }

    fn push_member(mut self, name: &str, kind: FieldKind, undo: bool) -> Self {
        if self.members.iter().any(|m| m.name == name) {
            fatal!("class {}: member {name} declared twice", self.name);
        }
        let owner_id = ClassId(self.registry.classes.len() as u32);
        let kind = self.registry.resolve(&self.name, owner_id, &kind);
        self.members.push(Member { name: name.to_string(), kind, undo });
        self
    }

    pub fn finish(self) -> ClassId {
        let id = ClassId(self.registry.classes.len() as u32);
        let ref_span = 1 + self
            .members
            .iter()
            .map(|m| match m.kind {
                MemberKind::Object(c) => self.registry.class(c).ref_span,
                _ => 1,
            })
            .sum::<u32>();
        debug!(class = %self.name, members = self.members.len(), ref_span, "class declared");
        self.registry.class_names.insert(self.name.clone(), id);
        self.registry.classes.push(Class {
            id,
            name: self.name,
            base: self.base,
            own_start: self.own_start,
            members: self.members,
            ref_span,
        });
        id
    }
}
