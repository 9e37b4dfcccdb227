//! Naming and representation policy.
//!
//! The lowering core never decides how a symbol looks in JavaScript.  It asks a
//! [`MetadataImporter`], which says for every type and member whether it becomes a plain name,
//! an accessor pair, an inline-code template, or can't be used from script at all.

use indexmap::IndexMap;

use crate::model::{Constant, EventId, FieldId, MethodId, MethodKind, Program, PropertyId, Type, TypeDefId, TypeKind};

#[derive(Debug, Clone, PartialEq)]
pub enum TypeSemantics {
    Normal {
        /// Dotted path to the type object.
        name: String,
        /// Generic arguments are erased instead of instantiated at runtime.
        ignore_generic_arguments: bool,
        /// A struct whose instances can change after construction.  Values of such types must
        /// be copied whenever the source language would copy them.
        is_mutable_value_type: bool,
    },
    NotUsableFromScript,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MethodSemantics {
    Normal { name: String, expand_params: bool, ignore_generic_arguments: bool },
    /// The call is replaced by a template; see [`crate::lower`] for the syntax.
    InlineCode { template: String, non_virtual_template: Option<String>, expand_params: bool },
    /// An instance method implemented as a static method taking the receiver first.
    StaticMethodWithThisAsFirstArgument { name: String, expand_params: bool, ignore_generic_arguments: bool },
    /// A static method implemented as an instance method of its first argument.
    InstanceMethodOnFirstArgument { name: String, expand_params: bool },
    /// An indexer accessor that is a plain element access.
    NativeIndexer,
    /// A user-defined operator that is the built-in JavaScript operator.
    NativeOperator,
    NotUsableFromScript,
}

impl MethodSemantics {
    pub fn normal(name: &str) -> Self {
        MethodSemantics::Normal { name: name.to_owned(), expand_params: false, ignore_generic_arguments: false }
    }

    pub fn inline_code(template: &str) -> Self {
        MethodSemantics::InlineCode { template: template.to_owned(), non_virtual_template: None, expand_params: false }
    }

    pub fn expand_params(&self) -> bool {
        match *self {
            MethodSemantics::Normal { expand_params, .. } => expand_params,
            MethodSemantics::InlineCode { expand_params, .. } => expand_params,
            MethodSemantics::StaticMethodWithThisAsFirstArgument { expand_params, .. } => expand_params,
            MethodSemantics::InstanceMethodOnFirstArgument { expand_params, .. } => expand_params,
            _ => false,
        }
    }

    /// The script name, for strategies that have one.
    pub fn name(&self) -> Option<&str> {
        match self {
            MethodSemantics::Normal { name, .. } => Some(name),
            MethodSemantics::StaticMethodWithThisAsFirstArgument { name, .. } => Some(name),
            MethodSemantics::InstanceMethodOnFirstArgument { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn descr(&self) -> &'static str {
        match self {
            MethodSemantics::Normal { .. } => "normal method",
            MethodSemantics::InlineCode { .. } => "inline code",
            MethodSemantics::StaticMethodWithThisAsFirstArgument { .. } => "static method with 'this' as first argument",
            MethodSemantics::InstanceMethodOnFirstArgument { .. } => "instance method on first argument",
            MethodSemantics::NativeIndexer => "native indexer",
            MethodSemantics::NativeOperator => "native operator",
            MethodSemantics::NotUsableFromScript => "not usable from script",
        }
    }
}

/// Where a constructor parameter goes in a record ("json") constructor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum JsonMember {
    Field(FieldId),
    Property(PropertyId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstructorSemantics {
    /// `new T(...)`
    Unnamed { expand_params: bool },
    /// `new T.name(...)`
    Named { name: String, expand_params: bool },
    /// `T.name(...)`
    StaticMethod { name: String, expand_params: bool },
    InlineCode { template: String, expand_params: bool },
    /// An object literal, with one entry per parameter.
    Json { param_to_member: Vec<JsonMember> },
    NotUsableFromScript,
}

impl ConstructorSemantics {
    pub fn expand_params(&self) -> bool {
        match *self {
            ConstructorSemantics::Unnamed { expand_params } => expand_params,
            ConstructorSemantics::Named { expand_params, .. } => expand_params,
            ConstructorSemantics::StaticMethod { expand_params, .. } => expand_params,
            ConstructorSemantics::InlineCode { expand_params, .. } => expand_params,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertySemantics {
    /// Stored directly in a field of the object.
    Field { name: String },
    GetAndSetMethods { getter: Option<MethodSemantics>, setter: Option<MethodSemantics> },
    NotUsableFromScript,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldSemantics {
    Field { name: String },
    /// Every read is replaced by the value.
    Constant { value: Constant },
    NotUsableFromScript,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventSemantics {
    AddAndRemoveMethods { adder: MethodSemantics, remover: MethodSemantics },
    NotUsableFromScript,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct DelegateSemantics {
    /// The params array is passed as individual arguments.
    pub expand_params: bool,
    /// The JavaScript `this` is passed to the delegate as its first parameter.
    pub bind_this_to_first_parameter: bool,
}

pub trait MetadataImporter {
    fn type_semantics(&self, ty: TypeDefId) -> TypeSemantics;
    fn method_semantics(&self, method: MethodId) -> MethodSemantics;
    fn constructor_semantics(&self, ctor: MethodId) -> ConstructorSemantics;
    fn property_semantics(&self, property: PropertyId) -> PropertySemantics;
    fn field_semantics(&self, field: FieldId) -> FieldSemantics;
    fn event_semantics(&self, event: EventId) -> EventSemantics;
    fn delegate_semantics(&self, delegate: TypeDefId) -> DelegateSemantics;

    /// Whether values of this type need to be copied on assignment.
    fn is_mutable_value_type(&self, ty: &Type) -> bool {
        match ty.unwrap_nullable() {
            Type::Named { def, .. } => matches!(
                self.type_semantics(*def),
                TypeSemantics::Normal { is_mutable_value_type: true, .. },
            ),
            _ => false,
        }
    }
}

// =============================================================================

/// The default naming policy, with per-symbol overrides.
///
/// * Member names are camel-cased.
/// * Auto-implemented properties are plain fields; other properties use `get_x`/`set_x`
///   accessor methods (`get_item`/`set_item` for indexers).
/// * The first constructor of a type is the unnamed one; the others are named `$ctor1`,
///   `$ctor2`, ...
/// * A struct is mutable if it has an instance field that isn't read-only.
#[derive(Debug, Clone)]
pub struct ConventionalMetadata<'a> {
    program: &'a Program,
    types: IndexMap<TypeDefId, TypeSemantics>,
    methods: IndexMap<MethodId, MethodSemantics>,
    constructors: IndexMap<MethodId, ConstructorSemantics>,
    properties: IndexMap<PropertyId, PropertySemantics>,
    fields: IndexMap<FieldId, FieldSemantics>,
    events: IndexMap<EventId, EventSemantics>,
    delegates: IndexMap<TypeDefId, DelegateSemantics>,
}

pub fn camel_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl<'a> ConventionalMetadata<'a> {
    pub fn new(program: &'a Program) -> Self {
        ConventionalMetadata {
            program,
            types: Default::default(),
            methods: Default::default(),
            constructors: Default::default(),
            properties: Default::default(),
            fields: Default::default(),
            events: Default::default(),
            delegates: Default::default(),
        }
    }

    pub fn set_type(&mut self, id: TypeDefId, semantics: TypeSemantics) { self.types.insert(id, semantics); }
    pub fn set_method(&mut self, id: MethodId, semantics: MethodSemantics) { self.methods.insert(id, semantics); }
    pub fn set_constructor(&mut self, id: MethodId, semantics: ConstructorSemantics) { self.constructors.insert(id, semantics); }
    pub fn set_property(&mut self, id: PropertyId, semantics: PropertySemantics) { self.properties.insert(id, semantics); }
    pub fn set_field(&mut self, id: FieldId, semantics: FieldSemantics) { self.fields.insert(id, semantics); }
    pub fn set_event(&mut self, id: EventId, semantics: EventSemantics) { self.events.insert(id, semantics); }
    pub fn set_delegate(&mut self, id: TypeDefId, semantics: DelegateSemantics) { self.delegates.insert(id, semantics); }

    fn default_type_semantics(&self, id: TypeDefId) -> TypeSemantics {
        let def = self.program.type_def(id);
        let is_mutable_value_type = def.kind == TypeKind::Struct && {
            self.program.fields_of(id).any(|(_, field)| !field.is_static && !field.is_readonly)
        };
        TypeSemantics::Normal { name: def.name.clone(), ignore_generic_arguments: false, is_mutable_value_type }
    }

    fn default_method_semantics(&self, id: MethodId) -> MethodSemantics {
        let method = self.program.method(id);
        let name = match method.kind {
            MethodKind::PropertyGetter | MethodKind::PropertySetter
            | MethodKind::EventAdder | MethodKind::EventRemover => {
                // accessors are declared as e.g. get_Name
                match method.name.split_once('_') {
                    Some((prefix, member)) => format!("{}_{}", prefix, camel_case(member)),
                    None => camel_case(&method.name),
                }
            },
            _ => camel_case(&method.name),
        };
        MethodSemantics::normal(&name)
    }

    fn default_constructor_semantics(&self, id: MethodId) -> ConstructorSemantics {
        let declaring = self.program.method(id).declaring;
        let index = self.program.constructors_of(declaring).position(|(ctor, _)| ctor == id);
        match index {
            Some(0) | None => ConstructorSemantics::Unnamed { expand_params: false },
            Some(n) => ConstructorSemantics::Named { name: format!("$ctor{}", n), expand_params: false },
        }
    }

    fn default_property_semantics(&self, id: PropertyId) -> PropertySemantics {
        let property = self.program.property(id);
        if property.is_auto && !property.is_indexer() {
            return PropertySemantics::Field { name: camel_case(&property.name) };
        }
        PropertySemantics::GetAndSetMethods {
            getter: property.getter.map(|m| self.method_semantics(m)),
            setter: property.setter.map(|m| self.method_semantics(m)),
        }
    }

    fn default_field_semantics(&self, id: FieldId) -> FieldSemantics {
        let field = self.program.field(id);
        match &field.constant {
            Some(value) => FieldSemantics::Constant { value: value.clone() },
            None => FieldSemantics::Field { name: camel_case(&field.name) },
        }
    }

    fn default_event_semantics(&self, id: EventId) -> EventSemantics {
        let event = self.program.event(id);
        EventSemantics::AddAndRemoveMethods {
            adder: self.method_semantics(event.adder),
            remover: self.method_semantics(event.remover),
        }
    }
}

impl MetadataImporter for ConventionalMetadata<'_> {
    fn type_semantics(&self, ty: TypeDefId) -> TypeSemantics {
        self.types.get(&ty).cloned().unwrap_or_else(|| self.default_type_semantics(ty))
    }

    fn method_semantics(&self, method: MethodId) -> MethodSemantics {
        self.methods.get(&method).cloned().unwrap_or_else(|| self.default_method_semantics(method))
    }

    fn constructor_semantics(&self, ctor: MethodId) -> ConstructorSemantics {
        self.constructors.get(&ctor).cloned().unwrap_or_else(|| self.default_constructor_semantics(ctor))
    }

    fn property_semantics(&self, property: PropertyId) -> PropertySemantics {
        self.properties.get(&property).cloned().unwrap_or_else(|| self.default_property_semantics(property))
    }

    fn field_semantics(&self, field: FieldId) -> FieldSemantics {
        self.fields.get(&field).cloned().unwrap_or_else(|| self.default_field_semantics(field))
    }

    fn event_semantics(&self, event: EventId) -> EventSemantics {
        self.events.get(&event).cloned().unwrap_or_else(|| self.default_event_semantics(event))
    }

    fn delegate_semantics(&self, delegate: TypeDefId) -> DelegateSemantics {
        self.delegates.get(&delegate).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParamDef, ProgramBuilder};

    #[test]
    fn conventions() {
        let mut b = ProgramBuilder::new();
        let point = b.struct_("Geometry.Point");
        let x = b.field(point, "X", Type::INT);
        let ctor_a = b.constructor(point, vec![]);
        let ctor_b = b.constructor(point, vec![ParamDef::new("x", Type::INT)]);
        let name = b.property(point, "Name", Type::STRING);
        let auto = b.auto_property(point, "Tag", Type::STRING);
        let frozen = b.struct_("Frozen");
        b.readonly_field(frozen, "Value", Type::INT);
        let program = b.finish();

        let metadata = ConventionalMetadata::new(&program);
        assert_eq!(metadata.field_semantics(x), FieldSemantics::Field { name: "x".to_owned() });
        assert_eq!(metadata.constructor_semantics(ctor_a), ConstructorSemantics::Unnamed { expand_params: false });
        assert_eq!(metadata.constructor_semantics(ctor_b), ConstructorSemantics::Named { name: "$ctor1".to_owned(), expand_params: false });
        assert_eq!(metadata.property_semantics(auto), PropertySemantics::Field { name: "tag".to_owned() });
        assert_eq!(metadata.property_semantics(name), PropertySemantics::GetAndSetMethods {
            getter: Some(MethodSemantics::normal("get_name")),
            setter: Some(MethodSemantics::normal("set_name")),
        });
        assert!(metadata.is_mutable_value_type(&Type::named(point)));
        assert!(metadata.is_mutable_value_type(&Type::nullable(Type::named(point))));
        assert!(!metadata.is_mutable_value_type(&Type::named(frozen)));
    }

    #[test]
    fn overrides_win() {
        let mut b = ProgramBuilder::new();
        let list = b.class("List");
        let add = b.method(list, "Add", vec![ParamDef::new("item", Type::OBJECT)], Type::Void);
        let program = b.finish();

        let mut metadata = ConventionalMetadata::new(&program);
        assert_eq!(metadata.method_semantics(add), MethodSemantics::normal("add"));
        metadata.set_method(add, MethodSemantics::inline_code("{this}.push({item})"));
        assert_eq!(metadata.method_semantics(add), MethodSemantics::inline_code("{this}.push({item})"));
    }
}
