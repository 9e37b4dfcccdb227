//! The fully resolved source program, as handed to the lowering core.
//!
//! Everything here has already been through name resolution, overload resolution and type
//! checking.  The core only reads it.

pub use types::{Primitive, IntRange, GenericOwner, TypeParamDef, Type, TypeKind, TypeDef, AnonymousTypeDef};
mod types;

pub use members::{MethodKind, RefKind, ParamDef, MethodDef, FieldDef, PropertyDef, EventDef, LocalDef};
mod members;

pub use expr::*;
mod expr;

pub use build::ProgramBuilder;
pub mod build;

macro_rules! define_ids {
    ($( $(#[$attr:meta])* $Id:ident, )*) => {$(
        $(#[$attr])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $Id(pub u32);

        impl $Id {
            fn index(self) -> usize { self.0 as usize }
        }
    )*};
}

define_ids! {
    TypeDefId,
    MethodId,
    FieldId,
    PropertyId,
    EventId,
    /// A local variable, parameter or range variable.
    LocalId,
}

/// Tables of every symbol an expression can refer to.
///
/// Ids are only meaningful for the `Program` that created them.
#[derive(Debug, Clone, Default)]
pub struct Program {
    types: Vec<TypeDef>,
    methods: Vec<MethodDef>,
    fields: Vec<FieldDef>,
    properties: Vec<PropertyDef>,
    events: Vec<EventDef>,
    locals: Vec<LocalDef>,
    anonymous_types: Vec<AnonymousTypeDef>,
}

impl Program {
    pub fn type_def(&self, id: TypeDefId) -> &TypeDef { &self.types[id.index()] }
    pub fn method(&self, id: MethodId) -> &MethodDef { &self.methods[id.index()] }
    pub fn field(&self, id: FieldId) -> &FieldDef { &self.fields[id.index()] }
    pub fn property(&self, id: PropertyId) -> &PropertyDef { &self.properties[id.index()] }
    pub fn event(&self, id: EventId) -> &EventDef { &self.events[id.index()] }
    pub fn local(&self, id: LocalId) -> &LocalDef { &self.locals[id.index()] }
    pub fn anonymous_type(&self, index: u32) -> &AnonymousTypeDef { &self.anonymous_types[index as usize] }

    pub fn type_param(&self, owner: GenericOwner, index: u32) -> Option<&TypeParamDef> {
        let params = match owner {
            GenericOwner::Type(id) => &self.type_def(id).type_params,
            GenericOwner::Method(id) => &self.method(id).type_params,
        };
        params.get(index as usize)
    }

    /// All fields declared directly on a type, in declaration order.
    pub fn fields_of(&self, ty: TypeDefId) -> impl Iterator<Item=(FieldId, &FieldDef)> + '_ {
        self.fields.iter().enumerate()
            .filter(move |(_, f)| f.declaring == ty)
            .map(|(i, f)| (FieldId(i as u32), f))
    }

    /// All constructors declared on a type, in declaration order.
    pub fn constructors_of(&self, ty: TypeDefId) -> impl Iterator<Item=(MethodId, &MethodDef)> + '_ {
        self.methods.iter().enumerate()
            .filter(move |(_, m)| m.declaring == ty && m.kind == MethodKind::Constructor)
            .map(|(i, m)| (MethodId(i as u32), m))
    }

    /// Look up a type by its fully qualified name.
    pub fn find_type(&self, name: &str) -> Option<TypeDefId> {
        self.types.iter().position(|t| t.name == name).map(|i| TypeDefId(i as u32))
    }

    pub fn find_property(&self, ty: TypeDefId, name: &str) -> Option<PropertyId> {
        self.properties.iter()
            .position(|p| p.declaring == ty && p.name == name)
            .map(|i| PropertyId(i as u32))
    }

    pub fn find_field(&self, ty: TypeDefId, name: &str) -> Option<FieldId> {
        self.fields.iter()
            .position(|f| f.declaring == ty && f.name == name)
            .map(|i| FieldId(i as u32))
    }

    /// Parameter and return types of the `Invoke` method of a delegate type.
    pub fn delegate_signature(&self, ty: &Type) -> Option<&MethodDef> {
        let def = ty.delegate_def(self)?;
        match self.type_def(def).kind {
            TypeKind::Delegate { invoke } => Some(self.method(invoke)),
            _ => None,
        }
    }

    /// Walks the base class chain, starting with `ty` itself.
    pub fn is_subclass_of(&self, ty: TypeDefId, base: TypeDefId) -> bool {
        let mut current = Some(ty);
        while let Some(id) = current {
            if id == base {
                return true;
            }
            current = match &self.type_def(id).base {
                Some(Type::Named { def, .. }) => Some(*def),
                _ => None,
            };
        }
        false
    }

    /// The user-facing name of a method, like `List.Add`.
    pub fn method_display(&self, id: MethodId) -> String {
        let method = self.method(id);
        format!("{}.{}", self.type_def(method.declaring).name, method.name)
    }
}
