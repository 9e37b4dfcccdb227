use super::{Constant, Type, TypeDefId, TypeParamDef};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MethodKind {
    Ordinary,
    Constructor,
    StaticConstructor,
    /// A user-defined operator or conversion.
    Operator,
    PropertyGetter,
    PropertySetter,
    EventAdder,
    EventRemover,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RefKind {
    None,
    Ref,
    Out,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    pub name: String,
    pub ty: Type,
    pub ref_kind: RefKind,
    /// Trailing `params T[]` parameter.
    pub is_params: bool,
    /// Compile-time default value of an optional parameter.
    pub default: Option<Constant>,
}

impl ParamDef {
    pub fn new(name: &str, ty: Type) -> Self {
        ParamDef { name: name.to_owned(), ty, ref_kind: RefKind::None, is_params: false, default: None }
    }
    pub fn is_by_ref(&self) -> bool { self.ref_kind != RefKind::None }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub name: String,
    pub declaring: TypeDefId,
    pub kind: MethodKind,
    pub is_static: bool,
    /// `virtual`, `abstract` or `override`, and not `sealed`.
    pub is_overridable: bool,
    /// Declared with `this` on its first parameter.
    pub is_extension: bool,
    pub params: Vec<ParamDef>,
    pub return_type: Type,
    pub type_params: Vec<TypeParamDef>,
}

impl MethodDef {
    pub fn params_index(&self) -> Option<usize> {
        self.params.iter().position(|p| p.is_params)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub declaring: TypeDefId,
    pub ty: Type,
    pub is_static: bool,
    /// `const` field, with its value.
    pub constant: Option<Constant>,
    pub is_readonly: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    pub name: String,
    pub declaring: TypeDefId,
    pub ty: Type,
    pub is_static: bool,
    pub getter: Option<super::MethodId>,
    pub setter: Option<super::MethodId>,
    /// Non-empty for indexers.
    pub params: Vec<ParamDef>,
    /// Compiler-implemented `{ get; set; }`.
    pub is_auto: bool,
}

impl PropertyDef {
    pub fn is_indexer(&self) -> bool { !self.params.is_empty() }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventDef {
    pub name: String,
    pub declaring: TypeDefId,
    pub ty: Type,
    pub is_static: bool,
    pub adder: super::MethodId,
    pub remover: super::MethodId,
}

/// A local variable, parameter or range variable.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDef {
    pub name: String,
    pub ty: Type,
    /// `ref` or `out` parameter.
    pub is_ref_param: bool,
}
