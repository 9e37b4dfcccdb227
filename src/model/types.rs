use enum_map::{Enum, EnumMap, enum_map};
use lazy_static::lazy_static;

use super::{MethodId, Program, TypeDefId};

string_enum! {
    /// Built-in types of the source language.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Enum)]
    pub enum Primitive {
        #[strum(serialize = "bool")] Boolean,
        #[strum(serialize = "char")] Char,
        #[strum(serialize = "sbyte")] SByte,
        #[strum(serialize = "byte")] Byte,
        #[strum(serialize = "short")] Int16,
        #[strum(serialize = "ushort")] UInt16,
        #[strum(serialize = "int")] Int32,
        #[strum(serialize = "uint")] UInt32,
        #[strum(serialize = "long")] Int64,
        #[strum(serialize = "ulong")] UInt64,
        #[strum(serialize = "float")] Single,
        #[strum(serialize = "double")] Double,
        #[strum(serialize = "decimal")] Decimal,
        #[strum(serialize = "string")] String,
        #[strum(serialize = "object")] Object,
    }
}

/// Range of an integral type.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IntRange {
    pub min: f64,
    pub max: f64,
    pub signed: bool,
    pub bits: u32,
}

lazy_static! {
    static ref INT_RANGES: EnumMap<Primitive, Option<IntRange>> = {
        let signed = |bits: u32| Some(IntRange {
            min: -(2f64.powi(bits as i32 - 1)), max: 2f64.powi(bits as i32 - 1) - 1.0, signed: true, bits,
        });
        let unsigned = |bits: u32| Some(IntRange {
            min: 0.0, max: 2f64.powi(bits as i32) - 1.0, signed: false, bits,
        });
        enum_map! {
            Primitive::Char => unsigned(16),
            Primitive::SByte => signed(8),
            Primitive::Byte => unsigned(8),
            Primitive::Int16 => signed(16),
            Primitive::UInt16 => unsigned(16),
            Primitive::Int32 => signed(32),
            Primitive::UInt32 => unsigned(32),
            Primitive::Int64 => signed(64),
            Primitive::UInt64 => unsigned(64),
            _ => None,
        }
    };
}

impl Primitive {
    pub fn int_range(self) -> Option<IntRange> { INT_RANGES[self] }
    pub fn is_integral(self) -> bool { self.int_range().is_some() }
    pub fn is_floating(self) -> bool { matches!(self, Primitive::Single | Primitive::Double | Primitive::Decimal) }
    pub fn is_numeric(self) -> bool { self.is_integral() || self.is_floating() }
    pub fn is_value_type(self) -> bool { !matches!(self, Primitive::String | Primitive::Object) }

    /// Whether every value of `self` is also a value of `other`.
    pub fn fits_in(self, other: Primitive) -> bool {
        match (self.int_range(), other.int_range()) {
            (Some(a), Some(b)) => a.min >= b.min && a.max <= b.max,
            (Some(_), None) => other.is_floating(),
            (None, _) => self == other || (self.is_floating() && other.is_floating()),
        }
    }
}

/// Who declares a generic parameter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GenericOwner {
    Type(TypeDefId),
    Method(MethodId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeParamDef {
    pub name: String,
    /// Types that every argument for this parameter is known to convert to by reference.
    pub constraints: Vec<Type>,
    /// `where T: class`
    pub is_reference_type: bool,
}

impl TypeParamDef {
    pub fn new(name: &str) -> Self {
        TypeParamDef { name: name.to_owned(), constraints: vec![], is_reference_type: false }
    }
}

/// A fully resolved source type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Primitive(Primitive),
    Dynamic,
    /// The type of the `null` literal.
    Null,
    Nullable(Box<Type>),
    Array { elem: Box<Type>, rank: u32 },
    Named { def: TypeDefId, args: Vec<Type> },
    TypeParam { owner: GenericOwner, index: u32 },
    /// Type of an anonymous object expression, by index into [`Program::anonymous_types`].
    Anonymous(u32),
}

impl Type {
    pub const BOOL: Type = Type::Primitive(Primitive::Boolean);
    pub const INT: Type = Type::Primitive(Primitive::Int32);
    pub const DOUBLE: Type = Type::Primitive(Primitive::Double);
    pub const STRING: Type = Type::Primitive(Primitive::String);
    pub const OBJECT: Type = Type::Primitive(Primitive::Object);

    pub fn named(def: TypeDefId) -> Type { Type::Named { def, args: vec![] } }
    pub fn nullable(inner: Type) -> Type { Type::Nullable(Box::new(inner)) }
    pub fn array(elem: Type, rank: u32) -> Type { Type::Array { elem: Box::new(elem), rank } }

    pub fn is_nullable(&self) -> bool { matches!(self, Type::Nullable(_)) }

    /// Strips one level of `Nullable`.
    pub fn unwrap_nullable(&self) -> &Type {
        match self {
            Type::Nullable(inner) => inner,
            _ => self,
        }
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self {
            Type::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    /// The primitive an arithmetic operator on this type works with, seeing through
    /// nullables and enums.
    pub fn numeric_primitive(&self, program: &Program) -> Option<Primitive> {
        match self.unwrap_nullable() {
            Type::Primitive(p) if p.is_numeric() || *p == Primitive::Char => Some(*p),
            Type::Named { def, .. } => match program.type_def(*def).kind {
                TypeKind::Enum { underlying } => Some(underlying),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_enum(&self, program: &Program) -> bool {
        match self.unwrap_nullable() {
            Type::Named { def, .. } => matches!(program.type_def(*def).kind, TypeKind::Enum { .. }),
            _ => false,
        }
    }

    pub fn is_delegate(&self, program: &Program) -> bool {
        self.delegate_def(program).is_some()
    }

    pub fn delegate_def(&self, program: &Program) -> Option<TypeDefId> {
        match self {
            Type::Named { def, .. } => match program.type_def(*def).kind {
                TypeKind::Delegate { .. } => Some(*def),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_string(&self) -> bool { *self == Type::STRING }

    /// True for structs, enums and non-reference primitives, but not for nullables.
    pub fn is_value_type(&self, program: &Program) -> bool {
        match self {
            Type::Primitive(p) => p.is_value_type(),
            Type::Named { def, .. } => matches!(program.type_def(*def).kind, TypeKind::Struct | TypeKind::Enum { .. }),
            _ => false,
        }
    }

    pub fn is_struct(&self, program: &Program) -> bool {
        match self {
            Type::Named { def, .. } => program.type_def(*def).kind == TypeKind::Struct,
            _ => false,
        }
    }

    pub fn is_interface(&self, program: &Program) -> bool {
        match self {
            Type::Named { def, .. } => program.type_def(*def).kind == TypeKind::Interface,
            _ => false,
        }
    }

    /// Types whose `==` must compare by reference at runtime, because a value of any type could
    /// be behind them.
    pub fn needs_reference_equality(&self, program: &Program) -> bool {
        matches!(self, Type::Dynamic | Type::Primitive(Primitive::Object) | Type::TypeParam { .. })
            || self.is_interface(program)
    }

    /// Replace type parameters with the arguments of an instantiation.
    pub fn substitute(&self, type_args: &[Type], method_args: &[Type]) -> Type {
        match self {
            Type::TypeParam { owner: GenericOwner::Type(_), index } => {
                type_args.get(*index as usize).cloned().unwrap_or_else(|| self.clone())
            },
            Type::TypeParam { owner: GenericOwner::Method(_), index } => {
                method_args.get(*index as usize).cloned().unwrap_or_else(|| self.clone())
            },
            Type::Nullable(inner) => Type::nullable(inner.substitute(type_args, method_args)),
            Type::Array { elem, rank } => Type::array(elem.substitute(type_args, method_args), *rank),
            Type::Named { def, args } => Type::Named {
                def: *def,
                args: args.iter().map(|a| a.substitute(type_args, method_args)).collect(),
            },
            _ => self.clone(),
        }
    }

    /// Human-readable name for use in diagnostics.
    pub fn display(&self, program: &Program) -> String {
        match self {
            Type::Void => "void".to_owned(),
            Type::Primitive(p) => p.to_string(),
            Type::Dynamic => "dynamic".to_owned(),
            Type::Null => "<null>".to_owned(),
            Type::Nullable(inner) => format!("{}?", inner.display(program)),
            Type::Array { elem, rank } => {
                format!("{}[{}]", elem.display(program), ",".repeat(*rank as usize - 1))
            },
            Type::Named { def, args } => {
                let name = &program.type_def(*def).name;
                match args.len() {
                    0 => name.clone(),
                    _ => {
                        let args = args.iter().map(|a| a.display(program)).collect::<Vec<_>>();
                        format!("{}<{}>", name, args.join(", "))
                    },
                }
            },
            Type::TypeParam { owner, index } => program.type_param(*owner, *index)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| format!("<T{}>", index)),
            Type::Anonymous(index) => format!("<anonymous type #{}>", index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Struct,
    Interface,
    Enum { underlying: Primitive },
    Delegate { invoke: MethodId },
}

/// A class, struct, interface, enum or delegate declared somewhere in the program.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    /// Fully qualified name, with `.` separating namespaces.
    pub name: String,
    pub kind: TypeKind,
    pub base: Option<Type>,
    pub interfaces: Vec<Type>,
    pub type_params: Vec<TypeParamDef>,
}

/// Members of an anonymous object type, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct AnonymousTypeDef {
    pub members: Vec<(String, Type)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_ranges() {
        assert!(Primitive::Byte.fits_in(Primitive::Int32));
        assert!(Primitive::Int32.fits_in(Primitive::Double));
        assert!(!Primitive::Int32.fits_in(Primitive::UInt32));
        assert!(!Primitive::Double.fits_in(Primitive::Int64));
        assert_eq!(Primitive::SByte.int_range().unwrap().min, -128.0);
        assert_eq!(Primitive::UInt16.int_range().unwrap().max, 65535.0);
        assert_eq!(Primitive::Int32.to_string(), "int");
        assert_eq!("ulong".parse::<Primitive>().unwrap(), Primitive::UInt64);
    }
}
