//! Operations the target language has no primitive for.
//!
//! The lowering core emits every such operation through a [`RuntimeLibrary`], which turns it
//! into JavaScript (usually a call into a support library).  [`ReferenceRuntime`] is the
//! implementation shipped with the crate; its `$rt` namespace is implemented by
//! [`crate::vm::JsVm`] for testing.

use crate::error::InternalError;
use crate::js::JsExpr;
use crate::metadata::MetadataImporter;
use crate::model::{GenericOwner, MethodRef, Primitive, Program, Type};

pub use reference::ReferenceRuntime;
mod reference;

/// What a [`RuntimeLibrary`] may ask of the compiler that is using it.
pub trait RuntimeContext {
    fn program(&self) -> &Program;
    fn metadata(&self) -> &dyn MetadataImporter;

    /// JavaScript expression for the runtime value of a type parameter in scope.
    fn resolve_type_parameter(&mut self, owner: GenericOwner, index: u32) -> Result<JsExpr, InternalError>;

    /// Make an expression safe to evaluate several times, by storing it in a temporary if
    /// necessary.  The declaration of the temporary is emitted by the compiler.
    fn ensure_can_be_evaluated_multiple_times(&mut self, expr: JsExpr) -> JsExpr;
}

/// Every operation in here returns JavaScript that evaluates each of its input expressions
/// exactly once, in the order given, unless documented otherwise.
pub trait RuntimeLibrary {
    /// The runtime type object for a type.
    fn instantiate_type(&self, ty: &Type, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;

    /// `expr is T`
    fn type_is(&self, expr: JsExpr, from: &Type, to: &Type, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    /// `expr as T`
    fn try_downcast(&self, expr: JsExpr, from: &Type, to: &Type, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    /// `(T)expr` for a reference conversion that can fail.
    fn downcast(&self, expr: JsExpr, from: &Type, to: &Type, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    /// A reference conversion that is statically known to succeed.
    fn upcast(&self, expr: JsExpr, from: &Type, to: &Type, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;

    /// `default(T)`
    fn default_value(&self, ty: &Type, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;

    fn reference_equals(&self, a: JsExpr, b: JsExpr, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    fn reference_not_equals(&self, a: JsExpr, b: JsExpr, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;

    /// Given a generic method, produce the function for one instantiation of it.
    fn instantiate_generic_method(&self, method: JsExpr, type_args: &[Type], ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;

    /// Truncating division of integers, throwing on division by zero.
    fn integer_division(&self, a: JsExpr, b: JsExpr, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    /// Wrapping product of two 32-bit integers.  A product of doubles loses its low bits once
    /// it exceeds 2^53, so this can't be a clipped `*`.
    fn integer_multiply(&self, a: JsExpr, b: JsExpr, ty: Primitive, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    /// Truncation of a float towards zero.
    fn float_to_int(&self, expr: JsExpr, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    /// Bring an integer into the range of a primitive type, either by wrapping around or, when
    /// `checked`, by throwing if it is out of range.
    fn clip_integer(&self, expr: JsExpr, ty: Primitive, checked: bool, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;

    /// `a ?? b` where `b` has no side effects.
    fn coalesce(&self, a: JsExpr, b: JsExpr, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    /// Whether a nullable has a value.
    fn is_value(&self, expr: JsExpr, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    /// Unwrap a nullable, throwing if it has no value.
    fn from_nullable(&self, expr: JsExpr, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    /// Lift an operator or a call of a static function so that it produces `null` if any
    /// operand is `null`.  Comparisons instead produce `false`, except that `==` treats two
    /// `null`s as equal.
    fn lift(&self, expr: JsExpr, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    /// Three-valued `&` on `bool?`.
    fn lifted_boolean_and(&self, a: JsExpr, b: JsExpr, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    /// Three-valued `|` on `bool?`.
    fn lifted_boolean_or(&self, a: JsExpr, b: JsExpr, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;

    /// Call a method of the base class without virtual dispatch.  `args` starts with `this`.
    fn call_base(&self, method: &MethodRef, args: Vec<JsExpr>, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    /// Bind `this` for a function.
    fn bind(&self, function: JsExpr, target: JsExpr, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    /// Make a function that receives the JavaScript `this` as its first parameter.
    fn bind_first_parameter_to_this(&self, function: JsExpr, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    fn combine_delegates(&self, a: JsExpr, b: JsExpr, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    fn remove_delegate(&self, a: JsExpr, b: JsExpr, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;

    /// An array with one dimension per size, filled with `default(elem)`.
    fn create_array(&self, elem: &Type, sizes: Vec<JsExpr>, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    fn get_multidim_array_value(&self, array: JsExpr, indices: Vec<JsExpr>, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    /// Evaluates to `value`.
    fn set_multidim_array_value(&self, array: JsExpr, indices: Vec<JsExpr>, value: JsExpr, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;

    /// Copy of a mutable value type.  `null` stays `null`.
    fn clone_value_type(&self, expr: JsExpr, ty: &Type, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    /// An instance of an anonymous type or query carrier.
    fn construct_anonymous_object(&self, members: Vec<(String, JsExpr)>, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    /// `new ctor(...args)` where `args` is an array.
    fn apply_constructor(&self, ctor: JsExpr, args: JsExpr, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
    /// Overwrite every field of `target` with the one from `source`, evaluating to `target`.
    fn shallow_copy(&self, source: JsExpr, target: JsExpr, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError>;
}
