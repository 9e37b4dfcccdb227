use enum_map::{EnumMap, enum_map};
use lazy_static::lazy_static;

use crate::error::InternalError;
use crate::js::{BinaryOp, JsExpr, UnaryOp};
use crate::metadata::TypeSemantics;
use crate::model::{MethodRef, Primitive, Type, TypeKind};
use crate::options::CompileOptions;

use super::{RuntimeContext, RuntimeLibrary};

/// Where the type object of a primitive lives.
#[derive(Debug, Copy, Clone)]
enum PrimitiveTypeObject {
    /// A JavaScript global.
    Global(&'static str),
    /// A member of the runtime namespace.
    Runtime(&'static str),
}

lazy_static! {
    static ref PRIMITIVE_TYPE_OBJECTS: EnumMap<Primitive, PrimitiveTypeObject> = {
        use PrimitiveTypeObject::{Global, Runtime};
        enum_map! {
            Primitive::Boolean => Global("Boolean"),
            Primitive::Char => Runtime("Char"),
            Primitive::SByte => Runtime("SByte"),
            Primitive::Byte => Runtime("Byte"),
            Primitive::Int16 => Runtime("Int16"),
            Primitive::UInt16 => Runtime("UInt16"),
            Primitive::Int32 => Runtime("Int32"),
            Primitive::UInt32 => Runtime("UInt32"),
            Primitive::Int64 => Runtime("Int64"),
            Primitive::UInt64 => Runtime("UInt64"),
            Primitive::Single => Runtime("Single"),
            Primitive::Double => Global("Number"),
            Primitive::Decimal => Runtime("Decimal"),
            Primitive::String => Global("String"),
            Primitive::Object => Global("Object"),
        }
    };
}

/// Name of the `$rt.Nullable` function implementing a lifted operator.
fn lifted_binary_name(op: BinaryOp) -> Option<&'static str> {
    use BinaryOp as B;
    Some(match op {
        B::Add => "add",
        B::Sub => "sub",
        B::Mul => "mul",
        B::Div => "div",
        B::Rem => "mod",
        B::Shl => "shl",
        B::Shr => "srs",
        B::UShr => "sru",
        B::BitAnd => "band",
        B::BitOr => "bor",
        B::BitXor => "xor",
        B::StrictEq => "eq",
        B::StrictNe => "ne",
        B::Lt => "lt",
        B::Le => "le",
        B::Gt => "gt",
        B::Ge => "ge",
        _ => return None,
    })
}

fn lifted_unary_name(op: UnaryOp) -> Option<&'static str> {
    Some(match op {
        UnaryOp::Neg => "neg",
        UnaryOp::Plus => "pos",
        UnaryOp::Not => "not",
        UnaryOp::BitNot => "cpl",
        _ => return None,
    })
}

/// A [`RuntimeLibrary`] that calls into a support library reached through a single namespace
/// object (`$rt` by default).
#[derive(Debug, Clone)]
pub struct ReferenceRuntime {
    namespace: String,
}

impl ReferenceRuntime {
    pub fn new(options: &CompileOptions) -> Self {
        ReferenceRuntime { namespace: options.runtime_namespace.clone() }
    }

    fn rt(&self, name: &str) -> JsExpr {
        JsExpr::ident(self.namespace.clone()).member(name)
    }

    fn rt_call(&self, name: &str, args: Vec<JsExpr>) -> JsExpr {
        self.rt(name).call(args)
    }

    fn nullable_call(&self, name: &str, args: Vec<JsExpr>) -> JsExpr {
        self.rt("Nullable").member(name).call(args)
    }

    fn type_args(&self, args: &[Type], ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        let args = args.iter().map(|arg| self.instantiate_type(arg, ctx)).collect::<Result<_, _>>()?;
        Ok(JsExpr::Array(args))
    }
}

impl RuntimeLibrary for ReferenceRuntime {
    fn instantiate_type(&self, ty: &Type, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        match ty {
            Type::Primitive(prim) => Ok(match PRIMITIVE_TYPE_OBJECTS[*prim] {
                PrimitiveTypeObject::Global(name) => JsExpr::ident(name),
                PrimitiveTypeObject::Runtime(name) => self.rt(name),
            }),
            Type::Nullable(inner) => {
                let inner = self.instantiate_type(inner, ctx)?;
                Ok(self.rt_call("makeGenericType", vec![self.rt("Nullable"), JsExpr::Array(vec![inner])]))
            },
            Type::Array { .. } => Ok(JsExpr::ident("Array")),
            Type::Dynamic | Type::Anonymous(_) => Ok(JsExpr::ident("Object")),
            Type::TypeParam { owner, index } => ctx.resolve_type_parameter(*owner, *index),
            Type::Named { def, args } => {
                let program = ctx.program();
                if let TypeKind::Delegate { .. } = program.type_def(*def).kind {
                    return Ok(JsExpr::ident("Function"));
                }
                match ctx.metadata().type_semantics(*def) {
                    TypeSemantics::Normal { name, ignore_generic_arguments, .. } => {
                        let type_object = JsExpr::path(&name);
                        if args.is_empty() || ignore_generic_arguments {
                            Ok(type_object)
                        } else {
                            let args = self.type_args(args, ctx)?;
                            Ok(self.rt_call("makeGenericType", vec![type_object, args]))
                        }
                    },
                    TypeSemantics::NotUsableFromScript => Err(InternalError::Other(format!(
                        "type '{}' is not usable from script", ty.display(ctx.program()),
                    ))),
                }
            },
            Type::Void | Type::Null => Err(InternalError::Other(format!(
                "type '{}' has no runtime representation", ty.display(ctx.program()),
            ))),
        }
    }

    fn type_is(&self, expr: JsExpr, _from: &Type, to: &Type, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        let to = self.instantiate_type(to.unwrap_nullable(), ctx)?;
        Ok(self.rt_call("isInstanceOfType", vec![expr, to]))
    }

    fn try_downcast(&self, expr: JsExpr, _from: &Type, to: &Type, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        let to = self.instantiate_type(to.unwrap_nullable(), ctx)?;
        Ok(self.rt_call("safeCast", vec![expr, to]))
    }

    fn downcast(&self, expr: JsExpr, _from: &Type, to: &Type, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        let to = self.instantiate_type(to.unwrap_nullable(), ctx)?;
        Ok(self.rt_call("cast", vec![expr, to]))
    }

    fn upcast(&self, expr: JsExpr, _from: &Type, _to: &Type, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        Ok(expr)
    }

    fn default_value(&self, ty: &Type, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        match ty {
            Type::Primitive(Primitive::Boolean) => Ok(JsExpr::Bool(false)),
            Type::Primitive(prim) if prim.is_numeric() || *prim == Primitive::Char => Ok(JsExpr::Number(0.0)),
            Type::Named { def, .. } => match ctx.program().type_def(*def).kind {
                TypeKind::Enum { .. } => Ok(JsExpr::Number(0.0)),
                TypeKind::Struct => {
                    let type_object = self.instantiate_type(ty, ctx)?;
                    Ok(self.rt_call("getDefaultValue", vec![type_object]))
                },
                _ => Ok(JsExpr::Null),
            },
            Type::TypeParam { owner, index } => {
                if ctx.program().type_param(*owner, *index).map_or(false, |p| p.is_reference_type) {
                    return Ok(JsExpr::Null);
                }
                let type_object = self.instantiate_type(ty, ctx)?;
                Ok(self.rt_call("getDefaultValue", vec![type_object]))
            },
            _ => Ok(JsExpr::Null),
        }
    }

    fn reference_equals(&self, a: JsExpr, b: JsExpr, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        Ok(self.rt_call("referenceEquals", vec![a, b]))
    }

    fn reference_not_equals(&self, a: JsExpr, b: JsExpr, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        let equals = self.reference_equals(a, b, ctx)?;
        Ok(JsExpr::unary(UnaryOp::Not, equals))
    }

    fn instantiate_generic_method(&self, method: JsExpr, type_args: &[Type], ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        let type_args = self.type_args(type_args, ctx)?;
        Ok(self.rt_call("makeGenericMethod", vec![method, type_args]))
    }

    fn integer_division(&self, a: JsExpr, b: JsExpr, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        Ok(self.rt_call("idiv", vec![a, b]))
    }

    fn integer_multiply(&self, a: JsExpr, b: JsExpr, ty: Primitive, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        match ty {
            Primitive::Int32 | Primitive::UInt32 => Ok(self.rt_call("imul", vec![a, b, JsExpr::string(ty.to_string())])),
            _ => Err(InternalError::Other(format!("no exact multiplication for '{}'", ty))),
        }
    }

    fn float_to_int(&self, expr: JsExpr, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        Ok(self.rt_call("trunc", vec![expr]))
    }

    fn clip_integer(&self, expr: JsExpr, ty: Primitive, checked: bool, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        if !ty.is_integral() {
            return Err(InternalError::Other(format!("cannot clip to non-integral type '{}'", ty)));
        }
        let func = if checked { "check" } else { "clip" };
        Ok(self.rt_call(func, vec![expr, JsExpr::string(ty.to_string())]))
    }

    fn coalesce(&self, a: JsExpr, b: JsExpr, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        Ok(self.rt_call("coalesce", vec![a, b]))
    }

    fn is_value(&self, expr: JsExpr, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        Ok(self.rt_call("isValue", vec![expr]))
    }

    fn from_nullable(&self, expr: JsExpr, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        Ok(self.rt_call("unbox", vec![expr]))
    }

    fn lift(&self, expr: JsExpr, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        match expr {
            JsExpr::Binary { op, left, right } => match lifted_binary_name(op) {
                Some(name) => Ok(self.nullable_call(name, vec![*left, *right])),
                None => Err(InternalError::Other(format!("cannot lift operator '{}'", op))),
            },
            JsExpr::Unary { op, operand } => match lifted_unary_name(op) {
                Some(name) => Ok(self.nullable_call(name, vec![*operand])),
                None => Err(InternalError::Other(format!("cannot lift operator '{}'", op))),
            },
            JsExpr::Call { callee, mut args } => {
                args.insert(0, *callee);
                Ok(self.nullable_call("lift", args))
            },
            other => Err(InternalError::Other(format!("cannot lift expression {:?}", other))),
        }
    }

    fn lifted_boolean_and(&self, a: JsExpr, b: JsExpr, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        Ok(self.nullable_call("and", vec![a, b]))
    }

    fn lifted_boolean_or(&self, a: JsExpr, b: JsExpr, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        Ok(self.nullable_call("or", vec![a, b]))
    }

    fn call_base(&self, method: &MethodRef, args: Vec<JsExpr>, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        let def = ctx.program().method(method.method);
        let declaring = Type::Named { def: def.declaring, args: method.type_args.clone() };
        let name = match ctx.metadata().method_semantics(method.method).name() {
            Some(name) => name.to_owned(),
            None => return Err(InternalError::Other(format!(
                "cannot make a base call to '{}'", ctx.program().method_display(method.method),
            ))),
        };
        let type_object = self.instantiate_type(&declaring, ctx)?;
        let mut function = type_object.member("prototype").member(name);
        if !method.method_args.is_empty() {
            function = self.instantiate_generic_method(function, &method.method_args, ctx)?;
        }
        Ok(function.member("call").call(args))
    }

    fn bind(&self, function: JsExpr, target: JsExpr, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        Ok(self.rt_call("bind", vec![function, target]))
    }

    fn bind_first_parameter_to_this(&self, function: JsExpr, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        Ok(self.rt_call("thisFix", vec![function]))
    }

    fn combine_delegates(&self, a: JsExpr, b: JsExpr, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        Ok(self.rt_call("delegateCombine", vec![a, b]))
    }

    fn remove_delegate(&self, a: JsExpr, b: JsExpr, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        Ok(self.rt_call("delegateRemove", vec![a, b]))
    }

    fn create_array(&self, elem: &Type, sizes: Vec<JsExpr>, ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        let default = self.default_value(elem, ctx)?;
        let mut args = vec![default];
        match sizes.len() {
            1 => {
                args.insert(0, sizes.into_iter().next().unwrap_or(JsExpr::Number(0.0)));
                Ok(self.rt_call("arrayInit", args))
            },
            _ => {
                args.extend(sizes);
                Ok(self.rt_call("multidimArray", args))
            },
        }
    }

    fn get_multidim_array_value(&self, array: JsExpr, indices: Vec<JsExpr>, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        let mut args = vec![array];
        args.extend(indices);
        Ok(self.rt_call("arrayGet", args))
    }

    fn set_multidim_array_value(&self, array: JsExpr, indices: Vec<JsExpr>, value: JsExpr, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        let mut args = vec![array];
        args.extend(indices);
        args.push(value);
        Ok(self.rt_call("arraySet", args))
    }

    fn clone_value_type(&self, expr: JsExpr, _ty: &Type, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        Ok(self.rt_call("clone", vec![expr]))
    }

    fn construct_anonymous_object(&self, members: Vec<(String, JsExpr)>, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        Ok(JsExpr::Object(members))
    }

    fn apply_constructor(&self, ctor: JsExpr, args: JsExpr, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        Ok(self.rt_call("applyConstructor", vec![ctor, args]))
    }

    fn shallow_copy(&self, source: JsExpr, target: JsExpr, _ctx: &mut dyn RuntimeContext) -> Result<JsExpr, InternalError> {
        Ok(self.rt_call("shallowCopy", vec![source, target]))
    }
}
