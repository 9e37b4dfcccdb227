//! A small JavaScript interpreter that runs on the [`crate::js`] AST, which can be used to help
//! verify the behavior of lowered code in unit tests.
//!
//! It implements just enough of the language and of the reference runtime library (`$rt`) to run
//! the output of the lowering core.  Calls of functions registered with [`JsVm::define_logged`]
//! are recorded in [`JsVm::call_log`], which is how tests observe evaluation order.
//!
//! Like the real thing, it has no static checks.  Misuse of a value raises a [`Thrown`] error
//! just like a runtime exception would, but code that the lowering core can never produce (e.g.
//! reads of undeclared variables) panics.  Inline code text is parsed when it runs, and text that
//! doesn't parse throws a `SyntaxError`.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::js::{BinaryOp, JsExpr, JsStmt, UnaryOp};
use crate::model::Primitive;

/// Name under which the runtime library is installed.
pub const RUNTIME_NAMESPACE: &str = "$rt";

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjRef),
}

/// A shared reference to an object, array or function.
#[derive(Clone)]
pub struct ObjRef(Rc<RefCell<Object>>);

struct Object {
    props: IndexMap<String, Value>,
    proto: Option<ObjRef>,
    kind: ObjectKind,
}

enum ObjectKind {
    Plain,
    Array(Vec<Value>),
    MultiArray { dims: Vec<usize>, elements: Vec<Value> },
    Function(Function),
}

type NativeFn = fn(&mut JsVm, Value, Vec<Value>) -> VmResult<Value>;

#[derive(Clone)]
enum Function {
    Closure { params: Rc<Vec<String>>, body: Rc<Vec<JsStmt>>, scope: Scope },
    Native { name: &'static str, func: NativeFn },
    Bound { target: Value, this: Value },
    /// Passes `this` as the first argument.
    ThisFix(Value),
    /// A multicast delegate.
    Combined(Vec<Value>),
    Logged(String),
}

/// An exception that was not caught.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("uncaught {name}: {message}")]
pub struct Thrown {
    pub name: String,
    pub message: String,
}

impl Thrown {
    fn new(name: &str, message: impl Into<String>) -> Self {
        Thrown { name: name.to_owned(), message: message.into() }
    }

    fn type_error(message: impl Into<String>) -> Self { Thrown::new("TypeError", message) }
}

pub type VmResult<T> = Result<T, Thrown>;

#[derive(Debug, Clone, PartialEq)]
pub struct LoggedCall {
    pub name: String,
    pub args: Vec<Value>,
}

#[derive(Clone)]
struct Scope(Rc<RefCell<ScopeData>>);

struct ScopeData {
    vars: HashMap<String, Value>,
    parent: Option<Scope>,
}

impl Scope {
    fn new(parent: Option<Scope>) -> Self {
        Scope(Rc::new(RefCell::new(ScopeData { vars: HashMap::new(), parent })))
    }

    fn declare(&self, name: &str, value: Value) {
        self.0.borrow_mut().vars.insert(name.to_owned(), value);
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        let data = self.0.borrow();
        match data.vars.get(name) {
            Some(value) => Some(value.clone()),
            None => data.parent.as_ref().and_then(|parent| parent.lookup(name)),
        }
    }

    /// Assign an existing variable, returning false if there is none.
    fn assign(&self, name: &str, value: Value) -> bool {
        let mut data = self.0.borrow_mut();
        if let Some(slot) = data.vars.get_mut(name) {
            *slot = value;
            return true;
        }
        match &data.parent {
            Some(parent) => parent.assign(name, value),
            None => false,
        }
    }
}

struct Frame {
    scope: Scope,
    this: Value,
}

#[must_use]
enum Flow {
    Normal,
    Return(Value),
}

/// Something that can be assigned.
enum Place {
    Var(String),
    Member(Value, String),
    Index(Value, Value),
}

pub struct JsVm {
    /// Log of all calls to logged functions, and of all suspension points.
    pub call_log: Vec<LoggedCall>,
    globals: Scope,
    this: Value,
}

impl Default for JsVm {
    fn default() -> Self { JsVm::new() }
}

impl JsVm {
    pub fn new() -> Self {
        let mut vm = JsVm { call_log: vec![], globals: Scope::new(None), this: Value::Undefined };
        vm.install_globals();
        vm
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.declare(name, value);
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.lookup(name)
    }

    /// Set the value of `this` for top-level code.
    pub fn set_this(&mut self, this: Value) {
        self.this = this;
    }

    /// Define a global function that logs its calls and returns its first argument.
    pub fn define_logged(&mut self, name: &str) {
        self.set_global(name, Value::logged(name));
    }

    /// Names of the logged calls so far.
    pub fn logged_names(&self) -> Vec<&str> {
        self.call_log.iter().map(|call| &call.name[..]).collect()
    }

    fn global_frame(&self) -> Frame {
        Frame { scope: self.globals.clone(), this: self.this.clone() }
    }

    /// Run top-level statements until they end or hit a `return`.  Returns the `return`ed value.
    pub fn run(&mut self, stmts: &[JsStmt]) -> VmResult<Option<Value>> {
        let frame = self.global_frame();
        match self.exec_block(stmts, &frame)? {
            Flow::Normal => Ok(None),
            Flow::Return(value) => Ok(Some(value)),
        }
    }

    pub fn eval(&mut self, expr: &JsExpr) -> VmResult<Value> {
        let frame = self.global_frame();
        self.eval_in(expr, &frame)
    }

    /// Run the statements that must precede an expression, then evaluate it.
    pub fn eval_with(&mut self, stmts: &[JsStmt], expr: &JsExpr) -> VmResult<Value> {
        self.run(stmts)?;
        self.eval(expr)
    }

    // -------------------------------------------------------------------------
    // Statements

    fn exec_block(&mut self, stmts: &[JsStmt], frame: &Frame) -> VmResult<Flow> {
        for stmt in stmts {
            if let Flow::Return(value) = self.exec(stmt, frame)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &JsStmt, frame: &Frame) -> VmResult<Flow> {
        match stmt {
            JsStmt::Var { name, init } => {
                let value = match init {
                    Some(init) => self.eval_in(init, frame)?,
                    None => Value::Undefined,
                };
                frame.scope.declare(name, value);
            },
            JsStmt::Expr(expr) => {
                self.eval_in(expr, frame)?;
            },
            JsStmt::If { cond, then, else_ } => {
                let branch = match self.eval_in(cond, frame)?.truthy() {
                    true => then,
                    false => else_,
                };
                return self.exec_block(branch, frame);
            },
            JsStmt::Block(stmts) => return self.exec_block(stmts, frame),
            JsStmt::Return(value) => {
                let value = match value {
                    Some(value) => self.eval_in(value, frame)?,
                    None => Value::Undefined,
                };
                return Ok(Flow::Return(value));
            },
            JsStmt::Await { awaiter, on_completed } => {
                // there is no scheduler; the awaiter is expected to have completed already
                let awaiter = self.eval_in(awaiter, frame)?;
                self.call_log.push(LoggedCall {
                    name: "await".to_owned(),
                    args: vec![awaiter, Value::string(on_completed)],
                });
            },
        }
        Ok(Flow::Normal)
    }

    // -------------------------------------------------------------------------
    // Expressions

    fn eval_in(&mut self, expr: &JsExpr, frame: &Frame) -> VmResult<Value> {
        match expr {
            JsExpr::Null => Ok(Value::Null),
            JsExpr::Bool(b) => Ok(Value::Bool(*b)),
            JsExpr::Number(n) => Ok(Value::Number(*n)),
            JsExpr::String(s) => Ok(Value::string(s)),
            JsExpr::Identifier(name) => Ok(self.read_var(name, frame)),
            JsExpr::This => Ok(frame.this.clone()),
            JsExpr::Member { object, name } => {
                let object = self.eval_in(object, frame)?;
                self.get_member(&object, name)
            },
            JsExpr::Index { object, index } => {
                let object = self.eval_in(object, frame)?;
                let index = self.eval_in(index, frame)?;
                self.get_index(&object, &index)
            },
            JsExpr::Call { callee, args } => {
                let (function, this) = match &**callee {
                    JsExpr::Member { object, name } => {
                        let object = self.eval_in(object, frame)?;
                        (self.get_member(&object, name)?, object)
                    },
                    JsExpr::Index { object, index } => {
                        let object = self.eval_in(object, frame)?;
                        let index = self.eval_in(index, frame)?;
                        (self.get_index(&object, &index)?, object)
                    },
                    callee => (self.eval_in(callee, frame)?, Value::Undefined),
                };
                let args = self.eval_list(args, frame)?;
                self.call(&function, this, args)
            },
            JsExpr::New { callee, args } => {
                let ctor = self.eval_in(callee, frame)?;
                let args = self.eval_list(args, frame)?;
                self.construct(&ctor, args)
            },
            JsExpr::Unary { op, operand } => self.eval_unary(*op, operand, frame),
            JsExpr::Binary { op, left, right } => self.eval_binary(*op, left, right, frame),
            JsExpr::Conditional { cond, then, else_ } => {
                match self.eval_in(cond, frame)?.truthy() {
                    true => self.eval_in(then, frame),
                    false => self.eval_in(else_, frame),
                }
            },
            JsExpr::Function { params, body } => Ok(Value::function(Function::Closure {
                params: Rc::new(params.clone()),
                body: Rc::new(body.clone()),
                scope: frame.scope.clone(),
            })),
            JsExpr::Array(elems) => Ok(Value::array(self.eval_list(elems, frame)?)),
            JsExpr::Object(members) => {
                let mut props = IndexMap::new();
                for (name, value) in members {
                    props.insert(name.clone(), self.eval_in(value, frame)?);
                }
                Ok(Value::new_object(props, None, ObjectKind::Plain))
            },
            JsExpr::Verbatim(parts) => {
                let expr = verbatim::parse(parts)?;
                self.eval_in(&expr, frame)
            },
        }
    }

    fn eval_list(&mut self, exprs: &[JsExpr], frame: &Frame) -> VmResult<Vec<Value>> {
        exprs.iter().map(|expr| self.eval_in(expr, frame)).collect()
    }

    fn read_var(&self, name: &str, frame: &Frame) -> Value {
        frame.scope.lookup(name).unwrap_or_else(|| panic!("read of undeclared variable '{}'", name))
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &JsExpr, frame: &Frame) -> VmResult<Value> {
        if op.is_update() {
            let place = self.eval_place(operand, frame)?;
            let old = self.load(&place, frame)?.to_number();
            let new = match op {
                UnaryOp::PreInc | UnaryOp::PostInc => old + 1.0,
                _ => old - 1.0,
            };
            self.store(&place, Value::Number(new), frame)?;
            return Ok(Value::Number(if op.is_postfix() { old } else { new }));
        }

        let value = self.eval_in(operand, frame)?;
        Ok(match op {
            UnaryOp::Neg => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::Not => Value::Bool(!value.truthy()),
            UnaryOp::BitNot => Value::Number(!value.to_int32() as f64),
            UnaryOp::Typeof => Value::string(value.type_of()),
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => unreachable!(),
        })
    }

    fn eval_binary(&mut self, op: BinaryOp, left: &JsExpr, right: &JsExpr, frame: &Frame) -> VmResult<Value> {
        if let Some(base) = op.compound_base() {
            let place = self.eval_place(left, frame)?;
            let old = self.load(&place, frame)?;
            let value = self.eval_in(right, frame)?;
            let new = apply_binary(base, &old, &value)?;
            self.store(&place, new.clone(), frame)?;
            return Ok(new);
        }

        match op {
            BinaryOp::Assign => {
                let place = self.eval_place(left, frame)?;
                let value = self.eval_in(right, frame)?;
                self.store(&place, value.clone(), frame)?;
                Ok(value)
            },
            BinaryOp::LogicalAnd => {
                let left = self.eval_in(left, frame)?;
                match left.truthy() {
                    true => self.eval_in(right, frame),
                    false => Ok(left),
                }
            },
            BinaryOp::LogicalOr => {
                let left = self.eval_in(left, frame)?;
                match left.truthy() {
                    true => Ok(left),
                    false => self.eval_in(right, frame),
                }
            },
            BinaryOp::Comma => {
                self.eval_in(left, frame)?;
                self.eval_in(right, frame)
            },
            BinaryOp::InstanceOf => {
                let value = self.eval_in(left, frame)?;
                let ctor = self.eval_in(right, frame)?;
                let proto = self.get_member(&ctor, "prototype")?;
                Ok(Value::Bool(has_in_proto_chain(&value, &proto)))
            },
            _ => {
                let left = self.eval_in(left, frame)?;
                let right = self.eval_in(right, frame)?;
                apply_binary(op, &left, &right)
            },
        }
    }

    fn eval_place(&mut self, expr: &JsExpr, frame: &Frame) -> VmResult<Place> {
        match expr {
            JsExpr::Identifier(name) => Ok(Place::Var(name.clone())),
            JsExpr::Member { object, name } => Ok(Place::Member(self.eval_in(object, frame)?, name.clone())),
            JsExpr::Index { object, index } => {
                let object = self.eval_in(object, frame)?;
                let index = self.eval_in(index, frame)?;
                Ok(Place::Index(object, index))
            },
            _ => panic!("invalid assignment target: {:?}", expr),
        }
    }

    fn load(&mut self, place: &Place, frame: &Frame) -> VmResult<Value> {
        match place {
            Place::Var(name) => Ok(self.read_var(name, frame)),
            Place::Member(object, name) => self.get_member(object, name),
            Place::Index(object, index) => self.get_index(object, index),
        }
    }

    fn store(&mut self, place: &Place, value: Value, frame: &Frame) -> VmResult<()> {
        match place {
            Place::Var(name) => {
                if !frame.scope.assign(name, value.clone()) {
                    self.globals.declare(name, value);
                }
                Ok(())
            },
            Place::Member(object, name) => set_member(object, name, value),
            Place::Index(object, index) => set_index(object, index, value),
        }
    }

    // -------------------------------------------------------------------------
    // Objects and functions

    fn get_member(&mut self, value: &Value, name: &str) -> VmResult<Value> {
        match value {
            Value::Undefined | Value::Null => Err(Thrown::type_error(format!(
                "cannot read property '{}' of {}", name, value.to_js_string(),
            ))),
            Value::String(s) => Ok(match name {
                "length" => Value::Number(s.encode_utf16().count() as f64),
                _ => Value::Undefined,
            }),
            Value::Bool(_) | Value::Number(_) => Ok(Value::Undefined),
            Value::Object(obj) => Ok(object_member(obj, name)),
        }
    }

    fn get_index(&mut self, value: &Value, index: &Value) -> VmResult<Value> {
        if let (Value::Object(obj), Value::Number(n)) = (value, index) {
            if let ObjectKind::Array(elems) = &obj.borrow().kind {
                return Ok(array_index(*n, elems.len()).map_or(Value::Undefined, |i| elems[i].clone()));
            }
        }
        if let (Value::String(s), Value::Number(n)) = (value, index) {
            let units = s.encode_utf16().collect::<Vec<_>>();
            return Ok(match array_index(*n, units.len()) {
                Some(i) => Value::string(&String::from_utf16_lossy(&units[i..i + 1])),
                None => Value::Undefined,
            });
        }
        self.get_member(value, &index.to_js_string())
    }

    /// Call a function value.
    pub fn call(&mut self, function: &Value, this: Value, args: Vec<Value>) -> VmResult<Value> {
        let function = match function.as_function() {
            Some(function) => function,
            None => return Err(Thrown::type_error(format!("{} is not a function", function.to_js_string()))),
        };
        match function {
            Function::Closure { params, body, scope } => {
                let scope = Scope::new(Some(scope));
                scope.declare("arguments", Value::array(args.clone()));
                for (index, param) in params.iter().enumerate() {
                    scope.declare(param, args.get(index).cloned().unwrap_or(Value::Undefined));
                }
                let frame = Frame { scope, this };
                match self.exec_block(&body, &frame)? {
                    Flow::Normal => Ok(Value::Undefined),
                    Flow::Return(value) => Ok(value),
                }
            },
            Function::Native { func, .. } => func(self, this, args),
            Function::Bound { target, this } => self.call(&target, this, args),
            Function::ThisFix(target) => {
                let mut full_args = vec![this];
                full_args.extend(args);
                self.call(&target, Value::Undefined, full_args)
            },
            Function::Combined(functions) => {
                let mut result = Value::Undefined;
                for function in &functions {
                    result = self.call(function, this.clone(), args.clone())?;
                }
                Ok(result)
            },
            Function::Logged(name) => {
                let result = args.first().cloned().unwrap_or(Value::Undefined);
                self.call_log.push(LoggedCall { name, args });
                Ok(result)
            },
        }
    }

    fn construct(&mut self, ctor: &Value, args: Vec<Value>) -> VmResult<Value> {
        match ctor.as_function() {
            Some(Function::Closure { .. }) => {
                let proto = match self.get_member(ctor, "prototype")? {
                    Value::Object(proto) => Some(proto),
                    _ => None,
                };
                let object = Value::new_object(IndexMap::new(), proto, ObjectKind::Plain);
                match self.call(ctor, object.clone(), args)? {
                    result @ Value::Object(_) => Ok(result),
                    _ => Ok(object),
                }
            },
            Some(Function::Native { func, .. }) => func(self, Value::Undefined, args),
            Some(Function::Logged(name)) => {
                self.call_log.push(LoggedCall { name: format!("new {}", name), args });
                Ok(Value::new_object(IndexMap::new(), None, ObjectKind::Plain))
            },
            _ => Err(Thrown::type_error(format!("{} is not a constructor", ctor.to_js_string()))),
        }
    }

    fn install_globals(&mut self) {
        let array_proto = Value::plain(vec![
            ("slice", Value::native("slice", native_array_slice)),
            ("concat", Value::native("concat", native_array_concat)),
        ]);
        let array = Value::native("Array", native_array_ctor);
        let _ = set_member(&array, "prototype", array_proto);
        self.set_global("Array", array);

        let string = Value::native("String", |_, _, args| {
            Ok(Value::string(&args.first().map_or(String::new(), Value::to_js_string)))
        });
        let _ = set_member(&string, "fromCharCode", Value::native("fromCharCode", native_from_char_code));
        self.set_global("String", string);
        self.set_global("Number", Value::native("Number", |_, _, args| {
            Ok(Value::Number(args.first().map_or(0.0, Value::to_number)))
        }));
        self.set_global("Boolean", Value::native("Boolean", |_, _, args| {
            Ok(Value::Bool(args.first().map_or(false, Value::truthy)))
        }));
        self.set_global("Object", Value::native("Object", |_, _, _| Ok(Value::plain(vec![]))));
        self.set_global("Function", Value::native("Function", |_, _, _| {
            Err(Thrown::type_error("cannot create functions from text"))
        }));

        let rt = Value::plain(runtime::functions());
        let _ = set_member(&rt, "Nullable", Value::plain(runtime::nullable_functions()));
        for &prim in runtime::PRIMITIVE_TYPE_NAMES {
            let type_object = Value::plain(vec![("$primitive", Value::string(&prim.to_string()))]);
            let _ = set_member(&rt, &runtime::primitive_type_member(prim), type_object);
        }
        self.set_global(RUNTIME_NAMESPACE, rt);
    }
}

fn object_member(obj: &ObjRef, name: &str) -> Value {
    let mut current = Some(obj.clone());
    while let Some(object) = current {
        let data = object.borrow();
        if let Some(value) = data.props.get(name) {
            return value.clone();
        }
        current = data.proto.clone();
    }

    let is_function = match (&obj.borrow().kind, name) {
        (ObjectKind::Array(elems), "length") => return Value::Number(elems.len() as f64),
        (ObjectKind::Array(_), "slice") => return Value::native("slice", native_array_slice),
        (ObjectKind::Array(_), "concat") => return Value::native("concat", native_array_concat),
        (ObjectKind::Array(_), "map") => return Value::native("map", native_array_map),
        (ObjectKind::Array(_), "filter") => return Value::native("filter", native_array_filter),
        (ObjectKind::Function(_), "call") => return Value::native("call", native_function_call),
        (ObjectKind::Function(_), "apply") => return Value::native("apply", native_function_apply),
        (ObjectKind::Function(_), _) => true,
        _ => false,
    };
    if is_function && name == "prototype" {
        let proto = Value::plain(vec![("constructor", Value::Object(obj.clone()))]);
        obj.0.borrow_mut().props.insert(name.to_owned(), proto.clone());
        return proto;
    }
    Value::Undefined
}

fn set_member(object: &Value, name: &str, value: Value) -> VmResult<()> {
    match object {
        Value::Object(obj) => {
            obj.0.borrow_mut().props.insert(name.to_owned(), value);
            Ok(())
        },
        _ => Err(Thrown::type_error(format!("cannot set property '{}' of {}", name, object.to_js_string()))),
    }
}

fn set_index(object: &Value, index: &Value, value: Value) -> VmResult<()> {
    if let (Value::Object(obj), Value::Number(n)) = (object, index) {
        if let ObjectKind::Array(elems) = &mut obj.0.borrow_mut().kind {
            if n.fract() == 0.0 && *n >= 0.0 {
                let index = *n as usize;
                if index >= elems.len() {
                    elems.resize(index + 1, Value::Undefined);
                }
                elems[index] = value;
                return Ok(());
            }
        }
    }
    set_member(object, &index.to_js_string(), value)
}

fn array_index(n: f64, len: usize) -> Option<usize> {
    match n.fract() == 0.0 && n >= 0.0 && n < len as f64 {
        true => Some(n as usize),
        false => None,
    }
}

fn has_in_proto_chain(value: &Value, proto: &Value) -> bool {
    let (obj, proto) = match (value, proto) {
        (Value::Object(obj), Value::Object(proto)) => (obj, proto),
        _ => return false,
    };
    let mut current = obj.borrow().proto.clone();
    while let Some(object) = current {
        if object.ptr_eq(proto) {
            return true;
        }
        current = object.borrow().proto.clone();
    }
    false
}

fn apply_binary(op: BinaryOp, a: &Value, b: &Value) -> VmResult<Value> {
    use BinaryOp as B;

    let shift = |b: &Value| b.to_uint32() & 31;
    Ok(match op {
        B::Add => match (a, b) {
            (Value::String(_), _) | (_, Value::String(_)) | (Value::Object(_), _) | (_, Value::Object(_)) => {
                Value::string(&format!("{}{}", a.to_js_string(), b.to_js_string()))
            },
            _ => Value::Number(a.to_number() + b.to_number()),
        },
        B::Sub => Value::Number(a.to_number() - b.to_number()),
        B::Mul => Value::Number(a.to_number() * b.to_number()),
        B::Div => Value::Number(a.to_number() / b.to_number()),
        B::Rem => Value::Number(a.to_number() % b.to_number()),
        B::Shl => Value::Number(a.to_int32().wrapping_shl(shift(b)) as f64),
        B::Shr => Value::Number(a.to_int32().wrapping_shr(shift(b)) as f64),
        B::UShr => Value::Number(a.to_uint32().wrapping_shr(shift(b)) as f64),
        B::BitAnd => Value::Number((a.to_int32() & b.to_int32()) as f64),
        B::BitOr => Value::Number((a.to_int32() | b.to_int32()) as f64),
        B::BitXor => Value::Number((a.to_int32() ^ b.to_int32()) as f64),
        B::StrictEq => Value::Bool(a.strict_equals(b)),
        B::StrictNe => Value::Bool(!a.strict_equals(b)),
        B::LooseEq => Value::Bool(a.loose_equals(b)),
        B::LooseNe => Value::Bool(!a.loose_equals(b)),
        B::Lt => Value::Bool(compare(a, b) == Some(std::cmp::Ordering::Less)),
        B::Gt => Value::Bool(compare(a, b) == Some(std::cmp::Ordering::Greater)),
        B::Le => Value::Bool(matches!(compare(a, b), Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal))),
        B::Ge => Value::Bool(matches!(compare(a, b), Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal))),
        _ => unreachable!("operator {} has special evaluation", op),
    })
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => a.to_number().partial_cmp(&b.to_number()),
    }
}

// =============================================================================

impl Value {
    pub fn string(s: &str) -> Value { Value::String(s.into()) }

    pub fn array(elems: Vec<Value>) -> Value {
        Value::new_object(IndexMap::new(), None, ObjectKind::Array(elems))
    }

    /// A plain object with the given properties.
    pub fn plain(props: Vec<(&str, Value)>) -> Value {
        let props = props.into_iter().map(|(name, value)| (name.to_owned(), value)).collect();
        Value::new_object(props, None, ObjectKind::Plain)
    }

    /// A function that logs its calls and returns its first argument.
    pub fn logged(name: &str) -> Value {
        Value::function(Function::Logged(name.to_owned()))
    }

    fn new_object(props: IndexMap<String, Value>, proto: Option<ObjRef>, kind: ObjectKind) -> Value {
        Value::Object(ObjRef(Rc::new(RefCell::new(Object { props, proto, kind }))))
    }

    fn function(function: Function) -> Value {
        Value::new_object(IndexMap::new(), None, ObjectKind::Function(function))
    }

    fn native(name: &'static str, func: NativeFn) -> Value {
        Value::function(Function::Native { name, func })
    }

    fn as_function(&self) -> Option<Function> {
        match self {
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::Function(function) => Some(function.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_nullish(&self) -> bool { matches!(self, Value::Undefined | Value::Null) }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Read a property of an object.
    pub fn get(&self, name: &str) -> Option<Value> {
        match self {
            Value::Object(obj) => Some(object_member(obj, name)),
            _ => None,
        }
    }

    /// Elements of a one-dimensional array.
    pub fn elements(&self) -> Option<Vec<Value>> {
        match self {
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::Array(elems) => Some(elems.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => if *b { 1.0 } else { 0.0 },
            Value::Number(n) => *n,
            Value::String(s) => match s.trim() {
                "" => 0.0,
                s => s.parse().unwrap_or(f64::NAN),
            },
            Value::Object(_) => f64::NAN,
        }
    }

    fn to_uint32(&self) -> u32 {
        let n = self.to_number();
        match n.is_finite() {
            true => n.trunc().rem_euclid(4294967296.0) as u32,
            false => 0,
        }
    }

    fn to_int32(&self) -> i32 { self.to_uint32() as i32 }

    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_owned(),
            Value::Null => "null".to_owned(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.to_string(),
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::Array(elems) => elems.iter().map(|elem| match elem {
                    Value::Undefined | Value::Null => String::new(),
                    elem => elem.to_js_string(),
                }).collect::<Vec<_>>().join(","),
                ObjectKind::Function(_) => "function".to_owned(),
                _ => "[object Object]".to_owned(),
            },
        }
    }

    fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) if self.as_function().is_some() => "function",
            Value::Object(_) => "object",
        }
    }

    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            _ if self.is_nullish() || other.is_nullish() => self.is_nullish() && other.is_nullish(),
            (Value::Object(_), Value::Object(_)) => self.strict_equals(other),
            (Value::String(a), Value::String(b)) => a == b,
            _ => self.to_number() == other.to_number(),
        }
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        format!("{}", n)
    }
}

/// Structural equality on primitives and identity on objects.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self.strict_equals(other),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Value { Value::Number(n) }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value { Value::Bool(b) }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value { Value::string(s) }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Object(obj) => fmt::Debug::fmt(obj, f),
            _ => write!(f, "{}", self.to_js_string()),
        }
    }
}

impl ObjRef {
    fn borrow(&self) -> Ref<'_, Object> { self.0.borrow() }

    pub fn ptr_eq(&self, other: &ObjRef) -> bool { Rc::ptr_eq(&self.0, &other.0) }
}

/// Shallow, so that cycles don't recurse.
impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.borrow();
        match &data.kind {
            ObjectKind::Plain => {
                let names = data.props.keys().map(|name| &name[..]).collect::<Vec<_>>();
                write!(f, "{{{}}}", names.join(", "))
            },
            ObjectKind::Array(elems) => write!(f, "<array of {}>", elems.len()),
            ObjectKind::MultiArray { dims, .. } => write!(f, "<array {:?}>", dims),
            ObjectKind::Function(Function::Native { name, .. }) => write!(f, "<native {}>", name),
            ObjectKind::Function(Function::Logged(name)) => write!(f, "<logged {}>", name),
            ObjectKind::Function(_) => write!(f, "<function>"),
        }
    }
}

// =============================================================================
// Built-in functions

fn native_array_ctor(_: &mut JsVm, _: Value, args: Vec<Value>) -> VmResult<Value> {
    match &args[..] {
        [Value::Number(n)] => Ok(Value::array(vec![Value::Undefined; *n as usize])),
        _ => Ok(Value::array(args)),
    }
}

fn native_array_slice(_: &mut JsVm, this: Value, args: Vec<Value>) -> VmResult<Value> {
    let elems = this.elements().ok_or_else(|| Thrown::type_error("slice of a non-array"))?;
    let len = elems.len() as f64;
    let clamp = |n: f64| (if n < 0.0 { (len + n).max(0.0) } else { n.min(len) }) as usize;
    let start = args.get(0).map_or(0, |arg| clamp(arg.to_number()));
    let end = match args.get(1) {
        Some(arg) if !matches!(arg, Value::Undefined) => clamp(arg.to_number()),
        _ => elems.len(),
    };
    Ok(Value::array(elems.get(start..end.max(start)).map_or(vec![], <[Value]>::to_vec)))
}

fn native_array_concat(_: &mut JsVm, this: Value, args: Vec<Value>) -> VmResult<Value> {
    let mut elems = this.elements().ok_or_else(|| Thrown::type_error("concat of a non-array"))?;
    for arg in args {
        match arg.elements() {
            Some(more) => elems.extend(more),
            None => elems.push(arg),
        }
    }
    Ok(Value::array(elems))
}

fn native_array_map(vm: &mut JsVm, this: Value, args: Vec<Value>) -> VmResult<Value> {
    let elems = this.elements().ok_or_else(|| Thrown::type_error("map of a non-array"))?;
    let function = args.first().cloned().unwrap_or(Value::Undefined);
    let mut out = vec![];
    for elem in elems {
        out.push(vm.call(&function, Value::Undefined, vec![elem])?);
    }
    Ok(Value::array(out))
}

fn native_array_filter(vm: &mut JsVm, this: Value, args: Vec<Value>) -> VmResult<Value> {
    let elems = this.elements().ok_or_else(|| Thrown::type_error("filter of a non-array"))?;
    let function = args.first().cloned().unwrap_or(Value::Undefined);
    let mut out = vec![];
    for elem in elems {
        if vm.call(&function, Value::Undefined, vec![elem.clone()])?.truthy() {
            out.push(elem);
        }
    }
    Ok(Value::array(out))
}

fn native_function_call(vm: &mut JsVm, this: Value, mut args: Vec<Value>) -> VmResult<Value> {
    let new_this = match args.is_empty() {
        true => Value::Undefined,
        false => args.remove(0),
    };
    vm.call(&this, new_this, args)
}

fn native_function_apply(vm: &mut JsVm, this: Value, args: Vec<Value>) -> VmResult<Value> {
    let new_this = args.get(0).cloned().unwrap_or(Value::Undefined);
    let list = match args.get(1) {
        None | Some(Value::Undefined) | Some(Value::Null) => vec![],
        Some(list) => list.elements().ok_or_else(|| Thrown::type_error("apply with a non-array"))?,
    };
    vm.call(&this, new_this, list)
}

fn native_from_char_code(_: &mut JsVm, _: Value, args: Vec<Value>) -> VmResult<Value> {
    let units = args.iter().map(|arg| arg.to_uint32() as u16).collect::<Vec<_>>();
    Ok(Value::string(&String::from_utf16_lossy(&units)))
}

/// The reference runtime library.
mod runtime {
    use super::*;

    pub const PRIMITIVE_TYPE_NAMES: &[Primitive] = &[
        Primitive::Char, Primitive::SByte, Primitive::Byte, Primitive::Int16, Primitive::UInt16,
        Primitive::Int32, Primitive::UInt32, Primitive::Int64, Primitive::UInt64,
        Primitive::Single, Primitive::Decimal,
    ];

    /// The member of `$rt` that is the type object of a primitive.
    pub fn primitive_type_member(prim: Primitive) -> String { format!("{:?}", prim) }

    fn arg(args: &[Value], index: usize) -> Value {
        args.get(index).cloned().unwrap_or(Value::Undefined)
    }

    fn primitive_arg(args: &[Value], index: usize) -> VmResult<Primitive> {
        let name = arg(args, index).to_js_string();
        name.parse().map_err(|_| Thrown::type_error(format!("unknown primitive '{}'", name)))
    }

    pub fn functions() -> Vec<(&'static str, Value)> {
        let natives: &[(&'static str, NativeFn)] = &[
            ("bind", |_, _, args| match arg(&args, 0) {
                function if function.is_nullish() => Ok(function),
                target => Ok(Value::function(Function::Bound { target, this: arg(&args, 1) })),
            }),
            ("thisFix", |_, _, args| match arg(&args, 0) {
                function if function.is_nullish() => Ok(function),
                target => Ok(Value::function(Function::ThisFix(target))),
            }),
            ("clip", |_, _, args| {
                let value = arg(&args, 0);
                let prim = primitive_arg(&args, 1)?;
                match (value, prim.int_range()) {
                    (value, _) if value.is_nullish() => Ok(value),
                    (value, Some(range)) => Ok(Value::Number(wrap_to_range(value.to_number(), range.min, range.bits))),
                    (value, None) => Ok(value),
                }
            }),
            ("check", |_, _, args| {
                let value = arg(&args, 0);
                let prim = primitive_arg(&args, 1)?;
                match (value, prim.int_range()) {
                    (value, _) if value.is_nullish() => Ok(value),
                    (value, Some(range)) => {
                        let n = value.to_number();
                        match n >= range.min && n <= range.max {
                            true => Ok(Value::Number(n)),
                            false => Err(Thrown::new("OverflowException", format!("{} does not fit in {}", number_to_string(n), prim))),
                        }
                    },
                    (value, None) => Ok(value),
                }
            }),
            ("idiv", |_, _, args| {
                let (a, b) = (arg(&args, 0), arg(&args, 1));
                if a.is_nullish() || b.is_nullish() {
                    return Ok(Value::Null);
                }
                match b.to_number() {
                    divisor if divisor == 0.0 => Err(Thrown::new("DivideByZeroException", "division by zero")),
                    divisor => Ok(Value::Number((a.to_number() / divisor).trunc())),
                }
            }),
            ("imul", |_, _, args| {
                let (a, b) = (arg(&args, 0), arg(&args, 1));
                if a.is_nullish() || b.is_nullish() {
                    return Ok(Value::Null);
                }
                let product = a.to_int32().wrapping_mul(b.to_int32());
                match primitive_arg(&args, 2)? {
                    Primitive::UInt32 => Ok(Value::Number(product as u32 as f64)),
                    _ => Ok(Value::Number(product as f64)),
                }
            }),
            ("trunc", |_, _, args| match arg(&args, 0) {
                value if value.is_nullish() => Ok(value),
                value => Ok(Value::Number(value.to_number().trunc())),
            }),
            ("coalesce", |_, _, args| match arg(&args, 0) {
                value if value.is_nullish() => Ok(arg(&args, 1)),
                value => Ok(value),
            }),
            ("isValue", |_, _, args| Ok(Value::Bool(!arg(&args, 0).is_nullish()))),
            ("unbox", |_, _, args| match arg(&args, 0) {
                value if value.is_nullish() => Err(Thrown::new("InvalidOperationException", "nullable object must have a value")),
                value => Ok(value),
            }),
            ("referenceEquals", |_, _, args| {
                let (a, b) = (arg(&args, 0), arg(&args, 1));
                Ok(Value::Bool((a.is_nullish() && b.is_nullish()) || a.strict_equals(&b)))
            }),
            ("delegateCombine", |_, _, args| {
                let (a, b) = (arg(&args, 0), arg(&args, 1));
                if a.is_nullish() {
                    return Ok(b);
                } else if b.is_nullish() {
                    return Ok(a);
                }
                let mut list = delegate_list(&a);
                list.extend(delegate_list(&b));
                Ok(Value::function(Function::Combined(list)))
            }),
            ("delegateRemove", |_, _, args| {
                let (a, b) = (arg(&args, 0), arg(&args, 1));
                if a.is_nullish() || b.is_nullish() {
                    return Ok(a);
                }
                let mut list = delegate_list(&a);
                let remove = delegate_list(&b);
                // the last occurrence of the whole invocation list is removed
                let found = match list.len() >= remove.len() {
                    true => (0..=list.len() - remove.len()).rev().find(|&start| {
                        list[start..start + remove.len()].iter().zip(&remove).all(|(x, y)| delegates_equal(x, y))
                    }),
                    false => None,
                };
                if let Some(start) = found {
                    list.drain(start..start + remove.len());
                }
                Ok(match list.len() {
                    0 => Value::Null,
                    1 => list.remove(0),
                    _ => Value::function(Function::Combined(list)),
                })
            }),
            ("arrayInit", |_, _, args| {
                let size = arg(&args, 0).to_number();
                let default = arg(&args, 1);
                let elems = (0..size as usize).map(|_| shallow_clone(&default)).collect();
                Ok(Value::array(elems))
            }),
            ("multidimArray", |_, _, args| {
                let default = arg(&args, 0);
                let dims = args.get(1..).unwrap_or(&[]).iter().map(|dim| dim.to_number() as usize).collect::<Vec<_>>();
                let count = dims.iter().product::<usize>();
                let elements = (0..count).map(|_| shallow_clone(&default)).collect();
                Ok(Value::new_object(IndexMap::new(), None, ObjectKind::MultiArray { dims, elements }))
            }),
            ("arrayGet", |_, _, args| {
                let (obj, offset) = multidim_offset(&args, args.len() - 1)?;
                let data = obj.borrow();
                match &data.kind {
                    ObjectKind::MultiArray { elements, .. } => Ok(elements[offset].clone()),
                    _ => unreachable!(),
                }
            }),
            ("arraySet", |_, _, args| {
                let value = arg(&args, args.len() - 1);
                let (obj, offset) = multidim_offset(&args, args.len() - 2)?;
                let mut data = obj.0.borrow_mut();
                match &mut data.kind {
                    ObjectKind::MultiArray { elements, .. } => elements[offset] = value.clone(),
                    _ => unreachable!(),
                }
                Ok(value)
            }),
            ("clone", |_, _, args| Ok(shallow_clone(&arg(&args, 0)))),
            ("shallowCopy", |_, _, args| {
                let (source, target) = (arg(&args, 0), arg(&args, 1));
                if let (Value::Object(source), Value::Object(target)) = (&source, &target) {
                    let props = source.borrow().props.clone();
                    target.0.borrow_mut().props = props;
                }
                Ok(target)
            }),
            ("applyConstructor", |vm, _, args| {
                let list = arg(&args, 1).elements().unwrap_or_default();
                vm.construct(&arg(&args, 0), list)
            }),
            ("getDefaultValue", |vm, _, args| {
                let ty = arg(&args, 0);
                match ty.get("getDefaultValue") {
                    Some(get) if !get.is_nullish() => vm.call(&get, ty, vec![]),
                    _ => vm.construct(&ty, vec![]),
                }
            }),
            ("isInstanceOfType", |vm, _, args| Ok(Value::Bool(is_instance_of_type(vm, &arg(&args, 0), &arg(&args, 1))))),
            ("safeCast", |vm, _, args| {
                let value = arg(&args, 0);
                match is_instance_of_type(vm, &value, &arg(&args, 1)) {
                    true => Ok(value),
                    false => Ok(Value::Null),
                }
            }),
            ("cast", |vm, _, args| {
                let value = arg(&args, 0);
                match value.is_nullish() || is_instance_of_type(vm, &value, &arg(&args, 1)) {
                    true => Ok(value),
                    false => Err(Thrown::new("InvalidCastException", format!("cannot cast {:?}", value))),
                }
            }),
            ("makeGenericType", |_, _, args| Ok(arg(&args, 0))),
            ("makeGenericMethod", |_, _, args| Ok(arg(&args, 0))),
        ];
        natives.iter().map(|&(name, func)| (name, Value::native(name, func))).collect()
    }

    pub fn nullable_functions() -> Vec<(&'static str, Value)> {
        macro_rules! lifted_binary {
            ($($name:literal => $op:expr,)*) => {
                vec![$(
                    ($name, Value::native($name, |_, _, args| {
                        let (a, b) = (arg(&args, 0), arg(&args, 1));
                        if a.is_nullish() || b.is_nullish() {
                            return Ok(Value::Null);
                        }
                        apply_binary($op, &a, &b)
                    })),
                )*]
            };
        }

        let mut functions = lifted_binary! {
            "add" => BinaryOp::Add,
            "sub" => BinaryOp::Sub,
            "mul" => BinaryOp::Mul,
            "div" => BinaryOp::Div,
            "mod" => BinaryOp::Rem,
            "shl" => BinaryOp::Shl,
            "srs" => BinaryOp::Shr,
            "sru" => BinaryOp::UShr,
            "band" => BinaryOp::BitAnd,
            "bor" => BinaryOp::BitOr,
            "xor" => BinaryOp::BitXor,
        };
        let others: &[(&'static str, NativeFn)] = &[
            ("eq", |_, _, args| Ok(Value::Bool(nullable_equals(&arg(&args, 0), &arg(&args, 1))))),
            ("ne", |_, _, args| Ok(Value::Bool(!nullable_equals(&arg(&args, 0), &arg(&args, 1))))),
            ("lt", |_, _, args| lifted_comparison(BinaryOp::Lt, &args)),
            ("le", |_, _, args| lifted_comparison(BinaryOp::Le, &args)),
            ("gt", |_, _, args| lifted_comparison(BinaryOp::Gt, &args)),
            ("ge", |_, _, args| lifted_comparison(BinaryOp::Ge, &args)),
            ("neg", |_, _, args| lifted_unary(&args, |n| Value::Number(-n.to_number()))),
            ("pos", |_, _, args| lifted_unary(&args, |n| Value::Number(n.to_number()))),
            ("not", |_, _, args| lifted_unary(&args, |b| Value::Bool(!b.truthy()))),
            ("cpl", |_, _, args| lifted_unary(&args, |n| Value::Number(!n.to_int32() as f64))),
            ("lift", |vm, _, args| {
                let function = arg(&args, 0);
                let rest = args.get(1..).map_or(vec![], <[Value]>::to_vec);
                match rest.iter().any(Value::is_nullish) {
                    true => Ok(Value::Null),
                    false => vm.call(&function, Value::Undefined, rest),
                }
            }),
            ("and", |_, _, args| {
                let (a, b) = (arg(&args, 0), arg(&args, 1));
                Ok(match (a, b) {
                    (Value::Bool(false), _) | (_, Value::Bool(false)) => Value::Bool(false),
                    (a, b) if a.is_nullish() || b.is_nullish() => Value::Null,
                    _ => Value::Bool(true),
                })
            }),
            ("or", |_, _, args| {
                let (a, b) = (arg(&args, 0), arg(&args, 1));
                Ok(match (a, b) {
                    (Value::Bool(true), _) | (_, Value::Bool(true)) => Value::Bool(true),
                    (a, b) if a.is_nullish() || b.is_nullish() => Value::Null,
                    _ => Value::Bool(false),
                })
            }),
        ];
        functions.extend(others.iter().map(|&(name, func)| (name, Value::native(name, func))));
        functions
    }

    fn nullable_equals(a: &Value, b: &Value) -> bool {
        match a.is_nullish() || b.is_nullish() {
            true => a.is_nullish() && b.is_nullish(),
            false => a.strict_equals(b),
        }
    }

    fn lifted_comparison(op: BinaryOp, args: &[Value]) -> VmResult<Value> {
        let (a, b) = (arg(args, 0), arg(args, 1));
        match a.is_nullish() || b.is_nullish() {
            true => Ok(Value::Bool(false)),
            false => apply_binary(op, &a, &b),
        }
    }

    fn lifted_unary(args: &[Value], func: fn(&Value) -> Value) -> VmResult<Value> {
        match arg(args, 0) {
            value if value.is_nullish() => Ok(Value::Null),
            value => Ok(func(&value)),
        }
    }

    /// Wrap an integer into a range of `bits` bits starting at `min`.
    pub(super) fn wrap_to_range(n: f64, min: f64, bits: u32) -> f64 {
        if !n.is_finite() {
            return 0.0;
        }
        let modulus = 2f64.powi(bits as i32);
        (n.trunc() - min).rem_euclid(modulus) + min
    }

    fn delegate_list(value: &Value) -> Vec<Value> {
        match value.as_function() {
            Some(Function::Combined(list)) => list,
            _ => vec![value.clone()],
        }
    }

    /// Bound functions compare equal when they bind the same function to the same target.
    fn delegates_equal(a: &Value, b: &Value) -> bool {
        match (a.as_function(), b.as_function()) {
            (Some(Function::Bound { target: ta, this: xa }), Some(Function::Bound { target: tb, this: xb })) => {
                delegates_equal(&ta, &tb) && xa.strict_equals(&xb)
            },
            (Some(Function::ThisFix(a)), Some(Function::ThisFix(b))) => delegates_equal(&a, &b),
            _ => a.strict_equals(b),
        }
    }

    fn multidim_offset(args: &[Value], num_leading: usize) -> VmResult<(ObjRef, usize)> {
        let obj = match arg(args, 0) {
            Value::Object(obj) => obj,
            other => return Err(Thrown::type_error(format!("{:?} is not an array", other))),
        };
        let indices = args.get(1..=num_leading).unwrap_or(&[]);
        let offset = {
            let data = obj.borrow();
            let dims = match &data.kind {
                ObjectKind::MultiArray { dims, .. } => dims.clone(),
                _ => return Err(Thrown::type_error("not a multidimensional array")),
            };
            if dims.len() != indices.len() {
                return Err(Thrown::type_error(format!("expected {} indices, got {}", dims.len(), indices.len())));
            }
            let mut offset = 0;
            for (index, &dim) in indices.iter().zip(&dims) {
                let index = match array_index(index.to_number(), dim) {
                    Some(index) => index,
                    None => return Err(Thrown::new("IndexOutOfRangeException", "index was outside the bounds of the array")),
                };
                offset = offset * dim + index;
            }
            offset
        };
        Ok((obj, offset))
    }

    /// Copies plain objects, so each element of a new array gets its own struct.
    fn shallow_clone(value: &Value) -> Value {
        match value {
            Value::Object(obj) => {
                let data = obj.borrow();
                match data.kind {
                    ObjectKind::Plain => Value::new_object(data.props.clone(), data.proto.clone(), ObjectKind::Plain),
                    _ => value.clone(),
                }
            },
            _ => value.clone(),
        }
    }

    fn is_instance_of_type(vm: &mut JsVm, value: &Value, ty: &Value) -> bool {
        if value.is_nullish() {
            return false;
        }
        for (global, matches) in [
            ("Number", matches!(value, Value::Number(_))),
            ("String", matches!(value, Value::String(_))),
            ("Boolean", matches!(value, Value::Bool(_))),
            ("Function", value.as_function().is_some()),
            ("Array", value.elements().is_some()),
            ("Object", true),
        ] {
            if vm.global(global).map_or(false, |object| object.strict_equals(ty)) {
                return matches;
            }
        }
        if let Some(Value::String(name)) = ty.get("$primitive") {
            return match (value, name.parse::<Primitive>().ok().and_then(Primitive::int_range)) {
                (Value::Number(n), Some(range)) => n.fract() == 0.0 && *n >= range.min && *n <= range.max,
                (Value::Number(_), None) => true,
                _ => false,
            };
        }
        match ty.get("prototype") {
            Some(proto) => has_in_proto_chain(value, &proto),
            None => false,
        }
    }
}

/// Parses the text of inline code back into an expression, so that it can run.
///
/// Substituted expressions are opaque operands.  The text may use literals, identifiers, member
/// access, calls, `new`, and every prefix, postfix, binary and conditional operator.
mod verbatim {
    use std::str::FromStr;

    use lazy_static::lazy_static;
    use regex::Regex;

    use super::*;
    use crate::js::VerbatimPart;

    #[derive(Debug, Clone)]
    enum Token {
        Number(f64),
        Ident(String),
        Str(String),
        Punct(String),
        Expr(JsExpr),
    }

    fn syntax_error(message: impl Into<String>) -> Thrown { Thrown::new("SyntaxError", message) }

    fn tokenize(parts: &[VerbatimPart]) -> VmResult<Vec<Token>> {
        lazy_static! {
            static ref TOKEN_RE: Regex = Regex::new(concat!(
                r#"^\s*(?:(?P<num>\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)"#,
                r#"|(?P<ident>[A-Za-z_$][A-Za-z0-9_$]*)"#,
                r#"|(?P<str>"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*')"#,
                r#"|(?P<punct>>>>=|>>>|===|!==|<<=|>>=|&&|\|\||==|!=|<=|>=|<<|>>|\+\+|--|\+=|-=|\*=|/=|%=|&=|\|=|\^=|[-+*/%&|^!~<>=?:.,()\[\]]))"#,
            )).unwrap();
        }

        let mut tokens = vec![];
        for part in parts {
            let mut text = match part {
                VerbatimPart::Expr(expr) => {
                    tokens.push(Token::Expr(expr.clone()));
                    continue;
                },
                VerbatimPart::Text(text) => &text[..],
            };
            while !text.trim().is_empty() {
                let caps = TOKEN_RE.captures(text).ok_or_else(|| syntax_error(format!("unexpected text '{}'", text.trim())))?;
                let token = if let Some(m) = caps.name("num") {
                    Token::Number(m.as_str().parse::<f64>().map_err(|_| syntax_error(format!("bad number '{}'", m.as_str())))?)
                } else if let Some(m) = caps.name("ident") {
                    Token::Ident(m.as_str().to_owned())
                } else if let Some(m) = caps.name("str") {
                    Token::Str(unescape(&m.as_str()[1..m.as_str().len() - 1]))
                } else {
                    Token::Punct(caps["punct"].to_owned())
                };
                tokens.push(token);
                text = &text[caps[0].len()..];
            }
        }
        Ok(tokens)
    }

    fn unescape(s: &str) -> String {
        let mut out = String::new();
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {},
            }
        }
        out
    }

    /// The precedence of `?:`, between assignment and `||`.
    const CONDITIONAL: u8 = 3;

    struct Parser {
        tokens: Vec<Token>,
        pos: usize,
    }

    pub fn parse(parts: &[VerbatimPart]) -> VmResult<JsExpr> {
        let mut parser = Parser { tokens: tokenize(parts)?, pos: 0 };
        let expr = parser.expr(1)?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(syntax_error(format!("unexpected {:?}", token))),
        }
    }

    impl Parser {
        fn peek(&self) -> Option<&Token> { self.tokens.get(self.pos) }

        fn next(&mut self) -> VmResult<Token> {
            let token = self.tokens.get(self.pos).cloned().ok_or_else(|| syntax_error("unexpected end of inline code"))?;
            self.pos += 1;
            Ok(token)
        }

        fn peek_punct(&self) -> Option<&str> {
            match self.peek() {
                Some(Token::Punct(p)) => Some(p.as_str()),
                Some(Token::Ident(word)) if word == "instanceof" => Some(word.as_str()),
                _ => None,
            }
        }

        fn eat(&mut self, punct: &str) -> bool {
            let found = self.peek_punct() == Some(punct);
            if found {
                self.pos += 1;
            }
            found
        }

        fn expect(&mut self, punct: &str) -> VmResult<()> {
            match self.eat(punct) {
                true => Ok(()),
                false => Err(syntax_error(format!("expected '{}', found {:?}", punct, self.peek()))),
            }
        }

        /// An expression with no operator looser than `min_prec` at the top.
        fn expr(&mut self, min_prec: u8) -> VmResult<JsExpr> {
            let mut left = self.unary()?;
            loop {
                let punct = match self.peek_punct() {
                    Some(punct) => punct.to_owned(),
                    None => return Ok(left),
                };
                if punct == "?" {
                    if CONDITIONAL < min_prec {
                        return Ok(left);
                    }
                    self.pos += 1;
                    let then = self.expr(2)?;
                    self.expect(":")?;
                    let else_ = self.expr(2)?;
                    left = JsExpr::conditional(left, then, else_);
                    continue;
                }
                let op = match BinaryOp::from_str(&punct) {
                    Ok(op) if op.precedence() >= min_prec => op,
                    _ => return Ok(left),
                };
                self.pos += 1;
                let right = match op.is_assignment() {
                    true => self.expr(op.precedence())?,
                    false => self.expr(op.precedence() + 1)?,
                };
                left = JsExpr::binary(op, left, right);
            }
        }

        fn unary(&mut self) -> VmResult<JsExpr> {
            let op = match self.peek() {
                Some(Token::Punct(p)) => match &p[..] {
                    "-" => Some(UnaryOp::Neg),
                    "+" => Some(UnaryOp::Plus),
                    "!" => Some(UnaryOp::Not),
                    "~" => Some(UnaryOp::BitNot),
                    "++" => Some(UnaryOp::PreInc),
                    "--" => Some(UnaryOp::PreDec),
                    _ => None,
                },
                Some(Token::Ident(word)) if word == "typeof" => Some(UnaryOp::Typeof),
                _ => None,
            };
            match op {
                Some(op) => {
                    self.pos += 1;
                    Ok(JsExpr::unary(op, self.unary()?))
                },
                None => self.postfix(),
            }
        }

        fn postfix(&mut self) -> VmResult<JsExpr> {
            let mut expr = self.primary()?;
            loop {
                if self.eat(".") {
                    match self.next()? {
                        Token::Ident(name) => expr = expr.member(name),
                        other => return Err(syntax_error(format!("expected a member name, found {:?}", other))),
                    }
                } else if self.eat("[") {
                    let index = self.expr(1)?;
                    self.expect("]")?;
                    expr = expr.index(index);
                } else if self.eat("(") {
                    expr = expr.call(self.list(")")?);
                } else if self.eat("++") {
                    expr = JsExpr::unary(UnaryOp::PostInc, expr);
                } else if self.eat("--") {
                    expr = JsExpr::unary(UnaryOp::PostDec, expr);
                } else {
                    return Ok(expr);
                }
            }
        }

        fn primary(&mut self) -> VmResult<JsExpr> {
            match self.next()? {
                Token::Number(n) => Ok(JsExpr::Number(n)),
                Token::Str(s) => Ok(JsExpr::String(s)),
                Token::Expr(expr) => Ok(expr),
                Token::Ident(word) => match &word[..] {
                    "null" => Ok(JsExpr::Null),
                    "true" => Ok(JsExpr::Bool(true)),
                    "false" => Ok(JsExpr::Bool(false)),
                    "this" => Ok(JsExpr::This),
                    "new" => {
                        let mut callee = self.primary()?;
                        while self.eat(".") {
                            match self.next()? {
                                Token::Ident(name) => callee = callee.member(name),
                                other => return Err(syntax_error(format!("expected a member name, found {:?}", other))),
                            }
                        }
                        let args = match self.eat("(") {
                            true => self.list(")")?,
                            false => vec![],
                        };
                        Ok(callee.new_(args))
                    },
                    _ => Ok(JsExpr::Identifier(word)),
                },
                Token::Punct(p) if p == "(" => {
                    let expr = self.expr(1)?;
                    self.expect(")")?;
                    Ok(expr)
                },
                Token::Punct(p) if p == "[" => Ok(JsExpr::Array(self.list("]")?)),
                Token::Punct(p) => Err(syntax_error(format!("unexpected '{}'", p))),
            }
        }

        /// Comma-separated expressions up to the closing `end`.
        fn list(&mut self, end: &str) -> VmResult<Vec<JsExpr>> {
            let mut items = vec![];
            while !self.eat(end) {
                if !items.is_empty() {
                    self.expect(",")?;
                }
                items.push(self.expr(2)?);
            }
            Ok(items)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<JsExpr>) -> JsExpr {
        JsExpr::ident(name).call(args)
    }

    #[test]
    fn logs_calls_in_order() {
        let mut vm = JsVm::new();
        vm.define_logged("f");
        vm.define_logged("g");
        let expr = JsExpr::binary(
            BinaryOp::Add,
            call("f", vec![JsExpr::Number(1.0)]),
            call("g", vec![JsExpr::Number(2.0)]),
        );
        assert_eq!(vm.eval(&expr).unwrap(), Value::Number(3.0));
        assert_eq!(vm.logged_names(), vec!["f", "g"]);
    }

    #[test]
    fn closures_and_call() {
        let mut vm = JsVm::new();
        let stmts = vec![
            JsStmt::var("x", JsExpr::Number(10.0)),
            JsStmt::var("add", JsExpr::Function {
                params: vec!["y".to_owned()],
                body: vec![JsStmt::Return(Some(JsExpr::binary(
                    BinaryOp::Add,
                    JsExpr::binary(BinaryOp::Add, JsExpr::ident("x"), JsExpr::ident("y")),
                    JsExpr::This.member("z"),
                )))],
            }),
        ];
        vm.run(&stmts).unwrap();
        let this = JsExpr::Object(vec![("z".to_owned(), JsExpr::Number(100.0))]);
        let expr = JsExpr::path("add.call").call(vec![this, JsExpr::Number(1.0)]);
        assert_eq!(vm.eval(&expr).unwrap(), Value::Number(111.0));
    }

    #[test]
    fn rest_arguments() {
        let mut vm = JsVm::new();
        let function = JsExpr::Function {
            params: vec!["a".to_owned()],
            body: vec![
                JsStmt::var("rest", JsExpr::path("Array.prototype.slice.call").call(vec![JsExpr::ident("arguments"), JsExpr::Number(1.0)])),
                JsStmt::Return(Some(JsExpr::ident("rest"))),
            ],
        };
        let expr = function.call(vec![JsExpr::Number(1.0), JsExpr::Number(2.0), JsExpr::Number(3.0)]);
        let rest = vm.eval(&expr).unwrap().elements().unwrap();
        assert_eq!(rest, vec![Value::Number(2.0), Value::Number(3.0)]);
    }

    #[test]
    fn integer_wrapping() {
        assert_eq!(runtime::wrap_to_range(2147483648.0, -2147483648.0, 32), -2147483648.0);
        assert_eq!(runtime::wrap_to_range(-1.0, 0.0, 8), 255.0);
        assert_eq!(runtime::wrap_to_range(300.7, 0.0, 8), 44.0);

        let mut vm = JsVm::new();
        let check = JsExpr::path("$rt.check").call(vec![JsExpr::Number(300.0), JsExpr::string("byte")]);
        assert_eq!(vm.eval(&check).unwrap_err().name, "OverflowException");
    }

    #[test]
    fn multidim_arrays() {
        let mut vm = JsVm::new();
        let stmts = vec![
            JsStmt::var("a", JsExpr::path("$rt.multidimArray").call(vec![JsExpr::Number(0.0), JsExpr::Number(2.0), JsExpr::Number(3.0)])),
            JsStmt::Expr(JsExpr::path("$rt.arraySet").call(vec![JsExpr::ident("a"), JsExpr::Number(1.0), JsExpr::Number(2.0), JsExpr::Number(6.0)])),
        ];
        vm.run(&stmts).unwrap();
        let get = |i: f64, j: f64| JsExpr::path("$rt.arrayGet").call(vec![JsExpr::ident("a"), JsExpr::Number(i), JsExpr::Number(j)]);
        assert_eq!(vm.eval(&get(1.0, 2.0)).unwrap(), Value::Number(6.0));
        assert_eq!(vm.eval(&get(0.0, 2.0)).unwrap(), Value::Number(0.0));
        assert_eq!(vm.eval(&get(2.0, 0.0)).unwrap_err().name, "IndexOutOfRangeException");
    }

    #[test]
    fn inline_code_text() {
        use crate::js::VerbatimPart::{Expr, Text};

        let mut vm = JsVm::new();
        vm.set_global("o", Value::plain(vec![("n", Value::Number(4.0))]));
        let eval = |vm: &mut JsVm, parts: Vec<crate::js::VerbatimPart>| vm.eval(&JsExpr::Verbatim(parts));

        let parts = vec![Expr(JsExpr::Number(2.0)), Text(" + o.n * 3 - (1 ? -1 : 5)".to_owned())];
        assert_eq!(eval(&mut vm, parts).unwrap(), Value::Number(15.0));

        let parts = vec![Text("[1, 'a\\'b'].length === ".to_owned()), Expr(JsExpr::Number(2.0))];
        assert_eq!(eval(&mut vm, parts).unwrap(), Value::Bool(true));

        let parts = vec![Text("o.n += ".to_owned()), Expr(JsExpr::Number(1.0))];
        assert_eq!(eval(&mut vm, parts).unwrap(), Value::Number(5.0));

        let parts = vec![Text("1 +".to_owned())];
        assert_eq!(eval(&mut vm, parts).unwrap_err().name, "SyntaxError");
    }

    #[test]
    fn number_formatting() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
    }
}
