//! Building programs and typed expressions by hand.
//!
//! The resolver normally produces these.  Tests (and embedders that synthesize code) use
//! [`ProgramBuilder`] to declare symbols and [`ExprFactory`] to assemble typed trees whose node
//! types are filled in from the declarations.

use crate::pos::Sp;

use super::*;

/// Incrementally declares the symbols of a [`Program`].
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    program: Program,
}

fn type_def(name: &str, kind: TypeKind) -> TypeDef {
    TypeDef { name: name.to_owned(), kind, base: None, interfaces: vec![], type_params: vec![] }
}

impl ProgramBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn finish(self) -> Program { self.program }

    /// Look at what has been declared so far.
    pub fn program(&self) -> &Program { &self.program }

    pub fn add_type(&mut self, def: TypeDef) -> TypeDefId {
        self.program.types.push(def);
        TypeDefId(self.program.types.len() as u32 - 1)
    }

    pub fn class(&mut self, name: &str) -> TypeDefId { self.add_type(type_def(name, TypeKind::Class)) }
    pub fn struct_(&mut self, name: &str) -> TypeDefId { self.add_type(type_def(name, TypeKind::Struct)) }
    pub fn interface(&mut self, name: &str) -> TypeDefId { self.add_type(type_def(name, TypeKind::Interface)) }

    pub fn enum_(&mut self, name: &str, underlying: Primitive) -> TypeDefId {
        self.add_type(type_def(name, TypeKind::Enum { underlying }))
    }

    /// Declares a delegate type along with its `Invoke` method.
    pub fn delegate(&mut self, name: &str, params: Vec<ParamDef>, return_type: Type) -> TypeDefId {
        // placeholder kind until the invoke method exists
        let id = self.add_type(type_def(name, TypeKind::Class));
        let invoke = self.add_method(MethodDef {
            name: "Invoke".to_owned(),
            declaring: id,
            kind: MethodKind::Ordinary,
            is_static: false,
            is_overridable: false,
            is_extension: false,
            params,
            return_type,
            type_params: vec![],
        });
        self.type_mut(id).kind = TypeKind::Delegate { invoke };
        id
    }

    pub fn type_mut(&mut self, id: TypeDefId) -> &mut TypeDef { &mut self.program.types[id.index()] }

    pub fn add_method(&mut self, def: MethodDef) -> MethodId {
        self.program.methods.push(def);
        MethodId(self.program.methods.len() as u32 - 1)
    }

    pub fn method_mut(&mut self, id: MethodId) -> &mut MethodDef { &mut self.program.methods[id.index()] }

    fn plain_method(&mut self, declaring: TypeDefId, name: &str, kind: MethodKind, is_static: bool, params: Vec<ParamDef>, return_type: Type) -> MethodId {
        self.add_method(MethodDef {
            name: name.to_owned(),
            declaring,
            kind,
            is_static,
            is_overridable: false,
            is_extension: false,
            params,
            return_type,
            type_params: vec![],
        })
    }

    pub fn method(&mut self, declaring: TypeDefId, name: &str, params: Vec<ParamDef>, return_type: Type) -> MethodId {
        self.plain_method(declaring, name, MethodKind::Ordinary, false, params, return_type)
    }

    pub fn static_method(&mut self, declaring: TypeDefId, name: &str, params: Vec<ParamDef>, return_type: Type) -> MethodId {
        self.plain_method(declaring, name, MethodKind::Ordinary, true, params, return_type)
    }

    pub fn virtual_method(&mut self, declaring: TypeDefId, name: &str, params: Vec<ParamDef>, return_type: Type) -> MethodId {
        let id = self.method(declaring, name, params, return_type);
        self.method_mut(id).is_overridable = true;
        id
    }

    pub fn constructor(&mut self, declaring: TypeDefId, params: Vec<ParamDef>) -> MethodId {
        self.plain_method(declaring, ".ctor", MethodKind::Constructor, false, params, Type::Void)
    }

    /// A static user-defined operator, such as `op_Addition`.
    pub fn operator(&mut self, declaring: TypeDefId, name: &str, params: Vec<ParamDef>, return_type: Type) -> MethodId {
        self.plain_method(declaring, name, MethodKind::Operator, true, params, return_type)
    }

    fn add_field(&mut self, def: FieldDef) -> FieldId {
        self.program.fields.push(def);
        FieldId(self.program.fields.len() as u32 - 1)
    }

    pub fn field_mut(&mut self, id: FieldId) -> &mut FieldDef { &mut self.program.fields[id.index()] }

    pub fn field(&mut self, declaring: TypeDefId, name: &str, ty: Type) -> FieldId {
        self.add_field(FieldDef { name: name.to_owned(), declaring, ty, is_static: false, constant: None, is_readonly: false })
    }

    pub fn static_field(&mut self, declaring: TypeDefId, name: &str, ty: Type) -> FieldId {
        let id = self.field(declaring, name, ty);
        self.field_mut(id).is_static = true;
        id
    }

    pub fn readonly_field(&mut self, declaring: TypeDefId, name: &str, ty: Type) -> FieldId {
        let id = self.field(declaring, name, ty);
        self.field_mut(id).is_readonly = true;
        id
    }

    pub fn const_field(&mut self, declaring: TypeDefId, name: &str, ty: Type, value: Constant) -> FieldId {
        self.add_field(FieldDef { name: name.to_owned(), declaring, ty, is_static: true, constant: Some(value), is_readonly: true })
    }

    fn add_property(&mut self, declaring: TypeDefId, name: &str, ty: Type, params: Vec<ParamDef>, is_auto: bool) -> PropertyId {
        let accessor_name = if params.is_empty() { name } else { "Item" };
        let getter = self.plain_method(declaring, &format!("get_{}", accessor_name), MethodKind::PropertyGetter, false, params.clone(), ty.clone());
        let mut setter_params = params.clone();
        setter_params.push(ParamDef::new("value", ty.clone()));
        let setter = self.plain_method(declaring, &format!("set_{}", accessor_name), MethodKind::PropertySetter, false, setter_params, Type::Void);

        self.program.properties.push(PropertyDef {
            name: name.to_owned(),
            declaring,
            ty,
            is_static: false,
            getter: Some(getter),
            setter: Some(setter),
            params,
            is_auto,
        });
        PropertyId(self.program.properties.len() as u32 - 1)
    }

    pub fn property_mut(&mut self, id: PropertyId) -> &mut PropertyDef { &mut self.program.properties[id.index()] }

    /// A property with explicit get and set accessors.
    pub fn property(&mut self, declaring: TypeDefId, name: &str, ty: Type) -> PropertyId {
        self.add_property(declaring, name, ty, vec![], false)
    }

    /// `{ get; set; }`
    pub fn auto_property(&mut self, declaring: TypeDefId, name: &str, ty: Type) -> PropertyId {
        self.add_property(declaring, name, ty, vec![], true)
    }

    pub fn indexer(&mut self, declaring: TypeDefId, params: Vec<ParamDef>, ty: Type) -> PropertyId {
        self.add_property(declaring, "this[]", ty, params, false)
    }

    /// Makes a property (and its accessors) static.
    pub fn make_static(&mut self, id: PropertyId) {
        let property = self.property_mut(id);
        property.is_static = true;
        let accessors = [property.getter, property.setter];
        for accessor in accessors.iter().flatten() {
            self.method_mut(*accessor).is_static = true;
        }
    }

    pub fn event(&mut self, declaring: TypeDefId, name: &str, ty: Type) -> EventId {
        let handler = vec![ParamDef::new("value", ty.clone())];
        let adder = self.plain_method(declaring, &format!("add_{}", name), MethodKind::EventAdder, false, handler.clone(), Type::Void);
        let remover = self.plain_method(declaring, &format!("remove_{}", name), MethodKind::EventRemover, false, handler, Type::Void);
        self.program.events.push(EventDef { name: name.to_owned(), declaring, ty, is_static: false, adder, remover });
        EventId(self.program.events.len() as u32 - 1)
    }

    pub fn local(&mut self, name: &str, ty: Type) -> LocalId {
        self.program.locals.push(LocalDef { name: name.to_owned(), ty, is_ref_param: false });
        LocalId(self.program.locals.len() as u32 - 1)
    }

    /// A `ref` or `out` parameter of the method being compiled.
    pub fn ref_param(&mut self, name: &str, ty: Type) -> LocalId {
        let id = self.local(name, ty);
        self.program.locals[id.index()].is_ref_param = true;
        id
    }

    pub fn anonymous_type(&mut self, members: Vec<(&str, Type)>) -> Type {
        let members = members.into_iter().map(|(name, ty)| (name.to_owned(), ty)).collect();
        self.program.anonymous_types.push(AnonymousTypeDef { members });
        Type::Anonymous(self.program.anonymous_types.len() as u32 - 1)
    }
}

// =============================================================================

/// Builds typed expression nodes, taking their types from the declarations of a program.
///
/// All nodes have dummy spans.
#[derive(Debug, Copy, Clone)]
pub struct ExprFactory<'a> {
    program: &'a Program,
}

fn node(kind: ExprKind, ty: Type) -> Sp<Expr> {
    sp!(Expr { kind, ty, conversion: None })
}

fn boxed(expr: Sp<Expr>) -> Box<Sp<Expr>> { Box::new(expr) }

impl<'a> ExprFactory<'a> {
    pub fn new(program: &'a Program) -> Self { ExprFactory { program } }

    pub fn node(&self, kind: ExprKind, ty: Type) -> Sp<Expr> { node(kind, ty) }

    pub fn literal(&self, value: Constant, ty: Type) -> Sp<Expr> { node(ExprKind::Literal(value), ty) }
    pub fn int(&self, value: i64) -> Sp<Expr> { self.literal(Constant::Int(value), Type::INT) }
    pub fn double(&self, value: f64) -> Sp<Expr> { self.literal(Constant::Float(value), Type::DOUBLE) }
    pub fn bool(&self, value: bool) -> Sp<Expr> { self.literal(Constant::Bool(value), Type::BOOL) }
    pub fn string(&self, value: &str) -> Sp<Expr> { self.literal(Constant::String(value.to_owned()), Type::STRING) }
    pub fn null(&self) -> Sp<Expr> { self.literal(Constant::Null, Type::Null) }

    pub fn local(&self, id: LocalId) -> Sp<Expr> {
        node(ExprKind::Local(id), self.program.local(id).ty.clone())
    }

    pub fn this(&self, ty: TypeDefId) -> Sp<Expr> { node(ExprKind::This, Type::named(ty)) }

    pub fn field(&self, receiver: Option<Sp<Expr>>, field: FieldId) -> Sp<Expr> {
        let ty = self.program.field(field).ty.clone();
        node(ExprKind::Field { receiver: receiver.map(boxed), field: MemberRef::new(field) }, ty)
    }

    pub fn property(&self, receiver: Option<Sp<Expr>>, property: PropertyId) -> Sp<Expr> {
        self.indexer(receiver, property, vec![])
    }

    pub fn indexer(&self, receiver: Option<Sp<Expr>>, property: PropertyId, args: Vec<Sp<Expr>>) -> Sp<Expr> {
        let ty = self.program.property(property).ty.clone();
        node(ExprKind::Property { receiver: receiver.map(boxed), property: MemberRef::new(property), args }, ty)
    }

    pub fn event(&self, receiver: Option<Sp<Expr>>, event: EventId) -> Sp<Expr> {
        let ty = self.program.event(event).ty.clone();
        node(ExprKind::Event { receiver: receiver.map(boxed), event: MemberRef::new(event) }, ty)
    }

    /// A call with arguments in parameter order.
    pub fn call(&self, receiver: Option<Sp<Expr>>, method: MethodId, args: Vec<Sp<Expr>>) -> Sp<Expr> {
        self.call_with(Invocation {
            receiver: receiver.map(boxed),
            method: MethodRef::new(method),
            args,
            arg_map: None,
            expanded: false,
            is_non_virtual: false,
        })
    }

    pub fn call_with(&self, invocation: Invocation) -> Sp<Expr> {
        let method = self.program.method(invocation.method.method);
        let ty = method.return_type.substitute(&invocation.method.type_args, &invocation.method.method_args);
        node(ExprKind::Invocation(invocation), ty)
    }

    pub fn new_object(&self, ty: TypeDefId, ctor: Option<MethodId>, args: Vec<Sp<Expr>>) -> Sp<Expr> {
        node(ExprKind::ObjectCreation(ObjectCreation {
            ctor: ctor.map(MethodRef::new),
            args,
            arg_map: None,
            expanded: false,
            initializers: vec![],
        }), Type::named(ty))
    }

    pub fn method_group(&self, receiver: Option<Sp<Expr>>, method: MethodId, delegate: TypeDefId) -> Sp<Expr> {
        let expr = node(ExprKind::MethodGroup {
            receiver: receiver.map(boxed),
            method: MethodRef::new(method),
            is_non_virtual: false,
        }, Type::Void);
        self.convert(expr, ConversionKind::MethodGroup, Type::named(delegate))
    }

    pub fn array_element(&self, array: Sp<Expr>, indices: Vec<Sp<Expr>>) -> Sp<Expr> {
        let ty = match &array.ty {
            Type::Array { elem, .. } => (**elem).clone(),
            _ => Type::Dynamic,
        };
        node(ExprKind::ArrayElement { array: boxed(array), indices }, ty)
    }

    pub fn unary(&self, op: UnaryOp, operand: Sp<Expr>) -> Sp<Expr> {
        let ty = match op {
            UnaryOp::Not => Type::BOOL,
            _ => operand.ty.clone(),
        };
        node(ExprKind::Unary { op, operand: boxed(operand), info: OperatorInfo::default() }, ty)
    }

    /// A built-in binary operator.  The result has the type of the left operand, or `bool` for
    /// comparisons and logical operators.
    pub fn binary(&self, op: BinaryOp, left: Sp<Expr>, right: Sp<Expr>) -> Sp<Expr> {
        let ty = match op {
            _ if op.is_comparison() => Type::BOOL,
            BinaryOp::AndAlso | BinaryOp::OrElse => Type::BOOL,
            _ => left.ty.clone(),
        };
        self.binary_with(op, left, right, ty, OperatorInfo::default())
    }

    pub fn binary_with(&self, op: BinaryOp, left: Sp<Expr>, right: Sp<Expr>, ty: Type, info: OperatorInfo) -> Sp<Expr> {
        node(ExprKind::Binary { op, left: boxed(left), right: boxed(right), info }, ty)
    }

    pub fn assign(&self, target: Sp<Expr>, value: Sp<Expr>) -> Sp<Expr> {
        let ty = target.ty.clone();
        node(ExprKind::Assign { target: boxed(target), value: boxed(value) }, ty)
    }

    pub fn compound_assign(&self, op: BinaryOp, target: Sp<Expr>, value: Sp<Expr>) -> Sp<Expr> {
        let ty = target.ty.clone();
        node(ExprKind::CompoundAssign { op, target: boxed(target), value: boxed(value), info: OperatorInfo::default() }, ty)
    }

    pub fn inc_dec(&self, op: IncDecOp, target: Sp<Expr>) -> Sp<Expr> {
        let ty = target.ty.clone();
        node(ExprKind::IncDec { op, target: boxed(target), info: OperatorInfo::default() }, ty)
    }

    pub fn conditional(&self, cond: Sp<Expr>, then: Sp<Expr>, else_: Sp<Expr>) -> Sp<Expr> {
        let ty = then.converted_type().clone();
        node(ExprKind::Conditional { cond: boxed(cond), then: boxed(then), else_: boxed(else_) }, ty)
    }

    /// Attach an implicit conversion.
    pub fn convert(&self, mut expr: Sp<Expr>, kind: ConversionKind, to: Type) -> Sp<Expr> {
        expr.value.conversion = Some(Box::new(Conversion { kind, to, is_checked: false }));
        expr
    }

    /// An explicit cast.
    pub fn cast(&self, operand: Sp<Expr>, kind: ConversionKind, to: Type, is_checked: bool) -> Sp<Expr> {
        let conversion = Conversion { kind, to: to.clone(), is_checked };
        node(ExprKind::Cast { operand: boxed(operand), conversion }, to)
    }

    pub fn lambda(&self, params: Vec<LocalId>, body: Sp<Expr>, delegate: TypeDefId) -> Sp<Expr> {
        let return_type = body.converted_type().clone();
        let expr = node(ExprKind::Lambda(Lambda {
            params,
            body: LambdaBody::Expr(boxed(body)),
            return_type,
            captures: NestedFunctionContext::default(),
        }), Type::Void);
        self.convert(expr, ConversionKind::AnonymousFunction, Type::named(delegate))
    }
}
