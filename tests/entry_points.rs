//! The entry points other than `compile_expression`, which embedders use for code they
//! synthesize themselves.

mod common;
use common::Lowering;

use jslower::js::fmt::stringify_stmts;
use jslower::js::JsExpr;
use jslower::lower::AttributeMember;
use jslower::metadata::ConstructorSemantics;
use jslower::model::build::ExprFactory;
use jslower::model::{
    BinaryOp, Constant, Conversion, ConversionKind, FieldRef, IncDecOp, Invocation, MethodRef, ParamDef,
    ProgramBuilder, PropertyRef, Type,
};
use jslower::vm::{JsVm, Value};
use jslower::Span;

#[test]
fn method_invocation() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let add = b.static_method(c, "Add", vec![ParamDef::new("a", Type::INT), ParamDef::new("b", Type::INT)], Type::INT);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let invocation = Invocation {
        receiver: None,
        method: MethodRef::new(add),
        args: vec![f.int(1), f.int(2)],
        arg_map: None,
        expanded: false,
        is_non_virtual: false,
    };
    let lowered = Lowering::new(&program).lower_with(|compiler| compiler.compile_method_invocation(&invocation, Span::NULL));
    lowered.assert_no_errors();
    assert_eq!(lowered.js(), "C.add(1, 2)");
}

#[test]
fn constructor_invocation_with_compiled_args() {
    let mut b = ProgramBuilder::new();
    let point = b.class("Point");
    let ctor = b.constructor(point, vec![ParamDef::new("x", Type::INT), ParamDef::new("y", Type::INT)]);
    let program = b.finish();

    let lowered = Lowering::new(&program).lower_with(|compiler| compiler.compile_constructor_invocation(
        &MethodRef::new(ctor),
        &Type::named(point),
        vec![JsExpr::Number(1.0), JsExpr::ident("y")],
        Span::NULL,
    ));
    lowered.assert_no_errors();
    assert_eq!(lowered.js(), "new Point(1, y)");
}

#[test]
fn property_read() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let explicit = b.property(c, "Value", Type::INT);
    let auto = b.auto_property(c, "Count", Type::INT);
    let obj = b.local("obj", Type::named(c));
    let program = b.finish();
    let f = ExprFactory::new(&program);
    let lowering = Lowering::new(&program);

    let receiver = f.local(obj);
    let lowered = lowering.lower_with(|compiler| compiler.compile_property_read(Some(&receiver), &PropertyRef::new(explicit), Span::NULL));
    assert_eq!(lowered.js(), "obj.get_value()");

    let lowered = lowering.lower_with(|compiler| compiler.compile_property_read(Some(&receiver), &PropertyRef::new(auto), Span::NULL));
    assert_eq!(lowered.js(), "obj.count");
}

#[test]
fn conversion_of_compiled_value() {
    let program = ProgramBuilder::new().finish();
    let conversion = Conversion { kind: ConversionKind::ExplicitNumeric, to: Type::INT, is_checked: false };

    let lowered = Lowering::new(&program).lower_with(|compiler| compiler.compile_conversion(JsExpr::ident("d"), &Type::DOUBLE, &conversion, Span::NULL));
    lowered.assert_no_errors();
    for (input, expected) in [(3.7, 3.0), (-3.7, -3.0)] {
        let mut vm = JsVm::new();
        vm.set_global("d", Value::Number(input));
        assert_eq!(lowered.run(&mut vm), Value::Number(expected));
    }
}

#[test]
fn constructor_initializer() {
    let mut b = ProgramBuilder::new();
    let base = b.class("Base");
    let base_ctor = b.constructor(base, vec![ParamDef::new("x", Type::INT)]);
    let derived = b.class("Derived");
    let derived_ctor = b.constructor(derived, vec![]);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let mut lowering = Lowering::new(&program);
    lowering.method = Some(derived_ctor);
    let args = [f.int(1)];
    let lowered = lowering.lower_with(|compiler| compiler.compile_constructor_initializer(&MethodRef::new(base_ctor), &args, None, false, Span::NULL));
    lowered.assert_no_errors();
    assert_eq!(stringify_stmts(&lowered.compiled.stmts), "Base.call(this, 1);\n");
    assert_eq!(lowered.compiled.expr, JsExpr::Null);

    // a base constructor that isn't invoked with `new` can't be chained to
    lowering.metadata.set_constructor(base_ctor, ConstructorSemantics::StaticMethod { name: "create".to_owned(), expand_params: false });
    let lowered = lowering.lower_with(|compiler| compiler.compile_constructor_initializer(&MethodRef::new(base_ctor), &args, None, false, Span::NULL));
    assert_eq!(lowered.error_codes(), vec!["E0712"]);
    assert!(lowered.compiled.stmts.is_empty());
}

#[test]
fn attribute_construction() {
    let mut b = ProgramBuilder::new();
    let attr = b.class("Attr");
    let ctor = b.constructor(attr, vec![ParamDef::new("level", Type::INT)]);
    let name = b.auto_property(attr, "Name", Type::STRING);
    let tag = b.field(attr, "Tag", Type::BOOL);
    let program = b.finish();

    let named = [
        (AttributeMember::Property(PropertyRef::new(name)), Constant::String("x".to_owned())),
        (AttributeMember::Field(FieldRef::new(tag)), Constant::Bool(true)),
    ];
    let lowered = Lowering::new(&program).lower_with(|compiler| compiler.compile_attribute_construction(
        &MethodRef::new(ctor),
        &Type::named(attr),
        &[Constant::Int(3)],
        &named,
        Span::NULL,
    ));
    lowered.assert_no_errors();
    assert_eq!(lowered.js(), "var $t0 = new Attr(3);\n$t0.name = \"x\";\n$t0.tag = true;\n$t0");
}

#[test]
fn batch_reports_every_error() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let limit = b.const_field(c, "Limit", Type::INT, Constant::Int(10));
    let value = b.readonly_field(c, "Value", Type::INT);
    let x = b.local("x", Type::INT);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let exprs = [
        f.assign(f.field(None, limit), f.int(1)),
        f.binary(BinaryOp::Add, f.local(x), f.int(1)),
        f.assign(f.field(Some(f.this(c)), value), f.int(2)),
    ];
    let (compiled, emitter) = Lowering::new(&program).lower_all(&exprs);
    assert_eq!(compiled.len(), 3);
    assert_eq!(emitter.codes(), vec!["E0701", "E0701"]);
}

#[test]
fn postfix_increment_yields_old_value() {
    let mut b = ProgramBuilder::new();
    let x = b.local("x", Type::INT);
    let a = b.local("a", Type::array(Type::INT, 1));
    let program = b.finish();
    let f = ExprFactory::new(&program);
    let lowering = Lowering::new(&program);

    let lowered = lowering.lower(&f.inc_dec(IncDecOp::PostInc, f.local(x)));
    let mut vm = JsVm::new();
    vm.set_global("x", Value::Number(5.0));
    assert_eq!(lowered.run(&mut vm), Value::Number(5.0));
    assert_eq!(vm.global("x"), Some(Value::Number(6.0)));

    // int.MaxValue++ wraps
    let lowered = lowering.lower(&f.inc_dec(IncDecOp::PreInc, f.array_element(f.local(a), vec![f.int(0)])));
    let mut vm = JsVm::new();
    vm.set_global("a", Value::array(vec![Value::Number(i32::MAX as f64)]));
    assert_eq!(lowered.run(&mut vm), Value::Number(i32::MIN as f64));
    assert_eq!(vm.global("a").and_then(|a| a.elements()), Some(vec![Value::Number(i32::MIN as f64)]));
}
