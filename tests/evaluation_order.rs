//! Side effects in the generated code happen in source order, exactly once.
//!
//! Every test calls static methods of a class `C` whose methods are implemented in the VM by
//! logged functions that return their first argument.

mod common;
use common::{logged_object, Lowering};

use jslower::js::{JsExpr, JsStmt};
use jslower::metadata::MethodSemantics;
use jslower::model::build::ExprFactory;
use jslower::model::{BinaryOp, IncDecOp, Invocation, MethodId, MethodRef, ParamDef, ProgramBuilder, Type, TypeDefId};
use jslower::vm::{JsVm, Value};

/// Declares `static T Name(T x)` on `C` for each name.
fn identity_methods(b: &mut ProgramBuilder, class: TypeDefId, ty: Type, names: &[&str]) -> Vec<MethodId> {
    names.iter().map(|name| b.static_method(class, name, vec![ParamDef::new("x", ty.clone())], ty.clone())).collect()
}

fn vm_with_class(methods: &[&str]) -> JsVm {
    let mut vm = JsVm::new();
    vm.set_global("C", logged_object(methods));
    vm
}

#[test]
fn operands_left_to_right() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let m = identity_methods(&mut b, c, Type::INT, &["F", "G", "H"]);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    // F(1) + G(2) * H(3)
    let expr = f.binary(
        BinaryOp::Add,
        f.call(None, m[0], vec![f.int(1)]),
        f.binary(BinaryOp::Mul, f.call(None, m[1], vec![f.int(2)]), f.call(None, m[2], vec![f.int(3)])),
    );
    let lowered = Lowering::new(&program).lower(&expr);
    lowered.assert_no_errors();

    let mut vm = vm_with_class(&["f", "g", "h"]);
    assert_eq!(lowered.run(&mut vm), Value::Number(7.0));
    assert_eq!(vm.logged_names(), vec!["f", "g", "h"]);
}

#[test]
fn named_arguments_keep_source_order() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let m = identity_methods(&mut b, c, Type::INT, &["F", "G"]);
    let target = b.static_method(c, "M", vec![ParamDef::new("a", Type::INT), ParamDef::new("b", Type::INT)], Type::INT);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    // M(b: G(2), a: F(1))
    let expr = f.call_with(Invocation {
        receiver: None,
        method: MethodRef::new(target),
        args: vec![f.call(None, m[1], vec![f.int(2)]), f.call(None, m[0], vec![f.int(1)])],
        arg_map: Some(vec![1, 0]),
        expanded: false,
        is_non_virtual: false,
    });
    let lowered = Lowering::new(&program).lower(&expr);
    lowered.assert_no_errors();

    let mut vm = vm_with_class(&["f", "g", "m"]);
    lowered.run(&mut vm);
    assert_eq!(vm.logged_names(), vec!["g", "f", "m"]);
    assert_eq!(vm.call_log[2].args, vec![Value::Number(1.0), Value::Number(2.0)]);
}

#[test]
fn compound_assignment_to_element() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let m = identity_methods(&mut b, c, Type::INT, &["F", "G"]);
    let a = b.local("a", Type::array(Type::INT, 1));
    let program = b.finish();
    let f = ExprFactory::new(&program);

    // a[F(0)] += G(5)
    let target = f.array_element(f.local(a), vec![f.call(None, m[0], vec![f.int(0)])]);
    let expr = f.compound_assign(BinaryOp::Add, target, f.call(None, m[1], vec![f.int(5)]));
    let lowered = Lowering::new(&program).lower(&expr);
    lowered.assert_no_errors();

    let mut vm = vm_with_class(&["f", "g"]);
    vm.set_global("a", Value::array(vec![Value::Number(10.0)]));
    assert_eq!(lowered.run(&mut vm), Value::Number(15.0));
    assert_eq!(vm.logged_names(), vec!["f", "g"]);
    assert_eq!(vm.global("a").and_then(|a| a.elements()), Some(vec![Value::Number(15.0)]));
}

#[test]
fn short_circuit_skips_right_operand() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let m = identity_methods(&mut b, c, Type::BOOL, &["P", "Q"]);
    let program = b.finish();
    let f = ExprFactory::new(&program);
    let and = |left: bool, right: bool| f.binary(
        BinaryOp::AndAlso,
        f.call(None, m[0], vec![f.bool(left)]),
        f.call(None, m[1], vec![f.bool(right)]),
    );

    let lowering = Lowering::new(&program);
    let mut vm = vm_with_class(&["p", "q"]);
    assert_eq!(lowering.lower(&and(false, true)).run(&mut vm), Value::Bool(false));
    assert_eq!(vm.logged_names(), vec!["p"]);

    let mut vm = vm_with_class(&["p", "q"]);
    assert_eq!(lowering.lower(&and(true, true)).run(&mut vm), Value::Bool(true));
    assert_eq!(vm.logged_names(), vec!["p", "q"]);
}

#[test]
fn assignments_in_branches() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let m = identity_methods(&mut b, c, Type::INT, &["F", "G"]);
    let p = identity_methods(&mut b, c, Type::BOOL, &["P"])[0];
    let x = b.local("x", Type::INT);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    // P(cond) ? (x = F(1)) : (x = G(2))
    let expr = |cond: bool| f.conditional(
        f.call(None, p, vec![f.bool(cond)]),
        f.assign(f.local(x), f.call(None, m[0], vec![f.int(1)])),
        f.assign(f.local(x), f.call(None, m[1], vec![f.int(2)])),
    );
    let lowering = Lowering::new(&program);
    for (cond, expected, log) in [(true, 1.0, ["p", "f"]), (false, 2.0, ["p", "g"])] {
        let lowered = lowering.lower(&expr(cond));
        lowered.assert_no_errors();
        let mut vm = vm_with_class(&["f", "g", "p"]);
        vm.set_global("x", Value::Number(0.0));
        assert_eq!(lowered.run(&mut vm), Value::Number(expected));
        assert_eq!(vm.global("x"), Some(Value::Number(expected)));
        assert_eq!(vm.logged_names(), log.to_vec());
    }
}

#[test]
fn receiver_before_arguments() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let counter = b.class("Counter");
    let get = b.static_method(c, "Get", vec![ParamDef::new("x", Type::named(counter))], Type::named(counter));
    let add = b.method(counter, "Add", vec![ParamDef::new("x", Type::INT)], Type::INT);
    let m = identity_methods(&mut b, c, Type::INT, &["F"]);
    let obj = b.local("obj", Type::named(counter));
    let program = b.finish();
    let f = ExprFactory::new(&program);

    // Get(obj).Add(F(1))
    let receiver = f.call(None, get, vec![f.local(obj)]);
    let expr = f.call(Some(receiver), add, vec![f.call(None, m[0], vec![f.int(1)])]);
    let lowered = Lowering::new(&program).lower(&expr);
    lowered.assert_no_errors();

    let mut vm = vm_with_class(&["get", "f"]);
    vm.set_global("obj", logged_object(&["add"]));
    lowered.run(&mut vm);
    assert_eq!(vm.logged_names(), vec!["get", "f", "add"]);
}

#[test]
fn inline_code_with_reversed_parameters() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let m = identity_methods(&mut b, c, Type::INT, &["F", "G"]);
    let sub = b.static_method(c, "Sub", vec![ParamDef::new("a", Type::INT), ParamDef::new("b", Type::INT)], Type::INT);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    // Sub(F(1), G(2)) with the template "{b} - {a}"
    let mut lowering = Lowering::new(&program);
    lowering.metadata.set_method(sub, MethodSemantics::inline_code("{b} - {a}"));
    let expr = f.call(None, sub, vec![f.call(None, m[0], vec![f.int(1)]), f.call(None, m[1], vec![f.int(2)])]);
    let lowered = lowering.lower(&expr);
    lowered.assert_no_errors();

    let mut vm = vm_with_class(&["f", "g"]);
    assert_eq!(lowered.run(&mut vm), Value::Number(1.0));
    assert_eq!(vm.logged_names(), vec!["f", "g"]);
}

#[test]
fn accessor_property_receiver_evaluated_once() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let counter = b.class("Counter");
    let value = b.property(counter, "Value", Type::INT);
    let get = b.static_method(c, "Get", vec![ParamDef::new("x", Type::named(counter))], Type::named(counter));
    let obj = b.local("obj", Type::named(counter));
    let program = b.finish();
    let f = ExprFactory::new(&program);
    let lowering = Lowering::new(&program);
    let target = || f.property(Some(f.call(None, get, vec![f.local(obj)])), value);

    let mut vm = vm_with_class(&["get"]);
    let field = || JsExpr::This.member("v");
    vm.run(&[JsStmt::var("obj", JsExpr::Object(vec![
        ("v".to_owned(), JsExpr::Number(1.0)),
        ("get_value".to_owned(), JsExpr::Function { params: vec![], body: vec![JsStmt::Return(Some(field()))] }),
        ("set_value".to_owned(), JsExpr::Function {
            params: vec!["value".to_owned()],
            body: vec![JsStmt::Expr(JsExpr::assign(field(), JsExpr::ident("value")))],
        }),
    ]))]).unwrap();
    let v = |vm: &JsVm| vm.global("obj").and_then(|obj| obj.get("v"));

    // Get(obj).Value += 1
    let lowered = lowering.lower(&f.compound_assign(BinaryOp::Add, target(), f.int(1)));
    lowered.assert_no_errors();
    assert_eq!(lowered.run(&mut vm), Value::Number(2.0));
    assert_eq!(v(&vm), Some(Value::Number(2.0)));
    assert_eq!(vm.logged_names(), vec!["get"]);

    // Get(obj).Value++
    let lowered = lowering.lower(&f.inc_dec(IncDecOp::PostInc, target()));
    lowered.assert_no_errors();
    assert_eq!(lowered.run(&mut vm), Value::Number(2.0));
    assert_eq!(v(&vm), Some(Value::Number(3.0)));
    assert_eq!(vm.logged_names(), vec!["get", "get"]);
}
