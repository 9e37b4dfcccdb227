//! Lowered code run in the VM behaves like the source program would.

mod common;
use common::{logged_object, Lowering};

use rand::Rng;

use jslower::js::{JsExpr, JsStmt};
use jslower::model::build::ExprFactory;
use jslower::model::{
    ArrayInit, Await, BinaryOp, Constant, ConversionKind, ExprKind, MethodRef, OperatorInfo, ParamDef, Primitive,
    ProgramBuilder, Query, QueryBody, QueryClause, QueryEnd, Type,
};
use jslower::vm::{JsVm, Value};
use jslower::{sp, Sp};

#[test]
fn multidimensional_initializer_is_row_major() {
    let b = ProgramBuilder::new();
    let program = b.finish();
    let f = ExprFactory::new(&program);

    // new int[,] { { 1, 2, 3 }, { 4, 5, 6 } }[i, j]
    let row = |values: [i64; 3]| ArrayInit::List(values.iter().map(|&x| ArrayInit::Element(Box::new(f.int(x)))).collect());
    let creation = || f.node(ExprKind::ArrayCreation {
        elem: Type::INT,
        sizes: vec![],
        init: Some(ArrayInit::List(vec![row([1, 2, 3]), row([4, 5, 6])])),
    }, Type::array(Type::INT, 2));

    let lowering = Lowering::new(&program);
    for (i, j, expected) in [(1, 2, 6.0), (0, 1, 2.0), (1, 0, 4.0)] {
        let expr = f.array_element(creation(), vec![f.int(i), f.int(j)]);
        let lowered = lowering.lower(&expr);
        lowered.assert_no_errors();
        assert_eq!(lowered.run(&mut JsVm::new()), Value::Number(expected));
    }
}

#[test]
fn multidimensional_array_defaults_and_bounds() {
    let b = ProgramBuilder::new();
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let creation = || f.node(ExprKind::ArrayCreation {
        elem: Type::INT,
        sizes: vec![f.int(2), f.int(3)],
        init: None,
    }, Type::array(Type::INT, 2));

    let lowering = Lowering::new(&program);
    let lowered = lowering.lower(&f.array_element(creation(), vec![f.int(1), f.int(2)]));
    assert_eq!(lowered.run(&mut JsVm::new()), Value::Number(0.0));

    let lowered = lowering.lower(&f.array_element(creation(), vec![f.int(2), f.int(0)]));
    let err = JsVm::new().eval_with(&lowered.compiled.stmts, &lowered.compiled.expr).unwrap_err();
    assert_eq!(err.name, "IndexOutOfRangeException");
}

#[test]
fn empty_initializer_keeps_the_declared_rank() {
    let b = ProgramBuilder::new();
    let program = b.finish();
    let f = ExprFactory::new(&program);
    let lowering = Lowering::new(&program);
    let empty = |rank| f.node(ExprKind::ArrayCreation {
        elem: Type::INT,
        sizes: vec![],
        init: Some(ArrayInit::List(vec![])),
    }, Type::array(Type::INT, rank));

    // new int[] {}
    let lowered = lowering.lower(&empty(1));
    lowered.assert_no_errors();
    assert_eq!(lowered.js(), "[]");

    // new int[,] {}
    let lowered = lowering.lower(&empty(2));
    lowered.assert_no_errors();
    assert!(lowered.js().contains("$rt.multidimArray(0, 0, 0)"), "{}", lowered.js());
}

#[test]
fn struct_assignment_copies() {
    let mut b = ProgramBuilder::new();
    let point = b.struct_("Point");
    let x = b.field(point, "X", Type::INT);
    let p = b.local("p", Type::named(point));
    let q = b.local("q", Type::named(point));
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let lowering = Lowering::new(&program);
    let copy = lowering.lower(&f.assign(f.local(q), f.local(p)));
    let mutate = lowering.lower(&f.assign(f.field(Some(f.local(p)), x), f.int(5)));
    copy.assert_no_errors();
    mutate.assert_no_errors();

    let mut vm = JsVm::new();
    vm.set_global("p", Value::plain(vec![("x", Value::Number(1.0))]));
    vm.set_global("q", Value::Null);
    copy.run(&mut vm);
    mutate.run(&mut vm);

    let field = |name: &str| vm.global(name).and_then(|obj| obj.get("x"));
    assert_eq!(field("p"), Some(Value::Number(5.0)));
    assert_eq!(field("q"), Some(Value::Number(1.0)));
}

#[test]
fn narrowing_conversions_wrap() {
    let b = ProgramBuilder::new();
    let program = b.finish();
    let f = ExprFactory::new(&program);
    let lowering = Lowering::new(&program);
    let mut rng = rand::thread_rng();

    let targets: [(Primitive, fn(i64) -> f64); 6] = [
        (Primitive::SByte, |x| x as i8 as f64),
        (Primitive::Byte, |x| x as u8 as f64),
        (Primitive::Int16, |x| x as i16 as f64),
        (Primitive::UInt16, |x| x as u16 as f64),
        (Primitive::Int32, |x| x as i32 as f64),
        (Primitive::UInt32, |x| x as u32 as f64),
    ];
    for _ in 0..50 {
        let value = rng.gen_range(-(1i64 << 40), 1i64 << 40);
        for &(prim, expected) in &targets {
            let literal = f.literal(Constant::Int(value), Type::Primitive(Primitive::Int64));
            let expr = f.cast(literal, ConversionKind::ExplicitNumeric, Type::Primitive(prim), false);
            let lowered = lowering.lower(&expr);
            lowered.assert_no_errors();
            assert_eq!(lowered.run(&mut JsVm::new()), Value::Number(expected(value)), "({}) {}", prim, value);
        }
    }
}

#[test]
fn float_to_int_truncates() {
    let b = ProgramBuilder::new();
    let program = b.finish();
    let f = ExprFactory::new(&program);
    let lowering = Lowering::new(&program);
    let mut rng = rand::thread_rng();

    for _ in 0..50 {
        let value = rng.gen_range(-1e6, 1e6);
        let expr = f.cast(f.double(value), ConversionKind::ExplicitNumeric, Type::INT, false);
        let lowered = lowering.lower(&expr);
        assert_eq!(lowered.run(&mut JsVm::new()), Value::Number(value.trunc()), "{}", value);
    }
}

#[test]
fn checked_conversion_throws() {
    let b = ProgramBuilder::new();
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let expr = f.cast(f.int(300), ConversionKind::ExplicitNumeric, Type::Primitive(Primitive::Byte), true);
    let lowered = Lowering::new(&program).lower(&expr);
    let err = JsVm::new().eval_with(&lowered.compiled.stmts, &lowered.compiled.expr).unwrap_err();
    assert_eq!(err.name, "OverflowException");

    let expr = f.cast(f.int(200), ConversionKind::ExplicitNumeric, Type::Primitive(Primitive::Byte), true);
    assert_eq!(Lowering::new(&program).lower(&expr).run(&mut JsVm::new()), Value::Number(200.0));
}

#[test]
fn int32_multiplication_wraps_exactly() {
    let mut b = ProgramBuilder::new();
    let x = b.local("x", Type::INT);
    let y = b.local("y", Type::INT);
    let ux = b.local("ux", Type::Primitive(Primitive::UInt32));
    let uy = b.local("uy", Type::Primitive(Primitive::UInt32));
    let program = b.finish();
    let f = ExprFactory::new(&program);
    let lowering = Lowering::new(&program);

    let signed = lowering.lower(&f.binary(BinaryOp::Mul, f.local(x), f.local(y)));
    let unsigned = lowering.lower(&f.binary(BinaryOp::Mul, f.local(ux), f.local(uy)));
    signed.assert_no_errors();
    unsigned.assert_no_errors();

    let run_signed = |a: i32, b: i32| {
        let mut vm = JsVm::new();
        vm.set_global("x", Value::Number(a as f64));
        vm.set_global("y", Value::Number(b as f64));
        signed.run(&mut vm)
    };
    // the double product of these is off by 5 in its low bits
    assert_eq!(run_signed(123456789, 987654321), Value::Number(123456789i32.wrapping_mul(987654321) as f64));

    let mut rng = rand::thread_rng();
    for _ in 0..50 {
        let (a, b) = (rng.gen::<i32>(), rng.gen::<i32>());
        assert_eq!(run_signed(a, b), Value::Number(a.wrapping_mul(b) as f64), "{} * {}", a, b);

        let (a, b) = (rng.gen::<u32>(), rng.gen::<u32>());
        let mut vm = JsVm::new();
        vm.set_global("ux", Value::Number(a as f64));
        vm.set_global("uy", Value::Number(b as f64));
        assert_eq!(unsigned.run(&mut vm), Value::Number(a.wrapping_mul(b) as f64), "{} * {}", a, b);
    }

    // checked multiplication still throws instead of wrapping
    let checked = OperatorInfo { checked: true, ..OperatorInfo::default() };
    let expr = f.binary_with(BinaryOp::Mul, f.local(x), f.local(y), Type::INT, checked);
    let lowered = lowering.lower(&expr);
    let mut vm = JsVm::new();
    vm.set_global("x", Value::Number(123456789.0));
    vm.set_global("y", Value::Number(987654321.0));
    let err = vm.eval_with(&lowered.compiled.stmts, &lowered.compiled.expr).unwrap_err();
    assert_eq!(err.name, "OverflowException");
}

#[test]
fn lambda_invocation() {
    let mut b = ProgramBuilder::new();
    let func = b.delegate("Func", vec![ParamDef::new("x", Type::INT)], Type::INT);
    let x = b.local("x", Type::INT);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    // ((Func) (x => x + 1))(41)
    let lambda = f.lambda(vec![x], f.binary(BinaryOp::Add, f.local(x), f.int(1)), func);
    let expr = f.node(ExprKind::DelegateInvocation { delegate: Box::new(lambda), args: vec![f.int(41)] }, Type::INT);
    let lowered = Lowering::new(&program).lower(&expr);
    lowered.assert_no_errors();
    assert_eq!(lowered.run(&mut JsVm::new()), Value::Number(42.0));
}

#[test]
fn delegate_combine_and_remove() {
    let mut b = ProgramBuilder::new();
    let action = b.delegate("Action", vec![ParamDef::new("x", Type::INT)], Type::Void);
    let d1 = b.local("d1", Type::named(action));
    let d2 = b.local("d2", Type::named(action));
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let invoke = |delegate: Sp<_>| f.node(ExprKind::DelegateInvocation { delegate: Box::new(delegate), args: vec![f.int(3)] }, Type::Void);
    let combined = || f.binary(BinaryOp::Add, f.local(d1), f.local(d2));
    let lowering = Lowering::new(&program);
    let new_vm = || {
        let mut vm = JsVm::new();
        vm.define_logged("d1");
        vm.define_logged("d2");
        vm
    };

    let mut vm = new_vm();
    lowering.lower(&invoke(combined())).run(&mut vm);
    assert_eq!(vm.logged_names(), vec!["d1", "d2"]);
    assert!(vm.call_log.iter().all(|call| call.args == vec![Value::Number(3.0)]));

    // (d1 + d2) - d2
    let mut vm = new_vm();
    let removed = f.binary(BinaryOp::Sub, combined(), f.local(d2));
    lowering.lower(&invoke(removed)).run(&mut vm);
    assert_eq!(vm.logged_names(), vec!["d1"]);
}

#[test]
fn await_suspends_then_gets_result() {
    let mut b = ProgramBuilder::new();
    let awaiter = b.class("Awaiter");
    let task = b.class("Task");
    let get_awaiter = b.method(task, "GetAwaiter", vec![], Type::named(awaiter));
    let action = b.delegate("Action", vec![], Type::Void);
    let on_completed = b.method(awaiter, "OnCompleted", vec![ParamDef::new("continuation", Type::named(action))], Type::Void);
    let get_result = b.method(awaiter, "GetResult", vec![], Type::INT);
    let t = b.local("t", Type::named(task));
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let expr = f.node(ExprKind::Await(Await {
        operand: Box::new(f.local(t)),
        get_awaiter: MethodRef::new(get_awaiter),
        on_completed: MethodRef::new(on_completed),
        unsafe_on_completed: None,
        get_result: MethodRef::new(get_result),
    }), Type::INT);
    let lowered = Lowering::new(&program).lower(&expr);
    lowered.assert_no_errors();
    assert_eq!(lowered.js(), "var $t0 = t.getAwaiter();\nawait $t0.onCompleted;\n$t0.getResult()");

    let returning = |value: JsExpr| JsExpr::Function { params: vec![], body: vec![JsStmt::Return(Some(value))] };
    let mut vm = JsVm::new();
    vm.run(&[
        JsStmt::var("awaiter", JsExpr::Object(vec![("getResult".to_owned(), returning(JsExpr::Number(42.0)))])),
        JsStmt::var("t", JsExpr::Object(vec![("getAwaiter".to_owned(), returning(JsExpr::ident("awaiter")))])),
    ]).unwrap();
    assert_eq!(lowered.run(&mut vm), Value::Number(42.0));
    assert_eq!(vm.logged_names(), vec!["await"]);
    assert_eq!(vm.call_log[0].args[1], Value::from("onCompleted"));
    assert_eq!(Some(&vm.call_log[0].args[0]), vm.global("awaiter").as_ref());
}

#[test]
fn await_through_extension_get_awaiter() {
    let mut b = ProgramBuilder::new();
    let awaiter = b.class("Awaiter");
    let task = b.class("Task");
    let extensions = b.class("TaskExtensions");
    let get_awaiter = b.static_method(extensions, "GetAwaiter", vec![ParamDef::new("task", Type::named(task))], Type::named(awaiter));
    b.method_mut(get_awaiter).is_extension = true;
    let on_completed = b.method(awaiter, "OnCompleted", vec![], Type::Void);
    let get_result = b.method(awaiter, "GetResult", vec![], Type::INT);
    let t = b.local("t", Type::named(task));
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let expr = f.node(ExprKind::Await(Await {
        operand: Box::new(f.local(t)),
        get_awaiter: MethodRef::new(get_awaiter),
        on_completed: MethodRef::new(on_completed),
        unsafe_on_completed: None,
        get_result: MethodRef::new(get_result),
    }), Type::INT);
    let lowered = Lowering::new(&program).lower(&expr);
    lowered.assert_no_errors();
    assert_eq!(lowered.js(), "var $t0 = TaskExtensions.getAwaiter(t);\nawait $t0.onCompleted;\n$t0.getResult()");
}

/// `Enumerable.where` and `Enumerable.select` on top of the VM's arrays.
fn define_enumerable(vm: &mut JsVm) {
    let forward = |native: &str| JsExpr::Function {
        params: vec!["s".to_owned(), "f".to_owned()],
        body: vec![JsStmt::Return(Some(JsExpr::ident("s").member(native).call(vec![JsExpr::ident("f")])))],
    };
    let object = JsExpr::Object(vec![
        ("where".to_owned(), forward("filter")),
        ("select".to_owned(), forward("map")),
    ]);
    vm.run(&[JsStmt::var("Enumerable", object)]).unwrap();
}

#[test]
fn query_with_range_variable_carrier() {
    let mut b = ProgramBuilder::new();
    let enumerable = b.class("Enumerable");
    let predicate = b.delegate("Predicate", vec![ParamDef::new("x", Type::OBJECT)], Type::BOOL);
    let selector = b.delegate("Selector", vec![ParamDef::new("x", Type::OBJECT)], Type::OBJECT);
    let where_ = b.static_method(enumerable, "Where", vec![ParamDef::new("source", Type::OBJECT), ParamDef::new("f", Type::named(predicate))], Type::OBJECT);
    let select = b.static_method(enumerable, "Select", vec![ParamDef::new("source", Type::OBJECT), ParamDef::new("f", Type::named(selector))], Type::OBJECT);
    b.method_mut(where_).is_extension = true;
    b.method_mut(select).is_extension = true;
    let xs = b.local("xs", Type::array(Type::INT, 1));
    let x = b.local("x", Type::INT);
    let y = b.local("y", Type::INT);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    // from x in xs let y = x * 2 where y > 2 select x + y
    let query = Query {
        range: x,
        source: Box::new(f.local(xs)),
        cast: None,
        body: QueryBody {
            clauses: vec![
                sp!(QueryClause::Let {
                    range: y,
                    value: f.binary(BinaryOp::Mul, f.local(x), f.int(2)),
                    method: Some(MethodRef::new(select)),
                }),
                sp!(QueryClause::Where {
                    predicate: f.binary(BinaryOp::Gt, f.local(y), f.int(2)),
                    method: Some(MethodRef::new(where_)),
                }),
            ],
            end: sp!(QueryEnd::Select {
                value: f.binary(BinaryOp::Add, f.local(x), f.local(y)),
                method: Some(MethodRef::new(select)),
            }),
            continuation: None,
        },
    };
    let lowered = Lowering::new(&program).lower(&f.node(ExprKind::Query(Box::new(query.clone())), Type::OBJECT));
    lowered.assert_no_errors();

    let carriers = &lowered.compiled.carriers;
    assert_eq!(carriers.len(), 1);
    let member_names = carriers[0].members.iter().map(|(name, _)| &name[..]).collect::<Vec<_>>();
    assert_eq!(member_names, vec!["x", "y"]);

    let mut vm = JsVm::new();
    define_enumerable(&mut vm);
    vm.set_global("xs", Value::array(vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]));
    let result = lowered.run(&mut vm).elements();
    assert_eq!(result, Some(vec![Value::Number(6.0), Value::Number(9.0)]));

    // new { a = <query>, b = <query> } synthesizes the carrier once
    let both = f.node(ExprKind::AnonymousObject { members: vec![
        ("a".to_owned(), f.node(ExprKind::Query(Box::new(query.clone())), Type::OBJECT)),
        ("b".to_owned(), f.node(ExprKind::Query(Box::new(query)), Type::OBJECT)),
    ] }, Type::OBJECT);
    let lowered = Lowering::new(&program).lower(&both);
    lowered.assert_no_errors();
    assert_eq!(lowered.compiled.carriers.len(), 1);
}

#[test]
fn trivial_select_is_elided_after_clauses() {
    let mut b = ProgramBuilder::new();
    let enumerable = b.class("Enumerable");
    let predicate = b.delegate("Predicate", vec![ParamDef::new("x", Type::OBJECT)], Type::BOOL);
    let selector = b.delegate("Selector", vec![ParamDef::new("x", Type::OBJECT)], Type::OBJECT);
    let where_ = b.static_method(enumerable, "Where", vec![ParamDef::new("source", Type::OBJECT), ParamDef::new("f", Type::named(predicate))], Type::OBJECT);
    let select = b.static_method(enumerable, "Select", vec![ParamDef::new("source", Type::OBJECT), ParamDef::new("f", Type::named(selector))], Type::OBJECT);
    b.method_mut(where_).is_extension = true;
    b.method_mut(select).is_extension = true;
    let xs = b.local("xs", Type::array(Type::INT, 1));
    let x = b.local("x", Type::INT);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let query = |clauses| ExprKind::Query(Box::new(Query {
        range: x,
        source: Box::new(f.local(xs)),
        cast: None,
        body: QueryBody {
            clauses,
            end: sp!(QueryEnd::Select { value: f.local(x), method: Some(MethodRef::new(select)) }),
            continuation: None,
        },
    }));
    let lowering = Lowering::new(&program);

    // from x in xs where x > 1 select x
    let filtered = query(vec![sp!(QueryClause::Where {
        predicate: f.binary(BinaryOp::Gt, f.local(x), f.int(1)),
        method: Some(MethodRef::new(where_)),
    })]);
    let lowered = lowering.lower(&f.node(filtered, Type::OBJECT));
    assert!(!lowered.js().contains("select"), "{}", lowered.js());

    // from x in xs select x
    let lowered = lowering.lower(&f.node(query(vec![]), Type::OBJECT));
    assert!(lowered.js().contains("Enumerable.select(xs, "), "{}", lowered.js());

    let mut vm = JsVm::new();
    define_enumerable(&mut vm);
    vm.set_global("xs", Value::array(vec![Value::Number(1.0), Value::Number(2.0)]));
    assert_eq!(lowered.run(&mut vm).elements().map(|elems| elems.len()), Some(2));
}

#[test]
fn static_calls_through_type_objects() {
    let mut b = ProgramBuilder::new();
    let math = b.class("Util.Math");
    let max = b.static_method(math, "Max", vec![ParamDef::new("a", Type::INT), ParamDef::new("b", Type::INT)], Type::INT);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let lowered = Lowering::new(&program).lower(&f.call(None, max, vec![f.int(1), f.int(2)]));
    assert_eq!(lowered.js(), "Util.Math.max(1, 2)");

    let mut vm = JsVm::new();
    vm.set_global("Util", Value::plain(vec![("Math", logged_object(&["max"]))]));
    assert_eq!(lowered.run(&mut vm), Value::Number(1.0));
    assert_eq!(vm.call_log[0].args, vec![Value::Number(1.0), Value::Number(2.0)]);
}
