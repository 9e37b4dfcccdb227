//! Source programs that can't be lowered produce diagnostics instead of code.

mod common;
use common::Lowering;

use jslower::metadata::{ConstructorSemantics, DelegateSemantics, JsonMember, MethodSemantics, PropertySemantics, TypeSemantics};
use jslower::model::build::ExprFactory;
use jslower::model::{
    Await, BinaryOp, Constant, ConversionKind, ExprKind, Initializer, Invocation, MethodRef, ObjectCreation, ParamDef,
    ProgramBuilder, PropertyRef, Query, QueryBody, QueryEnd, RefKind, Type,
};
use jslower::{sp, InternalError};

#[test]
fn assign_to_constant() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let limit = b.const_field(c, "Limit", Type::INT, Constant::Int(10));
    let other = b.const_field(c, "Other", Type::INT, Constant::Int(20));
    let program = b.finish();
    let f = ExprFactory::new(&program);

    // (C.Limit = 1) + (C.Other = 2)
    let expr = f.binary(
        BinaryOp::Add,
        f.assign(f.field(None, limit), f.int(1)),
        f.assign(f.field(None, other), f.int(2)),
    );
    let lowered = Lowering::new(&program).lower(&expr);
    assert_eq!(lowered.error_codes(), vec!["E0701", "E0701"]);

    // reading is fine, and inlines the value
    let lowered = Lowering::new(&program).lower(&f.field(None, limit));
    lowered.assert_no_errors();
    assert_eq!(lowered.js(), "10");
}

#[test]
fn assign_to_readonly_field() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let value = b.readonly_field(c, "Value", Type::INT);
    let ctor = b.constructor(c, vec![]);
    let method = b.method(c, "Reset", vec![], Type::Void);
    let program = b.finish();
    let f = ExprFactory::new(&program);
    let expr = f.assign(f.field(Some(f.this(c)), value), f.int(1));

    let mut lowering = Lowering::new(&program);
    lowering.method = Some(method);
    assert_eq!(lowering.lower(&expr).error_codes(), vec!["E0701"]);

    lowering.method = Some(ctor);
    let lowered = lowering.lower(&expr);
    lowered.assert_no_errors();
    assert_eq!(lowered.js(), "this.value = 1");
}

#[test]
fn method_not_usable_from_script() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let hidden = b.static_method(c, "Hidden", vec![], Type::INT);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let mut lowering = Lowering::new(&program);
    lowering.metadata.set_method(hidden, MethodSemantics::NotUsableFromScript);
    let lowered = lowering.lower(&f.binary(BinaryOp::Add, f.call(None, hidden, vec![]), f.int(1)));
    assert_eq!(lowered.error_codes(), vec!["E0702"]);
}

#[test]
fn invalid_inline_code_suggests_parameter() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let m = b.static_method(c, "Repeat", vec![ParamDef::new("count", Type::INT)], Type::INT);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let mut lowering = Lowering::new(&program);
    lowering.metadata.set_method(m, MethodSemantics::InlineCode {
        template: "repeat({cuont})".to_owned(),
        non_virtual_template: None,
        expand_params: false,
    });
    let lowered = lowering.lower(&f.call(None, m, vec![f.int(3)]));
    assert_eq!(lowered.error_codes(), vec!["E0705"]);

    let notes = lowered.emitter.diagnostics().into_iter().flat_map(|d| d.notes).collect::<Vec<_>>();
    assert!(notes.iter().any(|note| note == "did you mean 'count'?"), "{:?}", notes);
}

#[test]
fn invalid_inline_code_still_compiles_arguments() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let m = b.static_method(c, "Repeat", vec![ParamDef::new("count", Type::INT)], Type::INT);
    let hidden = b.static_method(c, "Hidden", vec![], Type::INT);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let mut lowering = Lowering::new(&program);
    lowering.metadata.set_method(m, MethodSemantics::inline_code("repeat({cuont})"));
    lowering.metadata.set_method(hidden, MethodSemantics::NotUsableFromScript);
    let lowered = lowering.lower(&f.call(None, m, vec![f.call(None, hidden, vec![])]));
    assert_eq!(lowered.error_codes(), vec!["E0702", "E0705"]);
}

#[test]
fn await_dynamic() {
    let mut b = ProgramBuilder::new();
    let awaiter = b.class("Awaiter");
    let get_awaiter = b.method(awaiter, "GetAwaiter", vec![], Type::named(awaiter));
    let on_completed = b.method(awaiter, "OnCompleted", vec![], Type::Void);
    let get_result = b.method(awaiter, "GetResult", vec![], Type::INT);
    let d = b.local("d", Type::Dynamic);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let expr = f.node(ExprKind::Await(Await {
        operand: Box::new(f.local(d)),
        get_awaiter: MethodRef::new(get_awaiter),
        on_completed: MethodRef::new(on_completed),
        unsafe_on_completed: None,
        get_result: MethodRef::new(get_result),
    }), Type::INT);
    assert_eq!(Lowering::new(&program).lower(&expr).error_codes(), vec!["E0707"]);
}

#[test]
fn await_with_inline_on_completed() {
    let mut b = ProgramBuilder::new();
    let awaiter = b.class("Awaiter");
    let get_awaiter = b.method(awaiter, "GetAwaiter", vec![], Type::named(awaiter));
    let on_completed = b.method(awaiter, "OnCompleted", vec![], Type::Void);
    let get_result = b.method(awaiter, "GetResult", vec![], Type::INT);
    let t = b.local("t", Type::named(awaiter));
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let mut lowering = Lowering::new(&program);
    lowering.metadata.set_method(on_completed, MethodSemantics::InlineCode {
        template: "{this}.then()".to_owned(),
        non_virtual_template: None,
        expand_params: false,
    });
    let expr = f.node(ExprKind::Await(Await {
        operand: Box::new(f.local(t)),
        get_awaiter: MethodRef::new(get_awaiter),
        on_completed: MethodRef::new(on_completed),
        unsafe_on_completed: None,
        get_result: MethodRef::new(get_result),
    }), Type::INT);
    assert_eq!(lowering.lower(&expr).error_codes(), vec!["E0708"]);
}

#[test]
fn delegate_conversion_with_different_conventions() {
    let mut b = ProgramBuilder::new();
    let plain = b.delegate("Plain", vec![], Type::Void);
    let bound = b.delegate("Bound", vec![], Type::Void);
    let d = b.local("d", Type::named(plain));
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let mut lowering = Lowering::new(&program);
    lowering.metadata.set_delegate(bound, DelegateSemantics { expand_params: false, bind_this_to_first_parameter: true });
    let expr = f.cast(f.local(d), ConversionKind::ExplicitReference, Type::named(bound), false);
    assert_eq!(lowering.lower(&expr).error_codes(), vec!["E0709"]);
}

#[test]
fn errors_do_not_stop_compilation() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let hidden = b.static_method(c, "Hidden", vec![], Type::INT);
    let visible = b.static_method(c, "Visible", vec![ParamDef::new("x", Type::INT)], Type::INT);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let mut lowering = Lowering::new(&program);
    lowering.metadata.set_method(hidden, MethodSemantics::NotUsableFromScript);
    let lowered = lowering.lower(&f.call(None, visible, vec![f.call(None, hidden, vec![])]));
    assert_eq!(lowered.error_codes(), vec!["E0702"]);
    assert_eq!(lowered.js(), "C.visible(null)");
}

#[test]
fn assign_to_property_without_setter() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let value = b.property(c, "Value", Type::INT);
    let obj = b.local("obj", Type::named(c));
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let mut lowering = Lowering::new(&program);
    lowering.metadata.set_property(value, PropertySemantics::GetAndSetMethods {
        getter: Some(MethodSemantics::normal("get_value")),
        setter: None,
    });
    let lowered = lowering.lower(&f.assign(f.property(Some(f.local(obj)), value), f.int(1)));
    assert_eq!(lowered.error_codes(), vec!["E0703"]);

    let lowered = lowering.lower(&f.property(Some(f.local(obj)), value));
    lowered.assert_no_errors();
    assert_eq!(lowered.js(), "obj.get_value()");
}

#[test]
fn by_ref_argument_must_be_boxed() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let mut param = ParamDef::new("target", Type::INT);
    param.ref_kind = RefKind::Ref;
    let bump = b.static_method(c, "Bump", vec![param], Type::Void);
    let boxed = b.ref_param("boxed", Type::INT);
    let program = b.finish();
    let f = ExprFactory::new(&program);
    let lowering = Lowering::new(&program);

    let lowered = lowering.lower(&f.call(None, bump, vec![f.int(1)]));
    assert_eq!(lowered.error_codes(), vec!["E0711"]);

    lowering.lower(&f.call(None, bump, vec![f.local(boxed)])).assert_no_errors();
}

#[test]
fn late_bound_candidates_must_agree() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let by_int = b.static_method(c, "M", vec![ParamDef::new("x", Type::INT)], Type::INT);
    let by_string = b.static_method(c, "M", vec![ParamDef::new("x", Type::STRING)], Type::INT);
    let int_indexer = b.indexer(c, vec![ParamDef::new("i", Type::INT)], Type::INT);
    let string_indexer = b.indexer(c, vec![ParamDef::new("s", Type::STRING)], Type::INT);
    let d = b.local("d", Type::Dynamic);
    let obj = b.local("obj", Type::named(c));
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let call = f.node(ExprKind::LateBoundCall {
        receiver: None,
        name: "M".to_owned(),
        candidates: vec![MethodRef::new(by_int), MethodRef::new(by_string)],
        args: vec![f.local(d)],
    }, Type::Dynamic);
    let indexer = f.node(ExprKind::LateBoundIndexer {
        receiver: Box::new(f.local(obj)),
        candidates: vec![PropertyRef::new(int_indexer), PropertyRef::new(string_indexer)],
        args: vec![f.local(d)],
    }, Type::Dynamic);

    // overloads that compile the same way are fine
    let lowered = Lowering::new(&program).lower(&call);
    lowered.assert_no_errors();
    assert_eq!(lowered.js(), "C.m(d)");
    Lowering::new(&program).lower(&indexer).assert_no_errors();

    let mut lowering = Lowering::new(&program);
    lowering.metadata.set_method(by_string, MethodSemantics::inline_code("String({x})"));
    lowering.metadata.set_property(string_indexer, PropertySemantics::GetAndSetMethods {
        getter: Some(MethodSemantics::NativeIndexer),
        setter: Some(MethodSemantics::NativeIndexer),
    });
    assert_eq!(lowering.lower(&call).error_codes(), vec!["E0704"]);
    assert_eq!(lowering.lower(&indexer).error_codes(), vec!["E0704"]);
}

#[test]
fn generic_argument_not_usable_from_script() {
    let mut b = ProgramBuilder::new();
    let c = b.class("C");
    let hidden = b.class("Hidden");
    let make = b.static_method(c, "Make", vec![], Type::OBJECT);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let call = |type_arg: Type| f.call_with(Invocation {
        receiver: None,
        method: MethodRef { method: make, type_args: vec![], method_args: vec![type_arg] },
        args: vec![],
        arg_map: None,
        expanded: false,
        is_non_virtual: false,
    });

    let mut lowering = Lowering::new(&program);
    lowering.metadata.set_type(hidden, TypeSemantics::NotUsableFromScript);
    assert_eq!(lowering.lower(&call(Type::named(hidden))).error_codes(), vec!["E0706"]);
    assert_eq!(lowering.lower(&call(Type::array(Type::named(hidden), 1))).error_codes(), vec!["E0706"]);
    lowering.lower(&call(Type::INT)).assert_no_errors();
}

#[test]
fn record_member_initialized_twice() {
    let mut b = ProgramBuilder::new();
    let point = b.class("Point");
    let x = b.field(point, "X", Type::INT);
    let y = b.field(point, "Y", Type::INT);
    let ctor = b.constructor(point, vec![ParamDef::new("x", Type::INT)]);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    let creation = |member| f.node(ExprKind::ObjectCreation(ObjectCreation {
        ctor: Some(MethodRef::new(ctor)),
        args: vec![f.int(1)],
        arg_map: None,
        expanded: false,
        initializers: vec![Initializer::Assign {
            target: f.field(Some(f.node(ExprKind::InitializedObject, Type::named(point))), member),
            value: f.int(2),
        }],
    }), Type::named(point));

    let mut lowering = Lowering::new(&program);
    lowering.metadata.set_constructor(ctor, ConstructorSemantics::Json { param_to_member: vec![JsonMember::Field(x)] });
    // new Point(1) { X = 2 }
    assert_eq!(lowering.lower(&creation(x)).error_codes(), vec!["E0710"]);
    // new Point(1) { Y = 2 }
    lowering.lower(&creation(y)).assert_no_errors();
}

#[test]
fn group_by_extension_without_parameters() {
    let mut b = ProgramBuilder::new();
    let enumerable = b.class("Enumerable");
    let group_by = b.static_method(enumerable, "GroupBy", vec![], Type::OBJECT);
    b.method_mut(group_by).is_extension = true;
    let xs = b.local("xs", Type::array(Type::INT, 1));
    let x = b.local("x", Type::INT);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    // from x in xs group x by x
    let query = Query {
        range: x,
        source: Box::new(f.local(xs)),
        cast: None,
        body: QueryBody {
            clauses: vec![],
            end: sp!(QueryEnd::GroupBy { element: f.local(x), key: f.local(x), method: Some(MethodRef::new(group_by)) }),
            continuation: None,
        },
    };
    let result = Lowering::new(&program).try_lower(&f.node(ExprKind::Query(Box::new(query)), Type::OBJECT));
    assert!(matches!(result, Err(InternalError::BadArgumentMap { num_params: 0, .. })));
}
