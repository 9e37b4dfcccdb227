//! The shape of generated code for constructs whose output spans several lines.

mod common;
use common::Lowering;

use jslower::model::build::ExprFactory;
use jslower::model::{BinaryOp, MethodRef, ParamDef, ProgramBuilder, Query, QueryBody, QueryClause, QueryEnd, ExprKind, Type};
use jslower::sp;

#[test]
fn lambda() {
    let mut b = ProgramBuilder::new();
    let func = b.delegate("Func", vec![ParamDef::new("x", Type::INT)], Type::INT);
    let x = b.local("x", Type::INT);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    // x => x + 1
    let expr = f.lambda(vec![x], f.binary(BinaryOp::Add, f.local(x), f.int(1)), func);
    let lowered = Lowering::new(&program).lower(&expr);
    lowered.assert_no_errors();
    insta::assert_snapshot!("lambda", lowered.js());
}

#[test]
fn query_where_select() {
    let mut b = ProgramBuilder::new();
    let enumerable = b.class("Enumerable");
    let predicate = b.delegate("Predicate", vec![ParamDef::new("x", Type::INT)], Type::BOOL);
    let selector = b.delegate("Selector", vec![ParamDef::new("x", Type::INT)], Type::INT);
    let where_ = b.static_method(enumerable, "Where", vec![ParamDef::new("source", Type::OBJECT), ParamDef::new("f", Type::named(predicate))], Type::OBJECT);
    let select = b.static_method(enumerable, "Select", vec![ParamDef::new("source", Type::OBJECT), ParamDef::new("f", Type::named(selector))], Type::OBJECT);
    b.method_mut(where_).is_extension = true;
    b.method_mut(select).is_extension = true;
    let xs = b.local("xs", Type::array(Type::INT, 1));
    let x = b.local("x", Type::INT);
    let program = b.finish();
    let f = ExprFactory::new(&program);

    // from x in xs where x > 1 select x * 2
    let query = Query {
        range: x,
        source: Box::new(f.local(xs)),
        cast: None,
        body: QueryBody {
            clauses: vec![sp!(QueryClause::Where {
                predicate: f.binary(BinaryOp::Gt, f.local(x), f.int(1)),
                method: Some(MethodRef::new(where_)),
            })],
            end: sp!(QueryEnd::Select {
                value: f.binary(BinaryOp::Mul, f.local(x), f.int(2)),
                method: Some(MethodRef::new(select)),
            }),
            continuation: None,
        },
    };
    let lowered = Lowering::new(&program).lower(&f.node(ExprKind::Query(Box::new(query)), Type::OBJECT));
    lowered.assert_no_errors();
    insta::assert_snapshot!("query_where_select", lowered.js());
}
