use super::{JsExpr, JsStmt, VerbatimPart};

/// Recursive traversal of the JavaScript AST.
///
/// Override a method to intercept a node kind, and call the matching `walk_*` function from the
/// override to continue into its children.
pub trait Visit {
    fn visit_stmt(&mut self, s: &JsStmt) { walk_stmt(self, s) }
    fn visit_expr(&mut self, e: &JsExpr) { walk_expr(self, e) }

    /// Called on the body of each function literal.
    ///
    /// The default implementation walks into the body.  Visitors that only care about what
    /// happens when an expression is *evaluated* should override this to do nothing, since
    /// creating a closure runs none of its code.
    fn visit_function_body(&mut self, params: &[String], body: &[JsStmt]) {
        let _ = params;
        for stmt in body {
            self.visit_stmt(stmt);
        }
    }
}

pub fn walk_stmt<V>(v: &mut V, x: &JsStmt)
where V: ?Sized + Visit,
{
    match x {
        JsStmt::Var { name: _, init } => {
            if let Some(init) = init {
                v.visit_expr(init);
            }
        },
        JsStmt::Expr(e) => v.visit_expr(e),
        JsStmt::If { cond, then, else_ } => {
            v.visit_expr(cond);
            for stmt in then.iter().chain(else_) {
                v.visit_stmt(stmt);
            }
        },
        JsStmt::Block(stmts) => {
            for stmt in stmts {
                v.visit_stmt(stmt);
            }
        },
        JsStmt::Return(value) => {
            if let Some(value) = value {
                v.visit_expr(value);
            }
        },
        JsStmt::Await { awaiter, on_completed: _ } => v.visit_expr(awaiter),
    }
}

pub fn walk_expr<V>(v: &mut V, x: &JsExpr)
where V: ?Sized + Visit,
{
    match x {
        JsExpr::Null |
        JsExpr::Bool(_) |
        JsExpr::Number(_) |
        JsExpr::String(_) |
        JsExpr::Identifier(_) |
        JsExpr::This => {},
        JsExpr::Member { object, name: _ } => v.visit_expr(object),
        JsExpr::Index { object, index } => {
            v.visit_expr(object);
            v.visit_expr(index);
        },
        JsExpr::Call { callee, args } |
        JsExpr::New { callee, args } => {
            v.visit_expr(callee);
            for arg in args {
                v.visit_expr(arg);
            }
        },
        JsExpr::Unary { op: _, operand } => v.visit_expr(operand),
        JsExpr::Binary { op: _, left, right } => {
            v.visit_expr(left);
            v.visit_expr(right);
        },
        JsExpr::Conditional { cond, then, else_ } => {
            v.visit_expr(cond);
            v.visit_expr(then);
            v.visit_expr(else_);
        },
        JsExpr::Function { params, body } => v.visit_function_body(params, body),
        JsExpr::Array(items) => {
            for item in items {
                v.visit_expr(item);
            }
        },
        JsExpr::Object(props) => {
            for (_, value) in props {
                v.visit_expr(value);
            }
        },
        JsExpr::Verbatim(parts) => {
            for part in parts {
                if let VerbatimPart::Expr(e) = part {
                    v.visit_expr(e);
                }
            }
        },
    }
}
