use indexmap::IndexSet;

use super::{BinaryOp, JsExpr, JsStmt, Visit, walk_expr};

/// A conservative summary of what evaluating some JavaScript may observe or change.
///
/// Local variables are tracked by name.  Everything else (object members, array elements,
/// globals reached through members) is lumped together as "external state".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Effects {
    pub reads: IndexSet<String>,
    pub writes: IndexSet<String>,
    pub reads_external: bool,
    pub writes_external: bool,
}

impl Effects {
    pub fn of_expr(expr: &JsExpr) -> Effects {
        let mut visitor = EffectsVisitor::default();
        visitor.visit_expr(expr);
        visitor.effects
    }

    pub fn of_stmts(stmts: &[JsStmt]) -> Effects {
        let mut visitor = EffectsVisitor::default();
        for stmt in stmts {
            visitor.visit_stmt(stmt);
        }
        visitor.effects
    }

    /// True if evaluating this can't be observed by anything else.
    pub fn is_pure(&self) -> bool {
        self.writes.is_empty() && !self.writes_external
    }

    /// True if this neither observes nor changes anything.
    pub fn is_empty(&self) -> bool {
        self.is_pure() && self.reads.is_empty() && !self.reads_external
    }

    pub fn union_with(&mut self, other: &Effects) {
        self.reads.extend(other.reads.iter().cloned());
        self.writes.extend(other.writes.iter().cloned());
        self.reads_external |= other.reads_external;
        self.writes_external |= other.writes_external;
    }

    /// Whether swapping the evaluation of `self` and `other` could change the behavior of
    /// the program.
    pub fn conflicts_with(&self, other: &Effects) -> bool {
        let external_conflict = {
            (self.writes_external && (other.reads_external || other.writes_external))
            || (self.reads_external && other.writes_external)
        };
        external_conflict
            || self.writes.iter().any(|name| other.reads.contains(name) || other.writes.contains(name))
            || self.reads.iter().any(|name| other.writes.contains(name))
    }
}

#[derive(Default)]
struct EffectsVisitor {
    effects: Effects,
}

impl EffectsVisitor {
    fn visit_write_target(&mut self, target: &JsExpr) {
        match target {
            JsExpr::Identifier(name) => {
                self.effects.writes.insert(name.clone());
            },
            JsExpr::Member { object, name: _ } => {
                self.effects.writes_external = true;
                self.visit_expr(object);
            },
            JsExpr::Index { object, index } => {
                self.effects.writes_external = true;
                self.visit_expr(object);
                self.visit_expr(index);
            },
            other => {
                // not a valid target; just be conservative
                self.effects.writes_external = true;
                self.visit_expr(other);
            },
        }
    }
}

impl Visit for EffectsVisitor {
    fn visit_stmt(&mut self, s: &JsStmt) {
        match s {
            JsStmt::Var { name, init } => {
                if let Some(init) = init {
                    self.visit_expr(init);
                }
                self.effects.writes.insert(name.clone());
            },
            JsStmt::Await { awaiter, .. } => {
                self.visit_expr(awaiter);
                // anything can happen while suspended
                self.effects.reads_external = true;
                self.effects.writes_external = true;
            },
            _ => super::walk_stmt(self, s),
        }
    }

    fn visit_expr(&mut self, e: &JsExpr) {
        match e {
            JsExpr::Identifier(name) => {
                self.effects.reads.insert(name.clone());
            },
            JsExpr::Member { .. } | JsExpr::Index { .. } => {
                self.effects.reads_external = true;
                walk_expr(self, e);
            },
            JsExpr::Call { .. } | JsExpr::New { .. } | JsExpr::Verbatim(_) => {
                self.effects.reads_external = true;
                self.effects.writes_external = true;
                walk_expr(self, e);
            },
            JsExpr::Unary { op, operand } if op.is_update() => {
                // x++ reads x before writing it
                self.visit_expr(operand);
                self.visit_write_target(operand);
            },
            JsExpr::Binary { op, left, right } if op.is_assignment() => {
                if *op != BinaryOp::Assign {
                    self.visit_expr(left);
                }
                self.visit_expr(right);
                self.visit_write_target(left);
            },
            _ => walk_expr(self, e),
        }
    }

    fn visit_function_body(&mut self, _: &[String], _: &[JsStmt]) {
        // creating a closure runs none of its code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::JsExpr as E;

    #[test]
    fn literals_and_functions_are_effect_free() {
        assert!(E::Number(1.0).effects().is_empty());
        let func = E::Function { params: vec![], body: vec![JsStmt::Expr(E::ident("f").call(vec![]))] };
        assert!(func.effects().is_empty());
    }

    #[test]
    fn conflicts() {
        let call = E::ident("f").call(vec![]);
        let read_x = E::ident("x");
        let write_x = E::assign(E::ident("x"), E::Number(1.0));
        let read_member = E::ident("o").member("p");

        assert!(call.effects().conflicts_with(&read_member.effects()));
        assert!(read_member.effects().conflicts_with(&call.effects()));
        assert!(write_x.effects().conflicts_with(&read_x.effects()));
        assert!(read_x.effects().conflicts_with(&write_x.effects()));
        // calls can't see plain locals
        assert!(!call.effects().conflicts_with(&read_x.effects()));
        assert!(!read_x.effects().conflicts_with(&read_member.effects()));
    }
}
