//! Preserving left-to-right evaluation order.
//!
//! Compiling a sub-expression may produce statements that have to run before the final
//! expression.  Those statements then run before every sibling that was compiled earlier but
//! is only evaluated as part of the final expression.  When that could be observed, the
//! earlier siblings are moved into temporaries first.

use crate::ident::TemporaryAllocator;
use crate::js::{Effects, JsExpr, JsStmt};

use super::ExprCompiler;

/// How an item must be treated regardless of conflicts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(super) enum Placement {
    /// Only hoisted if its position would otherwise change its behavior.
    Normal,
    /// Appears more than once in the output, so it must be computed exactly once up front.
    Temp,
    /// Doesn't appear in the output at all, but must still be evaluated.
    Discard,
}

/// Hoist items that must be evaluated before something else runs.
///
/// `items` are in evaluation order.  `positions`, if given, are the textual positions the
/// items will end up at in the output (otherwise textual order is evaluation order).
/// `later` are the effects of statements that will be emitted after the returned statements.
///
/// Hoisted items are replaced in-place by references to their temporaries.  `Discard` items
/// that don't need to be evaluated are replaced with `null`.
pub(super) fn hoist_for_order(
    items: &mut [JsExpr],
    positions: Option<&[usize]>,
    placements: Option<&[Placement]>,
    later: &Effects,
    temporaries: &dyn TemporaryAllocator,
) -> Vec<JsStmt> {
    let n = items.len();
    let effects = items.iter().map(Effects::of_expr).collect::<Vec<_>>();
    let placement = |i: usize| placements.map_or(Placement::Normal, |p| p[i]);

    let mut hoisted = vec![false; n];
    // effects of everything that will now run before any item that isn't hoisted
    let mut barrier = later.clone();
    for i in (0..n).rev() {
        let hoist = match placement(i) {
            Placement::Temp => !items[i].is_reevaluable(),
            Placement::Discard => !effects[i].is_pure(),
            Placement::Normal => {
                let mut runs_first = barrier.clone();
                if let Some(positions) = positions {
                    for j in i + 1..n {
                        if !hoisted[j] && positions[j] < positions[i] {
                            runs_first.union_with(&effects[j]);
                        }
                    }
                }
                !effects[i].is_empty() && (
                    effects[i].conflicts_with(&runs_first) || runs_first.conflicts_with(&effects[i])
                )
            },
        };
        if hoist {
            hoisted[i] = true;
            barrier.union_with(&effects[i]);
        }
    }

    let mut out = vec![];
    for i in 0..n {
        if !hoisted[i] {
            if placement(i) == Placement::Discard {
                items[i] = JsExpr::Null;
            }
            continue;
        }
        let item = std::mem::replace(&mut items[i], JsExpr::Null);
        match placement(i) {
            Placement::Discard => out.push(JsStmt::Expr(item)),
            Placement::Normal | Placement::Temp => {
                let name = temporaries.new_temporary();
                tracing::debug!(temp = %name, "hoisting expression to preserve evaluation order");
                out.push(JsStmt::var(name.clone(), item));
                items[i] = JsExpr::ident(name);
            },
        }
    }
    out
}

/// Store an expression in a temporary unless it can be evaluated again for free.
pub(super) fn ensure_reevaluable(expr: JsExpr, temporaries: &dyn TemporaryAllocator, stmts: &mut Vec<JsStmt>) -> JsExpr {
    if expr.is_reevaluable() {
        return expr;
    }
    let name = temporaries.new_temporary();
    stmts.push(JsStmt::var(name.clone(), expr));
    JsExpr::ident(name)
}

impl ExprCompiler<'_> {
    /// Append the next item of a list of expressions evaluated left to right.
    ///
    /// `new_stmts` are the statements emitted while compiling `expr`.  They are appended to
    /// `stmts`, after hoisting whichever earlier items they could interfere with.
    pub(super) fn sequence_push(&self, list: &mut Vec<JsExpr>, stmts: &mut Vec<JsStmt>, new_stmts: Vec<JsStmt>, expr: JsExpr) {
        if !new_stmts.is_empty() {
            let later = Effects::of_stmts(&new_stmts);
            stmts.extend(hoist_for_order(list, None, None, &later, self.ctx.temporaries));
            stmts.extend(new_stmts);
        }
        list.push(expr);
    }

    /// Put the statements from compiling a later part of an expression into `stmts`, after
    /// hoisting an earlier part if necessary.
    pub(super) fn sequence_after(&self, earlier: &mut JsExpr, stmts: &mut Vec<JsStmt>, new_stmts: Vec<JsStmt>) {
        if new_stmts.is_empty() {
            return;
        }
        let mut list = vec![std::mem::replace(earlier, JsExpr::Null)];
        let later = Effects::of_stmts(&new_stmts);
        stmts.extend(hoist_for_order(&mut list, None, None, &later, self.ctx.temporaries));
        stmts.extend(new_stmts);
        *earlier = list.pop().unwrap_or(JsExpr::Null);
    }

    pub(super) fn ensure_reevaluable(&self, expr: JsExpr, stmts: &mut Vec<JsStmt>) -> JsExpr {
        ensure_reevaluable(expr, self.ctx.temporaries, stmts)
    }

    /// Always store an expression in a fresh temporary, returning its name.
    pub(super) fn bind_temporary(&self, expr: JsExpr, stmts: &mut Vec<JsStmt>) -> String {
        let name = self.new_temporary();
        stmts.push(JsStmt::var(name.clone(), expr));
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::GensymContext;
    use crate::js::{fmt::stringify_stmts, JsExpr as E};

    fn call(name: &str) -> JsExpr { E::ident(name).call(vec![]) }

    #[test]
    fn later_statements_hoist_conflicting_items() {
        let temps = GensymContext::new();
        // f(a(), x, 1, <stuff that calls g()>)
        let mut items = vec![call("a"), E::ident("x"), E::Number(1.0)];
        let later = Effects::of_stmts(&[JsStmt::var("$u", call("g"))]);
        let stmts = hoist_for_order(&mut items, None, None, &later, &temps);

        assert_eq!(stringify_stmts(&stmts), "var $t0 = a();\n");
        assert_eq!(items, vec![E::ident("$t0"), E::ident("x"), E::Number(1.0)]);
    }

    #[test]
    fn hoisting_is_transitive() {
        let temps = GensymContext::new();
        // once `y = 2` is hoisted, the read of y before it has to be hoisted too
        let mut items = vec![E::ident("y"), E::assign(E::ident("y"), E::Number(2.0))];
        let later = Effects::of_stmts(&[JsStmt::Expr(E::assign(E::ident("y"), E::Number(3.0)))]);
        let stmts = hoist_for_order(&mut items, None, None, &later, &temps);
        assert_eq!(stringify_stmts(&stmts), "var $t0 = y;\nvar $t1 = y = 2;\n");
    }

    #[test]
    fn permuted_positions() {
        let temps = GensymContext::new();
        // evaluated a() then b(), but written as b() then a()
        let mut items = vec![call("a"), call("b")];
        let stmts = hoist_for_order(&mut items, Some(&[1, 0]), None, &Effects::default(), &temps);
        assert_eq!(stringify_stmts(&stmts), "var $t0 = a();\n");

        // reordering pure reads is harmless
        let mut items = vec![E::ident("p"), E::ident("q")];
        let stmts = hoist_for_order(&mut items, Some(&[1, 0]), None, &Effects::default(), &temps);
        assert!(stmts.is_empty());
    }

    #[test]
    fn forced_placements() {
        let temps = GensymContext::new();
        let mut items = vec![call("a"), E::ident("p"), call("c"), E::ident("q")];
        let placements = [Placement::Temp, Placement::Temp, Placement::Discard, Placement::Discard];
        let stmts = hoist_for_order(&mut items, None, Some(&placements), &Effects::default(), &temps);
        assert_eq!(stringify_stmts(&stmts), "var $t0 = a();\nc();\n");
        assert_eq!(items, vec![E::ident("$t0"), E::ident("p"), E::Null, E::Null]);
    }
}
