//! Array creation and element reads.

use crate::js::{JsExpr, JsStmt};
use crate::model::{ArrayInit, Expr, Type};
use crate::pos::Sp;

use super::{ExprCompiler, ExprFlags, LResult};

/// Size of each of the `rank` dimensions of a rectangular initializer, judging by its first
/// element at each level.  Everything below an empty list has size 0.
fn initializer_shape(init: &ArrayInit, rank: usize) -> Vec<usize> {
    let mut shape = vec![0; rank];
    let mut current = Some(init);
    for dim in &mut shape {
        match current {
            Some(ArrayInit::List(items)) => {
                *dim = items.len();
                current = items.first();
            },
            _ => break,
        }
    }
    shape
}

/// Leaves of an initializer in row-major order.
fn flatten_initializer<'a>(init: &'a ArrayInit, out: &mut Vec<&'a Sp<Expr>>) {
    match init {
        ArrayInit::Element(expr) => out.push(&**expr),
        ArrayInit::List(items) => items.iter().for_each(|item| flatten_initializer(item, out)),
    }
}

/// The multidimensional index of the element at a row-major offset.
fn row_major_indices(mut offset: usize, shape: &[usize]) -> Vec<usize> {
    let mut indices = vec![0; shape.len()];
    for (index, &dim) in indices.iter_mut().zip(shape).rev() {
        *index = offset % dim.max(1);
        offset /= dim.max(1);
    }
    indices
}

impl ExprCompiler<'_> {
    pub(super) fn compile_array_creation(
        &mut self,
        elem: &Type,
        sizes: &[Sp<Expr>],
        init: Option<&ArrayInit>,
        ty: &Type,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let rt = self.ctx.runtime;
        let rank = match ty {
            Type::Array { rank, .. } => *rank as usize,
            _ => sizes.len().max(1),
        };

        match (rank, init) {
            (1, Some(init)) => {
                let mut leaves = vec![];
                flatten_initializer(init, &mut leaves);
                let mut elements = vec![];
                for leaf in leaves {
                    let mut sub = vec![];
                    let js = self.compile_value_for_store(leaf, &mut sub)?;
                    self.sequence_push(&mut elements, stmts, sub, js);
                }
                Ok(JsExpr::Array(elements))
            },

            (_, Some(init)) => {
                let shape = initializer_shape(init, rank);
                let dims = shape.iter().map(|&dim| JsExpr::Number(dim as f64)).collect();
                let array = rt.create_array(elem, dims, &mut self.rt(stmts))?;
                let temp = self.bind_temporary(array, stmts);

                let mut leaves = vec![];
                flatten_initializer(init, &mut leaves);
                for (offset, leaf) in leaves.into_iter().enumerate() {
                    let value = self.compile_value_for_store(leaf, stmts)?;
                    let indices = row_major_indices(offset, &shape).into_iter()
                        .map(|index| JsExpr::Number(index as f64))
                        .collect();
                    let set = rt.set_multidim_array_value(JsExpr::ident(temp.clone()), indices, value, &mut self.rt(stmts))?;
                    stmts.push(JsStmt::Expr(set));
                }
                Ok(JsExpr::ident(temp))
            },

            (_, None) => {
                let mut dims = vec![];
                for size in sizes {
                    let mut sub = vec![];
                    let js = self.compile_expr(size, &mut sub)?;
                    self.sequence_push(&mut dims, stmts, sub, js);
                }
                if let [JsExpr::Number(n)] = dims.as_slice() {
                    if *n == 0.0 {
                        return Ok(JsExpr::Array(vec![]));
                    }
                }
                Ok(rt.create_array(elem, dims, &mut self.rt(stmts))?)
            },
        }
    }

    pub(super) fn compile_array_element_read(
        &mut self,
        array: &Sp<Expr>,
        indices: &[Sp<Expr>],
        ty: &Type,
        flags: ExprFlags,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let mut list = vec![self.compile_receiver(array, stmts)?];
        for index in indices {
            let mut sub = vec![];
            let js = self.compile_expr(index, &mut sub)?;
            self.sequence_push(&mut list, stmts, sub, js);
        }
        let mut list = list.into_iter();
        let array = list.next().unwrap_or(JsExpr::Null);
        let indices = list.collect::<Vec<_>>();

        if indices.len() == 1 {
            let index = indices.into_iter().next().unwrap_or(JsExpr::Null);
            return Ok(array.index(index));
        }

        let rt = self.ctx.runtime;
        let value = rt.get_multidim_array_value(array, indices, &mut self.rt(stmts))?;
        // the runtime hands out the stored object itself
        match self.ctx.metadata.is_mutable_value_type(ty) && !flags.mutable_reference {
            true => Ok(rt.clone_value_type(value, ty, &mut self.rt(stmts))?),
            false => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major() {
        let shape = [2, 3];
        let all = (0..6).map(|offset| row_major_indices(offset, &shape)).collect::<Vec<_>>();
        assert_eq!(all, vec![
            vec![0, 0], vec![0, 1], vec![0, 2],
            vec![1, 0], vec![1, 1], vec![1, 2],
        ]);
    }
}
