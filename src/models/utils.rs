use typed_index_collections::TiVec;

use super::lp::{self, LpModel};

/// Creates a matrix of variables, one for every (i, j) with i < `rows`, j < `cols`,
/// addressed by typed indices.
pub fn var_matrix<M, I, J, F>(
    model: &mut M,
    rows: usize,
    cols: usize,
    mut func: F,
) -> lp::Result<TiVec<I, TiVec<J, M::Var>>>
where
    M: LpModel,
    I: From<usize> + Copy,
    J: From<usize>,
    F: FnMut(&mut M, I, J) -> lp::Result<M::Var>,
{
    let mut out = TiVec::with_capacity(rows);
    for i in 0..rows {
        let i = I::from(i);
        let mut row = TiVec::with_capacity(cols);
        for j in 0..cols {
            row.push(func(model, i, J::from(j))?);
        }
        out.push(row);
    }

    Ok(out)
}

/// Converts a matrix of variables to their values in the last solution.
/// Variables without a value (no solution exists) are converted to zero.
pub fn convert_matrix<M: LpModel, I, J>(
    vars: &TiVec<I, TiVec<J, M::Var>>,
    model: &M,
) -> TiVec<I, TiVec<J, f64>> {
    vars.iter()
        .map(|row| {
            row.iter()
                .map(|var| model.value(*var).unwrap_or(0.0))
                .collect()
        })
        .collect()
}

/// Sum of `coefficient * value` over the given terms, using the values of the last solution
pub fn evaluate<M: LpModel>(model: &M, terms: &[lp::Term<M::Var>]) -> f64 {
    terms
        .iter()
        .map(|(var, coeff)| coeff * model.value(*var).unwrap_or(0.0))
        .sum()
}

/// Flows at or below this are treated as solver noise
pub const EPSILON: f64 = 1e-6;
