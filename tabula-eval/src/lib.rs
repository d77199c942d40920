// Eval is responsible for the lazy expression language: building
// expression trees over table columns and evaluating them, vectorized and
// null-aware, against whatever rows a caller binds in an EvalContext.
//
// The same expression is routinely evaluated several times against
// different bindings (a join evaluates its predicate once per left row,
// a proxy evaluates a filter against raw columns) so expressions never
// capture data, only column references.
//
// Lookup lives here too: it is the index a join builds when its predicate
// is an equality (exact or within a tolerance) between the two sides.

mod agg;
mod context;
mod eval;
mod expr;
mod kernel;
mod lookup;


pub use agg::{AggOp, AggOptions};
pub use context::{EvalContext, EvalResult, SortedIndex, Vals};
pub use expr::{BinOp, Expr, Func, UnOp};
pub use lookup::{Buckets, Lookup, Tolerance};
