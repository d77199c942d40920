use std::{collections::BTreeSet, fmt, sync::Arc};
use tabula_base::{contract_err, Result};
use tabula_lang::{TableId, TypeTag, Value, ValueKey};
use crate::{agg::{AggOp, AggOptions}, lookup::Tolerance};

// An Expr is a lazy description of a column computation. It is a tree of
// reference-counted nodes, so cloning an Expr (and building bigger
// expressions out of smaller ones) never copies data. Nothing is computed
// until `eval` is called with a context binding the referenced columns.
#[derive(Clone)]
pub struct Expr(pub(crate) Arc<Node>);

pub(crate) enum Node {
    Column { table: TableId, name: Arc<str> },
    Const(Value),
    Unary { op: UnOp, arg: Expr },
    Binary { op: BinOp, lhs: Expr, rhs: Expr },
    Aggregate { op: AggOp, arg: Expr, opts: AggOptions, group_by: Vec<Expr> },
    IfThenElse { cond: Expr, then: Expr, otherwise: Expr },
    Apply { func: Func, arg: Expr },
    IsIn { arg: Expr, keys: Arc<BTreeSet<ValueKey>> },
    ApproxEq { lhs: Expr, rhs: Expr, tol: Tolerance },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum UnOp {
    Neg,
    Not,
    Abs,
    IsNone,
    IsNotNone,
    Sqrt,
    Exp,
    Log,
    Log10,
    Floor,
    Ceil,
    Round,
    Len,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Xor,
    Coalesce,
    StartsWith,
    EndsWith,
    Contains,
}

impl BinOp {
    pub fn is_ordering(&self) -> bool {
        matches!(self, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }

    pub fn is_comparison(&self) -> bool {
        self.is_ordering() || matches!(self, BinOp::Eq | BinOp::Ne)
    }

    // The same comparison with its operands swapped: `a < b` is `b > a`.
    pub fn mirrored(&self) -> BinOp {
        match self {
            BinOp::Lt => BinOp::Gt,
            BinOp::Le => BinOp::Ge,
            BinOp::Gt => BinOp::Lt,
            BinOp::Ge => BinOp::Le,
            other => *other,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Pow => "**",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Coalesce => "??",
            BinOp::StartsWith => "startswith",
            BinOp::EndsWith => "endswith",
            BinOp::Contains => "contains",
        }
    }
}

type ValueFn = dyn Fn(&Value) -> Result<Value> + Send + Sync;

// A named per-value function for `Expr::apply`. The declared type is the
// type of the column the function produces.
#[derive(Clone)]
pub struct Func {
    pub(crate) name: Arc<str>,
    pub(crate) dtype: TypeTag,
    pub(crate) f: Arc<ValueFn>,
}

impl Func {
    pub fn new(
        name: &str,
        dtype: TypeTag,
        f: impl Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Func {
            name: Arc::from(name),
            dtype,
            f: Arc::new(f),
        }
    }
}

impl Expr {
    fn new(node: Node) -> Expr {
        Expr(Arc::new(node))
    }

    pub fn column(table: TableId, name: &str) -> Expr {
        Expr::new(Node::Column {
            table,
            name: Arc::from(name),
        })
    }

    pub fn constant(val: impl Into<Value>) -> Expr {
        Expr::new(Node::Const(val.into()))
    }

    pub fn unary(op: UnOp, arg: Expr) -> Expr {
        Expr::new(Node::Unary { op, arg })
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::new(Node::Binary { op, lhs, rhs })
    }

    pub fn if_then_else(cond: impl Into<Expr>, then: impl Into<Expr>, otherwise: impl Into<Expr>) -> Expr {
        Expr::new(Node::IfThenElse {
            cond: cond.into(),
            then: then.into(),
            otherwise: otherwise.into(),
        })
    }

    // Comparisons. Ordering against a None constant is rejected when the
    // expression is evaluated; `eq(None)` and `ne(None)` are null tests.

    pub fn lt(&self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinOp::Lt, self.clone(), rhs.into())
    }

    pub fn le(&self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinOp::Le, self.clone(), rhs.into())
    }

    pub fn gt(&self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinOp::Gt, self.clone(), rhs.into())
    }

    pub fn ge(&self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinOp::Ge, self.clone(), rhs.into())
    }

    pub fn eq(&self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinOp::Eq, self.clone(), rhs.into())
    }

    pub fn ne(&self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinOp::Ne, self.clone(), rhs.into())
    }

    pub fn is_none(&self) -> Expr {
        Expr::unary(UnOp::IsNone, self.clone())
    }

    pub fn is_not_none(&self) -> Expr {
        Expr::unary(UnOp::IsNotNone, self.clone())
    }

    pub fn approx_eq(&self, rhs: impl Into<Expr>, tol: Tolerance) -> Result<Expr> {
        tol.check()?;
        Ok(Expr::new(Node::ApproxEq {
            lhs: self.clone(),
            rhs: rhs.into(),
            tol,
        }))
    }

    pub fn is_in<V: Into<Value>>(&self, vals: impl IntoIterator<Item = V>) -> Result<Expr> {
        let keys = vals
            .into_iter()
            .map(|v| v.into().key())
            .collect::<Result<BTreeSet<ValueKey>>>()?;
        Ok(Expr::new(Node::IsIn {
            arg: self.clone(),
            keys: Arc::new(keys),
        }))
    }

    // Arithmetic and math beyond the std::ops operators.

    pub fn pow(&self, rhs: impl Into<Expr>) -> Expr {
        Expr::binary(BinOp::Pow, self.clone(), rhs.into())
    }

    pub fn abs(&self) -> Expr {
        Expr::unary(UnOp::Abs, self.clone())
    }

    pub fn sqrt(&self) -> Expr {
        Expr::unary(UnOp::Sqrt, self.clone())
    }

    pub fn exp(&self) -> Expr {
        Expr::unary(UnOp::Exp, self.clone())
    }

    pub fn log(&self) -> Expr {
        Expr::unary(UnOp::Log, self.clone())
    }

    pub fn log10(&self) -> Expr {
        Expr::unary(UnOp::Log10, self.clone())
    }

    pub fn floor(&self) -> Expr {
        Expr::unary(UnOp::Floor, self.clone())
    }

    pub fn ceil(&self) -> Expr {
        Expr::unary(UnOp::Ceil, self.clone())
    }

    pub fn round(&self) -> Expr {
        Expr::unary(UnOp::Round, self.clone())
    }

    pub fn len(&self) -> Expr {
        Expr::unary(UnOp::Len, self.clone())
    }

    pub fn fill_none(&self, default: impl Into<Expr>) -> Expr {
        Expr::binary(BinOp::Coalesce, self.clone(), default.into())
    }

    pub fn starts_with(&self, prefix: impl Into<Expr>) -> Expr {
        Expr::binary(BinOp::StartsWith, self.clone(), prefix.into())
    }

    pub fn ends_with(&self, suffix: impl Into<Expr>) -> Expr {
        Expr::binary(BinOp::EndsWith, self.clone(), suffix.into())
    }

    pub fn contains(&self, needle: impl Into<Expr>) -> Expr {
        Expr::binary(BinOp::Contains, self.clone(), needle.into())
    }

    pub fn apply(&self, func: Func) -> Expr {
        Expr::new(Node::Apply {
            func,
            arg: self.clone(),
        })
    }

    // Aggregates, with default options: nulls ignored, None for no input.

    pub fn aggregate(&self, op: AggOp, opts: AggOptions) -> Expr {
        Expr::new(Node::Aggregate {
            op,
            arg: self.clone(),
            opts,
            group_by: Vec::new(),
        })
    }

    fn agg(&self, op: AggOp) -> Expr {
        self.aggregate(op, AggOptions::default())
    }

    pub fn min(&self) -> Expr {
        self.agg(AggOp::Min)
    }
    pub fn max(&self) -> Expr {
        self.agg(AggOp::Max)
    }
    pub fn sum(&self) -> Expr {
        self.agg(AggOp::Sum)
    }
    pub fn mean(&self) -> Expr {
        self.agg(AggOp::Mean)
    }
    pub fn std(&self) -> Expr {
        self.agg(AggOp::Std)
    }
    pub fn median(&self) -> Expr {
        self.agg(AggOp::Median)
    }
    pub fn count(&self) -> Expr {
        self.agg(AggOp::Count)
    }
    pub fn count_none(&self) -> Expr {
        self.agg(AggOp::CountNone)
    }
    pub fn count_different(&self) -> Expr {
        self.agg(AggOp::CountDifferent)
    }
    pub fn has_none(&self) -> Expr {
        self.agg(AggOp::HasNone)
    }
    pub fn all_none(&self) -> Expr {
        self.agg(AggOp::AllNone)
    }
    pub fn all_true(&self) -> Expr {
        self.agg(AggOp::AllTrue)
    }
    pub fn any_true(&self) -> Expr {
        self.agg(AggOp::AnyTrue)
    }
    pub fn all_false(&self) -> Expr {
        self.agg(AggOp::AllFalse)
    }
    pub fn any_false(&self) -> Expr {
        self.agg(AggOp::AnyFalse)
    }
    pub fn unique_value(&self) -> Expr {
        self.agg(AggOp::UniqueValue)
    }

    // Turns an aggregate into a per-group aggregate broadcast back to
    // every row of its group.
    pub fn group_by(&self, keys: &[Expr]) -> Result<Expr> {
        match &*self.0 {
            Node::Aggregate { op, arg, opts, .. } => Ok(Expr::new(Node::Aggregate {
                op: *op,
                arg: arg.clone(),
                opts: opts.clone(),
                group_by: keys.to_vec(),
            })),
            _ => Err(contract_err(format!("group_by applies to aggregates, not to {self:?}"))),
        }
    }

    // Introspection used by tables, joins and proxies to decide what to
    // bind and how to plan.

    pub fn as_column(&self) -> Option<(TableId, &str)> {
        match &*self.0 {
            Node::Column { table, name } => Some((*table, name)),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match &*self.0 {
            Node::Const(v) => Some(v),
            _ => None,
        }
    }

    fn children(&self) -> Vec<&Expr> {
        match &*self.0 {
            Node::Column { .. } | Node::Const(_) => vec![],
            Node::Unary { arg, .. } | Node::Apply { arg, .. } | Node::IsIn { arg, .. } => vec![arg],
            Node::Binary { lhs, rhs, .. } | Node::ApproxEq { lhs, rhs, .. } => vec![lhs, rhs],
            Node::Aggregate { arg, group_by, .. } => {
                let mut v = vec![arg];
                v.extend(group_by.iter());
                v
            }
            Node::IfThenElse { cond, then, otherwise } => vec![cond, then, otherwise],
        }
    }

    pub fn referenced_columns(&self) -> Vec<(TableId, Arc<str>)> {
        let mut out: Vec<(TableId, Arc<str>)> = Vec::new();
        let mut stack = vec![self];
        while let Some(e) = stack.pop() {
            if let Node::Column { table, name } = &*e.0 {
                if !out.iter().any(|(t, n)| t == table && n == name) {
                    out.push((*table, name.clone()));
                }
            }
            let mut kids = e.children();
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    pub fn referenced_tables(&self) -> BTreeSet<TableId> {
        self.referenced_columns().into_iter().map(|(t, _)| t).collect()
    }

    pub fn contains_aggregate(&self) -> bool {
        matches!(&*self.0, Node::Aggregate { .. }) || self.children().iter().any(|c| c.contains_aggregate())
    }

    // `a & b & c` as [a, b, c]; anything else as itself.
    pub fn split_conjuncts(&self) -> Vec<Expr> {
        match &*self.0 {
            Node::Binary { op: BinOp::And, lhs, rhs } => {
                let mut v = lhs.split_conjuncts();
                v.extend(rhs.split_conjuncts());
                v
            }
            _ => vec![self.clone()],
        }
    }

    pub fn and_all(exprs: Vec<Expr>) -> Expr {
        exprs
            .into_iter()
            .reduce(|a, b| Expr::binary(BinOp::And, a, b))
            .unwrap_or_else(|| Expr::constant(true))
    }

    // For `eq` and `approx_eq` nodes: both sides and the tolerance (None
    // for exact equality). Used to plan lookup-accelerated joins.
    pub fn as_equality(&self) -> Option<(&Expr, &Expr, Option<Tolerance>)> {
        match &*self.0 {
            Node::Binary { op: BinOp::Eq, lhs, rhs } => {
                if lhs.as_constant().map_or(false, Value::is_null) || rhs.as_constant().map_or(false, Value::is_null) {
                    None
                } else {
                    Some((lhs, rhs, None))
                }
            }
            Node::ApproxEq { lhs, rhs, tol } => Some((lhs, rhs, Some(*tol))),
            _ => None,
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            Node::Column { name, .. } => write!(f, "{name}"),
            Node::Const(Value::Str(s)) => write!(f, "{s:?}"),
            Node::Const(v) => write!(f, "{v}"),
            Node::Unary { op: UnOp::Neg, arg } => write!(f, "-{arg:?}"),
            Node::Unary { op: UnOp::Not, arg } => write!(f, "!{arg:?}"),
            Node::Unary { op, arg } => write!(f, "{}({arg:?})", format!("{op:?}").to_lowercase()),
            Node::Binary { op, lhs, rhs } => write!(f, "({lhs:?} {} {rhs:?})", op.symbol()),
            Node::Aggregate { op, arg, group_by, .. } => {
                write!(f, "{}({arg:?})", format!("{op:?}").to_lowercase())?;
                if !group_by.is_empty() {
                    write!(f, ".group_by({group_by:?})")?;
                }
                Ok(())
            }
            Node::IfThenElse { cond, then, otherwise } => {
                write!(f, "if {cond:?} then {then:?} else {otherwise:?}")
            }
            Node::Apply { func, arg } => write!(f, "{}({arg:?})", func.name),
            Node::IsIn { arg, keys } => write!(f, "({arg:?} in {} values)", keys.len()),
            Node::ApproxEq { lhs, rhs, tol } => write!(f, "({lhs:?} ~= {rhs:?} {tol:?})"),
        }
    }
}

impl From<&Expr> for Expr {
    fn from(e: &Expr) -> Expr {
        e.clone()
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Expr {
        Expr::constant(v)
    }
}

macro_rules! const_into_expr {
    ($($t:ty),*) => {
        $(impl From<$t> for Expr {
            fn from(v: $t) -> Expr {
                Expr::constant(Value::from(v))
            }
        })*
    };
}
const_into_expr!(bool, i64, i32, f64, &str, String);

macro_rules! binop_impl {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<T: Into<Expr>> std::ops::$trait<T> for Expr {
            type Output = Expr;
            fn $method(self, rhs: T) -> Expr {
                Expr::binary($op, self, rhs.into())
            }
        }
        impl<T: Into<Expr>> std::ops::$trait<T> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: T) -> Expr {
                Expr::binary($op, self.clone(), rhs.into())
            }
        }
    };
}
binop_impl!(Add, add, BinOp::Add);
binop_impl!(Sub, sub, BinOp::Sub);
binop_impl!(Mul, mul, BinOp::Mul);
binop_impl!(Div, div, BinOp::Div);
binop_impl!(Rem, rem, BinOp::Rem);
binop_impl!(BitAnd, bitand, BinOp::And);
binop_impl!(BitOr, bitor, BinOp::Or);
binop_impl!(BitXor, bitxor, BinOp::Xor);

impl std::ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::unary(UnOp::Neg, self)
    }
}
impl std::ops::Neg for &Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::unary(UnOp::Neg, self.clone())
    }
}
impl std::ops::Not for Expr {
    type Output = Expr;
    fn not(self) -> Expr {
        Expr::unary(UnOp::Not, self)
    }
}
impl std::ops::Not for &Expr {
    type Output = Expr;
    fn not(self) -> Expr {
        Expr::unary(UnOp::Not, self.clone())
    }
}
