use std::{collections::HashMap, sync::Arc};
use tabula_base::{contract_err, Result};
use tabula_lang::{TableId, TypeTag, Value};

// What an expression evaluates to: either one value (broadcast against any
// length) or one value per row.
#[derive(Clone, Debug)]
pub enum Vals {
    Scalar(Value),
    Column(Arc<Vec<Value>>),
}

impl Vals {
    pub fn len(&self) -> Option<usize> {
        match self {
            Vals::Scalar(_) => None,
            Vals::Column(c) => Some(c.len()),
        }
    }

    pub fn get(&self, i: usize) -> &Value {
        match self {
            Vals::Scalar(v) => v,
            Vals::Column(c) => &c[i],
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Vals::Scalar(v) => Some(v),
            Vals::Column(_) => None,
        }
    }

    pub fn column(values: Vec<Value>) -> Vals {
        Vals::Column(Arc::new(values))
    }

    // Materializes to exactly `n` values, broadcasting a scalar.
    pub fn to_vec(&self, n: usize) -> Result<Vec<Value>> {
        match self {
            Vals::Scalar(v) => Ok(vec![v.clone(); n]),
            Vals::Column(c) if c.len() == n => Ok(c.as_ref().clone()),
            Vals::Column(c) => Err(contract_err(format!(
                "expected {n} values but expression produced {}",
                c.len()
            ))),
        }
    }
}

// Marks a column that is sorted ascending with all of its nulls in front:
// rows `first_non_null..` are in non-decreasing order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SortedIndex {
    pub first_non_null: usize,
}

#[derive(Clone, Debug)]
pub struct EvalResult {
    pub values: Vals,
    pub sorted_hint: Option<SortedIndex>,
    // None only when nothing but nulls was seen and no type was declared.
    pub dtype: Option<TypeTag>,
}

impl EvalResult {
    pub fn scalar(val: Value, dtype: Option<TypeTag>) -> Self {
        let dtype = dtype.or_else(|| TypeTag::of(&val));
        EvalResult {
            values: Vals::Scalar(val),
            sorted_hint: None,
            dtype,
        }
    }

    pub fn column(values: Vec<Value>, dtype: Option<TypeTag>) -> Self {
        EvalResult {
            values: Vals::column(values),
            sorted_hint: None,
            dtype,
        }
    }

    pub fn shared_column(values: Arc<Vec<Value>>, dtype: TypeTag, sorted_hint: Option<SortedIndex>) -> Self {
        EvalResult {
            values: Vals::Column(values),
            sorted_hint,
            dtype: Some(dtype),
        }
    }

    pub fn len(&self) -> Option<usize> {
        self.values.len()
    }

    // The boolean reading of a predicate result over `n` rows: Some(true)
    // where the predicate holds, Some(false) where it does not, None for
    // null. Non-boolean results are a contract violation.
    pub fn to_mask(&self, n: usize) -> Result<Vec<Option<bool>>> {
        match self.dtype {
            None | Some(TypeTag::Bool) => {}
            Some(other) => {
                return Err(contract_err(format!(
                    "predicate must evaluate to bool, not {other}"
                )))
            }
        }
        let cell = |v: &Value| match v {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(*b)),
            other => Err(contract_err(format!("predicate produced non-bool value {other}"))),
        };
        match &self.values {
            Vals::Scalar(v) => Ok(vec![cell(v)?; n]),
            Vals::Column(c) if c.len() == n => c.iter().map(cell).collect(),
            Vals::Column(c) => Err(contract_err(format!(
                "predicate produced {} values for {n} rows",
                c.len()
            ))),
        }
    }
}

// Binds the columns an expression may reference. Keyed by table first so
// that join predicates can mix columns of two tables, each bound to a
// different row subset.
#[derive(Clone, Debug, Default)]
pub struct EvalContext {
    tables: HashMap<TableId, HashMap<Arc<str>, EvalResult>>,
}

impl EvalContext {
    pub fn new() -> Self {
        EvalContext::default()
    }

    pub fn bind(&mut self, table: TableId, name: impl Into<Arc<str>>, val: EvalResult) {
        self.tables.entry(table).or_default().insert(name.into(), val);
    }

    pub fn get(&self, table: TableId, name: &str) -> Result<&EvalResult> {
        self.tables
            .get(&table)
            .and_then(|cols| cols.get(name))
            .ok_or_else(|| contract_err(format!("column {name:?} is not bound in this context")))
    }

    pub fn has_table(&self, table: TableId) -> bool {
        self.tables.contains_key(&table)
    }
}
