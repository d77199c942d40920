use std::sync::atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};
use tabula_base::{schema_err, Result};
use crate::{value::type_name, Format, TypeTag, Value};

pub type Row = Vec<Value>;

// Identifies one in-memory table (or table proxy) so expressions can
// say which table a column reference belongs to. Ids are never reused
// within a process.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableId(u64);

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

impl TableId {
    pub fn fresh() -> Self {
        TableId(NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

// Join bookkeeping: a column name may carry a `__<n>` postfix recording
// which side of which join it came from.
pub fn split_postfix(name: &str) -> (&str, Option<u32>) {
    if let Some(pos) = name.rfind("__") {
        let digits = &name[pos + 2..];
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = digits.parse() {
                return (&name[..pos], Some(n));
            }
        }
    }
    (name, None)
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Schema {
    names: Vec<String>,
    types: Vec<TypeTag>,
    formats: Vec<Option<Format>>,
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(schema_err("column name must not be empty"));
    }
    if split_postfix(name).0.is_empty() {
        return Err(schema_err(format!("column name {name:?} is only a join postfix")));
    }
    Ok(())
}

impl Schema {
    pub fn new(names: Vec<String>, types: Vec<TypeTag>, formats: Vec<Option<Format>>) -> Result<Self> {
        if names.len() != types.len() || names.len() != formats.len() {
            return Err(schema_err(format!(
                "schema has {} names, {} types and {} formats",
                names.len(),
                types.len(),
                formats.len()
            )));
        }
        let mut schema = Schema::default();
        for ((name, ty), fmt) in names.into_iter().zip(types).zip(formats) {
            schema.push(name, ty, fmt)?;
        }
        Ok(schema)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn types(&self) -> &[TypeTag] {
        &self.types
    }

    pub fn formats(&self) -> &[Option<Format>] {
        &self.formats
    }

    pub fn name(&self, i: usize) -> &str {
        &self.names[i]
    }

    pub fn type_at(&self, i: usize) -> TypeTag {
        self.types[i]
    }

    pub fn format_at(&self, i: usize) -> Option<&Format> {
        self.formats[i].as_ref()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| schema_err(format!("no column named {name:?}")))
    }

    pub fn max_postfix(&self) -> Option<u32> {
        self.names.iter().filter_map(|n| split_postfix(n).1).max()
    }

    pub fn push(&mut self, name: impl Into<String>, ty: TypeTag, fmt: Option<Format>) -> Result<()> {
        let pos = self.len();
        self.insert(pos, name, ty, fmt)
    }

    pub fn insert(&mut self, pos: usize, name: impl Into<String>, ty: TypeTag, fmt: Option<Format>) -> Result<()> {
        let name = name.into();
        check_name(&name)?;
        if self.index_of(&name).is_some() {
            return Err(schema_err(format!("duplicate column name {name:?}")));
        }
        if pos > self.len() {
            return Err(schema_err(format!("column position {pos} out of range")));
        }
        self.names.insert(pos, name);
        self.types.insert(pos, ty);
        self.formats.insert(pos, fmt);
        Ok(())
    }

    pub fn remove(&mut self, idx: usize) -> (String, TypeTag, Option<Format>) {
        (self.names.remove(idx), self.types.remove(idx), self.formats.remove(idx))
    }

    pub fn rename(&mut self, old: &str, new: impl Into<String>) -> Result<()> {
        let new = new.into();
        let idx = self.require(old)?;
        if old == new {
            return Ok(());
        }
        check_name(&new)?;
        if self.index_of(&new).is_some() {
            return Err(schema_err(format!("duplicate column name {new:?}")));
        }
        self.names[idx] = new;
        Ok(())
    }

    pub fn set_format(&mut self, idx: usize, fmt: Option<Format>) {
        self.formats[idx] = fmt;
    }

    pub fn set_type(&mut self, idx: usize, ty: TypeTag) {
        self.types[idx] = ty;
    }

    // Names and types equal, position by position. Formats are display
    // only and may differ.
    pub fn structurally_equal(&self, other: &Schema) -> bool {
        self.names == other.names && self.types == other.types
    }

    // Checks a row against the schema and widens ints into float columns.
    pub fn conform_row(&self, row: Row) -> Result<Row> {
        if row.len() != self.len() {
            return Err(schema_err(format!(
                "row has {} cells but table has {} columns",
                row.len(),
                self.len()
            )));
        }
        row.into_iter()
            .enumerate()
            .map(|(i, v)| {
                let ty = self.types[i];
                if !ty.accepts(&v) {
                    return Err(schema_err(format!(
                        "column {:?} has type {} but got a {} value",
                        self.names[i],
                        ty,
                        type_name(&v)
                    )));
                }
                Ok(ty.conform(v))
            })
            .collect()
    }
}
