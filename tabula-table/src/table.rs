use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tabula_base::{contract_err, schema_err, Result};
use tabula_eval::{EvalContext, EvalResult, Expr, SortedIndex};
use tabula_lang::{Format, Row, Schema, TableId, TypeTag, Value};
use crate::view::TableView;

// Rows are the primary storage; columns are derived on demand and cached
// until the next structural change. Expressions refer to columns by
// (TableId, name), so a table is also what binds those references when
// something is evaluated against it.
#[derive(Debug)]
pub struct Table {
    id: TableId,
    schema: Schema,
    rows: Vec<Row>,
    title: Option<String>,
    meta: BTreeMap<String, Value>,
    sorted_by: Option<String>,
    columns: RefCell<HashMap<String, Arc<Vec<Value>>>>,
}

// What a new or replaced column is filled from.
pub enum ColumnData {
    Expr(Expr),
    Values(Vec<Value>),
}

impl From<Expr> for ColumnData {
    fn from(e: Expr) -> Self {
        ColumnData::Expr(e)
    }
}

impl From<&Expr> for ColumnData {
    fn from(e: &Expr) -> Self {
        ColumnData::Expr(e.clone())
    }
}

impl From<Vec<Value>> for ColumnData {
    fn from(v: Vec<Value>) -> Self {
        ColumnData::Values(v)
    }
}

// Display format a column gets when none is given.
pub fn default_format(ty: TypeTag) -> Option<Format> {
    let text = match ty {
        TypeTag::Int => "%d",
        TypeTag::Float => "%.2f",
        TypeTag::Bool | TypeTag::Str => "%s",
        TypeTag::Object | TypeTag::TimeSeries | TypeTag::PeakMap => "%r",
    };
    Format::new(text).ok()
}

fn parse_formats(formats: &[Option<&str>]) -> Result<Vec<Option<Format>>> {
    formats.iter().map(|f| f.map(Format::new).transpose()).collect()
}

impl Table {
    pub fn with_schema(schema: Schema) -> Table {
        Table {
            id: TableId::fresh(),
            schema,
            rows: Vec::new(),
            title: None,
            meta: BTreeMap::new(),
            sorted_by: None,
            columns: RefCell::new(HashMap::new()),
        }
    }

    pub fn create<S: AsRef<str>>(names: &[S], types: &[TypeTag], formats: &[Option<&str>]) -> Result<Table> {
        let names = names.iter().map(|n| n.as_ref().to_string()).collect();
        let schema = Schema::new(names, types.to_vec(), parse_formats(formats)?)?;
        Ok(Table::with_schema(schema))
    }

    pub fn from_rows<S: AsRef<str>>(
        names: &[S],
        types: &[TypeTag],
        formats: &[Option<&str>],
        rows: Vec<Row>,
    ) -> Result<Table> {
        let mut t = Table::create(names, types, formats)?;
        t.rows = rows
            .into_iter()
            .map(|r| t.schema.conform_row(r))
            .collect::<Result<Vec<_>>>()?;
        Ok(t)
    }

    // Builds a table around rows already known to fit the schema.
    pub(crate) fn assemble(schema: Schema, rows: Vec<Row>, title: Option<String>, meta: BTreeMap<String, Value>) -> Table {
        Table {
            rows,
            title,
            meta,
            ..Table::with_schema(schema)
        }
    }

    // Rebuilds a table from separately stored pieces; every row is still
    // checked against the schema.
    pub fn from_parts(schema: Schema, rows: Vec<Row>, title: Option<String>, meta: BTreeMap<String, Value>) -> Result<Table> {
        let rows = rows
            .into_iter()
            .map(|r| schema.conform_row(r))
            .collect::<Result<Vec<_>>>()?;
        Ok(Table::assemble(schema, rows, title, meta))
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn set_title(&mut self, title: Option<String>) {
        self.title = title;
    }

    pub fn meta(&self) -> &BTreeMap<String, Value> {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.meta
    }

    pub fn sorted_by(&self) -> Option<&str> {
        self.sorted_by.as_deref()
    }

    pub(crate) fn set_sorted_by(&mut self, name: Option<String>) {
        self.sorted_by = name;
    }

    // Same contents under a fresh id, so the copy can be joined with the
    // original without the two sides' column references colliding.
    pub fn copy(&self) -> Table {
        Table {
            id: TableId::fresh(),
            schema: self.schema.clone(),
            rows: self.rows.clone(),
            title: self.title.clone(),
            meta: self.meta.clone(),
            sorted_by: self.sorted_by.clone(),
            columns: RefCell::new(HashMap::new()),
        }
    }

    // Every structural change goes through here.
    fn touched(&mut self) {
        self.columns.get_mut().clear();
        self.sorted_by = None;
    }

    pub(crate) fn rows_mut(&mut self) -> &mut Vec<Row> {
        self.touched();
        &mut self.rows
    }

    pub fn add_row(&mut self, row: Row) -> Result<()> {
        let row = self.schema.conform_row(row)?;
        self.touched();
        self.rows.push(row);
        Ok(())
    }

    // Binds every column of this table that `expr` mentions.
    pub fn bind(&self, expr: &Expr, ctx: &mut EvalContext) -> Result<()> {
        for (table, name) in expr.referenced_columns() {
            if table != self.id {
                continue;
            }
            let idx = self.schema.require(&name)?;
            let values = self.column_values(&name)?;
            let hint = match self.sorted_by.as_deref() {
                Some(s) if s == &*name => Some(SortedIndex {
                    first_non_null: values.iter().take_while(|v| v.is_null()).count(),
                }),
                _ => None,
            };
            ctx.bind(self.id, name, EvalResult::shared_column(values, self.schema.type_at(idx), hint));
        }
        Ok(())
    }

    pub fn evaluate(&self, expr: &Expr) -> Result<EvalResult> {
        let mut ctx = EvalContext::new();
        self.bind(expr, &mut ctx)?;
        expr.eval(&ctx)
    }

    // One value per row, broadcasting scalars.
    pub fn eval_values(&self, expr: &Expr) -> Result<(Vec<Value>, Option<TypeTag>)> {
        let res = self.evaluate(expr)?;
        Ok((res.values.to_vec(self.len())?, res.dtype))
    }

    fn resolve(&self, data: ColumnData, ty: Option<TypeTag>) -> Result<(Vec<Value>, TypeTag)> {
        let (values, inferred) = match data {
            ColumnData::Expr(e) => self.eval_values(&e)?,
            ColumnData::Values(v) => {
                if v.len() != self.len() {
                    return Err(schema_err(format!(
                        "column has {} values but table has {} rows",
                        v.len(),
                        self.len()
                    )));
                }
                let inferred = v.iter().find_map(Value::type_tag);
                (v, inferred)
            }
        };
        let ty = ty
            .or(inferred)
            .ok_or_else(|| contract_err("cannot infer the type of an all-None column; pass one"))?;
        let values = values
            .into_iter()
            .map(|v| {
                if ty.accepts(&v) {
                    Ok(ty.conform(v))
                } else {
                    Err(schema_err(format!("{ty} column cannot hold {v}")))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((values, ty))
    }

    fn insert_column(&mut self, pos: usize, name: &str, values: Vec<Value>, ty: TypeTag, fmt: Option<Format>) -> Result<()> {
        self.schema.insert(pos, name, ty, fmt)?;
        self.touched();
        for (row, v) in self.rows.iter_mut().zip(values) {
            row.insert(pos, v);
        }
        Ok(())
    }

    // Appends a column computed from an expression or given as values.
    // Without an explicit type the computed one is used; without a format
    // the type's default format is.
    pub fn add_column(
        &mut self,
        name: &str,
        data: impl Into<ColumnData>,
        ty: Option<TypeTag>,
        fmt: Option<&str>,
    ) -> Result<()> {
        let (values, ty) = self.resolve(data.into(), ty)?;
        let fmt = match fmt {
            Some(f) => Some(Format::new(f)?),
            None => default_format(ty),
        };
        self.insert_column(self.schema.len(), name, values, ty, fmt)
    }

    pub fn add_column_with_constant_value(
        &mut self,
        name: &str,
        value: impl Into<Value>,
        ty: Option<TypeTag>,
        fmt: Option<&str>,
    ) -> Result<()> {
        let value = value.into();
        self.add_column(name, Expr::constant(value), ty, fmt)
    }

    // Row numbers 0..n as the first column.
    pub fn add_enumeration(&mut self, name: &str) -> Result<()> {
        let values = (0..self.len()).map(Value::from).collect();
        self.insert_column(0, name, values, TypeTag::Int, default_format(TypeTag::Int))
    }

    // Keeps the column's position and format. The type stays unless a
    // new one is given.
    pub fn replace_column(&mut self, name: &str, data: impl Into<ColumnData>, ty: Option<TypeTag>) -> Result<()> {
        let idx = self.schema.require(name)?;
        let ty = ty.or(Some(self.schema.type_at(idx)));
        let (values, ty) = self.resolve(data.into(), ty)?;
        self.schema.set_type(idx, ty);
        self.touched();
        for (row, v) in self.rows.iter_mut().zip(values) {
            row[idx] = v;
        }
        Ok(())
    }

    pub fn drop_columns(&mut self, names: &[&str]) -> Result<()> {
        let mut idxs = names
            .iter()
            .map(|n| self.schema.require(n))
            .collect::<Result<Vec<_>>>()?;
        idxs.sort_unstable();
        idxs.dedup();
        self.touched();
        for &i in idxs.iter().rev() {
            self.schema.remove(i);
            for row in &mut self.rows {
                row.remove(i);
            }
        }
        Ok(())
    }

    // Renames are applied in order; all or nothing.
    pub fn rename_columns(&mut self, renames: &[(&str, &str)]) -> Result<()> {
        let mut schema = self.schema.clone();
        for (old, new) in renames {
            schema.rename(old, *new)?;
        }
        let sorted = self.sorted_by.take().map(|s| {
            renames
                .iter()
                .fold(s, |s, (old, new)| if s == *old { new.to_string() } else { s })
        });
        self.schema = schema;
        self.touched();
        self.sorted_by = sorted;
        Ok(())
    }

    pub fn set_col_format(&mut self, name: &str, fmt: Option<&str>) -> Result<()> {
        let idx = self.schema.require(name)?;
        let fmt = fmt.map(Format::new).transpose()?;
        self.schema.set_format(idx, fmt);
        Ok(())
    }

    // Every value must already be acceptable to the new type.
    pub fn set_col_type(&mut self, name: &str, ty: TypeTag) -> Result<()> {
        let idx = self.schema.require(name)?;
        if let Some(bad) = self.rows.iter().map(|r| &r[idx]).find(|v| !ty.accepts(v)) {
            return Err(schema_err(format!("column {name:?} holds {bad}, which is not a {ty}")));
        }
        self.schema.set_type(idx, ty);
        self.touched();
        for row in &mut self.rows {
            let v = std::mem::take(&mut row[idx]);
            row[idx] = ty.conform(v);
        }
        Ok(())
    }

    pub fn delete_rows(&mut self, idxs: &[usize]) -> Result<()> {
        if let Some(bad) = idxs.iter().find(|&&i| i >= self.len()) {
            return Err(contract_err(format!("row {bad} out of range for {} rows", self.len())));
        }
        let mut drop = vec![false; self.len()];
        for &i in idxs {
            drop[i] = true;
        }
        let rows = std::mem::take(self.rows_mut());
        self.rows = rows
            .into_iter()
            .zip(drop)
            .filter_map(|(r, d)| (!d).then_some(r))
            .collect();
        Ok(())
    }

    // Appends the rows of a table with the same names and types.
    pub fn extend(&mut self, other: &Table) -> Result<()> {
        if !self.schema.structurally_equal(&other.schema) {
            return Err(schema_err("cannot extend a table with one of a different schema"));
        }
        let more = other.rows.clone();
        self.rows_mut().extend(more);
        Ok(())
    }

    pub fn get_value(&self, row: usize, name: &str) -> Result<&Value> {
        let idx = self.schema.require(name)?;
        self.rows
            .get(row)
            .map(|r| &r[idx])
            .ok_or_else(|| contract_err(format!("row {row} out of range for {} rows", self.len())))
    }

    pub fn set_value(&mut self, row: usize, name: &str, value: impl Into<Value>) -> Result<()> {
        let idx = self.schema.require(name)?;
        let ty = self.schema.type_at(idx);
        let value = value.into();
        if !ty.accepts(&value) {
            return Err(schema_err(format!("{ty} column {name:?} cannot hold {value}")));
        }
        if row >= self.len() {
            return Err(contract_err(format!("row {row} out of range for {} rows", self.len())));
        }
        self.rows_mut()[row][idx] = ty.conform(value);
        Ok(())
    }
}

impl TableView for Table {
    fn id(&self) -> TableId {
        self.id
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    fn row(&self, i: usize) -> Result<Row> {
        self.rows
            .get(i)
            .cloned()
            .ok_or_else(|| contract_err(format!("row {i} out of range for {} rows", self.len())))
    }

    fn column_values(&self, name: &str) -> Result<Arc<Vec<Value>>> {
        if let Some(col) = self.columns.borrow().get(name) {
            return Ok(col.clone());
        }
        let idx = self.schema.require(name)?;
        let col = Arc::new(self.rows.iter().map(|r| r[idx].clone()).collect::<Vec<_>>());
        self.columns.borrow_mut().insert(name.to_string(), col.clone());
        Ok(col)
    }

    fn filter(&self, pred: &Expr) -> Result<Table> {
        let mask = self.evaluate(pred)?.to_mask(self.len())?;
        let rows = self
            .rows
            .iter()
            .zip(mask)
            .filter_map(|(r, keep)| (keep == Some(true)).then(|| r.clone()))
            .collect();
        let mut out = Table::assemble(self.schema.clone(), rows, self.title.clone(), self.meta.clone());
        // Filtering keeps row order.
        out.sorted_by = self.sorted_by.clone();
        Ok(out)
    }
}
