// A stored table used in place, without reading it all in. Rows and columns
// are decoded on request and kept in bounded LRU caches; composite cells
// stay unloaded until looked at.
//
// Filtering evaluates the predicate over just the columns it mentions and
// then decodes only the rows that pass. Sort permutations are persisted in
// the file under `perm/<keys>` and reused until a cell in one of their key
// columns changes.

use std::{collections::BTreeMap, num::NonZeroUsize, path::Path, sync::Arc};
use lru::LruCache;
use parking_lot::Mutex;
use tabula_base::{config_err, contract_err, schema_err, Config, Result};
use tabula_eval::{EvalContext, EvalResult, Expr};
use tabula_lang::{Row, Schema, TableId, Value};
use tabula_table::{sort_permutation, Table, TableView};
use tracing::debug;
use crate::{
    bitmatrix::BitMatrix,
    cell::{encode_primitive, words_of, WORD},
    container::{Container, SharedContainer},
    ioutil::{u64s_to_bytes, Backing, FileBacking},
    meta::{check_version, FileMeta, Layout, LEGACY_NULL_WORD},
    rows::{decode_column, decode_rows, open_nulls, ROWS},
    store::{preload, Stores},
};

const PERM_PREFIX: &str = "perm/";

fn perm_dataset(keys: &[(&str, bool)]) -> String {
    let parts: Vec<String> = keys
        .iter()
        .map(|(n, asc)| format!("{n}{}", if *asc { '+' } else { '-' }))
        .collect();
    format!("{PERM_PREFIX}{}", parts.join(","))
}

fn perm_mentions(ds: &str, column: &str) -> bool {
    ds.strip_prefix(PERM_PREFIX).is_some_and(|keys| {
        keys.split(',')
            .any(|k| k.strip_suffix(|c| c == '+' || c == '-') == Some(column))
    })
}

pub struct TableProxy {
    id: TableId,
    container: SharedContainer,
    schema: Schema,
    title: Option<String>,
    meta: BTreeMap<String, Value>,
    n_rows: usize,
    // Legacy files keep sentinel words for nulls, and we keep writing them.
    legacy: bool,
    // Lock order: stores, nulls, then the container.
    stores: Mutex<Stores>,
    nulls: Mutex<BitMatrix>,
    row_cache: Mutex<LruCache<usize, Row>>,
    column_cache: Mutex<LruCache<String, Arc<Vec<Value>>>>,
}

impl TableProxy {
    pub fn open(path: impl AsRef<Path>, cfg: &Config) -> Result<TableProxy> {
        TableProxy::on(Box::new(FileBacking::open_rw(path)?), cfg)
    }

    pub fn on(io: Box<dyn Backing>, cfg: &Config) -> Result<TableProxy> {
        cfg.validate()?;
        let container = Container::open(io)?.into_shared();
        let meta: FileMeta = container.lock().meta().clone();
        let legacy = check_version(meta.version)? == Layout::LegacySentinel;
        let schema = meta.schema()?;
        let nulls = open_nulls(&container, &schema, cfg, false)?;
        let rows = NonZeroUsize::new(cfg.row_cache_capacity)
            .ok_or_else(|| config_err("row_cache_capacity must be nonzero"))?;
        let cols = NonZeroUsize::new(cfg.column_cache_capacity)
            .ok_or_else(|| config_err("column_cache_capacity must be nonzero"))?;
        Ok(TableProxy {
            id: TableId::fresh(),
            container,
            title: meta.title.clone(),
            meta: meta.table_meta()?,
            n_rows: meta.n_rows as usize,
            schema,
            legacy,
            stores: Mutex::new(Stores::standard(cfg)?),
            nulls: Mutex::new(nulls),
            row_cache: Mutex::new(LruCache::new(rows)),
            column_cache: Mutex::new(LruCache::new(cols)),
        })
    }

    pub fn with_stores(self, stores: Stores) -> Self {
        *self.stores.lock() = stores;
        self
    }

    pub fn meta(&self) -> &BTreeMap<String, Value> {
        &self.meta
    }

    fn check_row(&self, i: usize) -> Result<()> {
        if i >= self.n_rows {
            return Err(contract_err(format!("row {i} out of range for {} rows", self.n_rows)));
        }
        Ok(())
    }

    // Decodes rows straight from the file, bypassing the row cache.
    fn decode(&self, first: usize, count: usize) -> Result<Vec<Row>> {
        let stores = self.stores.lock();
        let mut nulls = self.nulls.lock();
        decode_rows(&self.container, &stores, &self.schema, &mut nulls, first as u64, count as u64)
    }

    // Rows at ascending indices, decoding each consecutive run in one go.
    fn decode_indices(&self, idxs: &[usize]) -> Result<Vec<Row>> {
        let mut out = Vec::with_capacity(idxs.len());
        let mut start = 0;
        while start < idxs.len() {
            let mut end = start + 1;
            while end < idxs.len() && idxs[end] == idxs[end - 1] + 1 {
                end += 1;
            }
            out.extend(self.decode(idxs[start], end - start)?);
            start = end;
        }
        Ok(out)
    }

    // The stable order of rows under `keys`, computed once and then read
    // back from the file.
    pub fn sort_permutation(&self, keys: &[(&str, bool)]) -> Result<Vec<usize>> {
        for (name, _) in keys {
            self.schema.require(name)?;
        }
        let ds = perm_dataset(keys);
        {
            let mut io = self.container.lock();
            if io.has_dataset(&ds) && io.dataset_len(&ds) == self.n_rows as u64 * WORD {
                let bytes = io.read_all(&ds)?;
                debug!(target: "tabula", dataset = %ds, "reusing stored sort permutation");
                return Ok(words_of(&bytes).map(|w| w as usize).collect());
            }
        }
        let cols = keys
            .iter()
            .map(|(name, asc)| Ok((self.column_values(name)?, *asc)))
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<(&[Value], bool)> = cols.iter().map(|(c, asc)| (c.as_slice(), *asc)).collect();
        let perm = sort_permutation(&refs)?;
        let words: Vec<u64> = perm.iter().map(|&i| i as u64).collect();
        let mut io = self.container.lock();
        io.write_at(&ds, 0, &u64s_to_bytes(&words))?;
        io.commit()?;
        debug!(target: "tabula", dataset = %ds, rows = perm.len(), "stored sort permutation");
        Ok(perm)
    }

    pub fn sorted_rows(&self, keys: &[(&str, bool)]) -> Result<Vec<Row>> {
        self.sort_permutation(keys)?
            .into_iter()
            .map(|i| self.row(i))
            .collect()
    }

    // Drops every cached or persisted view of `column`.
    fn invalidate(&mut self, column: &str, row: Option<usize>) {
        match row {
            Some(r) => {
                self.row_cache.get_mut().pop(&r);
            }
            None => self.row_cache.get_mut().clear(),
        }
        self.column_cache.get_mut().pop(column);
        let mut io = self.container.lock();
        let stale: Vec<String> = io
            .dataset_names()
            .filter(|ds| perm_mentions(ds, column))
            .map(str::to_string)
            .collect();
        for ds in stale {
            io.remove_dataset(&ds);
        }
    }

    // The word a cell should hold and whether the cell is null.
    fn cell_word(&mut self, idx: usize, value: &Value) -> Result<(u64, bool)> {
        let ty = self.schema.type_at(idx);
        if value.is_null() {
            let word = match (self.legacy, ty.is_primitive()) {
                (true, true) => LEGACY_NULL_WORD,
                _ => 0,
            };
            return Ok((word, true));
        }
        if ty.is_primitive() {
            return Ok((encode_primitive(value, ty)?, false));
        }
        let mut io = self.container.lock();
        let id = self.stores.get_mut().write(&mut io, self.schema.name(idx), value)?;
        Ok((id, false))
    }

    fn conform(&self, idx: usize, value: Value) -> Result<Value> {
        let ty = self.schema.type_at(idx);
        if !ty.accepts(&value) {
            return Err(schema_err(format!(
                "column {:?} has type {ty} and cannot hold {value}",
                self.schema.name(idx)
            )));
        }
        let value = ty.conform(value);
        preload(&value)?;
        Ok(value)
    }

    fn set_null_bit(&mut self, row: usize, idx: usize, null: bool) -> Result<()> {
        let nulls = self.nulls.get_mut();
        match null {
            true => nulls.set_bit(row as u64, idx),
            false => nulls.unset_bit(row as u64, idx),
        }
    }

    // Rewrites one cell in place. Values already in a store are not
    // touched; a replaced composite value is stored (or found) anew.
    pub fn replace_cell(&mut self, row: usize, name: &str, value: impl Into<Value>) -> Result<()> {
        self.check_row(row)?;
        let idx = self.schema.require(name)?;
        let value = self.conform(idx, value.into())?;
        let (word, null) = self.cell_word(idx, &value)?;
        if !null || self.legacy {
            let offset = (row * self.schema.len() + idx) as u64 * WORD;
            self.container.lock().write_at(ROWS, offset, &word.to_le_bytes())?;
        }
        self.set_null_bit(row, idx, null)?;
        self.nulls.get_mut().flush()?;
        self.invalidate(name, Some(row));
        self.container.lock().commit()
    }

    pub fn replace_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        let idx = self.schema.require(name)?;
        if values.len() != self.n_rows {
            return Err(schema_err(format!(
                "column has {} values but the table has {} rows",
                values.len(),
                self.n_rows
            )));
        }
        let values = values
            .into_iter()
            .map(|v| self.conform(idx, v))
            .collect::<Result<Vec<_>>>()?;
        let cells = values
            .iter()
            .map(|v| self.cell_word(idx, v))
            .collect::<Result<Vec<_>>>()?;
        let n_cols = self.schema.len();
        {
            let mut io = self.container.lock();
            let mut words: Vec<u64> = words_of(&io.read_all(ROWS)?).collect();
            for (r, (word, null)) in cells.iter().enumerate() {
                if !null || self.legacy {
                    words[r * n_cols + idx] = *word;
                }
            }
            io.write_at(ROWS, 0, &u64s_to_bytes(&words))?;
        }
        for (r, (_, null)) in cells.iter().enumerate() {
            self.set_null_bit(r, idx, *null)?;
        }
        self.nulls.get_mut().flush()?;
        self.invalidate(name, None);
        self.container.lock().commit()
    }

    pub fn to_table(&self) -> Result<Table> {
        let rows = self.decode(0, self.n_rows)?;
        Table::from_parts(self.schema.clone(), rows, self.title.clone(), self.meta.clone())
    }

    pub fn close(mut self) -> Result<()> {
        self.nulls.get_mut().flush()?;
        let mut io = self.container.lock();
        if io.is_dirty() {
            io.commit()?;
        }
        Ok(())
    }
}

impl TableView for TableProxy {
    fn id(&self) -> TableId {
        self.id
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn len(&self) -> usize {
        self.n_rows
    }

    fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    fn row(&self, i: usize) -> Result<Row> {
        self.check_row(i)?;
        if let Some(row) = self.row_cache.lock().get(&i) {
            return Ok(row.clone());
        }
        let row = self
            .decode(i, 1)?
            .pop()
            .ok_or_else(|| contract_err(format!("row {i} decoded to nothing")))?;
        self.row_cache.lock().put(i, row.clone());
        Ok(row)
    }

    fn column_values(&self, name: &str) -> Result<Arc<Vec<Value>>> {
        let idx = self.schema.require(name)?;
        if let Some(col) = self.column_cache.lock().get(name) {
            return Ok(col.clone());
        }
        let values = {
            let stores = self.stores.lock();
            let mut nulls = self.nulls.lock();
            Arc::new(decode_column(&self.container, &stores, &self.schema, &mut nulls, idx)?)
        };
        self.column_cache.lock().put(name.to_string(), values.clone());
        Ok(values)
    }

    fn filter(&self, pred: &Expr) -> Result<Table> {
        let mut ctx = EvalContext::new();
        for (table, name) in pred.referenced_columns() {
            if table != self.id {
                continue;
            }
            let idx = self.schema.require(&name)?;
            let values = self.column_values(&name)?;
            ctx.bind(table, name, EvalResult::shared_column(values, self.schema.type_at(idx), None));
        }
        let mask = pred.eval(&ctx)?.to_mask(self.n_rows)?;
        let keep: Vec<usize> = mask
            .into_iter()
            .enumerate()
            .filter_map(|(i, m)| (m == Some(true)).then_some(i))
            .collect();
        debug!(target: "tabula", rows = self.n_rows, matched = keep.len(), "filtered stored table");
        let rows = self.decode_indices(&keep)?;
        Table::from_parts(self.schema.clone(), rows, self.title.clone(), self.meta.clone())
    }
}
