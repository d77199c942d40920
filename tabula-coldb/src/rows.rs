// The `rows` dataset and its `nulls` bitmap: one word per cell, row-major,
// plus one bit per cell saying whether that word means anything.

use tabula_base::{schema_err, Config, Result};
use tabula_lang::{Row, Schema, Value};
use tabula_table::{Table, TableView};
use tracing::{trace, warn};
use crate::{
    bitmatrix::{BitMatrix, DatasetBits, MemBits},
    cell::{decode_primitive, encode_primitive, words_of, WORD},
    container::{Container, SharedContainer},
    ioutil::u64s_to_bytes,
    meta::{check_version, Layout, CURRENT_VERSION, LEGACY_NULL_WORD},
    store::{preload, Stores},
};

pub(crate) const ROWS: &str = "rows";
pub(crate) const NULLS: &str = "nulls";

// Rows read per request when scanning a whole column.
const SCAN_ROWS: u64 = 4096;

pub(crate) fn read_words(io: &mut Container, n_cols: usize, first: u64, count: u64) -> Result<Vec<u64>> {
    let row_len = n_cols as u64 * WORD;
    let bytes = io.read(ROWS, first * row_len, count * row_len)?;
    Ok(words_of(&bytes).collect())
}

// Packed null bits for a file that stored nulls as sentinel words.
fn legacy_null_bits(io: &mut Container, schema: &Schema, cfg: &Config) -> Result<BitMatrix> {
    let n_rows = io.meta().n_rows;
    let n_cols = schema.len();
    let mut bits = BitMatrix::new(Box::new(MemBits::new()), n_cols, cfg)?;
    bits.resize(n_rows)?;
    let mut first = 0;
    while first < n_rows {
        let count = SCAN_ROWS.min(n_rows - first);
        let words = read_words(io, n_cols, first, count)?;
        for (i, w) in words.iter().enumerate() {
            let (r, c) = (first + (i / n_cols) as u64, i % n_cols);
            let null = match schema.type_at(c).is_primitive() {
                true => *w == LEGACY_NULL_WORD,
                false => *w == 0,
            };
            if null {
                bits.set_bit(r, c)?;
            }
        }
        first += count;
    }
    Ok(bits)
}

// The null bitmap of an open container. A legacy file gets one rebuilt
// from its sentinel words, held in memory unless `persist` is set, in which
// case it is written out as the `nulls` dataset and the file is marked as
// current from the next commit on.
pub(crate) fn open_nulls(shared: &SharedContainer, schema: &Schema, cfg: &Config, persist: bool) -> Result<BitMatrix> {
    let mut io = shared.lock();
    let version = io.meta().version;
    match check_version(version)? {
        Layout::Current => {
            drop(io);
            BitMatrix::new(Box::new(DatasetBits::new(shared.clone(), NULLS)), schema.len(), cfg)
        }
        Layout::LegacySentinel => {
            warn!(target: "tabula", file = %io.describe(), ?version, "upgrading legacy file: rebuilding null bitmap from sentinel words");
            let mut mem = legacy_null_bits(&mut io, schema, cfg)?;
            if !persist || schema.is_empty() {
                return Ok(mem);
            }
            let n_rows = mem.n_rows();
            let mut packed = Vec::new();
            let row_bytes = schema.len().div_ceil(8);
            for r in 0..n_rows {
                let mut row = vec![0u8; row_bytes];
                for c in mem.positions_in_row(r)? {
                    row[c / 8] |= 1 << (c % 8);
                }
                packed.extend_from_slice(&row);
            }
            io.write_at(NULLS, 0, &packed)?;
            io.meta_mut().version = CURRENT_VERSION;
            drop(io);
            BitMatrix::new(Box::new(DatasetBits::new(shared.clone(), NULLS)), schema.len(), cfg)
        }
    }
}

// Null columns of each row in first..first+count.
fn null_cols(nulls: &mut BitMatrix, n_cols: usize, first: u64, count: u64) -> Result<Vec<Vec<usize>>> {
    if n_cols == 0 {
        return Ok(vec![Vec::new(); count as usize]);
    }
    (first..first + count).map(|r| nulls.positions_in_row(r)).collect()
}

pub(crate) fn decode_rows(
    shared: &SharedContainer,
    stores: &Stores,
    schema: &Schema,
    nulls: &mut BitMatrix,
    first: u64,
    count: u64,
) -> Result<Vec<Row>> {
    let n_cols = schema.len();
    let null_cols = null_cols(nulls, n_cols, first, count)?;
    let mut io = shared.lock();
    let words = read_words(&mut io, n_cols, first, count)?;
    let mut rows = Vec::with_capacity(count as usize);
    for (r, cells) in null_cols.iter().enumerate() {
        let mut row = Vec::with_capacity(n_cols);
        for c in 0..n_cols {
            if cells.binary_search(&c).is_ok() {
                row.push(Value::Null);
                continue;
            }
            let w = words[r * n_cols + c];
            let ty = schema.type_at(c);
            row.push(match ty.is_primitive() {
                true => decode_primitive(w, ty)?,
                false => stores.read(&mut io, shared, schema.name(c), w)?,
            });
        }
        rows.push(row);
    }
    trace!(target: "tabula", first, count, "decoded rows");
    Ok(rows)
}

pub(crate) fn decode_column(
    shared: &SharedContainer,
    stores: &Stores,
    schema: &Schema,
    nulls: &mut BitMatrix,
    col: usize,
) -> Result<Vec<Value>> {
    let n_cols = schema.len();
    let ty = schema.type_at(col);
    let null_rows = nulls.positions_in_col(col)?;
    let mut io = shared.lock();
    let n_rows = io.meta().n_rows;
    let mut out = Vec::with_capacity(n_rows as usize);
    let mut first = 0;
    while first < n_rows {
        let count = SCAN_ROWS.min(n_rows - first);
        let words = read_words(&mut io, n_cols, first, count)?;
        for r in 0..count {
            if null_rows.binary_search(&(first + r)).is_ok() {
                out.push(Value::Null);
                continue;
            }
            let w = words[r as usize * n_cols + col];
            out.push(match ty.is_primitive() {
                true => decode_primitive(w, ty)?,
                false => stores.read(&mut io, shared, schema.name(col), w)?,
            });
        }
        first += count;
    }
    Ok(out)
}

// Appends a table's rows to the file, routing non-primitive cells through
// the stores, and commits.
pub(crate) fn append_rows(
    shared: &SharedContainer,
    stores: &mut Stores,
    schema: &Schema,
    nulls: &mut BitMatrix,
    table: &Table,
) -> Result<()> {
    if !table.schema().structurally_equal(schema) {
        return Err(schema_err(format!(
            "table columns {:?} do not match the file's {:?}",
            table.schema().names(),
            schema.names()
        )));
    }
    for row in table.rows() {
        for v in row {
            preload(v)?;
        }
    }
    let n_cols = schema.len();
    let count = table.rows().len() as u64;
    let mut null_cells = Vec::new();
    let first = {
        let mut io = shared.lock();
        let first = io.meta().n_rows;
        let mut words = Vec::with_capacity(count as usize * n_cols);
        for (r, row) in table.rows().iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                let ty = schema.type_at(c);
                if v.is_null() {
                    null_cells.push((first + r as u64, c));
                    words.push(0);
                } else if ty.is_primitive() {
                    words.push(encode_primitive(v, ty)?);
                } else {
                    words.push(stores.write(&mut io, schema.name(c), v)?);
                }
            }
        }
        // Written at the logical end of the committed rows, so leftovers
        // of an earlier failed append get overwritten.
        io.write_at(ROWS, first * n_cols as u64 * WORD, &u64s_to_bytes(&words))?;
        first
    };
    if n_cols > 0 {
        if nulls.n_rows() < first + count {
            nulls.resize(first + count)?;
        }
        for (r, c) in null_cells {
            nulls.set_bit(r, c)?;
        }
        nulls.flush()?;
    }
    let mut io = shared.lock();
    io.meta_mut().n_rows = first + count;
    io.commit()
}
