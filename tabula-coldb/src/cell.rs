// Every cell of the `rows` dataset is one little-endian u64 word. For
// primitive columns the word is the value itself; for everything else it
// is a global object id. A null primitive's word is meaningless and the
// null bitmap is authoritative.

use tabula_base::{corrupt_err, schema_err, Result};
use tabula_lang::{TypeTag, Value};

pub(crate) const WORD: u64 = 8;

pub(crate) fn encode_primitive(v: &Value, ty: TypeTag) -> Result<u64> {
    match (ty, v) {
        (_, Value::Null) => Ok(0),
        (TypeTag::Bool, Value::Bool(b)) => Ok(*b as u64),
        (TypeTag::Int, Value::Int(i)) => Ok(*i as u64),
        (TypeTag::Int, Value::Bool(b)) => Ok(*b as u64),
        (TypeTag::Float, v) if v.is_numeric() => match v.as_f64() {
            Some(f) => Ok(f.to_bits()),
            None => Err(schema_err(format!("{ty} column cannot hold {v}"))),
        },
        (ty, v) => Err(schema_err(format!("{ty} column cannot hold {v}"))),
    }
}

pub(crate) fn decode_primitive(word: u64, ty: TypeTag) -> Result<Value> {
    match ty {
        TypeTag::Bool => match word {
            0 => Ok(Value::Bool(false)),
            1 => Ok(Value::Bool(true)),
            w => Err(corrupt_err(format!("bool cell holds word {w:#x}"))),
        },
        TypeTag::Int => Ok(Value::Int(word as i64)),
        TypeTag::Float => Ok(Value::Float(f64::from_bits(word))),
        ty => Err(corrupt_err(format!("{ty} is not stored inline"))),
    }
}

pub(crate) fn words_of(row: &[u8]) -> impl Iterator<Item = u64> + '_ {
    row.chunks_exact(WORD as usize).map(|c| {
        let mut w = [0u8; 8];
        w.copy_from_slice(c);
        u64::from_le_bytes(w)
    })
}
