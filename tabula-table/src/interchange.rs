// CSV import and export. An empty field is a missing value; a field
// reading `None` is one too when `none_literal_is_null` is set, and
// otherwise stays the string "None". Import infers one type per column,
// trying int, then float, then bool, then falling back to str.

use std::io::{Read, Write};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tabula_base::Result;
use tabula_lang::{Schema, TypeTag, Value};
use tracing::debug;
use crate::{table::default_format, Table, TableView};

#[derive(Clone, Debug)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub none_literal_is_null: bool,
    // Export cells through their column formats and skip hidden columns.
    pub as_printed: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            delimiter: b',',
            none_literal_is_null: true,
            as_printed: false,
        }
    }
}

const NONE_LITERAL: &str = "None";

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "True" | "true" => Some(true),
        "False" | "false" => Some(false),
        _ => None,
    }
}

fn infer(fields: &[Option<&str>]) -> TypeTag {
    let present = || fields.iter().flatten();
    if present().next().is_none() {
        TypeTag::Str
    } else if present().all(|f| f.parse::<i64>().is_ok()) {
        TypeTag::Int
    } else if present().all(|f| f.parse::<f64>().is_ok()) {
        TypeTag::Float
    } else if present().all(|f| parse_bool(f).is_some()) {
        TypeTag::Bool
    } else {
        TypeTag::Str
    }
}

fn parse(field: Option<&str>, ty: TypeTag) -> Value {
    let Some(f) = field else {
        return Value::Null;
    };
    match ty {
        TypeTag::Int => f.parse::<i64>().map(Value::Int).unwrap_or_default(),
        TypeTag::Float => f.parse::<f64>().map(Value::Float).unwrap_or_default(),
        TypeTag::Bool => parse_bool(f).map(Value::Bool).unwrap_or_default(),
        _ => Value::str(f),
    }
}

fn raw_field(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Float(x) => format!("{x:?}"),
        v => v.to_string(),
    }
}

impl Table {
    pub fn from_csv<R: Read>(reader: R, opts: &CsvOptions) -> Result<Table> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(opts.delimiter)
            .has_headers(true)
            .from_reader(reader);
        let names: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let records = rdr.records().collect::<std::result::Result<Vec<StringRecord>, csv::Error>>()?;
        let field = |rec: &StringRecord, i: usize| -> Option<String> {
            match rec.get(i) {
                None | Some("") => None,
                Some(NONE_LITERAL) if opts.none_literal_is_null => None,
                Some(f) => Some(f.to_string()),
            }
        };
        let cells: Vec<Vec<Option<String>>> = records
            .iter()
            .map(|rec| (0..names.len()).map(|i| field(rec, i)).collect())
            .collect();
        let types: Vec<TypeTag> = (0..names.len())
            .map(|i| {
                let col: Vec<Option<&str>> = cells.iter().map(|r| r[i].as_deref()).collect();
                infer(&col)
            })
            .collect();
        debug!(target: "tabula", columns = ?names, ?types, rows = cells.len(), "read csv");
        let formats = types.iter().map(|t| default_format(*t)).collect();
        let schema = Schema::new(names, types.clone(), formats)?;
        let rows = cells
            .iter()
            .map(|r| r.iter().zip(&types).map(|(f, t)| parse(f.as_deref(), *t)).collect())
            .collect();
        Ok(Table::assemble(schema, rows, None, Default::default()))
    }

    pub fn to_csv<W: Write>(&self, writer: W, opts: &CsvOptions) -> Result<()> {
        let mut wtr = WriterBuilder::new().delimiter(opts.delimiter).from_writer(writer);
        let schema = self.schema();
        let shown: Vec<usize> = (0..schema.len())
            .filter(|&i| !opts.as_printed || schema.format_at(i).is_some())
            .collect();
        wtr.write_record(shown.iter().map(|&i| schema.name(i)))?;
        for row in self.rows() {
            let fields: Vec<String> = shown
                .iter()
                .map(|&i| match (opts.as_printed, schema.format_at(i), &row[i]) {
                    (_, _, Value::Null) => String::new(),
                    (true, Some(f), v) => f.render(v),
                    (_, _, v) => raw_field(v),
                })
                .collect();
            wtr.write_record(&fields)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
