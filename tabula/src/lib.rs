// Typed tables with lazily evaluated column expressions, and a columnar
// file format that stores them.
//
// The crates underneath are layered: values and schemas, then expressions
// over them, then in-memory tables, then the store. Most users only need
// this facade.

pub use tabula_base::{Config, Error, ErrorKind, Result};
pub use tabula_coldb::{
    append_table, read_table, write_table, TableAppender, TableProxy, TableReader, TableWriter,
};
pub use tabula_eval::{AggOp, AggOptions, Expr, Tolerance};
pub use tabula_lang::{
    Format, Lazy, Payload, PeakMap, Polarity, Row, Schema, Spectrum, TimeSeries, TypeTag, Value,
};
pub use tabula_table::{CsvOptions, Table, TableView};
