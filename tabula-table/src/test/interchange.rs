use tabula_lang::{TypeTag, Value};
use crate::{CsvOptions, Table, TableView};
use super::sample;
use test_log::test;

#[test]
fn test_csv_round_trip() {
    let t = sample();
    let mut buf = Vec::new();
    t.to_csv(&mut buf, &CsvOptions::default()).unwrap();
    let text = String::from_utf8(buf.clone()).unwrap();
    assert_eq!(text, "a,b\n1,1.0\n,2.0\n3,\n");
    let back = Table::from_csv(&buf[..], &CsvOptions::default()).unwrap();
    assert_eq!(back.schema().types(), &[TypeTag::Int, TypeTag::Float]);
    assert_eq!(back.rows(), t.rows());
}

#[test]
fn test_none_literal() {
    let text = "name;flag\nNone;True\nx;\n";
    let opts = CsvOptions {
        delimiter: b';',
        none_literal_is_null: false,
        as_printed: false,
    };
    let t = Table::from_csv(text.as_bytes(), &opts).unwrap();
    assert_eq!(t.schema().types(), &[TypeTag::Str, TypeTag::Bool]);
    assert_eq!(t.rows()[0], vec![Value::str("None"), Value::Bool(true)]);
    assert_eq!(t.rows()[1], vec![Value::str("x"), Value::Null]);
    let t = Table::from_csv(text.as_bytes(), &CsvOptions { delimiter: b';', ..CsvOptions::default() }).unwrap();
    assert_eq!(t.rows()[0][0], Value::Null);
}

#[test]
fn test_csv_as_printed() {
    let mut t = sample();
    t.add_column_with_constant_value("hidden", 1, None, None).unwrap();
    t.set_col_format("hidden", None).unwrap();
    let mut buf = Vec::new();
    let opts = CsvOptions {
        as_printed: true,
        ..CsvOptions::default()
    };
    t.to_csv(&mut buf, &opts).unwrap();
    assert_eq!(String::from_utf8(buf).unwrap(), "a,b\n1,1.0\n,2.0\n3,\n");
    assert_eq!(t.len(), 3);
}
