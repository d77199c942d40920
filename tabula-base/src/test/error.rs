use crate::{contract_err, err, schema_err, Error, ErrorKind, Result};
use test_log::test;

#[test]
fn test_error() {
    let e = err("test error");
    assert_eq!(e.kind(), ErrorKind::Other);
    assert_eq!(e.message(), "test error");
}

#[test]
fn test_error_kinds() {
    assert!(schema_err("dup").is(ErrorKind::Schema));
    assert!(contract_err("bad").is(ErrorKind::Contract));
    let shown = format!("{}", schema_err("duplicate column name a"));
    assert!(shown.contains("Schema"));
    assert!(shown.contains("duplicate column name a"));
}

fn open_missing() -> Result<std::fs::File> {
    Ok(std::fs::File::open("/definitely/not/a/real/path/tabula")?)
}

#[test]
fn test_foreign_errors_are_external() {
    let e: Error = open_missing().unwrap_err();
    assert_eq!(e.kind(), ErrorKind::External);
}
