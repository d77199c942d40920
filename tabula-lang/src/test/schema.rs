use crate::{split_postfix, Format, Schema, TypeTag, Value};
use tabula_base::ErrorKind;
use test_log::test;

fn ab() -> Schema {
    Schema::new(
        vec!["a".into(), "b".into()],
        vec![TypeTag::Int, TypeTag::Float],
        vec![Some(Format::new("%d").unwrap()), None],
    )
    .unwrap()
}

#[test]
fn test_postfix_parsing() {
    assert_eq!(split_postfix("mz__3"), ("mz", Some(3)));
    assert_eq!(split_postfix("mz"), ("mz", None));
    assert_eq!(split_postfix("a__b"), ("a__b", None));
    assert_eq!(split_postfix("x__"), ("x__", None));
}

#[test]
fn test_duplicate_and_empty_names() {
    let e = Schema::new(
        vec!["a".into(), "a".into()],
        vec![TypeTag::Int, TypeTag::Int],
        vec![None, None],
    )
    .unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Schema);
    let mut s = ab();
    assert!(s.push("", TypeTag::Int, None).is_err());
    assert!(s.push("__0", TypeTag::Int, None).is_err());
    assert!(s.push("b", TypeTag::Int, None).is_err());
    assert_eq!(s.len(), 2);
}

#[test]
fn test_mismatched_lengths() {
    let e = Schema::new(vec!["a".into()], vec![], vec![None]).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Schema);
}

#[test]
fn test_conform_row() {
    let s = ab();
    let row = s.conform_row(vec![Value::Int(1), Value::Int(2)]).unwrap();
    assert!(matches!(row[1], Value::Float(x) if x == 2.0));
    assert!(s.conform_row(vec![Value::Int(1)]).is_err());
    assert!(s.conform_row(vec![Value::Float(1.5), Value::Null]).is_err());
}

#[test]
fn test_rename_and_postfix() {
    let mut s = ab();
    s.rename("b", "b__4").unwrap();
    assert_eq!(s.max_postfix(), Some(4));
    assert!(s.rename("a", "b__4").is_err());
    assert!(s.structurally_equal(&s.clone()));
    assert!(!s.structurally_equal(&ab()));
}
