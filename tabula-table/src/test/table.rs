use tabula_base::ErrorKind;
use tabula_eval::{AggOp, AggOptions, Expr};
use tabula_lang::{TypeTag, Value};
use crate::{Table, TableView};
use super::{col, sample};
use test_log::test;

#[test]
fn test_filter_scenario() {
    let t = sample();
    let a = t.column("a").unwrap();
    let b = t.column("b").unwrap();
    let f = t.filter(&(a.is_not_none() & b.is_not_none())).unwrap();
    assert_eq!(f.rows(), &[vec![Value::Int(1), Value::Float(1.0)]]);
    assert_eq!(t.evaluate(&a.max()).unwrap().values.as_scalar(), Some(&Value::Int(3)));
    assert_eq!(t.evaluate(&b.mean()).unwrap().values.as_scalar(), Some(&Value::Float(1.5)));
}

#[test]
fn test_filter_constants_and_partition() {
    let t = sample();
    assert_eq!(t.filter(&Expr::constant(true)).unwrap().rows(), t.rows());
    assert!(t.filter(&Expr::constant(false)).unwrap().is_empty());
    let a = t.column("a").unwrap();
    let eq = t.filter(&a.eq(1)).unwrap().len();
    let ne = t.filter(&a.ne(1)).unwrap().len();
    let nulls = col(&t, "a").iter().filter(|v| v.is_null()).count();
    assert_eq!(eq + ne, t.len() - nulls);
    // The source is untouched and the result is its own table.
    assert_eq!(t.len(), 3);
    assert_ne!(t.filter(&Expr::constant(true)).unwrap().id(), t.id());
}

#[test]
fn test_non_bool_predicate_is_rejected() {
    let t = sample();
    let a = t.column("a").unwrap();
    let e = t.filter(&a).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Contract);
    let e = t.column("zz").unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Schema);
}

#[test]
fn test_sort_by_orders_nulls() {
    let mut t = sample();
    t.sort_by(&[("a", true)]).unwrap();
    assert_eq!(col(&t, "a"), vec![Value::Null, Value::Int(1), Value::Int(3)]);
    assert_eq!(t.sorted_by(), Some("a"));
    // The sorted hint must give the same answer as a plain scan.
    let a = t.column("a").unwrap();
    assert_eq!(t.filter(&a.ge(2)).unwrap().len(), 1);
    t.sort_by(&[("b", false)]).unwrap();
    assert_eq!(col(&t, "b"), vec![Value::Float(2.0), Value::Float(1.0), Value::Null]);
    assert_eq!(t.sorted_by(), None);
}

#[test]
fn test_sort_is_stable() {
    let mut t = Table::from_rows(
        &["k", "i"],
        &[TypeTag::Int, TypeTag::Int],
        &[Some("%d"), Some("%d")],
        vec![
            vec![Value::Int(2), Value::Int(0)],
            vec![Value::Int(1), Value::Int(1)],
            vec![Value::Int(2), Value::Int(2)],
            vec![Value::Int(1), Value::Int(3)],
        ],
    )
    .unwrap();
    t.sort_by(&[("k", true)]).unwrap();
    assert_eq!(col(&t, "i"), vec![Value::Int(1), Value::Int(3), Value::Int(0), Value::Int(2)]);
}

#[test]
fn test_aggregate_columns() {
    let mut t = Table::from_rows(
        &["g", "v"],
        &[TypeTag::Str, TypeTag::Int],
        &[Some("%s"), Some("%d")],
        vec![
            vec![Value::str("x"), Value::Int(1)],
            vec![Value::str("y"), Value::Int(5)],
            vec![Value::str("x"), Value::Int(2)],
        ],
    )
    .unwrap();
    let v = t.column("v").unwrap();
    t.aggregate(&v.sum(), "total", &[]).unwrap();
    t.aggregate(&v.max(), "gmax", &["g"]).unwrap();
    assert_eq!(col(&t, "total"), vec![Value::Int(8); 3]);
    assert_eq!(col(&t, "gmax"), vec![Value::Int(2), Value::Int(5), Value::Int(2)]);
    let e = t.aggregate(&v, "bad", &[]).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Contract);
    let opts = AggOptions {
        ignore_none: true,
        default: Value::Int(0),
    };
    let empty = t.filter(&Expr::constant(false)).unwrap();
    let ev = empty.column("v").unwrap();
    let r = empty.evaluate(&ev.aggregate(AggOp::Sum, opts)).unwrap();
    assert_eq!(r.values.as_scalar(), Some(&Value::Int(0)));
}

#[test]
fn test_column_mutations() {
    let mut t = sample();
    let a = t.column("a").unwrap();
    t.add_column("c", &a * 10, None, None).unwrap();
    assert_eq!(t.schema().type_at(2), TypeTag::Int);
    assert_eq!(col(&t, "c"), vec![Value::Int(10), Value::Null, Value::Int(30)]);
    t.add_column_with_constant_value("k", "x", None, Some("%s")).unwrap();
    assert_eq!(col(&t, "k"), vec![Value::str("x"); 3]);
    let e = t.add_column("a", vec![Value::Null; 3], Some(TypeTag::Int), None).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Schema);
    t.replace_column("a", vec![Value::Int(7), Value::Int(8), Value::Int(9)], None).unwrap();
    assert_eq!(col(&t, "a"), vec![Value::Int(7), Value::Int(8), Value::Int(9)]);
    t.rename_columns(&[("c", "d"), ("k", "kind")]).unwrap();
    assert_eq!(t.schema().names(), &["a", "b", "d", "kind"]);
    // A failing rename leaves everything as it was.
    assert!(t.rename_columns(&[("d", "e"), ("kind", "a")]).is_err());
    assert_eq!(t.schema().names(), &["a", "b", "d", "kind"]);
    t.drop_columns(&["d", "kind"]).unwrap();
    assert_eq!(t.schema().len(), 2);
    assert!(t.rows().iter().all(|r| r.len() == 2));
    t.set_col_type("a", TypeTag::Float).unwrap();
    assert_eq!(col(&t, "a")[0], Value::Float(7.0));
    let e = t.set_col_type("b", TypeTag::Str).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Schema);
    t.set_col_format("b", None).unwrap();
    assert!(t.columns()[1].2.is_none());
}

#[test]
fn test_rows_enumeration_and_copy() {
    let mut t = sample();
    t.add_enumeration("id").unwrap();
    assert_eq!(t.schema().name(0), "id");
    assert_eq!(col(&t, "id"), vec![Value::Int(0), Value::Int(1), Value::Int(2)]);
    t.delete_rows(&[0, 2]).unwrap();
    assert_eq!(t.len(), 1);
    assert!(t.delete_rows(&[5]).is_err());
    let e = t.add_row(vec![Value::Int(9)]).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Schema);
    let c = t.copy();
    assert_ne!(c.id(), t.id());
    assert_eq!(c.rows(), t.rows());
    let mut u = t.copy();
    u.extend(&t).unwrap();
    assert_eq!(u.len(), 2);
    assert!(u.extend(&sample()).is_err());
}

#[test]
fn test_split_and_unique() {
    let t = Table::from_rows(
        &["g", "v"],
        &[TypeTag::Str, TypeTag::Int],
        &[Some("%s"), Some("%d")],
        vec![
            vec![Value::str("x"), Value::Int(1)],
            vec![Value::str("y"), Value::Int(5)],
            vec![Value::str("x"), Value::Int(1)],
            vec![Value::Null, Value::Int(1)],
        ],
    )
    .unwrap();
    let parts = t.split_by(&["g"]).unwrap();
    assert_eq!(parts.iter().map(|p| p.len()).collect::<Vec<_>>(), vec![2, 1, 1]);
    assert_eq!(t.unique_rows().unwrap().len(), 3);
}

#[test]
fn test_display_hides_unformatted_columns() {
    let mut t = sample();
    t.set_title(Some("demo".to_string()));
    t.set_col_format("b", None).unwrap();
    let text = t.to_string();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "demo");
    assert_eq!(lines[1], "a");
    assert_eq!(lines[3], "---");
    assert_eq!(lines[5], "-");
    assert!(!text.contains("1.0"));
}
