use tabula_base::{Config, ErrorKind, Result};
use tabula_eval::Expr;
use tabula_lang::{TypeTag, Value};
use tabula_table::{Table, TableView};
use crate::{TableProxy, TableReader};
use super::{mixed, scratch, series, tiny_config};
use test_log::test;

fn numbers() -> Table {
    let rows = [(3, Some(0.5)), (1, None), (2, Some(2.5)), (1, Some(-1.0)), (5, Some(0.5))];
    Table::from_rows(
        &["n", "x", "tag"],
        &[TypeTag::Int, TypeTag::Float, TypeTag::Str],
        &[Some("%d"), Some("%.2f"), Some("%s")],
        rows.iter()
            .enumerate()
            .map(|(i, (n, x))| {
                vec![
                    Value::Int(*n),
                    x.map_or(Value::Null, Value::Float),
                    Value::str(&format!("t{}", i % 2)),
                ]
            })
            .collect(),
    )
    .unwrap()
}

#[test]
fn test_proxy_reads_like_the_table() -> Result<()> {
    let (_dir, path) = scratch();
    let t = mixed();
    crate::write_table(&path, &t, &Config::default())?;
    let p = TableProxy::open(&path, &tiny_config())?;
    assert_eq!(p.len(), t.len());
    assert_eq!(p.title(), Some("mixed"));
    assert_eq!(p.meta(), t.meta());
    assert_eq!(p.columns(), t.columns());
    // More lookups than the row cache holds, some repeated.
    for i in [0, 3, 1, 0, 2, 3, 1] {
        assert_eq!(p.row(i)?, t.rows()[i], "row {i}");
    }
    for name in ["id", "name", "eic", "mz", "id"] {
        assert_eq!(*p.column_values(name)?, *t.column_values(name)?, "column {name}");
    }
    assert_eq!(p.row(4).unwrap_err().kind(), ErrorKind::Contract);
    assert_eq!(p.column_values("nope").unwrap_err().kind(), ErrorKind::Schema);
    let back = p.to_table()?;
    assert_eq!(back.rows(), t.rows());
    p.close()
}

#[test]
fn test_proxy_filter_matches_in_memory_filter() -> Result<()> {
    let (_dir, path) = scratch();
    let t = numbers();
    crate::write_table(&path, &t, &Config::default())?;
    let p = TableProxy::open(&path, &tiny_config())?;
    let cases = |n: &Expr, x: &Expr, tag: &Expr| -> Vec<Expr> {
        vec![
            n.gt(1),
            x.is_none(),
            n.eq(1) & x.is_not_none(),
            tag.eq("t0") | x.lt(0.0),
            Expr::constant(true),
            Expr::constant(false),
        ]
    };
    let on_proxy = cases(&p.column("n")?, &p.column("x")?, &p.column("tag")?);
    let on_table = cases(&t.column("n")?, &t.column("x")?, &t.column("tag")?);
    for (pe, te) in on_proxy.iter().zip(&on_table) {
        let got = p.filter(pe)?;
        let want = t.filter(te)?;
        assert_eq!(got.rows(), want.rows(), "{te:?}");
    }
    // Columns of some other table are not ours to bind.
    let foreign = t.column("n")?.gt(1);
    assert!(p.filter(&foreign).is_err());
    Ok(())
}

#[test]
fn test_sort_permutation_is_persisted() -> Result<()> {
    let (_dir, path) = scratch();
    crate::write_table(&path, &numbers(), &Config::default())?;
    let p = TableProxy::open(&path, &Config::default())?;
    let perm = p.sort_permutation(&[("n", true), ("x", false)])?;
    assert_eq!(perm, vec![3, 1, 2, 0, 4]);
    let rows = p.sorted_rows(&[("x", true)])?;
    let xs: Vec<Value> = rows.iter().map(|r| r[1].clone()).collect();
    assert_eq!(
        xs,
        vec![Value::Null, Value::Float(-1.0), Value::Float(0.5), Value::Float(0.5), Value::Float(2.5)]
    );
    p.close()?;

    let names: Vec<String> = TableReader::open(&path)?.datasets().into_iter().map(|(n, _)| n).collect();
    assert!(names.contains(&"perm/n+,x-".to_string()));
    assert!(names.contains(&"perm/x+".to_string()));
    let p = TableProxy::open(&path, &Config::default())?;
    assert_eq!(p.sort_permutation(&[("n", true), ("x", false)])?, perm);
    assert_eq!(p.sort_permutation(&[("zz", true)]).unwrap_err().kind(), ErrorKind::Schema);
    Ok(())
}

#[test]
fn test_replace_cell_and_column() -> Result<()> {
    let (_dir, path) = scratch();
    crate::write_table(&path, &numbers(), &Config::default())?;
    let mut p = TableProxy::open(&path, &tiny_config())?;
    p.sort_permutation(&[("x", true)])?;
    assert_eq!(p.row(1)?[1], Value::Null);

    p.replace_cell(1, "x", 9.0)?;
    p.replace_cell(0, "n", Value::Null)?;
    p.replace_cell(2, "tag", "fresh")?;
    p.replace_cell(3, "x", 4)?;
    assert_eq!(p.row(1)?[1], Value::Float(9.0));
    assert_eq!(p.row(0)?[0], Value::Null);
    assert_eq!(p.row(2)?[2], Value::str("fresh"));
    assert_eq!(p.row(3)?[1], Value::Float(4.0));
    assert_eq!(p.replace_cell(0, "n", "text").unwrap_err().kind(), ErrorKind::Schema);
    assert_eq!(p.replace_cell(9, "n", 1).unwrap_err().kind(), ErrorKind::Contract);
    // The stale permutation went away with the change to x.
    assert_eq!(p.sort_permutation(&[("x", true)])?, vec![0, 4, 2, 3, 1]);

    let tags = vec![Value::Null, Value::str("a"), Value::str("a"), Value::Null, Value::str("b")];
    p.replace_column("tag", tags.clone())?;
    assert_eq!(*p.column_values("tag")?, tags);
    assert_eq!(p.replace_column("tag", vec![]).unwrap_err().kind(), ErrorKind::Schema);
    p.close()?;

    let back = crate::read_table(&path)?;
    assert_eq!(back.rows()[0], vec![Value::Null, Value::Float(0.5), Value::Null]);
    assert_eq!(back.rows()[1], vec![Value::Int(1), Value::Float(9.0), Value::str("a")]);
    assert_eq!(back.rows()[3], vec![Value::Int(1), Value::Float(4.0), Value::Null]);
    Ok(())
}

#[test]
fn test_replace_composite_cell() -> Result<()> {
    let (_dir, path) = scratch();
    crate::write_table(&path, &mixed(), &Config::default())?;
    let mut p = TableProxy::open(&path, &Config::default())?;
    // A value read out of the file goes back into it.
    let existing = p.row(0)?[4].clone();
    p.replace_cell(1, "eic", existing.clone())?;
    p.replace_cell(2, "eic", series(7, Some("new")))?;
    assert_eq!(p.row(1)?[4], existing);
    let Value::TimeSeries(ts) = &p.row(2)?[4] else {
        panic!("expected a time series");
    };
    assert_eq!(ts.get()?.len(), 7);
    p.close()
}
