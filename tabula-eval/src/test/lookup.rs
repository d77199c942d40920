use tabula_base::ErrorKind;
use tabula_lang::Value;
use crate::{Lookup, Tolerance};
use super::{floats, ints};
use test_log::test;

#[test]
fn test_exact_lookup() {
    let vals = ints(&[Some(3), None, Some(1), Some(3)]);
    let lk = Lookup::build(&vals, None).unwrap();
    assert!(matches!(lk, Lookup::Exact { .. }));
    assert_eq!(lk.find(&Value::Int(3)).unwrap(), vec![0, 3]);
    assert_eq!(lk.find(&Value::Float(1.0)).unwrap(), vec![2]);
    assert!(lk.find(&Value::Null).unwrap().is_empty());
    assert!(lk.find(&Value::Int(7)).unwrap().is_empty());
}

fn brute(vals: &[Value], needle: f64, tol: Tolerance) -> Vec<usize> {
    vals.iter()
        .enumerate()
        .filter_map(|(i, v)| v.as_f64().filter(|b| tol.matches(needle, *b)).map(|_| i))
        .collect()
}

#[test]
fn test_tolerance_lookups_match_brute_force() {
    let vals = floats(&[
        Some(0.0),
        Some(0.95),
        Some(1.0),
        Some(1.1),
        None,
        Some(-2.0),
        Some(100.0),
        Some(99.0),
    ]);
    for tol in [Tolerance::Abs(0.1), Tolerance::Abs(2.5), Tolerance::Rel(0.01), Tolerance::Rel(0.5)] {
        let lk = Lookup::build(&vals, Some(tol)).unwrap();
        for needle in [-2.1, 0.0, 0.9, 1.0, 1.05, 50.0, 99.5, 100.5, 150.0] {
            assert_eq!(
                lk.find(&Value::Float(needle)).unwrap(),
                brute(&vals, needle, tol),
                "{tol:?} needle {needle}"
            );
        }
    }
}

#[test]
fn test_relative_lookup_over_zeros_is_exact() {
    let vals = floats(&[Some(0.0), Some(0.0)]);
    let lk = Lookup::build(&vals, Some(Tolerance::Rel(0.1))).unwrap();
    assert!(matches!(lk, Lookup::Exact { .. }));
    assert_eq!(lk.find(&Value::Int(0)).unwrap(), vec![0, 1]);
    assert!(lk.find(&Value::Float(0.01)).unwrap().is_empty());
}

#[test]
fn test_tolerance_lookup_rejects_non_numbers() {
    let vals = vec![Value::str("x")];
    let e = Lookup::build(&vals, Some(Tolerance::Abs(1.0))).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Contract);
    let e = Lookup::build(&[], Some(Tolerance::Abs(-1.0))).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Contract);
}
