use tabula_base::ErrorKind;
use tabula_lang::{TypeTag, Value};
use crate::{AggOp, AggOptions};
use super::{floats, ints, Fixture};
use test_log::test;

#[test]
fn test_reductions_skip_nulls_by_default() {
    let mut fx = Fixture::new();
    let x = fx.bind("x", TypeTag::Float, floats(&[Some(1.0), None, Some(3.0), Some(4.0)]));
    assert_eq!(fx.eval(&x.min()), vec![Value::Float(1.0)]);
    assert_eq!(fx.eval(&x.sum()), vec![Value::Float(8.0)]);
    assert_eq!(fx.eval(&x.median()), vec![Value::Float(3.0)]);
    assert_eq!(fx.eval(&x.count()), vec![Value::Int(3)]);
    assert_eq!(fx.eval(&x.count_none()), vec![Value::Int(1)]);
    assert_eq!(fx.eval(&x.has_none()), vec![Value::Bool(true)]);
    assert_eq!(fx.eval(&x.all_none()), vec![Value::Bool(false)]);
    let std = fx.eval(&x.std())[0].as_f64().unwrap();
    assert!((std - (14.0f64 / 9.0).sqrt()).abs() < 1e-12);
}

#[test]
fn test_keeping_nulls_poisons_numeric_reductions() {
    let mut fx = Fixture::new();
    let x = fx.bind("x", TypeTag::Int, ints(&[Some(1), None, Some(3)]));
    let opts = AggOptions {
        ignore_none: false,
        default: Value::Null,
    };
    assert_eq!(fx.eval(&x.aggregate(AggOp::Max, opts.clone())), vec![Value::Null]);
    assert_eq!(fx.eval(&x.aggregate(AggOp::Count, opts)), vec![Value::Int(3)]);
}

#[test]
fn test_empty_input_uses_default() {
    let mut fx = Fixture::new();
    let x = fx.bind("x", TypeTag::Int, vec![]);
    assert_eq!(fx.eval(&x.max()), vec![Value::Null]);
    let opts = AggOptions {
        ignore_none: true,
        default: Value::Int(-1),
    };
    assert_eq!(fx.eval(&x.aggregate(AggOp::Sum, opts)), vec![Value::Int(-1)]);
    assert_eq!(fx.eval(&x.count()), vec![Value::Int(0)]);
    assert_eq!(fx.eval(&x.all_none()), vec![Value::Bool(true)]);
}

#[test]
fn test_boolean_and_distinct_aggregates() {
    let mut fx = Fixture::new();
    let p = fx.bind(
        "p",
        TypeTag::Bool,
        vec![Value::Bool(true), Value::Null, Value::Bool(true)],
    );
    assert_eq!(fx.eval(&p.all_true()), vec![Value::Bool(true)]);
    assert_eq!(fx.eval(&p.any_false()), vec![Value::Bool(false)]);
    assert_eq!(fx.eval(&p.unique_value()), vec![Value::Bool(true)]);
    let x = fx.bind("x", TypeTag::Float, floats(&[Some(1.0), Some(1.0), Some(2.5)]));
    assert_eq!(fx.eval(&x.count_different()), vec![Value::Int(2)]);
    let e = x.unique_value().eval(&fx.ctx).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Contract);
    let e = x.all_true().eval(&fx.ctx).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Contract);
}

#[test]
fn test_group_by_broadcasts_per_group() {
    let mut fx = Fixture::new();
    let g = fx.bind(
        "g",
        TypeTag::Str,
        vec![
            Value::str("a"),
            Value::str("b"),
            Value::str("a"),
            Value::Null,
            Value::str("b"),
        ],
    );
    let v = fx.bind("v", TypeTag::Int, ints(&[Some(1), Some(10), Some(2), Some(100), Some(20)]));
    let e = v.sum().group_by(&[g]).unwrap();
    assert_eq!(
        fx.eval(&e),
        ints(&[Some(3), Some(30), Some(3), None, Some(30)])
    );
}
