use crate::{Format, Value};
use test_log::test;

#[test]
fn test_basic_conversions() {
    assert_eq!(Format::new("%d").unwrap().render(&Value::Int(42)), "42");
    assert_eq!(Format::new("%.2f").unwrap().render(&Value::Float(3.14159)), "3.14");
    assert_eq!(Format::new("%5.1f").unwrap().render(&Value::Float(2.0)), "  2.0");
    assert_eq!(Format::new("%s").unwrap().render(&Value::str("abc")), "abc");
    assert_eq!(Format::new("%r").unwrap().render(&Value::str("abc")), "\"abc\"");
    assert_eq!(Format::new("%.2e").unwrap().render(&Value::Float(1500.0)), "1.50e3");
}

#[test]
fn test_minutes_and_literals() {
    let f = Format::new("rt=%.2fm").unwrap();
    assert_eq!(f.render(&Value::Float(90.0)), "rt=1.50m");
    assert_eq!(Format::new("%d ppm").unwrap().render(&Value::Int(5)), "5 ppm");
}

#[test]
fn test_null_renders_dash() {
    assert_eq!(Format::new("%.3f").unwrap().render(&Value::Null), "-");
}

#[test]
fn test_bad_formats() {
    assert!(Format::new("plain").is_err());
    assert!(Format::new("%q").is_err());
    assert!(Format::new("%d %d").is_err());
    assert!(Format::new("%.f").is_err());
}

#[test]
fn test_serde_as_string() {
    let f = Format::new("%.4f").unwrap();
    let bytes = rmp_serde::to_vec(&f).unwrap();
    let back: Format = rmp_serde::from_slice(&bytes).unwrap();
    assert_eq!(back, f);
}
