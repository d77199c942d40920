use std::path::PathBuf;
use tabula_base::Config;
use tabula_lang::{Lazy, Payload, PeakMap, Polarity, Spectrum, TimeSeries, TypeTag, Value};
use tabula_table::Table;

mod bitmatrix;
mod proxy;
mod store;

// Small blocks and caches so a handful of rows already evicts.
pub(crate) fn tiny_config() -> Config {
    Config {
        bitmap_block_rows: 2,
        bitmap_cache_blocks: 2,
        row_cache_capacity: 2,
        column_cache_capacity: 2,
        dedup_cache_capacity: 4,
    }
}

pub(crate) fn scratch() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.tab");
    (dir, path)
}

pub(crate) fn series(n: usize, label: Option<&str>) -> Value {
    let x: Vec<f64> = (0..n).map(|i| i as f64 * 0.5).collect();
    let y: Vec<f64> = (0..n).map(|i| (i * i) as f64).collect();
    let ts = TimeSeries::new(x, y, label.map(str::to_string)).unwrap();
    Value::TimeSeries(Lazy::loaded(ts))
}

pub(crate) fn peaks(rt: f64) -> Value {
    let mut pm = PeakMap::new(vec![
        Spectrum {
            rt,
            ms_level: 1,
            polarity: Polarity::Positive,
            peaks: vec![(100.0, 5.0), (200.5, 7.25)],
        },
        Spectrum {
            rt: rt + 1.0,
            ms_level: 2,
            polarity: Polarity::Negative,
            peaks: vec![],
        },
    ]);
    pm.meta.insert("source".to_string(), "run-1".to_string());
    Value::PeakMap(Lazy::loaded(pm))
}

// One column of every type, with a null in each.
pub(crate) fn mixed() -> Table {
    let mut t = Table::from_rows(
        &["id", "mz", "ok", "name", "eic", "pm", "obj"],
        &[
            TypeTag::Int,
            TypeTag::Float,
            TypeTag::Bool,
            TypeTag::Str,
            TypeTag::TimeSeries,
            TypeTag::PeakMap,
            TypeTag::Object,
        ],
        &[Some("%d"), Some("%.4f"), Some("%s"), Some("%s"), None, None, Some("%r")],
        vec![
            vec![
                Value::Int(1),
                Value::Float(100.25),
                Value::Bool(true),
                Value::str("alpha"),
                series(3, Some("eic a")),
                peaks(10.0),
                Value::Object(Payload::from_raw("blob", vec![1u8, 2, 3])),
            ],
            vec![
                Value::Null,
                Value::Float(-0.5),
                Value::Null,
                Value::str(""),
                Value::Null,
                Value::Null,
                Value::Object(Payload::from_raw("blob", vec![])),
            ],
            vec![
                Value::Int(-7),
                Value::Null,
                Value::Bool(false),
                Value::Null,
                series(0, None),
                peaks(20.0),
                Value::Null,
            ],
            vec![
                Value::Int(i64::MIN + 1),
                Value::Float(f64::MAX),
                Value::Bool(true),
                Value::str("alpha"),
                series(3, Some("eic a")),
                peaks(10.0),
                Value::Object(Payload::from_raw("blob", vec![1u8, 2, 3])),
            ],
        ],
    )
    .unwrap();
    t.set_title(Some("mixed".to_string()));
    t.meta_mut().insert("instrument".to_string(), Value::str("qtof"));
    t.meta_mut().insert("runs".to_string(), Value::Int(2));
    t
}
