use tabula_base::{Config, ErrorKind, Result};
use tabula_lang::{Payload, TypeTag, Value};
use tabula_table::Table;
use crate::{
    object_id, split_object_id, store::dataset_name, Container, FileBacking, MemBacking, StoresBuilder, StringStore, Stores,
    TableReader, TimeSeriesStore, OBJECT_FLAG, STRING_FLAG, TIMESERIES_FLAG,
};
use super::{peaks, scratch, series, tiny_config};
use test_log::test;

#[test]
fn test_object_id_layout() -> Result<()> {
    assert_eq!(object_id(0, STRING_FLAG)?, 1);
    assert_eq!(object_id(0, OBJECT_FLAG)?, 8);
    assert_eq!(object_id(2, TIMESERIES_FLAG)?, (2 << 3 | 1) + 1);
    assert_eq!(split_object_id(0), None);
    assert_eq!(split_object_id(object_id(41, 2)?), Some((41, 2)));
    assert_eq!(object_id(0, 8).unwrap_err().kind(), ErrorKind::Contract);
    Ok(())
}

#[test]
fn test_same_value_twice_stored_once() -> Result<()> {
    let cfg = tiny_config();
    let shared = Container::create(Box::new(MemBacking::new()))?.into_shared();
    let mut stores = Stores::standard(&cfg)?;
    let mut io = shared.lock();
    let a = stores.write(&mut io, "name", &Value::str("caffeine"))?;
    let blob = dataset_name(STRING_FLAG, "name", "blob");
    let len = io.dataset_len(&blob);
    let b = stores.write(&mut io, "name", &Value::str("caffeine"))?;
    assert_eq!(a, b);
    assert_eq!(io.dataset_len(&blob), len);
    let c = stores.write(&mut io, "name", &Value::str("theobromine"))?;
    assert_ne!(a, c);
    // Each column has its own arrays.
    let d = stores.write(&mut io, "other", &Value::str("caffeine"))?;
    assert_eq!(split_object_id(d), Some((0, STRING_FLAG)));

    let t1 = stores.write(&mut io, "eic", &series(4, Some("x")))?;
    let t2 = stores.write(&mut io, "eic", &series(4, Some("x")))?;
    let t3 = stores.write(&mut io, "eic", &series(4, None))?;
    assert_eq!(t1, t2);
    assert_ne!(t1, t3);
    let p1 = stores.write(&mut io, "pm", &peaks(1.0))?;
    let p2 = stores.write(&mut io, "pm", &peaks(1.0))?;
    assert_eq!(p1, p2);

    assert_eq!(stores.read(&mut io, &shared, "name", a)?, Value::str("caffeine"));
    assert_eq!(stores.read(&mut io, &shared, "name", c)?, Value::str("theobromine"));
    assert_eq!(stores.read(&mut io, &shared, "name", 0)?, Value::Null);
    let lazy = stores.read(&mut io, &shared, "eic", t3)?;
    drop(io);
    // Composite values load on first use, after the lock is released.
    match &lazy {
        Value::TimeSeries(l) => {
            assert!(!l.is_loaded());
            assert_eq!(l.get()?.len(), 4);
            assert_eq!(l.get()?.label, None);
        }
        v => panic!("expected a time series, got {v:?}"),
    }
    assert_eq!(lazy, series(4, None));
    Ok(())
}

#[test]
fn test_dedup_survives_cache_eviction() -> Result<()> {
    // Four cache slots, ten distinct values: the early ones get evicted and
    // are stored again, but reads stay correct either way.
    let cfg = tiny_config();
    let shared = Container::create(Box::new(MemBacking::new()))?.into_shared();
    let mut stores = Stores::standard(&cfg)?;
    let mut io = shared.lock();
    let ids: Vec<u64> = (0..10)
        .map(|i| stores.write(&mut io, "s", &Value::str(&format!("v{i}"))))
        .collect::<Result<_>>()?;
    let again = stores.write(&mut io, "s", &Value::str("v9"))?;
    assert_eq!(again, ids[9]);
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(stores.read(&mut io, &shared, "s", *id)?, Value::str(&format!("v{i}")));
    }
    Ok(())
}

#[test]
fn test_objects_keep_their_kind() -> Result<()> {
    let cfg = Config::default();
    let shared = Container::create(Box::new(MemBacking::new()))?.into_shared();
    let mut stores = Stores::standard(&cfg)?;
    let mut io = shared.lock();
    let a = stores.write(&mut io, "o", &Value::Object(Payload::from_raw("alpha", vec![0u8, 1, 0])))?;
    let b = stores.write(&mut io, "o", &Value::Object(Payload::from_raw("beta", vec![0u8, 1, 0])))?;
    assert_ne!(a, b);
    match stores.read(&mut io, &shared, "o", b)? {
        Value::Object(p) => {
            assert_eq!(p.kind(), "beta");
            assert_eq!(p.bytes(), &[0u8, 1, 0]);
        }
        v => panic!("expected an object, got {v:?}"),
    }
    let bad = Payload::from_raw("a\0b", vec![]);
    assert_eq!(
        stores.write(&mut io, "o", &Value::Object(bad)).unwrap_err().kind(),
        ErrorKind::Schema
    );
    Ok(())
}

#[test]
fn test_registry_errors() -> Result<()> {
    let shared = Container::create(Box::new(MemBacking::new()))?.into_shared();
    let mut stores = StoresBuilder::new().register(StringStore::new(8)?).build()?;
    assert_eq!(stores.flag_for(TypeTag::Str), Some(STRING_FLAG));
    assert_eq!(stores.flag_for(TypeTag::TimeSeries), None);
    let mut io = shared.lock();
    let err = stores.write(&mut io, "eic", &series(2, None)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    let err = stores.read(&mut io, &shared, "eic", object_id(0, TIMESERIES_FLAG)?).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
    // A registered store asked for a record it never wrote.
    let err = stores.read(&mut io, &shared, "name", object_id(3, STRING_FLAG)?).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);

    let dup = StoresBuilder::new()
        .register(StringStore::new(8)?)
        .register(StringStore::new(8)?)
        .build();
    assert_eq!(dup.err().map(|e| e.kind()), Some(ErrorKind::Config));
    let ok = StoresBuilder::new()
        .register(TimeSeriesStore::new(8)?)
        .build()?;
    assert_eq!(ok.flag_for(TypeTag::TimeSeries), Some(TIMESERIES_FLAG));
    Ok(())
}

#[test]
fn test_dedup_across_append_sessions() -> Result<()> {
    let (_dir, path) = scratch();
    let cfg = Config::default();
    let t = Table::from_rows(
        &["name"],
        &[TypeTag::Str],
        &[Some("%s")],
        vec![vec![Value::str("glucose")], vec![Value::str("fructose")]],
    )?;
    crate::write_table(&path, &t, &cfg)?;
    let blob = dataset_name(STRING_FLAG, "name", "blob");
    let size = |path: &std::path::Path| -> Result<u64> {
        let r = TableReader::open(path)?;
        Ok(r.datasets().into_iter().find(|(n, _)| *n == blob).map_or(0, |(_, l)| l))
    };
    let before = size(&path)?;
    assert_eq!(before, ("glucose".len() + "fructose".len()) as u64);
    crate::append_table(&path, &t, &cfg)?;
    assert_eq!(size(&path)?, before);
    let back = crate::read_table(&path)?;
    assert_eq!(back.rows().len(), 4);
    assert_eq!(back.rows()[3], vec![Value::str("fructose")]);
    Ok(())
}

#[test]
fn test_many_distinct_strings_stay_in_few_extents() -> Result<()> {
    let (_dir, path) = scratch();
    let n = 10_000;
    let rows: Vec<Vec<Value>> = (0..n).map(|i| vec![Value::str(&format!("compound-{i:05}"))]).collect();
    let t = Table::from_rows(&["name"], &[TypeTag::Str], &[Some("%s")], rows)?;
    crate::write_table(&path, &t, &Config::default())?;

    let c = Container::open(Box::new(FileBacking::open_ro(&path)?))?;
    let dir = c.directory();
    for (name, exts) in &dir.datasets {
        assert!(exts.len() <= 2, "{name} has {} extents", exts.len());
    }
    let blob = dataset_name(STRING_FLAG, "name", "blob");
    assert_eq!(c.dataset_len(&blob), (n * "compound-00000".len()) as u64);
    drop(c);

    let back = crate::read_table(&path)?;
    assert_eq!(back.rows().len(), n);
    assert_eq!(back.rows()[n - 1], vec![Value::str("compound-09999")]);
    assert_eq!(back.rows(), t.rows());
    Ok(())
}
