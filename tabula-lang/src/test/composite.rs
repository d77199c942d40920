use std::sync::{atomic::{AtomicUsize, Ordering}, Arc};
use serde::{Deserialize, Serialize};
use crate::{Lazy, Materialize, Payload, PayloadCodec, PeakMap, Polarity, Spectrum, TimeSeries};
use tabula_base::{ErrorKind, Result};
use test_log::test;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Adduct {
    name: String,
    mass_shift: f64,
}

impl PayloadCodec for Adduct {
    const KIND: &'static str = "adduct";
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Other(i64);

impl PayloadCodec for Other {
    const KIND: &'static str = "other";
}

#[test]
fn test_payload_roundtrip_and_kind_check() {
    let a = Adduct { name: "M+H".into(), mass_shift: 1.007276 };
    let p = Payload::pack(&a).unwrap();
    assert_eq!(p.kind(), "adduct");
    assert_eq!(p.unpack::<Adduct>().unwrap(), a);
    let e = p.unpack::<Other>().unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Contract);
}

struct Counting {
    calls: Arc<AtomicUsize>,
}

impl Materialize<TimeSeries> for Counting {
    fn materialize(&self) -> Result<TimeSeries> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        TimeSeries::new(vec![1.0, 2.0], vec![10.0, 20.0], None)
    }
    fn describe(&self) -> String {
        "counting".into()
    }
}

#[test]
fn test_lazy_loads_once_and_shares() {
    let calls = Arc::new(AtomicUsize::new(0));
    let lazy = Lazy::deferred(Counting { calls: calls.clone() });
    let other = lazy.clone();
    assert!(!lazy.is_loaded());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(lazy.get().unwrap().len(), 2);
    assert!(other.is_loaded());
    other.get().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(lazy, Lazy::loaded(TimeSeries::new(vec![1.0, 2.0], vec![10.0, 20.0], None).unwrap()));
}

#[test]
fn test_time_series_shape() {
    assert!(TimeSeries::new(vec![1.0], vec![], None).is_err());
    let ts = TimeSeries::new(vec![3.0, 1.0, 2.0], vec![0.0; 3], Some("eic".into())).unwrap();
    assert_eq!(ts.x_range(), Some((1.0, 3.0)));
}

#[test]
fn test_peakmap_chromatogram() {
    let spectrum = |rt: f64, level: u8| Spectrum {
        rt,
        ms_level: level,
        polarity: Polarity::Positive,
        peaks: vec![(100.0, 1.0), (200.0, 2.0), (200.5, 3.0), (300.0, 4.0)],
    };
    let pm = PeakMap::new(vec![spectrum(10.0, 1), spectrum(20.0, 2), spectrum(30.0, 1), spectrum(40.0, 1)]);
    assert_eq!(pm.peak_count(), 16);
    assert_eq!(pm.ms_levels(), vec![1, 2]);
    assert_eq!(pm.rt_range(), Some((10.0, 40.0)));
    let chrom = pm.chromatogram((199.0, 201.0), (0.0, 35.0), 1);
    assert_eq!(chrom.x, vec![10.0, 30.0]);
    assert_eq!(chrom.y, vec![5.0, 5.0]);
    assert_eq!(Polarity::from_code(Polarity::Negative.code()), Some(Polarity::Negative));
}
