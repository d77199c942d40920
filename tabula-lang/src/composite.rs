use std::{
    collections::BTreeMap,
    sync::{Arc, OnceLock},
};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};
use tabula_base::{contract_err, Result};

// An opaque serialized cell value. The `kind` names the concrete type so
// a payload can only be unpacked as what it was packed from; how the
// bytes are laid out is up to that type's PayloadCodec.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Payload {
    kind: String,
    bytes: Arc<[u8]>,
}

pub trait PayloadCodec: Serialize + DeserializeOwned {
    const KIND: &'static str;

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

impl Payload {
    pub fn from_raw(kind: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Payload {
            kind: kind.into(),
            bytes: bytes.into(),
        }
    }

    pub fn pack<T: PayloadCodec>(val: &T) -> Result<Self> {
        Ok(Payload::from_raw(T::KIND, val.encode()?))
    }

    pub fn unpack<T: PayloadCodec>(&self) -> Result<T> {
        if self.kind != T::KIND {
            return Err(contract_err(format!(
                "payload of kind {} cannot be unpacked as {}",
                self.kind,
                T::KIND
            )));
        }
        T::decode(&self.bytes)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Something that can produce a `T` on demand, typically by reading it
/// back out of a store file.
pub trait Materialize<T>: Send + Sync {
    fn materialize(&self) -> Result<T>;
    fn describe(&self) -> String;
}

// A composite cell value that may not have been loaded yet. Clones share
// the loaded payload, so materializing through one handle materializes
// it for all of them.
pub struct Lazy<T> {
    inner: Arc<LazyInner<T>>,
}

struct LazyInner<T> {
    cell: OnceLock<Arc<T>>,
    source: Option<Box<dyn Materialize<T>>>,
}

impl<T> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Lazy {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Lazy<T> {
    pub fn loaded(val: T) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Arc::new(val));
        Lazy {
            inner: Arc::new(LazyInner { cell, source: None }),
        }
    }

    pub fn deferred(source: impl Materialize<T> + 'static) -> Self {
        Lazy {
            inner: Arc::new(LazyInner {
                cell: OnceLock::new(),
                source: Some(Box::new(source)),
            }),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.cell.get().is_some()
    }

    pub fn get(&self) -> Result<Arc<T>> {
        if let Some(v) = self.inner.cell.get() {
            return Ok(v.clone());
        }
        let Some(source) = &self.inner.source else {
            return Err(contract_err("lazy value has neither a payload nor a source"));
        };
        let val = Arc::new(source.materialize()?);
        Ok(self.inner.cell.get_or_init(|| val).clone())
    }

    // Identity of the shared handle; two clones of one Lazy agree, two
    // separately built equal values do not.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: PartialEq> PartialEq for Lazy<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self.get(), other.get()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.inner.cell.get(), &self.inner.source) {
            (Some(v), _) => write!(f, "Lazy({:?})", v),
            (None, Some(src)) => write!(f, "Lazy(<{}>)", src.describe()),
            (None, None) => f.write_str("Lazy(<empty>)"),
        }
    }
}

impl<T: Serialize> Serialize for Lazy<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let val = self.get().map_err(serde::ser::Error::custom)?;
        val.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Lazy<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Lazy::loaded(T::deserialize(deserializer)?))
    }
}

// A chromatogram or any other 1-d sampled signal.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub label: Option<String>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl TimeSeries {
    pub fn new(x: Vec<f64>, y: Vec<f64>, label: Option<String>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(contract_err(format!(
                "time series x has {} samples but y has {}",
                x.len(),
                y.len()
            )));
        }
        Ok(TimeSeries { label, x, y })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn x_range(&self) -> Option<(f64, f64)> {
        let lo = self.x.iter().copied().reduce(f64::min)?;
        let hi = self.x.iter().copied().reduce(f64::max)?;
        Some((lo, hi))
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    Positive,
    Negative,
    #[default]
    Unknown,
}

impl Polarity {
    pub fn code(&self) -> u8 {
        match self {
            Polarity::Positive => b'+',
            Polarity::Negative => b'-',
            Polarity::Unknown => b'0',
        }
    }

    pub fn from_code(c: u8) -> Option<Polarity> {
        match c {
            b'+' => Some(Polarity::Positive),
            b'-' => Some(Polarity::Negative),
            b'0' => Some(Polarity::Unknown),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub rt: f64,
    pub ms_level: u8,
    pub polarity: Polarity,
    // (mz, intensity), ascending in mz
    pub peaks: Vec<(f64, f64)>,
}

// A run of spectra, as produced by one acquisition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakMap {
    pub meta: BTreeMap<String, String>,
    pub spectra: Vec<Spectrum>,
}

impl PeakMap {
    pub fn new(spectra: Vec<Spectrum>) -> Self {
        PeakMap {
            meta: BTreeMap::new(),
            spectra,
        }
    }

    pub fn peak_count(&self) -> usize {
        self.spectra.iter().map(|s| s.peaks.len()).sum()
    }

    pub fn rt_range(&self) -> Option<(f64, f64)> {
        let lo = self.spectra.iter().map(|s| s.rt).reduce(f64::min)?;
        let hi = self.spectra.iter().map(|s| s.rt).reduce(f64::max)?;
        Some((lo, hi))
    }

    pub fn ms_levels(&self) -> Vec<u8> {
        let mut levels: Vec<u8> = self.spectra.iter().map(|s| s.ms_level).collect();
        levels.sort_unstable();
        levels.dedup();
        levels
    }

    // Summed intensity inside an mz window, one sample per spectrum of the
    // given level whose rt falls inside the rt window.
    pub fn chromatogram(&self, mz: (f64, f64), rt: (f64, f64), ms_level: u8) -> TimeSeries {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for sp in self.spectra.iter() {
            if sp.ms_level != ms_level || sp.rt < rt.0 || sp.rt > rt.1 {
                continue;
            }
            let lo = sp.peaks.partition_point(|p| p.0 < mz.0);
            let hi = sp.peaks.partition_point(|p| p.0 <= mz.1);
            let total: f64 = sp.peaks[lo..hi.max(lo)].iter().map(|p| p.1).sum();
            x.push(sp.rt);
            y.push(total);
        }
        TimeSeries { label: None, x, y }
    }
}
