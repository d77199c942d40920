use std::collections::BTreeMap;
use tabula_base::{corrupt_err, schema_err, Result};
use tabula_lang::{Lazy, Materialize, PeakMap, Polarity, Spectrum, TypeTag, Value};
use crate::{
    container::{Container, SharedContainer},
    ioutil::{bytes_to_u64s, u64s_to_bytes},
    store::{append_record, content_key, dataset_name, read_record, record_count, Dedup, Store, PEAKMAP_FLAG},
};

// index:   [first spectrum, spectrum count, meta start, meta length]
// spectra: [rt bits, ms level | polarity code << 8, first peak, peak count]
// peaks:   [mz bits, intensity bits]
// meta:    MessagePack of the peak map's string map
const INDEX_WORDS: u64 = 4;
const SPECTRUM_WORDS: u64 = 4;
const PEAK_WORDS: u64 = 2;

struct Datasets {
    index: String,
    spectra: String,
    peaks: String,
    meta: String,
    hash: String,
}

fn datasets(column: &str) -> Datasets {
    let ds = |part| dataset_name(PEAKMAP_FLAG, column, part);
    Datasets {
        index: ds("index"),
        spectra: ds("spectra"),
        peaks: ds("peaks"),
        meta: ds("meta"),
        hash: ds("hash"),
    }
}

fn load(io: &mut Container, column: &str, local: u64) -> Result<PeakMap> {
    let ds = datasets(column);
    let rec = read_record(io, &ds.index, INDEX_WORDS, local)?;
    let specs = bytes_to_u64s(&io.read(&ds.spectra, rec[0] * SPECTRUM_WORDS * 8, rec[1] * SPECTRUM_WORDS * 8)?)?;
    let meta: BTreeMap<String, String> = match rec[3] {
        0 => BTreeMap::new(),
        len => rmp_serde::from_slice(&io.read(&ds.meta, rec[2], len)?)?,
    };
    let mut spectra = Vec::with_capacity(rec[1] as usize);
    for s in specs.chunks_exact(SPECTRUM_WORDS as usize) {
        let polarity = Polarity::from_code((s[1] >> 8) as u8).ok_or_else(|| {
            corrupt_err(format!("bad polarity code in peak map {local} of column {column}"))
        })?;
        let words = bytes_to_u64s(&io.read(&ds.peaks, s[2] * PEAK_WORDS * 8, s[3] * PEAK_WORDS * 8)?)?;
        let peaks = words
            .chunks_exact(PEAK_WORDS as usize)
            .map(|p| (f64::from_bits(p[0]), f64::from_bits(p[1])))
            .collect();
        spectra.push(Spectrum {
            rt: f64::from_bits(s[0]),
            ms_level: (s[1] & 0xff) as u8,
            polarity,
            peaks,
        });
    }
    Ok(PeakMap { meta, spectra })
}

struct PeakMapSource {
    container: SharedContainer,
    column: String,
    local: u64,
}

impl Materialize<PeakMap> for PeakMapSource {
    fn materialize(&self) -> Result<PeakMap> {
        let mut io = self.container.lock();
        load(&mut io, &self.column, self.local)
    }

    fn describe(&self) -> String {
        format!("peak map {} of column {}", self.local, self.column)
    }
}

pub struct PeakMapStore {
    dedup: Dedup,
}

impl PeakMapStore {
    pub fn new(dedup_capacity: usize) -> Result<Self> {
        Ok(PeakMapStore {
            dedup: Dedup::new(dedup_capacity)?,
        })
    }
}

impl Store for PeakMapStore {
    fn flag(&self) -> u8 {
        PEAKMAP_FLAG
    }

    fn type_tag(&self) -> TypeTag {
        TypeTag::PeakMap
    }

    fn write(&mut self, io: &mut Container, column: &str, value: &Value) -> Result<u64> {
        let Value::PeakMap(lazy) = value else {
            return Err(schema_err(format!("peak map store cannot hold {value}")));
        };
        let pm = lazy.get()?;
        let ds = datasets(column);
        let canonical = rmp_serde::to_vec(&*pm)?;
        let key = content_key(&canonical);
        if let Some(local) = self.dedup.find(io, &ds.hash, key)? {
            if rmp_serde::to_vec(&load(io, column, local)?)? == canonical {
                return Ok(local);
            }
        }
        let first_spectrum = record_count(io, &ds.spectra, SPECTRUM_WORDS);
        let mut specs = Vec::with_capacity(pm.spectra.len() * SPECTRUM_WORDS as usize);
        for s in pm.spectra.iter() {
            let words: Vec<u64> = s.peaks.iter().flat_map(|(mz, i)| [mz.to_bits(), i.to_bits()]).collect();
            let first_peak = io.append(&ds.peaks, &u64s_to_bytes(&words))? / (PEAK_WORDS * 8);
            specs.extend_from_slice(&[
                s.rt.to_bits(),
                s.ms_level as u64 | (s.polarity.code() as u64) << 8,
                first_peak,
                s.peaks.len() as u64,
            ]);
        }
        io.append(&ds.spectra, &u64s_to_bytes(&specs))?;
        let (meta_start, meta_len) = if pm.meta.is_empty() {
            (0, 0)
        } else {
            let bytes = rmp_serde::to_vec(&pm.meta)?;
            (io.append(&ds.meta, &bytes)?, bytes.len() as u64)
        };
        let local = append_record(
            io,
            &ds.index,
            &[first_spectrum, pm.spectra.len() as u64, meta_start, meta_len],
        )?;
        self.dedup.remember(io, &ds.hash, key, local)?;
        Ok(local)
    }

    fn read(&self, io: &mut Container, shared: &SharedContainer, column: &str, local: u64) -> Result<Value> {
        let n = record_count(io, &datasets(column).index, INDEX_WORDS);
        if local >= n {
            return Err(corrupt_err(format!("peak map {local} missing from column {column}, which has {n}")));
        }
        Ok(Value::PeakMap(Lazy::deferred(PeakMapSource {
            container: shared.clone(),
            column: column.to_string(),
            local,
        })))
    }
}
