use tabula_base::{corrupt_err, schema_err, Result};
use tabula_lang::{Lazy, Materialize, TimeSeries, TypeTag, Value};
use crate::{
    container::{Container, SharedContainer},
    ioutil::{bytes_to_f64s, f64s_to_bytes},
    store::{append_record, content_key, dataset_name, read_record, record_count, Dedup, Store, TIMESERIES_FLAG},
};

// Index records are [first sample, sample count, label start, label length + 1]
// with a zero last word for an unlabelled series. Samples go to the
// parallel `x` and `y` arrays.
const INDEX_WORDS: u64 = 4;

struct Datasets {
    index: String,
    x: String,
    y: String,
    label: String,
    hash: String,
}

fn datasets(column: &str) -> Datasets {
    let ds = |part| dataset_name(TIMESERIES_FLAG, column, part);
    Datasets {
        index: ds("index"),
        x: ds("x"),
        y: ds("y"),
        label: ds("label"),
        hash: ds("hash"),
    }
}

fn load(io: &mut Container, column: &str, local: u64) -> Result<TimeSeries> {
    let ds = datasets(column);
    let rec = read_record(io, &ds.index, INDEX_WORDS, local)?;
    let (start, n) = (rec[0] * 8, rec[1] * 8);
    let x = bytes_to_f64s(&io.read(&ds.x, start, n)?)?;
    let y = bytes_to_f64s(&io.read(&ds.y, start, n)?)?;
    let label = match rec[3] {
        0 => None,
        len => {
            let bytes = io.read(&ds.label, rec[2], len - 1)?;
            Some(String::from_utf8(bytes).map_err(|_| {
                corrupt_err(format!("label of time series {local} in column {column} is not utf-8"))
            })?)
        }
    };
    TimeSeries::new(x, y, label)
}

struct TimeSeriesSource {
    container: SharedContainer,
    column: String,
    local: u64,
}

impl Materialize<TimeSeries> for TimeSeriesSource {
    fn materialize(&self) -> Result<TimeSeries> {
        let mut io = self.container.lock();
        load(&mut io, &self.column, self.local)
    }

    fn describe(&self) -> String {
        format!("time series {} of column {}", self.local, self.column)
    }
}

pub struct TimeSeriesStore {
    dedup: Dedup,
}

impl TimeSeriesStore {
    pub fn new(dedup_capacity: usize) -> Result<Self> {
        Ok(TimeSeriesStore {
            dedup: Dedup::new(dedup_capacity)?,
        })
    }
}

impl Store for TimeSeriesStore {
    fn flag(&self) -> u8 {
        TIMESERIES_FLAG
    }

    fn type_tag(&self) -> TypeTag {
        TypeTag::TimeSeries
    }

    fn write(&mut self, io: &mut Container, column: &str, value: &Value) -> Result<u64> {
        let Value::TimeSeries(lazy) = value else {
            return Err(schema_err(format!("time series store cannot hold {value}")));
        };
        let ts = lazy.get()?;
        let ds = datasets(column);
        let canonical = rmp_serde::to_vec(&*ts)?;
        let key = content_key(&canonical);
        if let Some(local) = self.dedup.find(io, &ds.hash, key)? {
            if rmp_serde::to_vec(&load(io, column, local)?)? == canonical {
                return Ok(local);
            }
        }
        let start = io.append(&ds.x, &f64s_to_bytes(&ts.x))? / 8;
        io.append(&ds.y, &f64s_to_bytes(&ts.y))?;
        let (label_start, label_len) = match &ts.label {
            Some(l) => (io.append(&ds.label, l.as_bytes())?, l.len() as u64 + 1),
            None => (0, 0),
        };
        let local = append_record(io, &ds.index, &[start, ts.len() as u64, label_start, label_len])?;
        self.dedup.remember(io, &ds.hash, key, local)?;
        Ok(local)
    }

    fn read(&self, io: &mut Container, shared: &SharedContainer, column: &str, local: u64) -> Result<Value> {
        let n = record_count(io, &datasets(column).index, INDEX_WORDS);
        if local >= n {
            return Err(corrupt_err(format!(
                "time series {local} missing from column {column}, which has {n}"
            )));
        }
        Ok(Value::TimeSeries(Lazy::deferred(TimeSeriesSource {
            container: shared.clone(),
            column: column.to_string(),
            local,
        })))
    }
}
