// Non-primitive cell values live outside the row table, in per-type stores.
// A row cell holds a global object id naming the store (by a 3-bit flag)
// and the record's index within that store's arrays for the column:
//
//   id = ((local << 3) | flag) + 1,   0 = null
//
// Each store deduplicates on write: a value whose content hash and length
// match something already stored for the column gets the existing id,
// once the stored bytes have been compared.

mod blob;
mod peakmap;
mod timeseries;

use std::{collections::BTreeMap, collections::HashMap, num::NonZeroUsize};
use lru::LruCache;
use tabula_base::{config_err, contract_err, corrupt_err, Config, Result};
use tabula_lang::{TypeTag, Value};
use tracing::trace;
use crate::{
    container::{Container, SharedContainer},
    ioutil::{bytes_to_u64s, u64s_to_bytes},
};

pub use blob::{ObjectStore, StringStore};
pub use peakmap::PeakMapStore;
pub use timeseries::TimeSeriesStore;

pub type ObjectId = u64;

pub const STRING_FLAG: u8 = 0;
pub const TIMESERIES_FLAG: u8 = 1;
pub const PEAKMAP_FLAG: u8 = 2;
pub const OBJECT_FLAG: u8 = 7;

const MAX_FLAG: u8 = 7;
const MAX_LOCAL: u64 = (u64::MAX >> 3) - 1;

pub fn object_id(local: u64, flag: u8) -> Result<ObjectId> {
    if flag > MAX_FLAG || local > MAX_LOCAL {
        return Err(contract_err(format!("no object id for record {local} of store {flag}")));
    }
    Ok(((local << 3) | flag as u64) + 1)
}

// (local, flag), or None for the null id.
pub fn split_object_id(id: ObjectId) -> Option<(u64, u8)> {
    let raw = id.checked_sub(1)?;
    Some((raw >> 3, (raw & 7) as u8))
}

pub(crate) fn dataset_name(flag: u8, column: &str, part: &str) -> String {
    format!("store/{flag}/{column}/{part}")
}

pub trait Store: Send {
    fn flag(&self) -> u8;
    fn type_tag(&self) -> TypeTag;

    // Stores a non-null value for `column` and returns its local index.
    // Composite values must already be loaded; see `preload`.
    fn write(&mut self, io: &mut Container, column: &str, value: &Value) -> Result<u64>;

    // Deferred values capture `shared` and load through it later, so it
    // must be the container `io` was locked from.
    fn read(&self, io: &mut Container, shared: &SharedContainer, column: &str, local: u64) -> Result<Value>;
}

// Loads a composite value before the container lock is taken, since a
// value read out of the same file would otherwise try to take the lock
// again while materializing.
pub(crate) fn preload(v: &Value) -> Result<()> {
    match v {
        Value::TimeSeries(l) => l.get().map(|_| ()),
        Value::PeakMap(l) => l.get().map(|_| ()),
        _ => Ok(()),
    }
}

pub(crate) fn content_key(bytes: &[u8]) -> (u64, u64) {
    (rapidhash::rapidhash(bytes), bytes.len() as u64)
}

// Per-column map from (hash, length) to local index. Seeded from the
// column's persisted hash array the first time the column is touched, so
// an appender dedups against what earlier sessions wrote.
pub(crate) struct Dedup {
    cap: NonZeroUsize,
    columns: HashMap<String, LruCache<(u64, u64), u64>>,
}

impl Dedup {
    pub(crate) fn new(capacity: usize) -> Result<Dedup> {
        let cap = NonZeroUsize::new(capacity).ok_or_else(|| config_err("dedup_cache_capacity must be nonzero"))?;
        Ok(Dedup {
            cap,
            columns: HashMap::new(),
        })
    }

    fn cache(&mut self, io: &mut Container, hash_ds: &str) -> Result<&mut LruCache<(u64, u64), u64>> {
        if !self.columns.contains_key(hash_ds) {
            let mut cache = LruCache::new(self.cap);
            let words = bytes_to_u64s(&io.read_all(hash_ds)?)?;
            for (local, pair) in words.chunks_exact(2).enumerate() {
                cache.put((pair[0], pair[1]), local as u64);
            }
            trace!(target: "tabula", dataset = hash_ds, entries = words.len() / 2, "primed dedup cache");
            self.columns.insert(hash_ds.to_string(), cache);
        }
        self.columns
            .get_mut(hash_ds)
            .ok_or_else(|| contract_err("dedup cache missing after priming"))
    }

    pub(crate) fn find(&mut self, io: &mut Container, hash_ds: &str, key: (u64, u64)) -> Result<Option<u64>> {
        Ok(self.cache(io, hash_ds)?.get(&key).copied())
    }

    pub(crate) fn remember(&mut self, io: &mut Container, hash_ds: &str, key: (u64, u64), local: u64) -> Result<()> {
        self.cache(io, hash_ds)?;
        io.append(hash_ds, &u64s_to_bytes(&[key.0, key.1]))?;
        self.cache(io, hash_ds)?.put(key, local);
        Ok(())
    }
}

// Fixed-width records of little-endian words, the layout of every index
// array.
pub(crate) fn record_count(io: &Container, ds: &str, words: u64) -> u64 {
    io.dataset_len(ds) / (words * 8)
}

pub(crate) fn read_record(io: &mut Container, ds: &str, words: u64, local: u64) -> Result<Vec<u64>> {
    let n = record_count(io, ds, words);
    if local >= n {
        return Err(corrupt_err(format!("record {local} missing from {ds}, which has {n}")));
    }
    bytes_to_u64s(&io.read(ds, local * words * 8, words * 8)?)
}

pub(crate) fn append_record(io: &mut Container, ds: &str, words: &[u64]) -> Result<u64> {
    let n = record_count(io, ds, words.len() as u64);
    io.append(ds, &u64s_to_bytes(words))?;
    Ok(n)
}

// The stores a file can use, by flag.
pub struct Stores {
    by_flag: BTreeMap<u8, Box<dyn Store>>,
}

#[derive(Default)]
pub struct StoresBuilder {
    stores: Vec<Box<dyn Store>>,
}

impl StoresBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, store: impl Store + 'static) -> Self {
        self.stores.push(Box::new(store));
        self
    }

    pub fn build(self) -> Result<Stores> {
        let mut by_flag: BTreeMap<u8, Box<dyn Store>> = BTreeMap::new();
        for store in self.stores {
            let (flag, ty) = (store.flag(), store.type_tag());
            if flag > MAX_FLAG {
                return Err(config_err(format!("store flag {flag} does not fit in 3 bits")));
            }
            if ty.is_primitive() {
                return Err(config_err(format!("{ty} values are stored inline, not in a store")));
            }
            if by_flag.values().any(|s| s.type_tag() == ty) {
                return Err(config_err(format!("two stores registered for {ty} values")));
            }
            if by_flag.insert(flag, store).is_some() {
                return Err(config_err(format!("two stores registered with flag {flag}")));
            }
        }
        Ok(Stores { by_flag })
    }
}

impl Stores {
    pub fn builder() -> StoresBuilder {
        StoresBuilder::new()
    }

    // One store for each non-primitive type.
    pub fn standard(cfg: &Config) -> Result<Stores> {
        let cap = cfg.dedup_cache_capacity;
        StoresBuilder::new()
            .register(StringStore::new(cap)?)
            .register(TimeSeriesStore::new(cap)?)
            .register(PeakMapStore::new(cap)?)
            .register(ObjectStore::new(cap)?)
            .build()
    }

    pub fn flag_for(&self, ty: TypeTag) -> Option<u8> {
        self.by_flag
            .iter()
            .find_map(|(f, s)| (s.type_tag() == ty).then_some(*f))
    }

    pub fn write(&mut self, io: &mut Container, column: &str, value: &Value) -> Result<ObjectId> {
        let Some(ty) = value.type_tag() else {
            return Ok(0);
        };
        let store = self
            .by_flag
            .values_mut()
            .find(|s| s.type_tag() == ty)
            .ok_or_else(|| config_err(format!("no store registered for {ty} values")))?;
        let local = store.write(io, column, value)?;
        object_id(local, store.flag())
    }

    pub fn read(&self, io: &mut Container, shared: &SharedContainer, column: &str, id: ObjectId) -> Result<Value> {
        let Some((local, flag)) = split_object_id(id) else {
            return Ok(Value::Null);
        };
        let store = self
            .by_flag
            .get(&flag)
            .ok_or_else(|| corrupt_err(format!("object id {id:#x} names unregistered store {flag}")))?;
        store.read(io, shared, column, local)
    }
}
