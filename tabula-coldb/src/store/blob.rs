use tabula_base::{corrupt_err, schema_err, Result};
use tabula_lang::{Payload, TypeTag, Value};
use crate::{
    container::{Container, SharedContainer},
    store::{append_record, content_key, dataset_name, read_record, Dedup, Store, OBJECT_FLAG, STRING_FLAG},
};

// Blob arrays: `index` holds (start, size) words per record, `blob` the
// concatenated bytes, `hash` the (hash, size) dedup key of each record.
struct Blobs {
    flag: u8,
    dedup: Dedup,
}

impl Blobs {
    fn put(&mut self, io: &mut Container, column: &str, bytes: &[u8]) -> Result<u64> {
        let index = dataset_name(self.flag, column, "index");
        let blob = dataset_name(self.flag, column, "blob");
        let hash = dataset_name(self.flag, column, "hash");
        let key = content_key(bytes);
        if let Some(local) = self.dedup.find(io, &hash, key)? {
            if get(io, &index, &blob, local)? == bytes {
                return Ok(local);
            }
        }
        let start = io.append(&blob, bytes)?;
        let local = append_record(io, &index, &[start, bytes.len() as u64])?;
        self.dedup.remember(io, &hash, key, local)?;
        Ok(local)
    }

    fn get(&self, io: &mut Container, column: &str, local: u64) -> Result<Vec<u8>> {
        let index = dataset_name(self.flag, column, "index");
        let blob = dataset_name(self.flag, column, "blob");
        get(io, &index, &blob, local)
    }
}

fn get(io: &mut Container, index: &str, blob: &str, local: u64) -> Result<Vec<u8>> {
    let rec = read_record(io, index, 2, local)?;
    io.read(blob, rec[0], rec[1])
}

pub struct StringStore {
    blobs: Blobs,
}

impl StringStore {
    pub fn new(dedup_capacity: usize) -> Result<Self> {
        Ok(StringStore {
            blobs: Blobs {
                flag: STRING_FLAG,
                dedup: Dedup::new(dedup_capacity)?,
            },
        })
    }
}

impl Store for StringStore {
    fn flag(&self) -> u8 {
        STRING_FLAG
    }

    fn type_tag(&self) -> TypeTag {
        TypeTag::Str
    }

    fn write(&mut self, io: &mut Container, column: &str, value: &Value) -> Result<u64> {
        let Value::Str(s) = value else {
            return Err(schema_err(format!("string store cannot hold {value}")));
        };
        self.blobs.put(io, column, s.as_bytes())
    }

    fn read(&self, io: &mut Container, _shared: &SharedContainer, column: &str, local: u64) -> Result<Value> {
        let bytes = self.blobs.get(io, column, local)?;
        match String::from_utf8(bytes) {
            Ok(s) => Ok(Value::str(&s)),
            Err(_) => Err(corrupt_err(format!("string {local} of column {column} is not utf-8"))),
        }
    }
}

// Opaque payloads, stored as the kind name, a zero byte, then the payload
// bytes.
pub struct ObjectStore {
    blobs: Blobs,
}

impl ObjectStore {
    pub fn new(dedup_capacity: usize) -> Result<Self> {
        Ok(ObjectStore {
            blobs: Blobs {
                flag: OBJECT_FLAG,
                dedup: Dedup::new(dedup_capacity)?,
            },
        })
    }
}

impl Store for ObjectStore {
    fn flag(&self) -> u8 {
        OBJECT_FLAG
    }

    fn type_tag(&self) -> TypeTag {
        TypeTag::Object
    }

    fn write(&mut self, io: &mut Container, column: &str, value: &Value) -> Result<u64> {
        let Value::Object(p) = value else {
            return Err(schema_err(format!("object store cannot hold {value}")));
        };
        if p.kind().as_bytes().contains(&0) {
            return Err(schema_err(format!("payload kind {:?} contains a zero byte", p.kind())));
        }
        let mut bytes = Vec::with_capacity(p.kind().len() + 1 + p.bytes().len());
        bytes.extend_from_slice(p.kind().as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(p.bytes());
        self.blobs.put(io, column, &bytes)
    }

    fn read(&self, io: &mut Container, _shared: &SharedContainer, column: &str, local: u64) -> Result<Value> {
        let bytes = self.blobs.get(io, column, local)?;
        let split = memchr::memchr(0, &bytes)
            .ok_or_else(|| corrupt_err(format!("object {local} of column {column} has no kind separator")))?;
        let kind = std::str::from_utf8(&bytes[..split])
            .map_err(|_| corrupt_err(format!("object {local} of column {column} has a non-utf-8 kind")))?;
        Ok(Value::Object(Payload::from_raw(kind, &bytes[split + 1..])))
    }
}
