use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use tabula_base::{version_err, Result};
use tabula_lang::{Format, Schema, TypeTag, Value};

pub type Version = (u16, u16);

pub const CURRENT_VERSION: Version = (1, 0);
// Oldest layout still readable. It predates the null bitmap.
pub const LEGACY_VERSION: Version = (0, 2);

// Null primitive cells in a legacy file.
pub(crate) const LEGACY_NULL_WORD: u64 = i64::MIN as u64;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Layout {
    Current,
    // No `nulls` dataset; null primitives hold LEGACY_NULL_WORD.
    LegacySentinel,
}

pub(crate) fn check_version(v: Version) -> Result<Layout> {
    if v > CURRENT_VERSION {
        return Err(version_err(format!(
            "file version {}.{} is newer than the supported {}.{}",
            v.0, v.1, CURRENT_VERSION.0, CURRENT_VERSION.1
        )));
    }
    if v < LEGACY_VERSION {
        return Err(version_err(format!(
            "file version {}.{} is too old, the oldest readable is {}.{}",
            v.0, v.1, LEGACY_VERSION.0, LEGACY_VERSION.1
        )));
    }
    if v == LEGACY_VERSION {
        Ok(Layout::LegacySentinel)
    } else {
        Ok(Layout::Current)
    }
}

// Everything about the stored table that is not a dataset. Lives in the
// container footer, so it is rewritten on every commit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub version: Version,
    pub title: Option<String>,
    pub names: Vec<String>,
    pub types: Vec<TypeTag>,
    pub formats: Vec<Option<String>>,
    // The table's metadata map, MessagePack encoded.
    pub meta: Vec<u8>,
    pub n_rows: u64,
}

impl Default for FileMeta {
    fn default() -> Self {
        FileMeta {
            version: CURRENT_VERSION,
            title: None,
            names: Vec::new(),
            types: Vec::new(),
            formats: Vec::new(),
            meta: Vec::new(),
            n_rows: 0,
        }
    }
}

impl FileMeta {
    pub fn has_schema(&self) -> bool {
        !self.names.is_empty()
    }

    pub fn schema(&self) -> Result<Schema> {
        let formats = self
            .formats
            .iter()
            .map(|f| f.as_deref().map(Format::new).transpose())
            .collect::<Result<Vec<_>>>()?;
        Schema::new(self.names.clone(), self.types.clone(), formats)
    }

    pub(crate) fn set_schema(&mut self, schema: &Schema) {
        self.names = schema.names().to_vec();
        self.types = schema.types().to_vec();
        self.formats = schema
            .formats()
            .iter()
            .map(|f| f.as_ref().map(|f| f.as_str().to_string()))
            .collect();
    }

    pub fn table_meta(&self) -> Result<BTreeMap<String, Value>> {
        if self.meta.is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(rmp_serde::from_slice(&self.meta)?)
    }

    pub(crate) fn set_table_meta(&mut self, meta: &BTreeMap<String, Value>) -> Result<()> {
        self.meta = rmp_serde::to_vec(meta)?;
        Ok(())
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }
}
