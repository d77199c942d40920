use std::path::Path;
use tabula_base::{Config, Result};
use tabula_lang::Schema;
use tabula_table::Table;
use tracing::debug;
use crate::{
    bitmatrix::BitMatrix,
    container::{Container, SharedContainer},
    ioutil::{Backing, FileBacking},
    meta::FileMeta,
    rows::{decode_rows, open_nulls},
    store::Stores,
};

pub struct TableReader {
    container: SharedContainer,
    stores: Stores,
    schema: Schema,
    nulls: BitMatrix,
}

impl TableReader {
    pub fn open(path: impl AsRef<Path>) -> Result<TableReader> {
        TableReader::open_with(path, &Config::default())
    }

    pub fn open_with(path: impl AsRef<Path>, cfg: &Config) -> Result<TableReader> {
        TableReader::on(Box::new(FileBacking::open_ro(path)?), cfg)
    }

    pub fn on(io: Box<dyn Backing>, cfg: &Config) -> Result<TableReader> {
        cfg.validate()?;
        let container = Container::open(io)?.into_shared();
        let schema = container.lock().meta().schema()?;
        let nulls = open_nulls(&container, &schema, cfg, false)?;
        Ok(TableReader {
            container,
            stores: Stores::standard(cfg)?,
            schema,
            nulls,
        })
    }

    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = stores;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn file_meta(&self) -> FileMeta {
        self.container.lock().meta().clone()
    }

    pub fn len(&self) -> u64 {
        self.container.lock().meta().n_rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Every dataset with its length in bytes.
    pub fn datasets(&self) -> Vec<(String, u64)> {
        let io = self.container.lock();
        io.dataset_names()
            .map(|n| (n.to_string(), io.dataset_len(n)))
            .collect()
    }

    // Time series and peak map cells come back unloaded; they read from
    // this file when first looked at, even after the reader is dropped.
    pub fn read_table(&mut self) -> Result<Table> {
        let meta = self.file_meta();
        let rows = decode_rows(&self.container, &self.stores, &self.schema, &mut self.nulls, 0, meta.n_rows)?;
        debug!(target: "tabula", rows = rows.len(), cols = self.schema.len(), "read table");
        Table::from_parts(self.schema.clone(), rows, meta.title.clone(), meta.table_meta()?)
    }
}
