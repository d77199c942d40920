use std::path::Path;
use tabula_base::{Config, Result};
use tabula_lang::Schema;
use tabula_table::{Table, TableView};
use tracing::debug;
use crate::{
    bitmatrix::BitMatrix,
    container::{Container, SharedContainer},
    ioutil::{Backing, FileBacking},
    meta::CURRENT_VERSION,
    rows::{append_rows, open_nulls},
    store::Stores,
};

// Adds rows to an existing file. Title and metadata stay as the file has
// them. Opening a legacy file for appending upgrades it on disk.
pub struct TableAppender {
    container: SharedContainer,
    stores: Stores,
    cfg: Config,
    schema: Schema,
    nulls: BitMatrix,
}

impl TableAppender {
    pub fn open(path: impl AsRef<Path>, cfg: &Config) -> Result<TableAppender> {
        TableAppender::on(Box::new(FileBacking::open_rw(path)?), cfg)
    }

    pub fn on(io: Box<dyn Backing>, cfg: &Config) -> Result<TableAppender> {
        cfg.validate()?;
        let container = Container::open(io)?.into_shared();
        let schema = container.lock().meta().schema()?;
        let nulls = open_nulls(&container, &schema, cfg, true)?;
        Ok(TableAppender {
            container,
            stores: Stores::standard(cfg)?,
            cfg: cfg.clone(),
            schema,
            nulls,
        })
    }

    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = stores;
        self
    }

    pub fn append_table(&mut self, table: &Table) -> Result<()> {
        if self.schema.is_empty() && !table.schema().is_empty() {
            // Nothing was ever written; the first table defines the file.
            let mut io = self.container.lock();
            let meta = io.meta_mut();
            meta.version = CURRENT_VERSION;
            meta.set_schema(table.schema());
            meta.title = table.title().map(str::to_string);
            meta.set_table_meta(table.meta())?;
            drop(io);
            self.schema = table.schema().clone();
            self.nulls = open_nulls(&self.container, &self.schema, &self.cfg, false)?;
        }
        append_rows(&self.container, &mut self.stores, &self.schema, &mut self.nulls, table)?;
        debug!(target: "tabula", rows = table.len(), file = %self.container.lock().describe(), "appended table");
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.nulls.flush()?;
        let mut io = self.container.lock();
        if io.is_dirty() {
            io.commit()?;
        }
        Ok(())
    }
}
