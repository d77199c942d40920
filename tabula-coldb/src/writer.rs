use std::path::Path;
use tabula_base::{contract_err, Config, Result};
use tabula_lang::Schema;
use tabula_table::{Table, TableView};
use tracing::debug;
use crate::{
    bitmatrix::{BitMatrix, DatasetBits},
    container::{Container, SharedContainer},
    ioutil::{Backing, FileBacking},
    meta::CURRENT_VERSION,
    rows::{append_rows, NULLS},
    store::Stores,
};

// Writes a fresh file. The first table written fixes the schema, title and
// metadata; later ones only add rows and must match the schema.
pub struct TableWriter {
    container: SharedContainer,
    stores: Stores,
    cfg: Config,
    target: Option<(Schema, BitMatrix)>,
}

impl TableWriter {
    // Truncates anything already at `path`.
    pub fn create(path: impl AsRef<Path>, cfg: &Config) -> Result<TableWriter> {
        TableWriter::on(Box::new(FileBacking::create(path)?), cfg)
    }

    pub fn on(io: Box<dyn Backing>, cfg: &Config) -> Result<TableWriter> {
        cfg.validate()?;
        Ok(TableWriter {
            container: Container::create(io)?.into_shared(),
            stores: Stores::standard(cfg)?,
            cfg: cfg.clone(),
            target: None,
        })
    }

    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = stores;
        self
    }

    fn start(&mut self, table: &Table) -> Result<()> {
        let schema = table.schema().clone();
        {
            let mut io = self.container.lock();
            let meta = io.meta_mut();
            meta.version = CURRENT_VERSION;
            meta.set_schema(&schema);
            meta.title = table.title().map(str::to_string);
            meta.set_table_meta(table.meta())?;
        }
        let nulls = BitMatrix::new(
            Box::new(DatasetBits::new(self.container.clone(), NULLS)),
            schema.len(),
            &self.cfg,
        )?;
        self.target = Some((schema, nulls));
        Ok(())
    }

    pub fn write_table(&mut self, table: &Table) -> Result<()> {
        if self.target.is_none() {
            self.start(table)?;
        }
        let (schema, nulls) = self
            .target
            .as_mut()
            .ok_or_else(|| contract_err("writer has no schema"))?;
        append_rows(&self.container, &mut self.stores, schema, nulls, table)?;
        debug!(target: "tabula", rows = table.len(), file = %self.container.lock().describe(), "wrote table");
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        if let Some((_, nulls)) = self.target.as_mut() {
            nulls.flush()?;
        }
        let mut io = self.container.lock();
        if io.is_dirty() {
            io.commit()?;
        }
        Ok(())
    }
}
