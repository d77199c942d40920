// The column store. A table is persisted into a single container file as a
// fixed-width row table (one 64-bit word per cell), a packed null bitmap,
// and per-column object stores for every cell that is not a bool, int or
// float. Those cells hold a global object id:
//
//   ((local_index << 3) | store_flag) + 1      0 means null
//
// with flags 0 = strings, 1 = time series, 2 = peak maps, 7 = opaque
// objects. Stores deduplicate by content hash, verified against the stored
// bytes, and keep their hashes on disk so later appends dedup too.
//
// Files are written once and appended to afterwards; every write commits a
// new footer after the new data, so an interrupted write leaves the last
// committed state readable. See container.rs for the byte layout.

mod appender;
mod bitmatrix;
mod cell;
mod container;
mod ioutil;
mod meta;
mod proxy;
mod reader;
mod rows;
mod store;
mod writer;

#[cfg(test)]
mod test;

use std::path::Path;
use tabula_base::{Config, Result};
use tabula_table::Table;

pub use appender::TableAppender;
pub use bitmatrix::{BitBacking, BitMatrix, DatasetBits, MemBits};
pub use container::{Container, Directory, Extent, SharedContainer, FOOTER_MAGIC, HEADER_MAGIC};
pub use ioutil::{Backing, FileBacking, MemBacking};
pub use meta::{FileMeta, Version, CURRENT_VERSION, LEGACY_VERSION};
pub use proxy::TableProxy;
pub use reader::TableReader;
pub use store::{
    object_id, split_object_id, ObjectId, ObjectStore, PeakMapStore, Store, Stores, StoresBuilder, StringStore,
    TimeSeriesStore, OBJECT_FLAG, PEAKMAP_FLAG, STRING_FLAG, TIMESERIES_FLAG,
};
pub use writer::TableWriter;

pub fn write_table(path: impl AsRef<Path>, table: &Table, cfg: &Config) -> Result<()> {
    let mut w = TableWriter::create(path, cfg)?;
    w.write_table(table)?;
    w.close()
}

// Creates the file when it does not exist yet.
pub fn append_table(path: impl AsRef<Path>, table: &Table, cfg: &Config) -> Result<()> {
    if !path.as_ref().exists() {
        return write_table(path, table, cfg);
    }
    let mut a = TableAppender::open(path, cfg)?;
    a.append_table(table)?;
    a.close()
}

pub fn read_table(path: impl AsRef<Path>) -> Result<Table> {
    TableReader::open(path)?.read_table()
}
