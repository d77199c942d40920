// A packed row-major bitmap, one bit per (row, column), used to record
// which cells are null. Each row takes ceil(cols/8) bytes; column c is bit
// c%8 of byte c/8, least significant bit first.
//
// Rows are grouped into fixed-size blocks and the matrix keeps an LRU
// cache of them. Mutations only touch the cached block and mark it dirty;
// a dirty block is written back when it is evicted or on flush.

use std::num::NonZeroUsize;
use lru::LruCache;
use tabula_base::{config_err, contract_err, Config, Result};
use tracing::trace;
use crate::container::SharedContainer;

const BIT_TEST: [u8; 8] = [1, 2, 4, 8, 16, 32, 64, 128];

// Where the packed bytes live.
pub trait BitBacking: Send {
    fn byte_len(&self) -> Result<u64>;
    fn read_bytes(&mut self, offset: u64, len: usize) -> Result<Vec<u8>>;
    fn write_bytes(&mut self, offset: u64, bytes: &[u8]) -> Result<()>;
    // Zero-extends to `len` bytes.
    fn grow_to(&mut self, len: u64) -> Result<()>;
}

#[derive(Default)]
pub struct MemBits {
    bytes: Vec<u8>,
}

impl MemBits {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BitBacking for MemBits {
    fn byte_len(&self) -> Result<u64> {
        Ok(self.bytes.len() as u64)
    }

    fn read_bytes(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let lo = offset as usize;
        match self.bytes.get(lo..lo + len) {
            Some(b) => Ok(b.to_vec()),
            None => Err(contract_err(format!("bitmap read of {len} bytes at {offset} out of range"))),
        }
    }

    fn write_bytes(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let lo = offset as usize;
        match self.bytes.get_mut(lo..lo + bytes.len()) {
            Some(dst) => {
                dst.copy_from_slice(bytes);
                Ok(())
            }
            None => Err(contract_err(format!(
                "bitmap write of {} bytes at {offset} out of range",
                bytes.len()
            ))),
        }
    }

    fn grow_to(&mut self, len: u64) -> Result<()> {
        if len as usize > self.bytes.len() {
            self.bytes.resize(len as usize, 0);
        }
        Ok(())
    }
}

// The `nulls` dataset of a container.
pub struct DatasetBits {
    container: SharedContainer,
    name: String,
}

impl DatasetBits {
    pub fn new(container: SharedContainer, name: impl Into<String>) -> Self {
        DatasetBits {
            container,
            name: name.into(),
        }
    }
}

impl BitBacking for DatasetBits {
    fn byte_len(&self) -> Result<u64> {
        Ok(self.container.lock().dataset_len(&self.name))
    }

    fn read_bytes(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.container.lock().read(&self.name, offset, len as u64)
    }

    fn write_bytes(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.container.lock().write_at(&self.name, offset, bytes)
    }

    fn grow_to(&mut self, len: u64) -> Result<()> {
        let mut c = self.container.lock();
        let have = c.dataset_len(&self.name);
        if len > have {
            c.append(&self.name, &vec![0u8; (len - have) as usize])?;
        }
        Ok(())
    }
}

struct Block {
    bytes: Vec<u8>,
    dirty: bool,
}

pub struct BitMatrix {
    backing: Box<dyn BitBacking>,
    n_cols: usize,
    row_bytes: usize,
    n_rows: u64,
    block_rows: u64,
    cache: LruCache<u64, Block>,
}

impl BitMatrix {
    // Wraps whatever the backing already holds; its length must be a
    // whole number of rows.
    pub fn new(backing: Box<dyn BitBacking>, n_cols: usize, cfg: &Config) -> Result<BitMatrix> {
        let row_bytes = n_cols.div_ceil(8);
        let len = backing.byte_len()?;
        let n_rows = match row_bytes {
            0 => 0,
            rb => {
                if len % rb as u64 != 0 {
                    return Err(contract_err(format!(
                        "bitmap of {len} bytes is not a whole number of {rb}-byte rows"
                    )));
                }
                len / rb as u64
            }
        };
        let cap = NonZeroUsize::new(cfg.bitmap_cache_blocks)
            .ok_or_else(|| config_err("bitmap_cache_blocks must be nonzero"))?;
        if cfg.bitmap_block_rows == 0 {
            return Err(config_err("bitmap_block_rows must be nonzero"));
        }
        Ok(BitMatrix {
            backing,
            n_cols,
            row_bytes,
            n_rows,
            block_rows: cfg.bitmap_block_rows as u64,
            cache: LruCache::new(cap),
        })
    }

    pub fn in_memory(n_cols: usize, cfg: &Config) -> Result<BitMatrix> {
        BitMatrix::new(Box::new(MemBits::new()), n_cols, cfg)
    }

    pub fn n_rows(&self) -> u64 {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    // Only grows; new rows have no bits set.
    pub fn resize(&mut self, n_rows: u64) -> Result<()> {
        if n_rows < self.n_rows {
            return Err(contract_err(format!(
                "bitmap cannot shrink from {} to {} rows",
                self.n_rows, n_rows
            )));
        }
        if n_rows == self.n_rows {
            return Ok(());
        }
        // The last cached block may be short; drop everything rather than
        // patch it.
        self.flush()?;
        self.cache.clear();
        self.backing.grow_to(n_rows * self.row_bytes as u64)?;
        self.n_rows = n_rows;
        Ok(())
    }

    fn check(&self, row: u64, col: usize) -> Result<()> {
        if row >= self.n_rows || col >= self.n_cols {
            return Err(contract_err(format!(
                "bit ({row}, {col}) outside a {}x{} bitmap",
                self.n_rows, self.n_cols
            )));
        }
        Ok(())
    }

    fn write_back(&mut self, block: u64, bytes: &[u8]) -> Result<()> {
        trace!(target: "tabula", block, bytes = bytes.len(), "bitmap block write-back");
        let offset = block * self.block_rows * self.row_bytes as u64;
        self.backing.write_bytes(offset, bytes)
    }

    fn block(&mut self, block: u64) -> Result<&mut Block> {
        if !self.cache.contains(&block) {
            let first = block * self.block_rows;
            let rows = self.block_rows.min(self.n_rows - first);
            let offset = first * self.row_bytes as u64;
            let bytes = self.backing.read_bytes(offset, (rows as usize) * self.row_bytes)?;
            if self.cache.len() == self.cache.cap().get() {
                // A dirty block leaves the cache only once it is written.
                let dirty = self
                    .cache
                    .peek_lru()
                    .filter(|(_, old)| old.dirty)
                    .map(|(k, old)| (*k, old.bytes.clone()));
                if let Some((evicted, old)) = dirty {
                    self.write_back(evicted, &old)?;
                }
                self.cache.pop_lru();
            }
            self.cache.put(block, Block { bytes, dirty: false });
        }
        self.cache
            .get_mut(&block)
            .ok_or_else(|| contract_err("bitmap block vanished from cache"))
    }

    // Byte index within a block and bit mask for a cell.
    fn locate(&self, row: u64, col: usize) -> (u64, usize, u8) {
        let block = row / self.block_rows;
        let in_block = (row % self.block_rows) as usize;
        (block, in_block * self.row_bytes + col / 8, BIT_TEST[col % 8])
    }

    pub fn get(&mut self, row: u64, col: usize) -> Result<bool> {
        self.check(row, col)?;
        let (b, byte, mask) = self.locate(row, col);
        Ok(self.block(b)?.bytes[byte] & mask != 0)
    }

    pub fn set_bit(&mut self, row: u64, col: usize) -> Result<()> {
        self.check(row, col)?;
        let (b, byte, mask) = self.locate(row, col);
        let blk = self.block(b)?;
        if blk.bytes[byte] & mask == 0 {
            blk.bytes[byte] |= mask;
            blk.dirty = true;
        }
        Ok(())
    }

    pub fn unset_bit(&mut self, row: u64, col: usize) -> Result<()> {
        self.check(row, col)?;
        let (b, byte, mask) = self.locate(row, col);
        let blk = self.block(b)?;
        if blk.bytes[byte] & mask != 0 {
            blk.bytes[byte] &= !mask;
            blk.dirty = true;
        }
        Ok(())
    }

    // Columns whose bit is set in `row`, ascending.
    pub fn positions_in_row(&mut self, row: u64) -> Result<Vec<usize>> {
        if row >= self.n_rows {
            return Err(contract_err(format!("row {row} outside a {}-row bitmap", self.n_rows)));
        }
        let n_cols = self.n_cols;
        let rb = self.row_bytes;
        let (b, start, _) = self.locate(row, 0);
        let blk = self.block(b)?;
        let mut out = Vec::new();
        for (i, byte) in blk.bytes[start..start + rb].iter().enumerate() {
            if *byte == 0 {
                continue;
            }
            for (bit, mask) in BIT_TEST.iter().enumerate() {
                let col = i * 8 + bit;
                if col < n_cols && byte & mask != 0 {
                    out.push(col);
                }
            }
        }
        Ok(out)
    }

    // Rows whose bit is set in `col`, ascending. Visits every block.
    pub fn positions_in_col(&mut self, col: usize) -> Result<Vec<u64>> {
        if col >= self.n_cols {
            return Err(contract_err(format!("column {col} outside a {}-column bitmap", self.n_cols)));
        }
        let rb = self.row_bytes;
        let mask = BIT_TEST[col % 8];
        let mut out = Vec::new();
        let n_blocks = self.n_rows.div_ceil(self.block_rows);
        for b in 0..n_blocks {
            let first = b * self.block_rows;
            let blk = self.block(b)?;
            for (r, row) in blk.bytes.chunks_exact(rb).enumerate() {
                if row[col / 8] & mask != 0 {
                    out.push(first + r as u64);
                }
            }
        }
        Ok(out)
    }

    // Writes every dirty block back; cached blocks stay cached.
    pub fn flush(&mut self) -> Result<()> {
        let dirty: Vec<(u64, Vec<u8>)> = self
            .cache
            .iter()
            .filter(|(_, blk)| blk.dirty)
            .map(|(k, blk)| (*k, blk.bytes.clone()))
            .collect();
        for (b, bytes) in dirty {
            self.write_back(b, &bytes)?;
            if let Some(blk) = self.cache.peek_mut(&b) {
                blk.dirty = false;
            }
        }
        Ok(())
    }
}
