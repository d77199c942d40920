// A container is a single file holding any number of named, growable byte
// datasets. The layout is:
//
//   header magic (8 bytes)
//   extents ...              raw dataset bytes in write order
//   footer                   MessagePack Directory
//   footer length (u64 LE)
//   footer magic (8 bytes)
//
// Nothing already written is ever overwritten. A commit appends whatever
// extents were written since the last commit and then a fresh footer, so
// the newest footer is always the last 16 bytes of the file and any
// earlier footers are just dead bytes. Overwriting part of a dataset
// appends an extent that shadows the older bytes for that range.
//
// Appends collect in a per-dataset buffer and reach the file as one
// extent when the buffer fills, when the dataset is overwritten below the
// buffer, or at commit. A flush that lands right after the dataset's last
// extent grows that extent instead of adding one.

use std::{
    collections::BTreeMap,
    io::{Read, Seek, SeekFrom, Write},
    sync::Arc,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tabula_base::{corrupt_err, Result};
use tracing::{debug, trace};
use crate::{ioutil::Backing, meta::FileMeta};

pub const HEADER_MAGIC: &[u8; 8] = b"tabula\0\x01";
pub const FOOTER_MAGIC: &[u8; 8] = b"tabulaft";

const TAIL_LEN: u64 = 16;

// Pending bytes per dataset before they go to the file.
pub(crate) const FLUSH_AT: usize = 1 << 20;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    // Offset within the dataset.
    pub logical: u64,
    // Offset within the file.
    pub pos: u64,
    pub len: u64,
}

impl Extent {
    fn end(&self) -> u64 {
        self.logical + self.len
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    pub meta: FileMeta,
    // Extents in write order; later ones win where they overlap.
    pub datasets: BTreeMap<String, Vec<Extent>>,
}

// Appended bytes not yet in the file, starting at `logical`.
struct Pending {
    logical: u64,
    bytes: Vec<u8>,
}

impl Pending {
    fn end(&self) -> u64 {
        self.logical + self.bytes.len() as u64
    }
}

pub struct Container {
    io: Box<dyn Backing>,
    dir: Directory,
    pending: BTreeMap<String, Pending>,
    end: u64,
    dirty: bool,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("dir", &self.dir)
            .field("end", &self.end)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

// Writers, readers and every lazy value handed out by a reader share one
// container through this.
pub type SharedContainer = Arc<Mutex<Container>>;

impl Container {
    pub fn create(mut io: Box<dyn Backing>) -> Result<Container> {
        io.rewind()?;
        io.write_all(HEADER_MAGIC)?;
        Ok(Container {
            io,
            dir: Directory::default(),
            pending: BTreeMap::new(),
            end: HEADER_MAGIC.len() as u64,
            dirty: true,
        })
    }

    pub fn open(mut io: Box<dyn Backing>) -> Result<Container> {
        let size = io.byte_len()?;
        let mut magic = [0u8; 8];
        io.rewind()?;
        if size < HEADER_MAGIC.len() as u64 {
            return Err(corrupt_err(format!("{} is too short to be a container", io.describe())));
        }
        io.read_exact(&mut magic)?;
        if magic != *HEADER_MAGIC {
            return Err(corrupt_err(format!("{} has a bad magic number", io.describe())));
        }
        if size < HEADER_MAGIC.len() as u64 + TAIL_LEN {
            return Err(corrupt_err(format!("{} is truncated: no footer", io.describe())));
        }
        io.seek(SeekFrom::Start(size - TAIL_LEN))?;
        let mut tail = [0u8; TAIL_LEN as usize];
        io.read_exact(&mut tail)?;
        let (len_bytes, footer_magic) = tail.split_at(8);
        if footer_magic != FOOTER_MAGIC {
            return Err(corrupt_err(format!(
                "{} is truncated: footer magic missing",
                io.describe()
            )));
        }
        let mut len = [0u8; 8];
        len.copy_from_slice(len_bytes);
        let footer_len = u64::from_le_bytes(len);
        let footer_room = size - TAIL_LEN - HEADER_MAGIC.len() as u64;
        if footer_len > footer_room {
            return Err(corrupt_err(format!(
                "{} footer claims {footer_len} bytes but only {footer_room} precede it",
                io.describe()
            )));
        }
        io.seek(SeekFrom::Start(size - TAIL_LEN - footer_len))?;
        let mut footer = vec![0u8; footer_len as usize];
        io.read_exact(&mut footer)?;
        let dir: Directory = rmp_serde::from_slice(&footer)?;
        debug!(target: "tabula", file = %io.describe(), datasets = dir.datasets.len(), rows = dir.meta.n_rows, "opened container");
        Ok(Container {
            io,
            dir,
            pending: BTreeMap::new(),
            end: size,
            dirty: false,
        })
    }

    pub fn describe(&self) -> String {
        self.io.describe()
    }

    pub fn meta(&self) -> &FileMeta {
        &self.dir.meta
    }

    pub fn meta_mut(&mut self) -> &mut FileMeta {
        self.dirty = true;
        &mut self.dir.meta
    }

    // The directory as of the last flush; pending appends are not in it.
    pub fn directory(&self) -> &Directory {
        &self.dir
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn has_dataset(&self, name: &str) -> bool {
        self.dir.datasets.contains_key(name)
    }

    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.dir.datasets.keys().map(String::as_str)
    }

    fn flushed_len(&self, name: &str) -> u64 {
        self.dir
            .datasets
            .get(name)
            .and_then(|exts| exts.iter().map(Extent::end).max())
            .unwrap_or(0)
    }

    pub fn dataset_len(&self, name: &str) -> u64 {
        let flushed = self.flushed_len(name);
        self.pending.get(name).map_or(flushed, |p| p.end().max(flushed))
    }

    // Forgets a dataset. Its bytes stay in the file as dead space.
    pub fn remove_dataset(&mut self, name: &str) -> bool {
        let dropped = self.pending.remove(name).is_some();
        let removed = self.dir.datasets.remove(name).is_some() || dropped;
        self.dirty |= removed;
        removed
    }

    fn put_raw(&mut self, bytes: &[u8]) -> Result<u64> {
        let pos = self.end;
        self.io.seek(SeekFrom::Start(pos))?;
        self.io.write_all(bytes)?;
        self.end += bytes.len() as u64;
        Ok(pos)
    }

    // Appends to the end of a dataset, creating it if needed, and returns
    // the logical offset the bytes landed at.
    pub fn append(&mut self, name: &str, bytes: &[u8]) -> Result<u64> {
        let logical = self.dataset_len(name);
        self.write_at(name, logical, bytes)?;
        Ok(logical)
    }

    pub fn write_at(&mut self, name: &str, logical: u64, bytes: &[u8]) -> Result<()> {
        let len = self.dataset_len(name);
        if logical > len {
            return Err(corrupt_err(format!(
                "write at {logical} would leave a hole in dataset {name} of {len} bytes"
            )));
        }
        self.dirty = true;
        self.dir.datasets.entry(name.to_string()).or_default();
        if bytes.is_empty() {
            return Ok(());
        }
        let buffered = match self.pending.get_mut(name) {
            Some(p) if logical >= p.logical => {
                let at = (logical - p.logical) as usize;
                let overlap = (p.bytes.len() - at).min(bytes.len());
                p.bytes[at..at + overlap].copy_from_slice(&bytes[..overlap]);
                p.bytes.extend_from_slice(&bytes[overlap..]);
                p.bytes.len()
            }
            Some(_) => {
                // The write reaches below the buffer, so the buffer goes
                // first and the write shadows it.
                self.flush(name)?;
                self.put_extent(name, logical, bytes)?;
                return Ok(());
            }
            None if logical == len => {
                self.pending.insert(
                    name.to_string(),
                    Pending {
                        logical,
                        bytes: bytes.to_vec(),
                    },
                );
                bytes.len()
            }
            None => {
                self.put_extent(name, logical, bytes)?;
                return Ok(());
            }
        };
        if buffered >= FLUSH_AT {
            self.flush(name)?;
        }
        Ok(())
    }

    fn put_extent(&mut self, name: &str, logical: u64, bytes: &[u8]) -> Result<()> {
        let pos = self.put_raw(bytes)?;
        let new = Extent {
            logical,
            pos,
            len: bytes.len() as u64,
        };
        let exts = self.dir.datasets.entry(name.to_string()).or_default();
        match exts.last_mut() {
            Some(last) if last.end() == new.logical && last.pos + last.len == new.pos => {
                last.len += new.len;
            }
            _ => {
                // Anything the new extent covers completely is dead.
                exts.retain(|e| e.logical < new.logical || e.end() > new.end());
                exts.push(new);
            }
        }
        trace!(target: "tabula", dataset = name, logical, pos, len = bytes.len(), "extent");
        Ok(())
    }

    fn flush(&mut self, name: &str) -> Result<()> {
        match self.pending.remove(name) {
            Some(p) => self.put_extent(name, p.logical, &p.bytes),
            None => Ok(()),
        }
    }

    fn flush_all(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        for (name, p) in pending {
            self.put_extent(&name, p.logical, &p.bytes)?;
        }
        Ok(())
    }

    pub fn read(&mut self, name: &str, logical: u64, len: u64) -> Result<Vec<u8>> {
        let have = self.dataset_len(name);
        if logical + len > have {
            return Err(corrupt_err(format!(
                "read of {len} bytes at {logical} runs past the end of dataset {name} ({have} bytes)"
            )));
        }
        let mut out = vec![0u8; len as usize];
        let want_end = logical + len;
        // Reads that fall wholly inside the buffer skip the file.
        let from = self.pending.get(name).map_or(want_end, |p| p.logical.clamp(logical, want_end));
        if from > logical {
            if let Some(exts) = self.dir.datasets.get(name) {
                let overlapping: Vec<Extent> = exts
                    .iter()
                    .filter(|e| e.logical < from && e.end() > logical)
                    .copied()
                    .collect();
                for e in overlapping {
                    let lo = e.logical.max(logical);
                    let hi = e.end().min(from);
                    self.io.seek(SeekFrom::Start(e.pos + (lo - e.logical)))?;
                    let dst = &mut out[(lo - logical) as usize..(hi - logical) as usize];
                    self.io.read_exact(dst)?;
                }
            }
        }
        if let Some(p) = self.pending.get(name) {
            if from < want_end {
                let src = &p.bytes[(from - p.logical) as usize..(want_end - p.logical) as usize];
                out[(from - logical) as usize..].copy_from_slice(src);
            }
        }
        Ok(out)
    }

    pub fn read_all(&mut self, name: &str) -> Result<Vec<u8>> {
        let len = self.dataset_len(name);
        self.read(name, 0, len)
    }

    pub fn commit(&mut self) -> Result<()> {
        self.flush_all()?;
        let footer = rmp_serde::to_vec(&self.dir)?;
        let mut tail = Vec::with_capacity(footer.len() + TAIL_LEN as usize);
        tail.extend_from_slice(&footer);
        tail.extend_from_slice(&(footer.len() as u64).to_le_bytes());
        tail.extend_from_slice(FOOTER_MAGIC);
        self.put_raw(&tail)?;
        self.io.sync()?;
        self.dirty = false;
        debug!(target: "tabula", file = %self.io.describe(), footer = footer.len(), end = self.end, "committed container");
        Ok(())
    }

    pub fn into_shared(self) -> SharedContainer {
        Arc::new(Mutex::new(self))
    }
}
