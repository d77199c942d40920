use std::{
    fs::{File, OpenOptions},
    io::{Cursor, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};
use tabula_base::{corrupt_err, Result};

// Whatever a container lives in. Files in normal use, memory in tests and
// for scratch containers.
pub trait Backing: Read + Write + Seek + Send {
    fn byte_len(&mut self) -> Result<u64> {
        Ok(self.seek(SeekFrom::End(0))?)
    }

    fn sync(&mut self) -> Result<()>;

    fn describe(&self) -> String;
}

// MemBacking

#[derive(Default)]
pub struct MemBacking {
    mem: Cursor<Vec<u8>>,
}

impl MemBacking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.mem.into_inner()
    }
}

impl From<Vec<u8>> for MemBacking {
    fn from(vec: Vec<u8>) -> Self {
        Self {
            mem: Cursor::new(vec),
        }
    }
}

impl Read for MemBacking {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.mem.read(buf)
    }
}

impl Write for MemBacking {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.mem.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.mem.flush()
    }
}

impl Seek for MemBacking {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.mem.seek(pos)
    }
}

impl Backing for MemBacking {
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        format!("<memory, {} bytes>", self.mem.get_ref().len())
    }
}

// FileBacking. Unbuffered: the container seeks between every read and
// write, which would defeat a BufReader anyway.

pub struct FileBacking {
    file: File,
    path: PathBuf,
}

impl FileBacking {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self { file, path })
    }

    pub fn open_rw(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok(Self { file, path })
    }

    pub fn open_ro(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self { file, path })
    }
}

impl Read for FileBacking {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for FileBacking {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl Seek for FileBacking {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.file.seek(pos)
    }
}

impl Backing for FileBacking {
    fn byte_len(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// Little-endian word packing for dataset bodies.

pub(crate) fn put_u64s(buf: &mut Vec<u8>, words: &[u64]) {
    buf.reserve(words.len() * 8);
    for w in words {
        buf.extend_from_slice(&w.to_le_bytes());
    }
}

pub(crate) fn u64s_to_bytes(words: &[u64]) -> Vec<u8> {
    let mut buf = Vec::new();
    put_u64s(&mut buf, words);
    buf
}

pub(crate) fn bytes_to_u64s(bytes: &[u8]) -> Result<Vec<u64>> {
    if bytes.len() % 8 != 0 {
        return Err(corrupt_err(format!(
            "word array of {} bytes is not a whole number of words",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|c| {
            let mut w = [0u8; 8];
            w.copy_from_slice(c);
            u64::from_le_bytes(w)
        })
        .collect())
}

pub(crate) fn f64s_to_bytes(vals: &[f64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(vals.len() * 8);
    for v in vals {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

pub(crate) fn bytes_to_f64s(bytes: &[u8]) -> Result<Vec<f64>> {
    Ok(bytes_to_u64s(bytes)?.into_iter().map(f64::from_bits).collect())
}
