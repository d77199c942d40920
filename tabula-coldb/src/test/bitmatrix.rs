use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tabula_base::{Error, ErrorKind, Result};
use crate::{BitBacking, BitMatrix, Container, DatasetBits, MemBacking, MemBits};
use super::tiny_config;
use test_log::test;

#[test]
fn test_set_unset_positions() -> Result<()> {
    let cfg = tiny_config();
    let mut m = BitMatrix::in_memory(11, &cfg)?;
    assert_eq!(m.n_rows(), 0);
    m.resize(5)?;
    m.set_bit(0, 0)?;
    m.set_bit(0, 10)?;
    m.set_bit(3, 8)?;
    m.set_bit(4, 10)?;
    m.set_bit(4, 3)?;
    m.unset_bit(4, 3)?;
    assert!(m.get(0, 10)?);
    assert!(!m.get(4, 3)?);
    assert_eq!(m.positions_in_row(0)?, vec![0, 10]);
    assert_eq!(m.positions_in_row(2)?, Vec::<usize>::new());
    assert_eq!(m.positions_in_col(10)?, vec![0, 4]);
    assert_eq!(m.positions_in_col(8)?, vec![3]);
    assert_eq!(m.set_bit(5, 0).unwrap_err().kind(), ErrorKind::Contract);
    assert_eq!(m.set_bit(0, 11).unwrap_err().kind(), ErrorKind::Contract);
    Ok(())
}

#[test]
fn test_resize_only_grows_and_keeps_bits() -> Result<()> {
    let cfg = tiny_config();
    let mut m = BitMatrix::in_memory(3, &cfg)?;
    m.resize(3)?;
    m.set_bit(2, 1)?;
    m.resize(7)?;
    assert_eq!(m.positions_in_col(1)?, vec![2]);
    assert!(!m.get(6, 1)?);
    assert_eq!(m.resize(2).unwrap_err().kind(), ErrorKind::Contract);
    Ok(())
}

// A pseudo-random pattern over many blocks with a two-block cache: every
// bit has to survive eviction and a reopen of the dataset.
#[test]
fn test_bits_survive_eviction_and_reopen() -> Result<()> {
    let cfg = tiny_config();
    let shared = Container::create(Box::new(MemBacking::new()))?.into_shared();
    let (rows, cols) = (40u64, 13usize);
    let mut expect = BTreeSet::new();
    {
        let mut m = BitMatrix::new(Box::new(DatasetBits::new(shared.clone(), "nulls")), cols, &cfg)?;
        m.resize(rows)?;
        let mut x: u64 = 12345;
        for _ in 0..200 {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let (r, c) = ((x >> 33) % rows, ((x >> 17) % cols as u64) as usize);
            if (x >> 7) % 3 == 0 {
                m.unset_bit(r, c)?;
                expect.remove(&(r, c));
            } else {
                m.set_bit(r, c)?;
                expect.insert((r, c));
            }
        }
        m.flush()?;
    }
    let mut m = BitMatrix::new(Box::new(DatasetBits::new(shared, "nulls")), cols, &cfg)?;
    assert_eq!(m.n_rows(), rows);
    for r in 0..rows {
        let want: Vec<usize> = expect.iter().filter(|(er, _)| *er == r).map(|(_, c)| *c).collect();
        assert_eq!(m.positions_in_row(r)?, want, "row {r}");
    }
    for c in 0..cols {
        let want: Vec<u64> = expect.iter().filter(|(_, ec)| *ec == c).map(|(r, _)| *r).collect();
        assert_eq!(m.positions_in_col(c)?, want, "col {c}");
    }
    Ok(())
}

// Memory whose writes fail while the switch is on.
struct Flaky {
    inner: MemBits,
    failing: Arc<AtomicBool>,
}

impl BitBacking for Flaky {
    fn byte_len(&self) -> Result<u64> {
        self.inner.byte_len()
    }

    fn read_bytes(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.inner.read_bytes(offset, len)
    }

    fn write_bytes(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::External, std::io::Error::other("disk full")));
        }
        self.inner.write_bytes(offset, bytes)
    }

    fn grow_to(&mut self, len: u64) -> Result<()> {
        self.inner.grow_to(len)
    }
}

#[test]
fn test_failed_write_back_keeps_the_block() -> Result<()> {
    let cfg = tiny_config();
    let failing = Arc::new(AtomicBool::new(false));
    let flaky = Flaky {
        inner: MemBits::new(),
        failing: failing.clone(),
    };
    let mut m = BitMatrix::new(Box::new(flaky), 3, &cfg)?;
    m.resize(8)?;
    m.set_bit(0, 1)?;
    m.set_bit(2, 2)?;
    failing.store(true, Ordering::SeqCst);
    // Loading a third block has to evict the dirty block of row 0.
    assert_eq!(m.get(4, 0).unwrap_err().kind(), ErrorKind::External);
    assert!(m.flush().is_err());
    assert!(m.get(0, 1)?);

    failing.store(false, Ordering::SeqCst);
    // Every block is visited, so both dirty ones go out and come back in.
    assert_eq!(m.positions_in_col(1)?, vec![0]);
    assert_eq!(m.positions_in_col(2)?, vec![2]);
    m.flush()?;
    assert_eq!(m.positions_in_row(0)?, vec![1]);
    Ok(())
}
