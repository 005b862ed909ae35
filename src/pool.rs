use alloc::vec;
use alloc::vec::Vec;
use bit_field::BitField;

use crate::err::{PcieError, Result};

const WORD_BITS: usize = usize::BITS as usize;

/// Which hardware resource a pool hands out indices for, named in
/// exhaustion and double-free errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    OutboundAtu,
    InboundAtu,
    Msi,
    EdmaRead,
    EdmaWrite,
}

/// Fixed-capacity index pool over a bitmap, lowest free bit first.
///
/// One type serves the ATU window maps, the MSI vector map and the EDMA
/// channel maps. An acquired index is exclusively owned until released;
/// callers must disable the corresponding hardware state before release so
/// a reused index never inherits a live translation.
pub struct BitmapPool {
    kind: PoolKind,
    capacity: usize,
    words: Vec<usize>,
}

impl BitmapPool {
    pub fn new(kind: PoolKind, capacity: usize) -> Self {
        Self {
            kind,
            capacity,
            words: vec![0; capacity.div_ceil(WORD_BITS)],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lowest free index, marked allocated.
    pub fn acquire(&mut self) -> Result<usize> {
        self.acquire_below(self.capacity)
    }

    /// Lowest free index strictly below `limit`. Used where a caller's
    /// quota is narrower than the pool, e.g. a function's MMC budget
    /// inside the 32-wide MSI group.
    pub fn acquire_below(&mut self, limit: usize) -> Result<usize> {
        let limit = limit.min(self.capacity);
        for index in 0..limit {
            if !self.words[index / WORD_BITS].get_bit(index % WORD_BITS) {
                self.words[index / WORD_BITS].set_bit(index % WORD_BITS, true);
                return Ok(index);
            }
        }
        Err(PcieError::ResourceExhausted { pool: self.kind })
    }

    pub fn release(&mut self, index: usize) -> Result<()> {
        if index >= self.capacity {
            return Err(PcieError::InvalidArgument {
                what: "pool index out of range",
            });
        }
        if !self.words[index / WORD_BITS].get_bit(index % WORD_BITS) {
            return Err(PcieError::DoubleFree {
                pool: self.kind,
                index,
            });
        }
        self.words[index / WORD_BITS].set_bit(index % WORD_BITS, false);
        Ok(())
    }

    pub fn is_allocated(&self, index: usize) -> bool {
        index < self.capacity && self.words[index / WORD_BITS].get_bit(index % WORD_BITS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_is_lowest_first_and_exclusive() {
        let mut pool = BitmapPool::new(PoolKind::OutboundAtu, 8);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        pool.release(0).unwrap();
        // freed index is reused before higher untouched ones
        assert_eq!(pool.acquire().unwrap(), 0);
    }

    #[test]
    fn exhaustion_then_full_refill() {
        let mut pool = BitmapPool::new(PoolKind::Msi, 32);
        let mut held = alloc::vec::Vec::new();
        for _ in 0..32 {
            held.push(pool.acquire().unwrap());
        }
        assert_eq!(
            pool.acquire(),
            Err(PcieError::ResourceExhausted {
                pool: PoolKind::Msi
            })
        );
        // no duplicates among live handles
        for (i, a) in held.iter().enumerate() {
            for b in &held[i + 1..] {
                assert_ne!(a, b);
            }
        }
        for index in held {
            pool.release(index).unwrap();
        }
        for _ in 0..32 {
            pool.acquire().unwrap();
        }
    }

    #[test]
    fn double_free_is_reported() {
        let mut pool = BitmapPool::new(PoolKind::EdmaRead, 4);
        let index = pool.acquire().unwrap();
        pool.release(index).unwrap();
        assert_eq!(
            pool.release(index),
            Err(PcieError::DoubleFree {
                pool: PoolKind::EdmaRead,
                index
            })
        );
    }

    #[test]
    fn acquire_below_respects_the_quota() {
        let mut pool = BitmapPool::new(PoolKind::Msi, 32);
        for _ in 0..4 {
            pool.acquire_below(4).unwrap();
        }
        assert!(pool.acquire_below(4).is_err());
        // the rest of the pool is still available to wider quotas
        assert_eq!(pool.acquire().unwrap(), 4);
    }
}
