//! EDMA channel bookkeeping. Transfer scheduling lives elsewhere; this
//! only hands out exclusive channel indices per direction.

use crate::err::Result;
use crate::pool::{BitmapPool, PoolKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdmaDirection {
    Read,
    Write,
}

/// An exclusively owned channel, released back with `EdmaChannels::release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdmaChannel {
    pub direction: EdmaDirection,
    pub index: usize,
}

pub struct EdmaChannels {
    read: BitmapPool,
    write: BitmapPool,
}

impl EdmaChannels {
    pub fn new(num_channels: usize) -> Self {
        Self {
            read: BitmapPool::new(PoolKind::EdmaRead, num_channels),
            write: BitmapPool::new(PoolKind::EdmaWrite, num_channels),
        }
    }

    pub fn acquire(&mut self, direction: EdmaDirection) -> Result<EdmaChannel> {
        let pool = match direction {
            EdmaDirection::Read => &mut self.read,
            EdmaDirection::Write => &mut self.write,
        };
        Ok(EdmaChannel {
            direction,
            index: pool.acquire()?,
        })
    }

    pub fn release(&mut self, channel: EdmaChannel) -> Result<()> {
        match channel.direction {
            EdmaDirection::Read => self.read.release(channel.index),
            EdmaDirection::Write => self.write.release(channel.index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_draw_from_separate_pools() {
        let mut edma = EdmaChannels::new(2);
        let r0 = edma.acquire(EdmaDirection::Read).unwrap();
        let w0 = edma.acquire(EdmaDirection::Write).unwrap();
        assert_eq!(r0.index, 0);
        assert_eq!(w0.index, 0);
        edma.acquire(EdmaDirection::Read).unwrap();
        assert!(edma.acquire(EdmaDirection::Read).is_err());
        edma.release(r0).unwrap();
        assert_eq!(edma.acquire(EdmaDirection::Read).unwrap().index, 0);
    }
}
