//! Endpoint MSI vector management.
//!
//! Vectors live in 32-wide groups with per-group enable/mask registers.
//! Allocation is pure bookkeeping; nothing touches hardware until `enable`
//! programs the address pair, the capability's message-data word and the
//! function's MSI-enable bit. A function may never hold more vectors than
//! its Multiple-Message-Capable field advertises.

use alloc::collections::BTreeMap;
use bit_field::BitField;
use log::debug;

use crate::access::PcieIo;
use crate::err::{PcieError, Result};
use crate::pool::{BitmapPool, PoolKind};
use crate::reg;

/// An allocated vector. The interrupt-number-to-(address, data) binding
/// belongs to this handle until `free` releases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorHandle {
    pub(crate) func_no: u8,
    pub(crate) vector: usize,
}

impl VectorHandle {
    pub fn func_no(&self) -> u8 {
        self.func_no
    }

    /// Controller-wide vector number.
    pub fn vector(&self) -> usize {
        self.vector
    }

    fn group(&self) -> u32 {
        (self.vector / reg::MAX_MSI_IRQS_PER_CTRL) as u32
    }

    fn bit(&self) -> usize {
        self.vector % reg::MAX_MSI_IRQS_PER_CTRL
    }
}

pub struct MsiAllocator {
    pool: BitmapPool,
    held: BTreeMap<u8, usize>,
}

impl Default for MsiAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl MsiAllocator {
    pub fn new() -> Self {
        Self {
            pool: BitmapPool::new(PoolKind::Msi, reg::MAX_MSI_IRQS),
            held: BTreeMap::new(),
        }
    }

    /// Vectors a function may hold, from its MSI capability control word.
    pub fn mmc_budget<A: PcieIo>(io: &mut A, func_conf: u32, msi_cap: u32) -> usize {
        let ctrl = io.read_dbi(func_conf + msi_cap);
        let mmc = (ctrl & reg::SUNXI_PCIE_EP_MSI_CTRL_MMC_MASK)
            >> reg::SUNXI_PCIE_EP_MSI_CTRL_MMC_OFFSET;
        1 << mmc
    }

    /// Allocate a vector for `func_no`, bounded by `budget`. Touches no
    /// hardware.
    pub fn allocate(&mut self, func_no: u8, budget: usize) -> Result<VectorHandle> {
        let held = self.held.entry(func_no).or_insert(0);
        if *held >= budget {
            return Err(PcieError::ResourceExhausted {
                pool: PoolKind::Msi,
            });
        }
        let vector = self.pool.acquire()?;
        *held += 1;
        Ok(VectorHandle { func_no, vector })
    }

    /// Program the address/data binding and turn delivery on: address
    /// registers, the capability's message-data word, the group enable bit,
    /// then the function's MSI-enable bit.
    pub fn enable<A: PcieIo>(
        &mut self,
        io: &mut A,
        handle: VectorHandle,
        func_conf: u32,
        msi_cap: u32,
        msi_addr: u64,
        msi_data: u16,
    ) {
        io.write_dbi(reg::PCIE_MSI_ADDR_LO, msi_addr as u32);
        io.write_dbi(reg::PCIE_MSI_ADDR_HI, (msi_addr >> 32) as u32);

        // The data word sits after the message address; a 64-bit address
        // field pushes it from cap+0x8 to cap+0xc.
        let msg_ctrl = io.read_dbi16(func_conf + msi_cap + 2);
        let data_off = if msg_ctrl & reg::MSI_CAP_64_BIT_ADDR != 0 {
            reg::MSI_CAP_MSG_DATA_64
        } else {
            reg::MSI_CAP_MSG_DATA_32
        };
        io.write_dbi16(func_conf + msi_cap + data_off, msi_data);

        let en_reg = reg::msi_intr_enable(handle.group());
        let mut en = io.read_dbi(en_reg);
        en.set_bit(handle.bit(), true);
        io.write_dbi(en_reg, en);

        let ctrl_reg = func_conf + msi_cap;
        let ctrl = io.read_dbi(ctrl_reg);
        io.write_dbi(ctrl_reg, ctrl | reg::SUNXI_PCIE_EP_MSI_CTRL_ME);

        debug!(
            "msi: func {} vector {} enabled, addr {:#x} data {:#x}",
            handle.func_no, handle.vector, msi_addr, msi_data
        );
    }

    /// Mask delivery without giving the vector up. Used to quiesce a
    /// vector across reconfiguration.
    pub fn mask<A: PcieIo>(&mut self, io: &mut A, handle: VectorHandle) {
        let mask_reg = reg::msi_intr_mask(handle.group());
        let mut mask = io.read_dbi(mask_reg);
        mask.set_bit(handle.bit(), true);
        io.write_dbi(mask_reg, mask);
    }

    pub fn unmask<A: PcieIo>(&mut self, io: &mut A, handle: VectorHandle) {
        let mask_reg = reg::msi_intr_mask(handle.group());
        let mut mask = io.read_dbi(mask_reg);
        mask.set_bit(handle.bit(), false);
        io.write_dbi(mask_reg, mask);
    }

    /// Disable delivery, then release the vector index.
    pub fn free<A: PcieIo>(&mut self, io: &mut A, handle: VectorHandle) -> Result<()> {
        let en_reg = reg::msi_intr_enable(handle.group());
        let mut en = io.read_dbi(en_reg);
        en.set_bit(handle.bit(), false);
        io.write_dbi(en_reg, en);

        self.pool.release(handle.vector)?;
        if let Some(held) = self.held.get_mut(&handle.func_no) {
            *held = held.saturating_sub(1);
        }
        Ok(())
    }
}
