//! Endpoint BAR binding.
//!
//! A bound BAR couples three pieces of state: the BAR registers in the
//! function's config header (type/flag bits in the DBI view, size mask in
//! the DBI2 shadow), an inbound BAR-match ATU region, and a page-aligned
//! backing range. PCI BAR semantics keep host-visible windows from
//! overlapping: sizes are powers of two and bases size-aligned, so
//! validation here is all the overlap enforcement needed.

use alloc::vec::Vec;
use bitflags::bitflags;
use log::debug;

use crate::access::PcieIo;
use crate::err::{PcieError, Result};
use crate::reg;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BarFlags: u32 {
        const IO = 1 << 0;
        const MEM32 = 1 << 1;
        const MEM64 = 1 << 2;
        const PREFETCH = 1 << 3;
    }
}

impl BarFlags {
    fn kind_count(self) -> u32 {
        (self.contains(BarFlags::IO) as u32)
            + (self.contains(BarFlags::MEM32) as u32)
            + (self.contains(BarFlags::MEM64) as u32)
    }

    /// Low BAR-register bits: bit 0 I/O indicator, bits [2:1] memory type,
    /// bit 3 prefetchable.
    fn reg_bits(self) -> u32 {
        if self.contains(BarFlags::IO) {
            return 0x1;
        }
        let mut bits = 0;
        if self.contains(BarFlags::MEM64) {
            bits |= 0x4;
        }
        if self.contains(BarFlags::PREFETCH) {
            bits |= 0x8;
        }
        bits
    }
}

/// A live binding, returned by `SunxiPcie::bind_bar`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarHandle {
    pub(crate) func_no: u8,
    pub(crate) bar_no: u8,
}

impl BarHandle {
    pub fn bar_no(&self) -> u8 {
        self.bar_no
    }

    pub fn func_no(&self) -> u8 {
        self.func_no
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BarBinding {
    pub func_no: u8,
    pub bar_no: u8,
    pub size: u64,
    pub flags: BarFlags,
    /// Inbound ATU region serving this BAR.
    pub region: usize,
    pub cpu_addr: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BarSlot {
    Bound(BarBinding),
    /// Second half of a 64-bit BAR; owner is the slot below.
    UpperHalf,
}

/// Per-function map of the six standard BAR slots.
#[derive(Default)]
pub(crate) struct BarMap {
    slots: [Option<BarSlot>; reg::PCIE_BAR_NUM],
}

impl BarMap {
    /// Occupancy check without side effects, for callers that must reserve
    /// other resources before committing the binding.
    pub fn check_free(&self, bar_no: u8, wide: bool) -> Result<()> {
        if self.slots[bar_no as usize].is_some() {
            return Err(PcieError::InvalidArgument {
                what: "BAR slot already bound",
            });
        }
        if wide && self.slots[bar_no as usize + 1].is_some() {
            return Err(PcieError::InvalidArgument {
                what: "upper slot of 64-bit BAR already bound",
            });
        }
        Ok(())
    }

    pub fn bind(&mut self, binding: BarBinding) -> Result<()> {
        let bar_no = binding.bar_no as usize;
        let wide = binding.flags.contains(BarFlags::MEM64);
        if self.slots[bar_no].is_some() {
            return Err(PcieError::InvalidArgument {
                what: "BAR slot already bound",
            });
        }
        if wide && self.slots[bar_no + 1].is_some() {
            return Err(PcieError::InvalidArgument {
                what: "upper slot of 64-bit BAR already bound",
            });
        }
        self.slots[bar_no] = Some(BarSlot::Bound(binding));
        if wide {
            self.slots[bar_no + 1] = Some(BarSlot::UpperHalf);
        }
        Ok(())
    }

    pub fn unbind(&mut self, bar_no: u8) -> Result<BarBinding> {
        match self.slots[bar_no as usize].take() {
            Some(BarSlot::Bound(binding)) => {
                if binding.flags.contains(BarFlags::MEM64) {
                    self.slots[bar_no as usize + 1] = None;
                }
                Ok(binding)
            }
            other => {
                self.slots[bar_no as usize] = other;
                Err(PcieError::InvalidArgument {
                    what: "BAR slot is not the start of a binding",
                })
            }
        }
    }

    pub fn get(&self, bar_no: u8) -> Option<&BarBinding> {
        match self.slots.get(bar_no as usize)? {
            Some(BarSlot::Bound(binding)) => Some(binding),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, bar_no: u8) -> Option<&mut BarBinding> {
        match self.slots.get_mut(bar_no as usize)? {
            Some(BarSlot::Bound(binding)) => Some(binding),
            _ => None,
        }
    }

    /// Empty the map, returning every live binding so the caller can
    /// clear the hardware state behind each one.
    pub fn drain(&mut self) -> Vec<BarBinding> {
        let mut bindings = Vec::new();
        for slot in &mut self.slots {
            if let Some(BarSlot::Bound(binding)) = slot.take() {
                bindings.push(binding);
            }
        }
        bindings
    }
}

pub(crate) fn validate_bar(bar_no: u8, size: u64, flags: BarFlags, cpu_addr: u64) -> Result<()> {
    if flags.kind_count() != 1 || (flags.contains(BarFlags::IO) && flags.contains(BarFlags::PREFETCH))
    {
        return Err(PcieError::InvalidArgument {
            what: "BAR flags must name exactly one of io/mem32/mem64",
        });
    }
    let wide = flags.contains(BarFlags::MEM64);
    let last_slot = reg::PCIE_BAR_NUM as u8 - 1;
    if bar_no > last_slot || (wide && bar_no >= last_slot) {
        return Err(PcieError::InvalidArgument {
            what: "BAR number out of range for this width",
        });
    }
    if !size.is_power_of_two() || size < 0x1000 {
        return Err(PcieError::InvalidArgument {
            what: "BAR size must be a power of two, at least one page",
        });
    }
    if !wide && size > u32::MAX as u64 + 1 {
        return Err(PcieError::InvalidArgument {
            what: "32-bit BAR larger than 4 GiB",
        });
    }
    if cpu_addr % 0x1000 != 0 {
        return Err(PcieError::InvalidRange {
            base: cpu_addr,
            limit: cpu_addr + size - 1,
        });
    }
    Ok(())
}

fn dbi2_bar_reg(func_no: u8, bar_no: u8) -> u32 {
    reg::PCIE_DBI2_BASE + func_no as u32 * reg::DBI2_FUNC_OFFSET + reg::bar_reg(bar_no)
}

/// Write the BAR's type bits and its DBI2 size mask.
pub(crate) fn program_ep_bar<A: PcieIo>(
    io: &mut A,
    func_conf: u32,
    func_no: u8,
    bar_no: u8,
    size: u64,
    flags: BarFlags,
) {
    let mask = size - 1;
    io.write_dbi(
        dbi2_bar_reg(func_no, bar_no),
        mask as u32 | reg::BAR_ENABLE,
    );
    io.write_dbi(func_conf + reg::bar_reg(bar_no), flags.reg_bits());
    if flags.contains(BarFlags::MEM64) {
        io.write_dbi(dbi2_bar_reg(func_no, bar_no + 1), (mask >> 32) as u32);
        io.write_dbi(func_conf + reg::bar_reg(bar_no + 1), 0);
    }
    debug!(
        "bar: func {} bar {} size {:#x} flags {:?}",
        func_no, bar_no, size, flags
    );
}

/// Zero the BAR registers and drop the DBI2 enable bit.
pub(crate) fn clear_ep_bar<A: PcieIo>(
    io: &mut A,
    func_conf: u32,
    func_no: u8,
    bar_no: u8,
    wide: bool,
) {
    io.write_dbi(dbi2_bar_reg(func_no, bar_no), 0);
    io.write_dbi(func_conf + reg::bar_reg(bar_no), 0);
    if wide {
        io.write_dbi(dbi2_bar_reg(func_no, bar_no + 1), 0);
        io.write_dbi(func_conf + reg::bar_reg(bar_no + 1), 0);
    }
}

/// Size code for the resizable-BAR control register: the capability bitmap
/// starts at 1 MiB (2^20).
fn rebar_size_code(size: u64) -> Option<u32> {
    if !size.is_power_of_two() || size < 1 << 20 {
        return None;
    }
    Some(size.trailing_zeros() - 20)
}

/// Negotiate a new BAR size through the resizable-BAR capability at
/// `rebar_cap`. On any mismatch the control register is left untouched.
pub(crate) fn rebar_resize<A: PcieIo>(
    io: &mut A,
    rebar_cap: u32,
    bar_no: u8,
    new_size: u64,
) -> Result<()> {
    let unsupported = PcieError::UnsupportedResize {
        bar: bar_no,
        size: new_size,
    };

    let code = rebar_size_code(new_size).ok_or(unsupported)?;
    let sizes = io.read_dbi(rebar_cap + reg::PCI_REBAR_CAP) & reg::PCI_REBAR_CAP_SIZES;
    if sizes & (1 << (code + 4)) == 0 {
        return Err(unsupported);
    }

    let ctrl_reg = rebar_cap + reg::PCI_REBAR_CTRL;
    let ctrl = io.read_dbi(ctrl_reg);
    let nbar = (ctrl & reg::PCI_REBAR_CTRL_NBAR_MASK) >> reg::PCI_REBAR_CTRL_NBAR_SHIFT;
    if nbar == 0 {
        return Err(unsupported);
    }

    let mut val = ctrl;
    val &= !(reg::PCI_REBAR_CTRL_BAR_IDX | reg::PCI_REBAR_CTRL_BAR_SIZE);
    val |= bar_no as u32 & reg::PCI_REBAR_CTRL_BAR_IDX;
    val |= (code << reg::PCI_REBAR_CTRL_BAR_SHIFT) & reg::PCI_REBAR_CTRL_BAR_SIZE;
    io.write_dbi(ctrl_reg, val);
    debug!("bar: resized bar {} to {:#x} (code {})", bar_no, new_size, code);
    Ok(())
}
