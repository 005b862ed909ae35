//! ATU region programming.
//!
//! Each region is a 0x200-byte register block: CR1 (type, function number),
//! base/limit/target addresses, CR2 (enable, match mode). The address
//! registers are always written before CR2 sets the enable bit, so a region
//! never decodes with half-programmed addresses. Disabling clears CR2 first
//! and then scrubs the address registers, so a released region index cannot
//! leave a stale translation behind.
//!
//! When several enabled regions match one address the hardware picks the
//! lowest region index. Indices are caller-chosen (via the controller's
//! pools) and are never reassigned here; allocate in priority order.

use log::debug;

use crate::access::PcieIo;
use crate::err::{PcieError, Result};
use crate::reg;

/// Minimum region granularity of the translation unit.
pub const ATU_MIN_REGION_SIZE: u64 = 0x1_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtuDirection {
    Outbound,
    Inbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtuRegionType {
    Mem,
    Io,
    Cfg0,
    Cfg1,
}

impl AtuRegionType {
    pub fn code(self) -> u32 {
        match self {
            AtuRegionType::Mem => reg::PCIE_ATU_TYPE_MEM,
            AtuRegionType::Io => reg::PCIE_ATU_TYPE_IO,
            AtuRegionType::Cfg0 => reg::PCIE_ATU_TYPE_CFG0,
            AtuRegionType::Cfg1 => reg::PCIE_ATU_TYPE_CFG1,
        }
    }

    fn valid_for(self, direction: AtuDirection) -> bool {
        match direction {
            AtuDirection::Outbound => true,
            // config cycles cannot be inbound-translated
            AtuDirection::Inbound => matches!(self, AtuRegionType::Mem | AtuRegionType::Io),
        }
    }
}

/// An enabled translation window. Returned by the controller; holds the
/// region index the caller must eventually pass back to `disable_window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHandle {
    pub(crate) region: usize,
    pub(crate) direction: AtuDirection,
}

impl WindowHandle {
    pub fn region(&self) -> usize {
        self.region
    }

    pub fn direction(&self) -> AtuDirection {
        self.direction
    }
}

/// Logical contents of one region, as read back from the registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub type_code: u32,
    pub base: u64,
    pub limit: u32,
    pub target: u64,
    pub enabled: bool,
}

struct RegionRegs {
    cr1: u32,
    cr2: u32,
    lower_base: u32,
    upper_base: u32,
    limit: u32,
    lower_target: u32,
    upper_target: u32,
}

fn region_regs(direction: AtuDirection, region: u32) -> RegionRegs {
    match direction {
        AtuDirection::Outbound => RegionRegs {
            cr1: reg::atu_cr1_outbound(region),
            cr2: reg::atu_cr2_outbound(region),
            lower_base: reg::atu_lower_base_outbound(region),
            upper_base: reg::atu_upper_base_outbound(region),
            limit: reg::atu_limit_outbound(region),
            lower_target: reg::atu_lower_target_outbound(region),
            upper_target: reg::atu_upper_target_outbound(region),
        },
        AtuDirection::Inbound => RegionRegs {
            cr1: reg::atu_cr1_inbound(region),
            cr2: reg::atu_cr2_inbound(region),
            lower_base: reg::atu_lower_base_inbound(region),
            upper_base: reg::atu_upper_base_inbound(region),
            limit: reg::atu_limit_inbound(region),
            lower_target: reg::atu_lower_target_inbound(region),
            upper_target: reg::atu_upper_target_inbound(region),
        },
    }
}

fn check_range(base: u64, limit: u64) -> Result<()> {
    // the limit is inclusive and may be u64::MAX, so no `limit + 1`
    if limit <= base
        || base % ATU_MIN_REGION_SIZE != 0
        || limit % ATU_MIN_REGION_SIZE != ATU_MIN_REGION_SIZE - 1
    {
        return Err(PcieError::InvalidRange { base, limit });
    }
    Ok(())
}

fn check_region_idle<A: PcieIo>(io: &mut A, regs: &RegionRegs) -> Result<()> {
    // no hot swap: an enabled region must be disabled before reprogramming
    if io.read_atu(regs.cr2) & reg::PCIE_ATU_ENABLE != 0 {
        return Err(PcieError::InvalidArgument {
            what: "region still enabled, disable before reprogramming",
        });
    }
    Ok(())
}

/// Program and enable an outbound region: CPU range `base..=limit` is
/// translated onto `pci_target`.
pub fn program_outbound<A: PcieIo>(
    io: &mut A,
    region: usize,
    region_type: AtuRegionType,
    cpu_base: u64,
    cpu_limit: u64,
    pci_target: u64,
    func_no: Option<u8>,
) -> Result<()> {
    if !region_type.valid_for(AtuDirection::Outbound) {
        return Err(PcieError::UnsupportedType {
            type_code: region_type.code(),
        });
    }
    check_range(cpu_base, cpu_limit)?;

    let regs = region_regs(AtuDirection::Outbound, region as u32);
    check_region_idle(io, &regs)?;

    let mut cr1 = region_type.code();
    if let Some(func) = func_no {
        cr1 |= reg::atu_func_num(func);
    }
    io.write_atu(regs.cr1, cr1);
    io.write_atu(regs.lower_base, cpu_base as u32);
    io.write_atu(regs.upper_base, (cpu_base >> 32) as u32);
    io.write_atu(regs.limit, cpu_limit as u32);
    io.write_atu(regs.lower_target, pci_target as u32);
    io.write_atu(regs.upper_target, (pci_target >> 32) as u32);
    // enable strictly last
    io.write_atu(regs.cr2, reg::PCIE_ATU_ENABLE);

    debug!(
        "atu: ob region {} {:?} {:#x}..={:#x} -> {:#x}",
        region, region_type, cpu_base, cpu_limit, pci_target
    );
    Ok(())
}

/// Program and enable an inbound region: PCI range `base..=limit` lands at
/// `cpu_target`. `match_by_function` narrows the match to `func_no`.
pub fn program_inbound<A: PcieIo>(
    io: &mut A,
    region: usize,
    region_type: AtuRegionType,
    pci_base: u64,
    pci_limit: u64,
    cpu_target: u64,
    func_no: Option<u8>,
    match_by_function: bool,
) -> Result<()> {
    if !region_type.valid_for(AtuDirection::Inbound) {
        return Err(PcieError::UnsupportedType {
            type_code: region_type.code(),
        });
    }
    if match_by_function && func_no.is_none() {
        return Err(PcieError::InvalidArgument {
            what: "match_by_function requires a function number",
        });
    }
    check_range(pci_base, pci_limit)?;

    let regs = region_regs(AtuDirection::Inbound, region as u32);
    check_region_idle(io, &regs)?;

    let mut cr1 = region_type.code();
    if let Some(func) = func_no {
        cr1 |= reg::atu_func_num(func);
    }
    io.write_atu(regs.cr1, cr1);
    io.write_atu(regs.lower_base, pci_base as u32);
    io.write_atu(regs.upper_base, (pci_base >> 32) as u32);
    io.write_atu(regs.limit, pci_limit as u32);
    io.write_atu(regs.lower_target, cpu_target as u32);
    io.write_atu(regs.upper_target, (cpu_target >> 32) as u32);

    let mut cr2 = reg::PCIE_ATU_ENABLE;
    if match_by_function {
        cr2 |= reg::PCIE_ATU_FUNC_NUM_MATCH_EN;
    }
    io.write_atu(regs.cr2, cr2);

    debug!(
        "atu: ib region {} {:?} {:#x}..={:#x} -> {:#x} (func {:?})",
        region, region_type, pci_base, pci_limit, cpu_target, func_no
    );
    Ok(())
}

/// Program and enable an inbound region in BAR-match mode: accesses hitting
/// `bar_no` of `func_no` land at `cpu_target`. No address range is involved;
/// the BAR registers define the match.
pub fn program_inbound_bar_match<A: PcieIo>(
    io: &mut A,
    region: usize,
    bar_no: u8,
    func_no: u8,
    cpu_target: u64,
) -> Result<()> {
    let regs = region_regs(AtuDirection::Inbound, region as u32);
    check_region_idle(io, &regs)?;

    io.write_atu(regs.cr1, reg::PCIE_ATU_TYPE_MEM | reg::atu_func_num(func_no));
    io.write_atu(regs.lower_target, cpu_target as u32);
    io.write_atu(regs.upper_target, (cpu_target >> 32) as u32);
    io.write_atu(
        regs.cr2,
        reg::PCIE_ATU_ENABLE | reg::PCIE_ATU_BAR_MODE_ENABLE | bar_no as u32,
    );

    debug!(
        "atu: ib region {} bar-match bar {} func {} -> {:#x}",
        region, bar_no, func_no, cpu_target
    );
    Ok(())
}

/// Disable a region and scrub its address registers.
pub fn disable_region<A: PcieIo>(io: &mut A, direction: AtuDirection, region: usize) {
    let regs = region_regs(direction, region as u32);
    io.write_atu(regs.cr2, 0);
    io.write_atu(regs.cr1, 0);
    io.write_atu(regs.lower_base, 0);
    io.write_atu(regs.upper_base, 0);
    io.write_atu(regs.limit, 0);
    io.write_atu(regs.lower_target, 0);
    io.write_atu(regs.upper_target, 0);
    debug!("atu: {:?} region {} disabled", direction, region);
}

/// Read a region's logical configuration back from the registers.
pub fn read_region<A: PcieIo>(
    io: &mut A,
    direction: AtuDirection,
    region: usize,
) -> WindowConfig {
    let regs = region_regs(direction, region as u32);
    let cr1 = io.read_atu(regs.cr1);
    let cr2 = io.read_atu(regs.cr2);
    WindowConfig {
        type_code: cr1 & 0xf,
        base: (io.read_atu(regs.upper_base) as u64) << 32
            | io.read_atu(regs.lower_base) as u64,
        limit: io.read_atu(regs.limit),
        target: (io.read_atu(regs.upper_target) as u64) << 32
            | io.read_atu(regs.lower_target) as u64,
        enabled: cr2 & reg::PCIE_ATU_ENABLE != 0,
    }
}
