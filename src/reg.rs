//! Register offsets and bit layouts for the sunxi DesignWare PCIe controller.
//!
//! Offsets are relative to the space they live in: `DBI` for the PCIe core
//! configuration space (which also hosts the ATU bank and the DBI2 shadow),
//! `APP` for the user-defined application registers.

/// Port link control, DBI space. Bits [21:16] select the lane mode.
pub const PCIE_PORT_LINK_CONTROL: u32 = 0x710;
pub const PORT_LINK_MODE_MASK: u32 = 0x3f << 16;
pub const PORT_LINK_MODE_1_LANES: u32 = 0x1 << 16;
pub const PORT_LINK_MODE_2_LANES: u32 = 0x3 << 16;
pub const PORT_LINK_MODE_4_LANES: u32 = 0x7 << 16;

/// Gen2 port logic: link width and the directed-speed-change trigger.
pub const PCIE_LINK_WIDTH_SPEED_CONTROL: u32 = 0x80c;
pub const PORT_LOGIC_SPEED_CHANGE: u32 = 0x1 << 17;
pub const PORT_LOGIC_LINK_WIDTH_MASK: u32 = 0x1ff << 8;
pub const PORT_LOGIC_LINK_WIDTH_1_LANES: u32 = 0x1 << 8;
pub const PORT_LOGIC_LINK_WIDTH_2_LANES: u32 = 0x2 << 8;
pub const PORT_LOGIC_LINK_WIDTH_4_LANES: u32 = 0x4 << 8;

/// Link Control 2 lives at this offset inside the PCIe capability block.
pub const LINK_CONTROL2_LINK_STATUS2: u32 = 0xa0;
pub const PCI_EXP_LNKCTL2_TLS: u32 = 0x000f;

pub const PCIE_MISC_CONTROL_1_CFG: u32 = 0x8bc;
pub const PCIE_DBI_RO_WR_EN: u32 = 0x1;
pub const PCIE_TYPE1_CLASS_CODE_REV_ID_REG: u32 = 0x08;

/// ATU region bank. One 0x200-byte block per region; inbound blocks sit
/// 0x100 above their outbound twin.
pub const PCIE_ATU_REGION_STRIDE: u32 = 0x200;

pub const fn atu_cr1_outbound(region: u32) -> u32 {
    0x30_0000 + region * PCIE_ATU_REGION_STRIDE
}
pub const fn atu_cr2_outbound(region: u32) -> u32 {
    0x30_0004 + region * PCIE_ATU_REGION_STRIDE
}
pub const fn atu_lower_base_outbound(region: u32) -> u32 {
    0x30_0008 + region * PCIE_ATU_REGION_STRIDE
}
pub const fn atu_upper_base_outbound(region: u32) -> u32 {
    0x30_000c + region * PCIE_ATU_REGION_STRIDE
}
pub const fn atu_limit_outbound(region: u32) -> u32 {
    0x30_0010 + region * PCIE_ATU_REGION_STRIDE
}
pub const fn atu_lower_target_outbound(region: u32) -> u32 {
    0x30_0014 + region * PCIE_ATU_REGION_STRIDE
}
pub const fn atu_upper_target_outbound(region: u32) -> u32 {
    0x30_0018 + region * PCIE_ATU_REGION_STRIDE
}

pub const fn atu_cr1_inbound(region: u32) -> u32 {
    0x30_0100 + region * PCIE_ATU_REGION_STRIDE
}
pub const fn atu_cr2_inbound(region: u32) -> u32 {
    0x30_0104 + region * PCIE_ATU_REGION_STRIDE
}
pub const fn atu_lower_base_inbound(region: u32) -> u32 {
    0x30_0108 + region * PCIE_ATU_REGION_STRIDE
}
pub const fn atu_upper_base_inbound(region: u32) -> u32 {
    0x30_010c + region * PCIE_ATU_REGION_STRIDE
}
pub const fn atu_limit_inbound(region: u32) -> u32 {
    0x30_0110 + region * PCIE_ATU_REGION_STRIDE
}
pub const fn atu_lower_target_inbound(region: u32) -> u32 {
    0x30_0114 + region * PCIE_ATU_REGION_STRIDE
}
pub const fn atu_upper_target_inbound(region: u32) -> u32 {
    0x30_0118 + region * PCIE_ATU_REGION_STRIDE
}

pub const PCIE_ATU_TYPE_MEM: u32 = 0x0;
pub const PCIE_ATU_TYPE_IO: u32 = 0x2;
pub const PCIE_ATU_TYPE_CFG0: u32 = 0x4;
pub const PCIE_ATU_TYPE_CFG1: u32 = 0x5;
pub const PCIE_ATU_ENABLE: u32 = 1 << 31;
pub const PCIE_ATU_BAR_MODE_ENABLE: u32 = 1 << 30;
pub const PCIE_ATU_FUNC_NUM_MATCH_EN: u32 = 1 << 19;

pub const fn atu_func_num(func_no: u8) -> u32 {
    (func_no as u32) << 20
}

/// Windows per direction on this controller.
pub const NUM_OB_WINDOWS: usize = 8;
pub const NUM_IB_WINDOWS: usize = 8;

/// DBI2 shadow registers: BAR mask/enable, one block per function.
pub const PCIE_DBI2_BASE: u32 = 0x10_0000;
pub const DBI2_FUNC_OFFSET: u32 = 0x1_0000;
pub const BAR_ENABLE: u32 = 0x1;

pub const PCIE_BAR_NUM: usize = 6;
pub const PCIE_CPU_BASE: u32 = 0x2000_0000;
pub const PCIE_TYPE0_STATUS_COMMAND_REG: u32 = 0x4;

pub const fn bar_reg(bar_no: u8) -> u32 {
    0x10 + (bar_no as u32) * 4
}

/// MSI controller registers, DBI space.
pub const PCIE_MSI_ADDR_LO: u32 = 0x820;
pub const PCIE_MSI_ADDR_HI: u32 = 0x824;

pub const fn msi_intr_enable(group: u32) -> u32 {
    0x828 + group * 0x0c
}
pub const fn msi_intr_mask(group: u32) -> u32 {
    0x82c + group * 0x0c
}
pub const fn msi_intr_status(group: u32) -> u32 {
    0x830 + group * 0x0c
}

pub const MAX_MSI_IRQS: usize = 256;
pub const MAX_MSI_IRQS_PER_CTRL: usize = 32;
pub const MAX_MSI_CTRLS: usize = MAX_MSI_IRQS / MAX_MSI_IRQS_PER_CTRL;

/// MSI capability control register in the function's config header.
pub const SUNXI_PCIE_EP_MSI_CTRL_REG: u32 = 0x90;
/// Message-control bit 7: the function uses a 64-bit message address, which
/// pushes the data word from cap+0x8 to cap+0xc.
pub const MSI_CAP_64_BIT_ADDR: u16 = 1 << 7;
pub const MSI_CAP_MSG_DATA_32: u32 = 0x8;
pub const MSI_CAP_MSG_DATA_64: u32 = 0xc;
pub const SUNXI_PCIE_EP_MSI_CTRL_MMC_OFFSET: u32 = 17;
pub const SUNXI_PCIE_EP_MSI_CTRL_MMC_MASK: u32 = 0x7 << 17;
pub const SUNXI_PCIE_EP_MSI_CTRL_MME_OFFSET: u32 = 20;
pub const SUNXI_PCIE_EP_MSI_CTRL_MME_MASK: u32 = 0x7 << 20;
pub const SUNXI_PCIE_EP_MSI_CTRL_ME: u32 = 1 << 16;
pub const SUNXI_PCIE_EP_MSI_CTRL_MASK_MSI_CAP: u32 = 1 << 24;

/// Application (user-defined) register block.
pub const PCIE_LTSSM_CTRL: u32 = 0xc00;
pub const PCIE_LINK_TRAINING: u32 = 1 << 0;
pub const DEVICE_TYPE_MASK: u32 = 0xf << 4;
pub const DEVICE_TYPE_RC: u32 = 1 << 6;

pub const PCIE_INT_ENABLE_CLR: u32 = 0xe04;
pub const PCIE_LINK_INT_EN: u32 = (1 << 0) | (1 << 1);

pub const PCIE_LINK_STAT: u32 = 0xe0c;
pub const SMLH_LINK_UP: u32 = 1 << 0;
pub const RDLH_LINK_UP: u32 = 1 << 1;

pub const PCIE_PHY_CFG: u32 = 0x800;
pub const SYS_CLK: u32 = 0;
pub const PAD_CLK: u32 = 1;

/// Bounded-poll budgets. The link-wait window is in microseconds.
pub const LINK_WAIT_MAX_RETRIES: u32 = 20;
pub const LINK_WAIT_USLEEP_MIN: u32 = 90_000;
pub const LINK_WAIT_USLEEP_MAX: u32 = 100_000;
pub const SPEED_CHANGE_USLEEP_MIN: u32 = 100;
pub const SPEED_CHANGE_USLEEP_MAX: u32 = 1_000;

/// Resizable BAR extended capability register layout.
pub const PCI_REBAR_CAP: u32 = 4;
pub const PCI_REBAR_CAP_SIZES: u32 = 0x00ff_fff0;
pub const PCI_REBAR_CTRL: u32 = 8;
pub const PCI_REBAR_CTRL_BAR_IDX: u32 = 0x0000_0007;
pub const PCI_REBAR_CTRL_NBAR_MASK: u32 = 0x0000_00e0;
pub const PCI_REBAR_CTRL_NBAR_SHIFT: u32 = 5;
pub const PCI_REBAR_CTRL_BAR_SIZE: u32 = 0x0000_1f00;
pub const PCI_REBAR_CTRL_BAR_SHIFT: u32 = 8;

/// RASDP (datapath ECC) registers, DBI space.
pub const PCIE_RASDP_ERR_PROT_CTRL_OFF: u32 = 0x1f0;
pub const PCIE_RASDP_CORR_COUNTER_CTRL_OFF: u32 = 0x1f4;
pub const PCIE_RASDP_CORR_COUNTER_REPORT_OFF: u32 = 0x1f8;
pub const PCIE_RASDP_UNCORR_COUNTER_CTRL_OFF: u32 = 0x1fc;
pub const PCIE_RASDP_UNCORR_COUNTER_REPORT_OFF: u32 = 0x200;
pub const PCIE_RASDP_ERR_INJ_CTRL_OFF: u32 = 0x204;
pub const PCIE_RASDP_CORR_ERROR_LOCATION_OFF: u32 = 0x208;
pub const PCIE_RASDP_UNCORR_ERROR_LOCATION_OFF: u32 = 0x20c;
pub const PCIE_RASDP_ERROR_MODE_CLEAR_OFF: u32 = 0x214;

/// Controller-management block.
pub const PCIE_CTRL_MGMT_BASE: u32 = 0x90_0000;
pub const PCIE_PHY_FUNC_CFG: u32 = PCIE_CTRL_MGMT_BASE + 0x2c0;
pub const PCIE_RC_BAR_CONF: u32 = PCIE_CTRL_MGMT_BASE + 0x300;
pub const SUNXI_PCIE_BAR_CFG_CTRL_DISABLED: u32 = 0x0;

pub const PCIE_SII_INT_MASK_RES2: u32 = 0xe10;
pub const PCIE_SII_INT_RES2: u32 = 0xe18;
pub const RASDP_ERR_PENDING: u32 = 0x1f << 8;
