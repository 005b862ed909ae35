//! The per-instance controller: owns the register access layer, the
//! resource pools and the link state, and dispatches mode-specific
//! behavior picked once at construction.
//!
//! Every mutating method takes `&mut self`; a controller is a single owned
//! value, so the exclusive borrow is the per-controller advisory lock.
//! Controllers are independent of each other. Callers sharing one instance
//! between an init path and a poll path wrap it in their own cell or mutex.

use enum_dispatch::enum_dispatch;
use log::{debug, info};

use crate::access::PcieIo;
use crate::atu::{self, AtuDirection, AtuRegionType, WindowConfig, WindowHandle};
use crate::bar::{self, BarBinding, BarFlags, BarHandle, BarMap};
use crate::ecc::{self, EccReport};
use crate::edma::{EdmaChannel, EdmaChannels, EdmaDirection};
use crate::err::{PcieError, Result};
use crate::func::{EpFunction, FunctionTable};
use crate::link::{self, LinkState};
use crate::msi::{MsiAllocator, VectorHandle};
use crate::pool::{BitmapPool, PoolKind};
use crate::reg;

/// Per-SoC-variant data, the Rust face of the original per-compatible
/// match tables.
#[derive(Debug, Clone, Copy)]
pub struct SocData {
    /// Config-space stride between endpoint functions. Variant-specific;
    /// never assume adjacency.
    pub func_offset: u32,
    /// RASDP/ECC datapath protection is wired up on this variant.
    pub has_ecc: bool,
    /// CPU addresses need the upper-bit fixup before ATU programming.
    pub cpu_pcie_addr_quirk: bool,
    /// DBI offset of the resizable-BAR extended capability, if present.
    pub rebar_cap: Option<u32>,
    /// EDMA read/write channels per direction.
    pub num_edma: usize,
}

impl Default for SocData {
    fn default() -> Self {
        Self {
            func_offset: reg::DBI2_FUNC_OFFSET,
            has_ecc: false,
            cpu_pcie_addr_quirk: false,
            rebar_cap: None,
            num_edma: 4,
        }
    }
}

/// What a mode implementation supports, queried by upper layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeFeatures {
    pub msi: bool,
    pub bar_binding: bool,
    pub config_windows: bool,
}

/// Mode-specific behavior, selected once at construction.
#[enum_dispatch]
pub trait ModeOps {
    /// Value of the device-type field in the LTSSM control register.
    fn device_type_bits(&self) -> u32;

    fn features(&self) -> ModeFeatures;

    fn is_endpoint(&self) -> bool;
}

pub struct RcMode;

impl ModeOps for RcMode {
    fn device_type_bits(&self) -> u32 {
        reg::DEVICE_TYPE_RC
    }

    fn features(&self) -> ModeFeatures {
        ModeFeatures {
            msi: false,
            bar_binding: false,
            config_windows: true,
        }
    }

    fn is_endpoint(&self) -> bool {
        false
    }
}

pub struct EpMode;

impl ModeOps for EpMode {
    fn device_type_bits(&self) -> u32 {
        0
    }

    fn features(&self) -> ModeFeatures {
        ModeFeatures {
            msi: true,
            bar_binding: true,
            config_windows: false,
        }
    }

    fn is_endpoint(&self) -> bool {
        true
    }
}

#[enum_dispatch(ModeOps)]
pub enum Mode {
    RootComplex(RcMode),
    Endpoint(EpMode),
}

/// Construction parameters, gathered by the platform glue from the device
/// tree before probe.
pub struct PcieConfig {
    pub mode: Mode,
    pub lanes: u32,
    /// Target link generation for speed negotiation after link-up.
    pub link_gen: u8,
    pub soc: SocData,
}

/// One physical PCIe controller instance. Created once at probe, torn
/// down at device removal.
pub struct SunxiPcie<A: PcieIo> {
    io: A,
    mode: Mode,
    soc: SocData,
    lanes: u32,
    link_gen: u8,
    link_state: LinkState,
    ob_pool: BitmapPool,
    ib_pool: BitmapPool,
    msi: MsiAllocator,
    edma: EdmaChannels,
    funcs: FunctionTable,
    bars: BarMap,
}

impl<A: PcieIo> SunxiPcie<A> {
    /// Build a controller over an access layer. Clock, reset and PHY
    /// sequencing are the platform's job and must be done before `init`.
    pub fn new(io: A, config: PcieConfig) -> Result<Self> {
        link::lane_mode_bits(config.lanes)?;
        if !(1..=4).contains(&config.link_gen) {
            return Err(PcieError::InvalidArgument {
                what: "link generation must be 1..=4",
            });
        }
        Ok(Self {
            io,
            mode: config.mode,
            lanes: config.lanes,
            link_gen: config.link_gen,
            link_state: LinkState::Down,
            ob_pool: BitmapPool::new(PoolKind::OutboundAtu, reg::NUM_OB_WINDOWS),
            ib_pool: BitmapPool::new(PoolKind::InboundAtu, reg::NUM_IB_WINDOWS),
            msi: MsiAllocator::new(),
            edma: EdmaChannels::new(config.soc.num_edma),
            funcs: FunctionTable::new(config.soc.func_offset),
            bars: BarMap::default(),
            soc: config.soc,
        })
    }

    pub fn features(&self) -> ModeFeatures {
        self.mode.features()
    }

    /// Program mode, lane width and the link state-change interrupts.
    pub fn init(&mut self) -> Result<()> {
        let mut ctrl = self.io.read_app(reg::PCIE_LTSSM_CTRL);
        ctrl &= !reg::DEVICE_TYPE_MASK;
        ctrl |= self.mode.device_type_bits();
        self.io.write_app(reg::PCIE_LTSSM_CTRL, ctrl);

        link::set_link_width(&mut self.io, self.lanes)?;
        link::link_int_enable(&mut self.io);

        if !self.mode.is_endpoint() {
            // the core resets with a device class; advertise a bridge
            self.dbi_ro_wr(|io| {
                io.write_dbi(reg::PCIE_TYPE1_CLASS_CODE_REV_ID_REG, 0x0604_0001);
            });
            // the root port's own BARs stay out of the address map
            self.io
                .write_mgmt(reg::PCIE_RC_BAR_CONF, reg::SUNXI_PCIE_BAR_CFG_CTRL_DISABLED);
        }

        info!(
            "pcie: init {} x{} gen{}",
            if self.mode.is_endpoint() { "ep" } else { "rc" },
            self.lanes,
            self.link_gen
        );
        Ok(())
    }

    fn dbi_ro_wr<F: FnOnce(&mut A)>(&mut self, f: F) {
        let misc = self.io.read_dbi(reg::PCIE_MISC_CONTROL_1_CFG);
        self.io
            .write_dbi(reg::PCIE_MISC_CONTROL_1_CFG, misc | reg::PCIE_DBI_RO_WR_EN);
        f(&mut self.io);
        let misc = self.io.read_dbi(reg::PCIE_MISC_CONTROL_1_CFG);
        self.io
            .write_dbi(reg::PCIE_MISC_CONTROL_1_CFG, misc & !reg::PCIE_DBI_RO_WR_EN);
    }

    // ---- link ----

    /// Drive the LTSSM to link-up. Fails with `LinkTrainingTimeout` after
    /// the bounded retry budget; no automatic re-train beyond it.
    pub fn establish_link(&mut self) -> Result<()> {
        if self.link_state == LinkState::Up && link::link_is_up(&mut self.io) {
            return Ok(());
        }
        self.link_state = LinkState::Training;
        link::ltssm_enable(&mut self.io);
        match link::wait_for_link(&mut self.io) {
            Ok(()) => {
                self.link_state = LinkState::Up;
                Ok(())
            }
            Err(err) => {
                self.link_state = LinkState::Error;
                Err(err)
            }
        }
    }

    /// Re-sample the status register; a previously-up link whose status
    /// bits dropped moves to `Down`.
    pub fn link_state(&mut self) -> LinkState {
        if self.link_state == LinkState::Up && !link::link_is_up(&mut self.io) {
            self.link_state = LinkState::Down;
        }
        self.link_state
    }

    pub fn link_is_up(&mut self) -> bool {
        self.link_state() == LinkState::Up
    }

    /// Directed speed change to the configured target generation. Only
    /// attempted on an up link; failure is non-fatal and the link stays
    /// up at its previous speed.
    pub fn negotiate_speed(&mut self) -> Result<()> {
        if self.link_state() != LinkState::Up {
            return Err(PcieError::InvalidArgument {
                what: "speed negotiation requires an up link",
            });
        }
        link::negotiate_speed(&mut self.io, self.link_gen)
    }

    // ---- translation windows ----

    /// Allocate and program an outbound window. Region indices are handed
    /// out lowest-first; since the hardware resolves overlapping matches
    /// by lowest index, configure windows in descending priority order.
    pub fn configure_outbound(
        &mut self,
        region_type: AtuRegionType,
        cpu_base: u64,
        cpu_limit: u64,
        pci_target: u64,
        func_no: Option<u8>,
    ) -> Result<WindowHandle> {
        let region = self.ob_pool.acquire()?;
        let cpu_base = self.fixup_cpu_addr(cpu_base);
        let cpu_limit = self.fixup_cpu_addr(cpu_limit);
        match atu::program_outbound(
            &mut self.io,
            region,
            region_type,
            cpu_base,
            cpu_limit,
            pci_target,
            func_no,
        ) {
            Ok(()) => Ok(WindowHandle {
                region,
                direction: AtuDirection::Outbound,
            }),
            Err(err) => {
                // nothing was enabled; the index may go straight back
                let _ = self.ob_pool.release(region);
                Err(err)
            }
        }
    }

    pub fn configure_inbound(
        &mut self,
        region_type: AtuRegionType,
        pci_base: u64,
        pci_limit: u64,
        cpu_target: u64,
        func_no: Option<u8>,
        match_by_function: bool,
    ) -> Result<WindowHandle> {
        let region = self.ib_pool.acquire()?;
        match atu::program_inbound(
            &mut self.io,
            region,
            region_type,
            pci_base,
            pci_limit,
            cpu_target,
            func_no,
            match_by_function,
        ) {
            Ok(()) => Ok(WindowHandle {
                region,
                direction: AtuDirection::Inbound,
            }),
            Err(err) => {
                let _ = self.ib_pool.release(region);
                Err(err)
            }
        }
    }

    /// Disable the region in hardware, then release its index. The order
    /// matters: the index only becomes reusable once the region has
    /// stopped matching.
    pub fn disable_window(&mut self, handle: WindowHandle) -> Result<()> {
        atu::disable_region(&mut self.io, handle.direction, handle.region);
        match handle.direction {
            AtuDirection::Outbound => self.ob_pool.release(handle.region),
            AtuDirection::Inbound => self.ib_pool.release(handle.region),
        }
    }

    /// Register-level view of a window, mainly for verification.
    pub fn window_config(&mut self, handle: WindowHandle) -> WindowConfig {
        atu::read_region(&mut self.io, handle.direction, handle.region)
    }

    fn fixup_cpu_addr(&self, addr: u64) -> u64 {
        // quirky variants decode the slave aperture bus-relative, below
        // the CPU alias at PCIE_CPU_BASE
        if self.soc.cpu_pcie_addr_quirk {
            addr.wrapping_sub(reg::PCIE_CPU_BASE as u64)
        } else {
            addr
        }
    }

    // ---- endpoint functions ----

    pub fn add_function(&mut self, func_no: u8) -> Result<()> {
        self.require_endpoint()?;
        self.funcs.add(EpFunction {
            func_no,
            msi_cap: reg::SUNXI_PCIE_EP_MSI_CTRL_REG,
            msix_cap: 0,
        })?;
        // scrub whatever the last owner left in this function's BARs
        let conf = self.funcs.conf_select(func_no);
        for bar_no in 0..reg::PCIE_BAR_NUM as u8 {
            bar::clear_ep_bar(&mut self.io, conf, func_no, bar_no, false);
        }
        debug!("pcie: function {} registered", func_no);
        Ok(())
    }

    /// Byte offset of the function's config space in the function-indexed
    /// window.
    pub fn func_conf_select(&self, func_no: u8) -> u32 {
        self.funcs.conf_select(func_no)
    }

    fn require_endpoint(&self) -> Result<()> {
        if self.mode.is_endpoint() {
            Ok(())
        } else {
            Err(PcieError::InvalidArgument {
                what: "endpoint-only operation in root-complex mode",
            })
        }
    }

    fn require_function(&self, func_no: u8) -> Result<&EpFunction> {
        self.funcs.get(func_no).ok_or(PcieError::InvalidArgument {
            what: "function not registered",
        })
    }

    // ---- BAR binding ----

    /// Bind a BAR to a fresh inbound BAR-match window backed by
    /// `cpu_addr`. 64-bit BARs take two consecutive slots.
    pub fn bind_bar(
        &mut self,
        func_no: u8,
        bar_no: u8,
        size: u64,
        flags: BarFlags,
        cpu_addr: u64,
    ) -> Result<BarHandle> {
        self.require_endpoint()?;
        self.require_function(func_no)?;
        bar::validate_bar(bar_no, size, flags, cpu_addr)?;
        let wide = flags.contains(BarFlags::MEM64);
        self.bars.check_free(bar_no, wide)?;

        let region = self.ib_pool.acquire()?;
        if let Err(err) =
            atu::program_inbound_bar_match(&mut self.io, region, bar_no, func_no, cpu_addr)
        {
            let _ = self.ib_pool.release(region);
            return Err(err);
        }

        let conf = self.funcs.conf_select(func_no);
        bar::program_ep_bar(&mut self.io, conf, func_no, bar_no, size, flags);
        self.bars.bind(BarBinding {
            func_no,
            bar_no,
            size,
            flags,
            region,
            cpu_addr,
        })?;
        Ok(BarHandle { func_no, bar_no })
    }

    /// Renegotiate a bound BAR's size through the resizable-BAR
    /// capability. On `UnsupportedResize` nothing has been written.
    pub fn resize_bar(&mut self, handle: BarHandle, new_size: u64) -> Result<()> {
        self.require_endpoint()?;
        let binding = *self
            .bars
            .get(handle.bar_no)
            .ok_or(PcieError::InvalidArgument {
                what: "BAR is not bound",
            })?;
        let rebar_cap = self.soc.rebar_cap.ok_or(PcieError::UnsupportedResize {
            bar: handle.bar_no,
            size: new_size,
        })?;
        bar::rebar_resize(&mut self.io, rebar_cap, handle.bar_no, new_size)?;

        // mirror the negotiated size into the DBI2 mask and bookkeeping
        let conf = self.funcs.conf_select(handle.func_no);
        bar::program_ep_bar(
            &mut self.io,
            conf,
            handle.func_no,
            handle.bar_no,
            new_size,
            binding.flags,
        );
        if let Some(binding) = self.bars.get_mut(handle.bar_no) {
            binding.size = new_size;
        }
        Ok(())
    }

    /// Disable the backing window first, then free the slot(s).
    pub fn unbind_bar(&mut self, handle: BarHandle) -> Result<()> {
        self.require_endpoint()?;
        let binding = self.bars.unbind(handle.bar_no)?;
        atu::disable_region(&mut self.io, AtuDirection::Inbound, binding.region);
        self.ib_pool.release(binding.region)?;
        let conf = self.funcs.conf_select(handle.func_no);
        bar::clear_ep_bar(
            &mut self.io,
            conf,
            handle.func_no,
            handle.bar_no,
            binding.flags.contains(BarFlags::MEM64),
        );
        Ok(())
    }

    // ---- MSI ----

    /// Allocate a vector for `func_no`, bounded by the function's MMC
    /// field. Pure bookkeeping until `enable_vector`.
    pub fn allocate_vector(&mut self, func_no: u8) -> Result<VectorHandle> {
        self.require_endpoint()?;
        let func = *self.require_function(func_no)?;
        let conf = self.funcs.conf_select(func_no);
        let budget = MsiAllocator::mmc_budget(&mut self.io, conf, func.msi_cap);
        self.msi.allocate(func_no, budget)
    }

    pub fn enable_vector(
        &mut self,
        handle: VectorHandle,
        msi_addr: u64,
        msi_data: u16,
    ) -> Result<()> {
        let func = *self.require_function(handle.func_no)?;
        let conf = self.funcs.conf_select(handle.func_no);
        self.msi
            .enable(&mut self.io, handle, conf, func.msi_cap, msi_addr, msi_data);
        Ok(())
    }

    pub fn mask_vector(&mut self, handle: VectorHandle) {
        self.msi.mask(&mut self.io, handle);
    }

    pub fn unmask_vector(&mut self, handle: VectorHandle) {
        self.msi.unmask(&mut self.io, handle);
    }

    pub fn free_vector(&mut self, handle: VectorHandle) -> Result<()> {
        self.msi.free(&mut self.io, handle)
    }

    // ---- EDMA ----

    pub fn acquire_edma(&mut self, direction: EdmaDirection) -> Result<EdmaChannel> {
        self.edma.acquire(direction)
    }

    pub fn release_edma(&mut self, channel: EdmaChannel) -> Result<()> {
        self.edma.release(channel)
    }

    // ---- error monitor ----

    pub fn ecc_pending(&mut self) -> Result<bool> {
        self.require_ecc()?;
        Ok(ecc::pending(&mut self.io))
    }

    /// Atomic (from the driver's view) read-then-clear of the RASDP
    /// counters; serialized by the exclusive borrow.
    pub fn ecc_read_and_clear(&mut self) -> Result<EccReport> {
        self.require_ecc()?;
        Ok(ecc::read_and_clear(&mut self.io))
    }

    fn require_ecc(&self) -> Result<()> {
        if self.soc.has_ecc {
            Ok(())
        } else {
            Err(PcieError::InvalidArgument {
                what: "variant has no RASDP capability",
            })
        }
    }

    // ---- teardown ----

    /// Disable every live resource (BAR bindings, translation regions, MSI
    /// delivery) and take the link down. Called at device removal; the
    /// instance can be re-initialized afterwards.
    pub fn teardown(&mut self) {
        for binding in self.bars.drain() {
            let conf = self.funcs.conf_select(binding.func_no);
            bar::clear_ep_bar(
                &mut self.io,
                conf,
                binding.func_no,
                binding.bar_no,
                binding.flags.contains(BarFlags::MEM64),
            );
        }
        for region in 0..self.ob_pool.capacity() {
            if self.ob_pool.is_allocated(region) {
                atu::disable_region(&mut self.io, AtuDirection::Outbound, region);
                let _ = self.ob_pool.release(region);
            }
        }
        for region in 0..self.ib_pool.capacity() {
            if self.ib_pool.is_allocated(region) {
                atu::disable_region(&mut self.io, AtuDirection::Inbound, region);
                let _ = self.ib_pool.release(region);
            }
        }
        for group in 0..reg::MAX_MSI_CTRLS as u32 {
            self.io.write_dbi(reg::msi_intr_enable(group), 0);
            self.io.write_dbi(reg::msi_intr_mask(group), 0);
        }
        self.msi = MsiAllocator::new();
        self.edma = EdmaChannels::new(self.soc.num_edma);
        self.funcs = FunctionTable::new(self.soc.func_offset);
        link::ltssm_disable(&mut self.io);
        self.link_state = LinkState::Down;
        info!("pcie: controller torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::mock::{MockIo, Space};

    fn ep_controller() -> SunxiPcie<MockIo> {
        SunxiPcie::new(
            MockIo::new(),
            PcieConfig {
                mode: Mode::Endpoint(EpMode),
                lanes: 1,
                link_gen: 2,
                soc: SocData {
                    rebar_cap: Some(0x270),
                    ..SocData::default()
                },
            },
        )
        .unwrap()
    }

    fn rc_controller() -> SunxiPcie<MockIo> {
        SunxiPcie::new(
            MockIo::new(),
            PcieConfig {
                mode: Mode::RootComplex(RcMode),
                lanes: 2,
                link_gen: 3,
                soc: SocData::default(),
            },
        )
        .unwrap()
    }

    fn link_up(pcie: &mut SunxiPcie<MockIo>) {
        pcie.io.set(
            Space::App,
            reg::PCIE_LINK_STAT,
            reg::SMLH_LINK_UP | reg::RDLH_LINK_UP,
        );
        pcie.establish_link().unwrap();
    }

    #[test]
    fn init_programs_mode_and_width() {
        let mut pcie = rc_controller();
        // stale root-port BAR routing from a previous owner
        pcie.io.set(Space::Dbi, reg::PCIE_RC_BAR_CONF, 0x5);
        pcie.init().unwrap();
        let ltssm = pcie.io.get(Space::App, reg::PCIE_LTSSM_CTRL);
        assert_eq!(ltssm & reg::DEVICE_TYPE_MASK, reg::DEVICE_TYPE_RC);
        assert_eq!(
            pcie.io.get(Space::Dbi, reg::PCIE_PORT_LINK_CONTROL) & reg::PORT_LINK_MODE_MASK,
            reg::PORT_LINK_MODE_2_LANES
        );
        // write-enable window was closed again
        assert_eq!(
            pcie.io.get(Space::Dbi, reg::PCIE_MISC_CONTROL_1_CFG) & reg::PCIE_DBI_RO_WR_EN,
            0
        );
        assert_eq!(
            pcie.io.get(Space::Dbi, reg::PCIE_TYPE1_CLASS_CODE_REV_ID_REG),
            0x0604_0001
        );
        assert_eq!(
            pcie.io.read_mgmt(reg::PCIE_RC_BAR_CONF),
            reg::SUNXI_PCIE_BAR_CFG_CTRL_DISABLED
        );
    }

    #[test]
    fn link_comes_up_then_drops() {
        let mut pcie = rc_controller();
        link_up(&mut pcie);
        assert!(pcie.link_is_up());

        pcie.io.set(Space::App, reg::PCIE_LINK_STAT, 0);
        assert_eq!(pcie.link_state(), LinkState::Down);
    }

    #[test]
    fn training_timeout_moves_to_error_state() {
        let mut pcie = rc_controller();
        assert_eq!(
            pcie.establish_link(),
            Err(PcieError::LinkTrainingTimeout { retries: 20 })
        );
        assert_eq!(pcie.link_state(), LinkState::Error);
    }

    #[test]
    fn speed_negotiation_needs_an_up_link_and_failure_keeps_it_up() {
        let mut pcie = rc_controller();
        assert!(pcie.negotiate_speed().is_err());

        link_up(&mut pcie);
        // the stored trigger bit never clears in the mock: timeout
        assert_eq!(
            pcie.negotiate_speed(),
            Err(PcieError::SpeedNegotiationFailed { target_gen: 3 })
        );
        assert!(pcie.link_is_up());
    }

    #[test]
    fn window_lifecycle_releases_the_index() {
        let mut pcie = rc_controller();
        let handle = pcie
            .configure_outbound(AtuRegionType::Mem, 0x2200_0000, 0x22ff_ffff, 0x0, None)
            .unwrap();
        assert_eq!(handle.region(), 0);
        assert!(pcie.window_config(handle).enabled);

        pcie.disable_window(handle).unwrap();
        assert!(!pcie.window_config(handle).enabled);
        // freed index is immediately reusable
        let again = pcie
            .configure_outbound(AtuRegionType::Mem, 0x2300_0000, 0x23ff_ffff, 0x0, None)
            .unwrap();
        assert_eq!(again.region(), 0);
    }

    #[test]
    fn window_exhaustion_is_recoverable() {
        let mut pcie = rc_controller();
        let mut handles = alloc::vec::Vec::new();
        for i in 0..reg::NUM_OB_WINDOWS as u64 {
            handles.push(
                pcie.configure_outbound(
                    AtuRegionType::Mem,
                    0x2000_0000 + i * 0x10_0000,
                    0x2000_0000 + i * 0x10_0000 + 0xf_ffff,
                    0,
                    None,
                )
                .unwrap(),
            );
        }
        assert_eq!(
            pcie.configure_outbound(AtuRegionType::Mem, 0x3000_0000, 0x300f_ffff, 0, None),
            Err(PcieError::ResourceExhausted {
                pool: PoolKind::OutboundAtu
            })
        );
        pcie.disable_window(handles.pop().unwrap()).unwrap();
        pcie.configure_outbound(AtuRegionType::Mem, 0x3000_0000, 0x300f_ffff, 0, None)
            .unwrap();
    }

    #[test]
    fn failed_programming_returns_the_index() {
        let mut pcie = rc_controller();
        // inverted range: program fails, index 0 must not leak
        assert!(pcie
            .configure_outbound(AtuRegionType::Mem, 0x2200_0000, 0x2100_0000, 0, None)
            .is_err());
        let handle = pcie
            .configure_outbound(AtuRegionType::Mem, 0x2200_0000, 0x22ff_ffff, 0, None)
            .unwrap();
        assert_eq!(handle.region(), 0);
    }

    #[test]
    fn endpoint_ops_are_rejected_in_rc_mode() {
        let mut pcie = rc_controller();
        assert!(pcie.add_function(0).is_err());
        assert!(pcie
            .bind_bar(0, 0, 0x1000, BarFlags::MEM32, 0x4000_0000)
            .is_err());
        assert!(pcie.allocate_vector(0).is_err());
    }

    #[test]
    fn bar_bind_unbind_frees_window_and_slots() {
        let mut pcie = ep_controller();
        pcie.add_function(0).unwrap();

        let handle = pcie
            .bind_bar(0, 2, 0x10_0000, BarFlags::MEM64 | BarFlags::PREFETCH, 0x4000_0000)
            .unwrap();
        // slot 3 is consumed by the 64-bit pair
        assert!(pcie
            .bind_bar(0, 3, 0x1000, BarFlags::MEM32, 0x5000_0000)
            .is_err());
        // the inbound window is live in BAR-match mode
        let cr2 = pcie.io.get(Space::Dbi, reg::atu_cr2_inbound(0));
        assert_ne!(cr2 & reg::PCIE_ATU_ENABLE, 0);
        assert_ne!(cr2 & reg::PCIE_ATU_BAR_MODE_ENABLE, 0);

        pcie.unbind_bar(handle).unwrap();
        assert_eq!(pcie.io.get(Space::Dbi, reg::atu_cr2_inbound(0)), 0);
        // both slots free again
        pcie.bind_bar(0, 3, 0x1000, BarFlags::MEM32, 0x5000_0000)
            .unwrap();
        pcie.bind_bar(0, 2, 0x1000, BarFlags::MEM32, 0x6000_0000)
            .unwrap();
    }

    #[test]
    fn resize_rejected_sizes_leave_control_untouched() {
        let mut pcie = ep_controller();
        pcie.add_function(0).unwrap();
        let cap = 0x270;
        pcie.io
            .set(Space::Dbi, cap + reg::PCI_REBAR_CAP, 1 << 9); // 32 MiB only
        pcie.io.set(
            Space::Dbi,
            cap + reg::PCI_REBAR_CTRL,
            1 << reg::PCI_REBAR_CTRL_NBAR_SHIFT,
        );

        let handle = pcie
            .bind_bar(0, 0, 0x10_0000, BarFlags::MEM32, 0x4000_0000)
            .unwrap();
        assert_eq!(
            pcie.resize_bar(handle, 0x40_0000),
            Err(PcieError::UnsupportedResize {
                bar: 0,
                size: 0x40_0000
            })
        );
        assert_eq!(
            pcie.io.get(Space::Dbi, cap + reg::PCI_REBAR_CTRL),
            1 << reg::PCI_REBAR_CTRL_NBAR_SHIFT
        );

        pcie.resize_bar(handle, 0x200_0000).unwrap();
        // the DBI2 mask follows the negotiated size
        assert_eq!(
            pcie.io
                .get(Space::Dbi, reg::PCIE_DBI2_BASE + reg::bar_reg(0)),
            0x1ff_ffff | reg::BAR_ENABLE
        );
    }

    #[test]
    fn msi_budget_is_enforced_through_the_controller() {
        let mut pcie = ep_controller();
        pcie.add_function(0).unwrap();
        // MMC = 1: two vectors
        pcie.io.set(
            Space::Dbi,
            reg::SUNXI_PCIE_EP_MSI_CTRL_REG,
            1 << reg::SUNXI_PCIE_EP_MSI_CTRL_MMC_OFFSET,
        );

        let v0 = pcie.allocate_vector(0).unwrap();
        let _v1 = pcie.allocate_vector(0).unwrap();
        assert_eq!(
            pcie.allocate_vector(0),
            Err(PcieError::ResourceExhausted {
                pool: PoolKind::Msi
            })
        );

        pcie.enable_vector(v0, 0x8000_0000, 0x10).unwrap();
        assert_eq!(pcie.io.get(Space::Dbi, reg::msi_intr_enable(0)) & 1, 1);
        pcie.free_vector(v0).unwrap();
        pcie.allocate_vector(0).unwrap();
    }

    #[test]
    fn ecc_is_gated_on_the_variant_flag() {
        let mut pcie = rc_controller();
        assert!(pcie.ecc_read_and_clear().is_err());

        let mut pcie = SunxiPcie::new(
            MockIo::new(),
            PcieConfig {
                mode: Mode::RootComplex(RcMode),
                lanes: 1,
                link_gen: 1,
                soc: SocData {
                    has_ecc: true,
                    ..SocData::default()
                },
            },
        )
        .unwrap();
        pcie.io
            .set(Space::Dbi, reg::PCIE_RASDP_CORR_COUNTER_REPORT_OFF, 2);
        let report = pcie.ecc_read_and_clear().unwrap();
        assert_eq!(report.correctable, 2);
    }

    #[test]
    fn teardown_disables_live_regions() {
        let mut pcie = rc_controller();
        let handle = pcie
            .configure_outbound(AtuRegionType::Mem, 0x2200_0000, 0x22ff_ffff, 0, None)
            .unwrap();
        pcie.teardown();
        assert!(!pcie.window_config(handle).enabled);
        // pool was drained: the same index is allocatable again
        assert_eq!(
            pcie.configure_outbound(AtuRegionType::Mem, 0x2200_0000, 0x22ff_ffff, 0, None)
                .unwrap()
                .region(),
            0
        );
    }

    #[test]
    fn teardown_resets_endpoint_state() {
        let mut pcie = ep_controller();
        pcie.add_function(0).unwrap();
        pcie.bind_bar(0, 0, 0x1000, BarFlags::MEM32, 0x4000_0000)
            .unwrap();
        let vector = pcie.allocate_vector(0).unwrap();
        pcie.enable_vector(vector, 0x8000_0000, 0x10).unwrap();
        pcie.mask_vector(vector);

        pcie.teardown();
        // delivery off, BAR shadow disabled, inbound region dead
        assert_eq!(pcie.io.get(Space::Dbi, reg::msi_intr_enable(0)), 0);
        assert_eq!(pcie.io.get(Space::Dbi, reg::msi_intr_mask(0)), 0);
        assert_eq!(
            pcie.io.get(Space::Dbi, reg::PCIE_DBI2_BASE + reg::bar_reg(0)),
            0
        );
        assert_eq!(pcie.io.get(Space::Dbi, reg::atu_cr2_inbound(0)), 0);

        // allocators and the function table start over
        pcie.add_function(0).unwrap();
        pcie.bind_bar(0, 0, 0x1000, BarFlags::MEM32, 0x4000_0000)
            .unwrap();
        pcie.allocate_vector(0).unwrap();
        pcie.acquire_edma(EdmaDirection::Read).unwrap();
    }
}
