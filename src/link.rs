//! LTSSM control and the bounded link-up / speed-change polls.

use log::{debug, warn};

use crate::access::PcieIo;
use crate::err::{PcieError, Result};
use crate::reg;

/// Link state, driven only by the training state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Down,
    Training,
    Up,
    Error,
}

/// Supported link widths on this controller.
pub fn lane_mode_bits(lanes: u32) -> Result<(u32, u32)> {
    match lanes {
        1 => Ok((reg::PORT_LINK_MODE_1_LANES, reg::PORT_LOGIC_LINK_WIDTH_1_LANES)),
        2 => Ok((reg::PORT_LINK_MODE_2_LANES, reg::PORT_LOGIC_LINK_WIDTH_2_LANES)),
        4 => Ok((reg::PORT_LINK_MODE_4_LANES, reg::PORT_LOGIC_LINK_WIDTH_4_LANES)),
        _ => Err(PcieError::InvalidArgument {
            what: "lane count must be 1, 2 or 4",
        }),
    }
}

/// Program the negotiated lane count into the port-link and gen2 control
/// registers. Done before training is enabled.
pub fn set_link_width<A: PcieIo>(io: &mut A, lanes: u32) -> Result<()> {
    let (mode, width) = lane_mode_bits(lanes)?;

    let mut val = io.read_dbi(reg::PCIE_PORT_LINK_CONTROL);
    val &= !reg::PORT_LINK_MODE_MASK;
    val |= mode;
    io.write_dbi(reg::PCIE_PORT_LINK_CONTROL, val);

    let mut val = io.read_dbi(reg::PCIE_LINK_WIDTH_SPEED_CONTROL);
    val &= !reg::PORT_LOGIC_LINK_WIDTH_MASK;
    val |= width;
    io.write_dbi(reg::PCIE_LINK_WIDTH_SPEED_CONTROL, val);
    Ok(())
}

pub fn ltssm_enable<A: PcieIo>(io: &mut A) {
    let val = io.read_app(reg::PCIE_LTSSM_CTRL);
    io.write_app(reg::PCIE_LTSSM_CTRL, val | reg::PCIE_LINK_TRAINING);
}

pub fn ltssm_disable<A: PcieIo>(io: &mut A) {
    let val = io.read_app(reg::PCIE_LTSSM_CTRL);
    io.write_app(reg::PCIE_LTSSM_CTRL, val & !reg::PCIE_LINK_TRAINING);
}

/// Unmask the SMLH/RDLH link state-change interrupts.
pub fn link_int_enable<A: PcieIo>(io: &mut A) {
    io.write_app(reg::PCIE_INT_ENABLE_CLR, reg::PCIE_LINK_INT_EN);
}

/// Both the physical layer and the data-link layer report up.
pub fn link_is_up<A: PcieIo>(io: &mut A) -> bool {
    let stat = io.read_app(reg::PCIE_LINK_STAT);
    stat & (reg::SMLH_LINK_UP | reg::RDLH_LINK_UP)
        == (reg::SMLH_LINK_UP | reg::RDLH_LINK_UP)
}

/// Poll for link-up with the fixed retry budget. Every retry yields for
/// 90-100 ms; exceeding the budget is reported, never silently retried.
pub fn wait_for_link<A: PcieIo>(io: &mut A) -> Result<()> {
    for retry in 0..reg::LINK_WAIT_MAX_RETRIES {
        if link_is_up(io) {
            debug!("link: up after {} polls", retry + 1);
            return Ok(());
        }
        io.delay_us(reg::LINK_WAIT_USLEEP_MIN, reg::LINK_WAIT_USLEEP_MAX);
    }
    warn!(
        "link: no SMLH/RDLH up within {} retries",
        reg::LINK_WAIT_MAX_RETRIES
    );
    Err(PcieError::LinkTrainingTimeout {
        retries: reg::LINK_WAIT_MAX_RETRIES,
    })
}

/// Directed speed change to `target_gen`. Only meaningful on an up link;
/// on timeout the link keeps running at its previous speed and the caller
/// gets `SpeedNegotiationFailed`.
pub fn negotiate_speed<A: PcieIo>(io: &mut A, target_gen: u8) -> Result<()> {
    if !(1..=4).contains(&target_gen) {
        return Err(PcieError::InvalidArgument {
            what: "link generation must be 1..=4",
        });
    }

    let mut ctl2 = io.read_dbi(reg::LINK_CONTROL2_LINK_STATUS2);
    ctl2 &= !reg::PCI_EXP_LNKCTL2_TLS;
    ctl2 |= target_gen as u32;
    io.write_dbi(reg::LINK_CONTROL2_LINK_STATUS2, ctl2);

    let val = io.read_dbi(reg::PCIE_LINK_WIDTH_SPEED_CONTROL);
    io.write_dbi(
        reg::PCIE_LINK_WIDTH_SPEED_CONTROL,
        val | reg::PORT_LOGIC_SPEED_CHANGE,
    );

    // hardware clears the trigger bit once the change completes
    for _ in 0..reg::LINK_WAIT_MAX_RETRIES {
        let val = io.read_dbi(reg::PCIE_LINK_WIDTH_SPEED_CONTROL);
        if val & reg::PORT_LOGIC_SPEED_CHANGE == 0 {
            debug!("link: speed change to gen{} done", target_gen);
            return Ok(());
        }
        io.delay_us(reg::SPEED_CHANGE_USLEEP_MIN, reg::SPEED_CHANGE_USLEEP_MAX);
    }

    warn!("link: speed change to gen{} timed out", target_gen);
    Err(PcieError::SpeedNegotiationFailed { target_gen })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::mock::{MockIo, Space};

    const BOTH_UP: u32 = reg::SMLH_LINK_UP | reg::RDLH_LINK_UP;

    #[test]
    fn first_poll_success_takes_one_step() {
        let mut io = MockIo::new();
        io.set(Space::App, reg::PCIE_LINK_STAT, BOTH_UP);
        wait_for_link(&mut io).unwrap();
        assert_eq!(io.delays, 0);
    }

    #[test]
    fn one_link_layer_alone_is_not_up() {
        let mut io = MockIo::new();
        io.set(Space::App, reg::PCIE_LINK_STAT, reg::SMLH_LINK_UP);
        assert!(!link_is_up(&mut io));
        io.set(Space::App, reg::PCIE_LINK_STAT, reg::RDLH_LINK_UP);
        assert!(!link_is_up(&mut io));
    }

    #[test]
    fn timeout_after_exactly_twenty_retries() {
        let mut io = MockIo::new();
        assert_eq!(
            wait_for_link(&mut io),
            Err(PcieError::LinkTrainingTimeout { retries: 20 })
        );
        assert_eq!(io.delays, 20);
    }

    #[test]
    fn link_comes_up_mid_poll() {
        let mut io = MockIo::new();
        io.script_reads(
            Space::App,
            reg::PCIE_LINK_STAT,
            &[0, 0, reg::SMLH_LINK_UP, BOTH_UP],
        );
        wait_for_link(&mut io).unwrap();
        assert_eq!(io.delays, 3);
    }

    #[test]
    fn speed_change_success_clears_state() {
        let mut io = MockIo::new();
        // trigger bit reads back set once, then hardware clears it
        io.script_reads(
            Space::Dbi,
            reg::PCIE_LINK_WIDTH_SPEED_CONTROL,
            &[0, reg::PORT_LOGIC_SPEED_CHANGE, 0],
        );
        negotiate_speed(&mut io, 3).unwrap();
        assert_eq!(
            io.get(Space::Dbi, reg::LINK_CONTROL2_LINK_STATUS2)
                & reg::PCI_EXP_LNKCTL2_TLS,
            3
        );
    }

    #[test]
    fn speed_change_timeout_is_nonfatal_error() {
        let mut io = MockIo::new();
        // the stored register keeps the trigger bit: never completes
        assert_eq!(
            negotiate_speed(&mut io, 2),
            Err(PcieError::SpeedNegotiationFailed { target_gen: 2 })
        );
        assert_eq!(io.delays, reg::LINK_WAIT_MAX_RETRIES);
    }

    #[test]
    fn lane_width_programs_both_registers() {
        let mut io = MockIo::new();
        set_link_width(&mut io, 2).unwrap();
        assert_eq!(
            io.get(Space::Dbi, reg::PCIE_PORT_LINK_CONTROL) & reg::PORT_LINK_MODE_MASK,
            reg::PORT_LINK_MODE_2_LANES
        );
        assert_eq!(
            io.get(Space::Dbi, reg::PCIE_LINK_WIDTH_SPEED_CONTROL)
                & reg::PORT_LOGIC_LINK_WIDTH_MASK,
            reg::PORT_LOGIC_LINK_WIDTH_2_LANES
        );
        assert!(set_link_width(&mut io, 3).is_err());
    }
}
