//! RASDP (datapath ECC) error monitor.
//!
//! Counters are monotonic between clears. `read_and_clear` performs the
//! read-then-clear pair back to back with no intervening register access;
//! callers serialize invocations through the controller's exclusive borrow
//! so an interleaved increment cannot be lost.

use log::warn;

use crate::access::PcieIo;
use crate::reg;

/// Snapshot of the error counters and last captured locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EccReport {
    pub correctable: u32,
    pub uncorrectable: u32,
    pub correctable_location: u32,
    pub uncorrectable_location: u32,
}

impl EccReport {
    pub fn any(&self) -> bool {
        self.correctable != 0 || self.uncorrectable != 0
    }
}

/// Aggregated error-pending bits, for interrupt-driven invocation.
pub fn pending<A: PcieIo>(io: &mut A) -> bool {
    io.read_app(reg::PCIE_SII_INT_RES2) & reg::RASDP_ERR_PENDING != 0
}

/// Read both counters and locations, then write the clear bit.
pub fn read_and_clear<A: PcieIo>(io: &mut A) -> EccReport {
    let report = EccReport {
        correctable: io.read_dbi(reg::PCIE_RASDP_CORR_COUNTER_REPORT_OFF),
        uncorrectable: io.read_dbi(reg::PCIE_RASDP_UNCORR_COUNTER_REPORT_OFF),
        correctable_location: io.read_dbi(reg::PCIE_RASDP_CORR_ERROR_LOCATION_OFF),
        uncorrectable_location: io.read_dbi(reg::PCIE_RASDP_UNCORR_ERROR_LOCATION_OFF),
    };
    io.write_dbi(reg::PCIE_RASDP_ERROR_MODE_CLEAR_OFF, 1);

    if report.uncorrectable != 0 {
        warn!(
            "rasdp: {} uncorrectable errors, last at {:#x}",
            report.uncorrectable, report.uncorrectable_location
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::mock::{MockIo, Space};

    #[test]
    fn report_snapshots_counters_and_writes_clear() {
        let mut io = MockIo::new();
        io.set(Space::Dbi, reg::PCIE_RASDP_CORR_COUNTER_REPORT_OFF, 5);
        io.set(Space::Dbi, reg::PCIE_RASDP_UNCORR_COUNTER_REPORT_OFF, 1);
        io.set(Space::Dbi, reg::PCIE_RASDP_UNCORR_ERROR_LOCATION_OFF, 0x44);

        let report = read_and_clear(&mut io);
        assert_eq!(report.correctable, 5);
        assert_eq!(report.uncorrectable, 1);
        assert_eq!(report.uncorrectable_location, 0x44);
        assert!(report.any());
        assert_eq!(io.get(Space::Dbi, reg::PCIE_RASDP_ERROR_MODE_CLEAR_OFF), 1);
    }

    #[test]
    fn pending_tracks_the_aggregated_bits() {
        let mut io = MockIo::new();
        assert!(!pending(&mut io));
        io.set(Space::App, reg::PCIE_SII_INT_RES2, 1 << 10);
        assert!(pending(&mut io));
    }
}
