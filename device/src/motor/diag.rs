//! Driver diagnosis polling and fault reporting.

use motorbank_protocol::{FaultKind, FaultReport, MotorId};

use crate::driver::{HalfBridgeDriver, StatusWord};
use crate::error::Error;

/// Decodes the driver status word into fault reports.
#[derive(Clone, Copy, Debug)]
pub struct Diagnostics {
    ignore_open_load: bool,
}

impl Diagnostics {
    pub fn new(ignore_open_load: bool) -> Self {
        Self { ignore_open_load }
    }

    /// Poll the driver. `true` if any fault bit is set.
    pub fn check_fault<D: HalfBridgeDriver>(
        &self,
        driver: &mut D,
    ) -> Result<bool, Error<D::Error>> {
        let word = driver.read_status().map_err(Error::Driver)?;
        Ok(!word.is_clear())
    }

    /// Poll the driver, decode every active fault and clear them.
    ///
    /// An all-clear poll yields an empty report and leaves the driver alone.
    pub fn report_fault<D: HalfBridgeDriver>(
        &self,
        driver: &mut D,
        motor: Option<MotorId>,
        header: &str,
    ) -> Result<FaultReport, Error<D::Error>> {
        let word = driver.read_status().map_err(Error::Driver)?;
        let mut report = FaultReport::new(motor, header);
        if word.is_clear() {
            debug!("{} motor={:?}: no errors", header, motor);
            return Ok(report);
        }

        self.decode(word, &mut report);
        for kind in report.faults.iter() {
            warn!("{} motor={:?}: {}", header, motor, kind.label());
        }
        driver.clear_errors().map_err(Error::Driver)?;
        Ok(report)
    }

    /// Append the faults in `word` to `report` in decode order.
    pub fn decode(&self, word: StatusWord, report: &mut FaultReport) {
        for kind in FaultKind::DECODE_ORDER {
            if kind == FaultKind::OpenLoad && self.ignore_open_load {
                continue;
            }
            if word.has(kind) {
                report.push(kind);
            }
        }
    }
}
