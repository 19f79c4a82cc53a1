//! Runs a command scenario through the engine against the simulator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use embedded_hal::delay::DelayNs;
use motorbank::{HalfBridge, Level, MotorControl};
use motorbank_protocol::{BankStatus, PwmChannel, Response};
use tracing::{debug, info, warn};

use crate::config::HostConfig;
use crate::sim::SimDriver;

/// Blocks the worker thread, or returns at once when not in realtime mode.
pub struct StdDelay {
    realtime: bool,
}

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        if self.realtime {
            std::thread::sleep(Duration::from_nanos(ns.into()));
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub steps: usize,
    pub faults: usize,
    pub aborted: bool,
    pub pwm_writes: usize,
    pub driven_bridges: usize,
    pub duties: [u8; 3],
}

pub fn run(cfg: &HostConfig, abort: &AtomicBool) -> Result<Summary> {
    let driver = SimDriver::new(cfg.faults.clone());
    let mut control = MotorControl::new(driver, cfg.controller).with_abort(abort);
    let mut delay = StdDelay { realtime: cfg.realtime() };
    let mut summary = Summary::default();

    for (i, cmd) in cfg.scenario().iter().enumerate() {
        let step = i + 1;
        if abort.load(Ordering::Relaxed) {
            warn!("Aborted before step {}", step);
            summary.aborted = true;
            break;
        }
        let reply = control
            .execute(cmd, &mut delay)
            .with_context(|| format!("step {} ({:?}) failed", step, cmd))?;
        summary.steps = step;

        match reply {
            None => debug!("step {}: {:?}", step, cmd),
            Some(Response::Done) => info!("step {}: {:?} done", step, cmd),
            Some(Response::Aborted) => {
                warn!("step {}: {:?} aborted", step, cmd);
                summary.aborted = true;
            }
            Some(Response::Status(status)) => log_status(&status),
            Some(Response::Fault(report)) => info!("step {}: {}", step, report),
        }

        let faults = control.take_faults();
        for report in faults.iter() {
            warn!("step {}: {}", step, report);
        }
        summary.faults += faults.len();

        if summary.aborted {
            break;
        }
    }

    let sim = control.driver();
    summary.pwm_writes = sim.pwm_writes();
    summary.driven_bridges = HalfBridge::all()
        .filter(|&hb| sim.bridge(hb).level != Level::Floating)
        .count();
    for channel in PwmChannel::ALL {
        summary.duties[channel.index()] = sim.duty(channel);
    }
    Ok(summary)
}

fn log_status(status: &BankStatus) {
    info!("motor  enabled running dir  freewheel pwm");
    for m in &status.motors {
        let pwm = m.pwm.map(|c| c.frequency_hz());
        info!(
            "{:<6} {:<7} {:<7} {:<4} {:<9} {:?}",
            m.id.to_string(),
            m.enabled,
            m.running,
            format!("{:?}", m.direction),
            format!("{:?}", m.freewheeling),
            pwm
        );
    }
    info!("channel min max ramp  manual duty state");
    for c in &status.channels {
        info!(
            "{:<7} {:<3} {:<3} {:<5} {:<6} {:<4} {:?}",
            c.channel.to_string(), c.min_duty, c.max_duty, c.use_ramp, c.manual, c.duty, c.state
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motorbank::WiringDensity;

    fn fast(src: &str) -> HostConfig {
        let mut cfg: HostConfig = toml::from_str(src).unwrap();
        cfg.realtime = Some(false);
        cfg
    }

    #[test]
    fn test_demo_ends_stopped() {
        let abort = AtomicBool::new(false);
        let summary = run(&fast(""), &abort).unwrap();
        assert_eq!(summary.steps, 10);
        assert!(!summary.aborted);
        assert_eq!(summary.faults, 0);
        assert_eq!(summary.driven_bridges, 0);
        assert_eq!(summary.duties, [0, 0, 0]);
        // Up 21..=200 and down 199..=20 plus the final 0, on three channels,
        // after the three zero writes of the reset.
        assert_eq!(summary.pwm_writes, 3 + 3 * 180 + 3 * 181);
    }

    #[test]
    fn test_injected_fault_is_collected() {
        let abort = AtomicBool::new(false);
        let cfg = fast(
            r#"
            scenario = [
              { SetEnabled = { target = { Motor = 1 }, enabled = true } },
              { SetPwm = { target = { Motor = 1 }, pwm = "Ch100Hz" } },
              { SetRamp = { target = "All", enabled = true } },
              { SetMaxDutyCycle = { target = "All", duty = 10 } },
              { Start = { motor = 1 } },
            ]

            [controller]
            density = "HighCurrent"

            [[faults]]
            after_pwm_writes = 4
            bits = 0x22
            "#,
        );
        assert_eq!(cfg.controller.density, WiringDensity::HighCurrent);
        let summary = run(&cfg, &abort).unwrap();
        assert_eq!(summary.faults, 1);
        assert_eq!(summary.driven_bridges, 4);
        assert_eq!(summary.duties[PwmChannel::Ch100Hz.index()], 10);
    }

    #[test]
    fn test_abort_flag_stops_scenario() {
        let abort = AtomicBool::new(true);
        let summary = run(&fast(""), &abort).unwrap();
        assert!(summary.aborted);
        assert_eq!(summary.steps, 0);
    }
}
