//! Simulated half-bridge driver for the bench.

use std::convert::Infallible;

use motorbank::driver::{Frequency, HALF_BRIDGES};
use motorbank::{HalfBridge, HalfBridgeDriver, Level, StatusWord};
use motorbank_protocol::{Freewheeling, PWM_CHANNELS, PwmChannel};
use serde::Deserialize;
use tracing::{debug, trace};

/// Latch `bits` in the status word once `after_pwm_writes` duty cycles
/// have been written.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct FaultInjection {
    pub after_pwm_writes: usize,
    pub bits: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeState {
    pub level: Level,
    pub pwm: Option<PwmChannel>,
    pub freewheeling: Freewheeling,
}

impl Default for BridgeState {
    fn default() -> Self {
        Self { level: Level::Floating, pwm: None, freewheeling: Freewheeling::Active }
    }
}

pub struct SimDriver {
    bridges: [BridgeState; HALF_BRIDGES as usize],
    duties: [u8; PWM_CHANNELS],
    status: u8,
    pwm_writes: usize,
    injections: Vec<FaultInjection>,
}

impl SimDriver {
    pub fn new(mut injections: Vec<FaultInjection>) -> Self {
        injections.sort_by_key(|f| f.after_pwm_writes);
        Self {
            bridges: [BridgeState::default(); HALF_BRIDGES as usize],
            duties: [0; PWM_CHANNELS],
            status: 0,
            pwm_writes: 0,
            injections,
        }
    }

    pub fn bridge(&self, bridge: HalfBridge) -> BridgeState {
        self.bridges[bridge.number() as usize - 1]
    }

    pub fn duty(&self, channel: PwmChannel) -> u8 {
        self.duties[channel.index()]
    }

    pub fn pwm_writes(&self) -> usize {
        self.pwm_writes
    }

    fn inject_due(&mut self) {
        while let Some(f) = self.injections.first().copied() {
            if f.after_pwm_writes > self.pwm_writes { break; }
            debug!("injecting fault {:#04x} at pwm write {}", f.bits, self.pwm_writes);
            self.status |= f.bits;
            self.injections.remove(0);
        }
    }
}

impl HalfBridgeDriver for SimDriver {
    type Error = Infallible;

    fn configure_half_bridge(
        &mut self,
        bridge: HalfBridge,
        level: Level,
        pwm: Option<PwmChannel>,
        freewheeling: Freewheeling,
    ) -> Result<(), Infallible> {
        trace!(%bridge, ?level, ?pwm, ?freewheeling, "configure half bridge");
        self.bridges[bridge.number() as usize - 1] = BridgeState { level, pwm, freewheeling };
        Ok(())
    }

    fn configure_pwm(&mut self, channel: PwmChannel, frequency: Frequency, duty: u8) -> Result<(), Infallible> {
        trace!(%channel, ?frequency, duty, "configure pwm");
        self.duties[channel.index()] = duty;
        self.pwm_writes += 1;
        self.inject_due();
        Ok(())
    }

    fn read_status(&mut self) -> Result<StatusWord, Infallible> {
        Ok(StatusWord::from_raw(self.status))
    }

    fn clear_errors(&mut self) -> Result<(), Infallible> {
        debug!("clear errors {:#04x}", self.status);
        self.status = 0;
        Ok(())
    }
}
