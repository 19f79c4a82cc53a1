//! Recording driver used by the unit tests.

extern crate std;

use std::vec::Vec;

use motorbank_protocol::{Freewheeling, PwmChannel};

use crate::driver::{Frequency, HalfBridge, HalfBridgeDriver, Level, StatusWord};
use crate::motor::bridge::HalfBridgeCommand;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Bridge(HalfBridgeCommand),
    Pwm {
        channel: PwmChannel,
        frequency: Frequency,
        duty: u8,
    },
    ReadStatus,
    Clear,
}

#[derive(Debug, PartialEq, Eq)]
pub struct BusError;

#[derive(Default)]
pub struct MockDriver {
    pub events: Vec<Event>,
    /// Latched status bits, cleared by `clear_errors`.
    pub status: u8,
    /// Latch these bits when the PWM write with this index (0-based) happens.
    pub fault_on_pwm_write: Option<(usize, u8)>,
    /// Fail every driver call once this many calls have succeeded.
    pub fail_after: Option<usize>,
    pwm_writes: usize,
    calls: usize,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(bits: u8) -> Self {
        Self {
            status: bits,
            ..Self::default()
        }
    }

    pub fn failing_after(calls: usize) -> Self {
        Self {
            fail_after: Some(calls),
            ..Self::default()
        }
    }

    /// Every duty cycle written to `channel`, in order.
    pub fn duties(&self, channel: PwmChannel) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                Event::Pwm { channel: c, duty, .. } if c == channel => Some(duty),
                _ => None,
            })
            .collect()
    }

    /// Last command written to `bridge`.
    pub fn bridge(&self, bridge: u8) -> Option<HalfBridgeCommand> {
        self.events.iter().rev().find_map(|e| match *e {
            Event::Bridge(cmd) if cmd.bridge.number() == bridge => Some(cmd),
            _ => None,
        })
    }

    pub fn bridge_writes(&self) -> Vec<HalfBridgeCommand> {
        self.events
            .iter()
            .filter_map(|e| match *e {
                Event::Bridge(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    pub fn clears(&self) -> usize {
        self.events.iter().filter(|e| **e == Event::Clear).count()
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        core::mem::take(&mut self.events)
    }

    fn call(&mut self) -> Result<(), BusError> {
        if self.fail_after.is_some_and(|n| self.calls >= n) {
            return Err(BusError);
        }
        self.calls += 1;
        Ok(())
    }
}

impl HalfBridgeDriver for MockDriver {
    type Error = BusError;

    fn configure_half_bridge(
        &mut self,
        bridge: HalfBridge,
        level: Level,
        pwm: Option<PwmChannel>,
        freewheeling: Freewheeling,
    ) -> Result<(), BusError> {
        self.call()?;
        self.events.push(Event::Bridge(HalfBridgeCommand {
            bridge,
            level,
            pwm,
            freewheeling,
        }));
        Ok(())
    }

    fn configure_pwm(
        &mut self,
        channel: PwmChannel,
        frequency: Frequency,
        duty: u8,
    ) -> Result<(), BusError> {
        self.call()?;
        if let Some((index, bits)) = self.fault_on_pwm_write {
            if index == self.pwm_writes {
                self.status |= bits;
            }
        }
        self.pwm_writes += 1;
        self.events.push(Event::Pwm {
            channel,
            frequency,
            duty,
        });
        Ok(())
    }

    fn read_status(&mut self) -> Result<StatusWord, BusError> {
        self.call()?;
        self.events.push(Event::ReadStatus);
        Ok(StatusWord::from_raw(self.status))
    }

    fn clear_errors(&mut self) -> Result<(), BusError> {
        self.call()?;
        self.events.push(Event::Clear);
        self.status = 0;
        Ok(())
    }
}

/// Delay provider that records requested waits instead of sleeping.
#[derive(Default)]
pub struct RecordingDelay {
    pub waits_ns: Vec<u32>,
}

impl embedded_hal::delay::DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.waits_ns.push(ns);
    }
}
