//! Duty-cycle ramps for the three shared PWM generators
//!
//! A ramp is a sequence of single-step duty-cycle writes. The controller is
//! tick driven: every [`RampController::tick`] advances all ramping channels
//! by one step in lockstep. Waiting between ticks is up to the caller.

use motorbank_protocol::{ChannelStatus, PWM_CHANNELS, PwmChannel, RampState};

use super::config::ChannelSettings;
use crate::driver::HalfBridgeDriver;
use crate::error::Error;

/// How a blocking ramp run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RampOutcome {
    Completed,
    /// Stopped early by the abort flag. Channels keep their last duty.
    Aborted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pending {
    None,
    /// Step up by one until `to`.
    Climb { to: u8 },
    /// Step down by one until `to`, then write 0 if `halt`.
    Descend { to: u8, halt: bool },
    /// One write, then settle in `then`.
    Jump { duty: u8, then: RampState },
}

/// Ramp progress of one PWM generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelRamp {
    state: RampState,
    /// Last duty cycle written to the generator.
    duty: u8,
    /// Position of the ramp; may sit above `duty` before the first step.
    cursor: u8,
    pending: Pending,
}

impl Default for ChannelRamp {
    fn default() -> Self {
        Self {
            state: RampState::Idle,
            duty: 0,
            cursor: 0,
            pending: Pending::None,
        }
    }
}

impl ChannelRamp {
    pub fn state(&self) -> RampState {
        self.state
    }

    pub fn duty(&self) -> u8 {
        self.duty
    }

    pub fn is_ramping(&self) -> bool {
        self.pending != Pending::None
    }

    /// Accelerate towards `target`.
    ///
    /// Stepping starts one above `max(floor, current duty)` and ends on
    /// `target`. Without `stepped`, or when already at or above the target,
    /// the target is written in a single step.
    fn climb(&mut self, floor: u8, target: u8, stepped: bool) {
        let from = floor.max(self.duty);
        if stepped && from < target {
            self.cursor = from;
            self.pending = Pending::Climb { to: target };
        } else {
            self.pending = Pending::Jump {
                duty: target,
                then: RampState::AtTarget,
            };
        }
        self.state = RampState::RampingUp;
    }

    /// Decelerate from the current duty down to `floor`, then write 0.
    fn descend(&mut self, floor: u8, stepped: bool) {
        if stepped && self.duty > floor {
            self.cursor = self.duty;
            self.pending = Pending::Descend {
                to: floor,
                halt: true,
            };
        } else {
            self.pending = Pending::Jump {
                duty: 0,
                then: RampState::Idle,
            };
        }
        self.state = RampState::RampingDown;
    }

    /// Step from `from` to `to` one unit at a time, ending at the target.
    fn sweep(&mut self, from: u8, to: u8) {
        self.cursor = from;
        if to > from {
            self.pending = Pending::Climb { to };
            self.state = RampState::RampingUp;
        } else if to < from {
            self.pending = Pending::Descend { to, halt: false };
            self.state = RampState::RampingDown;
        } else {
            self.pending = Pending::Jump {
                duty: to,
                then: RampState::AtTarget,
            };
        }
    }

    /// Next duty to write, advancing the ramp.
    fn step(&mut self) -> Option<u8> {
        match self.pending {
            Pending::None => None,
            Pending::Climb { to } => {
                self.cursor += 1;
                if self.cursor >= to {
                    self.pending = Pending::None;
                    self.state = RampState::AtTarget;
                }
                Some(self.cursor)
            }
            Pending::Descend { to, halt } => {
                self.cursor -= 1;
                if self.cursor <= to {
                    self.pending = if halt {
                        Pending::Jump {
                            duty: 0,
                            then: RampState::Idle,
                        }
                    } else {
                        self.state = RampState::AtTarget;
                        Pending::None
                    };
                }
                Some(self.cursor)
            }
            Pending::Jump { duty, then } => {
                self.pending = Pending::None;
                self.state = then;
                Some(duty)
            }
        }
    }

    fn cancel(&mut self) {
        self.pending = Pending::None;
        self.state = if self.duty == 0 {
            RampState::Idle
        } else {
            RampState::AtTarget
        };
    }
}

/// Ramp state of every PWM generator plus the analog duty-cycle reading.
#[derive(Clone, Debug, Default)]
pub struct RampController {
    channels: [ChannelRamp; PWM_CHANNELS],
    analog: Option<u8>,
}

impl RampController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, channel: PwmChannel) -> &ChannelRamp {
        &self.channels[channel.index()]
    }

    pub fn duty(&self, channel: PwmChannel) -> u8 {
        self.channel(channel).duty
    }

    pub fn state(&self, channel: PwmChannel) -> RampState {
        self.channel(channel).state
    }

    /// Last analog duty-cycle reading, if one was supplied.
    pub fn analog_reading(&self) -> Option<u8> {
        self.analog
    }

    pub fn is_ramping(&self) -> bool {
        self.channels.iter().any(ChannelRamp::is_ramping)
    }

    /// Queue the start ramp of `channel`.
    ///
    /// The target is `max_duty`, or the last analog reading for a manual
    /// channel once a reading exists.
    pub fn begin_start(&mut self, channel: PwmChannel, settings: &ChannelSettings) {
        let target = match (settings.manual, self.analog) {
            (true, Some(reading)) => reading,
            _ => settings.max_duty,
        };
        debug!(
            "{}: start ramp={} target={}",
            channel, settings.use_ramp, target
        );
        self.channels[channel.index()].climb(settings.min_duty, target, settings.use_ramp);
    }

    /// Queue the stop ramp of `channel`. It always ends with a write of 0.
    pub fn begin_stop(&mut self, channel: PwmChannel, settings: &ChannelSettings) {
        let ramp = &mut self.channels[channel.index()];
        debug!(
            "{}: stop ramp={} from={}",
            channel, settings.use_ramp, ramp.duty
        );
        ramp.descend(settings.min_duty, settings.use_ramp);
    }

    /// Record a new analog reading and queue a ramp from the previous
    /// reading to it on every manual channel.
    ///
    /// The ramp always steps, whatever the channel's ramp flag. The first
    /// reading ramps up from 0.
    pub fn apply_analog_duty_cycle<'s>(
        &mut self,
        reading: u8,
        settings: impl IntoIterator<Item = (PwmChannel, &'s ChannelSettings)>,
    ) {
        let previous = self.analog.replace(reading).unwrap_or(0);
        for (channel, settings) in settings {
            if !settings.manual {
                continue;
            }
            debug!("{}: analog {} -> {}", channel, previous, reading);
            self.channels[channel.index()].sweep(previous, reading);
        }
    }

    /// Write one step on every ramping channel.
    ///
    /// Returns `true` while any channel still has steps left.
    pub fn tick<D: HalfBridgeDriver>(&mut self, driver: &mut D) -> Result<bool, Error<D::Error>> {
        for channel in PwmChannel::ALL {
            let ramp = &mut self.channels[channel.index()];
            // Advance a copy; a failed write leaves the step queued.
            let mut next = *ramp;
            if let Some(duty) = next.step() {
                driver
                    .configure_pwm(channel, channel.into(), duty)
                    .map_err(Error::Driver)?;
                next.duty = duty;
                *ramp = next;
                trace!("{}: duty {}", channel, duty);
            }
        }
        Ok(self.is_ramping())
    }

    /// Drop every queued step. Channels keep their last written duty.
    pub fn cancel(&mut self) {
        for ramp in self.channels.iter_mut() {
            ramp.cancel();
        }
    }

    /// Forget all ramp progress after the generators were zeroed.
    pub fn reset(&mut self) {
        self.channels = [ChannelRamp::default(); PWM_CHANNELS];
    }

    pub fn channel_status(&self, channel: PwmChannel, settings: &ChannelSettings) -> ChannelStatus {
        let ramp = self.channel(channel);
        ChannelStatus {
            channel,
            min_duty: settings.min_duty,
            max_duty: settings.max_duty,
            use_ramp: settings.use_ramp,
            manual: settings.manual,
            duty: ramp.duty,
            state: ramp.state,
        }
    }
}
