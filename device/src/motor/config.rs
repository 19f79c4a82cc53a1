//! In-memory motor and PWM channel settings.
//!
//! Setters only touch this model. Hardware is reconfigured when the facade
//! starts or stops motors.

use embassy_time::Duration;
use motorbank_protocol::{
    ChannelTarget, Direction, Freewheeling, MAX_MOTORS, MotorId, MotorStatus, MotorTarget,
    PWM_CHANNELS, PwmChannel,
};
use serde::Deserialize;

use super::bridge::WiringDensity;

/// Delay between two duty-cycle steps of a ramp.
pub const RAMP_STEP_DELAY_MS: u32 = 2;

pub const DUTY_CYCLE_MIN: u8 = 0;
pub const DUTY_CYCLE_MAX: u8 = 255;

/// Engine configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub density: WiringDensity,
    pub ramp_step_delay_ms: u32,
    /// Skip open-load faults; they fire routinely while a motor spins up.
    pub ignore_open_load: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            density: WiringDensity::BUILD,
            ramp_step_delay_ms: RAMP_STEP_DELAY_MS,
            ignore_open_load: true,
        }
    }
}

impl ControllerConfig {
    pub fn ramp_step_delay(&self) -> Duration {
        Duration::from_millis(self.ramp_step_delay_ms as u64)
    }
}

/// Settings and run state of one motor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Motor {
    pub enabled: bool,
    /// Set while the motor's half bridges are driven.
    pub running: bool,
    pub direction: Direction,
    pub freewheeling: Freewheeling,
    pub pwm: Option<PwmChannel>,
}

/// Duty-cycle settings shared by every motor on one PWM channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelSettings {
    pub min_duty: u8,
    pub max_duty: u8,
    pub use_ramp: bool,
    /// Target follows the external analog reading instead of `max_duty`.
    pub manual: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            min_duty: DUTY_CYCLE_MIN,
            max_duty: DUTY_CYCLE_MAX,
            use_ramp: false,
            manual: false,
        }
    }
}

/// All motors and PWM channels of the controller.
#[derive(Clone, Debug)]
pub struct Bank {
    density: WiringDensity,
    motors: [Motor; MAX_MOTORS],
    channels: [ChannelSettings; PWM_CHANNELS],
}

impl Bank {
    pub fn new(density: WiringDensity) -> Self {
        Self {
            density,
            motors: [Motor::default(); MAX_MOTORS],
            channels: [ChannelSettings::default(); PWM_CHANNELS],
        }
    }

    /// Restore every motor and channel to its power-on defaults.
    pub fn reset_defaults(&mut self) {
        self.motors = [Motor::default(); MAX_MOTORS];
        self.channels = [ChannelSettings::default(); PWM_CHANNELS];
    }

    pub fn density(&self) -> WiringDensity {
        self.density
    }

    /// Motors wired under the current density.
    pub fn motor_ids(&self) -> impl Iterator<Item = MotorId> + use<> {
        MotorId::first(self.density.motor_count())
    }

    /// `None` for motors the wiring density does not provide.
    pub fn motor(&self, id: MotorId) -> Option<&Motor> {
        self.motors[..self.density.motor_count()].get(id.index())
    }

    pub(crate) fn motor_mut(&mut self, id: MotorId) -> Option<&mut Motor> {
        self.motors[..self.density.motor_count()].get_mut(id.index())
    }

    pub fn channel(&self, channel: PwmChannel) -> &ChannelSettings {
        &self.channels[channel.index()]
    }

    pub fn motor_status(&self, id: MotorId) -> Option<MotorStatus> {
        self.motor(id).map(|m| MotorStatus {
            id,
            enabled: m.enabled,
            running: m.running,
            direction: m.direction,
            freewheeling: m.freewheeling,
            pwm: m.pwm,
        })
    }

    /// True if any channel takes its target from the analog reading.
    pub fn has_manual_duty_cycle(&self) -> bool {
        self.channels.iter().any(|c| c.manual)
    }

    pub fn set_enabled(&mut self, target: MotorTarget, enabled: bool) {
        self.update_motors(target, |m| m.enabled = enabled);
    }

    pub fn set_direction(&mut self, target: MotorTarget, direction: Direction) {
        self.update_motors(target, |m| m.direction = direction);
    }

    pub fn set_freewheeling(&mut self, target: MotorTarget, freewheeling: Freewheeling) {
        self.update_motors(target, |m| m.freewheeling = freewheeling);
    }

    pub fn set_pwm(&mut self, target: MotorTarget, pwm: Option<PwmChannel>) {
        self.update_motors(target, |m| m.pwm = pwm);
    }

    pub fn set_ramp_enabled(&mut self, target: ChannelTarget, enabled: bool) {
        self.update_channels(target, |c| c.use_ramp = enabled);
    }

    pub fn set_manual_duty_cycle(&mut self, target: ChannelTarget, manual: bool) {
        self.update_channels(target, |c| c.manual = manual);
    }

    pub fn set_min_duty_cycle(&mut self, target: ChannelTarget, duty: u8) {
        self.update_channels(target, |c| c.min_duty = duty);
    }

    pub fn set_max_duty_cycle(&mut self, target: ChannelTarget, duty: u8) {
        self.update_channels(target, |c| c.max_duty = duty);
    }

    fn update_motors(&mut self, target: MotorTarget, mut f: impl FnMut(&mut Motor)) {
        for id in MotorId::first(self.density.motor_count()) {
            if target.includes(id) {
                f(&mut self.motors[id.index()]);
            }
        }
    }

    fn update_channels(&mut self, target: ChannelTarget, mut f: impl FnMut(&mut ChannelSettings)) {
        for channel in PwmChannel::ALL {
            if target.includes(channel) {
                f(&mut self.channels[channel.index()]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> MotorId {
        MotorId::new(n).unwrap()
    }

    #[test]
    fn test_defaults() {
        let bank = Bank::new(WiringDensity::Normal);
        for m in bank.motor_ids() {
            let motor = bank.motor(m).unwrap();
            assert!(!motor.enabled);
            assert!(!motor.running);
            assert_eq!(motor.direction, Direction::Cw);
            assert_eq!(motor.freewheeling, Freewheeling::Active);
            assert_eq!(motor.pwm, None);
        }
        for ch in PwmChannel::ALL {
            assert_eq!(*bank.channel(ch), ChannelSettings::default());
            assert_eq!(bank.channel(ch).min_duty, 0);
            assert_eq!(bank.channel(ch).max_duty, 255);
        }
        assert!(!bank.has_manual_duty_cycle());
    }

    #[test]
    fn test_targeted_channel_setter_leaves_others() {
        let mut bank = Bank::new(WiringDensity::Normal);
        bank.set_min_duty_cycle(ChannelTarget::All, 3);
        bank.set_min_duty_cycle(PwmChannel::Ch80Hz.into(), 5);

        assert_eq!(bank.channel(PwmChannel::Ch80Hz).min_duty, 5);
        assert_eq!(bank.channel(PwmChannel::Ch100Hz).min_duty, 3);
        assert_eq!(bank.channel(PwmChannel::Ch200Hz).min_duty, 3);
    }

    #[test]
    fn test_all_target_updates_every_motor() {
        let mut bank = Bank::new(WiringDensity::Normal);
        bank.set_direction(MotorTarget::All, Direction::Ccw);
        bank.set_pwm(MotorTarget::All, Some(PwmChannel::Ch200Hz));
        for m in bank.motor_ids() {
            let motor = bank.motor(m).unwrap();
            assert_eq!(motor.direction, Direction::Ccw);
            assert_eq!(motor.pwm, Some(PwmChannel::Ch200Hz));
        }
    }

    #[test]
    fn test_single_motor_setter() {
        let mut bank = Bank::new(WiringDensity::Normal);
        bank.set_enabled(id(4).into(), true);
        bank.set_freewheeling(id(4).into(), Freewheeling::Passive);

        for m in bank.motor_ids() {
            let motor = bank.motor(m).unwrap();
            assert_eq!(motor.enabled, m == id(4));
            let fw = if m == id(4) {
                Freewheeling::Passive
            } else {
                Freewheeling::Active
            };
            assert_eq!(motor.freewheeling, fw);
        }
    }

    #[test]
    fn test_motor_beyond_density_is_ignored() {
        let mut bank = Bank::new(WiringDensity::HighCurrent);
        assert_eq!(bank.motor_ids().count(), 3);
        bank.set_enabled(id(5).into(), true);
        assert!(bank.motor(id(5)).is_none());
        assert!(bank.motor_ids().all(|m| !bank.motor(m).unwrap().enabled));
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut bank = Bank::new(WiringDensity::Normal);
        bank.set_enabled(MotorTarget::All, true);
        bank.set_ramp_enabled(ChannelTarget::All, true);
        bank.set_manual_duty_cycle(PwmChannel::Ch100Hz.into(), true);
        bank.set_max_duty_cycle(ChannelTarget::All, 90);
        assert!(bank.has_manual_duty_cycle());

        bank.reset_defaults();
        assert!(!bank.has_manual_duty_cycle());
        assert!(bank.motor_ids().all(|m| !bank.motor(m).unwrap().enabled));
        assert_eq!(bank.channel(PwmChannel::Ch200Hz).max_duty, 255);
        assert!(!bank.channel(PwmChannel::Ch80Hz).use_ramp);
    }

    #[test]
    fn test_config_from_toml() {
        let cfg: ControllerConfig = toml::from_str(
            r#"
            density = "HighCurrent"
            ramp_step_delay_ms = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.density, WiringDensity::HighCurrent);
        assert_eq!(cfg.ramp_step_delay(), Duration::from_millis(5));
        assert!(cfg.ignore_open_load);
    }
}
