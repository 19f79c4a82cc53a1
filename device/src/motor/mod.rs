//! Motor bank control
//!
//! [`MotorControl`] owns the motor and channel model, the ramp controller
//! and the half-bridge driver. Setters only touch the model; the start and
//! stop actions translate it into half-bridge and PWM writes.

pub mod bridge;
pub mod config;
pub mod diag;
pub mod pwm;

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::delay::DelayNs;
use heapless::Deque;
use motorbank_protocol::{
    BankStatus, ChannelTarget, Command, Direction, FaultReport, Freewheeling, MotorId,
    MotorTarget, PwmChannel, Response,
};

use self::bridge::{Commands, floating};
use self::config::{Bank, ControllerConfig};
use self::diag::Diagnostics;
use self::pwm::{RampController, RampOutcome};
use crate::driver::{HalfBridge, HalfBridgeDriver};
use crate::error::Error;

/// Fault reports kept until [`MotorControl::take_faults`]; older ones are dropped.
pub const FAULT_LOG_LEN: usize = 8;

const STARTING: &str = "Starting";
const STOPPING: &str = "Stopping";
const RAMPING: &str = "Ramping";

pub type FaultLog = Deque<FaultReport, FAULT_LOG_LEN>;

/// Motor bank controller
pub struct MotorControl<'a, D: HalfBridgeDriver> {
    driver: D,
    config: ControllerConfig,
    bank: Bank,
    ramps: RampController,
    diag: Diagnostics,
    faults: FaultLog,
    abort: Option<&'a AtomicBool>,
}

impl<'a, D: HalfBridgeDriver> MotorControl<'a, D> {
    /// Create a controller with every motor and channel at its defaults.
    ///
    /// The hardware is not touched; call [`reset`](Self::reset) to bring the
    /// driver into a known state.
    pub fn new(driver: D, config: ControllerConfig) -> Self {
        Self {
            driver,
            config,
            bank: Bank::new(config.density),
            ramps: RampController::new(),
            diag: Diagnostics::new(config.ignore_open_load),
            faults: FaultLog::new(),
            abort: None,
        }
    }

    /// Check `flag` between ramp steps and stop ramping once it is set.
    pub fn with_abort(mut self, flag: &'a AtomicBool) -> Self {
        self.abort = Some(flag);
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    pub fn ramps(&self) -> &RampController {
        &self.ramps
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Restore the defaults, float every half bridge and zero every PWM
    /// generator.
    pub fn reset(&mut self) -> Result<(), Error<D::Error>> {
        info!("reset");
        self.bank.reset_defaults();
        self.float_all()?;
        self.zero_all()
    }

    /// Float all twelve half bridges without PWM.
    pub fn float_all(&mut self) -> Result<(), Error<D::Error>> {
        for bridge in HalfBridge::all() {
            self.write(&[floating(bridge)])?;
        }
        for id in self.bank.motor_ids() {
            if let Some(motor) = self.bank.motor_mut(id) {
                motor.running = false;
            }
        }
        Ok(())
    }

    /// Write duty cycle 0 to every PWM generator, keeping its frequency.
    pub fn zero_all(&mut self) -> Result<(), Error<D::Error>> {
        self.ramps.reset();
        for channel in PwmChannel::ALL {
            self.driver
                .configure_pwm(channel, channel.into(), 0)
                .map_err(Error::Driver)?;
        }
        Ok(())
    }

    pub fn set_enabled(&mut self, target: MotorTarget, enabled: bool) {
        self.bank.set_enabled(target, enabled);
    }

    pub fn set_direction(&mut self, target: MotorTarget, direction: Direction) {
        self.bank.set_direction(target, direction);
    }

    pub fn set_freewheeling(&mut self, target: MotorTarget, freewheeling: Freewheeling) {
        self.bank.set_freewheeling(target, freewheeling);
    }

    pub fn set_pwm(&mut self, target: MotorTarget, pwm: Option<PwmChannel>) {
        self.bank.set_pwm(target, pwm);
    }

    pub fn set_ramp_enabled(&mut self, target: ChannelTarget, enabled: bool) {
        self.bank.set_ramp_enabled(target, enabled);
    }

    pub fn set_manual_duty_cycle(&mut self, target: ChannelTarget, manual: bool) {
        self.bank.set_manual_duty_cycle(target, manual);
    }

    pub fn set_min_duty_cycle(&mut self, target: ChannelTarget, duty: u8) {
        self.bank.set_min_duty_cycle(target, duty);
    }

    pub fn set_max_duty_cycle(&mut self, target: ChannelTarget, duty: u8) {
        self.bank.set_max_duty_cycle(target, duty);
    }

    pub fn has_manual_duty_cycle(&self) -> bool {
        self.bank.has_manual_duty_cycle()
    }

    /// Snapshot of every motor and channel.
    pub fn status(&self) -> BankStatus {
        let mut status = BankStatus::default();
        for id in self.bank.motor_ids() {
            if let Some(motor) = self.bank.motor_status(id) {
                // Capacity matches the largest motor count.
                let _ = status.motors.push(motor);
            }
        }
        for channel in PwmChannel::ALL {
            let _ = status
                .channels
                .push(self.ramps.channel_status(channel, self.bank.channel(channel)));
        }
        status
    }

    /// `true` if the driver reports any fault.
    pub fn check_fault(&mut self) -> Result<bool, Error<D::Error>> {
        self.diag.check_fault(&mut self.driver)
    }

    /// Decode and clear the driver's current faults.
    pub fn report_fault(
        &mut self,
        motor: Option<MotorId>,
        header: &str,
    ) -> Result<FaultReport, Error<D::Error>> {
        self.diag.report_fault(&mut self.driver, motor, header)
    }

    /// Drain the fault reports collected while starting, stopping and
    /// ramping.
    pub fn take_faults(&mut self) -> FaultLog {
        core::mem::replace(&mut self.faults, FaultLog::new())
    }

    /// Drive every enabled motor, then ramp up every channel.
    pub fn start_all(&mut self, delay: &mut impl DelayNs) -> Result<RampOutcome, Error<D::Error>> {
        info!("start all");
        for id in self.bank.motor_ids() {
            self.start_motor(id)?;
        }
        for channel in PwmChannel::ALL {
            self.ramps.begin_start(channel, self.bank.channel(channel));
        }
        self.run_ramps(delay)
    }

    /// Ramp every channel down to 0, then float every motor.
    pub fn stop_all(&mut self, delay: &mut impl DelayNs) -> Result<RampOutcome, Error<D::Error>> {
        info!("stop all");
        for channel in PwmChannel::ALL {
            self.ramps.begin_stop(channel, self.bank.channel(channel));
        }
        let outcome = self.run_ramps(delay)?;
        for id in self.bank.motor_ids() {
            self.stop_motor(id)?;
        }
        Ok(outcome)
    }

    /// Drive one motor and ramp up the channel it uses.
    ///
    /// Disabled motors and motors the wiring density does not provide are
    /// left alone.
    pub fn start_one(
        &mut self,
        id: MotorId,
        delay: &mut impl DelayNs,
    ) -> Result<RampOutcome, Error<D::Error>> {
        info!("start {}", id);
        if !self.start_motor(id)? {
            return Ok(RampOutcome::Completed);
        }
        if let Some(channel) = self.bank.motor(id).and_then(|m| m.pwm) {
            self.ramps.begin_start(channel, self.bank.channel(channel));
        }
        self.run_ramps(delay)
    }

    /// Ramp down the channel one motor uses, then float the motor.
    ///
    /// Other motors sharing the channel lose their duty cycle too.
    pub fn stop_one(
        &mut self,
        id: MotorId,
        delay: &mut impl DelayNs,
    ) -> Result<RampOutcome, Error<D::Error>> {
        info!("stop {}", id);
        let Some(motor) = self.bank.motor(id) else {
            return Ok(RampOutcome::Completed);
        };
        if let Some(channel) = motor.pwm {
            self.ramps.begin_stop(channel, self.bank.channel(channel));
        }
        let outcome = self.run_ramps(delay)?;
        self.stop_motor(id)?;
        Ok(outcome)
    }

    /// Feed a new analog duty-cycle reading to the manual channels.
    pub fn apply_analog_duty_cycle(
        &mut self,
        reading: u8,
        delay: &mut impl DelayNs,
    ) -> Result<RampOutcome, Error<D::Error>> {
        let bank = &self.bank;
        self.ramps.apply_analog_duty_cycle(
            reading,
            PwmChannel::ALL.into_iter().map(|c| (c, bank.channel(c))),
        );
        self.run_ramps(delay)
    }

    /// Run one protocol command.
    ///
    /// Setters only change the model and produce no reply.
    pub fn execute(
        &mut self,
        command: &Command,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Response>, Error<D::Error>> {
        debug!("execute {:?}", command);
        let outcome = match *command {
            Command::Reset => {
                self.reset()?;
                RampOutcome::Completed
            }
            Command::SetEnabled { target, enabled } => {
                self.set_enabled(target, enabled);
                return Ok(None);
            }
            Command::SetDirection { target, direction } => {
                self.set_direction(target, direction);
                return Ok(None);
            }
            Command::SetFreewheeling {
                target,
                freewheeling,
            } => {
                self.set_freewheeling(target, freewheeling);
                return Ok(None);
            }
            Command::SetPwm { target, pwm } => {
                self.set_pwm(target, pwm);
                return Ok(None);
            }
            Command::SetRamp { target, enabled } => {
                self.set_ramp_enabled(target, enabled);
                return Ok(None);
            }
            Command::SetManualDutyCycle { target, manual } => {
                self.set_manual_duty_cycle(target, manual);
                return Ok(None);
            }
            Command::SetMinDutyCycle { target, duty } => {
                self.set_min_duty_cycle(target, duty);
                return Ok(None);
            }
            Command::SetMaxDutyCycle { target, duty } => {
                self.set_max_duty_cycle(target, duty);
                return Ok(None);
            }
            Command::AnalogDutyCycle { reading } => self.apply_analog_duty_cycle(reading, delay)?,
            Command::StartAll => self.start_all(delay)?,
            Command::StopAll => self.stop_all(delay)?,
            Command::Start { motor } => self.start_one(motor, delay)?,
            Command::Stop { motor } => self.stop_one(motor, delay)?,
            Command::ReportFault => {
                let report = self.report_fault(None, "")?;
                return Ok(Some(Response::Fault(report)));
            }
            Command::Status => return Ok(Some(Response::Status(self.status()))),
        };
        Ok(Some(match outcome {
            RampOutcome::Completed => Response::Done,
            RampOutcome::Aborted => Response::Aborted,
        }))
    }

    /// Drive the half bridges of an enabled motor. `false` if nothing was
    /// written.
    fn start_motor(&mut self, id: MotorId) -> Result<bool, Error<D::Error>> {
        let density = self.bank.density();
        let Some(motor) = self.bank.motor(id).copied() else {
            return Ok(false);
        };
        if !motor.enabled {
            return Ok(false);
        }
        let cmds = bridge::drive(id, density, motor.direction, motor.pwm, motor.freewheeling);
        self.write(&cmds)?;
        if let Some(m) = self.bank.motor_mut(id) {
            m.running = true;
        }
        self.poll(Some(id), STARTING)?;
        Ok(true)
    }

    fn stop_motor(&mut self, id: MotorId) -> Result<(), Error<D::Error>> {
        let cmds: Commands = bridge::float(id, self.bank.density());
        self.write(&cmds)?;
        if let Some(m) = self.bank.motor_mut(id) {
            m.running = false;
        }
        self.poll(Some(id), STOPPING)
    }

    fn write(&mut self, cmds: &[bridge::HalfBridgeCommand]) -> Result<(), Error<D::Error>> {
        for cmd in cmds {
            trace!("{:?}", cmd);
            self.driver
                .configure_half_bridge(cmd.bridge, cmd.level, cmd.pwm, cmd.freewheeling)
                .map_err(Error::Driver)?;
        }
        Ok(())
    }

    /// Step every queued ramp to its end, waiting the configured delay
    /// between steps and checking the driver after each one.
    fn run_ramps(&mut self, delay: &mut impl DelayNs) -> Result<RampOutcome, Error<D::Error>> {
        while self.ramps.is_ramping() {
            if self.abort.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                warn!("ramp aborted");
                self.ramps.cancel();
                return Ok(RampOutcome::Aborted);
            }
            self.ramps.tick(&mut self.driver)?;
            self.poll(None, RAMPING)?;
            delay.delay_ms(self.config.ramp_step_delay_ms);
        }
        Ok(RampOutcome::Completed)
    }

    fn poll(&mut self, motor: Option<MotorId>, header: &str) -> Result<(), Error<D::Error>> {
        if self.diag.check_fault(&mut self.driver)? {
            let report = self.diag.report_fault(&mut self.driver, motor, header)?;
            self.record(report);
        }
        Ok(())
    }

    fn record(&mut self, report: FaultReport) {
        if report.is_clean() {
            return;
        }
        warn!("{}", report);
        if self.faults.is_full() {
            self.faults.pop_front();
        }
        let _ = self.faults.push_back(report);
    }
}
