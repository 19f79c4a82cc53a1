#![no_std]

//! Types shared between the motor bank engine and anything that commands it.
//!
//! Motors are numbered from 1, PWM channels map 1:1 onto the three hardware
//! generators (80 Hz, 100 Hz, 200 Hz). On the wire a selector value of `0`
//! means "every motor" / "every channel".

use core::fmt;

use heapless::{String, Vec};
use postcard_schema::Schema;
use serde::{Deserialize, Serialize};

/// Highest motor count supported by any wiring density.
pub const MAX_MOTORS: usize = 6;
/// Number of shared PWM generators.
pub const PWM_CHANNELS: usize = 3;
/// Capacity of a fault report context header.
pub const HEADER_LEN: usize = 32;
/// Number of distinct fault categories.
pub const FAULT_KINDS: usize = 7;

/// Motor number, 1-based.
#[derive(Clone, Copy, Schema, Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(try_from = "u8", into = "u8")]
pub struct MotorId(u8);

impl MotorId {
    pub const fn new(number: u8) -> Option<Self> {
        if number >= 1 && number as usize <= MAX_MOTORS {
            Some(Self(number))
        } else {
            None
        }
    }

    /// The 1-based motor number.
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Zero-based slot in motor tables.
    pub const fn index(self) -> usize {
        self.0 as usize - 1
    }

    /// The first `count` motors, in order.
    pub fn first(count: usize) -> impl Iterator<Item = MotorId> {
        (1..=count.min(MAX_MOTORS) as u8).map(MotorId)
    }
}

/// Rejected motor number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidMotorId(pub u8);

impl fmt::Display for InvalidMotorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "motor {} out of range 1..={}", self.0, MAX_MOTORS)
    }
}

impl TryFrom<u8> for MotorId {
    type Error = InvalidMotorId;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        Self::new(number).ok_or(InvalidMotorId(number))
    }
}

impl From<MotorId> for u8 {
    fn from(id: MotorId) -> u8 {
        id.0
    }
}

impl fmt::Display for MotorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{}", self.0)
    }
}

/// Rotation direction.
#[derive(Clone, Copy, Schema, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    #[default]
    Cw,
    Ccw,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Self::Cw => Self::Ccw,
            Self::Ccw => Self::Cw,
        }
    }
}

/// Terminal behaviour of a motor while it is not actively driven.
#[derive(Clone, Copy, Schema, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Freewheeling {
    #[default]
    Active,
    Passive,
}

/// One of the three shared PWM generators.
#[derive(Clone, Copy, Schema, Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwmChannel {
    Ch80Hz,
    Ch100Hz,
    Ch200Hz,
}

impl PwmChannel {
    pub const ALL: [PwmChannel; PWM_CHANNELS] = [Self::Ch80Hz, Self::Ch100Hz, Self::Ch200Hz];

    /// Zero-based slot in channel tables.
    pub const fn index(self) -> usize {
        match self {
            Self::Ch80Hz => 0,
            Self::Ch100Hz => 1,
            Self::Ch200Hz => 2,
        }
    }

    /// Generator number as the driver IC numbers it (1..=3).
    pub const fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::Ch80Hz),
            2 => Some(Self::Ch100Hz),
            3 => Some(Self::Ch200Hz),
            _ => None,
        }
    }

    pub const fn frequency_hz(self) -> u16 {
        match self {
            Self::Ch80Hz => 80,
            Self::Ch100Hz => 100,
            Self::Ch200Hz => 200,
        }
    }
}

impl fmt::Display for PwmChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.frequency_hz())
    }
}

/// Which motors a setter applies to.
#[derive(Clone, Copy, Schema, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorTarget {
    #[default]
    All,
    Motor(MotorId),
}

impl MotorTarget {
    /// Decode a wire selector: `0` selects every motor.
    pub const fn from_raw(raw: u8) -> Option<Self> {
        if raw == 0 {
            return Some(Self::All);
        }
        match MotorId::new(raw) {
            Some(id) => Some(Self::Motor(id)),
            None => None,
        }
    }

    pub fn includes(self, id: MotorId) -> bool {
        match self {
            Self::All => true,
            Self::Motor(m) => m == id,
        }
    }
}

impl From<MotorId> for MotorTarget {
    fn from(id: MotorId) -> Self {
        Self::Motor(id)
    }
}

/// Which PWM channels a setter applies to.
#[derive(Clone, Copy, Schema, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelTarget {
    #[default]
    All,
    Channel(PwmChannel),
}

impl ChannelTarget {
    /// Decode a wire selector: `0` selects every channel.
    pub const fn from_raw(raw: u8) -> Option<Self> {
        if raw == 0 {
            return Some(Self::All);
        }
        match PwmChannel::from_number(raw) {
            Some(ch) => Some(Self::Channel(ch)),
            None => None,
        }
    }

    pub fn includes(self, channel: PwmChannel) -> bool {
        match self {
            Self::All => true,
            Self::Channel(c) => c == channel,
        }
    }
}

impl From<PwmChannel> for ChannelTarget {
    fn from(channel: PwmChannel) -> Self {
        Self::Channel(channel)
    }
}

/// Fault categories reported by the driver status word, in decode order.
#[derive(Clone, Copy, Schema, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    OpenLoad,
    SpiError,
    UnderVoltage,
    OverVoltage,
    PowerOnReset,
    ThermalShutdown,
    ThermalWarning,
}

impl FaultKind {
    pub const DECODE_ORDER: [FaultKind; FAULT_KINDS] = [
        Self::OpenLoad,
        Self::SpiError,
        Self::UnderVoltage,
        Self::OverVoltage,
        Self::PowerOnReset,
        Self::ThermalShutdown,
        Self::ThermalWarning,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::OpenLoad => "Open Load",
            Self::SpiError => "SPI communication",
            Self::UnderVoltage => "Under Voltage",
            Self::OverVoltage => "Over Voltage",
            Self::PowerOnReset => "Power Reset",
            Self::ThermalShutdown => "Temp shutdown",
            Self::ThermalWarning => "Warning too hot",
        }
    }
}

/// Outcome of one diagnostic poll.
///
/// An empty `faults` list means the driver was polled and reported all-clear.
#[derive(Clone, Schema, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct FaultReport {
    pub motor: Option<MotorId>,
    pub header: String<HEADER_LEN>,
    pub faults: Vec<FaultKind, FAULT_KINDS>,
}

impl FaultReport {
    /// Build an empty report. Headers longer than [`HEADER_LEN`] are cut at a
    /// character boundary.
    pub fn new(motor: Option<MotorId>, header: &str) -> Self {
        let mut text = String::new();
        for c in header.chars() {
            if text.push(c).is_err() {
                break;
            }
        }
        Self {
            motor,
            header: text,
            faults: Vec::new(),
        }
    }

    pub fn push(&mut self, kind: FaultKind) {
        if !self.faults.contains(&kind) {
            // Capacity equals the number of kinds, so this cannot overflow.
            let _ = self.faults.push(kind);
        }
    }

    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }

    pub fn contains(&self, kind: FaultKind) -> bool {
        self.faults.contains(&kind)
    }
}

impl fmt::Display for FaultReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.header.is_empty() {
            write!(f, "{} ", self.header)?;
        }
        if let Some(motor) = self.motor {
            write!(f, "Motor {} - ", motor.get())?;
        }
        if self.is_clean() {
            return f.write_str("No Errors");
        }
        f.write_str("Diagnostic Status:")?;
        for (i, kind) in self.faults.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{}", sep, kind.label())?;
        }
        Ok(())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for FaultReport {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "FaultReport {{ motor: {}, header: {=str}, faults: {} }}",
            self.motor,
            self.header.as_str(),
            self.faults.as_slice()
        )
    }
}

/// Progress of a channel's duty-cycle ramp.
#[derive(Clone, Copy, Schema, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RampState {
    #[default]
    Idle,
    RampingUp,
    AtTarget,
    RampingDown,
}

/// Snapshot of one motor's settings.
#[derive(Clone, Copy, Schema, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorStatus {
    pub id: MotorId,
    pub enabled: bool,
    pub running: bool,
    pub direction: Direction,
    pub freewheeling: Freewheeling,
    pub pwm: Option<PwmChannel>,
}

/// Snapshot of one PWM channel's settings and output.
#[derive(Clone, Copy, Schema, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelStatus {
    pub channel: PwmChannel,
    pub min_duty: u8,
    pub max_duty: u8,
    pub use_ramp: bool,
    pub manual: bool,
    pub duty: u8,
    pub state: RampState,
}

/// Whole-bank snapshot.
#[derive(Clone, Schema, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BankStatus {
    pub motors: Vec<MotorStatus, MAX_MOTORS>,
    pub channels: Vec<ChannelStatus, PWM_CHANNELS>,
}

/// Commands accepted by the motor bank.
#[derive(Clone, Schema, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Reset,
    SetEnabled { target: MotorTarget, enabled: bool },
    SetDirection { target: MotorTarget, direction: Direction },
    SetFreewheeling { target: MotorTarget, freewheeling: Freewheeling },
    SetPwm { target: MotorTarget, pwm: Option<PwmChannel> },
    SetRamp { target: ChannelTarget, enabled: bool },
    SetManualDutyCycle { target: ChannelTarget, manual: bool },
    SetMinDutyCycle { target: ChannelTarget, duty: u8 },
    SetMaxDutyCycle { target: ChannelTarget, duty: u8 },
    /// New reading from the external duty-cycle potentiometer.
    AnalogDutyCycle { reading: u8 },
    StartAll,
    StopAll,
    Start { motor: MotorId },
    Stop { motor: MotorId },
    ReportFault,
    Status,
}

/// Reply to a [`Command`].
#[derive(Clone, Schema, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response {
    Done,
    /// A ramp was cut short by the abort flag.
    Aborted,
    Status(BankStatus),
    Fault(FaultReport),
}
