//! Capability interface to the half-bridge driver IC.
//!
//! The engine never talks to the bus itself. Whatever serializes bits to the
//! driver (SPI on the target, a simulator on the host, a recorder in tests)
//! implements [`HalfBridgeDriver`].

use core::fmt;

use motorbank_protocol::{FaultKind, Freewheeling, PwmChannel};

/// Number of half-bridge outputs on the driver.
pub const HALF_BRIDGES: u8 = 12;

/// Half-bridge output number, 1-based as printed on the driver pinout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HalfBridge(u8);

impl HalfBridge {
    pub const fn new(number: u8) -> Option<Self> {
        if number >= 1 && number <= HALF_BRIDGES {
            Some(Self(number))
        } else {
            None
        }
    }

    /// Caller guarantees `1..=HALF_BRIDGES`; used by the static bridge tables.
    pub(crate) const fn from_table(number: u8) -> Self {
        Self(number)
    }

    pub const fn number(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = HalfBridge> {
        (1..=HALF_BRIDGES).map(Self)
    }
}

impl fmt::Display for HalfBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HB{}", self.0)
    }
}

/// Output stage state of a half bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Floating,
    Low,
    High,
}

/// Frequency class of a PWM generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Frequency {
    Hz80,
    Hz100,
    Hz200,
}

impl From<PwmChannel> for Frequency {
    fn from(channel: PwmChannel) -> Self {
        match channel {
            PwmChannel::Ch80Hz => Self::Hz80,
            PwmChannel::Ch100Hz => Self::Hz100,
            PwmChannel::Ch200Hz => Self::Hz200,
        }
    }
}

// Bit positions in the driver's global diagnosis register.
pub mod status {
    pub const SPI_ERROR: u8 = 1 << 7;
    pub const OPEN_LOAD: u8 = 1 << 6;
    pub const UNDER_VOLTAGE: u8 = 1 << 5;
    pub const OVER_VOLTAGE: u8 = 1 << 4;
    pub const POWER_ON_RESET: u8 = 1 << 3;
    pub const THERMAL_SHUTDOWN: u8 = 1 << 2;
    pub const THERMAL_WARNING: u8 = 1 << 1;
    pub const ALL_CLEAR: u8 = 0x00;
}

/// Global diagnosis word read back from the driver.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusWord {
    raw: u8,
}

impl StatusWord {
    pub const CLEAR: Self = Self::from_raw(status::ALL_CLEAR);

    #[inline]
    pub const fn from_raw(raw: u8) -> Self {
        Self { raw }
    }

    #[inline]
    pub fn raw(&self) -> u8 {
        self.raw
    }

    #[inline]
    pub fn is_clear(&self) -> bool {
        self.raw == status::ALL_CLEAR
    }

    #[inline]
    pub fn spi_error(&self) -> bool {
        (self.raw & status::SPI_ERROR) != 0
    }

    #[inline]
    pub fn open_load(&self) -> bool {
        (self.raw & status::OPEN_LOAD) != 0
    }

    #[inline]
    pub fn under_voltage(&self) -> bool {
        (self.raw & status::UNDER_VOLTAGE) != 0
    }

    #[inline]
    pub fn over_voltage(&self) -> bool {
        (self.raw & status::OVER_VOLTAGE) != 0
    }

    #[inline]
    pub fn power_on_reset(&self) -> bool {
        (self.raw & status::POWER_ON_RESET) != 0
    }

    /// Overtemperature shutdown.
    #[inline]
    pub fn thermal_shutdown(&self) -> bool {
        (self.raw & status::THERMAL_SHUTDOWN) != 0
    }

    /// Overtemperature pre-warning.
    #[inline]
    pub fn thermal_warning(&self) -> bool {
        (self.raw & status::THERMAL_WARNING) != 0
    }

    pub fn has(&self, kind: FaultKind) -> bool {
        match kind {
            FaultKind::OpenLoad => self.open_load(),
            FaultKind::SpiError => self.spi_error(),
            FaultKind::UnderVoltage => self.under_voltage(),
            FaultKind::OverVoltage => self.over_voltage(),
            FaultKind::PowerOnReset => self.power_on_reset(),
            FaultKind::ThermalShutdown => self.thermal_shutdown(),
            FaultKind::ThermalWarning => self.thermal_warning(),
        }
    }
}

/// Register-level operations the engine needs from the driver IC.
///
/// Every call is synchronous and complete when it returns.
pub trait HalfBridgeDriver {
    type Error: fmt::Debug;

    /// Set one half bridge's output level, PWM source and freewheeling mode.
    fn configure_half_bridge(
        &mut self,
        bridge: HalfBridge,
        level: Level,
        pwm: Option<PwmChannel>,
        freewheeling: Freewheeling,
    ) -> Result<(), Self::Error>;

    /// Program a PWM generator.
    fn configure_pwm(
        &mut self,
        channel: PwmChannel,
        frequency: Frequency,
        duty: u8,
    ) -> Result<(), Self::Error>;

    fn read_status(&mut self) -> Result<StatusWord, Self::Error>;

    /// Clear every latched error condition.
    fn clear_errors(&mut self) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_bits() {
        let word = StatusWord::from_raw(status::UNDER_VOLTAGE | status::THERMAL_WARNING);
        assert!(!word.is_clear());
        assert!(word.under_voltage());
        assert!(word.thermal_warning());
        assert!(!word.spi_error());
        assert!(!word.open_load());
        assert!(StatusWord::CLEAR.is_clear());
    }

    #[test]
    fn test_half_bridge_range() {
        assert!(HalfBridge::new(0).is_none());
        assert!(HalfBridge::new(13).is_none());
        assert_eq!(HalfBridge::all().count(), 12);
        assert_eq!(HalfBridge::all().last().map(HalfBridge::number), Some(12));
    }
}
