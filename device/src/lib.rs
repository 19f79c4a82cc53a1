#![cfg_attr(not(test), no_std)]

//! Control engine for a bank of DC motors on a twelve-output half-bridge
//! driver with three shared PWM generators.
//!
//! The engine is hardware agnostic: everything that reaches the driver IC
//! goes through [`HalfBridgeDriver`].

#[macro_use]
mod fmt;

pub mod driver;
pub mod error;
pub mod motor;

#[cfg(test)]
mod mock;

pub use driver::{HalfBridge, HalfBridgeDriver, Level, StatusWord};
pub use error::Error;
pub use motor::MotorControl;
pub use motor::bridge::WiringDensity;
pub use motor::config::ControllerConfig;
pub use motor::pwm::RampOutcome;
pub use motorbank_protocol as protocol;
