use core::fmt::Debug;

use thiserror::Error;

/// Errors surfaced by the engine.
///
/// Hardware faults reported in the driver status word are not errors: they
/// are decoded into fault reports and cleared. Only a failing driver call
/// aborts an operation.
#[derive(Debug, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E: Debug> {
    #[error("driver access failed: {0:?}")]
    Driver(E),
}

