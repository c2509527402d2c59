use bitflags::bitflags;

use crate::ConfigError;

bitflags! {
    /// Behavioural switches for a loader-backed stream.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct StreamOptions: u8 {
        /// Start loading while building instead of on first subscription.
        const LOAD_ON_INIT               = 1 << 0;

        /// Reload whenever the application becomes active.
        const RELOAD_ON_ACTIVE           = 1 << 1;

        /// Reload without publishing `Loading`; the last state stays visible.
        const RELOADS_SILENTLY           = 1 << 2;

        /// End value sequences with `Error::Cancelled` instead of silently.
        const THROWS_CANCELLATION_ERRORS = 1 << 3;
    }
}

impl StreamOptions {
    /// Parses raw option bits, rejecting unknown ones.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownOptions`] carrying the unrecognized bits.
    pub fn from_raw(bits: u8) -> Result<Self, ConfigError> {
        match Self::from_bits(bits) {
            Some(options) => Ok(options),
            None => Err(ConfigError::UnknownOptions(bits & !Self::all().bits())),
        }
    }
}
