/*
 * Driver Parameters
 *
 * Load-time parameters of the scull driver, given as a whitespace separated
 * `key=value` list (the module command line):
 *
 *   scull_major=0 scull_minor=0 scull_nr_devs=2
 *
 * A major of 0 asks for a dynamically allocated major number.
 */

use crate::io::Errno;

/// Number of minor bits in a device number
const MINOR_SPACE: u64 = 1 << 20;

/// Parameter errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Key is not a known parameter
    UnknownParameter,
    /// Token is not `key=value` or the value is not a number
    MalformedValue,
    /// No devices requested
    NoDevices,
    /// Minor range runs past the minor space
    MinorOverflow,
    /// Major does not fit in 12 bits
    MajorOverflow,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::UnknownParameter => write!(f, "Unknown parameter"),
            ConfigError::MalformedValue => write!(f, "Malformed parameter value"),
            ConfigError::NoDevices => write!(f, "scull_nr_devs must be at least 1"),
            ConfigError::MinorOverflow => write!(f, "Minor range exceeds the minor space"),
            ConfigError::MajorOverflow => write!(f, "Major number too large"),
        }
    }
}

impl From<ConfigError> for Errno {
    fn from(_: ConfigError) -> Self {
        Errno::EINVAL
    }
}

/// Scull driver parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScullConfig {
    /// Major number; 0 = allocate dynamically
    pub major: u32,
    /// First minor number
    pub minor: u32,
    /// Number of device instances
    pub nr_devs: usize,
}

impl Default for ScullConfig {
    fn default() -> Self {
        Self {
            major: 0,
            minor: 0,
            nr_devs: 2,
        }
    }
}

impl ScullConfig {
    /// Parse a parameter line on top of the defaults
    pub fn from_params(params: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for token in params.split_whitespace() {
            let (key, value) = token.split_once('=').ok_or(ConfigError::MalformedValue)?;
            match key {
                "scull_major" => config.major = parse_value(value)?,
                "scull_minor" => config.minor = parse_value(value)?,
                "scull_nr_devs" => config.nr_devs = parse_value(value)?,
                _ => {
                    log::warn!("scull: unknown parameter '{}'", key);
                    return Err(ConfigError::UnknownParameter);
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the parameters describe a registrable device range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nr_devs == 0 {
            return Err(ConfigError::NoDevices);
        }
        if self.major > crate::devices::chrdev::MAX_MAJOR {
            return Err(ConfigError::MajorOverflow);
        }
        if self.minor as u64 + self.nr_devs as u64 > MINOR_SPACE {
            return Err(ConfigError::MinorOverflow);
        }
        Ok(())
    }

    /// Whether the major number is allocated at init time
    pub fn is_dynamic(&self) -> bool {
        self.major == 0
    }
}

fn parse_value<T: core::str::FromStr>(value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::MalformedValue)
}
