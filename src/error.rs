//! Error types.
//!
//! Only two conditions are recoverable: a child address that does not fit a
//! node's narrow slots, and an invalid configuration. Everything else the
//! engine can detect is structural corruption and panics.

use crate::address::LogicalAddress;
use crate::encoding::PointerWidth;

/// A child address could not be stored in a slot of the given width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// The distance between the address and the node's base does not fit.
    AddressOutOfRange {
        /// Address that was being stored.
        address: LogicalAddress,
        /// Encoding base of the node.
        base: LogicalAddress,
        /// Width of the rejecting slot.
        width: PointerWidth,
    },
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::AddressOutOfRange {
                address,
                base,
                width,
            } => write!(
                f,
                "address {} does not fit a {:?} slot relative to base {}",
                address, width, base
            ),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Rejected [`ArtConfig`](crate::ArtConfig) values.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// `compaction_threshold` must lie in `(0, 1]`.
    CompactionThreshold(f64),
    /// `initial_capacity` would reserve more pages than can be addressed.
    InitialCapacity(usize),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::CompactionThreshold(v) => {
                write!(f, "compaction threshold {} is outside (0, 1]", v)
            }
            ConfigError::InitialCapacity(v) => {
                write!(f, "initial capacity of {} bytes is too large", v)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Result type for configuration.
pub type Result<T> = std::result::Result<T, ConfigError>;
