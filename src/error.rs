//! Error types.
//!
//! Protocol violations inside well-formed MAC commands are not errors: the
//! device answers them with negative acknowledgment bits. The types here
//! cover bytes that cannot be decoded at all, command fields that do not fit
//! their wire width, and unusable configuration.

use thiserror::Error;

/// Errors while decoding or encoding a LoRaWAN frame.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    /// Input ended before a complete field
    #[error("Truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// MType bits do not name a data frame
    #[error("Unsupported message type: {0:#05b}")]
    UnsupportedMessageType(u8),

    /// CID with no known length, the rest of FOpts cannot be parsed
    #[error("Unknown MAC command CID: 0x{0:02x}")]
    UnknownCommand(u8),

    /// Commands do not fit in the 15-byte FOpts field
    #[error("FOpts too long: {0} bytes exceeds 15")]
    FOptsTooLong(usize),

    /// Command could not be built from its fields
    #[error("Invalid command: {0}")]
    Command(#[from] CommandError),
}

/// A MAC command field does not fit in its bit allotment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("{field} value {value} exceeds {bits} bits")]
    FieldTooWide {
        field: &'static str,
        value: u32,
        bits: u8,
    },
}

impl CommandError {
    /// Check that `value` fits in `bits` bits.
    pub(crate) fn check(field: &'static str, value: u32, bits: u8) -> Result<(), Self> {
        if value >> bits != 0 {
            return Err(Self::FieldTooWide { field, value, bits });
        }
        Ok(())
    }
}

/// Configuration could not be loaded or is inconsistent.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
