//! Channel numbering and the module's register map.
//!
//! The 25IOB16 exposes 16 output channels and 16 inputs through holding
//! registers:
//!
//! | Register | Access | Meaning |
//! |----------|--------|---------|
//! | 0-15 | write | Control word for channel `register + 1` |
//! | 0 | write | Also accepts the all-channels commands |
//! | 0-15 | read | Output state of channel `register + 1` (non-zero = ON) |
//! | 0x00C0 | read | Input bitmask, bit `i` = channel `i + 1` |
//! | 0x00FA | read/write | Internal input→output logic mode |
//!
//! # Example
//!
//! ```
//! use iob16_modbus::{Channel, ControlValue};
//!
//! let channel = Channel::new(5).unwrap();
//! assert_eq!(channel.register(), 4);
//! assert_eq!(channel.bit(), 4);
//! assert_eq!(ControlValue::Toggle.code(), 0x0300);
//!
//! assert!(Channel::new(0).is_err());
//! assert!(Channel::new(17).is_err());
//! ```

use crate::error::{Error, Result};

/// Number of channels on the module.
pub const CHANNEL_COUNT: u8 = 16;

/// Register that receives the all-channels commands.
pub const ALL_CHANNELS_REGISTER: u16 = 0x0000;

/// First output state register.
pub const OUTPUT_STATUS_START: u16 = 0x0000;

/// Default register holding the input bitmask.
///
/// See [`ClientConfig::with_input_status_address`](crate::ClientConfig::with_input_status_address).
pub const DEFAULT_INPUT_STATUS_REGISTER: u16 = 0x00C0;

/// Register holding the internal logic mode.
pub const LOGIC_MODE_REGISTER: u16 = 0x00FA;

/// A physical I/O line, numbered 1-16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Channel(u8);

impl Channel {
    /// Validates a channel number.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidChannel` if `number` is outside 1-16.
    pub fn new(number: u8) -> Result<Self> {
        if (1..=CHANNEL_COUNT).contains(&number) {
            Ok(Self(number))
        } else {
            Err(Error::invalid_channel(number, CHANNEL_COUNT))
        }
    }

    /// Returns an iterator over channels 1 to 16.
    pub fn all() -> impl Iterator<Item = Channel> {
        (1..=CHANNEL_COUNT).map(Channel)
    }

    /// Channel number (1-16).
    pub fn number(self) -> u8 {
        self.0
    }

    /// Control/status register of this channel.
    pub fn register(self) -> u16 {
        u16::from(self.0 - 1)
    }

    /// Bit position of this channel in the input bitmask.
    pub fn bit(self) -> u8 {
        self.0 - 1
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CH{}", self.0)
    }
}

impl TryFrom<u8> for Channel {
    type Error = Error;

    fn try_from(number: u8) -> Result<Self> {
        Self::new(number)
    }
}

/// Control words accepted by the output registers.
///
/// The per-channel commands go to the channel's own register; the
/// all-channels commands only to [`ALL_CHANNELS_REGISTER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlValue {
    /// Switch the channel on.
    On,
    /// Switch the channel off.
    Off,
    /// Invert the channel.
    Toggle,
    /// Switch every channel on.
    AllOn,
    /// Switch every channel off.
    AllOff,
}

impl ControlValue {
    /// Register value sent for this command.
    pub fn code(self) -> u16 {
        match self {
            ControlValue::On => 0x0100,
            ControlValue::Off => 0x0200,
            ControlValue::Toggle => 0x0300,
            ControlValue::AllOn => 0x0700,
            ControlValue::AllOff => 0x0800,
        }
    }

    /// Returns whether this command addresses every channel at once.
    pub fn is_broadcast(self) -> bool {
        matches!(self, ControlValue::AllOn | ControlValue::AllOff)
    }
}

impl std::fmt::Display for ControlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ControlValue::On => "ON",
            ControlValue::Off => "OFF",
            ControlValue::Toggle => "TOGGLE",
            ControlValue::AllOn => "ALL_ON",
            ControlValue::AllOff => "ALL_OFF",
        };
        write!(f, "{}", name)
    }
}

/// Internal logic the module applies between inputs and outputs.
///
/// With anything but [`LogicMode::Disabled`], the module drives its own
/// outputs from its inputs without a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LogicMode {
    /// No relation between inputs and outputs (factory default).
    Disabled,
    /// An input pulse latches its output.
    SelfLocking,
    /// Interlock across all channels: one output on at a time.
    InterlockAll,
    /// An output follows its input while the input is active.
    Momentary,
    /// Interlock within channel pairs.
    InterlockPairs,
    /// Output N mirrors input N.
    Direct,
}

impl LogicMode {
    /// Every mode, in register-value order.
    pub const ALL: [LogicMode; 6] = [
        LogicMode::Disabled,
        LogicMode::SelfLocking,
        LogicMode::InterlockAll,
        LogicMode::Momentary,
        LogicMode::InterlockPairs,
        LogicMode::Direct,
    ];

    /// Register value for this mode.
    pub fn code(self) -> u16 {
        match self {
            LogicMode::Disabled => 0x0000,
            LogicMode::SelfLocking => 0x0001,
            LogicMode::InterlockAll => 0x0002,
            LogicMode::Momentary => 0x0003,
            LogicMode::InterlockPairs => 0x0004,
            LogicMode::Direct => 0x0005,
        }
    }

    /// Looks up the mode for a register value.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.code() == code)
    }
}

impl std::fmt::Display for LogicMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogicMode::Disabled => "disabled",
            LogicMode::SelfLocking => "self-locking",
            LogicMode::InterlockAll => "interlock (all channels)",
            LogicMode::Momentary => "momentary",
            LogicMode::InterlockPairs => "interlock (pairs)",
            LogicMode::Direct => "direct (output = input)",
        };
        write!(f, "{}", name)
    }
}

/// Logic mode register contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicModeReading {
    /// A documented mode.
    Known(LogicMode),
    /// A value outside the documented modes.
    Unknown(u16),
}

impl LogicModeReading {
    /// Classifies a raw register value.
    pub fn from_raw(raw: u16) -> Self {
        LogicMode::from_code(raw).map_or(Self::Unknown(raw), Self::Known)
    }

    /// Returns the documented mode, if any.
    pub fn mode(self) -> Option<LogicMode> {
        match self {
            Self::Known(mode) => Some(mode),
            Self::Unknown(_) => None,
        }
    }
}
