//! Pin value types used on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Digital pin level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    High,
    Low,
}

impl Level {
    /// Wire value: `1` or `0`.
    pub fn as_wire(self) -> u8 {
        match self {
            Self::High => 1,
            Self::Low => 0,
        }
    }

    /// `1` decodes to `High`; every other value decodes to `Low`.
    pub fn from_wire(value: i64) -> Self {
        if value == 1 {
            Self::High
        } else {
            Self::Low
        }
    }

    pub fn is_high(self) -> bool {
        self == Self::High
    }

    pub fn is_low(self) -> bool {
        self == Self::Low
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::High => Self::Low,
            Self::Low => Self::High,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::High => "high",
            Self::Low => "low",
        })
    }
}

/// Pin mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Input,
    InputPullup,
    Output,
}

impl Mode {
    /// Wire value: `i`, `I` or `o`.
    pub fn as_wire(self) -> char {
        match self {
            Self::Input => 'i',
            Self::InputPullup => 'I',
            Self::Output => 'o',
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::InputPullup => "input_pullup",
            Self::Output => "output",
        })
    }
}

/// Logical on/off state, as seen by device adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    On,
    #[default]
    Off,
}

impl State {
    pub fn is_on(self) -> bool {
        self == Self::On
    }

    pub fn is_off(self) -> bool {
        self == Self::Off
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::On => "on",
            Self::Off => "off",
        })
    }
}
