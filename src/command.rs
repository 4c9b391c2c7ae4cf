use std::fmt;

use crate::frequency::Frequency;
use crate::mode::OperatingMode;

/// Every command and every response ends with this byte.
pub const TERMINATOR: u8 = b';';

/// Lowest RF power setting the radio accepts (watts).
pub const POWER_MIN: u8 = 5;
/// Highest RF power setting the radio accepts (watts).
pub const POWER_MAX: u8 = 100;

/// Yaesu ASCII CAT opcodes.
pub mod op {
    /// VFO-A frequency, 9 digits in Hz.
    pub const FREQUENCY_A: &str = "FA";
    /// Main-receiver operating mode.
    pub const MODE: &str = "MD0";
    /// Short mode query accepted by older firmware.
    pub const MODE_SHORT: &str = "MD";
    /// S-meter of the main receiver (000–255).
    pub const S_METER: &str = "SM0";
    /// Front-panel meter 1 (S / power, depending on firmware).
    pub const READ_METER_1: &str = "RM1";
    /// Front-panel meter 6 (SWR).
    pub const READ_METER_6: &str = "RM6";
    /// RF power setting, 3 digits in watts.
    pub const POWER: &str = "PC";
    /// Transmit (PTT) control.
    pub const TRANSMIT: &str = "TX";
}

/// Which read-out to use as "signal strength".
///
/// Firmware revisions disagree on whether `RM1` or `RM6` carries the receive
/// level; `SM0` is the one every FT-991A answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MeterCommand {
    #[default]
    SMeter,
    Rm1,
    Rm6,
}

impl MeterCommand {
    pub fn opcode(self) -> &'static str {
        match self {
            Self::SMeter => op::S_METER,
            Self::Rm1 => op::READ_METER_1,
            Self::Rm6 => op::READ_METER_6,
        }
    }
}

/// Clamp a requested RF power level into the radio's accepted range.
pub fn clamp_power(level: i64) -> u8 {
    level.clamp(i64::from(POWER_MIN), i64::from(POWER_MAX)) as u8
}

/// A single CAT command: opcode, optional payload, and whether the radio
/// answers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    opcode: &'static str,
    payload: Option<String>,
    expects_response: bool,
}

impl Command {
    /// A read command (`FA;`, `PC;`, ...). The radio answers it.
    pub fn query(opcode: &'static str) -> Self {
        Self {
            opcode,
            payload: None,
            expects_response: true,
        }
    }

    /// A set command with a payload. The radio does not answer it.
    pub fn set(opcode: &'static str, payload: impl Into<String>) -> Self {
        Self {
            opcode,
            payload: Some(payload.into()),
            expects_response: false,
        }
    }

    pub fn read_frequency() -> Self {
        Self::query(op::FREQUENCY_A)
    }

    pub fn set_frequency(freq: Frequency) -> Self {
        Self::set(op::FREQUENCY_A, freq.to_cat_digits())
    }

    pub fn read_mode() -> Self {
        Self::query(op::MODE)
    }

    pub fn read_mode_short() -> Self {
        Self::query(op::MODE_SHORT)
    }

    pub fn set_mode(mode: OperatingMode) -> Self {
        Self::set(op::MODE, mode.cat_code().to_string())
    }

    pub fn read_meter(meter: MeterCommand) -> Self {
        Self::query(meter.opcode())
    }

    pub fn read_power() -> Self {
        Self::query(op::POWER)
    }

    /// Set RF power. The level is clamped to 5–100 W before formatting.
    pub fn set_power(level: i64) -> Self {
        Self::set(op::POWER, format!("{:03}", clamp_power(level)))
    }

    pub fn transmit(on: bool) -> Self {
        Self::set(op::TRANSMIT, if on { "1" } else { "0" })
    }

    pub fn opcode(&self) -> &'static str {
        self.opcode
    }

    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    pub fn expects_response(&self) -> bool {
        self.expects_response
    }

    /// Serialize to the wire form, terminator included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = self.payload.as_deref().unwrap_or("");
        let mut bytes = Vec::with_capacity(self.opcode.len() + payload.len() + 1);
        bytes.extend_from_slice(self.opcode.as_bytes());
        bytes.extend_from_slice(payload.as_bytes());
        bytes.push(TERMINATOR);
        bytes
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{};", self.opcode, self.payload.as_deref().unwrap_or(""))
    }
}
