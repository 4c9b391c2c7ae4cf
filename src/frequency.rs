use std::fmt;

use crate::error::{CatError, Result};

/// Largest frequency the 9-digit `FA` field can carry.
pub const MAX_HZ: u64 = 999_999_999;

const HZ_PER_MHZ: u64 = 1_000_000;
const MHZ_FRACTION_DIGITS: usize = 6;

/// A radio frequency stored as Hz.
///
/// Yaesu ASCII CAT carries frequencies as 9 zero-padded decimal digits
/// with 1 Hz resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Frequency(u64);

impl Frequency {
    /// The "no reading" sentinel returned when the radio gives no usable answer.
    pub const ZERO: Self = Self(0);

    /// Create a `Frequency` from a value in Hz.
    pub fn from_hz(hz: u64) -> Result<Self> {
        if hz > MAX_HZ {
            return Err(CatError::FrequencyOutOfRange(hz));
        }
        Ok(Self(hz))
    }

    /// For compile-time tables. An out-of-range value fails const evaluation.
    pub const fn from_hz_const(hz: u64) -> Self {
        assert!(hz <= MAX_HZ, "frequency exceeds the 9-digit CAT field");
        Self(hz)
    }

    /// Create a `Frequency` from a value in MHz.
    ///
    /// The float is taken at its shortest decimal representation and rounded
    /// half-up to the nearest Hz, so `14.0` is always 14 000 000 Hz and never
    /// 13 999 999 Hz.
    pub fn from_mhz(mhz: f64) -> Result<Self> {
        if !mhz.is_finite() || mhz < 0.0 {
            return Err(CatError::InvalidFrequency(mhz.to_string()));
        }
        Self::from_mhz_str(&mhz.to_string())
    }

    /// Parse a decimal MHz string such as `"146.94"` or `"7.0745"`.
    ///
    /// Digits past the 1 Hz position are rounded half-up.
    pub fn from_mhz_str(text: &str) -> Result<Self> {
        let invalid = || CatError::InvalidFrequency(text.to_string());
        let text = text.trim();

        let (whole, fraction) = match text.split_once('.') {
            Some((w, f)) => (w, f),
            None => (text, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole_mhz: u64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| CatError::FrequencyOutOfRange(u64::MAX))?
        };

        let digits = fraction.as_bytes();
        let mut fraction_hz: u64 = 0;
        for i in 0..MHZ_FRACTION_DIGITS {
            let d = digits.get(i).map_or(0, |b| u64::from(b - b'0'));
            fraction_hz = fraction_hz * 10 + d;
        }
        let round_up = digits.get(MHZ_FRACTION_DIGITS).is_some_and(|&b| b >= b'5');

        let hz = whole_mhz
            .checked_mul(HZ_PER_MHZ)
            .and_then(|hz| hz.checked_add(fraction_hz + u64::from(round_up)))
            .ok_or(CatError::FrequencyOutOfRange(u64::MAX))?;
        Self::from_hz(hz)
    }

    /// Return the frequency in Hz.
    pub fn hz(self) -> u64 {
        self.0
    }

    /// Return the frequency in kHz.
    pub fn khz(self) -> f64 {
        self.0 as f64 / 1_000.0
    }

    /// Return the frequency in MHz.
    pub fn mhz(self) -> f64 {
        self.0 as f64 / HZ_PER_MHZ as f64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// The 9-digit zero-padded field used by `FA`.
    pub fn to_cat_digits(self) -> String {
        format!("{:09}", self.0)
    }

    /// Parse a `FA` digit field. Anything other than plain digits is rejected.
    pub fn from_cat_digits(digits: &str) -> Result<Self> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CatError::InvalidFrequency(digits.to_string()));
        }
        let hz = digits
            .parse::<u64>()
            .map_err(|_| CatError::InvalidFrequency(digits.to_string()))?;
        Self::from_hz(hz)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mhz = self.0 / 1_000_000;
        let khz = (self.0 % 1_000_000) / 1_000;
        let hz = self.0 % 1_000;
        write!(f, "{mhz}.{khz:03}.{hz:03} MHz")
    }
}
