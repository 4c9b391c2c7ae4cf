use std::fmt;
use std::str::FromStr;

use crate::frequency::Frequency;
use crate::mode::OperatingMode;

/// Identifies one entry of the band plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BandId {
    M160,
    M80,
    M40,
    M20,
    M15,
    M10,
    M6,
    M2,
    Cm70,
}

/// A scannable frequency range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandPlan {
    pub id: BandId,
    pub name: &'static str,
    pub start: Frequency,
    pub end: Frequency,
    pub step_hz: u64,
    pub default_mode: OperatingMode,
}

const fn plan(
    id: BandId,
    name: &'static str,
    start_hz: u64,
    end_hz: u64,
    step_hz: u64,
    default_mode: OperatingMode,
) -> BandPlan {
    BandPlan {
        id,
        name,
        start: Frequency::from_hz_const(start_hz),
        end: Frequency::from_hz_const(end_hz),
        step_hz,
        default_mode,
    }
}

/// The fixed band plan, lowest band first.
pub const BANDS: [BandPlan; 9] = [
    plan(BandId::M160, "160m", 1_800_000, 2_000_000, 1_000, OperatingMode::Lsb),
    plan(BandId::M80, "80m", 3_500_000, 4_000_000, 1_000, OperatingMode::Lsb),
    plan(BandId::M40, "40m", 7_000_000, 7_300_000, 1_000, OperatingMode::Lsb),
    plan(BandId::M20, "20m", 14_000_000, 14_350_000, 1_000, OperatingMode::Usb),
    plan(BandId::M15, "15m", 21_000_000, 21_450_000, 1_000, OperatingMode::Usb),
    plan(BandId::M10, "10m", 28_000_000, 29_700_000, 10_000, OperatingMode::Usb),
    plan(BandId::M6, "6m", 50_000_000, 54_000_000, 10_000, OperatingMode::Usb),
    plan(BandId::M2, "2m", 144_000_000, 148_000_000, 15_000, OperatingMode::Fm),
    plan(BandId::Cm70, "70cm", 420_000_000, 450_000_000, 25_000, OperatingMode::Fm),
];

/// `BANDS` is laid out in `BandId` declaration order.
pub fn by_id(id: BandId) -> &'static BandPlan {
    &BANDS[id as usize]
}

/// The band whose [start, end] contains `freq`, if any.
pub fn containing(freq: Frequency) -> Option<&'static BandPlan> {
    BANDS.iter().find(|b| b.contains(freq))
}

impl BandPlan {
    pub fn contains(&self, freq: Frequency) -> bool {
        self.start <= freq && freq <= self.end
    }

    /// Bring `freq` into the band: below the band starts at `start`, past
    /// the end wraps around to `start`.
    pub fn clamp(&self, freq: Frequency) -> Frequency {
        if self.contains(freq) { freq } else { self.start }
    }

    /// The next frequency of the sweep after `freq`, wrapping to `start`
    /// when a step would leave the band.
    pub fn step_from(&self, freq: Frequency) -> Frequency {
        let current = self.clamp(freq);
        match current.hz().checked_add(self.step_hz) {
            Some(next) if next <= self.end.hz() => Frequency::from_hz_const(next),
            _ => self.start,
        }
    }
}

impl fmt::Display for BandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(by_id(*self).name)
    }
}

impl FromStr for BandId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BANDS
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(s.trim()))
            .map(|b| b.id)
            .ok_or_else(|| {
                let names: Vec<_> = BANDS.iter().map(|b| b.name).collect();
                format!("unknown band {s:?} (expected one of {})", names.join(", "))
            })
    }
}
