use std::sync::Arc;

use log::{debug, warn};

use crate::command::{Command, MeterCommand, POWER_MIN, clamp_power, op};
use crate::error::{CatError, Result};
use crate::frequency::Frequency;
use crate::link::Link;
use crate::mode::OperatingMode;
use crate::response;

/// Typed FT-991A operations on top of [`Link::execute`].
///
/// Reads never fail: a missing or malformed reply resolves to the sentinel
/// documented on each method. Writes report `NotConnected` when the command
/// could not be sent.
pub struct Rig {
    link: Arc<Link>,
    signal_meter: MeterCommand,
}

impl Rig {
    pub fn new(link: Arc<Link>) -> Self {
        Self {
            link,
            signal_meter: MeterCommand::default(),
        }
    }

    /// Use `meter` instead of `SM0` when reading signal strength.
    pub fn with_signal_meter(mut self, meter: MeterCommand) -> Self {
        self.signal_meter = meter;
        self
    }

    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }

    fn send(&self, command: Command) -> Result<()> {
        self.link
            .execute(&command)
            .map(|_| ())
            .ok_or(CatError::NotConnected)
    }

    fn query(&self, command: Command) -> Option<String> {
        self.link.execute(&command)
    }

    // --- Frequency ---

    pub fn set_frequency(&self, freq: Frequency) -> Result<()> {
        self.send(Command::set_frequency(freq))
    }

    /// Tune to `mhz`, rounded half-up to the nearest Hz.
    pub fn set_frequency_mhz(&self, mhz: f64) -> Result<Frequency> {
        let freq = Frequency::from_mhz(mhz)?;
        self.set_frequency(freq)?;
        Ok(freq)
    }

    /// Read VFO-A. Returns `Frequency::ZERO` when the radio gives no usable answer.
    pub fn get_frequency(&self) -> Frequency {
        response::parse_frequency(self.query(Command::read_frequency()).as_deref())
    }

    // --- Mode ---

    /// Select a mode by label ("USB", "fm", ...).
    ///
    /// Returns `Ok(false)` without sending anything if the label is not one
    /// of the selectable modes.
    pub fn set_mode(&self, label: &str) -> Result<bool> {
        let Some(mode) = OperatingMode::from_label(label) else {
            debug!("ignoring unknown mode label {label:?}");
            return Ok(false);
        };
        self.set_operating_mode(mode)?;
        Ok(true)
    }

    pub fn set_operating_mode(&self, mode: OperatingMode) -> Result<()> {
        self.send(Command::set_mode(mode))
    }

    /// Read the mode, retrying with the short `MD;` form if `MD0;` goes
    /// unanswered. `None` means no mode could be determined.
    pub fn get_mode(&self) -> Option<OperatingMode> {
        let reply = self
            .query(Command::read_mode())
            .filter(|r| !r.is_empty())
            .or_else(|| self.query(Command::read_mode_short()));
        response::parse_mode(reply.as_deref())
    }

    // --- Power ---

    /// Set RF power, clamped to 5–100 W. Returns the level sent.
    pub fn set_rf_power(&self, level: i64) -> Result<u8> {
        let command = Command::set_power(level);
        let sent = clamp_power(level);
        if i64::from(sent) != level {
            debug!("clamped RF power {level} to {sent}");
        }
        self.send(command)?;
        Ok(sent)
    }

    /// Set RF power from text such as `"50"`. Non-integer text is rejected
    /// and nothing is sent.
    pub fn set_rf_power_str(&self, level: &str) -> Result<u8> {
        let parsed = level.trim().parse::<i64>().map_err(|_| {
            warn!("rejecting RF power {level:?}");
            CatError::InvalidPowerLevel(level.to_string())
        })?;
        self.set_rf_power(parsed)
    }

    /// Read the RF power setting. 0 means no usable answer.
    pub fn get_rf_power(&self) -> u8 {
        let watts = response::parse_field(self.query(Command::read_power()).as_deref(), op::POWER);
        match u8::try_from(watts) {
            Ok(w) if w >= POWER_MIN => w,
            _ => 0,
        }
    }

    // --- Meters ---

    /// Read the S-meter (0–255) with `SM0`.
    pub fn get_s_meter(&self) -> u8 {
        self.read_meter(MeterCommand::SMeter)
    }

    /// Read signal strength with the configured meter command.
    pub fn get_signal_strength(&self) -> u8 {
        self.read_meter(self.signal_meter)
    }

    /// Read the SWR meter (`RM6`).
    pub fn get_swr(&self) -> u8 {
        self.read_meter(MeterCommand::Rm6)
    }

    fn read_meter(&self, meter: MeterCommand) -> u8 {
        let reply = self.query(Command::read_meter(meter));
        let level = response::parse_field(reply.as_deref(), meter.opcode());
        level.min(u16::from(u8::MAX)) as u8
    }

    // --- Transmit ---

    pub fn ptt_on(&self) -> Result<()> {
        self.send(Command::transmit(true))
    }

    pub fn ptt_off(&self) -> Result<()> {
        self.send(Command::transmit(false))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::link::LinkConfig;
    use crate::sim::SimulatedRig;

    fn rig_on(sim: &SimulatedRig) -> Rig {
        let link = Link::new(
            sim.connector(),
            LinkConfig {
                timeout: Duration::from_millis(100),
            },
        );
        link.connect("sim", 38400).unwrap();
        Rig::new(Arc::new(link))
    }

    fn last_command(sim: &SimulatedRig) -> String {
        sim.commands().last().map(|c| c.text.clone()).unwrap_or_default()
    }

    #[test]
    fn test_frequency_round_trip() {
        let sim = SimulatedRig::new();
        let rig = rig_on(&sim);

        let sent = rig.set_frequency_mhz(14.000000).unwrap();
        assert_eq!(last_command(&sim), "FA014000000");

        let read = rig.get_frequency();
        assert_eq!(read, sent);
        assert_eq!(read.mhz(), 14.0);
    }

    #[test]
    fn test_set_frequency_rounds_half_up() {
        let sim = SimulatedRig::new();
        let rig = rig_on(&sim);

        rig.set_frequency_mhz(13.9999998).unwrap();
        assert_eq!(last_command(&sim), "FA014000000");
        rig.set_frequency_mhz(146.94).unwrap();
        assert_eq!(last_command(&sim), "FA146940000");
    }

    #[test]
    fn test_out_of_range_frequency_not_sent() {
        let sim = SimulatedRig::new();
        let rig = rig_on(&sim);

        assert!(rig.set_frequency_mhz(1500.0).is_err());
        assert!(sim.commands().is_empty());
    }

    #[test]
    fn test_get_frequency_sentinel_when_unanswered() {
        let sim = SimulatedRig::new();
        sim.mute("FA");
        let rig = rig_on(&sim);
        assert_eq!(rig.get_frequency(), Frequency::ZERO);
    }

    #[test]
    fn test_get_frequency_when_disconnected() {
        let sim = SimulatedRig::new();
        let rig = rig_on(&sim);
        rig.link().disconnect();

        assert_eq!(rig.get_frequency(), Frequency::ZERO);
        assert!(matches!(rig.set_frequency_mhz(7.0), Err(CatError::NotConnected)));
    }

    #[test]
    fn test_set_mode() {
        let sim = SimulatedRig::new();
        let rig = rig_on(&sim);

        assert!(rig.set_mode("fm").unwrap());
        assert_eq!(sim.mode_code(), '4');
        assert!(rig.set_mode("C4FM").unwrap());
        assert_eq!(sim.mode_code(), 'E');
    }

    #[test]
    fn test_set_unknown_mode_is_noop() {
        let sim = SimulatedRig::new();
        let rig = rig_on(&sim);

        assert!(!rig.set_mode("WFM").unwrap());
        assert!(sim.commands().is_empty());
    }

    #[test]
    fn test_get_mode() {
        let sim = SimulatedRig::new();
        sim.set_mode_code('A');
        let rig = rig_on(&sim);
        assert_eq!(rig.get_mode(), Some(OperatingMode::DataFm));
    }

    #[test]
    fn test_get_mode_falls_back_to_short_query() {
        let sim = SimulatedRig::new();
        sim.mute("MD0");
        sim.set_mode_code('4');
        let rig = rig_on(&sim);

        assert_eq!(rig.get_mode(), Some(OperatingMode::Fm));
        let texts: Vec<_> = sim.commands().into_iter().map(|c| c.text).collect();
        assert_eq!(texts, ["MD0", "MD"]);
    }

    #[test]
    fn test_get_mode_unknown_code() {
        let sim = SimulatedRig::new();
        sim.set_mode_code('B');
        let rig = rig_on(&sim);
        assert_eq!(rig.get_mode(), None);
    }

    #[test]
    fn test_set_rf_power_clamps() {
        let sim = SimulatedRig::new();
        let rig = rig_on(&sim);

        for (requested, expected) in [(0, 5), (4, 5), (5, 5), (42, 42), (100, 100), (101, 100), (-7, 5)] {
            assert_eq!(rig.set_rf_power(requested).unwrap(), expected);
            assert_eq!(last_command(&sim), format!("PC{expected:03}"));
            assert_eq!(rig.get_rf_power(), expected);
        }
    }

    #[test]
    fn test_set_rf_power_rejects_text() {
        let sim = SimulatedRig::new();
        let rig = rig_on(&sim);

        assert!(matches!(
            rig.set_rf_power_str("lots"),
            Err(CatError::InvalidPowerLevel(_))
        ));
        assert!(rig.set_rf_power_str("12.5").is_err());
        assert!(sim.commands().is_empty());

        assert_eq!(rig.set_rf_power_str(" 250 ").unwrap(), 100);
    }

    #[test]
    fn test_meters() {
        let sim = SimulatedRig::with_signal(|_| 120);
        sim.set_swr(12);
        let rig = rig_on(&sim);

        assert_eq!(rig.get_s_meter(), 120);
        assert_eq!(rig.get_swr(), 12);
        let rm1 = Rig::new(Arc::clone(rig.link())).with_signal_meter(MeterCommand::Rm1);
        assert_eq!(rm1.get_signal_strength(), 120);
        assert_eq!(last_command(&sim), "RM1");
    }

    #[test]
    fn test_meters_when_unanswered() {
        let sim = SimulatedRig::with_signal(|_| 120);
        sim.mute("SM0");
        sim.mute("PC");
        let rig = rig_on(&sim);

        assert_eq!(rig.get_s_meter(), 0);
        assert_eq!(rig.get_rf_power(), 0);
    }

    #[test]
    fn test_ptt() {
        let sim = SimulatedRig::new();
        let rig = rig_on(&sim);

        rig.ptt_on().unwrap();
        assert!(sim.transmitting());
        rig.ptt_off().unwrap();
        assert!(!sim.transmitting());
    }
}
