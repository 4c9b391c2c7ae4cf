use thiserror::Error;

use crate::band::BandId;

pub type Result<T> = std::result::Result<T, CatError>;

#[derive(Debug, Error)]
pub enum CatError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not connected to the radio")]
    NotConnected,

    #[error("timeout waiting for response")]
    Timeout,

    #[error("frequency out of range: {0} Hz")]
    FrequencyOutOfRange(u64),

    #[error("invalid frequency: {0:?}")]
    InvalidFrequency(String),

    #[error("invalid RF power level: {0:?}")]
    InvalidPowerLevel(String),

    #[error("no band plan covers the current frequency")]
    NoBand,

    #[error("band {0} has an invalid step")]
    InvalidStep(BandId),

    #[error("a scan is already running")]
    ScanActive,
}
