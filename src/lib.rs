pub mod arbiter;
pub mod band;
pub mod command;
pub mod error;
pub mod events;
pub mod frequency;
pub mod link;
pub mod mode;
pub mod poller;
pub mod response;
pub mod rig;
pub mod scanner;
pub mod shutdown;
pub mod sim;
pub mod transport;

pub use arbiter::LinkArbiter;
pub use band::{BandId, BandPlan};
pub use command::{Command, MeterCommand};
pub use error::{CatError, Result};
pub use events::{Event, EventReceiver, EventSender, Status};
pub use frequency::Frequency;
pub use link::{Link, LinkConfig};
pub use mode::OperatingMode;
pub use poller::{PollConfig, Poller};
pub use rig::Rig;
pub use scanner::{ScanConfig, Scanner};
pub use shutdown::Shutdown;
