use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use log::{debug, error, info, warn};

use yaesu_cat::events::{self, Event, EventReceiver};
use yaesu_cat::sim::SimulatedRig;
use yaesu_cat::transport::serial;
use yaesu_cat::{
    BandId, Link, LinkArbiter, LinkConfig, MeterCommand, PollConfig, Poller, Rig, ScanConfig,
    Scanner, Shutdown,
};

#[derive(Parser, Debug)]
#[command(name = "yaesu-cat", version, about = "Headless CAT controller for the Yaesu FT-991A")]
struct Cli {
    /// Serial port the radio is attached to
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// CAT baud rate (must match the radio's CAT RATE menu)
    #[arg(short, long, default_value_t = 38400)]
    baud: u32,

    /// Reply timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Scan this band (160m, 80m, 40m, 20m, 15m, 10m, 6m, 2m, 70cm)
    #[arg(long, conflicts_with = "auto_scan")]
    scan: Option<BandId>,

    /// Scan the band containing the radio's current frequency
    #[arg(long)]
    auto_scan: bool,

    /// Signal strength (0-255) that counts as activity
    #[arg(long, default_value_t = 40)]
    squelch: u8,

    /// How long to stay on an active frequency, in milliseconds
    #[arg(long, default_value_t = 3000)]
    dwell_ms: u64,

    /// Meter read as signal strength while scanning
    #[arg(long, value_enum, default_value_t = Meter::Sm0)]
    meter: Meter,

    /// Talk to a built-in simulated radio instead of a serial port
    #[arg(long)]
    simulate: bool,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Meter {
    Sm0,
    Rm1,
    Rm6,
}

impl From<Meter> for MeterCommand {
    fn from(meter: Meter) -> Self {
        match meter {
            Meter::Sm0 => MeterCommand::SMeter,
            Meter::Rm1 => MeterCommand::Rm1,
            Meter::Rm6 => MeterCommand::Rm6,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if cli.list_ports {
        return match serial::available_port_names() {
            Ok(names) => {
                for name in names {
                    println!("{name}");
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("could not list serial ports: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let link_config = LinkConfig {
        timeout: Duration::from_millis(cli.timeout_ms),
    };
    let (link, port) = if cli.simulate {
        // A repeater on the 2m calling channel so a scan has something to find.
        let sim = SimulatedRig::with_signal(|hz| {
            if (146_932_500..=146_947_500).contains(&hz) { 120 } else { 5 }
        });
        (Link::new(sim.connector(), link_config), "simulated".to_string())
    } else {
        (Link::serial(link_config), cli.port.clone())
    };

    if let Err(e) = link.connect(&port, cli.baud) {
        error!("failed to connect to {port} at {} baud: {e}", cli.baud);
        eprintln!();
        eprintln!("Troubleshooting:");
        eprintln!("  1. Connect the FT-991A via its USB port");
        eprintln!("  2. Match MENU 031 CAT RATE to --baud");
        eprintln!("  3. Pass the Enhanced COM port with --port (see --list-ports)");
        return ExitCode::FAILURE;
    }

    let rig = Arc::new(Rig::new(Arc::new(link)).with_signal_meter(cli.meter.into()));
    let arbiter = LinkArbiter::new();
    let shutdown = Shutdown::new();
    let (tx, rx) = events::channel();

    let poller = match Poller::spawn(
        Arc::clone(&rig),
        Arc::clone(&arbiter),
        tx.clone(),
        shutdown.clone(),
        PollConfig::default(),
    ) {
        Ok(poller) => poller,
        Err(e) => {
            error!("failed to start poller: {e}");
            rig.link().disconnect();
            return ExitCode::FAILURE;
        }
    };

    let mut scanner = Scanner::new(
        Arc::clone(&rig),
        arbiter,
        tx,
        shutdown.clone(),
        ScanConfig {
            squelch: cli.squelch,
            dwell: Duration::from_millis(cli.dwell_ms),
            ..ScanConfig::default()
        },
    );
    if cli.scan.is_some() || cli.auto_scan {
        if let Err(e) = scanner.start(cli.scan) {
            warn!("scan not started: {e}");
        }
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to create tokio runtime: {e}");
            scanner.stop();
            shutdown.trigger();
            poller.join();
            rig.link().disconnect();
            return ExitCode::FAILURE;
        }
    };
    rt.block_on(consume(rx));

    info!("shutting down");
    scanner.stop();
    shutdown.trigger();
    poller.join();
    rig.link().disconnect();
    ExitCode::SUCCESS
}

/// Log every event until Ctrl-C.
async fn consume(mut rx: EventReceiver) {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = rx.recv() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
        }
    }
}

fn log_event(event: &Event) {
    match event {
        Event::FrequencyChanged(freq) => debug!("frequency {freq}"),
        Event::SMeterChanged(level) => debug!("s-meter {level}"),
        Event::ModeChanged(mode) => info!("mode {mode}"),
        Event::PowerChanged(watts) => info!("power {watts} W"),
        Event::StatusChanged(status) => info!("status: {status}"),
        Event::TransmitEnabled(true) => info!("transmit enabled"),
        Event::TransmitEnabled(false) => info!("transmit disabled"),
        Event::SignalLogged(d) => info!(
            "{} signal {} on {} ({})",
            d.timestamp.format("%H:%M:%S"),
            d.strength,
            d.frequency,
            d.note
        ),
    }
}
