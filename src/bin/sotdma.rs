use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use sotdma::phy::{MacAddress, Position};
use sotdma::runtime::SmallRngSource;
use sotdma::sim::{SimChannel, Simulator, Station};
use sotdma::stdma::{SotdmaConfig, TraceEvent};
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(name = "sotdma", version = "0.1.0", author = "Sotdma")]
#[clap(about = "A command line interface for simulated sotdma networks", long_about = None)]
struct SotdmaCli {
    #[clap(subcommand)]
    subcmd: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a simulated scenario and print trace events as JSON lines.
    Run {
        /// The number of stations sharing the channel.
        #[clap(short, long, default_value = "2")]
        stations: usize,
        /// Simulated time in seconds.
        #[clap(short, long, default_value = "5.0")]
        duration: f64,
        /// Base seed of the per-station randomness.
        #[clap(long, default_value = "1")]
        seed: u64,
        /// A JSON station configuration. Defaults apply when omitted.
        #[clap(short, long)]
        config: Option<PathBuf>,
        /// Payload octets enqueued per beacon.
        #[clap(long, default_value = "128")]
        payload: usize,
        /// Beacon interval in milliseconds.
        #[clap(long, default_value = "100")]
        interval: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = SotdmaCli::parse();
    match cli.subcmd {
        Commands::Run {
            stations,
            duration,
            seed,
            config,
            payload,
            interval,
        } => {
            let config = match config {
                Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
                None => SotdmaConfig::default(),
            };
            run(
                stations,
                Duration::from_secs_f64(duration),
                seed,
                config,
                payload,
                Duration::from_millis(interval),
            )
        }
    }
}

fn run(
    stations: usize,
    duration: Duration,
    seed: u64,
    config: SotdmaConfig,
    payload: usize,
    interval: Duration,
) -> Result<()> {
    let simulator = Simulator::new();
    let channel = SimChannel::new(simulator.clone());

    let mut fleet = Vec::new();
    for index in 0..stations {
        let address = MacAddress([0x02, 0, 0, 0, (index >> 8) as u8, index as u8]);
        let station = Station::new(
            &channel,
            config.clone(),
            address,
            Position::new(10 * index as u32, 0),
            Box::new(SmallRngSource::seeded(seed.wrapping_add(index as u64))),
        )?;
        station.mac.borrow_mut().set_trace_sink(Rc::new(
            move |event: &TraceEvent| match serde_json::to_string(&json!({
                "station": address.to_string(),
                "trace": event,
            })) {
                Ok(line) => println!("{line}"),
                Err(err) => eprintln!("trace serialization failed: {err}"),
            },
        ));
        station.enqueue_every(Duration::ZERO, interval, payload, duration);
        station.start()?;
        fleet.push((address, station));
    }

    simulator.run_until(duration);

    for (address, station) in &fleet {
        let mac = station.mac.borrow();
        eprintln!(
            "station {address}: state {:?}, {} payloads dropped",
            mac.state(),
            mac.dropped_payloads()
        );
    }
    Ok(())
}
