//! `openevse` - run an EVSE manager from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Drive the built-in simulator, with a vehicle plugged in
//! openevse --simulate --vehicle
//!
//! # Hold the charger at 16 A
//! openevse --simulate --state active --current 16
//!
//! # Real hardware (build with --features hardware-serial)
//! openevse --port /dev/ttyUSB0 --config evse.json
//! ```
//!
//! Logging follows `RUST_LOG`, e.g. `RUST_LOG=openevse_rapi=trace` shows
//! every frame on the wire.

use anyhow::{Context, Result, bail};
use clap::Parser;
use openevse_core::{EvseClient, EvseProperties, EvseState, priority};
use openevse_emulator::SimulatedEvse;
use openevse_manager::{DataReady, EvseManager, ManagerConfig};
use openevse_rapi::RapiStream;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Claim arbitration for an OpenEVSE charging controller.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial port of the controller
    #[arg(short, long, conflicts_with = "simulate")]
    port: Option<String>,

    /// Serial line speed
    #[arg(short, long, default_value_t = 115_200)]
    baud: u32,

    /// Talk to the built-in simulated controller instead of a serial port
    #[arg(long)]
    simulate: bool,

    /// Plug a vehicle into the simulator once it is running
    #[arg(long, requires = "simulate")]
    vehicle: bool,

    /// Manager configuration (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tag every command with a sequence id
    #[arg(long)]
    sequence_ids: bool,

    /// Claim the charger into this state (active or disabled). Defaults to
    /// active when only --current is given.
    #[arg(long)]
    state: Option<EvseState>,

    /// Charge current to claim, in amps
    #[arg(long)]
    current: Option<u32>,

    /// Priority of the command line claim
    #[arg(long, default_value_t = priority::MANUAL)]
    priority: i32,
}

impl Args {
    fn manager_config(&self) -> Result<ManagerConfig> {
        let mut config = match &self.config {
            Some(path) => ManagerConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => ManagerConfig::default(),
        };
        if self.sequence_ids {
            config.rapi.sequence_ids = true;
        }
        Ok(config)
    }

    /// The claim requested on the command line, if any.
    fn claim(&self) -> Option<EvseProperties> {
        let state = match (self.state, self.current) {
            (Some(state), _) => state,
            (None, Some(_)) => EvseState::Active,
            (None, None) => return None,
        };
        let mut props = EvseProperties::new(state);
        props.charge_current = self.current;
        Some(props)
    }
}

fn open_link(args: &Args) -> Result<Box<dyn RapiStream>> {
    if args.simulate {
        let (evse, handle) = SimulatedEvse::new();
        if args.vehicle {
            handle.plug_in();
            handle.start_charging();
        }
        return Ok(Box::new(evse));
    }

    let Some(port) = args.port.as_deref() else {
        bail!("Either --port or --simulate is required");
    };
    open_serial(port, args.baud)
}

#[cfg(feature = "hardware-serial")]
fn open_serial(port: &str, baud: u32) -> Result<Box<dyn RapiStream>> {
    let stream = openevse_rapi::SerialStream::open(port, baud)
        .with_context(|| format!("Failed to open {}", port))?;
    Ok(Box::new(stream))
}

#[cfg(not(feature = "hardware-serial"))]
fn open_serial(port: &str, _baud: u32) -> Result<Box<dyn RapiStream>> {
    bail!(
        "Cannot open {}: built without the hardware-serial feature",
        port
    )
}

// The manager is single threaded; everything runs on this one task.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = args.manager_config()?;
    let link = open_link(&args)?;
    run(args, config, link).await
}

async fn run(args: Args, config: ManagerConfig, link: Box<dyn RapiStream>) -> Result<()> {
    let mut manager = EvseManager::new(link, config);
    let mut changes = manager.on_state_change();
    let mut boots = manager.on_boot_ready();
    let mut readings = manager.on_data_ready();

    if let Some(props) = args.claim() {
        if !manager.claim(EvseClient::OPENEVSE_MANUAL, args.priority, props) {
            bail!("Claim rejected");
        }
        info!(state = %props.state, current = ?props.charge_current, "Claimed");
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let wait = manager.poll();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            Some(boot) = boots.recv() => {
                info!(
                    firmware = %boot.firmware.firmware,
                    protocol = %boot.firmware.protocol,
                    min = boot.capacity.min_current,
                    max = boot.capacity.max_current,
                    "Controller ready"
                );
            }
            Some(change) = changes.recv() => {
                match serde_json::to_string(&change.current) {
                    Ok(json) => info!(state = %change.current.evse_state, status = %json, "State changed"),
                    Err(err) => warn!("Cannot encode status: {}", err),
                }
                info!(pilot = ?manager.effective_pilot(), "Target pilot");
            }
            Some(reading) = readings.recv() => match reading {
                DataReady::Charge(charge) => {
                    debug!(amps = charge.amps(), volts = ?charge.volts(), "Charging");
                }
                DataReady::Temperatures(temperatures) => {
                    let celsius = temperatures.monitor().map(|t| f64::from(t) / 10.0);
                    debug!(?celsius, "Temperature");
                }
                DataReady::Status(_) | DataReady::Vehicle(_) => {}
            },
            result = &mut shutdown => {
                result.context("Failed to listen for ctrl-c")?;
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}
