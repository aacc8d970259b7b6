//! `failsafe` - inspect and exercise the commissioning fail-safe.
//!
//! ```text
//! failsafe marker show|write --fabric N|clear   edit the persisted marker
//! failsafe boot                                 run boot recovery once
//! failsafe arm --fabric N --timeout SECS        arm and wait for expiry
//! ```
//!
//! Configuration comes from `--config`, `$FAILSAFE_CONFIG`, or
//! `~/.failsafe/config.toml`, in that order. Logs go to stderr and are
//! filtered with `RUST_LOG`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use failsafe_core::MarkerStore;
use failsafe_engine::{
    BootRecovery, DeviceConfig, DeviceEvent, FabricIndex, FailSafeContext, Marker, MarkerCleanup,
    Server, ServerInitParams,
};

#[derive(Parser)]
#[command(name = "failsafe")]
#[command(about = "Inspect and exercise the commissioning fail-safe")]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read, write or clear the persisted marker
    Marker {
        #[command(subcommand)]
        action: MarkerAction,
    },
    /// Start the server once, running boot recovery and delivering its events
    Boot,
    /// Arm the fail-safe and run until it expires or is disarmed
    Arm {
        /// Fabric index the session is for (1-254)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=254))]
        fabric: u8,
        /// Per-attempt expiry in seconds
        #[arg(long)]
        timeout: u16,
        /// Disarm cleanly after this many seconds instead of waiting for expiry
        #[arg(long)]
        disarm_after: Option<u64>,
    },
}

#[derive(Subcommand)]
enum MarkerAction {
    /// Print the persisted marker, if any
    Show,
    /// Persist a marker for a fabric
    Write {
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=254))]
        fabric: u8,
    },
    /// Remove the persisted marker
    Clear,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<DeviceConfig> {
    let loaded = match path {
        Some(path) => {
            if !path.exists() {
                bail!("config file {} does not exist", path.display());
            }
            DeviceConfig::load_from(path)?
        }
        None => DeviceConfig::load()?,
    };
    Ok(loaded.unwrap_or_default())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let output = Output { json: cli.json };

    match cli.command {
        Commands::Marker { action } => run_marker(&config, &action, output),
        Commands::Boot => run_boot(&config, output),
        Commands::Arm {
            fabric,
            timeout,
            disarm_after,
        } => {
            run_arm(
                &config,
                FabricIndex::new(fabric),
                Duration::from_secs(u64::from(timeout)),
                disarm_after.map(Duration::from_secs),
                output,
            )
            .await
        }
    }
}

fn run_marker(config: &DeviceConfig, action: &MarkerAction, output: Output) -> Result<()> {
    let markers = MarkerStore::with_storage(config.open_storage()?);
    match action {
        MarkerAction::Show => {
            let marker = markers.load().context("reading fail-safe marker")?;
            output.marker(marker.as_ref())
        }
        MarkerAction::Write { fabric } => {
            let marker = Marker::new(FabricIndex::new(*fabric));
            markers.save(&marker).context("writing fail-safe marker")?;
            output.marker(Some(&marker))
        }
        MarkerAction::Clear => {
            markers.erase();
            output.marker(None)
        }
    }
}

fn start_server(config: &DeviceConfig, output: Output) -> Result<Server> {
    let storage = config.open_storage()?;
    let mut server = Server::init(ServerInitParams::from_config(config, storage))
        .context("initializing server")?;
    server.add_event_handler(move |event: &DeviceEvent, _: &mut FailSafeContext| {
        if let Err(err) = output.event(event) {
            tracing::warn!("Failed to print event: {err}");
        }
    });
    server.add_event_handler(MarkerCleanup);
    Ok(server)
}

fn run_boot(config: &DeviceConfig, output: Output) -> Result<()> {
    let mut server = start_server(config, output)?;
    match server.boot_recovery() {
        BootRecovery::Clean => tracing::info!("No fail-safe marker found"),
        BootRecovery::Recovered(marker) => {
            tracing::info!(fabric_index = %marker.fabric_index, "Recovered interrupted commit");
        }
        BootRecovery::Unreadable(err) => tracing::warn!("Fail-safe marker unreadable: {err}"),
        BootRecovery::Skipped => tracing::warn!("Fail-safe already active, marker not checked"),
    }
    server.run_until_idle();
    server.generate_shutdown_event();
    server.shutdown();
    Ok(())
}

async fn run_arm(
    config: &DeviceConfig,
    fabric: FabricIndex,
    timeout: Duration,
    disarm_after: Option<Duration>,
    output: Output,
) -> Result<()> {
    let mut server = start_server(config, output)?;
    server.run_until_idle();
    server
        .fail_safe_mut()
        .arm_fail_safe(fabric, timeout)
        .context("arming fail-safe")?;

    let expired = |server: &Server| !server.fail_safe().is_armed() && !server.fail_safe().is_busy();
    match disarm_after {
        Some(delay) => {
            if tokio::time::timeout(delay, server.run_realtime(expired))
                .await
                .is_err()
            {
                server.fail_safe_mut().disarm_fail_safe();
            }
        }
        None => server.run_realtime(expired).await,
    }

    server.generate_shutdown_event();
    server.shutdown();
    Ok(())
}

#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

#[derive(Serialize)]
struct MarkerReport<'a> {
    marker: Option<&'a Marker>,
}

impl Output {
    fn marker(self, marker: Option<&Marker>) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(&MarkerReport { marker })?);
        } else {
            match marker {
                Some(marker) => println!("marker: fabric {}", marker.fabric_index),
                None => println!("marker: none"),
            }
        }
        Ok(())
    }

    fn event(self, event: &DeviceEvent) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(event)?);
            return Ok(());
        }
        match event {
            DeviceEvent::FailSafeTimerExpired {
                fabric_index,
                add_noc_command_invoked,
                update_noc_command_invoked,
            } => println!(
                "fail-safe expired: fabric {fabric_index} (add_noc={add_noc_command_invoked}, update_noc={update_noc_command_invoked})"
            ),
            DeviceEvent::ServerShuttingDown => println!("server shutting down"),
        }
        Ok(())
    }
}
