use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use tapwire_core::adb::AdbBridge;
use tapwire_core::config::Config;
use tapwire_core::farm::{Device, DeviceFarmClient};

#[derive(Parser)]
#[command(name = "tapwire")]
#[command(about = "Device-farm allocation and inspection for tapwire test runs")]
struct Cli {
    /// Path to the tapwire config file (defaults to ~/.tapwire/tapwire.json)
    #[arg(short, long, env = "TAPWIRE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect the farm device inventory
    Devices {
        #[command(subcommand)]
        command: DeviceCommands,
    },
    /// Allocate a device: select, reserve, open a remote connection, attach adb
    Connect,
    /// Release a reserved device and detach adb
    Release {
        /// Serial of the device to release
        serial: String,
    },
}

#[derive(Subcommand)]
enum DeviceCommands {
    /// List all devices known to the farm
    List {
        /// Emit raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show a single device by serial
    Show {
        /// Serial of the device to show
        serial: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path),
        None => Config::load_default(),
    };
    let mut farm = DeviceFarmClient::new(&config.farm);

    match cli.command {
        Commands::Devices { command } => match command {
            DeviceCommands::List { json } => {
                let devices = farm.list_devices().await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&devices)?);
                } else {
                    print_device_table(&devices);
                }
            }
            DeviceCommands::Show { serial } => {
                let device = farm.get_device(&serial).await?;
                println!("{}", serde_json::to_string_pretty(&device)?);
            }
        },
        Commands::Connect => {
            let adb = AdbBridge::new();
            let allocation = farm.connect(&adb).await?;
            println!("serial: {}", allocation.device.serial);
            match &allocation.remote_connect_url {
                Some(url) => println!("remote-connect url: {url}"),
                None => println!("remote-connect url: <none; reservation was refused>"),
            }
        }
        Commands::Release { serial } => {
            farm.release(&serial).await?;
            let adb = AdbBridge::new();
            if let Err(e) = adb.disconnect() {
                warn!(error = %e, "adb detach failed");
            }
            println!("released {serial}");
        }
    }

    Ok(())
}

fn print_device_table(devices: &[Device]) {
    println!(
        "{:<20} {:<10} {:<10} {:<10}",
        "SERIAL", "PLATFORM", "VERSION", "AVAILABLE"
    );
    for device in devices {
        println!(
            "{:<20} {:<10} {:<10} {:<10}",
            device.serial,
            device.platform,
            device.platform_version,
            if device.is_available() { "yes" } else { "no" }
        );
    }
}
