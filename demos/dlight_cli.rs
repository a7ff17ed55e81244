//! CLI application for controlling a dLight.
//!
//! Run with: cargo run --example dlight_cli -- --host 192.168.1.40 --device-id a1b2c3 --help

use clap::{Parser, Subcommand};
use std::time::Duration;
use dlight_rs::{
    Brightness, Command, Coordinator, DeviceConfig, DeviceState, Kelvin, LightEntity, PowerMode,
    probe,
};

#[derive(Parser)]
#[command(name = "dlight-cli")]
#[command(about = "Control a dLight from the command line", long_about = None)]
struct Cli {
    /// Host name or IP address of the dLight
    #[arg(long, global = true)]
    host: Option<String>,

    /// Device id the dLight answers to
    #[arg(short, long, global = true)]
    device_id: Option<String>,

    /// TCP port (default: 3333)
    #[arg(short, long, global = true, default_value = "3333")]
    port: u16,

    /// Per-request timeout in seconds (default: 5)
    #[arg(short, long, global = true, default_value = "5")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get the current state of the light
    Status,

    /// Turn the light on
    On,

    /// Turn the light off
    Off,

    /// Set brightness (0-100)
    Brightness {
        /// Brightness level (0-100)
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        level: u8,
    },

    /// Set color temperature in Kelvin (2600-6000)
    Temperature {
        /// Temperature in Kelvin (2600-6000)
        #[arg(value_parser = clap::value_parser!(u16).range(2600..=6000))]
        kelvin: u16,
    },

    /// Ask the light to describe itself
    Info,

    /// Poll the light and print every state change
    Watch {
        /// Poll interval in seconds (default: 30)
        #[arg(short, long, default_value = "30")]
        interval: u64,
    },
}

fn print_state(state: &DeviceState) {
    println!("  Power: {}", if state.is_on() { "ON" } else { "OFF" });
    if let Some(brightness) = state.brightness() {
        println!("  Brightness: {}%", brightness.value());
    }
    if let Some(temp) = state.temperature() {
        println!("  Temperature: {}K", temp.kelvin());
    }
    for (key, value) in state.extra() {
        println!("  {key}: {value}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let host = cli.host.ok_or("Host is required. Use --host <HOST>")?;
    let device_id = cli
        .device_id
        .ok_or("Device id is required. Use --device-id <ID>")?;
    let mut config = DeviceConfig::new(&host, &device_id)
        .with_port(cli.port)
        .with_timeout(Duration::from_secs(cli.timeout));

    match cli.command {
        Commands::Info => {
            println!("Querying dLight at {}...", config.address());
            match probe(&config).await {
                Ok(info) => {
                    println!("\nDevice Info:");
                    for (key, value) in info.fields() {
                        println!("  {key}: {value}");
                    }
                }
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        Commands::Watch { interval } => {
            config = config.with_poll_interval(Duration::from_secs(interval));
            let coordinator = Coordinator::new(&config)?;
            coordinator.add_listener(|outcome| match outcome {
                Ok(state) => {
                    println!("\nState:");
                    print_state(state);
                }
                Err(e) => eprintln!("Refresh failed: {}", e),
            });

            println!("Watching {} every {}s (Ctrl+C to stop)...", config.address(), interval);
            let _ = coordinator.refresh().await;
            coordinator.start()?;
            tokio::signal::ctrl_c().await?;
            coordinator.stop();
        }

        command => {
            let coordinator = Coordinator::new(&config)?;
            let light = LightEntity::new(coordinator.clone());

            let outcome = match command {
                Commands::Status => coordinator.refresh().await.map(|state| {
                    println!("\nLight Status:");
                    print_state(&state);
                }),
                Commands::On => light.turn_on(None, None).await.map(|_| println!("Light turned ON")),
                Commands::Off => light.turn_off().await.map(|_| println!("Light turned OFF")),
                Commands::Brightness { level } => {
                    let brightness = Brightness::create(level).ok_or("Invalid brightness")?;
                    let mut command = Command::from(&PowerMode::On);
                    command.brightness(&brightness);
                    coordinator
                        .send_command(vec![command])
                        .await
                        .map(|_| println!("Brightness set to {}%", level))
                }
                Commands::Temperature { kelvin } => {
                    let temp = Kelvin::create(kelvin).ok_or("Invalid temperature")?;
                    coordinator
                        .send_command(vec![Command::from(&temp)])
                        .await
                        .map(|_| println!("Temperature set to {}K", kelvin))
                }
                Commands::Info | Commands::Watch { .. } => unreachable!(),
            };

            if let Err(e) = outcome {
                eprintln!("Error: {}", e);
            }
            coordinator.stop();
        }
    }

    Ok(())
}
