use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use lumen_control_lib::bulb::{
    AdjustAction, AdjustProp, Bulb, BulbOptions, FlowAction, MusicAction, PowerState,
    KNOWN_METHODS,
};
use lumen_control_lib::util::discovery::{DiscoverConfig, Discovery};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    handle_cli(cli).await
}

/// This struct defines the command line interface of the application
#[derive(Parser)]
#[clap(
    name = "lumen_control",
    about = "Discovers and controls Wi-Fi smart bulbs",
    version = "0.1.0"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

/// Subcommands available for the CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Searches the local network and prints the bulb tree
    #[clap(name = "discover")]
    Discover {
        /// Search timeout in milliseconds
        #[clap(short = 't', long = "timeout", default_value_t = 200)]
        timeout: u64,

        /// Drop the connector lines from the printed tree
        #[clap(long)]
        squash: bool,

        /// Fail when no bulbs answer within the timeout
        #[clap(long)]
        strict: bool,
    },
    /// Subcommand for operations addressed to one bulb
    #[clap(name = "bulb-call")]
    BulbCall {
        /// The bulb's control endpoint, e.g. yeelight://192.168.1.2:55443
        #[clap(long)]
        location: String,

        /// The bulb's hexadecimal id, when known
        #[clap(long, default_value = "0x0")]
        id: String,

        /// Send every read to the bulb instead of the local state cache
        #[clap(long)]
        no_cache: bool,

        #[clap(subcommand)]
        action: BulbAction,
    },
}

/// Actions available under the `bulb-call` subcommand
#[derive(Subcommand)]
pub enum BulbAction {
    /// Flips the power state.
    #[clap(name = "toggle")]
    Toggle,
    /// Sets the power state.
    #[clap(name = "set-power")]
    SetPower {
        #[clap(value_enum)]
        state: PowerState,

        /// Transition duration in milliseconds; 0 switches instantly
        #[clap(short = 'd', long = "duration", default_value_t = 0)]
        duration: i64,
    },
    /// Sets the brightness (1-100).
    #[clap(name = "set-brightness")]
    SetBrightness {
        brightness: i64,

        #[clap(short = 'd', long = "duration", default_value_t = 0)]
        duration: i64,
    },
    /// Sets the color temperature in kelvin (1700-6500).
    #[clap(name = "set-color-temperature")]
    SetColorTemperature {
        color_temperature: i64,

        #[clap(short = 'd', long = "duration", default_value_t = 0)]
        duration: i64,
    },
    /// Sets hue (0-359) and saturation (0-100).
    #[clap(name = "set-huesat")]
    SetHuesat {
        hue: i64,
        sat: i64,

        #[clap(short = 'd', long = "duration", default_value_t = 0)]
        duration: i64,
    },
    /// Sets an RGB color, given as hex, e.g. ff0000.
    #[clap(name = "set-rgb")]
    SetRgb {
        #[clap(value_parser = parse_rgb)]
        rgb: u32,

        #[clap(short = 'd', long = "duration", default_value_t = 0)]
        duration: i64,
    },
    /// Sets a randomly chosen color.
    #[clap(name = "random-color")]
    RandomColor {
        #[clap(short = 'd', long = "duration", default_value_t = 0)]
        duration: i64,
    },
    /// Renames the bulb; slashes in the name nest it into groups.
    #[clap(name = "rename")]
    Rename { name: String },
    /// Nudges one property in firmware-defined steps.
    #[clap(name = "adjust")]
    Adjust {
        #[clap(value_enum)]
        action: AdjustAction,

        #[clap(value_enum)]
        prop: AdjustProp,
    },
    /// Adjusts the brightness by a percentage (-100..100, non-zero).
    #[clap(name = "adjust-brightness")]
    AdjustBrightness {
        percentage: i64,

        #[clap(short = 'd', long = "duration", default_value_t = 0)]
        duration: i64,
    },
    /// Adjusts the color temperature by a percentage.
    #[clap(name = "adjust-ct")]
    AdjustCt {
        percentage: i64,

        #[clap(short = 'd', long = "duration", default_value_t = 0)]
        duration: i64,
    },
    /// Adjusts the color by a percentage.
    #[clap(name = "adjust-color")]
    AdjustColor {
        percentage: i64,

        #[clap(short = 'd', long = "duration", default_value_t = 0)]
        duration: i64,
    },
    /// Starts a color flow over an expression of duration,mode,value,brightness quadruples.
    #[clap(name = "start-flow")]
    StartFlow {
        /// Number of repetitions; 0 runs forever
        #[clap(short = 'c', long = "count", default_value_t = 0)]
        count: i64,

        /// What the bulb does once the flow completes
        #[clap(short = 'a', long = "action", value_enum, default_value = "recover")]
        action: FlowAction,

        /// Comma-separated flow expression, e.g. 500,1,16711680,100,500,7,0,0
        #[clap(use_value_delimiter = true, required = true)]
        expression: Vec<i64>,
    },
    /// Stops a running color flow.
    #[clap(name = "stop-flow")]
    StopFlow,
    /// Schedules a device-side shutdown in the given number of minutes; 0 cancels.
    #[clap(name = "shutdown-after")]
    ShutdownAfter { minutes: i64 },
    /// Prints the minutes left on the shutdown schedule, if any.
    #[clap(name = "shutdown-status")]
    ShutdownStatus,
    /// Cancels a scheduled shutdown.
    #[clap(name = "cancel-shutdown")]
    CancelShutdown,
    /// Opens or closes a music-mode stream to the given host and port.
    #[clap(name = "music")]
    Music {
        #[clap(value_enum)]
        action: MusicAction,

        host: String,

        port: u16,
    },
    /// Makes the current state the bulb's power-on default.
    #[clap(name = "set-default")]
    SetDefault,
    /// Reads a single property.
    #[clap(name = "get-prop")]
    GetProp { key: String },
    /// Prints the bulb's status as JSON.
    #[clap(name = "status")]
    Status,
}

fn parse_rgb(s: &str) -> Result<u32, String> {
    u32::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|_| "could not parse the color as hex rgb".to_string())
}

async fn handle_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Discover {
            timeout,
            squash,
            strict,
        } => {
            let config = DiscoverConfig {
                timeout: Duration::from_millis(timeout),
                ..DiscoverConfig::default()
            };
            let group = if strict {
                Discovery::discover_strict(&config).await?
            } else {
                Discovery::discover(&config).await?
            };
            print!("{}", group.to_graph(squash).await?);
        }
        Commands::BulbCall {
            location,
            id,
            no_cache,
            action,
        } => {
            let mut bulb = addressed_bulb(&location, &id, no_cache)?;

            match action {
                BulbAction::Toggle => {
                    let state = bulb.toggle().await?;
                    println!("Power is now {}", state);
                }
                BulbAction::SetPower { state, duration } => {
                    bulb.set_power(state, duration).await?;
                    println!("Power set to {}", state);
                }
                BulbAction::SetBrightness {
                    brightness,
                    duration,
                } => {
                    bulb.set_brightness(brightness, duration).await?;
                    println!("Brightness set to {}", brightness);
                }
                BulbAction::SetColorTemperature {
                    color_temperature,
                    duration,
                } => {
                    bulb.set_color_temperature(color_temperature, duration)
                        .await?;
                    println!("Color temperature set to {}K", color_temperature);
                }
                BulbAction::SetHuesat { hue, sat, duration } => {
                    bulb.set_huesat(hue, sat, duration).await?;
                    println!("Color set to hue {} sat {}", hue, sat);
                }
                BulbAction::SetRgb { rgb, duration } => {
                    bulb.set_rgb(rgb, duration).await?;
                    println!("Color set to {:06x}", rgb);
                }
                BulbAction::RandomColor { duration } => {
                    let rgb = bulb.random_color(duration).await?;
                    println!("Color set to {:06x}", rgb);
                }
                BulbAction::Rename { name } => {
                    bulb.set_name(&name).await?;
                    println!("The bulb is now named '{}'", name);
                }
                BulbAction::Adjust { action, prop } => {
                    bulb.adjust(action, prop).await?;
                    println!("Adjusted");
                }
                BulbAction::AdjustBrightness {
                    percentage,
                    duration,
                } => {
                    bulb.adjust_brightness(percentage, duration).await?;
                    println!("Brightness adjusted by {}%", percentage);
                }
                BulbAction::AdjustCt {
                    percentage,
                    duration,
                } => {
                    bulb.adjust_ct(percentage, duration).await?;
                    println!("Color temperature adjusted by {}%", percentage);
                }
                BulbAction::AdjustColor {
                    percentage,
                    duration,
                } => {
                    bulb.adjust_color(percentage, duration).await?;
                    println!("Color adjusted by {}%", percentage);
                }
                BulbAction::StartFlow {
                    count,
                    action,
                    expression,
                } => {
                    bulb.start_cf(count, action, &expression).await?;
                    println!("Color flow started");
                }
                BulbAction::StopFlow => {
                    bulb.stop_cf().await?;
                    println!("Color flow stopped");
                }
                BulbAction::ShutdownAfter { minutes } => {
                    bulb.delayed_shutdown_after(minutes).await?;
                    if minutes == 0 {
                        println!("Scheduled shutdown cancelled");
                    } else {
                        println!("Shutdown scheduled in {} minute(s)", minutes);
                    }
                }
                BulbAction::ShutdownStatus => match bulb.delayed_shutdown().await? {
                    Some(minutes) => println!("Shutdown in {} minute(s)", minutes),
                    None => println!("No shutdown scheduled"),
                },
                BulbAction::CancelShutdown => {
                    bulb.cancel_delayed_shutdown().await?;
                    println!("Scheduled shutdown cancelled");
                }
                BulbAction::Music { action, host, port } => {
                    bulb.set_music(action, &host, port).await?;
                    println!("Music mode updated");
                }
                BulbAction::SetDefault => {
                    bulb.set_default().await?;
                    println!("Current state saved as the power-on default");
                }
                BulbAction::GetProp { key } => {
                    let value = bulb.get_prop(&key).await?;
                    println!("{}", value);
                }
                BulbAction::Status => {
                    let status = bulb.status().await?;
                    println!("{}", serde_json::to_string_pretty(&status)?);
                }
            }
        }
    }

    Ok(())
}

/// Builds a bulb addressed explicitly rather than discovered: the full
/// command set is assumed supported, and the cache starts empty so the first
/// read of each property goes to the device.
fn addressed_bulb(location: &str, id: &str, no_cache: bool) -> Result<Bulb> {
    let mut data = HashMap::new();
    data.insert("id".to_string(), id.to_string());
    data.insert("Location".to_string(), location.to_string());
    data.insert("support".to_string(), KNOWN_METHODS.join(" "));
    let options = BulbOptions {
        state_caching: !no_cache,
        transport: None,
    };
    Ok(Bulb::new(data, options)?)
}
