//! # Lumen Control Library
//!
//! `lumen-control-lib` is a Rust library for controlling Yeelight-compatible
//! smart bulbs. It discovers bulbs on the local network, arranges them into
//! named groups derived from their hierarchical names and drives them over
//! their line-oriented JSON control protocol.
//!
//! This library is designed to be used by command-line tools or other client
//! applications that want to script their lighting.
//!
//! ## Features
//!
//! - Multicast bulb discovery on local networks
//! - A composite group tree addressing one bulb or many uniformly
//! - Power, brightness, color, color-flow and scheduling commands with a
//!   local state cache
//! - Deterministic color-temperature and hue/saturation to RGB conversion
//!
//! ## Example
//!
//! Here is a simple example of how to discover the bulbs on your network and
//! turn them all on:
//!
//! ```no_run
//! use lumen_control_lib::bulb::PowerState;
//! use lumen_control_lib::util::discovery::{DiscoverConfig, Discovery};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let group = Discovery::discover(&DiscoverConfig::default()).await?;
//!     group.set_power(PowerState::On, 500).await?;
//!     println!("{}", group.to_graph(false).await?);
//!     Ok(())
//! }
//! ```

// Single-bulb control: identity, capability gating, the command set and the
// local state cache with its background timers.
pub mod bulb;

// Deterministic color conversion helpers shared by the status views.
pub mod color;

// The composite tree of bulbs and named subgroups, with broadcast control.
pub mod group;

// Discovery and the wire transport.
pub mod util;
