//! SSDP-style multicast discovery of bulbs on the local network.
//!
//! One search datagram goes out, replies are collected until a fixed
//! deadline, and the advertised bulbs are assembled into a group tree keyed
//! by the slash-delimited segments of their names.

use std::time::Duration;

use log::{debug, warn};
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};

use crate::bulb::{Bulb, BulbError, BulbOptions};
use crate::group::BulbGroup;

pub const MULTICAST_ADDRESS: &str = "239.255.255.250";
pub const MULTICAST_PORT: u16 = 1982;
pub const DISCOVER_TIMEOUT: Duration = Duration::from_millis(200);

/// Advertisement packets are small header blocks; anything longer is cut.
pub const RESPONSE_MAX_LENGTH: usize = 2048;

const ROOT_GROUP_NAME: &str = "main";

fn search_payload(address: &str, port: u16) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\nHOST: {address}:{port}\r\nMAN: \"ssdp:discover\"\r\nST: wifi_bulb\n"
    )
}

#[derive(Debug, Clone)]
pub struct DiscoverConfig {
    pub multicast_address: String,
    pub multicast_port: u16,
    /// How long to keep collecting replies after the search goes out.
    pub timeout: Duration,
    /// Receive buffer size per reply packet; longer packets are cut.
    pub response_max_length: usize,
    /// Passed through to every discovered bulb.
    pub state_caching: bool,
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        DiscoverConfig {
            multicast_address: MULTICAST_ADDRESS.to_string(),
            multicast_port: MULTICAST_PORT,
            timeout: DISCOVER_TIMEOUT,
            response_max_length: RESPONSE_MAX_LENGTH,
            state_caching: true,
        }
    }
}

pub struct Discovery;

impl Discovery {
    /**
    Runs one discovery round: multicasts the search, collects every reply
    that arrives within the window, drops malformed and duplicate
    advertisements and returns the remaining bulbs grouped by the
    slash-delimited segments of their names, under a root group named
    `main`. Finding nothing is not an error; the root group comes back
    empty.
    */
    pub async fn discover(config: &DiscoverConfig) -> Result<BulbGroup, BulbError> {
        let packets = Self::collect_packets(config).await?;
        let bulbs = Self::parse_bulbs(&packets, config.state_caching);
        debug!("Discovery found {} bulb(s)", bulbs.len());
        Ok(Self::assemble_tree(bulbs))
    }

    /// Like [`Self::discover`], but an empty result is
    /// [`BulbError::NoBulbsFound`].
    pub async fn discover_strict(config: &DiscoverConfig) -> Result<BulbGroup, BulbError> {
        let group = Self::discover(config).await?;
        if group.is_empty() {
            return Err(BulbError::NoBulbsFound);
        }
        Ok(group)
    }

    async fn collect_packets(config: &DiscoverConfig) -> Result<Vec<String>, BulbError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let payload = search_payload(&config.multicast_address, config.multicast_port);
        debug!(
            "Sending the discovery request to {}:{}",
            config.multicast_address, config.multicast_port
        );
        socket
            .send_to(
                payload.as_bytes(),
                (config.multicast_address.as_str(), config.multicast_port),
            )
            .await?;

        let mut packets = Vec::new();
        let mut buffer = vec![0u8; config.response_max_length];
        let deadline = Instant::now() + config.timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, socket.recv_from(&mut buffer)).await {
                Ok(Ok((length, peer))) => {
                    debug!("Received {} bytes from {}", length, peer);
                    packets.push(String::from_utf8_lossy(&buffer[..length]).into_owned());
                }
                Ok(Err(error)) => return Err(error.into()),
                // The window closed; whatever arrived is the result.
                Err(_) => break,
            }
        }
        Ok(packets)
    }

    /// Malformed advertisements are logged and skipped so one broken device
    /// cannot hide the rest. Bulbs reply to every search; replays of an
    /// already-seen id are dropped, keeping the first packet's data.
    fn parse_bulbs(packets: &[String], state_caching: bool) -> Vec<Bulb> {
        let mut bulbs: Vec<Bulb> = Vec::new();
        for packet in packets {
            let options = BulbOptions {
                state_caching,
                transport: None,
            };
            match Bulb::from_advertisement(packet, options) {
                Ok(bulb) => {
                    if bulbs.iter().any(|known| known == &bulb) {
                        debug!("Skipping a duplicate advertisement of {}", bulb);
                        continue;
                    }
                    bulbs.push(bulb);
                }
                Err(error) => {
                    warn!("Skipping a malformed advertisement: {}", error);
                }
            }
        }
        bulbs
    }

    fn assemble_tree(bulbs: Vec<Bulb>) -> BulbGroup {
        assemble_group(ROOT_GROUP_NAME, bulbs, 1)
    }
}

/// Buckets the bulbs by their group name at this nesting level, keeping
/// first-occurrence order: bulbs with no segment at this level become direct
/// children, every named bucket becomes a subgroup assembled one level
/// deeper.
fn assemble_group(name: &str, bulbs: Vec<Bulb>, level: usize) -> BulbGroup {
    let mut buckets: Vec<(Option<String>, Vec<Bulb>)> = Vec::new();
    for bulb in bulbs {
        let key = bulb.group_name(level).map(str::to_string);
        match buckets.iter_mut().find(|(known, _)| *known == key) {
            Some((_, bucket)) => bucket.push(bulb),
            None => buckets.push((key, vec![bulb])),
        }
    }

    let mut group = BulbGroup::new(name);
    for (key, bucket) in buckets {
        match key {
            None => {
                for bulb in bucket {
                    group.push(bulb);
                }
            }
            Some(subgroup_name) => {
                group.push(assemble_group(&subgroup_name, bucket, level + 1));
            }
        }
    }
    group
}
