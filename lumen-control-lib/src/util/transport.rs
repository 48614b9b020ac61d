use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::bulb::BulbError;

/**
One command, one reply, one connection.

Every call opens a fresh stream, writes a single line-terminated command,
reads back a single line and decodes it as JSON. There is no retry, no
pooling and no read timeout; a peer that never answers blocks the caller.
*/
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, command: &str) -> Result<Value, BulbError>;
}

/// The default [`Transport`]: a per-call TCP round trip to the bulb's
/// advertised control endpoint.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    host: String,
    port: u16,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        TcpTransport {
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn request(&self, command: &str) -> Result<Value, BulbError> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.write_all(command.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        debug!("Socket response: {}", line.trim_end());

        Ok(serde_json::from_str(line.trim_end())?)
    }
}
