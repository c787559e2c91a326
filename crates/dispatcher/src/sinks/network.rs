//! NetworkSink - length-prefixed frames over TCP with per-event acknowledgment
//!
//! Frame: 4-byte big-endian payload length, then the `Envelope` encoded as
//! JSON or bincode. The server answers every frame with one byte, `ACK` once
//! the event is stored or `NAK` if it refused it.

use std::collections::HashMap;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use contracts::{AgentBlueprint, ContractError, Event, EventSink};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};

/// Positive acknowledgment byte
pub const ACK: u8 = 0x06;
/// Negative acknowledgment byte
pub const NAK: u8 = 0x15;

/// Serialization format for network transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkFormat {
    /// JSON (human-readable, larger)
    #[default]
    Json,
    /// Bincode (binary, compact)
    Bincode,
}

impl NetworkFormat {
    fn parse(value: Option<&str>) -> Result<Self, String> {
        match value {
            Some("bincode") => Ok(Self::Bincode),
            Some("json") | None => Ok(Self::Json),
            Some(other) => Err(format!("unknown format '{}'", other)),
        }
    }
}

/// What the remote store receives for each event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Target database
    pub database: String,
    /// Target table
    pub table: String,
    /// Sending device
    pub device: String,
    /// The event itself
    pub event: Event,
}

/// Encode an envelope into one length-prefixed frame
pub fn encode_frame(envelope: &Envelope, format: NetworkFormat) -> Result<Bytes, String> {
    let payload = match format {
        NetworkFormat::Json => {
            serde_json::to_vec(envelope).map_err(|e| format!("json error: {}", e))?
        }
        NetworkFormat::Bincode => {
            bincode::serialize(envelope).map_err(|e| format!("bincode error: {}", e))?
        }
    };
    let len = u32::try_from(payload.len())
        .map_err(|_| format!("payload of {} bytes does not fit a frame", payload.len()))?;

    let mut frame = BytesMut::with_capacity(4 + payload.len());
    frame.put_u32(len);
    frame.extend_from_slice(&payload);
    Ok(frame.freeze())
}

/// Decode a frame payload (without the length prefix)
pub fn decode_payload(payload: &[u8], format: NetworkFormat) -> Result<Envelope, String> {
    match format {
        NetworkFormat::Json => {
            serde_json::from_slice(payload).map_err(|e| format!("json error: {}", e))
        }
        NetworkFormat::Bincode => {
            bincode::deserialize(payload).map_err(|e| format!("bincode error: {}", e))
        }
    }
}

/// Configuration for NetworkSink
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    /// `host:port` of the ingestion endpoint
    pub addr: String,
    /// Serialization format
    pub format: NetworkFormat,
    /// Routing: database name
    pub database: String,
    /// Routing: table name
    pub table: String,
    /// Bound on connection setup
    pub connect_timeout: Duration,
    /// Bound on sending a frame and reading its acknowledgment
    pub ack_timeout: Duration,
}

impl NetworkSinkConfig {
    /// Build from the database section plus sink params (`addr` override, `format`)
    pub fn from_blueprint(blueprint: &AgentBlueprint) -> Result<Self, String> {
        let db = &blueprint.database;
        let params: &HashMap<String, String> = &blueprint.sink.params;
        Ok(Self {
            addr: params.get("addr").cloned().unwrap_or_else(|| db.address()),
            format: NetworkFormat::parse(params.get("format").map(String::as_str))?,
            database: db.database.clone(),
            table: db.table.clone(),
            connect_timeout: Duration::from_secs_f64(db.connect_timeout_seconds),
            ack_timeout: Duration::from_secs_f64(db.ack_timeout_seconds),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Unknown,
    Up,
    Down,
}

/// Sink that ships events to the remote store over TCP
///
/// Connects lazily on the first delivery and after any I/O error.
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    stream: Option<TcpStream>,
    link: Link,
}

impl NetworkSink {
    /// Create a new NetworkSink (no connection is made yet)
    pub fn new(name: impl Into<String>, config: NetworkSinkConfig) -> Self {
        Self {
            name: name.into(),
            config,
            stream: None,
            link: Link::Unknown,
        }
    }

    /// Create from the agent configuration (for factory)
    pub fn from_blueprint(blueprint: &AgentBlueprint) -> Result<Self, ContractError> {
        let name = blueprint.sink.name.clone();
        let config = NetworkSinkConfig::from_blueprint(blueprint)
            .map_err(|e| ContractError::sink_connection(&name, e))?;
        Ok(Self::new(name, config))
    }

    /// Whether a connection is currently held
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn envelope(&self, event: &Event) -> Envelope {
        Envelope {
            database: self.config.database.clone(),
            table: self.config.table.clone(),
            device: event.device.clone(),
            event: event.clone(),
        }
    }

    async fn ensure_connected(&mut self) -> Result<(), ContractError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let addr = &self.config.addr;
        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                ContractError::sink_connection(
                    &self.name,
                    format!(
                        "connect to {} timed out after {}ms",
                        addr,
                        self.config.connect_timeout.as_millis()
                    ),
                )
            })?
            .map_err(|e| {
                ContractError::sink_connection(&self.name, format!("connect to {}: {}", addr, e))
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(sink = %self.name, error = %e, "TCP_NODELAY not set");
        }

        self.stream = Some(stream);
        self.mark_up();
        Ok(())
    }

    /// Send one frame and wait for the reply byte
    async fn exchange(&mut self, frame: &[u8]) -> Result<u8, ContractError> {
        self.ensure_connected().await?;
        let ack_timeout = self.config.ack_timeout;
        let Some(stream) = self.stream.as_mut() else {
            return Err(ContractError::sink_connection(&self.name, "not connected"));
        };

        let io = async {
            stream.write_all(frame).await?;
            stream.flush().await?;
            stream.read_u8().await
        };
        match tokio::time::timeout(ack_timeout, io).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(ContractError::sink_connection(&self.name, e.to_string())),
            Err(_) => Err(ContractError::sink_connection(
                &self.name,
                format!("no acknowledgement within {}ms", ack_timeout.as_millis()),
            )),
        }
    }

    fn mark_up(&mut self) {
        if self.link != Link::Up {
            info!(sink = %self.name, addr = %self.config.addr, "remote store connected");
            metrics::gauge!("altimon_remote_connected", "sink" => self.name.clone()).set(1.0);
        }
        self.link = Link::Up;
    }

    fn mark_down(&mut self, cause: &ContractError) {
        self.stream = None;
        if self.link != Link::Down {
            warn!(
                sink = %self.name,
                addr = %self.config.addr,
                error = %cause,
                "remote store unreachable"
            );
            metrics::gauge!("altimon_remote_connected", "sink" => self.name.clone()).set(0.0);
        }
        self.link = Link::Down;
    }
}

impl EventSink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "network_sink_deliver",
        skip(self, event),
        fields(sink = %self.name, event_id = %event.id)
    )]
    async fn deliver(&mut self, event: &Event) -> Result<(), ContractError> {
        let frame = encode_frame(&self.envelope(event), self.config.format)
            .map_err(|e| ContractError::sink_delivery(&self.name, e))?;

        match self.exchange(&frame).await {
            Ok(ACK) => {
                debug!(bytes = frame.len(), "event acknowledged");
                Ok(())
            }
            Ok(NAK) => Err(ContractError::sink_delivery(
                &self.name,
                "remote store refused the event",
            )),
            Ok(other) => {
                let err = ContractError::sink_delivery(
                    &self.name,
                    format!("unexpected reply byte 0x{:02x}", other),
                );
                self.mark_down(&err);
                Err(err)
            }
            Err(e) => {
                self.mark_down(&e);
                Err(e)
            }
        }
    }

    #[instrument(name = "network_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(sink = %self.name, error = %e, "shutdown of TCP stream failed");
            }
        }
        debug!(sink = %self.name, "NetworkSink closed");
        Ok(())
    }
}
