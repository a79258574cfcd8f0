//! Client side of the link: one framed TCP connection, a typed client for
//! the core's endpoint, and the TCP [`PluginConnector`] the dispatcher uses
//! to reach plugins.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tracing::debug;

use abot_core::{PluginConnection, PluginConnector};
use abot_types::{AbotError, PluginMessage, StructuredInput};

use crate::error::{Result, RpcError};
use crate::protocol::{read_response, write_frame, Request, Response};

// ── Connection ──────────────────────────────────────────────────────────

struct Io {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    /// Set while a call is mid-exchange. Still set on entry means an
    /// earlier call was dropped before reading its reply.
    in_flight: bool,
}

/// A request/response connection. Concurrent callers serialize on the
/// socket.
pub struct Connection {
    io: Mutex<Io>,
}

impl Connection {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        let (read, writer) = stream.into_split();
        Self {
            io: Mutex::new(Io {
                reader: BufReader::new(read),
                writer,
                in_flight: false,
            }),
        }
    }

    /// Send one request and wait for its response.
    pub async fn call(&self, request: &Request) -> Result<Response> {
        let mut io = self.io.lock().await;
        if io.in_flight {
            return Err(RpcError::Closed);
        }
        io.in_flight = true;
        write_frame(&mut io.writer, request).await?;
        let resp = read_response(&mut io.reader).await?;
        io.in_flight = false;
        Ok(resp)
    }

    /// Call and expect a bare `ok`.
    async fn call_ok(&self, request: &Request) -> Result<()> {
        match self.call(request).await?.into_result()? {
            None => Ok(()),
            Some(reply) => Err(RpcError::Unexpected(format!(
                "{} answered with a reply: {reply:?}",
                request.method()
            ))),
        }
    }
}

// ── CoreClient ──────────────────────────────────────────────────────────

/// What a plugin uses to talk to the core's endpoint.
pub struct CoreClient {
    conn: Connection,
}

impl CoreClient {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        Ok(Self {
            conn: Connection::connect(addr).await?,
        })
    }

    pub async fn register(&self, name: &str, address: &str) -> Result<()> {
        self.conn
            .call_ok(&Request::Register {
                name: name.to_string(),
                address: address.to_string(),
            })
            .await
    }

    pub async fn subscribe(&self, name: &str, pattern: StructuredInput) -> Result<()> {
        self.conn
            .call_ok(&Request::Subscribe {
                name: name.to_string(),
                pattern,
            })
            .await
    }

    pub async fn heartbeat(&self, name: &str) -> Result<()> {
        self.conn
            .call_ok(&Request::Heartbeat {
                name: name.to_string(),
            })
            .await
    }
}

// ── Plugin connector ────────────────────────────────────────────────────

/// Opens plugin channels over TCP.
#[derive(Debug, Default, Clone)]
pub struct TcpPluginConnector;

impl TcpPluginConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PluginConnector for TcpPluginConnector {
    async fn connect(&self, address: &str) -> abot_types::Result<Arc<dyn PluginConnection>> {
        let conn = Connection::connect(address).await?;
        debug!(%address, "plugin channel connected");
        Ok(Arc::new(TcpPluginConnection { conn }))
    }
}

/// One open channel to a plugin.
pub struct TcpPluginConnection {
    conn: Connection,
}

#[async_trait]
impl PluginConnection for TcpPluginConnection {
    async fn respond_to(&self, message: &PluginMessage) -> abot_types::Result<String> {
        let resp = self
            .conn
            .call(&Request::RespondTo(message.clone()))
            .await?;
        match resp {
            Response::Reply { reply } => Ok(reply),
            Response::Error { message, .. } => Err(AbotError::Plugin { message }),
            Response::Ok => Err(RpcError::Unexpected("respond_to answered ok without a reply".into()).into()),
        }
    }
}
