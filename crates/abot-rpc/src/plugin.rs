//! Plugin-side helper.
//!
//! A plugin process binds its own listener with [`PluginServer::bind`],
//! announces itself to the core with [`PluginServer::register`], then
//! answers the core's `respond_to` calls in [`PluginServer::serve`].
//!
//! ```no_run
//! # async fn demo() -> abot_rpc::Result<()> {
//! use abot_rpc::PluginServer;
//! use abot_types::{Field, PluginMessage, StructuredInput};
//! use tokio_util::sync::CancellationToken;
//!
//! let server = PluginServer::bind("weather", "127.0.0.1:0", |_msg: PluginMessage| async {
//!     Ok::<_, abot_types::AbotError>("It is sunny.".to_string())
//! })
//! .await?
//! .subscribe(StructuredInput::new().with(Field::Object, "weather"));
//! server.register("127.0.0.1:4001").await?;
//! server.serve(CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use abot_types::{AbotError, PluginMessage, StructuredInput};

use crate::client::CoreClient;
use crate::error::Result;
use crate::protocol::{parse_request, read_frame, write_frame, Request, Response, MAX_FRAME_LEN};

/// Answers utterances routed to this plugin.
///
/// An `Err` is sent back as an error response; the core reports it to the
/// user without dropping the plugin.
#[async_trait]
pub trait Responder: Send + Sync + 'static {
    async fn respond_to(&self, message: PluginMessage) -> abot_types::Result<String>;
}

#[async_trait]
impl<F, Fut> Responder for F
where
    F: Fn(PluginMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = abot_types::Result<String>> + Send + 'static,
{
    async fn respond_to(&self, message: PluginMessage) -> abot_types::Result<String> {
        (self)(message).await
    }
}

pub struct PluginServer {
    name: String,
    listener: TcpListener,
    subscriptions: Vec<StructuredInput>,
    responder: Arc<dyn Responder>,
}

impl PluginServer {
    /// Bind the plugin's listener. Port 0 picks a free port.
    pub async fn bind<A, R>(name: &str, addr: A, responder: R) -> Result<Self>
    where
        A: ToSocketAddrs,
        R: Responder,
    {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            name: name.to_string(),
            listener,
            subscriptions: Vec::new(),
            responder: Arc::new(responder),
        })
    }

    /// Add a pattern to send to the core on [`register`](Self::register).
    pub fn subscribe(mut self, pattern: StructuredInput) -> Self {
        self.subscriptions.push(pattern);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Register with the core at `core_addr` and send every subscription.
    /// The returned client stays connected for heartbeats.
    pub async fn register<A: ToSocketAddrs>(&self, core_addr: A) -> Result<CoreClient> {
        let client = CoreClient::connect(core_addr).await?;
        let address = self.local_addr()?.to_string();
        client.register(&self.name, &address).await?;
        for pattern in &self.subscriptions {
            client.subscribe(&self.name, pattern.clone()).await?;
        }
        info!(
            plugin = %self.name,
            %address,
            subscriptions = self.subscriptions.len(),
            "registered with core"
        );
        Ok(client)
    }

    /// Answer the core until `cancel` fires.
    pub async fn serve(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(plugin = %self.name, "plugin server shutting down");
                    return;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(plugin = %self.name, %peer, "core connected");
                        let responder = Arc::clone(&self.responder);
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            let (read, write) = stream.into_split();
                            tokio::select! {
                                _ = cancel.cancelled() => {}
                                res = answer(responder, BufReader::new(read), write) => {
                                    if let Err(e) = res {
                                        debug!(%peer, error = %e, "core connection closed with error");
                                    }
                                }
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "plugin accept failed"),
                }
            }
        }
    }
}

async fn answer<R, W>(responder: Arc<dyn Responder>, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = read_frame(&mut reader, MAX_FRAME_LEN).await? {
        let request = match frame.into_text() {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => parse_request(line.trim()),
            Err(e) => Err(e),
        };
        let resp = match request {
            Ok(Request::RespondTo(message)) => match responder.respond_to(message).await {
                Ok(reply) => Response::Reply { reply },
                Err(e) => Response::from_error(&AbotError::Plugin {
                    message: e.to_string(),
                }),
            },
            Ok(other) => Response::from_error(&AbotError::UnknownMethod {
                method: other.method().to_string(),
            }),
            Err(e) => Response::from_error(&e),
        };
        write_frame(&mut writer, &resp).await?;
    }
    Ok(())
}

/// Send `heartbeat(name)` every `every` until `cancel` fires.
///
/// A failed heartbeat is logged and retried on the next tick.
pub async fn run_heartbeat(
    client: CoreClient,
    name: String,
    every: Duration,
    cancel: CancellationToken,
) {
    info!(plugin = %name, interval_ms = every.as_millis() as u64, "heartbeat started");
    let mut interval = tokio::time::interval(every);

    // The first tick fires immediately; registration just happened.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(plugin = %name, "heartbeat stopped");
                return;
            }
            _ = interval.tick() => {
                if let Err(e) = client.heartbeat(&name).await {
                    warn!(plugin = %name, error = %e, "heartbeat failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abot_types::{ErrorKind, FlexIdType};

    fn respond_line(sentence: &str) -> String {
        let req = Request::RespondTo(PluginMessage {
            input: StructuredInput::new(),
            sentence: sentence.into(),
            flexid_type: FlexIdType::Phone,
            flexid: "+1555".into(),
            followup: false,
        });
        let mut line = serde_json::to_string(&req).unwrap();
        line.push('\n');
        line
    }

    async fn run(responder: Arc<dyn Responder>, input: String) -> Vec<Response> {
        let mut out = Vec::new();
        answer(responder, input.as_bytes(), &mut out).await.unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn replies_with_responder_output() {
        let echo: Arc<dyn Responder> = Arc::new(|msg: PluginMessage| async move {
            Ok::<_, AbotError>(format!("echo: {}", msg.sentence))
        });
        let resps = run(echo, respond_line("hello")).await;
        assert_eq!(resps, vec![Response::Reply { reply: "echo: hello".into() }]);
    }

    #[tokio::test]
    async fn responder_error_is_plugin_error() {
        let failing: Arc<dyn Responder> = Arc::new(|_msg: PluginMessage| async {
            Err::<String, _>(AbotError::bad_request("no city"))
        });
        let resps = run(failing, respond_line("weather")).await;
        match &resps[0] {
            Response::Error { code, message } => {
                assert_eq!(*code, ErrorKind::Plugin);
                assert!(message.contains("no city"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn core_methods_are_not_served() {
        let echo: Arc<dyn Responder> =
            Arc::new(|_msg: PluginMessage| async { Ok::<_, AbotError>(String::new()) });
        let input = "{\"method\":\"heartbeat\",\"params\":{\"name\":\"x\"}}\n".to_string();
        let resps = run(echo, input).await;
        assert!(matches!(
            resps[0],
            Response::Error { code: ErrorKind::UnknownMethod, .. }
        ));
    }

    #[tokio::test]
    async fn garbled_frame_gets_bad_request_and_next_call_is_answered() {
        let echo: Arc<dyn Responder> = Arc::new(|msg: PluginMessage| async move {
            Ok::<_, AbotError>(msg.sentence)
        });
        let mut input = b"\xc3\x28\n".to_vec();
        input.extend_from_slice(respond_line("still here").as_bytes());

        let mut out = Vec::new();
        answer(echo, input.as_slice(), &mut out).await.unwrap();
        let resps: Vec<Response> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(resps.len(), 2);
        assert!(matches!(
            resps[0],
            Response::Error { code: ErrorKind::BadRequest, .. }
        ));
        assert_eq!(resps[1], Response::Reply { reply: "still here".into() });
    }
}
