//! The core's RPC endpoint.
//!
//! [`RpcServer`] accepts plugin connections and answers `register`,
//! `subscribe` and `heartbeat` by delegating to the [`Registry`]. It keeps
//! no per-connection state: a plugin may send every call on one
//! connection or open a fresh one per call.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use abot_core::nlp::normalize_pattern;
use abot_core::Registry;
use abot_types::AbotError;

use crate::protocol::{parse_request, read_frame, write_frame, Request, Response, MAX_FRAME_LEN};

// ── RpcServer ───────────────────────────────────────────────────────────

/// Plugin-facing endpoint over a shared registry.
#[derive(Clone)]
pub struct RpcServer {
    registry: Arc<Registry>,
}

impl RpcServer {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Accept connections until `cancel` fires. Each connection is served
    /// on its own task.
    pub async fn serve(&self, listener: TcpListener, cancel: CancellationToken) {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "rpc endpoint listening");
        }
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("rpc endpoint shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = self.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            tokio::select! {
                                _ = cancel.cancelled() => {}
                                _ = server.serve_stream(stream, peer) => {}
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "rpc accept failed"),
                }
            }
        }
    }

    async fn serve_stream(&self, stream: TcpStream, peer: SocketAddr) {
        debug!(%peer, "rpc connection accepted");
        let (read, write) = stream.into_split();
        match self.handle_connection(BufReader::new(read), write).await {
            Ok(()) => debug!(%peer, "rpc connection closed"),
            Err(e) => debug!(%peer, error = %e, "rpc connection closed with error"),
        }
    }

    /// Read request lines from `reader` and write one response line per
    /// request to `writer` until EOF. A frame that is oversized or not
    /// UTF-8 gets a bad-request and the connection carries on.
    pub async fn handle_connection<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        while let Some(frame) = read_frame(&mut reader, MAX_FRAME_LEN).await? {
            let resp = match frame.into_text() {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.handle_line(line.trim()),
                Err(e) => {
                    debug!(error = %e, "rpc frame rejected");
                    Response::from_error(&e)
                }
            };
            write_frame(&mut writer, &resp)
                .await
                .map_err(|e| std::io::Error::other(e.to_string()))?;
        }
        Ok(())
    }

    /// Answer one request line.
    pub fn handle_line(&self, line: &str) -> Response {
        let result = parse_request(line).and_then(|req| self.handle(req));
        match result {
            Ok(()) => Response::Ok,
            Err(e) => {
                debug!(error = %e, "rpc request rejected");
                Response::from_error(&e)
            }
        }
    }

    /// Apply one decoded request to the registry.
    pub fn handle(&self, request: Request) -> Result<(), AbotError> {
        match request {
            Request::Register { name, address } => {
                self.registry.register(&name, &address)?;
            }
            Request::Subscribe { name, pattern } => {
                self.registry.subscribe(&name, normalize_pattern(&pattern))?;
            }
            Request::Heartbeat { name } => {
                self.registry.heartbeat(&name)?;
            }
            Request::RespondTo(_) => {
                return Err(AbotError::UnknownMethod {
                    method: "respond_to".into(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abot_types::{ErrorKind, Field, StructuredInput};

    fn server() -> RpcServer {
        RpcServer::new(Arc::new(Registry::new()))
    }

    fn error_code(resp: Response) -> ErrorKind {
        match resp {
            Response::Error { code, .. } => code,
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn register_then_duplicate() {
        let srv = server();
        let line = r#"{"method":"register","params":{"name":"weather","address":"127.0.0.1:5001"}}"#;
        assert_eq!(srv.handle_line(line), Response::Ok);
        assert_eq!(error_code(srv.handle_line(line)), ErrorKind::Duplicate);
    }

    #[test]
    fn subscribe_is_stemmed_and_matchable() {
        let srv = server();
        srv.handle(Request::Register {
            name: "weather".into(),
            address: "127.0.0.1:5001".into(),
        })
        .unwrap();
        let line = r#"{"method":"subscribe","params":{"name":"weather","pattern":{"Command":"Get","Object":"Weathers"}}}"#;
        assert_eq!(srv.handle_line(line), Response::Ok);

        let input = StructuredInput::new()
            .with(Field::Command, "get")
            .with(Field::Object, "weather");
        let route = srv.registry().lookup(&input).unwrap();
        assert_eq!(route.name, "weather");
    }

    #[test]
    fn subscribe_before_register() {
        let srv = server();
        let line = r#"{"method":"subscribe","params":{"name":"ghost","pattern":{"Object":"x"}}}"#;
        assert_eq!(error_code(srv.handle_line(line)), ErrorKind::UnknownPlugin);
    }

    #[test]
    fn heartbeat_unknown_plugin() {
        let srv = server();
        let line = r#"{"method":"heartbeat","params":{"name":"ghost"}}"#;
        assert_eq!(error_code(srv.handle_line(line)), ErrorKind::UnknownPlugin);
    }

    #[test]
    fn malformed_and_unknown() {
        let srv = server();
        assert_eq!(error_code(srv.handle_line("{nope")), ErrorKind::BadRequest);
        assert_eq!(
            error_code(srv.handle_line(r#"{"method":"exec","params":{}}"#)),
            ErrorKind::UnknownMethod
        );
        let respond = r#"{"method":"respond_to","params":{"input":{},"flexid_type":"phone","flexid":"1"}}"#;
        assert_eq!(error_code(srv.handle_line(respond)), ErrorKind::UnknownMethod);
    }

    #[tokio::test]
    async fn connection_answers_each_line() {
        let srv = server();
        let input = concat!(
            r#"{"method":"register","params":{"name":"a","address":"127.0.0.1:1"}}"#,
            "\n\n",
            r#"{"method":"heartbeat","params":{"name":"a"}}"#,
            "\n",
            "garbage\n",
        );
        let mut output = Vec::new();
        srv.handle_connection(input.as_bytes(), &mut output)
            .await
            .unwrap();

        let out = String::from_utf8(output).unwrap();
        let lines: Vec<Response> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], Response::Ok);
        assert_eq!(lines[1], Response::Ok);
        assert_eq!(error_code(lines[2].clone()), ErrorKind::BadRequest);
    }

    async fn run_connection(srv: &RpcServer, input: &[u8]) -> Vec<Response> {
        let mut output = Vec::new();
        srv.handle_connection(input, &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn invalid_utf8_frame_does_not_end_connection() {
        let srv = server();
        let mut input = b"\xff\xfe\n".to_vec();
        input.extend_from_slice(
            br#"{"method":"register","params":{"name":"weather","address":"127.0.0.1:5001"}}"#,
        );
        input.push(b'\n');

        let responses = run_connection(&srv, &input).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(error_code(responses[0].clone()), ErrorKind::BadRequest);
        assert_eq!(responses[1], Response::Ok);
        assert!(srv.registry().get("weather").is_some());
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let srv = server();
        let mut input = vec![b' '; MAX_FRAME_LEN + 1];
        input.push(b'\n');
        input.extend_from_slice(br#"{"method":"heartbeat","params":{"name":"ghost"}}"#);
        input.push(b'\n');

        let responses = run_connection(&srv, &input).await;
        assert_eq!(responses.len(), 2);
        match &responses[0] {
            Response::Error { code, message } => {
                assert_eq!(*code, ErrorKind::BadRequest);
                assert!(message.contains("exceeds"));
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(error_code(responses[1].clone()), ErrorKind::UnknownPlugin);
    }
}
