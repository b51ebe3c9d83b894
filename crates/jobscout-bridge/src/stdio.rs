//! Newline-delimited JSON-RPC over stdin/stdout.
//!
//! Stdout carries protocol frames only; everything else is logged.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::rpc::{parse_message, DispatchError, Incoming, RpcDispatcher, RpcResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    /// `initialize` answered, waiting for `notifications/initialized`.
    Initialized,
    Serving,
}

pub struct StdioSession {
    dispatcher: Arc<RpcDispatcher>,
    state: SessionState,
}

impl StdioSession {
    pub fn new(dispatcher: Arc<RpcDispatcher>) -> Self {
        Self {
            dispatcher,
            state: SessionState::Uninitialized,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handle one input line; `None` means nothing is written back.
    pub async fn handle_line(&mut self, line: &str) -> Option<RpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let request = match parse_message(line) {
            Incoming::Request(request) => request,
            Incoming::Invalid { id, error } => {
                warn!(error = %error, "rejecting malformed frame");
                return Some(RpcResponse::failure(id, &error));
            }
        };

        if request.is_notification() {
            if request.method == "notifications/initialized" && self.state == SessionState::Initialized {
                self.state = SessionState::Serving;
                info!("client initialized");
            }
            return None;
        }

        let id = request.response_id();
        let always_allowed = matches!(request.method.as_str(), "initialize" | "ping");
        match self.state {
            SessionState::Uninitialized if !always_allowed => {
                return Some(RpcResponse::failure(id, &DispatchError::NotInitialized));
            }
            SessionState::Initialized if !always_allowed => {
                warn!(method = %request.method, "request before notifications/initialized");
            }
            _ => {}
        }

        let result = self.dispatcher.dispatch(&request).await;
        if request.method == "initialize" && result.is_ok() && self.state == SessionState::Uninitialized {
            self.state = SessionState::Initialized;
        }
        Some(RpcResponse::from_result(id, &result))
    }

    /// Serve until the reader reaches EOF.
    pub async fn run<R, W>(&mut self, reader: R, mut writer: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await.context("reading stdin")? {
            let Some(response) = self.handle_line(&line).await else {
                continue;
            };
            let mut frame = serde_json::to_string(&response)?;
            frame.push('\n');
            writer.write_all(frame.as_bytes()).await.context("writing stdout")?;
            writer.flush().await?;
        }
        info!("stdin closed; ending session");
        Ok(())
    }
}

pub async fn serve_stdio(dispatcher: Arc<RpcDispatcher>) -> anyhow::Result<()> {
    info!("serving JSON-RPC on stdio");
    StdioSession::new(dispatcher)
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value as JsonValue};

    use super::*;
    use crate::rpc::{INVALID_REQUEST, PARSE_ERROR};
    use crate::testing::{harness, sample_jobs, FakeLlm};

    async fn session() -> (StdioSession, crate::testing::Harness) {
        let h = harness(sample_jobs(), vec![], FakeLlm::default()).await;
        let dispatcher = Arc::new(RpcDispatcher::new(h.bridge.clone()));
        (StdioSession::new(dispatcher), h)
    }

    async fn run_script(lines: &[JsonValue]) -> Vec<JsonValue> {
        let (mut session, _h) = session().await;
        let input: String = lines.iter().map(|l| format!("{l}\n")).collect();
        let mut output = Vec::new();
        session.run(input.as_bytes(), &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn requests_before_initialize_are_rejected() {
        let (mut session, _h) = session().await;
        let response = session
            .handle_line(&json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}).to_string())
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, INVALID_REQUEST);
        assert_eq!(session.state(), SessionState::Uninitialized);

        let pong = session
            .handle_line(&json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}).to_string())
            .await
            .unwrap();
        assert_eq!(pong.result, Some(json!({})));
    }

    #[tokio::test]
    async fn handshake_moves_through_every_state() {
        let (mut session, _h) = session().await;
        session
            .handle_line(&json!({"id": 1, "method": "initialize", "params": {}}).to_string())
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Initialized);

        let none = session
            .handle_line(&json!({"method": "notifications/initialized"}).to_string())
            .await;
        assert!(none.is_none());
        assert_eq!(session.state(), SessionState::Serving);
    }

    #[tokio::test]
    async fn requests_are_served_before_the_initialized_notification() {
        let (mut session, _h) = session().await;
        session
            .handle_line(&json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}).to_string())
            .await
            .unwrap();

        let listed = session
            .handle_line(&json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}).to_string())
            .await
            .unwrap();
        assert!(listed.error.is_none());
        assert_eq!(listed.result.unwrap()["tools"].as_array().unwrap().len(), 5);
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[tokio::test]
    async fn a_full_session_answers_in_order_and_survives_garbage() {
        let responses = run_script(&[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!("not an object"),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                   "params": {"name": "analyze_job_match", "arguments": {"job_index": 99}}}),
        ])
        .await;

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(responses[1]["id"], JsonValue::Null);
        assert_eq!(responses[1]["error"]["code"], PARSE_ERROR);
        assert_eq!(responses[2]["id"], 2);
        assert_eq!(responses[2]["result"]["isError"], true);
    }

    #[tokio::test]
    async fn blank_lines_and_eof_end_quietly() {
        let (mut session, _h) = session().await;
        let mut output = Vec::new();
        session.run(&b"\n   \n"[..], &mut output).await.unwrap();
        assert!(output.is_empty());
    }
}
