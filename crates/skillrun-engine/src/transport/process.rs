//! Local-process transport: line-delimited JSON-RPC over stdin/stdout.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use skillrun_claude_sdk::StderrTail;

use super::rpc::{reply_to_server_request, JsonRpcMessage, JsonRpcRequest, PendingRequests, RpcChannel};
use crate::error::TransportError;

pub(crate) struct ProcessChannel {
    provider: String,
    write_tx: mpsc::Sender<String>,
    pending: Arc<PendingRequests>,
    stderr: StderrTail,
    child: Mutex<Option<Child>>,
}

impl ProcessChannel {
    pub(crate) fn spawn(
        provider: &str,
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<Self, TransportError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| TransportError::Spawn {
            command: command.to_string(),
            source,
        })?;

        let missing = |what: &str| TransportError::Protocol(format!("Failed to get {}", what));
        let mut stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let pending = PendingRequests::new();
        let stderr_tail = StderrTail::default();

        let tail = stderr_tail.clone();
        let name = provider.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    warn!(provider = %name, stderr = %trimmed, "Provider stderr");
                    tail.push(trimmed);
                }
            }
        });

        let (write_tx, mut write_rx) = mpsc::channel::<String>(256);
        let name = provider.to_string();
        let writer_pending = Arc::clone(&pending);
        let writer_tail = stderr_tail.clone();
        tokio::spawn(async move {
            while let Some(line) = write_rx.recv().await {
                let written = async {
                    stdin.write_all(line.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    stdin.flush().await
                };
                if let Err(e) = written.await {
                    debug!(provider = %name, error = %e, "Provider stdin closed");
                    writer_pending.close(writer_tail.snapshot());
                    break;
                }
            }
        });

        let name = provider.to_string();
        let reader_pending = Arc::clone(&pending);
        let reader_tail = stderr_tail.clone();
        let reply_tx = write_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<JsonRpcMessage>(trimmed) {
                            Ok(message) if message.is_server_request() => {
                                let reply = reply_to_server_request(&message).to_string();
                                let _ = reply_tx.send(reply).await;
                            }
                            Ok(message) => {
                                if let Some(id) = message.response_id() {
                                    reader_pending.resolve(id, message.into_result());
                                }
                            }
                            Err(e) => {
                                let preview: String = trimmed.chars().take(200).collect();
                                warn!(provider = %name, error = %e, preview = %preview, "Unparseable provider output");
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(provider = %name, error = %e, "Provider stdout read error");
                        break;
                    }
                }
            }
            debug!(provider = %name, "Provider stdout closed");
            reader_pending.close(reader_tail.snapshot());
        });

        Ok(Self {
            provider: provider.to_string(),
            write_tx,
            pending,
            stderr: stderr_tail,
            child: Mutex::new(Some(child)),
        })
    }

    fn closed_error(&self) -> TransportError {
        TransportError::ConnectionClosed {
            stderr: self.stderr.snapshot(),
        }
    }
}

#[async_trait]
impl RpcChannel for ProcessChannel {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let slot = self.pending.register().map_err(|_| self.closed_error())?;
        let line = serde_json::to_string(&JsonRpcRequest::request(slot.id, method, params))?;
        if self.write_tx.send(line).await.is_err() {
            return Err(self.closed_error());
        }
        slot.wait().await
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        if self.pending.is_closed() {
            return Err(self.closed_error());
        }
        let line = serde_json::to_string(&JsonRpcRequest::notification(method, params))?;
        self.write_tx
            .send(line)
            .await
            .map_err(|_| self.closed_error())
    }

    async fn close(&self) {
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };
        self.pending.close(None);
        if let Err(e) = child.kill().await {
            debug!(provider = %self.provider, error = %e, "Provider process already exited");
        }
        debug!(provider = %self.provider, "Provider process terminated");
    }

    fn diagnostics(&self) -> Option<String> {
        self.stderr.snapshot()
    }
}
