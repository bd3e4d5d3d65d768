use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use super::{NativeError, NativeRequest};
use crate::protocol::{read_message_async, write_message_async};

/// One request, one response. Timeouts and retries are the caller's concern.
#[async_trait]
pub trait NativeTransport: Send + Sync {
    async fn exchange(&self, request: &NativeRequest) -> Result<Value, NativeError>;
}

/// Launches the host executable for every request, the way a browser does for one-shot
/// native messages.
pub struct ProcessTransport {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessTransport {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

#[async_trait]
impl NativeTransport for ProcessTransport {
    async fn exchange(&self, request: &NativeRequest) -> Result<Value, NativeError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                NativeError::Communication(format!("spawn {}: {e}", self.program.display()))
            })?;
        debug!(program = %self.program.display(), action = request.action(), "native host spawned");

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| NativeError::Communication("host stdin unavailable".into()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| NativeError::Communication("host stdout unavailable".into()))?;

        write_message_async(&mut stdin, request)
            .await
            .map_err(|e| NativeError::Communication(format!("write: {e}")))?;
        drop(stdin);

        let response: Value = read_message_async(&mut stdout)
            .await
            .map_err(|e| NativeError::Communication(format!("read: {e}")))?;

        // The host is one-shot; a lingering process is reaped by kill_on_drop.
        let _ = child.start_kill();
        Ok(response)
    }
}
