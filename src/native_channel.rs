//! The background service's native-messaging channel: runtime messages arrive as frames on
//! the reader, responses and settings broadcasts leave as frames on the writer.
use std::io;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, info, warn};

use crate::messages::{RuntimeMessage, SettingsBroadcast};
use crate::protocol::{read_message_async, write_message_async};
use crate::state::SharedState;

/// Runs until the reader reaches end of input. A frame header over the size limit ends the
/// loop with an error, since the stream can no longer be split into frames. Frames are written by a single task so
/// responses and broadcasts never interleave.
pub async fn serve_native<R, W>(state: SharedState, mut reader: R, mut writer: W) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();

    let writer_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write_message_async(&mut writer, &msg).await {
                warn!(error = %e, "native channel write failed");
                break;
            }
        }
    });

    let mut settings_rx = state.settings.subscribe();
    let broadcast_tx = tx.clone();
    let forwarder = tokio::spawn(async move {
        loop {
            match settings_rx.recv().await {
                Ok(settings) => {
                    let frame = SettingsBroadcast::SettingsUpdated { settings };
                    match serde_json::to_value(&frame) {
                        Ok(value) => {
                            if broadcast_tx.send(value).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "settings broadcast not serializable"),
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "native channel lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = loop {
        let raw: Value = match read_message_async(&mut reader).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                info!("native channel closed");
                break Ok(());
            }
            // The body was consumed, so the next header is still aligned.
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!(error = %e, "native frame did not parse");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "native channel unreadable, closing");
                break Err(e);
            }
        };

        let message: RuntimeMessage = match serde_json::from_value(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "unknown runtime message");
                continue;
            }
        };
        debug!(?message, "native runtime message");

        let response = state.dispatch(message);
        match serde_json::to_value(&response) {
            Ok(value) => {
                if tx.send(value).is_err() {
                    break Ok(());
                }
            }
            Err(e) => warn!(error = %e, "response not serializable"),
        }
    };

    forwarder.abort();
    drop(tx);
    let _ = writer_task.await;
    result
}
