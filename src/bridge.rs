use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::gateway::RemoteGateway;
use crate::models::message::OutboundMessage;
use crate::processor::message_processor::MessageProcessor;
use crate::sync::SyncStatus;

/// Consumes line-delimited JSON messages until the input closes. Each line is
/// handled in order so fixes and tracking commands are never reordered.
pub async fn consume_lines<R, G>(reader: R, processor: &MessageProcessor<G>) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    G: RemoteGateway + 'static,
{
    info!("Waiting for telemetry on input");
    let mut lines = reader.lines();
    let mut received = 0u64;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        received += 1;
        processor.process_message(line.as_bytes()).await?;
    }

    info!("Input closed after {} messages", received);
    Ok(())
}

/// Writes each outbound message as one JSON line.
pub async fn write_outbound<W>(mut writer: W, mut messages: mpsc::Receiver<OutboundMessage>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = messages.recv().await {
        let mut line = match serde_json::to_vec(&message) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode outbound message: {}", e);
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = writer.write_all(&line).await {
            error!("Output write failed: {}", e);
            return;
        }
        if let Err(e) = writer.flush().await {
            error!("Output flush failed: {}", e);
            return;
        }
    }
    debug!("Output channel closed");
}

/// Republishes every sync status change to the output.
pub async fn forward_sync_status(
    mut status: watch::Receiver<SyncStatus>,
    out: mpsc::Sender<OutboundMessage>,
) {
    while status.changed().await.is_ok() {
        let current = status.borrow_and_update().clone();
        if out.send(OutboundMessage::SyncStatus(current)).await.is_err() {
            return;
        }
    }
}
